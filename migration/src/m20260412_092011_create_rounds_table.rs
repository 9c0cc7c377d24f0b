use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Round::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Round::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Round::Coin).string_len(32).not_null())
                    .col(ColumnDef::new(Round::State).string_len(24).not_null())
                    .col(ColumnDef::new(Round::StartedAt).date_time().not_null())
                    .col(ColumnDef::new(Round::EndedAt).date_time())
                    .col(ColumnDef::new(Round::BlockHash).string_len(128))
                    .col(ColumnDef::new(Round::BlockHeight).big_integer())
                    .col(
                        ColumnDef::new(Round::Reward)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Round::TotalWeight)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Round::MaturedAt).date_time())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name(RoundIndex::CoinState.to_string())
                    .table(Round::Table)
                    .col(Round::Coin)
                    .col(Round::State)
                    .take(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name(RoundIndex::EndedAt.to_string())
                    .table(Round::Table)
                    .col(Round::EndedAt)
                    .take(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Round::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub(crate) enum Round {
    #[sea_orm(iden = "rounds")]
    Table,
    Id,
    Coin,
    State,
    StartedAt,
    EndedAt,
    BlockHash,
    BlockHeight,
    Reward,
    TotalWeight,
    MaturedAt,
}

#[derive(DeriveIden)]
pub(crate) enum RoundIndex {
    #[sea_orm(iden = "idx_rounds_coin_state")]
    CoinState,
    #[sea_orm(iden = "idx_rounds_ended_at")]
    EndedAt,
}
