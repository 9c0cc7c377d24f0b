use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Payout::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Payout::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Payout::Coin).string_len(32).not_null())
                    .col(ColumnDef::new(Payout::MinerId).string_len(128).not_null())
                    .col(ColumnDef::new(Payout::Amount).big_integer().not_null())
                    .col(
                        ColumnDef::new(Payout::Fee)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Payout::State).string_len(24).not_null())
                    .col(ColumnDef::new(Payout::Txid).string_len(128))
                    .col(ColumnDef::new(Payout::CreatedAt).date_time().not_null())
                    .col(ColumnDef::new(Payout::ConfirmedAt).date_time())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name(PayoutIndex::CoinMiner.to_string())
                    .table(Payout::Table)
                    .col(Payout::Coin)
                    .col(Payout::MinerId)
                    .take(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name(PayoutIndex::CoinState.to_string())
                    .table(Payout::Table)
                    .col(Payout::Coin)
                    .col(Payout::State)
                    .take(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Payout::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub(crate) enum Payout {
    #[sea_orm(iden = "payouts")]
    Table,
    Id,
    Coin,
    MinerId,
    Amount,
    Fee,
    State,
    Txid,
    CreatedAt,
    ConfirmedAt,
}

#[derive(DeriveIden)]
pub(crate) enum PayoutIndex {
    #[sea_orm(iden = "idx_payouts_coin_miner")]
    CoinMiner,
    #[sea_orm(iden = "idx_payouts_coin_state")]
    CoinState,
}
