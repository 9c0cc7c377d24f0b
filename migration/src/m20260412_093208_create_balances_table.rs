use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Balance::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Balance::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Balance::Coin).string_len(32).not_null())
                    .col(ColumnDef::new(Balance::MinerId).string_len(128).not_null())
                    .col(
                        ColumnDef::new(Balance::Confirmed)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Balance::Pending)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Balance::UpdatedAt).date_time().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name(BalanceIndex::CoinMiner.to_string())
                    .table(Balance::Table)
                    .col(Balance::Coin)
                    .col(Balance::MinerId)
                    .unique()
                    .take(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Balance::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub(crate) enum Balance {
    #[sea_orm(iden = "balances")]
    Table,
    Id,
    Coin,
    MinerId,
    Confirmed,
    Pending,
    UpdatedAt,
}

#[derive(DeriveIden)]
pub(crate) enum BalanceIndex {
    #[sea_orm(iden = "idx_balances_coin_miner")]
    CoinMiner,
}
