use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Stat::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Stat::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Stat::Coin).string_len(32).not_null())
                    .col(ColumnDef::new(Stat::MinerId).string_len(128).not_null())
                    .col(ColumnDef::new(Stat::Shares).big_integer().not_null())
                    .col(ColumnDef::new(Stat::Weight).big_integer().not_null())
                    .col(ColumnDef::new(Stat::WindowStart).date_time().not_null())
                    .col(ColumnDef::new(Stat::WindowEnd).date_time().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name(StatIndex::CoinMiner.to_string())
                    .table(Stat::Table)
                    .col(Stat::Coin)
                    .col(Stat::MinerId)
                    .take(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name(StatIndex::WindowEnd.to_string())
                    .table(Stat::Table)
                    .col(Stat::WindowEnd)
                    .take(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Stat::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub(crate) enum Stat {
    #[sea_orm(iden = "stats")]
    Table,
    Id,
    Coin,
    MinerId,
    Shares,
    Weight,
    WindowStart,
    WindowEnd,
}

#[derive(DeriveIden)]
pub(crate) enum StatIndex {
    #[sea_orm(iden = "idx_stats_coin_miner")]
    CoinMiner,
    #[sea_orm(iden = "idx_stats_window_end")]
    WindowEnd,
}
