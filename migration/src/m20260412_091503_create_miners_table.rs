use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Miner::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Miner::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Miner::Coin).string_len(32).not_null())
                    .col(ColumnDef::new(Miner::Address).string_len(128).not_null())
                    .col(ColumnDef::new(Miner::PayoutThreshold).big_integer())
                    .col(ColumnDef::new(Miner::CreatedAt).date_time().not_null())
                    .col(ColumnDef::new(Miner::LastSeen).date_time().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name(MinerIndex::CoinAddress.to_string())
                    .table(Miner::Table)
                    .col(Miner::Coin)
                    .col(Miner::Address)
                    .unique()
                    .take(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Miner::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub(crate) enum Miner {
    #[sea_orm(iden = "miners")]
    Table,
    Id,
    Coin,
    Address,
    PayoutThreshold,
    CreatedAt,
    LastSeen,
}

#[derive(DeriveIden)]
pub(crate) enum MinerIndex {
    #[sea_orm(iden = "idx_miners_coin_address")]
    CoinAddress,
}
