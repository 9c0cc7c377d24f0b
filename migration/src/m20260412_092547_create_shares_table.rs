use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Share::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Share::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Share::Coin).string_len(32).not_null())
                    .col(ColumnDef::new(Share::RoundId).uuid().not_null())
                    .col(ColumnDef::new(Share::MinerId).string_len(128).not_null())
                    .col(ColumnDef::new(Share::Weight).big_integer().not_null())
                    .col(ColumnDef::new(Share::SubmittedAt).date_time().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name(ShareIndex::RoundId.to_string())
                    .table(Share::Table)
                    .col(Share::RoundId)
                    .take(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name(ShareIndex::SubmittedAt.to_string())
                    .table(Share::Table)
                    .col(Share::SubmittedAt)
                    .take(),
            )
            .await?;

        // No foreign key on round_id: the batched share writer may insert
        // rows while the round-transition transaction is still in flight.

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Share::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub(crate) enum Share {
    #[sea_orm(iden = "shares")]
    Table,
    Id,
    Coin,
    RoundId,
    MinerId,
    Weight,
    SubmittedAt,
}

#[derive(DeriveIden)]
pub(crate) enum ShareIndex {
    #[sea_orm(iden = "idx_shares_round_id")]
    RoundId,
    #[sea_orm(iden = "idx_shares_submitted_at")]
    SubmittedAt,
}
