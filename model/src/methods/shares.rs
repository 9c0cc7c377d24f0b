use chrono::NaiveDateTime;
use sea_orm::prelude::*;
use sea_orm::sea_query::Expr;
use sea_orm::{IntoActiveModel, QuerySelect};

use crate::Result;
use crate::entities::shares;

impl shares::Model {
    /// Appends a batch of shares in one insert. The share log is
    /// append-only; nothing ever updates these rows.
    #[tracing::instrument(skip(db, batch), fields(count = batch.len()))]
    pub async fn store_batch(db: &impl ConnectionTrait, batch: Vec<Self>) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let rows = batch.into_iter().map(|share| share.into_active_model());
        shares::Entity::insert_many(rows).exec(db).await?;

        Ok(())
    }

    /// Per-miner share weight for one round. The CAST keeps the SUM an
    /// integer on both SQLite and Postgres.
    #[tracing::instrument(skip(db))]
    pub async fn weights_for_round(
        db: &impl ConnectionTrait,
        round_id: Uuid,
    ) -> Result<Vec<(String, i64)>> {
        let weights = shares::Entity::find()
            .select_only()
            .column(shares::Column::MinerId)
            .column_as(Expr::cust("CAST(SUM(weight) AS BIGINT)"), "weight")
            .filter(shares::Column::RoundId.eq(round_id))
            .group_by(shares::Column::MinerId)
            .into_tuple::<(String, i64)>()
            .all(db)
            .await?;

        Ok(weights)
    }

    #[tracing::instrument(skip(db))]
    pub async fn total_weight_for_round(db: &impl ConnectionTrait, round_id: Uuid) -> Result<i64> {
        let total = shares::Entity::find()
            .select_only()
            .column_as(Expr::cust("CAST(SUM(weight) AS BIGINT)"), "weight")
            .filter(shares::Column::RoundId.eq(round_id))
            .into_tuple::<Option<i64>>()
            .one(db)
            .await?;

        Ok(total.flatten().unwrap_or(0))
    }

    /// (miner, share count, weight) aggregated over a time window.
    #[tracing::instrument(skip(db))]
    pub async fn window_totals(
        db: &impl ConnectionTrait,
        coin: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<(String, i64, i64)>> {
        let totals = shares::Entity::find()
            .select_only()
            .column(shares::Column::MinerId)
            .column_as(Expr::cust("CAST(COUNT(*) AS BIGINT)"), "shares")
            .column_as(Expr::cust("CAST(SUM(weight) AS BIGINT)"), "weight")
            .filter(shares::Column::Coin.eq(coin))
            .filter(shares::Column::SubmittedAt.gte(start))
            .filter(shares::Column::SubmittedAt.lt(end))
            .group_by(shares::Column::MinerId)
            .into_tuple::<(String, i64, i64)>()
            .all(db)
            .await?;

        Ok(totals)
    }

    #[tracing::instrument(skip(db, round_ids), fields(rounds = round_ids.len()))]
    pub async fn prune_for_rounds(db: &impl ConnectionTrait, round_ids: &[Uuid]) -> Result<u64> {
        if round_ids.is_empty() {
            return Ok(0);
        }

        let result = shares::Entity::delete_many()
            .filter(shares::Column::RoundId.is_in(round_ids.iter().copied()))
            .exec(db)
            .await?;

        Ok(result.rows_affected)
    }
}
