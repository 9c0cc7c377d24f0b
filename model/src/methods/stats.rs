use chrono::NaiveDateTime;
use sea_orm::prelude::*;
use sea_orm::sea_query::Expr;
use sea_orm::{IntoActiveModel, QueryOrder, QuerySelect};

use crate::Result;
use crate::entities::stats;

impl stats::Model {
    #[tracing::instrument(skip(db, rows), fields(count = rows.len()))]
    pub async fn store_windows(db: &impl ConnectionTrait, rows: Vec<Self>) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }

        let rows = rows.into_iter().map(|row| row.into_active_model());
        stats::Entity::insert_many(rows).exec(db).await?;

        Ok(())
    }

    #[tracing::instrument(skip(db))]
    pub async fn prune_before(
        db: &impl ConnectionTrait,
        coin: &str,
        cutoff: NaiveDateTime,
    ) -> Result<u64> {
        let result = stats::Entity::delete_many()
            .filter(stats::Column::Coin.eq(coin))
            .filter(stats::Column::WindowEnd.lt(cutoff))
            .exec(db)
            .await?;

        Ok(result.rows_affected)
    }

    #[tracing::instrument(skip(db))]
    pub async fn recent_for_miner(
        db: &impl ConnectionTrait,
        coin: &str,
        miner: &str,
        limit: u64,
    ) -> Result<Vec<Self>> {
        let windows = stats::Entity::find()
            .filter(stats::Column::Coin.eq(coin))
            .filter(stats::Column::MinerId.eq(miner))
            .order_by_desc(stats::Column::WindowEnd)
            .limit(limit)
            .all(db)
            .await?;

        Ok(windows)
    }

    /// Per-miner (shares, weight) totals across all windows since `since`.
    #[tracing::instrument(skip(db))]
    pub async fn totals_since(
        db: &impl ConnectionTrait,
        coin: &str,
        since: NaiveDateTime,
    ) -> Result<Vec<(String, i64, i64)>> {
        let totals = stats::Entity::find()
            .select_only()
            .column(stats::Column::MinerId)
            .column_as(Expr::cust("CAST(SUM(shares) AS BIGINT)"), "shares")
            .column_as(Expr::cust("CAST(SUM(weight) AS BIGINT)"), "weight")
            .filter(stats::Column::Coin.eq(coin))
            .filter(stats::Column::WindowEnd.gte(since))
            .group_by(stats::Column::MinerId)
            .into_tuple::<(String, i64, i64)>()
            .all(db)
            .await?;

        Ok(totals)
    }
}
