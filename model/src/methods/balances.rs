use chrono::Utc;
use sea_orm::prelude::*;
use sea_orm::sea_query::Expr;
use sea_orm::{IntoActiveModel, QuerySelect, Set};

use crate::entities::balances;
use crate::{Error, Result};

impl balances::Model {
    #[tracing::instrument(skip(db))]
    pub async fn find_for(
        db: &impl ConnectionTrait,
        coin: &str,
        miner: &str,
    ) -> Result<Option<Self>> {
        let balance = balances::Entity::find()
            .filter(balances::Column::Coin.eq(coin))
            .filter(balances::Column::MinerId.eq(miner))
            .one(db)
            .await?;

        Ok(balance)
    }

    /// Adds `amount` to the miner's confirmed balance, creating the row on
    /// first credit. Confirmed only ever grows here; the sole decrease is
    /// `debit_for_payout`.
    #[tracing::instrument(skip(db))]
    pub async fn credit(
        db: &impl ConnectionTrait,
        coin: &str,
        miner: &str,
        amount: i64,
    ) -> Result<Self> {
        let now = Utc::now().naive_utc();

        match Self::find_for(db, coin, miner).await? {
            Some(existing) => {
                let confirmed = existing.confirmed + amount;
                let mut balance = existing.into_active_model();
                balance.confirmed = Set(confirmed);
                balance.updated_at = Set(now);

                Ok(balance.update(db).await?)
            }
            None => {
                let balance = balances::Model {
                    id: Uuid::new_v4(),
                    coin: coin.to_owned(),
                    miner_id: miner.to_owned(),
                    confirmed: amount,
                    pending: 0,
                    updated_at: now,
                };

                Ok(balance.into_active_model().insert(db).await?)
            }
        }
    }

    /// Balances whose confirmed amount has reached `minimal`.
    #[tracing::instrument(skip(db))]
    pub async fn payable(db: &impl ConnectionTrait, coin: &str, minimal: i64) -> Result<Vec<Self>> {
        let balances = balances::Entity::find()
            .filter(balances::Column::Coin.eq(coin))
            .filter(balances::Column::Confirmed.gte(minimal))
            .all(db)
            .await?;

        Ok(balances)
    }

    /// Moves `amount` from confirmed into pending for a dispatched payout.
    #[tracing::instrument(skip(db))]
    pub async fn debit_for_payout(self, db: &impl ConnectionTrait, amount: i64) -> Result<Self> {
        if amount > self.confirmed {
            return Err(Error::InsufficientBalance {
                miner: self.miner_id,
                confirmed: self.confirmed,
                debit: amount,
            });
        }

        let confirmed = self.confirmed - amount;
        let pending = self.pending + amount;

        let mut balance = self.into_active_model();
        balance.confirmed = Set(confirmed);
        balance.pending = Set(pending);
        balance.updated_at = Set(Utc::now().naive_utc());

        Ok(balance.update(db).await?)
    }

    /// Releases pending money once the payout transaction confirmed.
    #[tracing::instrument(skip(db))]
    pub async fn settle_payout(self, db: &impl ConnectionTrait, amount: i64) -> Result<Self> {
        let pending = self.pending - amount;

        let mut balance = self.into_active_model();
        balance.pending = Set(pending.max(0));
        balance.updated_at = Set(Utc::now().naive_utc());

        Ok(balance.update(db).await?)
    }

    /// Fails a payout back: pending money returns to confirmed.
    #[tracing::instrument(skip(db))]
    pub async fn return_payout(self, db: &impl ConnectionTrait, amount: i64) -> Result<Self> {
        let pending = (self.pending - amount).max(0);
        let confirmed = self.confirmed + amount;

        let mut balance = self.into_active_model();
        balance.pending = Set(pending);
        balance.confirmed = Set(confirmed);
        balance.updated_at = Set(Utc::now().naive_utc());

        Ok(balance.update(db).await?)
    }

    /// (sum of confirmed, sum of pending) across all of a coin's balances.
    #[tracing::instrument(skip(db))]
    pub async fn totals(db: &impl ConnectionTrait, coin: &str) -> Result<(i64, i64)> {
        let totals = balances::Entity::find()
            .select_only()
            .column_as(Expr::cust("CAST(SUM(confirmed) AS BIGINT)"), "confirmed")
            .column_as(Expr::cust("CAST(SUM(pending) AS BIGINT)"), "pending")
            .filter(balances::Column::Coin.eq(coin))
            .into_tuple::<(Option<i64>, Option<i64>)>()
            .one(db)
            .await?;

        let (confirmed, pending) = totals.unwrap_or((None, None));
        Ok((confirmed.unwrap_or(0), pending.unwrap_or(0)))
    }
}
