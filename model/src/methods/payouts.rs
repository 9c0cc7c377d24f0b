use chrono::Utc;
use sea_orm::prelude::*;
use sea_orm::{IntoActiveModel, QueryOrder, QuerySelect, Set};

use crate::Result;
use crate::entities::payouts::{self, PayoutState};

impl payouts::Model {
    /// Creates an Initiated record. The id becomes the wallet transaction
    /// label, so this must be durable before anything is broadcast.
    #[tracing::instrument(skip(db))]
    pub async fn create(
        db: &impl ConnectionTrait,
        coin: &str,
        miner: &str,
        amount: i64,
    ) -> Result<Self> {
        let payout = payouts::Model {
            id: Uuid::new_v4(),
            coin: coin.to_owned(),
            miner_id: miner.to_owned(),
            amount,
            fee: 0,
            state: PayoutState::Initiated,
            txid: None,
            created_at: Utc::now().naive_utc(),
            confirmed_at: None,
        };

        Ok(payout.into_active_model().insert(db).await?)
    }

    #[tracing::instrument(skip(db))]
    pub async fn mark_sent(self, db: &impl ConnectionTrait, txid: &str, fee: i64) -> Result<Self> {
        let mut payout = self.into_active_model();
        payout.state = Set(PayoutState::Sent);
        payout.txid = Set(Some(txid.to_owned()));
        payout.fee = Set(fee);

        Ok(payout.update(db).await?)
    }

    #[tracing::instrument(skip(db))]
    pub async fn mark_confirmed(self, db: &impl ConnectionTrait) -> Result<Self> {
        let mut payout = self.into_active_model();
        payout.state = Set(PayoutState::Confirmed);
        payout.confirmed_at = Set(Some(Utc::now().naive_utc()));

        Ok(payout.update(db).await?)
    }

    #[tracing::instrument(skip(db))]
    pub async fn mark_failed(self, db: &impl ConnectionTrait) -> Result<Self> {
        let mut payout = self.into_active_model();
        payout.state = Set(PayoutState::Failed);

        Ok(payout.update(db).await?)
    }

    #[tracing::instrument(skip(db))]
    pub async fn in_state(
        db: &impl ConnectionTrait,
        coin: &str,
        state: PayoutState,
    ) -> Result<Vec<Self>> {
        let payouts = payouts::Entity::find()
            .filter(payouts::Column::Coin.eq(coin))
            .filter(payouts::Column::State.eq(state))
            .order_by_asc(payouts::Column::CreatedAt)
            .all(db)
            .await?;

        Ok(payouts)
    }

    #[tracing::instrument(skip(db))]
    pub async fn for_miner(
        db: &impl ConnectionTrait,
        coin: &str,
        miner: &str,
        limit: u64,
    ) -> Result<Vec<Self>> {
        let payouts = payouts::Entity::find()
            .filter(payouts::Column::Coin.eq(coin))
            .filter(payouts::Column::MinerId.eq(miner))
            .order_by_desc(payouts::Column::CreatedAt)
            .limit(limit)
            .all(db)
            .await?;

        Ok(payouts)
    }
}
