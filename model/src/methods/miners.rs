use chrono::Utc;
use sea_orm::prelude::*;
use sea_orm::{IntoActiveModel, Set};

use crate::Result;
use crate::entities::miners;

impl miners::Model {
    #[tracing::instrument(skip(db))]
    pub async fn first_or_create(
        db: &impl ConnectionTrait,
        coin: &str,
        address: &str,
    ) -> Result<Self> {
        let existing = miners::Entity::find()
            .filter(miners::Column::Coin.eq(coin))
            .filter(miners::Column::Address.eq(address))
            .one(db)
            .await?;

        if let Some(miner) = existing {
            let mut touched = miner.into_active_model();
            touched.last_seen = Set(Utc::now().naive_utc());

            return Ok(touched.update(db).await?);
        }

        let now = Utc::now().naive_utc();
        let miner = miners::Model {
            id: Uuid::new_v4(),
            coin: coin.to_owned(),
            address: address.to_owned(),
            payout_threshold: None,
            created_at: now,
            last_seen: now,
        };

        Ok(miner.into_active_model().insert(db).await?)
    }

    #[tracing::instrument(skip(db))]
    pub async fn set_payout_threshold(
        self,
        db: &impl ConnectionTrait,
        threshold: Option<i64>,
    ) -> Result<Self> {
        let mut miner = self.into_active_model();
        miner.payout_threshold = Set(threshold);

        Ok(miner.update(db).await?)
    }

    /// Miners that carry a payout-threshold override, as (address, threshold).
    #[tracing::instrument(skip(db))]
    pub async fn threshold_overrides(
        db: &impl ConnectionTrait,
        coin: &str,
    ) -> Result<Vec<(String, i64)>> {
        let miners = miners::Entity::find()
            .filter(miners::Column::Coin.eq(coin))
            .filter(miners::Column::PayoutThreshold.is_not_null())
            .all(db)
            .await?;

        Ok(miners
            .into_iter()
            .filter_map(|miner| miner.payout_threshold.map(|t| (miner.address, t)))
            .collect())
    }
}
