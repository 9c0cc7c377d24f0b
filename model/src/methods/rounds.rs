use chrono::{NaiveDateTime, Utc};
use sea_orm::IntoActiveModel;
use sea_orm::prelude::*;
use sea_orm::{QueryOrder, QuerySelect, Set};

use crate::Result;
use crate::entities::rounds::{self, RoundState};

impl rounds::Model {
    #[tracing::instrument(skip(db))]
    pub async fn by_id(db: &impl ConnectionTrait, id: Uuid) -> Result<Option<Self>> {
        Ok(rounds::Entity::find_by_id(id).one(db).await?)
    }

    #[tracing::instrument(skip(db))]
    pub async fn open_for_coin(db: &impl ConnectionTrait, coin: &str) -> Result<Option<Self>> {
        let round = rounds::Entity::find()
            .filter(rounds::Column::Coin.eq(coin))
            .filter(rounds::Column::State.eq(RoundState::Open))
            .one(db)
            .await?;

        Ok(round)
    }

    /// Returns the coin's Open round, creating one if none exists. Callers
    /// rely on the one-open-round-per-coin invariant; the unique owner of a
    /// coin's round state (its backend) is the only writer.
    #[tracing::instrument(skip(db))]
    pub async fn open_or_create(db: &impl ConnectionTrait, coin: &str) -> Result<Self> {
        if let Some(round) = Self::open_for_coin(db, coin).await? {
            return Ok(round);
        }

        let round = rounds::Model {
            id: Uuid::new_v4(),
            coin: coin.to_owned(),
            state: RoundState::Open,
            started_at: Utc::now().naive_utc(),
            ended_at: None,
            block_hash: None,
            block_height: None,
            reward: 0,
            total_weight: 0,
            matured_at: None,
        };

        Ok(round.into_active_model().insert(db).await?)
    }

    #[tracing::instrument(skip(db))]
    pub async fn pending_confirmation(db: &impl ConnectionTrait, coin: &str) -> Result<Vec<Self>> {
        let rounds = rounds::Entity::find()
            .filter(rounds::Column::Coin.eq(coin))
            .filter(rounds::Column::State.eq(RoundState::PendingConfirmation))
            .order_by_asc(rounds::Column::StartedAt)
            .all(db)
            .await?;

        Ok(rounds)
    }

    /// Open -> PendingConfirmation: records the found block and freezes the
    /// round's total share weight.
    #[tracing::instrument(skip(db))]
    pub async fn finish(
        self,
        db: &impl ConnectionTrait,
        block_hash: &str,
        block_height: i64,
        reward: i64,
        total_weight: i64,
    ) -> Result<Self> {
        let mut round = self.into_active_model();
        round.state = Set(RoundState::PendingConfirmation);
        round.ended_at = Set(Some(Utc::now().naive_utc()));
        round.block_hash = Set(Some(block_hash.to_owned()));
        round.block_height = Set(Some(block_height));
        round.reward = Set(reward);
        round.total_weight = Set(total_weight);

        Ok(round.update(db).await?)
    }

    #[tracing::instrument(skip(db))]
    pub async fn mark_paid(self, db: &impl ConnectionTrait) -> Result<Self> {
        let mut round = self.into_active_model();
        round.state = Set(RoundState::Paid);
        round.matured_at = Set(Some(Utc::now().naive_utc()));

        Ok(round.update(db).await?)
    }

    #[tracing::instrument(skip(db))]
    pub async fn mark_orphaned(self, db: &impl ConnectionTrait) -> Result<Self> {
        let ended_at = self.ended_at.unwrap_or_else(|| Utc::now().naive_utc());

        let mut round = self.into_active_model();
        round.state = Set(RoundState::Orphaned);
        round.ended_at = Set(Some(ended_at));

        Ok(round.update(db).await?)
    }

    #[tracing::instrument(skip(db))]
    pub async fn recent(db: &impl ConnectionTrait, coin: &str, limit: u64) -> Result<Vec<Self>> {
        let rounds = rounds::Entity::find()
            .filter(rounds::Column::Coin.eq(coin))
            .order_by_desc(rounds::Column::StartedAt)
            .limit(limit)
            .all(db)
            .await?;

        Ok(rounds)
    }

    /// Rounds that produced a block, newest first.
    #[tracing::instrument(skip(db))]
    pub async fn found_blocks(
        db: &impl ConnectionTrait,
        coin: &str,
        limit: u64,
    ) -> Result<Vec<Self>> {
        let rounds = rounds::Entity::find()
            .filter(rounds::Column::Coin.eq(coin))
            .filter(rounds::Column::BlockHash.is_not_null())
            .order_by_desc(rounds::Column::EndedAt)
            .limit(limit)
            .all(db)
            .await?;

        Ok(rounds)
    }

    /// Deletes Paid/Orphaned rounds that ended before `cutoff`, returning
    /// their ids so the caller can drop the matching share rows.
    #[tracing::instrument(skip(db))]
    pub async fn prune_finished_before(
        db: &impl ConnectionTrait,
        coin: &str,
        cutoff: NaiveDateTime,
    ) -> Result<Vec<Uuid>> {
        let expired = rounds::Entity::find()
            .filter(rounds::Column::Coin.eq(coin))
            .filter(rounds::Column::State.is_in([RoundState::Paid, RoundState::Orphaned]))
            .filter(rounds::Column::EndedAt.lt(cutoff))
            .all(db)
            .await?;

        let ids: Vec<Uuid> = expired.iter().map(|round| round.id).collect();
        if !ids.is_empty() {
            rounds::Entity::delete_many()
                .filter(rounds::Column::Id.is_in(ids.clone()))
                .exec(db)
                .await?;
        }

        Ok(ids)
    }
}
