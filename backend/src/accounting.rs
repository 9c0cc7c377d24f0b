//! In-memory accounting for the Open round, and the frozen reward split.
//!
//! The accumulator is the share-crediting hot path: per-miner atomic
//! tallies behind a concurrent map, no locks. It is a cache over the share
//! log — after a crash it is rebuilt by replaying the Open round's shares
//! from the ledger.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::NaiveDateTime;
use dashmap::DashMap;
use uuid::Uuid;

use crate::coin::Amount;
use crate::config::PoolFeeEntry;

#[derive(Debug)]
pub struct RoundAccumulator {
    round_id: Uuid,
    started_at: NaiveDateTime,
    total_weight: AtomicU64,
    miners: DashMap<String, AtomicU64>,
}

impl RoundAccumulator {
    pub fn new(round_id: Uuid, started_at: NaiveDateTime) -> Self {
        Self {
            round_id,
            started_at,
            total_weight: AtomicU64::new(0),
            miners: DashMap::new(),
        }
    }

    /// Rebuilds the accumulator from ledger state after a restart.
    pub fn restore(round_id: Uuid, started_at: NaiveDateTime, weights: &[(String, i64)]) -> Self {
        let accumulator = Self::new(round_id, started_at);
        for (miner, weight) in weights {
            accumulator.credit(miner, *weight as u64);
        }

        accumulator
    }

    pub fn round_id(&self) -> Uuid {
        self.round_id
    }

    pub fn started_at(&self) -> NaiveDateTime {
        self.started_at
    }

    /// Lock-free credit; safe under arbitrary concurrent callers.
    pub fn credit(&self, miner: &str, weight: u64) {
        self.miners
            .entry(miner.to_owned())
            .or_default()
            .fetch_add(weight, Ordering::Relaxed);
        self.total_weight.fetch_add(weight, Ordering::Relaxed);
    }

    pub fn total_weight(&self) -> u64 {
        self.total_weight.load(Ordering::Relaxed)
    }

    pub fn miner_weight(&self, miner: &str) -> u64 {
        self.miners
            .get(miner)
            .map(|weight| weight.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn miner_count(&self) -> usize {
        self.miners.len()
    }

    pub fn snapshot(&self) -> Vec<(String, u64)> {
        self.miners
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().load(Ordering::Relaxed)))
            .collect()
    }
}

/// Splits a matured block reward into per-address credits.
///
/// Fees come off the top in basis-point integer math; the remainder is
/// apportioned by share weight with flooring division against the round's
/// frozen `total_weight`, so the sum of all credits never exceeds the
/// reward. Called exactly once per round, at the PendingConfirmation ->
/// Paid transition; the result is frozen thereafter.
pub fn split_reward(
    reward: Amount,
    fees: &[PoolFeeEntry],
    weights: &[(String, i64)],
    total_weight: i64,
) -> Vec<(String, Amount)> {
    let mut credits = Vec::with_capacity(weights.len() + fees.len());

    let mut fee_total: Amount = 0;
    let mut fee_credits = Vec::with_capacity(fees.len());
    for entry in fees {
        let bps = (entry.percentage as f64 * 100.0).round() as i128;
        let fee = (reward as i128 * bps / 10_000) as Amount;
        if fee > 0 {
            fee_total += fee;
            fee_credits.push((entry.address.clone(), fee));
        }
    }

    let net = reward - fee_total;
    let recorded: i128 = weights.iter().map(|(_, weight)| *weight as i128).sum();
    // The snapshot is authoritative; if share rows exceed it, widen the
    // denominator so the split can never overshoot the reward.
    let denominator = recorded.max(total_weight as i128);

    if net > 0 && denominator > 0 {
        for (miner, weight) in weights {
            let amount = (net as i128 * *weight as i128 / denominator) as Amount;
            if amount > 0 {
                credits.push((miner.clone(), amount));
            }
        }
    }

    credits.extend(fee_credits);
    credits
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fee(address: &str, percentage: f32) -> PoolFeeEntry {
        PoolFeeEntry {
            address: address.to_owned(),
            percentage,
        }
    }

    #[test]
    fn split_is_proportional_and_exact_for_even_weights() {
        let weights = vec![("alice".to_owned(), 30), ("bob".to_owned(), 70)];
        let credits = split_reward(100, &[], &weights, 100);

        assert_eq!(credits.len(), 2);
        assert_eq!(credits[0], ("alice".to_owned(), 30));
        assert_eq!(credits[1], ("bob".to_owned(), 70));
        assert_eq!(credits.iter().map(|(_, a)| a).sum::<i64>(), 100);
    }

    #[test]
    fn split_never_exceeds_reward() {
        let weights = vec![
            ("a".to_owned(), 1),
            ("b".to_owned(), 1),
            ("c".to_owned(), 1),
        ];
        let credits = split_reward(100, &[fee("pool", 1.5)], &weights, 3);

        let total: i64 = credits.iter().map(|(_, amount)| amount).sum();
        assert!(total <= 100, "distributed {total} of 100");
    }

    #[test]
    fn fees_come_off_the_top() {
        let weights = vec![("alice".to_owned(), 1)];
        let credits = split_reward(1_000_000, &[fee("pool", 2.0)], &weights, 1);

        assert_eq!(credits[0], ("alice".to_owned(), 980_000));
        assert_eq!(credits[1], ("pool".to_owned(), 20_000));
    }

    #[test]
    fn empty_round_pays_only_fees() {
        let credits = split_reward(1_000, &[fee("pool", 10.0)], &[], 0);
        assert_eq!(credits, vec![("pool".to_owned(), 100)]);
    }

    #[test]
    fn under_recorded_weights_leave_dust_unassigned() {
        // Snapshot says 100 weight, but only 60 made it to the share log;
        // the denominator stays at the snapshot so nobody is overpaid.
        let weights = vec![("alice".to_owned(), 60)];
        let credits = split_reward(100, &[], &weights, 100);

        assert_eq!(credits, vec![("alice".to_owned(), 60)]);
    }

    #[test]
    fn accumulator_tracks_total_and_per_miner() {
        let accumulator = RoundAccumulator::new(Uuid::new_v4(), chrono::Utc::now().naive_utc());
        accumulator.credit("alice", 10);
        accumulator.credit("bob", 5);
        accumulator.credit("alice", 2);

        assert_eq!(accumulator.total_weight(), 17);
        assert_eq!(accumulator.miner_weight("alice"), 12);
        assert_eq!(accumulator.miner_weight("bob"), 5);
        assert_eq!(accumulator.miner_weight("carol"), 0);
        assert_eq!(accumulator.miner_count(), 2);
    }

    #[test]
    fn restore_matches_replayed_weights() {
        let weights = vec![("alice".to_owned(), 12), ("bob".to_owned(), 5)];
        let accumulator =
            RoundAccumulator::restore(Uuid::new_v4(), chrono::Utc::now().naive_utc(), &weights);

        assert_eq!(accumulator.total_weight(), 17);
        assert_eq!(accumulator.miner_weight("alice"), 12);
    }
}
