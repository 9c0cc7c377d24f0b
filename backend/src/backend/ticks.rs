//! Timer tick bodies of the financial state machine. Confirmation, payout
//! and balance-check ticks serialize on the per-coin financial mutex;
//! statistics and round GC only touch non-monetary state.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use orepool_model::entities::payouts::{self, PayoutState};
use orepool_model::entities::{balances, miners, rounds, shares, stats};
use sea_orm::TransactionTrait;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::accounting::split_reward;
use crate::backend::CoinBackend;
use crate::error::{PoolError, Result};
use crate::node::{ConfirmationQuery, Payment};

pub(crate) const ROUND_GC_INTERVAL: Duration = Duration::from_secs(3600);

fn txn_error(err: sea_orm::TransactionError<orepool_model::Error>) -> PoolError {
    PoolError::Database {
        message: err.to_string(),
        source: Some(Box::new(err)),
    }
}

impl CoinBackend {
    /// Confirmation timer: advances PendingConfirmation rounds to Paid once
    /// the block is buried deep enough, or to Orphaned once the chain no
    /// longer contains it. A block that is already gone on the very first
    /// check goes straight to Orphaned.
    pub async fn run_confirmation_check(&self) -> Result<()> {
        let _guard = self.financial.lock().await;

        let pending = rounds::Model::pending_confirmation(self.db(), self.coin.name).await?;
        if pending.is_empty() {
            return Ok(());
        }

        let mut tracked = Vec::with_capacity(pending.len());
        let mut queries = Vec::with_capacity(pending.len());
        for round in pending {
            if let (Some(hash), Some(height)) = (round.block_hash.clone(), round.block_height) {
                queries.push(ConfirmationQuery::new(hash, height));
                tracked.push(round);
            }
        }

        let queries = self.dispatcher.get_block_confirmations(queries).await?;

        for (round, query) in tracked.into_iter().zip(queries) {
            let required = self.backend_config().required_confirmations;

            match query.confirmations {
                Some(depth) if depth < 0 => {
                    warn!(
                        coin = self.coin.name,
                        round = %round.id,
                        hash = %query.hash,
                        "found block orphaned by the chain"
                    );
                    metrics::counter!("backend_rounds_orphaned_total", "coin" => self.coin.name)
                        .increment(1);
                    round.mark_orphaned(self.db()).await?;
                }
                Some(depth) if depth >= required => {
                    self.mature_round(round).await?;
                }
                Some(depth) => {
                    debug!(
                        coin = self.coin.name,
                        round = %round.id,
                        depth,
                        required,
                        "round still maturing"
                    );
                }
                None => {}
            }
        }

        Ok(())
    }

    /// PendingConfirmation -> Paid. Computes the frozen reward split and
    /// credits every balance atomically with the state change; the split is
    /// never recomputed afterwards.
    async fn mature_round(&self, round: rounds::Model) -> Result<()> {
        let weights = shares::Model::weights_for_round(self.db(), round.id).await?;
        let credits = split_reward(
            round.reward,
            &self.backend_config().pool_fee,
            &weights,
            round.total_weight,
        );
        let distributed: i64 = credits.iter().map(|(_, amount)| amount).sum();

        info!(
            coin = self.coin.name,
            round = %round.id,
            reward = self.coin.format_money(round.reward),
            distributed = self.coin.format_money(distributed),
            recipients = credits.len(),
            "round matured"
        );

        let coin_name = self.coin.name;
        self.db()
            .transaction::<_, (), orepool_model::Error>(move |txn| {
                Box::pin(async move {
                    for (address, amount) in credits {
                        balances::Model::credit(txn, coin_name, &address, amount).await?;
                    }
                    round.mark_paid(txn).await?;

                    Ok(())
                })
            })
            .await
            .map_err(txn_error)?;

        metrics::counter!("backend_rounds_paid_total", "coin" => self.coin.name).increment(1);
        Ok(())
    }

    /// Payout timer: settle what is in flight, resolve anything ambiguous,
    /// then dispatch new payouts for balances over their threshold.
    pub async fn run_payouts(&self) -> Result<()> {
        let _guard = self.financial.lock().await;

        if self.payouts_halted() {
            warn!(coin = self.coin.name, "payouts halted, skipping payout tick");
            return Ok(());
        }

        self.settle_sent_payouts().await?;
        self.resolve_initiated_payouts().await?;
        self.dispatch_new_payouts().await?;

        Ok(())
    }

    /// Finalizes Sent payouts once their transaction confirms, or fails the
    /// money back into the balance when the wallet dropped the transaction.
    async fn settle_sent_payouts(&self) -> Result<()> {
        let coin_name = self.coin.name;

        for payout in payouts::Model::in_state(self.db(), coin_name, PayoutState::Sent).await? {
            match self.dispatcher.query_payout(payout.id).await {
                Ok(Some(info)) if info.confirmations > 0 => {
                    let amount = payout.amount;
                    self.db()
                        .transaction::<_, (), orepool_model::Error>(move |txn| {
                            Box::pin(async move {
                                let record = payout.mark_confirmed(txn).await?;
                                if let Some(balance) =
                                    balances::Model::find_for(txn, coin_name, &record.miner_id)
                                        .await?
                                {
                                    balance.settle_payout(txn, amount).await?;
                                }

                                Ok(())
                            })
                        })
                        .await
                        .map_err(txn_error)?;

                    metrics::counter!("backend_payouts_confirmed_total", "coin" => coin_name)
                        .increment(1);
                }
                Ok(Some(_)) => {} // broadcast, not yet mined
                Ok(None) => {
                    warn!(
                        coin = coin_name,
                        payout = %payout.id,
                        miner = %payout.miner_id,
                        "payout transaction vanished from the wallet, returning funds"
                    );

                    let amount = payout.amount;
                    self.db()
                        .transaction::<_, (), orepool_model::Error>(move |txn| {
                            Box::pin(async move {
                                let record = payout.mark_failed(txn).await?;
                                if let Some(balance) =
                                    balances::Model::find_for(txn, coin_name, &record.miner_id)
                                        .await?
                                {
                                    balance.return_payout(txn, amount).await?;
                                }

                                Ok(())
                            })
                        })
                        .await
                        .map_err(txn_error)?;
                }
                Err(err) => {
                    warn!(coin = coin_name, payout = %payout.id, %err, "payout status check failed");
                }
            }
        }

        Ok(())
    }

    /// Initiated records are payouts whose broadcast outcome was never
    /// learned (crash or ambiguous transport failure). The wallet label
    /// lookup decides: adopt the transaction and debit, or prove it unsent
    /// and release the miner for a fresh payout.
    async fn resolve_initiated_payouts(&self) -> Result<()> {
        let coin_name = self.coin.name;

        for payout in payouts::Model::in_state(self.db(), coin_name, PayoutState::Initiated).await? {
            match self.dispatcher.query_payout(payout.id).await {
                Ok(Some(info)) => {
                    info!(
                        coin = coin_name,
                        payout = %payout.id,
                        txid = %info.txid,
                        "stale payout resolved as broadcast, debiting"
                    );

                    let amount = payout.amount;
                    self.db()
                        .transaction::<_, (), orepool_model::Error>(move |txn| {
                            Box::pin(async move {
                                let record =
                                    payout.mark_sent(txn, &info.txid, info.fee).await?;
                                if let Some(balance) =
                                    balances::Model::find_for(txn, coin_name, &record.miner_id)
                                        .await?
                                {
                                    balance.debit_for_payout(txn, amount).await?;
                                }

                                Ok(())
                            })
                        })
                        .await
                        .map_err(txn_error)?;
                }
                Ok(None) => {
                    // Provably never broadcast; the balance was never
                    // debited, so the miner simply qualifies again.
                    payout.mark_failed(self.db()).await?;
                }
                Err(err) => {
                    warn!(coin = coin_name, payout = %payout.id, %err, "payout resolution deferred");
                }
            }
        }

        Ok(())
    }

    async fn dispatch_new_payouts(&self) -> Result<()> {
        let coin_name = self.coin.name;
        let config = self.backend_config().clone();

        let overrides: HashMap<String, i64> = miners::Model::threshold_overrides(self.db(), coin_name)
            .await?
            .into_iter()
            .collect();

        let mut in_flight: HashSet<String> = HashSet::new();
        for state in [PayoutState::Initiated, PayoutState::Sent] {
            for payout in payouts::Model::in_state(self.db(), coin_name, state).await? {
                in_flight.insert(payout.miner_id);
            }
        }

        let payable =
            balances::Model::payable(self.db(), coin_name, config.minimal_allowed_payout).await?;

        for balance in payable {
            let threshold = overrides
                .get(&balance.miner_id)
                .copied()
                .unwrap_or(config.default_payout_threshold)
                .max(config.minimal_allowed_payout);

            if balance.confirmed < threshold {
                continue;
            }
            if in_flight.contains(&balance.miner_id) {
                debug!(
                    coin = coin_name,
                    miner = %balance.miner_id,
                    "payout already in flight, skipping"
                );
                continue;
            }

            let amount = balance.confirmed;
            let record =
                payouts::Model::create(self.db(), coin_name, &balance.miner_id, amount).await?;
            let payment = Payment::single(record.id, balance.miner_id.clone(), amount);

            match self.dispatcher.send_payout(&payment).await {
                Ok(result) => {
                    info!(
                        coin = coin_name,
                        miner = %balance.miner_id,
                        amount = self.coin.format_money(amount),
                        txid = %result.txid,
                        "payout dispatched"
                    );
                    metrics::counter!("backend_payouts_dispatched_total", "coin" => coin_name)
                        .increment(1);

                    self.db()
                        .transaction::<_, (), orepool_model::Error>(move |txn| {
                            Box::pin(async move {
                                record.mark_sent(txn, &result.txid, result.fee).await?;
                                balance.debit_for_payout(txn, amount).await?;

                                Ok(())
                            })
                        })
                        .await
                        .map_err(txn_error)?;
                }
                Err(PoolError::Rejected { message }) => {
                    // Definite refusal; balance untouched, retried next tick.
                    warn!(
                        coin = coin_name,
                        miner = %balance.miner_id,
                        %message,
                        "payout rejected by node"
                    );
                    record.mark_failed(self.db()).await?;
                }
                Err(err) => {
                    // Outcome unknown; the record stays Initiated and the
                    // next tick resolves it before any re-dispatch.
                    warn!(
                        coin = coin_name,
                        miner = %balance.miner_id,
                        %err,
                        "payout broadcast unresolved, deferring"
                    );
                }
            }
        }

        Ok(())
    }

    /// Balance-check timer: the wallet must hold at least the sum of
    /// confirmed balances the ledger owes. A shortfall means external
    /// tampering or a bug; payouts halt until an operator intervenes, while
    /// share crediting and round accounting continue.
    pub async fn run_balance_check(&self) -> Result<()> {
        let _guard = self.financial.lock().await;

        let (confirmed, pending) = balances::Model::totals(self.db(), self.coin.name).await?;
        let wallet = self.dispatcher.get_wallet_balance().await?;
        let observed = wallet.spendable + wallet.immature;

        if observed < confirmed {
            self.payouts_halted
                .store(true, std::sync::atomic::Ordering::Release);
            metrics::counter!("backend_reconciliation_failures_total", "coin" => self.coin.name)
                .increment(1);
            error!(
                coin = self.coin.name,
                required = self.coin.format_money(confirmed),
                observed = self.coin.format_money(observed),
                "balance reconciliation mismatch, payouts halted"
            );

            return Err(PoolError::ReconciliationMismatch {
                coin: self.coin.name.to_owned(),
                required: confirmed,
                observed,
            });
        }

        debug!(
            coin = self.coin.name,
            confirmed = self.coin.format_money(confirmed),
            pending = self.coin.format_money(pending),
            wallet = self.coin.format_money(observed),
            "balances reconciled"
        );

        Ok(())
    }

    /// Statistics timer: snapshots per-miner share activity since the last
    /// window into the stats table and prunes expired windows.
    pub async fn run_statistics(&self) -> Result<()> {
        let now = Utc::now().naive_utc();
        let since = *self.last_stat_window.lock().unwrap();

        let totals = shares::Model::window_totals(self.db(), self.coin.name, since, now).await?;
        let rows: Vec<stats::Model> = totals
            .into_iter()
            .map(|(miner_id, share_count, weight)| stats::Model {
                id: Uuid::new_v4(),
                coin: self.coin.name.to_owned(),
                miner_id,
                shares: share_count,
                weight,
                window_start: since,
                window_end: now,
            })
            .collect();

        stats::Model::store_windows(self.db(), rows).await?;
        *self.last_stat_window.lock().unwrap() = now;

        let keep = self.backend_config().keep_stats_time;
        let cutoff = now - TimeDelta::seconds(keep.as_secs() as i64);
        let pruned = stats::Model::prune_before(self.db(), self.coin.name, cutoff).await?;
        if pruned > 0 {
            debug!(coin = self.coin.name, pruned, "expired stat windows removed");
        }

        Ok(())
    }

    /// Round-keep timer: drops Paid/Orphaned rounds past the retention
    /// window, together with their share log.
    pub async fn run_round_gc(&self) -> Result<()> {
        let keep = self.backend_config().keep_round_time;
        let cutoff = Utc::now().naive_utc() - TimeDelta::seconds(keep.as_secs() as i64);

        let ids = rounds::Model::prune_finished_before(self.db(), self.coin.name, cutoff).await?;
        if !ids.is_empty() {
            let removed = shares::Model::prune_for_rounds(self.db(), &ids).await?;
            info!(
                coin = self.coin.name,
                rounds = ids.len(),
                shares = removed,
                "expired rounds garbage-collected"
            );
        }

        Ok(())
    }
}
