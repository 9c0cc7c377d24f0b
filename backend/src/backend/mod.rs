//! Per-coin financial state machine.
//!
//! [`CoinBackend`] owns all round, balance and payout state for one coin.
//! Share crediting is the lock-free hot path; everything that talks to the
//! chain or moves money runs on periodic timer tasks, serialized through a
//! per-coin mutex so payouts can never double-dispatch. The ledger database
//! is the single source of truth; the in-memory round accumulator is a
//! cache rebuilt from it at startup.

mod ticks;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use chrono::{NaiveDateTime, Utc};
use orepool_model::entities::{payouts, rounds, shares};
use sea_orm::TransactionTrait;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::accounting::RoundAccumulator;
use crate::coin::{Amount, CoinInfo};
use crate::config::{BackendConfig, PoolFeeEntry};
use crate::dispatcher::{ClientDispatcher, NodeHealthReport};
use crate::error::{PoolError, Result};
use crate::node::WalletBalance;
use crate::services::database::DatabaseService;

/// Verified proof of work handed in by a mining front end.
#[derive(Debug, Clone)]
pub struct Share {
    /// Payout address the share was mined for.
    pub miner_id: String,
    /// Share difficulty in weight units.
    pub weight: u64,
}

/// A share that met full network difficulty.
#[derive(Debug, Clone)]
pub struct FoundBlock {
    pub hash: String,
    pub height: i64,
    /// Full coinbase value of the block in fractional units.
    pub reward: Amount,
    pub found_by: String,
}

pub(crate) enum WriterMsg {
    Share(shares::Model),
    Flush(oneshot::Sender<()>),
}

pub struct CoinBackend {
    coin: &'static CoinInfo,
    config: BackendConfig,
    dispatcher: Arc<ClientDispatcher>,
    database: Arc<DatabaseService>,
    accumulator: RwLock<Arc<RoundAccumulator>>,
    share_tx: mpsc::UnboundedSender<WriterMsg>,
    share_rx: Mutex<Option<mpsc::UnboundedReceiver<WriterMsg>>>,
    shares_accepted: AtomicU64,
    accepting: AtomicBool,
    payouts_halted: AtomicBool,
    /// Serializes every money-moving tick for this coin.
    financial: tokio::sync::Mutex<()>,
    last_stat_window: Mutex<NaiveDateTime>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl CoinBackend {
    /// Builds the backend and recovers in-memory state from the ledger:
    /// the Open round is loaded (or created) and its accumulator replayed
    /// from the share log.
    pub async fn new(
        coin: &'static CoinInfo,
        config: BackendConfig,
        dispatcher: Arc<ClientDispatcher>,
        database: Arc<DatabaseService>,
    ) -> Result<Arc<Self>> {
        let round = rounds::Model::open_or_create(&database.connection, coin.name).await?;
        let weights = shares::Model::weights_for_round(&database.connection, round.id).await?;
        let accumulator = RoundAccumulator::restore(round.id, round.started_at, &weights);

        info!(
            coin = coin.name,
            round = %round.id,
            weight = accumulator.total_weight(),
            miners = accumulator.miner_count(),
            "backend recovered open round"
        );

        let (share_tx, share_rx) = mpsc::unbounded_channel();

        Ok(Arc::new(Self {
            coin,
            config,
            dispatcher,
            database,
            accumulator: RwLock::new(Arc::new(accumulator)),
            share_tx,
            share_rx: Mutex::new(Some(share_rx)),
            shares_accepted: AtomicU64::new(0),
            accepting: AtomicBool::new(true),
            payouts_halted: AtomicBool::new(false),
            financial: tokio::sync::Mutex::new(()),
            last_stat_window: Mutex::new(Utc::now().naive_utc()),
            tasks: Mutex::new(Vec::new()),
        }))
    }

    pub fn coin(&self) -> &'static CoinInfo {
        self.coin
    }

    pub fn dispatcher(&self) -> &Arc<ClientDispatcher> {
        &self.dispatcher
    }

    pub fn fee_config(&self) -> &[PoolFeeEntry] {
        &self.config.pool_fee
    }

    /// Spawns the share writer and the five periodic timers.
    pub fn start(self: &Arc<Self>) {
        let mut tasks = self.tasks.lock().unwrap();

        let receiver = self
            .share_rx
            .lock()
            .unwrap()
            .take()
            .expect("backend started twice");
        tasks.push(tokio::spawn(run_share_writer(
            Arc::clone(&self.database),
            receiver,
        )));

        tasks.push(self.spawn_timer(self.config.confirmations_check_interval, |backend| async move {
            backend.run_confirmation_check().await
        }));
        tasks.push(self.spawn_timer(self.config.payout_interval, |backend| async move {
            backend.run_payouts().await
        }));
        tasks.push(self.spawn_timer(self.config.balance_check_interval, |backend| async move {
            backend.run_balance_check().await
        }));
        tasks.push(self.spawn_timer(self.config.statistic_check_interval, |backend| async move {
            backend.run_statistics().await
        }));
        tasks.push(self.spawn_timer(ticks::ROUND_GC_INTERVAL, |backend| async move {
            backend.run_round_gc().await
        }));

        info!(coin = self.coin.name, "backend started");
    }

    fn spawn_timer<F, Fut>(self: &Arc<Self>, period: std::time::Duration, tick: F) -> JoinHandle<()>
    where
        F: Fn(Arc<Self>) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = Result<()>> + Send + 'static,
    {
        let backend = Arc::clone(self);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The zeroth tick completes immediately; the first body run
            // happens one full period after startup.
            ticker.tick().await;

            loop {
                ticker.tick().await;
                if let Err(err) = tick(Arc::clone(&backend)).await {
                    warn!(coin = backend.coin.name, %err, "timer tick failed, will retry");
                }
            }
        })
    }

    /// Graceful shutdown: refuse new shares, flush the share log, wait for
    /// any in-flight financial tick, then stop the timers.
    pub async fn stop(&self) {
        self.accepting.store(false, Ordering::Release);
        self.flush_shares().await;

        // Payout and confirmation ticks are not interruptible mid-way.
        drop(self.financial.lock().await);

        for task in self.tasks.lock().unwrap().drain(..) {
            task.abort();
        }

        info!(coin = self.coin.name, "backend stopped");
    }

    // === hot path ===

    /// Credits one verified share. Invoked concurrently from worker
    /// contexts; never blocks on the ledger or the chain. Returns false
    /// once the backend is shutting down.
    pub fn credit_share(&self, share: Share) -> bool {
        if !self.accepting.load(Ordering::Acquire) {
            return false;
        }

        let accumulator = self.accumulator.read().unwrap().clone();
        accumulator.credit(&share.miner_id, share.weight);
        self.shares_accepted.fetch_add(1, Ordering::Relaxed);

        metrics::counter!("backend_shares_total", "coin" => self.coin.name).increment(1);
        metrics::histogram!("backend_share_weight", "coin" => self.coin.name)
            .record(share.weight as f64);

        let row = shares::Model {
            id: Uuid::new_v4(),
            coin: self.coin.name.to_owned(),
            round_id: accumulator.round_id(),
            miner_id: share.miner_id,
            weight: share.weight as i64,
            submitted_at: Utc::now().naive_utc(),
        };
        // The writer only goes away at shutdown; dropping the row then is fine.
        let _ = self.share_tx.send(WriterMsg::Share(row));

        true
    }

    /// A share met full network difficulty: close the Open round behind the
    /// block and start the next one. Shares arriving from this moment on are
    /// credited to the new round.
    pub async fn report_found_block(&self, block: FoundBlock) -> Result<()> {
        info!(
            coin = self.coin.name,
            hash = %block.hash,
            height = block.height,
            reward = self.coin.format_money(block.reward),
            found_by = %block.found_by,
            "block found"
        );
        metrics::counter!("backend_blocks_found_total", "coin" => self.coin.name).increment(1);

        let next = Arc::new(RoundAccumulator::new(
            Uuid::new_v4(),
            Utc::now().naive_utc(),
        ));

        // Swap first so late shares land in the next round, then flush so
        // the closed round's share log is complete before it is frozen.
        let closed = {
            let mut accumulator = self.accumulator.write().unwrap();
            std::mem::replace(&mut *accumulator, Arc::clone(&next))
        };
        self.flush_shares().await;

        let total_weight = closed.total_weight() as i64;
        let coin_name = self.coin.name;
        let closed_id = closed.round_id();
        let next_id = next.round_id();
        let next_started = next.started_at();
        let block_for_txn = block.clone();

        let outcome = self
            .database
            .connection
            .transaction::<_, (), orepool_model::Error>(move |txn| {
                Box::pin(async move {
                    if let Some(round) = rounds::Model::by_id(txn, closed_id).await? {
                        round
                            .finish(
                                txn,
                                &block_for_txn.hash,
                                block_for_txn.height,
                                block_for_txn.reward,
                                total_weight,
                            )
                            .await?;
                    }

                    let round = rounds::Model {
                        id: next_id,
                        coin: coin_name.to_owned(),
                        state: rounds::RoundState::Open,
                        started_at: next_started,
                        ended_at: None,
                        block_hash: None,
                        block_height: None,
                        reward: 0,
                        total_weight: 0,
                        matured_at: None,
                    };
                    use sea_orm::{ActiveModelTrait, IntoActiveModel};
                    round.into_active_model().insert(txn).await?;

                    Ok(())
                })
            })
            .await;

        if let Err(err) = outcome {
            // Roll the swap back; shares credited to the unborn round fold
            // into the still-open one.
            let replaced = {
                let mut accumulator = self.accumulator.write().unwrap();
                std::mem::replace(&mut *accumulator, closed)
            };
            for (miner, weight) in replaced.snapshot() {
                self.accumulator.read().unwrap().credit(&miner, weight);
            }

            error!(coin = self.coin.name, %err, "round transition failed");
            return Err(PoolError::Database {
                message: err.to_string(),
                source: Some(Box::new(err)),
            });
        }

        Ok(())
    }

    pub(crate) async fn flush_shares(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.share_tx.send(WriterMsg::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.await;
        }
    }

    // === payout halt flag ===

    pub fn payouts_halted(&self) -> bool {
        self.payouts_halted.load(Ordering::Acquire)
    }

    /// Operator intervention after a reconciliation mismatch.
    pub fn resume_payouts(&self) {
        self.payouts_halted.store(false, Ordering::Release);
        warn!(coin = self.coin.name, "payouts resumed by operator");
    }

    // === read-only accessors for the API layer ===

    pub async fn miner_balance(&self, miner: &str) -> Result<BalanceSnapshot> {
        let balance = orepool_model::entities::balances::Model::find_for(
            &self.database.connection,
            self.coin.name,
            miner,
        )
        .await?;

        let accumulator = self.accumulator.read().unwrap().clone();

        Ok(BalanceSnapshot {
            miner_id: miner.to_owned(),
            confirmed: balance.as_ref().map(|b| b.confirmed).unwrap_or(0),
            pending: balance.as_ref().map(|b| b.pending).unwrap_or(0),
            round_weight: accumulator.miner_weight(miner),
        })
    }

    pub async fn pool_balance(&self) -> Result<PoolBalanceSnapshot> {
        let (confirmed, pending) = orepool_model::entities::balances::Model::totals(
            &self.database.connection,
            self.coin.name,
        )
        .await?;

        Ok(PoolBalanceSnapshot {
            coin: self.coin.name,
            ledger_confirmed: confirmed,
            ledger_pending: pending,
            wallet: self.dispatcher.get_wallet_balance().await.ok(),
            payouts_halted: self.payouts_halted(),
        })
    }

    pub async fn found_blocks(&self, limit: u64) -> Result<Vec<rounds::Model>> {
        Ok(rounds::Model::found_blocks(&self.database.connection, self.coin.name, limit).await?)
    }

    pub async fn recent_rounds(&self, limit: u64) -> Result<Vec<rounds::Model>> {
        Ok(rounds::Model::recent(&self.database.connection, self.coin.name, limit).await?)
    }

    pub async fn payouts_for(&self, miner: &str, limit: u64) -> Result<Vec<payouts::Model>> {
        Ok(
            payouts::Model::for_miner(&self.database.connection, self.coin.name, miner, limit)
                .await?,
        )
    }

    pub async fn miner_stats(
        &self,
        miner: &str,
        limit: u64,
    ) -> Result<Vec<orepool_model::entities::stats::Model>> {
        Ok(orepool_model::entities::stats::Model::recent_for_miner(
            &self.database.connection,
            self.coin.name,
            miner,
            limit,
        )
        .await?)
    }

    pub fn pool_stats(&self) -> PoolStatsSnapshot {
        let accumulator = self.accumulator.read().unwrap().clone();

        PoolStatsSnapshot {
            coin: self.coin.name,
            round_id: accumulator.round_id(),
            round_started_at: accumulator.started_at(),
            round_weight: accumulator.total_weight(),
            active_miners: accumulator.miner_count(),
            shares_accepted: self.shares_accepted.load(Ordering::Relaxed),
            payouts_halted: self.payouts_halted(),
            nodes: self.dispatcher.health_report(),
        }
    }

    // shared by the tick implementations
    pub(crate) fn db(&self) -> &sea_orm::DatabaseConnection {
        &self.database.connection
    }

    pub(crate) fn backend_config(&self) -> &BackendConfig {
        &self.config
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct BalanceSnapshot {
    pub miner_id: String,
    pub confirmed: Amount,
    pub pending: Amount,
    /// Weight accumulated in the current Open round.
    pub round_weight: u64,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct PoolBalanceSnapshot {
    pub coin: &'static str,
    pub ledger_confirmed: Amount,
    pub ledger_pending: Amount,
    /// Dispatcher-observed wallet balance; absent while all nodes are down.
    pub wallet: Option<WalletBalance>,
    pub payouts_halted: bool,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct PoolStatsSnapshot {
    pub coin: &'static str,
    pub round_id: Uuid,
    pub round_started_at: NaiveDateTime,
    pub round_weight: u64,
    pub active_miners: usize,
    pub shares_accepted: u64,
    pub payouts_halted: bool,
    pub nodes: Vec<NodeHealthReport>,
}

/// Drains the share channel into batched ledger inserts. A failed batch
/// stays buffered and is retried with the next write; flush requests are
/// acknowledged regardless so shutdown cannot wedge on a dead ledger.
async fn run_share_writer(
    database: Arc<DatabaseService>,
    mut receiver: mpsc::UnboundedReceiver<WriterMsg>,
) {
    const MAX_BATCH: usize = 256;

    let mut buffer: Vec<shares::Model> = Vec::new();

    while let Some(message) = receiver.recv().await {
        let mut flush_acks = Vec::new();

        match message {
            WriterMsg::Share(row) => buffer.push(row),
            WriterMsg::Flush(ack) => flush_acks.push(ack),
        }

        while buffer.len() < MAX_BATCH {
            match receiver.try_recv() {
                Ok(WriterMsg::Share(row)) => buffer.push(row),
                Ok(WriterMsg::Flush(ack)) => flush_acks.push(ack),
                Err(_) => break,
            }
        }

        write_batch(&database, &mut buffer).await;

        for ack in flush_acks {
            let _ = ack.send(());
        }
    }

    write_batch(&database, &mut buffer).await;
}

async fn write_batch(database: &DatabaseService, buffer: &mut Vec<shares::Model>) {
    if buffer.is_empty() {
        return;
    }

    match shares::Model::store_batch(&database.connection, buffer.clone()).await {
        Ok(()) => buffer.clear(),
        Err(err) => {
            metrics::counter!("backend_share_write_failures_total").increment(1);
            error!(%err, queued = buffer.len(), "share batch write failed, keeping rows buffered");
        }
    }
}
