//! Per-coin dispatcher over a set of redundant node clients.
//!
//! Owns node health, routes every chain operation to a live node with
//! failover, and fans out new-work notifications to registered mining
//! front ends. All monetary safety rules around re-broadcasting live here:
//! a payout is never sent to a second node until the first node's silence
//! has been resolved through a wallet lookup.

use std::future::Future;
use std::sync::atomic::{AtomicI64, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, timeout};
use tracing::{debug, info, warn};

use crate::coin::CoinInfo;
use crate::error::{PoolError, Result};
use crate::node::{
    BlockTemplate, ConfirmationQuery, NodeClient, NodeError, NodeResult, NodeStatus, Payment,
    SendResult, WalletBalance,
};

const DEFAULT_OP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum NodeHealth {
    Unknown,
    Healthy,
    Unreachable,
}

impl NodeHealth {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => NodeHealth::Healthy,
            2 => NodeHealth::Unreachable,
            _ => NodeHealth::Unknown,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            NodeHealth::Unknown => 0,
            NodeHealth::Healthy => 1,
            NodeHealth::Unreachable => 2,
        }
    }
}

/// New best tip observed among the healthy nodes; pushed to front ends so
/// they can refresh miner work with low latency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkNotification {
    pub coin: &'static str,
    pub height: i64,
    pub best_hash: String,
}

/// A mining-protocol front end interested in work updates.
pub trait WorkConsumer: Send + Sync {
    fn on_new_work(&self, work: &WorkNotification);
}

/// Health snapshot of one endpoint, for the API layer.
#[derive(Debug, Clone, serde::Serialize)]
pub struct NodeHealthReport {
    pub url: String,
    pub health: NodeHealth,
    pub height: i64,
    /// Seconds since the node last answered a call, if it ever has.
    pub last_success_secs: Option<u64>,
}

struct NodeSlot {
    client: Arc<dyn NodeClient>,
    health: AtomicU8,
    last_success: Mutex<Option<Instant>>,
    last_height: AtomicI64,
}

impl NodeSlot {
    fn new(client: Arc<dyn NodeClient>) -> Self {
        Self {
            client,
            health: AtomicU8::new(NodeHealth::Unknown.as_u8()),
            last_success: Mutex::new(None),
            last_height: AtomicI64::new(0),
        }
    }

    fn health(&self) -> NodeHealth {
        NodeHealth::from_u8(self.health.load(Ordering::Acquire))
    }

    fn set_health(&self, health: NodeHealth) -> NodeHealth {
        NodeHealth::from_u8(self.health.swap(health.as_u8(), Ordering::AcqRel))
    }

    fn record_success(&self) {
        *self.last_success.lock().unwrap() = Some(Instant::now());
    }
}

enum Attempt<T> {
    Success(T),
    Transient { timed_out: bool },
    Rejected(NodeError),
}

enum Resolution {
    Found(SendResult),
    NotSent,
    Unknown,
}

pub struct ClientDispatcher {
    coin: &'static CoinInfo,
    op_timeout: Duration,
    slots: Vec<NodeSlot>,
    cursor: AtomicUsize,
    consumers: RwLock<Vec<Arc<dyn WorkConsumer>>>,
    best_tip: Mutex<Option<NodeStatus>>,
}

impl ClientDispatcher {
    pub fn new(coin: &'static CoinInfo) -> Self {
        Self::with_timeout(coin, DEFAULT_OP_TIMEOUT)
    }

    pub fn with_timeout(coin: &'static CoinInfo, op_timeout: Duration) -> Self {
        Self {
            coin,
            op_timeout,
            slots: Vec::new(),
            cursor: AtomicUsize::new(0),
            consumers: RwLock::new(Vec::new()),
            best_tip: Mutex::new(None),
        }
    }

    pub fn coin(&self) -> &'static CoinInfo {
        self.coin
    }

    /// Registers a node client. Called during wiring, before the dispatcher
    /// is shared.
    pub fn add_client(&mut self, client: Arc<dyn NodeClient>) {
        self.slots.push(NodeSlot::new(client));
    }

    /// Subscribes a mining front end to new-work notifications.
    pub fn connect_with(&self, consumer: Arc<dyn WorkConsumer>) {
        self.consumers.write().unwrap().push(consumer);
    }

    pub fn health_report(&self) -> Vec<NodeHealthReport> {
        self.slots
            .iter()
            .map(|slot| NodeHealthReport {
                url: slot.client.url().to_owned(),
                health: slot.health(),
                height: slot.last_height.load(Ordering::Relaxed),
                last_success_secs: slot
                    .last_success
                    .lock()
                    .unwrap()
                    .map(|at| at.elapsed().as_secs()),
            })
            .collect()
    }

    /// Spawns the background liveness poll.
    pub fn poll(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let dispatcher = Arc::clone(self);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                dispatcher.poll_once().await;
            }
        })
    }

    /// One liveness sweep: pings every node, refreshes health marks, and
    /// notifies consumers when the best healthy tip advanced.
    pub async fn poll_once(&self) {
        let mut best: Option<NodeStatus> = None;

        for slot in &self.slots {
            match timeout(self.op_timeout, slot.client.status()).await {
                Ok(Ok(status)) => {
                    let was = slot.set_health(NodeHealth::Healthy);
                    slot.record_success();
                    slot.last_height.store(status.height, Ordering::Relaxed);

                    if was == NodeHealth::Unreachable {
                        info!(coin = self.coin.name, url = slot.client.url(), "node recovered");
                    }

                    if best.as_ref().map(|b| status.height > b.height).unwrap_or(true) {
                        best = Some(status);
                    }
                }
                Ok(Err(err)) => {
                    let was = slot.set_health(NodeHealth::Unreachable);
                    if was != NodeHealth::Unreachable {
                        warn!(
                            coin = self.coin.name,
                            url = slot.client.url(),
                            %err,
                            "node went unreachable"
                        );
                    }
                }
                Err(_) => {
                    let was = slot.set_health(NodeHealth::Unreachable);
                    if was != NodeHealth::Unreachable {
                        warn!(
                            coin = self.coin.name,
                            url = slot.client.url(),
                            "node liveness query timed out"
                        );
                    }
                }
            }
        }

        metrics::gauge!("dispatcher_healthy_nodes", "coin" => self.coin.name).set(
            self.slots
                .iter()
                .filter(|slot| slot.health() == NodeHealth::Healthy)
                .count() as f64,
        );

        if let Some(status) = best {
            let advanced = {
                let mut tip = self.best_tip.lock().unwrap();
                if tip.as_ref() != Some(&status) {
                    *tip = Some(status.clone());
                    true
                } else {
                    false
                }
            };

            if advanced {
                metrics::counter!("dispatcher_work_notifications_total", "coin" => self.coin.name)
                    .increment(1);
                self.notify(&WorkNotification {
                    coin: self.coin.name,
                    height: status.height,
                    best_hash: status.best_hash,
                });
            }
        }
    }

    fn notify(&self, work: &WorkNotification) {
        for consumer in self.consumers.read().unwrap().iter() {
            consumer.on_new_work(work);
        }
    }

    // === read path ===

    pub async fn get_block_template(&self) -> Result<BlockTemplate> {
        self.dispatch("get_block_template", |client| async move {
            client.get_block_template().await
        })
        .await
    }

    pub async fn submit_block(&self, data: &str) -> Result<()> {
        let data = data.to_owned();
        self.dispatch("submit_block", move |client| {
            let data = data.clone();
            async move { client.submit_block(&data).await }
        })
        .await
    }

    pub async fn get_wallet_balance(&self) -> Result<WalletBalance> {
        self.dispatch("get_wallet_balance", |client| async move {
            client.get_wallet_balance().await
        })
        .await
    }

    pub async fn get_block_confirmations(
        &self,
        queries: Vec<ConfirmationQuery>,
    ) -> Result<Vec<ConfirmationQuery>> {
        self.dispatch("get_block_confirmations", move |client| {
            let mut queries = queries.clone();
            async move {
                client.get_block_confirmations(&mut queries).await?;
                Ok(queries)
            }
        })
        .await
    }

    pub async fn query_payout(&self, id: uuid::Uuid) -> Result<Option<SendResult>> {
        self.dispatch("query_payout", move |client| async move {
            client.query_payout(id).await
        })
        .await
    }

    /// Failover read dispatch. First pass walks Healthy nodes from a
    /// round-robin cursor; if that exhausts the set, every node not yet
    /// tried this call gets one recovery attempt (a node may have come back
    /// since the last poll).
    async fn dispatch<T, F, Fut>(&self, op: &'static str, operation: F) -> Result<T>
    where
        F: Fn(Arc<dyn NodeClient>) -> Fut,
        Fut: Future<Output = NodeResult<T>>,
    {
        let total = self.slots.len();
        if total == 0 {
            return Err(PoolError::NodeUnavailable {
                coin: self.coin.name.to_owned(),
            });
        }

        let mut tried = vec![false; total];
        let mut rejection: Option<NodeError> = None;
        let mut attempts = 0usize;
        let mut timed_out = 0usize;

        let start = self.cursor.fetch_add(1, Ordering::Relaxed) % total;
        for offset in 0..total {
            let index = (start + offset) % total;
            if self.slots[index].health() != NodeHealth::Healthy {
                continue;
            }

            tried[index] = true;
            attempts += 1;
            match self.attempt(index, op, &operation).await {
                Attempt::Success(value) => return Ok(value),
                Attempt::Transient { timed_out: t } => timed_out += t as usize,
                Attempt::Rejected(err) => rejection = Some(err),
            }
        }

        for index in 0..total {
            if tried[index] {
                continue;
            }

            attempts += 1;
            match self.attempt(index, op, &operation).await {
                Attempt::Success(value) => return Ok(value),
                Attempt::Transient { timed_out: t } => timed_out += t as usize,
                Attempt::Rejected(err) => rejection = Some(err),
            }
        }

        if let Some(err) = rejection {
            return Err(PoolError::Rejected {
                message: err.to_string(),
            });
        }
        if attempts > 0 && timed_out == attempts {
            return Err(PoolError::Timeout {
                timeout: self.op_timeout,
            });
        }
        Err(PoolError::NodeUnavailable {
            coin: self.coin.name.to_owned(),
        })
    }

    async fn attempt<T, F, Fut>(&self, index: usize, op: &'static str, operation: &F) -> Attempt<T>
    where
        F: Fn(Arc<dyn NodeClient>) -> Fut,
        Fut: Future<Output = NodeResult<T>>,
    {
        let slot = &self.slots[index];

        match timeout(self.op_timeout, operation(Arc::clone(&slot.client))).await {
            Ok(Ok(value)) => {
                slot.set_health(NodeHealth::Healthy);
                slot.record_success();
                Attempt::Success(value)
            }
            Ok(Err(err)) if err.is_transient() => {
                warn!(coin = self.coin.name, url = slot.client.url(), op, %err, "node call failed");
                slot.set_health(NodeHealth::Unreachable);
                Attempt::Transient {
                    timed_out: matches!(err, NodeError::Timeout { .. }),
                }
            }
            Ok(Err(err)) => {
                warn!(coin = self.coin.name, url = slot.client.url(), op, %err, "node rejected call");
                slot.set_health(NodeHealth::Unreachable);
                Attempt::Rejected(err)
            }
            Err(_) => {
                warn!(coin = self.coin.name, url = slot.client.url(), op, "node call timed out");
                slot.set_health(NodeHealth::Unreachable);
                Attempt::Transient { timed_out: true }
            }
        }
    }

    // === mutating path ===

    /// Broadcasts a payout to exactly one node per logical call. An
    /// ambiguous transport failure (the node may have accepted the
    /// broadcast before dying) is resolved through a wallet lookup before
    /// any other node is tried; only the suspect node's own wallet counts
    /// as proof that nothing was sent.
    pub async fn send_payout(&self, payment: &Payment) -> Result<SendResult> {
        let total = self.slots.len();
        if total == 0 {
            return Err(PoolError::NodeUnavailable {
                coin: self.coin.name.to_owned(),
            });
        }

        let healths: Vec<NodeHealth> = self.slots.iter().map(NodeSlot::health).collect();
        let mut order: Vec<usize> = (0..total)
            .filter(|&i| healths[i] == NodeHealth::Healthy)
            .collect();
        order.extend((0..total).filter(|&i| healths[i] != NodeHealth::Healthy));

        for index in order {
            let slot = &self.slots[index];

            match timeout(self.op_timeout, slot.client.send_transaction(payment)).await {
                Ok(Ok(result)) => {
                    slot.set_health(NodeHealth::Healthy);
                    slot.record_success();
                    debug!(
                        coin = self.coin.name,
                        payout = %payment.id,
                        txid = %result.txid,
                        "payout broadcast"
                    );
                    return Ok(result);
                }
                Ok(Err(NodeError::Rejected { message, .. })) => {
                    // Definite refusal; nothing was broadcast anywhere.
                    return Err(PoolError::Rejected { message });
                }
                _ => {
                    slot.set_health(NodeHealth::Unreachable);
                    match self.resolve_payout(payment.id, index).await {
                        Resolution::Found(result) => {
                            info!(
                                coin = self.coin.name,
                                payout = %payment.id,
                                txid = %result.txid,
                                "ambiguous broadcast resolved as sent"
                            );
                            return Ok(result);
                        }
                        Resolution::NotSent => continue,
                        Resolution::Unknown => {
                            warn!(
                                coin = self.coin.name,
                                payout = %payment.id,
                                "broadcast outcome unresolved, deferring to next tick"
                            );
                            return Err(PoolError::Timeout {
                                timeout: self.op_timeout,
                            });
                        }
                    }
                }
            }
        }

        Err(PoolError::NodeUnavailable {
            coin: self.coin.name.to_owned(),
        })
    }

    async fn resolve_payout(&self, id: uuid::Uuid, suspect: usize) -> Resolution {
        // The suspect's wallet is the only authority for a definitive
        // "never sent" answer.
        match timeout(self.op_timeout, self.slots[suspect].client.query_payout(id)).await {
            Ok(Ok(Some(result))) => return Resolution::Found(result),
            Ok(Ok(None)) => return Resolution::NotSent,
            _ => {}
        }

        // Other nodes can still prove presence once the tx propagated.
        for (index, slot) in self.slots.iter().enumerate() {
            if index == suspect {
                continue;
            }
            if let Ok(Ok(Some(result))) = timeout(self.op_timeout, slot.client.query_payout(id)).await
            {
                return Resolution::Found(result);
            }
        }

        Resolution::Unknown
    }
}

impl std::fmt::Debug for ClientDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientDispatcher")
            .field("coin", &self.coin.name)
            .field("nodes", &self.slots.len())
            .finish()
    }
}
