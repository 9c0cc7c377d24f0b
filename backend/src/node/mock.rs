//! Scriptable in-memory node used by the test suites. Behaves like a
//! bitcoin daemon with a wallet: liveness, tip, confirmation depths and
//! broadcast outcomes are all controllable from the test.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};

use async_trait::async_trait;
use serde_json::json;
use uuid::Uuid;

use crate::coin::Amount;
use crate::node::{
    BlockTemplate, ConfirmationQuery, NodeClient, NodeError, NodeResult, NodeStatus, Payment,
    SendResult, WalletBalance,
};

/// Scripted outcome for the next `send_transaction` call.
#[derive(Debug, Clone)]
pub enum SendOutcome {
    Accept,
    Reject(String),
    /// The caller sees a transport error but the node accepted the
    /// broadcast — the ambiguous case the dispatcher must resolve.
    AmbiguousAccept,
    /// Transport error, nothing broadcast.
    Drop,
}

#[derive(Debug)]
pub struct MockNode {
    url: String,
    alive: AtomicBool,
    height: AtomicI64,
    best_hash: Mutex<String>,
    wallet: Mutex<WalletBalance>,
    confirmations: Mutex<HashMap<String, i64>>,
    send_plan: Mutex<VecDeque<SendOutcome>>,
    sent: Mutex<Vec<(Payment, SendResult)>>,
    submitted: Mutex<Vec<String>>,
    calls: AtomicU64,
}

impl MockNode {
    pub fn new(name: &str) -> Self {
        Self {
            url: format!("mock://{name}"),
            alive: AtomicBool::new(true),
            height: AtomicI64::new(100),
            best_hash: Mutex::new("tip-100".to_owned()),
            wallet: Mutex::new(WalletBalance::default()),
            confirmations: Mutex::new(HashMap::new()),
            send_plan: Mutex::new(VecDeque::new()),
            sent: Mutex::new(Vec::new()),
            submitted: Mutex::new(Vec::new()),
            calls: AtomicU64::new(0),
        }
    }

    pub fn set_alive(&self, alive: bool) {
        self.alive.store(alive, Ordering::SeqCst);
    }

    pub fn set_tip(&self, height: i64, hash: &str) {
        self.height.store(height, Ordering::SeqCst);
        *self.best_hash.lock().unwrap() = hash.to_owned();
    }

    pub fn set_wallet(&self, spendable: Amount, immature: Amount) {
        *self.wallet.lock().unwrap() = WalletBalance {
            spendable,
            immature,
        };
    }

    pub fn set_confirmations(&self, hash: &str, confirmations: i64) {
        self.confirmations
            .lock()
            .unwrap()
            .insert(hash.to_owned(), confirmations);
    }

    /// Forgets a block entirely; subsequent queries see it as orphaned.
    pub fn drop_block(&self, hash: &str) {
        self.confirmations.lock().unwrap().remove(hash);
    }

    pub fn script_send(&self, outcome: SendOutcome) {
        self.send_plan.lock().unwrap().push_back(outcome);
    }

    pub fn sent_payments(&self) -> Vec<(Payment, SendResult)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn submitted_blocks(&self) -> Vec<String> {
        self.submitted.lock().unwrap().clone()
    }

    /// Total RPC attempts against this node, dead or alive.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    fn touch(&self) -> NodeResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.alive.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(NodeError::Unreachable {
                message: "connection refused".to_owned(),
            })
        }
    }

    /// Marks every broadcast payment as buried `confirmations` deep.
    pub fn confirm_all_sends(&self, confirmations: i64) {
        for (_, result) in self.sent.lock().unwrap().iter_mut() {
            result.confirmations = confirmations;
        }
    }

    /// Makes the wallet forget a broadcast payment, as a conflicted
    /// transaction would vanish.
    pub fn forget_payment(&self, id: Uuid) {
        self.sent.lock().unwrap().retain(|(payment, _)| payment.id != id);
    }

    fn accept(&self, payment: &Payment) -> SendResult {
        let result = SendResult {
            txid: format!("tx-{}", payment.id.simple()),
            fee: 100,
            confirmations: 0,
        };
        self.sent
            .lock()
            .unwrap()
            .push((payment.clone(), result.clone()));

        result
    }
}

#[async_trait]
impl NodeClient for MockNode {
    fn url(&self) -> &str {
        &self.url
    }

    async fn status(&self) -> NodeResult<NodeStatus> {
        self.touch()?;

        Ok(NodeStatus {
            height: self.height.load(Ordering::SeqCst),
            best_hash: self.best_hash.lock().unwrap().clone(),
        })
    }

    async fn get_block_template(&self) -> NodeResult<BlockTemplate> {
        self.touch()?;
        let height = self.height.load(Ordering::SeqCst);

        Ok(BlockTemplate {
            height: height + 1,
            previous_hash: self.best_hash.lock().unwrap().clone(),
            coinbase_value: 50 * 100_000_000,
            target: "00000000ffff0000000000000000000000000000000000000000000000000000"
                .to_owned(),
            raw: json!({}),
        })
    }

    async fn submit_block(&self, data: &str) -> NodeResult<()> {
        self.touch()?;
        self.submitted.lock().unwrap().push(data.to_owned());

        Ok(())
    }

    async fn get_wallet_balance(&self) -> NodeResult<WalletBalance> {
        self.touch()?;

        Ok(*self.wallet.lock().unwrap())
    }

    async fn get_block_confirmations(&self, queries: &mut [ConfirmationQuery]) -> NodeResult<()> {
        self.touch()?;

        let confirmations = self.confirmations.lock().unwrap();
        for query in queries {
            query.confirmations = Some(confirmations.get(&query.hash).copied().unwrap_or(-1));
        }

        Ok(())
    }

    async fn send_transaction(&self, payment: &Payment) -> NodeResult<SendResult> {
        self.touch()?;

        let outcome = self
            .send_plan
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(SendOutcome::Accept);

        match outcome {
            SendOutcome::Accept => Ok(self.accept(payment)),
            SendOutcome::Reject(message) => Err(NodeError::Rejected {
                code: Some(-6),
                message,
            }),
            SendOutcome::AmbiguousAccept => {
                self.accept(payment);
                Err(NodeError::Unreachable {
                    message: "connection reset during broadcast".to_owned(),
                })
            }
            SendOutcome::Drop => Err(NodeError::Unreachable {
                message: "connection reset".to_owned(),
            }),
        }
    }

    async fn query_payout(&self, id: Uuid) -> NodeResult<Option<SendResult>> {
        self.touch()?;

        let sent = self.sent.lock().unwrap();
        Ok(sent
            .iter()
            .find(|(payment, _)| payment.id == id)
            .map(|(_, result)| result.clone()))
    }
}
