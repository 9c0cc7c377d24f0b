//! Chain-node capability layer.
//!
//! [`NodeClient`] is the full set of operations the engine needs from one
//! blockchain daemon. The dispatcher and backend depend only on this trait;
//! each RPC dialect gets its own implementation ([`bitcoin::BitcoinRpcClient`]
//! for bitcoin-core-style JSON-RPC, [`mock::MockNode`] for tests).

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::coin::Amount;

pub mod bitcoin;
pub mod mock;

pub type NodeResult<T> = std::result::Result<T, NodeError>;

/// A single node call's failure. Everything but `Rejected` is transient and
/// legal to fail over; `Rejected` means the node understood the request and
/// refused it.
#[derive(Error, Debug, Clone)]
pub enum NodeError {
    #[error("node unreachable: {message}")]
    Unreachable { message: String },

    #[error("node request timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("malformed node response: {message}")]
    Malformed { message: String },

    #[error("node rejected request: {message}")]
    Rejected { code: Option<i64>, message: String },
}

impl NodeError {
    pub fn is_transient(&self) -> bool {
        !matches!(self, NodeError::Rejected { .. })
    }
}

/// Lightweight liveness answer; also carries the node's view of the tip so
/// the dispatcher can fan out new-work notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeStatus {
    pub height: i64,
    pub best_hash: String,
}

/// Work template for the mining front ends.
#[derive(Debug, Clone, Serialize)]
pub struct BlockTemplate {
    pub height: i64,
    pub previous_hash: String,
    /// Total coinbase value (subsidy + fees) in fractional units.
    pub coinbase_value: Amount,
    pub target: String,
    /// Dialect-specific remainder of the template, passed through untouched.
    pub raw: serde_json::Value,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct WalletBalance {
    pub spendable: Amount,
    pub immature: Amount,
}

/// One block-depth query; `confirmations` is filled in by the node client.
/// A negative answer means the chain no longer contains the block.
#[derive(Debug, Clone)]
pub struct ConfirmationQuery {
    pub hash: String,
    pub height: i64,
    pub confirmations: Option<i64>,
}

impl ConfirmationQuery {
    pub fn new(hash: impl Into<String>, height: i64) -> Self {
        Self {
            hash: hash.into(),
            height,
            confirmations: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentOutput {
    pub address: String,
    pub amount: Amount,
}

/// A payout broadcast request. The id is attached to the wallet transaction
/// (comment/label) so an ambiguous broadcast can later be found again.
#[derive(Debug, Clone)]
pub struct Payment {
    pub id: Uuid,
    pub outputs: Vec<PaymentOutput>,
}

impl Payment {
    pub fn single(id: Uuid, address: impl Into<String>, amount: Amount) -> Self {
        Self {
            id,
            outputs: vec![PaymentOutput {
                address: address.into(),
                amount,
            }],
        }
    }

    pub fn total(&self) -> Amount {
        self.outputs.iter().map(|out| out.amount).sum()
    }
}

/// Wallet-side view of a broadcast payout transaction. Right after a send
/// the depth is zero; `query_payout` reports the current depth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendResult {
    pub txid: String,
    pub fee: Amount,
    pub confirmations: i64,
}

/// Everything the engine asks of one blockchain daemon.
#[async_trait]
pub trait NodeClient: Send + Sync + fmt::Debug {
    /// Endpoint identity for logs and health reporting.
    fn url(&self) -> &str;

    async fn status(&self) -> NodeResult<NodeStatus>;

    async fn get_block_template(&self) -> NodeResult<BlockTemplate>;

    async fn submit_block(&self, data: &str) -> NodeResult<()>;

    async fn get_wallet_balance(&self) -> NodeResult<WalletBalance>;

    /// Fills `confirmations` for every query in place.
    async fn get_block_confirmations(&self, queries: &mut [ConfirmationQuery]) -> NodeResult<()>;

    async fn send_transaction(&self, payment: &Payment) -> NodeResult<SendResult>;

    /// Looks the payment up by its label in the node's wallet. `Ok(None)` is
    /// a definitive "this wallet never broadcast it".
    async fn query_payout(&self, id: Uuid) -> NodeResult<Option<SendResult>>;
}
