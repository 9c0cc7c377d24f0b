use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PoolError>;

/// Error taxonomy of the coin-backend engine.
///
/// Transient chain errors never escape the dispatcher's failover loop; a
/// timer tick only ever observes the first three variants for chain I/O.
/// Financial invariant violations halt the affected coin's payout path and
/// nothing else.
#[derive(Error, Debug)]
pub enum PoolError {
    #[error("all nodes unavailable for {coin}")]
    NodeUnavailable { coin: String },

    #[error("node rejected operation: {message}")]
    Rejected { message: String },

    #[error("chain operation timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("ledger write failed: {message}")]
    Database {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error(
        "balance reconciliation mismatch for {coin}: ledger requires {required}, wallet holds {observed}"
    )]
    ReconciliationMismatch {
        coin: String,
        required: i64,
        observed: i64,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("internal error: {message}")]
    Internal { message: String },
}

/// Configuration problems; all fatal at startup only.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("unknown coin: {name}")]
    UnknownCoin { name: String },

    #[error("coin {name} is configured more than once")]
    DuplicateCoin { name: String },

    #[error("coin {coin} has no node endpoints")]
    NoNodes { coin: String },

    #[error("unknown node type: {kind}")]
    UnknownNodeKind { kind: String },

    #[error("invalid pool fee address for {coin}: {address}")]
    InvalidFeeAddress { coin: String, address: String },

    #[error("pool fee percentages for {coin} sum to {total}, must not exceed 100")]
    FeeOverflow { coin: String, total: f32 },

    #[error("can't parse money value '{value}' in field {field}")]
    InvalidMoney { field: String, value: String },

    #[error("field {field} must not be zero")]
    ZeroInterval { field: String },

    #[error("missing required field: {field}")]
    MissingField { field: String },

    #[error("can't read config file: {message}")]
    Unreadable { message: String },

    #[error("config file is not valid TOML: {message}")]
    Malformed { message: String },
}

impl From<orepool_model::Error> for PoolError {
    fn from(err: orepool_model::Error) -> Self {
        PoolError::Database {
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }
}

impl From<sea_orm::DbErr> for PoolError {
    fn from(err: sea_orm::DbErr) -> Self {
        PoolError::Database {
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }
}
