//! # Orepool Backend
//!
//! The coin-backend engine of a multi-coin mining pool:
//! - **Node layer**: a [`node::NodeClient`] capability per chain daemon,
//!   with a bitcoin-core JSON-RPC reference implementation
//! - **Dispatcher**: per-coin failover over redundant nodes with liveness
//!   polling and work-notification fan-out to mining front ends
//! - **Backend**: the per-coin financial state machine — lock-free share
//!   crediting, round lifecycle, confirmation tracking, balance
//!   reconciliation and automated payouts on independent timers
//! - **Ledger**: SeaORM-backed durable state (shares, rounds, balances,
//!   payouts); in-memory counters are caches rebuilt from it on restart
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use orepool_backend::coin::CoinInfo;
//! use orepool_backend::dispatcher::ClientDispatcher;
//! use orepool_backend::node::mock::MockNode;
//! use orepool_backend::services::database::DatabaseService;
//! use orepool_backend::{CoinBackend, backend::Share};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let coin = CoinInfo::for_name("RGT").expect("registered coin");
//!     let database = Arc::new(DatabaseService::new("sqlite::memory:").await?);
//!     database.migrate().await?;
//!
//!     let mut dispatcher = ClientDispatcher::new(coin);
//!     dispatcher.add_client(Arc::new(MockNode::new("node-a")));
//!     let dispatcher = Arc::new(dispatcher);
//!
//!     let backend = CoinBackend::new(
//!         coin,
//!         orepool_backend::Config::example().coins[0].to_backend_config()?,
//!         dispatcher,
//!         database,
//!     )
//!     .await?;
//!     backend.start();
//!
//!     backend.credit_share(Share {
//!         miner_id: "miner-address".into(),
//!         weight: 1024,
//!     });
//!
//!     Ok(())
//! }
//! ```

/// Open-round accumulator and the frozen reward split
pub mod accounting;

/// Per-coin financial state machine
pub mod backend;

/// Command-line interface
pub mod cli;

/// Static coin metadata and money arithmetic
pub mod coin;

/// TOML configuration with startup validation
pub mod config;

/// Per-coin node dispatcher with failover
pub mod dispatcher;

/// Typed error taxonomy
pub mod error;

/// Chain-node capability trait and implementations
pub mod node;

/// Database and read-only API services
pub mod services;

pub use backend::CoinBackend;
pub use config::Config;
pub use dispatcher::ClientDispatcher;
pub use error::{ConfigError, PoolError, Result};
