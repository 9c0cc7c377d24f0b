#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use orepool_backend::backend::CoinBackend;
use orepool_backend::coin::CoinInfo;
use orepool_backend::config::{BackendConfig, PoolFeeEntry};
use orepool_backend::dispatcher::ClientDispatcher;
use orepool_backend::node::mock::MockNode;
use orepool_backend::services::database::DatabaseService;

pub fn rgt() -> &'static CoinInfo {
    CoinInfo::for_name("RGT").expect("regtest coin is registered")
}

/// Conservative config for driving ticks manually; the background timers
/// fire once at start and then stay out of the way for an hour.
pub fn test_config(fees: Vec<PoolFeeEntry>) -> BackendConfig {
    BackendConfig {
        required_confirmations: 10,
        keep_round_time: Duration::from_secs(3600),
        keep_stats_time: Duration::from_secs(3600),
        confirmations_check_interval: Duration::from_secs(3600),
        payout_interval: Duration::from_secs(3600),
        balance_check_interval: Duration::from_secs(3600),
        statistic_check_interval: Duration::from_secs(3600),
        default_payout_threshold: 1_000,
        minimal_allowed_payout: 100,
        pool_fee: fees,
    }
}

pub async fn test_database() -> Arc<DatabaseService> {
    let database = DatabaseService::new_with_options("sqlite::memory:", 1, 1)
        .await
        .expect("in-memory ledger");
    database.migrate().await.expect("migrations");

    Arc::new(database)
}

pub struct Harness {
    pub backend: Arc<CoinBackend>,
    pub dispatcher: Arc<ClientDispatcher>,
    pub database: Arc<DatabaseService>,
    pub nodes: Vec<Arc<MockNode>>,
}

pub async fn harness(node_count: usize, fees: Vec<PoolFeeEntry>) -> Harness {
    let database = test_database().await;

    let nodes: Vec<Arc<MockNode>> = (0..node_count)
        .map(|index| Arc::new(MockNode::new(&format!("node-{index}"))))
        .collect();

    let mut dispatcher = ClientDispatcher::with_timeout(rgt(), Duration::from_secs(2));
    for node in &nodes {
        dispatcher.add_client(node.clone());
    }
    let dispatcher = Arc::new(dispatcher);

    let backend = CoinBackend::new(
        rgt(),
        test_config(fees),
        Arc::clone(&dispatcher),
        Arc::clone(&database),
    )
    .await
    .expect("backend");
    backend.start();

    Harness {
        backend,
        dispatcher,
        database,
        nodes,
    }
}
