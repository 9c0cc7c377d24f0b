mod common;

use std::sync::Arc;
use std::time::Duration;

use orepool_backend::backend::{CoinBackend, FoundBlock, Share};
use orepool_backend::dispatcher::ClientDispatcher;
use orepool_backend::node::mock::MockNode;
use orepool_model::entities::rounds::{self, RoundState};
use orepool_model::entities::shares;

fn share(miner: &str, weight: u64) -> Share {
    Share {
        miner_id: miner.to_owned(),
        weight,
    }
}

fn block(hash: &str, height: i64, reward: i64) -> FoundBlock {
    FoundBlock {
        hash: hash.to_owned(),
        height,
        reward,
        found_by: "miner-a".to_owned(),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_crediting_loses_no_share() {
    let h = common::harness(1, vec![]).await;

    let mut joins = Vec::new();
    for task in 0..8u64 {
        let backend = Arc::clone(&h.backend);
        joins.push(tokio::spawn(async move {
            for _ in 0..50 {
                let accepted = backend.credit_share(share(&format!("miner-{}", task % 4), 10));
                assert!(accepted);
            }
        }));
    }
    for join in joins {
        join.await.expect("crediting task");
    }

    let stats = h.backend.pool_stats();
    assert_eq!(stats.round_weight, 8 * 50 * 10);
    assert_eq!(stats.active_miners, 4);
    assert_eq!(stats.shares_accepted, 400);

    // Closing the round flushes the share log; ledger and accumulator must
    // agree exactly.
    let round_id = stats.round_id;
    h.backend
        .report_found_block(block("blk-1", 101, 100_000))
        .await
        .expect("round transition");

    let weights = shares::Model::weights_for_round(&h.database.connection, round_id)
        .await
        .expect("weights");
    let total: i64 = weights.iter().map(|(_, weight)| weight).sum();
    assert_eq!(total, 4_000);

    let round = rounds::Model::by_id(&h.database.connection, round_id)
        .await
        .expect("query")
        .expect("round persisted");
    assert_eq!(round.state, RoundState::PendingConfirmation);
    assert_eq!(round.total_weight, 4_000);
    assert_eq!(round.block_hash.as_deref(), Some("blk-1"));
}

#[tokio::test]
async fn round_matures_only_at_required_depth_and_pays_exactly_once() {
    let h = common::harness(1, vec![]).await;

    for _ in 0..30 {
        h.backend.credit_share(share("alice", 1));
    }
    for _ in 0..70 {
        h.backend.credit_share(share("bob", 1));
    }

    let round_id = h.backend.pool_stats().round_id;
    h.backend
        .report_found_block(block("blk-a", 200, 100))
        .await
        .expect("round transition");

    // H+1 .. H+9: stays pending, nobody is paid.
    for depth in [0, 1, 5, 9] {
        h.nodes[0].set_confirmations("blk-a", depth);
        h.backend.run_confirmation_check().await.expect("tick");

        let round = rounds::Model::by_id(&h.database.connection, round_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(round.state, RoundState::PendingConfirmation, "at depth {depth}");
        assert_eq!(h.backend.miner_balance("alice").await.unwrap().confirmed, 0);
    }

    // H+10: matured, the 30/70 split of 100 is exact.
    h.nodes[0].set_confirmations("blk-a", 10);
    h.backend.run_confirmation_check().await.expect("tick");

    let round = rounds::Model::by_id(&h.database.connection, round_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(round.state, RoundState::Paid);
    assert_eq!(h.backend.miner_balance("alice").await.unwrap().confirmed, 30);
    assert_eq!(h.backend.miner_balance("bob").await.unwrap().confirmed, 70);

    // A second tick must not double-credit.
    h.backend.run_confirmation_check().await.expect("tick");
    assert_eq!(h.backend.miner_balance("alice").await.unwrap().confirmed, 30);
    assert_eq!(h.backend.miner_balance("bob").await.unwrap().confirmed, 70);
}

#[tokio::test]
async fn late_shares_credit_the_next_round_and_leave_the_split_frozen() {
    let h = common::harness(1, vec![]).await;

    h.backend.credit_share(share("alice", 30));
    h.backend.credit_share(share("bob", 70));

    h.backend
        .report_found_block(block("blk-b", 300, 100))
        .await
        .expect("round transition");

    // Arrives tagged to a since-closed round: lands in the new Open round.
    h.backend.credit_share(share("carol", 50));
    let stats = h.backend.pool_stats();
    assert_eq!(stats.round_weight, 50);

    h.nodes[0].set_confirmations("blk-b", 10);
    h.backend.run_confirmation_check().await.expect("tick");

    assert_eq!(h.backend.miner_balance("alice").await.unwrap().confirmed, 30);
    assert_eq!(h.backend.miner_balance("bob").await.unwrap().confirmed, 70);
    assert_eq!(h.backend.miner_balance("carol").await.unwrap().confirmed, 0);
}

#[tokio::test]
async fn found_block_already_orphaned_goes_straight_to_orphaned() {
    let h = common::harness(1, vec![]).await;

    h.backend.credit_share(share("alice", 10));

    let round_id = h.backend.pool_stats().round_id;
    // The mock never learns this hash: the very first confirmation query
    // reports the block as gone.
    h.backend
        .report_found_block(block("blk-gone", 400, 100))
        .await
        .expect("round transition");
    h.backend.run_confirmation_check().await.expect("tick");

    let round = rounds::Model::by_id(&h.database.connection, round_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(round.state, RoundState::Orphaned);
    assert_eq!(h.backend.miner_balance("alice").await.unwrap().confirmed, 0);
}

#[tokio::test]
async fn restart_rebuilds_the_open_round_from_the_ledger() {
    let h = common::harness(1, vec![]).await;

    h.backend.credit_share(share("alice", 30));
    h.backend.credit_share(share("bob", 12));

    let before = h.backend.pool_stats();
    h.backend.stop().await; // flushes the share log

    // A fresh backend over the same ledger must replay identical state.
    let revived = CoinBackend::new(
        common::rgt(),
        common::test_config(vec![]),
        Arc::clone(&h.dispatcher),
        Arc::clone(&h.database),
    )
    .await
    .expect("recovered backend");

    let after = revived.pool_stats();
    assert_eq!(after.round_id, before.round_id);
    assert_eq!(after.round_weight, 42);
    assert_eq!(
        revived.miner_balance("alice").await.unwrap().round_weight,
        30
    );
    assert_eq!(revived.miner_balance("bob").await.unwrap().round_weight, 12);
}

#[tokio::test]
async fn statistics_windows_are_written_and_queryable() {
    let h = common::harness(1, vec![]).await;

    for _ in 0..5 {
        h.backend.credit_share(share("alice", 8));
    }
    // Flush through a round transition, then aggregate.
    h.backend
        .report_found_block(block("blk-s", 500, 100))
        .await
        .expect("round transition");
    h.backend.run_statistics().await.expect("statistics tick");

    let windows = h.backend.miner_stats("alice", 10).await.expect("stats");
    assert_eq!(windows.len(), 1);
    assert_eq!(windows[0].shares, 5);
    assert_eq!(windows[0].weight, 40);
}

#[tokio::test]
async fn expired_rounds_are_garbage_collected_with_their_shares() {
    let database = common::test_database().await;
    let node = Arc::new(MockNode::new("gc-node"));
    let mut dispatcher = ClientDispatcher::with_timeout(common::rgt(), Duration::from_secs(2));
    dispatcher.add_client(node.clone());
    let dispatcher = Arc::new(dispatcher);

    let mut config = common::test_config(vec![]);
    config.keep_round_time = Duration::ZERO;

    let backend = CoinBackend::new(common::rgt(), config, dispatcher, Arc::clone(&database))
        .await
        .expect("backend");
    backend.start();

    backend.credit_share(share("alice", 10));
    let round_id = backend.pool_stats().round_id;

    backend
        .report_found_block(block("blk-gc", 600, 100))
        .await
        .expect("round transition");
    node.set_confirmations("blk-gc", 10);
    backend.run_confirmation_check().await.expect("tick");

    tokio::time::sleep(Duration::from_millis(20)).await;
    backend.run_round_gc().await.expect("gc tick");

    let round = rounds::Model::by_id(&database.connection, round_id)
        .await
        .expect("query");
    assert!(round.is_none(), "paid round past retention must be dropped");

    let weights = shares::Model::weights_for_round(&database.connection, round_id)
        .await
        .expect("query");
    assert!(weights.is_empty(), "its shares must be dropped too");
}
