mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use orepool_backend::dispatcher::{ClientDispatcher, WorkConsumer, WorkNotification};
use orepool_backend::error::PoolError;
use orepool_backend::node::mock::{MockNode, SendOutcome};
use orepool_backend::node::Payment;
use uuid::Uuid;

fn dispatcher_with(nodes: &[Arc<MockNode>]) -> Arc<ClientDispatcher> {
    let mut dispatcher = ClientDispatcher::with_timeout(common::rgt(), Duration::from_secs(2));
    for node in nodes {
        dispatcher.add_client(node.clone());
    }

    Arc::new(dispatcher)
}

fn three_nodes() -> Vec<Arc<MockNode>> {
    (0..3)
        .map(|i| Arc::new(MockNode::new(&format!("node-{i}"))))
        .collect()
}

#[tokio::test]
async fn single_healthy_node_serves_dispatch() {
    let nodes = three_nodes();
    nodes[0].set_alive(false);
    nodes[2].set_alive(false);

    let dispatcher = dispatcher_with(&nodes);
    dispatcher.poll_once().await;

    let template = dispatcher.get_block_template().await.expect("one node is up");
    assert_eq!(template.height, 101);
}

#[tokio::test]
async fn unreachable_node_is_not_called_while_a_healthy_one_exists() {
    let nodes = three_nodes();
    nodes[1].set_alive(false);

    let dispatcher = dispatcher_with(&nodes);
    dispatcher.poll_once().await;

    let dead_calls = nodes[1].calls();
    for _ in 0..8 {
        dispatcher.get_block_template().await.expect("healthy nodes");
    }

    assert_eq!(
        nodes[1].calls(),
        dead_calls,
        "unreachable node must not be dispatched to before a poll revives it"
    );
}

#[tokio::test]
async fn all_nodes_down_attempts_each_once_then_reports_unavailable() {
    let nodes = three_nodes();
    for node in &nodes {
        node.set_alive(false);
    }

    let dispatcher = dispatcher_with(&nodes);
    dispatcher.poll_once().await;

    let before: Vec<u64> = nodes.iter().map(|node| node.calls()).collect();

    let result = dispatcher.get_block_template().await;
    assert!(matches!(result, Err(PoolError::NodeUnavailable { .. })));

    // The recovery pass gives every node exactly one more chance.
    for (node, calls_before) in nodes.iter().zip(before) {
        assert_eq!(node.calls(), calls_before + 1);
    }
}

#[tokio::test]
async fn recovered_node_is_found_without_waiting_for_a_poll() {
    let nodes = three_nodes();
    for node in &nodes {
        node.set_alive(false);
    }

    let dispatcher = dispatcher_with(&nodes);
    dispatcher.poll_once().await;

    // One node comes back between polls; the recovery pass must find it.
    nodes[2].set_alive(true);

    dispatcher
        .get_block_template()
        .await
        .expect("recovered node serves the call");
}

#[tokio::test]
async fn ambiguous_broadcast_is_resolved_not_duplicated() {
    let nodes = three_nodes();
    nodes[0].script_send(SendOutcome::AmbiguousAccept);

    let dispatcher = dispatcher_with(&nodes);
    dispatcher.poll_once().await;

    let payment = Payment::single(Uuid::new_v4(), "miner-a", 5_000);
    let result = dispatcher.send_payout(&payment).await.expect("resolved");
    assert!(result.txid.starts_with("tx-"));

    let broadcasts: usize = nodes.iter().map(|node| node.sent_payments().len()).sum();
    assert_eq!(broadcasts, 1, "the payment must exist exactly once");
}

#[tokio::test]
async fn dropped_broadcast_fails_over_after_proof_of_absence() {
    let nodes = three_nodes();
    // The first node drops the broadcast on the floor; its wallet proves
    // nothing was sent, so the dispatcher may move to the next node.
    nodes[0].script_send(SendOutcome::Drop);

    let dispatcher = dispatcher_with(&nodes);
    dispatcher.poll_once().await;

    let payment = Payment::single(Uuid::new_v4(), "miner-a", 5_000);
    dispatcher.send_payout(&payment).await.expect("second node accepts");

    assert_eq!(nodes[0].sent_payments().len(), 0);
    let broadcasts: usize = nodes.iter().map(|node| node.sent_payments().len()).sum();
    assert_eq!(broadcasts, 1, "the payment must exist exactly once");
}

#[tokio::test]
async fn rejected_broadcast_aborts_without_failover() {
    let nodes = three_nodes();
    for node in &nodes {
        node.script_send(SendOutcome::Reject("insufficient funds".to_owned()));
    }

    let dispatcher = dispatcher_with(&nodes);
    dispatcher.poll_once().await;

    let payment = Payment::single(Uuid::new_v4(), "miner-a", 5_000);
    let result = dispatcher.send_payout(&payment).await;

    assert!(matches!(result, Err(PoolError::Rejected { .. })));
    let broadcasts: usize = nodes.iter().map(|node| node.sent_payments().len()).sum();
    assert_eq!(broadcasts, 0);
}

#[derive(Default)]
struct RecordingConsumer {
    seen: Mutex<Vec<WorkNotification>>,
}

impl WorkConsumer for RecordingConsumer {
    fn on_new_work(&self, work: &WorkNotification) {
        self.seen.lock().unwrap().push(work.clone());
    }
}

#[tokio::test]
async fn consumers_are_notified_on_new_tips_only() {
    let nodes = three_nodes();
    let dispatcher = dispatcher_with(&nodes);

    let consumer = Arc::new(RecordingConsumer::default());
    dispatcher.connect_with(consumer.clone());

    dispatcher.poll_once().await;
    assert_eq!(consumer.seen.lock().unwrap().len(), 1);

    // Same tip again: no duplicate notification.
    dispatcher.poll_once().await;
    assert_eq!(consumer.seen.lock().unwrap().len(), 1);

    for node in &nodes {
        node.set_tip(105, "tip-105");
    }
    dispatcher.poll_once().await;

    let seen = consumer.seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[1].height, 105);
    assert_eq!(seen[1].best_hash, "tip-105");
}
