mod common;

use orepool_backend::backend::Share;
use orepool_backend::error::PoolError;
use orepool_backend::node::mock::SendOutcome;
use orepool_model::entities::balances;
use orepool_model::entities::miners;
use orepool_model::entities::payouts::PayoutState;

#[tokio::test]
async fn payout_dispatches_once_debits_and_settles() {
    let h = common::harness(1, vec![]).await;
    let db = &h.database.connection;

    balances::Model::credit(db, "RGT", "alice", 5_000)
        .await
        .expect("seed balance");

    h.backend.run_payouts().await.expect("payout tick");

    let sent = h.nodes[0].sent_payments();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0.total(), 5_000);

    let balance = h.backend.miner_balance("alice").await.unwrap();
    assert_eq!(balance.confirmed, 0);
    assert_eq!(balance.pending, 5_000);

    let records = h.backend.payouts_for("alice", 10).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].state, PayoutState::Sent);
    assert!(records[0].txid.is_some());

    // A second tick must not dispatch again while one is in flight.
    h.backend.run_payouts().await.expect("payout tick");
    assert_eq!(h.nodes[0].sent_payments().len(), 1);

    // Once the transaction is mined the record finalizes and pending clears.
    h.nodes[0].confirm_all_sends(3);
    h.backend.run_payouts().await.expect("payout tick");

    let balance = h.backend.miner_balance("alice").await.unwrap();
    assert_eq!(balance.pending, 0);
    let records = h.backend.payouts_for("alice", 10).await.unwrap();
    assert_eq!(records[0].state, PayoutState::Confirmed);
    assert!(records[0].confirmed_at.is_some());
}

#[tokio::test]
async fn balances_below_threshold_or_override_are_not_paid() {
    let h = common::harness(1, vec![]).await;
    let db = &h.database.connection;

    // Under the coin default of 1000 units.
    balances::Model::credit(db, "RGT", "poor", 500)
        .await
        .expect("seed balance");

    // Over the default, but the miner raised their own threshold.
    balances::Model::credit(db, "RGT", "patient", 2_000)
        .await
        .expect("seed balance");
    let miner = miners::Model::first_or_create(db, "RGT", "patient")
        .await
        .expect("miner row");
    miner
        .set_payout_threshold(db, Some(10_000))
        .await
        .expect("override");

    h.backend.run_payouts().await.expect("payout tick");

    assert!(h.nodes[0].sent_payments().is_empty());
    assert_eq!(h.backend.miner_balance("poor").await.unwrap().confirmed, 500);
    assert_eq!(
        h.backend.miner_balance("patient").await.unwrap().confirmed,
        2_000
    );
}

#[tokio::test]
async fn failed_broadcast_leaves_balance_undebited_and_retries_next_tick() {
    let h = common::harness(1, vec![]).await;
    let db = &h.database.connection;

    balances::Model::credit(db, "RGT", "alice", 5_000)
        .await
        .expect("seed balance");

    h.nodes[0].script_send(SendOutcome::Drop);
    h.backend.run_payouts().await.expect("payout tick");

    // Nothing broadcast, nothing debited; the record stays unresolved.
    assert!(h.nodes[0].sent_payments().is_empty());
    let balance = h.backend.miner_balance("alice").await.unwrap();
    assert_eq!(balance.confirmed, 5_000);
    assert_eq!(balance.pending, 0);

    let records = h.backend.payouts_for("alice", 10).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].state, PayoutState::Initiated);

    // Next tick: the stale record is proven unsent, fails, and a fresh
    // payout goes through — exactly one broadcast in total.
    h.backend.run_payouts().await.expect("payout tick");

    assert_eq!(h.nodes[0].sent_payments().len(), 1);
    let balance = h.backend.miner_balance("alice").await.unwrap();
    assert_eq!(balance.confirmed, 0);
    assert_eq!(balance.pending, 5_000);

    let records = h.backend.payouts_for("alice", 10).await.unwrap();
    assert_eq!(records.len(), 2);
    assert!(records.iter().any(|r| r.state == PayoutState::Failed));
    assert!(records.iter().any(|r| r.state == PayoutState::Sent));
}

#[tokio::test]
async fn ambiguous_broadcast_is_adopted_without_a_second_send() {
    let h = common::harness(1, vec![]).await;
    let db = &h.database.connection;

    balances::Model::credit(db, "RGT", "alice", 5_000)
        .await
        .expect("seed balance");

    // The node accepts the broadcast but the connection dies before the
    // response arrives; the wallet lookup must adopt the transaction.
    h.nodes[0].script_send(SendOutcome::AmbiguousAccept);
    h.backend.run_payouts().await.expect("payout tick");

    assert_eq!(h.nodes[0].sent_payments().len(), 1);
    let balance = h.backend.miner_balance("alice").await.unwrap();
    assert_eq!(balance.confirmed, 0);
    assert_eq!(balance.pending, 5_000);

    let records = h.backend.payouts_for("alice", 10).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].state, PayoutState::Sent);

    // And never a duplicate afterwards.
    h.backend.run_payouts().await.expect("payout tick");
    assert_eq!(h.nodes[0].sent_payments().len(), 1);
}

#[tokio::test]
async fn vanished_payout_transaction_fails_back_to_the_balance() {
    let h = common::harness(1, vec![]).await;
    let db = &h.database.connection;

    balances::Model::credit(db, "RGT", "alice", 5_000)
        .await
        .expect("seed balance");

    h.backend.run_payouts().await.expect("payout tick");
    let records = h.backend.payouts_for("alice", 10).await.unwrap();
    assert_eq!(records[0].state, PayoutState::Sent);

    // The wallet loses the transaction (conflicted away by a reorg). The
    // tick fails the money back into the balance and, since the miner
    // qualifies again, dispatches a clean replacement in the same pass.
    h.nodes[0].forget_payment(records[0].id);
    h.backend.run_payouts().await.expect("payout tick");

    let records = h.backend.payouts_for("alice", 10).await.unwrap();
    assert_eq!(records.len(), 2);
    assert!(records.iter().any(|r| r.state == PayoutState::Failed));
    assert!(records.iter().any(|r| r.state == PayoutState::Sent));

    // No double-pay: the conflicted transaction is gone, exactly one live
    // broadcast remains, and the ledger shows a single in-flight amount.
    assert_eq!(h.nodes[0].sent_payments().len(), 1);
    let balance = h.backend.miner_balance("alice").await.unwrap();
    assert_eq!(balance.confirmed, 0);
    assert_eq!(balance.pending, 5_000);
}

#[tokio::test]
async fn reconciliation_mismatch_halts_payouts_but_not_crediting() {
    let h = common::harness(1, vec![]).await;
    let db = &h.database.connection;

    balances::Model::credit(db, "RGT", "alice", 100_000)
        .await
        .expect("seed balance");
    h.nodes[0].set_wallet(50_000, 0);

    let result = h.backend.run_balance_check().await;
    assert!(matches!(
        result,
        Err(PoolError::ReconciliationMismatch { .. })
    ));
    assert!(h.backend.payouts_halted());

    // Payout tick becomes a no-op while halted.
    h.backend.run_payouts().await.expect("payout tick");
    assert!(h.nodes[0].sent_payments().is_empty());

    // Share crediting keeps working.
    assert!(h.backend.credit_share(Share {
        miner_id: "alice".to_owned(),
        weight: 10,
    }));

    // Operator resolves the discrepancy and resumes.
    h.nodes[0].set_wallet(200_000, 0);
    h.backend.resume_payouts();
    h.backend.run_balance_check().await.expect("reconciled");
    h.backend.run_payouts().await.expect("payout tick");

    assert_eq!(h.nodes[0].sent_payments().len(), 1);
}
