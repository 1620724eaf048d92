//! Racing callers against the same wager, token and balance.

mod common;

use common::{GROUP, Harness};
use std::collections::HashSet;
use tokio::task::JoinSet;
use wager_engine::token::{TokenRejection, TokenRequest};
use wager_engine::wager::{WagerError, WagerOptions};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_joins_by_same_user() {
    let h = Harness::new();
    h.fund(&[1]).await;
    let wager = h.create(1, WagerOptions::Binary, Some(10)).await;
    let wager_id = wager.id;

    let mut tasks = JoinSet::new();
    for answer in ["yes", "no", "yes", "no"] {
        let engine = h.engine.clone();
        tasks.spawn(async move { engine.place_wager(wager_id, 1, answer, 10).await });
    }

    let mut joined = 0;
    let mut rejected = 0;
    while let Some(result) = tasks.join_next().await {
        match result.unwrap() {
            Ok(_) => joined += 1,
            Err(WagerError::UserAlreadyJoined { user_id: 1, .. }) => rejected += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(joined, 1);
    assert_eq!(rejected, 3);
    assert_eq!(h.engine.wager_entries(wager.id).await.unwrap().len(), 1);
    assert_eq!(h.balance(1).await, 990);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_settlements_pay_once() {
    let h = Harness::new();
    h.fund(&[1, 2]).await;
    let wager = h.create(1, WagerOptions::Binary, Some(50)).await;
    h.engine.place_wager(wager.id, 1, "yes", 50).await.unwrap();
    h.engine.place_wager(wager.id, 2, "no", 50).await.unwrap();
    let wager_id = wager.id;

    let mut tasks = JoinSet::new();
    for outcome in ["yes", "no", "yes", "no", "yes", "no"] {
        let engine = h.engine.clone();
        tasks.spawn(async move { engine.settle_wager(wager_id, outcome, None, None).await });
    }

    let mut settled = Vec::new();
    while let Some(result) = tasks.join_next().await {
        match result.unwrap() {
            Ok(wager) => settled.push(wager),
            Err(e) => assert!(
                matches!(e, WagerError::WagerAlreadySettled { .. }),
                "unexpected error: {e}"
            ),
        }
    }

    assert_eq!(settled.len(), 1);
    let (winner, loser) = if settled[0].outcome.as_deref() == Some("yes") {
        (1, 2)
    } else {
        (2, 1)
    };
    assert_eq!(h.balance(winner).await, 1050);
    assert_eq!(h.balance(loser).await, 950);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_no_double_spend_across_wagers() {
    let h = Harness::new();
    h.fund(&[1, 2]).await;

    let mut wagers = Vec::new();
    for _ in 0..8 {
        wagers.push(h.create(2, WagerOptions::Binary, Some(300)).await);
    }

    let mut tasks = JoinSet::new();
    for wager in &wagers {
        let engine = h.engine.clone();
        let wager_id = wager.id;
        tasks.spawn(async move { engine.place_wager(wager_id, 1, "yes", 300).await });
    }

    let mut joined = 0;
    while let Some(result) = tasks.join_next().await {
        match result.unwrap() {
            Ok(_) => joined += 1,
            Err(e) => assert!(
                matches!(e, WagerError::InsufficientFunds { .. }),
                "unexpected error: {e}"
            ),
        }
    }

    // 1000 points cover three 300-point stakes
    assert_eq!(joined, 3);
    assert_eq!(h.balance(1).await, 100);

    let history = h.engine.ledger_history(1, GROUP, 50).await.unwrap();
    let total: i64 = history.iter().map(|t| t.amount).sum();
    assert_eq!(total, 100);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_token_consumption() {
    let h = Harness::new();
    h.fund(&[1]).await;
    let wager = h.create(1, WagerOptions::Binary, Some(10)).await;
    let issued = h
        .engine
        .issue_token(TokenRequest::dispute(wager.id, 1))
        .await
        .unwrap();

    let mut tasks = JoinSet::new();
    for _ in 0..8 {
        let engine = h.engine.clone();
        let token = issued.token.clone();
        tasks.spawn(async move { engine.consume_token(&token).await });
    }

    let mut consumed = Vec::new();
    while let Some(result) = tasks.join_next().await {
        match result.unwrap() {
            Ok(token) => consumed.push(token.id),
            Err(e) => assert!(
                matches!(e, WagerError::InvalidToken(TokenRejection::AlreadyUsed)),
                "unexpected error: {e}"
            ),
        }
    }
    assert_eq!(consumed, vec![issued.record.id]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_settle_races_cancel() {
    let h = Harness::new();
    h.fund(&[1, 2, 3]).await;
    let wager = h.create(1, WagerOptions::Binary, None).await;
    h.engine.place_wager(wager.id, 2, "yes", 40).await.unwrap();
    h.engine.place_wager(wager.id, 3, "no", 60).await.unwrap();
    let wager_id = wager.id;

    let settle = {
        let engine = h.engine.clone();
        tokio::spawn(async move { engine.settle_wager(wager_id, "yes", None, Some(1)).await })
    };
    let cancel = {
        let engine = h.engine.clone();
        tokio::spawn(async move { engine.cancel_wager(wager_id, Some(1)).await })
    };
    let settle = settle.await.unwrap();
    let cancel = cancel.await.unwrap();
    assert!(settle.is_ok() != cancel.is_ok());

    let final_status = h.engine.get_wager(wager.id).await.unwrap().status;
    let balances: HashSet<_> = [h.balance(2).await, h.balance(3).await].into();
    if settle.is_ok() {
        assert_eq!(final_status, wager_engine::WagerStatus::Settled);
        assert_eq!(balances, HashSet::from([1060, 940]));
    } else {
        assert_eq!(final_status, wager_engine::WagerStatus::Cancelled);
        assert_eq!(balances, HashSet::from([1000]));
    }
}
