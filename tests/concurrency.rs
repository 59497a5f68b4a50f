mod common;

use std::sync::Arc;

use futures::future::join_all;
use saldo::cash_engine::model::OperationState;
use saldo::error::ErrorKind;
use saldo::money::Money;

use common::*;

const RACERS: usize = 8;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_withdrawal_approvals_debit_once() {
    let dir = tempfile::tempdir().unwrap();
    let (platform, _clock) = file_platform(&dir).await;
    let platform = Arc::new(platform);

    let user = register(&platform, "race@example.com", None).await;
    let account = payout_account(&platform, &user).await;
    fund(&platform, &user, Money::from_major(100), "receipts/race-1.jpg").await;
    let withdrawal = platform
        .submit_withdrawal(user.id, account.id, Money::from_major(40), &meta())
        .await
        .unwrap();

    let withdrawal_id = withdrawal.id;
    let handles = (0..RACERS).map(|i| {
        let platform = platform.clone();
        let admin = ADMIN + i as i64;
        tokio::spawn(async move { platform.approve_withdrawal(withdrawal_id, admin, None, &meta()).await })
    });
    let results: Vec<_> = join_all(handles).await.into_iter().map(|r| r.unwrap()).collect();

    let successes = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1);
    for err in results.into_iter().filter_map(Result::err) {
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }

    assert_eq!(balance(&platform, &user).await, Money::from_major(55));
    let stored = platform.withdrawals().find(withdrawal.id).await.unwrap();
    assert_eq!(stored.state, OperationState::Approved);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_withdrawals_never_overdraw() {
    let dir = tempfile::tempdir().unwrap();
    let (platform, _clock) = file_platform(&dir).await;
    let platform = Arc::new(platform);

    let user = register(&platform, "drain@example.com", None).await;
    let account = payout_account(&platform, &user).await;
    fund(&platform, &user, Money::from_major(100), "receipts/drain-1.jpg").await;

    // 접수 시점에는 모두 잔고 95.00 이내
    let mut ids = Vec::new();
    for _ in 0..5 {
        let w = platform
            .submit_withdrawal(user.id, account.id, Money::from_major(30), &meta())
            .await
            .unwrap();
        ids.push(w.id);
    }

    let handles = ids.iter().map(|&id| {
        let platform = platform.clone();
        tokio::spawn(async move { platform.approve_withdrawal(id, ADMIN, None, &meta()).await })
    });
    let results: Vec<_> = join_all(handles).await.into_iter().map(|r| r.unwrap()).collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 3);
    for err in results.into_iter().filter_map(Result::err) {
        assert_eq!(err.kind(), ErrorKind::InsufficientBalance);
    }
    assert_eq!(balance(&platform, &user).await, Money::from_major(5));

    let queue = platform.list_pending(50).await.unwrap();
    assert_eq!(queue.withdrawals.len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_deposit_approvals_credit_and_grant_once() {
    let dir = tempfile::tempdir().unwrap();
    let (platform, _clock) = file_platform(&dir).await;
    let platform = Arc::new(platform);

    let referrer = register(&platform, "host@example.com", None).await;
    let referred = register(&platform, "guest@example.com", Some(&referrer.referral_code)).await;
    let deposit = platform
        .submit_deposit(referred.id, Money::from_major(200), "receipts/guest-1.jpg", &meta())
        .await
        .unwrap();

    let deposit_id = deposit.id;
    let handles = (0..RACERS).map(|_| {
        let platform = platform.clone();
        tokio::spawn(async move { platform.approve_deposit(deposit_id, ADMIN, &meta()).await })
    });
    let results: Vec<_> = join_all(handles).await.into_iter().map(|r| r.unwrap()).collect();
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);

    // 190.00 + 보너스 5.00
    assert_eq!(balance(&platform, &referred).await, Money::from_major(195));
    assert_eq!(balance(&platform, &referrer).await, Money::from_major(5));

    let retries = (0..RACERS).map(|_| {
        let platform = platform.clone();
        let user_id = referred.id;
        tokio::spawn(async move { platform.try_grant_bonus(user_id).await })
    });
    for outcome in join_all(retries).await {
        assert!(outcome.unwrap().is_ok());
    }
    assert_eq!(balance(&platform, &referrer).await, Money::from_major(5));
    assert_eq!(platform.get_stats().await.unwrap().referral_bonuses_granted, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_archived_account_never_keeps_pending_withdrawal() {
    let dir = tempfile::tempdir().unwrap();
    let (platform, _clock) = file_platform(&dir).await;
    let platform = Arc::new(platform);

    let user = register(&platform, "archive-race@example.com", None).await;
    fund(&platform, &user, Money::from_major(100), "receipts/archive-race.jpg").await;

    for _ in 0..10 {
        let account = payout_account(&platform, &user).await;
        let (user_id, account_id) = (user.id, account.id);

        let submit = {
            let platform = platform.clone();
            tokio::spawn(async move {
                platform
                    .submit_withdrawal(user_id, account_id, Money::from_major(10), &meta())
                    .await
            })
        };
        let archive = {
            let platform = platform.clone();
            tokio::spawn(async move {
                platform
                    .accounts()
                    .archive_payout_account(user_id, account_id, &meta())
                    .await
            })
        };
        let (submitted, archived) = (submit.await.unwrap(), archive.await.unwrap());

        // 둘 중 하나만 성공
        assert!(submitted.is_ok() != archived.is_ok());
        if let Err(err) = submitted {
            assert_eq!(err.kind(), ErrorKind::Validation);
        }
        if let Err(err) = archived {
            assert_eq!(err.kind(), ErrorKind::InvalidState);
        }

        let still_active = platform
            .accounts()
            .payout_accounts(user.id)
            .await
            .unwrap()
            .iter()
            .any(|a| a.id == account.id);
        let pending_on_account = platform
            .withdrawals()
            .for_user(user.id, 100)
            .await
            .unwrap()
            .iter()
            .filter(|w| w.bank_account_id == account.id && w.state == OperationState::Pending)
            .count();
        if !still_active {
            assert_eq!(pending_on_account, 0);
        }
    }
}
