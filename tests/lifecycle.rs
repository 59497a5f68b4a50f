mod common;

use std::sync::Arc;
use std::time::Duration;

use rust_decimal_macros::dec;
use saldo::cash_engine::audit::actions;
use saldo::cash_engine::model::{AlertKind, OperationState};
use saldo::cash_engine::{BonusOutcome, CashPlatform, SettingsUpdate};
use saldo::db::init_memory_database;
use saldo::error::ErrorKind;
use saldo::money::Money;
use saldo::notify::LogNotifier;

use common::*;

#[tokio::test]
async fn test_deposit_commission_and_credit() {
    let (platform, _clock) = memory_platform().await;
    let user = register(&platform, "lucia@example.com", None).await;

    let deposit = platform
        .submit_deposit(user.id, Money::from_major(100), "receipts/lucia-1.jpg", &meta())
        .await
        .unwrap();
    assert_eq!(deposit.commission_percent, dec!(5));
    assert_eq!(deposit.commission_amount, Money::from_major(5));
    assert_eq!(deposit.net_amount, Money::from_major(95));
    assert_eq!(deposit.state, OperationState::Pending);
    assert!(deposit.operation_id.starts_with("REC-20240502-"));
    assert_eq!(balance(&platform, &user).await, Money::ZERO);

    let approved = platform.approve_deposit(deposit.id, ADMIN, &meta()).await.unwrap();
    assert_eq!(approved.state, OperationState::Approved);
    assert_eq!(approved.processed_by, Some(ADMIN));
    assert_eq!(balance(&platform, &user).await, Money::from_major(95));
}

#[tokio::test]
async fn test_withdrawal_exceeding_balance_is_rejected_before_persistence() {
    let (platform, _clock) = memory_platform().await;
    let user = register(&platform, "mateo@example.com", None).await;
    let account = payout_account(&platform, &user).await;
    fund(&platform, &user, Money::from_major(100), "receipts/mateo-1.jpg").await;

    let err = platform
        .submit_withdrawal(user.id, account.id, Money::from_major(200), &meta())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InsufficientBalance);

    let withdrawals = platform.withdrawals().for_user(user.id, 50).await.unwrap();
    assert!(withdrawals.is_empty());
    assert_eq!(balance(&platform, &user).await, Money::from_major(95));
}

#[tokio::test]
async fn test_approval_rechecks_balance_after_drift() {
    let (platform, _clock) = memory_platform().await;
    let user = register(&platform, "sofia@example.com", None).await;
    let account = payout_account(&platform, &user).await;
    fund(&platform, &user, Money::from_major(100), "receipts/sofia-1.jpg").await;

    let original = platform
        .submit_withdrawal(user.id, account.id, Money::from_major(80), &meta())
        .await
        .unwrap();
    let other = platform
        .submit_withdrawal(user.id, account.id, Money::from_major(85), &meta())
        .await
        .unwrap();
    platform.approve_withdrawal(other.id, ADMIN, None, &meta()).await.unwrap();
    assert_eq!(balance(&platform, &user).await, Money::from_major(10));

    let err = platform
        .approve_withdrawal(original.id, ADMIN, None, &meta())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InsufficientBalance);

    // 상태 전이도 롤백되어 여전히 검토 대기
    let still_pending = platform.withdrawals().find(original.id).await.unwrap();
    assert_eq!(still_pending.state, OperationState::Pending);
    assert_eq!(balance(&platform, &user).await, Money::from_major(10));

    platform
        .reject_withdrawal(original.id, ADMIN, "잔고 부족", &meta())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_referral_bonus_on_first_deposit_only() {
    let (platform, _clock) = memory_platform().await;
    let referrer = register(&platform, "camila@example.com", None).await;
    let referred = register(&platform, "diego@example.com", Some(&referrer.referral_code.to_lowercase())).await;
    assert_eq!(referred.referred_by, Some(referrer.id));

    fund(&platform, &referred, Money::from_major(100), "receipts/diego-1.jpg").await;
    assert_eq!(balance(&platform, &referred).await, Money::from_major(100));
    assert_eq!(balance(&platform, &referrer).await, Money::from_major(5));

    let referral = platform.referrals().referral_of(referred.id).await.unwrap().unwrap();
    assert!(referral.bonus_granted);
    assert_eq!(referral.bonus_amount, Some(Money::from_major(5)));

    fund(&platform, &referred, Money::from_major(20), "receipts/diego-2.jpg").await;
    assert_eq!(balance(&platform, &referred).await, Money::from_major(119));
    assert_eq!(balance(&platform, &referrer).await, Money::from_major(5));

    // 재호출은 지급 없이 종료
    assert_eq!(platform.try_grant_bonus(referred.id).await.unwrap(), BonusOutcome::AlreadyConsumed);
    assert_eq!(platform.try_grant_bonus(referred.id).await.unwrap(), BonusOutcome::AlreadyConsumed);
    assert_eq!(balance(&platform, &referrer).await, Money::from_major(5));

    let stats = platform.get_stats().await.unwrap();
    assert_eq!(stats.referral_bonuses_granted, 1);
    assert_eq!(stats.referral_bonus_paid, Money::from_major(10));
}

#[tokio::test]
async fn test_multiple_deposits_alert_raised_once() {
    let (platform, clock) = memory_platform().await;
    let user = register(&platform, "valentina@example.com", None).await;

    for i in 0..4 {
        platform
            .submit_deposit(user.id, Money::from_major(20), &format!("receipts/v-{}.jpg", i), &meta())
            .await
            .unwrap();
        clock.advance(chrono::Duration::minutes(5));
    }
    let alerts = platform.fraud().alerts_for_user(user.id).await.unwrap();
    let multiple: Vec<_> = alerts.iter().filter(|a| a.kind == AlertKind::MultipleDeposits).collect();
    assert_eq!(multiple.len(), 1);
    assert!(!multiple[0].reviewed);

    platform
        .submit_deposit(user.id, Money::from_major(20), "receipts/v-4.jpg", &meta())
        .await
        .unwrap();
    let alerts = platform.fraud().alerts_for_user(user.id).await.unwrap();
    assert_eq!(alerts.iter().filter(|a| a.kind == AlertKind::MultipleDeposits).count(), 1);

    let stats = platform.get_stats().await.unwrap();
    assert_eq!(stats.unreviewed_alerts, 1);
}

#[tokio::test]
async fn test_terminal_states_refuse_further_transitions() {
    let (platform, _clock) = memory_platform().await;
    let user = register(&platform, "bruno@example.com", None).await;
    let account = payout_account(&platform, &user).await;

    let approved = platform
        .submit_deposit(user.id, Money::from_major(50), "receipts/b-1.jpg", &meta())
        .await
        .unwrap();
    platform.approve_deposit(approved.id, ADMIN, &meta()).await.unwrap();

    let rejected = platform
        .submit_deposit(user.id, Money::from_major(50), "receipts/b-2.jpg", &meta())
        .await
        .unwrap();
    platform
        .reject_deposit(rejected.id, ADMIN, "영수증 금액이 일치하지 않음", &meta())
        .await
        .unwrap();

    for id in [approved.id, rejected.id] {
        let err = platform.approve_deposit(id, ADMIN, &meta()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        let err = platform
            .reject_deposit(id, ADMIN, "두 번째 처리 시도입니다", &meta())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }
    assert_eq!(balance(&platform, &user).await, Money::from_minor(4750));

    let w = platform
        .submit_withdrawal(user.id, account.id, Money::from_major(10), &meta())
        .await
        .unwrap();
    platform
        .approve_withdrawal(w.id, ADMIN, Some("proofs/w-1.pdf"), &meta())
        .await
        .unwrap();
    let err = platform.approve_withdrawal(w.id, ADMIN, None, &meta()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
    let err = platform.reject_withdrawal(w.id, ADMIN, "중복", &meta()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);

    let err = platform.approve_deposit(9_999, ADMIN, &meta()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_net_amount_uses_commission_snapshot() {
    let (platform, _clock) = memory_platform().await;
    let user = register(&platform, "elena@example.com", None).await;

    let deposit = platform
        .submit_deposit(user.id, Money::from_major(100), "receipts/e-1.jpg", &meta())
        .await
        .unwrap();

    let changes = SettingsUpdate {
        commission_percent: Some(dec!(12.5)),
        ..Default::default()
    };
    platform.update_settings(ADMIN, &meta(), &changes).await.unwrap();

    let approved = platform.approve_deposit(deposit.id, ADMIN, &meta()).await.unwrap();
    assert_eq!(approved.commission_percent, dec!(5));
    assert_eq!(approved.net_amount, Money::from_major(95));
    assert_eq!(balance(&platform, &user).await, Money::from_major(95));

    let next = platform
        .submit_deposit(user.id, Money::from_major(100), "receipts/e-2.jpg", &meta())
        .await
        .unwrap();
    assert_eq!(next.commission_amount, Money::from_minor(1250));
    assert_eq!(next.net_amount, Money::from_minor(8750));
}

#[tokio::test]
async fn test_missing_configuration_blocks_submission() {
    let pool = init_memory_database().await.unwrap();
    let platform = CashPlatform::new(pool, manual_clock(), Arc::new(LogNotifier), Duration::from_secs(30));
    let user = register(&platform, "nadia@example.com", None).await;

    let err = platform
        .submit_deposit(user.id, Money::from_major(100), "receipts/n-1.jpg", &meta())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConfigurationMissing);
    assert!(platform.deposits().for_user(user.id, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_maintenance_mode_blocks_submissions() {
    let (platform, _clock) = memory_platform().await;
    let user = register(&platform, "pablo@example.com", None).await;
    let account = payout_account(&platform, &user).await;
    fund(&platform, &user, Money::from_major(100), "receipts/p-1.jpg").await;

    let changes = SettingsUpdate {
        maintenance_mode: Some(true),
        maintenance_message: Some("정기 점검 중입니다".to_string()),
        ..Default::default()
    };
    platform.update_settings(ADMIN, &meta(), &changes).await.unwrap();

    let err = platform
        .submit_deposit(user.id, Money::from_major(100), "receipts/p-2.jpg", &meta())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Maintenance);
    assert!(err.to_string().contains("정기 점검 중입니다"));

    let err = platform
        .submit_withdrawal(user.id, account.id, Money::from_major(10), &meta())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Maintenance);

    let changes = SettingsUpdate {
        maintenance_mode: Some(false),
        ..Default::default()
    };
    platform.update_settings(ADMIN, &meta(), &changes).await.unwrap();
    platform
        .submit_withdrawal(user.id, account.id, Money::from_major(10), &meta())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_audit_trail_covers_lifecycle() {
    let (platform, _clock) = memory_platform().await;
    let user = register(&platform, "ines@example.com", None).await;
    let account = payout_account(&platform, &user).await;
    fund(&platform, &user, Money::from_major(100), "receipts/i-1.jpg").await;
    let w = platform
        .submit_withdrawal(user.id, account.id, Money::from_major(30), &meta())
        .await
        .unwrap();
    platform.approve_withdrawal(w.id, ADMIN, None, &meta()).await.unwrap();

    let entries = platform.audit_log(Some(user.id), 100).await.unwrap();
    let recorded: Vec<&str> = entries.iter().map(|e| e.action.as_str()).collect();
    for action in [
        actions::USER_REGISTERED,
        actions::PAYOUT_ACCOUNT_ADDED,
        actions::DEPOSIT_SUBMITTED,
        actions::DEPOSIT_APPROVED,
        actions::WITHDRAWAL_SUBMITTED,
        actions::WITHDRAWAL_APPROVED,
    ] {
        assert!(recorded.contains(&action), "감사 로그 누락: {}", action);
    }
    assert!(entries
        .iter()
        .all(|e| e.ip_address.as_deref() == Some("203.0.113.7")));
    assert_eq!(balance(&platform, &user).await, Money::from_major(65));
}
