//! 이상거래 탐지
//!
//! 최근 거래 이력을 보고 관리자 검토용 보안 경고를 남깁니다.
//! 경고는 참고용이며 원래 작업을 막지 않습니다. 탐지 중 발생한 에러도 삼킵니다.
//!
//! 같은 종류의 미검토 경고가 시간 창 안에 이미 있으면 새로 만들지 않습니다.
//! 이 검사와 생성은 한 SQL 문장이라 동시 실행에도 중복되지 않습니다.

use std::sync::Arc;

use chrono::Duration;
use log::{debug, info, warn};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use sqlx::sqlite::SqlitePool;

use super::audit::{actions, AuditRecord, AuditTrail};
use super::model::{Actor, AdminId, AlertKind, Deposit, RequestMeta, SecurityAlert, UserId, Withdrawal};
use crate::clock::Clock;
use crate::db::models::to_millis;
use crate::db::repository::{DepositRepository, SecurityAlertRepository};
use crate::error::{CoreError, CoreResult};
use crate::money::Money;

/// 탐지 규칙
#[derive(Debug, Clone)]
pub struct FraudRules {
    /// 이 건수를 넘으면 multiple_deposits
    pub max_deposits_per_window: i64,
    pub multiple_deposits_window: Duration,
    /// 출금 비율이 이 값을 넘으면 immediate_withdrawal
    pub withdrawal_ratio_threshold: Decimal,
    pub immediate_withdrawal_window: Duration,
    pub duplicate_receipt_window: Duration,
    /// 이 건수 이상 거절되면 suspicious_pattern
    pub rejected_deposits_threshold: i64,
    pub suspicious_pattern_window: Duration,
}

impl Default for FraudRules {
    fn default() -> Self {
        Self {
            max_deposits_per_window: 3,
            multiple_deposits_window: Duration::hours(1),
            withdrawal_ratio_threshold: Decimal::new(80, 2),
            immediate_withdrawal_window: Duration::hours(24),
            duplicate_receipt_window: Duration::hours(24),
            rejected_deposits_threshold: 3,
            suspicious_pattern_window: Duration::hours(24),
        }
    }
}

pub struct FraudHeuristics {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
    rules: FraudRules,
}

impl FraudHeuristics {
    pub fn new(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        Self::with_rules(pool, clock, FraudRules::default())
    }

    pub fn with_rules(pool: SqlitePool, clock: Arc<dyn Clock>, rules: FraudRules) -> Self {
        Self { pool, clock, rules }
    }

    pub fn rules(&self) -> &FraudRules {
        &self.rules
    }

    /// 충전 접수 후 검사. 생성된 경고 ID 목록
    pub async fn after_deposit_submitted(&self, deposit: &Deposit) -> Vec<i64> {
        let mut raised = Vec::new();

        let results = [
            self.check_multiple_deposits(deposit.user_id).await,
            self.check_duplicate_receipt(deposit).await,
            self.check_suspicious_pattern(deposit.user_id).await,
        ];
        for result in results {
            match result {
                Ok(Some(id)) => raised.push(id),
                Ok(None) => {}
                Err(e) => warn!("⚠️ 충전 {} 이상거래 검사 실패: {}", deposit.operation_id, e),
            }
        }
        raised
    }

    /// 출금 접수 후 검사
    pub async fn after_withdrawal_submitted(&self, withdrawal: &Withdrawal, balance: Money) -> Option<i64> {
        match self.check_immediate_withdrawal(withdrawal.user_id, withdrawal.amount, balance).await {
            Ok(raised) => raised,
            Err(e) => {
                warn!("⚠️ 출금 {} 이상거래 검사 실패: {}", withdrawal.operation_id, e);
                None
            }
        }
    }

    /// 시간 창 내 pending/approved 충전이 기준 건수를 넘는지
    pub async fn check_multiple_deposits(&self, user_id: UserId) -> CoreResult<Option<i64>> {
        let now = self.clock.now();
        let window = self.rules.multiple_deposits_window;
        let count = DepositRepository::count_active_since(&self.pool, user_id, to_millis(now - window)).await?;
        if count <= self.rules.max_deposits_per_window {
            return Ok(None);
        }

        self.raise(
            user_id,
            AlertKind::MultipleDeposits,
            format!("{}분 동안 충전 {}건", window.num_minutes(), count),
            json!({
                "count": count,
                "window_minutes": window.num_minutes(),
                "threshold": self.rules.max_deposits_per_window,
            }),
            window,
        )
        .await
    }

    /// 최근 승인된 충전 직후 잔고 대부분을 출금하는지
    ///
    /// 비율은 접수 시점 잔고로 출금 전 총액을 재구성해 계산합니다
    /// (`amount / (잔고 - amount + amount)`).
    pub async fn check_immediate_withdrawal(
        &self,
        user_id: UserId,
        amount: Money,
        balance: Money,
    ) -> CoreResult<Option<i64>> {
        let now = self.clock.now();
        let window = self.rules.immediate_withdrawal_window;
        let (recent_count, recent_total) = DepositRepository::approved_since(&self.pool, user_id, to_millis(now - window)).await?;
        if recent_count == 0 {
            return Ok(None);
        }

        let remaining = Money::from_minor(balance.minor() - amount.minor());
        let pre_withdrawal_total = Money::from_minor(remaining.minor() + amount.minor());
        let ratio = match amount.ratio_of(pre_withdrawal_total) {
            Some(ratio) => ratio,
            None => return Ok(None),
        };
        if ratio <= self.rules.withdrawal_ratio_threshold {
            return Ok(None);
        }

        let percent = (ratio * Decimal::ONE_HUNDRED).round_dp(2);
        self.raise(
            user_id,
            AlertKind::ImmediateWithdrawal,
            format!("최근 충전 직후 잔고의 {}% 출금 요청", percent),
            json!({
                "amount": amount,
                "balance": balance,
                "ratio": ratio.round_dp(4),
                "recent_deposits": recent_count,
                "recent_deposit_total": Money::from_minor(recent_total),
            }),
            window,
        )
        .await
    }

    /// 같은 영수증이 다른 사용자의 충전에 붙어 있는지
    pub async fn check_duplicate_receipt(&self, deposit: &Deposit) -> CoreResult<Option<i64>> {
        let other = match DepositRepository::find_receipt_owned_by_other(&self.pool, &deposit.receipt_url, deposit.user_id).await? {
            Some(other) => other,
            None => return Ok(None),
        };

        self.raise(
            deposit.user_id,
            AlertKind::DuplicateReceipt,
            format!("영수증이 다른 사용자의 충전 {}에 이미 사용됨", other.operation_id),
            json!({
                "receipt_url": deposit.receipt_url,
                "operation_id": deposit.operation_id,
                "other_user_id": other.user_id,
                "other_operation_id": other.operation_id,
            }),
            self.rules.duplicate_receipt_window,
        )
        .await
    }

    /// 시간 창 내 거절된 충전이 기준 건수 이상인지
    pub async fn check_suspicious_pattern(&self, user_id: UserId) -> CoreResult<Option<i64>> {
        let now = self.clock.now();
        let window = self.rules.suspicious_pattern_window;
        let rejected = DepositRepository::count_rejected_since(&self.pool, user_id, to_millis(now - window)).await?;
        if rejected < self.rules.rejected_deposits_threshold {
            return Ok(None);
        }

        self.raise(
            user_id,
            AlertKind::SuspiciousPattern,
            format!("{}시간 동안 거절된 충전 {}건", window.num_hours(), rejected),
            json!({
                "rejected_deposits": rejected,
                "window_hours": window.num_hours(),
            }),
            window,
        )
        .await
    }

    async fn raise(
        &self,
        user_id: UserId,
        kind: AlertKind,
        description: String,
        details: Value,
        window: Duration,
    ) -> CoreResult<Option<i64>> {
        let now = self.clock.now();
        let raised = SecurityAlertRepository::insert_unless_open(
            &self.pool,
            user_id,
            kind.as_str(),
            &description,
            &serde_json::to_string(&details)?,
            to_millis(now),
            to_millis(now - window),
        )
        .await?;

        match raised {
            Some(id) => warn!("🚨 보안 경고 #{} [{}] 사용자 {}: {}", id, kind.as_str(), user_id, description),
            None => debug!("미검토 경고가 이미 있음 [{}] 사용자 {}", kind.as_str(), user_id),
        }
        Ok(raised)
    }

    /// 경고 목록 (최신순)
    pub async fn list_alerts(&self, reviewed: Option<bool>, limit: i64) -> CoreResult<Vec<SecurityAlert>> {
        SecurityAlertRepository::list(&self.pool, reviewed, limit)
            .await?
            .into_iter()
            .map(SecurityAlert::try_from)
            .collect()
    }

    pub async fn alerts_for_user(&self, user_id: UserId) -> CoreResult<Vec<SecurityAlert>> {
        SecurityAlertRepository::find_by_user(&self.pool, user_id)
            .await?
            .into_iter()
            .map(SecurityAlert::try_from)
            .collect()
    }

    /// 관리자 검토 처리. 이미 검토된 경고는 `InvalidState`
    pub async fn review_alert(&self, alert_id: i64, admin: AdminId, meta: &RequestMeta) -> CoreResult<SecurityAlert> {
        let now = self.clock.now();
        let mut tx = self.pool.begin().await?;

        if SecurityAlertRepository::mark_reviewed(&mut *tx, alert_id, admin, to_millis(now)).await? == 0 {
            return match SecurityAlertRepository::find(&mut *tx, alert_id).await? {
                None => Err(CoreError::not_found("security_alert", alert_id)),
                Some(_) => Err(CoreError::InvalidState(format!("이미 검토된 경고: {}", alert_id))),
            };
        }

        let record = SecurityAlertRepository::find(&mut *tx, alert_id)
            .await?
            .ok_or_else(|| CoreError::not_found("security_alert", alert_id))?;
        let alert = SecurityAlert::try_from(record)?;

        let audit = AuditRecord::new(actions::ALERT_REVIEWED, Actor::Admin(admin))
            .subject(alert.user_id)
            .meta(meta)
            .details(json!({
                "alert_id": alert.id,
                "kind": alert.kind,
            }));
        AuditTrail::record(&mut *tx, &audit, now).await?;
        tx.commit().await?;

        info!("✅ 보안 경고 #{} 검토 완료 (관리자 {})", alert_id, admin);
        Ok(alert)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cash_engine::model::OperationState;
    use crate::cash_engine::testing;
    use crate::db::models::NewDepositRecord;
    use crate::error::ErrorKind;
    use rust_decimal_macros::dec;

    async fn insert_deposit(ctx: &crate::cash_engine::EngineContext, user_id: UserId, op: &str, receipt: &str) -> Deposit {
        let now = ctx.now();
        let record = NewDepositRecord {
            operation_id: op.into(),
            user_id,
            amount_deposited: 10_000,
            commission_percent: "5".into(),
            commission_amount: 500,
            net_amount: 9_500,
            receipt_url: receipt.into(),
            submitted_at: to_millis(now),
        };
        let id = DepositRepository::insert(&ctx.pool, &record).await.unwrap();
        Deposit {
            id,
            operation_id: op.into(),
            user_id,
            amount_deposited: Money::from_major(100),
            commission_percent: dec!(5),
            commission_amount: Money::from_major(5),
            net_amount: Money::from_major(95),
            receipt_url: receipt.into(),
            state: OperationState::Pending,
            rejection_reason: None,
            submitted_at: now,
            processed_at: None,
            processed_by: None,
        }
    }

    #[tokio::test]
    async fn test_multiple_deposits_alert_once_per_window() {
        let (ctx, clock) = testing::context().await;
        let fraud = FraudHeuristics::new(ctx.pool.clone(), ctx.clock.clone());
        let user = testing::user_with_balance(&ctx, "eve@example.com", Money::ZERO).await;

        for i in 0..3 {
            let d = insert_deposit(&ctx, user, &format!("REC-{}", i), &format!("r/{}", i)).await;
            assert!(fraud.after_deposit_submitted(&d).await.is_empty());
        }
        let fourth = insert_deposit(&ctx, user, "REC-3", "r/3").await;
        assert_eq!(fraud.after_deposit_submitted(&fourth).await.len(), 1);

        let fifth = insert_deposit(&ctx, user, "REC-4", "r/4").await;
        assert!(fraud.after_deposit_submitted(&fifth).await.is_empty());

        // 창이 지나면 오래된 충전은 세지 않음
        clock.advance(Duration::minutes(61));
        assert_eq!(fraud.check_multiple_deposits(user).await.unwrap(), None);

        let alerts = fraud.alerts_for_user(user).await.unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::MultipleDeposits);
        assert_eq!(alerts[0].details["count"], 4);
    }

    #[tokio::test]
    async fn test_duplicate_receipt_across_users() {
        let (ctx, _clock) = testing::context().await;
        let fraud = FraudHeuristics::new(ctx.pool.clone(), ctx.clock.clone());
        let ana = testing::user_with_balance(&ctx, "ana@example.com", Money::ZERO).await;
        let bob = testing::user_with_balance(&ctx, "bob@example.com", Money::ZERO).await;

        let first = insert_deposit(&ctx, ana, "REC-A", "receipts/1.jpg").await;
        assert_eq!(fraud.check_duplicate_receipt(&first).await.unwrap(), None);

        // 같은 사용자의 재사용은 대상이 아님
        let again = insert_deposit(&ctx, ana, "REC-A2", "receipts/1.jpg").await;
        assert_eq!(fraud.check_duplicate_receipt(&again).await.unwrap(), None);

        let copied = insert_deposit(&ctx, bob, "REC-B", "receipts/1.jpg").await;
        let alert_id = fraud.check_duplicate_receipt(&copied).await.unwrap().unwrap();

        let alerts = fraud.alerts_for_user(bob).await.unwrap();
        assert_eq!(alerts[0].id, alert_id);
        assert_eq!(alerts[0].details["other_user_id"], ana);
    }

    #[tokio::test]
    async fn test_immediate_withdrawal_needs_recent_approved_deposit() {
        let (ctx, clock) = testing::context().await;
        let fraud = FraudHeuristics::new(ctx.pool.clone(), ctx.clock.clone());
        let user = testing::user_with_balance(&ctx, "ana@example.com", Money::from_major(100)).await;

        // 최근 승인 충전 없음
        let none = fraud
            .check_immediate_withdrawal(user, Money::from_major(90), Money::from_major(100))
            .await
            .unwrap();
        assert_eq!(none, None);

        let d = insert_deposit(&ctx, user, "REC-1", "r/1").await;
        DepositRepository::transition_from_pending(&ctx.pool, d.id, "approved", None, to_millis(clock.now()), 1)
            .await
            .unwrap();

        // 80%는 기준 초과가 아님
        let at_threshold = fraud
            .check_immediate_withdrawal(user, Money::from_major(80), Money::from_major(100))
            .await
            .unwrap();
        assert_eq!(at_threshold, None);

        let raised = fraud
            .check_immediate_withdrawal(user, Money::from_major(90), Money::from_major(100))
            .await
            .unwrap();
        assert!(raised.is_some());

        let alerts = fraud.alerts_for_user(user).await.unwrap();
        assert_eq!(alerts[0].kind, AlertKind::ImmediateWithdrawal);
        let ratio: Decimal = alerts[0].details["ratio"].as_str().unwrap().parse().unwrap();
        assert_eq!(ratio, dec!(0.9));
        assert_eq!(alerts[0].details["recent_deposit_total"], "95.00");

        // 24시간이 지나면 최근 충전으로 보지 않음
        clock.advance(Duration::hours(25));
        let later = fraud
            .check_immediate_withdrawal(user, Money::from_major(100), Money::from_major(100))
            .await
            .unwrap();
        assert_eq!(later, None);
    }

    #[tokio::test]
    async fn test_suspicious_pattern_after_repeated_rejections() {
        let (ctx, clock) = testing::context().await;
        let fraud = FraudHeuristics::new(ctx.pool.clone(), ctx.clock.clone());
        let user = testing::user_with_balance(&ctx, "eve@example.com", Money::ZERO).await;

        for i in 0..3 {
            let d = insert_deposit(&ctx, user, &format!("REC-{}", i), &format!("r/{}", i)).await;
            DepositRepository::transition_from_pending(&ctx.pool, d.id, "rejected", Some("영수증 판독 불가 사유"), to_millis(clock.now()), 1)
                .await
                .unwrap();
            if i < 2 {
                assert_eq!(fraud.check_suspicious_pattern(user).await.unwrap(), None);
            }
        }
        assert!(fraud.check_suspicious_pattern(user).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_review_alert_once() {
        let (ctx, _clock) = testing::context().await;
        let fraud = FraudHeuristics::new(ctx.pool.clone(), ctx.clock.clone());
        let ana = testing::user_with_balance(&ctx, "ana@example.com", Money::ZERO).await;
        let bob = testing::user_with_balance(&ctx, "bob@example.com", Money::ZERO).await;
        insert_deposit(&ctx, ana, "REC-A", "receipts/1.jpg").await;
        let copied = insert_deposit(&ctx, bob, "REC-B", "receipts/1.jpg").await;
        let alert_id = fraud.check_duplicate_receipt(&copied).await.unwrap().unwrap();

        let meta = RequestMeta::default();
        let reviewed = fraud.review_alert(alert_id, 7, &meta).await.unwrap();
        assert!(reviewed.reviewed);
        assert_eq!(reviewed.reviewed_by, Some(7));

        let err = fraud.review_alert(alert_id, 7, &meta).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        let err = fraud.review_alert(999, 7, &meta).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        assert!(fraud.list_alerts(Some(false), 10).await.unwrap().is_empty());
        assert_eq!(fraud.list_alerts(Some(true), 10).await.unwrap().len(), 1);

        // 검토 후에는 같은 종류의 새 경고가 다시 생길 수 있음
        assert!(fraud.check_duplicate_receipt(&copied).await.unwrap().is_some());
    }
}
