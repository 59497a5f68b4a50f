//! 충전(recarga) 상태 머신
//!
//! pending → approved | rejected (한 방향, 종료 상태는 불변)
//!
//! 승인은 상태 전이, 잔고 입금, 감사 로그를 하나의 트랜잭션으로 커밋한 뒤
//! 리퍼럴 보너스 엔진을 호출합니다. 보너스 실패는 승인을 되돌리지 않습니다.

use std::sync::Arc;

use log::{info, warn};
use serde_json::json;
use sqlx::SqliteConnection;

use super::audit::{actions, AuditRecord, AuditTrail};
use super::fraud::FraudHeuristics;
use super::ledger::BalanceLedger;
use super::model::{Actor, AdminId, Deposit, OperationState, RequestMeta, UserId};
use super::referral::ReferralEngine;
use super::{new_operation_id, EngineContext};
use crate::db::models::{to_millis, NewDepositRecord};
use crate::db::repository::{DepositRepository, UserRepository};
use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::notify::Notification;

/// 거절 사유 최소 길이 (문자 수)
pub const MIN_REJECTION_REASON_CHARS: usize = 10;

pub struct DepositService {
    ctx: EngineContext,
    fraud: Arc<FraudHeuristics>,
    referrals: Arc<ReferralEngine>,
}

impl DepositService {
    pub fn new(ctx: EngineContext, fraud: Arc<FraudHeuristics>, referrals: Arc<ReferralEngine>) -> Self {
        Self { ctx, fraud, referrals }
    }

    /// 충전 접수
    ///
    /// 현재 설정의 한도로 금액을 검증하고, 수수료율을 스냅샷으로 고정해
    /// 수수료와 순입금액을 한 번만 계산합니다.
    pub async fn submit(
        &self,
        user_id: UserId,
        amount: Money,
        receipt_url: &str,
        meta: &RequestMeta,
    ) -> CoreResult<Deposit> {
        let settings = self.ctx.settings.snapshot().await?;
        if settings.maintenance_mode {
            return Err(CoreError::Maintenance(
                settings
                    .maintenance_message
                    .unwrap_or_else(|| "충전 접수가 일시 중단되었습니다".to_string()),
            ));
        }

        if amount < settings.min_deposit || amount > settings.max_deposit {
            return Err(CoreError::validation(format!(
                "충전 금액은 {} 이상 {} 이하여야 합니다: {}",
                settings.min_deposit, settings.max_deposit, amount
            )));
        }
        let receipt_url = receipt_url.trim();
        if receipt_url.is_empty() {
            return Err(CoreError::validation("영수증이 필요합니다"));
        }
        if UserRepository::find(&self.ctx.pool, user_id).await?.is_none() {
            return Err(CoreError::not_found("user", user_id));
        }

        let commission_percent = settings.commission_percent;
        let commission_amount = amount.percent(commission_percent);
        let net_amount = amount
            .checked_sub(commission_amount)
            .ok_or_else(|| CoreError::validation("수수료가 충전 금액을 초과합니다"))?;

        let now = self.ctx.now();
        let operation_id = new_operation_id("REC", now);
        let record = NewDepositRecord {
            operation_id: operation_id.clone(),
            user_id,
            amount_deposited: amount.minor(),
            commission_percent: commission_percent.to_string(),
            commission_amount: commission_amount.minor(),
            net_amount: net_amount.minor(),
            receipt_url: receipt_url.to_string(),
            submitted_at: to_millis(now),
        };

        let mut tx = self.ctx.pool.begin().await?;
        let id = DepositRepository::insert(&mut *tx, &record).await?;

        let audit = AuditRecord::new(actions::DEPOSIT_SUBMITTED, Actor::User(user_id))
            .subject(user_id)
            .meta(meta)
            .details(json!({
                "deposit_id": id,
                "operation_id": operation_id,
                "amount_deposited": amount,
                "commission_percent": commission_percent,
                "commission_amount": commission_amount,
                "net_amount": net_amount,
                "receipt_url": receipt_url,
            }));
        AuditTrail::record(&mut *tx, &audit, now).await?;
        tx.commit().await?;

        info!(
            "📥 충전 접수 {} (사용자 {}): {} - 수수료 {}% {} = {}",
            operation_id, user_id, amount, commission_percent, commission_amount, net_amount
        );

        let deposit = Deposit {
            id,
            operation_id,
            user_id,
            amount_deposited: amount,
            commission_percent,
            commission_amount,
            net_amount,
            receipt_url: receipt_url.to_string(),
            state: OperationState::Pending,
            rejection_reason: None,
            submitted_at: now,
            processed_at: None,
            processed_by: None,
        };

        self.fraud.after_deposit_submitted(&deposit).await;
        Ok(deposit)
    }

    /// 충전 승인: 상태 전이 + 순입금액 입금 (원자적)
    pub async fn approve(&self, deposit_id: i64, admin: AdminId, meta: &RequestMeta) -> CoreResult<Deposit> {
        let now = self.ctx.now();
        let mut tx = self.ctx.pool.begin().await?;

        // 첫 문장이 쓰기: 동시 승인 중 하나만 pending을 선점
        let claimed = DepositRepository::transition_from_pending(
            &mut *tx,
            deposit_id,
            OperationState::Approved.as_str(),
            None,
            to_millis(now),
            admin,
        )
        .await?;
        if claimed == 0 {
            return Err(claim_failure(&mut tx, deposit_id).await);
        }

        let deposit = load(&mut tx, deposit_id).await?;
        let change = BalanceLedger::credit(&mut tx, deposit.user_id, deposit.net_amount).await?;

        let audit = AuditRecord::new(actions::DEPOSIT_APPROVED, Actor::Admin(admin))
            .subject(deposit.user_id)
            .meta(meta)
            .details(json!({
                "deposit_id": deposit.id,
                "operation_id": deposit.operation_id,
                "amount_deposited": deposit.amount_deposited,
                "commission_percent": deposit.commission_percent,
                "commission_amount": deposit.commission_amount,
                "net_amount": deposit.net_amount,
                "previous_balance": change.previous,
                "new_balance": change.current,
            }));
        AuditTrail::record(&mut *tx, &audit, now).await?;
        tx.commit().await?;

        info!(
            "✅ 충전 승인 {} (관리자 {}): 사용자 {} 잔고 {} → {}",
            deposit.operation_id, admin, deposit.user_id, change.previous, change.current
        );

        self.ctx.notify(Notification::DepositApproved {
            user_id: deposit.user_id,
            operation_id: deposit.operation_id.clone(),
            net_amount: deposit.net_amount,
            new_balance: change.current,
        });

        // 커밋 이후 보너스 평가 (실패해도 승인은 유지, 재호출 안전)
        if let Err(e) = self.referrals.try_grant_bonus(deposit.user_id).await {
            warn!("⚠️ 사용자 {} 리퍼럴 보너스 평가 실패: {}", deposit.user_id, e);
        }

        Ok(deposit)
    }

    /// 충전 거절 (잔고 변화 없음)
    pub async fn reject(
        &self,
        deposit_id: i64,
        admin: AdminId,
        reason: &str,
        meta: &RequestMeta,
    ) -> CoreResult<Deposit> {
        let reason = reason.trim();
        if reason.chars().count() < MIN_REJECTION_REASON_CHARS {
            return Err(CoreError::validation(format!(
                "거절 사유는 {}자 이상이어야 합니다",
                MIN_REJECTION_REASON_CHARS
            )));
        }

        let now = self.ctx.now();
        let mut tx = self.ctx.pool.begin().await?;

        let claimed = DepositRepository::transition_from_pending(
            &mut *tx,
            deposit_id,
            OperationState::Rejected.as_str(),
            Some(reason),
            to_millis(now),
            admin,
        )
        .await?;
        if claimed == 0 {
            return Err(claim_failure(&mut tx, deposit_id).await);
        }

        let deposit = load(&mut tx, deposit_id).await?;
        let audit = AuditRecord::new(actions::DEPOSIT_REJECTED, Actor::Admin(admin))
            .subject(deposit.user_id)
            .meta(meta)
            .details(json!({
                "deposit_id": deposit.id,
                "operation_id": deposit.operation_id,
                "amount_deposited": deposit.amount_deposited,
                "reason": reason,
            }));
        AuditTrail::record(&mut *tx, &audit, now).await?;
        tx.commit().await?;

        info!("❌ 충전 거절 {} (관리자 {}): {}", deposit.operation_id, admin, reason);

        self.ctx.notify(Notification::DepositRejected {
            user_id: deposit.user_id,
            operation_id: deposit.operation_id.clone(),
            reason: reason.to_string(),
        });

        Ok(deposit)
    }

    pub async fn find(&self, deposit_id: i64) -> CoreResult<Deposit> {
        DepositRepository::find(&self.ctx.pool, deposit_id)
            .await?
            .ok_or_else(|| CoreError::not_found("deposit", deposit_id))
            .and_then(Deposit::try_from)
    }

    /// 사용자 충전 내역 (최신순)
    pub async fn for_user(&self, user_id: UserId, limit: i64) -> CoreResult<Vec<Deposit>> {
        DepositRepository::find_by_user(&self.ctx.pool, user_id, limit)
            .await?
            .into_iter()
            .map(Deposit::try_from)
            .collect()
    }
}

async fn load(conn: &mut SqliteConnection, deposit_id: i64) -> CoreResult<Deposit> {
    DepositRepository::find(&mut *conn, deposit_id)
        .await?
        .ok_or_else(|| CoreError::not_found("deposit", deposit_id))
        .and_then(Deposit::try_from)
}

/// pending 선점 실패 원인 (없음 / 이미 처리됨)
async fn claim_failure(conn: &mut SqliteConnection, deposit_id: i64) -> CoreError {
    match DepositRepository::find(&mut *conn, deposit_id).await {
        Ok(Some(record)) => CoreError::AlreadyProcessed {
            entity: "deposit",
            id: record.operation_id,
            state: record.state,
        },
        Ok(None) => CoreError::not_found("deposit", deposit_id),
        Err(e) => e.into(),
    }
}
