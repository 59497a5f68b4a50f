//! 출금(retiro) 상태 머신
//!
//! pending → approved | rejected
//!
//! 접수 시 잔고를 예약하지 않으므로, 승인 시점에 잔고를 다시 검증합니다.
//! 검증과 차감은 원장 변경기의 조건부 UPDATE 한 문장으로 처리됩니다.

use std::sync::Arc;

use log::info;
use serde_json::json;
use sqlx::SqliteConnection;

use super::audit::{actions, AuditRecord, AuditTrail};
use super::fraud::FraudHeuristics;
use super::ledger::BalanceLedger;
use super::model::{Actor, AdminId, OperationState, RequestMeta, UserId, Withdrawal};
use super::{new_operation_id, EngineContext};
use crate::db::models::to_millis;
use crate::db::repository::{PayoutAccountRepository, UserRepository, WithdrawalRepository};
use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::notify::Notification;

pub struct WithdrawalService {
    ctx: EngineContext,
    fraud: Arc<FraudHeuristics>,
}

impl WithdrawalService {
    pub fn new(ctx: EngineContext, fraud: Arc<FraudHeuristics>) -> Self {
        Self { ctx, fraud }
    }

    /// 출금 접수 (잔고 사전 검사만, 예약 없음)
    pub async fn submit(
        &self,
        user_id: UserId,
        bank_account_id: i64,
        amount: Money,
        meta: &RequestMeta,
    ) -> CoreResult<Withdrawal> {
        let settings = self.ctx.settings.snapshot().await?;
        if settings.maintenance_mode {
            return Err(CoreError::Maintenance(
                settings
                    .maintenance_message
                    .unwrap_or_else(|| "출금 접수가 일시 중단되었습니다".to_string()),
            ));
        }

        if !amount.is_positive() {
            return Err(CoreError::validation(format!("출금 금액은 0보다 커야 합니다: {}", amount)));
        }

        let user = UserRepository::find(&self.ctx.pool, user_id)
            .await?
            .ok_or_else(|| CoreError::not_found("user", user_id))?;
        let account = PayoutAccountRepository::find(&self.ctx.pool, bank_account_id)
            .await?
            .ok_or_else(|| CoreError::not_found("payout_account", bank_account_id))?;
        if account.user_id != user_id {
            return Err(CoreError::validation("본인 명의의 출금 계좌가 아닙니다"));
        }
        if account.archived_at.is_some() {
            return Err(CoreError::validation("보관 처리된 출금 계좌입니다"));
        }

        let balance = Money::from_minor(user.balance);
        if amount > balance {
            return Err(CoreError::InsufficientBalance {
                available: balance,
                requested: amount,
            });
        }

        let now = self.ctx.now();
        let operation_id = new_operation_id("RET", now);

        let mut tx = self.ctx.pool.begin().await?;
        // 사전 검사 이후 계좌가 보관되었으면 삽입되지 않음
        let id = WithdrawalRepository::insert(&mut *tx, &operation_id, user_id, bank_account_id, amount.minor(), to_millis(now))
            .await?
            .ok_or_else(|| CoreError::validation("보관 처리된 출금 계좌입니다"))?;

        let audit = AuditRecord::new(actions::WITHDRAWAL_SUBMITTED, Actor::User(user_id))
            .subject(user_id)
            .meta(meta)
            .details(json!({
                "withdrawal_id": id,
                "operation_id": operation_id,
                "bank_account_id": bank_account_id,
                "amount": amount,
                "balance_at_submission": balance,
            }));
        AuditTrail::record(&mut *tx, &audit, now).await?;
        tx.commit().await?;

        info!(
            "📤 출금 접수 {} (사용자 {}): {} (잔고 {})",
            operation_id, user_id, amount, balance
        );

        let withdrawal = Withdrawal {
            id,
            operation_id,
            user_id,
            bank_account_id,
            amount,
            state: OperationState::Pending,
            rejection_reason: None,
            proof_url: None,
            submitted_at: now,
            processed_at: None,
            processed_by: None,
        };

        self.fraud.after_withdrawal_submitted(&withdrawal, balance).await;
        Ok(withdrawal)
    }

    /// 출금 승인: 상태 전이 + 잔고 차감 (원자적)
    ///
    /// 잔고가 부족하면 `InsufficientBalance`로 실패하고 상태 전이도 롤백됩니다.
    pub async fn approve(
        &self,
        withdrawal_id: i64,
        admin: AdminId,
        proof_url: Option<&str>,
        meta: &RequestMeta,
    ) -> CoreResult<Withdrawal> {
        let proof_url = proof_url.map(str::trim).filter(|p| !p.is_empty());
        let now = self.ctx.now();
        let mut tx = self.ctx.pool.begin().await?;

        let claimed = WithdrawalRepository::transition_from_pending(
            &mut *tx,
            withdrawal_id,
            OperationState::Approved.as_str(),
            None,
            proof_url,
            to_millis(now),
            admin,
        )
        .await?;
        if claimed == 0 {
            return Err(claim_failure(&mut tx, withdrawal_id).await);
        }

        let withdrawal = load(&mut tx, withdrawal_id).await?;
        let change = BalanceLedger::debit(&mut tx, withdrawal.user_id, withdrawal.amount).await?;

        let audit = AuditRecord::new(actions::WITHDRAWAL_APPROVED, Actor::Admin(admin))
            .subject(withdrawal.user_id)
            .meta(meta)
            .details(json!({
                "withdrawal_id": withdrawal.id,
                "operation_id": withdrawal.operation_id,
                "bank_account_id": withdrawal.bank_account_id,
                "amount": withdrawal.amount,
                "proof_url": withdrawal.proof_url,
                "previous_balance": change.previous,
                "new_balance": change.current,
            }));
        AuditTrail::record(&mut *tx, &audit, now).await?;
        tx.commit().await?;

        info!(
            "✅ 출금 승인 {} (관리자 {}): 사용자 {} 잔고 {} → {}",
            withdrawal.operation_id, admin, withdrawal.user_id, change.previous, change.current
        );

        self.ctx.notify(Notification::WithdrawalApproved {
            user_id: withdrawal.user_id,
            operation_id: withdrawal.operation_id.clone(),
            amount: withdrawal.amount,
            proof_url: withdrawal.proof_url.clone(),
        });

        Ok(withdrawal)
    }

    /// 출금 거절 (잔고 변화 없음)
    pub async fn reject(
        &self,
        withdrawal_id: i64,
        admin: AdminId,
        reason: &str,
        meta: &RequestMeta,
    ) -> CoreResult<Withdrawal> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(CoreError::validation("거절 사유가 필요합니다"));
        }

        let now = self.ctx.now();
        let mut tx = self.ctx.pool.begin().await?;

        let claimed = WithdrawalRepository::transition_from_pending(
            &mut *tx,
            withdrawal_id,
            OperationState::Rejected.as_str(),
            Some(reason),
            None,
            to_millis(now),
            admin,
        )
        .await?;
        if claimed == 0 {
            return Err(claim_failure(&mut tx, withdrawal_id).await);
        }

        let withdrawal = load(&mut tx, withdrawal_id).await?;
        let audit = AuditRecord::new(actions::WITHDRAWAL_REJECTED, Actor::Admin(admin))
            .subject(withdrawal.user_id)
            .meta(meta)
            .details(json!({
                "withdrawal_id": withdrawal.id,
                "operation_id": withdrawal.operation_id,
                "amount": withdrawal.amount,
                "reason": reason,
            }));
        AuditTrail::record(&mut *tx, &audit, now).await?;
        tx.commit().await?;

        info!("❌ 출금 거절 {} (관리자 {}): {}", withdrawal.operation_id, admin, reason);

        self.ctx.notify(Notification::WithdrawalRejected {
            user_id: withdrawal.user_id,
            operation_id: withdrawal.operation_id.clone(),
            reason: reason.to_string(),
        });

        Ok(withdrawal)
    }

    pub async fn find(&self, withdrawal_id: i64) -> CoreResult<Withdrawal> {
        WithdrawalRepository::find(&self.ctx.pool, withdrawal_id)
            .await?
            .ok_or_else(|| CoreError::not_found("withdrawal", withdrawal_id))
            .and_then(Withdrawal::try_from)
    }

    /// 사용자 출금 내역 (최신순)
    pub async fn for_user(&self, user_id: UserId, limit: i64) -> CoreResult<Vec<Withdrawal>> {
        WithdrawalRepository::find_by_user(&self.ctx.pool, user_id, limit)
            .await?
            .into_iter()
            .map(Withdrawal::try_from)
            .collect()
    }
}

async fn load(conn: &mut SqliteConnection, withdrawal_id: i64) -> CoreResult<Withdrawal> {
    WithdrawalRepository::find(&mut *conn, withdrawal_id)
        .await?
        .ok_or_else(|| CoreError::not_found("withdrawal", withdrawal_id))
        .and_then(Withdrawal::try_from)
}

async fn claim_failure(conn: &mut SqliteConnection, withdrawal_id: i64) -> CoreError {
    match WithdrawalRepository::find(&mut *conn, withdrawal_id).await {
        Ok(Some(record)) => CoreError::AlreadyProcessed {
            entity: "withdrawal",
            id: record.operation_id,
            state: record.state,
        },
        Ok(None) => CoreError::not_found("withdrawal", withdrawal_id),
        Err(e) => e.into(),
    }
}
