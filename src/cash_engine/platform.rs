//! 코어 진입점
//!
//! 요청 핸들러가 호출하는 작업(충전/출금 접수·승인·거절, 대기열, 통계)을 한곳에 모읍니다.

use std::sync::Arc;

use sqlx::sqlite::SqlitePool;

use super::accounts::AccountService;
use super::audit::AuditTrail;
use super::deposit::DepositService;
use super::fraud::FraudHeuristics;
use super::model::{
    AdminId, AuditEntry, Deposit, OperationState, PendingQueue, PlatformSettings, PlatformStats, RequestMeta,
    SecurityAlert, StateBreakdown, UserId, Withdrawal,
};
use super::referral::{BonusOutcome, ReferralEngine};
use super::settings::{SettingsStore, SettingsUpdate};
use super::withdrawal::WithdrawalService;
use super::EngineContext;
use crate::clock::Clock;
use crate::db::repository::{
    DepositRepository, ReferralRepository, SecurityAlertRepository, UserRepository, WithdrawalRepository,
};
use crate::error::CoreResult;
use crate::money::Money;
use crate::notify::Notifier;

pub struct CashPlatform {
    ctx: EngineContext,
    accounts: AccountService,
    deposits: DepositService,
    withdrawals: WithdrawalService,
    referrals: Arc<ReferralEngine>,
    fraud: Arc<FraudHeuristics>,
}

impl CashPlatform {
    pub fn new(
        pool: SqlitePool,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn Notifier>,
        settings_ttl: std::time::Duration,
    ) -> Self {
        let settings = Arc::new(SettingsStore::new(pool.clone(), clock.clone(), settings_ttl));
        Self::with_context(EngineContext {
            pool,
            clock,
            settings,
            notifier,
        })
    }

    pub fn with_context(ctx: EngineContext) -> Self {
        let fraud = Arc::new(FraudHeuristics::new(ctx.pool.clone(), ctx.clock.clone()));
        let referrals = Arc::new(ReferralEngine::new(ctx.clone()));
        Self {
            accounts: AccountService::new(ctx.clone()),
            deposits: DepositService::new(ctx.clone(), fraud.clone(), referrals.clone()),
            withdrawals: WithdrawalService::new(ctx.clone(), fraud.clone()),
            referrals,
            fraud,
            ctx,
        }
    }

    pub fn accounts(&self) -> &AccountService {
        &self.accounts
    }

    pub fn deposits(&self) -> &DepositService {
        &self.deposits
    }

    pub fn withdrawals(&self) -> &WithdrawalService {
        &self.withdrawals
    }

    pub fn referrals(&self) -> &ReferralEngine {
        &self.referrals
    }

    pub fn fraud(&self) -> &FraudHeuristics {
        &self.fraud
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.ctx.settings
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.ctx.pool
    }

    pub async fn submit_deposit(
        &self,
        user_id: UserId,
        amount: Money,
        receipt_url: &str,
        meta: &RequestMeta,
    ) -> CoreResult<Deposit> {
        self.deposits.submit(user_id, amount, receipt_url, meta).await
    }

    pub async fn approve_deposit(&self, deposit_id: i64, admin: AdminId, meta: &RequestMeta) -> CoreResult<Deposit> {
        self.deposits.approve(deposit_id, admin, meta).await
    }

    pub async fn reject_deposit(
        &self,
        deposit_id: i64,
        admin: AdminId,
        reason: &str,
        meta: &RequestMeta,
    ) -> CoreResult<Deposit> {
        self.deposits.reject(deposit_id, admin, reason, meta).await
    }

    pub async fn submit_withdrawal(
        &self,
        user_id: UserId,
        bank_account_id: i64,
        amount: Money,
        meta: &RequestMeta,
    ) -> CoreResult<Withdrawal> {
        self.withdrawals.submit(user_id, bank_account_id, amount, meta).await
    }

    pub async fn approve_withdrawal(
        &self,
        withdrawal_id: i64,
        admin: AdminId,
        proof_url: Option<&str>,
        meta: &RequestMeta,
    ) -> CoreResult<Withdrawal> {
        self.withdrawals.approve(withdrawal_id, admin, proof_url, meta).await
    }

    pub async fn reject_withdrawal(
        &self,
        withdrawal_id: i64,
        admin: AdminId,
        reason: &str,
        meta: &RequestMeta,
    ) -> CoreResult<Withdrawal> {
        self.withdrawals.reject(withdrawal_id, admin, reason, meta).await
    }

    /// 보너스 재평가 (멱등, 재시도용)
    pub async fn try_grant_bonus(&self, user_id: UserId) -> CoreResult<BonusOutcome> {
        self.referrals.try_grant_bonus(user_id).await
    }

    /// 관리자 검토 대기열 (오래된 순)
    pub async fn list_pending(&self, limit: i64) -> CoreResult<PendingQueue> {
        let deposits = DepositRepository::find_pending(&self.ctx.pool, limit)
            .await?
            .into_iter()
            .map(Deposit::try_from)
            .collect::<CoreResult<Vec<_>>>()?;
        let withdrawals = WithdrawalRepository::find_pending(&self.ctx.pool, limit)
            .await?
            .into_iter()
            .map(Withdrawal::try_from)
            .collect::<CoreResult<Vec<_>>>()?;

        Ok(PendingQueue { deposits, withdrawals })
    }

    /// 대시보드 통계
    pub async fn get_stats(&self) -> CoreResult<PlatformStats> {
        let pool = &self.ctx.pool;

        // 집계 쿼리는 서로 독립적이라 동시에 실행
        let (
            (users, total_balance),
            deposit_states,
            withdrawal_states,
            (deposited, commission, credited),
            approved_withdrawn,
            pending_withdrawn,
            (bonuses, bonus_each_total),
            unreviewed_alerts,
        ) = futures::try_join!(
            UserRepository::totals(pool),
            DepositRepository::count_by_state(pool),
            WithdrawalRepository::count_by_state(pool),
            DepositRepository::approved_volume(pool),
            WithdrawalRepository::volume_by_state(pool, OperationState::Approved.as_str()),
            WithdrawalRepository::volume_by_state(pool, OperationState::Pending.as_str()),
            ReferralRepository::granted_totals(pool),
            SecurityAlertRepository::count_unreviewed(pool),
        )?;

        Ok(PlatformStats {
            users,
            total_balance: Money::from_minor(total_balance),
            deposits: breakdown(deposit_states),
            withdrawals: breakdown(withdrawal_states),
            approved_deposit_volume: Money::from_minor(deposited),
            commission_collected: Money::from_minor(commission),
            credited_net_volume: Money::from_minor(credited),
            approved_withdrawal_volume: Money::from_minor(approved_withdrawn),
            pending_withdrawal_volume: Money::from_minor(pending_withdrawn),
            referral_bonuses_granted: bonuses,
            // 양측에 같은 금액 지급
            referral_bonus_paid: Money::from_minor(bonus_each_total * 2),
            unreviewed_alerts,
        })
    }

    pub async fn list_alerts(&self, reviewed: Option<bool>, limit: i64) -> CoreResult<Vec<SecurityAlert>> {
        self.fraud.list_alerts(reviewed, limit).await
    }

    pub async fn review_alert(&self, alert_id: i64, admin: AdminId, meta: &RequestMeta) -> CoreResult<SecurityAlert> {
        self.fraud.review_alert(alert_id, admin, meta).await
    }

    pub async fn current_settings(&self) -> CoreResult<PlatformSettings> {
        self.ctx.settings.snapshot().await
    }

    pub async fn update_settings(
        &self,
        admin: AdminId,
        meta: &RequestMeta,
        changes: &SettingsUpdate,
    ) -> CoreResult<PlatformSettings> {
        self.ctx.settings.update(admin, meta, changes).await
    }

    /// 감사 로그 조회. 사용자를 지정하면 해당 사용자 대상 항목만
    pub async fn audit_log(&self, user_id: Option<UserId>, limit: i64) -> CoreResult<Vec<AuditEntry>> {
        match user_id {
            Some(user_id) => AuditTrail::entries_for_user(&self.ctx.pool, user_id, limit).await,
            None => AuditTrail::recent(&self.ctx.pool, limit).await,
        }
    }
}

fn breakdown(rows: Vec<(String, i64)>) -> StateBreakdown {
    let mut out = StateBreakdown::default();
    for (state, count) in rows {
        match OperationState::parse(&state) {
            Some(OperationState::Pending) => out.pending = count,
            Some(OperationState::Approved) => out.approved = count,
            Some(OperationState::Rejected) => out.rejected = count,
            None => {}
        }
    }
    out
}
