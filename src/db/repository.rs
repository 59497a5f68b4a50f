//! 저장소 계층
//!
//! 모든 함수는 실행기(풀 또는 트랜잭션 연결)를 인자로 받아,
//! 상태 전이와 잔고 변경을 호출자가 하나의 트랜잭션으로 묶을 수 있게 합니다.

use sqlx::{Executor, Sqlite};
use sqlx::Error as SqlxError;

use super::models::{
    AuditLogRecord, DepositRecord, NewDepositRecord, PayoutAccountRecord, ReferralRecord, SecurityAlertRecord,
    SettingsRecord, UserRecord, WithdrawalRecord,
};

const USER_COLUMNS: &str =
    "id, email, full_name, balance, referral_code, referred_by, referral_bonus_consumed, created_at";
const DEPOSIT_COLUMNS: &str = "id, operation_id, user_id, amount_deposited, commission_percent, commission_amount, \
     net_amount, receipt_url, state, rejection_reason, submitted_at, processed_at, processed_by";
const WITHDRAWAL_COLUMNS: &str = "id, operation_id, user_id, bank_account_id, amount, state, rejection_reason, \
     proof_url, submitted_at, processed_at, processed_by";
const ALERT_COLUMNS: &str =
    "id, user_id, kind, description, details, reviewed, reviewed_by, reviewed_at, created_at";
const AUDIT_COLUMNS: &str =
    "id, action, actor_kind, actor_id, subject_user_id, ip_address, user_agent, details, created_at";

/// 사용자 저장소
pub struct UserRepository;

impl UserRepository {
    /// 사용자 생성
    pub async fn insert<'e, E>(
        executor: E,
        email: &str,
        full_name: &str,
        referral_code: &str,
        referred_by: Option<i64>,
        created_at: i64,
    ) -> Result<i64, SqlxError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query(
            "INSERT INTO users (email, full_name, balance, referral_code, referred_by, referral_bonus_consumed, created_at)
             VALUES (?, ?, 0, ?, ?, 0, ?)"
        )
        .bind(email)
        .bind(full_name)
        .bind(referral_code)
        .bind(referred_by)
        .bind(created_at)
        .execute(executor)
        .await?;

        Ok(result.last_insert_rowid())
    }

    pub async fn find<'e, E>(executor: E, id: i64) -> Result<Option<UserRecord>, SqlxError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, UserRecord>(&format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS))
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    pub async fn find_by_referral_code<'e, E>(executor: E, code: &str) -> Result<Option<UserRecord>, SqlxError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, UserRecord>(&format!("SELECT {} FROM users WHERE referral_code = ?", USER_COLUMNS))
            .bind(code)
            .fetch_optional(executor)
            .await
    }

    /// 잔고 증가. 사용자가 없으면 None
    pub async fn add_balance<'e, E>(executor: E, id: i64, amount: i64) -> Result<Option<i64>, SqlxError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_scalar("UPDATE users SET balance = balance + ?1 WHERE id = ?2 RETURNING balance")
            .bind(amount)
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// 잔고가 충분할 때만 차감 (검사와 변경이 한 문장)
    ///
    /// 사용자가 없거나 잔고가 부족하면 None
    pub async fn subtract_balance_if_sufficient<'e, E>(
        executor: E,
        id: i64,
        amount: i64,
    ) -> Result<Option<i64>, SqlxError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_scalar(
            "UPDATE users SET balance = balance - ?1 WHERE id = ?2 AND balance >= ?1 RETURNING balance"
        )
        .bind(amount)
        .bind(id)
        .fetch_optional(executor)
        .await
    }

    /// 가입 보너스 수령 표시 (추천인이 있고 아직 미수령일 때만). 추천인 ID 반환
    pub async fn claim_referral_bonus<'e, E>(executor: E, id: i64) -> Result<Option<i64>, SqlxError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_scalar(
            "UPDATE users SET referral_bonus_consumed = 1
             WHERE id = ? AND referred_by IS NOT NULL AND referral_bonus_consumed = 0
             RETURNING referred_by"
        )
        .bind(id)
        .fetch_optional(executor)
        .await
    }

    /// (사용자 수, 잔고 합계)
    pub async fn totals<'e, E>(executor: E) -> Result<(i64, i64), SqlxError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as("SELECT COUNT(*), COALESCE(SUM(balance), 0) FROM users")
            .fetch_one(executor)
            .await
    }
}

/// 출금 계좌 저장소
pub struct PayoutAccountRepository;

impl PayoutAccountRepository {
    pub async fn insert<'e, E>(
        executor: E,
        user_id: i64,
        bank_name: &str,
        account_number: &str,
        holder_name: &str,
        created_at: i64,
    ) -> Result<i64, SqlxError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query(
            "INSERT INTO payout_accounts (user_id, bank_name, account_number, holder_name, created_at)
             VALUES (?, ?, ?, ?, ?)"
        )
        .bind(user_id)
        .bind(bank_name)
        .bind(account_number)
        .bind(holder_name)
        .bind(created_at)
        .execute(executor)
        .await?;

        Ok(result.last_insert_rowid())
    }

    pub async fn find<'e, E>(executor: E, id: i64) -> Result<Option<PayoutAccountRecord>, SqlxError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, PayoutAccountRecord>(
            "SELECT id, user_id, bank_name, account_number, holder_name, created_at, archived_at
             FROM payout_accounts
             WHERE id = ?"
        )
        .bind(id)
        .fetch_optional(executor)
        .await
    }

    pub async fn find_active_by_user<'e, E>(executor: E, user_id: i64) -> Result<Vec<PayoutAccountRecord>, SqlxError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, PayoutAccountRecord>(
            "SELECT id, user_id, bank_name, account_number, holder_name, created_at, archived_at
             FROM payout_accounts
             WHERE user_id = ? AND archived_at IS NULL
             ORDER BY id ASC"
        )
        .bind(user_id)
        .fetch_all(executor)
        .await
    }

    /// 대기 중인 출금이 없을 때만 보관 처리 (검사와 변경이 한 문장)
    pub async fn archive_if_unused<'e, E>(
        executor: E,
        id: i64,
        user_id: i64,
        archived_at: i64,
    ) -> Result<u64, SqlxError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query(
            "UPDATE payout_accounts SET archived_at = ?1
             WHERE id = ?2 AND user_id = ?3 AND archived_at IS NULL
               AND NOT EXISTS (
                   SELECT 1 FROM withdrawals WHERE bank_account_id = ?2 AND state = 'pending'
               )"
        )
        .bind(archived_at)
        .bind(id)
        .bind(user_id)
        .execute(executor)
        .await?;

        Ok(result.rows_affected())
    }
}

/// 충전 저장소
pub struct DepositRepository;

impl DepositRepository {
    /// 대기 상태로 저장
    pub async fn insert<'e, E>(executor: E, deposit: &NewDepositRecord) -> Result<i64, SqlxError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query(
            "INSERT INTO deposits
             (operation_id, user_id, amount_deposited, commission_percent, commission_amount, net_amount,
              receipt_url, state, submitted_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, 'pending', ?)"
        )
        .bind(&deposit.operation_id)
        .bind(deposit.user_id)
        .bind(deposit.amount_deposited)
        .bind(&deposit.commission_percent)
        .bind(deposit.commission_amount)
        .bind(deposit.net_amount)
        .bind(&deposit.receipt_url)
        .bind(deposit.submitted_at)
        .execute(executor)
        .await?;

        Ok(result.last_insert_rowid())
    }

    pub async fn find<'e, E>(executor: E, id: i64) -> Result<Option<DepositRecord>, SqlxError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, DepositRecord>(&format!("SELECT {} FROM deposits WHERE id = ?", DEPOSIT_COLUMNS))
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// 사용자별 충전 조회 (최신순)
    pub async fn find_by_user<'e, E>(executor: E, user_id: i64, limit: i64) -> Result<Vec<DepositRecord>, SqlxError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, DepositRecord>(&format!(
            "SELECT {} FROM deposits WHERE user_id = ? ORDER BY submitted_at DESC, id DESC LIMIT ?",
            DEPOSIT_COLUMNS
        ))
        .bind(user_id)
        .bind(limit)
        .fetch_all(executor)
        .await
    }

    /// 대기 중인 충전 (오래된 순)
    pub async fn find_pending<'e, E>(executor: E, limit: i64) -> Result<Vec<DepositRecord>, SqlxError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, DepositRecord>(&format!(
            "SELECT {} FROM deposits WHERE state = 'pending' ORDER BY submitted_at ASC, id ASC LIMIT ?",
            DEPOSIT_COLUMNS
        ))
        .bind(limit)
        .fetch_all(executor)
        .await
    }

    /// pending → 종료 상태 전이. 대기 상태가 아니면 0 반환
    pub async fn transition_from_pending<'e, E>(
        executor: E,
        id: i64,
        new_state: &str,
        rejection_reason: Option<&str>,
        processed_at: i64,
        processed_by: i64,
    ) -> Result<u64, SqlxError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query(
            "UPDATE deposits
             SET state = ?, rejection_reason = ?, processed_at = ?, processed_by = ?
             WHERE id = ? AND state = 'pending'"
        )
        .bind(new_state)
        .bind(rejection_reason)
        .bind(processed_at)
        .bind(processed_by)
        .bind(id)
        .execute(executor)
        .await?;

        Ok(result.rows_affected())
    }

    /// 시간 창 내 pending/approved 충전 건수
    pub async fn count_active_since<'e, E>(executor: E, user_id: i64, since: i64) -> Result<i64, SqlxError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM deposits
             WHERE user_id = ? AND state IN ('pending', 'approved') AND submitted_at >= ?"
        )
        .bind(user_id)
        .bind(since)
        .fetch_one(executor)
        .await
    }

    /// 시간 창 내 거절된 충전 건수 (처리 시각 기준)
    pub async fn count_rejected_since<'e, E>(executor: E, user_id: i64, since: i64) -> Result<i64, SqlxError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM deposits
             WHERE user_id = ? AND state = 'rejected' AND processed_at >= ?"
        )
        .bind(user_id)
        .bind(since)
        .fetch_one(executor)
        .await
    }

    /// 시간 창 내 승인된 충전 (건수, 순입금 합계)
    pub async fn approved_since<'e, E>(executor: E, user_id: i64, since: i64) -> Result<(i64, i64), SqlxError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as(
            "SELECT COUNT(*), COALESCE(SUM(net_amount), 0) FROM deposits
             WHERE user_id = ? AND state = 'approved' AND processed_at >= ?"
        )
        .bind(user_id)
        .bind(since)
        .fetch_one(executor)
        .await
    }

    /// 누적 승인 충전 건수
    pub async fn count_approved<'e, E>(executor: E, user_id: i64) -> Result<i64, SqlxError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_scalar("SELECT COUNT(*) FROM deposits WHERE user_id = ? AND state = 'approved'")
            .bind(user_id)
            .fetch_one(executor)
            .await
    }

    /// 첫 승인 시각
    pub async fn first_approved_at<'e, E>(executor: E, user_id: i64) -> Result<Option<i64>, SqlxError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_scalar("SELECT MIN(processed_at) FROM deposits WHERE user_id = ? AND state = 'approved'")
            .bind(user_id)
            .fetch_one(executor)
            .await
    }

    /// 다른 사용자의 충전에 같은 영수증이 붙어 있는지 조회
    pub async fn find_receipt_owned_by_other<'e, E>(
        executor: E,
        receipt_url: &str,
        user_id: i64,
    ) -> Result<Option<DepositRecord>, SqlxError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, DepositRecord>(&format!(
            "SELECT {} FROM deposits WHERE receipt_url = ? AND user_id <> ? ORDER BY id ASC LIMIT 1",
            DEPOSIT_COLUMNS
        ))
        .bind(receipt_url)
        .bind(user_id)
        .fetch_optional(executor)
        .await
    }

    /// 상태별 건수
    pub async fn count_by_state<'e, E>(executor: E) -> Result<Vec<(String, i64)>, SqlxError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as("SELECT state, COUNT(*) FROM deposits GROUP BY state")
            .fetch_all(executor)
            .await
    }

    /// 승인된 충전의 (입금 총액, 수수료 총액, 순입금 총액)
    pub async fn approved_volume<'e, E>(executor: E) -> Result<(i64, i64, i64), SqlxError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as(
            "SELECT COALESCE(SUM(amount_deposited), 0), COALESCE(SUM(commission_amount), 0),
                    COALESCE(SUM(net_amount), 0)
             FROM deposits WHERE state = 'approved'"
        )
        .fetch_one(executor)
        .await
    }
}

/// 출금 저장소
pub struct WithdrawalRepository;

impl WithdrawalRepository {
    /// 출금 요청 저장. 계좌가 본인 소유이고 보관되지 않은 경우에만 삽입 (아니면 None)
    ///
    /// 계좌 보관과 같은 문장 안에서 경합하므로 보관된 계좌에 대기 출금이 남지 않습니다.
    pub async fn insert<'e, E>(
        executor: E,
        operation_id: &str,
        user_id: i64,
        bank_account_id: i64,
        amount: i64,
        submitted_at: i64,
    ) -> Result<Option<i64>, SqlxError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_scalar(
            "INSERT INTO withdrawals (operation_id, user_id, bank_account_id, amount, state, submitted_at)
             SELECT ?1, ?2, ?3, ?4, 'pending', ?5
             WHERE EXISTS (
                 SELECT 1 FROM payout_accounts
                 WHERE id = ?3 AND user_id = ?2 AND archived_at IS NULL
             )
             RETURNING id"
        )
        .bind(operation_id)
        .bind(user_id)
        .bind(bank_account_id)
        .bind(amount)
        .bind(submitted_at)
        .fetch_optional(executor)
        .await
    }

    pub async fn find<'e, E>(executor: E, id: i64) -> Result<Option<WithdrawalRecord>, SqlxError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, WithdrawalRecord>(&format!("SELECT {} FROM withdrawals WHERE id = ?", WITHDRAWAL_COLUMNS))
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    pub async fn find_by_user<'e, E>(executor: E, user_id: i64, limit: i64) -> Result<Vec<WithdrawalRecord>, SqlxError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, WithdrawalRecord>(&format!(
            "SELECT {} FROM withdrawals WHERE user_id = ? ORDER BY submitted_at DESC, id DESC LIMIT ?",
            WITHDRAWAL_COLUMNS
        ))
        .bind(user_id)
        .bind(limit)
        .fetch_all(executor)
        .await
    }

    pub async fn find_pending<'e, E>(executor: E, limit: i64) -> Result<Vec<WithdrawalRecord>, SqlxError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, WithdrawalRecord>(&format!(
            "SELECT {} FROM withdrawals WHERE state = 'pending' ORDER BY submitted_at ASC, id ASC LIMIT ?",
            WITHDRAWAL_COLUMNS
        ))
        .bind(limit)
        .fetch_all(executor)
        .await
    }

    /// pending → 종료 상태 전이. 대기 상태가 아니면 0 반환
    pub async fn transition_from_pending<'e, E>(
        executor: E,
        id: i64,
        new_state: &str,
        rejection_reason: Option<&str>,
        proof_url: Option<&str>,
        processed_at: i64,
        processed_by: i64,
    ) -> Result<u64, SqlxError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query(
            "UPDATE withdrawals
             SET state = ?, rejection_reason = ?, proof_url = ?, processed_at = ?, processed_by = ?
             WHERE id = ? AND state = 'pending'"
        )
        .bind(new_state)
        .bind(rejection_reason)
        .bind(proof_url)
        .bind(processed_at)
        .bind(processed_by)
        .bind(id)
        .execute(executor)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn count_pending_for_account<'e, E>(executor: E, bank_account_id: i64) -> Result<i64, SqlxError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_scalar("SELECT COUNT(*) FROM withdrawals WHERE bank_account_id = ? AND state = 'pending'")
            .bind(bank_account_id)
            .fetch_one(executor)
            .await
    }

    pub async fn count_by_state<'e, E>(executor: E) -> Result<Vec<(String, i64)>, SqlxError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as("SELECT state, COUNT(*) FROM withdrawals GROUP BY state")
            .fetch_all(executor)
            .await
    }

    /// 상태별 금액 합계
    pub async fn volume_by_state<'e, E>(executor: E, state: &str) -> Result<i64, SqlxError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_scalar("SELECT COALESCE(SUM(amount), 0) FROM withdrawals WHERE state = ?")
            .bind(state)
            .fetch_one(executor)
            .await
    }
}

/// 리퍼럴 저장소
pub struct ReferralRepository;

impl ReferralRepository {
    pub async fn insert<'e, E>(executor: E, referrer_id: i64, referred_id: i64, created_at: i64) -> Result<i64, SqlxError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query(
            "INSERT INTO referrals (referrer_id, referred_id, bonus_granted, created_at)
             VALUES (?, ?, 0, ?)"
        )
        .bind(referrer_id)
        .bind(referred_id)
        .bind(created_at)
        .execute(executor)
        .await?;

        Ok(result.last_insert_rowid())
    }

    pub async fn find_by_referred<'e, E>(executor: E, referred_id: i64) -> Result<Option<ReferralRecord>, SqlxError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, ReferralRecord>(
            "SELECT id, referrer_id, referred_id, bonus_granted, bonus_amount, first_deposit_approved_at, created_at
             FROM referrals
             WHERE referred_id = ?"
        )
        .bind(referred_id)
        .fetch_optional(executor)
        .await
    }

    pub async fn find_by_referrer<'e, E>(executor: E, referrer_id: i64) -> Result<Vec<ReferralRecord>, SqlxError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, ReferralRecord>(
            "SELECT id, referrer_id, referred_id, bonus_granted, bonus_amount, first_deposit_approved_at, created_at
             FROM referrals
             WHERE referrer_id = ?
             ORDER BY id ASC"
        )
        .bind(referrer_id)
        .fetch_all(executor)
        .await
    }

    /// 추천인이 이미 받은 보너스 건수 (상한 계산용)
    pub async fn count_granted_by_referrer<'e, E>(executor: E, referrer_id: i64) -> Result<i64, SqlxError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_scalar("SELECT COUNT(*) FROM referrals WHERE referrer_id = ? AND bonus_granted = 1")
            .bind(referrer_id)
            .fetch_one(executor)
            .await
    }

    /// 보너스 지급 표시. 이미 지급된 경우 0 반환
    pub async fn mark_granted<'e, E>(
        executor: E,
        id: i64,
        bonus_amount: i64,
        first_deposit_approved_at: i64,
    ) -> Result<u64, SqlxError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query(
            "UPDATE referrals SET bonus_granted = 1, bonus_amount = ?, first_deposit_approved_at = ?
             WHERE id = ? AND bonus_granted = 0"
        )
        .bind(bonus_amount)
        .bind(first_deposit_approved_at)
        .bind(id)
        .execute(executor)
        .await?;

        Ok(result.rows_affected())
    }

    /// (지급 건수, 건당 보너스 합계)
    pub async fn granted_totals<'e, E>(executor: E) -> Result<(i64, i64), SqlxError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as("SELECT COUNT(*), COALESCE(SUM(bonus_amount), 0) FROM referrals WHERE bonus_granted = 1")
            .fetch_one(executor)
            .await
    }
}

/// 보안 경고 저장소
pub struct SecurityAlertRepository;

impl SecurityAlertRepository {
    /// 같은 종류의 미검토 경고가 시간 창 안에 없을 때만 생성 (단일 문장)
    pub async fn insert_unless_open<'e, E>(
        executor: E,
        user_id: i64,
        kind: &str,
        description: &str,
        details: &str,
        created_at: i64,
        window_start: i64,
    ) -> Result<Option<i64>, SqlxError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_scalar(
            "INSERT INTO security_alerts (user_id, kind, description, details, reviewed, created_at)
             SELECT ?1, ?2, ?3, ?4, 0, ?5
             WHERE NOT EXISTS (
                 SELECT 1 FROM security_alerts
                 WHERE user_id = ?1 AND kind = ?2 AND reviewed = 0 AND created_at >= ?6
             )
             RETURNING id"
        )
        .bind(user_id)
        .bind(kind)
        .bind(description)
        .bind(details)
        .bind(created_at)
        .bind(window_start)
        .fetch_optional(executor)
        .await
    }

    pub async fn find<'e, E>(executor: E, id: i64) -> Result<Option<SecurityAlertRecord>, SqlxError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, SecurityAlertRecord>(&format!("SELECT {} FROM security_alerts WHERE id = ?", ALERT_COLUMNS))
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// 경고 목록 (최신순). reviewed가 None이면 전체
    pub async fn list<'e, E>(executor: E, reviewed: Option<bool>, limit: i64) -> Result<Vec<SecurityAlertRecord>, SqlxError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, SecurityAlertRecord>(&format!(
            "SELECT {} FROM security_alerts
             WHERE (?1 IS NULL OR reviewed = ?1)
             ORDER BY created_at DESC, id DESC
             LIMIT ?2",
            ALERT_COLUMNS
        ))
        .bind(reviewed)
        .bind(limit)
        .fetch_all(executor)
        .await
    }

    pub async fn find_by_user<'e, E>(executor: E, user_id: i64) -> Result<Vec<SecurityAlertRecord>, SqlxError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, SecurityAlertRecord>(&format!(
            "SELECT {} FROM security_alerts WHERE user_id = ? ORDER BY id ASC",
            ALERT_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(executor)
        .await
    }

    /// 검토 완료 표시. 이미 검토된 경우 0 반환
    pub async fn mark_reviewed<'e, E>(executor: E, id: i64, reviewed_by: i64, reviewed_at: i64) -> Result<u64, SqlxError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query(
            "UPDATE security_alerts SET reviewed = 1, reviewed_by = ?, reviewed_at = ?
             WHERE id = ? AND reviewed = 0"
        )
        .bind(reviewed_by)
        .bind(reviewed_at)
        .bind(id)
        .execute(executor)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn count_unreviewed<'e, E>(executor: E) -> Result<i64, SqlxError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_scalar("SELECT COUNT(*) FROM security_alerts WHERE reviewed = 0")
            .fetch_one(executor)
            .await
    }
}

/// 신규 감사 로그 (INSERT용)
#[derive(Debug, Clone)]
pub struct NewAuditLog<'a> {
    pub action: &'a str,
    pub actor_kind: &'a str,
    pub actor_id: Option<i64>,
    pub subject_user_id: Option<i64>,
    pub ip_address: Option<&'a str>,
    pub user_agent: Option<&'a str>,
    pub details: String,
    pub created_at: i64,
}

/// 감사 로그 저장소
pub struct AuditLogRepository;

impl AuditLogRepository {
    /// 로그 기록
    pub async fn log<'e, E>(executor: E, entry: &NewAuditLog<'_>) -> Result<i64, SqlxError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query(
            "INSERT INTO audit_logs
             (action, actor_kind, actor_id, subject_user_id, ip_address, user_agent, details, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)"
        )
        .bind(entry.action)
        .bind(entry.actor_kind)
        .bind(entry.actor_id)
        .bind(entry.subject_user_id)
        .bind(entry.ip_address)
        .bind(entry.user_agent)
        .bind(&entry.details)
        .bind(entry.created_at)
        .execute(executor)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// 대상 사용자별 로그 조회
    pub async fn find_by_subject<'e, E>(executor: E, user_id: i64, limit: i64) -> Result<Vec<AuditLogRecord>, SqlxError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, AuditLogRecord>(&format!(
            "SELECT {} FROM audit_logs WHERE subject_user_id = ? ORDER BY id DESC LIMIT ?",
            AUDIT_COLUMNS
        ))
        .bind(user_id)
        .bind(limit)
        .fetch_all(executor)
        .await
    }

    pub async fn recent<'e, E>(executor: E, limit: i64) -> Result<Vec<AuditLogRecord>, SqlxError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, AuditLogRecord>(&format!(
            "SELECT {} FROM audit_logs ORDER BY id DESC LIMIT ?",
            AUDIT_COLUMNS
        ))
        .bind(limit)
        .fetch_all(executor)
        .await
    }
}

/// 플랫폼 설정 저장소
pub struct SettingsRepository;

impl SettingsRepository {
    pub async fn find<'e, E>(executor: E) -> Result<Option<SettingsRecord>, SqlxError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, SettingsRecord>(
            "SELECT commission_percent, min_deposit, max_deposit, referral_bonus_amount, max_referrals_per_user,
                    collector_bank_name, collector_account_number, collector_account_holder,
                    maintenance_mode, maintenance_message, updated_at, updated_by
             FROM platform_settings
             WHERE id = 1"
        )
        .fetch_optional(executor)
        .await
    }

    /// 레코드가 없을 때만 생성. 생성했으면 true
    pub async fn insert_if_absent<'e, E>(executor: E, settings: &SettingsRecord) -> Result<bool, SqlxError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO platform_settings
             (id, commission_percent, min_deposit, max_deposit, referral_bonus_amount, max_referrals_per_user,
              collector_bank_name, collector_account_number, collector_account_holder,
              maintenance_mode, maintenance_message, updated_at, updated_by)
             VALUES (1, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        )
        .bind(&settings.commission_percent)
        .bind(settings.min_deposit)
        .bind(settings.max_deposit)
        .bind(settings.referral_bonus_amount)
        .bind(settings.max_referrals_per_user)
        .bind(&settings.collector_bank_name)
        .bind(&settings.collector_account_number)
        .bind(&settings.collector_account_holder)
        .bind(settings.maintenance_mode)
        .bind(&settings.maintenance_message)
        .bind(settings.updated_at)
        .bind(settings.updated_by)
        .execute(executor)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// 수정 트랜잭션의 첫 쓰기 (쓰기 잠금 선점). 레코드가 없으면 0
    pub async fn touch<'e, E>(executor: E, updated_at: i64, updated_by: i64) -> Result<u64, SqlxError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query("UPDATE platform_settings SET updated_at = ?, updated_by = ? WHERE id = 1")
            .bind(updated_at)
            .bind(updated_by)
            .execute(executor)
            .await?;

        Ok(result.rows_affected())
    }

    pub async fn update<'e, E>(executor: E, settings: &SettingsRecord) -> Result<u64, SqlxError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query(
            "UPDATE platform_settings
             SET commission_percent = ?, min_deposit = ?, max_deposit = ?, referral_bonus_amount = ?,
                 max_referrals_per_user = ?, collector_bank_name = ?, collector_account_number = ?,
                 collector_account_holder = ?, maintenance_mode = ?, maintenance_message = ?,
                 updated_at = ?, updated_by = ?
             WHERE id = 1"
        )
        .bind(&settings.commission_percent)
        .bind(settings.min_deposit)
        .bind(settings.max_deposit)
        .bind(settings.referral_bonus_amount)
        .bind(settings.max_referrals_per_user)
        .bind(&settings.collector_bank_name)
        .bind(&settings.collector_account_number)
        .bind(&settings.collector_account_holder)
        .bind(settings.maintenance_mode)
        .bind(&settings.maintenance_message)
        .bind(settings.updated_at)
        .bind(settings.updated_by)
        .execute(executor)
        .await?;

        Ok(result.rows_affected())
    }
}
