pub mod models;
pub mod repository;

use std::str::FromStr;
use std::time::Duration;

use log::info;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Error as SqlxError;

/// SQLite 데이터베이스 초기화 및 연결
pub async fn init_database(database_url: &str, max_connections: u32) -> Result<SqlitePool, SqlxError> {
    info!("🗄️  SQLite 데이터베이스 초기화 중... ({})", database_url);

    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(10))
        .foreign_keys(true);

    // 연결 풀 생성
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .connect_with(options)
        .await?;

    // 테이블 생성
    create_tables(&pool).await?;

    info!("✅ 데이터베이스 초기화 완료");

    Ok(pool)
}

/// 인메모리 데이터베이스 (테스트용)
///
/// 연결마다 별도의 DB가 생기므로 단일 연결을 유지합니다.
pub async fn init_memory_database() -> Result<SqlitePool, SqlxError> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;

    create_tables(&pool).await?;

    Ok(pool)
}

/// 필요한 테이블 생성
async fn create_tables(pool: &SqlitePool) -> Result<(), SqlxError> {
    // 사용자 테이블
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            email TEXT NOT NULL UNIQUE,
            full_name TEXT NOT NULL,
            balance INTEGER NOT NULL DEFAULT 0 CHECK (balance >= 0),
            referral_code TEXT NOT NULL UNIQUE,
            referred_by INTEGER REFERENCES users(id),
            referral_bonus_consumed INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL
        )"
    )
    .execute(pool)
    .await?;

    // 출금 계좌 테이블
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS payout_accounts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL REFERENCES users(id),
            bank_name TEXT NOT NULL,
            account_number TEXT NOT NULL,
            holder_name TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            archived_at INTEGER
        )"
    )
    .execute(pool)
    .await?;

    // 충전 테이블
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS deposits (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            operation_id TEXT NOT NULL UNIQUE,
            user_id INTEGER NOT NULL REFERENCES users(id),
            amount_deposited INTEGER NOT NULL CHECK (amount_deposited > 0),
            commission_percent TEXT NOT NULL,
            commission_amount INTEGER NOT NULL,
            net_amount INTEGER NOT NULL,
            receipt_url TEXT NOT NULL,
            state TEXT NOT NULL,
            rejection_reason TEXT,
            submitted_at INTEGER NOT NULL,
            processed_at INTEGER,
            processed_by INTEGER,
            CHECK (net_amount = amount_deposited - commission_amount)
        )"
    )
    .execute(pool)
    .await?;

    // 출금 테이블
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS withdrawals (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            operation_id TEXT NOT NULL UNIQUE,
            user_id INTEGER NOT NULL REFERENCES users(id),
            bank_account_id INTEGER NOT NULL REFERENCES payout_accounts(id),
            amount INTEGER NOT NULL CHECK (amount > 0),
            state TEXT NOT NULL,
            rejection_reason TEXT,
            proof_url TEXT,
            submitted_at INTEGER NOT NULL,
            processed_at INTEGER,
            processed_by INTEGER
        )"
    )
    .execute(pool)
    .await?;

    // 리퍼럴 테이블
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS referrals (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            referrer_id INTEGER NOT NULL REFERENCES users(id),
            referred_id INTEGER NOT NULL UNIQUE REFERENCES users(id),
            bonus_granted INTEGER NOT NULL DEFAULT 0,
            bonus_amount INTEGER,
            first_deposit_approved_at INTEGER,
            created_at INTEGER NOT NULL
        )"
    )
    .execute(pool)
    .await?;

    // 보안 경고 테이블
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS security_alerts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL REFERENCES users(id),
            kind TEXT NOT NULL,
            description TEXT NOT NULL,
            details TEXT NOT NULL,
            reviewed INTEGER NOT NULL DEFAULT 0,
            reviewed_by INTEGER,
            reviewed_at INTEGER,
            created_at INTEGER NOT NULL
        )"
    )
    .execute(pool)
    .await?;

    // 감사 로그 테이블
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS audit_logs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            action TEXT NOT NULL,
            actor_kind TEXT NOT NULL,
            actor_id INTEGER,
            subject_user_id INTEGER,
            ip_address TEXT,
            user_agent TEXT,
            details TEXT NOT NULL,
            created_at INTEGER NOT NULL
        )"
    )
    .execute(pool)
    .await?;

    // 플랫폼 설정 (단일 레코드)
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS platform_settings (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            commission_percent TEXT NOT NULL,
            min_deposit INTEGER NOT NULL,
            max_deposit INTEGER NOT NULL,
            referral_bonus_amount INTEGER NOT NULL,
            max_referrals_per_user INTEGER NOT NULL,
            collector_bank_name TEXT,
            collector_account_number TEXT,
            collector_account_holder TEXT,
            maintenance_mode INTEGER NOT NULL DEFAULT 0,
            maintenance_message TEXT,
            updated_at INTEGER NOT NULL,
            updated_by INTEGER
        )"
    )
    .execute(pool)
    .await?;

    // 인덱스 생성
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_deposits_user_time ON deposits(user_id, submitted_at)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_deposits_state ON deposits(state)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_deposits_receipt ON deposits(receipt_url)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_withdrawals_user ON withdrawals(user_id)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_withdrawals_state ON withdrawals(state)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_referrals_referrer ON referrals(referrer_id)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_alerts_user_kind ON security_alerts(user_id, kind, reviewed)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_audit_subject ON audit_logs(subject_user_id)")
        .execute(pool)
        .await?;

    info!("📋 테이블 생성 완료");

    Ok(())
}
