#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use rust_decimal_macros::dec;
use saldo::cash_engine::model::{PayoutAccount, RequestMeta, User};
use saldo::cash_engine::{CashPlatform, SettingsDefaults};
use saldo::clock::ManualClock;
use saldo::db::{init_database, init_memory_database};
use saldo::money::Money;
use saldo::notify::LogNotifier;
use sqlx::sqlite::SqlitePool;

pub const ADMIN: i64 = 900;

pub fn defaults() -> SettingsDefaults {
    SettingsDefaults {
        commission_percent: dec!(5),
        min_deposit: Money::from_major(10),
        max_deposit: Money::from_major(5000),
        referral_bonus_amount: Money::from_major(5),
        max_referrals_per_user: 10,
    }
}

pub fn meta() -> RequestMeta {
    RequestMeta {
        ip_address: Some("203.0.113.7".to_string()),
        user_agent: Some("saldo-tests".to_string()),
    }
}

pub fn manual_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 2, 14, 0, 0).unwrap()))
}

pub async fn platform_on(pool: SqlitePool, clock: Arc<ManualClock>) -> CashPlatform {
    let platform = CashPlatform::new(pool, clock, Arc::new(LogNotifier), Duration::from_secs(30));
    platform.settings().ensure_defaults(&defaults()).await.unwrap();
    platform
}

/// 인메모리 DB 위의 플랫폼
pub async fn memory_platform() -> (CashPlatform, Arc<ManualClock>) {
    let clock = manual_clock();
    let pool = init_memory_database().await.unwrap();
    (platform_on(pool, clock.clone()).await, clock)
}

/// 파일 DB 위의 플랫폼 (동시성 테스트용, 연결 여러 개)
pub async fn file_platform(dir: &tempfile::TempDir) -> (CashPlatform, Arc<ManualClock>) {
    let clock = manual_clock();
    let url = format!("sqlite://{}", dir.path().join("saldo.db").display());
    let pool = init_database(&url, 8).await.unwrap();
    (platform_on(pool, clock.clone()).await, clock)
}

pub async fn register(platform: &CashPlatform, email: &str, code: Option<&str>) -> User {
    platform
        .accounts()
        .register_user(email, "테스트 사용자", code, &meta())
        .await
        .unwrap()
}

pub async fn payout_account(platform: &CashPlatform, user: &User) -> PayoutAccount {
    platform
        .accounts()
        .add_payout_account(user.id, "Banco Central", "001-234-5678", &user.full_name, &meta())
        .await
        .unwrap()
}

/// 충전 접수 + 승인으로 잔고 채우기
pub async fn fund(platform: &CashPlatform, user: &User, amount: Money, receipt: &str) {
    let deposit = platform.submit_deposit(user.id, amount, receipt, &meta()).await.unwrap();
    platform.approve_deposit(deposit.id, ADMIN, &meta()).await.unwrap();
}

pub async fn balance(platform: &CashPlatform, user: &User) -> Money {
    platform.accounts().get_user(user.id).await.unwrap().balance
}
