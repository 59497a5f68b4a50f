//! 충전/출금 코어
//!
//! 충전·출금 상태 머신, 잔고 원장 변경기, 리퍼럴 보너스 엔진, 이상거래 탐지,
//! 플랫폼 설정 저장소와 감사 로그를 묶습니다.
//! 모든 상태 전이는 잔고 변경·감사 로그와 함께 하나의 DB 트랜잭션으로 커밋됩니다.

pub mod accounts;
pub mod audit;
pub mod deposit;
pub mod fraud;
pub mod ledger;
pub mod model;
pub mod platform;
pub mod referral;
pub mod settings;
pub mod withdrawal;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePool;
use uuid::Uuid;

use crate::clock::Clock;
use crate::notify::{self, Notification, Notifier};

pub use accounts::AccountService;
pub use audit::{AuditRecord, AuditTrail};
pub use deposit::DepositService;
pub use fraud::{FraudHeuristics, FraudRules};
pub use ledger::{BalanceChange, BalanceLedger};
pub use platform::CashPlatform;
pub use referral::{BonusOutcome, ReferralEngine};
pub use settings::{SettingsDefaults, SettingsStore, SettingsUpdate};
pub use withdrawal::WithdrawalService;

/// 서비스들이 공유하는 의존성
#[derive(Clone)]
pub struct EngineContext {
    pub pool: SqlitePool,
    pub clock: Arc<dyn Clock>,
    pub settings: Arc<SettingsStore>,
    pub notifier: Arc<dyn Notifier>,
}

impl EngineContext {
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// 커밋 이후 알림 전송
    pub fn notify(&self, notification: Notification) {
        notify::dispatch(self.notifier.clone(), notification);
    }
}

/// 사람이 읽을 수 있는 작업 번호 (예: REC-20240315-9F3A1B2C)
pub fn new_operation_id(prefix: &str, at: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}-{}", prefix, at.format("%Y%m%d"), suffix[..8].to_uppercase())
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    use super::*;
    use crate::clock::ManualClock;
    use crate::db::init_memory_database;
    use crate::money::Money;
    use crate::notify::LogNotifier;

    pub fn defaults() -> SettingsDefaults {
        SettingsDefaults {
            commission_percent: dec!(5),
            min_deposit: Money::from_major(10),
            max_deposit: Money::from_major(5000),
            referral_bonus_amount: Money::from_major(5),
            max_referrals_per_user: 10,
        }
    }

    /// 설정이 채워진 인메모리 컨텍스트
    pub async fn context() -> (EngineContext, Arc<ManualClock>) {
        let pool = init_memory_database().await.unwrap();
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 3, 15, 9, 0, 0).unwrap()));
        let settings = Arc::new(SettingsStore::new(pool.clone(), clock.clone(), std::time::Duration::from_secs(30)));
        settings.ensure_defaults(&defaults()).await.unwrap();
        let ctx = EngineContext {
            pool,
            clock: clock.clone(),
            settings,
            notifier: Arc::new(LogNotifier),
        };
        (ctx, clock)
    }

    /// 잔고를 직접 지정한 사용자 생성
    pub async fn user_with_balance(ctx: &EngineContext, email: &str, balance: Money) -> i64 {
        let id = crate::db::repository::UserRepository::insert(
            &ctx.pool,
            email,
            "테스트 사용자",
            &email.to_uppercase(),
            None,
            0,
        )
        .await
        .unwrap();
        if balance.is_positive() {
            crate::db::repository::UserRepository::add_balance(&ctx.pool, id, balance.minor())
                .await
                .unwrap();
        }
        id
    }
}
