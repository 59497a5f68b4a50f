//! 프로세스 설정 (환경 변수)
//!
//! 플랫폼 설정(수수료, 한도 등)은 DB 단일 레코드에 있으며,
//! 여기의 DEFAULT_* 값은 그 레코드가 없을 때 한 번 채우는 용도입니다.

use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;

use crate::cash_engine::SettingsDefaults;
use crate::money::Money;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("환경 변수 {key} 값이 올바르지 않습니다: {value}")]
    Invalid { key: &'static str, value: String },
}

/// 서버 설정
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub rest_port: u16,
    pub db_max_connections: u32,
    pub settings_cache_ttl: Duration,
    pub idempotency_ttl: Duration,
    pub cleanup_interval: Duration,
    pub defaults: SettingsDefaults,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://saldo.db".into(),
            rest_port: 7000,
            db_max_connections: 5,
            settings_cache_ttl: Duration::from_secs(30),
            idempotency_ttl: Duration::from_secs(600),
            cleanup_interval: Duration::from_secs(60),
            defaults: SettingsDefaults {
                commission_percent: Decimal::from(5),
                min_deposit: Money::from_major(10),
                max_deposit: Money::from_major(5000),
                referral_bonus_amount: Money::from_major(5),
                max_referrals_per_user: 10,
            },
        }
    }
}

impl AppConfig {
    /// 환경 변수에서 로드 (`.env`는 호출 전에 읽어 둡니다)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base = Self::default();
        let secs = |key: &'static str, default: Duration| -> Result<Duration, ConfigError> {
            parse_or(&lookup, key, default.as_secs()).map(Duration::from_secs)
        };

        Ok(Self {
            database_url: lookup("DATABASE_URL").unwrap_or(base.database_url),
            rest_port: parse_or(&lookup, "REST_PORT", base.rest_port)?,
            db_max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", base.db_max_connections)?,
            settings_cache_ttl: secs("SETTINGS_CACHE_TTL_SECS", base.settings_cache_ttl)?,
            idempotency_ttl: secs("IDEMPOTENCY_TTL_SECS", base.idempotency_ttl)?,
            cleanup_interval: secs("CLEANUP_INTERVAL_SECS", base.cleanup_interval)?,
            defaults: SettingsDefaults {
                commission_percent: parse_or(&lookup, "DEFAULT_COMMISSION_PERCENT", base.defaults.commission_percent)?,
                min_deposit: parse_or(&lookup, "DEFAULT_MIN_DEPOSIT", base.defaults.min_deposit)?,
                max_deposit: parse_or(&lookup, "DEFAULT_MAX_DEPOSIT", base.defaults.max_deposit)?,
                referral_bonus_amount: parse_or(&lookup, "DEFAULT_REFERRAL_BONUS", base.defaults.referral_bonus_amount)?,
                max_referrals_per_user: parse_or(&lookup, "DEFAULT_MAX_REFERRALS", base.defaults.max_referrals_per_user)?,
            },
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid { key, value: raw }),
    }
}
