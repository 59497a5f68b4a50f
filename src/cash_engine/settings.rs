//! 플랫폼 설정 저장소
//!
//! 수수료율, 충전 한도, 리퍼럴 보너스 등 단일 설정 레코드를 관리합니다.
//! 읽기는 TTL 캐시에서 처리하며, 관리자 수정 한 번만큼의 지연을 허용합니다.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use log::{debug, info};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::sqlite::SqlitePool;
use tokio::sync::RwLock;

use super::audit::{actions, AuditRecord, AuditTrail};
use super::model::{Actor, AdminId, PlatformSettings, RequestMeta};
use crate::clock::Clock;
use crate::db::models::{to_millis, SettingsRecord};
use crate::db::repository::SettingsRepository;
use crate::error::{CoreError, CoreResult};
use crate::money::Money;

/// 설정 레코드가 없을 때 채울 초기값
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsDefaults {
    pub commission_percent: Decimal,
    pub min_deposit: Money,
    pub max_deposit: Money,
    pub referral_bonus_amount: Money,
    pub max_referrals_per_user: u32,
}

/// 관리자 설정 변경 (지정한 필드만 반영)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsUpdate {
    #[serde(default, with = "rust_decimal::serde::str_option")]
    pub commission_percent: Option<Decimal>,
    pub min_deposit: Option<Money>,
    pub max_deposit: Option<Money>,
    pub referral_bonus_amount: Option<Money>,
    pub max_referrals_per_user: Option<u32>,
    pub collector_bank_name: Option<String>,
    pub collector_account_number: Option<String>,
    pub collector_account_holder: Option<String>,
    pub maintenance_mode: Option<bool>,
    pub maintenance_message: Option<String>,
}

impl SettingsUpdate {
    fn apply(&self, mut settings: PlatformSettings) -> PlatformSettings {
        if let Some(v) = self.commission_percent {
            settings.commission_percent = v;
        }
        if let Some(v) = self.min_deposit {
            settings.min_deposit = v;
        }
        if let Some(v) = self.max_deposit {
            settings.max_deposit = v;
        }
        if let Some(v) = self.referral_bonus_amount {
            settings.referral_bonus_amount = v;
        }
        if let Some(v) = self.max_referrals_per_user {
            settings.max_referrals_per_user = v;
        }
        if let Some(v) = &self.collector_bank_name {
            settings.collector_bank_name = Some(v.clone());
        }
        if let Some(v) = &self.collector_account_number {
            settings.collector_account_number = Some(v.clone());
        }
        if let Some(v) = &self.collector_account_holder {
            settings.collector_account_holder = Some(v.clone());
        }
        if let Some(v) = self.maintenance_mode {
            settings.maintenance_mode = v;
        }
        if let Some(v) = &self.maintenance_message {
            settings.maintenance_message = Some(v.clone());
        }
        settings
    }
}

/// 설정값 검증
pub fn validate(settings: &PlatformSettings) -> CoreResult<()> {
    if settings.commission_percent < Decimal::ZERO || settings.commission_percent >= Decimal::ONE_HUNDRED {
        return Err(CoreError::validation(format!(
            "수수료율은 0 이상 100 미만이어야 합니다: {}",
            settings.commission_percent
        )));
    }
    if !settings.min_deposit.is_positive() {
        return Err(CoreError::validation("최소 충전 금액은 0보다 커야 합니다"));
    }
    if settings.max_deposit < settings.min_deposit {
        return Err(CoreError::validation(format!(
            "최대 충전 금액({})이 최소 충전 금액({})보다 작습니다",
            settings.max_deposit, settings.min_deposit
        )));
    }
    if settings.referral_bonus_amount < Money::ZERO {
        return Err(CoreError::validation("리퍼럴 보너스는 음수일 수 없습니다"));
    }
    Ok(())
}

struct CachedSettings {
    settings: PlatformSettings,
    loaded_at: DateTime<Utc>,
}

/// 설정 저장소 (TTL 캐시)
pub struct SettingsStore {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    cache: RwLock<Option<CachedSettings>>,
}

impl SettingsStore {
    pub fn new(pool: SqlitePool, clock: Arc<dyn Clock>, ttl: std::time::Duration) -> Self {
        Self {
            pool,
            clock,
            ttl: Duration::from_std(ttl).unwrap_or_else(|_| Duration::zero()),
            cache: RwLock::new(None),
        }
    }

    /// 현재 설정 스냅샷. 레코드가 없으면 `ConfigurationMissing`
    pub async fn snapshot(&self) -> CoreResult<PlatformSettings> {
        let now = self.clock.now();
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if now - cached.loaded_at < self.ttl {
                    return Ok(cached.settings.clone());
                }
            }
        }

        let record = SettingsRepository::find(&self.pool)
            .await?
            .ok_or(CoreError::ConfigurationMissing)?;
        let settings = PlatformSettings::try_from(record)?;
        debug!("설정 캐시 갱신");

        *self.cache.write().await = Some(CachedSettings {
            settings: settings.clone(),
            loaded_at: now,
        });
        Ok(settings)
    }

    pub async fn invalidate(&self) {
        *self.cache.write().await = None;
    }

    /// 레코드가 없을 때만 초기값으로 생성. 생성했으면 true
    pub async fn ensure_defaults(&self, defaults: &SettingsDefaults) -> CoreResult<bool> {
        let settings = PlatformSettings {
            commission_percent: defaults.commission_percent,
            min_deposit: defaults.min_deposit,
            max_deposit: defaults.max_deposit,
            referral_bonus_amount: defaults.referral_bonus_amount,
            max_referrals_per_user: defaults.max_referrals_per_user,
            collector_bank_name: None,
            collector_account_number: None,
            collector_account_holder: None,
            maintenance_mode: false,
            maintenance_message: None,
            updated_at: self.clock.now(),
            updated_by: None,
        };
        validate(&settings)?;

        let created = SettingsRepository::insert_if_absent(&self.pool, &SettingsRecord::from(&settings)).await?;
        if created {
            info!(
                "⚙️  기본 설정 생성: 수수료 {}%, 충전 {}~{}, 보너스 {}",
                settings.commission_percent, settings.min_deposit, settings.max_deposit, settings.referral_bonus_amount
            );
            self.invalidate().await;
        }
        Ok(created)
    }

    /// 관리자 설정 변경
    pub async fn update(&self, admin: AdminId, meta: &RequestMeta, changes: &SettingsUpdate) -> CoreResult<PlatformSettings> {
        let now = self.clock.now();
        let mut tx = self.pool.begin().await?;

        if SettingsRepository::touch(&mut *tx, to_millis(now), admin).await? == 0 {
            return Err(CoreError::ConfigurationMissing);
        }
        let record = SettingsRepository::find(&mut *tx)
            .await?
            .ok_or(CoreError::ConfigurationMissing)?;
        let previous = PlatformSettings::try_from(record)?;

        let mut updated = changes.apply(previous.clone());
        updated.updated_at = now;
        updated.updated_by = Some(admin);
        validate(&updated)?;

        SettingsRepository::update(&mut *tx, &SettingsRecord::from(&updated)).await?;

        let audit = AuditRecord::new(actions::SETTINGS_UPDATED, Actor::Admin(admin))
            .meta(meta)
            .details(json!({
                "previous": previous,
                "current": updated,
            }));
        AuditTrail::record(&mut *tx, &audit, now).await?;

        tx.commit().await?;
        self.invalidate().await;

        info!(
            "⚙️  설정 변경 (관리자 {}): 수수료 {}%, 충전 {}~{}, 보너스 {}, 점검 {}",
            admin,
            updated.commission_percent,
            updated.min_deposit,
            updated.max_deposit,
            updated.referral_bonus_amount,
            updated.maintenance_mode
        );
        Ok(updated)
    }
}
