//! 감사 로그
//!
//! 상태를 바꾸는 모든 작업은 같은 트랜잭션 안에서 감사 항목을 하나 이상 남깁니다.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::sqlite::SqlitePool;
use sqlx::{Executor, Sqlite};

use super::model::{Actor, AuditEntry, RequestMeta, UserId};
use crate::db::models::to_millis;
use crate::db::repository::{AuditLogRepository, NewAuditLog};
use crate::error::CoreResult;

/// 감사 액션 태그
pub mod actions {
    pub const USER_REGISTERED: &str = "user.registered";
    pub const PAYOUT_ACCOUNT_ADDED: &str = "payout_account.added";
    pub const PAYOUT_ACCOUNT_ARCHIVED: &str = "payout_account.archived";
    pub const DEPOSIT_SUBMITTED: &str = "deposit.submitted";
    pub const DEPOSIT_APPROVED: &str = "deposit.approved";
    pub const DEPOSIT_REJECTED: &str = "deposit.rejected";
    pub const WITHDRAWAL_SUBMITTED: &str = "withdrawal.submitted";
    pub const WITHDRAWAL_APPROVED: &str = "withdrawal.approved";
    pub const WITHDRAWAL_REJECTED: &str = "withdrawal.rejected";
    pub const REFERRAL_BONUS_GRANTED: &str = "referral.bonus_granted";
    pub const ALERT_REVIEWED: &str = "alert.reviewed";
    pub const SETTINGS_UPDATED: &str = "settings.updated";
}

/// 기록할 감사 항목
#[derive(Debug, Clone)]
pub struct AuditRecord {
    pub action: &'static str,
    pub actor: Actor,
    pub subject_user_id: Option<UserId>,
    pub meta: RequestMeta,
    pub details: Value,
}

impl AuditRecord {
    pub fn new(action: &'static str, actor: Actor) -> Self {
        Self {
            action,
            actor,
            subject_user_id: None,
            meta: RequestMeta::default(),
            details: Value::Null,
        }
    }

    pub fn subject(mut self, user_id: UserId) -> Self {
        self.subject_user_id = Some(user_id);
        self
    }

    pub fn meta(mut self, meta: &RequestMeta) -> Self {
        self.meta = meta.clone();
        self
    }

    pub fn details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }
}

/// 감사 로그 (추가 전용)
pub struct AuditTrail;

impl AuditTrail {
    /// 항목 기록. 트랜잭션 연결을 넘기면 변경과 함께 커밋/롤백됩니다.
    pub async fn record<'e, E>(executor: E, record: &AuditRecord, at: DateTime<Utc>) -> CoreResult<i64>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let details = serde_json::to_string(&record.details)?;
        let entry = NewAuditLog {
            action: record.action,
            actor_kind: record.actor.kind(),
            actor_id: record.actor.id(),
            subject_user_id: record.subject_user_id,
            ip_address: record.meta.ip_address.as_deref(),
            user_agent: record.meta.user_agent.as_deref(),
            details,
            created_at: to_millis(at),
        };

        Ok(AuditLogRepository::log(executor, &entry).await?)
    }

    /// 대상 사용자별 항목 (최신순)
    pub async fn entries_for_user(pool: &SqlitePool, user_id: UserId, limit: i64) -> CoreResult<Vec<AuditEntry>> {
        AuditLogRepository::find_by_subject(pool, user_id, limit)
            .await?
            .into_iter()
            .map(AuditEntry::try_from)
            .collect()
    }

    /// 최근 항목 (최신순)
    pub async fn recent(pool: &SqlitePool, limit: i64) -> CoreResult<Vec<AuditEntry>> {
        AuditLogRepository::recent(pool, limit)
            .await?
            .into_iter()
            .map(AuditEntry::try_from)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_memory_database;
    use chrono::TimeZone;
    use serde_json::json;

    #[tokio::test]
    async fn test_record_and_read_back() {
        let pool = init_memory_database().await.unwrap();
        let at = Utc.with_ymd_and_hms(2024, 3, 15, 9, 0, 0).unwrap();
        let meta = RequestMeta {
            ip_address: Some("10.0.0.1".into()),
            user_agent: Some("curl/8.0".into()),
        };

        let record = AuditRecord::new(actions::DEPOSIT_APPROVED, Actor::Admin(9))
            .subject(4)
            .meta(&meta)
            .details(json!({"previous_balance": "0.00", "new_balance": "95.00"}));
        AuditTrail::record(&pool, &record, at).await.unwrap();
        AuditTrail::record(&pool, &AuditRecord::new(actions::SETTINGS_UPDATED, Actor::Admin(9)), at)
            .await
            .unwrap();

        let entries = AuditTrail::entries_for_user(&pool, 4, 10).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action, "deposit.approved");
        assert_eq!(entries[0].actor, Actor::Admin(9));
        assert_eq!(entries[0].ip_address.as_deref(), Some("10.0.0.1"));
        assert_eq!(entries[0].details["new_balance"], "95.00");
        assert_eq!(entries[0].created_at, at);

        let recent = AuditTrail::recent(&pool, 10).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].action, "settings.updated");
    }

    #[tokio::test]
    async fn test_system_actor_has_no_id() {
        let pool = init_memory_database().await.unwrap();
        let record = AuditRecord::new(actions::REFERRAL_BONUS_GRANTED, Actor::System).subject(1);
        AuditTrail::record(&pool, &record, Utc::now()).await.unwrap();

        let entries = AuditTrail::entries_for_user(&pool, 1, 10).await.unwrap();
        assert_eq!(entries[0].actor, Actor::System);
        assert_eq!(entries[0].details, Value::Null);
    }
}
