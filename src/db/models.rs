use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::cash_engine::model::{
    Actor, AlertKind, AuditEntry, Deposit, OperationState, PayoutAccount, PlatformSettings, Referral,
    SecurityAlert, User, Withdrawal,
};
use crate::error::CoreError;
use crate::money::Money;

/// DB 시각 컬럼은 유닉스 밀리초 정수
pub fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

pub fn from_millis(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_default()
}

fn parse_state(raw: &str) -> Result<OperationState, CoreError> {
    OperationState::parse(raw).ok_or_else(|| CoreError::CorruptRecord(format!("알 수 없는 상태: {}", raw)))
}

fn parse_percent(raw: &str) -> Result<Decimal, CoreError> {
    Decimal::from_str(raw).map_err(|e| CoreError::CorruptRecord(format!("수수료율 형식 오류 {}: {}", raw, e)))
}

/// 사용자 DB 모델
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserRecord {
    pub id: i64,
    pub email: String,
    pub full_name: String,
    pub balance: i64,
    pub referral_code: String,
    pub referred_by: Option<i64>,
    pub referral_bonus_consumed: bool,
    pub created_at: i64,
}

impl From<UserRecord> for User {
    fn from(r: UserRecord) -> Self {
        User {
            id: r.id,
            email: r.email,
            full_name: r.full_name,
            balance: Money::from_minor(r.balance),
            referral_code: r.referral_code,
            referred_by: r.referred_by,
            referral_bonus_consumed: r.referral_bonus_consumed,
            created_at: from_millis(r.created_at),
        }
    }
}

/// 출금 계좌 DB 모델
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PayoutAccountRecord {
    pub id: i64,
    pub user_id: i64,
    pub bank_name: String,
    pub account_number: String,
    pub holder_name: String,
    pub created_at: i64,
    pub archived_at: Option<i64>,
}

impl From<PayoutAccountRecord> for PayoutAccount {
    fn from(r: PayoutAccountRecord) -> Self {
        PayoutAccount {
            id: r.id,
            user_id: r.user_id,
            bank_name: r.bank_name,
            account_number: r.account_number,
            holder_name: r.holder_name,
            created_at: from_millis(r.created_at),
            archived_at: r.archived_at.map(from_millis),
        }
    }
}

/// 충전 DB 모델
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DepositRecord {
    pub id: i64,
    pub operation_id: String,
    pub user_id: i64,
    pub amount_deposited: i64,
    pub commission_percent: String,
    pub commission_amount: i64,
    pub net_amount: i64,
    pub receipt_url: String,
    pub state: String,
    pub rejection_reason: Option<String>,
    pub submitted_at: i64,
    pub processed_at: Option<i64>,
    pub processed_by: Option<i64>,
}

impl TryFrom<DepositRecord> for Deposit {
    type Error = CoreError;

    fn try_from(r: DepositRecord) -> Result<Self, Self::Error> {
        Ok(Deposit {
            id: r.id,
            operation_id: r.operation_id,
            user_id: r.user_id,
            amount_deposited: Money::from_minor(r.amount_deposited),
            commission_percent: parse_percent(&r.commission_percent)?,
            commission_amount: Money::from_minor(r.commission_amount),
            net_amount: Money::from_minor(r.net_amount),
            receipt_url: r.receipt_url,
            state: parse_state(&r.state)?,
            rejection_reason: r.rejection_reason,
            submitted_at: from_millis(r.submitted_at),
            processed_at: r.processed_at.map(from_millis),
            processed_by: r.processed_by,
        })
    }
}

/// 신규 충전 (INSERT용)
#[derive(Debug, Clone)]
pub struct NewDepositRecord {
    pub operation_id: String,
    pub user_id: i64,
    pub amount_deposited: i64,
    pub commission_percent: String,
    pub commission_amount: i64,
    pub net_amount: i64,
    pub receipt_url: String,
    pub submitted_at: i64,
}

/// 출금 DB 모델
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WithdrawalRecord {
    pub id: i64,
    pub operation_id: String,
    pub user_id: i64,
    pub bank_account_id: i64,
    pub amount: i64,
    pub state: String,
    pub rejection_reason: Option<String>,
    pub proof_url: Option<String>,
    pub submitted_at: i64,
    pub processed_at: Option<i64>,
    pub processed_by: Option<i64>,
}

impl TryFrom<WithdrawalRecord> for Withdrawal {
    type Error = CoreError;

    fn try_from(r: WithdrawalRecord) -> Result<Self, Self::Error> {
        Ok(Withdrawal {
            id: r.id,
            operation_id: r.operation_id,
            user_id: r.user_id,
            bank_account_id: r.bank_account_id,
            amount: Money::from_minor(r.amount),
            state: parse_state(&r.state)?,
            rejection_reason: r.rejection_reason,
            proof_url: r.proof_url,
            submitted_at: from_millis(r.submitted_at),
            processed_at: r.processed_at.map(from_millis),
            processed_by: r.processed_by,
        })
    }
}

/// 리퍼럴 DB 모델
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ReferralRecord {
    pub id: i64,
    pub referrer_id: i64,
    pub referred_id: i64,
    pub bonus_granted: bool,
    pub bonus_amount: Option<i64>,
    pub first_deposit_approved_at: Option<i64>,
    pub created_at: i64,
}

impl From<ReferralRecord> for Referral {
    fn from(r: ReferralRecord) -> Self {
        Referral {
            id: r.id,
            referrer_id: r.referrer_id,
            referred_id: r.referred_id,
            bonus_granted: r.bonus_granted,
            bonus_amount: r.bonus_amount.map(Money::from_minor),
            first_deposit_approved_at: r.first_deposit_approved_at.map(from_millis),
            created_at: from_millis(r.created_at),
        }
    }
}

/// 보안 경고 DB 모델
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SecurityAlertRecord {
    pub id: i64,
    pub user_id: i64,
    pub kind: String,
    pub description: String,
    pub details: String,
    pub reviewed: bool,
    pub reviewed_by: Option<i64>,
    pub reviewed_at: Option<i64>,
    pub created_at: i64,
}

impl TryFrom<SecurityAlertRecord> for SecurityAlert {
    type Error = CoreError;

    fn try_from(r: SecurityAlertRecord) -> Result<Self, Self::Error> {
        let kind = AlertKind::parse(&r.kind)
            .ok_or_else(|| CoreError::CorruptRecord(format!("알 수 없는 경고 종류: {}", r.kind)))?;
        Ok(SecurityAlert {
            id: r.id,
            user_id: r.user_id,
            kind,
            description: r.description,
            details: serde_json::from_str(&r.details)?,
            reviewed: r.reviewed,
            reviewed_by: r.reviewed_by,
            reviewed_at: r.reviewed_at.map(from_millis),
            created_at: from_millis(r.created_at),
        })
    }
}

/// 감사 로그 DB 모델
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AuditLogRecord {
    pub id: i64,
    pub action: String,
    pub actor_kind: String,
    pub actor_id: Option<i64>,
    pub subject_user_id: Option<i64>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub details: String,
    pub created_at: i64,
}

impl TryFrom<AuditLogRecord> for AuditEntry {
    type Error = CoreError;

    fn try_from(r: AuditLogRecord) -> Result<Self, Self::Error> {
        let actor = Actor::from_parts(&r.actor_kind, r.actor_id)
            .ok_or_else(|| CoreError::CorruptRecord(format!("알 수 없는 행위자: {}", r.actor_kind)))?;
        Ok(AuditEntry {
            id: r.id,
            action: r.action,
            actor,
            subject_user_id: r.subject_user_id,
            ip_address: r.ip_address,
            user_agent: r.user_agent,
            details: serde_json::from_str(&r.details)?,
            created_at: from_millis(r.created_at),
        })
    }
}

/// 플랫폼 설정 DB 모델
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SettingsRecord {
    pub commission_percent: String,
    pub min_deposit: i64,
    pub max_deposit: i64,
    pub referral_bonus_amount: i64,
    pub max_referrals_per_user: i64,
    pub collector_bank_name: Option<String>,
    pub collector_account_number: Option<String>,
    pub collector_account_holder: Option<String>,
    pub maintenance_mode: bool,
    pub maintenance_message: Option<String>,
    pub updated_at: i64,
    pub updated_by: Option<i64>,
}

impl TryFrom<SettingsRecord> for PlatformSettings {
    type Error = CoreError;

    fn try_from(r: SettingsRecord) -> Result<Self, Self::Error> {
        Ok(PlatformSettings {
            commission_percent: parse_percent(&r.commission_percent)?,
            min_deposit: Money::from_minor(r.min_deposit),
            max_deposit: Money::from_minor(r.max_deposit),
            referral_bonus_amount: Money::from_minor(r.referral_bonus_amount),
            max_referrals_per_user: u32::try_from(r.max_referrals_per_user).unwrap_or(0),
            collector_bank_name: r.collector_bank_name,
            collector_account_number: r.collector_account_number,
            collector_account_holder: r.collector_account_holder,
            maintenance_mode: r.maintenance_mode,
            maintenance_message: r.maintenance_message,
            updated_at: from_millis(r.updated_at),
            updated_by: r.updated_by,
        })
    }
}

impl From<&PlatformSettings> for SettingsRecord {
    fn from(s: &PlatformSettings) -> Self {
        SettingsRecord {
            commission_percent: s.commission_percent.to_string(),
            min_deposit: s.min_deposit.minor(),
            max_deposit: s.max_deposit.minor(),
            referral_bonus_amount: s.referral_bonus_amount.minor(),
            max_referrals_per_user: i64::from(s.max_referrals_per_user),
            collector_bank_name: s.collector_bank_name.clone(),
            collector_account_number: s.collector_account_number.clone(),
            collector_account_holder: s.collector_account_holder.clone(),
            maintenance_mode: s.maintenance_mode,
            maintenance_message: s.maintenance_message.clone(),
            updated_at: to_millis(s.updated_at),
            updated_by: s.updated_by,
        }
    }
}
