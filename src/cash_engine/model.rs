//! 충전/출금 코어의 기본 모델
//!
//! 사용자, 충전(recarga), 출금(retiro), 리퍼럴, 보안 경고, 감사 로그,
//! 플랫폼 설정 등 코어의 핵심 데이터 모델을 정의합니다.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::money::Money;

pub type UserId = i64;
pub type AdminId = i64;

/// 행위 주체
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum Actor {
    /// 일반 사용자
    User(UserId),
    /// 관리자
    Admin(AdminId),
    /// 시스템 (리퍼럴 엔진, 탐지 엔진 등)
    System,
}

impl Actor {
    pub fn kind(&self) -> &'static str {
        match self {
            Actor::User(_) => "user",
            Actor::Admin(_) => "admin",
            Actor::System => "system",
        }
    }

    pub fn id(&self) -> Option<i64> {
        match self {
            Actor::User(id) | Actor::Admin(id) => Some(*id),
            Actor::System => None,
        }
    }

    pub fn from_parts(kind: &str, id: Option<i64>) -> Option<Actor> {
        match (kind, id) {
            ("user", Some(id)) => Some(Actor::User(id)),
            ("admin", Some(id)) => Some(Actor::Admin(id)),
            ("system", _) => Some(Actor::System),
            _ => None,
        }
    }
}

/// 요청 부가 정보 (감사 로그용)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestMeta {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// 충전/출금 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationState {
    /// 관리자 검토 대기
    Pending,
    /// 승인 (종료 상태)
    Approved,
    /// 거절 (종료 상태)
    Rejected,
}

impl OperationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationState::Pending => "pending",
            OperationState::Approved => "approved",
            OperationState::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(OperationState::Pending),
            "approved" => Some(OperationState::Approved),
            "rejected" => Some(OperationState::Rejected),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, OperationState::Pending)
    }
}

/// 사용자
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub full_name: String,
    /// 내부 잔고 (원장 변경기만 수정)
    pub balance: Money,
    /// 본인의 추천 코드
    pub referral_code: String,
    /// 추천인 (소유 관계 아님)
    pub referred_by: Option<UserId>,
    /// 가입 보너스 수령 여부 (한 번만 설정)
    pub referral_bonus_consumed: bool,
    pub created_at: DateTime<Utc>,
}

/// 출금 계좌
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutAccount {
    pub id: i64,
    pub user_id: UserId,
    pub bank_name: String,
    pub account_number: String,
    pub holder_name: String,
    pub created_at: DateTime<Utc>,
    /// 보관 처리 시각 (보관된 계좌로는 출금 불가)
    pub archived_at: Option<DateTime<Utc>>,
}

/// 충전 (recarga)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deposit {
    pub id: i64,
    /// 사람이 읽을 수 있는 고유 번호 (REC-...)
    pub operation_id: String,
    pub user_id: UserId,
    /// 입금 금액
    pub amount_deposited: Money,
    /// 접수 시점의 수수료율 스냅샷
    pub commission_percent: Decimal,
    pub commission_amount: Money,
    /// 입금액 - 수수료 (접수 시 한 번 계산)
    pub net_amount: Money,
    /// 영수증 파일 참조 (내용은 보지 않음)
    pub receipt_url: String,
    pub state: OperationState,
    pub rejection_reason: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub processed_by: Option<AdminId>,
}

/// 출금 (retiro)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Withdrawal {
    pub id: i64,
    /// 사람이 읽을 수 있는 고유 번호 (RET-...)
    pub operation_id: String,
    pub user_id: UserId,
    pub bank_account_id: i64,
    /// 접수 시 고정
    pub amount: Money,
    pub state: OperationState,
    pub rejection_reason: Option<String>,
    /// 송금 증빙 참조 (승인 시 첨부)
    pub proof_url: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub processed_by: Option<AdminId>,
}

/// 리퍼럴 (추천인 → 피추천인)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Referral {
    pub id: i64,
    pub referrer_id: UserId,
    pub referred_id: UserId,
    pub bonus_granted: bool,
    pub bonus_amount: Option<Money>,
    pub first_deposit_approved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// 보안 경고 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    MultipleDeposits,
    ImmediateWithdrawal,
    DuplicateReceipt,
    SuspiciousPattern,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::MultipleDeposits => "multiple_deposits",
            AlertKind::ImmediateWithdrawal => "immediate_withdrawal",
            AlertKind::DuplicateReceipt => "duplicate_receipt",
            AlertKind::SuspiciousPattern => "suspicious_pattern",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "multiple_deposits" => Some(AlertKind::MultipleDeposits),
            "immediate_withdrawal" => Some(AlertKind::ImmediateWithdrawal),
            "duplicate_receipt" => Some(AlertKind::DuplicateReceipt),
            "suspicious_pattern" => Some(AlertKind::SuspiciousPattern),
            _ => None,
        }
    }
}

/// 보안 경고 (관리자 검토 큐)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityAlert {
    pub id: i64,
    pub user_id: UserId,
    pub kind: AlertKind,
    pub description: String,
    pub details: serde_json::Value,
    pub reviewed: bool,
    pub reviewed_by: Option<AdminId>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// 감사 로그 항목 (추가 전용)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: i64,
    pub action: String,
    pub actor: Actor,
    pub subject_user_id: Option<UserId>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// 플랫폼 설정 (단일 레코드)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformSettings {
    pub commission_percent: Decimal,
    pub min_deposit: Money,
    pub max_deposit: Money,
    pub referral_bonus_amount: Money,
    pub max_referrals_per_user: u32,
    pub collector_bank_name: Option<String>,
    pub collector_account_number: Option<String>,
    pub collector_account_holder: Option<String>,
    pub maintenance_mode: bool,
    pub maintenance_message: Option<String>,
    pub updated_at: DateTime<Utc>,
    pub updated_by: Option<AdminId>,
}

/// 관리자 검토 대기열
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PendingQueue {
    pub deposits: Vec<Deposit>,
    pub withdrawals: Vec<Withdrawal>,
}

/// 상태별 건수
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateBreakdown {
    pub pending: i64,
    pub approved: i64,
    pub rejected: i64,
}

/// 대시보드 통계
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformStats {
    pub users: i64,
    pub total_balance: Money,
    pub deposits: StateBreakdown,
    pub withdrawals: StateBreakdown,
    /// 승인된 충전의 입금 총액
    pub approved_deposit_volume: Money,
    pub commission_collected: Money,
    /// 승인된 충전으로 잔고에 반영된 총액
    pub credited_net_volume: Money,
    pub approved_withdrawal_volume: Money,
    pub pending_withdrawal_volume: Money,
    pub referral_bonuses_granted: i64,
    /// 지급된 보너스 총액 (양측 합계)
    pub referral_bonus_paid: Money,
    pub unreviewed_alerts: i64,
}
