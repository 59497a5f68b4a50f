//! 코어 에러 타입
//!
//! 검증/상태 에러는 호출자에게 그대로 전달되고, 저장소 에러는 트랜잭션 전체를 롤백합니다.

use serde::Serialize;

use crate::money::{Money, MoneyError};

/// 호출자가 의존할 수 있는 안정적인 에러 분류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    Validation,
    NotFound,
    InvalidState,
    InsufficientBalance,
    ConfigurationMissing,
    Maintenance,
    PersistenceFailure,
}

impl ErrorKind {
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "VALIDATION_ERROR",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::InvalidState => "INVALID_STATE",
            ErrorKind::InsufficientBalance => "INSUFFICIENT_BALANCE",
            ErrorKind::ConfigurationMissing => "CONFIGURATION_MISSING",
            ErrorKind::Maintenance => "MAINTENANCE",
            ErrorKind::PersistenceFailure => "PERSISTENCE_FAILURE",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("입력값 오류: {0}")]
    Validation(String),

    #[error("{entity}을(를) 찾을 수 없음: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("이미 처리된 {entity}: {id} (상태: {state})")]
    AlreadyProcessed {
        entity: &'static str,
        id: String,
        state: String,
    },

    #[error("허용되지 않는 상태: {0}")]
    InvalidState(String),

    #[error("잔고 부족: 가용 {available}, 요청 {requested}")]
    InsufficientBalance { available: Money, requested: Money },

    #[error("플랫폼 설정이 없습니다")]
    ConfigurationMissing,

    #[error("점검 중: {0}")]
    Maintenance(String),

    #[error("저장소 오류: {0}")]
    Persistence(#[from] sqlx::Error),

    #[error("손상된 레코드: {0}")]
    CorruptRecord(String),
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::Validation(_) => ErrorKind::Validation,
            CoreError::NotFound { .. } => ErrorKind::NotFound,
            CoreError::AlreadyProcessed { .. } | CoreError::InvalidState(_) => ErrorKind::InvalidState,
            CoreError::InsufficientBalance { .. } => ErrorKind::InsufficientBalance,
            CoreError::ConfigurationMissing => ErrorKind::ConfigurationMissing,
            CoreError::Maintenance(_) => ErrorKind::Maintenance,
            CoreError::Persistence(_) | CoreError::CorruptRecord(_) => ErrorKind::PersistenceFailure,
        }
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        CoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        CoreError::Validation(message.into())
    }
}

impl From<MoneyError> for CoreError {
    fn from(e: MoneyError) -> Self {
        CoreError::Validation(e.to_string())
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::CorruptRecord(e.to_string())
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
