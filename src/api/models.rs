use serde::{Deserialize, Serialize};

use crate::cash_engine::model::{AdminId, Deposit, PayoutAccount, SecurityAlert, UserId, Withdrawal};
use crate::cash_engine::SettingsUpdate;
use crate::money::Money;

/// 가입 요청
#[derive(Debug, Deserialize, Serialize)]
pub struct RegisterUserRequest {
    pub email: String,
    pub full_name: String,
    pub referral_code: Option<String>,
}

/// 출금 계좌 등록 요청
#[derive(Debug, Deserialize, Serialize)]
pub struct AddPayoutAccountRequest {
    pub bank_name: String,
    pub account_number: String,
    pub holder_name: String,
}

/// 충전 접수 요청 (금액은 "100.00" 형식 문자열)
#[derive(Debug, Deserialize, Serialize)]
pub struct SubmitDepositRequest {
    pub user_id: UserId,
    pub amount: Money,
    pub receipt_url: String,
}

/// 출금 접수 요청
#[derive(Debug, Deserialize, Serialize)]
pub struct SubmitWithdrawalRequest {
    pub user_id: UserId,
    pub bank_account_id: i64,
    pub amount: Money,
}

/// 충전 승인 요청
#[derive(Debug, Deserialize, Serialize)]
pub struct ApproveDepositRequest {
    pub admin_id: AdminId,
}

/// 출금 승인 요청 (송금 증빙 첨부 가능)
#[derive(Debug, Deserialize, Serialize)]
pub struct ApproveWithdrawalRequest {
    pub admin_id: AdminId,
    pub proof_url: Option<String>,
}

/// 거절 요청
#[derive(Debug, Deserialize, Serialize)]
pub struct RejectRequest {
    pub admin_id: AdminId,
    pub reason: String,
}

/// 경고 검토 요청
#[derive(Debug, Deserialize, Serialize)]
pub struct ReviewAlertRequest {
    pub admin_id: AdminId,
}

/// 설정 변경 요청
#[derive(Debug, Deserialize, Serialize)]
pub struct UpdateSettingsRequest {
    pub admin_id: AdminId,
    #[serde(flatten)]
    pub changes: SettingsUpdate,
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct AlertsQuery {
    pub reviewed: Option<bool>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    pub user_id: Option<UserId>,
    pub limit: Option<i64>,
}

/// 사용자 거래 내역 응답
#[derive(Debug, Serialize)]
pub struct DepositsResponse {
    pub deposits: Vec<Deposit>,
}

#[derive(Debug, Serialize)]
pub struct WithdrawalsResponse {
    pub withdrawals: Vec<Withdrawal>,
}

#[derive(Debug, Serialize)]
pub struct PayoutAccountsResponse {
    pub accounts: Vec<PayoutAccount>,
}

#[derive(Debug, Serialize)]
pub struct AlertsResponse {
    pub alerts: Vec<SecurityAlert>,
}

/// 헬스체크 응답
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: i64,
}

/// 에러 응답
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}
