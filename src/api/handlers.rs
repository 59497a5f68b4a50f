use axum::{
    extract::{rejection::JsonRejection, FromRequest, Path, Query, Request, State},
    http::{HeaderMap, StatusCode},
    response::Json,
};
use log::{error, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::api::models::*;
use crate::cash_engine::model::{
    AuditEntry, Deposit, PayoutAccount, PendingQueue, PlatformSettings, PlatformStats, RequestMeta, SecurityAlert,
    User, UserId, Withdrawal,
};
use crate::error::{CoreError, ErrorKind};
use crate::server::ServerState;

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ErrorResponse>)>;

const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 500;

pub const IDEMPOTENCY_HEADER: &str = "idempotency-key";

/// 처리 중인 Idempotency-Key 표시값
const IN_FLIGHT: &str = "in_flight";

/// 본문 파싱 실패도 코어 에러와 같은 형식으로 응답하는 JSON 추출기
pub struct ApiJson<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<ErrorResponse>);

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ApiJson(value)),
            Err(rejection) => {
                // 금액 범위 초과 같은 값 오류는 검증 실패로 취급
                let status = match &rejection {
                    JsonRejection::JsonDataError(_) | JsonRejection::JsonSyntaxError(_) => StatusCode::BAD_REQUEST,
                    other => other.status(),
                };
                Err((
                    status,
                    Json(ErrorResponse {
                        error: ErrorKind::Validation.code().to_string(),
                        message: rejection.body_text(),
                    }),
                ))
            }
        }
    }
}

/// 코어 에러 → HTTP 응답
fn error_response(err: CoreError) -> (StatusCode, Json<ErrorResponse>) {
    let kind = err.kind();
    let status = match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::InvalidState => StatusCode::CONFLICT,
        ErrorKind::InsufficientBalance => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::ConfigurationMissing => StatusCode::INTERNAL_SERVER_ERROR,
        ErrorKind::Maintenance => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::PersistenceFailure => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() && kind != ErrorKind::Maintenance {
        error!("요청 처리 실패 [{}]: {}", kind.code(), err);
    }

    (
        status,
        Json(ErrorResponse {
            error: kind.code().to_string(),
            message: err.to_string(),
        }),
    )
}

/// 요청 부가 정보 (감사 로그용)
fn request_meta(headers: &HeaderMap) -> RequestMeta {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    RequestMeta {
        ip_address: header("x-forwarded-for")
            .and_then(|v| v.split(',').next().map(|ip| ip.trim().to_string()))
            .or_else(|| header("x-real-ip")),
        user_agent: header("user-agent"),
    }
}

fn limit(requested: Option<i64>) -> i64 {
    requested.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
}

/// 사용자별 멱등 키. 다른 사용자의 같은 헤더 값과 섞이지 않음
fn idempotency_key(scope: &str, user_id: UserId, headers: &HeaderMap) -> Option<String> {
    headers
        .get(IDEMPOTENCY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(|key| format!("{}:{}:{}", scope, user_id, key))
}

/// Idempotency-Key 선점 결과
enum KeyClaim<T> {
    /// 키가 없거나 이번 요청이 선점함
    Fresh,
    /// 같은 키로 이미 처리된 결과
    Replay(T),
}

/// 키를 먼저 선점해 같은 키의 동시 요청이 둘 다 접수되지 않게 합니다.
/// 저장소 오류 시에는 키 없이 처리합니다.
async fn claim_key<T: DeserializeOwned>(
    state: &ServerState,
    key: Option<&str>,
) -> Result<KeyClaim<T>, (StatusCode, Json<ErrorResponse>)> {
    let Some(key) = key else { return Ok(KeyClaim::Fresh) };
    let marker = serde_json::Value::from(IN_FLIGHT);

    match state.idempotency.put_if_absent(key, marker.clone(), state.idempotency_ttl).await {
        Ok(true) => return Ok(KeyClaim::Fresh),
        Ok(false) => {}
        Err(e) => {
            warn!("⚠️ 멱등 키 선점 실패 {}: {}", key, e);
            return Ok(KeyClaim::Fresh);
        }
    }

    match state.idempotency.get(key).await {
        Ok(Some(stored)) if stored == marker => Err(error_response(CoreError::InvalidState(
            "같은 Idempotency-Key 요청이 처리 중입니다".to_string(),
        ))),
        Ok(Some(stored)) => serde_json::from_value(stored)
            .map(KeyClaim::Replay)
            .map_err(|e| error_response(CoreError::from(e))),
        Ok(None) => Ok(KeyClaim::Fresh),
        Err(e) => {
            warn!("⚠️ 멱등 키 조회 실패 {}: {}", key, e);
            Ok(KeyClaim::Fresh)
        }
    }
}

fn key_reused() -> (StatusCode, Json<ErrorResponse>) {
    error_response(CoreError::InvalidState(
        "Idempotency-Key가 다른 요청에 이미 사용되었습니다".to_string(),
    ))
}

async fn remember<T: Serialize>(state: &ServerState, key: Option<&str>, value: &T) {
    let Some(key) = key else { return };
    let stored = match serde_json::to_value(value) {
        Ok(v) => v,
        Err(e) => {
            warn!("⚠️ 멱등 응답 직렬화 실패 {}: {}", key, e);
            return;
        }
    };
    if let Err(e) = state.idempotency.put(key, stored, state.idempotency_ttl).await {
        warn!("⚠️ 멱등 키 저장 실패 {}: {}", key, e);
    }
}

/// 처리 실패 시 선점 해제 (같은 키로 재시도 가능)
async fn release(state: &ServerState, key: Option<&str>) {
    let Some(key) = key else { return };
    if let Err(e) = state.idempotency.remove(key).await {
        warn!("⚠️ 멱등 키 해제 실패 {}: {}", key, e);
    }
}

/// 헬스체크 핸들러
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: chrono::Utc::now().timestamp_millis(),
    })
}

/// 가입 핸들러
pub async fn register_user(
    State(state): State<ServerState>,
    headers: HeaderMap,
    ApiJson(payload): ApiJson<RegisterUserRequest>,
) -> ApiResult<User> {
    let meta = request_meta(&headers);
    state
        .platform
        .accounts()
        .register_user(&payload.email, &payload.full_name, payload.referral_code.as_deref(), &meta)
        .await
        .map(Json)
        .map_err(error_response)
}

/// 사용자 조회 핸들러
pub async fn get_user(State(state): State<ServerState>, Path(user_id): Path<UserId>) -> ApiResult<User> {
    state
        .platform
        .accounts()
        .get_user(user_id)
        .await
        .map(Json)
        .map_err(error_response)
}

/// 출금 계좌 목록 핸들러
pub async fn list_payout_accounts(
    State(state): State<ServerState>,
    Path(user_id): Path<UserId>,
) -> ApiResult<PayoutAccountsResponse> {
    let accounts = state
        .platform
        .accounts()
        .payout_accounts(user_id)
        .await
        .map_err(error_response)?;
    Ok(Json(PayoutAccountsResponse { accounts }))
}

/// 출금 계좌 등록 핸들러
pub async fn add_payout_account(
    State(state): State<ServerState>,
    Path(user_id): Path<UserId>,
    headers: HeaderMap,
    ApiJson(payload): ApiJson<AddPayoutAccountRequest>,
) -> ApiResult<PayoutAccount> {
    let meta = request_meta(&headers);
    state
        .platform
        .accounts()
        .add_payout_account(user_id, &payload.bank_name, &payload.account_number, &payload.holder_name, &meta)
        .await
        .map(Json)
        .map_err(error_response)
}

/// 출금 계좌 보관(삭제) 핸들러
pub async fn archive_payout_account(
    State(state): State<ServerState>,
    Path((user_id, account_id)): Path<(UserId, i64)>,
    headers: HeaderMap,
) -> ApiResult<PayoutAccount> {
    let meta = request_meta(&headers);
    state
        .platform
        .accounts()
        .archive_payout_account(user_id, account_id, &meta)
        .await
        .map(Json)
        .map_err(error_response)
}

/// 사용자 충전 내역 핸들러
pub async fn user_deposits(
    State(state): State<ServerState>,
    Path(user_id): Path<UserId>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<DepositsResponse> {
    let deposits = state
        .platform
        .deposits()
        .for_user(user_id, limit(query.limit))
        .await
        .map_err(error_response)?;
    Ok(Json(DepositsResponse { deposits }))
}

/// 사용자 출금 내역 핸들러
pub async fn user_withdrawals(
    State(state): State<ServerState>,
    Path(user_id): Path<UserId>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<WithdrawalsResponse> {
    let withdrawals = state
        .platform
        .withdrawals()
        .for_user(user_id, limit(query.limit))
        .await
        .map_err(error_response)?;
    Ok(Json(WithdrawalsResponse { withdrawals }))
}

/// 충전 접수 핸들러 (Idempotency-Key 지원)
pub async fn submit_deposit(
    State(state): State<ServerState>,
    headers: HeaderMap,
    ApiJson(payload): ApiJson<SubmitDepositRequest>,
) -> ApiResult<Deposit> {
    let key = idempotency_key("deposit", payload.user_id, &headers);
    if let KeyClaim::Replay(previous) = claim_key::<Deposit>(&state, key.as_deref()).await? {
        let same_request = previous.user_id == payload.user_id
            && previous.amount_deposited == payload.amount
            && previous.receipt_url == payload.receipt_url.trim();
        return if same_request { Ok(Json(previous)) } else { Err(key_reused()) };
    }

    let meta = request_meta(&headers);
    match state
        .platform
        .submit_deposit(payload.user_id, payload.amount, &payload.receipt_url, &meta)
        .await
    {
        Ok(deposit) => {
            remember(&state, key.as_deref(), &deposit).await;
            Ok(Json(deposit))
        }
        Err(e) => {
            release(&state, key.as_deref()).await;
            Err(error_response(e))
        }
    }
}

/// 충전 승인 핸들러
pub async fn approve_deposit(
    State(state): State<ServerState>,
    Path(deposit_id): Path<i64>,
    headers: HeaderMap,
    ApiJson(payload): ApiJson<ApproveDepositRequest>,
) -> ApiResult<Deposit> {
    let meta = request_meta(&headers);
    state
        .platform
        .approve_deposit(deposit_id, payload.admin_id, &meta)
        .await
        .map(Json)
        .map_err(error_response)
}

/// 충전 거절 핸들러
pub async fn reject_deposit(
    State(state): State<ServerState>,
    Path(deposit_id): Path<i64>,
    headers: HeaderMap,
    ApiJson(payload): ApiJson<RejectRequest>,
) -> ApiResult<Deposit> {
    let meta = request_meta(&headers);
    state
        .platform
        .reject_deposit(deposit_id, payload.admin_id, &payload.reason, &meta)
        .await
        .map(Json)
        .map_err(error_response)
}

/// 출금 접수 핸들러 (Idempotency-Key 지원)
pub async fn submit_withdrawal(
    State(state): State<ServerState>,
    headers: HeaderMap,
    ApiJson(payload): ApiJson<SubmitWithdrawalRequest>,
) -> ApiResult<Withdrawal> {
    let key = idempotency_key("withdrawal", payload.user_id, &headers);
    if let KeyClaim::Replay(previous) = claim_key::<Withdrawal>(&state, key.as_deref()).await? {
        let same_request = previous.user_id == payload.user_id
            && previous.amount == payload.amount
            && previous.bank_account_id == payload.bank_account_id;
        return if same_request { Ok(Json(previous)) } else { Err(key_reused()) };
    }

    let meta = request_meta(&headers);
    match state
        .platform
        .submit_withdrawal(payload.user_id, payload.bank_account_id, payload.amount, &meta)
        .await
    {
        Ok(withdrawal) => {
            remember(&state, key.as_deref(), &withdrawal).await;
            Ok(Json(withdrawal))
        }
        Err(e) => {
            release(&state, key.as_deref()).await;
            Err(error_response(e))
        }
    }
}

/// 출금 승인 핸들러
pub async fn approve_withdrawal(
    State(state): State<ServerState>,
    Path(withdrawal_id): Path<i64>,
    headers: HeaderMap,
    ApiJson(payload): ApiJson<ApproveWithdrawalRequest>,
) -> ApiResult<Withdrawal> {
    let meta = request_meta(&headers);
    state
        .platform
        .approve_withdrawal(withdrawal_id, payload.admin_id, payload.proof_url.as_deref(), &meta)
        .await
        .map(Json)
        .map_err(error_response)
}

/// 출금 거절 핸들러
pub async fn reject_withdrawal(
    State(state): State<ServerState>,
    Path(withdrawal_id): Path<i64>,
    headers: HeaderMap,
    ApiJson(payload): ApiJson<RejectRequest>,
) -> ApiResult<Withdrawal> {
    let meta = request_meta(&headers);
    state
        .platform
        .reject_withdrawal(withdrawal_id, payload.admin_id, &payload.reason, &meta)
        .await
        .map(Json)
        .map_err(error_response)
}

/// 검토 대기열 핸들러
pub async fn list_pending(State(state): State<ServerState>, Query(query): Query<LimitQuery>) -> ApiResult<PendingQueue> {
    state
        .platform
        .list_pending(limit(query.limit))
        .await
        .map(Json)
        .map_err(error_response)
}

/// 통계 핸들러
pub async fn get_stats(State(state): State<ServerState>) -> ApiResult<PlatformStats> {
    state.platform.get_stats().await.map(Json).map_err(error_response)
}

/// 보안 경고 목록 핸들러
pub async fn list_alerts(State(state): State<ServerState>, Query(query): Query<AlertsQuery>) -> ApiResult<AlertsResponse> {
    let alerts = state
        .platform
        .list_alerts(query.reviewed, limit(query.limit))
        .await
        .map_err(error_response)?;
    Ok(Json(AlertsResponse { alerts }))
}

/// 보안 경고 검토 핸들러
pub async fn review_alert(
    State(state): State<ServerState>,
    Path(alert_id): Path<i64>,
    headers: HeaderMap,
    ApiJson(payload): ApiJson<ReviewAlertRequest>,
) -> ApiResult<SecurityAlert> {
    let meta = request_meta(&headers);
    state
        .platform
        .review_alert(alert_id, payload.admin_id, &meta)
        .await
        .map(Json)
        .map_err(error_response)
}

/// 설정 조회 핸들러
pub async fn get_settings(State(state): State<ServerState>) -> ApiResult<PlatformSettings> {
    state.platform.current_settings().await.map(Json).map_err(error_response)
}

/// 설정 변경 핸들러
pub async fn update_settings(
    State(state): State<ServerState>,
    headers: HeaderMap,
    ApiJson(payload): ApiJson<UpdateSettingsRequest>,
) -> ApiResult<PlatformSettings> {
    let meta = request_meta(&headers);
    state
        .platform
        .update_settings(payload.admin_id, &meta, &payload.changes)
        .await
        .map(Json)
        .map_err(error_response)
}

/// 감사 로그 핸들러
pub async fn audit_log(State(state): State<ServerState>, Query(query): Query<AuditQuery>) -> ApiResult<Vec<AuditEntry>> {
    state
        .platform
        .audit_log(query.user_id, limit(query.limit))
        .await
        .map(Json)
        .map_err(error_response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_request_meta_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("198.51.100.4, 10.0.0.1"));
        headers.insert("user-agent", HeaderValue::from_static("saldo-app/2.1"));

        let meta = request_meta(&headers);
        assert_eq!(meta.ip_address.as_deref(), Some("198.51.100.4"));
        assert_eq!(meta.user_agent.as_deref(), Some("saldo-app/2.1"));
        assert_eq!(request_meta(&HeaderMap::new()), RequestMeta::default());
    }

    #[test]
    fn test_error_status_mapping() {
        let (status, body) = error_response(CoreError::InsufficientBalance {
            available: crate::money::Money::from_major(10),
            requested: crate::money::Money::from_major(80),
        });
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body.0.error, "INSUFFICIENT_BALANCE");

        let (status, _) = error_response(CoreError::Maintenance("점검".into()));
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        let (status, _) = error_response(CoreError::not_found("deposit", 1));
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_idempotency_key_scoped() {
        let mut headers = HeaderMap::new();
        assert_eq!(idempotency_key("deposit", 7, &headers), None);
        headers.insert(IDEMPOTENCY_HEADER, HeaderValue::from_static("abc-123"));
        assert_eq!(idempotency_key("deposit", 7, &headers).as_deref(), Some("deposit:7:abc-123"));
        assert_ne!(idempotency_key("deposit", 7, &headers), idempotency_key("deposit", 8, &headers));
        assert_eq!(limit(Some(10_000)), MAX_LIMIT);
        assert_eq!(limit(None), DEFAULT_LIMIT);
    }
}
