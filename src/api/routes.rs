use axum::{
    routing::{delete, get, post},
    Router,
};

use crate::api::handlers::*;
use crate::server::ServerState;

/// API 라우터 생성
pub fn create_api_router() -> Router<ServerState> {
    Router::new()
        .route("/health", get(health))
        // 사용자 / 출금 계좌 API
        .route("/api/v1/users", post(register_user))
        .route("/api/v1/users/:user_id", get(get_user))
        .route(
            "/api/v1/users/:user_id/payout-accounts",
            get(list_payout_accounts).post(add_payout_account),
        )
        .route(
            "/api/v1/users/:user_id/payout-accounts/:account_id",
            delete(archive_payout_account),
        )
        .route("/api/v1/users/:user_id/deposits", get(user_deposits))
        .route("/api/v1/users/:user_id/withdrawals", get(user_withdrawals))

        // 충전 API
        .route("/api/v1/deposits", post(submit_deposit))
        .route("/api/v1/deposits/:deposit_id/approve", post(approve_deposit))
        .route("/api/v1/deposits/:deposit_id/reject", post(reject_deposit))

        // 출금 API
        .route("/api/v1/withdrawals", post(submit_withdrawal))
        .route("/api/v1/withdrawals/:withdrawal_id/approve", post(approve_withdrawal))
        .route("/api/v1/withdrawals/:withdrawal_id/reject", post(reject_withdrawal))

        // 관리자 API
        .route("/api/v1/admin/pending", get(list_pending))
        .route("/api/v1/admin/stats", get(get_stats))
        .route("/api/v1/admin/alerts", get(list_alerts))
        .route("/api/v1/admin/alerts/:alert_id/review", post(review_alert))
        .route("/api/v1/admin/settings", get(get_settings).put(update_settings))
        .route("/api/v1/admin/audit", get(audit_log))
}
