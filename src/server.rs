use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use log::info;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api::create_api_router;
use crate::cache::ExpiringStore;
use crate::cash_engine::CashPlatform;

/// 서버 상태
#[derive(Clone)]
pub struct ServerState {
    pub platform: Arc<CashPlatform>,
    /// Idempotency-Key 재응답 저장소
    pub idempotency: Arc<dyn ExpiringStore>,
    pub idempotency_ttl: Duration,
}

/// 미들웨어까지 포함한 라우터
pub fn build_router(state: ServerState) -> Router {
    create_api_router()
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// 서버 시작
pub async fn start_server(rest_port: u16, state: ServerState) -> std::io::Result<()> {
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", rest_port)).await?;

    info!("🚀 서버가 성공적으로 시작되었습니다!");
    info!("REST API: http://localhost:{}", rest_port);

    axum::serve(listener, app).await
}
