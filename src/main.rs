use std::sync::Arc;

use anyhow::Context;
use dotenv::dotenv;
use log::info;

use saldo::cache::{spawn_cleanup_sweep, ExpiringStore, InMemoryExpiringStore};
use saldo::cash_engine::CashPlatform;
use saldo::clock::SystemClock;
use saldo::config::AppConfig;
use saldo::db::init_database;
use saldo::notify::LogNotifier;
use saldo::server::{start_server, ServerState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("💸 saldo 서버 시작 중...");

    let config = AppConfig::from_env()?;
    let pool = init_database(&config.database_url, config.db_max_connections)
        .await
        .with_context(|| format!("데이터베이스 연결 실패: {}", config.database_url))?;

    let platform = Arc::new(CashPlatform::new(
        pool,
        Arc::new(SystemClock),
        Arc::new(LogNotifier),
        config.settings_cache_ttl,
    ));
    if platform.settings().ensure_defaults(&config.defaults).await? {
        info!("⚙️  플랫폼 설정 레코드를 새로 만들었습니다");
    }

    let idempotency: Arc<dyn ExpiringStore> = Arc::new(InMemoryExpiringStore::new());
    let _sweeper = spawn_cleanup_sweep(idempotency.clone(), config.cleanup_interval);

    let state = ServerState {
        platform,
        idempotency,
        idempotency_ttl: config.idempotency_ttl,
    };

    start_server(config.rest_port, state)
        .await
        .context("REST 서버 실행 실패")?;

    Ok(())
}
