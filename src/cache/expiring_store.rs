use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, warn};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::interval;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("캐시 저장소 오류: {0}")]
    Backend(String),
    #[error("직렬화 오류: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// 캐시 엔트리
#[derive(Debug, Clone)]
struct CacheEntry {
    value: serde_json::Value,
    inserted_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn new(value: serde_json::Value, ttl: Duration) -> Self {
        Self {
            value,
            inserted_at: Instant::now(),
            ttl,
        }
    }

    fn is_expired(&self) -> bool {
        self.inserted_at.elapsed() >= self.ttl
    }
}

/// 만료 기능이 있는 저장소 경계 (프로세스 내 캐시 또는 외부 공유 저장소)
#[async_trait::async_trait]
pub trait ExpiringStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, CacheError>;
    async fn put(&self, key: &str, value: serde_json::Value, ttl: Duration) -> Result<(), CacheError>;
    /// 유효한 엔트리가 없을 때만 저장. 저장했으면 true
    async fn put_if_absent(&self, key: &str, value: serde_json::Value, ttl: Duration) -> Result<bool, CacheError>;
    async fn remove(&self, key: &str) -> Result<Option<serde_json::Value>, CacheError>;
    /// 만료된 엔트리 정리. 정리한 개수 반환
    async fn purge_expired(&self) -> Result<usize, CacheError>;
}

/// 프로세스 내 저장소
#[derive(Default)]
pub struct InMemoryExpiringStore {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl InMemoryExpiringStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait::async_trait]
impl ExpiringStore for InMemoryExpiringStore {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, CacheError> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|entry| !entry.is_expired())
            .map(|entry| entry.value.clone()))
    }

    async fn put(&self, key: &str, value: serde_json::Value, ttl: Duration) -> Result<(), CacheError> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), CacheEntry::new(value, ttl));
        Ok(())
    }

    async fn put_if_absent(&self, key: &str, value: serde_json::Value, ttl: Duration) -> Result<bool, CacheError> {
        let mut entries = self.entries.write().await;
        if entries.get(key).is_some_and(|entry| !entry.is_expired()) {
            return Ok(false);
        }
        entries.insert(key.to_string(), CacheEntry::new(value, ttl));
        Ok(true)
    }

    async fn remove(&self, key: &str) -> Result<Option<serde_json::Value>, CacheError> {
        Ok(self
            .entries
            .write()
            .await
            .remove(key)
            .filter(|entry| !entry.is_expired())
            .map(|entry| entry.value))
    }

    async fn purge_expired(&self) -> Result<usize, CacheError> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired());
        Ok(before - entries.len())
    }
}

/// 주기적인 만료 엔트리 정리 태스크
pub fn spawn_cleanup_sweep(store: Arc<dyn ExpiringStore>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every);
        loop {
            ticker.tick().await;
            match store.purge_expired().await {
                Ok(0) => {}
                Ok(purged) => debug!("만료된 캐시 엔트리 {}개 정리", purged),
                Err(e) => warn!("⚠️ 캐시 정리 실패: {}", e),
            }
        }
    })
}
