//! 만료 시간이 있는 키-값 저장소
//!
//! 코어의 보너스/경고 멱등성은 DB 조건으로 보장하며 이 저장소에 의존하지 않습니다.
//! HTTP 계층의 Idempotency-Key 재응답처럼 일시적인 데이터에만 사용합니다.

pub mod expiring_store;

pub use expiring_store::{spawn_cleanup_sweep, CacheError, ExpiringStore, InMemoryExpiringStore};
