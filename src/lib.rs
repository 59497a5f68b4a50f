//! saldo: 리퍼럴 보너스와 이상거래 탐지를 포함한 충전/출금 잔고 관리 코어

pub mod api;
pub mod cache;
pub mod cash_engine;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod money;
pub mod notify;
pub mod server;
