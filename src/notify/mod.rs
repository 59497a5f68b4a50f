//! 알림 연동
//!
//! 승인/거절 이후 사용자에게 보내는 알림의 경계입니다.
//! 전송은 커밋 이후 별도 태스크에서 이루어지며, 실패는 로그만 남기고 호출자에게 전파하지 않습니다.

use std::sync::Arc;

use log::{info, warn};
use serde::Serialize;

use crate::cash_engine::model::UserId;
use crate::money::Money;

/// 알림 이벤트
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Notification {
    DepositApproved {
        user_id: UserId,
        operation_id: String,
        net_amount: Money,
        new_balance: Money,
    },
    DepositRejected {
        user_id: UserId,
        operation_id: String,
        reason: String,
    },
    WithdrawalApproved {
        user_id: UserId,
        operation_id: String,
        amount: Money,
        proof_url: Option<String>,
    },
    WithdrawalRejected {
        user_id: UserId,
        operation_id: String,
        reason: String,
    },
    ReferralBonusGranted {
        referrer_id: UserId,
        referred_id: UserId,
        amount: Money,
    },
}

impl Notification {
    /// 수신자 목록
    pub fn recipients(&self) -> Vec<UserId> {
        match self {
            Notification::DepositApproved { user_id, .. }
            | Notification::DepositRejected { user_id, .. }
            | Notification::WithdrawalApproved { user_id, .. }
            | Notification::WithdrawalRejected { user_id, .. } => vec![*user_id],
            Notification::ReferralBonusGranted {
                referrer_id,
                referred_id,
                ..
            } => vec![*referred_id, *referrer_id],
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("알림 전송 실패: {0}")]
    Delivery(String),
}

/// 알림 채널 핸들러
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// 로그로만 남기는 기본 알림 채널
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait::async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        let payload = serde_json::to_string(notification).map_err(|e| NotifyError::Delivery(e.to_string()))?;
        info!("📨 알림 → {:?}: {}", notification.recipients(), payload);
        Ok(())
    }
}

/// 커밋 이후 알림 전송 (fire-and-forget)
pub fn dispatch(notifier: Arc<dyn Notifier>, notification: Notification) {
    tokio::spawn(async move {
        if let Err(e) = notifier.notify(&notification).await {
            warn!("⚠️ 알림 전송 실패 ({:?}): {}", notification.recipients(), e);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    struct FailingNotifier {
        attempts: Mutex<u32>,
    }

    #[async_trait::async_trait]
    impl Notifier for FailingNotifier {
        async fn notify(&self, _notification: &Notification) -> Result<(), NotifyError> {
            *self.attempts.lock().unwrap() += 1;
            Err(NotifyError::Delivery("smtp down".into()))
        }
    }

    #[test]
    fn test_bonus_notification_reaches_both_sides() {
        let n = Notification::ReferralBonusGranted {
            referrer_id: 1,
            referred_id: 2,
            amount: Money::from_major(5),
        };
        assert_eq!(n.recipients(), vec![2, 1]);
    }

    #[test]
    fn test_notification_payload_shape() {
        let n = Notification::DepositRejected {
            user_id: 3,
            operation_id: "REC-20240101-ABCDEF12".into(),
            reason: "영수증 금액 불일치".into(),
        };
        let json = serde_json::to_value(&n).unwrap();
        assert_eq!(json["event"], "deposit_rejected");
        assert_eq!(json["user_id"], 3);
    }

    #[tokio::test]
    async fn test_log_notifier_succeeds() {
        let n = Notification::WithdrawalApproved {
            user_id: 1,
            operation_id: "RET-1".into(),
            amount: Money::from_major(80),
            proof_url: None,
        };
        assert!(LogNotifier.notify(&n).await.is_ok());
    }

    #[tokio::test]
    async fn test_dispatch_swallows_failures() {
        let notifier = Arc::new(FailingNotifier {
            attempts: Mutex::new(0),
        });
        dispatch(
            notifier.clone(),
            Notification::WithdrawalRejected {
                user_id: 1,
                operation_id: "RET-1".into(),
                reason: "계좌 불일치".into(),
            },
        );

        for _ in 0..50 {
            if *notifier.attempts.lock().unwrap() > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(*notifier.attempts.lock().unwrap(), 1);
    }
}
