//! 잔고 원장 변경기
//!
//! 사용자 잔고를 바꾸는 유일한 경로입니다. 항상 호출자의 트랜잭션 연결 위에서 실행되어
//! 상태 전이와 함께 커밋되거나 함께 롤백됩니다.

use serde::Serialize;
use sqlx::SqliteConnection;

use super::model::UserId;
use crate::db::repository::UserRepository;
use crate::error::{CoreError, CoreResult};
use crate::money::Money;

/// 잔고 변경 결과 (감사 로그의 이전/이후 잔고)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BalanceChange {
    pub user_id: UserId,
    pub previous: Money,
    pub current: Money,
}

pub struct BalanceLedger;

impl BalanceLedger {
    /// 입금. 상한 검사 없음
    pub async fn credit(conn: &mut SqliteConnection, user_id: UserId, amount: Money) -> CoreResult<BalanceChange> {
        ensure_positive(amount)?;

        let current = UserRepository::add_balance(&mut *conn, user_id, amount.minor())
            .await?
            .ok_or_else(|| CoreError::not_found("user", user_id))?;

        Ok(BalanceChange {
            user_id,
            previous: Money::from_minor(current - amount.minor()),
            current: Money::from_minor(current),
        })
    }

    /// 출금. 잔고 검사와 차감이 한 문장이라 동시 차감에도 음수가 되지 않습니다.
    pub async fn debit(conn: &mut SqliteConnection, user_id: UserId, amount: Money) -> CoreResult<BalanceChange> {
        ensure_positive(amount)?;

        match UserRepository::subtract_balance_if_sufficient(&mut *conn, user_id, amount.minor()).await? {
            Some(current) => Ok(BalanceChange {
                user_id,
                previous: Money::from_minor(current + amount.minor()),
                current: Money::from_minor(current),
            }),
            None => {
                let user = UserRepository::find(&mut *conn, user_id)
                    .await?
                    .ok_or_else(|| CoreError::not_found("user", user_id))?;
                Err(CoreError::InsufficientBalance {
                    available: Money::from_minor(user.balance),
                    requested: amount,
                })
            }
        }
    }
}

fn ensure_positive(amount: Money) -> CoreResult<()> {
    if amount.is_positive() {
        Ok(())
    } else {
        Err(CoreError::validation(format!("금액은 0보다 커야 합니다: {}", amount)))
    }
}
