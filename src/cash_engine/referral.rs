//! 리퍼럴 보너스 엔진
//!
//! 피추천인의 첫 승인 충전 이후 피추천인과 추천인 모두에게 보너스를 지급합니다.
//! 여러 번 호출해도 한 번만 지급됩니다.
//!
//! 한 트랜잭션 안에서 다음 순서로 처리합니다.
//! 1. 피추천인의 보너스 수령 플래그 선점 (첫 문장이 쓰기)
//! 2. 누적 승인 충전이 정확히 1건인지 확인
//! 3. 추천인의 지급 건수가 상한 미만인지 확인
//! 4. 양쪽 잔고 입금, 리퍼럴 레코드 지급 표시, 감사 로그
//!
//! 조건이 맞지 않으면 트랜잭션을 롤백하므로 선점한 플래그도 되돌아갑니다.

use log::{debug, info};
use serde::Serialize;
use serde_json::json;

use super::audit::{actions, AuditRecord, AuditTrail};
use super::ledger::BalanceLedger;
use super::model::{Actor, Referral, UserId};
use super::EngineContext;
use crate::db::models::{from_millis, to_millis};
use crate::db::repository::{DepositRepository, ReferralRepository, UserRepository};
use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::notify::Notification;

/// 보너스 평가 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum BonusOutcome {
    Granted { referrer_id: UserId, amount: Money },
    NoReferrer,
    AlreadyConsumed,
    NoApprovedDeposit,
    NotFirstDeposit,
    ReferrerCapReached,
    Disabled,
}

pub struct ReferralEngine {
    ctx: EngineContext,
}

impl ReferralEngine {
    pub fn new(ctx: EngineContext) -> Self {
        Self { ctx }
    }

    /// 보너스 지급 시도 (멱등)
    pub async fn try_grant_bonus(&self, user_id: UserId) -> CoreResult<BonusOutcome> {
        let settings = self.ctx.settings.snapshot().await?;
        let amount = settings.referral_bonus_amount;
        if !amount.is_positive() {
            debug!("리퍼럴 보너스 비활성 (사용자 {})", user_id);
            return Ok(BonusOutcome::Disabled);
        }

        let now = self.ctx.now();
        let mut tx = self.ctx.pool.begin().await?;

        let referrer_id = match UserRepository::claim_referral_bonus(&mut *tx, user_id).await? {
            Some(referrer_id) => referrer_id,
            None => {
                let user = UserRepository::find(&mut *tx, user_id)
                    .await?
                    .ok_or_else(|| CoreError::not_found("user", user_id))?;
                let outcome = if user.referred_by.is_none() {
                    BonusOutcome::NoReferrer
                } else {
                    BonusOutcome::AlreadyConsumed
                };
                debug!("사용자 {} 보너스 대상 아님: {:?}", user_id, outcome);
                return Ok(outcome);
            }
        };

        let approved = DepositRepository::count_approved(&mut *tx, user_id).await?;
        if approved != 1 {
            let outcome = if approved == 0 {
                BonusOutcome::NoApprovedDeposit
            } else {
                BonusOutcome::NotFirstDeposit
            };
            debug!("사용자 {} 승인 충전 {}건, 보너스 없음", user_id, approved);
            return Ok(outcome);
        }

        let referral = match ReferralRepository::find_by_referred(&mut *tx, user_id).await? {
            Some(referral) => referral,
            None => return Ok(BonusOutcome::NoReferrer),
        };

        let granted = ReferralRepository::count_granted_by_referrer(&mut *tx, referrer_id).await?;
        if granted >= i64::from(settings.max_referrals_per_user) {
            info!(
                "추천인 {} 보너스 상한 도달 ({}/{}), 사용자 {} 보너스 없음",
                referrer_id, granted, settings.max_referrals_per_user, user_id
            );
            return Ok(BonusOutcome::ReferrerCapReached);
        }

        let first_approved_at = DepositRepository::first_approved_at(&mut *tx, user_id)
            .await?
            .unwrap_or_else(|| to_millis(now));

        let referred_change = BalanceLedger::credit(&mut tx, user_id, amount).await?;
        let referrer_change = BalanceLedger::credit(&mut tx, referrer_id, amount).await?;

        if ReferralRepository::mark_granted(&mut *tx, referral.id, amount.minor(), first_approved_at).await? == 0 {
            return Ok(BonusOutcome::AlreadyConsumed);
        }

        let details = json!({
            "referral_id": referral.id,
            "referrer_id": referrer_id,
            "referred_id": user_id,
            "bonus_amount": amount,
            "referrer_bonus_count": granted + 1,
            "max_referrals_per_user": settings.max_referrals_per_user,
            "first_deposit_approved_at": from_millis(first_approved_at),
        });
        for (subject, change) in [(user_id, referred_change), (referrer_id, referrer_change)] {
            let audit = AuditRecord::new(actions::REFERRAL_BONUS_GRANTED, Actor::System)
                .subject(subject)
                .details(json!({
                    "grant": details.clone(),
                    "previous_balance": change.previous,
                    "new_balance": change.current,
                }));
            AuditTrail::record(&mut *tx, &audit, now).await?;
        }

        tx.commit().await?;

        info!(
            "🎁 리퍼럴 보너스 지급: 추천인 {} / 피추천인 {} 각 {}",
            referrer_id, user_id, amount
        );
        self.ctx.notify(Notification::ReferralBonusGranted {
            referrer_id,
            referred_id: user_id,
            amount,
        });

        Ok(BonusOutcome::Granted { referrer_id, amount })
    }

    /// 추천인이 추천한 사용자 목록
    pub async fn referrals_of(&self, referrer_id: UserId) -> CoreResult<Vec<Referral>> {
        Ok(ReferralRepository::find_by_referrer(&self.ctx.pool, referrer_id)
            .await?
            .into_iter()
            .map(Referral::from)
            .collect())
    }

    pub async fn referral_of(&self, referred_id: UserId) -> CoreResult<Option<Referral>> {
        Ok(ReferralRepository::find_by_referred(&self.ctx.pool, referred_id)
            .await?
            .map(Referral::from))
    }
}
