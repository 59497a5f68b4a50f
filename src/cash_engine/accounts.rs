//! 사용자 및 출금 계좌
//!
//! 가입 시 추천 코드가 있으면 리퍼럴 레코드를 같은 트랜잭션에서 만듭니다.
//! 출금 계좌 삭제는 보관 처리이며, 대기 중인 출금이 걸린 계좌는 보관할 수 없습니다.

use log::info;
use serde_json::json;
use uuid::Uuid;

use super::audit::{actions, AuditRecord, AuditTrail};
use super::model::{Actor, PayoutAccount, RequestMeta, User, UserId};
use super::EngineContext;
use crate::db::models::to_millis;
use crate::db::repository::{PayoutAccountRepository, ReferralRepository, UserRepository, WithdrawalRepository};
use crate::error::{CoreError, CoreResult};

pub struct AccountService {
    ctx: EngineContext,
}

fn generate_referral_code() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_uppercase()
}

fn required(field: &str, value: &str) -> CoreResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(CoreError::validation(format!("{}이(가) 비어 있습니다", field)));
    }
    Ok(value.to_string())
}

impl AccountService {
    pub fn new(ctx: EngineContext) -> Self {
        Self { ctx }
    }

    /// 사용자 가입
    pub async fn register_user(
        &self,
        email: &str,
        full_name: &str,
        referral_code: Option<&str>,
        meta: &RequestMeta,
    ) -> CoreResult<User> {
        let email = required("이메일", email)?.to_lowercase();
        if !email.contains('@') {
            return Err(CoreError::validation(format!("이메일 형식 오류: {}", email)));
        }
        let full_name = required("이름", full_name)?;

        let referrer = match referral_code.map(str::trim).filter(|c| !c.is_empty()) {
            Some(code) => Some(
                UserRepository::find_by_referral_code(&self.ctx.pool, &code.to_uppercase())
                    .await?
                    .ok_or_else(|| CoreError::validation(format!("존재하지 않는 추천 코드: {}", code)))?,
            ),
            None => None,
        };
        let referred_by = referrer.as_ref().map(|r| r.id);

        let now = self.ctx.now();
        let code = generate_referral_code();
        let mut tx = self.ctx.pool.begin().await?;

        let id = match UserRepository::insert(&mut *tx, &email, &full_name, &code, referred_by, to_millis(now)).await {
            Ok(id) => id,
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                return Err(CoreError::validation(format!("이미 가입된 이메일: {}", email)));
            }
            Err(e) => return Err(e.into()),
        };
        if let Some(referrer_id) = referred_by {
            ReferralRepository::insert(&mut *tx, referrer_id, id, to_millis(now)).await?;
        }

        let audit = AuditRecord::new(actions::USER_REGISTERED, Actor::User(id))
            .subject(id)
            .meta(meta)
            .details(json!({
                "email": email,
                "referral_code": code,
                "referred_by": referred_by,
            }));
        AuditTrail::record(&mut *tx, &audit, now).await?;
        tx.commit().await?;

        match referred_by {
            Some(referrer_id) => info!("👤 가입: 사용자 {} ({}), 추천인 {}", id, email, referrer_id),
            None => info!("👤 가입: 사용자 {} ({})", id, email),
        }

        self.get_user(id).await
    }

    pub async fn get_user(&self, user_id: UserId) -> CoreResult<User> {
        UserRepository::find(&self.ctx.pool, user_id)
            .await?
            .map(User::from)
            .ok_or_else(|| CoreError::not_found("user", user_id))
    }

    /// 출금 계좌 등록
    pub async fn add_payout_account(
        &self,
        user_id: UserId,
        bank_name: &str,
        account_number: &str,
        holder_name: &str,
        meta: &RequestMeta,
    ) -> CoreResult<PayoutAccount> {
        let bank_name = required("은행명", bank_name)?;
        let account_number = required("계좌번호", account_number)?;
        let holder_name = required("예금주", holder_name)?;
        self.get_user(user_id).await?;

        let now = self.ctx.now();
        let mut tx = self.ctx.pool.begin().await?;
        let id = PayoutAccountRepository::insert(&mut *tx, user_id, &bank_name, &account_number, &holder_name, to_millis(now))
            .await?;

        let audit = AuditRecord::new(actions::PAYOUT_ACCOUNT_ADDED, Actor::User(user_id))
            .subject(user_id)
            .meta(meta)
            .details(json!({
                "payout_account_id": id,
                "bank_name": bank_name,
                "account_number": account_number,
            }));
        AuditTrail::record(&mut *tx, &audit, now).await?;
        tx.commit().await?;

        info!("🏦 출금 계좌 등록: 사용자 {} 계좌 #{} ({})", user_id, id, bank_name);

        Ok(PayoutAccount {
            id,
            user_id,
            bank_name,
            account_number,
            holder_name,
            created_at: now,
            archived_at: None,
        })
    }

    /// 출금 계좌 보관 (대기 중인 출금이 있으면 `InvalidState`)
    pub async fn archive_payout_account(
        &self,
        user_id: UserId,
        account_id: i64,
        meta: &RequestMeta,
    ) -> CoreResult<PayoutAccount> {
        let now = self.ctx.now();
        let mut tx = self.ctx.pool.begin().await?;

        if PayoutAccountRepository::archive_if_unused(&mut *tx, account_id, user_id, to_millis(now)).await? == 0 {
            let account = PayoutAccountRepository::find(&mut *tx, account_id)
                .await?
                .filter(|a| a.user_id == user_id)
                .ok_or_else(|| CoreError::not_found("payout_account", account_id))?;
            if account.archived_at.is_some() {
                return Err(CoreError::InvalidState(format!("이미 보관된 출금 계좌: {}", account_id)));
            }
            let pending = WithdrawalRepository::count_pending_for_account(&mut *tx, account_id).await?;
            return Err(CoreError::InvalidState(format!(
                "대기 중인 출금 {}건이 있는 계좌는 삭제할 수 없습니다",
                pending
            )));
        }

        let account = PayoutAccountRepository::find(&mut *tx, account_id)
            .await?
            .map(PayoutAccount::from)
            .ok_or_else(|| CoreError::not_found("payout_account", account_id))?;

        let audit = AuditRecord::new(actions::PAYOUT_ACCOUNT_ARCHIVED, Actor::User(user_id))
            .subject(user_id)
            .meta(meta)
            .details(json!({ "payout_account_id": account_id }));
        AuditTrail::record(&mut *tx, &audit, now).await?;
        tx.commit().await?;

        info!("🗄️  출금 계좌 보관: 사용자 {} 계좌 #{}", user_id, account_id);
        Ok(account)
    }

    /// 사용 가능한 출금 계좌 목록
    pub async fn payout_accounts(&self, user_id: UserId) -> CoreResult<Vec<PayoutAccount>> {
        Ok(PayoutAccountRepository::find_active_by_user(&self.ctx.pool, user_id)
            .await?
            .into_iter()
            .map(PayoutAccount::from)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cash_engine::testing;
    use crate::error::ErrorKind;
    use crate::money::Money;

    #[tokio::test]
    async fn test_register_with_referral_code() {
        let (ctx, _clock) = testing::context().await;
        let accounts = AccountService::new(ctx.clone());
        let meta = RequestMeta::default();

        let referrer = accounts.register_user("Ref@Example.com ", "Rita", None, &meta).await.unwrap();
        assert_eq!(referrer.email, "ref@example.com");
        assert_eq!(referrer.referral_code.len(), 8);
        assert_eq!(referrer.balance, Money::ZERO);

        let code = referrer.referral_code.to_lowercase();
        let user = accounts.register_user("new@example.com", "Nico", Some(&code), &meta).await.unwrap();
        assert_eq!(user.referred_by, Some(referrer.id));
        assert!(!user.referral_bonus_consumed);

        let referral = ReferralRepository::find_by_referred(&ctx.pool, user.id).await.unwrap().unwrap();
        assert_eq!(referral.referrer_id, referrer.id);
        assert!(!referral.bonus_granted);
    }

    #[tokio::test]
    async fn test_register_rejects_bad_input() {
        let (ctx, _clock) = testing::context().await;
        let accounts = AccountService::new(ctx);
        let meta = RequestMeta::default();

        accounts.register_user("ana@example.com", "Ana", None, &meta).await.unwrap();
        let err = accounts.register_user("ANA@example.com", "Ana 2", None, &meta).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = accounts.register_user("bob@example.com", "Bob", Some("NOPE1234"), &meta).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        let err = accounts.register_user("not-an-email", "Bob", None, &meta).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        let err = accounts.register_user("bob@example.com", "  ", None, &meta).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_archive_guarded_by_pending_withdrawal() {
        let (ctx, _clock) = testing::context().await;
        let accounts = AccountService::new(ctx.clone());
        let meta = RequestMeta::default();
        let user = accounts.register_user("ana@example.com", "Ana", None, &meta).await.unwrap();
        let other = accounts.register_user("bob@example.com", "Bob", None, &meta).await.unwrap();
        let account = accounts
            .add_payout_account(user.id, "Banco Uno", "0011-2233", "Ana", &meta)
            .await
            .unwrap();

        let withdrawal_id = WithdrawalRepository::insert(&ctx.pool, "RET-1", user.id, account.id, 1000, 0)
            .await
            .unwrap()
            .unwrap();

        let err = accounts.archive_payout_account(user.id, account.id, &meta).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        let err = accounts.archive_payout_account(other.id, account.id, &meta).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        WithdrawalRepository::transition_from_pending(&ctx.pool, withdrawal_id, "rejected", Some("테스트"), None, 1, 1)
            .await
            .unwrap();
        let archived = accounts.archive_payout_account(user.id, account.id, &meta).await.unwrap();
        assert!(archived.archived_at.is_some());
        assert!(accounts.payout_accounts(user.id).await.unwrap().is_empty());

        let err = accounts.archive_payout_account(user.id, account.id, &meta).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }

    #[tokio::test]
    async fn test_add_payout_account_validation() {
        let (ctx, _clock) = testing::context().await;
        let accounts = AccountService::new(ctx);
        let meta = RequestMeta::default();

        let err = accounts.add_payout_account(42, "Banco", "1", "X", &meta).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let user = accounts.register_user("ana@example.com", "Ana", None, &meta).await.unwrap();
        let err = accounts.add_payout_account(user.id, "", "1", "X", &meta).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        accounts.add_payout_account(user.id, "Banco", "1", "Ana", &meta).await.unwrap();
        assert_eq!(accounts.payout_accounts(user.id).await.unwrap().len(), 1);
    }
}
