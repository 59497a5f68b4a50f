//! 금액 타입
//!
//! 모든 금액은 최소 통화 단위(센타보, 소수 둘째 자리)의 정수로 보관합니다.
//! 부동소수점은 사용하지 않으며, 수수료/비율 계산만 `rust_decimal`로 처리합니다.

use std::fmt;
use std::str::FromStr;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// 통화 소수 자릿수
pub const CURRENCY_SCALE: u32 = 2;

/// 금액 변환 에러
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MoneyError {
    #[error("소수 둘째 자리를 넘는 금액: {0}")]
    TooPrecise(Decimal),
    #[error("표현 범위를 벗어난 금액: {0}")]
    OutOfRange(Decimal),
    #[error("금액 형식 오류: {0}")]
    Parse(String),
}

/// 고정 소수점 금액 (최소 통화 단위 정수)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    /// 최소 단위 값으로 생성 (예: 9500 → 95.00)
    pub const fn from_minor(minor: i64) -> Self {
        Money(minor)
    }

    /// 정수 금액으로 생성 (예: 100 → 100.00)
    pub const fn from_major(major: i64) -> Self {
        Money(major * 100)
    }

    pub const fn minor(&self) -> i64 {
        self.0
    }

    /// Decimal에서 변환. 소수 셋째 자리 이하가 있으면 거부합니다.
    pub fn from_decimal(value: Decimal) -> Result<Self, MoneyError> {
        let normalized = value.normalize();
        if normalized.scale() > CURRENCY_SCALE {
            return Err(MoneyError::TooPrecise(value));
        }
        let minor = value
            .checked_mul(Decimal::ONE_HUNDRED)
            .ok_or(MoneyError::OutOfRange(value))?;
        minor
            .trunc()
            .to_i64()
            .map(Money)
            .ok_or(MoneyError::OutOfRange(value))
    }

    pub fn to_decimal(&self) -> Decimal {
        Decimal::new(self.0, CURRENCY_SCALE)
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(&self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money)
    }

    /// 결과가 음수가 되면 None
    pub fn checked_sub(&self, other: Money) -> Option<Money> {
        match self.0.checked_sub(other.0) {
            Some(v) if v >= 0 => Some(Money(v)),
            _ => None,
        }
    }

    /// 백분율 금액 (소수 둘째 자리에서 반올림, half-up)
    ///
    /// `Money::from_major(100).percent(dec!(5))` == 5.00
    pub fn percent(&self, percent: Decimal) -> Money {
        let raw = self.to_decimal() * percent / Decimal::ONE_HUNDRED;
        let rounded = raw.round_dp_with_strategy(CURRENCY_SCALE, RoundingStrategy::MidpointAwayFromZero);
        let minor = rounded * Decimal::ONE_HUNDRED;
        // 입력 금액보다 클 수 없으므로 i64 범위 안에 있음
        Money(minor.trunc().to_i64().unwrap_or(self.0))
    }

    /// self / total 비율. total이 0이면 None
    pub fn ratio_of(&self, total: Money) -> Option<Decimal> {
        if total.0 == 0 {
            return None;
        }
        Some(Decimal::from(self.0) / Decimal::from(total.0))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_decimal())
    }
}

impl FromStr for Money {
    type Err = MoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = Decimal::from_str(s.trim()).map_err(|e| MoneyError::Parse(e.to_string()))?;
        Money::from_decimal(value)
    }
}

impl TryFrom<Decimal> for Money {
    type Error = MoneyError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Money::from_decimal(value)
    }
}

impl From<Money> for Decimal {
    fn from(money: Money) -> Self {
        money.to_decimal()
    }
}
