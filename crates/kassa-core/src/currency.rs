//! # Currency & Rate Utility
//!
//! The store trades in two currencies: a **base** currency (USD) and a
//! **local** currency (KHR). Conversions between them go through an
//! asymmetric buy/sell rate pair, the way a currency-exchange counter works.
//!
//! ## Conversion Rules
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Rates are quoted as LOCAL units per ONE base unit.                     │
//! │                                                                         │
//! │    buy  = 4000   (KHR per USD)                                          │
//! │    sell = 4100   (KHR per USD)                                          │
//! │                                                                         │
//! │  local → base : amount ÷ buy     8000 KHR → 2.00 USD                    │
//! │  base  → local: amount × sell    2.00 USD → 8200 KHR                    │
//! │  same currency: identity                                               │
//! │                                                                         │
//! │  Results are rounded to the target's minor unit, half to even.          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;

// =============================================================================
// Currency
// =============================================================================

/// A currency the store accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "UPPERCASE"))]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    /// US dollar, the base currency. Counted in cents.
    Usd,
    /// Cambodian riel, the local currency. Counted in whole riel.
    Khr,
}

impl Currency {
    /// The currency loyalty points and reports are normalized to.
    pub const BASE: Currency = Currency::Usd;

    /// The store's local currency.
    pub const LOCAL: Currency = Currency::Khr;

    /// ISO 4217 code.
    pub const fn code(&self) -> &'static str {
        match self {
            Currency::Usd => "USD",
            Currency::Khr => "KHR",
        }
    }

    /// Number of decimal places in one major unit.
    pub const fn minor_exponent(&self) -> u32 {
        match self {
            Currency::Usd => 2,
            Currency::Khr => 0,
        }
    }

    /// True for the base currency.
    pub const fn is_base(&self) -> bool {
        matches!(self, Currency::Usd)
    }

    /// All supported currencies.
    pub const fn all() -> [Currency; 2] {
        [Currency::Usd, Currency::Khr]
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Currency {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "USD" => Ok(Currency::Usd),
            "KHR" => Ok(Currency::Khr),
            _ => Err(ValidationError::NotAllowed {
                field: "currency".to_string(),
                allowed: Currency::all().iter().map(|c| c.code().to_string()).collect(),
            }),
        }
    }
}

// =============================================================================
// Exchange Rate
// =============================================================================

/// Buy/sell rate pair, in local units per one base unit.
///
/// Both sides are strictly positive; [`ExchangeRate::new`] and deserialization
/// enforce it, so conversions never divide by zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawExchangeRate")]
pub struct ExchangeRate {
    buy: Decimal,
    sell: Decimal,
}

#[derive(Deserialize)]
struct RawExchangeRate {
    buy: Decimal,
    sell: Decimal,
}

impl TryFrom<RawExchangeRate> for ExchangeRate {
    type Error = ValidationError;

    fn try_from(raw: RawExchangeRate) -> Result<Self, Self::Error> {
        ExchangeRate::new(raw.buy, raw.sell)
    }
}

impl ExchangeRate {
    /// Creates a rate pair, rejecting zero or negative rates.
    pub fn new(buy: Decimal, sell: Decimal) -> Result<Self, ValidationError> {
        if buy <= Decimal::ZERO {
            return Err(ValidationError::MustBePositive {
                field: "buy_rate".to_string(),
            });
        }
        if sell <= Decimal::ZERO {
            return Err(ValidationError::MustBePositive {
                field: "sell_rate".to_string(),
            });
        }
        Ok(ExchangeRate { buy, sell })
    }

    /// Local units the store pays per base unit.
    pub fn buy(&self) -> Decimal {
        self.buy
    }

    /// Local units the store charges per base unit.
    pub fn sell(&self) -> Decimal {
        self.sell
    }

    /// Converts `value` from one currency into another.
    ///
    /// ## Example
    /// ```rust
    /// use kassa_core::currency::{Currency, ExchangeRate};
    /// use kassa_core::money::Money;
    /// use rust_decimal::Decimal;
    ///
    /// let rate = ExchangeRate::new(Decimal::from(4000), Decimal::from(4100)).unwrap();
    ///
    /// let usd = rate.convert(Money::from_minor(8000), Currency::Khr, Currency::Usd);
    /// assert_eq!(usd.minor(), 200); // 2.00 USD via buy
    ///
    /// let khr = rate.convert(Money::from_minor(200), Currency::Usd, Currency::Khr);
    /// assert_eq!(khr.minor(), 8200); // 8200 KHR via sell
    /// ```
    pub fn convert(&self, value: Money, from: Currency, to: Currency) -> Money {
        self.checked_convert(value, from, to)
            .unwrap_or(if value.is_negative() {
                Money::from_minor(i64::MIN)
            } else {
                Money::from_minor(i64::MAX)
            })
    }

    /// Like [`ExchangeRate::convert`], but `None` instead of saturating when
    /// the result does not fit.
    pub fn checked_convert(&self, value: Money, from: Currency, to: Currency) -> Option<Money> {
        if from == to {
            return Some(value);
        }

        let major = Decimal::new(value.minor(), from.minor_exponent());
        decimal_to_minor(self.convert_major(major, from, to)?, to.minor_exponent())
    }

    /// Converts a major-unit decimal without rounding. `None` on overflow.
    pub fn convert_major(&self, major: Decimal, from: Currency, to: Currency) -> Option<Decimal> {
        if from == to {
            Some(major)
        } else if to.is_base() {
            major.checked_div(self.buy)
        } else {
            major.checked_mul(self.sell)
        }
    }
}

/// Scales a major-unit decimal to minor units, rounding half to even.
/// `None` when the result does not fit in an `i64`.
pub(crate) fn decimal_to_minor(major: Decimal, exponent: u32) -> Option<Money> {
    major
        .checked_mul(Decimal::from(10i64.pow(exponent)))?
        .round_dp_with_strategy(0, RoundingStrategy::MidpointNearestEven)
        .to_i64()
        .map(Money::from_minor)
}

// =============================================================================
// Amount
// =============================================================================

/// A monetary value tagged with its currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Amount {
    pub value: Money,
    pub currency: Currency,
}

impl Amount {
    pub const fn new(value: Money, currency: Currency) -> Self {
        Amount { value, currency }
    }

    pub const fn zero(currency: Currency) -> Self {
        Amount {
            value: Money::zero(),
            currency,
        }
    }

    /// Converts into `currency` with the given rate pair.
    pub fn convert_to(&self, currency: Currency, rate: &ExchangeRate) -> Amount {
        Amount::new(rate.convert(self.value, self.currency, currency), currency)
    }

    /// Converts into `currency`, failing instead of saturating.
    pub fn checked_convert_to(&self, currency: Currency, rate: &ExchangeRate) -> CoreResult<Amount> {
        rate.checked_convert(self.value, self.currency, currency)
            .map(|value| Amount::new(value, currency))
            .ok_or(CoreError::AmountOutOfRange("currency conversion"))
    }

    /// Whole base-currency units, truncated toward zero.
    pub fn whole_units(&self) -> i64 {
        self.value.minor() / 10i64.pow(self.currency.minor_exponent())
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}",
            self.value.format_with_exponent(self.currency.minor_exponent()),
            self.currency
        )
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
