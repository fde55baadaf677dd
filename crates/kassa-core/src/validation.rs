//! # Validation Module
//!
//! Input validation for everything that enters the order-to-cash core.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Operation boundary (kassa-service)                           │
//! │  ├── Deserialization into typed requests                               │
//! │  └── THIS MODULE: field rules, collected into one error list           │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Domain logic (kassa-core)                                    │
//! │  └── Business rules (stock, change, finalized payments)                │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── CHECK (quantity >= 0)                                             │
//! │  ├── UNIQUE open drawer per user                                       │
//! │  └── Foreign key constraints                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use kassa_core::validation::{validate_id, validate_quantity, Validator};
//!
//! let mut v = Validator::new();
//! v.check(validate_id("product_id", "not-a-uuid"));
//! v.check(validate_quantity(0));
//!
//! let errors = v.finish().unwrap_err();
//! assert_eq!(errors.len(), 2);
//! ```

use rust_decimal::Decimal;

use crate::drawer::DenominationInventory;
use crate::error::ValidationError;
use crate::money::Money;
use crate::payment::Charge;
use crate::pricing::{Discount, DiscountKind};
use crate::types::CashTender;
use crate::{
    MAX_CHARGE_AMOUNT, MAX_DENOMINATION, MAX_DISCOUNT_VALUE, MAX_DRAWER_COUNT, MAX_ITEM_QUANTITY,
    MAX_PAYMENT_CHARGES, MAX_TENDER_COUNT,
};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Collector
// =============================================================================

/// Collects every failing rule so the caller gets the full list at once.
#[derive(Debug, Default)]
pub struct Validator {
    errors: Vec<ValidationError>,
}

impl Validator {
    pub fn new() -> Self {
        Validator::default()
    }

    pub fn check(&mut self, result: ValidationResult<()>) -> &mut Self {
        if let Err(err) = result {
            self.errors.push(err);
        }
        self
    }

    pub fn finish(self) -> Result<(), Vec<ValidationError>> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self.errors)
        }
    }
}

// =============================================================================
// Identifier & String Validators
// =============================================================================

/// Validates a UUID identifier.
///
/// ## Example
/// ```rust
/// use kassa_core::validation::validate_id;
///
/// assert!(validate_id("payment_id", "550e8400-e29b-41d4-a716-446655440000").is_ok());
/// assert!(validate_id("payment_id", "not-a-uuid").is_err());
/// ```
pub fn validate_id(field: &str, id: &str) -> ValidationResult<()> {
    if id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    uuid::Uuid::parse_str(id).map_err(|_| ValidationError::InvalidFormat {
        field: field.to_string(),
        reason: "must be a valid UUID".to_string(),
    })?;

    Ok(())
}

/// Validates an optional lot tag (option or color filter).
pub fn validate_tag(field: &str, tag: Option<&str>) -> ValidationResult<()> {
    let Some(tag) = tag else {
        return Ok(());
    };
    if tag.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }
    if tag.len() > 50 {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: 50,
        });
    }
    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates an order quantity.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed MAX_ITEM_QUANTITY (999)
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_ITEM_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_ITEM_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a discount snapshot.
///
/// ## Rules
/// - Value must not be negative
/// - Percentages must not exceed 100
/// - Fixed amounts must not exceed MAX_DISCOUNT_VALUE major units
pub fn validate_discount(discount: &Discount) -> ValidationResult<()> {
    if discount.value < Decimal::ZERO {
        return Err(ValidationError::MustNotBeNegative {
            field: "discount.value".to_string(),
        });
    }

    let max = match discount.kind {
        DiscountKind::Percentage => 100,
        DiscountKind::Fixed => MAX_DISCOUNT_VALUE,
    };
    if discount.value > Decimal::from(max) {
        return Err(ValidationError::OutOfRange {
            field: "discount.value".to_string(),
            min: 0,
            max,
        });
    }

    Ok(())
}

/// Validates a service fee, voucher or discount line.
pub fn validate_charge(field: &str, charge: &Charge) -> ValidationResult<()> {
    if charge.label.trim().is_empty() {
        return Err(ValidationError::Required {
            field: format!("{field}.label"),
        });
    }
    if charge.amount.value.is_negative() {
        return Err(ValidationError::MustNotBeNegative {
            field: format!("{field}.amount"),
        });
    }
    if charge.amount.value.minor() > MAX_CHARGE_AMOUNT {
        return Err(ValidationError::OutOfRange {
            field: format!("{field}.amount"),
            min: 0,
            max: MAX_CHARGE_AMOUNT,
        });
    }
    Ok(())
}

/// Validates one of a payment's charge lists.
pub fn validate_charges(field: &str, charges: &[Charge]) -> ValidationResult<()> {
    if charges.len() > MAX_PAYMENT_CHARGES {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: MAX_PAYMENT_CHARGES as i64,
        });
    }
    charges.iter().try_for_each(|c| validate_charge(field, c))
}

/// Validates a change amount (zero allowed).
pub fn validate_change(value: Money) -> ValidationResult<()> {
    if value.is_negative() {
        return Err(ValidationError::MustNotBeNegative {
            field: "change".to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// Cash Validators
// =============================================================================

/// Validates a drawer inventory.
///
/// ## Rules
/// - Denomination values must be positive, at most MAX_DENOMINATION
/// - Counts must not be negative, at most MAX_DRAWER_COUNT
/// - Each value appears once
pub fn validate_inventory(inventory: &DenominationInventory) -> ValidationResult<()> {
    let field = format!("inventory.{}", inventory.currency);

    for (i, d) in inventory.denominations.iter().enumerate() {
        validate_denomination(&format!("{field}.value"), d.value)?;
        if d.count < 0 {
            return Err(ValidationError::MustNotBeNegative {
                field: format!("{field}.count"),
            });
        }
        if d.count > MAX_DRAWER_COUNT {
            return Err(ValidationError::OutOfRange {
                field: format!("{field}.count"),
                min: 0,
                max: MAX_DRAWER_COUNT,
            });
        }
        if inventory.denominations[..i].iter().any(|p| p.value == d.value) {
            return Err(ValidationError::InvalidFormat {
                field: format!("{field}.value"),
                reason: format!("denomination {} listed twice", d.value),
            });
        }
    }

    Ok(())
}

fn validate_denomination(field: &str, value: Money) -> ValidationResult<()> {
    if !value.is_positive() {
        return Err(ValidationError::MustBePositive {
            field: field.to_string(),
        });
    }
    if value.minor() > MAX_DENOMINATION {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 1,
            max: MAX_DENOMINATION,
        });
    }
    Ok(())
}

/// Validates cash handed over at checkout.
///
/// ## Rules
/// - Denomination values must be positive, at most MAX_DENOMINATION
/// - Counts must be between 1 and MAX_TENDER_COUNT
pub fn validate_tender(received: &[CashTender]) -> ValidationResult<()> {
    for cash in received {
        validate_denomination("received.denomination", cash.denomination)?;
        if cash.count <= 0 {
            return Err(ValidationError::MustBePositive {
                field: "received.count".to_string(),
            });
        }
        if cash.count > MAX_TENDER_COUNT {
            return Err(ValidationError::OutOfRange {
                field: "received.count".to_string(),
                min: 1,
                max: MAX_TENDER_COUNT,
            });
        }
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::currency::{Amount, Currency};
    use crate::drawer::DenominationCount;
    use rust_decimal_macros::dec;

    #[test]
    fn test_validate_id() {
        assert!(validate_id("id", "550e8400-e29b-41d4-a716-446655440000").is_ok());
        assert!(validate_id("id", "").is_err());
        assert!(validate_id("id", "not-a-uuid").is_err());
        assert_eq!(validate_id("drawer_id", "123").unwrap_err().field(), "drawer_id");
    }

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(999).is_ok());

        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(-1).is_err());
        assert!(validate_quantity(1000).is_err());
    }

    #[test]
    fn test_validate_discount() {
        assert!(validate_discount(&Discount::percentage(dec!(100))).is_ok());
        assert!(validate_discount(&Discount::percentage(dec!(100.5))).is_err());
        assert!(validate_discount(&Discount::fixed(dec!(150), Currency::Usd)).is_ok());
        assert!(validate_discount(&Discount::fixed(dec!(-1), Currency::Usd)).is_err());
    }

    #[test]
    fn test_validate_inventory() {
        let good = DenominationInventory::new(
            Currency::Khr,
            vec![
                DenominationCount::new(Money::from_minor(1000), 3),
                DenominationCount::new(Money::from_minor(5000), 0),
            ],
        );
        assert!(validate_inventory(&good).is_ok());

        let duplicate = DenominationInventory::new(
            Currency::Khr,
            vec![
                DenominationCount::new(Money::from_minor(1000), 3),
                DenominationCount::new(Money::from_minor(1000), 1),
            ],
        );
        assert!(validate_inventory(&duplicate).is_err());

        let negative = DenominationInventory::new(
            Currency::Usd,
            vec![DenominationCount::new(Money::from_cents(100), -1)],
        );
        assert_eq!(
            validate_inventory(&negative).unwrap_err().field(),
            "inventory.USD.count"
        );
    }

    #[test]
    fn test_validate_charge_and_tender() {
        let fee = Charge::new("delivery", Amount::new(Money::from_cents(100), Currency::Usd));
        assert!(validate_charge("services", &fee).is_ok());

        let unnamed = Charge::new(" ", Amount::new(Money::from_cents(100), Currency::Usd));
        assert_eq!(
            validate_charge("vouchers", &unnamed).unwrap_err().field(),
            "vouchers.label"
        );

        let bad = [CashTender {
            currency: Currency::Usd,
            denomination: Money::from_cents(100),
            count: 0,
        }];
        assert!(validate_tender(&bad).is_err());

        assert!(validate_charges("services", &[fee.clone(), fee.clone()]).is_ok());
        assert_eq!(
            validate_charges("vouchers", &[fee.clone(), unnamed]).unwrap_err().field(),
            "vouchers.label"
        );
        let many = vec![fee; MAX_PAYMENT_CHARGES + 1];
        assert_eq!(validate_charges("discounts", &many).unwrap_err().field(), "discounts");
    }

    #[test]
    fn test_magnitudes_are_bounded() {
        let huge_discount = Discount::fixed(Decimal::MAX, Currency::Usd);
        assert_eq!(
            validate_discount(&huge_discount),
            Err(ValidationError::OutOfRange {
                field: "discount.value".to_string(),
                min: 0,
                max: MAX_DISCOUNT_VALUE,
            })
        );
        assert!(validate_discount(&Discount::fixed(Decimal::from(MAX_DISCOUNT_VALUE), Currency::Khr)).is_ok());

        let many_notes = [CashTender {
            currency: Currency::Usd,
            denomination: Money::from_cents(10_000),
            count: i64::MAX / 2,
        }];
        assert_eq!(
            validate_tender(&many_notes).unwrap_err().field(),
            "received.count"
        );

        let giant_note = [CashTender {
            currency: Currency::Khr,
            denomination: Money::from_minor(MAX_DENOMINATION + 1),
            count: 1,
        }];
        assert_eq!(
            validate_tender(&giant_note).unwrap_err().field(),
            "received.denomination"
        );

        let stuffed = DenominationInventory::new(
            Currency::Usd,
            vec![DenominationCount::new(Money::from_cents(100), MAX_DRAWER_COUNT + 1)],
        );
        assert!(validate_inventory(&stuffed).is_err());

        let fee = Charge::new(
            "delivery",
            Amount::new(Money::from_minor(MAX_CHARGE_AMOUNT + 1), Currency::Usd),
        );
        assert!(validate_charge("services", &fee).is_err());
    }

    #[test]
    fn test_validator_collects_all() {
        let mut v = Validator::new();
        v.check(validate_quantity(5))
            .check(validate_quantity(-5))
            .check(validate_tag("color", Some("")));
        let errors = v.finish().unwrap_err();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[1].field(), "color");
    }
}
