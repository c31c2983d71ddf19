//! # Validation Module
//!
//! Input validation utilities for Kiln.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Engine entry point (Rust)                                    │
//! │  ├── Type validation (deserialization)                                 │
//! │  └── THIS MODULE: Business rule validation                             │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Guarded SQL updates                                          │
//! │  └── stock = stock - ? WHERE stock >= ?                                │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── NOT NULL / UNIQUE constraints                                     │
//! │  └── CHECK (stock >= 0)                                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust,no_run
//! use kiln_core::validation::{validate_sku, validate_production_quantity};
//!
//! validate_sku("OAK-PLANK-2M").unwrap();
//! validate_production_quantity(25).unwrap();
//! ```

use std::collections::HashSet;

use crate::costing::ActualCost;
use crate::error::ValidationError;
use crate::money::Money;
use crate::quantity::Quantity;
use crate::types::{AdditionalCost, BomLine, NewBom, NewMaterial, NewProduct};
use crate::{MAX_BOM_LINES, MAX_MONEY_CENTS, MAX_PRODUCTION_QUANTITY};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Largest per-unit quantity a BOM line may declare, in whole units.
pub const MAX_QUANTITY_PER_UNIT: i64 = 1_000_000;

// =============================================================================
// String Validators
// =============================================================================

/// Validates a SKU (Stock Keeping Unit).
///
/// ## Rules
/// - Must not be empty
/// - Must be between 1 and 50 characters
/// - Should contain only alphanumeric characters, hyphens, underscores
///
/// ## Example
/// ```rust
/// use kiln_core::validation::validate_sku;
///
/// assert!(validate_sku("RESIN-5L").is_ok());
/// assert!(validate_sku("").is_err());
/// assert!(validate_sku("A".repeat(100).as_str()).is_err());
/// ```
pub fn validate_sku(sku: &str) -> ValidationResult<()> {
    let sku = sku.trim();

    if sku.is_empty() {
        return Err(ValidationError::Required {
            field: "sku".to_string(),
        });
    }

    validate_sku_format(sku)
}

/// Like [`validate_sku`], but an empty SKU is accepted.
///
/// BOMs may describe a product by name only.
pub fn validate_optional_sku(sku: &str) -> ValidationResult<()> {
    let sku = sku.trim();
    if sku.is_empty() {
        return Ok(());
    }
    validate_sku_format(sku)
}

fn validate_sku_format(sku: &str) -> ValidationResult<()> {
    if sku.len() > 50 {
        return Err(ValidationError::TooLong {
            field: "sku".to_string(),
            max: 50,
        });
    }

    if !sku
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::InvalidFormat {
            field: "sku".to_string(),
            reason: "must contain only letters, numbers, hyphens, and underscores".to_string(),
        });
    }

    Ok(())
}

/// Validates a display name (material, product, BOM product name).
///
/// ## Rules
/// - Must not be empty
/// - At most 200 characters
pub fn validate_name(field: &str, name: &str) -> ValidationResult<()> {
    let name = name.trim();

    if name.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if name.chars().count() > 200 {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: 200,
        });
    }

    Ok(())
}

/// Validates a unit of measure ("kg", "m", "pcs").
pub fn validate_unit(unit: &str) -> ValidationResult<()> {
    let unit = unit.trim();
    if unit.is_empty() {
        return Err(ValidationError::Required {
            field: "unit".to_string(),
        });
    }
    if unit.chars().count() > 20 {
        return Err(ValidationError::TooLong {
            field: "unit".to_string(),
            max: 20,
        });
    }
    Ok(())
}

pub fn validate_notes(notes: Option<&str>) -> ValidationResult<()> {
    match notes {
        Some(n) if n.chars().count() > 1_000 => Err(ValidationError::TooLong {
            field: "notes".to_string(),
            max: 1_000,
        }),
        _ => Ok(()),
    }
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates the number of units a production order requests.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed MAX_PRODUCTION_QUANTITY
///
/// ## User Workflow
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │  New Production Order                                                   │
/// │                                                                         │
/// │  User enters quantity: 3                                               │
/// │       │                                                                 │
/// │       ▼                                                                 │
/// │  validate_production_quantity(3) ← THIS FUNCTION                       │
/// │       │                                                                 │
/// │       ├── qty <= 0? → Error: "quantity must be positive"               │
/// │       │                                                                 │
/// │       ├── qty > 100000? → Error: out of range                          │
/// │       │                                                                 │
/// │       └── OK → Consumption Planner                                     │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
pub fn validate_production_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_PRODUCTION_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_PRODUCTION_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a BOM line's per-unit quantity: `0 < q ≤ MAX_QUANTITY_PER_UNIT`.
pub fn validate_quantity_per_unit(qty: Quantity) -> ValidationResult<()> {
    if !qty.is_positive() {
        return Err(ValidationError::MustBePositive {
            field: "quantity_per_unit".to_string(),
        });
    }
    if qty > Quantity::from_units(MAX_QUANTITY_PER_UNIT) {
        return Err(ValidationError::OutOfRange {
            field: "quantity_per_unit".to_string(),
            min: 0,
            max: MAX_QUANTITY_PER_UNIT,
        });
    }
    Ok(())
}

/// Validates a goods receipt quantity (must be positive).
pub fn validate_receipt_quantity(qty: Quantity) -> ValidationResult<()> {
    if !qty.is_positive() {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }
    Ok(())
}

/// Validates a price.
///
/// ## Rules
/// - Must be non-negative (>= 0)
/// - Zero is allowed (donated or scrap material)
/// - Must not exceed MAX_MONEY_CENTS
///
/// ## Example
/// ```rust
/// use kiln_core::validation::validate_price;
/// use kiln_core::Money;
///
/// assert!(validate_price("purchase_price", Money::from_cents(1099)).is_ok());
/// assert!(validate_price("purchase_price", Money::zero()).is_ok());
/// assert!(validate_price("purchase_price", Money::from_cents(-100)).is_err());
/// assert!(validate_price("purchase_price", Money::from_cents(i64::MAX)).is_err());
/// ```
pub fn validate_price(field: &str, price: Money) -> ValidationResult<()> {
    if price.is_negative() {
        return Err(ValidationError::MustNotBeNegative {
            field: field.to_string(),
        });
    }

    if price.cents() > MAX_MONEY_CENTS {
        return Err(money_out_of_range(field));
    }

    Ok(())
}

/// Each cost is a valid price and so is their sum.
pub fn validate_additional_costs(costs: &[AdditionalCost]) -> ValidationResult<()> {
    let mut total = Money::zero();
    for cost in costs {
        validate_name("additional_costs.description", &cost.description)?;
        validate_price("additional_costs.amount", cost.amount)?;
        total = total
            .checked_add(cost.amount)
            .ok_or_else(|| money_out_of_range("additional_costs"))?;
    }
    validate_price("additional_costs", total)
}

/// Actual costs come from accounting; negative spend is rejected.
pub fn validate_actual_cost(actual: &ActualCost) -> ValidationResult<()> {
    match actual {
        ActualCost::Total { amount } => validate_price("actual_cost", *amount),
        ActualCost::Itemized {
            materials,
            additional,
        } => {
            validate_price("actual_cost.materials", *materials)?;
            validate_price("actual_cost.additional", *additional)?;
            // Both parts are bounded, so the sum cannot overflow
            validate_price("actual_cost", *materials + *additional)
        }
    }
}

fn money_out_of_range(field: &str) -> ValidationError {
    ValidationError::OutOfRange {
        field: field.to_string(),
        min: 0,
        max: MAX_MONEY_CENTS,
    }
}

// =============================================================================
// Collection Validators
// =============================================================================

/// Validates the lines of a BOM.
///
/// ## Rules
/// - At least one line, at most MAX_BOM_LINES
/// - Every line names a material and a positive per-unit quantity
/// - No material appears twice
pub fn validate_bom_lines(lines: &[BomLine]) -> ValidationResult<()> {
    if lines.is_empty() {
        return Err(ValidationError::Empty {
            field: "lines".to_string(),
        });
    }

    if lines.len() > MAX_BOM_LINES {
        return Err(ValidationError::OutOfRange {
            field: "lines".to_string(),
            min: 1,
            max: MAX_BOM_LINES as i64,
        });
    }

    let mut seen = HashSet::new();
    for line in lines {
        if line.material_id.trim().is_empty() {
            return Err(ValidationError::Required {
                field: "material_id".to_string(),
            });
        }
        validate_quantity_per_unit(line.quantity_per_unit)?;
        if !seen.insert(line.material_id.as_str()) {
            return Err(ValidationError::Duplicate {
                field: "material_id".to_string(),
                value: line.material_id.clone(),
            });
        }
    }

    Ok(())
}

// =============================================================================
// Input Validators
// =============================================================================

pub fn validate_new_material(input: &NewMaterial) -> ValidationResult<()> {
    validate_sku(&input.sku)?;
    validate_name("name", &input.name)?;
    validate_unit(&input.unit)?;
    validate_price("purchase_price", input.purchase_price)?;
    if input.stock.is_negative() {
        return Err(ValidationError::MustNotBeNegative {
            field: "stock".to_string(),
        });
    }
    Ok(())
}

pub fn validate_new_bom(input: &NewBom) -> ValidationResult<()> {
    validate_name("product_name", &input.product_name)?;
    validate_optional_sku(&input.product_sku)?;
    validate_notes(input.notes.as_deref())?;
    validate_bom_lines(&input.lines)
}

pub fn validate_new_product(input: &NewProduct) -> ValidationResult<()> {
    validate_sku(&input.sku)?;
    validate_name("name", &input.name)?;
    if input.stock < 0 {
        return Err(ValidationError::MustNotBeNegative {
            field: "stock".to_string(),
        });
    }
    validate_price("cost_price", input.cost_price)?;
    validate_price("retail_price", input.retail_price)?;
    validate_price("wholesale_price", input.wholesale_price)
}

// =============================================================================
// UUID Validators
// =============================================================================

/// Validates a UUID string format.
///
/// ## Example
/// ```rust
/// use kiln_core::validation::validate_uuid;
///
/// assert!(validate_uuid("550e8400-e29b-41d4-a716-446655440000").is_ok());
/// assert!(validate_uuid("not-a-uuid").is_err());
/// ```
pub fn validate_uuid(id: &str) -> ValidationResult<()> {
    if id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "id".to_string(),
        });
    }

    uuid::Uuid::parse_str(id).map_err(|_| ValidationError::InvalidFormat {
        field: "id".to_string(),
        reason: "must be a valid UUID".to_string(),
    })?;

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_sku() {
        assert!(validate_sku("OAK-2M").is_ok());
        assert!(validate_sku("resin_5l").is_ok());

        assert!(validate_sku("").is_err());
        assert!(validate_sku("   ").is_err());
        assert!(validate_sku("has space").is_err());
        assert!(validate_sku(&"A".repeat(100)).is_err());

        assert!(validate_optional_sku("").is_ok());
        assert!(validate_optional_sku("bad sku").is_err());
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("product_name", "Oak Stool").is_ok());
        assert!(matches!(
            validate_name("product_name", "  "),
            Err(ValidationError::Required { .. })
        ));
        assert!(validate_name("name", &"A".repeat(300)).is_err());
    }

    #[test]
    fn test_validate_production_quantity() {
        assert!(validate_production_quantity(1).is_ok());
        assert!(validate_production_quantity(MAX_PRODUCTION_QUANTITY).is_ok());

        assert!(validate_production_quantity(0).is_err());
        assert!(validate_production_quantity(-1).is_err());
        assert!(validate_production_quantity(MAX_PRODUCTION_QUANTITY + 1).is_err());
    }

    #[test]
    fn test_validate_bom_lines() {
        let ok = vec![
            BomLine::new("a", Quantity::from_units(2)),
            BomLine::new("b", Quantity::from_milli(250)),
        ];
        assert!(validate_bom_lines(&ok).is_ok());

        assert!(matches!(
            validate_bom_lines(&[]),
            Err(ValidationError::Empty { .. })
        ));

        let dup = vec![
            BomLine::new("a", Quantity::from_units(1)),
            BomLine::new("a", Quantity::from_units(1)),
        ];
        assert!(matches!(
            validate_bom_lines(&dup),
            Err(ValidationError::Duplicate { .. })
        ));

        let zero = vec![BomLine::new("a", Quantity::zero())];
        assert!(validate_bom_lines(&zero).is_err());
    }

    #[test]
    fn test_validate_additional_costs() {
        assert!(validate_additional_costs(&[AdditionalCost::new("Labour", Money::from_cents(500))]).is_ok());
        assert!(validate_additional_costs(&[AdditionalCost::new("", Money::from_cents(500))]).is_err());
        assert!(validate_additional_costs(&[AdditionalCost::new("Refund", Money::from_cents(-1))]).is_err());
    }

    #[test]
    fn test_money_upper_bound() {
        assert!(validate_price("cost_price", Money::from_cents(MAX_MONEY_CENTS)).is_ok());
        assert!(matches!(
            validate_price("cost_price", Money::from_cents(MAX_MONEY_CENTS + 1)),
            Err(ValidationError::OutOfRange { .. })
        ));

        // Each half is in range, the sum is not
        let half = Money::from_cents(MAX_MONEY_CENTS / 2 + 1);
        let costs = [AdditionalCost::new("Labour", half), AdditionalCost::new("Energy", half)];
        assert!(matches!(
            validate_additional_costs(&costs),
            Err(ValidationError::OutOfRange { .. })
        ));

        let huge = Money::from_cents(i64::MAX / 2 + 1);
        let costs = [AdditionalCost::new("Labour", huge), AdditionalCost::new("Energy", huge)];
        assert!(validate_additional_costs(&costs).is_err());

        assert!(validate_actual_cost(&ActualCost::itemized(half, half)).is_err());
    }

    #[test]
    fn test_validate_actual_cost() {
        assert!(validate_actual_cost(&ActualCost::total(Money::from_cents(150))).is_ok());
        assert!(validate_actual_cost(&ActualCost::itemized(Money::from_cents(-1), Money::zero())).is_err());
    }

    #[test]
    fn test_validate_new_bom_requires_product_name() {
        let input = NewBom {
            product_name: "".to_string(),
            product_sku: "STOOL".to_string(),
            notes: None,
            lines: vec![BomLine::new("a", Quantity::from_units(1))],
        };
        assert!(validate_new_bom(&input).is_err());
    }

    #[test]
    fn test_validate_uuid() {
        assert!(validate_uuid("550e8400-e29b-41d4-a716-446655440000").is_ok());
        assert!(validate_uuid("").is_err());
        assert!(validate_uuid("123").is_err());
    }
}
