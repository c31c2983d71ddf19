//! # Restitution
//!
//! Rules for removing finished units and returning their materials.
//!
//! ## Flow
//! ```text
//! DeleteProductUnits(product "Oak Stool", 2)
//!      │
//!      ├── validate 0 < 2 ≤ product.stock
//!      │
//!      ├── matching BOMs (creation order): [bom-A, bom-B]
//!      │        │
//!      │        └── first match wins: bom-A
//!      │
//!      ├── bom-A line oak 2 kg/unit ──► restore 4 kg
//!      │
//!      └── product.stock −= 2
//! ```
//!
//! Matching is the soft SKU/name reference described on
//! [`ProductKey`](crate::types::ProductKey). When several BOMs describe the
//! same product, only the first one's recipe is used.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::quantity::Quantity;
use crate::types::{Bom, Product};

/// Material returned to stock for one BOM line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RestitutionLine {
    pub material_id: String,
    pub quantity: Quantity,
}

/// What a finished-goods removal did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RestitutionReport {
    pub product_id: String,
    pub units_removed: i64,
    /// The recipe used, `None` when no BOM matches the product.
    pub bom_id: Option<String>,
    /// Lines actually credited back.
    pub restored: Vec<RestitutionLine>,
    /// Materials the recipe names that no longer exist.
    pub missing_materials: Vec<String>,
    pub remaining_stock: i64,
}

/// The recipe used for restitution: the first matching BOM.
pub fn select_recipe<'a>(product: &Product, boms: &'a [Bom]) -> Option<&'a Bom> {
    let key = product.key();
    boms.iter().find(|b| b.product_key().matches(&key))
}

/// Material quantities to credit back for `units` finished units.
pub fn restitution_lines(bom: &Bom, units: i64) -> Vec<RestitutionLine> {
    bom.lines
        .iter()
        .map(|line| RestitutionLine {
            material_id: line.material_id.clone(),
            quantity: line.required_for(units),
        })
        .collect()
}

/// Checks `0 < units ≤ product.stock`.
pub fn validate_removal(product: &Product, units: i64) -> CoreResult<()> {
    if units <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        }
        .into());
    }
    if units > product.stock {
        return Err(CoreError::InsufficientProductStock {
            sku: product.sku.clone(),
            available: product.stock,
            requested: units,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::Money;
    use crate::types::BomLine;
    use chrono::{Duration, Utc};

    fn product(sku: &str, name: &str, stock: i64) -> Product {
        let now = Utc::now();
        Product {
            id: "p-1".to_string(),
            sku: sku.to_string(),
            name: name.to_string(),
            stock,
            cost_price: Money::zero(),
            retail_price: Money::zero(),
            wholesale_price: Money::zero(),
            is_active: true,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    fn bom(id: &str, sku: &str, name: &str, per_unit: i64, age_secs: i64) -> Bom {
        let at = Utc::now() - Duration::seconds(age_secs);
        Bom {
            id: id.to_string(),
            product_name: name.to_string(),
            product_sku: sku.to_string(),
            notes: None,
            lines: vec![BomLine::new("m", Quantity::from_units(per_unit))],
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn test_first_matching_bom_wins() {
        let boms = vec![
            bom("other", "TABLE", "Table", 9, 30),
            bom("first", "STOOL", "Stool", 2, 20),
            bom("second", "STOOL", "Stool v2", 3, 10),
        ];
        let p = product("STOOL", "Stool", 5);

        assert_eq!(select_recipe(&p, &boms).map(|b| b.id.as_str()), Some("first"));
    }

    #[test]
    fn test_name_match_when_bom_has_no_sku() {
        let boms = vec![bom("b", "", "Stool", 2, 0)];
        let p = product("STOOL", "stool", 5);
        assert!(select_recipe(&p, &boms).is_some());
    }

    #[test]
    fn test_restitution_is_proportional() {
        let b = bom("b", "STOOL", "Stool", 2, 0);
        let lines = restitution_lines(&b, 2);
        assert_eq!(lines[0].quantity, Quantity::from_units(4));
    }

    #[test]
    fn test_validate_removal_bounds() {
        let p = product("STOOL", "Stool", 3);
        assert!(validate_removal(&p, 3).is_ok());
        assert!(matches!(
            validate_removal(&p, 0),
            Err(CoreError::Validation(_))
        ));
        assert!(matches!(
            validate_removal(&p, 4),
            Err(CoreError::InsufficientProductStock { available: 3, requested: 4, .. })
        ));
    }
}
