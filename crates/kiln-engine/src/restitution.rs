//! # Product Unit Removal
//!
//! Taking finished units out of stock gives their materials back.
//!
//! ## Flow (one transaction)
//! ```text
//! delete_product_units(product, n)
//!      │
//!      ├─ re-read product, check 0 < n <= stock
//!      ├─ BOMs matching the product (SKU, else name), oldest first
//!      ├─ any Pending/InProgress order on those BOMs? ── reject
//!      ├─ first BOM: material.stock += per_unit × n   (missing material: warn, report)
//!      └─ product.stock -= n                          (guarded)
//! ```
//!
//! A product without a matching BOM simply loses the units.

use tracing::{info, warn};

use crate::engine::ProductionEngine;
use crate::error::EngineResult;
use crate::notify::EngineEvent;
use kiln_core::restitution::{restitution_lines, select_recipe, validate_removal};
use kiln_core::{CoreError, Product, RestitutionReport};
use kiln_db::repository::{bom, material, product, production_order};
use sqlx::SqliteConnection;

impl ProductionEngine {
    /// Removes `units` finished units and restores the materials the first
    /// matching BOM says they consumed.
    pub async fn delete_product_units(&self, product_id: &str, units: i64) -> EngineResult<RestitutionReport> {
        let report = self
            .retrying("delete_product_units", || self.try_delete_product_units(product_id, units))
            .await?;

        self.announce(&report);
        Ok(report)
    }

    async fn try_delete_product_units(&self, product_id: &str, units: i64) -> EngineResult<RestitutionReport> {
        let mut tx = self.db.begin().await?;

        let current = load_active_product(&mut tx, product_id).await?;
        let report = restitute(&mut tx, &current, units).await?;

        tx.commit().await?;
        Ok(report)
    }

    /// Restitutes all remaining stock, then deactivates the product.
    ///
    /// The row stays so completed orders still resolve their `product_id`.
    pub async fn delete_product(&self, product_id: &str) -> EngineResult<RestitutionReport> {
        let report = self
            .retrying("delete_product", || self.try_delete_product(product_id))
            .await?;

        if report.units_removed > 0 {
            self.announce(&report);
        }
        info!(product_id = %product_id, "Product deleted");

        Ok(report)
    }

    async fn try_delete_product(&self, product_id: &str) -> EngineResult<RestitutionReport> {
        let mut tx = self.db.begin().await?;

        let current = load_active_product(&mut tx, product_id).await?;
        let report = if current.stock > 0 {
            restitute(&mut tx, &current, current.stock).await?
        } else {
            RestitutionReport {
                product_id: current.id.clone(),
                units_removed: 0,
                bom_id: None,
                restored: Vec::new(),
                missing_materials: Vec::new(),
                remaining_stock: 0,
            }
        };
        product::soft_delete(&mut tx, &current.id).await?;

        tx.commit().await?;
        Ok(report)
    }

    fn announce(&self, report: &RestitutionReport) {
        info!(
            product_id = %report.product_id,
            units = report.units_removed,
            bom_id = ?report.bom_id,
            restored = report.restored.len(),
            remaining = report.remaining_stock,
            "Product units removed"
        );
        self.emit(EngineEvent::ProductUnitsRemoved {
            product_id: report.product_id.clone(),
            units: report.units_removed,
            bom_id: report.bom_id.clone(),
        });
    }
}

async fn load_active_product(conn: &mut SqliteConnection, product_id: &str) -> EngineResult<Product> {
    match product::fetch(conn, product_id).await? {
        Some(p) if p.is_active => Ok(p),
        _ => Err(CoreError::not_found("Product", product_id).into()),
    }
}

async fn restitute(
    conn: &mut SqliteConnection,
    current: &Product,
    units: i64,
) -> EngineResult<RestitutionReport> {
    validate_removal(current, units)?;

    let boms = bom::fetch_matching(conn, current).await?;
    let bom_ids: Vec<String> = boms.iter().map(|b| b.id.clone()).collect();

    let active = production_order::active_order_ids(conn, &bom_ids).await?;
    if !active.is_empty() {
        return Err(CoreError::ReferencedByActiveOrder {
            entity: "Product".to_string(),
            id: current.id.clone(),
            order_ids: active,
        }
        .into());
    }

    let recipe = select_recipe(current, &boms);
    let mut restored = Vec::new();
    let mut missing_materials = Vec::new();

    if let Some(recipe) = recipe {
        for line in restitution_lines(recipe, units) {
            if material::credit_stock(conn, &line.material_id, line.quantity).await? {
                restored.push(line);
            } else {
                warn!(
                    product_id = %current.id,
                    bom_id = %recipe.id,
                    material_id = %line.material_id,
                    quantity = %line.quantity,
                    "Material gone, skipping restitution line"
                );
                missing_materials.push(line.material_id);
            }
        }
    } else {
        warn!(product_id = %current.id, sku = %current.sku, "No BOM matches product, units removed without restitution");
    }

    if !product::debit_stock(conn, &current.id, units).await? {
        // Re-read above makes this a lost race
        return Err(CoreError::InsufficientProductStock {
            sku: current.sku.clone(),
            available: current.stock,
            requested: units,
        }
        .into());
    }

    Ok(RestitutionReport {
        product_id: current.id.clone(),
        units_removed: units,
        bom_id: recipe.map(|b| b.id.clone()),
        restored,
        missing_materials,
        remaining_stock: current.stock - units,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::test_support::*;
    use crate::error::ErrorCode;
    use kiln_core::{Money, NewProduct, NewProductionOrder, Quantity};

    async fn produce(engine: &ProductionEngine, bom_id: &str, quantity: i64) -> String {
        let order = engine
            .create_order(NewProductionOrder {
                bom_id: bom_id.to_string(),
                quantity,
                additional_costs: vec![],
                notes: None,
            })
            .await
            .unwrap()
            .order;
        engine
            .complete_order(&order.id, None)
            .await
            .unwrap()
            .product_id
            .unwrap()
    }

    #[tokio::test]
    async fn test_units_restore_materials() {
        let engine = engine().await;
        let m = material(&engine, "OAK", 10, 250).await;
        let b = bom(&engine, "STOOL", &[(&m, 2)]).await;
        let p = produce(&engine, &b, 3).await;
        assert_eq!(engine.get_material(&m).await.unwrap().stock, Quantity::from_units(4));

        let report = engine.delete_product_units(&p, 2).await.unwrap();

        assert_eq!(report.bom_id.as_deref(), Some(b.as_str()));
        assert_eq!(report.restored.len(), 1);
        assert_eq!(report.restored[0].quantity, Quantity::from_units(4));
        assert_eq!(report.remaining_stock, 1);
        assert_eq!(engine.get_material(&m).await.unwrap().stock, Quantity::from_units(8));
        assert_eq!(engine.get_product(&p).await.unwrap().stock, 1);
    }

    #[tokio::test]
    async fn test_quantity_bounds() {
        let engine = engine().await;
        let m = material(&engine, "OAK", 10, 250).await;
        let b = bom(&engine, "STOOL", &[(&m, 1)]).await;
        let p = produce(&engine, &b, 2).await;

        let err = engine.delete_product_units(&p, 0).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);
        let err = engine.delete_product_units(&p, 3).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InsufficientStock);

        assert_eq!(engine.get_product(&p).await.unwrap().stock, 2);
        assert_eq!(engine.get_material(&m).await.unwrap().stock, Quantity::from_units(8));
    }

    #[tokio::test]
    async fn test_first_matching_bom_wins() {
        let engine = engine().await;
        let oak = material(&engine, "OAK", 100, 250).await;
        let pine = material(&engine, "PINE", 100, 100).await;
        let first = bom(&engine, "STOOL", &[(&oak, 1)]).await;
        bom(&engine, "stool", &[(&pine, 5)]).await;

        let p = produce(&engine, &first, 2).await;
        let report = engine.delete_product_units(&p, 2).await.unwrap();

        assert_eq!(report.bom_id, Some(first));
        assert_eq!(engine.get_material(&oak).await.unwrap().stock, Quantity::from_units(100));
        assert_eq!(engine.get_material(&pine).await.unwrap().stock, Quantity::from_units(100));
    }

    #[tokio::test]
    async fn test_rejected_while_any_matching_bom_is_in_use() {
        let engine = engine().await;
        let oak = material(&engine, "OAK", 100, 250).await;
        let first = bom(&engine, "STOOL", &[(&oak, 1)]).await;
        let second = bom(&engine, "STOOL", &[(&oak, 2)]).await;
        let p = produce(&engine, &first, 2).await;

        let pending = engine
            .create_order(NewProductionOrder {
                bom_id: second,
                quantity: 1,
                additional_costs: vec![],
                notes: None,
            })
            .await
            .unwrap()
            .order;

        let err = engine.delete_product_units(&p, 1).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ReferencedByActiveOrder);
        assert_eq!(engine.get_product(&p).await.unwrap().stock, 2);

        engine.cancel_order(&pending.id).await.unwrap();
        assert!(engine.delete_product_units(&p, 1).await.is_ok());
    }

    #[tokio::test]
    async fn test_missing_material_reported_not_fatal() {
        let engine = engine().await;
        let oak = material(&engine, "OAK", 100, 250).await;
        let glue = material(&engine, "GLUE", 100, 10).await;
        let b = bom(&engine, "STOOL", &[(&oak, 1), (&glue, 1)]).await;
        let p = produce(&engine, &b, 2).await;
        engine.delete_material(&glue).await.unwrap();

        let report = engine.delete_product_units(&p, 2).await.unwrap();

        assert_eq!(report.missing_materials, vec![glue]);
        assert_eq!(report.restored.len(), 1);
        assert_eq!(engine.get_material(&oak).await.unwrap().stock, Quantity::from_units(100));
        assert_eq!(engine.get_product(&p).await.unwrap().stock, 0);
    }

    #[tokio::test]
    async fn test_product_without_bom_just_loses_units() {
        let engine = engine().await;
        let p = engine
            .create_product(NewProduct {
                sku: "RESALE".into(),
                name: "Bought-in chair".into(),
                stock: 5,
                cost_price: Money::from_cents(1_000),
                retail_price: Money::from_cents(2_000),
                wholesale_price: Money::from_cents(1_500),
            })
            .await
            .unwrap();

        let report = engine.delete_product_units(&p.id, 3).await.unwrap();
        assert!(report.bom_id.is_none());
        assert!(report.restored.is_empty());
        assert_eq!(engine.get_product(&p.id).await.unwrap().stock, 2);
    }

    #[tokio::test]
    async fn test_delete_product_restitutes_everything() {
        let engine = engine().await;
        let m = material(&engine, "OAK", 10, 250).await;
        let b = bom(&engine, "STOOL", &[(&m, 2)]).await;
        let p = produce(&engine, &b, 3).await;

        let report = engine.delete_product(&p).await.unwrap();
        assert_eq!(report.units_removed, 3);
        assert_eq!(engine.get_material(&m).await.unwrap().stock, Quantity::from_units(10));

        let gone = engine.get_product(&p).await.unwrap();
        assert!(!gone.is_active);
        assert_eq!(gone.stock, 0);
        assert!(engine.list_products().await.unwrap().is_empty());

        let err = engine.delete_product_units(&p, 1).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);
    }
}
