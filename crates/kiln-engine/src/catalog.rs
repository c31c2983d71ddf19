//! # Catalog Operations
//!
//! Materials, BOMs and finished products.
//!
//! ## Reference Rules
//! - A BOM cannot be deleted while a Pending or InProgress order uses it.
//! - A BOM's lines are frozen once any non-cancelled order used it; the
//!   cosmetic fields (name, notes) stay editable.
//! - A material cannot be deleted while an active order's snapshot consumes
//!   it. BOM lines may keep pointing at a deleted material; planning then
//!   reports it as missing.

use chrono::Utc;
use tracing::info;

use crate::engine::ProductionEngine;
use crate::error::EngineResult;
use crate::notify::EngineEvent;
use kiln_core::validation::{
    validate_bom_lines, validate_name, validate_new_bom, validate_new_material,
    validate_new_product, validate_notes, validate_price, validate_receipt_quantity,
};
use kiln_core::{
    Bom, BomDetails, BomLine, CoreError, Material, Money, NewBom, NewMaterial, NewProduct, Product,
    ProductKey, Quantity,
};
use kiln_db::repository::bom::generate_bom_id;
use kiln_db::repository::material::generate_material_id;
use kiln_db::repository::product::generate_product_id;
use kiln_db::repository::{bom, material, production_order};
use sqlx::SqliteConnection;

impl ProductionEngine {
    // =========================================================================
    // Materials
    // =========================================================================

    pub async fn create_material(&self, input: NewMaterial) -> EngineResult<Material> {
        validate_new_material(&input)?;

        let now = Utc::now();
        let material = Material {
            id: generate_material_id(),
            sku: input.sku.trim().to_string(),
            name: input.name.trim().to_string(),
            unit: input.unit.trim().to_string(),
            purchase_price: input.purchase_price,
            stock: input.stock,
            created_at: now,
            updated_at: now,
            version: 0,
        };
        let material = self.db.materials().insert(&material).await?;

        info!(material_id = %material.id, sku = %material.sku, stock = %material.stock, "Material created");
        Ok(material)
    }

    pub async fn get_material(&self, material_id: &str) -> EngineResult<Material> {
        self.db
            .materials()
            .get_by_id(material_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Material", material_id).into())
    }

    pub async fn list_materials(&self) -> EngineResult<Vec<Material>> {
        Ok(self.db.materials().list().await?)
    }

    /// Goods receipt: `stock += quantity`.
    pub async fn receive_material(&self, material_id: &str, quantity: Quantity) -> EngineResult<Material> {
        validate_receipt_quantity(quantity)?;

        let material = self
            .retrying("receive_material", || self.try_receive_material(material_id, quantity))
            .await?;

        info!(material_id = %material.id, received = %quantity, stock = %material.stock, "Material received");
        self.emit(EngineEvent::MaterialStockChanged {
            material_id: material.id.clone(),
            stock: material.stock,
        });

        Ok(material)
    }

    async fn try_receive_material(&self, material_id: &str, quantity: Quantity) -> EngineResult<Material> {
        let mut tx = self.db.begin().await?;

        if !material::credit_stock(&mut tx, material_id, quantity).await? {
            return Err(CoreError::not_found("Material", material_id).into());
        }
        let material = material::fetch(&mut tx, material_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Material", material_id))?;
        tx.commit().await?;

        Ok(material)
    }

    /// Changes the price future orders plan with. Existing orders keep
    /// their snapshot.
    pub async fn set_purchase_price(&self, material_id: &str, price: Money) -> EngineResult<Material> {
        validate_price("purchase_price", price)?;

        let material = self
            .retrying("set_purchase_price", || self.try_set_purchase_price(material_id, price))
            .await?;

        info!(material_id = %material.id, price = %material.purchase_price, "Purchase price updated");
        Ok(material)
    }

    async fn try_set_purchase_price(&self, material_id: &str, price: Money) -> EngineResult<Material> {
        let mut tx = self.db.begin().await?;

        material::set_purchase_price(&mut tx, material_id, price).await?;
        let material = material::fetch(&mut tx, material_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Material", material_id))?;
        tx.commit().await?;

        Ok(material)
    }

    pub async fn delete_material(&self, material_id: &str) -> EngineResult<()> {
        self.retrying("delete_material", || self.try_delete_material(material_id))
            .await?;

        info!(material_id = %material_id, "Material deleted");
        Ok(())
    }

    async fn try_delete_material(&self, material_id: &str) -> EngineResult<()> {
        let mut tx = self.db.begin().await?;

        if material::fetch(&mut tx, material_id).await?.is_none() {
            return Err(CoreError::not_found("Material", material_id).into());
        }

        let active = production_order::active_order_ids_for_material(&mut tx, material_id).await?;
        if !active.is_empty() {
            return Err(CoreError::ReferencedByActiveOrder {
                entity: "Material".to_string(),
                id: material_id.to_string(),
                order_ids: active,
            }
            .into());
        }

        material::delete(&mut tx, material_id).await?;
        tx.commit().await?;
        Ok(())
    }

    // =========================================================================
    // BOMs
    // =========================================================================

    /// Creates a BOM. Every line must name an existing material.
    pub async fn create_bom(&self, input: NewBom) -> EngineResult<Bom> {
        validate_new_bom(&input)?;

        let bom = self
            .retrying("create_bom", || self.try_create_bom(&input))
            .await?;

        info!(bom_id = %bom.id, product = %bom.product_name, lines = bom.lines.len(), "BOM created");
        Ok(bom)
    }

    async fn try_create_bom(&self, input: &NewBom) -> EngineResult<Bom> {
        let mut tx = self.db.begin().await?;

        ensure_materials_exist(&mut tx, &input.lines).await?;

        let now = Utc::now();
        let bom = Bom {
            id: generate_bom_id(),
            product_name: input.product_name.trim().to_string(),
            product_sku: input.product_sku.trim().to_string(),
            notes: input.notes.clone(),
            lines: input.lines.clone(),
            created_at: now,
            updated_at: now,
        };
        bom::insert(&mut tx, &bom).await?;
        tx.commit().await?;

        Ok(bom)
    }

    pub async fn get_bom(&self, bom_id: &str) -> EngineResult<Bom> {
        self.db
            .boms()
            .get_by_id(bom_id)
            .await?
            .ok_or_else(|| CoreError::not_found("BOM", bom_id).into())
    }

    /// Lists BOMs in creation order.
    pub async fn list_boms(&self) -> EngineResult<Vec<Bom>> {
        Ok(self.db.boms().list().await?)
    }

    /// Edits the product name and notes. Allowed whatever the BOM's usage.
    pub async fn update_bom_details(&self, bom_id: &str, details: BomDetails) -> EngineResult<Bom> {
        if let Some(name) = &details.product_name {
            validate_name("product_name", name)?;
        }
        if let Some(notes) = &details.notes {
            validate_notes(notes.as_deref())?;
        }

        let bom = self
            .retrying("update_bom_details", || self.try_update_bom_details(bom_id, &details))
            .await?;

        info!(bom_id = %bom.id, product = %bom.product_name, "BOM details updated");
        Ok(bom)
    }

    async fn try_update_bom_details(&self, bom_id: &str, details: &BomDetails) -> EngineResult<Bom> {
        let mut tx = self.db.begin().await?;

        let current = bom::fetch(&mut tx, bom_id)
            .await?
            .ok_or_else(|| CoreError::not_found("BOM", bom_id))?;

        let name = details
            .product_name
            .as_deref()
            .map(str::trim)
            .unwrap_or(current.product_name.as_str());
        let notes = match &details.notes {
            Some(notes) => notes.as_deref(),
            None => current.notes.as_deref(),
        };
        bom::update_details(&mut tx, bom_id, name, notes).await?;

        let updated = bom::fetch(&mut tx, bom_id)
            .await?
            .ok_or_else(|| CoreError::not_found("BOM", bom_id))?;
        tx.commit().await?;

        Ok(updated)
    }

    /// Replaces a BOM's lines, unless an order already used the recipe.
    pub async fn replace_bom_lines(&self, bom_id: &str, lines: Vec<BomLine>) -> EngineResult<Bom> {
        validate_bom_lines(&lines)?;

        let bom = self
            .retrying("replace_bom_lines", || self.try_replace_bom_lines(bom_id, &lines))
            .await?;

        info!(bom_id = %bom.id, lines = bom.lines.len(), "BOM lines replaced");
        Ok(bom)
    }

    async fn try_replace_bom_lines(&self, bom_id: &str, lines: &[BomLine]) -> EngineResult<Bom> {
        let mut tx = self.db.begin().await?;

        if bom::fetch(&mut tx, bom_id).await?.is_none() {
            return Err(CoreError::not_found("BOM", bom_id).into());
        }

        let users = production_order::non_cancelled_order_ids(&mut tx, &[bom_id.to_string()]).await?;
        if !users.is_empty() {
            return Err(CoreError::BomLocked {
                bom_id: bom_id.to_string(),
                order_ids: users,
            }
            .into());
        }

        ensure_materials_exist(&mut tx, lines).await?;
        bom::replace_lines(&mut tx, bom_id, lines).await?;

        let updated = bom::fetch(&mut tx, bom_id)
            .await?
            .ok_or_else(|| CoreError::not_found("BOM", bom_id))?;
        tx.commit().await?;

        Ok(updated)
    }

    /// Hard-deletes a BOM and its lines.
    ///
    /// Rejected while any Pending or InProgress order references it.
    /// Completed and cancelled orders keep their own snapshot.
    pub async fn delete_bom(&self, bom_id: &str) -> EngineResult<()> {
        self.retrying("delete_bom", || self.try_delete_bom(bom_id)).await?;

        info!(bom_id = %bom_id, "BOM deleted");
        self.emit(EngineEvent::BomDeleted {
            bom_id: bom_id.to_string(),
        });

        Ok(())
    }

    async fn try_delete_bom(&self, bom_id: &str) -> EngineResult<()> {
        let mut tx = self.db.begin().await?;

        if bom::fetch(&mut tx, bom_id).await?.is_none() {
            return Err(CoreError::not_found("BOM", bom_id).into());
        }

        let active = production_order::active_order_ids(&mut tx, &[bom_id.to_string()]).await?;
        if !active.is_empty() {
            return Err(CoreError::ReferencedByActiveOrder {
                entity: "BOM".to_string(),
                id: bom_id.to_string(),
                order_ids: active,
            }
            .into());
        }

        bom::delete(&mut tx, bom_id).await?;
        tx.commit().await?;
        Ok(())
    }

    // =========================================================================
    // Products
    // =========================================================================

    /// Creates a product directly, outside of production.
    pub async fn create_product(&self, input: NewProduct) -> EngineResult<Product> {
        validate_new_product(&input)?;

        let now = Utc::now();
        let product = Product {
            id: generate_product_id(),
            sku: input.sku.trim().to_string(),
            name: input.name.trim().to_string(),
            stock: input.stock,
            cost_price: input.cost_price,
            retail_price: input.retail_price,
            wholesale_price: input.wholesale_price,
            is_active: true,
            created_at: now,
            updated_at: now,
            version: 0,
        };
        let product = self.db.products().insert(&product).await?;

        info!(product_id = %product.id, sku = %product.sku, stock = product.stock, "Product created");
        Ok(product)
    }

    /// Gets a product by id, including soft-deleted ones.
    pub async fn get_product(&self, product_id: &str) -> EngineResult<Product> {
        self.db
            .products()
            .get_by_id(product_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Product", product_id).into())
    }

    pub async fn list_products(&self) -> EngineResult<Vec<Product>> {
        Ok(self.db.products().list_active().await?)
    }

    /// Finds the active product a SKU/name pair refers to.
    pub async fn find_product(&self, sku: &str, name: &str) -> EngineResult<Option<Product>> {
        Ok(self.db.products().find(&ProductKey::new(sku, name)).await?)
    }

    pub async fn set_product_prices(
        &self,
        product_id: &str,
        retail_price: Money,
        wholesale_price: Money,
    ) -> EngineResult<Product> {
        validate_price("retail_price", retail_price)?;
        validate_price("wholesale_price", wholesale_price)?;

        self.db
            .products()
            .set_prices(product_id, retail_price, wholesale_price)
            .await?;
        info!(product_id = %product_id, retail = %retail_price, wholesale = %wholesale_price, "Product prices updated");

        self.get_product(product_id).await
    }
}

/// Fails with NotFound naming the first line whose material is missing.
async fn ensure_materials_exist(conn: &mut SqliteConnection, lines: &[BomLine]) -> EngineResult<()> {
    let ids: Vec<String> = lines.iter().map(|l| l.material_id.clone()).collect();
    let found = material::fetch_many(conn, &ids).await?;

    match ids.iter().find(|id| !found.iter().any(|m| &m.id == *id)) {
        Some(missing) => Err(CoreError::not_found("Material", missing.as_str()).into()),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::test_support::*;
    use crate::error::{EngineError, ErrorCode};
    use kiln_core::NewProductionOrder;

    fn new_order(bom_id: &str, quantity: i64) -> NewProductionOrder {
        NewProductionOrder {
            bom_id: bom_id.to_string(),
            quantity,
            additional_costs: vec![],
            notes: None,
        }
    }

    #[tokio::test]
    async fn test_material_lifecycle() {
        let engine = engine().await;
        let m = material(&engine, "OAK", 2, 250).await;

        let received = engine.receive_material(&m, Quantity::from_milli(1_500)).await.unwrap();
        assert_eq!(received.stock, Quantity::from_milli(3_500));

        let repriced = engine.set_purchase_price(&m, Money::from_cents(300)).await.unwrap();
        assert_eq!(repriced.purchase_price, Money::from_cents(300));
        assert_eq!(repriced.stock, Quantity::from_milli(3_500));
        assert_eq!(engine.get_material(&m).await.unwrap().purchase_price, Money::from_cents(300));

        let err = engine.set_purchase_price("missing", Money::from_cents(300)).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);
        let err = engine.set_purchase_price(&m, Money::from_cents(-1)).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);

        assert_eq!(engine.list_materials().await.unwrap().len(), 1);
        engine.delete_material(&m).await.unwrap();
        assert_eq!(engine.get_material(&m).await.unwrap_err().code(), ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn test_receive_rejects_non_positive() {
        let engine = engine().await;
        let m = material(&engine, "OAK", 2, 250).await;

        let err = engine.receive_material(&m, Quantity::zero()).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);
        let err = engine.receive_material("nope", Quantity::from_units(1)).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn test_duplicate_material_sku() {
        let engine = engine().await;
        material(&engine, "OAK", 2, 250).await;

        let err = engine
            .create_material(NewMaterial {
                sku: "OAK".into(),
                name: "Other oak".into(),
                unit: "pcs".into(),
                purchase_price: Money::from_cents(1),
                stock: Quantity::zero(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Db(kiln_db::DbError::UniqueViolation { .. })));
    }

    #[tokio::test]
    async fn test_material_in_active_order_cannot_be_deleted() {
        let engine = engine().await;
        let m = material(&engine, "OAK", 10, 250).await;
        let b = bom(&engine, "STOOL", &[(&m, 2)]).await;
        let order = engine.create_order(new_order(&b, 1)).await.unwrap().order;

        let err = engine.delete_material(&m).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ReferencedByActiveOrder);

        engine.cancel_order(&order.id).await.unwrap();
        engine.delete_material(&m).await.unwrap();

        // The BOM still lists the material; planning reports it missing
        let plan = engine.preview_plan(&b, 1).await.unwrap();
        assert!(!plan.lines[0].found);
    }

    #[tokio::test]
    async fn test_bom_requires_known_materials() {
        let engine = engine().await;
        let m = material(&engine, "OAK", 10, 250).await;

        let err = engine
            .create_bom(NewBom {
                product_name: "Stool".into(),
                product_sku: "STOOL".into(),
                notes: None,
                lines: vec![
                    BomLine::new(m.clone(), Quantity::from_units(1)),
                    BomLine::new("ghost", Quantity::from_units(1)),
                ],
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);
        assert!(engine.list_boms().await.unwrap().is_empty());

        let err = engine
            .create_bom(NewBom {
                product_name: "Stool".into(),
                product_sku: "STOOL".into(),
                notes: None,
                lines: vec![],
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);
    }

    #[tokio::test]
    async fn test_bom_details_editable_while_locked() {
        let engine = engine().await;
        let m = material(&engine, "OAK", 10, 250).await;
        let b = bom(&engine, "STOOL", &[(&m, 2)]).await;
        engine.create_order(new_order(&b, 1)).await.unwrap();

        let updated = engine
            .update_bom_details(
                &b,
                BomDetails {
                    product_name: Some("  Oak stool ".into()),
                    notes: Some(Some("Sand twice".into())),
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.product_name, "Oak stool");
        assert_eq!(updated.notes.as_deref(), Some("Sand twice"));

        let cleared = engine
            .update_bom_details(
                &b,
                BomDetails {
                    product_name: None,
                    notes: Some(None),
                },
            )
            .await
            .unwrap();
        assert_eq!(cleared.product_name, "Oak stool");
        assert!(cleared.notes.is_none());

        let err = engine
            .replace_bom_lines(&b, vec![BomLine::new(m.clone(), Quantity::from_units(3))])
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::BomLocked);
    }

    #[tokio::test]
    async fn test_replace_lines_after_cancellation() {
        let engine = engine().await;
        let m = material(&engine, "OAK", 10, 250).await;
        let glue = material(&engine, "GLUE", 10, 50).await;
        let b = bom(&engine, "STOOL", &[(&m, 2)]).await;
        let order = engine.create_order(new_order(&b, 1)).await.unwrap().order;
        engine.cancel_order(&order.id).await.unwrap();

        let updated = engine
            .replace_bom_lines(
                &b,
                vec![
                    BomLine::new(m.clone(), Quantity::from_units(1)),
                    BomLine::new(glue.clone(), Quantity::from_milli(250)),
                ],
            )
            .await
            .unwrap();
        assert_eq!(updated.lines.len(), 2);
        assert_eq!(updated.lines[1].material_id, glue);
    }

    #[tokio::test]
    async fn test_delete_bom_blocked_by_active_order() {
        let engine = engine().await;
        let m = material(&engine, "OAK", 10, 250).await;
        let b = bom(&engine, "STOOL", &[(&m, 2)]).await;
        let order = engine.create_order(new_order(&b, 1)).await.unwrap().order;

        match engine.delete_bom(&b).await.unwrap_err() {
            EngineError::Core(CoreError::ReferencedByActiveOrder { order_ids, .. }) => {
                assert_eq!(order_ids, vec![order.id.clone()]);
            }
            other => panic!("unexpected error: {other:?}"),
        }

        engine.complete_order(&order.id, None).await.unwrap();
        engine.delete_bom(&b).await.unwrap();
        assert_eq!(engine.get_bom(&b).await.unwrap_err().code(), ErrorCode::NotFound);

        // The completed order keeps its snapshot
        let kept = engine.get_order(&order.id).await.unwrap();
        assert_eq!(kept.lines.len(), 1);
    }

    #[tokio::test]
    async fn test_product_crud() {
        let engine = engine().await;
        let p = engine
            .create_product(NewProduct {
                sku: "STOOL".into(),
                name: "Oak stool".into(),
                stock: 0,
                cost_price: Money::zero(),
                retail_price: Money::from_cents(8_900),
                wholesale_price: Money::from_cents(6_500),
            })
            .await
            .unwrap();

        let found = engine.find_product("stool", "").await.unwrap();
        assert_eq!(found.map(|f| f.id), Some(p.id.clone()));
        let found = engine.find_product("", "OAK STOOL").await.unwrap();
        assert_eq!(found.map(|f| f.id), Some(p.id.clone()));

        let repriced = engine
            .set_product_prices(&p.id, Money::from_cents(9_900), Money::from_cents(7_000))
            .await
            .unwrap();
        assert_eq!(repriced.retail_price, Money::from_cents(9_900));
        assert_eq!(engine.list_products().await.unwrap().len(), 1);

        let err = engine
            .set_product_prices(&p.id, Money::from_cents(-1), Money::zero())
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);
    }
}
