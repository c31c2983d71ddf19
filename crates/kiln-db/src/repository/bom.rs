//! # BOM Repository
//!
//! Database operations for bills of materials.
//!
//! A BOM is stored as one `boms` row plus ordered `bom_lines` rows. Lines are
//! always written and read as a whole; there is no per-line update.
//!
//! ## Creation Order
//! Every BOM gets an increasing `seq` on insert. Listing and product
//! matching return BOMs in `seq` order, which is what makes "the first
//! matching BOM" well defined for restitution.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use kiln_core::{Bom, BomLine, Product, Quantity};

#[derive(Debug, FromRow)]
struct BomRow {
    id: String,
    product_name: String,
    product_sku: String,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct BomLineRow {
    bom_id: String,
    material_id: String,
    quantity_per_unit: Quantity,
}

impl BomRow {
    fn into_bom(self, lines: Vec<BomLine>) -> Bom {
        Bom {
            id: self.id,
            product_name: self.product_name,
            product_sku: self.product_sku,
            notes: self.notes,
            lines,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

// =============================================================================
// Connection-level operations
// =============================================================================

/// Gets a BOM with its lines.
pub async fn fetch(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Bom>> {
    let row = sqlx::query_as::<_, BomRow>(
        r#"
        SELECT id, product_name, product_sku, notes, created_at, updated_at
        FROM boms
        WHERE id = ?1
        "#,
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let lines = sqlx::query_as::<_, BomLineRow>(
        r#"
        SELECT bom_id, material_id, quantity_per_unit
        FROM bom_lines
        WHERE bom_id = ?1
        ORDER BY position
        "#,
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .map(|l| BomLine::new(l.material_id, l.quantity_per_unit))
    .collect();

    Ok(Some(row.into_bom(lines)))
}

/// Lists every BOM in creation order.
pub async fn fetch_all(conn: &mut SqliteConnection) -> DbResult<Vec<Bom>> {
    let rows = sqlx::query_as::<_, BomRow>(
        r#"
        SELECT id, product_name, product_sku, notes, created_at, updated_at
        FROM boms
        ORDER BY seq
        "#,
    )
    .fetch_all(&mut *conn)
    .await?;

    let line_rows = sqlx::query_as::<_, BomLineRow>(
        r#"
        SELECT bom_id, material_id, quantity_per_unit
        FROM bom_lines
        ORDER BY bom_id, position
        "#,
    )
    .fetch_all(&mut *conn)
    .await?;

    let mut lines: HashMap<String, Vec<BomLine>> = HashMap::new();
    for l in line_rows {
        lines
            .entry(l.bom_id)
            .or_default()
            .push(BomLine::new(l.material_id, l.quantity_per_unit));
    }

    Ok(rows
        .into_iter()
        .map(|row| {
            let bom_lines = lines.remove(&row.id).unwrap_or_default();
            row.into_bom(bom_lines)
        })
        .collect())
}

/// BOMs whose product key matches `product`, in creation order.
///
/// Matching folds Unicode case, which SQLite's `lower()` does not, so the
/// filter runs here rather than in SQL.
pub async fn fetch_matching(conn: &mut SqliteConnection, product: &Product) -> DbResult<Vec<Bom>> {
    let key = product.key();
    let boms = fetch_all(conn).await?;
    Ok(boms
        .into_iter()
        .filter(|b| b.product_key().matches(&key))
        .collect())
}

/// Inserts a BOM and its lines.
pub async fn insert(conn: &mut SqliteConnection, bom: &Bom) -> DbResult<()> {
    debug!(id = %bom.id, product = %bom.product_name, lines = bom.lines.len(), "Inserting BOM");

    sqlx::query(
        r#"
        INSERT INTO boms (id, product_name, product_sku, notes, created_at, updated_at, seq)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, (SELECT COALESCE(MAX(seq), 0) + 1 FROM boms))
        "#,
    )
    .bind(&bom.id)
    .bind(&bom.product_name)
    .bind(&bom.product_sku)
    .bind(&bom.notes)
    .bind(bom.created_at)
    .bind(bom.updated_at)
    .execute(&mut *conn)
    .await?;

    insert_lines(conn, &bom.id, &bom.lines).await
}

async fn insert_lines(conn: &mut SqliteConnection, bom_id: &str, lines: &[BomLine]) -> DbResult<()> {
    for (position, line) in lines.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO bom_lines (bom_id, position, material_id, quantity_per_unit)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(bom_id)
        .bind(position as i64)
        .bind(&line.material_id)
        .bind(line.quantity_per_unit)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

/// Updates the cosmetic fields of a BOM.
pub async fn update_details(
    conn: &mut SqliteConnection,
    id: &str,
    product_name: &str,
    notes: Option<&str>,
) -> DbResult<()> {
    debug!(id = %id, product = %product_name, "Updating BOM details");

    let result = sqlx::query(
        r#"
        UPDATE boms
        SET product_name = ?2, notes = ?3, updated_at = ?4
        WHERE id = ?1
        "#,
    )
    .bind(id)
    .bind(product_name)
    .bind(notes)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("BOM", id));
    }

    Ok(())
}

/// Replaces every line of a BOM.
pub async fn replace_lines(conn: &mut SqliteConnection, id: &str, lines: &[BomLine]) -> DbResult<()> {
    debug!(id = %id, lines = lines.len(), "Replacing BOM lines");

    let result = sqlx::query("UPDATE boms SET updated_at = ?2 WHERE id = ?1")
        .bind(id)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("BOM", id));
    }

    sqlx::query("DELETE FROM bom_lines WHERE bom_id = ?1")
        .bind(id)
        .execute(&mut *conn)
        .await?;

    insert_lines(conn, id, lines).await
}

/// Hard-deletes a BOM; its lines cascade.
pub async fn delete(conn: &mut SqliteConnection, id: &str) -> DbResult<()> {
    debug!(id = %id, "Deleting BOM");

    let result = sqlx::query("DELETE FROM boms WHERE id = ?1")
        .bind(id)
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("BOM", id));
    }

    Ok(())
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for BOM database operations.
#[derive(Debug, Clone)]
pub struct BomRepository {
    pool: SqlitePool,
}

impl BomRepository {
    /// Creates a new BomRepository.
    pub fn new(pool: SqlitePool) -> Self {
        BomRepository { pool }
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Bom>> {
        let mut conn = self.pool.acquire().await?;
        fetch(&mut conn, id).await
    }

    /// Lists every BOM in creation order.
    pub async fn list(&self) -> DbResult<Vec<Bom>> {
        let mut conn = self.pool.acquire().await?;
        fetch_all(&mut conn).await
    }

    /// Inserts a BOM with its lines in one transaction.
    pub async fn insert(&self, bom: &Bom) -> DbResult<Bom> {
        let mut tx = self.pool.begin().await?;
        insert(&mut tx, bom).await?;
        tx.commit().await?;
        Ok(bom.clone())
    }

    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM boms")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

/// Helper to generate a new BOM ID.
pub fn generate_bom_id() -> String {
    Uuid::new_v4().to_string()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use kiln_core::Money;

    fn bom(sku: &str, name: &str, lines: Vec<BomLine>) -> Bom {
        let now = Utc::now();
        Bom {
            id: generate_bom_id(),
            product_name: name.to_string(),
            product_sku: sku.to_string(),
            notes: Some("oak only".to_string()),
            lines,
            created_at: now,
            updated_at: now,
        }
    }

    fn product(sku: &str, name: &str) -> Product {
        let now = Utc::now();
        Product {
            id: "p".to_string(),
            sku: sku.to_string(),
            name: name.to_string(),
            stock: 0,
            cost_price: Money::zero(),
            retail_price: Money::zero(),
            wholesale_price: Money::zero(),
            is_active: true,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    #[tokio::test]
    async fn test_insert_preserves_line_order() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let b = bom(
            "STOOL",
            "Stool",
            vec![
                BomLine::new("z-oak", Quantity::from_units(2)),
                BomLine::new("a-glue", Quantity::from_milli(100)),
            ],
        );
        db.boms().insert(&b).await.unwrap();

        let loaded = db.boms().get_by_id(&b.id).await.unwrap().unwrap();
        assert_eq!(loaded.lines, b.lines);
        assert_eq!(loaded.notes.as_deref(), Some("oak only"));
    }

    #[tokio::test]
    async fn test_matching_in_creation_order() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let first = bom("STOOL", "Stool", vec![BomLine::new("m", Quantity::from_units(2))]);
        let other = bom("TABLE", "Table", vec![BomLine::new("m", Quantity::from_units(5))]);
        let second = bom("stool", "Stool v2", vec![BomLine::new("m", Quantity::from_units(3))]);
        for b in [&first, &other, &second] {
            db.boms().insert(b).await.unwrap();
        }

        let mut conn = db.pool().acquire().await.unwrap();
        let matches = fetch_matching(&mut conn, &product("STOOL", "Stool")).await.unwrap();
        let ids: Vec<&str> = matches.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, vec![first.id.as_str(), second.id.as_str()]);
    }

    #[tokio::test]
    async fn test_replace_lines_and_delete() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let b = bom("STOOL", "Stool", vec![BomLine::new("m", Quantity::from_units(2))]);
        db.boms().insert(&b).await.unwrap();

        let mut conn = db.pool().acquire().await.unwrap();
        replace_lines(&mut conn, &b.id, &[BomLine::new("n", Quantity::from_units(1))])
            .await
            .unwrap();
        let loaded = fetch(&mut conn, &b.id).await.unwrap().unwrap();
        assert_eq!(loaded.lines, vec![BomLine::new("n", Quantity::from_units(1))]);

        update_details(&mut conn, &b.id, "Tall Stool", None).await.unwrap();
        let loaded = fetch(&mut conn, &b.id).await.unwrap().unwrap();
        assert_eq!(loaded.product_name, "Tall Stool");
        assert!(loaded.notes.is_none());

        delete(&mut conn, &b.id).await.unwrap();
        assert!(fetch(&mut conn, &b.id).await.unwrap().is_none());
        let orphan_lines: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM bom_lines")
            .fetch_one(&mut *conn)
            .await
            .unwrap();
        assert_eq!(orphan_lines, 0);

        assert!(matches!(
            delete(&mut conn, &b.id).await,
            Err(DbError::NotFound { .. })
        ));
    }
}
