//! # Production Engine
//!
//! The entry point for every production operation.
//!
//! ## Operation Shape
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  engine.op(args)                                                        │
//! │     │ validate input (kiln-core::validation)                            │
//! │     ▼                                                                   │
//! │  with_retry ──────────────────────────────────────────────────┐        │
//! │     │ db.begin()                                              │        │
//! │     │ read current state                                      │        │
//! │     │ decide (planner / lifecycle / restitution)              │ retry  │
//! │     │ guarded writes                                          │ on     │
//! │     │ tx.commit()          any error: tx dropped, rolled back │ Conflict│
//! │     ▼ ───────────────────────────────────────────────────────┘        │
//! │  info! + notifier.notify(event)                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Operations are grouped by area in `orders.rs`, `catalog.rs` and
//! `restitution.rs`, each adding an `impl ProductionEngine` block.

use std::future::Future;
use std::sync::Arc;
use tracing::info;

use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::notify::{EngineEvent, Notifier, TracingNotifier};
use crate::retry::with_retry;
use kiln_db::Database;

/// Transactional production order engine.
///
/// Cheap to clone; clones share the pool and the notifier.
#[derive(Clone)]
pub struct ProductionEngine {
    pub(crate) db: Database,
    pub(crate) config: EngineConfig,
    notifier: Arc<dyn Notifier>,
}

impl std::fmt::Debug for ProductionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProductionEngine")
            .field("db", &self.db)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ProductionEngine {
    /// Wraps an open database. Events go to the log until
    /// [`with_notifier`](Self::with_notifier) replaces the sink.
    pub fn new(db: Database, config: EngineConfig) -> Self {
        ProductionEngine {
            db,
            config,
            notifier: Arc::new(TracingNotifier),
        }
    }

    /// Validates `config`, opens the database it names and runs migrations.
    pub async fn open(config: EngineConfig) -> EngineResult<Self> {
        config.validate()?;
        let db = Database::new(config.to_db_config()).await?;
        info!(path = %config.database.path, "Production engine ready");
        Ok(Self::new(db, config))
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub(crate) fn emit(&self, event: EngineEvent) {
        self.notifier.notify(&event);
    }

    /// Runs one transactional attempt per call of `op`, retrying conflicts.
    pub(crate) async fn retrying<T, F, Fut>(&self, operation: &str, op: F) -> EngineResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = EngineResult<T>>,
    {
        with_retry(&self.config.retry, operation, op).await
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use kiln_core::{BomLine, Money, NewBom, NewMaterial, Quantity};

    pub async fn engine() -> ProductionEngine {
        ProductionEngine::open(EngineConfig::in_memory()).await.unwrap()
    }

    pub async fn material(engine: &ProductionEngine, sku: &str, stock: i64, price_cents: i64) -> String {
        engine
            .create_material(NewMaterial {
                sku: sku.to_string(),
                name: format!("{} stock", sku),
                unit: "pcs".to_string(),
                purchase_price: Money::from_cents(price_cents),
                stock: Quantity::from_units(stock),
            })
            .await
            .unwrap()
            .id
    }

    pub async fn bom(engine: &ProductionEngine, sku: &str, lines: &[(&String, i64)]) -> String {
        engine
            .create_bom(NewBom {
                product_name: format!("{} product", sku),
                product_sku: sku.to_string(),
                notes: None,
                lines: lines
                    .iter()
                    .map(|(id, per_unit)| BomLine::new(id.as_str(), Quantity::from_units(*per_unit)))
                    .collect(),
            })
            .await
            .unwrap()
            .id
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::notify::BroadcastNotifier;
    use kiln_core::NewProductionOrder;

    #[tokio::test]
    async fn test_open_rejects_invalid_config() {
        let mut config = EngineConfig::in_memory();
        config.retry.max_attempts = 0;
        assert!(ProductionEngine::open(config).await.is_err());
    }

    #[tokio::test]
    async fn test_events_reach_subscribers() {
        let notifier = Arc::new(BroadcastNotifier::from_settings(&EngineConfig::default().notifications));
        let mut rx = notifier.subscribe();
        let engine = engine().await.with_notifier(notifier);

        let m = material(&engine, "OAK", 10, 100).await;
        let b = bom(&engine, "STOOL", &[(&m, 2)]).await;
        let created = engine
            .create_order(NewProductionOrder {
                bom_id: b.clone(),
                quantity: 1,
                additional_costs: vec![],
                notes: None,
            })
            .await
            .unwrap();

        assert_eq!(
            rx.recv().await.unwrap(),
            EngineEvent::OrderCreated {
                order_id: created.order.id,
                bom_id: b,
                quantity: 1,
                executable: true,
            }
        );
    }
}
