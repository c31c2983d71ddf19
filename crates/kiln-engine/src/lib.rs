//! # kiln-engine: Production Order Engine for Kiln
//!
//! Turns a BOM plus a quantity into a validated plan, executes it against
//! material stock, produces finished goods, and reconciles estimated against
//! actual cost.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          ProductionEngine                               │
//! │                                                                         │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │ orders.rs      │  │ catalog.rs     │  │ restitution.rs         │    │
//! │  │                │  │                │  │                        │    │
//! │  │ create/commit  │  │ materials      │  │ delete_product_units   │    │
//! │  │ complete       │  │ BOMs           │  │ delete_product         │    │
//! │  │ cancel         │  │ products       │  │                        │    │
//! │  │ cost analysis  │  │                │  │                        │    │
//! │  └───────┬────────┘  └───────┬────────┘  └───────────┬────────────┘    │
//! │          └───────────────────┼───────────────────────┘                 │
//! │                              ▼                                          │
//! │          retry.rs (conflict backoff) ─► kiln-db transaction             │
//! │                              │                                          │
//! │                              ▼                                          │
//! │          notify.rs (after commit, fire and forget)                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//! ```rust,no_run
//! use kiln_engine::{EngineConfig, ProductionEngine};
//! use kiln_core::NewProductionOrder;
//!
//! # async fn run() -> Result<(), kiln_engine::EngineError> {
//! let engine = ProductionEngine::open(EngineConfig::load(None)?).await?;
//!
//! let created = engine
//!     .create_order(NewProductionOrder {
//!         bom_id: "…".into(),
//!         quantity: 3,
//!         additional_costs: vec![],
//!         notes: None,
//!     })
//!     .await?;
//!
//! engine.commit_order(&created.order.id).await?;
//! engine.complete_order(&created.order.id, None).await?;
//! # Ok(())
//! # }
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod notify;
pub mod orders;
pub mod restitution;
pub mod retry;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{DatabaseSettings, EngineConfig, NotificationSettings, OrderSettings, RetrySettings};
pub use engine::ProductionEngine;
pub use error::{EngineError, EngineResult, ErrorCode, ErrorResponse};
pub use notify::{BroadcastNotifier, EngineEvent, Notifier, TracingNotifier};
pub use orders::CreatedOrder;

pub use kiln_db::OrderFilter;

use tracing_subscriber::EnvFilter;

/// Installs a `tracing` subscriber for binaries and examples.
///
/// `RUST_LOG` wins over the default `info,kiln=debug,sqlx=warn`. Calling it
/// twice is harmless.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,kiln=debug,sqlx=warn"));

    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
