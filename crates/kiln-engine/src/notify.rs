//! # Engine Notifications
//!
//! Outbound events emitted after an operation commits.
//!
//! ## Delivery
//! ```text
//! ┌──────────────────┐   notify(&event)   ┌────────────────────────────────┐
//! │ ProductionEngine │ ─────────────────► │ Notifier                       │
//! │ (after commit)   │                    │  • TracingNotifier (default)   │
//! └──────────────────┘                    │  • BroadcastNotifier           │
//!                                         │      └─► broadcast::Receiver…  │
//!                                         └────────────────────────────────┘
//! ```
//!
//! Notifications are fire-and-forget. A notifier must never block and its
//! failures never reach the operation that emitted the event.

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

use crate::config::NotificationSettings;
use kiln_core::{BudgetVerdict, Money, OrderStatus, Quantity};

/// Something the engine changed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    OrderCreated {
        order_id: String,
        bom_id: String,
        quantity: i64,
        executable: bool,
    },
    OrderTransitioned {
        order_id: String,
        from: OrderStatus,
        to: OrderStatus,
    },
    CostAnalyzed {
        order_id: String,
        variance: Money,
        verdict: BudgetVerdict,
    },
    ProductCredited {
        product_id: String,
        units: i64,
        stock: i64,
    },
    ProductUnitsRemoved {
        product_id: String,
        units: i64,
        bom_id: Option<String>,
    },
    MaterialStockChanged {
        material_id: String,
        stock: Quantity,
    },
    BomDeleted {
        bom_id: String,
    },
}

impl EngineEvent {
    /// Short name used as a log field.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineEvent::OrderCreated { .. } => "order_created",
            EngineEvent::OrderTransitioned { .. } => "order_transitioned",
            EngineEvent::CostAnalyzed { .. } => "cost_analyzed",
            EngineEvent::ProductCredited { .. } => "product_credited",
            EngineEvent::ProductUnitsRemoved { .. } => "product_units_removed",
            EngineEvent::MaterialStockChanged { .. } => "material_stock_changed",
            EngineEvent::BomDeleted { .. } => "bom_deleted",
        }
    }
}

/// Receives engine events.
pub trait Notifier: Send + Sync {
    fn notify(&self, event: &EngineEvent);
}

// =============================================================================
// Tracing
// =============================================================================

/// Writes each event to the log as JSON.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, event: &EngineEvent) {
        match serde_json::to_string(event) {
            Ok(payload) => debug!(kind = event.kind(), payload = %payload, "Engine event"),
            Err(e) => debug!(kind = event.kind(), error = %e, "Engine event (unserializable)"),
        }
    }
}

// =============================================================================
// Broadcast
// =============================================================================

/// Fans events out to any number of async subscribers.
///
/// Sending with no subscribers is not an error; the event is dropped.
#[derive(Debug, Clone)]
pub struct BroadcastNotifier {
    tx: broadcast::Sender<EngineEvent>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        BroadcastNotifier { tx }
    }

    /// Sized from `[notifications] channel_capacity`.
    pub fn from_settings(settings: &NotificationSettings) -> Self {
        Self::new(settings.channel_capacity)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }
}

impl Notifier for BroadcastNotifier {
    fn notify(&self, event: &EngineEvent) {
        if self.tx.send(event.clone()).is_err() {
            debug!(kind = event.kind(), "No event subscribers");
        }
    }
}
