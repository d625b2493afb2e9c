//! # Simulator Database
//!
//! The simulator's whole world, persisted as one versioned JSON
//! document in the key-value store. Orders carry their internal phase
//! and next deadline alongside the public record; top-ups carry their
//! auto-approval schedule.
//!
//! Like the engine's cache, an unreadable or version-mismatched
//! document is discarded wholesale and the simulator starts fresh.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use fila_core::{Approval, Deliverable, Order, OrderAsset, OrderEvent, QueueResult, Topup};

use super::lifecycle::Phase;

/// Bump when the document layout changes incompatibly.
pub const SIM_DB_VERSION: u32 = 1;

// =============================================================================
// Records
// =============================================================================

/// The simulated customer account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimCustomer {
    pub id: String,
    pub plan_active: bool,
    pub balance_cents: i64,
}

/// An order plus the simulator's scheduling state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimOrder {
    pub order: Order,

    /// Internal phase (richer than `order.status`).
    pub phase: Phase,

    /// Deadline for the next automatic transition, if one is
    /// scheduled.
    pub due_at: Option<DateTime<Utc>>,
}

/// A top-up plus its auto-approval schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimTopup {
    pub topup: Topup,

    /// When the pending payment auto-approves. Expiry wins if it comes
    /// first.
    pub approve_at: DateTime<Utc>,
}

// =============================================================================
// Document
// =============================================================================

/// The persisted simulator world.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimDb {
    pub version: u32,
    pub customer: SimCustomer,
    pub orders: Vec<SimOrder>,
    pub deliverables: Vec<Deliverable>,
    pub approvals: Vec<Approval>,
    pub events: Vec<OrderEvent>,
    pub assets: Vec<OrderAsset>,
    pub topups: Vec<SimTopup>,
}

impl Default for SimDb {
    fn default() -> Self {
        SimDb {
            version: SIM_DB_VERSION,
            customer: SimCustomer {
                id: uuid::Uuid::new_v4().to_string(),
                plan_active: false,
                balance_cents: 0,
            },
            orders: Vec::new(),
            deliverables: Vec::new(),
            approvals: Vec::new(),
            events: Vec::new(),
            assets: Vec::new(),
            topups: Vec::new(),
        }
    }
}

impl SimDb {
    /// Parses a persisted document. `None` means start fresh: the
    /// payload was unreadable or written by an incompatible version.
    pub fn decode(raw: &str) -> Option<SimDb> {
        match serde_json::from_str::<SimDb>(raw) {
            Ok(db) if db.version == SIM_DB_VERSION => Some(db),
            Ok(db) => {
                warn!(
                    found = db.version,
                    expected = SIM_DB_VERSION,
                    "Discarding simulator db with mismatched version"
                );
                None
            }
            Err(e) => {
                warn!(error = %e, "Discarding unreadable simulator db");
                None
            }
        }
    }

    pub fn encode(&self) -> QueueResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn order_mut(&mut self, id: &str) -> Option<&mut SimOrder> {
        self.orders.iter_mut().find(|o| o.order.id == id)
    }

    pub fn order(&self, id: &str) -> Option<&SimOrder> {
        self.orders.iter().find(|o| o.order.id == id)
    }
}
