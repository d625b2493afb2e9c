//! # Cache Snapshot
//!
//! The versioned aggregate the engine persists and exposes to screens,
//! plus the pure read selectors computed over it.
//!
//! ## Versioning Rule
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Snapshot Hydration Rule                             │
//! │                                                                         │
//! │   stored document ──┬── valid JSON, version == 1 ──► use as-is          │
//! │                     │                                                   │
//! │                     ├── version != 1 ─────────────► default snapshot    │
//! │                     │                                                   │
//! │                     └── parse failure ────────────► default snapshot    │
//! │                                                                         │
//! │   A malformed snapshot is NEVER partially trusted.                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::types::{Approval, ApprovalStatus, Deliverable, Order, OrderDetail, OrderStatus, Wallet};

/// Current snapshot document version.
pub const SNAPSHOT_VERSION: u32 = 1;

// =============================================================================
// Snapshot
// =============================================================================

/// Versioned aggregate of queue state: wallet, orders, per-order
/// details, and the last successful sync time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CacheSnapshot {
    /// Document version. Anything other than [`SNAPSHOT_VERSION`]
    /// discards the document on load.
    pub version: u32,

    pub wallet: Wallet,

    /// All orders for the customer, in backend order.
    pub orders: Vec<Order>,

    /// Order id → full detail, for every detail fetched so far.
    pub details: HashMap<String, OrderDetail>,

    /// When the snapshot was last assembled from a complete refresh.
    #[ts(as = "Option<String>")]
    pub last_sync: Option<DateTime<Utc>>,
}

impl Default for CacheSnapshot {
    fn default() -> Self {
        CacheSnapshot {
            version: SNAPSHOT_VERSION,
            wallet: Wallet::default(),
            orders: Vec::new(),
            details: HashMap::new(),
            last_sync: None,
        }
    }
}

impl CacheSnapshot {
    /// Parses a stored document. Returns `None` for invalid JSON or a
    /// version mismatch; the caller reinitializes to defaults.
    pub fn decode(raw: &str) -> Option<CacheSnapshot> {
        let snapshot: CacheSnapshot = serde_json::from_str(raw).ok()?;
        if snapshot.version != SNAPSHOT_VERSION {
            return None;
        }
        Some(snapshot)
    }

    /// Serializes the snapshot for persistence.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    // =========================================================================
    // Derived Selectors (pure, no I/O)
    // =========================================================================

    /// Snapshot lookup by order id.
    pub fn order(&self, id: &str) -> Option<&Order> {
        self.orders.iter().find(|o| o.id == id)
    }

    /// Every still-pending approval across loaded details, paired with
    /// its deliverable and order, most recently updated deliverable
    /// first.
    pub fn pending_approvals(&self) -> Vec<PendingApproval> {
        let mut pending: Vec<PendingApproval> = Vec::new();

        for detail in self.details.values() {
            for approval in &detail.approvals {
                if approval.status != ApprovalStatus::Pending {
                    continue;
                }
                let Some(deliverable) = detail
                    .deliverables
                    .iter()
                    .find(|d| d.id == approval.deliverable_id)
                else {
                    // Detail invariant guarantees this exists; skip
                    // rather than panic if a backend ever breaks it.
                    continue;
                };
                pending.push(PendingApproval {
                    order: detail.order.clone(),
                    deliverable: deliverable.clone(),
                    approval: approval.clone(),
                });
            }
        }

        pending.sort_by(|a, b| b.deliverable.updated_at.cmp(&a.deliverable.updated_at));
        pending
    }

    /// Count of orders with exactly the given status.
    pub fn count_by_status(&self, status: OrderStatus) -> usize {
        self.orders.iter().filter(|o| o.status == status).count()
    }
}

/// A pending approval joined with its deliverable and parent order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PendingApproval {
    pub order: Order,
    pub deliverable: Deliverable,
    pub approval: Approval,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{OrderType, WaitingReason};
    use chrono::TimeZone;

    fn ts(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, h, m, 0).unwrap()
    }

    fn order(id: &str, status: OrderStatus) -> Order {
        Order {
            id: id.to_string(),
            customer_id: "cust-1".to_string(),
            order_type: OrderType::Content,
            title: format!("Order {}", id),
            summary: String::new(),
            payload: serde_json::json!({}),
            status,
            waiting_reason: match status {
                OrderStatus::WaitingPayment => Some(WaitingReason::MissingPlan),
                _ => None,
            },
            priority: 0,
            created_at: ts(9, 0),
            updated_at: ts(9, 0),
        }
    }

    fn detail_with_pending(id: &str, updated_at: DateTime<Utc>) -> OrderDetail {
        let deliverable = Deliverable {
            id: format!("del-{}", id),
            order_id: id.to_string(),
            title: "Cut v1".to_string(),
            url: "https://example.test/d".to_string(),
            updated_at,
        };
        let approval = Approval {
            id: format!("app-{}", id),
            order_id: id.to_string(),
            deliverable_id: deliverable.id.clone(),
            status: ApprovalStatus::Pending,
            feedback: None,
            decided_at: None,
        };
        OrderDetail {
            order: order(id, OrderStatus::InProgress),
            deliverables: vec![deliverable],
            approvals: vec![approval],
            events: Vec::new(),
            assets: Vec::new(),
        }
    }

    #[test]
    fn test_decode_rejects_wrong_version() {
        let mut snapshot = CacheSnapshot::default();
        snapshot.version = 2;
        let raw = snapshot.encode().unwrap();
        assert!(CacheSnapshot::decode(&raw).is_none());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(CacheSnapshot::decode("not json at all").is_none());
        assert!(CacheSnapshot::decode("{\"version\":1}").is_none());
    }

    #[test]
    fn test_decode_roundtrip() {
        let mut snapshot = CacheSnapshot::default();
        snapshot.orders.push(order("o-1", OrderStatus::Queued));
        snapshot.last_sync = Some(ts(10, 0));
        let raw = snapshot.encode().unwrap();
        assert_eq!(CacheSnapshot::decode(&raw), Some(snapshot));
    }

    #[test]
    fn test_order_lookup() {
        let mut snapshot = CacheSnapshot::default();
        snapshot.orders.push(order("o-1", OrderStatus::Draft));
        assert!(snapshot.order("o-1").is_some());
        assert!(snapshot.order("o-2").is_none());
    }

    #[test]
    fn test_pending_approvals_ordering() {
        let mut snapshot = CacheSnapshot::default();
        // updated_at 10:00, 10:05, 10:02 -> expect 10:05, 10:02, 10:00
        snapshot
            .details
            .insert("a".into(), detail_with_pending("a", ts(10, 0)));
        snapshot
            .details
            .insert("b".into(), detail_with_pending("b", ts(10, 5)));
        snapshot
            .details
            .insert("c".into(), detail_with_pending("c", ts(10, 2)));

        let pending = snapshot.pending_approvals();
        let times: Vec<_> = pending.iter().map(|p| p.deliverable.updated_at).collect();
        assert_eq!(times, vec![ts(10, 5), ts(10, 2), ts(10, 0)]);
    }

    #[test]
    fn test_pending_approvals_skips_decided() {
        let mut detail = detail_with_pending("a", ts(10, 0));
        detail.approvals[0].status = ApprovalStatus::Approved;
        let mut snapshot = CacheSnapshot::default();
        snapshot.details.insert("a".into(), detail);
        assert!(snapshot.pending_approvals().is_empty());
    }

    #[test]
    fn test_count_by_status() {
        let mut snapshot = CacheSnapshot::default();
        snapshot.orders.push(order("a", OrderStatus::Queued));
        snapshot.orders.push(order("b", OrderStatus::Queued));
        snapshot.orders.push(order("c", OrderStatus::Completed));
        assert_eq!(snapshot.count_by_status(OrderStatus::Queued), 2);
        assert_eq!(snapshot.count_by_status(OrderStatus::Completed), 1);
        assert_eq!(snapshot.count_by_status(OrderStatus::Draft), 0);
    }
}
