//! # Lifecycle Simulator
//!
//! A full [`QueueBackend`] that runs the order lifecycle locally, used
//! whenever no live session exists (local development, demos, expired
//! logins). State lives in one versioned JSON document behind the
//! key-value seam, so a simulated queue survives restarts the same way
//! the real cache does.
//!
//! There is no background task. Time advances lazily: every operation
//! first catches the world up to `clock.now()` by replaying overdue
//! transitions, then acts. Two processes observing the same document
//! at the same instant therefore agree on its state.

pub mod db;
pub mod lifecycle;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use fila_core::{
    Approval, ApprovalStatus, AssetUpload, Deliverable, NewOrder, Order, OrderAsset, OrderDetail,
    OrderEvent, OrderPatch, OrderStatus, OrderType, QueueError, QueueResult, SubmitOutcome, Topup,
    TopupStatus, Wallet, WaitingReason,
};
use fila_store::keys::SIM_DB_KEY;
use fila_store::{Clock, KvStore, SystemClock};

use crate::contract::{BackendKind, QueueBackend};
use db::{SimDb, SimOrder, SimTopup};
use lifecycle::{Phase, QUEUE_PICKUP_DELAY, TOPUP_APPROVE_DELAY, TOPUP_EXPIRY};

// =============================================================================
// Simulator Backend
// =============================================================================

/// Local stand-in for the remote queue service.
pub struct SimulatorBackend {
    storage: Arc<dyn KvStore>,
    clock: Arc<dyn Clock>,
}

impl SimulatorBackend {
    pub fn new(storage: Arc<dyn KvStore>) -> Self {
        SimulatorBackend {
            storage,
            clock: Arc::new(SystemClock),
        }
    }

    /// Test constructor with an injected clock.
    pub fn with_clock(storage: Arc<dyn KvStore>, clock: Arc<dyn Clock>) -> Self {
        SimulatorBackend { storage, clock }
    }

    /// Loads the world, catches it up to now, runs `op`, persists.
    ///
    /// The stepped document is saved even when `op` fails: elapsed time
    /// is a fact regardless of whether the operation was valid.
    async fn with_db<T>(
        &self,
        op: impl FnOnce(&mut SimDb, DateTime<Utc>) -> QueueResult<T>,
    ) -> QueueResult<T> {
        let mut db = match self.storage.get(SIM_DB_KEY).await? {
            Some(raw) => SimDb::decode(&raw).unwrap_or_default(),
            None => SimDb::default(),
        };

        let now = self.clock.now();
        step(&mut db, now);

        let result = op(&mut db, now);
        let raw = db.encode()?;
        self.storage.set(SIM_DB_KEY, &raw).await?;
        result
    }
}

// =============================================================================
// Lazy Advancement
// =============================================================================

/// Replays every overdue transition in the document.
///
/// Orders loop through [`lifecycle::advance`] so a long-idle document
/// catches up through multiple phases in one pass. Transition
/// timestamps come from the deadlines that fired, not from `now`, so
/// replay is deterministic.
fn step(db: &mut SimDb, now: DateTime<Utc>) {
    let SimDb {
        orders,
        deliverables,
        approvals,
        events,
        customer,
        topups,
        ..
    } = db;

    for sim_order in orders.iter_mut() {
        while let Some(t) = lifecycle::advance(sim_order.phase, sim_order.due_at, now) {
            let fired_at = sim_order.due_at.unwrap_or(now);
            debug!(
                order_id = %sim_order.order.id,
                from = ?sim_order.phase,
                to = ?t.phase,
                "Simulator transition"
            );

            sim_order.phase = t.phase;
            sim_order.due_at = t.due_at;
            sim_order.order.status = t.status;
            sim_order.order.updated_at = fired_at;

            events.push(new_event(
                &sim_order.order.id,
                t.event_kind,
                t.event_message,
                fired_at,
            ));

            if t.emits_deliverable {
                let deliverable = Deliverable {
                    id: Uuid::new_v4().to_string(),
                    order_id: sim_order.order.id.clone(),
                    title: format!("Delivery for \"{}\"", sim_order.order.title),
                    url: format!(
                        "https://cdn.fila.local/deliverables/{}.zip",
                        sim_order.order.id
                    ),
                    updated_at: fired_at,
                };
                approvals.push(Approval {
                    id: Uuid::new_v4().to_string(),
                    order_id: sim_order.order.id.clone(),
                    deliverable_id: deliverable.id.clone(),
                    status: ApprovalStatus::Pending,
                    feedback: None,
                    decided_at: None,
                });
                deliverables.push(deliverable);
            }
        }
    }

    for sim_topup in topups.iter_mut() {
        if sim_topup.topup.status != TopupStatus::Pending {
            continue;
        }
        // The earliest deadline decides the outcome, regardless of how
        // late the document is first observed.
        match sim_topup.topup.expires_at {
            Some(expires) if expires <= sim_topup.approve_at => {
                if now >= expires {
                    sim_topup.topup.status = TopupStatus::Expired;
                }
            }
            _ => {
                if now >= sim_topup.approve_at {
                    sim_topup.topup.status = TopupStatus::Approved;
                    sim_topup.topup.approved_at = Some(sim_topup.approve_at);
                    customer.balance_cents += sim_topup.topup.amount_cents;
                }
            }
        }
    }
}

fn new_event(order_id: &str, kind: &str, message: &str, at: DateTime<Utc>) -> OrderEvent {
    OrderEvent {
        id: Uuid::new_v4().to_string(),
        order_id: order_id.to_string(),
        kind: kind.to_string(),
        message: message.to_string(),
        created_at: at,
    }
}

fn detail_for(db: &SimDb, order: Order) -> OrderDetail {
    let id = order.id.clone();
    let mut events: Vec<OrderEvent> = db
        .events
        .iter()
        .filter(|e| e.order_id == id)
        .cloned()
        .collect();
    events.sort_by_key(|e| e.created_at);

    OrderDetail {
        order,
        deliverables: db
            .deliverables
            .iter()
            .filter(|d| d.order_id == id)
            .cloned()
            .collect(),
        approvals: db
            .approvals
            .iter()
            .filter(|a| a.order_id == id)
            .cloned()
            .collect(),
        events,
        assets: db
            .assets
            .iter()
            .filter(|a| a.order_id == id)
            .cloned()
            .collect(),
    }
}

fn order_not_found(id: &str) -> QueueError {
    QueueError::NotFound {
        entity: "order",
        id: id.to_string(),
    }
}

// =============================================================================
// Contract Implementation
// =============================================================================

#[async_trait]
impl QueueBackend for SimulatorBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Simulator
    }

    async fn customer_id(&self) -> QueueResult<String> {
        self.with_db(|db, _| Ok(db.customer.id.clone())).await
    }

    async fn wallet(&self) -> QueueResult<Wallet> {
        self.with_db(|db, _| {
            Ok(Wallet {
                plan_active: db.customer.plan_active,
                balance_cents: db.customer.balance_cents,
                ..Wallet::default()
            })
        })
        .await
    }

    async fn set_plan_active(&self, active: bool) -> QueueResult<()> {
        self.with_db(|db, _| {
            db.customer.plan_active = active;
            Ok(())
        })
        .await
    }

    async fn create_pix_topup(&self, amount_cents: i64) -> QueueResult<Topup> {
        if amount_cents <= 0 {
            return Err(QueueError::InvalidAmount { amount_cents });
        }

        self.with_db(|db, now| {
            let id = Uuid::new_v4().to_string();
            let topup = Topup {
                // PIX "copia e cola" shaped like the real BR Code
                // payloads, unique per intent.
                copy_paste: format!(
                    "00020126580014br.gov.bcb.pix0136{}52040000530398654{:02}{}.{:02}5802BR",
                    id,
                    amount_cents.to_string().len(),
                    amount_cents / 100,
                    amount_cents % 100
                ),
                id,
                status: TopupStatus::Pending,
                amount_cents,
                qr_image: None,
                expires_at: Some(now + TOPUP_EXPIRY),
                approved_at: None,
                failure_reason: None,
                created_at: now,
            };
            db.topups.push(SimTopup {
                topup: topup.clone(),
                approve_at: now + TOPUP_APPROVE_DELAY,
            });
            Ok(topup)
        })
        .await
    }

    async fn topup_status(&self, id: &str) -> QueueResult<Topup> {
        self.with_db(|db, _| {
            db.topups
                .iter()
                .find(|t| t.topup.id == id)
                .map(|t| t.topup.clone())
                .ok_or(QueueError::NotFound {
                    entity: "topup",
                    id: id.to_string(),
                })
        })
        .await
    }

    async fn create_order(&self, new_order: NewOrder) -> QueueResult<Order> {
        self.with_db(|db, now| {
            let order = Order {
                id: Uuid::new_v4().to_string(),
                customer_id: db.customer.id.clone(),
                order_type: new_order.order_type,
                title: new_order.title,
                summary: new_order.summary,
                payload: new_order.payload,
                status: OrderStatus::Draft,
                waiting_reason: None,
                priority: 0,
                created_at: now,
                updated_at: now,
            };
            db.events
                .push(new_event(&order.id, "order_created", "Order created.", now));
            db.orders.push(SimOrder {
                order: order.clone(),
                phase: Phase::Draft,
                due_at: None,
            });
            Ok(order)
        })
        .await
    }

    async fn update_order(&self, id: &str, patch: OrderPatch) -> QueueResult<Order> {
        self.with_db(|db, now| {
            let sim_order = db.order_mut(id).ok_or_else(|| order_not_found(id))?;
            if !sim_order.order.status.is_editable() {
                return Err(QueueError::InvalidState(format!(
                    "order {} is {} and no longer editable",
                    id, sim_order.order.status
                )));
            }

            let order = &mut sim_order.order;
            if let Some(title) = patch.title {
                order.title = title;
            }
            if let Some(summary) = patch.summary {
                order.summary = summary;
            }
            if let Some(payload) = patch.payload {
                order.payload = payload;
            }
            if let Some(priority) = patch.priority {
                order.priority = priority;
            }
            order.updated_at = now;
            Ok(order.clone())
        })
        .await
    }

    async fn list_orders(&self) -> QueueResult<Vec<Order>> {
        self.with_db(|db, _| Ok(db.orders.iter().map(|o| o.order.clone()).collect()))
            .await
    }

    async fn order_detail(&self, id: &str) -> QueueResult<OrderDetail> {
        self.with_db(|db, _| {
            let order = db
                .order(id)
                .map(|o| o.order.clone())
                .ok_or_else(|| order_not_found(id))?;
            Ok(detail_for(db, order))
        })
        .await
    }

    async fn upload_order_asset(
        &self,
        order_id: &str,
        file: AssetUpload,
    ) -> QueueResult<OrderAsset> {
        self.with_db(|db, now| {
            let sim_order = db.order(order_id).ok_or_else(|| order_not_found(order_id))?;
            if sim_order.order.status.is_terminal() {
                return Err(QueueError::InvalidState(format!(
                    "order {} is {} and no longer accepts assets",
                    order_id, sim_order.order.status
                )));
            }

            let asset = OrderAsset {
                id: Uuid::new_v4().to_string(),
                order_id: order_id.to_string(),
                name: file.name,
                mime_type: file.mime_type,
                size_bytes: file.size_bytes,
                kind: file.kind,
                created_at: now,
            };
            db.assets.push(asset.clone());
            Ok(asset)
        })
        .await
    }

    async fn submit_order(&self, id: &str) -> QueueResult<SubmitOutcome> {
        self.with_db(|db, now| {
            let plan_active = db.customer.plan_active;
            let balance = db.customer.balance_cents;

            let sim_order = db.order_mut(id).ok_or_else(|| order_not_found(id))?;
            let status = sim_order.order.status;
            if status != OrderStatus::Draft && status != OrderStatus::WaitingPayment {
                return Err(QueueError::InvalidState(format!(
                    "order {} is {} and cannot be submitted",
                    id, status
                )));
            }

            let price = sim_order.order.order_type.submission_price_cents();

            // Plan gate first, then balance, matching the remote
            // service. Re-submitting a waiting order re-runs both.
            let waiting_reason = if !plan_active {
                Some(WaitingReason::MissingPlan)
            } else if balance < price {
                Some(WaitingReason::InsufficientBalance)
            } else {
                None
            };

            if let Some(reason) = waiting_reason {
                sim_order.phase = Phase::AwaitingPayment;
                sim_order.due_at = None;
                sim_order.order.status = OrderStatus::WaitingPayment;
                sim_order.order.waiting_reason = Some(reason);
                sim_order.order.updated_at = now;
                let order_id = sim_order.order.id.clone();
                db.events.push(new_event(
                    &order_id,
                    "status_changed",
                    "Submission is waiting on payment.",
                    now,
                ));
                return Ok(SubmitOutcome {
                    status: OrderStatus::WaitingPayment,
                    reason: Some(reason),
                    balance_cents: match reason {
                        WaitingReason::InsufficientBalance => Some(balance),
                        WaitingReason::MissingPlan => None,
                    },
                    required_cents: Some(price),
                });
            }

            sim_order.phase = Phase::Queued;
            sim_order.due_at = Some(now + QUEUE_PICKUP_DELAY);
            sim_order.order.status = OrderStatus::Queued;
            sim_order.order.waiting_reason = None;
            sim_order.order.updated_at = now;
            let order_id = sim_order.order.id.clone();

            db.customer.balance_cents -= price;
            db.events.push(new_event(
                &order_id,
                "status_changed",
                "Order submitted to the queue.",
                now,
            ));

            Ok(SubmitOutcome {
                status: OrderStatus::Queued,
                reason: None,
                balance_cents: None,
                required_cents: None,
            })
        })
        .await
    }

    async fn post_order_info(&self, order_id: &str, message: &str) -> QueueResult<OrderDetail> {
        self.with_db(|db, now| {
            let order = db
                .order(order_id)
                .map(|o| o.order.clone())
                .ok_or_else(|| order_not_found(order_id))?;
            db.events
                .push(new_event(order_id, "customer_note", message, now));
            Ok(detail_for(db, order))
        })
        .await
    }

    async fn set_approval(
        &self,
        deliverable_id: &str,
        status: ApprovalStatus,
        feedback: Option<String>,
    ) -> QueueResult<OrderDetail> {
        if !status.is_decided() {
            return Err(QueueError::InvalidState(
                "an approval can only be decided, not reset to pending".to_string(),
            ));
        }

        self.with_db(|db, now| {
            let approval = db
                .approvals
                .iter_mut()
                .find(|a| a.deliverable_id == deliverable_id)
                .ok_or(QueueError::NotFound {
                    entity: "approval",
                    id: deliverable_id.to_string(),
                })?;

            if approval.status.is_decided() {
                return Err(QueueError::InvalidState(format!(
                    "approval for deliverable {} was already decided",
                    deliverable_id
                )));
            }

            approval.status = status;
            approval.feedback = feedback;
            approval.decided_at = Some(now);
            let order_id = approval.order_id.clone();

            let message = if status == ApprovalStatus::Approved {
                "Deliverable approved."
            } else {
                "Deliverable rejected."
            };
            db.events
                .push(new_event(&order_id, "approval_decided", message, now));

            let order = db
                .order(&order_id)
                .map(|o| o.order.clone())
                .ok_or_else(|| order_not_found(&order_id))?;
            Ok(detail_for(db, order))
        })
        .await
    }

    async fn pause_ads_publication(&self, order_id: &str) -> QueueResult<OrderDetail> {
        self.ads_transition(order_id, AdsAction::Pause).await
    }

    async fn resume_ads_publication(&self, order_id: &str) -> QueueResult<OrderDetail> {
        self.ads_transition(order_id, AdsAction::Resume).await
    }

    async fn stop_ads_publication(&self, order_id: &str) -> QueueResult<OrderDetail> {
        self.ads_transition(order_id, AdsAction::Stop).await
    }
}

// =============================================================================
// Ads Publication Control
// =============================================================================

#[derive(Debug, Clone, Copy)]
enum AdsAction {
    Pause,
    Resume,
    Stop,
}

impl SimulatorBackend {
    async fn ads_transition(&self, order_id: &str, action: AdsAction) -> QueueResult<OrderDetail> {
        self.with_db(|db, now| {
            let sim_order = db.order_mut(order_id).ok_or_else(|| order_not_found(order_id))?;
            if sim_order.order.order_type != OrderType::Ads {
                return Err(QueueError::InvalidState(format!(
                    "order {} is {} and has no publication to control",
                    order_id, sim_order.order.order_type
                )));
            }

            let phase = sim_order.phase;
            let (message, ok) = match action {
                AdsAction::Pause if phase == Phase::Producing => {
                    sim_order.phase = Phase::Paused;
                    sim_order.due_at = None;
                    ("Publication paused.", true)
                }
                AdsAction::Resume if phase == Phase::Paused => {
                    // A resumed publication gets a fresh production
                    // window rather than an already-expired deadline.
                    sim_order.phase = Phase::Producing;
                    sim_order.due_at = Some(now + lifecycle::PRODUCTION_DELAY);
                    ("Publication resumed.", true)
                }
                AdsAction::Stop if matches!(phase, Phase::Producing | Phase::Paused) => {
                    sim_order.phase = Phase::Done;
                    sim_order.due_at = None;
                    sim_order.order.status = OrderStatus::Completed;
                    ("Publication stopped.", true)
                }
                _ => ("", false),
            };

            if !ok {
                return Err(QueueError::InvalidState(format!(
                    "publication for order {} cannot {:?} from phase {:?}",
                    order_id, action, phase
                )));
            }

            sim_order.order.updated_at = now;
            let order = sim_order.order.clone();
            db.events
                .push(new_event(order_id, "publication_changed", message, now));
            Ok(detail_for(db, order))
        })
        .await
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
