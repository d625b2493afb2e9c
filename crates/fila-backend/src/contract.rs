//! # Queue Contract
//!
//! The capability interface every backend (real or simulated) must
//! implement. No logic lives here; the synchronization engine talks to
//! the queue exclusively through this trait and can swap the concrete
//! implementation behind it at runtime (the remote→simulator fallback).
//!
//! All operations are asynchronous and may fail with a
//! [`fila_core::QueueError`]. Remote and simulator implementations
//! honor the contract identically from the caller's perspective; only
//! latency and failure characteristics differ.

use async_trait::async_trait;

use fila_core::{
    ApprovalStatus, AssetUpload, NewOrder, Order, OrderAsset, OrderDetail, OrderPatch,
    QueueResult, SubmitOutcome, Topup, Wallet,
};

// =============================================================================
// Backend Kind
// =============================================================================

/// Which implementation is answering the contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Live HTTP service.
    Remote,
    /// Local lifecycle simulator.
    Simulator,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Remote => write!(f, "remote"),
            BackendKind::Simulator => write!(f, "simulator"),
        }
    }
}

// =============================================================================
// Queue Backend Trait
// =============================================================================

/// The work-order queue contract.
#[async_trait]
pub trait QueueBackend: Send + Sync {
    /// Which implementation this is (used for status/fallback, never
    /// for behavior branching by callers).
    fn kind(&self) -> BackendKind;

    /// Stable customer identifier.
    async fn customer_id(&self) -> QueueResult<String>;

    /// Current wallet snapshot.
    async fn wallet(&self) -> QueueResult<Wallet>;

    /// Toggles the customer's plan flag.
    async fn set_plan_active(&self, active: bool) -> QueueResult<()>;

    /// Creates a pending PIX top-up with a payment payload.
    ///
    /// Fails with `InvalidAmount` if `amount_cents <= 0`.
    async fn create_pix_topup(&self, amount_cents: i64) -> QueueResult<Topup>;

    /// Current state of a top-up. Fails with `NotFound` for an unknown
    /// id.
    async fn topup_status(&self, id: &str) -> QueueResult<Topup>;

    /// Creates a new order in `Draft`.
    async fn create_order(&self, new_order: NewOrder) -> QueueResult<Order>;

    /// Applies a partial update to a draft order.
    ///
    /// Fails with `InvalidState` if the order is not editable.
    async fn update_order(&self, id: &str, patch: OrderPatch) -> QueueResult<Order>;

    /// All orders for the customer, in no guaranteed order.
    async fn list_orders(&self) -> QueueResult<Vec<Order>>;

    /// Full detail for one order. Fails with `NotFound`.
    async fn order_detail(&self, id: &str) -> QueueResult<OrderDetail>;

    /// Registers uploaded media against an order.
    ///
    /// Fails with `InvalidState` if the order no longer accepts assets.
    async fn upload_order_asset(
        &self,
        order_id: &str,
        file: AssetUpload,
    ) -> QueueResult<OrderAsset>;

    /// Submits a draft: transitions `draft → queued`, or
    /// `draft → waiting_payment` when plan/balance gating fails.
    async fn submit_order(&self, id: &str) -> QueueResult<SubmitOutcome>;

    /// Appends a customer note to the order's event log.
    async fn post_order_info(&self, order_id: &str, message: &str) -> QueueResult<OrderDetail>;

    /// Decides the pending approval attached to a deliverable.
    ///
    /// Fails with `InvalidState` if the approval is not pending or the
    /// requested status is not a decision.
    async fn set_approval(
        &self,
        deliverable_id: &str,
        status: ApprovalStatus,
        feedback: Option<String>,
    ) -> QueueResult<OrderDetail>;

    /// Pauses a running ads publication. `InvalidState` unless the
    /// order is `type = ads` and `in_progress`.
    async fn pause_ads_publication(&self, order_id: &str) -> QueueResult<OrderDetail>;

    /// Resumes a paused ads publication.
    async fn resume_ads_publication(&self, order_id: &str) -> QueueResult<OrderDetail>;

    /// Stops an ads publication for good.
    async fn stop_ads_publication(&self, order_id: &str) -> QueueResult<OrderDetail>;
}
