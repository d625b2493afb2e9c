//! # Domain Types
//!
//! Core domain types for the Fila work-order queue.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │     Order       │   │  OrderDetail    │   │     Wallet      │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (UUID)      │   │  order          │   │  plan_active    │       │
//! │  │  order_type     │   │  deliverables   │   │  balance_cents  │       │
//! │  │  status         │   │  approvals      │   │  currency       │       │
//! │  │  payload (JSON) │   │  events, assets │   │  topup bounds   │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │  OrderStatus    │   │    Approval     │   │     Topup       │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  Draft          │   │  Pending        │   │  Pending        │       │
//! │  │  Queued         │   │  Approved       │   │  Approved       │       │
//! │  │  WaitingPayment │   │  Rejected       │   │  Failed         │       │
//! │  │  InProgress     │   │  (one-way)      │   │  Expired        │       │
//! │  │  Completed      │   └─────────────────┘   └─────────────────┘       │
//! │  │  Cancelled      │                                                    │
//! │  └─────────────────┘                                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Money Convention
//! All amounts are minor-unit integers (cents). `4990` = R$ 49,90.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

// =============================================================================
// Order Type
// =============================================================================

/// The kind of work a customer can order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    /// Paid media campaign (supports pause/resume/stop of publication).
    Ads,
    /// Landing page / website build.
    Site,
    /// Social media content package.
    Content,
    /// Video editing job.
    VideoEditor,
}

impl OrderType {
    /// Price charged against the wallet when an order of this type is
    /// submitted.
    pub const fn submission_price_cents(&self) -> i64 {
        match self {
            OrderType::Ads => 4_990,
            OrderType::Site => 14_990,
            OrderType::Content => 2_990,
            OrderType::VideoEditor => 7_990,
        }
    }
}

impl std::fmt::Display for OrderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderType::Ads => write!(f, "ads"),
            OrderType::Site => write!(f, "site"),
            OrderType::Content => write!(f, "content"),
            OrderType::VideoEditor => write!(f, "video_editor"),
        }
    }
}

// =============================================================================
// Order Status
// =============================================================================

/// Public lifecycle of an order.
///
/// `Draft → Queued → InProgress → Completed`, with `WaitingPayment`
/// between draft and queue when submission gating fails, and
/// `Cancelled` reachable from any non-terminal state. Orders are never
/// deleted; terminal states are retained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Being edited by the customer.
    Draft,
    /// Submitted and waiting for processing to start.
    Queued,
    /// Submission was gated on plan or balance.
    WaitingPayment,
    /// Work is being produced.
    InProgress,
    /// Work finished. Terminal.
    Completed,
    /// Abandoned by the customer. Terminal.
    Cancelled,
}

impl OrderStatus {
    /// Terminal states are retained forever and accept no transitions.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }

    /// Only drafts accept field updates.
    pub const fn is_editable(&self) -> bool {
        matches!(self, OrderStatus::Draft)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OrderStatus::Draft => "draft",
            OrderStatus::Queued => "queued",
            OrderStatus::WaitingPayment => "waiting_payment",
            OrderStatus::InProgress => "in_progress",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

/// Why a submitted order is parked in `WaitingPayment`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum WaitingReason {
    /// The customer has no active plan.
    MissingPlan,
    /// Wallet balance is below the submission price.
    InsufficientBalance,
}

// =============================================================================
// Order
// =============================================================================

/// A customer work order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Order {
    /// Unique identifier (UUID v4). Stable for the order's lifetime.
    pub id: String,

    /// Customer this order belongs to.
    pub customer_id: String,

    /// Kind of work ordered.
    pub order_type: OrderType,

    /// Short title shown in lists.
    pub title: String,

    /// One-paragraph summary of the request.
    pub summary: String,

    /// Arbitrary structured briefing payload from the order form.
    #[ts(type = "unknown")]
    pub payload: serde_json::Value,

    /// Public lifecycle status.
    pub status: OrderStatus,

    /// Set while status is `WaitingPayment`.
    pub waiting_reason: Option<WaitingReason>,

    /// Display priority (higher sorts first in the queue screen).
    pub priority: i32,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Order Detail (order + child collections)
// =============================================================================

/// An order plus its child collections.
///
/// Invariants: `order.id` equals the id this detail is keyed by, and
/// every approval's `deliverable_id` references a deliverable present
/// in the same detail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct OrderDetail {
    pub order: Order,

    /// Produced artifacts awaiting (or past) approval.
    pub deliverables: Vec<Deliverable>,

    /// Approval records, one per deliverable.
    pub approvals: Vec<Approval>,

    /// Append-only activity log.
    pub events: Vec<OrderEvent>,

    /// Briefing material uploaded by the customer.
    pub assets: Vec<OrderAsset>,
}

/// A produced artifact awaiting approval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Deliverable {
    pub id: String,
    pub order_id: String,

    /// Display title, e.g. "Ad creative v1".
    pub title: String,

    /// Where the artifact can be previewed/downloaded.
    pub url: String,

    /// Ordering key for pending work (most recent first).
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

/// Decision state of an approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    /// Valid transitions are `Pending → {Approved, Rejected}` only.
    pub const fn is_decided(&self) -> bool {
        !matches!(self, ApprovalStatus::Pending)
    }
}

/// A customer decision on a deliverable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Approval {
    pub id: String,
    pub order_id: String,

    /// The deliverable this approval refers to. Always present in the
    /// same `OrderDetail`.
    pub deliverable_id: String,

    pub status: ApprovalStatus,

    /// Optional customer feedback text (usually on rejection).
    pub feedback: Option<String>,

    #[ts(as = "Option<String>")]
    pub decided_at: Option<DateTime<Utc>>,
}

/// An entry in an order's append-only activity log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct OrderEvent {
    pub id: String,
    pub order_id: String,

    /// Machine-readable event kind, e.g. "status_changed",
    /// "customer_note", "deliverable_ready".
    pub kind: String,

    /// Human-readable message shown in the timeline.
    pub message: String,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// Uploaded media metadata. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct OrderAsset {
    pub id: String,
    pub order_id: String,
    pub name: String,
    pub mime_type: String,
    pub size_bytes: i64,

    /// Asset category, e.g. "logo", "raw_footage", "reference".
    pub kind: String,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Wallet
// =============================================================================

/// Customer wallet and plan state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Wallet {
    /// Whether the customer has an active plan.
    pub plan_active: bool,

    /// Balance in cents. Never negative.
    pub balance_cents: i64,

    /// ISO 4217 currency code.
    pub currency: String,

    /// Smallest accepted top-up.
    pub min_topup_cents: i64,

    /// Suggested top-up shown by the wallet screen.
    pub recommended_topup_cents: i64,
}

impl Default for Wallet {
    fn default() -> Self {
        Wallet {
            plan_active: false,
            balance_cents: 0,
            currency: "BRL".to_string(),
            min_topup_cents: 1_000,
            recommended_topup_cents: 5_000,
        }
    }
}

// =============================================================================
// PIX Top-up
// =============================================================================

/// Status of a PIX payment intent. `Pending` is the only non-terminal
/// state; transitions are one-directional.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum TopupStatus {
    Pending,
    Approved,
    Failed,
    Expired,
}

impl TopupStatus {
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, TopupStatus::Pending)
    }
}

/// A PIX top-up payment intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Topup {
    pub id: String,
    pub status: TopupStatus,

    /// Amount to credit on approval, in cents.
    pub amount_cents: i64,

    /// PIX "copia e cola" payment string.
    pub copy_paste: String,

    /// Optional QR code image as a data URL.
    pub qr_image: Option<String>,

    #[ts(as = "Option<String>")]
    pub expires_at: Option<DateTime<Utc>>,

    /// Set when status is `Approved`.
    #[ts(as = "Option<String>")]
    pub approved_at: Option<DateTime<Utc>>,

    /// Set when status is `Failed`.
    pub failure_reason: Option<String>,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Contract Request / Result Shapes
// =============================================================================

/// Fields for creating a new draft order.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewOrder {
    pub order_type: OrderType,
    pub title: String,
    pub summary: String,
    #[ts(type = "unknown")]
    pub payload: serde_json::Value,
}

/// Partial update for a draft order. `None` fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct OrderPatch {
    pub title: Option<String>,
    pub summary: Option<String>,
    #[ts(type = "unknown | null")]
    pub payload: Option<serde_json::Value>,
    pub priority: Option<i32>,
}

/// A file handed to `upload_order_asset`.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AssetUpload {
    pub name: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub kind: String,
}

/// Outcome of `submit_order`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SubmitOutcome {
    /// Status the order landed in (`Queued` or `WaitingPayment`).
    pub status: OrderStatus,

    /// Set when status is `WaitingPayment`.
    pub reason: Option<WaitingReason>,

    /// Current wallet balance, reported when waiting on balance.
    pub balance_cents: Option<i64>,

    /// Amount the submission would have charged.
    pub required_cents: Option<i64>,
}

// =============================================================================
// Unit Tests
// =============================================================================
