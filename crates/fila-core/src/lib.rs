//! # fila-core
//!
//! Pure domain model for the Fila work-order queue: entity types, the
//! error taxonomy, and the versioned cache snapshot with its derived
//! read selectors.
//!
//! This crate performs no I/O of any kind. Everything here is plain
//! data plus pure functions, shared by the backend implementations and
//! the synchronization engine.

pub mod error;
pub mod snapshot;
pub mod types;

pub use error::{QueueError, QueueResult};
pub use snapshot::{CacheSnapshot, PendingApproval, SNAPSHOT_VERSION};
pub use types::{
    Approval, ApprovalStatus, AssetUpload, Deliverable, NewOrder, Order, OrderAsset, OrderDetail,
    OrderEvent, OrderPatch, OrderStatus, OrderType, SubmitOutcome, Topup, TopupStatus, Wallet,
    WaitingReason,
};
