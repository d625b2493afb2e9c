//! # Engine Status
//!
//! The observability DTO screens poll to render connection state:
//! which backend is active, whether a refresh is in flight, and the
//! last error or user-facing notice.

use chrono::{DateTime, Utc};
use serde::Serialize;
use ts_rs::TS;

/// Point-in-time view of the engine, assembled on demand.
#[derive(Debug, Clone, Serialize, TS)]
#[ts(export)]
pub struct QueueStatus {
    /// True once the first refresh cycle has completed (successfully
    /// or not) after hydration.
    pub ready: bool,

    /// True while a refresh cycle is in flight.
    pub refreshing: bool,

    /// Active backend: `"remote"` or `"simulator"`.
    pub backend: String,

    /// True once the engine has permanently fallen back to the
    /// simulator.
    pub fallback_active: bool,

    /// Message of the most recent failed refresh. Cleared by the next
    /// successful one.
    pub last_error: Option<String>,

    /// User-facing notice, e.g. that the queue is running locally.
    pub notice: Option<String>,

    /// When the snapshot was last assembled from a complete refresh.
    #[ts(as = "Option<String>")]
    pub last_sync: Option<DateTime<Utc>>,
}
