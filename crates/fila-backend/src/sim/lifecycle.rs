//! # Lifecycle Machine
//!
//! Pure phase-advancement rules for the simulator. No I/O and no wall
//! clock in here: callers pass `now` in, which keeps every rule
//! deterministic and testable with fixed timestamps.
//!
//! ## Phase Graph
//! ```text
//! draft ──submit──► queued ──15s──► producing ──45s──► done
//!   │                                  │
//!   └──submit (gated)──► awaiting_payment (re-submit to retry)
//!                                      │
//!                         paused ◄──pause/resume (ads only)
//! ```
//!
//! Catch-up is chained off the previous deadline, not off `now`, so a
//! simulator that was asleep for an hour replays the exact same
//! sequence it would have produced live.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use fila_core::OrderStatus;

// =============================================================================
// Delays
// =============================================================================

/// How long a queued order waits before production starts.
pub const QUEUE_PICKUP_DELAY: Duration = Duration::seconds(15);

/// How long production runs before the deliverable appears.
pub const PRODUCTION_DELAY: Duration = Duration::seconds(45);

/// How long a pending PIX top-up takes to auto-approve.
pub const TOPUP_APPROVE_DELAY: Duration = Duration::seconds(10);

/// How long a PIX top-up stays payable before it expires.
pub const TOPUP_EXPIRY: Duration = Duration::minutes(15);

// =============================================================================
// Phase
// =============================================================================

/// Internal simulator phase. Richer than the public [`OrderStatus`]:
/// `Paused` exists only here (the public status stays `in_progress`
/// while an ads publication is paused).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Draft,
    AwaitingPayment,
    Queued,
    Producing,
    Paused,
    Done,
    Cancelled,
}

impl Phase {
    /// The status reported to callers for this phase.
    pub const fn public_status(&self) -> OrderStatus {
        match self {
            Phase::Draft => OrderStatus::Draft,
            Phase::AwaitingPayment => OrderStatus::WaitingPayment,
            Phase::Queued => OrderStatus::Queued,
            // Paused is an internal distinction only.
            Phase::Producing | Phase::Paused => OrderStatus::InProgress,
            Phase::Done => OrderStatus::Completed,
            Phase::Cancelled => OrderStatus::Cancelled,
        }
    }

    pub const fn is_terminal(&self) -> bool {
        matches!(self, Phase::Done | Phase::Cancelled)
    }
}

// =============================================================================
// Transition
// =============================================================================

/// One time-driven step produced by [`advance`].
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    /// Phase the order moves into.
    pub phase: Phase,

    /// Public status for the new phase.
    pub status: OrderStatus,

    /// Deadline for the next automatic step, if any.
    pub due_at: Option<DateTime<Utc>>,

    /// Event kind appended to the order log.
    pub event_kind: &'static str,

    /// Event message appended to the order log.
    pub event_message: &'static str,

    /// Whether this step produces a deliverable (with its pending
    /// approval).
    pub emits_deliverable: bool,
}

/// Computes the next automatic transition for an order, if its
/// deadline has passed.
///
/// Returns `None` when the phase has no scheduled step (drafts, paused
/// and terminal orders, missing deadlines) or the deadline is still in
/// the future. Callers loop on this to catch up across multiple missed
/// deadlines.
pub fn advance(phase: Phase, due_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Option<Transition> {
    let due = due_at?;
    if now < due {
        return None;
    }

    match phase {
        Phase::Queued => Some(Transition {
            phase: Phase::Producing,
            status: OrderStatus::InProgress,
            due_at: Some(due + PRODUCTION_DELAY),
            event_kind: "status_changed",
            event_message: "Production started.",
            emits_deliverable: false,
        }),
        Phase::Producing => Some(Transition {
            phase: Phase::Done,
            status: OrderStatus::Completed,
            due_at: None,
            event_kind: "deliverable_ready",
            event_message: "Work is ready for your review.",
            emits_deliverable: true,
        }),
        // Paused orders hold until explicitly resumed; the rest have
        // no automatic steps.
        _ => None,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_nothing_before_deadline() {
        assert!(advance(Phase::Queued, Some(at(100)), at(99)).is_none());
    }

    #[test]
    fn test_queued_moves_to_producing_at_deadline() {
        let t = advance(Phase::Queued, Some(at(100)), at(100)).unwrap();
        assert_eq!(t.phase, Phase::Producing);
        assert_eq!(t.status, OrderStatus::InProgress);
        assert_eq!(t.due_at, Some(at(100) + PRODUCTION_DELAY));
        assert!(!t.emits_deliverable);
    }

    #[test]
    fn test_producing_completes_with_deliverable() {
        let t = advance(Phase::Producing, Some(at(100)), at(500)).unwrap();
        assert_eq!(t.phase, Phase::Done);
        assert_eq!(t.status, OrderStatus::Completed);
        assert_eq!(t.due_at, None);
        assert!(t.emits_deliverable);
        assert_eq!(t.event_kind, "deliverable_ready");
    }

    #[test]
    fn test_catch_up_chains_off_previous_deadline() {
        // An order queued at t=0 and observed an hour later must have
        // completed at exactly 15s + 45s, not relative to `now`.
        let much_later = at(3600);
        let first = advance(Phase::Queued, Some(at(0) + QUEUE_PICKUP_DELAY), much_later).unwrap();
        let second = advance(first.phase, first.due_at, much_later).unwrap();
        assert_eq!(second.phase, Phase::Done);
        assert_eq!(
            first.due_at,
            Some(at(0) + QUEUE_PICKUP_DELAY + PRODUCTION_DELAY)
        );
    }

    #[test]
    fn test_phases_without_scheduled_steps() {
        for phase in [
            Phase::Draft,
            Phase::AwaitingPayment,
            Phase::Paused,
            Phase::Done,
            Phase::Cancelled,
        ] {
            assert!(advance(phase, Some(at(0)), at(1000)).is_none(), "{:?}", phase);
        }
    }

    #[test]
    fn test_missing_deadline_never_advances() {
        assert!(advance(Phase::Queued, None, at(1000)).is_none());
    }

    #[test]
    fn test_paused_keeps_in_progress_status() {
        assert_eq!(Phase::Paused.public_status(), OrderStatus::InProgress);
        assert_eq!(Phase::Producing.public_status(), OrderStatus::InProgress);
    }
}
