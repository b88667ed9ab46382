//! Bulk restore result and progress types.

use serde::{Deserialize, Serialize};

use crate::session::SessionId;

/// Terminal state of one restore unit. Exactly one variant per unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum RestoreOutcome {
    /// The session was resumed under a new id.
    #[serde(rename_all = "camelCase")]
    Success { new_session_id: SessionId },
    /// Ineligible, or the remote side reported an error.
    Failure { message: String },
    /// No answer before the unit deadline; the remote call may still succeed.
    TimedOut,
    /// The agent process exited and cannot be resumed. Archive, don't retry.
    RevivalFailed { message: String },
    /// Never started because the run was cancelled.
    Cancelled,
}

/// Result of restoring one archived session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreResult {
    pub original_session_id: SessionId,
    pub display_name: String,
    pub outcome: RestoreOutcome,
}

impl RestoreResult {
    #[must_use]
    pub const fn new(
        original_session_id: SessionId,
        display_name: String,
        outcome: RestoreOutcome,
    ) -> Self {
        Self {
            original_session_id,
            display_name,
            outcome,
        }
    }
}

/// Live aggregate of a bulk restore run.
///
/// `completed == succeeded + failed + timed_out + revival_failed` and
/// `results.len() == completed` hold for every published snapshot.
/// Cancelled units are counted in `cancelled_remaining` only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkProgress {
    pub total: usize,
    pub completed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub revival_failed: usize,
    pub cancelled_remaining: usize,
    /// Display name of the unit most recently started.
    pub current_item: Option<String>,
    /// Settled (non-cancelled) results, in arrival order.
    pub results: Vec<RestoreResult>,
}

impl BulkProgress {
    /// Fresh aggregate for a run of `total` units.
    #[must_use]
    pub fn started(total: usize) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    /// Fold one terminal result into the aggregate.
    pub fn record(&mut self, result: RestoreResult) {
        match result.outcome {
            RestoreOutcome::Cancelled => {
                self.cancelled_remaining += 1;
                return;
            }
            RestoreOutcome::Success { .. } => self.succeeded += 1,
            RestoreOutcome::Failure { .. } => self.failed += 1,
            RestoreOutcome::TimedOut => self.timed_out += 1,
            RestoreOutcome::RevivalFailed { .. } => self.revival_failed += 1,
        }
        self.completed += 1;
        self.results.push(result);
    }

    /// Whether the counters reconcile.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.completed == self.succeeded + self.failed + self.timed_out + self.revival_failed
            && self.results.len() == self.completed
            && self.completed + self.cancelled_remaining <= self.total
    }

    /// Whether every unit has reached a terminal state.
    #[must_use]
    pub const fn is_settled(&self) -> bool {
        self.completed + self.cancelled_remaining == self.total
    }
}
