//! Update ledger record and its per-window state.
//!
//! # Invariants
//! - `count` only increases.
//! - `sent` moves false -> true when a window is fulfilled and back to false
//!   when a later send must be deferred or has failed.
//! - `lease_until_ms` is set only while a send is in flight. A lease that
//!   outlives its send means the outcome was never recorded.

use crate::model::poll::PollId;
use serde::{Deserialize, Serialize};

/// Row id of a persisted update record.
pub type UpdateId = i64;

/// Scheduling state of one `(poll, window)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateRecord {
    pub id: UpdateId,
    pub poll_id: PollId,
    /// Inclusive window start in epoch milliseconds.
    pub window_start_ms: i64,
    /// Sends attributed to this window.
    pub count: u32,
    /// Whether the window's representative send has been performed.
    pub sent: bool,
    /// Expiry of the in-flight send lease in epoch milliseconds.
    pub lease_until_ms: Option<i64>,
}

/// Explicit form of the `(exists, sent)` pair stored in the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WindowState {
    /// No record exists yet for the window.
    NoWindow,
    /// A record exists and waits for a send (first or deferred).
    Pending(UpdateRecord),
    /// The window's representative send has been performed.
    Fulfilled(UpdateRecord),
}

impl WindowState {
    pub fn from_record(record: Option<UpdateRecord>) -> Self {
        match record {
            None => Self::NoWindow,
            Some(record) if record.sent => Self::Fulfilled(record),
            Some(record) => Self::Pending(record),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::NoWindow => "no_window",
            Self::Pending(_) => "pending",
            Self::Fulfilled(_) => "fulfilled",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{UpdateRecord, WindowState};
    use uuid::Uuid;

    fn record(sent: bool) -> UpdateRecord {
        UpdateRecord {
            id: 1,
            poll_id: Uuid::new_v4(),
            window_start_ms: 0,
            count: 0,
            sent,
            lease_until_ms: None,
        }
    }

    #[test]
    fn state_follows_sent_flag() {
        assert_eq!(WindowState::from_record(None), WindowState::NoWindow);
        assert!(matches!(
            WindowState::from_record(Some(record(false))),
            WindowState::Pending(_)
        ));
        assert!(matches!(
            WindowState::from_record(Some(record(true))),
            WindowState::Fulfilled(_)
        ));
    }
}
