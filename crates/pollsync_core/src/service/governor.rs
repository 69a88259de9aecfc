//! Flood governor.
//!
//! Stateless decision over the trailing send volume of one poll. All state
//! lives in the update ledger.

use std::cmp::Ordering;

/// What to do with an update request given recent send volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloodDecision {
    Send,
    /// This send reaches the threshold; tell readers further updates may lag.
    SendWithWarning,
    Defer,
}

impl FloodDecision {
    /// `recent_count` below the threshold sends, equal sends with a warning,
    /// above defers.
    pub fn decide(recent_count: u64, flood_threshold: u32) -> Self {
        match recent_count.cmp(&u64::from(flood_threshold)) {
            Ordering::Less => Self::Send,
            Ordering::Equal => Self::SendWithWarning,
            Ordering::Greater => Self::Defer,
        }
    }

    pub fn shows_warning(self) -> bool {
        self == Self::SendWithWarning
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Send => "send",
            Self::SendWithWarning => "send_with_warning",
            Self::Defer => "defer",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::FloodDecision;

    #[test]
    fn threshold_boundaries() {
        assert_eq!(FloodDecision::decide(0, 60), FloodDecision::Send);
        assert_eq!(FloodDecision::decide(59, 60), FloodDecision::Send);
        assert_eq!(FloodDecision::decide(60, 60), FloodDecision::SendWithWarning);
        assert_eq!(FloodDecision::decide(61, 60), FloodDecision::Defer);
    }

    #[test]
    fn zero_threshold_warns_on_first_send() {
        assert_eq!(FloodDecision::decide(0, 0), FloodDecision::SendWithWarning);
        assert_eq!(FloodDecision::decide(1, 0), FloodDecision::Defer);
    }

    #[test]
    fn only_warning_decision_shows_warning() {
        assert!(FloodDecision::SendWithWarning.shows_warning());
        assert!(!FloodDecision::Send.shows_warning());
        assert!(!FloodDecision::Defer.shows_warning());
    }
}
