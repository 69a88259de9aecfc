//! Poll snapshot consumed by the fan-out engine.
//!
//! The poll itself is owned by the caller's persistence layer. The engine only
//! reads the settings that change how a reference is edited.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identifier of a poll.
pub type PollId = Uuid;

/// What the poll owner is currently expected to type, if anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpectedInput {
    /// Owner is not in any input flow.
    None,
    /// Owner is looking at the vote view of the admin message.
    #[default]
    Votes,
    /// Owner is adding a new option.
    NewOption,
    /// Owner is editing the poll title or description.
    Description,
}

/// Current settings of a poll, as loaded right before an update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Poll {
    pub id: PollId,
    /// Locale used for terminal notices.
    pub locale: String,
    /// Admin message currently shows the settings menu.
    ///
    /// While set, admin-surface copies are left untouched.
    pub in_settings: bool,
    /// Input flow of the owning user.
    #[serde(default)]
    pub owner_expected_input: ExpectedInput,
}

impl Poll {
    /// Creates a poll snapshot with default settings.
    pub fn new(id: PollId, locale: impl Into<String>) -> Self {
        Self {
            id,
            locale: locale.into(),
            in_settings: false,
            owner_expected_input: ExpectedInput::default(),
        }
    }

    /// Whether admin-surface copies should show the vote controls.
    ///
    /// Any other input flow means the owner is mid-interaction and gets the
    /// management layout instead.
    pub fn shows_vote_controls(&self) -> bool {
        self.owner_expected_input == ExpectedInput::Votes
    }
}

#[cfg(test)]
mod tests {
    use super::{ExpectedInput, Poll};
    use uuid::Uuid;

    #[test]
    fn fresh_and_deserialized_polls_show_vote_controls() {
        assert_eq!(ExpectedInput::default(), ExpectedInput::Votes);
        assert!(Poll::new(Uuid::nil(), "en").shows_vote_controls());

        let raw = format!(r#"{{"id":"{}","locale":"en","in_settings":false}}"#, Uuid::nil());
        let poll: Poll = serde_json::from_str(&raw).unwrap();
        assert!(poll.shows_vote_controls());
    }

    #[test]
    fn other_input_flows_use_management_layout() {
        let mut poll = Poll::new(Uuid::nil(), "en");
        for input in [
            ExpectedInput::None,
            ExpectedInput::NewOption,
            ExpectedInput::Description,
        ] {
            poll.owner_expected_input = input;
            assert!(!poll.shows_vote_controls());
        }
    }
}
