//! Provider error translation layer.
//!
//! Maps the free-form text of a failed edit onto `EditFailureKind`. Matching
//! is by prefix, in the order of `PROVIDER_PATTERNS`.

use once_cell::sync::Lazy;
use regex::RegexSet;

/// Closed taxonomy of edit failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditFailureKind {
    /// Message id is malformed or stale.
    InvalidMessageId,
    /// Message exists but can no longer be edited.
    MessageNotEditable,
    MessageNotFound,
    ChatNotFound,
    /// New content equals the displayed content.
    NotModified,
    /// Anything unrecognized, treated as transient.
    Other,
}

impl EditFailureKind {
    /// Copy can never be edited again and should be forgotten.
    pub fn is_unreachable(self) -> bool {
        matches!(
            self,
            Self::InvalidMessageId
                | Self::MessageNotEditable
                | Self::MessageNotFound
                | Self::ChatNotFound
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidMessageId => "invalid_message_id",
            Self::MessageNotEditable => "message_not_editable",
            Self::MessageNotFound => "message_not_found",
            Self::ChatNotFound => "chat_not_found",
            Self::NotModified => "not_modified",
            Self::Other => "other",
        }
    }
}

const PROVIDER_PATTERNS: &[(&str, EditFailureKind)] = &[
    (r"^Message_id_invalid", EditFailureKind::InvalidMessageId),
    (r"^Message can't be edited", EditFailureKind::MessageNotEditable),
    (r"^Message to edit not found", EditFailureKind::MessageNotFound),
    (r"^Chat not found", EditFailureKind::ChatNotFound),
    (r"^Message is not modified", EditFailureKind::NotModified),
];

static PROVIDER_PATTERN_SET: Lazy<RegexSet> = Lazy::new(|| {
    RegexSet::new(PROVIDER_PATTERNS.iter().map(|(pattern, _)| *pattern))
        .expect("valid provider error patterns")
});

/// Classifies a provider error description.
pub fn classify_edit_failure(reason: &str) -> EditFailureKind {
    PROVIDER_PATTERN_SET
        .matches(reason)
        .iter()
        .next()
        .map_or(EditFailureKind::Other, |index| PROVIDER_PATTERNS[index].1)
}
