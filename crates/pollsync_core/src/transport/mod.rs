//! Collaborator contracts at the messaging boundary.
//!
//! # Responsibility
//! - Declare what the engine needs from rendering, the messaging API,
//!   localization and poll persistence.
//! - Translate provider error text into a closed failure taxonomy.
//!
//! # Invariants
//! - Nothing outside `classify` inspects provider error wording.

use crate::model::poll::{Poll, PollId};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod classify;

pub use classify::{classify_edit_failure, EditFailureKind};

/// Locale key of the notice that replaces a deleted poll.
pub const DELETED_POLL_KEY: &str = "deleted.poll";

/// One interactive button.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlButton {
    pub label: String,
    pub payload: String,
}

/// Interactive control layout attached to an edited message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlLayout {
    pub rows: Vec<Vec<ControlButton>>,
}

/// Text and controls for one message edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedPoll {
    pub text: String,
    pub layout: ControlLayout,
}

/// Turns poll state into display text and controls. Must be deterministic.
pub trait Renderer {
    fn render(&self, poll: &Poll, show_warning: bool, show_back: bool) -> RenderedPoll;
    /// Layout shown on the admin copy while the owner is mid-interaction.
    fn management_layout(&self, poll: &Poll) -> ControlLayout;
}

/// Failure reported by the messaging API for one edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEditError {
    /// Provider-defined description.
    pub reason: String,
}

impl RemoteEditError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> EditFailureKind {
        classify_edit_failure(&self.reason)
    }
}

impl Display for RemoteEditError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "remote edit failed: {}", self.reason)
    }
}

impl Error for RemoteEditError {}

/// Outbound message edits.
pub trait Transport {
    /// Edits a copy in the owner's admin chat.
    fn edit_admin_message(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
        layout: Option<&ControlLayout>,
    ) -> Result<(), RemoteEditError>;

    /// Edits a copy shared through inline mode.
    fn edit_inline_message(
        &self,
        inline_message_id: &str,
        text: &str,
        layout: Option<&ControlLayout>,
    ) -> Result<(), RemoteEditError>;
}

/// Localized string lookup.
pub trait LocaleProvider {
    fn text(&self, key: &str, locale: &str) -> String;
}

/// Loads the current poll snapshot for out-of-band flushes.
pub trait PollSource {
    /// Returns `None` when the poll no longer exists.
    fn load_poll(&self, poll_id: PollId) -> Option<Poll>;
}
