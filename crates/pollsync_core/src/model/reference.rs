//! Delivered message copies of a poll.

use crate::model::poll::PollId;
use serde::{Deserialize, Serialize};

/// Row id of a persisted reference.
pub type ReferenceId = i64;

/// How a delivered copy is addressed when editing it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ReferenceAddress {
    /// Copy living in the owner's admin chat.
    Admin { chat_id: i64, message_id: i64 },
    /// Copy shared through inline mode.
    Inline { inline_message_id: String },
}

impl ReferenceAddress {
    pub fn admin(chat_id: i64, message_id: i64) -> Self {
        Self::Admin {
            chat_id,
            message_id,
        }
    }

    pub fn inline(inline_message_id: impl Into<String>) -> Self {
        Self::Inline {
            inline_message_id: inline_message_id.into(),
        }
    }

    /// Short label for log lines. Never includes message content.
    pub fn mode(&self) -> &'static str {
        match self {
            Self::Admin { .. } => "admin",
            Self::Inline { .. } => "inline",
        }
    }
}

/// One persisted, addressable copy of a poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub id: ReferenceId,
    pub poll_id: PollId,
    pub address: ReferenceAddress,
}
