#![allow(dead_code)]

use pollsync_core::{
    ControlButton, ControlLayout, LocaleProvider, Poll, PollId, PollSource, ReferenceAddress,
    RemoteEditError, RenderedPoll, Renderer, Transport,
};
use rusqlite::{params, Connection};
use std::collections::HashMap;
use std::sync::Mutex;

/// Window-aligned instant for 2 second windows.
pub const T0: i64 = 1_700_000_000_000;

pub struct TestRenderer;

impl Renderer for TestRenderer {
    fn render(&self, poll: &Poll, show_warning: bool, show_back: bool) -> RenderedPoll {
        RenderedPoll {
            text: format!("poll {} warning={show_warning} back={show_back}", poll.id),
            layout: layout("vote"),
        }
    }

    fn management_layout(&self, _poll: &Poll) -> ControlLayout {
        layout("manage")
    }
}

pub fn layout(label: &str) -> ControlLayout {
    ControlLayout {
        rows: vec![vec![ControlButton {
            label: label.to_string(),
            payload: label.to_string(),
        }]],
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit {
    pub address: ReferenceAddress,
    pub text: String,
    pub layout: Option<ControlLayout>,
}

/// Transport double recording successful edits and failing on demand.
#[derive(Default)]
pub struct RecordingTransport {
    edits: Mutex<Vec<Edit>>,
    failures: Mutex<HashMap<ReferenceAddress, String>>,
}

impl RecordingTransport {
    pub fn fail(&self, address: ReferenceAddress, reason: &str) {
        self.failures
            .lock()
            .unwrap()
            .insert(address, reason.to_string());
    }

    pub fn clear_failures(&self) {
        self.failures.lock().unwrap().clear();
    }

    pub fn edits(&self) -> Vec<Edit> {
        self.edits.lock().unwrap().clone()
    }

    pub fn edit_count(&self) -> usize {
        self.edits.lock().unwrap().len()
    }

    fn edit(
        &self,
        address: ReferenceAddress,
        text: &str,
        layout: Option<&ControlLayout>,
    ) -> Result<(), RemoteEditError> {
        if let Some(reason) = self.failures.lock().unwrap().get(&address) {
            return Err(RemoteEditError::new(reason.clone()));
        }
        self.edits.lock().unwrap().push(Edit {
            address,
            text: text.to_string(),
            layout: layout.cloned(),
        });
        Ok(())
    }
}

impl Transport for RecordingTransport {
    fn edit_admin_message(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
        layout: Option<&ControlLayout>,
    ) -> Result<(), RemoteEditError> {
        self.edit(ReferenceAddress::admin(chat_id, message_id), text, layout)
    }

    fn edit_inline_message(
        &self,
        inline_message_id: &str,
        text: &str,
        layout: Option<&ControlLayout>,
    ) -> Result<(), RemoteEditError> {
        self.edit(ReferenceAddress::inline(inline_message_id), text, layout)
    }
}

pub struct TestLocale;

impl LocaleProvider for TestLocale {
    fn text(&self, key: &str, locale: &str) -> String {
        format!("[{locale}] {key}")
    }
}

#[derive(Default)]
pub struct MapPollSource {
    pub polls: HashMap<PollId, Poll>,
}

impl MapPollSource {
    pub fn with(polls: &[&Poll]) -> Self {
        Self {
            polls: polls
                .iter()
                .map(|poll| (poll.id, (*poll).clone()))
                .collect(),
        }
    }
}

impl PollSource for MapPollSource {
    fn load_poll(&self, poll_id: PollId) -> Option<Poll> {
        self.polls.get(&poll_id).cloned()
    }
}

/// Writes a ledger row directly, bypassing the scheduler.
pub fn seed_window(conn: &Connection, poll_id: PollId, window_start_ms: i64, count: u32, sent: bool) {
    conn.execute(
        "INSERT INTO poll_updates (poll_uuid, window_start_ms, count, sent)
         VALUES (?1, ?2, ?3, ?4);",
        params![
            poll_id.to_string(),
            window_start_ms,
            count,
            i64::from(sent)
        ],
    )
    .unwrap();
}

pub fn ledger_rows(conn: &Connection, poll_id: PollId) -> i64 {
    conn.query_row(
        "SELECT COUNT(*) FROM poll_updates WHERE poll_uuid = ?1;",
        [poll_id.to_string()],
        |row| row.get(0),
    )
    .unwrap()
}
