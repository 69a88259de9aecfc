//! Update throttling and fan-out engine for polls.
//!
//! Decides whether a poll change is sent now, deferred or coalesced, and
//! pushes fresh renders to every delivered copy of the poll. Workers share
//! nothing but the SQLite store.

pub mod clock;
pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;
pub mod transport;

pub use clock::{Clock, ManualClock, SystemClock, TimeWindow, FLOOD_HORIZON_SECONDS};
pub use config::{ConfigError, ThrottleConfig};
pub use logging::{init_logging, logging_status, LoggingError};
pub use model::poll::{ExpectedInput, Poll, PollId};
pub use model::reference::{Reference, ReferenceAddress, ReferenceId};
pub use model::update::{UpdateId, UpdateRecord, WindowState};
pub use repo::reference_repo::{ReferenceRepository, SqliteReferenceRepository};
pub use repo::update_repo::{SqliteUpdateRepository, UpdateRepository};
pub use repo::{RepoError, RepoResult};
pub use service::fanout::{notify_deleted, sync_references, SyncError, SyncReport};
pub use service::governor::FloodDecision;
pub use service::update_service::{FlushReport, UpdateError, UpdateOutcome, UpdateService};
pub use transport::{
    classify_edit_failure, ControlButton, ControlLayout, EditFailureKind, LocaleProvider,
    PollSource, RemoteEditError, RenderedPoll, Renderer, Transport, DELETED_POLL_KEY,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
