//! Throttled update scheduler.
//!
//! # Responsibility
//! - Decide per update request whether a poll's references are edited now,
//!   deferred to the pending flush, or left alone because a flush is queued.
//! - Claim time windows race-safely across independent workers.
//! - Flush deferred windows once they have elapsed.
//!
//! # Invariants
//! - At most one ledger record exists per `(poll, window)`; the worker whose
//!   insert commits first owns the window's representative send.
//! - Ledger counters change only through id-keyed statements, each committed
//!   in its own IMMEDIATE transaction. No write lock is held during a send.
//! - A failed send leaves the window pending, then surfaces the error. Sends
//!   of existing windows run under a lease, so a window whose bookkeeping
//!   write failed becomes due again once the lease expires.

use crate::clock::{Clock, TimeWindow};
use crate::config::{ConfigError, ThrottleConfig};
use crate::model::poll::Poll;
use crate::model::update::{UpdateRecord, WindowState};
use crate::repo::update_repo::{SqliteUpdateRepository, UpdateRepository};
use crate::repo::{RepoError, RepoResult};
use crate::service::fanout::{self, SyncError, SyncReport};
use crate::service::governor::FloodDecision;
use crate::transport::{LocaleProvider, PollSource, Renderer, Transport};
use log::{debug, error, info, warn};
use rusqlite::{Connection, TransactionBehavior};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Branch taken by one `request_update` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Created the window and performed its representative send.
    WindowSent { warning: bool },
    /// Created the window over the flood threshold; left pending for the flush.
    WindowDeferred,
    /// Another worker created the window first; its send covers this request.
    WindowAdopted,
    /// Sent again inside an already fulfilled window.
    Resent { warning: bool },
    /// Over the flood threshold; window flipped back to pending.
    Deferred,
    /// A deferred flush is already queued for the window.
    AlreadyPending,
}

impl UpdateOutcome {
    /// Whether this call edited references.
    pub fn sent(self) -> bool {
        matches!(self, Self::WindowSent { .. } | Self::Resent { .. })
    }
}

/// Tally of one `flush_pending` pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub flushed: usize,
    pub failed: usize,
    /// Poll no longer exists; the record stays fulfilled.
    pub orphaned: usize,
    /// Another sweeper won the record.
    pub already_claimed: usize,
}

enum FlushStep {
    Flushed,
    AlreadyClaimed,
    Orphaned,
}

/// Scheduler error.
#[derive(Debug)]
pub enum UpdateError {
    Repo(RepoError),
    Sync(SyncError),
    /// A send failed and the window could not be flipped back to pending.
    PendingNotRecorded { send: SyncError, ledger: RepoError },
}

impl UpdateError {
    /// The failed send behind this error, if any.
    pub fn send_error(&self) -> Option<&SyncError> {
        match self {
            Self::Repo(_) => None,
            Self::Sync(send) | Self::PendingNotRecorded { send, .. } => Some(send),
        }
    }
}

impl Display for UpdateError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Repo(err) => write!(f, "{err}"),
            Self::Sync(err) => write!(f, "{err}"),
            Self::PendingNotRecorded { send, ledger } => write!(
                f,
                "{send}; window not marked pending, retried after lease expiry: {ledger}"
            ),
        }
    }
}

impl Error for UpdateError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            Self::Sync(err) => Some(err),
            Self::PendingNotRecorded { send, .. } => Some(send),
        }
    }
}

impl From<RepoError> for UpdateError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

impl From<rusqlite::Error> for UpdateError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Repo(value.into())
    }
}

impl From<SyncError> for UpdateError {
    fn from(value: SyncError) -> Self {
        Self::Sync(value)
    }
}

/// Update scheduler bound to one worker connection.
///
/// Workers coordinate only through the database, so any number of services
/// may run in parallel over separate connections to the same file.
pub struct UpdateService<'conn, C: Clock> {
    conn: &'conn mut Connection,
    config: ThrottleConfig,
    clock: C,
}

impl<'conn, C: Clock> UpdateService<'conn, C> {
    /// Creates a scheduler after validating `config`.
    pub fn try_new(
        conn: &'conn mut Connection,
        config: ThrottleConfig,
        clock: C,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            conn,
            config,
            clock,
        })
    }

    pub fn config(&self) -> &ThrottleConfig {
        &self.config
    }

    /// Handles one "poll changed" signal.
    ///
    /// Safe to call concurrently for the same poll from any number of workers.
    ///
    /// # Errors
    /// - `UpdateError::Sync` when an edit failed in a way that may be
    ///   transient. The window is left pending before the error is returned.
    /// - `UpdateError::PendingNotRecorded` when an edit failed and the
    ///   pending flag could not be written either.
    /// - `UpdateError::Repo` for storage failures.
    pub fn request_update<R, T>(
        &mut self,
        poll: &Poll,
        renderer: &R,
        transport: &T,
    ) -> Result<UpdateOutcome, UpdateError>
    where
        R: Renderer + ?Sized,
        T: Transport + ?Sized,
    {
        let window = self.current_window();
        let ledger = self.ledger();
        let recent_count = ledger.recent_count(poll.id, window.horizon_ms)?;
        let state = ledger.window_state(poll.id, window.start_ms)?;
        let decision = FloodDecision::decide(recent_count, self.config.flood_threshold);

        debug!(
            "event=update_request module=service poll={} window={} state={} recent_count={} decision={}",
            poll.id,
            window.start_ms,
            state.label(),
            recent_count,
            decision.as_str()
        );

        match state {
            WindowState::NoWindow => self.open_window(poll, window, decision, renderer, transport),
            WindowState::Fulfilled(record) => {
                self.resend(poll, &record, decision, renderer, transport)
            }
            WindowState::Pending(_) => Ok(UpdateOutcome::AlreadyPending),
        }
    }

    /// Replaces every reference of a retired poll with the deletion notice.
    ///
    /// Does not touch the ledger.
    pub fn notify_deleted<T, L>(
        &self,
        poll: &Poll,
        transport: &T,
        locale: &L,
    ) -> Result<SyncReport, UpdateError>
    where
        T: Transport + ?Sized,
        L: LocaleProvider + ?Sized,
    {
        Ok(fanout::notify_deleted(&*self.conn, poll, transport, locale)?)
    }

    /// Performs one send per due record whose window has elapsed.
    ///
    /// Covers windows deferred by the governor, windows whose send failed and
    /// windows whose in-flight lease expired without a recorded outcome. Each
    /// record is claimed with a compare-and-swap, so parallel sweepers flush
    /// it once. Every due record is attempted; the first failure is returned
    /// afterwards.
    pub fn flush_pending<P, R, T>(
        &mut self,
        polls: &P,
        renderer: &R,
        transport: &T,
    ) -> Result<FlushReport, UpdateError>
    where
        P: PollSource + ?Sized,
        R: Renderer + ?Sized,
        T: Transport + ?Sized,
    {
        let now_ms = self.clock.now_ms();
        let window = TimeWindow::containing(now_ms, self.config.window_size_seconds);
        let lease_until_ms = now_ms.saturating_add(self.config.flush_lease_ms());
        let due = self.ledger().list_due_pending(window.start_ms, now_ms)?;
        let mut report = FlushReport::default();
        let mut first_error = None;

        for record in due {
            let step =
                self.flush_record(&record, now_ms, lease_until_ms, polls, renderer, transport);
            match step {
                Ok(FlushStep::Flushed) => report.flushed += 1,
                Ok(FlushStep::AlreadyClaimed) => report.already_claimed += 1,
                Ok(FlushStep::Orphaned) => report.orphaned += 1,
                Err(err) => {
                    warn!(
                        "event=pending_flush module=service status=record_error poll={} window={} record={} error={}",
                        record.poll_id, record.window_start_ms, record.id, err
                    );
                    report.failed += 1;
                    first_error.get_or_insert(err);
                }
            }
        }

        info!(
            "event=pending_flush module=service status={} flushed={} failed={} orphaned={} already_claimed={}",
            if first_error.is_some() { "error" } else { "ok" },
            report.flushed,
            report.failed,
            report.orphaned,
            report.already_claimed
        );

        match first_error {
            Some(err) => Err(err),
            None => Ok(report),
        }
    }

    fn flush_record<P, R, T>(
        &mut self,
        record: &UpdateRecord,
        now_ms: i64,
        lease_until_ms: i64,
        polls: &P,
        renderer: &R,
        transport: &T,
    ) -> Result<FlushStep, UpdateError>
    where
        P: PollSource + ?Sized,
        R: Renderer + ?Sized,
        T: Transport + ?Sized,
    {
        if !self.write(|ledger| ledger.claim_pending(record.id, now_ms, lease_until_ms))? {
            return Ok(FlushStep::AlreadyClaimed);
        }

        let Some(poll) = polls.load_poll(record.poll_id) else {
            warn!(
                "event=pending_flush module=service status=orphaned poll={} window={}",
                record.poll_id, record.window_start_ms
            );
            self.write(|ledger| ledger.release_lease(record.id))?;
            return Ok(FlushStep::Orphaned);
        };

        match fanout::sync_references(&*self.conn, &poll, renderer, transport, false) {
            Ok(_) => {
                self.write(|ledger| ledger.increment_count(record.id))?;
                Ok(FlushStep::Flushed)
            }
            Err(err) => Err(self.return_to_pending(record, err)),
        }
    }

    fn open_window<R, T>(
        &mut self,
        poll: &Poll,
        window: TimeWindow,
        decision: FloodDecision,
        renderer: &R,
        transport: &T,
    ) -> Result<UpdateOutcome, UpdateError>
    where
        R: Renderer + ?Sized,
        T: Transport + ?Sized,
    {
        let record = match self.write(|ledger| ledger.insert_window(poll.id, window.start_ms)) {
            Ok(record) => record,
            Err(RepoError::WindowAlreadyClaimed { .. }) => {
                let adopted = self.adopt_window(poll, window)?;
                info!(
                    "event=window_race_lost module=service status=ok poll={} window={} record={} sent={}",
                    poll.id, window.start_ms, adopted.id, adopted.sent
                );
                return Ok(UpdateOutcome::WindowAdopted);
            }
            Err(err) => return Err(err.into()),
        };

        if decision == FloodDecision::Defer {
            info!(
                "event=update_request module=service status=deferred poll={} window={} record={}",
                poll.id, window.start_ms, record.id
            );
            return Ok(UpdateOutcome::WindowDeferred);
        }

        let warning = decision.shows_warning();
        let synced = fanout::sync_references(&*self.conn, poll, renderer, transport, warning);
        if let Err(err) = synced {
            // The record was committed with `sent = 0`; the flush retries it.
            error!(
                "event=update_request module=service status=error poll={} window={} record={} error={}",
                poll.id, window.start_ms, record.id, err
            );
            return Err(err.into());
        }

        self.write(|ledger| ledger.record_send(record.id))?;
        Ok(UpdateOutcome::WindowSent { warning })
    }

    fn resend<R, T>(
        &mut self,
        poll: &Poll,
        record: &UpdateRecord,
        decision: FloodDecision,
        renderer: &R,
        transport: &T,
    ) -> Result<UpdateOutcome, UpdateError>
    where
        R: Renderer + ?Sized,
        T: Transport + ?Sized,
    {
        if decision == FloodDecision::Defer {
            self.write(|ledger| ledger.mark_pending(record.id))?;
            info!(
                "event=update_request module=service status=deferred poll={} window={} record={}",
                poll.id, record.window_start_ms, record.id
            );
            return Ok(UpdateOutcome::Deferred);
        }

        // Until the outcome is recorded, the lease keeps the window recoverable.
        let lease_until_ms = self
            .clock
            .now_ms()
            .saturating_add(self.config.flush_lease_ms());
        self.write(|ledger| ledger.arm_lease(record.id, lease_until_ms))?;

        let warning = decision.shows_warning();
        match fanout::sync_references(&*self.conn, poll, renderer, transport, warning) {
            Ok(_) => {
                self.write(|ledger| ledger.increment_count(record.id))?;
                Ok(UpdateOutcome::Resent { warning })
            }
            Err(err) => {
                error!(
                    "event=update_request module=service status=error poll={} window={} record={} error={}",
                    poll.id, record.window_start_ms, record.id, err
                );
                Err(self.return_to_pending(record, err))
            }
        }
    }

    /// Flips a window back to pending after a failed send.
    ///
    /// When the flip itself fails, the send error is kept alongside the store
    /// error and the record keeps its lease until it expires.
    fn return_to_pending(&mut self, record: &UpdateRecord, send: SyncError) -> UpdateError {
        match self.write(|ledger| ledger.mark_pending(record.id)) {
            Ok(()) => UpdateError::Sync(send),
            Err(ledger) => {
                error!(
                    "event=mark_pending module=service status=error poll={} window={} record={} error={}",
                    record.poll_id, record.window_start_ms, record.id, ledger
                );
                UpdateError::PendingNotRecorded { send, ledger }
            }
        }
    }

    fn adopt_window(&self, poll: &Poll, window: TimeWindow) -> Result<UpdateRecord, UpdateError> {
        self.ledger()
            .find_window(poll.id, window.start_ms)?
            .ok_or_else(|| {
                UpdateError::Repo(RepoError::InvalidData(format!(
                    "update window {} of poll {} missing after unique violation",
                    window.start_ms, poll.id
                )))
            })
    }

    fn current_window(&self) -> TimeWindow {
        TimeWindow::containing(self.clock.now_ms(), self.config.window_size_seconds)
    }

    fn ledger(&self) -> SqliteUpdateRepository<'_> {
        SqliteUpdateRepository::new(&*self.conn)
    }

    /// Runs `op` inside its own IMMEDIATE transaction.
    ///
    /// Dropping the transaction on error rolls it back.
    fn write<V>(
        &mut self,
        op: impl FnOnce(&SqliteUpdateRepository<'_>) -> RepoResult<V>,
    ) -> RepoResult<V> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = op(&SqliteUpdateRepository::new(&tx))?;
        tx.commit()?;
        Ok(value)
    }
}
