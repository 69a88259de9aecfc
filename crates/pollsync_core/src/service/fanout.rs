//! Reference fan-out and deletion synchronizers.
//!
//! # Responsibility
//! - Push a fresh render of a poll to every persisted reference.
//! - Replace every reference with the deletion notice when a poll is retired.
//! - Forget references the messaging API reports as permanently gone.
//!
//! # Invariants
//! - Every reference is attempted; one failing copy never blocks the others.
//! - Unclassified failures never delete a reference and are returned to the
//!   caller after the loop (the first one wins).
//! - "Not modified" responses count as success.
//! - Admin copies are skipped while the poll shows its settings menu.

use crate::model::poll::Poll;
use crate::model::reference::{Reference, ReferenceAddress, ReferenceId};
use crate::repo::reference_repo::{ReferenceRepository, SqliteReferenceRepository};
use crate::repo::RepoError;
use crate::transport::{
    EditFailureKind, LocaleProvider, RemoteEditError, RenderedPoll, Renderer, Transport,
    DELETED_POLL_KEY,
};
use log::{info, warn};
use rusqlite::Connection;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Per-call tally of reference outcomes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub edited: usize,
    /// Provider reported identical content.
    pub unchanged: usize,
    /// Not edited on purpose (settings capture, or already-invalid ids
    /// during deletion).
    pub skipped: usize,
    /// Deleted from storage as unreachable.
    pub removed: usize,
    /// Unclassified failures; the first is returned as the error.
    pub failed: usize,
}

/// Fan-out failure.
#[derive(Debug)]
pub enum SyncError {
    Repo(RepoError),
    RemoteEdit {
        reference_id: ReferenceId,
        source: RemoteEditError,
    },
}

impl Display for SyncError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Repo(err) => write!(f, "{err}"),
            Self::RemoteEdit {
                reference_id,
                source,
            } => write!(f, "reference {reference_id}: {source}"),
        }
    }
}

impl Error for SyncError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            Self::RemoteEdit { source, .. } => Some(source),
        }
    }
}

impl From<RepoError> for SyncError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

impl SyncError {
    /// Classified provider failure, if this is a remote edit error.
    pub fn edit_failure_kind(&self) -> Option<EditFailureKind> {
        match self {
            Self::RemoteEdit { source, .. } => Some(source.kind()),
            Self::Repo(_) => None,
        }
    }
}

/// Pushes the current render of `poll` to all of its references.
///
/// Unreachable references are deleted immediately, outside any caller
/// transaction.
pub fn sync_references<R, T>(
    conn: &Connection,
    poll: &Poll,
    renderer: &R,
    transport: &T,
    show_warning: bool,
) -> Result<SyncReport, SyncError>
where
    R: Renderer + ?Sized,
    T: Transport + ?Sized,
{
    let repo = SqliteReferenceRepository::new(conn);
    let references = repo.list_references(poll.id)?;

    let mut admin_render: Option<RenderedPoll> = None;
    let mut inline_render: Option<RenderedPoll> = None;
    let mut report = SyncReport::default();
    let mut first_error = None;

    for reference in &references {
        let outcome = match &reference.address {
            ReferenceAddress::Admin {
                chat_id,
                message_id,
            } => {
                if poll.in_settings {
                    report.skipped += 1;
                    continue;
                }
                let rendered = admin_render.get_or_insert_with(|| {
                    let mut rendered = renderer.render(poll, show_warning, true);
                    if !poll.shows_vote_controls() {
                        rendered.layout = renderer.management_layout(poll);
                    }
                    rendered
                });
                transport.edit_admin_message(
                    *chat_id,
                    *message_id,
                    &rendered.text,
                    Some(&rendered.layout),
                )
            }
            ReferenceAddress::Inline { inline_message_id } => {
                let rendered =
                    inline_render.get_or_insert_with(|| renderer.render(poll, show_warning, false));
                transport.edit_inline_message(
                    inline_message_id,
                    &rendered.text,
                    Some(&rendered.layout),
                )
            }
        };

        let Err(err) = outcome else {
            report.edited += 1;
            continue;
        };

        match err.kind() {
            kind if kind.is_unreachable() => {
                remove_reference(&repo, reference, kind)?;
                report.removed += 1;
            }
            EditFailureKind::NotModified => report.unchanged += 1,
            kind => {
                warn!(
                    "event=fanout_edit module=service status=error poll={} reference={} mode={} kind={}",
                    poll.id,
                    reference.id,
                    reference.address.mode(),
                    kind.as_str()
                );
                report.failed += 1;
                first_error.get_or_insert(SyncError::RemoteEdit {
                    reference_id: reference.id,
                    source: err,
                });
            }
        }
    }

    info!(
        "event=fanout module=service status={} poll={} warning={} edited={} unchanged={} skipped={} removed={} failed={}",
        if first_error.is_some() { "error" } else { "ok" },
        poll.id,
        show_warning,
        report.edited,
        report.unchanged,
        report.skipped,
        report.removed,
        report.failed
    );

    match first_error {
        Some(err) => Err(err),
        None => Ok(report),
    }
}

/// Replaces every reference of a retired poll with the deletion notice.
///
/// References stay in storage. Only invalid message ids are tolerated; any
/// other failure is returned after all references were attempted.
pub fn notify_deleted<T, L>(
    conn: &Connection,
    poll: &Poll,
    transport: &T,
    locale: &L,
) -> Result<SyncReport, SyncError>
where
    T: Transport + ?Sized,
    L: LocaleProvider + ?Sized,
{
    let references = SqliteReferenceRepository::new(conn).list_references(poll.id)?;
    let notice = locale.text(DELETED_POLL_KEY, &poll.locale);

    let mut report = SyncReport::default();
    let mut first_error = None;

    for reference in &references {
        let outcome = match &reference.address {
            ReferenceAddress::Admin {
                chat_id,
                message_id,
            } => transport.edit_admin_message(*chat_id, *message_id, &notice, None),
            ReferenceAddress::Inline { inline_message_id } => {
                transport.edit_inline_message(inline_message_id, &notice, None)
            }
        };

        match outcome {
            Ok(()) => report.edited += 1,
            Err(err) if err.kind() == EditFailureKind::InvalidMessageId => report.skipped += 1,
            Err(err) => {
                report.failed += 1;
                first_error.get_or_insert(SyncError::RemoteEdit {
                    reference_id: reference.id,
                    source: err,
                });
            }
        }
    }

    info!(
        "event=poll_deleted_notice module=service status={} poll={} edited={} skipped={} failed={}",
        if first_error.is_some() { "error" } else { "ok" },
        poll.id,
        report.edited,
        report.skipped,
        report.failed
    );

    match first_error {
        Some(err) => Err(err),
        None => Ok(report),
    }
}

fn remove_reference(
    repo: &SqliteReferenceRepository<'_>,
    reference: &Reference,
    kind: EditFailureKind,
) -> Result<(), SyncError> {
    match repo.delete_reference(reference.id) {
        // A concurrent fan-out observed the same failure first.
        Ok(()) | Err(RepoError::NotFound { .. }) => {}
        Err(err) => return Err(err.into()),
    }
    info!(
        "event=reference_removed module=service status=ok poll={} reference={} mode={} kind={}",
        reference.poll_id,
        reference.id,
        reference.address.mode(),
        kind.as_str()
    );
    Ok(())
}
