mod common;

use common::{layout, RecordingTransport, TestLocale, TestRenderer};
use pollsync_core::db::open_db_in_memory;
use pollsync_core::{
    notify_deleted, sync_references, EditFailureKind, ExpectedInput, Poll, ReferenceAddress,
    ReferenceRepository, SqliteReferenceRepository, SyncError, SyncReport,
};
use rusqlite::Connection;
use uuid::Uuid;

fn setup(addresses: &[ReferenceAddress]) -> (Connection, Poll) {
    let conn = open_db_in_memory().unwrap();
    let poll = Poll::new(Uuid::new_v4(), "en");
    {
        let repo = SqliteReferenceRepository::new(&conn);
        for address in addresses {
            repo.create_reference(poll.id, address).unwrap();
        }
    }
    (conn, poll)
}

fn remaining(conn: &Connection, poll: &Poll) -> Vec<ReferenceAddress> {
    SqliteReferenceRepository::new(conn)
        .list_references(poll.id)
        .unwrap()
        .into_iter()
        .map(|reference| reference.address)
        .collect()
}

#[test]
fn edits_admin_and_inline_copies_with_their_render() {
    let admin = ReferenceAddress::admin(10, 20);
    let inline = ReferenceAddress::inline("inline-1");
    let (conn, poll) = setup(&[admin.clone(), inline.clone()]);
    let transport = RecordingTransport::default();

    let report = sync_references(&conn, &poll, &TestRenderer, &transport, false).unwrap();
    assert_eq!(
        report,
        SyncReport {
            edited: 2,
            ..SyncReport::default()
        }
    );

    let edits = transport.edits();
    assert_eq!(edits[0].address, admin);
    assert!(edits[0].text.ends_with("warning=false back=true"));
    assert_eq!(edits[0].layout, Some(layout("vote")));
    assert_eq!(edits[1].address, inline);
    assert!(edits[1].text.ends_with("warning=false back=false"));
}

#[test]
fn warning_flag_reaches_every_render() {
    let (conn, poll) = setup(&[
        ReferenceAddress::admin(1, 1),
        ReferenceAddress::inline("a"),
    ]);
    let transport = RecordingTransport::default();

    sync_references(&conn, &poll, &TestRenderer, &transport, true).unwrap();
    assert!(transport
        .edits()
        .iter()
        .all(|edit| edit.text.contains("warning=true")));
}

#[test]
fn admin_copy_uses_management_layout_while_owner_is_mid_interaction() {
    let (conn, mut poll) = setup(&[ReferenceAddress::admin(1, 1), ReferenceAddress::inline("a")]);
    poll.owner_expected_input = ExpectedInput::NewOption;
    let transport = RecordingTransport::default();

    sync_references(&conn, &poll, &TestRenderer, &transport, false).unwrap();

    let edits = transport.edits();
    assert_eq!(edits[0].layout, Some(layout("manage")));
    assert_eq!(edits[1].layout, Some(layout("vote")));
}

#[test]
fn admin_copy_is_skipped_while_settings_are_open() {
    let inline = ReferenceAddress::inline("a");
    let (conn, mut poll) = setup(&[ReferenceAddress::admin(1, 1), inline.clone()]);
    poll.in_settings = true;
    let transport = RecordingTransport::default();

    let report = sync_references(&conn, &poll, &TestRenderer, &transport, false).unwrap();
    assert_eq!(report.edited, 1);
    assert_eq!(report.skipped, 1);
    assert_eq!(transport.edits()[0].address, inline);
    assert_eq!(remaining(&conn, &poll).len(), 2);
}

#[test]
fn chat_not_found_removes_reference_from_future_fanouts() {
    let gone = ReferenceAddress::admin(99, 1);
    let kept = ReferenceAddress::inline("kept");
    let (conn, poll) = setup(&[gone.clone(), kept.clone()]);
    let transport = RecordingTransport::default();
    transport.fail(gone.clone(), "Chat not found");

    let report = sync_references(&conn, &poll, &TestRenderer, &transport, false).unwrap();
    assert_eq!(report.removed, 1);
    assert_eq!(report.edited, 1);
    assert_eq!(remaining(&conn, &poll), vec![kept.clone()]);

    transport.clear_failures();
    sync_references(&conn, &poll, &TestRenderer, &transport, false).unwrap();
    assert!(transport.edits().iter().all(|edit| edit.address != gone));
    assert_eq!(transport.edit_count(), 2);
}

#[test]
fn not_modified_is_success_without_state_change() {
    let address = ReferenceAddress::inline("same");
    let (conn, poll) = setup(&[address.clone()]);
    let transport = RecordingTransport::default();
    transport.fail(
        address.clone(),
        "Message is not modified: specified new message content and reply markup are exactly the same",
    );

    let report = sync_references(&conn, &poll, &TestRenderer, &transport, false).unwrap();
    assert_eq!(report.unchanged, 1);
    assert_eq!(report.removed, 0);
    assert_eq!(remaining(&conn, &poll), vec![address]);
}

#[test]
fn one_invalid_inline_id_among_three_references() {
    let broken = ReferenceAddress::inline("broken");
    let (conn, poll) = setup(&[
        ReferenceAddress::admin(1, 1),
        broken.clone(),
        ReferenceAddress::inline("ok"),
    ]);
    let transport = RecordingTransport::default();
    transport.fail(broken.clone(), "Message_id_invalid");

    let report = sync_references(&conn, &poll, &TestRenderer, &transport, false).unwrap();
    assert_eq!(report.edited, 2);
    assert_eq!(report.removed, 1);
    assert_eq!(transport.edit_count(), 2);
    assert!(!remaining(&conn, &poll).contains(&broken));
}

#[test]
fn unclassified_failure_propagates_after_siblings_and_keeps_reference() {
    let flaky = ReferenceAddress::inline("flaky");
    let (conn, poll) = setup(&[flaky.clone(), ReferenceAddress::inline("ok")]);
    let transport = RecordingTransport::default();
    transport.fail(flaky.clone(), "Too Many Requests: retry after 5");

    let err = sync_references(&conn, &poll, &TestRenderer, &transport, false).unwrap_err();
    assert_eq!(err.edit_failure_kind(), Some(EditFailureKind::Other));
    assert!(matches!(err, SyncError::RemoteEdit { .. }));

    assert_eq!(transport.edit_count(), 1);
    assert_eq!(remaining(&conn, &poll).len(), 2);
}

#[test]
fn deletion_notice_replaces_every_copy_and_keeps_rows() {
    let admin = ReferenceAddress::admin(5, 6);
    let inline = ReferenceAddress::inline("i");
    let (conn, mut poll) = setup(&[admin.clone(), inline.clone()]);
    poll.locale = "de".to_string();
    poll.in_settings = true;
    let transport = RecordingTransport::default();

    let report = notify_deleted(&conn, &poll, &transport, &TestLocale).unwrap();
    assert_eq!(report.edited, 2);

    let edits = transport.edits();
    assert_eq!(edits[0].address, admin);
    assert_eq!(edits[1].address, inline);
    for edit in &edits {
        assert_eq!(edit.text, "[de] deleted.poll");
        assert_eq!(edit.layout, None);
    }
    assert_eq!(remaining(&conn, &poll).len(), 2);
}

#[test]
fn deletion_swallows_only_invalid_message_id() {
    let invalid = ReferenceAddress::inline("invalid");
    let limited = ReferenceAddress::admin(1, 1);
    let (conn, poll) = setup(&[invalid.clone(), limited.clone(), ReferenceAddress::inline("ok")]);
    let transport = RecordingTransport::default();
    transport.fail(invalid, "Message_id_invalid");
    transport.fail(limited, "Too Many Requests: rate limited");

    let err = notify_deleted(&conn, &poll, &transport, &TestLocale).unwrap_err();
    assert!(matches!(err, SyncError::RemoteEdit { .. }));
    assert_eq!(transport.edit_count(), 1);
    assert_eq!(remaining(&conn, &poll).len(), 3);
}

#[test]
fn deletion_does_not_remove_unreachable_copies() {
    let gone = ReferenceAddress::admin(1, 1);
    let (conn, poll) = setup(&[gone.clone()]);
    let transport = RecordingTransport::default();
    transport.fail(gone, "Chat not found");

    let err = notify_deleted(&conn, &poll, &transport, &TestLocale).unwrap_err();
    assert_eq!(err.edit_failure_kind(), Some(EditFailureKind::ChatNotFound));
    assert_eq!(remaining(&conn, &poll).len(), 1);
}
