//! Ledger maintenance command.
//!
//! # Responsibility
//! - Verify `pollsync_core` linkage and print its version.
//! - Open (and migrate) a ledger database and report pending windows.

use pollsync_core::db::{migrations::latest_version, open_db};
use pollsync_core::{core_version, SqliteUpdateRepository, UpdateRepository};
use std::process::ExitCode;

fn main() -> ExitCode {
    println!("pollsync_core version={}", core_version());

    let Some(db_path) = std::env::args().nth(1) else {
        return ExitCode::SUCCESS;
    };

    let conn = match open_db(&db_path) {
        Ok(conn) => conn,
        Err(err) => {
            eprintln!("failed to open `{db_path}`: {err}");
            return ExitCode::FAILURE;
        }
    };

    match SqliteUpdateRepository::new(&conn).count_pending() {
        Ok(pending) => {
            println!("schema_version={}", latest_version());
            println!("pending_windows={pending}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("failed to read update ledger: {err}");
            ExitCode::FAILURE
        }
    }
}
