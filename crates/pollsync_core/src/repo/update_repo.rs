//! Update ledger contracts and SQLite implementation.
//!
//! # Responsibility
//! - Store one scheduling record per `(poll, window)`.
//! - Provide the aggregate and conditional statements the scheduler composes
//!   inside its own transaction boundaries.
//!
//! # Invariants
//! - `UNIQUE(poll_uuid, window_start_ms)` decides which worker creates a
//!   window; losers see `RepoError::WindowAlreadyClaimed`.
//! - Every mutation is a single `UPDATE ... WHERE id = ?` so concurrent
//!   workers holding the same logical record never overwrite each other.
//! - Methods never open transactions themselves. Construct the repository on
//!   a `Transaction` to group statements.
//! - Recording a send outcome clears the in-flight lease; a window whose lease
//!   expired is due again even though `sent = 1`.

use crate::model::poll::PollId;
use crate::model::update::{UpdateId, UpdateRecord, WindowState};
use crate::repo::{parse_poll_uuid, RepoError, RepoResult};
use rusqlite::{named_params, params, Connection, ErrorCode, Params, Row};

const UPDATE_SELECT_SQL: &str = "SELECT
    id,
    poll_uuid,
    window_start_ms,
    count,
    sent,
    lease_until_ms
FROM poll_updates";

const DUE_CONDITION_SQL: &str = "(sent = 0
        OR (lease_until_ms IS NOT NULL AND lease_until_ms <= :now_ms))";

/// Repository interface for the update ledger.
pub trait UpdateRepository {
    /// Gets the record of one window.
    fn find_window(&self, poll_id: PollId, window_start_ms: i64)
        -> RepoResult<Option<UpdateRecord>>;
    /// Sums `count` over windows starting at or after `horizon_ms`.
    fn recent_count(&self, poll_id: PollId, horizon_ms: i64) -> RepoResult<u64>;
    /// Creates a pending record with `count = 0`.
    fn insert_window(&self, poll_id: PollId, window_start_ms: i64) -> RepoResult<UpdateRecord>;
    /// Attributes one send to the window and marks it fulfilled.
    fn record_send(&self, id: UpdateId) -> RepoResult<()>;
    /// Attributes one send to the window without touching `sent`.
    fn increment_count(&self, id: UpdateId) -> RepoResult<()>;
    /// Marks a window as waiting for a deferred flush.
    fn mark_pending(&self, id: UpdateId) -> RepoResult<()>;
    /// Takes a due record for flushing: sets `sent` and a lease expiring at
    /// `lease_until_ms`. Returns `false` when another worker holds it.
    fn claim_pending(&self, id: UpdateId, now_ms: i64, lease_until_ms: i64) -> RepoResult<bool>;
    /// Sets the in-flight lease of a fulfilled window before resending it.
    fn arm_lease(&self, id: UpdateId, lease_until_ms: i64) -> RepoResult<()>;
    /// Drops the lease without recording a send.
    fn release_lease(&self, id: UpdateId) -> RepoResult<()>;
    /// Lists records of windows starting before `before_ms` that are pending
    /// or whose lease expired at `now_ms`.
    fn list_due_pending(&self, before_ms: i64, now_ms: i64) -> RepoResult<Vec<UpdateRecord>>;
    fn count_pending(&self) -> RepoResult<u64>;

    fn window_state(&self, poll_id: PollId, window_start_ms: i64) -> RepoResult<WindowState> {
        Ok(WindowState::from_record(
            self.find_window(poll_id, window_start_ms)?,
        ))
    }
}

/// SQLite-backed update ledger.
pub struct SqliteUpdateRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteUpdateRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    fn update_by_id<P: Params>(&self, sql: &str, id: UpdateId, args: P) -> RepoResult<usize> {
        let changed = self.conn.execute(sql, args)?;
        if changed == 0 && !self.exists(id)? {
            return Err(RepoError::NotFound {
                table: "poll_updates",
                id,
            });
        }
        Ok(changed)
    }

    fn exists(&self, id: UpdateId) -> RepoResult<bool> {
        let exists: i64 = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM poll_updates WHERE id = ?1);",
            [id],
            |row| row.get(0),
        )?;
        Ok(exists == 1)
    }
}

impl UpdateRepository for SqliteUpdateRepository<'_> {
    fn find_window(
        &self,
        poll_id: PollId,
        window_start_ms: i64,
    ) -> RepoResult<Option<UpdateRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "{UPDATE_SELECT_SQL}
             WHERE poll_uuid = ?1
               AND window_start_ms = ?2;"
        ))?;

        let mut rows = stmt.query(params![poll_id.to_string(), window_start_ms])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_update_row(row)?));
        }

        Ok(None)
    }

    fn recent_count(&self, poll_id: PollId, horizon_ms: i64) -> RepoResult<u64> {
        let sum: i64 = self.conn.query_row(
            "SELECT COALESCE(SUM(count), 0)
             FROM poll_updates
             WHERE poll_uuid = ?1
               AND window_start_ms >= ?2;",
            params![poll_id.to_string(), horizon_ms],
            |row| row.get(0),
        )?;
        u64::try_from(sum)
            .map_err(|_| RepoError::InvalidData(format!("negative update count sum {sum}")))
    }

    fn insert_window(&self, poll_id: PollId, window_start_ms: i64) -> RepoResult<UpdateRecord> {
        let inserted = self.conn.execute(
            "INSERT INTO poll_updates (poll_uuid, window_start_ms, count, sent)
             VALUES (?1, ?2, 0, 0);",
            params![poll_id.to_string(), window_start_ms],
        );

        match inserted {
            Ok(_) => Ok(UpdateRecord {
                id: self.conn.last_insert_rowid(),
                poll_id,
                window_start_ms,
                count: 0,
                sent: false,
                lease_until_ms: None,
            }),
            Err(err) if is_unique_violation(&err) => Err(RepoError::WindowAlreadyClaimed {
                poll_id,
                window_start_ms,
            }),
            Err(err) => Err(err.into()),
        }
    }

    fn record_send(&self, id: UpdateId) -> RepoResult<()> {
        self.update_by_id(
            "UPDATE poll_updates
             SET count = count + 1, sent = 1, lease_until_ms = NULL
             WHERE id = ?1;",
            id,
            params![id],
        )?;
        Ok(())
    }

    fn increment_count(&self, id: UpdateId) -> RepoResult<()> {
        self.update_by_id(
            "UPDATE poll_updates
             SET count = count + 1, lease_until_ms = NULL
             WHERE id = ?1;",
            id,
            params![id],
        )?;
        Ok(())
    }

    fn mark_pending(&self, id: UpdateId) -> RepoResult<()> {
        self.update_by_id(
            "UPDATE poll_updates SET sent = 0, lease_until_ms = NULL WHERE id = ?1;",
            id,
            params![id],
        )?;
        Ok(())
    }

    fn claim_pending(&self, id: UpdateId, now_ms: i64, lease_until_ms: i64) -> RepoResult<bool> {
        let changed = self.update_by_id(
            &format!(
                "UPDATE poll_updates
                 SET sent = 1, lease_until_ms = :lease_until_ms
                 WHERE id = :id AND {DUE_CONDITION_SQL};"
            ),
            id,
            named_params! {
                ":id": id,
                ":now_ms": now_ms,
                ":lease_until_ms": lease_until_ms,
            },
        )?;
        Ok(changed == 1)
    }

    fn arm_lease(&self, id: UpdateId, lease_until_ms: i64) -> RepoResult<()> {
        self.update_by_id(
            "UPDATE poll_updates SET lease_until_ms = ?2 WHERE id = ?1;",
            id,
            params![id, lease_until_ms],
        )?;
        Ok(())
    }

    fn release_lease(&self, id: UpdateId) -> RepoResult<()> {
        self.update_by_id(
            "UPDATE poll_updates SET lease_until_ms = NULL WHERE id = ?1;",
            id,
            params![id],
        )?;
        Ok(())
    }

    fn list_due_pending(&self, before_ms: i64, now_ms: i64) -> RepoResult<Vec<UpdateRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "{UPDATE_SELECT_SQL}
             WHERE window_start_ms < :before_ms
               AND {DUE_CONDITION_SQL}
             ORDER BY window_start_ms ASC, id ASC;"
        ))?;

        let mut rows = stmt.query(named_params! {
            ":before_ms": before_ms,
            ":now_ms": now_ms,
        })?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(parse_update_row(row)?);
        }

        Ok(records)
    }

    fn count_pending(&self) -> RepoResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM poll_updates WHERE sent = 0;",
            [],
            |row| row.get(0),
        )?;
        Ok(u64::try_from(count).unwrap_or(0))
    }
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.code == ErrorCode::ConstraintViolation
                && failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

fn parse_update_row(row: &Row<'_>) -> RepoResult<UpdateRecord> {
    let id: UpdateId = row.get("id")?;
    let poll_text: String = row.get("poll_uuid")?;
    let poll_id = parse_poll_uuid(&poll_text, "poll_updates.poll_uuid")?;

    let raw_count: i64 = row.get("count")?;
    let count = u32::try_from(raw_count).map_err(|_| {
        RepoError::InvalidData(format!(
            "invalid count value `{raw_count}` in poll_updates.count"
        ))
    })?;

    let sent = match row.get::<_, i64>("sent")? {
        0 => false,
        1 => true,
        other => {
            return Err(RepoError::InvalidData(format!(
                "invalid sent value `{other}` in poll_updates.sent"
            )));
        }
    };

    Ok(UpdateRecord {
        id,
        poll_id,
        window_start_ms: row.get("window_start_ms")?,
        count,
        sent,
        lease_until_ms: row.get("lease_until_ms")?,
    })
}
