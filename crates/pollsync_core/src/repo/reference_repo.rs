//! Reference repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist delivered copies of a poll with their addressing mode.
//! - Remove copies the transport reports as permanently unreachable.
//!
//! # Invariants
//! - Each row stores exactly one addressing mode (enforced by a CHECK).
//! - Reads reject rows whose addressing columns are inconsistent.

use crate::model::poll::PollId;
use crate::model::reference::{Reference, ReferenceAddress, ReferenceId};
use crate::repo::{parse_poll_uuid, RepoError, RepoResult};
use rusqlite::{params, Connection, Row};

const REFERENCE_SELECT_SQL: &str = "SELECT
    id,
    poll_uuid,
    admin_chat_id,
    admin_message_id,
    inline_message_id
FROM poll_references";

/// Repository interface for poll references.
pub trait ReferenceRepository {
    fn create_reference(
        &self,
        poll_id: PollId,
        address: &ReferenceAddress,
    ) -> RepoResult<ReferenceId>;
    /// Lists all references of a poll ordered by creation.
    fn list_references(&self, poll_id: PollId) -> RepoResult<Vec<Reference>>;
    fn delete_reference(&self, id: ReferenceId) -> RepoResult<()>;
    fn count_references(&self, poll_id: PollId) -> RepoResult<u64>;
}

/// SQLite-backed reference repository.
pub struct SqliteReferenceRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteReferenceRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl ReferenceRepository for SqliteReferenceRepository<'_> {
    fn create_reference(
        &self,
        poll_id: PollId,
        address: &ReferenceAddress,
    ) -> RepoResult<ReferenceId> {
        let (chat_id, message_id, inline_message_id) = match address {
            ReferenceAddress::Admin {
                chat_id,
                message_id,
            } => (Some(*chat_id), Some(*message_id), None),
            ReferenceAddress::Inline { inline_message_id } => {
                (None, None, Some(inline_message_id.as_str()))
            }
        };

        self.conn.execute(
            "INSERT INTO poll_references (
                poll_uuid,
                admin_chat_id,
                admin_message_id,
                inline_message_id
            ) VALUES (?1, ?2, ?3, ?4);",
            params![poll_id.to_string(), chat_id, message_id, inline_message_id],
        )?;

        Ok(self.conn.last_insert_rowid())
    }

    fn list_references(&self, poll_id: PollId) -> RepoResult<Vec<Reference>> {
        let mut stmt = self.conn.prepare(&format!(
            "{REFERENCE_SELECT_SQL}
             WHERE poll_uuid = ?1
             ORDER BY id ASC;"
        ))?;

        let mut rows = stmt.query([poll_id.to_string()])?;
        let mut references = Vec::new();
        while let Some(row) = rows.next()? {
            references.push(parse_reference_row(row)?);
        }

        Ok(references)
    }

    fn delete_reference(&self, id: ReferenceId) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM poll_references WHERE id = ?1;", [id])?;

        if changed == 0 {
            return Err(RepoError::NotFound {
                table: "poll_references",
                id,
            });
        }

        Ok(())
    }

    fn count_references(&self, poll_id: PollId) -> RepoResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM poll_references WHERE poll_uuid = ?1;",
            [poll_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(u64::try_from(count).unwrap_or(0))
    }
}

fn parse_reference_row(row: &Row<'_>) -> RepoResult<Reference> {
    let id: ReferenceId = row.get("id")?;
    let poll_text: String = row.get("poll_uuid")?;
    let poll_id = parse_poll_uuid(&poll_text, "poll_references.poll_uuid")?;

    let address = match (
        row.get::<_, Option<i64>>("admin_chat_id")?,
        row.get::<_, Option<i64>>("admin_message_id")?,
        row.get::<_, Option<String>>("inline_message_id")?,
    ) {
        (Some(chat_id), Some(message_id), None) => ReferenceAddress::Admin {
            chat_id,
            message_id,
        },
        (None, None, Some(inline_message_id)) => ReferenceAddress::Inline { inline_message_id },
        _ => {
            return Err(RepoError::InvalidData(format!(
                "reference {id} has inconsistent addressing columns"
            )));
        }
    };

    Ok(Reference {
        id,
        poll_id,
        address,
    })
}
