use rusqlite::{params, params_from_iter};

use courier_shared::types::{GroupId, MessageId, UserId};
use courier_shared::validation::Pagination;

use crate::database::{self, parse_column, Database};
use crate::error::{Result, StoreError};
use crate::models::{Message, MessageTarget, NewMessage};

const MESSAGE_COLUMNS: &str =
    "id, kind, sender_id, receiver_id, group_id, content, timestamp_ms, read";

/// Ids bound per `UPDATE` when marking messages read.
pub const READ_BATCH_CHUNK: usize = 500;

impl Database {
    /// Append a message. The store assigns id, timestamp and `read = false`.
    pub fn insert_message(&self, new: &NewMessage) -> Result<Message> {
        let message = Message {
            id: MessageId::generate(),
            target: new.target,
            sender_id: new.sender_id,
            content: new.content.clone(),
            timestamp: database::now(),
            read: false,
        };

        let (receiver_id, group_id) = match message.target {
            MessageTarget::Private { receiver_id } => (Some(receiver_id.to_hex()), None),
            MessageTarget::Group { group_id } => (None, Some(group_id.to_hex())),
        };

        self.conn().execute(
            "INSERT INTO messages (id, kind, sender_id, receiver_id, group_id, content, timestamp_ms, read)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0)",
            params![
                message.id.to_hex(),
                message.target.kind(),
                message.sender_id.to_hex(),
                receiver_id,
                group_id,
                message.content,
                message.timestamp.timestamp_millis(),
            ],
        )?;
        Ok(message)
    }

    pub fn get_message(&self, id: MessageId) -> Result<Message> {
        self.conn()
            .query_row(
                &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"),
                params![id.to_hex()],
                row_to_message,
            )
            .map_err(database::not_found)
    }

    /// Messages exchanged between two users in either direction, newest
    /// first. Equal timestamps fall back to insertion order.
    pub fn private_history(&self, a: UserId, b: UserId, page: Pagination) -> Result<Vec<Message>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE kind = 'private'
               AND ((sender_id = ?1 AND receiver_id = ?2) OR (sender_id = ?2 AND receiver_id = ?1))
             ORDER BY timestamp_ms DESC, seq DESC
             LIMIT ?3 OFFSET ?4"
        ))?;

        let rows = stmt.query_map(
            params![a.to_hex(), b.to_hex(), page.limit, page.skip],
            row_to_message,
        )?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }

    /// Messages posted to a group, oldest first. Equal timestamps fall back
    /// to insertion order.
    pub fn group_history(&self, group_id: GroupId, page: Pagination) -> Result<Vec<Message>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE kind = 'group' AND group_id = ?1
             ORDER BY timestamp_ms ASC, seq ASC
             LIMIT ?2 OFFSET ?3"
        ))?;

        let rows = stmt.query_map(
            params![group_id.to_hex(), page.limit, page.skip],
            row_to_message,
        )?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }

    /// Set `read = true` on every listed message.
    ///
    /// Ids are bound in chunks of [`READ_BATCH_CHUNK`] to stay under SQLite's
    /// host-parameter limit; all chunks commit in one transaction. Returns the
    /// number of rows matched; already-read rows still count.
    pub fn mark_messages_read(&self, ids: &[MessageId]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }

        let tx = self.conn().unchecked_transaction()?;
        let mut affected = 0;
        for chunk in ids.chunks(READ_BATCH_CHUNK) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            affected += tx.execute(
                &format!("UPDATE messages SET read = 1 WHERE id IN ({placeholders})"),
                params_from_iter(chunk.iter().map(|id| id.to_hex())),
            )?;
        }
        tx.commit()?;
        Ok(affected)
    }

    pub fn count_messages(&self) -> Result<u64> {
        let count: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let kind: String = row.get(1)?;
    let target = match kind.as_str() {
        "private" => MessageTarget::Private {
            receiver_id: parse_column(row, 3)?,
        },
        "group" => MessageTarget::Group {
            group_id: parse_column(row, 4)?,
        },
        other => {
            return Err(rusqlite::Error::FromSqlConversionFailure(
                1,
                rusqlite::types::Type::Text,
                Box::new(StoreError::InvalidValue(format!("message kind '{other}'"))),
            ))
        }
    };

    Ok(Message {
        id: parse_column(row, 0)?,
        target,
        sender_id: parse_column(row, 2)?,
        content: row.get(5)?,
        timestamp: database::millis_to_datetime(row.get(6)?),
        read: row.get(7)?,
    })
}
