//! Auth session database operations

use chrono::{Duration, Utc};
use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use crate::db::sqlite::{parse_timestamp, timestamp};
use crate::db::DbResult;
use crate::models::Session;
use super::super::Database;

impl Database {
    /// Create a new login session for `user_id`
    pub fn create_session(&self, user_id: i64, ttl: Duration) -> DbResult<Session> {
        let conn = self.conn()?;
        let token = Uuid::new_v4().to_string();
        let created_at = Utc::now();
        let expires_at = created_at + ttl;

        conn.execute(
            "INSERT INTO auth_sessions (token, user_id, created_at, expires_at) VALUES (?1, ?2, ?3, ?4)",
            params![token, user_id, timestamp(created_at), timestamp(expires_at)],
        )?;

        let id = conn.last_insert_rowid();

        Ok(Session {
            id,
            token,
            user_id,
            created_at,
            expires_at,
        })
    }

    /// Validate a session token and extend its expiry if valid
    pub fn validate_session(&self, token: &str, ttl: Duration) -> DbResult<Option<Session>> {
        let conn = self.conn()?;
        let now = Utc::now();

        let session = conn
            .query_row(
                "SELECT id, token, user_id, created_at, expires_at FROM auth_sessions
                 WHERE token = ?1 AND expires_at > ?2",
                params![token, timestamp(now)],
                |row| {
                    let created_at_str: String = row.get(3)?;
                    let expires_at_str: String = row.get(4)?;

                    Ok(Session {
                        id: row.get(0)?,
                        token: row.get(1)?,
                        user_id: row.get(2)?,
                        created_at: parse_timestamp(3, &created_at_str)?,
                        expires_at: parse_timestamp(4, &expires_at_str)?,
                    })
                },
            )
            .optional()?;

        // Keep active sessions alive
        let Some(mut session) = session else {
            return Ok(None);
        };
        let new_expires = now + ttl;
        conn.execute(
            "UPDATE auth_sessions SET expires_at = ?1 WHERE id = ?2",
            params![timestamp(new_expires), session.id],
        )?;
        session.expires_at = new_expires;

        Ok(Some(session))
    }

    /// Delete a session (logout)
    pub fn delete_session(&self, token: &str) -> DbResult<bool> {
        let conn = self.conn()?;
        let rows_affected = conn.execute("DELETE FROM auth_sessions WHERE token = ?1", [token])?;
        Ok(rows_affected > 0)
    }

    /// Delete every session belonging to a user, except `keep` if given
    pub fn delete_user_sessions(&self, user_id: i64, keep: Option<&str>) -> DbResult<usize> {
        let conn = self.conn()?;
        Ok(conn.execute(
            "DELETE FROM auth_sessions WHERE user_id = ?1 AND (?2 IS NULL OR token != ?2)",
            params![user_id, keep],
        )?)
    }

    /// Remove sessions whose expiry has passed
    pub fn purge_expired_sessions(&self) -> DbResult<usize> {
        let conn = self.conn()?;
        Ok(conn.execute(
            "DELETE FROM auth_sessions WHERE expires_at <= ?1",
            [timestamp(Utc::now())],
        )?)
    }
}
