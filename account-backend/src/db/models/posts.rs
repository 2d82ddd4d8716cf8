//! Post database operations

use chrono::Utc;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

use crate::db::sqlite::{parse_timestamp, timestamp};
use crate::db::{DbError, DbResult};
use crate::models::Post;
use super::super::Database;

const POST_COLUMNS: &str = "id, title, content, author_id, date_created, date_modified";

fn row_to_post(row: &Row<'_>) -> rusqlite::Result<Post> {
    let created_str: String = row.get(4)?;
    let modified_str: String = row.get(5)?;

    Ok(Post {
        id: row.get(0)?,
        title: row.get(1)?,
        content: row.get(2)?,
        author_id: row.get(3)?,
        date_created: parse_timestamp(4, &created_str)?,
        date_modified: parse_timestamp(5, &modified_str)?,
    })
}

fn fetch_post(conn: &Connection, id: i64) -> rusqlite::Result<Option<Post>> {
    conn.query_row(
        &format!("SELECT {} FROM posts WHERE id = ?1", POST_COLUMNS),
        [id],
        row_to_post,
    )
    .optional()
}

impl Database {
    pub fn create_post(&self, author_id: i64, title: &str, content: &str) -> DbResult<Post> {
        self.with_transaction(|tx| {
            let now = timestamp(Utc::now());
            tx.execute(
                "INSERT INTO posts (title, content, author_id, date_created, date_modified)
                 VALUES (?1, ?2, ?3, ?4, ?4)",
                params![title, content, author_id, now],
            )?;

            let id = tx.last_insert_rowid();
            fetch_post(tx, id)?.ok_or(DbError::Sqlite(rusqlite::Error::QueryReturnedNoRows))
        })
    }

    /// All posts, oldest first
    pub fn list_posts(&self) -> DbResult<Vec<Post>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!("SELECT {} FROM posts ORDER BY id ASC", POST_COLUMNS))?;
        let posts = stmt
            .query_map([], row_to_post)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(posts)
    }

    pub fn list_posts_by_author(&self, author_id: i64) -> DbResult<Vec<Post>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM posts WHERE author_id = ?1 ORDER BY id ASC",
            POST_COLUMNS
        ))?;
        let posts = stmt
            .query_map([author_id], row_to_post)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(posts)
    }

    pub fn get_post(&self, id: i64) -> DbResult<Option<Post>> {
        let conn = self.conn()?;
        Ok(fetch_post(&conn, id)?)
    }

    /// Update title and/or content. Returns `None` if the post does not exist.
    pub fn update_post(
        &self,
        id: i64,
        title: Option<&str>,
        content: Option<&str>,
    ) -> DbResult<Option<Post>> {
        self.with_transaction(|tx| {
            if fetch_post(tx, id)?.is_none() {
                return Ok(None);
            }

            let mut sets: Vec<String> = Vec::new();
            let mut values: Vec<Value> = Vec::new();
            if let Some(title) = title {
                values.push(Value::Text(title.to_string()));
                sets.push(format!("title = ?{}", values.len()));
            }
            if let Some(content) = content {
                values.push(Value::Text(content.to_string()));
                sets.push(format!("content = ?{}", values.len()));
            }
            values.push(Value::Text(timestamp(Utc::now())));
            sets.push(format!("date_modified = ?{}", values.len()));
            values.push(Value::Integer(id));

            tx.execute(
                &format!("UPDATE posts SET {} WHERE id = ?{}", sets.join(", "), values.len()),
                params_from_iter(values.iter()),
            )?;

            Ok(fetch_post(tx, id)?)
        })
    }

    pub fn delete_post(&self, id: i64) -> DbResult<bool> {
        let conn = self.conn()?;
        let rows_affected = conn.execute("DELETE FROM posts WHERE id = ?1", [id])?;
        Ok(rows_affected > 0)
    }
}
