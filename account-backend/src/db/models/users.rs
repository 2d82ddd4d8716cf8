//! User database operations
//!
//! Covers the usual unit-of-work patterns over `auth_user`: add and commit,
//! fetch all, fetch first match, filter, fetch by id, modify, delete.

use chrono::Utc;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

use crate::db::sqlite::{is_unique_violation, parse_timestamp, timestamp};
use crate::db::{DbError, DbResult};
use crate::models::{NewUser, User, UserFilter, UserRole, UserStatus, UserUpdate};
use super::super::Database;

const USER_COLUMNS: &str =
    "id, name, email, password, profile_image, role, status, date_created, date_modified";

fn row_to_user(row: &Row<'_>) -> rusqlite::Result<User> {
    let role_code: i64 = row.get(5)?;
    let status_code: i64 = row.get(6)?;
    let created_str: String = row.get(7)?;
    let modified_str: String = row.get(8)?;

    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        password: row.get(3)?,
        profile_image: row.get(4)?,
        role: UserRole::from_i64(role_code)
            .ok_or(rusqlite::Error::IntegralValueOutOfRange(5, role_code))?,
        status: UserStatus::from_i64(status_code)
            .ok_or(rusqlite::Error::IntegralValueOutOfRange(6, status_code))?,
        date_created: parse_timestamp(7, &created_str)?,
        date_modified: parse_timestamp(8, &modified_str)?,
    })
}

/// Build a `WHERE` clause (possibly empty) plus positional values for a filter
fn filter_clause(filter: &UserFilter) -> (String, Vec<Value>) {
    let mut conditions: Vec<String> = Vec::new();
    let mut values: Vec<Value> = Vec::new();

    if let Some(ref name) = filter.name {
        values.push(Value::Text(name.clone()));
        conditions.push(format!("name = ?{}", values.len()));
    }
    if let Some(ref email) = filter.email {
        values.push(Value::Text(email.trim().to_string()));
        conditions.push(format!("email = ?{}", values.len()));
    }
    if let Some(role) = filter.role {
        values.push(Value::Integer(role.as_i64()));
        conditions.push(format!("role = ?{}", values.len()));
    }
    if let Some(status) = filter.status {
        values.push(Value::Integer(status.as_i64()));
        conditions.push(format!("status = ?{}", values.len()));
    }

    if conditions.is_empty() {
        (String::new(), values)
    } else {
        (format!(" WHERE {}", conditions.join(" AND ")), values)
    }
}

fn select_users(conn: &Connection, filter: &UserFilter, limit: Option<i64>) -> rusqlite::Result<Vec<User>> {
    let (clause, values) = filter_clause(filter);
    let mut sql = format!("SELECT {} FROM auth_user{} ORDER BY id ASC", USER_COLUMNS, clause);
    if let Some(limit) = limit {
        sql.push_str(&format!(" LIMIT {}", limit));
    }

    let mut stmt = conn.prepare(&sql)?;
    let users = stmt
        .query_map(params_from_iter(values.iter()), row_to_user)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(users)
}

fn fetch_user(conn: &Connection, id: i64) -> rusqlite::Result<Option<User>> {
    conn.query_row(
        &format!("SELECT {} FROM auth_user WHERE id = ?1", USER_COLUMNS),
        [id],
        row_to_user,
    )
    .optional()
}

fn email_conflict(err: rusqlite::Error, email: &str) -> DbError {
    if is_unique_violation(&err) {
        DbError::DuplicateEmail(email.to_string())
    } else {
        DbError::Sqlite(err)
    }
}

impl Database {
    /// Insert a user and commit. Fails with `DuplicateEmail` if the address is taken.
    pub fn create_user(&self, new_user: &NewUser) -> DbResult<User> {
        let email = new_user.email.trim();

        self.with_transaction(|tx| {
            let now = timestamp(Utc::now());
            tx.execute(
                "INSERT INTO auth_user (name, email, password, role, status, date_created, date_modified)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                params![
                    new_user.name,
                    email,
                    new_user.password,
                    new_user.role.as_i64(),
                    new_user.status.as_i64(),
                    now,
                ],
            )
            .map_err(|e| email_conflict(e, email))?;

            let id = tx.last_insert_rowid();
            fetch_user(tx, id)?.ok_or(DbError::Sqlite(rusqlite::Error::QueryReturnedNoRows))
        })
    }

    /// All users, oldest first
    pub fn list_users(&self) -> DbResult<Vec<User>> {
        let conn = self.conn()?;
        Ok(select_users(&conn, &UserFilter::default(), None)?)
    }

    /// Users matching every field set in `filter`
    pub fn filter_users(&self, filter: &UserFilter) -> DbResult<Vec<User>> {
        let conn = self.conn()?;
        Ok(select_users(&conn, filter, None)?)
    }

    /// The lowest-id user matching `filter`
    pub fn first_user(&self, filter: &UserFilter) -> DbResult<Option<User>> {
        let conn = self.conn()?;
        Ok(select_users(&conn, filter, Some(1))?.into_iter().next())
    }

    pub fn find_user_by_email(&self, email: &str) -> DbResult<Option<User>> {
        self.first_user(&UserFilter::new().email(email))
    }

    pub fn count_users(&self, filter: &UserFilter) -> DbResult<i64> {
        let conn = self.conn()?;
        let (clause, values) = filter_clause(filter);
        let count = conn.query_row(
            &format!("SELECT COUNT(*) FROM auth_user{}", clause),
            params_from_iter(values.iter()),
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Get a user by primary key
    pub fn get_user(&self, id: i64) -> DbResult<Option<User>> {
        let conn = self.conn()?;
        Ok(fetch_user(&conn, id)?)
    }

    /// Apply a partial update and commit. Returns `None` if the user does not exist.
    /// An empty update changes nothing, `date_modified` included.
    pub fn update_user(&self, id: i64, update: &UserUpdate) -> DbResult<Option<User>> {
        self.with_transaction(|tx| {
            let Some(current) = fetch_user(tx, id)? else {
                return Ok(None);
            };
            if update.is_empty() {
                return Ok(Some(current));
            }

            let mut sets: Vec<String> = Vec::new();
            let mut values: Vec<Value> = Vec::new();

            if let Some(ref name) = update.name {
                values.push(Value::Text(name.clone()));
                sets.push(format!("name = ?{}", values.len()));
            }
            if let Some(ref email) = update.email {
                values.push(Value::Text(email.trim().to_string()));
                sets.push(format!("email = ?{}", values.len()));
            }
            if let Some(ref password) = update.password {
                values.push(Value::Text(password.clone()));
                sets.push(format!("password = ?{}", values.len()));
            }
            if let Some(ref image) = update.profile_image {
                values.push(Value::Text(image.clone()));
                sets.push(format!("profile_image = ?{}", values.len()));
            }
            if let Some(role) = update.role {
                values.push(Value::Integer(role.as_i64()));
                sets.push(format!("role = ?{}", values.len()));
            }
            if let Some(status) = update.status {
                values.push(Value::Integer(status.as_i64()));
                sets.push(format!("status = ?{}", values.len()));
            }

            values.push(Value::Text(timestamp(Utc::now())));
            sets.push(format!("date_modified = ?{}", values.len()));
            values.push(Value::Integer(id));

            let sql = format!(
                "UPDATE auth_user SET {} WHERE id = ?{}",
                sets.join(", "),
                values.len()
            );
            tx.execute(&sql, params_from_iter(values.iter()))
                .map_err(|e| email_conflict(e, update.email.as_deref().unwrap_or_default()))?;

            Ok(fetch_user(tx, id)?)
        })
    }

    /// Delete a user; their sessions and posts are removed by cascade.
    pub fn delete_user(&self, id: i64) -> DbResult<bool> {
        let conn = self.conn()?;
        let rows_affected = conn.execute("DELETE FROM auth_user WHERE id = ?1", [id])?;
        Ok(rows_affected > 0)
    }
}
