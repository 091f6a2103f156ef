//! User Storage
//! Mission: Persist user accounts and status flags in SQLite

use crate::auth::models::{User, UserRole};
use anyhow::{Context, Result};
use bcrypt::{hash, DEFAULT_COST};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::info;
use uuid::Uuid;

/// Credential store with SQLite backend. Each call opens its own connection;
/// the access pattern is single point reads and writes.
pub struct UserStore {
    db_path: String,
}

impl UserStore {
    /// Create a new store and initialize the schema.
    pub fn new(db_path: &str) -> Result<Self> {
        let store = Self {
            db_path: db_path.to_string(),
        };
        store.init_db()?;
        Ok(store)
    }

    fn init_db(&self) -> Result<()> {
        let conn = Connection::open(&self.db_path)?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                username TEXT UNIQUE NOT NULL,
                email TEXT UNIQUE NOT NULL,
                password_hash TEXT NOT NULL,
                role TEXT NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1,
                is_locked INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        Ok(())
    }

    /// Create a new user with a bcrypt-hashed password.
    pub fn create_user(
        &self,
        username: &str,
        email: &str,
        password: &str,
        role: UserRole,
    ) -> Result<User> {
        let password_hash = hash(password, DEFAULT_COST).context("Failed to hash password")?;

        let user = User {
            id: Uuid::new_v4(),
            username: username.to_string(),
            email: email.to_string(),
            password_hash,
            role,
            is_active: true,
            is_locked: false,
            created_at: Utc::now().to_rfc3339(),
        };

        let conn = Connection::open(&self.db_path)?;
        conn.execute(
            "INSERT INTO users (id, username, email, password_hash, role, is_active, is_locked, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                user.id.to_string(),
                user.username,
                user.email,
                user.password_hash,
                user.role.as_str(),
                user.is_active,
                user.is_locked,
                user.created_at,
            ],
        )
        .context("Failed to insert user")?;

        info!(username = %user.username, role = user.role.as_str(), "✅ Created user");

        Ok(user)
    }

    /// True when a user with this username or email already exists.
    pub fn user_exists(&self, username: &str, email: &str) -> Result<bool> {
        let conn = Connection::open(&self.db_path)?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM users WHERE username = ?1 OR email = ?2",
            params![username, email],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn get_user_by_id(&self, id: &Uuid) -> Result<Option<User>> {
        self.get_user_where("id = ?1", &id.to_string())
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        self.get_user_where("username = ?1", username)
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        self.get_user_where("email = ?1", email)
    }

    fn get_user_where(&self, predicate: &str, value: &str) -> Result<Option<User>> {
        let conn = Connection::open(&self.db_path)?;

        let sql = format!(
            "SELECT id, username, email, password_hash, role, is_active, is_locked, created_at
             FROM users WHERE {predicate}"
        );
        let mut stmt = conn.prepare(&sql)?;

        let user = stmt
            .query_row(params![value], map_user_row)
            .optional()
            .context("Failed to query user")?;

        Ok(user)
    }

    /// Update the active/locked flags. Returns the updated user, or None if
    /// no user with this id exists. Fields left at None are unchanged.
    pub fn set_user_status(
        &self,
        id: &Uuid,
        is_active: Option<bool>,
        is_locked: Option<bool>,
    ) -> Result<Option<User>> {
        let conn = Connection::open(&self.db_path)?;

        let rows_affected = conn.execute(
            "UPDATE users SET
                is_active = COALESCE(?2, is_active),
                is_locked = COALESCE(?3, is_locked)
             WHERE id = ?1",
            params![id.to_string(), is_active, is_locked],
        )?;

        if rows_affected == 0 {
            return Ok(None);
        }

        info!(user_id = %id, ?is_active, ?is_locked, "User status updated");

        self.get_user_by_id(id)
    }

    /// List all users (admin only).
    pub fn list_users(&self) -> Result<Vec<User>> {
        let conn = Connection::open(&self.db_path)?;

        let mut stmt = conn.prepare(
            "SELECT id, username, email, password_hash, role, is_active, is_locked, created_at
             FROM users ORDER BY created_at",
        )?;

        let users = stmt
            .query_map([], map_user_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(users)
    }
}

fn map_user_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    let id_str: String = row.get(0)?;
    let role_str: String = row.get(4)?;
    Ok(User {
        id: Uuid::parse_str(&id_str).unwrap_or_default(),
        username: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        role: UserRole::from_str(&role_str).unwrap_or(UserRole::Viewer),
        is_active: row.get(5)?,
        is_locked: row.get(6)?,
        created_at: row.get(7)?,
    })
}
