//! Operations on [`User`] records.

use rusqlite::{params, OptionalExtension};

use courier_shared::constants::DEFAULT_AVATAR;
use courier_shared::types::{UserId, UserStatus};

use crate::database::{self, parse_column, parse_enum_column, Database};
use crate::error::{Result, StoreError};
use crate::models::{ProfileUpdate, User};

const USER_COLUMNS: &str = "id, username, email, avatar, status, created_at, updated_at";

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert a new user profile with status `offline`.
    ///
    /// Usernames are unique across all users, soft-deleted included; emails
    /// only among live users.
    pub fn create_user(&self, username: &str, email: Option<&str>) -> Result<User> {
        let taken: bool = self.conn().query_row(
            "SELECT EXISTS(SELECT 1 FROM users WHERE username = ?1)",
            params![username],
            |row| row.get(0),
        )?;
        if taken {
            return Err(StoreError::Conflict("Username already exists".into()));
        }

        let email = email.map(str::trim).filter(|e| !e.is_empty());
        if let Some(email) = email {
            if self.email_in_use(email, None)? {
                return Err(StoreError::Conflict("Email already in use".into()));
            }
        }

        let now = database::now();
        let user = User {
            id: UserId::generate(),
            username: username.to_string(),
            email: email.map(str::to_string),
            avatar: DEFAULT_AVATAR.to_string(),
            status: UserStatus::Offline,
            created_at: now,
            updated_at: now,
        };

        self.conn()
            .execute(
                "INSERT INTO users (id, username, email, avatar, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    user.id.to_hex(),
                    user.username,
                    user.email,
                    user.avatar,
                    user.status.as_str(),
                    now.timestamp_millis(),
                    now.timestamp_millis(),
                ],
            )
            .map_err(|e| database::conflict(e, "User already exists"))?;

        tracing::debug!(user = %user.id, username = %user.username, "created user");
        Ok(user)
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch a live user. Soft-deleted users are reported as not found.
    pub fn get_user(&self, id: UserId) -> Result<User> {
        self.conn()
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1 AND deleted = 0"),
                params![id.to_hex()],
                row_to_user,
            )
            .map_err(database::not_found)
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<User> {
        self.conn()
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1 AND deleted = 0"),
                params![username],
                row_to_user,
            )
            .map_err(database::not_found)
    }

    pub fn user_exists(&self, id: UserId) -> Result<bool> {
        let found = self
            .conn()
            .query_row(
                "SELECT 1 FROM users WHERE id = ?1 AND deleted = 0",
                params![id.to_hex()],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    /// Apply a partial profile update and return the refreshed profile.
    ///
    /// This is the only place `status` changes; live connections never
    /// touch it.
    pub fn update_user_profile(&self, id: UserId, update: &ProfileUpdate) -> Result<User> {
        let mut user = self.get_user(id)?;

        if let Some(email) = update.email.as_deref().map(str::trim) {
            if !email.is_empty() && user.email.as_deref() != Some(email) {
                if self.email_in_use(email, Some(id))? {
                    return Err(StoreError::Conflict("Email already in use".into()));
                }
                user.email = Some(email.to_string());
            }
        }
        if let Some(avatar) = update.avatar.as_deref() {
            if !avatar.is_empty() {
                user.avatar = avatar.to_string();
            }
        }
        if let Some(status) = update.status {
            user.status = status;
        }
        user.updated_at = database::now();

        self.conn()
            .execute(
                "UPDATE users SET email = ?2, avatar = ?3, status = ?4, updated_at = ?5
                 WHERE id = ?1 AND deleted = 0",
                params![
                    id.to_hex(),
                    user.email,
                    user.avatar,
                    user.status.as_str(),
                    user.updated_at.timestamp_millis(),
                ],
            )
            .map_err(|e| database::conflict(e, "Email already in use"))?;

        Ok(user)
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    /// Soft-delete a user. Returns `true` if a live row was marked.
    pub fn soft_delete_user(&self, id: UserId) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE users SET deleted = 1, updated_at = ?2 WHERE id = ?1 AND deleted = 0",
            params![id.to_hex(), database::now().timestamp_millis()],
        )?;
        Ok(affected > 0)
    }

    fn email_in_use(&self, email: &str, except: Option<UserId>) -> Result<bool> {
        let except = except.map(|id| id.to_hex()).unwrap_or_default();
        let in_use: bool = self.conn().query_row(
            "SELECT EXISTS(SELECT 1 FROM users WHERE email = ?1 AND id <> ?2 AND deleted = 0)",
            params![email, except],
            |row| row.get(0),
        )?;
        Ok(in_use)
    }
}

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: parse_column(row, 0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        avatar: row.get(3)?,
        status: parse_enum_column(row, 4, UserStatus::parse)?,
        created_at: database::millis_to_datetime(row.get(5)?),
        updated_at: database::millis_to_datetime(row.get(6)?),
    })
}
