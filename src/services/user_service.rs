//! UserService — the minimal user directory attributes are attached to.
//!
//! Only what the attribute store and the demo fixtures need: lookup by id or
//! identifier, batch lookup for listings, create, and delete (which cascades to
//! the user's attributes).

use crate::models::user::{DEFAULT_ROLE, NewUser, User};
use sqlx::{QueryBuilder, SqlitePool, sqlite::Sqlite, types::Json};
use std::sync::Arc;
use thiserror::Error;

const USER_COLUMNS: &str = "id, identifier, roles, nickname, display_name, username";
const IDENTIFIER_MAX_LEN: usize = 180;

#[derive(Debug, Error)]
pub enum UserError {
    #[error("user identifier `{identifier}` invalid: {reason}")]
    InvalidIdentifier { identifier: String, reason: String },
    #[error("user `{0}` already exists")]
    AlreadyExists(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type UserResult<T> = Result<T, UserError>;

#[derive(Clone)]
pub struct UserService {
    pub db: Arc<SqlitePool>,
}

impl UserService {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    pub async fn find_by_id(&self, id: i64) -> UserResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE id = ?",
            USER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&*self.db)
        .await?;
        Ok(user)
    }

    pub async fn find_by_identifier(&self, identifier: &str) -> UserResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE identifier = ?",
            USER_COLUMNS
        ))
        .bind(identifier)
        .fetch_optional(&*self.db)
        .await?;
        Ok(user)
    }

    /// Users for the given ids, in no particular order. Unknown ids are skipped.
    pub async fn find_many(&self, ids: &[i64]) -> UserResult<Vec<User>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder = QueryBuilder::<Sqlite>::new("SELECT ");
        builder.push(USER_COLUMNS).push(" FROM users WHERE id IN (");
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        let users: Vec<User> = builder.build_query_as().fetch_all(&*self.db).await?;
        Ok(users)
    }

    /// Provision an account. Roles default to `ROLE_USER`.
    pub async fn create(&self, new_user: NewUser) -> UserResult<User> {
        let identifier = new_user.identifier.trim();
        if identifier.is_empty() {
            return Err(UserError::InvalidIdentifier {
                identifier: new_user.identifier.clone(),
                reason: "must not be blank".into(),
            });
        }
        if identifier.chars().count() > IDENTIFIER_MAX_LEN {
            return Err(UserError::InvalidIdentifier {
                identifier: new_user.identifier.clone(),
                reason: format!("must be at most {} characters", IDENTIFIER_MAX_LEN),
            });
        }

        let roles = if new_user.roles.is_empty() {
            vec![DEFAULT_ROLE.to_string()]
        } else {
            new_user.roles.clone()
        };

        let result = sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (identifier, roles, nickname, display_name, username)
             VALUES (?, ?, ?, ?, ?)
             RETURNING {}",
            USER_COLUMNS
        ))
        .bind(identifier)
        .bind(Json(&roles))
        .bind(&new_user.nickname)
        .bind(&new_user.display_name)
        .bind(&new_user.username)
        .fetch_one(&*self.db)
        .await;

        match result {
            Ok(user) => {
                tracing::debug!("created user {} ({})", user.identifier, user.id);
                Ok(user)
            }
            Err(sqlx::Error::Database(db_err))
                if db_err.message().to_ascii_lowercase().contains("unique") =>
            {
                Err(UserError::AlreadyExists(identifier.to_string()))
            }
            Err(err) => Err(UserError::Sqlx(err)),
        }
    }

    /// Delete an account. Its attributes go with it. Returns whether a row was
    /// removed.
    pub async fn delete(&self, id: i64) -> UserResult<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&*self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
