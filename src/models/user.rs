//! Represents the user accounts that attributes are attached to.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, types::Json};
use thiserror::Error;

/// Role every account receives when none are given.
pub const DEFAULT_ROLE: &str = "ROLE_USER";

/// Raised when an account has no usable identifier, which means the account
/// was provisioned incorrectly.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct UserIdentifierError(pub String);

/// A user account.
///
/// The attribute store only reads `id`, `identifier` and the optional display
/// fields; the account lifecycle is owned elsewhere.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct User {
    /// Row id (autoincrement).
    pub id: i64,

    /// Unique login identifier (e.g. "alice01").
    pub identifier: String,

    /// Granted roles, stored as a JSON array.
    pub roles: Json<Vec<String>>,

    /// Preferred human-facing name.
    pub nickname: Option<String>,

    /// Alternative human-facing name used by some account sources.
    pub display_name: Option<String>,

    /// Legacy username, preferred over `identifier` in labels when set.
    pub username: Option<String>,
}

impl User {
    /// Identifier used to authenticate this account.
    pub fn user_identifier(&self) -> Result<&str, UserIdentifierError> {
        if self.identifier.trim().is_empty() {
            return Err(UserIdentifierError(
                "User identifier cannot be empty".to_string(),
            ));
        }
        Ok(&self.identifier)
    }

    pub fn roles(&self) -> &[String] {
        &self.roles.0
    }
}

impl std::fmt::Display for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.identifier)
    }
}

/// Fields accepted when provisioning an account.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct NewUser {
    pub identifier: String,
    #[serde(default)]
    pub roles: Vec<String>,
    pub nickname: Option<String>,
    pub display_name: Option<String>,
    pub username: Option<String>,
}

impl NewUser {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            ..Self::default()
        }
    }

    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles = roles.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_nickname(mut self, nickname: impl Into<String>) -> Self {
        self.nickname = Some(nickname.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(identifier: &str) -> User {
        User {
            id: 1,
            identifier: identifier.to_string(),
            roles: Json(vec![DEFAULT_ROLE.to_string()]),
            nickname: None,
            display_name: None,
            username: None,
        }
    }

    #[test]
    fn blank_identifier_is_an_identity_error() {
        let err = user("").user_identifier().unwrap_err();
        assert_eq!(err.to_string(), "User identifier cannot be empty");
        assert!(user("   ").user_identifier().is_err());
    }

    #[test]
    fn identifier_and_display_agree() {
        let u = user("test-user-123");
        assert_eq!(u.user_identifier().unwrap(), "test-user-123");
        assert_eq!(u.to_string(), "test-user-123");
        assert_eq!(u.roles(), ["ROLE_USER".to_string()]);
    }
}
