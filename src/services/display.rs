//! Human-readable labels for users in admin listings.

use crate::models::user::User;

pub const UNASSIGNED: &str = "unassigned";
pub const UNKNOWN_USER: &str = "unknown user";

/// Optional display fields a user record may carry. Record types override the
/// accessors for the fields they have.
pub trait DisplayableUser {
    fn record_id(&self) -> Option<String> {
        None
    }

    fn nickname(&self) -> Option<&str> {
        None
    }

    fn display_name(&self) -> Option<&str> {
        None
    }

    /// Legacy username, preferred over the login identifier.
    fn username(&self) -> Option<&str> {
        None
    }

    fn user_identifier(&self) -> Option<&str> {
        None
    }
}

impl DisplayableUser for User {
    fn record_id(&self) -> Option<String> {
        Some(self.id.to_string())
    }

    fn nickname(&self) -> Option<&str> {
        self.nickname.as_deref()
    }

    fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    fn user_identifier(&self) -> Option<&str> {
        User::user_identifier(self).ok()
    }
}

/// Label for the owner of an attribute: `"Alice (alice01)"`, `"alice01"`,
/// `"user id: 7"`, or a sentinel when nothing is known.
pub fn format_user_display<U: DisplayableUser + ?Sized>(user: Option<&U>) -> String {
    let Some(user) = user else {
        return UNASSIGNED.to_string();
    };

    let display = user
        .nickname()
        .or_else(|| user.display_name())
        .unwrap_or_default();
    let identifier = user
        .username()
        .or_else(|| user.user_identifier())
        .unwrap_or_default();

    if !display.is_empty() && !identifier.is_empty() {
        return format!("{} ({})", display, identifier);
    }
    if !identifier.is_empty() {
        return identifier.to_string();
    }
    match user.record_id() {
        Some(id) => format!("user id: {}", id),
        None => UNKNOWN_USER.to_string(),
    }
}
