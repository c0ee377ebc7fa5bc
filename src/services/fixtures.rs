//! Demo data for development environments: one user and a handful of
//! attributes showing the kind of values the store holds.

use crate::{
    models::{
        user::{DEFAULT_ROLE, NewUser, User},
        user_attribute::UserAttribute,
    },
    services::{
        attribute_service::{AttributeCriteria, AttributeError, AttributeService, AuditContext},
        user_service::{UserError, UserService},
    },
};
use chrono::{Duration, Utc};
use rand::Rng;
use thiserror::Error;
use tracing::info;

pub const DEMO_USER_IDENTIFIER: &str = "test-user-123";

/// (name, value, remark)
const DEMO_ATTRIBUTES: [(&str, &str, &str); 5] = [
    (
        "theme_preference",
        r#"{"theme": "dark", "language": "zh_CN"}"#,
        "Theme preference",
    ),
    (
        "notification_settings",
        r#"{"email": true, "sms": false}"#,
        "Notification settings",
    ),
    ("last_login_device", "Chrome/Windows", "Last login device"),
    (
        "avatar_url",
        "https://cdn.jsdelivr.net/gh/twitter/twemoji@14.0.2/assets/svg/1f600.svg",
        "Avatar",
    ),
    (
        "profile_summary",
        "Profile summary for the demo account",
        "Profile summary",
    ),
];

#[derive(Debug, Error)]
pub enum FixtureError {
    #[error(transparent)]
    User(#[from] UserError),
    #[error(transparent)]
    Attribute(#[from] AttributeError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixtureSummary {
    pub user_id: i64,
    pub user_created: bool,
    pub created: usize,
    pub skipped: usize,
}

/// Ensure the demo user and its attributes exist. Safe to run repeatedly:
/// existing rows are left alone.
pub async fn load_fixtures(
    users: &UserService,
    attributes: &AttributeService,
) -> Result<FixtureSummary, FixtureError> {
    let (user, user_created) = ensure_demo_user(users).await?;
    let audit = AuditContext::system();

    let mut batch = attributes.unit_of_work();
    let mut created = 0;
    let mut skipped = 0;
    for (name, value, remark) in DEMO_ATTRIBUTES {
        let existing = attributes
            .count_by(&AttributeCriteria::user(user.id).name(name))
            .await?;
        if existing > 0 {
            skipped += 1;
            continue;
        }

        let mut attribute = UserAttribute::new(user.id, name, value).with_remark(remark);
        let (created_days_ago, updated_days_ago) = {
            let mut rng = rand::thread_rng();
            (rng.gen_range(1..=30), rng.gen_range(1..=7))
        };
        let now = Utc::now();
        attribute.backdate(
            now - Duration::days(created_days_ago),
            now - Duration::days(updated_days_ago),
        );
        batch.save(&mut attribute, &audit, false).await?;
        created += 1;
    }
    batch.flush().await?;

    let summary = FixtureSummary {
        user_id: user.id,
        user_created,
        created,
        skipped,
    };
    info!(
        "Fixtures loaded for {}: {} created, {} skipped",
        user.identifier, summary.created, summary.skipped
    );
    Ok(summary)
}

async fn ensure_demo_user(users: &UserService) -> Result<(User, bool), FixtureError> {
    if let Some(user) = users.find_by_identifier(DEMO_USER_IDENTIFIER).await? {
        return Ok((user, false));
    }

    let user = users
        .create(NewUser::new(DEMO_USER_IDENTIFIER).with_roles([DEFAULT_ROLE]))
        .await?;
    info!("Created demo user {} ({})", user.identifier, user.id);
    Ok((user, true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use std::sync::Arc;

    #[tokio::test]
    async fn loading_twice_creates_nothing_new() {
        let pool = Arc::new(db::test_pool().await);
        let users = UserService::new(pool.clone());
        let attributes = AttributeService::new(pool);

        let first = load_fixtures(&users, &attributes).await.unwrap();
        assert!(first.user_created);
        assert_eq!(first.created, DEMO_ATTRIBUTES.len());

        let second = load_fixtures(&users, &attributes).await.unwrap();
        assert!(!second.user_created);
        assert_eq!(second.user_id, first.user_id);
        assert_eq!(second.created, 0);
        assert_eq!(second.skipped, DEMO_ATTRIBUTES.len());

        let count = attributes
            .count_by(&AttributeCriteria::user(first.user_id))
            .await
            .unwrap();
        assert_eq!(count, DEMO_ATTRIBUTES.len() as i64);
    }

    #[tokio::test]
    async fn demo_attributes_are_backdated() {
        let pool = Arc::new(db::test_pool().await);
        let users = UserService::new(pool.clone());
        let attributes = AttributeService::new(pool);

        let summary = load_fixtures(&users, &attributes).await.unwrap();
        let rows = attributes
            .find_by(&AttributeCriteria::user(summary.user_id), &[])
            .await
            .unwrap();

        let now = Utc::now();
        for row in rows {
            let created = row.audit.create_time().unwrap();
            let updated = row.audit.update_time().unwrap();
            assert!(created <= now - Duration::days(1));
            assert!(created >= now - Duration::days(31));
            assert!(updated <= now - Duration::days(1));
            assert!(updated >= now - Duration::days(8));
            assert_eq!(row.audit.created_by(), Some("system"));
        }
    }

    #[tokio::test]
    async fn existing_demo_user_is_reused() {
        let pool = Arc::new(db::test_pool().await);
        let users = UserService::new(pool.clone());
        let attributes = AttributeService::new(pool);

        let existing = users.create(NewUser::new(DEMO_USER_IDENTIFIER)).await.unwrap();
        let mut theme = UserAttribute::new(existing.id, "theme_preference", "light");
        attributes
            .save(&mut theme, &AuditContext::default())
            .await
            .unwrap();

        let summary = load_fixtures(&users, &attributes).await.unwrap();
        assert!(!summary.user_created);
        assert_eq!(summary.user_id, existing.id);
        assert_eq!(summary.created, DEMO_ATTRIBUTES.len() - 1);
        assert_eq!(summary.skipped, 1);

        let kept = attributes.find_by_id(theme.id.unwrap()).await.unwrap().unwrap();
        assert_eq!(kept.value, "light");
    }
}
