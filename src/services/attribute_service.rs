//! src/services/attribute_service.rs
//!
//! AttributeService: the store for `UserAttribute` records. `save` and `remove`
//! on the store write one record in its own transaction. Batched writes go
//! through a caller-owned `UnitOfWork`, whose `flush` applies everything it
//! staged in one SQLite transaction. Validation runs before anything is
//! written and audit columns are stamped from an explicit `AuditContext`.

use crate::models::user_attribute::{
    NAME_MAX_LEN, REMARK_MAX_LEN, UserAttribute, VALUE_MAX_LEN,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, SqliteConnection, SqlitePool, sqlite::Sqlite};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

const COLUMNS: &str = "id, user_id, name, value, remark, created_by, updated_by, \
                       created_from_ip, updated_from_ip, create_time, update_time";

const JOINED_COLUMNS: &str = "a.id, a.user_id, a.name, a.value, a.remark, a.created_by, \
                              a.updated_by, a.created_from_ip, a.updated_from_ip, \
                              a.create_time, a.update_time";

pub const MAX_PER_PAGE: u32 = 100;

const LIKE_ESCAPE: &str = r" ESCAPE '\'";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{field} must not be blank")]
    Blank { field: &'static str },
    #[error("{field} must be at most {max} characters")]
    TooLong { field: &'static str, max: usize },
}

#[derive(Debug, Error)]
pub enum AttributeError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("user {user_id} already has an attribute named `{name}`")]
    DuplicateName { user_id: i64, name: String },
    #[error("user {0} does not exist")]
    UnknownUser(i64),
    #[error("attribute `{0}` not found")]
    NotFound(Uuid),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type AttributeResult<T> = Result<T, AttributeError>;

/// The acting principal and the address the request came from. Passed into
/// every write so audit columns never depend on ambient state.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AuditContext {
    pub actor: Option<String>,
    pub ip: Option<String>,
}

impl AuditContext {
    pub fn new(actor: Option<String>, ip: Option<String>) -> Self {
        Self { actor, ip }
    }

    /// Context for writes made by the service itself (CLI, fixtures).
    pub fn system() -> Self {
        Self {
            actor: Some("system".to_string()),
            ip: None,
        }
    }

    /// Preset timestamps survive an insert.
    fn stamp_insert(&self, attribute: &mut UserAttribute, now: DateTime<Utc>) {
        let audit = &mut attribute.audit;
        audit.created_by = self.actor.clone();
        audit.updated_by = self.actor.clone();
        audit.created_from_ip = self.ip.clone();
        audit.updated_from_ip = self.ip.clone();
        audit.create_time = Some(audit.create_time.unwrap_or(now));
        audit.update_time = Some(audit.update_time.unwrap_or(now));
    }

    fn stamp_update(&self, attribute: &mut UserAttribute, now: DateTime<Utc>) {
        let audit = &mut attribute.audit;
        if let Some(actor) = &self.actor {
            audit.updated_by = Some(actor.clone());
        }
        if let Some(ip) = &self.ip {
            audit.updated_from_ip = Some(ip.clone());
        }
        audit.update_time = Some(now);
    }
}

/// Columns a caller may sort on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeField {
    Id,
    UserId,
    Name,
    Value,
    Remark,
    CreateTime,
    UpdateTime,
}

impl AttributeField {
    fn column(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::UserId => "user_id",
            Self::Name => "name",
            Self::Value => "value",
            Self::Remark => "remark",
            Self::CreateTime => "create_time",
            Self::UpdateTime => "update_time",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    fn keyword(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

pub type OrderBy = [(AttributeField, Direction)];

/// Exact-match filter. Unset fields match everything.
#[derive(Clone, Debug, Default)]
pub struct AttributeCriteria {
    pub id: Option<Uuid>,
    pub user_id: Option<i64>,
    pub name: Option<String>,
    pub value: Option<String>,
    pub remark: Option<String>,
}

impl AttributeCriteria {
    pub fn user(user_id: i64) -> Self {
        Self {
            user_id: Some(user_id),
            ..Self::default()
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    fn push_where(&self, builder: &mut QueryBuilder<'_, Sqlite>) {
        builder.push(" WHERE 1 = 1");
        if let Some(id) = self.id {
            builder.push(" AND id = ").push_bind(id);
        }
        if let Some(user_id) = self.user_id {
            builder.push(" AND user_id = ").push_bind(user_id);
        }
        if let Some(name) = &self.name {
            builder.push(" AND name = ").push_bind(name.clone());
        }
        if let Some(value) = &self.value {
            builder.push(" AND value = ").push_bind(value.clone());
        }
        if let Some(remark) = &self.remark {
            builder.push(" AND remark = ").push_bind(remark.clone());
        }
    }
}

/// Admin listing request: free-text search over `search_columns`, filters,
/// sort and a 1-based page.
#[derive(Clone, Debug)]
pub struct AttributeSearch {
    pub term: Option<String>,
    /// Qualified columns (`a.*` attribute, `u.*` user) the term is matched
    /// against.
    pub search_columns: Vec<&'static str>,
    pub user_id: Option<i64>,
    pub name_contains: Option<String>,
    pub value_contains: Option<String>,
    pub order: Vec<(AttributeField, Direction)>,
    pub page: u32,
    pub per_page: u32,
}

impl Default for AttributeSearch {
    fn default() -> Self {
        Self {
            term: None,
            search_columns: Vec::new(),
            user_id: None,
            name_contains: None,
            value_contains: None,
            order: Vec::new(),
            page: 1,
            per_page: 20,
        }
    }
}

impl AttributeSearch {
    fn push_from_where(&self, builder: &mut QueryBuilder<'_, Sqlite>) {
        builder.push(" FROM user_attributes a JOIN users u ON u.id = a.user_id WHERE 1 = 1");

        if let Some(term) = self.term.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            if !self.search_columns.is_empty() {
                let pattern = contains_pattern(term);
                builder.push(" AND (");
                for (i, column) in self.search_columns.iter().enumerate() {
                    if i > 0 {
                        builder.push(" OR ");
                    }
                    builder
                        .push(*column)
                        .push(" LIKE ")
                        .push_bind(pattern.clone())
                        .push(LIKE_ESCAPE);
                }
                builder.push(")");
            }
        }
        if let Some(user_id) = self.user_id {
            builder.push(" AND a.user_id = ").push_bind(user_id);
        }
        if let Some(name) = &self.name_contains {
            builder
                .push(" AND a.name LIKE ")
                .push_bind(contains_pattern(name))
                .push(LIKE_ESCAPE);
        }
        if let Some(value) = &self.value_contains {
            builder
                .push(" AND a.value LIKE ")
                .push_bind(contains_pattern(value))
                .push(LIKE_ESCAPE);
        }
    }
}

#[derive(Debug)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
}

/// A write waiting for the next flush.
#[derive(Clone, Debug)]
enum StagedWrite {
    Insert(UserAttribute),
    Update(UserAttribute),
    Delete(Uuid),
}

/// AttributeService provides the attribute store operations:
/// - save / remove (one record, one transaction)
/// - unit_of_work (caller-owned batch applied by flush)
/// - find_by_id / find_by / find_one_by / count_by
/// - search (admin listing with join on users)
#[derive(Clone)]
pub struct AttributeService {
    /// Shared SQLite connection pool.
    pub db: Arc<SqlitePool>,
}

impl AttributeService {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    /// Start an empty batch owned by the caller. Nothing staged on it is
    /// visible to, or flushed by, any other caller.
    pub fn unit_of_work(&self) -> UnitOfWork {
        UnitOfWork {
            db: self.db.clone(),
            pending: Vec::new(),
        }
    }

    /// Check required fields and length limits (counted in characters).
    pub fn validate(attribute: &UserAttribute) -> Result<(), ValidationError> {
        check_text("name", &attribute.name, NAME_MAX_LEN, true)?;
        check_text("value", &attribute.value, VALUE_MAX_LEN, true)?;
        if let Some(remark) = &attribute.remark {
            check_text("remark", remark, REMARK_MAX_LEN, false)?;
        }
        Ok(())
    }

    /// Insert or update `attribute` and commit before returning. On error
    /// `attribute` is left as it was.
    pub async fn save(
        &self,
        attribute: &mut UserAttribute,
        audit: &AuditContext,
    ) -> AttributeResult<()> {
        self.unit_of_work().save(attribute, audit, true).await
    }

    /// Delete `attribute` and commit before returning.
    pub async fn remove(&self, attribute: &UserAttribute) -> AttributeResult<()> {
        self.unit_of_work().remove(attribute, true).await
    }

    pub async fn find_by_id(&self, id: Uuid) -> AttributeResult<Option<UserAttribute>> {
        let criteria = AttributeCriteria {
            id: Some(id),
            ..AttributeCriteria::default()
        };
        self.find_one_by(&criteria, &[]).await
    }

    /// Matching attributes in the requested order. Ties fall back to whatever
    /// order SQLite returns.
    pub async fn find_by(
        &self,
        criteria: &AttributeCriteria,
        order: &OrderBy,
    ) -> AttributeResult<Vec<UserAttribute>> {
        self.select(criteria, order, None).await
    }

    pub async fn find_one_by(
        &self,
        criteria: &AttributeCriteria,
        order: &OrderBy,
    ) -> AttributeResult<Option<UserAttribute>> {
        let mut rows = self.select(criteria, order, Some(1)).await?;
        Ok(rows.pop())
    }

    pub async fn count_by(&self, criteria: &AttributeCriteria) -> AttributeResult<i64> {
        let mut builder = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM user_attributes");
        criteria.push_where(&mut builder);
        let count: i64 = builder.build_query_scalar().fetch_one(&*self.db).await?;
        Ok(count)
    }

    /// One page of the admin listing plus the total number of matches.
    pub async fn search(&self, search: &AttributeSearch) -> AttributeResult<Page<UserAttribute>> {
        let per_page = search.per_page.clamp(1, MAX_PER_PAGE);
        let page = search.page.max(1);

        let mut count_builder = QueryBuilder::<Sqlite>::new("SELECT COUNT(*)");
        search.push_from_where(&mut count_builder);
        let total: i64 = count_builder
            .build_query_scalar()
            .fetch_one(&*self.db)
            .await?;

        let mut builder = QueryBuilder::<Sqlite>::new("SELECT ");
        builder.push(JOINED_COLUMNS);
        search.push_from_where(&mut builder);
        push_order(&mut builder, &search.order, "a.");
        builder.push(" LIMIT ").push_bind(i64::from(per_page));
        builder
            .push(" OFFSET ")
            .push_bind(i64::from(page - 1) * i64::from(per_page));

        let items: Vec<UserAttribute> = builder.build_query_as().fetch_all(&*self.db).await?;

        Ok(Page {
            items,
            total,
            page,
            per_page,
        })
    }

    async fn select(
        &self,
        criteria: &AttributeCriteria,
        order: &OrderBy,
        limit: Option<i64>,
    ) -> AttributeResult<Vec<UserAttribute>> {
        let mut builder = QueryBuilder::<Sqlite>::new("SELECT ");
        builder.push(COLUMNS).push(" FROM user_attributes");
        criteria.push_where(&mut builder);
        push_order(&mut builder, order, "");
        if let Some(limit) = limit {
            builder.push(" LIMIT ").push_bind(limit);
        }

        let rows: Vec<UserAttribute> = builder.build_query_as().fetch_all(&*self.db).await?;
        Ok(rows)
    }
}

/// Writes staged by a single caller and applied together by `flush`.
pub struct UnitOfWork {
    db: Arc<SqlitePool>,
    pending: Vec<StagedWrite>,
}

impl UnitOfWork {
    /// Insert (no id yet) or update (id present) an attribute.
    ///
    /// Assigns the id and stamps audit columns on `attribute` in place. With
    /// `flush_immediately` everything staged on this unit is applied before
    /// returning; if that fails `attribute` is restored to its previous state.
    pub async fn save(
        &mut self,
        attribute: &mut UserAttribute,
        audit: &AuditContext,
        flush_immediately: bool,
    ) -> AttributeResult<()> {
        AttributeService::validate(attribute)?;

        let snapshot = attribute.clone();
        let now = Utc::now();
        let write = if attribute.id.is_none() {
            attribute.id = Some(Uuid::now_v7());
            audit.stamp_insert(attribute, now);
            StagedWrite::Insert(attribute.clone())
        } else {
            audit.stamp_update(attribute, now);
            StagedWrite::Update(attribute.clone())
        };

        self.pending.push(write);

        if flush_immediately {
            if let Err(err) = self.flush().await {
                *attribute = snapshot;
                return Err(err);
            }
        }
        Ok(())
    }

    /// Delete an attribute. Removing a record that was never saved or is
    /// already gone is a no-op.
    pub async fn remove(
        &mut self,
        attribute: &UserAttribute,
        flush_immediately: bool,
    ) -> AttributeResult<()> {
        let Some(id) = attribute.id else {
            debug!("remove called on unsaved attribute `{}`", attribute.name);
            return Ok(());
        };

        self.pending.push(StagedWrite::Delete(id));

        if flush_immediately {
            self.flush().await?;
        }
        Ok(())
    }

    /// Apply every staged write in order inside one transaction. On error
    /// nothing is applied and the staged writes are dropped.
    pub async fn flush(&mut self) -> AttributeResult<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let writes = std::mem::take(&mut self.pending);

        let mut tx = self.db.begin().await?;
        for write in &writes {
            apply_write(&mut tx, write).await?;
        }
        tx.commit().await?;

        debug!("flushed {} staged attribute writes", writes.len());
        Ok(())
    }

    /// Number of writes waiting for `flush`.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

impl Drop for UnitOfWork {
    fn drop(&mut self) {
        if !self.pending.is_empty() {
            warn!("dropping {} unflushed attribute writes", self.pending.len());
        }
    }
}

fn check_text(
    field: &'static str,
    text: &str,
    max: usize,
    required: bool,
) -> Result<(), ValidationError> {
    if required && text.trim().is_empty() {
        return Err(ValidationError::Blank { field });
    }
    if text.chars().count() > max {
        return Err(ValidationError::TooLong { field, max });
    }
    Ok(())
}

/// `%text%` with the LIKE wildcards in `text` matched literally.
fn contains_pattern(text: &str) -> String {
    let mut pattern = String::with_capacity(text.len() + 2);
    pattern.push('%');
    for c in text.chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

fn push_order(builder: &mut QueryBuilder<'_, Sqlite>, order: &OrderBy, prefix: &str) {
    for (i, (field, direction)) in order.iter().enumerate() {
        builder.push(if i == 0 { " ORDER BY " } else { ", " });
        builder
            .push(prefix)
            .push(field.column())
            .push(" ")
            .push(direction.keyword());
    }
}

async fn apply_write(conn: &mut SqliteConnection, write: &StagedWrite) -> AttributeResult<()> {
    match write {
        StagedWrite::Insert(attr) => {
            debug!("inserting attribute `{}` for user {}", attr.name, attr.user_id);
            sqlx::query(
                "INSERT INTO user_attributes (
                    id, user_id, name, value, remark, created_by, updated_by,
                    created_from_ip, updated_from_ip, create_time, update_time
                 ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(attr.id)
            .bind(attr.user_id)
            .bind(&attr.name)
            .bind(&attr.value)
            .bind(&attr.remark)
            .bind(&attr.audit.created_by)
            .bind(&attr.audit.updated_by)
            .bind(&attr.audit.created_from_ip)
            .bind(&attr.audit.updated_from_ip)
            .bind(attr.audit.create_time)
            .bind(attr.audit.update_time)
            .execute(&mut *conn)
            .await
            .map_err(|err| write_error(err, attr))?;
        }
        StagedWrite::Update(attr) => {
            debug!("updating attribute {:?}", attr.id);
            let result = sqlx::query(
                "UPDATE user_attributes
                 SET user_id = ?, name = ?, value = ?, remark = ?,
                     updated_by = ?, updated_from_ip = ?, update_time = ?
                 WHERE id = ?",
            )
            .bind(attr.user_id)
            .bind(&attr.name)
            .bind(&attr.value)
            .bind(&attr.remark)
            .bind(&attr.audit.updated_by)
            .bind(&attr.audit.updated_from_ip)
            .bind(attr.audit.update_time)
            .bind(attr.id)
            .execute(&mut *conn)
            .await
            .map_err(|err| write_error(err, attr))?;

            if result.rows_affected() == 0 {
                if let Some(id) = attr.id {
                    return Err(AttributeError::NotFound(id));
                }
            }
        }
        StagedWrite::Delete(id) => {
            let result = sqlx::query("DELETE FROM user_attributes WHERE id = ?")
                .bind(id)
                .execute(&mut *conn)
                .await?;
            if result.rows_affected() == 0 {
                debug!("attribute {} already absent", id);
            }
        }
    }
    Ok(())
}

/// Translate constraint failures into domain errors.
fn write_error(err: sqlx::Error, attr: &UserAttribute) -> AttributeError {
    if is_unique_violation(&err) {
        AttributeError::DuplicateName {
            user_id: attr.user_id,
            name: attr.name.clone(),
        }
    } else if is_foreign_key_violation(&err) {
        AttributeError::UnknownUser(attr.user_id)
    } else {
        AttributeError::Sqlx(err)
    }
}

/// Return true if SQLx error indicates a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.message().to_ascii_lowercase().contains("unique")
    )
}

fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.message().to_ascii_lowercase().contains("foreign key")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db, models::user::NewUser, services::user_service::UserService};

    async fn setup() -> (AttributeService, UserService) {
        let pool = Arc::new(db::test_pool().await);
        (AttributeService::new(pool.clone()), UserService::new(pool))
    }

    async fn new_user(users: &UserService, identifier: &str) -> i64 {
        users.create(NewUser::new(identifier)).await.unwrap().id
    }

    fn admin() -> AuditContext {
        AuditContext::new(Some("admin".into()), Some("10.0.0.1".into()))
    }

    #[tokio::test]
    async fn save_then_find_by_id_round_trips_fields() {
        let (store, users) = setup().await;
        let user = new_user(&users, "alice01").await;

        let mut attr = UserAttribute::new(user, "theme", r#"{"theme": "dark"}"#).with_remark("ui");
        store.save(&mut attr, &admin()).await.unwrap();

        let id = attr.id.expect("id assigned on save");
        let found = store.find_by_id(id).await.unwrap().expect("persisted");
        assert_eq!(found.name, "theme");
        assert_eq!(found.value, r#"{"theme": "dark"}"#);
        assert_eq!(found.remark.as_deref(), Some("ui"));
        assert_eq!(found.audit.created_by(), Some("admin"));
        assert_eq!(found.audit.created_from_ip(), Some("10.0.0.1"));
        assert!(found.audit.create_time().is_some());
        assert!(found.audit.update_time().is_some());
    }

    #[tokio::test]
    async fn duplicate_user_and_name_is_rejected() {
        let (store, users) = setup().await;
        let user = new_user(&users, "alice01").await;

        let mut first = UserAttribute::new(user, "theme", "dark");
        store.save(&mut first, &admin()).await.unwrap();

        let mut second = UserAttribute::new(user, "theme", "light");
        let err = store.save(&mut second, &admin()).await.unwrap_err();
        assert!(matches!(err, AttributeError::DuplicateName { ref name, .. } if name == "theme"));
        assert!(second.id.is_none(), "failed insert keeps the record unsaved");
        assert_eq!(store.count_by(&AttributeCriteria::user(user)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn same_name_for_different_users_is_allowed() {
        let (store, users) = setup().await;
        let a = new_user(&users, "a").await;
        let b = new_user(&users, "b").await;

        store.save(&mut UserAttribute::new(a, "theme", "dark"), &admin()).await.unwrap();
        store.save(&mut UserAttribute::new(b, "theme", "dark"), &admin()).await.unwrap();

        assert_eq!(store.count_by(&AttributeCriteria::default().name("theme")).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn blank_fields_fail_validation_and_do_not_persist() {
        let (store, users) = setup().await;
        let user = new_user(&users, "alice01").await;

        let mut blank_name = UserAttribute::new(user, "  ", "x");
        let err = store.save(&mut blank_name, &admin()).await.unwrap_err();
        assert!(matches!(
            err,
            AttributeError::Validation(ValidationError::Blank { field: "name" })
        ));

        let mut blank_value = UserAttribute::new(user, "theme", "");
        let err = store.save(&mut blank_value, &admin()).await.unwrap_err();
        assert!(matches!(
            err,
            AttributeError::Validation(ValidationError::Blank { field: "value" })
        ));

        assert!(blank_name.id.is_none());
        assert_eq!(store.count_by(&AttributeCriteria::user(user)).await.unwrap(), 0);
    }

    #[test]
    fn length_limits_count_characters() {
        let ok = UserAttribute::new(1, "名".repeat(NAME_MAX_LEN), "v");
        assert!(AttributeService::validate(&ok).is_ok());

        let long_name = UserAttribute::new(1, "n".repeat(NAME_MAX_LEN + 1), "v");
        assert_eq!(
            AttributeService::validate(&long_name),
            Err(ValidationError::TooLong { field: "name", max: NAME_MAX_LEN })
        );

        let max_value = UserAttribute::new(1, "n", "v".repeat(VALUE_MAX_LEN));
        assert!(AttributeService::validate(&max_value).is_ok());

        let long_value = UserAttribute::new(1, "n", "v".repeat(VALUE_MAX_LEN + 1));
        assert_eq!(
            AttributeService::validate(&long_value),
            Err(ValidationError::TooLong { field: "value", max: VALUE_MAX_LEN })
        );

        let long_remark = UserAttribute::new(1, "n", "v").with_remark("r".repeat(REMARK_MAX_LEN + 1));
        assert_eq!(
            AttributeService::validate(&long_remark),
            Err(ValidationError::TooLong { field: "remark", max: REMARK_MAX_LEN })
        );

        let empty_remark = UserAttribute::new(1, "n", "v").with_remark("");
        assert!(AttributeService::validate(&empty_remark).is_ok());
    }

    #[tokio::test]
    async fn remove_then_lookup_is_absent_and_second_remove_is_noop() {
        let (store, users) = setup().await;
        let user = new_user(&users, "alice01").await;

        let mut attr = UserAttribute::new(user, "theme", "dark");
        store.save(&mut attr, &admin()).await.unwrap();
        let id = attr.id.unwrap();

        store.remove(&attr).await.unwrap();
        assert!(store.find_by_id(id).await.unwrap().is_none());

        store.remove(&attr).await.unwrap();
        store.remove(&UserAttribute::new(user, "never", "saved")).await.unwrap();
    }

    #[tokio::test]
    async fn count_by_tracks_saves_and_removes() {
        let (store, users) = setup().await;
        let user = new_user(&users, "alice01").await;
        let other = new_user(&users, "bob02").await;
        let criteria = AttributeCriteria::user(user);

        let mut a = UserAttribute::new(user, "a", "1");
        let mut b = UserAttribute::new(user, "b", "2");
        store.save(&mut a, &admin()).await.unwrap();
        assert_eq!(store.count_by(&criteria).await.unwrap(), 1);
        store.save(&mut b, &admin()).await.unwrap();
        store.save(&mut UserAttribute::new(other, "a", "1"), &admin()).await.unwrap();
        assert_eq!(store.count_by(&criteria).await.unwrap(), 2);

        store.remove(&a).await.unwrap();
        assert_eq!(store.count_by(&criteria).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn update_keeps_id_and_changes_value() {
        let (store, users) = setup().await;
        let user = new_user(&users, "alice01").await;

        let mut attr = UserAttribute::new(user, "theme", "dark");
        store.save(&mut attr, &admin()).await.unwrap();
        let id = attr.id;

        let found = store.find_by(&AttributeCriteria::user(user), &[]).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].value, "dark");

        let mut edited = found[0].clone();
        edited.value = "light".into();
        let editor = AuditContext::new(Some("editor".into()), Some("10.0.0.2".into()));
        store.save(&mut edited, &editor).await.unwrap();

        let refetched = store.find_by_id(id.unwrap()).await.unwrap().unwrap();
        assert_eq!(refetched.id, id);
        assert_eq!(refetched.value, "light");
        assert_eq!(refetched.audit.created_by(), Some("admin"));
        assert_eq!(refetched.audit.updated_by(), Some("editor"));
        assert_eq!(refetched.audit.updated_from_ip(), Some("10.0.0.2"));
    }

    #[tokio::test]
    async fn update_of_removed_row_is_not_found() {
        let (store, users) = setup().await;
        let user = new_user(&users, "alice01").await;

        let mut attr = UserAttribute::new(user, "theme", "dark");
        store.save(&mut attr, &admin()).await.unwrap();
        store.remove(&attr).await.unwrap();

        attr.value = "light".into();
        let err = store.save(&mut attr, &admin()).await.unwrap_err();
        assert!(matches!(err, AttributeError::NotFound(_)));
    }

    #[tokio::test]
    async fn unknown_user_is_reported() {
        let (store, _users) = setup().await;
        let mut attr = UserAttribute::new(999, "theme", "dark");
        let err = store.save(&mut attr, &admin()).await.unwrap_err();
        assert!(matches!(err, AttributeError::UnknownUser(999)));
    }

    #[tokio::test]
    async fn staged_writes_are_invisible_until_flush() {
        let (store, users) = setup().await;
        let user = new_user(&users, "alice01").await;
        let criteria = AttributeCriteria::user(user);
        let mut uow = store.unit_of_work();

        let mut a = UserAttribute::new(user, "a", "1");
        let mut b = UserAttribute::new(user, "b", "2");
        uow.save(&mut a, &admin(), false).await.unwrap();
        uow.save(&mut b, &admin(), false).await.unwrap();
        assert!(a.id.is_some());
        assert_eq!(uow.pending(), 2);
        assert_eq!(store.count_by(&criteria).await.unwrap(), 0);

        uow.flush().await.unwrap();
        assert_eq!(store.count_by(&criteria).await.unwrap(), 2);

        uow.remove(&a, false).await.unwrap();
        assert_eq!(store.count_by(&criteria).await.unwrap(), 2);
        uow.flush().await.unwrap();
        assert_eq!(store.count_by(&criteria).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn failed_flush_applies_nothing() {
        let (store, users) = setup().await;
        let user = new_user(&users, "alice01").await;
        let mut uow = store.unit_of_work();

        uow.save(&mut UserAttribute::new(user, "a", "1"), &admin(), false).await.unwrap();
        uow.save(&mut UserAttribute::new(user, "a", "2"), &admin(), false).await.unwrap();

        assert!(matches!(
            uow.flush().await,
            Err(AttributeError::DuplicateName { .. })
        ));
        assert_eq!(store.count_by(&AttributeCriteria::user(user)).await.unwrap(), 0);

        // The failed batch is gone; the next flush starts clean.
        assert_eq!(uow.pending(), 0);
        uow.flush().await.unwrap();
    }

    #[tokio::test]
    async fn callers_sharing_a_store_do_not_flush_each_other() {
        let (store, users) = setup().await;
        let user = new_user(&users, "alice01").await;
        store.save(&mut UserAttribute::new(user, "taken", "1"), &admin()).await.unwrap();

        let staging = store.clone();
        let saving = store.clone();

        let mut batch = staging.unit_of_work();
        let mut duplicate = UserAttribute::new(user, "taken", "2");
        batch.save(&mut duplicate, &admin(), false).await.unwrap();

        let mut valid = UserAttribute::new(user, "theme", "dark");
        saving.save(&mut valid, &admin()).await.unwrap();
        assert!(store.find_by_id(valid.id.unwrap()).await.unwrap().is_some());

        assert!(matches!(
            batch.flush().await,
            Err(AttributeError::DuplicateName { ref name, .. }) if name == "taken"
        ));
        assert_eq!(store.count_by(&AttributeCriteria::user(user)).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn concurrent_saves_each_persist_their_own_row() {
        let (store, users) = setup().await;
        let user = new_user(&users, "alice01").await;

        let tasks: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    let mut attr = UserAttribute::new(user, format!("pref_{i}"), "on");
                    store.save(&mut attr, &admin()).await.map(|_| attr.id.unwrap())
                })
            })
            .collect();

        for task in tasks {
            let id = task.await.unwrap().unwrap();
            assert!(store.find_by_id(id).await.unwrap().is_some());
        }
        assert_eq!(store.count_by(&AttributeCriteria::user(user)).await.unwrap(), 8);
    }

    #[tokio::test]
    async fn renaming_onto_existing_name_is_rejected() {
        let (store, users) = setup().await;
        let user = new_user(&users, "alice01").await;

        store.save(&mut UserAttribute::new(user, "theme", "dark"), &admin()).await.unwrap();
        let mut other = UserAttribute::new(user, "locale", "en");
        store.save(&mut other, &admin()).await.unwrap();
        let before = other.clone();

        other.name = "theme".into();
        let err = store.save(&mut other, &admin()).await.unwrap_err();
        assert!(matches!(err, AttributeError::DuplicateName { ref name, .. } if name == "theme"));
        assert_eq!(other.name, "locale");
        assert_eq!(other.audit.update_time(), before.audit.update_time());

        let stored = store.find_by_id(before.id.unwrap()).await.unwrap().unwrap();
        assert_eq!(stored.name, "locale");
        assert_eq!(stored.value, "en");
    }

    #[tokio::test]
    async fn deleting_user_cascades_to_attributes() {
        let (store, users) = setup().await;
        let user = new_user(&users, "alice01").await;

        store.save(&mut UserAttribute::new(user, "a", "1"), &admin()).await.unwrap();
        store.save(&mut UserAttribute::new(user, "b", "2"), &admin()).await.unwrap();

        assert!(users.delete(user).await.unwrap());
        assert_eq!(store.count_by(&AttributeCriteria::user(user)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn find_one_by_respects_ordering() {
        let (store, users) = setup().await;
        let user = new_user(&users, "test@example.com").await;

        store.save(&mut UserAttribute::new(user, "name_1", "z_value"), &admin()).await.unwrap();
        store.save(&mut UserAttribute::new(user, "name_2", "a_value"), &admin()).await.unwrap();
        let criteria = AttributeCriteria::user(user);

        let asc = store
            .find_one_by(&criteria, &[(AttributeField::Value, Direction::Asc)])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(asc.value, "a_value");

        let desc = store
            .find_one_by(&criteria, &[(AttributeField::Value, Direction::Desc)])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(desc.value, "z_value");

        let by_name = store
            .find_by(&criteria, &[(AttributeField::Name, Direction::Desc)])
            .await
            .unwrap();
        let names: Vec<_> = by_name.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, ["name_2", "name_1"]);
    }

    #[tokio::test]
    async fn search_matches_term_filters_and_paginates() {
        let (store, users) = setup().await;
        let alice = users
            .create(NewUser::new("alice01").with_nickname("Alice"))
            .await
            .unwrap()
            .id;
        let bob = new_user(&users, "bob02").await;

        for i in 0..5 {
            let mut attr = UserAttribute::new(alice, format!("pref_{i}"), format!("v{i}"));
            store.save(&mut attr, &admin()).await.unwrap();
        }
        store.save(&mut UserAttribute::new(bob, "device", "Chrome"), &admin()).await.unwrap();

        let columns = vec!["a.name", "a.value", "u.identifier", "u.nickname", "u.username"];

        let by_nickname = AttributeSearch {
            term: Some("Alice".into()),
            search_columns: columns.clone(),
            ..AttributeSearch::default()
        };
        assert_eq!(store.search(&by_nickname).await.unwrap().total, 5);

        let by_value = AttributeSearch {
            term: Some("chrom".into()),
            search_columns: columns.clone(),
            ..AttributeSearch::default()
        };
        let page = store.search(&by_value).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].user_id, bob);

        let paged = AttributeSearch {
            user_id: Some(alice),
            name_contains: Some("pref".into()),
            order: vec![(AttributeField::Name, Direction::Desc)],
            page: 2,
            per_page: 2,
            ..AttributeSearch::default()
        };
        let page = store.search(&paged).await.unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].name, "pref_2");
        assert_eq!(page.items[1].name, "pref_1");
    }

    #[tokio::test]
    async fn search_matches_wildcards_literally() {
        let (store, users) = setup().await;
        let user = new_user(&users, "alice01").await;

        store.save(&mut UserAttribute::new(user, "quota", "50%"), &admin()).await.unwrap();
        store.save(&mut UserAttribute::new(user, "limit", "500"), &admin()).await.unwrap();
        store.save(&mut UserAttribute::new(user, "max_size", "1"), &admin()).await.unwrap();
        store.save(&mut UserAttribute::new(user, "maxsize", "2"), &admin()).await.unwrap();

        let percent = AttributeSearch {
            term: Some("50%".into()),
            search_columns: vec!["a.value"],
            ..AttributeSearch::default()
        };
        let page = store.search(&percent).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].name, "quota");

        let underscore = AttributeSearch {
            name_contains: Some("x_s".into()),
            ..AttributeSearch::default()
        };
        let page = store.search(&underscore).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].name, "max_size");

        assert_eq!(contains_pattern(r"a\b_c%"), r"%a\\b\_c\%%");
    }
}
