//! Member type repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide create/update/fetch/delete APIs over `member_types` and its
//!   group/property rows.
//! - Run built-in property reconciliation at the call sites selected by
//!   [`ReconcilePolicy`].
//! - Keep the scope cache coherent with every write.
//!
//! # Invariants
//! - Write paths call `MemberType::validate()` before any SQL mutation.
//! - A failed save leaves the caller's aggregate untouched.
//! - Reads report absence as `Ok(None)`, never as an error.
//! - Fetch reconciliation deltas are written back before returning.

use crate::cache::CacheKey;
use crate::config::RepositoryConfig;
use crate::db::migrations::latest_version;
use crate::db::DbError;
use crate::model::member_type::{MemberType, MemberTypeKey, MemberTypeValidationError};
use crate::reconcile::{reconcile, ReconcilePolicy};
use crate::repo::property_store::{
    load_groups_and_properties, parse_uuid, save_groups_and_properties,
};
use crate::scope::Scope;
use crate::stubs::{MemberStandardProperties, StandardPropertyCatalog};
use log::{debug, error, info};
use rusqlite::types::Value;
use rusqlite::{params, Connection, Row};
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

const MEMBER_TYPE_SELECT_SQL: &str = "SELECT
    id,
    uuid,
    alias,
    name,
    description,
    icon
FROM member_types";

const MEMBER_TYPE_COLUMNS: &[&str] = &["id", "uuid", "alias", "name", "description", "icon"];
const PROPERTY_GROUP_COLUMNS: &[&str] = &["id", "uuid", "type_id", "alias", "name", "sort_order"];
const PROPERTY_TYPE_COLUMNS: &[&str] = &[
    "id",
    "uuid",
    "type_id",
    "group_id",
    "alias",
    "name",
    "description",
    "sort_order",
    "mandatory",
    "editor_alias",
    "value_storage",
    "member_can_edit",
    "member_can_view",
    "is_sensitive",
];

pub type RepoResult<T> = Result<T, RepoError>;

/// Error for member type persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    /// Aggregate failed write preconditions; nothing was written.
    Validation(MemberTypeValidationError),
    /// Underlying SQLite/bootstrap error, including constraint violations.
    Db(DbError),
    /// Update target row no longer exists.
    NotFound(i64),
    /// Persisted data cannot be converted to a valid aggregate.
    InvalidData(String),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Required table is missing.
    MissingRequiredTable(&'static str),
    /// Required column is missing from expected table.
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "member type not found: {id}"),
            Self::InvalidData(message) => {
                write!(f, "invalid persisted member type data: {message}")
            }
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "member type repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "member type repository requires table `{table}`")
            }
            Self::MissingRequiredColumn { table, column } => write!(
                f,
                "member type repository requires column `{column}` in table `{table}`"
            ),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::NotFound(_) => None,
            Self::InvalidData(_) => None,
            Self::UninitializedConnection { .. } => None,
            Self::MissingRequiredTable(_) => None,
            Self::MissingRequiredColumn { .. } => None,
        }
    }
}

impl From<MemberTypeValidationError> for RepoError {
    fn from(value: MemberTypeValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Repository interface for member type operations.
///
/// Every call runs inside the caller's [`Scope`].
pub trait MemberTypeRepository {
    /// Creates (no identity) or updates (has identity) one member type and
    /// writes assigned ids back into `member_type`.
    fn save(&self, scope: &Scope<'_>, member_type: &mut MemberType) -> RepoResult<()>;
    /// Loads one member type by surrogate id.
    fn get(&self, scope: &Scope<'_>, id: i64) -> RepoResult<Option<MemberType>>;
    /// Loads one member type by stable key.
    fn get_by_key(&self, scope: &Scope<'_>, key: MemberTypeKey)
        -> RepoResult<Option<MemberType>>;
    /// Loads one member type by alias, ignoring case.
    fn get_by_alias(&self, scope: &Scope<'_>, alias: &str) -> RepoResult<Option<MemberType>>;
    /// Loads every member type ordered by id.
    fn get_all(&self, scope: &Scope<'_>) -> RepoResult<Vec<MemberType>>;
    /// Loads the member types matching `keys`; unknown keys are skipped.
    fn get_many(&self, scope: &Scope<'_>, keys: &[MemberTypeKey]) -> RepoResult<Vec<MemberType>>;
    /// Loads the member types matching `ids`; unknown ids are skipped.
    fn get_many_by_ids(&self, scope: &Scope<'_>, ids: &[i64]) -> RepoResult<Vec<MemberType>>;
    /// Removes one member type with all groups and property types.
    fn delete(&self, scope: &Scope<'_>, member_type: &MemberType) -> RepoResult<()>;
    fn exists(&self, scope: &Scope<'_>, id: i64) -> RepoResult<bool>;
    fn exists_by_alias(&self, scope: &Scope<'_>, alias: &str) -> RepoResult<bool>;
    fn count(&self, scope: &Scope<'_>) -> RepoResult<u64>;
}

/// SQLite-backed member type repository.
pub struct SqliteMemberTypeRepository<C = MemberStandardProperties> {
    catalog: C,
    policy: ReconcilePolicy,
}

impl SqliteMemberTypeRepository<MemberStandardProperties> {
    /// Creates a repository using the standard member property catalog.
    pub fn try_new(conn: &Connection, config: &RepositoryConfig) -> RepoResult<Self> {
        Self::with_catalog(conn, config, MemberStandardProperties)
    }
}

impl<C: StandardPropertyCatalog> SqliteMemberTypeRepository<C> {
    /// Creates a repository with a custom built-in property catalog.
    ///
    /// # Errors
    /// - Returns schema errors when `conn` has not been migrated.
    pub fn with_catalog(conn: &Connection, config: &RepositoryConfig, catalog: C) -> RepoResult<Self> {
        ensure_member_type_connection_ready(conn)?;
        Ok(Self {
            catalog,
            policy: config.reconcile,
        })
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    pub fn policy(&self) -> ReconcilePolicy {
        self.policy
    }

    fn create(&self, scope: &Scope<'_>, member_type: &mut MemberType) -> RepoResult<()> {
        let conn = scope.conn();
        let mut working = member_type.clone();
        if self.policy.on_create && reconcile(&mut working, &self.catalog) {
            debug!(
                "event=member_type_reconcile module=repo status=ok phase=create properties={}",
                working.property_type_count()
            );
        }

        conn.execute(
            "INSERT INTO member_types (
                uuid,
                alias,
                name,
                description,
                icon
            ) VALUES (?1, ?2, ?3, ?4, ?5);",
            params![
                working.key.to_string(),
                working.alias.as_str(),
                working.name.as_str(),
                working.description.as_deref(),
                working.icon.as_deref(),
            ],
        )?;
        working.id = conn.last_insert_rowid();
        save_groups_and_properties(conn, working.id, &mut working)?;

        scope.cache().invalidate(&working);
        *member_type = working;
        Ok(())
    }

    fn update(&self, scope: &Scope<'_>, member_type: &mut MemberType) -> RepoResult<()> {
        let mut working = member_type.clone();
        if self.policy.on_update {
            reconcile(&mut working, &self.catalog);
        }

        // Drop entries keyed by the stored alias before it changes.
        scope.cache().invalidate(&working);
        write_update(scope.conn(), &mut working)?;
        scope.cache().invalidate(&working);
        *member_type = working;
        Ok(())
    }

    fn fetch(&self, scope: &Scope<'_>, lookup: Lookup<'_>) -> RepoResult<Option<MemberType>> {
        if let Some(cached) = scope.cache().get(&lookup.cache_key()) {
            return Ok(Some(cached));
        }

        let (clause, value) = lookup.where_clause();
        let loaded = load_member_types(scope.conn(), clause, &[value])?;
        match loaded.into_iter().next() {
            Some(member_type) => Ok(Some(self.complete_fetched(scope, member_type)?)),
            None => Ok(None),
        }
    }

    /// Applies fetch-time reconciliation, persists its delta and caches the result.
    fn complete_fetched(&self, scope: &Scope<'_>, mut member_type: MemberType) -> RepoResult<MemberType> {
        if self.policy.on_fetch {
            let before = member_type.property_type_count();
            if reconcile(&mut member_type, &self.catalog) {
                write_update(scope.conn(), &mut member_type)?;
                info!(
                    "event=member_type_reconcile module=repo status=ok phase=fetch id={} added={}",
                    member_type.id,
                    member_type.property_type_count() - before
                );
            }
        }

        scope.cache().insert(&member_type);
        Ok(member_type)
    }
}

impl<C: StandardPropertyCatalog> MemberTypeRepository for SqliteMemberTypeRepository<C> {
    fn save(&self, scope: &Scope<'_>, member_type: &mut MemberType) -> RepoResult<()> {
        let started_at = Instant::now();
        let mode = if member_type.has_identity() {
            "update"
        } else {
            "create"
        };

        let result = member_type.validate().map_err(RepoError::from).and_then(|()| {
            if member_type.has_identity() {
                self.update(scope, member_type)
            } else {
                self.create(scope, member_type)
            }
        });

        match &result {
            Ok(()) => info!(
                "event=member_type_save module=repo status=ok mode={} id={} duration_ms={}",
                mode,
                member_type.id,
                started_at.elapsed().as_millis()
            ),
            Err(err) => error!(
                "event=member_type_save module=repo status=error mode={} duration_ms={} error_code={} error={}",
                mode,
                started_at.elapsed().as_millis(),
                error_code(err),
                err
            ),
        }
        result
    }

    fn get(&self, scope: &Scope<'_>, id: i64) -> RepoResult<Option<MemberType>> {
        if id == 0 {
            return Ok(None);
        }
        self.fetch(scope, Lookup::Id(id))
    }

    fn get_by_key(
        &self,
        scope: &Scope<'_>,
        key: MemberTypeKey,
    ) -> RepoResult<Option<MemberType>> {
        self.fetch(scope, Lookup::Key(key))
    }

    fn get_by_alias(&self, scope: &Scope<'_>, alias: &str) -> RepoResult<Option<MemberType>> {
        let alias = alias.trim();
        if alias.is_empty() {
            return Ok(None);
        }
        self.fetch(scope, Lookup::Alias(alias))
    }

    fn get_all(&self, scope: &Scope<'_>) -> RepoResult<Vec<MemberType>> {
        let loaded = load_member_types(scope.conn(), "1 = 1", &[])?;
        let mut result = Vec::with_capacity(loaded.len());
        for member_type in loaded {
            match scope.cache().get(&CacheKey::Id(member_type.id)) {
                Some(cached) => result.push(cached),
                None => result.push(self.complete_fetched(scope, member_type)?),
            }
        }
        Ok(result)
    }

    fn get_many(&self, scope: &Scope<'_>, keys: &[MemberTypeKey]) -> RepoResult<Vec<MemberType>> {
        let mut seen = HashSet::new();
        let mut result = Vec::new();
        for key in keys {
            if !seen.insert(*key) {
                continue;
            }
            if let Some(member_type) = self.get_by_key(scope, *key)? {
                result.push(member_type);
            }
        }
        Ok(result)
    }

    fn get_many_by_ids(&self, scope: &Scope<'_>, ids: &[i64]) -> RepoResult<Vec<MemberType>> {
        let mut seen = HashSet::new();
        let mut result = Vec::new();
        for id in ids {
            if !seen.insert(*id) {
                continue;
            }
            if let Some(member_type) = self.get(scope, *id)? {
                result.push(member_type);
            }
        }
        Ok(result)
    }

    fn delete(&self, scope: &Scope<'_>, member_type: &MemberType) -> RepoResult<()> {
        if !member_type.has_identity() {
            return Ok(());
        }

        let conn = scope.conn();
        conn.execute(
            "DELETE FROM property_types WHERE type_id = ?1;",
            [member_type.id],
        )?;
        conn.execute(
            "DELETE FROM property_groups WHERE type_id = ?1;",
            [member_type.id],
        )?;
        let removed = conn.execute("DELETE FROM member_types WHERE id = ?1;", [member_type.id])?;
        scope.cache().invalidate(member_type);

        info!(
            "event=member_type_delete module=repo status=ok id={} removed={}",
            member_type.id, removed
        );
        Ok(())
    }

    fn exists(&self, scope: &Scope<'_>, id: i64) -> RepoResult<bool> {
        let exists: i64 = scope.conn().query_row(
            "SELECT EXISTS(SELECT 1 FROM member_types WHERE id = ?1);",
            [id],
            |row| row.get(0),
        )?;
        Ok(exists == 1)
    }

    fn exists_by_alias(&self, scope: &Scope<'_>, alias: &str) -> RepoResult<bool> {
        let exists: i64 = scope.conn().query_row(
            "SELECT EXISTS(SELECT 1 FROM member_types WHERE alias = ?1);",
            [alias.trim()],
            |row| row.get(0),
        )?;
        Ok(exists == 1)
    }

    fn count(&self, scope: &Scope<'_>) -> RepoResult<u64> {
        let count: i64 =
            scope
                .conn()
                .query_row("SELECT COUNT(*) FROM member_types;", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

fn error_code(err: &RepoError) -> &'static str {
    match err {
        RepoError::Validation(_) => "validation_failed",
        RepoError::Db(db) if db.is_constraint_violation() => "constraint_violation",
        RepoError::Db(_) => "db_failed",
        RepoError::NotFound(_) => "not_found",
        _ => "invalid_state",
    }
}

/// Single-row lookup forms.
#[derive(Debug, Clone, Copy)]
enum Lookup<'a> {
    Id(i64),
    Key(MemberTypeKey),
    Alias(&'a str),
}

impl Lookup<'_> {
    fn cache_key(&self) -> CacheKey {
        match self {
            Self::Id(id) => CacheKey::Id(*id),
            Self::Key(key) => CacheKey::Key(*key),
            Self::Alias(alias) => CacheKey::alias(alias),
        }
    }

    fn where_clause(&self) -> (&'static str, Value) {
        match self {
            Self::Id(id) => ("id = ?1", Value::Integer(*id)),
            Self::Key(key) => ("uuid = ?1", Value::Text(key.to_string())),
            // `alias` is declared COLLATE NOCASE.
            Self::Alias(alias) => ("alias = ?1", Value::Text((*alias).to_string())),
        }
    }
}

fn load_member_types(
    conn: &Connection,
    clause: &str,
    bind_values: &[Value],
) -> RepoResult<Vec<MemberType>> {
    let mut stmt = conn.prepare(&format!(
        "{MEMBER_TYPE_SELECT_SQL}
         WHERE {clause}
         ORDER BY id ASC;"
    ))?;
    let mut rows = stmt.query(rusqlite::params_from_iter(bind_values.iter()))?;
    let mut member_types = Vec::new();
    while let Some(row) = rows.next()? {
        member_types.push(parse_member_type_row(row)?);
    }
    drop(rows);

    for member_type in &mut member_types {
        let (groups, groupless) = load_groups_and_properties(conn, member_type.id)?;
        member_type.property_groups = groups;
        member_type.no_group_property_types = groupless;
    }
    Ok(member_types)
}

fn write_update(conn: &Connection, member_type: &mut MemberType) -> RepoResult<()> {
    let changed = conn.execute(
        "UPDATE member_types
         SET
            alias = ?2,
            name = ?3,
            description = ?4,
            icon = ?5,
            updated_at = (strftime('%s', 'now') * 1000)
         WHERE id = ?1;",
        params![
            member_type.id,
            member_type.alias.as_str(),
            member_type.name.as_str(),
            member_type.description.as_deref(),
            member_type.icon.as_deref(),
        ],
    )?;
    if changed == 0 {
        return Err(RepoError::NotFound(member_type.id));
    }

    save_groups_and_properties(conn, member_type.id, member_type)
}

fn parse_member_type_row(row: &Row<'_>) -> RepoResult<MemberType> {
    let uuid_text: String = row.get("uuid")?;
    let mut member_type = MemberType::with_key(
        parse_uuid(&uuid_text, "member_types.uuid")?,
        row.get::<_, String>("alias")?,
        row.get::<_, String>("name")?,
    );
    member_type.id = row.get("id")?;
    member_type.description = row.get("description")?;
    member_type.icon = row.get("icon")?;
    Ok(member_type)
}

fn ensure_member_type_connection_ready(conn: &Connection) -> RepoResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    let required = [
        ("member_types", MEMBER_TYPE_COLUMNS),
        ("property_groups", PROPERTY_GROUP_COLUMNS),
        ("property_types", PROPERTY_TYPE_COLUMNS),
    ];

    for (table, columns) in required {
        if !table_exists(conn, table)? {
            return Err(RepoError::MissingRequiredTable(table));
        }
        for &column in columns {
            if !table_has_column(conn, table, column)? {
                return Err(RepoError::MissingRequiredColumn { table, column });
            }
        }
    }

    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> RepoResult<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let current: String = row.get(1)?;
        if current == column {
            return Ok(true);
        }
    }
    Ok(false)
}
