//! Shared group/property persistence for composite type repositories.
//!
//! # Responsibility
//! - Write the group and property rows of one owning type and assign ids.
//! - Rebuild groups and properties of one owning type from storage.
//! - Keep the SQL for `property_groups` / `property_types` in one place.
//!
//! # Invariants
//! - Never decides *which* properties should exist; callers own that policy.
//! - After [`save_groups_and_properties`] every group and property carries a
//!   non-zero id, and rows no longer present in the aggregate are deleted.
//! - Rows are read in `sort_order ASC, id ASC` order.

use crate::model::member_type::MemberType;
use crate::model::property::{
    DataTypeRef, MemberPropertyAccess, PropertyGroup, PropertyType, ValueStorage,
};
use crate::repo::member_type_repo::{RepoError, RepoResult};
use log::debug;
use rusqlite::{params, Connection, Row};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

const GROUP_SELECT_SQL: &str = "SELECT
    id,
    uuid,
    alias,
    name,
    sort_order
FROM property_groups";

const PROPERTY_SELECT_SQL: &str = "SELECT
    id,
    uuid,
    group_id,
    alias,
    name,
    description,
    sort_order,
    mandatory,
    editor_alias,
    value_storage,
    member_can_edit,
    member_can_view,
    is_sensitive
FROM property_types";

/// Writes all groups/properties of `member_type` under `type_id`.
///
/// Items without identity are inserted and receive fresh ids; the rest are
/// updated in place. An item whose id does not match a row owned by `type_id`
/// (copied from another member type, or its row is gone) is inserted as a new
/// item with a fresh key and id. Stored rows that are no longer part of the
/// aggregate are removed.
pub fn save_groups_and_properties(
    conn: &Connection,
    type_id: i64,
    member_type: &mut MemberType,
) -> RepoResult<()> {
    let mut kept_groups = HashSet::new();
    let mut kept_properties = HashSet::new();

    for group in &mut member_type.property_groups {
        upsert_group(conn, type_id, group)?;
        kept_groups.insert(group.id);
        for property in &mut group.property_types {
            upsert_property(conn, type_id, Some(group.id), property)?;
            kept_properties.insert(property.id);
        }
    }
    for property in &mut member_type.no_group_property_types {
        upsert_property(conn, type_id, None, property)?;
        kept_properties.insert(property.id);
    }

    let mut removed_properties = 0usize;
    for id in owned_ids(conn, "property_types", type_id)? {
        if !kept_properties.contains(&id) {
            removed_properties += conn.execute("DELETE FROM property_types WHERE id = ?1;", [id])?;
        }
    }
    let mut removed_groups = 0usize;
    for id in owned_ids(conn, "property_groups", type_id)? {
        if !kept_groups.contains(&id) {
            removed_groups += conn.execute("DELETE FROM property_groups WHERE id = ?1;", [id])?;
        }
    }

    debug!(
        "event=property_store_save module=repo status=ok type_id={} groups={} properties={} removed_groups={} removed_properties={}",
        type_id,
        kept_groups.len(),
        kept_properties.len(),
        removed_groups,
        removed_properties
    );
    Ok(())
}

/// Loads groups (with their properties) and groupless properties of `type_id`.
///
/// # Errors
/// - `InvalidData` when a property references a group owned by another type
///   or a row carries values outside the schema contract.
pub fn load_groups_and_properties(
    conn: &Connection,
    type_id: i64,
) -> RepoResult<(Vec<PropertyGroup>, Vec<PropertyType>)> {
    let mut stmt = conn.prepare(&format!(
        "{GROUP_SELECT_SQL}
         WHERE type_id = ?1
         ORDER BY sort_order ASC, id ASC;"
    ))?;
    let mut rows = stmt.query([type_id])?;
    let mut groups = Vec::new();
    while let Some(row) = rows.next()? {
        groups.push(parse_group_row(row)?);
    }

    let positions: HashMap<i64, usize> = groups
        .iter()
        .enumerate()
        .map(|(index, group)| (group.id, index))
        .collect();

    let mut stmt = conn.prepare(&format!(
        "{PROPERTY_SELECT_SQL}
         WHERE type_id = ?1
         ORDER BY sort_order ASC, id ASC;"
    ))?;
    let mut rows = stmt.query([type_id])?;
    let mut groupless = Vec::new();
    while let Some(row) = rows.next()? {
        let group_id: Option<i64> = row.get("group_id")?;
        let property = parse_property_row(row)?;
        match group_id {
            None => groupless.push(property),
            Some(group_id) => {
                let index = positions.get(&group_id).copied().ok_or_else(|| {
                    RepoError::InvalidData(format!(
                        "property type {} references group {group_id} outside member type {type_id}",
                        property.id
                    ))
                })?;
                groups[index].property_types.push(property);
            }
        }
    }

    Ok((groups, groupless))
}

fn upsert_group(conn: &Connection, type_id: i64, group: &mut PropertyGroup) -> RepoResult<()> {
    if group.has_identity() {
        let changed = conn.execute(
            "UPDATE property_groups
             SET
                alias = ?3,
                name = ?4,
                sort_order = ?5
             WHERE id = ?1
               AND type_id = ?2;",
            params![
                group.id,
                type_id,
                group.alias.as_str(),
                group.name.as_str(),
                group.sort_order,
            ],
        )?;
        if changed > 0 {
            return Ok(());
        }
        group.key = Uuid::new_v4();
    }

    conn.execute(
        "INSERT INTO property_groups (
            uuid,
            type_id,
            alias,
            name,
            sort_order
        ) VALUES (?1, ?2, ?3, ?4, ?5);",
        params![
            group.key.to_string(),
            type_id,
            group.alias.as_str(),
            group.name.as_str(),
            group.sort_order,
        ],
    )?;
    group.id = conn.last_insert_rowid();
    Ok(())
}

fn upsert_property(
    conn: &Connection,
    type_id: i64,
    group_id: Option<i64>,
    property: &mut PropertyType,
) -> RepoResult<()> {
    if property.has_identity() {
        let changed = conn.execute(
            "UPDATE property_types
             SET
                group_id = ?3,
                alias = ?4,
                name = ?5,
                description = ?6,
                sort_order = ?7,
                mandatory = ?8,
                editor_alias = ?9,
                value_storage = ?10,
                member_can_edit = ?11,
                member_can_view = ?12,
                is_sensitive = ?13
             WHERE id = ?1
               AND type_id = ?2;",
            params![
                property.id,
                type_id,
                group_id,
                property.alias.as_str(),
                property.name.as_str(),
                property.description.as_deref(),
                property.sort_order,
                bool_to_int(property.mandatory),
                property.data_type.editor_alias.as_str(),
                property.data_type.storage.as_db(),
                bool_to_int(property.member_access.can_edit),
                bool_to_int(property.member_access.can_view),
                bool_to_int(property.member_access.is_sensitive),
            ],
        )?;
        if changed > 0 {
            return Ok(());
        }
        property.key = Uuid::new_v4();
    }

    conn.execute(
        "INSERT INTO property_types (
            uuid,
            type_id,
            group_id,
            alias,
            name,
            description,
            sort_order,
            mandatory,
            editor_alias,
            value_storage,
            member_can_edit,
            member_can_view,
            is_sensitive
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13);",
        params![
            property.key.to_string(),
            type_id,
            group_id,
            property.alias.as_str(),
            property.name.as_str(),
            property.description.as_deref(),
            property.sort_order,
            bool_to_int(property.mandatory),
            property.data_type.editor_alias.as_str(),
            property.data_type.storage.as_db(),
            bool_to_int(property.member_access.can_edit),
            bool_to_int(property.member_access.can_view),
            bool_to_int(property.member_access.is_sensitive),
        ],
    )?;
    property.id = conn.last_insert_rowid();
    Ok(())
}

fn owned_ids(conn: &Connection, table: &'static str, type_id: i64) -> RepoResult<Vec<i64>> {
    let mut stmt = conn.prepare(&format!("SELECT id FROM {table} WHERE type_id = ?1;"))?;
    let mut rows = stmt.query([type_id])?;
    let mut ids = Vec::new();
    while let Some(row) = rows.next()? {
        ids.push(row.get(0)?);
    }
    Ok(ids)
}

fn parse_group_row(row: &Row<'_>) -> RepoResult<PropertyGroup> {
    let uuid_text: String = row.get("uuid")?;
    Ok(PropertyGroup {
        id: row.get("id")?,
        key: parse_uuid(&uuid_text, "property_groups.uuid")?,
        alias: row.get("alias")?,
        name: row.get("name")?,
        sort_order: row.get("sort_order")?,
        property_types: Vec::new(),
    })
}

fn parse_property_row(row: &Row<'_>) -> RepoResult<PropertyType> {
    let uuid_text: String = row.get("uuid")?;
    let storage_text: String = row.get("value_storage")?;
    let storage = ValueStorage::from_db(&storage_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid value storage `{storage_text}` in property_types.value_storage"
        ))
    })?;

    Ok(PropertyType {
        id: row.get("id")?,
        key: parse_uuid(&uuid_text, "property_types.uuid")?,
        alias: row.get("alias")?,
        name: row.get("name")?,
        description: row.get("description")?,
        sort_order: row.get("sort_order")?,
        mandatory: parse_flag(row, "mandatory")?,
        data_type: DataTypeRef::new(row.get::<_, String>("editor_alias")?, storage),
        member_access: MemberPropertyAccess {
            can_edit: parse_flag(row, "member_can_edit")?,
            can_view: parse_flag(row, "member_can_view")?,
            is_sensitive: parse_flag(row, "is_sensitive")?,
        },
    })
}

fn parse_flag(row: &Row<'_>, column: &'static str) -> RepoResult<bool> {
    match row.get::<_, i64>(column)? {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(RepoError::InvalidData(format!(
            "invalid flag value `{other}` in property_types.{column}"
        ))),
    }
}

pub(crate) fn parse_uuid(value: &str, column: &'static str) -> RepoResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid `{value}` in {column}")))
}

fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}
