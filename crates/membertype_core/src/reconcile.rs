//! Built-in property reconciliation.
//!
//! # Responsibility
//! - Detect which catalog properties a member type is missing.
//! - Merge missing properties into the built-in group, creating it if needed.
//! - Own the policy deciding at which repository call sites this runs.
//!
//! # Invariants
//! - Alias comparison is case-insensitive and spans every group plus the
//!   groupless bucket.
//! - Missing properties are injected without identity; storage assigns it.
//! - Existing groups with a different alias are never reused as the
//!   built-in group.

use crate::model::member_type::MemberType;
use crate::model::property::PropertyGroup;
use crate::stubs::{PropertyTemplate, StandardPropertyCatalog};
use serde::{Deserialize, Serialize};

/// Call sites at which the repository runs [`reconcile`].
///
/// Defaults to create and fetch, but not update: a rename of a built-in alias
/// survives an update and is reverted by the next fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcilePolicy {
    /// Reconcile a member type without identity before it is inserted.
    pub on_create: bool,
    /// Reconcile a member type with identity before it is updated.
    pub on_update: bool,
    /// Reconcile after loading from storage and persist any delta.
    pub on_fetch: bool,
}

impl Default for ReconcilePolicy {
    fn default() -> Self {
        Self {
            on_create: true,
            on_update: false,
            on_fetch: true,
        }
    }
}

/// Returns catalog templates absent from `member_type`, in catalog order.
pub fn missing_templates<'c, C>(member_type: &MemberType, catalog: &'c C) -> Vec<&'c PropertyTemplate>
where
    C: StandardPropertyCatalog + ?Sized,
{
    let present = member_type.property_aliases();
    catalog
        .templates()
        .iter()
        .filter(|template| !present.contains(&template.alias.to_ascii_lowercase()))
        .collect()
}

/// Injects missing built-in properties into `member_type`.
///
/// New properties lead the built-in group in catalog order; properties that
/// were already in the group follow in their previous relative order. Sort
/// orders inside the group are renumbered to match.
///
/// Returns whether the aggregate changed.
pub fn reconcile<C>(member_type: &mut MemberType, catalog: &C) -> bool
where
    C: StandardPropertyCatalog + ?Sized,
{
    let missing = missing_templates(member_type, catalog);
    if missing.is_empty() {
        return false;
    }

    if member_type.property_group(catalog.group_alias()).is_none() {
        let mut group = PropertyGroup::new(catalog.group_alias(), catalog.group_name());
        group.sort_order = next_group_sort_order(member_type);
        member_type.property_groups.push(group);
    }

    let Some(group) = member_type.property_group_mut(catalog.group_alias()) else {
        return false;
    };

    let existing = std::mem::take(&mut group.property_types);
    group.property_types = missing
        .iter()
        .map(|template| template.instantiate(0))
        .chain(existing)
        .collect();
    for (index, property) in group.property_types.iter_mut().enumerate() {
        property.sort_order = index as i32;
    }

    true
}

fn next_group_sort_order(member_type: &MemberType) -> i32 {
    member_type
        .property_groups
        .iter()
        .map(|group| group.sort_order + 1)
        .max()
        .unwrap_or(0)
}
