//! Member type aggregate.
//!
//! # Responsibility
//! - Hold the ordered group/property composition of one member type.
//! - Expose a flattened, computed view over grouped and groupless properties.
//! - Validate write preconditions before any persistence happens.
//!
//! # Invariants
//! - `key` is stable and never reused for another member type.
//! - `alias` must be non-empty at persist time.
//! - Property aliases are unique within one aggregate, ignoring case.
//! - The flattened property view is derived, never stored.

use crate::model::property::{PropertyGroup, PropertyType};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier of a member type, independent from storage identity.
pub type MemberTypeKey = Uuid;

/// Validation errors raised before a member type is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberTypeValidationError {
    /// Member type alias is empty or whitespace.
    EmptyAlias,
    /// A property group has an empty alias.
    EmptyGroupAlias,
    /// Two property groups share an alias (case-insensitive).
    DuplicateGroupAlias(String),
    /// A property type has an empty alias.
    EmptyPropertyAlias,
    /// Two property types share an alias (case-insensitive).
    DuplicatePropertyAlias(String),
}

impl Display for MemberTypeValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyAlias => write!(f, "member type alias cannot be empty"),
            Self::EmptyGroupAlias => write!(f, "property group alias cannot be empty"),
            Self::DuplicateGroupAlias(alias) => {
                write!(f, "property group alias `{alias}` is used more than once")
            }
            Self::EmptyPropertyAlias => write!(f, "property type alias cannot be empty"),
            Self::DuplicatePropertyAlias(alias) => {
                write!(f, "property type alias `{alias}` is used more than once")
            }
        }
    }
}

impl Error for MemberTypeValidationError {}

/// Composite schema definition for members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberType {
    /// Surrogate storage id; `0` until the first successful save.
    pub id: i64,
    pub key: MemberTypeKey,
    /// Primary human-facing lookup key.
    pub alias: String,
    pub name: String,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub property_groups: Vec<PropertyGroup>,
    /// Properties that belong to no group.
    pub no_group_property_types: Vec<PropertyType>,
}

impl MemberType {
    /// Creates a transient member type with a generated stable key.
    pub fn new(alias: impl Into<String>, name: impl Into<String>) -> Self {
        Self::with_key(Uuid::new_v4(), alias, name)
    }

    /// Creates a transient member type with a caller-provided stable key.
    ///
    /// Used by import paths where the key already exists externally.
    pub fn with_key(key: MemberTypeKey, alias: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: 0,
            key,
            alias: alias.into(),
            name: name.into(),
            description: None,
            icon: None,
            property_groups: Vec::new(),
            no_group_property_types: Vec::new(),
        }
    }

    pub fn has_identity(&self) -> bool {
        self.id != 0
    }

    /// Iterates every property type: grouped ones in group order, then groupless.
    pub fn property_types(&self) -> impl Iterator<Item = &PropertyType> {
        self.property_groups
            .iter()
            .flat_map(|group| group.property_types.iter())
            .chain(self.no_group_property_types.iter())
    }

    /// Mutable counterpart of [`MemberType::property_types`].
    pub fn property_types_mut(&mut self) -> impl Iterator<Item = &mut PropertyType> {
        self.property_groups
            .iter_mut()
            .flat_map(|group| group.property_types.iter_mut())
            .chain(self.no_group_property_types.iter_mut())
    }

    pub fn property_type_count(&self) -> usize {
        self.property_types().count()
    }

    /// ASCII-lowercased set of all property aliases.
    pub fn property_aliases(&self) -> HashSet<String> {
        self.property_types()
            .map(|property| property.alias.to_ascii_lowercase())
            .collect()
    }

    pub fn property_type(&self, alias: &str) -> Option<&PropertyType> {
        self.property_types()
            .find(|property| property.alias.eq_ignore_ascii_case(alias))
    }

    pub fn property_type_mut(&mut self, alias: &str) -> Option<&mut PropertyType> {
        self.property_types_mut()
            .find(|property| property.alias.eq_ignore_ascii_case(alias))
    }

    pub fn property_group(&self, alias: &str) -> Option<&PropertyGroup> {
        self.property_groups
            .iter()
            .find(|group| group.alias.eq_ignore_ascii_case(alias))
    }

    pub fn property_group_mut(&mut self, alias: &str) -> Option<&mut PropertyGroup> {
        self.property_groups
            .iter_mut()
            .find(|group| group.alias.eq_ignore_ascii_case(alias))
    }

    /// Returns the group owning the given property, `None` when groupless or absent.
    pub fn group_of(&self, property_alias: &str) -> Option<&PropertyGroup> {
        self.property_groups
            .iter()
            .find(|group| group.property_type(property_alias).is_some())
    }

    /// Appends a group. Returns `false` when a group with that alias already exists.
    pub fn add_property_group(&mut self, mut group: PropertyGroup) -> bool {
        if self.property_group(&group.alias).is_some() {
            return false;
        }
        if group.sort_order == 0 {
            group.sort_order = self.property_groups.len() as i32;
        }
        self.property_groups.push(group);
        true
    }

    /// Appends a property to the named group, or to the groupless bucket when
    /// `group_alias` is `None`.
    ///
    /// Returns `false` when the alias is already taken or the group is missing.
    pub fn add_property_type(&mut self, group_alias: Option<&str>, mut property: PropertyType) -> bool {
        if self.property_type(&property.alias).is_some() {
            return false;
        }
        let bucket = match group_alias {
            Some(alias) => match self.property_group_mut(alias) {
                Some(group) => &mut group.property_types,
                None => return false,
            },
            None => &mut self.no_group_property_types,
        };
        if property.sort_order == 0 {
            property.sort_order = bucket.len() as i32;
        }
        bucket.push(property);
        true
    }

    /// Removes every property type while keeping the groups.
    pub fn clear_property_types(&mut self) {
        for group in &mut self.property_groups {
            group.property_types.clear();
        }
        self.no_group_property_types.clear();
    }

    /// Validates write preconditions.
    ///
    /// # Errors
    /// - `EmptyAlias` when the member type alias is blank.
    /// - `EmptyGroupAlias` / `DuplicateGroupAlias` for group alias problems.
    /// - `EmptyPropertyAlias` / `DuplicatePropertyAlias` for property alias problems.
    pub fn validate(&self) -> Result<(), MemberTypeValidationError> {
        if self.alias.trim().is_empty() {
            return Err(MemberTypeValidationError::EmptyAlias);
        }

        let mut group_aliases = HashSet::new();
        for group in &self.property_groups {
            if group.alias.trim().is_empty() {
                return Err(MemberTypeValidationError::EmptyGroupAlias);
            }
            if !group_aliases.insert(group.alias.to_ascii_lowercase()) {
                return Err(MemberTypeValidationError::DuplicateGroupAlias(
                    group.alias.clone(),
                ));
            }
        }

        let mut property_aliases = HashSet::new();
        for property in self.property_types() {
            if property.alias.trim().is_empty() {
                return Err(MemberTypeValidationError::EmptyPropertyAlias);
            }
            if !property_aliases.insert(property.alias.to_ascii_lowercase()) {
                return Err(MemberTypeValidationError::DuplicatePropertyAlias(
                    property.alias.clone(),
                ));
            }
        }

        Ok(())
    }
}
