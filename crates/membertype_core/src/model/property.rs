//! Property group and property type model.
//!
//! # Responsibility
//! - Define the nested building blocks of a member type.
//! - Carry storage identity (`id`) separately from stable identity (`key`).
//!
//! # Invariants
//! - `id == 0` means "not persisted yet"; storage assigns the real value.
//! - `key` is generated once at construction and never reassigned.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Storage kind used for values of one property type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueStorage {
    /// Short text.
    Nvarchar,
    /// Long text.
    Ntext,
    /// Whole numbers and booleans.
    Integer,
    /// Epoch milliseconds.
    Date,
}

impl ValueStorage {
    pub(crate) fn as_db(self) -> &'static str {
        match self {
            Self::Nvarchar => "nvarchar",
            Self::Ntext => "ntext",
            Self::Integer => "integer",
            Self::Date => "date",
        }
    }

    pub(crate) fn from_db(value: &str) -> Option<Self> {
        match value {
            "nvarchar" => Some(Self::Nvarchar),
            "ntext" => Some(Self::Ntext),
            "integer" => Some(Self::Integer),
            "date" => Some(Self::Date),
            _ => None,
        }
    }
}

/// Opaque reference to a data type definition owned elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataTypeRef {
    /// Property editor alias, e.g. `Umbraco.TextArea`.
    pub editor_alias: String,
    pub storage: ValueStorage,
}

impl DataTypeRef {
    pub fn new(editor_alias: impl Into<String>, storage: ValueStorage) -> Self {
        Self {
            editor_alias: editor_alias.into(),
            storage,
        }
    }
}

/// Member-facing visibility flags for one property type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberPropertyAccess {
    /// Member may edit the value on their own profile.
    pub can_edit: bool,
    /// Value is shown on the member's own profile.
    pub can_view: bool,
    /// Value is hidden from back-office users without sensitive-data access.
    pub is_sensitive: bool,
}

/// One field definition inside a member type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyType {
    /// Surrogate storage id; `0` until persisted.
    pub id: i64,
    pub key: Uuid,
    /// Unique within the owning member type, compared case-insensitively.
    pub alias: String,
    pub name: String,
    pub description: Option<String>,
    pub sort_order: i32,
    pub mandatory: bool,
    pub data_type: DataTypeRef,
    pub member_access: MemberPropertyAccess,
}

impl PropertyType {
    /// Creates a transient property type with a fresh stable key.
    pub fn new(alias: impl Into<String>, name: impl Into<String>, data_type: DataTypeRef) -> Self {
        Self {
            id: 0,
            key: Uuid::new_v4(),
            alias: alias.into(),
            name: name.into(),
            description: None,
            sort_order: 0,
            mandatory: false,
            data_type,
            member_access: MemberPropertyAccess::default(),
        }
    }

    pub fn has_identity(&self) -> bool {
        self.id != 0
    }
}

/// Named, ordered container of property types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyGroup {
    /// Surrogate storage id; `0` until persisted.
    pub id: i64,
    pub key: Uuid,
    pub alias: String,
    pub name: String,
    pub sort_order: i32,
    pub property_types: Vec<PropertyType>,
}

impl PropertyGroup {
    /// Creates an empty transient group with a fresh stable key.
    pub fn new(alias: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: 0,
            key: Uuid::new_v4(),
            alias: alias.into(),
            name: name.into(),
            sort_order: 0,
            property_types: Vec::new(),
        }
    }

    pub fn has_identity(&self) -> bool {
        self.id != 0
    }

    /// Finds a property in this group by alias, ignoring case.
    pub fn property_type(&self, alias: &str) -> Option<&PropertyType> {
        self.property_types
            .iter()
            .find(|property| property.alias.eq_ignore_ascii_case(alias))
    }
}
