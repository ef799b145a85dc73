//! Built-in (standard) member property catalog.
//!
//! # Responsibility
//! - Provide the ordered list of property templates every member type must
//!   eventually contain, plus the alias/name of the group that holds them.
//!
//! # Invariants
//! - The catalog is immutable and stateless.
//! - Templates are never handed out with identity; `instantiate` always
//!   produces a fresh key and `id = 0`.

use crate::model::property::{DataTypeRef, MemberPropertyAccess, PropertyType, ValueStorage};
use once_cell::sync::Lazy;

/// Default alias of the built-in member property group.
pub const STANDARD_GROUP_ALIAS: &str = "membership";
/// Default display name of the built-in member property group.
pub const STANDARD_GROUP_NAME: &str = "Membership";

pub const COMMENTS_ALIAS: &str = "umbracoMemberComments";
pub const FAILED_PASSWORD_ATTEMPTS_ALIAS: &str = "umbracoMemberFailedPasswordAttempts";
pub const APPROVED_ALIAS: &str = "umbracoMemberApproved";
pub const LOCKED_OUT_ALIAS: &str = "umbracoMemberLockedOut";
pub const LAST_LOCKOUT_DATE_ALIAS: &str = "umbracoMemberLastLockoutDate";
pub const LAST_LOGIN_DATE_ALIAS: &str = "umbracoMemberLastLogin";
pub const LAST_PASSWORD_CHANGE_DATE_ALIAS: &str = "umbracoMemberLastPasswordChangeDate";

/// Default definition of one built-in property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyTemplate {
    pub alias: &'static str,
    pub name: &'static str,
    pub data_type: DataTypeRef,
    pub member_access: MemberPropertyAccess,
}

impl PropertyTemplate {
    /// Clones the template into a transient property type.
    pub fn instantiate(&self, sort_order: i32) -> PropertyType {
        let mut property = PropertyType::new(self.alias, self.name, self.data_type.clone());
        property.sort_order = sort_order;
        property.member_access = self.member_access;
        property
    }
}

/// Read-only source of built-in property definitions.
pub trait StandardPropertyCatalog {
    /// Alias of the group that receives missing built-ins.
    fn group_alias(&self) -> &str;
    /// Display name used when that group has to be created.
    fn group_name(&self) -> &str;
    /// Templates in catalog order.
    fn templates(&self) -> &[PropertyTemplate];

    /// Finds a template by alias, ignoring case.
    fn template(&self, alias: &str) -> Option<&PropertyTemplate> {
        self.templates()
            .iter()
            .find(|template| template.alias.eq_ignore_ascii_case(alias))
    }
}

static MEMBER_TEMPLATES: Lazy<Vec<PropertyTemplate>> = Lazy::new(|| {
    let label = |storage| DataTypeRef::new("Umbraco.Label", storage);
    let read_only = MemberPropertyAccess::default();
    vec![
        PropertyTemplate {
            alias: COMMENTS_ALIAS,
            name: "Comments",
            data_type: DataTypeRef::new("Umbraco.TextArea", ValueStorage::Ntext),
            member_access: read_only,
        },
        PropertyTemplate {
            alias: FAILED_PASSWORD_ATTEMPTS_ALIAS,
            name: "Failed Password Attempts",
            data_type: label(ValueStorage::Integer),
            member_access: read_only,
        },
        PropertyTemplate {
            alias: APPROVED_ALIAS,
            name: "Is Approved",
            data_type: DataTypeRef::new("Umbraco.TrueFalse", ValueStorage::Integer),
            member_access: read_only,
        },
        PropertyTemplate {
            alias: LOCKED_OUT_ALIAS,
            name: "Is Locked Out",
            data_type: DataTypeRef::new("Umbraco.TrueFalse", ValueStorage::Integer),
            member_access: read_only,
        },
        PropertyTemplate {
            alias: LAST_LOCKOUT_DATE_ALIAS,
            name: "Last Lockout Date",
            data_type: label(ValueStorage::Date),
            member_access: read_only,
        },
        PropertyTemplate {
            alias: LAST_LOGIN_DATE_ALIAS,
            name: "Last Login Date",
            data_type: label(ValueStorage::Date),
            member_access: read_only,
        },
        PropertyTemplate {
            alias: LAST_PASSWORD_CHANGE_DATE_ALIAS,
            name: "Last Password Change Date",
            data_type: label(ValueStorage::Date),
            member_access: read_only,
        },
    ]
});

/// Standard member property catalog.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemberStandardProperties;

impl StandardPropertyCatalog for MemberStandardProperties {
    fn group_alias(&self) -> &str {
        STANDARD_GROUP_ALIAS
    }

    fn group_name(&self) -> &str {
        STANDARD_GROUP_NAME
    }

    fn templates(&self) -> &[PropertyTemplate] {
        MEMBER_TEMPLATES.as_slice()
    }
}
