//! Core persistence for member type definitions.
//! This crate is the single source of truth for member type invariants.

pub mod cache;
pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod reconcile;
pub mod repo;
pub mod scope;
pub mod stubs;

pub use cache::{CacheKey, CacheStats, MemberTypeCache};
pub use config::RepositoryConfig;
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::member_type::{MemberType, MemberTypeKey, MemberTypeValidationError};
pub use model::property::{
    DataTypeRef, MemberPropertyAccess, PropertyGroup, PropertyType, ValueStorage,
};
pub use reconcile::{reconcile, ReconcilePolicy};
pub use repo::member_type_repo::{
    MemberTypeRepository, RepoError, RepoResult, SqliteMemberTypeRepository,
};
pub use scope::Scope;
pub use stubs::{MemberStandardProperties, PropertyTemplate, StandardPropertyCatalog};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
