//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define use-case oriented data access contracts for member types.
//! - Isolate SQLite query details from reconciliation and caching policy.
//!
//! # Invariants
//! - Repository writes must enforce `MemberType::validate()` before persistence.
//! - Single-entity reads report absence as `None`, not as an error.

pub mod member_type_repo;
pub mod property_store;
