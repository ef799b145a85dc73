//! Member type domain model.
//!
//! # Responsibility
//! - Define the aggregate (member type) and its nested groups/properties.
//! - Keep grouped and flattened property views consistent by computing the
//!   flattened one on demand.
//!
//! # Invariants
//! - Every object carries a stable `key`; storage `id` stays `0` until saved.

pub mod member_type;
pub mod property;
