//! Repository configuration.
//!
//! # Responsibility
//! - Collect tunables for scopes and repositories in one serde-friendly shape.
//!
//! # Invariants
//! - Missing fields fall back to [`RepositoryConfig::default`].

use crate::reconcile::ReconcilePolicy;
use serde::{Deserialize, Serialize};

/// Default per-scope cache capacity, counted in key entries.
pub const DEFAULT_CACHE_CAPACITY: usize = 256;

/// Settings shared by [`crate::Scope`] and the member type repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    /// Maximum cached key entries per scope. Each aggregate uses three.
    pub cache_capacity: usize,
    /// Call sites that run built-in property reconciliation.
    pub reconcile: ReconcilePolicy,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            reconcile: ReconcilePolicy::default(),
        }
    }
}
