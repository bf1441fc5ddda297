//! Policy store boundary.
//!
//! Two append-only fact tables back the engine: `policy(role, object, action)`
//! and `grouping(subject, role)`. This module defines the storage-agnostic
//! contract plus an in-memory implementation for tests/dev.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryPolicyStore;
pub use r#trait::{GroupingRule, PolicyFilter, PolicyRule, PolicySnapshot, PolicyStore};
