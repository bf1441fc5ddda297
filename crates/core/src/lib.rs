//! `quire-core` — shared building blocks for the authorization engine.
//!
//! This crate contains **pure** primitives (no storage or transport concerns).

pub mod context;
pub mod error;
pub mod id;

pub use context::{Interrupted, OpContext};
pub use error::{DomainError, DomainResult};
pub use id::{AppUserId, GroupId, OrganizationId, SpaceId, WorkbookId};
