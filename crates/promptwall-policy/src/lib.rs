//! PromptWall Policy Engine
//!
//! Flat regular-expression policies grouped into enforcement contexts.
//!
//! - [`Policy`]: one pattern with a replacement and a block/redact action
//! - [`Group`]: an ordered set of policy references
//! - [`FirewallEngine`]: block-before-redact evaluation over a resolved group
//! - [`PolicyStore`]: CRUD and live group resolution
//! - [`PolicyCatalog`]: YAML seed data for a store

pub mod catalog;
pub mod engine;
pub mod resolver;
pub mod rule;
pub mod store;

pub use catalog::{GroupSpec, PolicyCatalog, SeedReport};
pub use engine::{BlockedBy, EngineWarning, Evaluation, FirewallEngine};
pub use resolver::{resolve, GroupSelector, ResolvedGroup, ResolvedGroupSummary};
pub use rule::{CompiledPolicy, Group, Policy, PolicyDraft};
pub use store::{InMemoryPolicyStore, PolicyStore};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::catalog::PolicyCatalog;
    pub use crate::engine::{Evaluation, FirewallEngine};
    pub use crate::resolver::{GroupSelector, ResolvedGroup};
    pub use crate::rule::{CompiledPolicy, Group, Policy, PolicyDraft};
    pub use crate::store::{InMemoryPolicyStore, PolicyStore};
}
