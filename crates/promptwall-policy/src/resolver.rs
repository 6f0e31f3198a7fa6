//! Group resolution
//!
//! Turns a request's group selector into the live, ordered set of active
//! policies. Every call reads the store; nothing is cached between requests.

use std::sync::Arc;

use promptwall_core::{GroupRef, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::rule::{CompiledPolicy, Group, Policy};
use crate::store::PolicyStore;

/// Group identifier supplied with a request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSelector {
    #[serde(default, alias = "group_id")]
    pub id: Option<String>,

    #[serde(default, alias = "group_name", alias = "group")]
    pub name: Option<String>,
}

impl GroupSelector {
    pub fn by_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            name: None,
        }
    }

    pub fn by_name(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: Some(name.into()),
        }
    }

    pub fn none() -> Self {
        Self::default()
    }

    /// Id and name, with blank values dropped
    pub fn parts(&self) -> (Option<&str>, Option<&str>) {
        fn clean(v: &Option<String>) -> Option<&str> {
            v.as_deref().map(str::trim).filter(|s| !s.is_empty())
        }
        (clean(&self.id), clean(&self.name))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.parts(), (None, None))
    }
}

/// A group with its policies looked up at resolution time
#[derive(Debug, Clone)]
pub struct ResolvedGroup {
    pub group: GroupRef,
    /// Active policies in membership order
    pub policies: Vec<Arc<CompiledPolicy>>,
}

impl ResolvedGroup {
    /// Build from a group, looking up each member. Dangling ids and inactive
    /// policies are left out.
    pub fn assemble<F>(group: &Group, mut lookup: F) -> Self
    where
        F: FnMut(&str) -> Option<Arc<CompiledPolicy>>,
    {
        let policies = group
            .policy_ids
            .iter()
            .filter_map(|id| {
                let found = lookup(id);
                if found.is_none() {
                    debug!(group = %group.name, policy_id = %id, "Skipping dangling policy reference");
                }
                found
            })
            .filter(|policy| policy.is_active())
            .collect();

        Self {
            group: GroupRef {
                id: group.id.clone(),
                name: group.name.clone(),
            },
            policies,
        }
    }

    pub fn summary(&self) -> ResolvedGroupSummary {
        ResolvedGroupSummary {
            id: self.group.id.clone(),
            name: self.group.name.clone(),
            policies: self.policies.iter().map(|p| p.policy.clone()).collect(),
        }
    }
}

/// Serializable view of a resolved group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedGroupSummary {
    pub id: String,
    pub name: String,
    pub policies: Vec<Policy>,
}

/// Resolve a selector against the store; an empty selector resolves to nothing
pub async fn resolve(store: &dyn PolicyStore, selector: &GroupSelector) -> Result<Option<ResolvedGroup>> {
    if selector.is_empty() {
        return Ok(None);
    }
    store.resolve_group(selector).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::PolicyDraft;
    use promptwall_core::PolicyAction;
    use std::collections::HashMap;

    #[test]
    fn test_selector_parts_ignore_blanks() {
        let selector = GroupSelector {
            id: Some("  ".into()),
            name: Some(" Admin ".into()),
        };
        assert_eq!(selector.parts(), (None, Some("Admin")));
        assert!(GroupSelector::none().is_empty());
        assert!(!GroupSelector::by_id("g1").is_empty());
    }

    #[test]
    fn test_selector_accepts_request_aliases() {
        let selector: GroupSelector = serde_json::from_str(r#"{"group_name": "Developer Group"}"#).unwrap();
        assert_eq!(selector.name.as_deref(), Some("Developer Group"));
    }

    #[test]
    fn test_assemble_skips_inactive_and_dangling() {
        let active = Arc::new(CompiledPolicy::compile(
            PolicyDraft::new("Email", "@", PolicyAction::Redact).into_policy("p1".into()),
        ));
        let inactive = Arc::new(CompiledPolicy::compile(
            PolicyDraft::new("Phone", r"\d", PolicyAction::Redact)
                .inactive()
                .into_policy("p2".into()),
        ));
        let table: HashMap<&str, Arc<CompiledPolicy>> = [("p1", active), ("p2", inactive)].into_iter().collect();

        let mut group = Group::new("g1", "Basic");
        group.set_policies(vec!["p2".into(), "missing".into(), "p1".into()]);

        let resolved = ResolvedGroup::assemble(&group, |id| table.get(id).cloned());
        assert_eq!(resolved.policies.len(), 1);
        assert_eq!(resolved.policies[0].id(), "p1");
        assert_eq!(resolved.summary().name, "Basic");
    }
}
