//! Policy store
//!
//! CRUD over policies and groups. Patterns are compiled on create/update and
//! stored next to the policy, so evaluation never compiles a regex.

use std::sync::Arc;

use async_trait::async_trait;
use promptwall_core::{Error, Result};
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::resolver::{GroupSelector, ResolvedGroup};
use crate::rule::{CompiledPolicy, Group, Policy, PolicyDraft};

/// Persistent policy/group storage
#[async_trait]
pub trait PolicyStore: Send + Sync {
    /// Create a policy; fails with `PolicyCompile` if the pattern is invalid
    async fn create_policy(&self, draft: PolicyDraft) -> Result<Policy>;

    async fn get_policy(&self, id: &str) -> Result<Option<Policy>>;

    async fn list_policies(&self) -> Result<Vec<Policy>>;

    /// Replace a policy's fields and recompile its pattern
    async fn update_policy(&self, id: &str, draft: PolicyDraft) -> Result<Policy>;

    /// Delete a policy. Refused with `PolicyInUse` while any group refers to it.
    /// Returns false if no such policy exists.
    async fn delete_policy(&self, id: &str) -> Result<bool>;

    /// Create a group. Names are unique ignoring case; a clash fails with
    /// `DuplicateGroup`.
    async fn create_group(&self, name: &str) -> Result<Group>;

    async fn get_group(&self, id: &str) -> Result<Option<Group>>;

    async fn list_groups(&self) -> Result<Vec<Group>>;

    /// Rename a group, subject to the same uniqueness rule as creation
    async fn rename_group(&self, id: &str, name: &str) -> Result<Group>;

    async fn delete_group(&self, id: &str) -> Result<bool>;

    /// Append a policy to a group; adding an existing member is a no-op
    async fn add_policy_to_group(&self, group_id: &str, policy_id: &str) -> Result<Group>;

    async fn remove_policy_from_group(&self, group_id: &str, policy_id: &str) -> Result<Group>;

    /// Replace group membership. Duplicates collapse to their first
    /// occurrence; unknown policy ids are rejected.
    async fn update_group_policies(&self, group_id: &str, policy_ids: Vec<String>) -> Result<Group>;

    /// Find a group by id, then by case-insensitive name, and snapshot its
    /// active policies
    async fn resolve_group(&self, selector: &GroupSelector) -> Result<Option<ResolvedGroup>>;
}

#[derive(Debug, Default)]
struct StoreState {
    policies: Vec<Arc<CompiledPolicy>>,
    groups: Vec<Group>,
}

impl StoreState {
    fn policy(&self, id: &str) -> Option<&Arc<CompiledPolicy>> {
        self.policies.iter().find(|p| p.id() == id)
    }

    fn group_mut(&mut self, id: &str) -> Result<&mut Group> {
        self.groups
            .iter_mut()
            .find(|g| g.id == id)
            .ok_or_else(|| Error::GroupNotFound(id.to_string()))
    }

    fn require_policy(&self, id: &str) -> Result<()> {
        match self.policy(id) {
            Some(_) => Ok(()),
            None => Err(Error::PolicyNotFound(id.to_string())),
        }
    }

    /// Reject `name` if a group other than `except` already uses it
    fn ensure_name_free(&self, name: &str, except: Option<&str>) -> Result<()> {
        let taken = self
            .groups
            .iter()
            .any(|g| g.matches_name(name) && Some(g.id.as_str()) != except);
        if taken {
            return Err(Error::DuplicateGroup(name.to_string()));
        }
        Ok(())
    }

    fn find_group(&self, selector: &GroupSelector) -> Option<&Group> {
        let (id, name) = selector.parts();
        id.and_then(|id| self.groups.iter().find(|g| g.id == id))
            .or_else(|| name.and_then(|name| self.groups.iter().find(|g| g.matches_name(name))))
    }
}

/// In-process store guarded by a tokio `RwLock`
#[derive(Debug, Default)]
pub struct InMemoryPolicyStore {
    state: RwLock<StoreState>,
}

impl InMemoryPolicyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn new_id(prefix: &str) -> String {
    format!("{}_{}", prefix, Uuid::new_v4().simple())
}

fn validate_group_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::invalid_input("group name must not be empty"));
    }
    Ok(name.to_string())
}

#[async_trait]
impl PolicyStore for InMemoryPolicyStore {
    async fn create_policy(&self, draft: PolicyDraft) -> Result<Policy> {
        let regex = draft.validate()?;
        let policy = draft.into_policy(new_id("pol"));

        let mut state = self.state.write().await;
        state
            .policies
            .push(Arc::new(CompiledPolicy::with_regex(policy.clone(), regex)));

        info!(policy_id = %policy.id, name = %policy.name, action = %policy.action, "Policy created");
        Ok(policy)
    }

    async fn get_policy(&self, id: &str) -> Result<Option<Policy>> {
        let state = self.state.read().await;
        Ok(state.policy(id).map(|p| p.policy.clone()))
    }

    async fn list_policies(&self) -> Result<Vec<Policy>> {
        let state = self.state.read().await;
        Ok(state.policies.iter().map(|p| p.policy.clone()).collect())
    }

    async fn update_policy(&self, id: &str, draft: PolicyDraft) -> Result<Policy> {
        let regex = draft.validate()?;

        let mut state = self.state.write().await;
        let slot = state
            .policies
            .iter_mut()
            .find(|p| p.id() == id)
            .ok_or_else(|| Error::PolicyNotFound(id.to_string()))?;

        let policy = draft.into_policy(id.to_string());
        // Swap the Arc so in-flight resolutions keep the version they read.
        *slot = Arc::new(CompiledPolicy::with_regex(policy.clone(), regex));

        info!(policy_id = %id, name = %policy.name, active = policy.active, "Policy updated");
        Ok(policy)
    }

    async fn delete_policy(&self, id: &str) -> Result<bool> {
        let mut state = self.state.write().await;

        let referencing: Vec<String> = state
            .groups
            .iter()
            .filter(|g| g.contains(id))
            .map(|g| g.name.clone())
            .collect();
        if !referencing.is_empty() {
            return Err(Error::PolicyInUse {
                policy_id: id.to_string(),
                groups: referencing,
            });
        }

        let before = state.policies.len();
        state.policies.retain(|p| p.id() != id);
        let removed = state.policies.len() != before;
        if removed {
            info!(policy_id = %id, "Policy deleted");
        }
        Ok(removed)
    }

    async fn create_group(&self, name: &str) -> Result<Group> {
        let name = validate_group_name(name)?;
        let mut state = self.state.write().await;
        state.ensure_name_free(&name, None)?;

        let group = Group::new(new_id("grp"), name);
        state.groups.push(group.clone());

        info!(group_id = %group.id, name = %group.name, "Group created");
        Ok(group)
    }

    async fn get_group(&self, id: &str) -> Result<Option<Group>> {
        let state = self.state.read().await;
        Ok(state.groups.iter().find(|g| g.id == id).cloned())
    }

    async fn list_groups(&self) -> Result<Vec<Group>> {
        Ok(self.state.read().await.groups.clone())
    }

    async fn rename_group(&self, id: &str, name: &str) -> Result<Group> {
        let name = validate_group_name(name)?;
        let mut state = self.state.write().await;
        state.ensure_name_free(&name, Some(id))?;
        let group = state.group_mut(id)?;
        group.name = name;
        Ok(group.clone())
    }

    async fn delete_group(&self, id: &str) -> Result<bool> {
        let mut state = self.state.write().await;
        let before = state.groups.len();
        state.groups.retain(|g| g.id != id);
        let removed = state.groups.len() != before;
        if removed {
            info!(group_id = %id, "Group deleted");
        }
        Ok(removed)
    }

    async fn add_policy_to_group(&self, group_id: &str, policy_id: &str) -> Result<Group> {
        let mut state = self.state.write().await;
        state.require_policy(policy_id)?;
        let group = state.group_mut(group_id)?;
        if !group.add_policy(policy_id) {
            debug!(group_id = %group_id, policy_id = %policy_id, "Policy already in group");
        }
        Ok(group.clone())
    }

    async fn remove_policy_from_group(&self, group_id: &str, policy_id: &str) -> Result<Group> {
        let mut state = self.state.write().await;
        let group = state.group_mut(group_id)?;
        group.remove_policy(policy_id);
        Ok(group.clone())
    }

    async fn update_group_policies(&self, group_id: &str, policy_ids: Vec<String>) -> Result<Group> {
        let mut state = self.state.write().await;
        for id in &policy_ids {
            state.require_policy(id)?;
        }
        let group = state.group_mut(group_id)?;
        group.set_policies(policy_ids);

        info!(group_id = %group_id, policies = group.policy_ids.len(), "Group membership replaced");
        Ok(group.clone())
    }

    async fn resolve_group(&self, selector: &GroupSelector) -> Result<Option<ResolvedGroup>> {
        let state = self.state.read().await;
        Ok(state
            .find_group(selector)
            .map(|group| ResolvedGroup::assemble(group, |id| state.policy(id).cloned())))
    }
}
