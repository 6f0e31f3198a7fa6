//! YAML policy catalog
//!
//! A catalog lists policies and the groups that use them (by policy name).
//! It is loaded into a [`PolicyStore`] at start-up.

use std::collections::HashMap;
use std::path::Path;

use promptwall_core::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::rule::PolicyDraft;
use crate::store::PolicyStore;

const BUILTIN_CATALOG: &str = include_str!("../catalog/default.yaml");

/// Policies and groups to seed a store with
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyCatalog {
    #[serde(default)]
    pub policies: Vec<PolicyDraft>,

    #[serde(default)]
    pub groups: Vec<GroupSpec>,
}

/// A group definition that references policies by name
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupSpec {
    pub name: String,

    #[serde(default)]
    pub policies: Vec<String>,
}

/// What seeding actually did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub policies_created: usize,
    pub groups_created: usize,
    /// Human-readable notes for every entry that was skipped
    pub skipped: Vec<String>,
}

impl PolicyCatalog {
    /// Load a catalog from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| Error::config(format!("invalid policy catalog: {}", e)))
    }

    /// Load a catalog from a file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let catalog = Self::from_yaml(&content)?;
        info!(
            path = %path.display(),
            policies = catalog.policies.len(),
            groups = catalog.groups.len(),
            "Loaded policy catalog"
        );
        Ok(catalog)
    }

    /// The catalog shipped with the crate
    pub fn builtin() -> Result<Self> {
        Self::from_yaml(BUILTIN_CATALOG)
    }

    /// Load `path` if it exists, otherwise the built-in catalog
    pub fn load_or_builtin(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::from_file(path)
        } else {
            info!(path = %path.display(), "Policy catalog not found, using built-in catalog");
            Self::builtin()
        }
    }

    /// Create every policy and group in `store`.
    ///
    /// Policies with invalid patterns and group references to unknown policy
    /// names are skipped with a warning; store failures abort seeding.
    pub async fn seed(&self, store: &dyn PolicyStore) -> Result<SeedReport> {
        let mut report = SeedReport::default();
        let mut ids_by_name: HashMap<String, String> = HashMap::new();

        for draft in &self.policies {
            match store.create_policy(draft.clone()).await {
                Ok(policy) => {
                    ids_by_name.insert(policy.name.clone(), policy.id);
                    report.policies_created += 1;
                }
                Err(e @ Error::PolicyCompile { .. }) | Err(e @ Error::InvalidInput(_)) => {
                    warn!(policy = %draft.name, error = %e, "Skipping catalog policy");
                    report.skipped.push(format!("policy '{}': {}", draft.name, e));
                }
                Err(e) => return Err(e),
            }
        }

        for spec in &self.groups {
            let group = match store.create_group(&spec.name).await {
                Ok(group) => group,
                Err(e @ Error::DuplicateGroup(_)) | Err(e @ Error::InvalidInput(_)) => {
                    warn!(group = %spec.name, error = %e, "Skipping catalog group");
                    report.skipped.push(format!("group '{}': {}", spec.name, e));
                    continue;
                }
                Err(e) => return Err(e),
            };
            report.groups_created += 1;

            let mut members = Vec::with_capacity(spec.policies.len());
            for name in &spec.policies {
                match ids_by_name.get(name) {
                    Some(id) => members.push(id.clone()),
                    None => {
                        warn!(group = %spec.name, policy = %name, "Group references unknown policy");
                        report
                            .skipped
                            .push(format!("group '{}': unknown policy '{}'", spec.name, name));
                    }
                }
            }

            if !members.is_empty() {
                store.update_group_policies(&group.id, members).await?;
            }
        }

        info!(
            policies = report.policies_created,
            groups = report.groups_created,
            skipped = report.skipped.len(),
            "Policy store seeded"
        );
        Ok(report)
    }
}
