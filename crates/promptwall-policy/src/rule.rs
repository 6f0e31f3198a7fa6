//! Policy and group definitions

use promptwall_core::{Error, PolicyAction, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// A single regex rule with a replacement and an action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    /// Store-assigned identifier
    pub id: String,

    /// Human-readable name, used in block reason codes
    pub name: String,

    /// Regular expression tested against the working text
    pub pattern: String,

    /// Literal text substituted for each redacted span
    pub replacement: String,

    /// Inactive policies never contribute matches
    pub active: bool,

    /// Block the prompt or redact the span
    pub action: PolicyAction,
}

/// Policy fields supplied on create/update
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyDraft {
    pub name: String,

    pub pattern: String,

    #[serde(default = "default_redaction")]
    pub replacement: String,

    #[serde(default = "default_true")]
    pub active: bool,

    pub action: PolicyAction,
}

impl PolicyDraft {
    pub fn new(name: impl Into<String>, pattern: impl Into<String>, action: PolicyAction) -> Self {
        Self {
            name: name.into(),
            pattern: pattern.into(),
            replacement: default_redaction(),
            active: true,
            action,
        }
    }

    pub fn with_replacement(mut self, replacement: impl Into<String>) -> Self {
        self.replacement = replacement.into();
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    /// Reject empty names and patterns that do not compile
    pub fn validate(&self) -> Result<Regex> {
        if self.name.trim().is_empty() {
            return Err(Error::invalid_input("policy name must not be empty"));
        }
        Regex::new(&self.pattern).map_err(|e| Error::policy_compile(&self.name, e.to_string()))
    }

    pub(crate) fn into_policy(self, id: String) -> Policy {
        Policy {
            id,
            name: self.name,
            pattern: self.pattern,
            replacement: self.replacement,
            active: self.active,
            action: self.action,
        }
    }
}

/// A named, ordered set of policy references
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: String,

    pub name: String,

    /// Evaluation order; never contains duplicates
    #[serde(default)]
    pub policy_ids: Vec<String>,
}

impl Group {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            policy_ids: Vec::new(),
        }
    }

    /// Append a policy; returns false if it was already a member
    pub fn add_policy(&mut self, policy_id: &str) -> bool {
        if self.contains(policy_id) {
            return false;
        }
        self.policy_ids.push(policy_id.to_string());
        true
    }

    pub fn remove_policy(&mut self, policy_id: &str) -> bool {
        let before = self.policy_ids.len();
        self.policy_ids.retain(|id| id != policy_id);
        self.policy_ids.len() != before
    }

    /// Replace membership, keeping the first occurrence of each id
    pub fn set_policies(&mut self, policy_ids: impl IntoIterator<Item = String>) {
        self.policy_ids.clear();
        for id in policy_ids {
            if !self.contains(&id) {
                self.policy_ids.push(id);
            }
        }
    }

    pub fn contains(&self, policy_id: &str) -> bool {
        self.policy_ids.iter().any(|id| id == policy_id)
    }

    /// Case-insensitive exact name match
    pub fn matches_name(&self, name: &str) -> bool {
        self.name.to_lowercase() == name.trim().to_lowercase()
    }
}

/// A policy stored alongside its compiled pattern
#[derive(Debug, Clone)]
pub struct CompiledPolicy {
    pub policy: Policy,
    regex: Option<Regex>,
    compile_error: Option<String>,
}

impl CompiledPolicy {
    /// Compile the policy's pattern. Never fails: a bad pattern is kept as an
    /// error string and the engine skips the policy.
    pub fn compile(policy: Policy) -> Self {
        match Regex::new(&policy.pattern) {
            Ok(regex) => Self {
                policy,
                regex: Some(regex),
                compile_error: None,
            },
            Err(e) => Self {
                policy,
                regex: None,
                compile_error: Some(e.to_string()),
            },
        }
    }

    pub(crate) fn with_regex(policy: Policy, regex: Regex) -> Self {
        Self {
            policy,
            regex: Some(regex),
            compile_error: None,
        }
    }

    pub fn regex(&self) -> Option<&Regex> {
        self.regex.as_ref()
    }

    pub fn compile_error(&self) -> Option<&str> {
        self.compile_error.as_deref()
    }

    pub fn id(&self) -> &str {
        &self.policy.id
    }

    pub fn name(&self) -> &str {
        &self.policy.name
    }

    pub fn action(&self) -> PolicyAction {
        self.policy.action
    }

    pub fn is_active(&self) -> bool {
        self.policy.active
    }
}

impl AsRef<CompiledPolicy> for CompiledPolicy {
    fn as_ref(&self) -> &CompiledPolicy {
        self
    }
}

fn default_redaction() -> String {
    "[REDACTED]".to_string()
}

fn default_true() -> bool {
    true
}
