//! Error types for PromptWall

/// Result type alias using PromptWall's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for PromptWall operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Missing or empty prompt, malformed request data
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// No group matched the selector
    #[error("group not found: {0}")]
    GroupNotFound(String),

    /// Another group already uses this name (names compare case-insensitively)
    #[error("group name already in use: {0}")]
    DuplicateGroup(String),

    /// No policy with the given id
    #[error("policy not found: {0}")]
    PolicyNotFound(String),

    /// Policy is still referenced by one or more groups
    #[error("policy {policy_id} is referenced by groups: {}", groups.join(", "))]
    PolicyInUse {
        policy_id: String,
        groups: Vec<String>,
    },

    /// A policy pattern failed to compile
    #[error("policy '{policy}' has an invalid pattern: {reason}")]
    PolicyCompile { policy: String, reason: String },

    /// Classification or generation oracle could not be reached
    #[error("oracle unavailable: {0}")]
    OracleUnavailable(String),

    /// Observability sink could not persist a record
    #[error("sink write failure: {0}")]
    SinkWrite(String),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// Network/IO errors
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic internal errors
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a new policy compile error
    pub fn policy_compile(policy: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::PolicyCompile {
            policy: policy.into(),
            reason: reason.into(),
        }
    }

    /// Create a new oracle unavailable error
    pub fn oracle(msg: impl Into<String>) -> Self {
        Self::OracleUnavailable(msg.into())
    }

    /// Create a new sink write error
    pub fn sink(msg: impl Into<String>) -> Self {
        Self::SinkWrite(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Short machine-readable kind, safe to expose to callers
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::GroupNotFound(_) => "group_not_found",
            Self::DuplicateGroup(_) => "duplicate_group",
            Self::PolicyNotFound(_) => "policy_not_found",
            Self::PolicyInUse { .. } => "policy_in_use",
            Self::PolicyCompile { .. } => "policy_compile_error",
            Self::OracleUnavailable(_) => "oracle_unavailable",
            Self::SinkWrite(_) => "sink_write_failure",
            Self::Config(_) => "config_error",
            Self::Io(_) => "io_error",
            Self::Serialization(_) => "serialization_error",
            Self::Internal(_) => "internal_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_in_use_message() {
        let err = Error::PolicyInUse {
            policy_id: "p1".to_string(),
            groups: vec!["Admin Group".to_string(), "Developers".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "policy p1 is referenced by groups: Admin Group, Developers"
        );
        assert_eq!(err.kind(), "policy_in_use");
    }

    #[test]
    fn test_oracle_kind_hides_detail() {
        let err = Error::oracle("connection refused (os error 111)");
        assert_eq!(err.kind(), "oracle_unavailable");
    }
}
