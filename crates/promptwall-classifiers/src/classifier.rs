//! Intent classifier trait

use async_trait::async_trait;
use promptwall_core::Result;

/// Label a prompt's intent.
///
/// Implementations return the oracle's raw label. Normalization and the
/// fallback for labels outside `safe`/`malicious` belong to the caller.
/// An unreachable oracle is an error, never a label.
#[async_trait]
pub trait IntentClassifier: Send + Sync {
    /// Classify the given text
    async fn classify(&self, text: &str) -> Result<String>;

    /// Get the classifier name
    fn name(&self) -> &str;
}

pub const LABEL_SAFE: &str = "safe";
pub const LABEL_MALICIOUS: &str = "malicious";
