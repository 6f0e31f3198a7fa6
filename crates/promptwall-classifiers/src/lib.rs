//! PromptWall Classifiers
//!
//! Intent classification oracles. Each returns a raw label for a prompt:
//! - [`KeywordIntentClassifier`]: offline phrase matching
//! - [`RemoteIntentClassifier`]: an OpenAI-compatible chat model

pub mod classifier;
pub mod keyword;
pub mod remote;

pub use classifier::{IntentClassifier, LABEL_MALICIOUS, LABEL_SAFE};
pub use keyword::{KeywordIntentClassifier, PhraseCategory, PhraseHit};
pub use remote::{RemoteClassifierConfig, RemoteIntentClassifier};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::classifier::IntentClassifier;
    pub use crate::keyword::KeywordIntentClassifier;
    pub use crate::remote::{RemoteClassifierConfig, RemoteIntentClassifier};
}
