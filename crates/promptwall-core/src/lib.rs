//! PromptWall Core
//!
//! Core types and utilities shared across PromptWall components.
//!
//! This crate provides:
//! - The decision data model produced by the sanitization pipeline
//! - Error types and result handling
//! - Stream adapters for parsing generation backend output

pub mod adapters;
pub mod error;
pub mod stream_adapter;
pub mod types;

pub use adapters::OpenAiAdapter;
pub use error::{Error, Result};
pub use stream_adapter::{EventBuffer, ParsedChunk, StreamAdapter};
pub use types::{
    Decision, DecisionStatus, GroupRef, Intent, PolicyAction, PolicyMatch, ReasonCode,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::types::{Decision, DecisionStatus, Intent, PolicyAction, PolicyMatch};
}
