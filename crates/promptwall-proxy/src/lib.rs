//! PromptWall Proxy
//!
//! HTTP front door for the prompt firewall. Every prompt is classified,
//! matched against its group's policies, and either blocked or forwarded in
//! redacted form; each decision lands in the observability sink.

pub mod cli;
pub mod config;
pub mod generation;
pub mod pipeline;
pub mod routes;
pub mod security;
pub mod state;

pub use config::{ConfigOverrides, ProxyConfig};
pub use generation::{EchoGenerator, FragmentStream, GenerationOracle, OpenAiGenerator};
pub use pipeline::{SanitizationPipeline, SanitizeRequest};
pub use routes::{create_router, AppError, STATUS_HEADER};
pub use state::AppState;
