//! Stream adapters for generation backends

mod openai;

pub use openai::OpenAiAdapter;
