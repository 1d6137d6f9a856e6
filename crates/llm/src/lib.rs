//! devflow content generator backed by an LLM.
//!
//! Implements the [`pipeline::ContentGenerator`] trait for OpenAI-compatible
//! chat-completions endpoints. Additional providers are added as new
//! implementations in this crate without any changes to the `pipeline` crate.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** HTTP transport, request formatting, structured-output
//! schemas, response parsing and retry with back-off live here. The
//! [`pipeline`] crate sees only [`pipeline::ContentGenerator`].
//!
//! ## Retries
//!
//! Throttling (429), server errors (5xx) and transient transport failures are
//! retried up to [`OpenAiConfig::max_attempts`] times with exponential
//! back-off, honouring `Retry-After`. The engine never sees these retries:
//! from its side a stage makes exactly one generation call.

mod openai;

pub use openai::{OpenAiConfig, OpenAiGenerator};
