//! devflow stage implementations and the pipeline engine.
//!
//! This crate provides the six default stages (Refine through Package), the
//! instruction templates they send to the content generator, the stage
//! registry, and the [`Engine`] that drives the run loop.
//!
//! ## Architectural Layer
//!
//! **Orchestration layer.** Stages sequence calls between the domain rules in
//! the [`pipeline`] crate and the [`pipeline::ContentGenerator`] port. They
//! contain no I/O of their own; the generator implementation decides how
//! output is produced.
//!
//! ## Usage
//!
//! ```no_run
//! # use std::sync::Arc;
//! # async fn demo(generator: Arc<dyn pipeline::ContentGenerator>) -> anyhow::Result<()> {
//! let engine = nodes::Engine::builder().generator(generator).build()?;
//! let outcome = engine.run("Build an in-memory contact book").await?;
//! println!("approved: {}", outcome.state.approved());
//! # Ok(())
//! # }
//! ```

pub mod engine;
pub mod instructions;
pub mod registry;
pub mod stages;

pub use engine::{Engine, EngineBuilder, RunFailure, RunOutcome};
pub use registry::StageRegistry;
pub use stages::{
    DocumentStage, PackageStage, ProduceStage, RefineStage, ReviewOutcome, ReviewStage, TestStage,
};
