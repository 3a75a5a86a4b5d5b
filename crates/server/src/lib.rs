//! Server crate for the anime recommendation pipeline.
//!
//! This crate owns the composition root: configuration, the orchestrator
//! that drives normalize -> retrieve -> synthesize, its retry policy and
//! error surface, and the lazily initialized pipeline handle.

pub mod config;
pub mod error;
pub mod handle;
pub mod orchestrator;
pub mod retry;

pub use config::{AppConfig, ConfigError, Credentials, IndexKind};
pub use error::{ErrorKind, FailureCause, RecommendationError, StartupError};
pub use handle::{ConfigFactory, PipelineError, PipelineFactory, PipelineHandle};
pub use orchestrator::{build_embedder, build_retriever, Recommendation, RecommendationOrchestrator};
pub use retry::RetryPolicy;
