//! Lazily constructed, process-wide pipeline handle.
//!
//! Hosts that cannot build the orchestrator up front (an interactive shell,
//! a UI callback) hold a `PipelineHandle` instead. The first caller runs the
//! factory; concurrent first callers wait on that same construction. A failed
//! construction leaves the handle empty, so the next call tries again.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::info;

use crate::config::{AppConfig, Credentials};
use crate::error::{RecommendationError, StartupError};
use crate::orchestrator::RecommendationOrchestrator;

/// Builds the orchestrator on first use
#[async_trait]
pub trait PipelineFactory: Send + Sync {
    async fn build(&self) -> Result<RecommendationOrchestrator, StartupError>;
}

/// Factory backed by validated configuration and resolved credentials
pub struct ConfigFactory {
    config: AppConfig,
    credentials: Credentials,
}

impl ConfigFactory {
    pub fn new(config: AppConfig, credentials: Credentials) -> Self {
        Self {
            config,
            credentials,
        }
    }
}

#[async_trait]
impl PipelineFactory for ConfigFactory {
    async fn build(&self) -> Result<RecommendationOrchestrator, StartupError> {
        RecommendationOrchestrator::from_config(&self.config, &self.credentials).await
    }
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("pipeline could not be started: {0}")]
    Startup(#[from] StartupError),

    #[error(transparent)]
    Recommendation(#[from] RecommendationError),
}

/// `Uninitialized -> Ready` wrapper around a `PipelineFactory`
pub struct PipelineHandle {
    cell: OnceCell<RecommendationOrchestrator>,
    factory: Arc<dyn PipelineFactory>,
}

impl PipelineHandle {
    pub fn new(factory: Arc<dyn PipelineFactory>) -> Self {
        Self {
            cell: OnceCell::new(),
            factory,
        }
    }

    pub fn from_config(config: AppConfig, credentials: Credentials) -> Self {
        Self::new(Arc::new(ConfigFactory::new(config, credentials)))
    }

    pub fn is_ready(&self) -> bool {
        self.cell.initialized()
    }

    /// The orchestrator, constructing it on first call
    pub async fn get(&self) -> Result<&RecommendationOrchestrator, StartupError> {
        self.cell
            .get_or_try_init(|| async {
                info!("Initializing recommendation pipeline");
                self.factory.build().await
            })
            .await
    }

    pub async fn recommend(&self, query: &str) -> Result<String, PipelineError> {
        let orchestrator = self.get().await?;
        Ok(orchestrator.recommend(query).await?)
    }
}
