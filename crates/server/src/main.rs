//! Simple test harness for the recommendation orchestrator.
//!
//! This binary builds the pipeline from configuration (path in
//! `ANIME_RECS_CONFIG`, defaults otherwise) and answers a couple of sample
//! queries end to end.

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{info, warn};

use server::{AppConfig, Credentials, RecommendationOrchestrator};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("info,server=debug,retrieval=debug,pipeline=debug")
            }),
        )
        .init();

    info!("Starting anime recommendation test harness");

    let config_path = std::env::var_os("ANIME_RECS_CONFIG").map(PathBuf::from);
    let config = AppConfig::load(config_path.as_deref()).context("Failed to load configuration")?;
    let credentials = Credentials::from_env(&config)?;

    // Built once, shared by every request below
    let orchestrator = RecommendationOrchestrator::from_config(&config, &credentials)
        .await
        .context("Failed to start the recommendation pipeline")?;

    let queries = [
        "soft romance anime with beautiful animation",
        "   ",
        "a mecha show that makes me cry",
    ];
    for query in queries {
        info!("Query: {:?}", query);
        match orchestrator.recommend_detailed(query).await {
            Ok(rec) => {
                info!(
                    "Answered in {:.2?} from {} sources (fallback: {})",
                    rec.elapsed,
                    rec.sources.len(),
                    rec.used_fallback
                );
                for (i, hit) in rec.sources.iter().enumerate() {
                    info!("  {}. {} ({:.3})", i + 1, hit.document.title, hit.score);
                }
                info!("{}", rec.text);
            }
            Err(e) => warn!("{:?}: {}", e.kind(), e),
        }
    }

    Ok(())
}
