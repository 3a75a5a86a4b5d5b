use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use rand::seq::IndexedRandom;
use retrieval::{build_catalog, RetrievalResult};
use server::{
    build_embedder, build_retriever, AppConfig, Credentials, ErrorKind, PipelineError,
    PipelineHandle, Recommendation, RecommendationOrchestrator, RetryPolicy,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Semaphore;
use tracing::info;

const SAMPLE_QUERIES: &[&str] = &[
    "soft romance anime with beautiful animation",
    "mecha series with emotional depth",
    "lighthearted slice of life about friends",
    "dark psychological thriller",
    "sports anime about an underdog team",
    "fantasy adventure with a found family",
];

/// anime-recs - Anime recommendations from a free-text description
#[derive(Parser)]
#[command(name = "anime-recs")]
#[command(about = "Anime recommender: vector retrieval plus language-model synthesis", long_about = None)]
struct Cli {
    /// Path to a TOML config file (defaults are used when omitted)
    #[arg(short, long, global = true, env = "ANIME_RECS_CONFIG")]
    config: Option<PathBuf>,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Get anime recommendations for a description
    Recommend {
        /// What you feel like watching
        #[arg(short, long)]
        query: String,

        /// Also show the retrieved titles the answer is grounded in
        #[arg(long)]
        explain: bool,
    },

    /// Show the nearest anime for a query without calling the language model
    Search {
        #[arg(short, long)]
        query: String,

        /// Number of results (defaults to retrieval.top_k)
        #[arg(short, long)]
        k: Option<usize>,
    },

    /// Embed an anime CSV and write the vector index file
    BuildIndex {
        /// Anime CSV (Name, Genres, sypnopsis, ...)
        #[arg(long)]
        csv: PathBuf,

        /// Where to write the JSON index (defaults to index.path)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Documents per embedding request
        #[arg(long, default_value_t = retrieval::DEFAULT_BATCH_SIZE)]
        batch_size: usize,
    },

    /// Ask for recommendations line by line from stdin
    Interactive,

    /// Run concurrent recommendations to measure latency
    Benchmark {
        /// Number of requests to make
        #[arg(long, default_value = "100")]
        requests: usize,

        /// Number of requests in flight at once
        #[arg(long, default_value = "10")]
        concurrent: usize,

        /// Query to repeat (random sample queries when omitted)
        #[arg(long)]
        query: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let config = AppConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    info!("Configuration loaded");

    // Dispatch to appropriate command handler
    match cli.command {
        Commands::Recommend { query, explain } => handle_recommend(&config, &query, explain).await?,
        Commands::Search { query, k } => handle_search(&config, &query, k).await?,
        Commands::BuildIndex {
            csv,
            output,
            batch_size,
        } => handle_build_index(&config, &csv, output, batch_size).await?,
        Commands::Interactive => handle_interactive(config).await?,
        Commands::Benchmark {
            requests,
            concurrent,
            query,
        } => handle_benchmark(&config, requests, concurrent, query).await?,
    }

    Ok(())
}

/// Logs go to stderr so stdout carries only results
fn init_tracing(format: LogFormat) {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match format {
        LogFormat::Text => fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init(),
        LogFormat::Json => fmt()
            .json()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init(),
    }
}

async fn build_orchestrator(config: &AppConfig) -> Result<RecommendationOrchestrator> {
    let credentials = Credentials::from_env(config)?;
    let start = Instant::now();
    let orchestrator = RecommendationOrchestrator::from_config(config, &credentials)
        .await
        .context("Failed to start the recommendation pipeline")?;
    println!("{} Pipeline ready in {:.2?}", "✓".green(), start.elapsed());
    Ok(orchestrator)
}

/// Handle the 'recommend' command
async fn handle_recommend(config: &AppConfig, query: &str, explain: bool) -> Result<()> {
    let orchestrator = build_orchestrator(config).await?;
    let recommendation = orchestrator.recommend_detailed(query).await?;
    print_recommendation(&recommendation, explain);
    Ok(())
}

/// Handle the 'search' command
async fn handle_search(config: &AppConfig, query: &str, k: Option<usize>) -> Result<()> {
    let query = pipeline::normalize_bounded(query, config.prompt.max_query_chars)?;
    let k = k.unwrap_or(config.retrieval.top_k);
    let retriever = build_retriever(config, embedding_token(config))
        .await
        .context("Failed to open the vector index")?;

    let retry = RetryPolicy::new(config.runtime.max_retries, config.runtime.retry_backoff());
    let (result, _) = retry
        .run("retrieval", retrieval::RetrievalError::is_transient, || {
            retriever.retrieve(&query, k)
        })
        .await;
    let result = result?;

    println!("{}", format!("Nearest anime for '{}':", query).bold().blue());
    print_hits(&result);
    Ok(())
}

/// The embedding token is optional, so it is read without requiring the
/// language-model key
fn embedding_token(config: &AppConfig) -> Option<String> {
    std::env::var(&config.embedding.api_key_env)
        .ok()
        .filter(|t| !t.trim().is_empty())
}

/// Handle the 'build-index' command
async fn handle_build_index(
    config: &AppConfig,
    csv: &Path,
    output: Option<PathBuf>,
    batch_size: usize,
) -> Result<()> {
    let output = output
        .or_else(|| config.index.path.clone())
        .ok_or_else(|| anyhow!("No --output given and index.path is not set"))?;

    let start = Instant::now();
    let documents = data_loader::parse_anime_csv(csv)
        .with_context(|| format!("Failed to parse {}", csv.display()))?;
    println!(
        "{} Parsed {} anime in {:.2?}",
        "✓".green(),
        documents.len(),
        start.elapsed()
    );

    let embedder = build_embedder(config, embedding_token(config))?;
    let catalog = build_catalog(embedder.as_ref(), documents, batch_size)
        .await
        .context("Failed to embed the catalog")?;

    catalog
        .save_to_file(&output)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    println!(
        "{} Wrote {} records ({} dimensions) to {} in {:.2?}",
        "✓".green(),
        catalog.len(),
        catalog.dimension().unwrap_or(0),
        output.display(),
        start.elapsed()
    );
    Ok(())
}

/// Handle the 'interactive' command
///
/// The pipeline is built on the first query, not at startup.
async fn handle_interactive(config: AppConfig) -> Result<()> {
    let credentials = Credentials::from_env(&config)?;
    let handle = PipelineHandle::from_config(config, credentials);

    println!(
        "{}",
        "Describe what you'd like to watch (empty line to skip, 'quit' to exit)".bold()
    );
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if matches!(line, "quit" | "exit") {
            break;
        }

        match handle.recommend(line).await {
            Ok(text) => println!("{}\n", text),
            Err(PipelineError::Recommendation(e)) if e.kind() == ErrorKind::EmptyQuery => {
                println!("{}", "Please enter a description.".yellow());
            }
            Err(PipelineError::Recommendation(e)) if e.kind() == ErrorKind::QueryTooLong => {
                println!("{} {}", "Please shorten your description:".yellow(), e.cause());
            }
            Err(PipelineError::Startup(e)) => return Err(e).context("Failed to start pipeline"),
            Err(e) => println!("{} {}", "✗".red(), e),
        }
    }
    Ok(())
}

/// Handle the 'benchmark' command
async fn handle_benchmark(
    config: &AppConfig,
    requests: usize,
    concurrent: usize,
    query: Option<String>,
) -> Result<()> {
    if requests == 0 {
        return Err(anyhow!("--requests must be at least 1"));
    }
    let orchestrator = build_orchestrator(config).await?;
    let permits = Arc::new(Semaphore::new(concurrent.max(1)));

    let queries: Vec<String> = {
        let mut rng = rand::rng();
        (0..requests)
            .map(|_| match &query {
                Some(q) => q.clone(),
                None => SAMPLE_QUERIES
                    .choose(&mut rng)
                    .map(|q| q.to_string())
                    .unwrap_or_default(),
            })
            .collect()
    };

    // Use tokio::spawn to make concurrent requests
    let wall = Instant::now();
    let mut handles = Vec::with_capacity(requests);
    for query in queries {
        let orchestrator = orchestrator.clone();
        let permits = permits.clone();
        handles.push(tokio::spawn(async move {
            let _permit = permits.acquire_owned().await?;
            let start = Instant::now();
            orchestrator.recommend(&query).await?;
            Ok::<_, anyhow::Error>(start.elapsed())
        }));
    }

    let mut timings = Vec::with_capacity(requests);
    let mut failures = 0;
    for handle in handles {
        match handle.await? {
            Ok(elapsed) => timings.push(elapsed),
            Err(e) => {
                failures += 1;
                tracing::warn!("Request failed: {e:#}");
            }
        }
    }
    let wall = wall.elapsed();

    if timings.is_empty() {
        return Err(anyhow!("All {} requests failed", requests));
    }
    timings.sort();
    let total: Duration = timings.iter().sum();
    let avg_latency = total / timings.len() as u32;

    println!("{}", "Benchmark results:".bold().blue());
    println!("Requests: {} ({} failed)", requests, failures);
    println!("Wall time: {:.2?}", wall);
    println!("Average latency: {:.2?}", avg_latency);
    println!("P50 latency: {:.2?}", percentile(&timings, 0.50));
    println!("P95 latency: {:.2?}", percentile(&timings, 0.95));
    println!("P99 latency: {:.2?}", percentile(&timings, 0.99));
    println!(
        "Throughput: {:.2} requests/second",
        timings.len() as f64 / wall.as_secs_f64()
    );
    Ok(())
}

/// Nearest-rank percentile over sorted timings
fn percentile(sorted: &[Duration], p: f64) -> Duration {
    let rank = ((sorted.len() as f64 * p).ceil() as usize).clamp(1, sorted.len());
    sorted[rank - 1]
}

fn print_recommendation(recommendation: &Recommendation, explain: bool) {
    println!("{}", "Recommendations:".bold().blue());
    println!("{}", recommendation.text);

    if explain {
        println!();
        if recommendation.used_fallback {
            println!("{}", "No matching anime were retrieved.".yellow());
        } else {
            println!("{}", "Grounded in:".bold());
            for (i, hit) in recommendation.sources.iter().enumerate() {
                println!(
                    "{}. {} [{}] - Similarity: {:.3}",
                    (i + 1).to_string().green(),
                    hit.document.title,
                    hit.document.genres.join(", "),
                    hit.score
                );
            }
        }
        println!("Answered in {:.2?}", recommendation.elapsed);
    }
}

fn print_hits(result: &RetrievalResult) {
    if result.is_empty() {
        println!("{}", "No results.".yellow());
        return;
    }
    for (i, hit) in result.iter().enumerate() {
        println!(
            "{}. {} [{}] - Similarity: {:.3}",
            (i + 1).to_string().green(),
            hit.document.title,
            hit.document.genres.join(", "),
            hit.score
        );
    }
}
