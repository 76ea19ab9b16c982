use anyhow::{Context, Result};
use clap::Parser;
use gamerec::services::data_source::InMemorySource;
use gamerec::{init_tracing, AppState, Config};
use std::sync::Arc;
use tracing::info;

/// Runs one collaborative training pass and prints top-K lists as JSON.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "config/default.toml")]
    config: String,

    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Read the catalog from a JSON fixture instead of the configured source.
    #[arg(short, long)]
    fixture: Option<String>,

    #[arg(short = 'k', long, default_value_t = 10)]
    top_k: usize,

    #[arg(short, long)]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing with specified log level
    std::env::set_var("RUST_LOG", &args.log_level);
    init_tracing().await;

    let mut config = if std::path::Path::new(&args.config).exists() {
        Config::from_file(&args.config)?
    } else {
        info!("Config file not found, using default configuration");
        Config::default()
    };
    if let Some(seed) = args.seed {
        config.training.seed = seed;
    }
    info!("Training configuration: {:?}", config.training);

    let state = match &args.fixture {
        Some(path) => {
            let source = InMemorySource::load_fixture(path).await?;
            AppState::with_source(config, Arc::new(source))
        }
        None => AppState::new(config).await?,
    };

    let service = &state.recommendation_service;
    let handle = service.train_collaborative().await?;
    match handle.test_rmse {
        Some(rmse) => info!("Root-mean-square error = {:.6}", rmse),
        None => info!("No held-out rating could be evaluated"),
    }

    let model = service
        .training()
        .model()
        .await
        .context("Training finished without publishing a model")?;

    let ranking = model.ranking_metrics(args.top_k);
    info!(
        "Held-out ranking over {} users: precision@{k} = {:.4}, recall@{k} = {:.4}, ndcg@{k} = {:.4}",
        ranking.users_evaluated,
        ranking.precision_at_k,
        ranking.recall_at_k,
        ranking.ndcg_at_k,
        k = args.top_k
    );

    let report = serde_json::json!({
        "model": handle,
        "ranking": ranking,
        "user_recommendations": model.recommend_for_all_users(args.top_k),
        "item_audiences": model.recommend_for_all_items(args.top_k),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
