pub mod algorithms;
pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use crate::config::Config;
pub use error::{RecError, Result};
pub use models::*;

use crate::config::SourceKind;
use services::data_source::{CatalogSource, InMemorySource, PostgresSource};
use services::recommendation::RecommendationService;
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub source: Arc<dyn CatalogSource>,
    pub recommendation_service: Arc<RecommendationService>,
}

impl AppState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let source: Arc<dyn CatalogSource> = match config.data.source {
            SourceKind::Fixture => Arc::new(InMemorySource::load_fixture(&config.data.fixture_path).await?),
            SourceKind::Postgres => Arc::new(PostgresSource::connect(&config.postgres).await?),
        };
        info!("Using {:?} catalog source", config.data.source);

        Ok(Self::with_source(config, source))
    }

    pub fn with_source(config: Config, source: Arc<dyn CatalogSource>) -> Self {
        let config = Arc::new(config);
        let recommendation_service = Arc::new(RecommendationService::new(source.clone(), config.clone()));

        Self {
            config,
            source,
            recommendation_service,
        }
    }
}

pub async fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
}
