use crate::algorithms::features::JoinPolicy;
use crate::algorithms::initializer::InitializationMethod;
use crate::algorithms::rating::RatingWeights;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub postgres: PostgresConfig,
    pub data: DataConfig,
    pub content: ContentConfig,
    pub rating: RatingConfig,
    pub training: TrainingConfig,
    pub recommendation: RecommendationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: usize,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Postgres,
    Fixture,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    pub source: SourceKind,
    pub fixture_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentConfig {
    pub top_n: usize,
    pub ngram_min: usize,
    pub ngram_max: usize,
    pub min_token_len: usize,
    pub stop_words: bool,
    pub join_policy: JoinPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatingConfig {
    pub weights: RatingWeights,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub rank: usize,
    pub max_iterations: usize,
    pub regularization: f64,
    pub train_ratio: f64,
    pub seed: u64,
    pub initialization: InitializationMethod,
    pub convergence_tolerance: Option<f64>,
    pub time_budget_secs: u64,
    pub refresh_interval_secs: u64,
    pub threads: usize,
}

impl TrainingConfig {
    pub fn time_budget(&self) -> Duration {
        Duration::from_secs(self.time_budget_secs)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationConfig {
    pub default_k: usize,
    pub max_k: usize,
    pub top_items_min_reviews: f64,
    pub top_items_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8111,
                workers: num_cpus::get(),
            },
            postgres: PostgresConfig {
                url: "postgresql://localhost:5432/gamerec".to_string(),
                max_connections: 10,
            },
            data: DataConfig {
                source: SourceKind::Fixture,
                fixture_path: "data/fixture.json".to_string(),
            },
            content: ContentConfig {
                top_n: 10,
                ngram_min: 1,
                ngram_max: 3,
                min_token_len: 1,
                stop_words: true,
                join_policy: JoinPolicy::Outer,
            },
            rating: RatingConfig {
                weights: RatingWeights::default(),
            },
            training: TrainingConfig {
                rank: 10,
                max_iterations: 5,
                regularization: 0.01,
                train_ratio: 0.8,
                seed: 42,
                initialization: InitializationMethod::ScaledUniform,
                convergence_tolerance: None,
                time_budget_secs: 300,
                refresh_interval_secs: 600,
                threads: num_cpus::get(),
            },
            recommendation: RecommendationConfig {
                default_k: 10,
                max_k: 100,
                top_items_min_reviews: 10000.0,
                top_items_limit: 10,
            },
        }
    }
}

impl Config {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::Config::try_from(&Config::default())?)
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("GAMEREC").separator("__"))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_socket_addr() {
        let config = Config::default();
        let addr = config.server.socket_addr().unwrap();
        assert_eq!(addr.port(), 8111);
    }

    #[test]
    fn test_invalid_host_is_an_error() {
        let mut config = Config::default();
        config.server.host = "not a host".to_string();
        assert!(config.server.socket_addr().is_err());
    }

    #[test]
    fn test_training_durations() {
        let config = Config::default();
        assert_eq!(config.training.time_budget(), Duration::from_secs(300));
        assert_eq!(config.training.max_iterations, 5);
        assert!((config.training.regularization - 0.01).abs() < f64::EPSILON);
    }
}
