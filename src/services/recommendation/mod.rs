use crate::config::Config;
use crate::error::{RecError, Result};
use crate::models::*;
use crate::services::content::ContentService;
use crate::services::data_source::CatalogSource;
use crate::services::training::TrainingService;
use crate::utils::validation::{validate_item_name, validate_k};
use chrono::Utc;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Serving facade over the content index and the collaborative model.
pub struct RecommendationService {
    source: Arc<dyn CatalogSource>,
    config: Arc<Config>,
    content: Arc<ContentService>,
    training: Arc<TrainingService>,
    serving_stats: Arc<DashMap<&'static str, u64>>,
}

impl RecommendationService {
    pub fn new(source: Arc<dyn CatalogSource>, config: Arc<Config>) -> Self {
        Self {
            content: Arc::new(ContentService::new(source.clone(), config.clone())),
            training: Arc::new(TrainingService::new(source.clone(), config.clone())),
            source,
            config,
            serving_stats: Arc::new(DashMap::new()),
        }
    }

    pub fn content(&self) -> &ContentService {
        &self.content
    }

    pub fn training(&self) -> &TrainingService {
        &self.training
    }

    fn count(&self, key: &'static str) {
        *self.serving_stats.entry(key).or_insert(0) += 1;
    }

    /// Names of the games most similar to `item_name`, best first.
    pub async fn content_recommend(&self, item_name: &str) -> Result<ContentRecommendations> {
        validate_item_name(item_name)?;
        self.count("content_requests");

        let items = self
            .content
            .recommend_by_name(item_name, self.config.content.top_n)
            .await?;
        Ok(ContentRecommendations {
            query: item_name.to_string(),
            items,
            generated_at: Utc::now(),
        })
    }

    pub async fn similar_items(&self, item_id: ItemId, k: usize) -> Result<Vec<SimilarItem>> {
        validate_k(k, self.config.recommendation.max_k)?;
        self.count("similar_item_requests");
        self.content.similar_items(item_id, k).await
    }

    pub async fn train_collaborative(&self) -> Result<ModelHandle> {
        self.count("training_runs");
        let result = self.training.train().await;
        if result.is_err() {
            self.count("training_failures");
        }
        result
    }

    pub fn cancel_training(&self) -> bool {
        self.training.cancel()
    }

    pub async fn recommend_for_user(&self, user_id: &str, k: usize) -> Result<UserRecommendations> {
        validate_k(k, self.config.recommendation.max_k)?;
        self.count("user_requests");

        let model = self
            .training
            .model()
            .await
            .ok_or(RecError::ModelUnavailable("collaborative"))?;
        let recommendations = model.recommend_for_user(user_id, k)?;
        let cold_start = !model.has_user_factors(user_id);
        if cold_start {
            self.count("cold_start_users");
            debug!("User {} has no training coverage", user_id);
        }

        Ok(UserRecommendations {
            user_id: user_id.to_string(),
            recommendations,
            cold_start,
            model_version: model.version(),
            generated_at: Utc::now(),
        })
    }

    pub async fn recommend_for_item(&self, item_id: ItemId, k: usize) -> Result<ItemAudience> {
        validate_k(k, self.config.recommendation.max_k)?;
        self.count("item_requests");

        let model = self
            .training
            .model()
            .await
            .ok_or(RecError::ModelUnavailable("collaborative"))?;
        let users = model.recommend_for_item(item_id, k)?;
        let cold_start = !model.has_item_factors(item_id);
        if cold_start {
            self.count("cold_start_items");
        }

        Ok(ItemAudience {
            item_id,
            users,
            cold_start,
            model_version: model.version(),
            generated_at: Utc::now(),
        })
    }

    pub async fn top_items(&self) -> Result<Vec<ItemId>> {
        self.count("top_item_requests");
        let recommendation = &self.config.recommendation;
        Ok(self
            .source
            .top_items(recommendation.top_items_min_reviews, recommendation.top_items_limit)
            .await?)
    }

    pub async fn model_info(&self) -> ModelInfo {
        self.training.info().await
    }

    pub fn stats(&self) -> HashMap<String, u64> {
        self.serving_stats
            .iter()
            .map(|entry| (entry.key().to_string(), *entry.value()))
            .collect()
    }

    /// Rebuilds the content index and the collaborative model whenever their
    /// source data changes.
    pub fn start_refresh_worker(&self) -> JoinHandle<()> {
        let content = self.content.clone();
        let training = self.training.clone();
        let interval = self.config.training.refresh_interval();

        tokio::spawn(async move {
            info!("Refresh worker started (every {:?})", interval);
            loop {
                match content.refresh().await {
                    Ok(true) => info!("Content index refreshed"),
                    Ok(false) => {}
                    Err(e) => error!("Content refresh failed: {}", e),
                }
                match training.refresh_if_stale().await {
                    Ok(Some(handle)) => info!("Collaborative model refreshed to {}", handle.version),
                    Ok(None) => {}
                    Err(e) => error!("Model refresh failed: {}", e),
                }
                tokio::time::sleep(interval).await;
            }
        })
    }
}
