use crate::algorithms::features::build_item_features;
use crate::algorithms::similarity::ContentIndex;
use crate::algorithms::tfidf::TfidfVectorizer;
use crate::config::{Config, ContentConfig};
use crate::error::{RecError, Result};
use crate::models::{ItemId, SimilarItem};
use crate::services::data_source::CatalogSource;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

struct CachedIndex {
    catalog_version: u64,
    index: Arc<ContentIndex>,
}

/// Process-wide content index, rebuilt when the catalog version moves.
pub struct ContentService {
    source: Arc<dyn CatalogSource>,
    config: Arc<Config>,
    cached: RwLock<Option<CachedIndex>>,
    rebuild: Mutex<()>,
}

impl ContentService {
    pub fn new(source: Arc<dyn CatalogSource>, config: Arc<Config>) -> Self {
        Self {
            source,
            config,
            cached: RwLock::new(None),
            rebuild: Mutex::new(()),
        }
    }

    pub fn vectorizer(config: &ContentConfig) -> TfidfVectorizer {
        let vectorizer = TfidfVectorizer::new()
            .with_ngram_range(config.ngram_min, config.ngram_max)
            .with_min_token_len(config.min_token_len);
        if config.stop_words {
            vectorizer.with_stop_words_english()
        } else {
            vectorizer
        }
    }

    /// Current index, rebuilding it first if the catalog changed.
    pub async fn index(&self) -> Result<Arc<ContentIndex>> {
        let version = self.source.catalog_version().await?;
        if let Some(index) = self.cached_at(version).await {
            return Ok(index);
        }

        let _guard = self.rebuild.lock().await;
        // Another caller may have rebuilt while we waited.
        if let Some(index) = self.cached_at(version).await {
            return Ok(index);
        }
        self.rebuild_at(version).await
    }

    /// Rebuilds if stale. Returns whether a rebuild happened.
    pub async fn refresh(&self) -> Result<bool> {
        let version = self.source.catalog_version().await?;
        if self.cached_at(version).await.is_some() {
            debug!("Content index is current at catalog version {}", version);
            return Ok(false);
        }

        let _guard = self.rebuild.lock().await;
        if self.cached_at(version).await.is_some() {
            return Ok(false);
        }
        self.rebuild_at(version).await?;
        Ok(true)
    }

    pub async fn recommend_by_name(&self, name: &str, n: usize) -> Result<Vec<String>> {
        self.index().await?.recommend_by_name(name, n)
    }

    pub async fn similar_items(&self, item_id: ItemId, n: usize) -> Result<Vec<SimilarItem>> {
        self.index().await?.recommend_by_id(item_id, n)
    }

    pub async fn cached_version(&self) -> Option<u64> {
        self.cached.read().await.as_ref().map(|c| c.catalog_version)
    }

    async fn cached_at(&self, version: u64) -> Option<Arc<ContentIndex>> {
        self.cached
            .read()
            .await
            .as_ref()
            .filter(|c| c.catalog_version == version)
            .map(|c| c.index.clone())
    }

    async fn rebuild_at(&self, version: u64) -> Result<Arc<ContentIndex>> {
        let rows = self.source.item_attributes().await?;
        let policy = self.config.content.join_policy;
        let vectorizer = Self::vectorizer(&self.config.content);

        let index = tokio::task::spawn_blocking(move || {
            let items = build_item_features(&rows, policy);
            ContentIndex::fit(items, vectorizer)
        })
        .await
        .map_err(|e| RecError::Source(e.into()))??;

        let index = Arc::new(index);
        *self.cached.write().await = Some(CachedIndex {
            catalog_version: version,
            index: index.clone(),
        });
        info!(
            "Content index rebuilt at catalog version {} ({} items)",
            version,
            index.len()
        );
        Ok(index)
    }
}
