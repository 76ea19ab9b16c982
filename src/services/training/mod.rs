use crate::algorithms::als::{AlsConfig, AlsTrainer, TrainedModel, TrainingControl};
use crate::algorithms::rating::RatingDeriver;
use crate::config::Config;
use crate::error::{RecError, Result};
use crate::models::{ModelHandle, ModelInfo, ModelState};
use crate::services::data_source::CatalogSource;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

struct Published {
    model: Arc<TrainedModel>,
    interactions_version: u64,
}

/// Owns the published latent-factor model.
///
/// Readers take an `Arc` snapshot and never see a half-trained model. At most
/// one retrain runs at a time; a failed retrain keeps the previous model.
pub struct TrainingService {
    source: Arc<dyn CatalogSource>,
    config: Arc<Config>,
    published: Arc<RwLock<Option<Published>>>,
    state: Arc<parking_lot::RwLock<ModelState>>,
    writer: Arc<Mutex<()>>,
    in_flight: Arc<parking_lot::Mutex<Option<TrainingControl>>>,
}

impl TrainingService {
    pub fn new(source: Arc<dyn CatalogSource>, config: Arc<Config>) -> Self {
        Self {
            source,
            config,
            published: Arc::new(RwLock::new(None)),
            state: Arc::new(parking_lot::RwLock::new(ModelState::Untrained)),
            writer: Arc::new(Mutex::new(())),
            in_flight: Arc::new(parking_lot::Mutex::new(None)),
        }
    }

    pub fn state(&self) -> ModelState {
        *self.state.read()
    }

    pub async fn model(&self) -> Option<Arc<TrainedModel>> {
        self.published.read().await.as_ref().map(|p| p.model.clone())
    }

    pub async fn info(&self) -> ModelInfo {
        let published = self.published.read().await;
        ModelInfo {
            state: self.state(),
            model: published.as_ref().map(|p| p.model.handle().clone()),
            interactions_version: published.as_ref().map(|p| p.interactions_version),
            training_in_flight: self.in_flight.lock().is_some(),
        }
    }

    /// Derives ratings from the current interactions, fits a new model and
    /// publishes it.
    pub async fn train(&self) -> Result<ModelHandle> {
        let _writer = self.writer.lock().await;

        let previous = std::mem::replace(&mut *self.state.write(), ModelState::Training);
        let result = self.train_locked().await;
        match &result {
            Ok(handle) => {
                *self.state.write() = ModelState::Trained;
                info!("Published model {}", handle.version);
            }
            Err(e) => {
                *self.state.write() = previous;
                error!("Training failed: {}", e);
            }
        }
        result
    }

    async fn train_locked(&self) -> Result<ModelHandle> {
        let interactions_version = self.source.interactions_version().await?;
        let interactions = self.source.interactions().await?;
        let users = self.source.users().await?;
        let catalog = self.source.item_attributes().await?;

        let deriver = RatingDeriver::new(self.config.rating.weights);
        let trainer = AlsTrainer::new(AlsConfig::from(&self.config.training));
        let budget = self.config.training.time_budget();
        let control = TrainingControl::new().with_budget(budget);
        *self.in_flight.lock() = Some(control.clone());

        info!(
            "Training on {} interactions (version {}), budget {:?}",
            interactions.len(),
            interactions_version,
            budget
        );

        let task_control = control.clone();
        let task = tokio::task::spawn_blocking(move || {
            let triples = deriver.derive(&interactions)?;
            trainer.fit(&triples, &task_control)
        });
        let outcome = join_fit(task, &control, budget).await;
        *self.in_flight.lock() = None;

        let model = outcome?
            .with_known_users(users.into_iter().map(|u| u.user_id))
            .with_known_items(catalog.into_iter().map(|row| row.item_id));
        let handle = model.handle().clone();
        *self.published.write().await = Some(Published {
            model: Arc::new(model),
            interactions_version,
        });
        Ok(handle)
    }

    /// Raises the cancel flag of the in-flight fit, if any.
    pub fn cancel(&self) -> bool {
        match self.in_flight.lock().as_ref() {
            Some(control) => {
                control.cancel();
                warn!("Training cancellation requested");
                true
            }
            None => false,
        }
    }

    /// Drops the published model.
    pub async fn retire(&self) {
        let _writer = self.writer.lock().await;
        if self.published.write().await.take().is_some() {
            *self.state.write() = ModelState::Retired;
            info!("Model retired");
        }
    }

    pub async fn is_stale(&self) -> Result<bool> {
        let current = self.source.interactions_version().await?;
        Ok(self
            .published
            .read()
            .await
            .as_ref()
            .map_or(true, |p| p.interactions_version != current))
    }

    /// Retrains when no model is published or the interactions changed.
    pub async fn refresh_if_stale(&self) -> Result<Option<ModelHandle>> {
        if !self.is_stale().await? {
            return Ok(None);
        }
        self.train().await.map(Some)
    }

    pub fn start_refresh_worker(&self) -> JoinHandle<()> {
        let service = self.clone();
        tokio::spawn(async move {
            service.refresh_worker().await;
        })
    }

    async fn refresh_worker(&self) {
        let interval = self.config.training.refresh_interval();
        info!("Model refresh worker started (every {:?})", interval);

        loop {
            tokio::time::sleep(interval).await;

            match self.refresh_if_stale().await {
                Ok(Some(handle)) => info!("Refreshed model to {}", handle.version),
                Ok(None) => {}
                Err(e) => error!("Model refresh failed: {}", e),
            }
        }
    }
}

/// Waits for a blocking fit within `budget`. On timeout the fit is cancelled
/// and still awaited, so it never outlives the caller's writer lock.
async fn join_fit<T: Send + 'static>(
    mut task: JoinHandle<Result<T>>,
    control: &TrainingControl,
    budget: Duration,
) -> Result<T> {
    match tokio::time::timeout(budget, &mut task).await {
        Ok(joined) => joined.map_err(|e| RecError::Source(e.into()))?,
        Err(_) => {
            control.cancel();
            warn!("Training exceeded {:?}; waiting for the fit to stop", budget);
            if let Err(e) = task.await {
                error!("Cancelled fit did not shut down cleanly: {}", e);
            }
            Err(RecError::TrainingTimedOut(budget))
        }
    }
}

impl Clone for TrainingService {
    fn clone(&self) -> Self {
        Self {
            source: self.source.clone(),
            config: self.config.clone(),
            published: self.published.clone(),
            state: self.state.clone(),
            writer: self.writer.clone(),
            in_flight: self.in_flight.clone(),
        }
    }
}
