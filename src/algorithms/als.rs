//! Alternating least squares over the sparse implicit-rating matrix.
//!
//! Each half-step fixes one side's factors and solves a ridge regression per
//! row of the other side. Regularization is scaled by the number of ratings in
//! the row, so heavy users and popular games are not over-shrunk.

use crate::algorithms::initializer::{EmbeddingInitializer, InitializationMethod};
use crate::algorithms::matrix::{DenseIndex, RatingMatrix};
use crate::config::TrainingConfig;
use crate::error::{RecError, Result};
use crate::models::{ItemId, ModelHandle, RatingTriple, ScoredItem, ScoredUser, UserId};
use crate::utils::metrics::{rmse, MetricsCalculator, RankingMetrics};
use crate::utils::top_k_indices;
use crate::utils::validation::{validate_als_config, validate_triples};
use chrono::Utc;
use nalgebra::{DMatrix, DVector};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

const USER_SALT: u64 = 1;
const ITEM_SALT: u64 = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlsConfig {
    pub rank: usize,
    pub max_iterations: usize,
    pub regularization: f64,
    pub train_ratio: f64,
    pub seed: u64,
    pub initialization: InitializationMethod,
    pub convergence_tolerance: Option<f64>,
    pub threads: Option<usize>,
}

impl Default for AlsConfig {
    fn default() -> Self {
        Self {
            rank: 10,
            max_iterations: 5,
            regularization: 0.01,
            train_ratio: 0.8,
            seed: 42,
            initialization: InitializationMethod::ScaledUniform,
            convergence_tolerance: None,
            threads: None,
        }
    }
}

impl From<&TrainingConfig> for AlsConfig {
    fn from(config: &TrainingConfig) -> Self {
        Self {
            rank: config.rank,
            max_iterations: config.max_iterations,
            regularization: config.regularization,
            train_ratio: config.train_ratio,
            seed: config.seed,
            initialization: config.initialization,
            convergence_tolerance: config.convergence_tolerance,
            threads: Some(config.threads.max(1)),
        }
    }
}

/// Cancellation flag and optional deadline checked between half-steps.
#[derive(Debug, Clone, Default)]
pub struct TrainingControl {
    cancelled: Arc<AtomicBool>,
    deadline: Option<(Instant, Duration)>,
}

impl TrainingControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.deadline = Some((Instant::now() + budget, budget));
        self
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(RecError::TrainingCancelled);
        }
        if let Some((deadline, budget)) = self.deadline {
            if Instant::now() >= deadline {
                return Err(RecError::TrainingTimedOut(budget));
            }
        }
        Ok(())
    }
}

/// Seeded random partition into `(train, test)`; the train side holds
/// `round(ratio * n)` triples.
pub fn split_triples(triples: &[RatingTriple], ratio: f64, seed: u64) -> (Vec<RatingTriple>, Vec<RatingTriple>) {
    let mut order: Vec<usize> = (0..triples.len()).collect();
    order.shuffle(&mut StdRng::seed_from_u64(seed));

    let train_len = ((triples.len() as f64) * ratio.clamp(0.0, 1.0)).round() as usize;
    let (train, test) = order.split_at(train_len.min(order.len()));
    (
        train.iter().map(|&i| triples[i].clone()).collect(),
        test.iter().map(|&i| triples[i].clone()).collect(),
    )
}

#[derive(Debug, Clone)]
pub struct AlsTrainer {
    config: AlsConfig,
}

impl AlsTrainer {
    pub fn new(config: AlsConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AlsConfig {
        &self.config
    }

    pub fn fit(&self, triples: &[RatingTriple], control: &TrainingControl) -> Result<TrainedModel> {
        validate_als_config(&self.config)?;
        validate_triples(triples)?;

        let distinct_users: HashSet<&str> = triples.iter().map(|t| t.user_id.as_str()).collect();
        let distinct_items: HashSet<ItemId> = triples.iter().map(|t| t.item_id).collect();
        if distinct_users.len() < 2 || distinct_items.len() < 2 {
            return Err(RecError::DegenerateInput(format!(
                "need at least 2 users and 2 items, got {} and {}",
                distinct_users.len(),
                distinct_items.len()
            )));
        }

        let (train, test) = split_triples(triples, self.config.train_ratio, self.config.seed);
        if train.is_empty() {
            return Err(RecError::DegenerateInput("training split is empty".into()));
        }

        match self.config.threads {
            Some(threads) => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .build()
                    .map_err(|e| RecError::TrainingFailure(e.to_string()))?;
                pool.install(|| self.fit_split(triples, train, test, control))
            }
            None => self.fit_split(triples, train, test, control),
        }
    }

    fn fit_split(
        &self,
        all: &[RatingTriple],
        train: Vec<RatingTriple>,
        test: Vec<RatingTriple>,
        control: &TrainingControl,
    ) -> Result<TrainedModel> {
        let started = Instant::now();
        let matrix = RatingMatrix::pivot(&train);
        let lambda = self.config.regularization;
        info!(
            "Training ALS: {} users x {} items, {} train / {} test ratings, rank {}",
            matrix.num_users(),
            matrix.num_items(),
            matrix.nnz(),
            test.len(),
            self.config.rank
        );

        let initializer = EmbeddingInitializer::new(self.config.initialization, self.config.rank, self.config.seed);
        let mut user_factors = initializer.initialize_factors(matrix.num_users(), USER_SALT);
        let mut item_factors = initializer.initialize_factors(matrix.num_items(), ITEM_SALT);

        let mut loss_history = Vec::with_capacity(self.config.max_iterations);
        for iteration in 0..self.config.max_iterations {
            control.check()?;
            user_factors = solve_side(matrix.num_users(), |u| matrix.user_row(u), &item_factors, lambda)?;

            control.check()?;
            item_factors = solve_side(matrix.num_items(), |i| matrix.item_column(i), &user_factors, lambda)?;

            let loss = training_rmse(&matrix, &user_factors, &item_factors);
            if !loss.is_finite() {
                return Err(RecError::TrainingFailure(format!(
                    "non-finite training error at iteration {}",
                    iteration + 1
                )));
            }
            debug!("ALS iteration {}: train rmse = {:.6}", iteration + 1, loss);
            loss_history.push(loss);
        }

        if let (Some(tolerance), [.., previous, last]) = (self.config.convergence_tolerance, loss_history.as_slice()) {
            let delta = (previous - last).abs();
            if delta > tolerance {
                return Err(RecError::TrainingFailure(format!(
                    "not converged after {} iterations (rmse delta {:.6} > {:.6})",
                    self.config.max_iterations, delta, tolerance
                )));
            }
        }

        let mut model = TrainedModel {
            handle: ModelHandle {
                version: Uuid::new_v4(),
                trained_at: Utc::now(),
                num_users: matrix.num_users(),
                num_items: matrix.num_items(),
                train_size: train.len(),
                test_size: test.len(),
                iterations: self.config.max_iterations,
                train_rmse: loss_history.last().copied(),
                test_rmse: None,
            },
            users: matrix.users().clone(),
            items: matrix.items().clone(),
            user_factors,
            item_factors,
            known_users: all.iter().map(|t| t.user_id.clone()).collect(),
            known_items: all.iter().map(|t| t.item_id).collect(),
            held_out: test,
            loss_history,
        };

        model.handle.test_rmse = model.evaluate(&model.held_out);
        match model.handle.test_rmse {
            Some(value) => info!("ALS trained in {:?}; held-out rmse = {:.4}", started.elapsed(), value),
            None => warn!("ALS trained in {:?}; no held-out rating was evaluable", started.elapsed()),
        }

        Ok(model)
    }
}

/// Solves every row of one side against the fixed factors of the other.
fn solve_side<'a, F>(
    rows: usize,
    ratings: F,
    fixed: &[DVector<f64>],
    lambda: f64,
) -> Result<Vec<DVector<f64>>>
where
    F: Fn(usize) -> &'a [(usize, f64)] + Sync,
{
    (0..rows)
        .into_par_iter()
        .map(|row| solve_row(ratings(row), fixed, lambda))
        .collect()
}

fn solve_row(ratings: &[(usize, f64)], fixed: &[DVector<f64>], lambda: f64) -> Result<DVector<f64>> {
    let rank = fixed.first().map_or(0, |v| v.len());
    let mut a = DMatrix::<f64>::zeros(rank, rank);
    let mut b = DVector::<f64>::zeros(rank);

    for &(other, rating) in ratings {
        let y = &fixed[other];
        a.ger(1.0, y, y, 1.0);
        b.axpy(rating, y, 1.0);
    }
    let reg = lambda * ratings.len() as f64;
    for d in 0..rank {
        a[(d, d)] += reg;
    }

    let cholesky = a.cholesky().ok_or_else(|| {
        RecError::TrainingFailure("normal equations are not positive definite; increase regularization".into())
    })?;
    Ok(cholesky.solve(&b))
}

fn training_rmse(matrix: &RatingMatrix, users: &[DVector<f64>], items: &[DVector<f64>]) -> f64 {
    let pairs = (0..matrix.num_users()).flat_map(|u| {
        matrix
            .user_row(u)
            .iter()
            .map(move |&(i, rating)| (users[u].dot(&items[i]), rating))
    });
    rmse(pairs).unwrap_or(0.0)
}

/// A fitted latent-factor model. Users and items absent from the training
/// split have no factors and get empty recommendation lists.
#[derive(Debug, Clone)]
pub struct TrainedModel {
    handle: ModelHandle,
    users: DenseIndex<UserId>,
    items: DenseIndex<ItemId>,
    user_factors: Vec<DVector<f64>>,
    item_factors: Vec<DVector<f64>>,
    known_users: HashSet<UserId>,
    known_items: HashSet<ItemId>,
    held_out: Vec<RatingTriple>,
    loss_history: Vec<f64>,
}

impl TrainedModel {
    pub fn handle(&self) -> &ModelHandle {
        &self.handle
    }

    pub fn version(&self) -> Uuid {
        self.handle.version
    }

    pub fn held_out(&self) -> &[RatingTriple] {
        &self.held_out
    }

    pub fn loss_history(&self) -> &[f64] {
        &self.loss_history
    }

    /// Registers ids that exist upstream but may have no ratings, so that
    /// queries for them are cold starts rather than lookups of unknown keys.
    pub fn with_known_users<I: IntoIterator<Item = UserId>>(mut self, users: I) -> Self {
        self.known_users.extend(users);
        self
    }

    pub fn with_known_items<I: IntoIterator<Item = ItemId>>(mut self, items: I) -> Self {
        self.known_items.extend(items);
        self
    }

    pub fn has_user_factors(&self, user_id: &str) -> bool {
        self.users.contains(user_id)
    }

    pub fn has_item_factors(&self, item_id: ItemId) -> bool {
        self.items.contains(&item_id)
    }

    pub fn predict(&self, user_id: &str, item_id: ItemId) -> Option<f64> {
        let u = self.users.index_of(user_id)?;
        let i = self.items.index_of(&item_id)?;
        Some(self.user_factors[u].dot(&self.item_factors[i]))
    }

    /// RMSE over the triples whose user and item both have factors.
    pub fn evaluate(&self, triples: &[RatingTriple]) -> Option<f64> {
        rmse(
            triples
                .iter()
                .filter_map(|t| self.predict(&t.user_id, t.item_id).map(|p| (p, t.rating))),
        )
    }

    /// Precision, recall and NDCG at `k` of the held-out ratings, over users
    /// that have factors.
    pub fn ranking_metrics(&self, k: usize) -> RankingMetrics {
        let mut held_out: HashMap<&str, HashMap<ItemId, f64>> = HashMap::new();
        for triple in &self.held_out {
            if self.users.contains(triple.user_id.as_str()) {
                held_out
                    .entry(triple.user_id.as_str())
                    .or_default()
                    .insert(triple.item_id, triple.rating);
            }
        }

        let recommended: HashMap<&str, Vec<ItemId>> = held_out
            .keys()
            .filter_map(|&user| {
                let u = self.users.index_of(user)?;
                Some((user, self.rank_items(u, k).into_iter().map(|s| s.item_id).collect()))
            })
            .collect();

        MetricsCalculator::new(k).evaluate(&recommended, &held_out)
    }

    pub fn recommend_for_user(&self, user_id: &str, k: usize) -> Result<Vec<ScoredItem>> {
        match self.users.index_of(user_id) {
            Some(u) => Ok(self.rank_items(u, k)),
            None if self.known_users.contains(user_id) => Ok(Vec::new()),
            None => Err(RecError::user(user_id)),
        }
    }

    pub fn recommend_for_item(&self, item_id: ItemId, k: usize) -> Result<Vec<ScoredUser>> {
        match self.items.index_of(&item_id) {
            Some(i) => Ok(self.rank_users(i, k)),
            None if self.known_items.contains(&item_id) => Ok(Vec::new()),
            None => Err(RecError::item_id(item_id)),
        }
    }

    pub fn recommend_for_all_users(&self, k: usize) -> BTreeMap<UserId, Vec<ScoredItem>> {
        (0..self.users.len())
            .into_par_iter()
            .map(|u| (self.users.ids()[u].clone(), self.rank_items(u, k)))
            .collect::<Vec<_>>()
            .into_iter()
            .collect()
    }

    pub fn recommend_for_all_items(&self, k: usize) -> BTreeMap<ItemId, Vec<ScoredUser>> {
        (0..self.items.len())
            .into_par_iter()
            .map(|i| (self.items.ids()[i], self.rank_users(i, k)))
            .collect::<Vec<_>>()
            .into_iter()
            .collect()
    }

    fn rank_items(&self, u: usize, k: usize) -> Vec<ScoredItem> {
        let scores: Vec<f64> = self.item_factors.iter().map(|y| self.user_factors[u].dot(y)).collect();
        top_k_indices(&scores, k)
            .into_iter()
            .map(|i| ScoredItem {
                item_id: self.items.ids()[i],
                score: scores[i],
            })
            .collect()
    }

    fn rank_users(&self, i: usize, k: usize) -> Vec<ScoredUser> {
        let scores: Vec<f64> = self.user_factors.iter().map(|x| x.dot(&self.item_factors[i])).collect();
        top_k_indices(&scores, k)
            .into_iter()
            .map(|u| ScoredUser {
                user_id: self.users.ids()[u].clone(),
                score: scores[u],
            })
            .collect()
    }
}
