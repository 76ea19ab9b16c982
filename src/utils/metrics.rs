use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::hash::Hash;

/// Root-mean-square error over `(predicted, actual)` pairs.
pub fn rmse<I>(pairs: I) -> Option<f64>
where
    I: IntoIterator<Item = (f64, f64)>,
{
    let (sum, count) = pairs
        .into_iter()
        .fold((0.0, 0usize), |(sum, count), (p, a)| (sum + (p - a).powi(2), count + 1));

    if count == 0 {
        None
    } else {
        Some((sum / count as f64).sqrt())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RankingMetrics {
    pub precision_at_k: f64,
    pub recall_at_k: f64,
    pub ndcg_at_k: f64,
    pub users_evaluated: usize,
}

#[derive(Debug, Clone)]
pub struct MetricsCalculator {
    k: usize,
}

impl MetricsCalculator {
    pub fn new(k: usize) -> Self {
        Self { k }
    }

    pub fn calculate_precision_at_k<T: Eq + Hash>(&self, recommended: &[T], relevant: &[T]) -> f64 {
        if recommended.is_empty() || self.k == 0 {
            return 0.0;
        }

        let relevant_set: HashSet<_> = relevant.iter().collect();
        let hits = recommended
            .iter()
            .take(self.k)
            .filter(|item| relevant_set.contains(item))
            .count();

        hits as f64 / self.k.min(recommended.len()) as f64
    }

    pub fn calculate_recall_at_k<T: Eq + Hash>(&self, recommended: &[T], relevant: &[T]) -> f64 {
        if relevant.is_empty() {
            return 0.0;
        }

        let relevant_set: HashSet<_> = relevant.iter().collect();
        let hits = recommended
            .iter()
            .take(self.k)
            .filter(|item| relevant_set.contains(item))
            .count();

        hits as f64 / relevant.len() as f64
    }

    pub fn calculate_ndcg_at_k<T: Eq + Hash>(&self, recommended: &[T], relevance: &HashMap<T, f64>) -> f64 {
        let dcg: f64 = recommended
            .iter()
            .take(self.k)
            .enumerate()
            .map(|(i, item)| relevance.get(item).copied().unwrap_or(0.0) / ((i + 2) as f64).log2())
            .sum();

        let mut ideal: Vec<f64> = relevance.values().copied().collect();
        ideal.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
        let idcg: f64 = ideal
            .iter()
            .take(self.k)
            .enumerate()
            .map(|(i, score)| score / ((i + 2) as f64).log2())
            .sum();

        if idcg == 0.0 {
            0.0
        } else {
            dcg / idcg
        }
    }

    /// Averages the ranking metrics over every user that has held-out items.
    pub fn evaluate<U, T>(
        &self,
        recommended: &HashMap<U, Vec<T>>,
        held_out: &HashMap<U, HashMap<T, f64>>,
    ) -> RankingMetrics
    where
        U: Eq + Hash,
        T: Eq + Hash + Clone,
    {
        let mut totals = RankingMetrics::default();

        for (user, relevance) in held_out {
            let Some(items) = recommended.get(user) else {
                continue;
            };
            let relevant: Vec<T> = relevance.keys().cloned().collect();

            totals.precision_at_k += self.calculate_precision_at_k(items, &relevant);
            totals.recall_at_k += self.calculate_recall_at_k(items, &relevant);
            totals.ndcg_at_k += self.calculate_ndcg_at_k(items, relevance);
            totals.users_evaluated += 1;
        }

        if totals.users_evaluated > 0 {
            let n = totals.users_evaluated as f64;
            totals.precision_at_k /= n;
            totals.recall_at_k /= n;
            totals.ndcg_at_k /= n;
        }
        totals
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rmse() {
        assert_eq!(rmse(Vec::new()), None);
        let value = rmse(vec![(1.0, 0.0), (3.0, 2.0)]).unwrap();
        assert!((value - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_precision_and_recall() {
        let calculator = MetricsCalculator::new(5);
        let recommended = vec![1, 2, 3];
        let relevant = vec![1, 3];

        let precision = calculator.calculate_precision_at_k(&recommended, &relevant);
        assert!((precision - 2.0 / 3.0).abs() < 1e-9);
        let recall = calculator.calculate_recall_at_k(&recommended, &relevant);
        assert!((recall - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_ndcg_perfect_ranking() {
        let calculator = MetricsCalculator::new(3);
        let relevance: HashMap<i64, f64> = [(1, 3.0), (2, 2.0), (3, 1.0)].into_iter().collect();
        let ndcg = calculator.calculate_ndcg_at_k(&[1, 2, 3], &relevance);
        assert!((ndcg - 1.0).abs() < 1e-9);

        let reversed = calculator.calculate_ndcg_at_k(&[3, 2, 1], &relevance);
        assert!(reversed < 1.0);
    }

    #[test]
    fn test_evaluate_skips_users_without_recommendations() {
        let calculator = MetricsCalculator::new(2);
        let recommended: HashMap<&str, Vec<i64>> = [("u1", vec![10, 11])].into_iter().collect();
        let held_out: HashMap<&str, HashMap<i64, f64>> = [
            ("u1", [(10, 1.0)].into_iter().collect()),
            ("u2", [(12, 1.0)].into_iter().collect()),
        ]
        .into_iter()
        .collect();

        let metrics = calculator.evaluate(&recommended, &held_out);
        assert_eq!(metrics.users_evaluated, 1);
        assert!((metrics.recall_at_k - 1.0).abs() < 1e-9);
    }
}
