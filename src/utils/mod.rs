use std::cmp::Ordering;

pub mod metrics;
pub mod validation;

fn descending<T: PartialOrd>(a: &T, b: &T) -> Ordering {
    b.partial_cmp(a).unwrap_or(Ordering::Equal)
}

/// Indices of the `k` highest scores, best first. Ties keep input order.
pub fn top_k_indices<T: PartialOrd + Copy>(scores: &[T], k: usize) -> Vec<usize> {
    let mut indexed: Vec<(usize, T)> = scores.iter().copied().enumerate().collect();
    indexed.sort_by(|a, b| descending(&a.1, &b.1));
    indexed.into_iter().take(k).map(|(i, _)| i).collect()
}

/// Like [`top_k_indices`] but skips `exclude` and keeps the scores.
pub fn top_k_excluding<T: PartialOrd + Copy>(scores: &[T], k: usize, exclude: usize) -> Vec<(usize, T)> {
    let mut indexed: Vec<(usize, T)> = scores
        .iter()
        .copied()
        .enumerate()
        .filter(|(i, _)| *i != exclude)
        .collect();
    indexed.sort_by(|a, b| descending(&a.1, &b.1));
    indexed.truncate(k);
    indexed
}

/// Minimum and maximum of the present values, `None` when nothing is present.
pub fn min_max<I>(values: I) -> Option<(f64, f64)>
where
    I: IntoIterator<Item = Option<f64>>,
{
    values.into_iter().flatten().fold(None, |acc, v| match acc {
        None => Some((v, v)),
        Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
    })
}

/// Scales `value` into [0, 1]; a zero-width range maps to 0.
pub fn min_max_scale(value: f64, min: f64, max: f64) -> f64 {
    let range = max - min;
    if range > 0.0 {
        (value - min) / range
    } else {
        0.0
    }
}

pub async fn retry_with_backoff<F, Fut, T, E>(
    mut operation: F,
    max_retries: usize,
    initial_delay: std::time::Duration,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Debug,
{
    let mut delay = initial_delay;
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if attempt >= max_retries => return Err(e),
            Err(e) => {
                attempt += 1;
                tracing::warn!("Operation failed (attempt {}), retrying in {:?}: {:?}",
                              attempt, delay, e);
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_top_k_indices() {
        let scores = vec![0.1, 0.5, 0.3, 0.9, 0.2];
        let top_2 = top_k_indices(&scores, 2);
        assert_eq!(top_2, vec![3, 1]);
    }

    #[test]
    fn test_top_k_ties_keep_insertion_order() {
        let scores = vec![0.5f32, 0.7, 0.5, 0.5];
        assert_eq!(top_k_indices(&scores, 4), vec![1, 0, 2, 3]);

        let ranked = top_k_excluding(&scores, 10, 1);
        assert_eq!(ranked.iter().map(|(i, _)| *i).collect::<Vec<_>>(), vec![0, 2, 3]);
    }

    #[test]
    fn test_min_max_skips_missing() {
        let values = vec![Some(3.0), None, Some(-1.0), Some(2.0)];
        assert_eq!(min_max(values), Some((-1.0, 3.0)));
        assert_eq!(min_max(vec![None, None]), None);
    }

    #[test]
    fn test_min_max_scale_zero_range() {
        assert_eq!(min_max_scale(4.0, 4.0, 4.0), 0.0);
        assert!((min_max_scale(5.0, 0.0, 10.0) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_retry_with_backoff_eventually_succeeds() {
        let mut calls = 0;
        let result: Result<u32, &str> = tokio_test::block_on(retry_with_backoff(
            || {
                calls += 1;
                let outcome = if calls < 3 { Err("down") } else { Ok(calls) };
                async move { outcome }
            },
            5,
            std::time::Duration::from_millis(1),
        ));
        assert_eq!(result, Ok(3));
    }
}
