use crate::algorithms::als::AlsConfig;
use crate::algorithms::rating::RatingWeights;
use crate::error::{RecError, Result};
use crate::models::{InteractionRow, RatingTriple, SignalColumn};

pub fn validate_interaction(row: &InteractionRow) -> Result<()> {
    if row.user_id.trim().is_empty() {
        return Err(RecError::InvalidInput("User ID cannot be empty".into()));
    }

    for column in SignalColumn::ALL {
        if let Some(value) = row.signal(column) {
            if !value.is_finite() {
                return Err(RecError::DegenerateInput(format!(
                    "column {} of review ({}, {}) is not finite",
                    column.name(),
                    row.user_id,
                    row.item_id
                )));
            }
        }
    }

    Ok(())
}

pub fn validate_triples(triples: &[RatingTriple]) -> Result<()> {
    if triples.is_empty() {
        return Err(RecError::DegenerateInput("no ratings to train on".into()));
    }

    if let Some(bad) = triples.iter().find(|t| !t.rating.is_finite()) {
        return Err(RecError::DegenerateInput(format!(
            "rating for ({}, {}) is not finite",
            bad.user_id, bad.item_id
        )));
    }

    Ok(())
}

pub fn validate_k(k: usize, max_k: usize) -> Result<()> {
    if k == 0 {
        return Err(RecError::InvalidInput("Number of recommendations must be greater than 0".into()));
    }

    if k > max_k {
        return Err(RecError::InvalidInput(format!(
            "Number of recommendations too large: {} (max {})",
            k, max_k
        )));
    }

    Ok(())
}

pub fn validate_item_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(RecError::InvalidInput("Item name cannot be empty".into()));
    }

    if name.len() > 512 {
        return Err(RecError::InvalidInput("Item name too long (max 512 characters)".into()));
    }

    Ok(())
}

pub fn validate_als_config(config: &AlsConfig) -> Result<()> {
    if config.rank == 0 {
        return Err(RecError::InvalidInput("Latent rank must be greater than 0".into()));
    }

    if config.max_iterations == 0 {
        return Err(RecError::InvalidInput("Iteration budget must be greater than 0".into()));
    }

    if !(config.regularization.is_finite() && config.regularization >= 0.0) {
        return Err(RecError::InvalidInput("Regularization must be a non-negative number".into()));
    }

    if !(config.train_ratio > 0.0 && config.train_ratio <= 1.0) {
        return Err(RecError::InvalidInput("Train ratio must be in (0, 1]".into()));
    }

    Ok(())
}

pub fn validate_weights(weights: &RatingWeights) -> Result<()> {
    for column in SignalColumn::ALL {
        let weight = weights.weight(column);
        if !(weight.is_finite() && weight >= 0.0) {
            return Err(RecError::InvalidInput(format!(
                "Weight of column {} must be a non-negative number, got {}",
                column.name(),
                weight
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_interaction() {
        let valid = InteractionRow::new("alice", 1).with_signal(SignalColumn::Funny, 2.0);
        assert!(validate_interaction(&valid).is_ok());

        let anonymous = InteractionRow::new("  ", 1);
        assert!(matches!(validate_interaction(&anonymous), Err(RecError::InvalidInput(_))));

        let nan = InteractionRow::new("alice", 1).with_signal(SignalColumn::HelpNum, f64::NAN);
        assert!(matches!(validate_interaction(&nan), Err(RecError::DegenerateInput(_))));
    }

    #[test]
    fn test_validate_k() {
        assert!(validate_k(10, 100).is_ok());
        assert!(validate_k(0, 100).is_err());
        assert!(validate_k(101, 100).is_err());
    }

    #[test]
    fn test_validate_als_config() {
        assert!(validate_als_config(&AlsConfig::default()).is_ok());

        let config = AlsConfig {
            train_ratio: 0.0,
            ..AlsConfig::default()
        };
        assert!(validate_als_config(&config).is_err());
    }

    #[test]
    fn test_validate_weights() {
        assert!(validate_weights(&RatingWeights::default()).is_ok());
        assert!(validate_weights(&RatingWeights::uniform(0.0)).is_ok());

        let negative = RatingWeights {
            funny: -1.0,
            ..RatingWeights::default()
        };
        assert!(matches!(validate_weights(&negative), Err(RecError::InvalidInput(_))));

        let infinite = RatingWeights {
            playtime_lifetime: f64::INFINITY,
            ..RatingWeights::default()
        };
        assert!(validate_weights(&infinite).is_err());
        assert!(validate_weights(&RatingWeights::uniform(f64::NAN)).is_err());
    }

    #[test]
    fn test_validate_triples() {
        assert!(validate_triples(&[]).is_err());
        assert!(validate_triples(&[RatingTriple::new("u", 1, f64::INFINITY)]).is_err());
        assert!(validate_triples(&[RatingTriple::new("u", 1, 0.5)]).is_ok());
    }
}
