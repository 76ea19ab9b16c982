use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RecError>;

#[derive(Debug, Error)]
pub enum RecError {
    /// The queried key does not exist in the current dataset.
    #[error("{kind} not found: {key}")]
    NotFound { kind: &'static str, key: String },

    /// Input that would make the numeric step meaningless (empty sets,
    /// too few users/items, non-finite values).
    #[error("degenerate input: {0}")]
    DegenerateInput(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("training failed: {0}")]
    TrainingFailure(String),

    #[error("training cancelled")]
    TrainingCancelled,

    #[error("training exceeded its time budget of {0:?}")]
    TrainingTimedOut(Duration),

    /// No model has been published yet.
    #[error("{0} model is not available")]
    ModelUnavailable(&'static str),

    #[error("data source error: {0}")]
    Source(#[from] anyhow::Error),
}

impl RecError {
    pub fn item_name(name: impl Into<String>) -> Self {
        Self::NotFound { kind: "item", key: name.into() }
    }

    pub fn item_id(id: i64) -> Self {
        Self::NotFound { kind: "item", key: id.to_string() }
    }

    pub fn user(id: impl Into<String>) -> Self {
        Self::NotFound { kind: "user", key: id.into() }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Errors the caller may resolve by retrying, possibly with adjusted
    /// training parameters.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::TrainingFailure(_) | Self::TrainingCancelled | Self::TrainingTimedOut(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display() {
        let err = RecError::item_name("DOOM");
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "item not found: DOOM");
    }

    #[test]
    fn test_retryable() {
        assert!(RecError::TrainingCancelled.is_retryable());
        assert!(RecError::TrainingFailure("nan".into()).is_retryable());
        assert!(!RecError::DegenerateInput("empty".into()).is_retryable());
    }
}
