use crate::error::{RecError, Result};
use crate::models::{InteractionRow, RatingTriple, SignalColumn};
use crate::utils::validation::{validate_interaction, validate_weights};
use crate::utils::{min_max, min_max_scale};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use tracing::{debug, warn};

/// Per-column weights of the implicit rating sum.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatingWeights {
    pub funny: f64,
    pub help_score: f64,
    pub help_num: f64,
    pub recommend: f64,
    pub playtime_recent: f64,
    pub playtime_lifetime: f64,
}

impl Default for RatingWeights {
    fn default() -> Self {
        Self::uniform(1.0)
    }
}

impl RatingWeights {
    pub fn uniform(weight: f64) -> Self {
        Self {
            funny: weight,
            help_score: weight,
            help_num: weight,
            recommend: weight,
            playtime_recent: weight,
            playtime_lifetime: weight,
        }
    }

    pub fn weight(&self, column: SignalColumn) -> f64 {
        match column {
            SignalColumn::Funny => self.funny,
            SignalColumn::HelpScore => self.help_score,
            SignalColumn::HelpNum => self.help_num,
            SignalColumn::Recommend => self.recommend,
            SignalColumn::PlaytimeRecent => self.playtime_recent,
            SignalColumn::PlaytimeLifetime => self.playtime_lifetime,
        }
    }

    /// Upper bound of a derived rating.
    pub fn total(&self) -> f64 {
        SignalColumn::ALL.iter().map(|&c| self.weight(c)).sum()
    }
}

#[derive(Debug, Clone)]
pub struct RatingDeriver {
    weights: RatingWeights,
}

impl Default for RatingDeriver {
    fn default() -> Self {
        Self::new(RatingWeights::default())
    }
}

impl RatingDeriver {
    pub fn new(weights: RatingWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &RatingWeights {
        &self.weights
    }

    /// One rating per review: the weighted sum of min-max scaled columns.
    ///
    /// Scaling bounds come from the whole interaction set. Missing values are
    /// left out of the bounds and contribute nothing to the sum.
    pub fn derive(&self, rows: &[InteractionRow]) -> Result<Vec<RatingTriple>> {
        if rows.is_empty() {
            return Err(RecError::DegenerateInput("no interactions to derive ratings from".into()));
        }
        validate_weights(&self.weights)?;
        for row in rows {
            validate_interaction(row)?;
        }

        let bounds: Vec<Option<(f64, f64)>> = SignalColumn::ALL
            .iter()
            .map(|&column| {
                let range = min_max(rows.iter().map(|r| r.signal(column)));
                match range {
                    Some((lo, hi)) if lo == hi => {
                        warn!("Column {} has zero variance; it contributes 0 to every rating", column.name())
                    }
                    None => debug!("Column {} has no values", column.name()),
                    _ => {}
                }
                range
            })
            .collect();

        Ok(rows
            .iter()
            .map(|row| {
                let rating = SignalColumn::ALL
                    .iter()
                    .zip(&bounds)
                    .filter_map(|(&column, range)| {
                        let (lo, hi) = (*range)?;
                        let value = row.signal(column)?;
                        Some(self.weights.weight(column) * min_max_scale(value, lo, hi))
                    })
                    .sum();
                RatingTriple::new(row.user_id.clone(), row.item_id, rating)
            })
            .collect())
    }
}

/// A loosely joined, wide review table such as `SELECT *` over several tables.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

static NULL: Value = Value::Null;
const USER_COLUMN: &str = "user_id";
const ITEM_COLUMNS: [&str; 2] = ["game_id", "item_id"];

impl ColumnTable {
    /// Drops repeated column names, keeping the first occurrence of each.
    pub fn dedup_columns(self) -> Self {
        let keep: Vec<usize> = {
            let mut seen = HashSet::new();
            self.columns
                .iter()
                .enumerate()
                .filter(|(_, name)| seen.insert(name.as_str()))
                .map(|(i, _)| i)
                .collect()
        };

        if keep.len() == self.columns.len() {
            return self;
        }
        debug!("Dropping {} duplicated columns", self.columns.len() - keep.len());

        let columns = keep.iter().map(|&i| self.columns[i].clone()).collect();
        let rows = self
            .rows
            .into_iter()
            .map(|row| keep.iter().map(|&i| row.get(i).cloned().unwrap_or(Value::Null)).collect())
            .collect();
        Self { columns, rows }
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Converts to typed reviews after de-duplicating columns.
    pub fn into_interactions(self) -> Result<Vec<InteractionRow>> {
        let table = self.dedup_columns();

        let user_col = table
            .position(USER_COLUMN)
            .ok_or_else(|| RecError::InvalidInput("review table has no user_id column".into()))?;
        let item_col = ITEM_COLUMNS
            .iter()
            .find_map(|name| table.position(name))
            .ok_or_else(|| RecError::InvalidInput("review table has no game_id column".into()))?;
        let signal_cols: Vec<(SignalColumn, usize)> = SignalColumn::ALL
            .iter()
            .filter_map(|&c| table.position(c.name()).map(|i| (c, i)))
            .collect();

        table
            .rows
            .iter()
            .enumerate()
            .map(|(line, row)| {
                let cell = |i: usize| row.get(i).unwrap_or(&NULL);

                let user_id = match cell(user_col) {
                    Value::String(s) => s.clone(),
                    Value::Number(n) => n.to_string(),
                    other => {
                        return Err(RecError::InvalidInput(format!(
                            "row {}: invalid user_id {}",
                            line, other
                        )))
                    }
                };
                let item_id = cell(item_col).as_i64().ok_or_else(|| {
                    RecError::InvalidInput(format!("row {}: invalid game_id {}", line, cell(item_col)))
                })?;

                let mut interaction = InteractionRow::new(user_id, item_id);
                for &(column, i) in &signal_cols {
                    *interaction.signal_mut(column) = as_float(cell(i)).map_err(|e| {
                        RecError::InvalidInput(format!("row {}: column {}: {}", line, column.name(), e))
                    })?;
                }
                Ok(interaction)
            })
            .collect()
    }
}

fn as_float(value: &Value) -> std::result::Result<Option<f64>, String> {
    match value {
        Value::Null => Ok(None),
        Value::Bool(b) => Ok(Some(if *b { 1.0 } else { 0.0 })),
        Value::Number(n) => n.as_f64().map(Some).ok_or_else(|| format!("{} is not a float", n)),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "" => Ok(None),
            "true" => Ok(Some(1.0)),
            "false" => Ok(Some(0.0)),
            other => other.parse().map(Some).map_err(|_| format!("{:?} is not numeric", s)),
        },
        other => Err(format!("unsupported value {}", other)),
    }
}
