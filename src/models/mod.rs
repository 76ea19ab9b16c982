use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type ItemId = i64;
pub type UserId = String;

/// One row of the games x tags x genres x languages left join.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemAttributeRow {
    pub item_id: ItemId,
    pub item_name: String,
    pub tag_name: Option<String>,
    pub genre_name: Option<String>,
    pub language_name: Option<String>,
}

impl ItemAttributeRow {
    pub fn new(item_id: ItemId, item_name: impl Into<String>) -> Self {
        Self {
            item_id,
            item_name: item_name.into(),
            tag_name: None,
            genre_name: None,
            language_name: None,
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag_name = Some(tag.into());
        self
    }

    pub fn with_genre(mut self, genre: impl Into<String>) -> Self {
        self.genre_name = Some(genre.into());
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language_name = Some(language.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRow {
    pub user_id: UserId,
    pub playtime_total_forever: Option<f64>,
    pub playtime_total_2week: Option<f64>,
}

impl UserRow {
    pub fn new(user_id: impl Into<UserId>) -> Self {
        Self {
            user_id: user_id.into(),
            playtime_total_forever: None,
            playtime_total_2week: None,
        }
    }
}

/// Behavioral columns of a review that feed the implicit rating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalColumn {
    Funny,
    HelpScore,
    HelpNum,
    Recommend,
    PlaytimeRecent,
    PlaytimeLifetime,
}

impl SignalColumn {
    pub const ALL: [SignalColumn; 6] = [
        SignalColumn::Funny,
        SignalColumn::HelpScore,
        SignalColumn::HelpNum,
        SignalColumn::Recommend,
        SignalColumn::PlaytimeRecent,
        SignalColumn::PlaytimeLifetime,
    ];

    /// Column name as stored in the reviews table.
    pub fn name(self) -> &'static str {
        match self {
            SignalColumn::Funny => "funny",
            SignalColumn::HelpScore => "help_score",
            SignalColumn::HelpNum => "help_num",
            SignalColumn::Recommend => "recommend",
            SignalColumn::PlaytimeRecent => "playtime_total_2week",
            SignalColumn::PlaytimeLifetime => "playtime_total_forever",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

/// A single review. Missing columns are `None`, never zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionRow {
    pub user_id: UserId,
    pub item_id: ItemId,
    pub funny: Option<f64>,
    pub help_score: Option<f64>,
    pub help_num: Option<f64>,
    pub recommend: Option<f64>,
    pub playtime_recent: Option<f64>,
    pub playtime_lifetime: Option<f64>,
}

impl InteractionRow {
    pub fn new(user_id: impl Into<UserId>, item_id: ItemId) -> Self {
        Self {
            user_id: user_id.into(),
            item_id,
            funny: None,
            help_score: None,
            help_num: None,
            recommend: None,
            playtime_recent: None,
            playtime_lifetime: None,
        }
    }

    pub fn with_signal(mut self, column: SignalColumn, value: f64) -> Self {
        *self.signal_mut(column) = Some(value);
        self
    }

    pub fn with_recommend(self, recommend: bool) -> Self {
        self.with_signal(SignalColumn::Recommend, if recommend { 1.0 } else { 0.0 })
    }

    pub fn signal(&self, column: SignalColumn) -> Option<f64> {
        match column {
            SignalColumn::Funny => self.funny,
            SignalColumn::HelpScore => self.help_score,
            SignalColumn::HelpNum => self.help_num,
            SignalColumn::Recommend => self.recommend,
            SignalColumn::PlaytimeRecent => self.playtime_recent,
            SignalColumn::PlaytimeLifetime => self.playtime_lifetime,
        }
    }

    pub fn signal_mut(&mut self, column: SignalColumn) -> &mut Option<f64> {
        match column {
            SignalColumn::Funny => &mut self.funny,
            SignalColumn::HelpScore => &mut self.help_score,
            SignalColumn::HelpNum => &mut self.help_num,
            SignalColumn::Recommend => &mut self.recommend,
            SignalColumn::PlaytimeRecent => &mut self.playtime_recent,
            SignalColumn::PlaytimeLifetime => &mut self.playtime_lifetime,
        }
    }
}

/// Aggregated per-item attributes plus the derived text used for similarity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemFeature {
    pub item_id: ItemId,
    pub name: String,
    pub tags: Vec<String>,
    pub genres: Vec<String>,
    pub languages: Vec<String>,
    pub feature: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingTriple {
    pub user_id: UserId,
    pub item_id: ItemId,
    pub rating: f64,
}

impl RatingTriple {
    pub fn new(user_id: impl Into<UserId>, item_id: ItemId, rating: f64) -> Self {
        Self {
            user_id: user_id.into(),
            item_id,
            rating,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredItem {
    pub item_id: ItemId,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredUser {
    pub user_id: UserId,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarItem {
    pub item_id: ItemId,
    pub name: String,
    pub score: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelState {
    Untrained,
    Training,
    Trained,
    Retired,
}

/// Identity and summary of one published latent-factor model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelHandle {
    pub version: Uuid,
    pub trained_at: DateTime<Utc>,
    pub num_users: usize,
    pub num_items: usize,
    pub train_size: usize,
    pub test_size: usize,
    pub iterations: usize,
    pub train_rmse: Option<f64>,
    pub test_rmse: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub state: ModelState,
    pub model: Option<ModelHandle>,
    pub interactions_version: Option<u64>,
    pub training_in_flight: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecommendations {
    pub user_id: UserId,
    pub recommendations: Vec<ScoredItem>,
    pub cold_start: bool,
    pub model_version: Uuid,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemAudience {
    pub item_id: ItemId,
    pub users: Vec<ScoredUser>,
    pub cold_start: bool,
    pub model_version: Uuid,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentRecommendations {
    pub query: String,
    pub items: Vec<String>,
    pub generated_at: DateTime<Utc>,
}
