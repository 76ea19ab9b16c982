use crate::algorithms::rating::ColumnTable;
use crate::config::PostgresConfig;
use crate::models::{InteractionRow, ItemAttributeRow, ItemId, SignalColumn, UserRow};
use crate::utils::retry_with_backoff;
use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Read-only access to the catalog and review data.
///
/// Versions change whenever the underlying rows change; cached models compare
/// them to decide whether a rebuild is due.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn item_attributes(&self) -> Result<Vec<ItemAttributeRow>>;
    async fn interactions(&self) -> Result<Vec<InteractionRow>>;
    async fn users(&self) -> Result<Vec<UserRow>>;
    /// Popularity baseline: best rated games with more than `min_reviews` reviews.
    async fn top_items(&self, min_reviews: f64, limit: usize) -> Result<Vec<ItemId>>;
    async fn catalog_version(&self) -> Result<u64>;
    async fn interactions_version(&self) -> Result<u64>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameRow {
    pub item_id: ItemId,
    pub item_name: String,
    #[serde(default)]
    pub all_reviews: f64,
    #[serde(default)]
    pub all_rating: f64,
}

/// On-disk snapshot of the catalog. Reviews keep the loose column layout of
/// a `SELECT *` over reviews, games and users.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Fixture {
    #[serde(default)]
    pub games: Vec<GameRow>,
    #[serde(default)]
    pub attributes: Vec<ItemAttributeRow>,
    #[serde(default)]
    pub users: Vec<UserRow>,
    #[serde(default)]
    pub reviews: ColumnTable,
}

#[derive(Debug, Default)]
struct Catalog {
    games: Vec<GameRow>,
    attributes: Vec<ItemAttributeRow>,
    users: Vec<UserRow>,
    interactions: Vec<InteractionRow>,
    catalog_version: u64,
    interactions_version: u64,
}

#[derive(Debug, Default)]
pub struct InMemorySource {
    catalog: RwLock<Catalog>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_fixture(fixture: Fixture) -> Result<Self> {
        let interactions = fixture
            .reviews
            .into_interactions()
            .context("Failed to read fixture reviews")?;

        let source = Self::new();
        {
            let mut catalog = source.catalog.write();
            catalog.games = fixture.games;
            catalog.attributes = fixture.attributes;
            catalog.users = fixture.users;
            catalog.interactions = interactions;
        }
        Ok(source)
    }

    pub async fn load_fixture(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read fixture {}", path.display()))?;
        let fixture: Fixture = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse fixture {}", path.display()))?;

        let source = Self::from_fixture(fixture)?;
        {
            let catalog = source.catalog.read();
            info!(
                "Loaded fixture {}: {} games, {} attribute rows, {} users, {} reviews",
                path.display(),
                catalog.games.len(),
                catalog.attributes.len(),
                catalog.users.len(),
                catalog.interactions.len()
            );
        }
        Ok(source)
    }

    pub fn add_game(&self, game: GameRow) {
        let mut catalog = self.catalog.write();
        catalog.games.push(game);
        catalog.catalog_version += 1;
    }

    pub fn add_attributes<I: IntoIterator<Item = ItemAttributeRow>>(&self, rows: I) {
        let mut catalog = self.catalog.write();
        catalog.attributes.extend(rows);
        catalog.catalog_version += 1;
    }

    pub fn add_user(&self, user: UserRow) {
        let mut catalog = self.catalog.write();
        catalog.users.push(user);
        catalog.interactions_version += 1;
    }

    pub fn add_interactions<I: IntoIterator<Item = InteractionRow>>(&self, rows: I) {
        let mut catalog = self.catalog.write();
        catalog.interactions.extend(rows);
        catalog.interactions_version += 1;
    }

    /// Sign-up flow: a user with zero playtime plus one `help_score`-only
    /// review per liked game.
    pub fn register_user(&self, user_id: &str, liked: &[ItemId], help_score: f64) {
        let mut user = UserRow::new(user_id);
        user.playtime_total_forever = Some(0.0);
        user.playtime_total_2week = Some(0.0);

        let mut catalog = self.catalog.write();
        catalog.users.push(user);
        catalog.interactions.extend(
            liked
                .iter()
                .map(|&item| InteractionRow::new(user_id, item).with_signal(SignalColumn::HelpScore, help_score)),
        );
        catalog.interactions_version += 1;
    }
}

#[async_trait]
impl CatalogSource for InMemorySource {
    /// Games left-joined with their attribute rows: a game without any
    /// attribute row still yields one bare row.
    async fn item_attributes(&self) -> Result<Vec<ItemAttributeRow>> {
        let catalog = self.catalog.read();
        let described: HashSet<ItemId> = catalog.attributes.iter().map(|row| row.item_id).collect();

        let mut rows = catalog.attributes.clone();
        rows.extend(
            catalog
                .games
                .iter()
                .filter(|game| !described.contains(&game.item_id))
                .map(|game| ItemAttributeRow::new(game.item_id, game.item_name.clone())),
        );
        Ok(rows)
    }

    async fn interactions(&self) -> Result<Vec<InteractionRow>> {
        Ok(self.catalog.read().interactions.clone())
    }

    async fn users(&self) -> Result<Vec<UserRow>> {
        Ok(self.catalog.read().users.clone())
    }

    async fn top_items(&self, min_reviews: f64, limit: usize) -> Result<Vec<ItemId>> {
        let catalog = self.catalog.read();
        let mut popular: Vec<&GameRow> = catalog.games.iter().filter(|g| g.all_reviews > min_reviews).collect();
        popular.sort_by(|a, b| b.all_rating.partial_cmp(&a.all_rating).unwrap_or(std::cmp::Ordering::Equal));
        Ok(popular.into_iter().take(limit).map(|g| g.item_id).collect())
    }

    async fn catalog_version(&self) -> Result<u64> {
        Ok(self.catalog.read().catalog_version)
    }

    async fn interactions_version(&self) -> Result<u64> {
        Ok(self.catalog.read().interactions_version)
    }
}

const ITEM_ATTRIBUTES_QUERY: &str = r#"
    SELECT games.game_id::BIGINT AS game_id, games.app_name, tags.tag_name, genres.genre_name, languages.language_name
    FROM games
    LEFT JOIN tags ON games.game_id = tags.game_id
    LEFT JOIN genres ON games.game_id = genres.game_id
    LEFT JOIN languages ON games.game_id = languages.game_id
"#;

const INTERACTIONS_QUERY: &str = r#"
    SELECT reviews.user_id::TEXT AS user_id,
           reviews.game_id::BIGINT AS game_id,
           reviews.funny::FLOAT8 AS funny,
           reviews.help_score::FLOAT8 AS help_score,
           reviews.help_num::FLOAT8 AS help_num,
           CAST(reviews.recommend AS INTEGER)::FLOAT8 AS recommend,
           users.playtime_total_2week::FLOAT8 AS playtime_total_2week,
           users.playtime_total_forever::FLOAT8 AS playtime_total_forever
    FROM reviews
    LEFT JOIN games ON reviews.game_id = games.game_id
    LEFT JOIN users ON users.user_id = reviews.user_id
"#;

/// Catalog stored in the PostgreSQL schema of the web application
/// (`games`, `tags`, `genres`, `languages`, `users`, `reviews`).
#[derive(Debug, Clone)]
pub struct PostgresSource {
    pool: PgPool,
}

impl PostgresSource {
    pub async fn connect(config: &PostgresConfig) -> Result<Self> {
        let pool = retry_with_backoff(
            || {
                PgPoolOptions::new()
                    .max_connections(config.max_connections)
                    .acquire_timeout(Duration::from_secs(5))
                    .connect(&config.url)
            },
            3,
            Duration::from_millis(500),
        )
        .await
        .context("Failed to connect to PostgreSQL")?;

        info!("Connected to PostgreSQL with {} max connections", config.max_connections);
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn count(&self, sql: &str) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(sql).fetch_one(&self.pool).await?;
        Ok(count.max(0) as u64)
    }
}

#[async_trait]
impl CatalogSource for PostgresSource {
    async fn item_attributes(&self) -> Result<Vec<ItemAttributeRow>> {
        let rows = sqlx::query(ITEM_ATTRIBUTES_QUERY).fetch_all(&self.pool).await?;

        rows.iter()
            .map(|row| -> Result<ItemAttributeRow> {
                Ok(ItemAttributeRow {
                    item_id: row.try_get("game_id")?,
                    item_name: row.try_get("app_name")?,
                    tag_name: row.try_get("tag_name")?,
                    genre_name: row.try_get("genre_name")?,
                    language_name: row.try_get("language_name")?,
                })
            })
            .collect()
    }

    async fn interactions(&self) -> Result<Vec<InteractionRow>> {
        let rows = sqlx::query(INTERACTIONS_QUERY).fetch_all(&self.pool).await?;

        rows.iter()
            .map(|row| -> Result<InteractionRow> {
                let user_id: String = row.try_get("user_id")?;
                let mut interaction = InteractionRow::new(user_id, row.try_get::<i64, _>("game_id")?);
                for column in SignalColumn::ALL {
                    *interaction.signal_mut(column) = row.try_get(column.name())?;
                }
                Ok(interaction)
            })
            .collect()
    }

    async fn users(&self) -> Result<Vec<UserRow>> {
        let rows = sqlx::query(
            r#"
            SELECT user_id::TEXT AS user_id,
                   playtime_total_forever::FLOAT8 AS playtime_total_forever,
                   playtime_total_2week::FLOAT8 AS playtime_total_2week
            FROM users
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<UserRow> {
                Ok(UserRow {
                    user_id: row.try_get("user_id")?,
                    playtime_total_forever: row.try_get("playtime_total_forever")?,
                    playtime_total_2week: row.try_get("playtime_total_2week")?,
                })
            })
            .collect()
    }

    async fn top_items(&self, min_reviews: f64, limit: usize) -> Result<Vec<ItemId>> {
        let ids = sqlx::query_scalar(
            r#"
            SELECT game_id::BIGINT
            FROM games
            WHERE all_reviews > $1
            ORDER BY all_rating DESC
            LIMIT $2
            "#,
        )
        .bind(min_reviews)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }

    // Row counts: the application only ever appends to these tables.
    async fn catalog_version(&self) -> Result<u64> {
        self.count(
            "SELECT (SELECT COUNT(*) FROM games) + (SELECT COUNT(*) FROM tags) \
             + (SELECT COUNT(*) FROM genres) + (SELECT COUNT(*) FROM languages)",
        )
        .await
    }

    async fn interactions_version(&self) -> Result<u64> {
        self.count("SELECT (SELECT COUNT(*) FROM reviews) + (SELECT COUNT(*) FROM users)")
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fixture() -> Fixture {
        serde_json::from_value(json!({
            "games": [
                {"item_id": 1, "item_name": "Alpha", "all_reviews": 20000.0, "all_rating": 0.7},
                {"item_id": 2, "item_name": "Beta", "all_reviews": 500.0, "all_rating": 0.99},
                {"item_id": 3, "item_name": "Gamma", "all_reviews": 15000.0, "all_rating": 0.9}
            ],
            "attributes": [
                {"item_id": 1, "item_name": "Alpha", "tag_name": "rpg", "genre_name": null, "language_name": "english"}
            ],
            "users": [{"user_id": "alice", "playtime_total_forever": 10.0, "playtime_total_2week": 1.0}],
            "reviews": {
                "columns": ["user_id", "game_id", "funny", "help_score", "game_id"],
                "rows": [["alice", 1, 0, 3, 1], ["alice", 3, 2, null, 3]]
            }
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_fixture_source() {
        let source = InMemorySource::from_fixture(fixture()).unwrap();

        let rows = source.item_attributes().await.unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].tag_name.as_deref(), Some("rpg"));
        // Beta and Gamma have no attribute rows and come through bare.
        assert_eq!(rows[1].item_id, 2);
        assert_eq!(rows[2].item_name, "Gamma");
        assert!(rows[1..].iter().all(|r| r.tag_name.is_none() && r.genre_name.is_none()));
        assert_eq!(source.users().await.unwrap()[0].user_id, "alice");

        let interactions = source.interactions().await.unwrap();
        assert_eq!(interactions.len(), 2);
        assert_eq!(interactions[1].help_score, None);
        assert_eq!(interactions[1].funny, Some(2.0));
    }

    #[tokio::test]
    async fn test_top_items_filters_and_orders() {
        let source = InMemorySource::from_fixture(fixture()).unwrap();
        assert_eq!(source.top_items(10000.0, 10).await.unwrap(), vec![3, 1]);
        assert_eq!(source.top_items(10000.0, 1).await.unwrap(), vec![3]);
    }

    #[tokio::test]
    async fn test_versions_track_mutations() {
        let source = InMemorySource::new();
        let catalog = source.catalog_version().await.unwrap();
        let interactions = source.interactions_version().await.unwrap();

        source.register_user("bob", &[1, 2], 5.0);
        assert_eq!(source.catalog_version().await.unwrap(), catalog);
        assert!(source.interactions_version().await.unwrap() > interactions);

        let reviews = source.interactions().await.unwrap();
        assert_eq!(reviews.len(), 2);
        assert!(reviews.iter().all(|r| r.help_score == Some(5.0) && r.funny.is_none()));

        source.add_game(GameRow {
            item_id: 9,
            item_name: "Delta".into(),
            all_reviews: 0.0,
            all_rating: 0.0,
        });
        assert!(source.catalog_version().await.unwrap() > catalog);
    }
}
