use gamerec::algorithms::*;
use gamerec::services::data_source::{CatalogSource, InMemorySource};
use gamerec::*;
use std::collections::HashSet;
use std::sync::Arc;

fn fixture_path() -> String {
    format!("{}/data/fixture.json", env!("CARGO_MANIFEST_DIR"))
}

fn test_config() -> Config {
    let mut config = Config::default();
    config.training.threads = 2;
    config
}

async fn fixture_state() -> AppState {
    let source = InMemorySource::load_fixture(fixture_path()).await.unwrap();
    AppState::with_source(test_config(), Arc::new(source))
}

#[tokio::test]
async fn test_content_flow_on_fixture() {
    let state = fixture_state().await;
    let service = &state.recommendation_service;

    let response = service.content_recommend("Skyrim").await.unwrap();
    let catalog_size = service.content().index().await.unwrap().len();
    assert_eq!(response.items.len(), 10.min(catalog_size - 1));
    assert!(!response.items.iter().any(|name| name == "Skyrim"));
    // Both are open-world fantasy RPGs.
    assert_eq!(response.items[0], "The Witcher 3");

    assert!(service.content_recommend("Not A Game").await.unwrap_err().is_not_found());

    let similar = service.similar_items(30, 3).await.unwrap();
    assert_eq!(similar.len(), 3);
    assert!(similar.iter().all(|s| s.item_id != 30));
}

#[tokio::test]
async fn test_collaborative_flow_on_fixture() {
    let state = fixture_state().await;
    let service = &state.recommendation_service;

    let handle = service.train_collaborative().await.unwrap();
    assert_eq!(handle.train_size + handle.test_size, 60);
    assert!(handle.train_rmse.is_some());

    let newcomer = service.recommend_for_user("newcomer", 5).await.unwrap();
    assert!(newcomer.cold_start);
    assert!(newcomer.recommendations.is_empty());

    let model = service.training().model().await.unwrap();
    let all = model.recommend_for_all_users(5);
    for (user, items) in &all {
        let served = service.recommend_for_user(user, 5).await.unwrap();
        assert_eq!(&served.recommendations, items);
        assert!(items.windows(2).all(|w| w[0].score >= w[1].score));
    }

    let info = service.model_info().await;
    assert_eq!(info.state, ModelState::Trained);
    assert_eq!(info.model.map(|m| m.version), Some(handle.version));
}

#[tokio::test]
async fn test_same_seed_is_reproducible_end_to_end() {
    let first = fixture_state().await;
    let second = fixture_state().await;

    let a = first.recommendation_service.train_collaborative().await.unwrap();
    let b = second.recommendation_service.train_collaborative().await.unwrap();
    assert_eq!(a.train_size, b.train_size);
    assert_eq!(a.test_size, b.test_size);
    assert_eq!(a.test_rmse, b.test_rmse);

    let a = first.recommendation_service.training().model().await.unwrap();
    let b = second.recommendation_service.training().model().await.unwrap();
    assert_eq!(a.recommend_for_all_users(3), b.recommend_for_all_users(3));
}

#[tokio::test]
async fn test_fixture_ratings_and_matrix() {
    let source = InMemorySource::load_fixture(fixture_path()).await.unwrap();
    let interactions = source.interactions().await.unwrap();

    let triples = RatingDeriver::default().derive(&interactions).unwrap();
    assert_eq!(triples.len(), interactions.len());
    assert!(triples.iter().all(|t| (0.0..=6.0).contains(&t.rating)));

    let matrix = RatingMatrix::pivot(&triples);
    let users: HashSet<_> = triples.iter().map(|t| t.user_id.clone()).collect();
    assert_eq!(matrix.num_users(), users.len());
    assert_eq!(matrix.unpivot().len(), matrix.nnz());
}

#[tokio::test]
async fn test_registered_user_enters_next_model() {
    let source = Arc::new(InMemorySource::load_fixture(fixture_path()).await.unwrap());
    let mut config = test_config();
    config.training.train_ratio = 1.0;
    let state = AppState::with_source(config, source.clone());
    let service = &state.recommendation_service;

    service.train_collaborative().await.unwrap();
    assert!(service.recommend_for_user("signup", 3).await.unwrap_err().is_not_found());

    source.register_user("signup", &[10, 20], 10.0);
    assert!(service.training().is_stale().await.unwrap());
    service.training().refresh_if_stale().await.unwrap();

    let recs = service.recommend_for_user("signup", 3).await.unwrap();
    assert!(!recs.cold_start);
    assert_eq!(recs.recommendations.len(), 3);
}

#[tokio::test]
async fn test_top_items_baseline() {
    let state = fixture_state().await;
    let top = state.recommendation_service.top_items().await.unwrap();

    assert!(top.len() <= 10);
    assert!(!top.contains(&120));
    assert_eq!(top[0], 10);
}

#[test]
fn test_config_file_overrides_defaults() {
    let path = format!("{}/config/default.toml", env!("CARGO_MANIFEST_DIR"));
    let config = Config::from_file(&path).unwrap();

    assert_eq!(config.server.port, 8111);
    assert_eq!(config.content.ngram_max, 3);
    assert_eq!(config.training.rank, 10);
    assert!(config.training.threads >= 1);
}

#[test]
fn test_trainer_runs_on_blocking_executor() {
    let triples = vec![
        RatingTriple::new("u1", 1, 0.9),
        RatingTriple::new("u1", 2, 0.1),
        RatingTriple::new("u2", 1, 0.2),
    ];
    let config = AlsConfig {
        train_ratio: 1.0,
        ..AlsConfig::default()
    };

    let model = tokio_test::block_on(async move {
        tokio::task::spawn_blocking(move || AlsTrainer::new(config).fit(&triples, &TrainingControl::new()))
            .await
            .unwrap()
    })
    .unwrap();
    assert_eq!(model.recommend_for_user("u1", 1).unwrap()[0].item_id, 1);
}
