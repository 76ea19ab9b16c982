use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use clap::Parser;
use gamerec::{init_tracing, AppState, Config, RecError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "config/default.toml")]
    config: String,

    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[derive(Debug, Deserialize)]
struct TopKQuery {
    k: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct NameQuery {
    name: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    message: String,
}

impl<T> ApiResponse<T> {
    fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: "Success".to_string(),
        }
    }

    fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message,
        }
    }
}

struct ApiError(RecError);

impl From<RecError> for ApiError {
    fn from(e: RecError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            RecError::NotFound { .. } => StatusCode::NOT_FOUND,
            RecError::DegenerateInput(_) | RecError::InvalidInput(_) => StatusCode::UNPROCESSABLE_ENTITY,
            RecError::TrainingFailure(_)
            | RecError::TrainingCancelled
            | RecError::TrainingTimedOut(_)
            | RecError::ModelUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            RecError::Source(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        }
        (status, Json(ApiResponse::<()>::error(self.0.to_string()))).into_response()
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

async fn health_check() -> Json<ApiResponse<HashMap<String, String>>> {
    let mut status = HashMap::new();
    status.insert("status".to_string(), "healthy".to_string());
    status.insert("service".to_string(), "gamerec".to_string());
    status.insert("version".to_string(), env!("CARGO_PKG_VERSION").to_string());

    Json(ApiResponse::success(status))
}

async fn top_games(State(state): State<AppState>) -> ApiResult<Vec<gamerec::ItemId>> {
    let items = state.recommendation_service.top_items().await?;
    Ok(Json(ApiResponse::success(items)))
}

async fn similar_by_name(
    State(state): State<AppState>,
    Query(params): Query<NameQuery>,
) -> ApiResult<gamerec::ContentRecommendations> {
    let response = state.recommendation_service.content_recommend(&params.name).await?;
    Ok(Json(ApiResponse::success(response)))
}

async fn similar_by_id(
    State(state): State<AppState>,
    Path(item_id): Path<gamerec::ItemId>,
    Query(params): Query<TopKQuery>,
) -> ApiResult<Vec<gamerec::SimilarItem>> {
    let k = params.k.unwrap_or(state.config.content.top_n);
    let items = state.recommendation_service.similar_items(item_id, k).await?;
    Ok(Json(ApiResponse::success(items)))
}

async fn item_audience(
    State(state): State<AppState>,
    Path(item_id): Path<gamerec::ItemId>,
    Query(params): Query<TopKQuery>,
) -> ApiResult<gamerec::ItemAudience> {
    let k = params.k.unwrap_or(state.config.recommendation.default_k);
    let audience = state.recommendation_service.recommend_for_item(item_id, k).await?;
    Ok(Json(ApiResponse::success(audience)))
}

async fn user_recommendations(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(params): Query<TopKQuery>,
) -> ApiResult<gamerec::UserRecommendations> {
    let k = params.k.unwrap_or(state.config.recommendation.default_k);
    let recs = state.recommendation_service.recommend_for_user(&user_id, k).await?;
    Ok(Json(ApiResponse::success(recs)))
}

async fn retrain(State(state): State<AppState>) -> ApiResult<gamerec::ModelHandle> {
    let handle = state.recommendation_service.train_collaborative().await?;
    Ok(Json(ApiResponse::success(handle)))
}

async fn cancel_training(State(state): State<AppState>) -> Json<ApiResponse<bool>> {
    Json(ApiResponse::success(state.recommendation_service.cancel_training()))
}

async fn model_info(State(state): State<AppState>) -> Json<ApiResponse<serde_json::Value>> {
    let info = state.recommendation_service.model_info().await;
    let stats = state.recommendation_service.stats();
    Json(ApiResponse::success(serde_json::json!({
        "model": info,
        "serving_stats": stats,
    })))
}

fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/games/top", get(top_games))
        .route("/games/similar", get(similar_by_name))
        .route("/games/:item_id/similar", get(similar_by_id))
        .route("/games/:item_id/audience", get(item_audience))
        .route("/users/:user_id/recommendations", get(user_recommendations))
        .route("/model", get(model_info))
        .route("/model/retrain", post(retrain))
        .route("/model/cancel", post(cancel_training))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = if std::path::Path::new(&args.config).exists() {
        Config::from_file(&args.config)?
    } else {
        Config::default()
    };

    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.server.workers.max(1))
        .enable_all()
        .build()?
        .block_on(serve(args, config))
}

async fn serve(args: Args, config: Config) -> anyhow::Result<()> {
    std::env::set_var("RUST_LOG", &args.log_level);
    init_tracing().await;
    info!("Starting gamerec server with config: {:?}", config.server);

    let addr = config.server.socket_addr()?;
    let state = AppState::new(config).await?;

    // Build both models up front; the worker keeps them current afterwards.
    state.recommendation_service.start_refresh_worker();
    if let Err(e) = state.recommendation_service.content().index().await {
        warn!("Content index unavailable at startup: {}", e);
    }

    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
