mod callback;
mod middleware;

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    middleware as axum_middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::json;
use sqlx::Error as SqlxError;

use crate::{
    application::{dispatcher::CommandDispatcher, error::ErrorReport},
    infra::db::PostgresRepositories,
};

use self::middleware::{log_responses, set_request_context};

const BANNER: &str = concat!("tallybot ", env!("CARGO_PKG_VERSION"), "\n");

#[derive(Clone)]
pub struct HttpState {
    pub dispatcher: Arc<CommandDispatcher>,
    pub channel_secret: Arc<str>,
    pub db: Arc<PostgresRepositories>,
}

pub fn build_router(state: HttpState) -> Router {
    Router::new()
        .route("/", get(banner))
        .route("/healthz", get(healthz))
        .route("/_health/db", get(db_health))
        .route("/callback", post(callback::handle_callback))
        .with_state(state)
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(set_request_context))
}

async fn banner() -> &'static str {
    BANNER
}

async fn healthz() -> Response {
    Json(json!({ "status": "ok" })).into_response()
}

async fn db_health(State(state): State<HttpState>) -> Response {
    db_health_response(state.db.health_check().await)
}

fn db_health_response(result: Result<(), SqlxError>) -> Response {
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            let mut response = StatusCode::SERVICE_UNAVAILABLE.into_response();
            ErrorReport::from_error(
                "infra::http::db_health",
                StatusCode::SERVICE_UNAVAILABLE,
                &err,
            )
            .attach(&mut response);
            response
        }
    }
}
