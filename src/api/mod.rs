//! API layer -- axum routes, handlers, and middleware.

mod routes;
pub mod state;

use self::state::AppState;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::error::Error;

/// Build the application router with all API routes.
pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", routes::api_routes())
        .fallback(fallback)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn fallback() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "not found")
}

/// Crate error mapped onto an HTTP response.
pub(crate) struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::RunNotFound(_)
            | Error::ScheduleNotFound(_)
            | Error::DurationNotFound(_) => StatusCode::NOT_FOUND,
            Error::CancelRejected { .. } => StatusCode::CONFLICT,
            Error::FireTimeNotFuture { .. } | Error::InvalidSpec(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
        };
        let body = Json(json!({
            "error": { "message": self.0.to_string() }
        }));
        (status, body).into_response()
    }
}
