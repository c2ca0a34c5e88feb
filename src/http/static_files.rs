use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};

use super::AppState;

/// Serves the landing page fresh off disk on every request; no in-memory
/// cache, no conditional-GET support, matching the original's "read the
/// file every time" behavior.
pub async fn index(State(state): State<AppState>) -> Response {
    let path = std::path::Path::new(&state.config.static_dir).join("index.html");
    match tokio::fs::read(&path).await {
        Ok(bytes) => ([(header::CONTENT_TYPE, "text/html; charset=utf-8")], bytes).into_response(),
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "landing page missing");
            StatusCode::NOT_FOUND.into_response()
        }
    }
}
