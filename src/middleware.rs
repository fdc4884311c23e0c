use std::time::Duration;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tracing::warn;

use crate::{error::ApiError, state::AppState};

/// Bounds every request by `REQUEST_TIMEOUT_SECS`; on expiry the handler is
/// dropped and the caller gets 503.
pub async fn request_timeout(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let limit = Duration::from_secs(state.config.request_timeout_secs);
    let method = req.method().clone();
    let uri = req.uri().clone();
    match tokio::time::timeout(limit, next.run(req)).await {
        Ok(res) => Ok(res),
        Err(_) => {
            warn!(%method, %uri, timeout_secs = limit.as_secs(), "request timed out");
            Err(ApiError::Unavailable)
        }
    }
}
