use axum::{
    extract::{FromRef, State},
    routing::post,
    Router,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

use crate::{
    auth::{
        jwt::JwtKeys,
        services::{is_valid_email, normalize_email},
    },
    error::ApiError,
    extract::Json,
    state::AppState,
};

/// Request body for token issuance.
#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
}

pub fn auth_routes() -> Router<AppState> {
    Router::new().route("/jwt", post(issue_token))
}

#[instrument(skip(state, payload))]
pub async fn issue_token(
    State(state): State<AppState>,
    Json(payload): Json<TokenRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let email = normalize_email(&payload.email);
    if !is_valid_email(&email) {
        warn!(email = %email, "invalid email");
        return Err(ApiError::InvalidArgument("invalid email".into()));
    }

    let keys = JwtKeys::from_ref(&state);
    let token = keys.sign(&email).map_err(|e| {
        error!(error = %e, "jwt sign failed");
        ApiError::Internal(e.to_string())
    })?;

    info!(email = %email, "token issued");
    Ok(Json(TokenResponse { token }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn issued_token_carries_normalized_email() {
        let state = AppState::fake();
        let Json(res) = issue_token(
            State(state.clone()),
            Json(TokenRequest {
                email: " A@X.com ".into(),
            }),
        )
        .await
        .expect("token");
        let claims = JwtKeys::from_ref(&state).verify(&res.token).expect("verify");
        assert_eq!(claims.email, "a@x.com");
    }

    #[tokio::test]
    async fn malformed_email_is_rejected() {
        let err = issue_token(
            State(AppState::fake()),
            Json(TokenRequest {
                email: "nope".into(),
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::InvalidArgument(_)));
    }
}
