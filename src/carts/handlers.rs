use axum::{
    extract::State,
    http::StatusCode,
    routing::{delete, get},
    Router,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::{
    dto::{AddCartItemRequest, CartQuery},
    repo_types::CartItem,
};
use crate::{
    auth::{extractors::AuthUser, services::normalize_email},
    error::ApiError,
    extract::{Json, Path, Query},
    state::AppState,
};

pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/carts", get(list_cart).post(add_cart_item))
        .route("/carts/:id", delete(remove_cart_item))
}

/// Resolves an `?email=` owner filter against the caller. `None` means the
/// query omitted it.
pub(crate) fn owned_email(requested: Option<&str>, caller: &str) -> Result<Option<String>, ApiError> {
    match requested {
        None => Ok(None),
        Some(raw) => {
            let email = normalize_email(raw);
            if email != caller {
                warn!(requested = %email, caller = %caller, "owner mismatch");
                return Err(ApiError::Forbidden("forbidden access".into()));
            }
            Ok(Some(email))
        }
    }
}

#[instrument(skip(state, claims))]
pub async fn list_cart(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Query(q): Query<CartQuery>,
) -> Result<Json<Vec<CartItem>>, ApiError> {
    let Some(email) = owned_email(q.email.as_deref(), &claims.email)? else {
        return Ok(Json(Vec::new()));
    };
    Ok(Json(state.store.list_cart(&email).await?))
}

#[instrument(skip(state, claims, payload))]
pub async fn add_cart_item(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Json(payload): Json<AddCartItemRequest>,
) -> Result<(StatusCode, Json<CartItem>), ApiError> {
    owned_email(payload.email.as_deref(), &claims.email)?;

    let item = state
        .store
        .add_cart_item(payload.class_id, &claims.email)
        .await?;
    info!(cart_id = %item.id, class_id = %item.class_id, email = %item.email, "cart item added");
    Ok((StatusCode::CREATED, Json(item)))
}

#[instrument(skip(state, claims))]
pub async fn remove_cart_item(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.store.remove_cart_item(id, &claims.email).await?;
    info!(cart_id = %id, email = %claims.email, "cart item removed");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_email_is_not_an_error() {
        assert_eq!(owned_email(None, "a@x.com").unwrap(), None);
    }

    #[test]
    fn own_email_passes_after_normalizing() {
        assert_eq!(
            owned_email(Some(" A@x.com"), "a@x.com").unwrap(),
            Some("a@x.com".to_string())
        );
    }

    #[test]
    fn other_email_is_forbidden() {
        let err = owned_email(Some("b@x.com"), "a@x.com").unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));
    }
}
