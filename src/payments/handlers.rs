use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Router,
};
use rust_decimal::Decimal;
use tracing::{error, info, instrument, warn};

use super::{
    dto::{CreateIntentRequest, CreateIntentResponse, OwnerQuery, RecordPaymentRequest},
    repo_types::{AdminStats, Payment, Receipt},
};
use crate::{
    auth::extractors::{AdminUser, AuthUser},
    carts::handlers::owned_email,
    classes::repo_types::ClassOffering,
    error::ApiError,
    extract::{Json, Query},
    state::AppState,
};

pub fn payment_routes() -> Router<AppState> {
    Router::new()
        .route("/create-payment-intent", post(create_payment_intent))
        .route("/payments", get(list_payments).post(record_payment))
        .route("/enrolled-classes", get(enrolled_classes))
        .route("/admin-stats", get(admin_stats))
}

/// Prices the caller's cart server-side and opens a provider intent for it.
#[instrument(skip(state, claims, payload))]
pub async fn create_payment_intent(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Json(payload): Json<CreateIntentRequest>,
) -> Result<Json<CreateIntentResponse>, ApiError> {
    let amount = state
        .store
        .quote_cart(&claims.email, &payload.cart_ids)
        .await?;
    if amount <= Decimal::ZERO {
        return Err(ApiError::InvalidArgument("price must be positive".into()));
    }
    if let Some(client_price) = payload.price {
        if client_price != amount {
            warn!(%client_price, %amount, email = %claims.email, "client total ignored");
        }
    }

    let intent = state.gateway.create_intent(amount).await.map_err(|e| {
        error!(error = %e, email = %claims.email, "payment intent failed");
        ApiError::from(e)
    })?;

    info!(intent_id = %intent.id, %amount, email = %claims.email, "payment intent created");
    Ok(Json(CreateIntentResponse {
        client_secret: intent.client_secret,
        amount,
    }))
}

#[instrument(skip(state, claims, payload))]
pub async fn record_payment(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Json(payload): Json<RecordPaymentRequest>,
) -> Result<(StatusCode, Json<Receipt>), ApiError> {
    let transaction_id = payload.transaction_id.trim();
    if transaction_id.is_empty() {
        return Err(ApiError::InvalidArgument("transaction_id is required".into()));
    }

    let receipt = state
        .store
        .checkout(&claims.email, &payload.cart_ids, transaction_id)
        .await
        .map_err(|e| {
            warn!(error = %e, email = %claims.email, "checkout failed");
            ApiError::from(e)
        })?;

    info!(
        payment_id = %receipt.payment_id,
        price = %receipt.price,
        removed = receipt.removed_cart_items,
        email = %claims.email,
        "payment recorded"
    );
    Ok((StatusCode::CREATED, Json(receipt)))
}

#[instrument(skip(state, claims))]
pub async fn list_payments(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Query(q): Query<OwnerQuery>,
) -> Result<Json<Vec<Payment>>, ApiError> {
    let Some(email) = owned_email(q.email.as_deref(), &claims.email)? else {
        return Ok(Json(Vec::new()));
    };
    Ok(Json(state.store.list_payments(&email).await?))
}

#[instrument(skip(state, claims))]
pub async fn enrolled_classes(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Query(q): Query<OwnerQuery>,
) -> Result<Json<Vec<ClassOffering>>, ApiError> {
    let Some(email) = owned_email(q.email.as_deref(), &claims.email)? else {
        return Ok(Json(Vec::new()));
    };
    Ok(Json(state.store.enrolled_classes(&email).await?))
}

#[instrument(skip(state, _admin))]
pub async fn admin_stats(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<Json<AdminStats>, ApiError> {
    Ok(Json(state.store.admin_stats().await?))
}
