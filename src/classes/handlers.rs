use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, patch, put},
    Router,
};
use rust_decimal::Decimal;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::{
    dto::{CreateClassRequest, FeedbackRequest, InstructorQuery, StatusQuery},
    repo_types::{ClassOffering, ClassStatus, NewClass},
};
use crate::{
    auth::{
        extractors::{AdminUser, InstructorUser},
        services::normalize_email,
    },
    error::ApiError,
    extract::{Json, Path, Query},
    notify::{class_feedback_email, spawn_send},
    state::AppState,
};

/// Matches the `NUMERIC(10, 2)` price column.
const PRICE_SCALE: u32 = 2;

fn max_price() -> Decimal {
    Decimal::new(9_999_999_999, PRICE_SCALE)
}

pub fn class_routes() -> Router<AppState> {
    Router::new()
        .route("/classes", get(list_classes).post(create_class))
        .route("/approved-classes", get(list_approved_classes))
        .route("/classes/:id", get(get_class).put(set_status))
        .route("/classes/:id/feedback", patch(set_feedback))
        .route("/instructors-classes", get(list_instructor_classes))
}

#[instrument(skip(state))]
pub async fn list_classes(
    State(state): State<AppState>,
) -> Result<Json<Vec<ClassOffering>>, ApiError> {
    Ok(Json(state.store.list_classes().await?))
}

#[instrument(skip(state))]
pub async fn list_approved_classes(
    State(state): State<AppState>,
) -> Result<Json<Vec<ClassOffering>>, ApiError> {
    Ok(Json(
        state
            .store
            .list_classes_by_status(ClassStatus::Approved)
            .await?,
    ))
}

#[instrument(skip(state))]
pub async fn get_class(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ClassOffering>, ApiError> {
    let class = state
        .store
        .find_class(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("class not found".into()))?;
    Ok(Json(class))
}

#[instrument(skip(state))]
pub async fn list_instructor_classes(
    State(state): State<AppState>,
    Query(q): Query<InstructorQuery>,
) -> Result<Json<Vec<ClassOffering>>, ApiError> {
    let Some(email) = q.email else {
        return Ok(Json(Vec::new()));
    };
    let classes = state
        .store
        .list_classes_by_instructor(&normalize_email(&email))
        .await?;
    Ok(Json(classes))
}

#[instrument(skip(state, instructor, payload))]
pub async fn create_class(
    State(state): State<AppState>,
    instructor: InstructorUser,
    Json(payload): Json<CreateClassRequest>,
) -> Result<(StatusCode, Json<ClassOffering>), ApiError> {
    let name = payload.name.trim().to_string();
    if name.is_empty() {
        return Err(ApiError::InvalidArgument("name is required".into()));
    }
    if payload.available_seats < 0 {
        return Err(ApiError::InvalidArgument("available_seats must not be negative".into()));
    }
    if payload.price < Decimal::ZERO {
        return Err(ApiError::InvalidArgument("price must not be negative".into()));
    }
    if payload.price.normalize().scale() > PRICE_SCALE || payload.price > max_price() {
        return Err(ApiError::InvalidArgument(format!(
            "price must have at most {PRICE_SCALE} decimals and not exceed {}",
            max_price()
        )));
    }

    let user = instructor.user;
    let class = state
        .store
        .create_class(NewClass {
            name,
            image_url: payload.image_url,
            instructor_name: payload.instructor_name.or(user.name),
            instructor_email: user.email,
            available_seats: payload.available_seats,
            price: payload.price,
        })
        .await?;

    info!(class_id = %class.id, instructor = %class.instructor_email, "class created");
    Ok((StatusCode::CREATED, Json(class)))
}

#[instrument(skip(state, admin))]
pub async fn set_status(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(id): Path<Uuid>,
    Query(q): Query<StatusQuery>,
) -> Result<Json<ClassOffering>, ApiError> {
    let raw = q
        .status
        .ok_or_else(|| ApiError::InvalidArgument("status is required".into()))?;
    let status: ClassStatus = raw.parse().map_err(ApiError::InvalidArgument)?;

    let class = state.store.set_class_status(id, status).await.map_err(|e| {
        warn!(error = %e, class_id = %id, "status change rejected");
        ApiError::from(e)
    })?;

    info!(admin = %admin.user.email, class_id = %id, status = %class.status, "class status set");
    Ok(Json(class))
}

#[instrument(skip(state, admin, payload))]
pub async fn set_feedback(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<FeedbackRequest>,
) -> Result<Json<ClassOffering>, ApiError> {
    let feedback = payload.feedback.trim();
    if feedback.is_empty() {
        return Err(ApiError::InvalidArgument("feedback is required".into()));
    }

    let class = state.store.set_class_feedback(id, feedback).await?;
    spawn_send(
        state.mailer.clone(),
        class_feedback_email(&class.instructor_email, &class.name, feedback),
    );

    info!(admin = %admin.user.email, class_id = %id, "class feedback recorded");
    Ok(Json(class))
}
