use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Router,
};
use serde_json::{Map, Value};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::{
    dto::CreateUserRequest,
    repo_types::{NewUser, Role, User},
};
use crate::{
    auth::{
        extractors::{AdminUser, AuthUser},
        services::{is_valid_email, normalize_email},
    },
    error::ApiError,
    extract::{Json, Path},
    state::AppState,
};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users))
        .route("/user", post(create_user))
        .route("/users/:role/:key", get(check_role).patch(set_role))
        .route("/instructors", get(list_instructors))
}

/// Roles that can be checked or granted through `/users/:role/...`.
fn grantable_role(name: &str) -> Result<Role, ApiError> {
    match name.parse::<Role>() {
        Ok(Role::None) | Err(_) => Err(ApiError::InvalidArgument(format!("unknown role: {name}"))),
        Ok(role) => Ok(role),
    }
}

#[instrument(skip(state, admin))]
pub async fn list_users(
    State(state): State<AppState>,
    admin: AdminUser,
) -> Result<Json<Vec<User>>, ApiError> {
    let users = state.store.list_users().await?;
    info!(admin = %admin.user.email, count = users.len(), "users listed");
    Ok(Json(users))
}

#[instrument(skip(state, payload))]
pub async fn create_user(
    State(state): State<AppState>,
    Json(payload): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    let email = normalize_email(&payload.email);
    if !is_valid_email(&email) {
        warn!(email = %email, "invalid email");
        return Err(ApiError::InvalidArgument("invalid email".into()));
    }

    let user = state
        .store
        .create_user(NewUser {
            email,
            name: payload.name,
            photo_url: payload.photo_url,
        })
        .await
        .map_err(|e| {
            warn!(error = %e, "create user failed");
            ApiError::from(e)
        })?;

    info!(user_id = %user.id, email = %user.email, "user created");
    Ok((StatusCode::CREATED, Json(user)))
}

/// `{ "<role>": bool }`; always false when asking about someone else.
#[instrument(skip(state, claims))]
pub async fn check_role(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Path((role, email)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let role = grantable_role(&role)?;
    let email = normalize_email(&email);

    let has_role = if claims.email != email {
        false
    } else {
        state
            .store
            .find_user_by_email(&email)
            .await?
            .is_some_and(|u| u.role.permits(role))
    };

    let mut body = Map::new();
    body.insert(role.as_str().to_string(), Value::Bool(has_role));
    Ok(Json(Value::Object(body)))
}

#[instrument(skip(state, admin))]
pub async fn set_role(
    State(state): State<AppState>,
    admin: AdminUser,
    Path((role, id)): Path<(String, String)>,
) -> Result<Json<User>, ApiError> {
    let role = grantable_role(&role)?;
    let id: Uuid = id
        .parse()
        .map_err(|_| ApiError::InvalidArgument("invalid user id".into()))?;

    let user = state.store.set_user_role(id, role).await?;
    info!(admin = %admin.user.email, user_id = %user.id, role = %role, "role changed");
    Ok(Json(user))
}

#[instrument(skip(state))]
pub async fn list_instructors(State(state): State<AppState>) -> Result<Json<Vec<User>>, ApiError> {
    let instructors = state.store.list_users_by_role(Role::Instructor).await?;
    Ok(Json(instructors))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_real_roles_are_grantable() {
        assert_eq!(grantable_role("admin").unwrap(), Role::Admin);
        assert_eq!(grantable_role("student").unwrap(), Role::Student);
        assert!(grantable_role("none").is_err());
        assert!(grantable_role("root").is_err());
    }
}
