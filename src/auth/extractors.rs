use std::marker::PhantomData;

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use tracing::warn;

use super::{claims::Claims, jwt::JwtKeys};
use crate::{
    error::ApiError,
    state::AppState,
    users::repo_types::{Role, User},
};

/// Extracts and validates the bearer JWT, yielding its claims.
pub struct AuthUser(pub Claims);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let keys = JwtKeys::from_ref(state);
        let auth_header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::Unauthorized("unauthorized access".into()))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .or_else(|| auth_header.strip_prefix("bearer "))
            .ok_or_else(|| ApiError::Unauthorized("unauthorized access".into()))?;

        let claims = keys.verify(token).map_err(|e| {
            warn!(error = %e, "invalid or expired token");
            ApiError::Unauthorized("unauthorized access".into())
        })?;

        Ok(AuthUser(claims))
    }
}

/// Marker for the role a route requires.
pub trait RoleGate: Send + Sync {
    const ROLE: Role;
}

pub struct Admin;
pub struct Instructor;

impl RoleGate for Admin {
    const ROLE: Role = Role::Admin;
}

impl RoleGate for Instructor {
    const ROLE: Role = Role::Instructor;
}

/// Authenticated caller whose stored role matches `R` exactly.
pub struct RequireRole<R: RoleGate> {
    pub user: User,
    _gate: PhantomData<R>,
}

pub type AdminUser = RequireRole<Admin>;
pub type InstructorUser = RequireRole<Instructor>;

#[async_trait]
impl<R: RoleGate> FromRequestParts<AppState> for RequireRole<R> {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let AuthUser(claims) = AuthUser::from_request_parts(parts, state).await?;

        let user = state.store.find_user_by_email(&claims.email).await?;
        match user {
            Some(user) if user.role.permits(R::ROLE) => Ok(Self {
                user,
                _gate: PhantomData,
            }),
            _ => {
                warn!(email = %claims.email, required = R::ROLE.as_str(), "role check failed");
                Err(ApiError::Forbidden("forbidden access".into()))
            }
        }
    }
}
