// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Principal endpoints: self-service profile and administration.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    auth::{Auth, Role},
    error::{ApiError, ErrorBody},
    models::{Address, ListPrincipalsQuery, Principal, PrincipalId, ProfileChangeset},
    state::AppState,
};

/// Public view of a principal. Never carries the credential hash.
#[derive(Debug, Serialize, ToSchema)]
pub struct PrincipalView {
    pub id: PrincipalId,
    pub full_name: String,
    pub roles: Vec<Role>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    /// Whether password sign-in is enabled for this principal
    pub has_password: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<NaiveDate>,
    pub addresses: Vec<Address>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Principal> for PrincipalView {
    fn from(p: Principal) -> Self {
        Self {
            id: p.id,
            full_name: p.full_name,
            roles: p.roles,
            email: p.email,
            phone_number: p.phone_number,
            has_password: p.password_hash.is_some(),
            birth_date: p.birth_date,
            addresses: p.addresses,
            created_at: p.created_at,
            updated_at: p.updated_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PrincipalListResponse {
    pub principals: Vec<PrincipalView>,
    pub count: usize,
}

/// Fields to change. Omitted or blank fields are left untouched.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateProfileRequest {
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
    /// Sets or replaces the password used by password sign-in
    #[serde(default)]
    pub password: Option<String>,
}

impl UpdateProfileRequest {
    fn into_changeset(self, subject_id: PrincipalId) -> ProfileChangeset {
        ProfileChangeset {
            subject_id,
            full_name: self.full_name,
            email: self.email,
            phone_number: self.phone_number,
            password: self.password,
        }
    }
}

fn parse_role(raw: &str) -> Result<Role, ApiError> {
    Role::from_str(raw).ok_or_else(|| ApiError::bad_request(format!("unknown role: {raw}")))
}

/// Get the current principal's profile.
#[utoipa::path(
    get,
    path = "/v1/users/me",
    tag = "Users",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Current principal", body = PrincipalView),
        (status = 401, description = "Unauthorized - invalid or missing token", body = ErrorBody),
    )
)]
pub async fn get_current_user(
    Auth(user): Auth,
    State(state): State<AppState>,
) -> Result<Json<PrincipalView>, ApiError> {
    let principal = state
        .service
        .principal(user.principal_id, user.principal_id)
        .await?;
    Ok(Json(principal.into()))
}

/// List principals (Owner or Admin).
#[utoipa::path(
    get,
    path = "/v1/users",
    tag = "Users",
    security(("bearer" = [])),
    params(ListPrincipalsQuery),
    responses(
        (status = 200, description = "Principals", body = PrincipalListResponse),
        (status = 401, description = "Unauthorized", body = ErrorBody),
        (status = 403, description = "Caller is not an administrator", body = ErrorBody)
    )
)]
pub async fn list_users(
    Auth(user): Auth,
    State(state): State<AppState>,
    Query(query): Query<ListPrincipalsQuery>,
) -> Result<Json<PrincipalListResponse>, ApiError> {
    let principals: Vec<PrincipalView> = state
        .service
        .list_principals(user.principal_id, &query)
        .await?
        .into_iter()
        .map(PrincipalView::from)
        .collect();
    let count = principals.len();
    Ok(Json(PrincipalListResponse { principals, count }))
}

/// Get a principal by id (self, or Owner/Admin for anyone).
#[utoipa::path(
    get,
    path = "/v1/users/{id}",
    tag = "Users",
    security(("bearer" = [])),
    params(("id" = i64, Path, description = "Principal id")),
    responses(
        (status = 200, description = "Principal", body = PrincipalView),
        (status = 403, description = "Not allowed", body = ErrorBody),
        (status = 404, description = "Not found", body = ErrorBody)
    )
)]
pub async fn get_user(
    Auth(user): Auth,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<PrincipalView>, ApiError> {
    let principal = state
        .service
        .principal(user.principal_id, PrincipalId(id))
        .await?;
    Ok(Json(principal.into()))
}

/// Update a principal's profile.
#[utoipa::path(
    patch,
    path = "/v1/users/{id}",
    tag = "Users",
    security(("bearer" = [])),
    params(("id" = i64, Path, description = "Principal id")),
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Updated principal", body = PrincipalView),
        (status = 403, description = "Not allowed", body = ErrorBody),
        (status = 404, description = "Not found", body = ErrorBody),
        (status = 409, description = "Email or phone number already registered", body = ErrorBody),
        (status = 422, description = "Invalid field", body = ErrorBody)
    )
)]
pub async fn update_user(
    Auth(user): Auth,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<UpdateProfileRequest>,
) -> Result<Json<PrincipalView>, ApiError> {
    let changeset = request.into_changeset(PrincipalId(id));
    let principal = state
        .service
        .update_profile(user.principal_id, changeset)
        .await?;
    Ok(Json(principal.into()))
}

/// Delete a principal (self, or Owner/Admin for others). Owners cannot be deleted.
#[utoipa::path(
    delete,
    path = "/v1/users/{id}",
    tag = "Users",
    security(("bearer" = [])),
    params(("id" = i64, Path, description = "Principal id")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Not allowed", body = ErrorBody),
        (status = 404, description = "Not found", body = ErrorBody)
    )
)]
pub async fn delete_user(
    Auth(user): Auth,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state
        .service
        .delete_account(user.principal_id, PrincipalId(id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Grant a role (Owner or Admin). `owner` can never be granted.
#[utoipa::path(
    post,
    path = "/v1/users/{id}/roles/{role}",
    tag = "Users",
    security(("bearer" = [])),
    params(
        ("id" = i64, Path, description = "Principal id"),
        ("role" = Role, Path, description = "Role to grant")
    ),
    responses(
        (status = 204, description = "Granted (idempotent)"),
        (status = 400, description = "Unknown role", body = ErrorBody),
        (status = 403, description = "Not allowed", body = ErrorBody),
        (status = 404, description = "Not found", body = ErrorBody)
    )
)]
pub async fn grant_role(
    Auth(user): Auth,
    State(state): State<AppState>,
    Path((id, role)): Path<(i64, String)>,
) -> Result<StatusCode, ApiError> {
    let role = parse_role(&role)?;
    state
        .service
        .grant_role(user.principal_id, PrincipalId(id), role)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Revoke a role (Owner or Admin). `owner` can never be revoked.
#[utoipa::path(
    delete,
    path = "/v1/users/{id}/roles/{role}",
    tag = "Users",
    security(("bearer" = [])),
    params(
        ("id" = i64, Path, description = "Principal id"),
        ("role" = Role, Path, description = "Role to revoke")
    ),
    responses(
        (status = 204, description = "Revoked (idempotent)"),
        (status = 400, description = "Unknown role", body = ErrorBody),
        (status = 403, description = "Not allowed", body = ErrorBody),
        (status = 404, description = "Not found", body = ErrorBody)
    )
)]
pub async fn revoke_role(
    Auth(user): Auth,
    State(state): State<AppState>,
    Path((id, role)): Path<(i64, String)>,
) -> Result<StatusCode, ApiError> {
    let role = parse_role(&role)?;
    state
        .service
        .revoke_role(user.principal_id, PrincipalId(id), role)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
