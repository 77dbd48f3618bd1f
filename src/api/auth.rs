// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    auth::{ChallengeRequest, Channel, Session, SignInRequest, SignUpRequest},
    error::{ApiError, ErrorBody},
    state::AppState,
};

/// Where the one-time code was sent.
#[derive(Debug, Serialize, ToSchema)]
pub struct ChallengeResponse {
    pub channel: Channel,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PasswordSignInRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Send a one-time code by SMS (phone number) or email.
///
/// The response is identical whether or not an account exists.
#[utoipa::path(
    post,
    path = "/v1/auth/challenge",
    tag = "Auth",
    request_body = ChallengeRequest,
    responses(
        (status = 202, description = "Code sent", body = ChallengeResponse),
        (status = 400, description = "No phone number or email", body = ErrorBody),
        (status = 502, description = "Delivery failed", body = ErrorBody)
    )
)]
pub async fn request_challenge(
    State(state): State<AppState>,
    Json(request): Json<ChallengeRequest>,
) -> Result<(StatusCode, Json<ChallengeResponse>), ApiError> {
    let channel = state.service.request_challenge(request).await?;
    Ok((StatusCode::ACCEPTED, Json(ChallengeResponse { channel })))
}

/// Create an account with a one-time code.
#[utoipa::path(
    post,
    path = "/v1/auth/sign-up",
    tag = "Auth",
    request_body = SignUpRequest,
    responses(
        (status = 201, description = "Account created", body = Session),
        (status = 401, description = "Invalid or expired code", body = ErrorBody),
        (status = 409, description = "Email or phone number already registered", body = ErrorBody),
        (status = 422, description = "Invalid profile field", body = ErrorBody)
    )
)]
pub async fn sign_up(
    State(state): State<AppState>,
    Json(request): Json<SignUpRequest>,
) -> Result<(StatusCode, Json<Session>), ApiError> {
    let session = state.service.complete_sign_up(request).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

/// Sign in with a one-time code.
#[utoipa::path(
    post,
    path = "/v1/auth/sign-in",
    tag = "Auth",
    request_body = SignInRequest,
    responses(
        (status = 200, description = "Signed in", body = Session),
        (status = 401, description = "Invalid or expired code", body = ErrorBody),
        (status = 404, description = "No account for this identifier", body = ErrorBody)
    )
)]
pub async fn sign_in(
    State(state): State<AppState>,
    Json(request): Json<SignInRequest>,
) -> Result<Json<Session>, ApiError> {
    Ok(Json(state.service.complete_sign_in(request).await?))
}

/// Sign in with email and password.
#[utoipa::path(
    post,
    path = "/v1/auth/sign-in/password",
    tag = "Auth",
    request_body = PasswordSignInRequest,
    responses(
        (status = 200, description = "Signed in", body = Session),
        (status = 401, description = "Invalid credentials", body = ErrorBody)
    )
)]
pub async fn sign_in_with_password(
    State(state): State<AppState>,
    Json(request): Json<PasswordSignInRequest>,
) -> Result<Json<Session>, ApiError> {
    let session = state
        .service
        .sign_in_with_password(&request.email, &request.password)
        .await?;
    Ok(Json(session))
}

/// Exchange a refresh token for a new session.
#[utoipa::path(
    post,
    path = "/v1/auth/refresh",
    tag = "Auth",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Session renewed", body = Session),
        (status = 401, description = "Invalid refresh token", body = ErrorBody)
    )
)]
pub async fn refresh(
    State(state): State<AppState>,
    Json(request): Json<RefreshRequest>,
) -> Result<Json<Session>, ApiError> {
    Ok(Json(state.service.refresh_session(&request.refresh_token).await?))
}
