// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Axum extractor for authenticated principals.
//!
//! ```rust,ignore
//! async fn my_handler(Auth(user): Auth) -> impl IntoResponse {
//!     // user is AuthenticatedUser
//! }
//! ```

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};

use super::AuthenticatedUser;
use crate::error::ApiError;
use crate::state::AppState;

/// Requires a valid access token in `Authorization: Bearer <token>`.
pub struct Auth(pub AuthenticatedUser);

impl FromRequestParts<AppState> for Auth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .ok_or_else(|| {
                ApiError::unauthorized("missing_auth_header", "authorization header is required")
            })?
            .to_str()
            .map_err(|_| invalid_header())?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .filter(|t| !t.is_empty())
            .ok_or_else(invalid_header)?;

        let user = state.service.authenticate(token)?;
        Ok(Auth(user))
    }
}

fn invalid_header() -> ApiError {
    ApiError::unauthorized("invalid_auth_header", "expected a bearer token")
}
