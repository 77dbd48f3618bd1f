// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    extract::{MatchedPath, Request},
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{info_span, Span};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    auth::{
        AuthenticatedUser, ChallengePurpose, ChallengeRequest, Channel, Role, Session,
        SignInRequest, SignUpRequest,
    },
    error::ErrorBody,
    models::{Address, PrincipalId, SortBy},
    state::AppState,
};

pub mod auth;
pub mod health;
pub mod users;

pub fn router(state: AppState) -> Router {
    let v1_routes = Router::new()
        .route("/auth/challenge", post(auth::request_challenge))
        .route("/auth/sign-up", post(auth::sign_up))
        .route("/auth/sign-in", post(auth::sign_in))
        .route("/auth/sign-in/password", post(auth::sign_in_with_password))
        .route("/auth/refresh", post(auth::refresh))
        .route("/users", get(users::list_users))
        .route("/users/me", get(users::get_current_user))
        .route(
            "/users/{id}",
            get(users::get_user)
                .patch(users::update_user)
                .delete(users::delete_user),
        )
        .route(
            "/users/{id}/roles/{role}",
            post(users::grant_role).delete(users::revoke_role),
        )
        .with_state(state);

    Router::new()
        .route("/health", get(health::liveness))
        .nest("/v1", v1_routes)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http().make_span_with(make_span))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(CorsLayer::permissive())
}

/// Span per request, keyed by the route template so ids don't explode cardinality.
fn make_span(request: &Request) -> Span {
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(MatchedPath::as_str)
        .unwrap_or_else(|| request.uri().path());
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-");

    info_span!(
        "http.request",
        method = %request.method(),
        route = %route,
        request_id = %request_id,
    )
}

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::liveness,
        auth::request_challenge,
        auth::sign_up,
        auth::sign_in,
        auth::sign_in_with_password,
        auth::refresh,
        users::get_current_user,
        users::list_users,
        users::get_user,
        users::update_user,
        users::delete_user,
        users::grant_role,
        users::revoke_role
    ),
    components(
        schemas(
            health::HealthResponse,
            ErrorBody,
            Role,
            Channel,
            ChallengePurpose,
            ChallengeRequest,
            SignUpRequest,
            SignInRequest,
            Session,
            AuthenticatedUser,
            PrincipalId,
            Address,
            SortBy,
            auth::ChallengeResponse,
            auth::PasswordSignInRequest,
            auth::RefreshRequest,
            users::PrincipalView,
            users::PrincipalListResponse,
            users::UpdateProfileRequest
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Liveness"),
        (name = "Auth", description = "One-time codes, sign-up, sign-in and sessions"),
        (name = "Users", description = "Profiles and role administration")
    )
)]
struct ApiDoc;
