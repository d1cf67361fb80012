// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session routes: login, registration, confirmation and logout.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

use crate::error::{AppError, Result};
use crate::models::{AuthState, Credentials, Navigation, Profile, Registration, User};
use crate::time_utils::format_utc_rfc3339;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/session", get(get_session))
        .route("/auth/login", post(login))
        .route("/auth/register", post(register))
        .route("/auth/verify", post(verify))
        .route("/auth/resend", post(resend))
        .route("/auth/logout", post(logout))
}

// ─── Responses ───────────────────────────────────────────────

/// Current session as seen by the front end. Tokens are never included.
#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct SessionResponse {
    pub state: AuthState,
    pub loading: bool,
    pub user: Option<User>,
    pub profile: Option<Profile>,
    pub pending_email: Option<String>,
    pub expires_at: Option<String>,
}

/// Outcome of an auth action: where the front end should go next.
#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct AuthResponse {
    pub state: AuthState,
    pub redirect: String,
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

fn auth_response(state: &AppState, navigation: Navigation) -> Json<AuthResponse> {
    Json(AuthResponse {
        state: state.session.state(),
        redirect: navigation.path().to_string(),
    })
}

// ─── Handlers ────────────────────────────────────────────────

async fn get_session(State(state): State<Arc<AppState>>) -> Json<SessionResponse> {
    let snapshot = state.session.snapshot();
    let expires_at = state
        .session
        .current_session()
        .and_then(|s| s.expires_at)
        .map(format_utc_rfc3339);

    Json(SessionResponse {
        state: snapshot.state,
        loading: snapshot.loading(),
        user: snapshot.user,
        profile: snapshot.profile,
        pending_email: snapshot.pending_email,
        expires_at,
    })
}

async fn login(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Credentials>,
) -> Result<Response> {
    match state.session.login(&body.email, &body.password).await {
        Ok(navigation) => Ok(auth_response(&state, navigation).into_response()),
        // Unconfirmed accounts are sent to the code entry page
        Err(AppError::EmailNotConfirmed) => Ok((
            StatusCode::FORBIDDEN,
            auth_response(&state, Navigation::Verify),
        )
            .into_response()),
        Err(e) => Err(e),
    }
}

async fn register(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Registration>,
) -> Result<(StatusCode, Json<AuthResponse>)> {
    let outcome = state
        .session
        .register(&body.email, &body.password, body.name.as_deref())
        .await?;

    Ok((
        StatusCode::CREATED,
        auth_response(&state, outcome.navigation()),
    ))
}

#[derive(Deserialize)]
pub struct VerifyRequest {
    code: String,
}

async fn verify(
    State(state): State<Arc<AppState>>,
    Json(body): Json<VerifyRequest>,
) -> Result<Json<AuthResponse>> {
    let navigation = state.session.verify(&body.code).await?;
    Ok(auth_response(&state, navigation))
}

async fn resend(State(state): State<Arc<AppState>>) -> Result<Json<MessageResponse>> {
    state.session.resend_verification().await?;
    Ok(Json(MessageResponse {
        success: true,
        message: "Verification code sent".to_string(),
    }))
}

async fn logout(State(state): State<Arc<AppState>>) -> Json<AuthResponse> {
    let navigation = state.session.logout().await;
    auth_response(&state, navigation)
}
