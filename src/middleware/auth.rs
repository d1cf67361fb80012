// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session gate for protected routes.

use crate::error::AppError;
use crate::AppState;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

/// Signed-in user, inserted as a request extension by `require_auth`.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
    pub email: String,
}

/// Middleware that requires an authenticated session manager.
///
/// The local API serves a single signed-in user, so the gate is the
/// session manager's state rather than a per-request token.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let snapshot = state.session.snapshot();
    let user = match (snapshot.is_authenticated(), snapshot.user) {
        (true, Some(user)) => user,
        _ => {
            tracing::debug!(path = %request.uri().path(), "Rejected unauthenticated request");
            return Err(AppError::NotAuthenticated);
        }
    };

    request.extensions_mut().insert(AuthUser {
        user_id: user.id,
        email: user.email,
    });

    Ok(next.run(request).await)
}
