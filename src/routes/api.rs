// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! API routes for the signed-in user.

use crate::error::Result;
use crate::middleware::auth::AuthUser;
use crate::models::{
    Profile, ProfileUpdate, Workout, WorkoutFilter, WorkoutInput, WorkoutPatch, WorkoutStats,
};
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Extension, Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// API routes (require a signed-in user).
/// The auth middleware is applied in routes/mod.rs for these routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/profile", get(get_profile).put(update_profile))
        .route("/api/workouts", get(list_workouts).post(create_workout))
        .route("/api/workouts/refresh", post(refresh_workouts))
        .route(
            "/api/workouts/{id}",
            put(update_workout).delete(delete_workout),
        )
        .route("/api/stats", get(get_stats))
}

// ─── Profile ─────────────────────────────────────────────────

/// Current user and profile.
#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct ProfileResponse {
    pub user_id: String,
    pub email: String,
    pub profile: Option<Profile>,
}

async fn get_profile(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Json<ProfileResponse> {
    Json(ProfileResponse {
        user_id: user.user_id,
        email: user.email,
        profile: state.session.snapshot().profile,
    })
}

async fn update_profile(
    State(state): State<Arc<AppState>>,
    Json(update): Json<ProfileUpdate>,
) -> Result<Json<Profile>> {
    let profile = state.session.update_profile(update).await?;
    Ok(Json(profile))
}

// ─── Workouts ────────────────────────────────────────────────

/// Workout list response.
#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct WorkoutsResponse {
    pub workouts: Vec<Workout>,
    pub loading: bool,
    /// Most recent failure, if any
    pub error: Option<String>,
}

/// List workouts, optionally filtered by `search` and `on_date`.
async fn list_workouts(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<WorkoutFilter>,
) -> Json<WorkoutsResponse> {
    let snapshot = state.workouts.snapshot();
    Json(WorkoutsResponse {
        workouts: state.workouts.filter(&filter),
        loading: snapshot.loading(),
        error: snapshot.error,
    })
}

async fn create_workout(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(input): Json<WorkoutInput>,
) -> Result<(StatusCode, Json<Workout>)> {
    let workout = state.workouts.create(input).await?;
    tracing::debug!(user_id = %user.user_id, workout_id = %workout.id, "Created via API");
    Ok((StatusCode::CREATED, Json(workout)))
}

async fn update_workout(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(patch): Json<WorkoutPatch>,
) -> Result<Json<Workout>> {
    let workout = state.workouts.update(&id, patch).await?;
    Ok(Json(workout))
}

async fn delete_workout(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    state.workouts.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Manual re-sync with the backend.
async fn refresh_workouts(State(state): State<Arc<AppState>>) -> Result<Json<WorkoutsResponse>> {
    state.workouts.refresh().await?;
    let snapshot = state.workouts.snapshot();
    Ok(Json(WorkoutsResponse {
        loading: snapshot.loading(),
        error: snapshot.error,
        workouts: snapshot.workouts,
    }))
}

// ─── Stats ───────────────────────────────────────────────────

async fn get_stats(State(state): State<Arc<AppState>>) -> Json<WorkoutStats> {
    Json(state.workouts.stats(chrono::Utc::now()))
}
