// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Tabular data seam for the `workouts` table.

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{NewWorkout, Session, Workout, WorkoutPatch};

/// Table name on the data service.
pub const WORKOUTS_TABLE: &str = "workouts";

/// Row-level-scoped access to the caller's workouts.
///
/// Every call is authorised by `session`; the data service decides which
/// rows are visible.
#[async_trait]
pub trait WorkoutTable: Send + Sync {
    /// All visible workouts, newest date first.
    async fn list(&self, session: &Session) -> Result<Vec<Workout>>;

    /// Insert one row and return it as stored.
    async fn insert(&self, session: &Session, workout: &NewWorkout) -> Result<Workout>;

    /// Update one row by id and return it as stored.
    ///
    /// `AppError::NotFound` when no visible row has this id.
    async fn update(&self, session: &Session, id: &str, patch: &WorkoutPatch) -> Result<Workout>;

    /// Delete one row by id. `AppError::NotFound` when nothing matched.
    async fn delete(&self, session: &Session, id: &str) -> Result<()>;
}
