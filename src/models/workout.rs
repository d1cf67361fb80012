// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Workout records and the list reducer.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;
use validator::Validate;

use crate::error::{AppError, Result};
use crate::time_utils;

/// Stored workout row in the `workouts` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct Workout {
    /// Server-assigned id
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub date: DateTime<Utc>,
    /// Duration in minutes
    pub duration: Option<u32>,
    /// Owning user (row-level security scopes reads to this user)
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields supplied when creating a workout.
#[derive(Debug, Clone, PartialEq, Deserialize, Validate)]
pub struct WorkoutInput {
    #[validate(length(min = 1, message = "Workout name is required"))]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(deserialize_with = "time_utils::deserialize_date_or_datetime")]
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub duration: Option<u32>,
}

impl WorkoutInput {
    /// Trim the name, drop empty descriptions and validate.
    pub fn normalized(mut self) -> Result<Self> {
        self.name = self.name.trim().to_string();
        self.description = self
            .description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());
        self.validate()?;
        Ok(self)
    }

    /// Attach the owning user for insertion.
    pub fn into_new_workout(self, user_id: &str) -> NewWorkout {
        NewWorkout {
            name: self.name,
            description: self.description,
            date: self.date,
            duration: self.duration,
            user_id: user_id.to_string(),
        }
    }
}

/// Row sent to the table on insert.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewWorkout {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub date: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
    pub user_id: String,
}

/// Partial update. Only set fields are sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct WorkoutPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, message = "Workout name cannot be empty"))]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "time_utils::deserialize_opt_date_or_datetime"
    )]
    pub date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
}

impl WorkoutPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.date.is_none()
            && self.duration.is_none()
    }

    /// Trim the name and validate. An empty patch is rejected.
    pub fn normalized(mut self) -> Result<Self> {
        self.name = self.name.map(|n| n.trim().to_string());
        if self.is_empty() {
            return Err(AppError::Validation("Nothing to update".to_string()));
        }
        self.validate()?;
        Ok(self)
    }

    /// Apply to a stored row (used by backends that own the data).
    pub fn apply_to(&self, workout: &mut Workout) {
        if let Some(name) = &self.name {
            workout.name = name.clone();
        }
        if let Some(description) = &self.description {
            workout.description = Some(description.clone());
        }
        if let Some(date) = self.date {
            workout.date = date;
        }
        if let Some(duration) = self.duration {
            workout.duration = Some(duration);
        }
    }
}

// ─── List Reducer ────────────────────────────────────────────

/// Outcome of a successful remote operation, applied to the local list.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkoutChange {
    /// Full re-fetch; replaces the list wholesale.
    Loaded(Vec<Workout>),
    /// No current user.
    Cleared,
    /// Canonical row returned by an insert; goes to the front.
    Created(Workout),
    /// Canonical row returned by an update; replaces the entry with the same id.
    Updated(Workout),
    /// Row removed remotely.
    Deleted(String),
}

/// Fold a change into the current list.
///
/// Entries not named by the change keep their position and content.
pub fn apply_change(mut list: Vec<Workout>, change: WorkoutChange) -> Vec<Workout> {
    match change {
        WorkoutChange::Loaded(rows) => rows,
        WorkoutChange::Cleared => Vec::new(),
        WorkoutChange::Created(workout) => {
            list.insert(0, workout);
            list
        }
        WorkoutChange::Updated(workout) => {
            if let Some(slot) = list.iter_mut().find(|w| w.id == workout.id) {
                *slot = workout;
            }
            list
        }
        WorkoutChange::Deleted(id) => {
            list.retain(|w| w.id != id);
            list
        }
    }
}

// ─── History Filter ──────────────────────────────────────────

/// History view filter: name search plus an optional calendar day.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorkoutFilter {
    pub search: Option<String>,
    /// Day in UTC (YYYY-MM-DD)
    pub on_date: Option<NaiveDate>,
}

impl WorkoutFilter {
    pub fn matches(&self, workout: &Workout) -> bool {
        let matches_search = match self.search.as_deref().map(str::trim) {
            Some(term) if !term.is_empty() => workout
                .name
                .to_lowercase()
                .contains(&term.to_lowercase()),
            _ => true,
        };

        let matches_date = self
            .on_date
            .map_or(true, |day| workout.date.date_naive() == day);

        matches_search && matches_date
    }
}
