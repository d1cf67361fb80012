//! Workout statistics derived from the in-memory list.
//!
//! Computed on demand; nothing here is persisted.

use chrono::{DateTime, Utc};
use serde::Serialize;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

use crate::models::Workout;
use crate::time_utils::start_of_week;

/// Summary numbers for the dashboard.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct WorkoutStats {
    pub total_workouts: u32,
    /// Sum of durations (workouts without a duration count as 0)
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub total_minutes: u64,
    /// Mean over workouts that have a duration
    pub average_minutes: Option<f64>,
    /// Workouts dated in the current Monday-based week (UTC)
    pub workouts_this_week: u32,
    pub latest_workout_date: Option<DateTime<Utc>>,
}

impl WorkoutStats {
    pub fn from_workouts(workouts: &[Workout], now: DateTime<Utc>) -> Self {
        let week_start = start_of_week(now);

        let mut stats = WorkoutStats::default();
        let mut timed = 0u32;

        for workout in workouts {
            stats.total_workouts += 1;

            if let Some(minutes) = workout.duration {
                stats.total_minutes += u64::from(minutes);
                timed += 1;
            }

            if workout.date >= week_start && workout.date <= now {
                stats.workouts_this_week += 1;
            }

            // List order is by date, but don't rely on it here
            if stats.latest_workout_date.map_or(true, |d| workout.date > d) {
                stats.latest_workout_date = Some(workout.date);
            }
        }

        if timed > 0 {
            stats.average_minutes = Some(stats.total_minutes as f64 / f64::from(timed));
        }

        stats
    }
}
