// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Data models for the application.

pub mod auth;
pub mod notice;
pub mod stats;
pub mod user;
pub mod workout;

pub use auth::{
    AuthEvent, AuthState, Credentials, Navigation, RegisterOutcome, Registration, SignUpOutcome,
};
pub use notice::{Notice, NoticeLevel};
pub use stats::WorkoutStats;
pub use user::{Profile, ProfileUpdate, Session, User};
pub use workout::{
    apply_change, NewWorkout, Workout, WorkoutChange, WorkoutFilter, WorkoutInput, WorkoutPatch,
};
