// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - provider adapters and state containers.

pub mod identity;
pub mod memory;
pub mod session;
pub mod session_file;
pub mod subscription;
pub mod supabase;
pub mod workout_table;
pub mod workouts;

pub use identity::IdentityProvider;
pub use memory::MemoryBackend;
pub use session::{AuthSnapshot, SessionManager};
pub use session_file::SessionFile;
pub use subscription::Subscription;
pub use supabase::SupabaseClient;
pub use workout_table::WorkoutTable;
pub use workouts::{WorkoutStore, WorkoutsSnapshot};
