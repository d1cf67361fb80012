// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Workout Tracker: session and workout state for a personal fitness log
//!
//! This crate keeps track of who is signed in and mirrors that user's
//! workouts from a hosted backend, exposing both through a local JSON API.

pub mod config;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use std::sync::Arc;

use config::{BackendKind, Config};
use services::{
    IdentityProvider, MemoryBackend, SessionManager, Subscription, SupabaseClient, WorkoutStore,
    WorkoutTable,
};

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub session: Arc<SessionManager>,
    pub workouts: Arc<WorkoutStore>,
}

/// Running application: shared state plus the background listeners.
pub struct App {
    state: Arc<AppState>,
    subscriptions: Vec<Subscription>,
}

impl App {
    /// Build the configured backend, start listeners and restore any session.
    pub async fn start(config: Config) -> anyhow::Result<Self> {
        let app = match config.backend {
            BackendKind::Supabase => {
                tracing::info!(url = %config.supabase_url, "Using Supabase backend");
                let backend = Arc::new(SupabaseClient::from_config(&config)?);
                Self::with_backend(config, backend).await
            }
            BackendKind::Memory => {
                tracing::info!(
                    require_confirmation = config.require_email_confirmation,
                    "Using in-memory backend"
                );
                let backend = Arc::new(MemoryBackend::new(config.require_email_confirmation));
                Self::with_backend(config, backend).await
            }
        };
        Ok(app)
    }

    /// Start against an already constructed backend.
    pub async fn with_backend<B>(config: Config, backend: Arc<B>) -> Self
    where
        B: IdentityProvider + WorkoutTable + 'static,
    {
        let session = Arc::new(SessionManager::new(backend.clone()));
        let workouts = Arc::new(WorkoutStore::new(backend, session.watch_session()));

        let subscriptions = vec![
            session.subscribe_provider_events(),
            workouts.watch_user_changes(),
        ];

        session.restore().await;

        Self {
            state: Arc::new(AppState {
                config,
                session,
                workouts,
            }),
            subscriptions,
        }
    }

    pub fn state(&self) -> Arc<AppState> {
        self.state.clone()
    }

    pub fn router(&self) -> axum::Router {
        routes::create_router(self.state())
    }

    /// Stop the background listeners.
    pub async fn shutdown(self) {
        for subscription in self.subscriptions {
            subscription.release().await;
        }
        tracing::info!("Subscriptions released");
    }
}
