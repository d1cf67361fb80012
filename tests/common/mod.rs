// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use workout_tracker::config::Config;
use workout_tracker::error::Result;
use workout_tracker::models::{
    AuthEvent, NewWorkout, Profile, ProfileUpdate, Session, SignUpOutcome, Workout, WorkoutPatch,
};
use workout_tracker::services::{IdentityProvider, MemoryBackend, WorkoutTable};
use workout_tracker::App;

#[allow(dead_code)]
pub const EMAIL: &str = "ada@example.com";
#[allow(dead_code)]
pub const PASSWORD: &str = "secret123";

/// Check if a Supabase test project is configured via environment variable.
#[allow(dead_code)]
pub fn supabase_available() -> bool {
    std::env::var("SUPABASE_TEST_URL").is_ok() && std::env::var("SUPABASE_TEST_ANON_KEY").is_ok()
}

/// Skip test with message if no Supabase test project is configured.
#[macro_export]
macro_rules! require_supabase {
    () => {
        if !crate::common::supabase_available() {
            eprintln!("⚠️  Skipping: SUPABASE_TEST_URL not set");
            return;
        }
    };
}

/// Memory backend with one confirmed account.
#[allow(dead_code)]
pub fn seeded_backend(require_confirmation: bool) -> Arc<MemoryBackend> {
    let backend = Arc::new(MemoryBackend::new(require_confirmation));
    backend
        .seed_user(EMAIL, PASSWORD, Some("Ada"))
        .expect("seed user");
    backend
}

/// Start an app over the given memory backend.
#[allow(dead_code)]
pub async fn start_app(backend: Arc<MemoryBackend>) -> App {
    App::with_backend(Config::test_default(), backend).await
}

/// Create a test app with a seeded offline-capable backend.
/// Returns the router, the app and the backend.
#[allow(dead_code)]
pub async fn create_test_app() -> (axum::Router, App, Arc<MemoryBackend>) {
    let backend = seeded_backend(true);
    let app = start_app(backend.clone()).await;
    (app.router(), app, backend)
}

/// Wait (bounded) until a watched value satisfies `pred`.
#[allow(dead_code)]
pub async fn wait_for<T>(rx: &mut watch::Receiver<T>, pred: impl FnMut(&T) -> bool) {
    tokio::time::timeout(Duration::from_secs(2), rx.wait_for(pred))
        .await
        .expect("timed out waiting for state")
        .expect("state channel closed");
}

/// Poll `cond` until it holds, yielding to background tasks in between.
#[allow(dead_code)]
pub async fn eventually(mut cond: impl FnMut() -> bool) {
    for _ in 0..200 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

/// Workout table wrapper that counts list calls.
#[allow(dead_code)]
pub struct CountingTable {
    pub inner: Arc<MemoryBackend>,
    pub lists: AtomicUsize,
}

#[allow(dead_code)]
impl CountingTable {
    pub fn new(inner: Arc<MemoryBackend>) -> Self {
        Self {
            inner,
            lists: AtomicUsize::new(0),
        }
    }

    pub fn list_calls(&self) -> usize {
        self.lists.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WorkoutTable for CountingTable {
    async fn list(&self, session: &Session) -> Result<Vec<Workout>> {
        self.lists.fetch_add(1, Ordering::SeqCst);
        self.inner.list(session).await
    }

    async fn insert(&self, session: &Session, workout: &NewWorkout) -> Result<Workout> {
        self.inner.insert(session, workout).await
    }

    async fn update(&self, session: &Session, id: &str, patch: &WorkoutPatch) -> Result<Workout> {
        self.inner.update(session, id, patch).await
    }

    async fn delete(&self, session: &Session, id: &str) -> Result<()> {
        self.inner.delete(session, id).await
    }
}

/// Identity provider wrapper with a slow profile lookup and an optional
/// sign-out that never answers.
#[allow(dead_code)]
pub struct SlowProvider {
    pub inner: Arc<MemoryBackend>,
    pub profile_delay: Duration,
    pub hang_sign_out: bool,
}

#[allow(dead_code)]
impl SlowProvider {
    pub fn new(inner: Arc<MemoryBackend>) -> Self {
        Self {
            inner,
            profile_delay: Duration::ZERO,
            hang_sign_out: false,
        }
    }
}

#[async_trait]
impl IdentityProvider for SlowProvider {
    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session> {
        self.inner.sign_in_with_password(email, password).await
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        name: Option<&str>,
    ) -> Result<SignUpOutcome> {
        self.inner.sign_up(email, password, name).await
    }

    async fn sign_out(&self, session: &Session) -> Result<()> {
        if self.hang_sign_out {
            std::future::pending::<()>().await;
        }
        self.inner.sign_out(session).await
    }

    async fn get_session(&self) -> Result<Option<Session>> {
        self.inner.get_session().await
    }

    async fn verify_signup(&self, email: &str, code: &str) -> Result<Session> {
        self.inner.verify_signup(email, code).await
    }

    async fn resend_confirmation(&self, email: &str) -> Result<()> {
        self.inner.resend_confirmation(email).await
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.inner.subscribe()
    }

    async fn get_profile(&self, session: &Session, user_id: &str) -> Result<Option<Profile>> {
        tokio::time::sleep(self.profile_delay).await;
        self.inner.get_profile(session, user_id).await
    }

    async fn insert_profile(&self, session: &Session, profile: &Profile) -> Result<Profile> {
        self.inner.insert_profile(session, profile).await
    }

    async fn update_profile(
        &self,
        session: &Session,
        user_id: &str,
        update: &ProfileUpdate,
    ) -> Result<Profile> {
        self.inner.update_profile(session, user_id, update).await
    }
}
