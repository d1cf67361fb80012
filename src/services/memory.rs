// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-memory identity provider and workout table.
//!
//! Useful for local development and tests. Behaves like the hosted
//! backend where it matters to callers: per-user row scoping, canonical
//! rows returned from mutations, confirmation codes for sign-up.
//! Data is lost on restart.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{
    AuthEvent, NewWorkout, Profile, ProfileUpdate, Session, SignUpOutcome, User, Workout,
    WorkoutPatch,
};
use crate::services::identity::{IdentityProvider, AUTH_EVENT_CAPACITY};
use crate::services::workout_table::WorkoutTable;

const SESSION_LIFETIME_SECS: i64 = 3600;

struct Account {
    password: String,
    user: User,
    pending_code: Option<String>,
}

#[derive(Default)]
struct MemoryState {
    /// Keyed by lowercased email
    accounts: HashMap<String, Account>,
    /// access token -> user id
    tokens: HashMap<String, String>,
    /// Session that survives "restarts" of the session manager
    current: Option<Session>,
    profiles: HashMap<String, Profile>,
    workouts: HashMap<String, Workout>,
}

/// In-process backend implementing both provider seams.
pub struct MemoryBackend {
    state: RwLock<MemoryState>,
    require_confirmation: bool,
    offline: AtomicBool,
    events: broadcast::Sender<AuthEvent>,
}

impl MemoryBackend {
    pub fn new(require_confirmation: bool) -> Self {
        let (events, _) = broadcast::channel(AUTH_EVENT_CAPACITY);
        Self {
            state: RwLock::new(MemoryState::default()),
            require_confirmation,
            offline: AtomicBool::new(false),
            events,
        }
    }

    /// Simulate the backend being unreachable: every call fails.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Confirmation code waiting for `email`, if any.
    pub fn pending_code(&self, email: &str) -> Option<String> {
        self.read()
            .ok()?
            .accounts
            .get(&email.to_lowercase())?
            .pending_code
            .clone()
    }

    /// Create a confirmed account directly.
    pub fn seed_user(&self, email: &str, password: &str, name: Option<&str>) -> Result<User> {
        let user = User {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            name: name.map(str::to_string),
            verified: true,
        };
        self.write()?.accounts.insert(
            email.to_lowercase(),
            Account {
                password: password.to_string(),
                user: user.clone(),
                pending_code: None,
            },
        );
        Ok(user)
    }

    /// Push an auth event as if it came from elsewhere (another tab, expiry).
    pub fn emit(&self, event: AuthEvent) {
        if matches!(event, AuthEvent::SignedOut) {
            if let Ok(mut state) = self.write() {
                state.current = None;
            }
        }
        let _ = self.events.send(event);
    }

    /// Number of stored workouts owned by `user_id`.
    pub fn workout_count(&self, user_id: &str) -> usize {
        self.read()
            .map(|s| s.workouts.values().filter(|w| w.user_id == user_id).count())
            .unwrap_or(0)
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryState>> {
        self.state
            .read()
            .map_err(|e| AppError::Internal(anyhow::anyhow!("memory backend lock: {}", e)))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryState>> {
        self.state
            .write()
            .map_err(|e| AppError::Internal(anyhow::anyhow!("memory backend lock: {}", e)))
    }

    fn check_auth_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(AppError::Auth("Auth service unreachable".to_string()));
        }
        Ok(())
    }

    fn check_db_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(AppError::Database("Data service unreachable".to_string()));
        }
        Ok(())
    }

    /// Resolve the caller's user id from their access token.
    fn caller(state: &MemoryState, session: &Session) -> Result<String> {
        state
            .tokens
            .get(&session.access_token)
            .cloned()
            .ok_or(AppError::NotAuthenticated)
    }

    /// New session for `user`; any earlier token of theirs stops working.
    fn issue_session(state: &mut MemoryState, user: &User) -> Session {
        state.tokens.retain(|_, owner| owner != &user.id);

        let session = Session {
            access_token: Uuid::new_v4().to_string(),
            refresh_token: Uuid::new_v4().to_string(),
            expires_at: Some(Utc::now() + Duration::seconds(SESSION_LIFETIME_SECS)),
            user: user.clone(),
        };
        state
            .tokens
            .insert(session.access_token.clone(), user.id.clone());
        state.current = Some(session.clone());
        session
    }
}

fn confirmation_code() -> String {
    format!("{:06}", Uuid::new_v4().as_u128() % 1_000_000)
}

#[async_trait]
impl IdentityProvider for MemoryBackend {
    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session> {
        self.check_auth_online()?;
        let session = {
            let mut state = self.write()?;
            let account = state
                .accounts
                .get(&email.to_lowercase())
                .filter(|a| a.password == password)
                .ok_or_else(|| AppError::Auth("Invalid login credentials".to_string()))?;

            if !account.user.verified {
                return Err(AppError::EmailNotConfirmed);
            }
            let user = account.user.clone();
            Self::issue_session(&mut state, &user)
        };
        let _ = self.events.send(AuthEvent::SignedIn(session.clone()));
        Ok(session)
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        name: Option<&str>,
    ) -> Result<SignUpOutcome> {
        self.check_auth_online()?;
        let outcome = {
            let mut state = self.write()?;
            let key = email.to_lowercase();
            if state.accounts.contains_key(&key) {
                return Err(AppError::Auth("User already registered".to_string()));
            }

            let user = User {
                id: Uuid::new_v4().to_string(),
                email: email.to_string(),
                name: name.map(str::to_string),
                verified: !self.require_confirmation,
            };

            let pending_code = self.require_confirmation.then(confirmation_code);
            if pending_code.is_some() {
                tracing::info!(email, "Confirmation code issued (memory backend)");
            }

            state.accounts.insert(
                key,
                Account {
                    password: password.to_string(),
                    user: user.clone(),
                    pending_code,
                },
            );

            if self.require_confirmation {
                SignUpOutcome::ConfirmationRequired(user)
            } else {
                SignUpOutcome::Active(Self::issue_session(&mut state, &user))
            }
        };

        if let SignUpOutcome::Active(session) = &outcome {
            let _ = self.events.send(AuthEvent::SignedIn(session.clone()));
        }
        Ok(outcome)
    }

    async fn sign_out(&self, session: &Session) -> Result<()> {
        self.check_auth_online()?;
        {
            let mut state = self.write()?;
            state.tokens.remove(&session.access_token);
            state.current = None;
        }
        let _ = self.events.send(AuthEvent::SignedOut);
        Ok(())
    }

    async fn get_session(&self) -> Result<Option<Session>> {
        self.check_auth_online()?;
        Ok(self.read()?.current.clone())
    }

    async fn verify_signup(&self, email: &str, code: &str) -> Result<Session> {
        self.check_auth_online()?;
        let session = {
            let mut state = self.write()?;
            let account = state
                .accounts
                .get_mut(&email.to_lowercase())
                .ok_or_else(|| AppError::Auth("User not found".to_string()))?;

            if account.pending_code.as_deref() != Some(code) {
                return Err(AppError::Auth("Token has expired or is invalid".to_string()));
            }
            account.pending_code = None;
            account.user.verified = true;
            let user = account.user.clone();
            Self::issue_session(&mut state, &user)
        };
        let _ = self.events.send(AuthEvent::SignedIn(session.clone()));
        Ok(session)
    }

    async fn resend_confirmation(&self, email: &str) -> Result<()> {
        self.check_auth_online()?;
        let mut state = self.write()?;
        let account = state
            .accounts
            .get_mut(&email.to_lowercase())
            .filter(|a| !a.user.verified)
            .ok_or_else(|| AppError::Auth("No unconfirmed account for this email".to_string()))?;
        account.pending_code = Some(confirmation_code());
        tracing::info!(email, "Confirmation code re-issued (memory backend)");
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    async fn get_profile(&self, session: &Session, user_id: &str) -> Result<Option<Profile>> {
        self.check_db_online()?;
        let state = self.read()?;
        let caller = Self::caller(&state, session)?;
        if caller != user_id {
            return Ok(None);
        }
        Ok(state.profiles.get(user_id).cloned())
    }

    async fn insert_profile(&self, session: &Session, profile: &Profile) -> Result<Profile> {
        self.check_db_online()?;
        let mut state = self.write()?;
        let caller = Self::caller(&state, session)?;
        if caller != profile.id {
            return Err(AppError::Database(
                "new row violates row-level security policy".to_string(),
            ));
        }
        if state.profiles.contains_key(&profile.id) {
            return Err(AppError::Database(
                "duplicate key value violates unique constraint".to_string(),
            ));
        }
        let mut stored = profile.clone();
        stored.updated_at = Some(Utc::now());
        state.profiles.insert(stored.id.clone(), stored.clone());
        Ok(stored)
    }

    async fn update_profile(
        &self,
        session: &Session,
        user_id: &str,
        update: &ProfileUpdate,
    ) -> Result<Profile> {
        self.check_db_online()?;
        let mut state = self.write()?;
        let caller = Self::caller(&state, session)?;
        let profile = state
            .profiles
            .get_mut(user_id)
            .filter(|p| p.id == caller)
            .ok_or_else(|| AppError::NotFound(format!("profile {}", user_id)))?;
        profile.merge(update);
        profile.updated_at = Some(Utc::now());
        Ok(profile.clone())
    }
}

#[async_trait]
impl WorkoutTable for MemoryBackend {
    async fn list(&self, session: &Session) -> Result<Vec<Workout>> {
        self.check_db_online()?;
        let state = self.read()?;
        let caller = Self::caller(&state, session)?;

        let mut rows: Vec<Workout> = state
            .workouts
            .values()
            .filter(|w| w.user_id == caller)
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            b.date
                .cmp(&a.date)
                .then_with(|| b.created_at.cmp(&a.created_at))
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(rows)
    }

    async fn insert(&self, session: &Session, workout: &NewWorkout) -> Result<Workout> {
        self.check_db_online()?;
        let mut state = self.write()?;
        let caller = Self::caller(&state, session)?;
        if caller != workout.user_id {
            return Err(AppError::Database(
                "new row violates row-level security policy".to_string(),
            ));
        }

        let now = Utc::now();
        let row = Workout {
            id: Uuid::new_v4().to_string(),
            name: workout.name.clone(),
            description: workout.description.clone(),
            date: workout.date,
            duration: workout.duration,
            user_id: workout.user_id.clone(),
            created_at: now,
            updated_at: now,
        };
        state.workouts.insert(row.id.clone(), row.clone());
        Ok(row)
    }

    async fn update(&self, session: &Session, id: &str, patch: &WorkoutPatch) -> Result<Workout> {
        self.check_db_online()?;
        let mut state = self.write()?;
        let caller = Self::caller(&state, session)?;
        let row = state
            .workouts
            .get_mut(id)
            .filter(|w| w.user_id == caller)
            .ok_or_else(|| AppError::NotFound(format!("workout {}", id)))?;
        patch.apply_to(row);
        row.updated_at = Utc::now();
        Ok(row.clone())
    }

    async fn delete(&self, session: &Session, id: &str) -> Result<()> {
        self.check_db_online()?;
        let mut state = self.write()?;
        let caller = Self::caller(&state, session)?;
        let owned = state
            .workouts
            .get(id)
            .is_some_and(|w| w.user_id == caller);
        if !owned {
            return Err(AppError::NotFound(format!("workout {}", id)));
        }
        state.workouts.remove(id);
        Ok(())
    }
}
