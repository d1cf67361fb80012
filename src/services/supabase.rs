// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Supabase client: GoTrue auth plus PostgREST tables.
//!
//! Handles:
//! - Password sign-in, sign-up, sign-out
//! - Sign-up confirmation by emailed code
//! - Session persistence and token refresh
//! - `profiles` and `workouts` table access under the user's token

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::sync::{broadcast, Mutex};

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::{
    AuthEvent, NewWorkout, Profile, ProfileUpdate, Session, SignUpOutcome, User, Workout,
    WorkoutPatch,
};
use crate::services::identity::{IdentityProvider, AUTH_EVENT_CAPACITY};
use crate::services::session_file::SessionFile;
use crate::services::workout_table::{WorkoutTable, WORKOUTS_TABLE};

/// Refresh the access token when it expires within this margin (1 minute).
const TOKEN_REFRESH_MARGIN_SECS: i64 = 60;

/// Upper bound on any single GoTrue or PostgREST request.
const DEFAULT_HTTP_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

const PROFILES_TABLE: &str = "profiles";

/// Supabase project client.
#[derive(Clone)]
pub struct SupabaseClient {
    http: reqwest::Client,
    base_url: String,
    anon_key: String,
    session_file: Option<SessionFile>,
    /// Most recent session handed out, so restore doesn't re-read the file.
    current: Arc<Mutex<Option<Session>>>,
    /// Serializes refreshes so one expired token is exchanged only once.
    refresh_lock: Arc<Mutex<()>>,
    events: broadcast::Sender<AuthEvent>,
}

impl SupabaseClient {
    pub fn new(
        base_url: &str,
        anon_key: &str,
        session_file: Option<SessionFile>,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .context("failed building Supabase HTTP client")?;

        let (events, _) = broadcast::channel(AUTH_EVENT_CAPACITY);
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
            session_file,
            current: Arc::new(Mutex::new(None)),
            refresh_lock: Arc::new(Mutex::new(())),
            events,
        })
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Self::new(
            &config.supabase_url,
            &config.supabase_anon_key,
            config.session_file.clone().map(SessionFile::new),
        )
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.base_url, path)
    }

    fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    /// Request with the project key, authorised as the anonymous role.
    fn anon(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("apikey", &self.anon_key)
            .bearer_auth(&self.anon_key)
    }

    /// Request with the project key, authorised by a user access token.
    fn authed(&self, builder: RequestBuilder, access_token: &str) -> RequestBuilder {
        builder
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
    }

    // ─── Session bookkeeping ─────────────────────────────────────

    async fn remember(&self, session: &Session) {
        *self.current.lock().await = Some(session.clone());
        if let Some(file) = &self.session_file {
            if let Err(e) = file.save(session).await {
                tracing::warn!(error = %e, "Failed to persist session");
            }
        }
    }

    async fn forget(&self) {
        *self.current.lock().await = None;
        if let Some(file) = &self.session_file {
            if let Err(e) = file.clear().await {
                tracing::warn!(error = %e, "Failed to clear persisted session");
            }
        }
    }

    fn emit(&self, event: AuthEvent) {
        // No receivers is fine
        let _ = self.events.send(event);
    }

    async fn refresh(&self, refresh_token: &str) -> Result<Session> {
        let response = self
            .anon(self.http.post(self.auth_url("token")))
            .query(&[("grant_type", "refresh_token")])
            .json(&serde_json::json!({ "refresh_token": refresh_token }))
            .send()
            .await
            .context("token refresh request failed")?;

        let body: GoTrueSession = check_auth_json(response).await?;
        Ok(body.into_session())
    }

    /// The cached session when it belongs to the same user, else `session`.
    async fn latest_for(&self, session: &Session) -> Session {
        match &*self.current.lock().await {
            Some(cached) if cached.user.id == session.user.id => cached.clone(),
            _ => session.clone(),
        }
    }

    /// Session to authorise a table request with, refreshed if near expiry.
    async fn usable_session(&self, session: &Session) -> Result<Session> {
        let latest = self.latest_for(session).await;
        if !latest.expires_within(Utc::now(), TOKEN_REFRESH_MARGIN_SECS) {
            return Ok(latest);
        }
        self.refresh_stale(&latest).await
    }

    /// Replace `stale` with a freshly issued session.
    ///
    /// Publishes `TokenRefreshed` so session holders pick up the new token.
    /// A rejected refresh token ends the session with `SignedOut`; transport
    /// failures leave it in place for the next attempt.
    async fn refresh_stale(&self, stale: &Session) -> Result<Session> {
        let _guard = self.refresh_lock.lock().await;

        // Someone else may have refreshed while we waited
        let latest = self.latest_for(stale).await;
        if latest.access_token != stale.access_token
            && !latest.expires_within(Utc::now(), TOKEN_REFRESH_MARGIN_SECS)
        {
            return Ok(latest);
        }

        tracing::info!(user_id = %stale.user.id, "Access token stale, refreshing");
        match self.refresh(&stale.refresh_token).await {
            Ok(fresh) => {
                self.remember(&fresh).await;
                self.emit(AuthEvent::TokenRefreshed(fresh.clone()));
                Ok(fresh)
            }
            Err(AppError::Auth(msg)) => {
                tracing::warn!(error = %msg, "Refresh token rejected, signing out");
                self.forget().await;
                self.emit(AuthEvent::SignedOut);
                Err(AppError::NotAuthenticated)
            }
            Err(e) => Err(e),
        }
    }

    // ─── PostgREST helpers ───────────────────────────────────────

    /// Send a user-authorised request, refreshing and retrying once on 401.
    async fn send_authed<F>(&self, session: &Session, build: F) -> Result<reqwest::Response>
    where
        F: Fn(&str) -> RequestBuilder + Send + Sync,
    {
        let used = self.usable_session(session).await?;
        let response = build(&used.access_token)
            .send()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        tracing::debug!(user_id = %used.user.id, "Access token rejected, retrying after refresh");
        let fresh = self.refresh_stale(&used).await?;
        build(&fresh.access_token)
            .send()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn rest_rows<T, F>(&self, session: &Session, build: F) -> Result<Vec<T>>
    where
        T: DeserializeOwned,
        F: Fn(&str) -> RequestBuilder + Send + Sync,
    {
        let response = self.send_authed(session, build).await?;
        check_rest_json(response).await
    }

    /// Expect exactly one row back from a mutation with `return=representation`.
    async fn rest_single<T, F>(&self, session: &Session, build: F, what: &str) -> Result<T>
    where
        T: DeserializeOwned,
        F: Fn(&str) -> RequestBuilder + Send + Sync,
    {
        self.rest_rows(session, build)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AppError::NotFound(what.to_string()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// IdentityProvider
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl IdentityProvider for SupabaseClient {
    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session> {
        let response = self
            .anon(self.http.post(self.auth_url("token")))
            .query(&[("grant_type", "password")])
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await
            .map_err(|e| AppError::Auth(e.to_string()))?;

        let session = check_auth_json::<GoTrueSession>(response)
            .await?
            .into_session();

        tracing::info!(user_id = %session.user.id, "Signed in");
        self.remember(&session).await;
        self.emit(AuthEvent::SignedIn(session.clone()));
        Ok(session)
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        name: Option<&str>,
    ) -> Result<SignUpOutcome> {
        let mut body = serde_json::json!({ "email": email, "password": password });
        if let Some(name) = name {
            body["data"] = serde_json::json!({ "name": name });
        }

        let response = self
            .anon(self.http.post(self.auth_url("signup")))
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Auth(e.to_string()))?;

        match check_auth_json::<SignUpResponse>(response).await? {
            SignUpResponse::Session(s) => {
                let session = s.into_session();
                tracing::info!(user_id = %session.user.id, "Signed up with active session");
                self.remember(&session).await;
                self.emit(AuthEvent::SignedIn(session.clone()));
                Ok(SignUpOutcome::Active(session))
            }
            SignUpResponse::User(u) => {
                let user = u.into_user();
                tracing::info!(user_id = %user.id, "Signed up, confirmation required");
                Ok(SignUpOutcome::ConfirmationRequired(user))
            }
        }
    }

    async fn sign_out(&self, session: &Session) -> Result<()> {
        // Local state goes regardless of what the server says
        self.forget().await;
        self.emit(AuthEvent::SignedOut);

        let response = self
            .authed(self.http.post(self.auth_url("logout")), &session.access_token)
            .send()
            .await
            .map_err(|e| AppError::Auth(e.to_string()))?;

        // An already-expired token means the server session is gone anyway
        if response.status() == StatusCode::UNAUTHORIZED {
            return Ok(());
        }
        check_auth(response).await
    }

    async fn get_session(&self) -> Result<Option<Session>> {
        let cached = self.current.lock().await.clone();
        let stored = match cached {
            Some(s) => Some(s),
            None => match &self.session_file {
                Some(file) => file.load().await,
                None => None,
            },
        };

        let Some(session) = stored else {
            return Ok(None);
        };

        if !session.expires_within(Utc::now(), TOKEN_REFRESH_MARGIN_SECS) {
            *self.current.lock().await = Some(session.clone());
            return Ok(Some(session));
        }

        tracing::info!(user_id = %session.user.id, "Stored session expiring, refreshing");
        match self.refresh(&session.refresh_token).await {
            Ok(fresh) => {
                self.remember(&fresh).await;
                self.emit(AuthEvent::TokenRefreshed(fresh.clone()));
                Ok(Some(fresh))
            }
            Err(e) => {
                tracing::warn!(error = %e, "Stored session could not be refreshed, discarding");
                self.forget().await;
                Ok(None)
            }
        }
    }

    async fn verify_signup(&self, email: &str, code: &str) -> Result<Session> {
        let response = self
            .anon(self.http.post(self.auth_url("verify")))
            .json(&serde_json::json!({ "type": "signup", "email": email, "token": code }))
            .send()
            .await
            .map_err(|e| AppError::Auth(e.to_string()))?;

        let session = check_auth_json::<GoTrueSession>(response)
            .await?
            .into_session();

        tracing::info!(user_id = %session.user.id, "Email confirmed");
        self.remember(&session).await;
        self.emit(AuthEvent::SignedIn(session.clone()));
        Ok(session)
    }

    async fn resend_confirmation(&self, email: &str) -> Result<()> {
        let response = self
            .anon(self.http.post(self.auth_url("resend")))
            .json(&serde_json::json!({ "type": "signup", "email": email }))
            .send()
            .await
            .map_err(|e| AppError::Auth(e.to_string()))?;

        check_auth(response).await
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    async fn get_profile(&self, session: &Session, user_id: &str) -> Result<Option<Profile>> {
        let filter = format!("eq.{}", user_id);
        let rows: Vec<Profile> = self
            .rest_rows(session, |token| {
                self.authed(self.http.get(self.rest_url(PROFILES_TABLE)), token)
                    .query(&[("select", "*"), ("id", filter.as_str())])
            })
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn insert_profile(&self, session: &Session, profile: &Profile) -> Result<Profile> {
        self.rest_single(
            session,
            |token| {
                self.authed(self.http.post(self.rest_url(PROFILES_TABLE)), token)
                    .header("Prefer", "return=representation")
                    .json(profile)
            },
            "profile",
        )
        .await
    }

    async fn update_profile(
        &self,
        session: &Session,
        user_id: &str,
        update: &ProfileUpdate,
    ) -> Result<Profile> {
        let filter = format!("eq.{}", user_id);
        let mut body = serde_json::to_value(update).map_err(anyhow::Error::from)?;
        body["updated_at"] = serde_json::json!(Utc::now());

        self.rest_single(
            session,
            |token| {
                self.authed(self.http.patch(self.rest_url(PROFILES_TABLE)), token)
                    .query(&[("id", filter.as_str())])
                    .header("Prefer", "return=representation")
                    .json(&body)
            },
            &format!("profile {}", user_id),
        )
        .await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// WorkoutTable
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl WorkoutTable for SupabaseClient {
    async fn list(&self, session: &Session) -> Result<Vec<Workout>> {
        self.rest_rows(session, |token| {
            self.authed(self.http.get(self.rest_url(WORKOUTS_TABLE)), token)
                .query(&[("select", "*"), ("order", "date.desc")])
        })
        .await
    }

    async fn insert(&self, session: &Session, workout: &NewWorkout) -> Result<Workout> {
        self.rest_single(
            session,
            |token| {
                self.authed(self.http.post(self.rest_url(WORKOUTS_TABLE)), token)
                    .header("Prefer", "return=representation")
                    .json(workout)
            },
            "inserted workout",
        )
        .await
    }

    async fn update(&self, session: &Session, id: &str, patch: &WorkoutPatch) -> Result<Workout> {
        let filter = format!("eq.{}", id);
        self.rest_single(
            session,
            |token| {
                self.authed(self.http.patch(self.rest_url(WORKOUTS_TABLE)), token)
                    .query(&[("id", filter.as_str())])
                    .header("Prefer", "return=representation")
                    .json(patch)
            },
            &format!("workout {}", id),
        )
        .await
    }

    async fn delete(&self, session: &Session, id: &str) -> Result<()> {
        let filter = format!("eq.{}", id);
        // Ask for the deleted rows back so a miss can be told apart from a hit
        let _: Workout = self
            .rest_single(
                session,
                |token| {
                    self.authed(self.http.delete(self.rest_url(WORKOUTS_TABLE)), token)
                        .query(&[("id", filter.as_str())])
                        .header("Prefer", "return=representation")
                },
                &format!("workout {}", id),
            )
            .await?;
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Response checking
// ─────────────────────────────────────────────────────────────────────────────

/// GoTrue error body. Field names differ between endpoints and versions.
#[derive(Debug, Default, Deserialize)]
struct GoTrueError {
    error: Option<String>,
    error_description: Option<String>,
    msg: Option<String>,
    error_code: Option<String>,
    message: Option<String>,
}

impl GoTrueError {
    fn is_email_not_confirmed(&self) -> bool {
        self.error_code.as_deref() == Some("email_not_confirmed")
            || self
                .text()
                .is_some_and(|t| t.to_ascii_lowercase().contains("email not confirmed"))
    }

    fn text(&self) -> Option<&str> {
        self.error_description
            .as_deref()
            .or(self.msg.as_deref())
            .or(self.message.as_deref())
            .or(self.error.as_deref())
    }
}

async fn auth_error(response: reqwest::Response) -> AppError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let err: GoTrueError = serde_json::from_str(&body).unwrap_or_default();

    if err.is_email_not_confirmed() {
        return AppError::EmailNotConfirmed;
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        tracing::warn!("Auth rate limit hit (429)");
    }

    AppError::Auth(
        err.text()
            .map(str::to_string)
            .unwrap_or_else(|| format!("HTTP {}", status)),
    )
}

async fn check_auth(response: reqwest::Response) -> Result<()> {
    if response.status().is_success() {
        return Ok(());
    }
    Err(auth_error(response).await)
}

async fn check_auth_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    if !response.status().is_success() {
        return Err(auth_error(response).await);
    }

    response
        .json()
        .await
        .map_err(|e| AppError::Auth(format!("JSON parse error: {}", e)))
}

async fn check_rest_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if status == StatusCode::UNAUTHORIZED {
            return Err(AppError::NotAuthenticated);
        }

        return Err(AppError::Database(format!("HTTP {}: {}", status, body)));
    }

    response
        .json()
        .await
        .map_err(|e| AppError::Database(format!("JSON parse error: {}", e)))
}

// ─────────────────────────────────────────────────────────────────────────────
// GoTrue payloads
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct GoTrueUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    email_confirmed_at: Option<String>,
    #[serde(default)]
    user_metadata: UserMetadata,
}

#[derive(Debug, Default, Deserialize)]
struct UserMetadata {
    name: Option<String>,
    full_name: Option<String>,
}

impl GoTrueUser {
    fn into_user(self) -> User {
        User {
            id: self.id,
            email: self.email.unwrap_or_default(),
            name: self.user_metadata.name.or(self.user_metadata.full_name),
            verified: self.email_confirmed_at.is_some(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GoTrueSession {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: GoTrueUser,
}

impl GoTrueSession {
    fn into_session(self) -> Session {
        let expires_at = self
            .expires_at
            .and_then(|ts| DateTime::from_timestamp(ts, 0))
            .or_else(|| self.expires_in.map(|secs| Utc::now() + Duration::seconds(secs)));

        Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
            user: self.user.into_user(),
        }
    }
}

/// Sign-up returns a session when auto-confirm is on, otherwise the bare user.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SignUpResponse {
    Session(GoTrueSession),
    User(GoTrueUser),
}
