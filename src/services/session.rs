// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session manager: the single source of "who is logged in".
//!
//! Handles:
//! - Restoring an existing session at startup
//! - Login, registration, sign-up confirmation, logout
//! - Lazy profile creation and profile updates
//! - Mirroring provider-pushed sign-in/sign-out events

use std::sync::{Arc, Weak};

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch, Mutex};
use validator::Validate;

use crate::error::{AppError, Result};
use crate::models::auth::check_code_shape;
use crate::models::{
    AuthEvent, AuthState, Credentials, Navigation, Notice, Profile, ProfileUpdate,
    RegisterOutcome, Registration, Session, SignUpOutcome, User,
};
use crate::services::identity::IdentityProvider;
use crate::services::subscription::Subscription;

const NOTICE_CAPACITY: usize = 32;

/// Observable view of the session manager.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthSnapshot {
    pub state: AuthState,
    pub user: Option<User>,
    pub profile: Option<Profile>,
    /// Email awaiting confirmation while `state` is `PendingVerification`
    pub pending_email: Option<String>,
    in_flight: usize,
}

impl AuthSnapshot {
    fn initial() -> Self {
        Self {
            state: AuthState::Unknown,
            user: None,
            profile: None,
            pending_email: None,
            in_flight: 0,
        }
    }

    /// True until the first restore finishes and while any call is running.
    pub fn loading(&self) -> bool {
        self.state == AuthState::Unknown || self.in_flight > 0
    }

    pub fn is_authenticated(&self) -> bool {
        self.state == AuthState::Authenticated && self.user.is_some()
    }
}

/// Marks a call as in flight until dropped.
struct InFlight<'a> {
    snapshot: &'a watch::Sender<AuthSnapshot>,
}

impl<'a> InFlight<'a> {
    fn start(snapshot: &'a watch::Sender<AuthSnapshot>) -> Self {
        snapshot.send_modify(|s| s.in_flight += 1);
        Self { snapshot }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.snapshot
            .send_modify(|s| s.in_flight = s.in_flight.saturating_sub(1));
    }
}

/// Owns authenticated-user state and mediates every identity mutation.
pub struct SessionManager {
    provider: Arc<dyn IdentityProvider>,
    snapshot: watch::Sender<AuthSnapshot>,
    session: watch::Sender<Option<Session>>,
    notices: broadcast::Sender<Notice>,
    /// Held while entering the authenticated state.
    transition: Mutex<()>,
}

impl SessionManager {
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        let (snapshot, _) = watch::channel(AuthSnapshot::initial());
        let (session, _) = watch::channel(None);
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
        Self {
            provider,
            snapshot,
            session,
            notices,
            transition: Mutex::new(()),
        }
    }

    // ─── Read access ─────────────────────────────────────────────

    pub fn snapshot(&self) -> AuthSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<AuthSnapshot> {
        self.snapshot.subscribe()
    }

    /// Current session; notifies on sign-in, sign-out and token refresh.
    pub fn watch_session(&self) -> watch::Receiver<Option<Session>> {
        self.session.subscribe()
    }

    pub fn current_session(&self) -> Option<Session> {
        self.session.borrow().clone()
    }

    pub fn current_user(&self) -> Option<User> {
        self.snapshot.borrow().user.clone()
    }

    pub fn state(&self) -> AuthState {
        self.snapshot.borrow().state
    }

    pub fn is_authenticated(&self) -> bool {
        self.snapshot.borrow().is_authenticated()
    }

    pub fn is_loading(&self) -> bool {
        self.snapshot.borrow().loading()
    }

    pub fn notices(&self) -> broadcast::Receiver<Notice> {
        self.notices.subscribe()
    }

    fn notify(&self, notice: Notice) {
        let _ = self.notices.send(notice);
    }

    fn fail(&self, title: &str, err: AppError) -> AppError {
        tracing::warn!(error = %err, "{}", title);
        self.notify(Notice::error(title, &err));
        err
    }

    // ─── Operations ──────────────────────────────────────────────

    /// Look for an existing session. Loading ends whatever the outcome.
    pub async fn restore(&self) {
        let _busy = InFlight::start(&self.snapshot);

        match self.provider.get_session().await {
            Ok(Some(session)) => {
                tracing::info!(user_id = %session.user.id, "Session restored");
                self.enter_authenticated(session).await;
            }
            Ok(None) => {
                tracing::info!("No existing session");
                self.clear_local();
            }
            Err(e) => {
                self.fail("Could not restore session", e);
                self.clear_local();
            }
        }
    }

    /// Sign in with email and password.
    pub async fn login(&self, email: &str, password: &str) -> Result<Navigation> {
        let credentials = Credentials::new(email, password);
        credentials
            .validate()
            .map_err(|e| self.fail("Login failed", e.into()))?;

        let _busy = InFlight::start(&self.snapshot);

        match self
            .provider
            .sign_in_with_password(&credentials.email, &credentials.password)
            .await
        {
            Ok(session) => {
                self.enter_authenticated(session).await;
                self.notify(Notice::info("Logged in", "You have been signed in"));
                Ok(Navigation::Dashboard)
            }
            Err(AppError::EmailNotConfirmed) => {
                self.enter_pending(&credentials.email);
                Err(self.fail("Account not verified", AppError::EmailNotConfirmed))
            }
            Err(e) => Err(self.fail("Login failed", e)),
        }
    }

    /// Create an account; either signs in or waits for confirmation.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        name: Option<&str>,
    ) -> Result<RegisterOutcome> {
        let registration = Registration::new(email, password, name);
        registration
            .validate()
            .map_err(|e| self.fail("Registration failed", e.into()))?;

        let _busy = InFlight::start(&self.snapshot);

        let outcome = self
            .provider
            .sign_up(
                &registration.email,
                &registration.password,
                registration.name.as_deref(),
            )
            .await
            .map_err(|e| self.fail("Registration failed", e))?;

        match outcome {
            SignUpOutcome::Active(session) => {
                self.enter_authenticated(session).await;
                self.notify(Notice::info("Registration complete", "Welcome aboard"));
                Ok(RegisterOutcome::Authenticated)
            }
            SignUpOutcome::ConfirmationRequired(user) => {
                tracing::info!(user_id = %user.id, "Registration pending confirmation");
                self.enter_pending(&registration.email);
                self.notify(Notice::info(
                    "Registration complete",
                    "We sent a verification code to your email",
                ));
                Ok(RegisterOutcome::PendingVerification)
            }
        }
    }

    /// Confirm the pending registration with the emailed code.
    pub async fn verify(&self, code: &str) -> Result<Navigation> {
        let email = self
            .pending_email()
            .ok_or_else(|| self.fail("Verification failed", AppError::NoPendingVerification))?;
        let code = code.trim();
        check_code_shape(code).map_err(|e| self.fail("Verification failed", e))?;

        let _busy = InFlight::start(&self.snapshot);

        let session = self
            .provider
            .verify_signup(&email, code)
            .await
            .map_err(|e| self.fail("Verification failed", e))?;

        self.enter_authenticated(session).await;
        self.notify(Notice::info("Email verified", "Your account is now active"));
        Ok(Navigation::Dashboard)
    }

    /// Ask the provider to send another confirmation message.
    pub async fn resend_verification(&self) -> Result<()> {
        let email = self
            .pending_email()
            .ok_or_else(|| self.fail("Could not resend code", AppError::NoPendingVerification))?;

        let _busy = InFlight::start(&self.snapshot);

        self.provider
            .resend_confirmation(&email)
            .await
            .map_err(|e| self.fail("Could not resend code", e))?;

        self.notify(Notice::info("Email sent", "Check your inbox for a new code"));
        Ok(())
    }

    /// Sign out. Local state is cleared before the provider is contacted.
    pub async fn logout(&self) -> Navigation {
        let session = self.current_session();
        self.clear_local();
        self.notify(Notice::info("Logged out", "You have been signed out"));

        if let Some(session) = session {
            if let Err(e) = self.provider.sign_out(&session).await {
                tracing::warn!(error = %e, "Provider sign-out failed, local session already cleared");
            }
        }

        Navigation::Login
    }

    /// Update profile fields for the signed-in user.
    pub async fn update_profile(&self, update: ProfileUpdate) -> Result<Profile> {
        let session = self
            .current_session()
            .ok_or_else(|| self.fail("Profile not updated", AppError::NotAuthenticated))?;

        if update.is_empty() {
            return Err(self.fail(
                "Profile not updated",
                AppError::Validation("Nothing to update".to_string()),
            ));
        }

        let _busy = InFlight::start(&self.snapshot);

        let stored = self
            .provider
            .update_profile(&session, &session.user.id, &update)
            .await
            .map_err(|e| self.fail("Profile not updated", e))?;

        let user_id = session.user.id;
        self.snapshot.send_if_modified(|s| {
            if s.user.as_ref().map(|u| u.id.as_str()) != Some(user_id.as_str()) {
                return false;
            }
            match &mut s.profile {
                Some(profile) => {
                    profile.merge(&update);
                    profile.updated_at = stored.updated_at;
                }
                None => s.profile = Some(stored.clone()),
            }
            true
        });

        self.notify(Notice::info("Profile updated", "Your changes have been saved"));
        let profile = self.snapshot.borrow().profile.clone().unwrap_or(stored);
        Ok(profile)
    }

    /// Listen for provider-pushed auth events until the handle is released.
    pub fn subscribe_provider_events(self: &Arc<Self>) -> Subscription {
        let mut events = self.provider.subscribe();
        let manager: Weak<Self> = Arc::downgrade(self);

        let task = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        let Some(manager) = manager.upgrade() else {
                            break;
                        };
                        manager.handle_event(event).await;
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Auth event listener lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        Subscription::new("auth-events", task)
    }

    /// Apply one provider event to local state.
    pub async fn handle_event(&self, event: AuthEvent) {
        match event {
            AuthEvent::SignedIn(session) => {
                tracing::debug!(user_id = %session.user.id, "Provider reported sign-in");
                self.enter_authenticated(session).await;
            }
            AuthEvent::SignedOut => {
                if self.state() == AuthState::Authenticated {
                    tracing::info!("Provider reported sign-out");
                    self.clear_local();
                }
            }
            AuthEvent::TokenRefreshed(session) => {
                let same_user = self
                    .current_user()
                    .is_some_and(|u| u.id == session.user.id);
                if same_user {
                    self.session.send_replace(Some(session));
                }
            }
            AuthEvent::UserUpdated(user) => {
                self.snapshot.send_if_modified(|s| match &mut s.user {
                    Some(current) if current.id == user.id && *current != user => {
                        *current = user;
                        true
                    }
                    _ => false,
                });
            }
        }
    }

    // ─── Transitions ─────────────────────────────────────────────

    fn pending_email(&self) -> Option<String> {
        let snapshot = self.snapshot.borrow();
        match snapshot.state {
            AuthState::PendingVerification => snapshot.pending_email.clone(),
            _ => None,
        }
    }

    async fn enter_authenticated(&self, session: Session) {
        // Login and the provider's SignedIn event both land here; the loser
        // waits until the winner has published the user and profile
        let _transition = self.transition.lock().await;
        let user = session.user.clone();

        let same_user = self.current_user().is_some_and(|u| u.id == user.id);

        let replaced = self.session.send_if_modified(|current| {
            if current
                .as_ref()
                .is_some_and(|s| s.access_token == session.access_token)
            {
                return false;
            }
            *current = Some(session.clone());
            true
        });
        if !replaced {
            return;
        }

        self.snapshot.send_modify(|s| {
            s.state = AuthState::Authenticated;
            s.pending_email = None;
            if !same_user {
                s.profile = None;
            }
            s.user = Some(user.clone());
        });

        let needs_profile = !same_user || self.snapshot.borrow().profile.is_none();
        if needs_profile {
            self.load_profile(&session).await;
        }
    }

    fn enter_pending(&self, email: &str) {
        self.session.send_replace(None);
        self.snapshot.send_modify(|s| {
            s.state = AuthState::PendingVerification;
            s.user = None;
            s.profile = None;
            s.pending_email = Some(email.to_string());
        });
    }

    fn clear_local(&self) {
        self.session.send_if_modified(|s| s.take().is_some());
        self.snapshot.send_modify(|s| {
            s.state = AuthState::Unauthenticated;
            s.user = None;
            s.profile = None;
            s.pending_email = None;
        });
    }

    /// Fetch the profile, creating it on first sign-in.
    async fn load_profile(&self, session: &Session) {
        let user = &session.user;
        let profile = match self.provider.get_profile(session, &user.id).await {
            Ok(Some(profile)) => profile,
            Ok(None) => {
                tracing::info!(user_id = %user.id, "Creating profile");
                match self
                    .provider
                    .insert_profile(session, &Profile::seed_for(user))
                    .await
                {
                    Ok(profile) => profile,
                    Err(e) => {
                        self.fail("Could not create profile", e);
                        return;
                    }
                }
            }
            Err(e) => {
                self.fail("Could not load profile", e);
                return;
            }
        };

        // Only keep it if the same user is still signed in
        self.snapshot.send_if_modified(|s| {
            if s.user.as_ref().is_some_and(|u| u.id == profile.id) {
                s.profile = Some(profile);
                true
            } else {
                false
            }
        });
    }
}
