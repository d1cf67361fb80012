// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Identity provider seam: sign-in, sign-up, confirmation and profiles.

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::Result;
use crate::models::{AuthEvent, Profile, ProfileUpdate, Session, SignUpOutcome};

/// Capacity of provider event channels. Slow listeners lag rather than block.
pub const AUTH_EVENT_CAPACITY: usize = 64;

/// External auth/identity service consumed by the session manager.
///
/// Implementations own credential handling and session persistence;
/// callers never see or compare passwords beyond passing them through.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Exchange email + password for a session.
    ///
    /// Returns `AppError::EmailNotConfirmed` when the account exists but
    /// has not been confirmed yet.
    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session>;

    /// Create an account. `name` is stored as display-name metadata.
    async fn sign_up(&self, email: &str, password: &str, name: Option<&str>)
        -> Result<SignUpOutcome>;

    /// Invalidate the session on the provider side and forget it locally.
    async fn sign_out(&self, session: &Session) -> Result<()>;

    /// Existing valid session, if any (refreshed when near expiry).
    async fn get_session(&self) -> Result<Option<Session>>;

    /// Confirm a pending sign-up with the emailed code.
    async fn verify_signup(&self, email: &str, code: &str) -> Result<Session>;

    /// Send another confirmation message.
    async fn resend_confirmation(&self, email: &str) -> Result<()>;

    /// Push notifications about sign-in state.
    fn subscribe(&self) -> broadcast::Receiver<AuthEvent>;

    // ─── Profiles table ──────────────────────────────────────────

    async fn get_profile(&self, session: &Session, user_id: &str) -> Result<Option<Profile>>;

    async fn insert_profile(&self, session: &Session, profile: &Profile) -> Result<Profile>;

    async fn update_profile(
        &self,
        session: &Session,
        user_id: &str,
        update: &ProfileUpdate,
    ) -> Result<Profile>;
}
