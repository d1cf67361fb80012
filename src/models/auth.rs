// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session state machine types.

use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;
use validator::Validate;

use crate::error::{AppError, Result};
use crate::models::{Session, User};

/// Length of the emailed confirmation code.
pub const VERIFICATION_CODE_LEN: usize = 6;

/// Where the session currently stands.
///
/// `Unknown` only exists until the first restore completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub enum AuthState {
    Unknown,
    Unauthenticated,
    Authenticated,
    PendingVerification,
}

/// Notification pushed by the auth provider.
#[derive(Debug, Clone)]
pub enum AuthEvent {
    SignedIn(Session),
    SignedOut,
    TokenRefreshed(Session),
    UserUpdated(User),
}

/// Navigation intent returned to the rendering layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub enum Navigation {
    Dashboard,
    Login,
    Verify,
}

impl Navigation {
    pub fn path(self) -> &'static str {
        match self {
            Navigation::Dashboard => "/dashboard",
            Navigation::Login => "/login",
            Navigation::Verify => "/verify",
        }
    }
}

/// What the provider did with a sign-up request.
#[derive(Debug, Clone)]
pub enum SignUpOutcome {
    /// Account is live and signed in.
    Active(Session),
    /// Account exists but must be confirmed before signing in.
    ConfirmationRequired(User),
}

/// Result of `SessionManager::register`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    Authenticated,
    PendingVerification,
}

impl RegisterOutcome {
    pub fn navigation(self) -> Navigation {
        match self {
            RegisterOutcome::Authenticated => Navigation::Dashboard,
            RegisterOutcome::PendingVerification => Navigation::Verify,
        }
    }
}

/// Email + password submitted by the login form.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct Credentials {
    #[validate(email(message = "Enter a valid email address"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

impl Credentials {
    pub fn new(email: &str, password: &str) -> Self {
        Self {
            email: email.trim().to_string(),
            password: password.to_string(),
        }
    }
}

/// Sign-up form.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct Registration {
    #[validate(email(message = "Enter a valid email address"))]
    pub email: String,
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub password: String,
    #[serde(default)]
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: Option<String>,
}

impl Registration {
    pub fn new(email: &str, password: &str, name: Option<&str>) -> Self {
        Self {
            email: email.trim().to_string(),
            password: password.to_string(),
            name: name
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty()),
        }
    }
}

/// Shape check for a confirmation code: exactly six ASCII digits.
///
/// This is input validation only; the provider decides whether the code
/// is correct.
pub fn check_code_shape(code: &str) -> Result<()> {
    if code.len() == VERIFICATION_CODE_LEN && code.bytes().all(|b| b.is_ascii_digit()) {
        Ok(())
    } else {
        Err(AppError::Validation(format!(
            "Verification code must be {} digits",
            VERIFICATION_CODE_LEN
        )))
    }
}
