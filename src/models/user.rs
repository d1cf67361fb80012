// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Identity records mirrored from the auth provider.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Authenticated identity as reported by the auth provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct User {
    /// Provider-assigned user id (UUID string for Supabase)
    pub id: String,
    pub email: String,
    /// Display name from sign-up metadata
    pub name: Option<String>,
    /// Whether the email address has been confirmed
    pub verified: bool,
}

/// User-editable metadata, one row per user in the `profiles` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct Profile {
    /// Same id as the owning `User`
    pub id: String,
    pub full_name: Option<String>,
    pub avatar_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Profile {
    /// Initial profile created the first time a user signs in.
    pub fn seed_for(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            full_name: user.name.clone(),
            avatar_url: None,
            updated_at: None,
        }
    }

    /// Merge accepted fields into this profile.
    pub fn merge(&mut self, update: &ProfileUpdate) {
        if let Some(name) = &update.full_name {
            self.full_name = Some(name.clone());
        }
        if let Some(avatar) = &update.avatar_url {
            self.avatar_url = Some(avatar.clone());
        }
    }
}

/// Partial profile update. Unset fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct ProfileUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.full_name.is_none() && self.avatar_url.is_none()
    }
}

/// Live authenticated connection to the auth provider.
///
/// Serialized as-is into the local session file, so it carries the
/// refresh token; never send it to the browser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    /// When the access token stops being accepted
    pub expires_at: Option<DateTime<Utc>>,
    pub user: User,
}

impl Session {
    /// True when the access token expires within `margin_secs`.
    pub fn expires_within(&self, now: DateTime<Utc>, margin_secs: i64) -> bool {
        match self.expires_at {
            Some(at) => now + chrono::Duration::seconds(margin_secs) >= at,
            None => false,
        }
    }
}
