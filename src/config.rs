// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.

use std::env;
use std::path::PathBuf;

/// Which backend the state containers talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Hosted Supabase project (auth + REST).
    Supabase,
    /// In-process backend, nothing persisted across restarts.
    Memory,
}

impl std::str::FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "supabase" => Ok(BackendKind::Supabase),
            "memory" => Ok(BackendKind::Memory),
            other => Err(ConfigError::Invalid("BACKEND", other.to_string())),
        }
    }
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Backend selection
    pub backend: BackendKind,
    /// Supabase project URL (e.g. https://xyz.supabase.co)
    pub supabase_url: String,
    /// Supabase anon (publishable) key
    pub supabase_anon_key: String,
    /// Where the signed-in session is persisted between runs.
    /// `None` keeps the session in memory only.
    pub session_file: Option<PathBuf>,
    /// Frontend URL allowed by CORS
    pub frontend_url: String,
    /// Server port
    pub port: u16,
    /// Memory backend: whether sign-up requires an emailed code
    pub require_email_confirmation: bool,
}

const DEFAULT_SESSION_FILE: &str = ".workout-tracker/session.json";

impl Config {
    /// Load configuration from environment variables (and `.env` if present).
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let backend: BackendKind = env::var("BACKEND")
            .unwrap_or_else(|_| "supabase".to_string())
            .parse()?;

        let (supabase_url, supabase_anon_key) = match backend {
            BackendKind::Supabase => (
                env::var("SUPABASE_URL")
                    .map(|v| v.trim().trim_end_matches('/').to_string())
                    .map_err(|_| ConfigError::Missing("SUPABASE_URL"))?,
                env::var("SUPABASE_ANON_KEY")
                    .map(|v| v.trim().to_string())
                    .map_err(|_| ConfigError::Missing("SUPABASE_ANON_KEY"))?,
            ),
            BackendKind::Memory => (String::new(), String::new()),
        };

        let session_file = match env::var("SESSION_FILE") {
            Ok(v) if v.trim().is_empty() => None,
            Ok(v) => Some(PathBuf::from(v)),
            Err(_) => Some(PathBuf::from(DEFAULT_SESSION_FILE)),
        };

        Ok(Self {
            backend,
            supabase_url,
            supabase_anon_key,
            session_file,
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
            require_email_confirmation: env::var("REQUIRE_EMAIL_CONFIRMATION")
                .map(|v| !matches!(v.trim(), "0" | "false" | "no"))
                .unwrap_or(true),
        })
    }

    /// Memory-backend config for tests.
    pub fn test_default() -> Self {
        Self {
            backend: BackendKind::Memory,
            supabase_url: String::new(),
            supabase_anon_key: String::new(),
            session_file: None,
            frontend_url: "http://localhost:5173".to_string(),
            port: 8080,
            require_email_confirmation: true,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_env() {
        env::set_var("BACKEND", "supabase");
        env::set_var("SUPABASE_URL", "https://example.supabase.co/");
        env::set_var("SUPABASE_ANON_KEY", " anon-key ");
        env::set_var("SESSION_FILE", "");

        let config = Config::from_env().expect("Config should load");

        assert_eq!(config.backend, BackendKind::Supabase);
        assert_eq!(config.supabase_url, "https://example.supabase.co");
        assert_eq!(config.supabase_anon_key, "anon-key");
        assert!(config.session_file.is_none());
        assert_eq!(config.port, 8080);
    }

    #[test]
    fn test_backend_kind_parse() {
        assert_eq!("Memory".parse::<BackendKind>().unwrap(), BackendKind::Memory);
        assert_eq!(
            " supabase ".parse::<BackendKind>().unwrap(),
            BackendKind::Supabase
        );
        assert!("firebase".parse::<BackendKind>().is_err());
    }
}
