//! Transient user-facing notifications.

use serde::Serialize;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Info,
    Error,
}

/// A toast-style message published by the state containers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub title: String,
    pub message: String,
}

impl Notice {
    pub fn info(title: &str, message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            title: title.to_string(),
            message: message.into(),
        }
    }

    pub fn error(title: &str, err: &AppError) -> Self {
        Self {
            level: NoticeLevel::Error,
            title: title.to_string(),
            message: err.user_message(),
        }
    }
}
