// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use axum::http::StatusCode;
use axum::response::IntoResponse;
use validator::Validate;
use workout_tracker::error::AppError;
use workout_tracker::models::Registration;

#[test]
fn test_status_codes() {
    let cases = [
        (AppError::Validation("x".to_string()), StatusCode::BAD_REQUEST),
        (AppError::NotAuthenticated, StatusCode::UNAUTHORIZED),
        (AppError::NoPendingVerification, StatusCode::CONFLICT),
        (AppError::EmailNotConfirmed, StatusCode::FORBIDDEN),
        (AppError::Auth("bad".to_string()), StatusCode::UNAUTHORIZED),
        (AppError::NotFound("w".to_string()), StatusCode::NOT_FOUND),
        (AppError::Database("down".to_string()), StatusCode::BAD_GATEWAY),
        (
            AppError::Internal(anyhow::anyhow!("boom")),
            StatusCode::INTERNAL_SERVER_ERROR,
        ),
    ];

    for (err, status) in cases {
        assert_eq!(err.into_response().status(), status);
    }
}

#[test]
fn test_database_details_hidden_from_users() {
    let err = AppError::Database("relation \"workouts\" does not exist".to_string());
    assert!(!err.user_message().contains("relation"));
}

#[test]
fn test_validation_errors_are_sorted_by_field() {
    let registration = Registration::new("nope", "123", None);
    let err: AppError = registration.validate().unwrap_err().into();

    match err {
        AppError::Validation(msg) => {
            assert!(msg.starts_with("email: "));
            assert!(msg.contains("; password: Password must be at least 6 characters"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}
