// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session manager behaviour against the in-memory backend.
//!
//! These tests verify that:
//! 1. Startup without a session ends loading and never fetches workouts
//! 2. Registration that needs confirmation stops at pending verification
//! 3. Logout always clears local state, even when the provider is down or hung
//! 4. Provider-pushed events are mirrored until the listener is released
//! 5. Concurrent sign-ins for one session both see the profile loaded

use std::sync::Arc;
use std::time::Duration;
use workout_tracker::error::AppError;
use workout_tracker::models::{
    AuthEvent, AuthState, Navigation, NoticeLevel, ProfileUpdate, RegisterOutcome,
};
use workout_tracker::services::{IdentityProvider, MemoryBackend, SessionManager, WorkoutStore};

mod common;
use common::{seeded_backend, wait_for, CountingTable, SlowProvider, EMAIL, PASSWORD};

#[tokio::test]
async fn test_startup_without_session() {
    let backend = Arc::new(MemoryBackend::new(true));
    let table = Arc::new(CountingTable::new(backend.clone()));

    let session = Arc::new(SessionManager::new(backend.clone()));
    let workouts = Arc::new(WorkoutStore::new(table.clone(), session.watch_session()));
    let _watch = workouts.watch_user_changes();

    assert!(session.is_loading());
    assert_eq!(session.state(), AuthState::Unknown);

    session.restore().await;
    tokio::task::yield_now().await;

    assert!(!session.is_loading());
    assert_eq!(session.state(), AuthState::Unauthenticated);
    assert!(session.current_user().is_none());
    assert!(workouts.workouts().is_empty());
    assert_eq!(table.list_calls(), 0);
}

#[tokio::test]
async fn test_restore_picks_up_existing_session() {
    let backend = seeded_backend(true);

    let first = SessionManager::new(backend.clone());
    first.restore().await;
    first.login(EMAIL, PASSWORD).await.unwrap();

    // A second manager over the same provider sees the live session
    let second = SessionManager::new(backend.clone());
    second.restore().await;
    assert_eq!(second.state(), AuthState::Authenticated);
    assert_eq!(second.current_user().unwrap().email, EMAIL);
    assert_eq!(
        second.snapshot().profile.unwrap().full_name.as_deref(),
        Some("Ada")
    );
}

#[tokio::test]
async fn test_login_loads_profile_and_navigates() {
    let backend = seeded_backend(true);
    let session = SessionManager::new(backend.clone());
    session.restore().await;

    let nav = session.login(EMAIL, PASSWORD).await.unwrap();
    assert_eq!(nav, Navigation::Dashboard);

    let snapshot = session.snapshot();
    assert!(snapshot.is_authenticated());
    assert!(!snapshot.loading());
    let profile = snapshot.profile.unwrap();
    assert_eq!(profile.id, snapshot.user.unwrap().id);
    assert_eq!(profile.full_name.as_deref(), Some("Ada"));
}

#[tokio::test]
async fn test_bad_password_stays_unauthenticated() {
    let backend = seeded_backend(true);
    let session = SessionManager::new(backend.clone());
    session.restore().await;
    let mut notices = session.notices();

    let err = session.login(EMAIL, "wrong-password").await.unwrap_err();
    assert!(matches!(err, AppError::Auth(_)));
    assert_eq!(session.state(), AuthState::Unauthenticated);
    assert!(session.current_session().is_none());

    let notice = notices.try_recv().unwrap();
    assert_eq!(notice.level, NoticeLevel::Error);
    assert_eq!(notice.title, "Login failed");
}

#[tokio::test]
async fn test_malformed_email_rejected_before_provider() {
    let backend = seeded_backend(true);
    backend.set_offline(true);
    let session = SessionManager::new(backend.clone());

    // Offline provider would give Auth; validation fails first
    let err = session.login("not-an-email", PASSWORD).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn test_register_requiring_confirmation() {
    let backend = Arc::new(MemoryBackend::new(true));
    let session = SessionManager::new(backend.clone());
    session.restore().await;

    let outcome = session
        .register("a@b.com", "secret123", Some("Grace"))
        .await
        .unwrap();

    assert_eq!(outcome, RegisterOutcome::PendingVerification);
    assert_ne!(outcome.navigation(), Navigation::Dashboard);

    let snapshot = session.snapshot();
    assert_eq!(snapshot.state, AuthState::PendingVerification);
    assert_eq!(snapshot.pending_email.as_deref(), Some("a@b.com"));
    assert!(snapshot.user.is_none());
    assert!(session.current_session().is_none());
}

#[tokio::test]
async fn test_register_without_confirmation_signs_in() {
    let backend = Arc::new(MemoryBackend::new(false));
    let session = SessionManager::new(backend.clone());
    session.restore().await;

    let outcome = session
        .register("new@example.com", "secret123", None)
        .await
        .unwrap();

    assert_eq!(outcome, RegisterOutcome::Authenticated);
    assert!(session.is_authenticated());
    assert!(session.snapshot().profile.is_some());
}

#[tokio::test]
async fn test_verify_with_emailed_code() {
    let backend = Arc::new(MemoryBackend::new(true));
    let session = SessionManager::new(backend.clone());
    session.restore().await;
    session
        .register("new@example.com", "secret123", Some("Grace"))
        .await
        .unwrap();

    // Right shape, wrong code: rejected by the provider
    let code = backend.pending_code("new@example.com").unwrap();
    let wrong = if code == "000000" { "111111" } else { "000000" };
    assert!(session.verify(wrong).await.is_err());
    assert_eq!(session.state(), AuthState::PendingVerification);

    // Wrong shape is rejected locally
    assert!(matches!(
        session.verify("12ab").await,
        Err(AppError::Validation(_))
    ));

    let nav = session.verify(&code).await.unwrap();
    assert_eq!(nav, Navigation::Dashboard);
    assert!(session.is_authenticated());
    assert_eq!(
        session.snapshot().profile.unwrap().full_name.as_deref(),
        Some("Grace")
    );
}

#[tokio::test]
async fn test_verify_without_pending_registration() {
    let backend = seeded_backend(true);
    let session = SessionManager::new(backend.clone());
    session.restore().await;

    assert!(matches!(
        session.verify("123456").await,
        Err(AppError::NoPendingVerification)
    ));
    assert!(matches!(
        session.resend_verification().await,
        Err(AppError::NoPendingVerification)
    ));
}

#[tokio::test]
async fn test_login_to_unconfirmed_account_enters_pending() {
    let backend = Arc::new(MemoryBackend::new(true));
    let first = SessionManager::new(backend.clone());
    first.restore().await;
    first
        .register("new@example.com", "secret123", None)
        .await
        .unwrap();

    let session = SessionManager::new(backend.clone());
    session.restore().await;
    let err = session
        .login("new@example.com", "secret123")
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::EmailNotConfirmed));
    assert_eq!(session.state(), AuthState::PendingVerification);
    assert_eq!(
        session.snapshot().pending_email.as_deref(),
        Some("new@example.com")
    );

    // Resend issues a fresh code for the remembered address
    session.resend_verification().await.unwrap();
    assert!(backend.pending_code("new@example.com").is_some());
}

#[tokio::test]
async fn test_logout_clears_state_when_provider_offline() {
    let backend = seeded_backend(true);
    let session = SessionManager::new(backend.clone());
    session.restore().await;
    session.login(EMAIL, PASSWORD).await.unwrap();

    backend.set_offline(true);
    let nav = session.logout().await;

    assert_eq!(nav, Navigation::Login);
    let snapshot = session.snapshot();
    assert_eq!(snapshot.state, AuthState::Unauthenticated);
    assert!(snapshot.user.is_none());
    assert!(snapshot.profile.is_none());
    assert!(session.current_session().is_none());
    assert!(!snapshot.loading());
}

#[tokio::test]
async fn test_logout_does_not_wait_for_hung_provider() {
    let backend = seeded_backend(true);
    let mut provider = SlowProvider::new(backend.clone());
    provider.hang_sign_out = true;

    let session = Arc::new(SessionManager::new(Arc::new(provider)));
    session.restore().await;
    session.login(EMAIL, PASSWORD).await.unwrap();

    let mut rx = session.watch();
    let logout = tokio::spawn({
        let session = session.clone();
        async move { session.logout().await }
    });

    wait_for(&mut rx, |s| {
        s.state == AuthState::Unauthenticated && s.user.is_none() && !s.loading()
    })
    .await;
    assert!(session.current_session().is_none());

    // The provider call is still outstanding
    assert!(!logout.is_finished());
    logout.abort();
}

#[tokio::test]
async fn test_concurrent_sign_in_waits_for_profile() {
    let backend = seeded_backend(true);
    let mut provider = SlowProvider::new(backend.clone());
    provider.profile_delay = Duration::from_millis(20);

    let session = SessionManager::new(Arc::new(provider));
    session.restore().await;
    let mut notices = session.notices();

    let signed_in = backend.sign_in_with_password(EMAIL, PASSWORD).await.unwrap();

    // Same session delivered twice, as login and the provider event both do
    let first = session.handle_event(AuthEvent::SignedIn(signed_in.clone()));
    let second = async {
        session
            .handle_event(AuthEvent::SignedIn(signed_in.clone()))
            .await;
        session.snapshot()
    };
    let ((), seen) = tokio::join!(first, second);

    assert_eq!(seen.state, AuthState::Authenticated);
    assert_eq!(seen.profile.map(|p| p.id), Some(signed_in.user.id));
    assert!(notices.try_recv().is_err());
}

#[tokio::test]
async fn test_update_profile() {
    let backend = seeded_backend(true);
    let session = SessionManager::new(backend.clone());
    session.restore().await;

    let update = ProfileUpdate {
        full_name: Some("Ada Lovelace".to_string()),
        avatar_url: None,
    };
    assert!(matches!(
        session.update_profile(update.clone()).await,
        Err(AppError::NotAuthenticated)
    ));

    session.login(EMAIL, PASSWORD).await.unwrap();
    assert!(matches!(
        session.update_profile(ProfileUpdate::default()).await,
        Err(AppError::Validation(_))
    ));

    let profile = session.update_profile(update).await.unwrap();
    assert_eq!(profile.full_name.as_deref(), Some("Ada Lovelace"));
    assert!(profile.updated_at.is_some());
    assert_eq!(session.snapshot().profile, Some(profile));
}

#[tokio::test]
async fn test_provider_sign_out_event_clears_state() {
    let backend = seeded_backend(true);
    let session = Arc::new(SessionManager::new(backend.clone()));
    let _events = session.subscribe_provider_events();
    session.restore().await;
    session.login(EMAIL, PASSWORD).await.unwrap();

    let mut rx = session.watch();
    backend.emit(AuthEvent::SignedOut);
    wait_for(&mut rx, |s| s.state == AuthState::Unauthenticated).await;

    assert!(session.current_session().is_none());
}

#[tokio::test]
async fn test_released_listener_ignores_events() {
    let backend = seeded_backend(true);
    let session = Arc::new(SessionManager::new(backend.clone()));
    let events = session.subscribe_provider_events();
    session.restore().await;
    session.login(EMAIL, PASSWORD).await.unwrap();

    assert!(events.is_active());
    assert_eq!(events.name(), "auth-events");
    events.release().await;

    backend.emit(AuthEvent::SignedOut);
    tokio::task::yield_now().await;
    assert_eq!(session.state(), AuthState::Authenticated);
}
