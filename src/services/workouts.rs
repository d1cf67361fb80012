// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Workout store: the signed-in user's workouts, kept in step with the table.
//!
//! Each successful remote call is folded into the local list through
//! `apply_change`; failed calls leave the list as it was.

use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, watch};

use crate::error::{AppError, Result};
use crate::models::{
    apply_change, Notice, Session, Workout, WorkoutChange, WorkoutFilter, WorkoutInput,
    WorkoutPatch, WorkoutStats,
};
use crate::services::subscription::Subscription;
use crate::services::workout_table::WorkoutTable;

const NOTICE_CAPACITY: usize = 32;

/// Observable view of the store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkoutsSnapshot {
    /// Newest date first
    pub workouts: Vec<Workout>,
    /// Last failure message. Not cleared by later successes.
    pub error: Option<String>,
    in_flight: usize,
}

impl WorkoutsSnapshot {
    pub fn loading(&self) -> bool {
        self.in_flight > 0
    }
}

/// Marks a call as in flight until dropped.
struct InFlight<'a> {
    snapshot: &'a watch::Sender<WorkoutsSnapshot>,
}

impl<'a> InFlight<'a> {
    fn start(snapshot: &'a watch::Sender<WorkoutsSnapshot>) -> Self {
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

fn user_id_of(session: &Option<Session>) -> Option<String> {
    session.as_ref().map(|s| s.user.id.clone())
}

/// In-memory, user-scoped list of workouts plus CRUD against the table.
pub struct WorkoutStore {
    table: Arc<dyn WorkoutTable>,
    session: watch::Receiver<Option<Session>>,
    snapshot: watch::Sender<WorkoutsSnapshot>,
    notices: broadcast::Sender<Notice>,
}

impl WorkoutStore {
    /// `session` is the session manager's session watch.
    pub fn new(table: Arc<dyn WorkoutTable>, session: watch::Receiver<Option<Session>>) -> Self {
        let (snapshot, _) = watch::channel(WorkoutsSnapshot::default());
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
        Self {
            table,
            session,
            snapshot,
            notices,
        }
    }

    // ─── Read access ─────────────────────────────────────────────

    pub fn workouts(&self) -> Vec<Workout> {
        self.snapshot.borrow().workouts.clone()
    }

    pub fn snapshot(&self) -> WorkoutsSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<WorkoutsSnapshot> {
        self.snapshot.subscribe()
    }

    pub fn is_loading(&self) -> bool {
        self.snapshot.borrow().loading()
    }

    pub fn last_error(&self) -> Option<String> {
        self.snapshot.borrow().error.clone()
    }

    pub fn notices(&self) -> broadcast::Receiver<Notice> {
        self.notices.subscribe()
    }

    /// Workouts matching a history filter, in list order.
    pub fn filter(&self, filter: &WorkoutFilter) -> Vec<Workout> {
        self.snapshot
            .borrow()
            .workouts
            .iter()
            .filter(|w| filter.matches(w))
            .cloned()
            .collect()
    }

    pub fn stats(&self, now: DateTime<Utc>) -> WorkoutStats {
        WorkoutStats::from_workouts(&self.snapshot.borrow().workouts, now)
    }

    // ─── Internals ───────────────────────────────────────────────

    fn current_session(&self) -> Option<Session> {
        self.session.borrow().clone()
    }

    fn require_session(&self, title: &str) -> Result<Session> {
        self.current_session()
            .ok_or_else(|| self.fail(title, AppError::NotAuthenticated))
    }

    fn apply(&self, change: WorkoutChange) {
        self.snapshot.send_modify(|s| {
            let list = std::mem::take(&mut s.workouts);
            s.workouts = apply_change(list, change);
        });
    }

    /// Record a failure in the shared slot and publish a notice.
    fn fail(&self, title: &str, err: AppError) -> AppError {
        tracing::warn!(error = %err, "{}", title);
        let message = err.user_message();
        self.snapshot
            .send_modify(|s| s.error = Some(format!("{}: {}", title, message)));
        let _ = self.notices.send(Notice::error(title, &err));
        err
    }

    fn succeed(&self, message: &str) {
        let _ = self.notices.send(Notice::info("Success", message));
    }

    // ─── Operations ──────────────────────────────────────────────

    /// Replace the list with the current user's workouts.
    ///
    /// With no user the list is cleared without touching the table.
    pub async fn fetch_all(&self) -> Result<()> {
        let Some(session) = self.current_session() else {
            self.apply(WorkoutChange::Cleared);
            return Ok(());
        };

        let _busy = InFlight::start(&self.snapshot);

        let rows = self
            .table
            .list(&session)
            .await
            .map_err(|e| self.fail("Failed to fetch workouts", e))?;

        // The user may have changed while the request was out
        if user_id_of(&self.session.borrow()).as_deref() != Some(session.user.id.as_str()) {
            tracing::debug!(user_id = %session.user.id, "Discarding workouts for previous user");
            return Ok(());
        }

        tracing::debug!(user_id = %session.user.id, count = rows.len(), "Workouts loaded");
        self.apply(WorkoutChange::Loaded(rows));
        Ok(())
    }

    /// Manual re-sync.
    pub async fn refresh(&self) -> Result<()> {
        self.fetch_all().await
    }

    /// Create a workout and put the stored row at the front of the list.
    pub async fn create(&self, input: WorkoutInput) -> Result<Workout> {
        let title = "Failed to create workout";
        let session = self.require_session(title)?;
        let input = input.normalized().map_err(|e| self.fail(title, e))?;

        let _busy = InFlight::start(&self.snapshot);

        let row = self
            .table
            .insert(&session, &input.into_new_workout(&session.user.id))
            .await
            .map_err(|e| self.fail(title, e))?;

        tracing::info!(user_id = %session.user.id, workout_id = %row.id, "Workout created");
        self.apply(WorkoutChange::Created(row.clone()));
        self.succeed("Workout created successfully");
        Ok(row)
    }

    /// Send changed fields and replace the entry with the stored row.
    pub async fn update(&self, id: &str, patch: WorkoutPatch) -> Result<Workout> {
        let title = "Failed to update workout";
        let session = self.require_session(title)?;
        let patch = patch.normalized().map_err(|e| self.fail(title, e))?;

        let _busy = InFlight::start(&self.snapshot);

        let row = self
            .table
            .update(&session, id, &patch)
            .await
            .map_err(|e| self.fail(title, e))?;

        tracing::info!(user_id = %session.user.id, workout_id = %row.id, "Workout updated");
        self.apply(WorkoutChange::Updated(row.clone()));
        self.succeed("Workout updated successfully");
        Ok(row)
    }

    /// Delete remotely, then drop the entry from the list.
    pub async fn delete(&self, id: &str) -> Result<()> {
        let title = "Failed to delete workout";
        let session = self.require_session(title)?;

        let _busy = InFlight::start(&self.snapshot);

        self.table
            .delete(&session, id)
            .await
            .map_err(|e| self.fail(title, e))?;

        tracing::info!(user_id = %session.user.id, workout_id = %id, "Workout deleted");
        self.apply(WorkoutChange::Deleted(id.to_string()));
        self.succeed("Workout deleted successfully");
        Ok(())
    }

    /// Re-fetch whenever the signed-in user changes, until released.
    ///
    /// Token refreshes for the same user do not trigger a fetch.
    pub fn watch_user_changes(self: &Arc<Self>) -> Subscription {
        let mut session = self.session.clone();
        let store: Weak<Self> = Arc::downgrade(self);

        let task = tokio::spawn(async move {
            // Catch up with whatever happened before the first poll
            let mut last_user = user_id_of(&session.borrow_and_update());
            if let Some(store) = store.upgrade() {
                let _ = store.fetch_all().await;
            }

            while session.changed().await.is_ok() {
                let user = user_id_of(&session.borrow_and_update());
                if user == last_user {
                    continue;
                }
                last_user = user;

                let Some(store) = store.upgrade() else {
                    break;
                };
                // Failures are already recorded and announced
                let _ = store.fetch_all().await;
            }
        });

        Subscription::new("workout-user-watch", task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::identity::IdentityProvider;
    use crate::services::memory::MemoryBackend;
    use chrono::TimeZone;

    fn input(name: &str, day: u32) -> WorkoutInput {
        WorkoutInput {
            name: name.to_string(),
            description: None,
            date: Utc.with_ymd_and_hms(2024, 3, day, 0, 0, 0).unwrap(),
            duration: Some(30),
        }
    }

    async fn signed_in() -> (Arc<MemoryBackend>, watch::Sender<Option<Session>>, WorkoutStore) {
        let backend = Arc::new(MemoryBackend::new(false));
        backend.seed_user("a@b.com", "secret1", None).unwrap();
        let session = backend
            .sign_in_with_password("a@b.com", "secret1")
            .await
            .unwrap();
        let (tx, rx) = watch::channel(Some(session));
        let store = WorkoutStore::new(backend.clone(), rx);
        (backend, tx, store)
    }

    #[tokio::test]
    async fn test_fetch_without_user_clears_list() {
        let backend = Arc::new(MemoryBackend::new(false));
        let (_tx, rx) = watch::channel(None);
        let store = WorkoutStore::new(backend, rx);

        store.fetch_all().await.unwrap();
        assert!(store.workouts().is_empty());
        assert!(!store.is_loading());
        assert!(store.last_error().is_none());
    }

    #[tokio::test]
    async fn test_create_prepends_stored_row() {
        let (_backend, _tx, store) = signed_in().await;
        store.create(input("Run", 1)).await.unwrap();
        let second = store.create(input("Swim", 2)).await.unwrap();

        let list = store.workouts();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].id, second.id);
        assert!(!store.is_loading());
    }

    #[tokio::test]
    async fn test_create_rejects_blank_name_without_calling_table() {
        let (backend, tx, store) = signed_in().await;
        let user_id = tx.borrow().as_ref().unwrap().user.id.clone();

        let err = store.create(input("   ", 1)).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(backend.workout_count(&user_id), 0);
        assert!(store.last_error().is_some());
    }

    #[tokio::test]
    async fn test_create_without_user_is_not_authenticated() {
        let backend = Arc::new(MemoryBackend::new(false));
        let (_tx, rx) = watch::channel(None);
        let store = WorkoutStore::new(backend, rx);

        let err = store.create(input("Run", 1)).await.unwrap_err();
        assert!(matches!(err, AppError::NotAuthenticated));
        assert!(store.workouts().is_empty());
    }

    #[tokio::test]
    async fn test_error_slot_survives_success() {
        let (backend, _tx, store) = signed_in().await;
        backend.set_offline(true);
        assert!(store.fetch_all().await.is_err());
        backend.set_offline(false);

        store.create(input("Run", 1)).await.unwrap();
        assert!(store
            .last_error()
            .unwrap()
            .starts_with("Failed to fetch workouts"));
    }

    #[tokio::test]
    async fn test_update_replaces_entry_in_place() {
        let (_backend, _tx, store) = signed_in().await;
        let first = store.create(input("Run", 1)).await.unwrap();
        store.create(input("Swim", 2)).await.unwrap();

        let patch = WorkoutPatch {
            duration: Some(50),
            ..Default::default()
        };
        let updated = store.update(&first.id, patch).await.unwrap();
        assert_eq!(updated.duration, Some(50));

        let list = store.workouts();
        assert_eq!(list[1].id, first.id);
        assert_eq!(list[1].duration, Some(50));
        assert_eq!(list[0].name, "Swim");
    }

    #[tokio::test]
    async fn test_filter_and_stats_read_current_list() {
        let (_backend, _tx, store) = signed_in().await;
        store.create(input("Morning Run", 1)).await.unwrap();
        store.create(input("Leg Day", 2)).await.unwrap();

        let hits = store.filter(&WorkoutFilter {
            search: Some("run".to_string()),
            on_date: None,
        });
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "Morning Run");

        let stats = store.stats(Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap());
        assert_eq!(stats.total_workouts, 2);
        assert_eq!(stats.total_minutes, 60);
    }

    #[tokio::test]
    async fn test_failure_publishes_notice() {
        let (backend, _tx, store) = signed_in().await;
        let mut notices = store.notices();
        backend.set_offline(true);

        assert!(store.delete("missing").await.is_err());
        let notice = notices.try_recv().unwrap();
        assert_eq!(notice.title, "Failed to delete workout");
    }
}
