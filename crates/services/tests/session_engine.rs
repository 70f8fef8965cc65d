use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use drill_core::model::{
    Difficulty, PracticeSession, SessionDraft, SessionId, SessionStatus, SpacedRepetitionItem,
    Task,
};
use drill_core::time::fixed_now;
use services::{Clock, SessionEngine, SessionError, SessionRequest};
use storage::repository::{
    InMemoryRepository, SessionPatch, SessionRepository, SpacedRepetitionRepository,
    StorageError,
};

/// Counts `get_due` calls before delegating.
struct CountingReviews {
    inner: InMemoryRepository,
    calls: AtomicUsize,
}

#[async_trait::async_trait]
impl SpacedRepetitionRepository for CountingReviews {
    async fn get_due(
        &self,
        before: DateTime<Utc>,
    ) -> Result<Vec<SpacedRepetitionItem>, StorageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.get_due(before).await
    }
}

struct Harness {
    engine: SessionEngine,
    reviews: Arc<CountingReviews>,
}

fn harness(tasks: &[(&str, &str)], due: &[&str]) -> Harness {
    let repo = InMemoryRepository::with_seed(42);
    for (id, path) in tasks {
        repo.insert_task(Task::new(*id, *path, Difficulty::Medium))
            .unwrap();
    }
    for id in due {
        repo.insert_review_item(SpacedRepetitionItem::new(
            *id,
            fixed_now() - chrono::Duration::days(1),
        ))
        .unwrap();
    }
    let reviews = Arc::new(CountingReviews {
        inner: repo.clone(),
        calls: AtomicUsize::new(0),
    });
    let repo = Arc::new(repo);
    let engine = SessionEngine::new(
        Clock::fixed(fixed_now()),
        repo.clone(),
        repo,
        reviews.clone(),
    )
    .with_deterministic(true);
    Harness { engine, reviews }
}

fn spanish_pool(n: usize) -> Vec<(String, &'static str)> {
    (0..n).map(|i| (format!("es-{i:02}"), "spanish")).collect()
}

fn as_refs<'a>(pool: &'a [(String, &'static str)]) -> Vec<(&'a str, &'a str)> {
    pool.iter().map(|(id, path)| (id.as_str(), *path)).collect()
}

fn task_ids(session: &PracticeSession) -> Vec<&str> {
    session
        .execution()
        .task_ids()
        .iter()
        .map(|id| id.as_str())
        .collect()
}

#[tokio::test]
async fn scenario_a_final_answer_completes_in_the_same_call() {
    let pool = spanish_pool(5);
    let h = harness(&as_refs(&pool), &[]);
    let session = h
        .engine
        .create_session(SessionRequest::new("languages", ["spanish"], 5).with_review(false))
        .await
        .unwrap();

    for _ in 0..4 {
        h.engine
            .record_answer(session.id(), true, Duration::from_secs(3))
            .await
            .unwrap();
    }
    let before = h.engine.get_session(session.id()).await.unwrap();
    assert_eq!(before.execution().completed_count(), 4);
    assert_eq!(before.status(), SessionStatus::Active);
    assert!(before.execution().completed_at().is_none());

    let after = h
        .engine
        .record_answer(session.id(), true, Duration::from_secs(3))
        .await
        .unwrap();
    assert_eq!(after.execution().completed_count(), 5);
    assert_eq!(after.status(), SessionStatus::Completed);
    assert_eq!(after.execution().completed_at(), Some(fixed_now()));

    let results = after.results();
    assert!((results.accuracy - 1.0).abs() < f64::EPSILON);
    assert_eq!(results.average_time, Duration::from_secs(3));
}

#[tokio::test]
async fn scenario_b_due_items_outside_session_paths_never_appear() {
    let h = harness(
        &[
            ("taskA", "spanish"),
            ("taskB", "biology"),
            ("taskC", "spanish"),
            ("taskD", "spanish"),
        ],
        &["taskA", "taskB", "taskC"],
    );

    let session = h
        .engine
        .create_session(SessionRequest::new("languages", ["spanish"], 3))
        .await
        .unwrap();

    let ids = task_ids(&session);
    assert!(!ids.contains(&"taskB"));
    assert_eq!(ids, vec!["taskA", "taskC", "taskD"]);
    assert_eq!(h.reviews.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn scenario_c_review_disabled_uses_task_store_only() {
    let pool = spanish_pool(8);
    let h = harness(&as_refs(&pool), &["es-07", "es-06"]);

    let session = h
        .engine
        .create_session(SessionRequest::new("languages", ["spanish"], 5).with_review(false))
        .await
        .unwrap();

    assert_eq!(h.reviews.calls.load(Ordering::SeqCst), 0);
    assert_eq!(
        task_ids(&session),
        vec!["es-00", "es-01", "es-02", "es-03", "es-04"]
    );
}

#[tokio::test]
async fn scenario_d_pause_and_resume_keep_counters() {
    let pool = spanish_pool(4);
    let h = harness(&as_refs(&pool), &[]);
    let id = h
        .engine
        .create_session(SessionRequest::new("languages", ["spanish"], 4))
        .await
        .unwrap()
        .id();

    h.engine
        .record_answer(id, true, Duration::from_millis(1_500))
        .await
        .unwrap();
    let active = h
        .engine
        .record_answer(id, false, Duration::from_millis(500))
        .await
        .unwrap();

    let paused = h.engine.pause_session(id).await.unwrap();
    assert_eq!(paused.status(), SessionStatus::Paused);

    let resumed = h.engine.resume_session(id).await.unwrap();
    assert_eq!(resumed.status(), SessionStatus::Active);
    assert_eq!(
        resumed.execution().completed_count(),
        active.execution().completed_count()
    );
    assert_eq!(
        resumed.execution().correct_count(),
        active.execution().correct_count()
    );
    assert_eq!(
        resumed.execution().total_time_spent(),
        Duration::from_secs(2)
    );
}

#[tokio::test]
async fn scenario_e_unknown_session_is_not_found_with_its_id() {
    let h = harness(&[], &[]);
    let missing = SessionId::random();

    let err = h
        .engine
        .record_answer(missing, true, Duration::from_secs(1))
        .await
        .unwrap_err();

    assert!(matches!(err, SessionError::NotFound(id) if id == missing));
    assert!(err.to_string().contains(&missing.to_string()));
}

#[tokio::test]
async fn session_built_only_from_reviews_still_reaches_its_target() {
    let h = harness(&[("a", "spanish"), ("b", "spanish")], &["a", "b"]);
    let session = h
        .engine
        .create_session(SessionRequest::new("languages", ["spanish"], 5))
        .await
        .unwrap();
    assert_eq!(task_ids(&session), vec!["a", "b", "a", "b", "a"]);

    for _ in 0..4 {
        h.engine
            .record_answer(session.id(), true, Duration::from_secs(1))
            .await
            .unwrap();
    }
    let last = h
        .engine
        .record_answer(session.id(), true, Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(last.status(), SessionStatus::Completed);
    assert_eq!(last.execution().completed_count(), 5);
}

#[tokio::test]
async fn first_answer_starts_the_session_exactly_once() {
    let pool = spanish_pool(3);
    let repo = InMemoryRepository::with_seed(1);
    for (id, path) in as_refs(&pool) {
        repo.insert_task(Task::new(id, path, Difficulty::Easy))
            .unwrap();
    }
    let repo = Arc::new(repo);
    let start = fixed_now();

    let engine_at = |at| {
        SessionEngine::new(Clock::fixed(at), repo.clone(), repo.clone(), repo.clone())
            .with_deterministic(true)
    };

    let id = engine_at(start)
        .create_session(SessionRequest::new("languages", ["spanish"], 3).with_review(false))
        .await
        .unwrap()
        .id();

    let first = engine_at(start + chrono::Duration::minutes(1))
        .record_answer(id, true, Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(first.status(), SessionStatus::Active);
    let started_at = first.execution().started_at();
    assert_eq!(started_at, Some(start + chrono::Duration::minutes(1)));

    let later = engine_at(start + chrono::Duration::minutes(5));
    later.pause_session(id).await.unwrap();
    let second = later
        .record_answer(id, false, Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(second.status(), SessionStatus::Active);
    assert_eq!(second.execution().started_at(), started_at);
}

#[tokio::test]
async fn completed_count_never_exceeds_task_list() {
    // Nothing in the pool matches, so the session starts with no tasks.
    let h = harness(&[], &[]);
    let session = h
        .engine
        .create_session(SessionRequest::new("languages", ["spanish"], 2))
        .await
        .unwrap();
    assert!(session.execution().task_ids().is_empty());

    for _ in 0..3 {
        let result = h
            .engine
            .record_answer(session.id(), true, Duration::from_secs(1))
            .await;
        assert!(matches!(result, Err(SessionError::NoRemainingTasks(_))));
        let current = h.engine.get_session(session.id()).await.unwrap();
        assert!(
            usize::try_from(current.execution().completed_count()).unwrap()
                <= current.execution().task_ids().len()
        );
    }
}

#[tokio::test]
async fn answering_a_terminal_session_is_rejected() {
    let pool = spanish_pool(2);
    let h = harness(&as_refs(&pool), &[]);
    let id = h
        .engine
        .create_session(SessionRequest::new("languages", ["spanish"], 2))
        .await
        .unwrap()
        .id();

    h.engine
        .record_answer(id, true, Duration::ZERO)
        .await
        .unwrap();
    let abandoned = h.engine.abandon_session(id).await.unwrap();
    assert_eq!(abandoned.status(), SessionStatus::Abandoned);
    assert!(abandoned.execution().completed_at().is_none());

    let err = h
        .engine
        .record_answer(id, true, Duration::ZERO)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SessionError::InvalidState {
            status: SessionStatus::Abandoned,
            ..
        }
    ));
    let current = h.engine.get_session(id).await.unwrap();
    assert_eq!(current.execution().completed_count(), 1);
}

#[tokio::test]
async fn manual_complete_before_target_sets_completed_at() {
    let pool = spanish_pool(5);
    let h = harness(&as_refs(&pool), &[]);
    let id = h
        .engine
        .create_session(SessionRequest::new("languages", ["spanish"], 5))
        .await
        .unwrap()
        .id();

    h.engine.start_session(id).await.unwrap();
    let done = h.engine.complete_session(id).await.unwrap();
    assert_eq!(done.status(), SessionStatus::Completed);
    assert_eq!(done.execution().completed_count(), 0);
    assert_eq!(done.execution().completed_at(), Some(fixed_now()));

    let err = h.engine.pause_session(id).await.unwrap_err();
    assert!(matches!(err, SessionError::InvalidState { .. }));
}

#[tokio::test]
async fn deterministic_creation_is_repeatable() {
    let pool = spanish_pool(6);
    let mut tasks = as_refs(&pool);
    tasks.push(("fr-00", "french"));
    let h = harness(&tasks, &["es-04", "fr-00"]);

    let request = SessionRequest::new("languages", ["spanish", "french"], 4)
        .with_difficulty(Difficulty::Medium);
    let first = h.engine.create_session(request.clone()).await.unwrap();
    let second = h.engine.create_session(request).await.unwrap();

    assert_ne!(first.id(), second.id());
    assert_eq!(task_ids(&first), task_ids(&second));
    assert_eq!(task_ids(&first), vec!["es-04", "fr-00", "es-00", "es-01"]);
}

/// Serves a stale snapshot on reads so the version guard trips.
struct StaleReads {
    inner: InMemoryRepository,
    snapshot: Mutex<Option<PracticeSession>>,
}

#[async_trait::async_trait]
impl SessionRepository for StaleReads {
    async fn create_session(&self, draft: SessionDraft) -> Result<PracticeSession, StorageError> {
        let session = self.inner.create_session(draft).await?;
        *self.snapshot.lock().unwrap() = Some(session.clone());
        Ok(session)
    }

    async fn get_session(&self, _id: SessionId) -> Result<Option<PracticeSession>, StorageError> {
        Ok(self.snapshot.lock().unwrap().clone())
    }

    async fn update_session(
        &self,
        id: SessionId,
        patch: SessionPatch,
    ) -> Result<PracticeSession, StorageError> {
        self.inner.update_session(id, patch).await
    }
}

#[tokio::test]
async fn racing_writer_gets_a_conflict_instead_of_a_lost_update() {
    let repo = InMemoryRepository::with_seed(2);
    for (id, path) in as_refs(&spanish_pool(3)) {
        repo.insert_task(Task::new(id, path, Difficulty::Easy))
            .unwrap();
    }
    let sessions = Arc::new(StaleReads {
        inner: repo.clone(),
        snapshot: Mutex::new(None),
    });
    let repo = Arc::new(repo);
    let engine = SessionEngine::new(
        Clock::fixed(fixed_now()),
        sessions,
        repo.clone(),
        repo.clone(),
    );

    let id = engine
        .create_session(SessionRequest::new("languages", ["spanish"], 3))
        .await
        .unwrap()
        .id();

    engine
        .record_answer(id, true, Duration::from_secs(1))
        .await
        .unwrap();
    // The second writer still sees version 0.
    let err = engine
        .record_answer(id, false, Duration::from_secs(1))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::Storage(StorageError::Conflict)));

    let stored = repo.get_session(id).await.unwrap().unwrap();
    assert_eq!(stored.version(), 1);
    assert_eq!(stored.execution().completed_count(), 1);
}
