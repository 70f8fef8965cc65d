use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use tracing::{debug, warn};

use drill_core::model::{SessionConfiguration, TaskId};
use storage::repository::{SpacedRepetitionRepository, StorageError, TaskQuery, TaskRepository};

/// Selection result for a session build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionPlan {
    /// Review ids first, then fresh ids, each in the order its source returned.
    pub task_ids: Vec<TaskId>,
    pub review_selected: usize,
    pub fresh_selected: usize,
}

impl SessionPlan {
    /// Total number of tasks in this plan.
    #[must_use]
    pub fn total(&self) -> usize {
        self.task_ids.len()
    }

    /// Returns true when no tasks were selected for this session.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.task_ids.is_empty()
    }
}

/// Picks the tasks for a new session by blending due reviews with fresh tasks.
#[derive(Clone)]
pub struct TaskSelector {
    tasks: Arc<dyn TaskRepository>,
    reviews: Arc<dyn SpacedRepetitionRepository>,
    deterministic: bool,
}

impl TaskSelector {
    #[must_use]
    pub fn new(
        tasks: Arc<dyn TaskRepository>,
        reviews: Arc<dyn SpacedRepetitionRepository>,
    ) -> Self {
        Self {
            tasks,
            reviews,
            deterministic: false,
        }
    }

    /// Replace shuffling of fresh tasks with id order.
    #[must_use]
    pub fn with_deterministic(mut self, deterministic: bool) -> Self {
        self.deterministic = deterministic;
        self
    }

    /// Build a plan for `config` using reviews due at or before `now`.
    ///
    /// - With `include_review` off the spaced-repetition store is not queried.
    /// - Due items keep store order, are deduplicated, and are dropped when
    ///   their task is missing or belongs to a path outside the session.
    /// - The rest of `target_count` is filled from the task store, excluding
    ///   the accepted review ids. Repeats from the store's padding are kept.
    /// - If nothing is left once the reviews are excluded, the review ids are
    ///   cycled to fill the count.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` from either store unchanged.
    pub async fn select(
        &self,
        config: &SessionConfiguration,
        now: DateTime<Utc>,
    ) -> Result<SessionPlan, StorageError> {
        let target = usize::try_from(config.target_count()).unwrap_or(usize::MAX);

        let review_ids = if config.include_review() {
            self.due_reviews(config, target, now).await?
        } else {
            Vec::new()
        };

        let remaining = target.saturating_sub(review_ids.len());
        let mut fresh_ids: Vec<TaskId> = if remaining > 0 {
            let query = TaskQuery {
                learning_path_ids: Some(config.learning_path_ids().to_vec()),
                difficulty: config.difficulty(),
                exclude_ids: review_ids.iter().cloned().collect(),
                deterministic: self.deterministic,
            };
            self.tasks
                .get_random_tasks(remaining, &query)
                .await?
                .into_iter()
                .map(|task| task.id)
                .collect()
        } else {
            Vec::new()
        };

        // The reviews used up every matching task, so repeat them like the
        // store would pad a short pool.
        if remaining > 0 && fresh_ids.is_empty() && !review_ids.is_empty() {
            fresh_ids = review_ids.iter().cycle().take(remaining).cloned().collect();
        }

        debug!(
            review = review_ids.len(),
            fresh = fresh_ids.len(),
            target,
            "selected session tasks"
        );

        let review_selected = review_ids.len();
        let fresh_selected = fresh_ids.len();
        let mut task_ids = review_ids;
        task_ids.extend(fresh_ids);

        Ok(SessionPlan {
            task_ids,
            review_selected,
            fresh_selected,
        })
    }

    async fn due_reviews(
        &self,
        config: &SessionConfiguration,
        cap: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<TaskId>, StorageError> {
        let due = self.reviews.get_due(now).await?;

        let mut seen = HashSet::with_capacity(due.len());
        let candidates: Vec<TaskId> = due
            .into_iter()
            .map(|item| item.task_id)
            .filter(|id| seen.insert(id.clone()))
            .collect();

        // Lookups are independent, so they run concurrently; results keep input order.
        let resolved = try_join_all(candidates.iter().map(|id| self.tasks.get_task(id))).await?;

        let paths = config.learning_path_ids();
        let mut accepted = Vec::new();
        for (id, task) in candidates.into_iter().zip(resolved) {
            if accepted.len() >= cap {
                break;
            }
            match task {
                None => warn!(task_id = %id, "due review item has no task, skipping"),
                Some(task) if !task.belongs_to_any(paths) => {
                    debug!(task_id = %id, path = %task.learning_path_id, "due review item outside session paths");
                }
                Some(_) => accepted.push(id),
            }
        }
        Ok(accepted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use drill_core::model::{
        Difficulty, LearningPathId, SpacedRepetitionItem, Task, TopicId,
    };
    use drill_core::time::fixed_now;
    use storage::repository::InMemoryRepository;

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

    fn config(paths: &[&str], target: u32, include_review: bool) -> SessionConfiguration {
        SessionConfiguration::new(
            TopicId::new("languages"),
            paths.iter().map(|p| LearningPathId::new(*p)).collect(),
            target,
            include_review,
            None,
        )
        .unwrap()
    }

    fn setup(tasks: &[(&str, &str)], due: &[&str]) -> (TaskSelector, Arc<CountingReviews>) {
        let repo = InMemoryRepository::with_seed(11);
        for (id, path) in tasks {
            repo.insert_task(Task::new(*id, *path, Difficulty::Easy))
                .unwrap();
        }
        for (offset, id) in (0_i64..).zip(due) {
            let at = fixed_now() - chrono::Duration::minutes(offset + 1);
            repo.insert_review_item(SpacedRepetitionItem::new(*id, at))
                .unwrap();
        }
        let reviews = Arc::new(CountingReviews {
            inner: repo.clone(),
            calls: AtomicUsize::new(0),
        });
        let selector = TaskSelector::new(Arc::new(repo), reviews.clone()).with_deterministic(true);
        (selector, reviews)
    }

    fn ids(plan: &SessionPlan) -> Vec<&str> {
        plan.task_ids.iter().map(TaskId::as_str).collect()
    }

    #[tokio::test]
    async fn review_disabled_never_queries_spaced_repetition_store() {
        let (selector, reviews) = setup(
            &[
                ("a", "spanish"),
                ("b", "spanish"),
                ("c", "spanish"),
                ("d", "spanish"),
                ("e", "spanish"),
                ("f", "spanish"),
            ],
            &["a", "b"],
        );

        let plan = selector
            .select(&config(&["spanish"], 5, false), fixed_now())
            .await
            .unwrap();

        assert_eq!(reviews.calls.load(Ordering::SeqCst), 0);
        assert_eq!(plan.review_selected, 0);
        assert_eq!(plan.fresh_selected, 5);
        assert_eq!(ids(&plan), vec!["a", "b", "c", "d", "e"]);
    }

    #[tokio::test]
    async fn due_items_from_other_paths_do_not_leak() {
        let (selector, reviews) = setup(
            &[("taskA", "spanish"), ("taskB", "biology"), ("taskC", "spanish")],
            &["taskA", "taskB", "taskC"],
        );

        let plan = selector
            .select(&config(&["spanish"], 2, true), fixed_now())
            .await
            .unwrap();

        assert_eq!(reviews.calls.load(Ordering::SeqCst), 1);
        assert_eq!(ids(&plan), vec!["taskA", "taskC"]);
        assert_eq!(plan.review_selected, 2);
        assert_eq!(plan.fresh_selected, 0);
    }

    #[tokio::test]
    async fn reviews_come_first_and_fresh_tasks_exclude_them() {
        let (selector, _) = setup(
            &[("a", "spanish"), ("b", "spanish"), ("c", "spanish"), ("z", "spanish")],
            &["z", "b"],
        );

        let plan = selector
            .select(&config(&["spanish"], 4, true), fixed_now())
            .await
            .unwrap();

        assert_eq!(ids(&plan), vec!["z", "b", "a", "c"]);
        assert_eq!(plan.review_selected, 2);
        assert_eq!(plan.fresh_selected, 2);
    }

    #[tokio::test]
    async fn reviews_are_capped_at_target_and_missing_tasks_skipped() {
        let (selector, _) = setup(
            &[("a", "spanish"), ("b", "spanish"), ("c", "spanish")],
            &["gone", "c", "a", "b"],
        );

        let plan = selector
            .select(&config(&["spanish"], 2, true), fixed_now())
            .await
            .unwrap();

        assert_eq!(ids(&plan), vec!["c", "a"]);
        assert_eq!(plan.fresh_selected, 0);
    }

    #[tokio::test]
    async fn short_pool_is_padded_by_the_store() {
        let (selector, _) = setup(&[("a", "spanish"), ("b", "spanish")], &[]);

        let plan = selector
            .select(&config(&["spanish"], 5, false), fixed_now())
            .await
            .unwrap();

        assert_eq!(ids(&plan), vec!["a", "b", "a", "b", "a"]);
    }

    #[tokio::test]
    async fn reviews_that_exhaust_the_pool_are_cycled_to_target() {
        let (selector, _) = setup(&[("a", "spanish"), ("b", "spanish")], &["a", "b"]);

        let plan = selector
            .select(&config(&["spanish"], 5, true), fixed_now())
            .await
            .unwrap();

        assert_eq!(ids(&plan), vec!["a", "b", "a", "b", "a"]);
        assert_eq!(plan.review_selected, 2);
        assert_eq!(plan.fresh_selected, 3);
    }

    #[tokio::test]
    async fn no_matching_tasks_gives_empty_plan() {
        let (selector, _) = setup(&[("a", "biology")], &["a"]);

        let plan = selector
            .select(&config(&["spanish"], 3, true), fixed_now())
            .await
            .unwrap();

        assert!(plan.is_empty());
        assert_eq!(plan.total(), 0);
    }

    #[tokio::test]
    async fn deterministic_selection_is_repeatable() {
        let (selector, _) = setup(
            &[
                ("e", "spanish"),
                ("a", "french"),
                ("d", "spanish"),
                ("b", "french"),
                ("c", "spanish"),
            ],
            &["d"],
        );
        let cfg = config(&["spanish", "french"], 4, true);

        let first = selector.select(&cfg, fixed_now()).await.unwrap();
        let second = selector.select(&cfg, fixed_now()).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(ids(&first), vec!["d", "a", "b", "c"]);
    }
}
