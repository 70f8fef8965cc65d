use std::sync::Arc;

use storage::repository::{
    InMemoryRepository, SessionRepository, SpacedRepetitionRepository, Storage, TaskRepository,
};
use storage::retry::{RetryPolicy, RetryingRepository};

use crate::Clock;
use crate::config::EngineSettings;
use crate::error::AppServicesError;
use crate::sessions::SessionEngine;

/// Assembles the session engine over retry-wrapped stores.
#[derive(Clone)]
pub struct AppServices {
    storage: Storage,
    engine: Arc<SessionEngine>,
}

impl AppServices {
    /// Build services from loaded settings.
    ///
    /// `SQLite` is used when `database_url` is set, otherwise an in-memory store.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if the database cannot be opened or migrated.
    pub async fn from_settings(
        settings: &EngineSettings,
        clock: Clock,
    ) -> Result<Self, AppServicesError> {
        let storage = match &settings.database_url {
            Some(url) => Storage::sqlite(url, settings.selection_seed).await?,
            None => {
                let repo = match settings.selection_seed {
                    Some(seed) => InMemoryRepository::with_seed(seed),
                    None => InMemoryRepository::new(),
                };
                Storage::from_repository(repo)
            }
        };
        Ok(Self::from_storage(
            storage,
            &settings.retry.to_policy(),
            clock,
            settings.deterministic,
        ))
    }

    /// Load settings from `path` and the environment, then build services.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if settings are malformed or storage setup fails.
    pub async fn load(path: Option<&str>, clock: Clock) -> Result<Self, AppServicesError> {
        let settings = EngineSettings::load(path)?;
        Self::from_settings(&settings, clock).await
    }

    /// Wrap every store of `storage` with `policy` and build the engine.
    #[must_use]
    pub fn from_storage(
        storage: Storage,
        policy: &RetryPolicy,
        clock: Clock,
        deterministic: bool,
    ) -> Self {
        let sessions: Arc<dyn SessionRepository> = Arc::new(RetryingRepository::new(
            storage.sessions,
            policy.clone(),
        ));
        let tasks: Arc<dyn TaskRepository> =
            Arc::new(RetryingRepository::new(storage.tasks, policy.clone()));
        let reviews: Arc<dyn SpacedRepetitionRepository> =
            Arc::new(RetryingRepository::new(storage.reviews, policy.clone()));

        let engine = SessionEngine::new(
            clock,
            Arc::clone(&sessions),
            Arc::clone(&tasks),
            Arc::clone(&reviews),
        )
        .with_deterministic(deterministic);

        Self {
            storage: Storage {
                sessions,
                tasks,
                reviews,
            },
            engine: Arc::new(engine),
        }
    }

    #[must_use]
    pub fn engine(&self) -> Arc<SessionEngine> {
        Arc::clone(&self.engine)
    }

    /// The retry-wrapped stores the engine runs against.
    #[must_use]
    pub fn storage(&self) -> &Storage {
        &self.storage
    }
}
