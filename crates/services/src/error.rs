//! Shared error types for the services crate.

use thiserror::Error;

use drill_core::model::{
    SessionAction, SessionConfigError, SessionId, SessionStatus, TransitionError,
};
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors emitted by `SessionEngine`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    #[error("session {0} not found")]
    NotFound(SessionId),
    #[error("cannot {action} session {id} while it is {status}")]
    InvalidState {
        id: SessionId,
        action: SessionAction,
        status: SessionStatus,
    },
    #[error("session {0} has no remaining tasks")]
    NoRemainingTasks(SessionId),
    #[error(transparent)]
    InvalidRequest(#[from] SessionConfigError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl SessionError {
    /// Attach the session id to a rejected transition.
    #[must_use]
    pub fn from_transition(id: SessionId, err: TransitionError) -> Self {
        match err {
            TransitionError::Illegal { action, status } => {
                SessionError::InvalidState { id, action, status }
            }
            TransitionError::NoRemainingTasks { .. } => SessionError::NoRemainingTasks(id),
        }
    }
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Config(#[from] config::ConfigError),
}
