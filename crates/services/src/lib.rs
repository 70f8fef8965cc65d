#![forbid(unsafe_code)]

pub mod app_services;
pub mod config;
pub mod error;
pub mod sessions;

pub use drill_core::Clock;

pub use app_services::AppServices;
pub use config::{EngineSettings, RetrySettings};
pub use error::{AppServicesError, SessionError};
pub use sessions::{SessionEngine, SessionPlan, SessionProgress, SessionRequest, TaskSelector};
