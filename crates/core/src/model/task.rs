use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::model::ids::{LearningPathId, TaskId};

//
// ─── DIFFICULTY ────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown difficulty: {0}")]
pub struct DifficultyParseError(pub String);

/// Coarse difficulty band a task is authored at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Difficulty {
    type Err = DifficultyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            other => Err(DifficultyParseError(other.to_owned())),
        }
    }
}

//
// ─── TASK ──────────────────────────────────────────────────────────────────────
//

/// A single drill item.
///
/// The session engine only looks at the id, the owning learning path and the
/// difficulty; prompt/answer content lives with whatever renders the task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub learning_path_id: LearningPathId,
    pub difficulty: Difficulty,
}

impl Task {
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        learning_path_id: impl Into<String>,
        difficulty: Difficulty,
    ) -> Self {
        Self {
            id: TaskId::new(id),
            learning_path_id: LearningPathId::new(learning_path_id),
            difficulty,
        }
    }

    /// Returns true if the task belongs to one of the given learning paths.
    #[must_use]
    pub fn belongs_to_any(&self, paths: &[LearningPathId]) -> bool {
        paths.contains(&self.learning_path_id)
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
