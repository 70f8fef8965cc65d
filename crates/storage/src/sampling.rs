//! Ordering and padding policy shared by the task store adapters.

use drill_core::model::Task;
use rand::Rng;
use rand::seq::SliceRandom;

/// Order already-filtered `candidates` and take `count` of them.
///
/// - `deterministic` sorts by task id; otherwise the candidates are shuffled
///   with `rng` (Fisher–Yates).
/// - With fewer candidates than `count`, the ordered candidates are repeated
///   round-robin until `count` is reached.
/// - No candidates gives an empty result.
pub fn sample_tasks<R: Rng + ?Sized>(
    mut candidates: Vec<Task>,
    count: usize,
    deterministic: bool,
    rng: &mut R,
) -> Vec<Task> {
    if count == 0 || candidates.is_empty() {
        return Vec::new();
    }

    if deterministic {
        candidates.sort_by(|a, b| a.id.cmp(&b.id));
    } else {
        candidates.shuffle(rng);
    }

    if candidates.len() >= count {
        candidates.truncate(count);
        return candidates;
    }

    candidates.iter().cycle().take(count).cloned().collect()
}
