//! Deciding whether a step has already been completed.

use std::path::Path;

/// Whether the marker or artifact at `path` exists.
///
/// Existence alone is the completion predicate: a partial artifact left at
/// exactly this path by an earlier crash is taken as complete.
pub fn already_completed<P: AsRef<Path>>(path: P, description: &str) -> bool {
    let done = path.as_ref().exists();
    if done {
        tracing::info!(
            "{} already completed ({:?} exists), skipping",
            description,
            path.as_ref()
        );
    }
    done
}
