//! SessionRecord store
//!
//! Durable mapping from session id to [`SessionRecord`]. The store knows
//! nothing about processes; the Session Manager is its only writer.
//!
//! Two implementations:
//! - [`FileSessionStore`]: one JSON file per session, atomic replace on write
//! - [`MemorySessionStore`]: in-process map, for embedding and tests

mod file_store;
mod memory_store;

use std::fmt::Debug;

use crate::types::{Result, SessionRecord, SessionSummary, WorkerError};

pub use file_store::FileSessionStore;
pub use memory_store::MemorySessionStore;

/// Longest accepted session id
pub const MAX_SESSION_ID_LEN: usize = 128;

/// Persistence contract for session records
pub trait SessionStore: Send + Sync + Debug {
    /// Persist a new record and return its id
    ///
    /// Fails with `SessionAlreadyExists` rather than overwriting.
    fn create(&self, record: &SessionRecord) -> Result<String>;

    /// Load a record by exact id
    fn get(&self, id: &str) -> Result<SessionRecord>;

    /// Resolve an exact id or a unique id prefix to a full id
    fn resolve(&self, id_or_prefix: &str) -> Result<String>;

    /// Summaries ordered most-recent-first, truncated to `limit`
    fn list(&self, limit: Option<usize>) -> Result<Vec<SessionSummary>>;

    /// Apply `mutator` to a record and persist the result
    ///
    /// Rejects mutations that change `id`, `working_directory` or
    /// `created_at`, or that rewrite or drop existing turns.
    fn update(
        &self,
        id: &str,
        mutator: &mut dyn FnMut(&mut SessionRecord),
    ) -> Result<SessionRecord>;

    /// Remove a record; `false` when it did not exist
    fn delete(&self, id: &str) -> Result<bool>;
}

/// Check that an id is non-empty and only uses `[A-Za-z0-9_-]`
pub fn validate_session_id(id: &str) -> Result<()> {
    let valid = !id.is_empty()
        && id.len() <= MAX_SESSION_ID_LEN
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
    if valid {
        Ok(())
    } else {
        Err(WorkerError::InvalidSessionId(id.to_string()))
    }
}

/// Lookup form of [`validate_session_id`]
///
/// No record can carry a malformed id, so it reads as `SessionNotFound`.
pub(crate) fn require_lookup_id(id: &str) -> Result<()> {
    validate_session_id(id).map_err(|_| WorkerError::session_not_found(id))
}

/// Verify an update kept the record's immutable parts intact
pub(crate) fn check_update(before: &SessionRecord, after: &SessionRecord) -> Result<()> {
    if after.id != before.id {
        return Err(WorkerError::invariant(format!(
            "id changed from {} to {}",
            before.id, after.id
        )));
    }
    if after.working_directory != before.working_directory {
        return Err(WorkerError::invariant(format!(
            "working_directory of {} cannot change",
            before.id
        )));
    }
    if after.created_at != before.created_at {
        return Err(WorkerError::invariant(format!(
            "created_at of {} cannot change",
            before.id
        )));
    }
    let kept = before.transcript.len();
    if after.transcript.len() < kept || after.transcript[..kept] != before.transcript[..] {
        return Err(WorkerError::invariant(format!(
            "transcript of {} is append-only",
            before.id
        )));
    }
    Ok(())
}

/// Pick the single id matching `prefix` among `ids`
pub(crate) fn resolve_prefix<I>(prefix: &str, ids: I) -> Result<String>
where
    I: IntoIterator<Item = String>,
{
    let mut matches: Vec<String> = ids.into_iter().filter(|id| id.starts_with(prefix)).collect();
    match matches.len() {
        0 => Err(WorkerError::session_not_found(prefix)),
        1 => Ok(matches.remove(0)),
        count => Err(WorkerError::AmbiguousSession {
            prefix: prefix.to_string(),
            count,
        }),
    }
}

/// Order summaries most-recent-first and apply the limit
pub(crate) fn sort_and_limit(summaries: &mut Vec<SessionSummary>, limit: Option<usize>) {
    summaries.sort_by(|a, b| {
        b.updated_at
            .cmp(&a.updated_at)
            .then_with(|| b.created_at.cmp(&a.created_at))
            .then_with(|| a.session_id.cmp(&b.session_id))
    });
    if let Some(limit) = limit {
        summaries.truncate(limit);
    }
}
