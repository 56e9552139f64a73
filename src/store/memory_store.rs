//! In-memory session store

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::types::{Result, SessionRecord, SessionSummary, WorkerError};

use super::{
    SessionStore, check_update, require_lookup_id, resolve_prefix, sort_and_limit,
    validate_session_id,
};

/// Session store backed by a concurrent map; contents die with the process
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    records: DashMap<String, SessionRecord>,
}

impl MemorySessionStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
        }
    }
}

impl SessionStore for MemorySessionStore {
    fn create(&self, record: &SessionRecord) -> Result<String> {
        validate_session_id(&record.id)?;
        match self.records.entry(record.id.clone()) {
            Entry::Occupied(_) => Err(WorkerError::session_already_exists(&record.id)),
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
                Ok(record.id.clone())
            }
        }
    }

    fn get(&self, id: &str) -> Result<SessionRecord> {
        require_lookup_id(id)?;
        self.records
            .get(id)
            .map(|r| r.value().clone())
            .ok_or_else(|| WorkerError::session_not_found(id))
    }

    fn resolve(&self, id_or_prefix: &str) -> Result<String> {
        require_lookup_id(id_or_prefix)?;
        if self.records.contains_key(id_or_prefix) {
            return Ok(id_or_prefix.to_string());
        }
        let ids: Vec<String> = self.records.iter().map(|r| r.key().clone()).collect();
        resolve_prefix(id_or_prefix, ids)
    }

    fn list(&self, limit: Option<usize>) -> Result<Vec<SessionSummary>> {
        let mut summaries: Vec<SessionSummary> =
            self.records.iter().map(|r| r.value().summary()).collect();
        sort_and_limit(&mut summaries, limit);
        Ok(summaries)
    }

    fn update(
        &self,
        id: &str,
        mutator: &mut dyn FnMut(&mut SessionRecord),
    ) -> Result<SessionRecord> {
        require_lookup_id(id)?;
        let mut entry = self
            .records
            .get_mut(id)
            .ok_or_else(|| WorkerError::session_not_found(id))?;
        let mut after = entry.value().clone();
        mutator(&mut after);
        check_update(entry.value(), &after)?;
        *entry.value_mut() = after.clone();
        Ok(after)
    }

    fn delete(&self, id: &str) -> Result<bool> {
        if validate_session_id(id).is_err() {
            return Ok(false);
        }
        Ok(self.records.remove(id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::{completed_turn, record};
    use chrono::{Duration, Utc};

    #[test]
    fn test_round_trip_and_delete() {
        let store = MemorySessionStore::new();
        assert!(store.list(None).unwrap().is_empty());

        store.create(&record("s1", Utc::now())).unwrap();
        assert_eq!(store.list(None).unwrap().len(), 1);
        assert_eq!(store.get("s1").unwrap().id, "s1");
        assert!(store.create(&record("s1", Utc::now())).is_err());

        assert!(store.delete("s1").unwrap());
        assert!(!store.delete("s1").unwrap());
    }

    #[test]
    fn test_update_and_list_order() {
        let store = MemorySessionStore::new();
        let base = Utc::now();
        store.create(&record("a", base)).unwrap();
        store.create(&record("b", base + Duration::seconds(1))).unwrap();

        store
            .update("a", &mut |rec| {
                rec.append_turn(completed_turn("more", base + Duration::seconds(2)));
            })
            .unwrap();

        let list = store.list(None).unwrap();
        assert_eq!(list[0].session_id, "a");
        assert_eq!(list[0].turns, 2);
        assert_eq!(store.list(Some(1)).unwrap().len(), 1);
    }

    #[test]
    fn test_malformed_ids_read_as_missing() {
        let store = MemorySessionStore::new();
        assert!(matches!(
            store.get("no such id!"),
            Err(WorkerError::SessionNotFound(_))
        ));
        assert!(!store.delete("no such id!").unwrap());
        assert!(matches!(
            store.create(&record("bad id", Utc::now())),
            Err(WorkerError::InvalidSessionId(_))
        ));
    }

    #[test]
    fn test_update_rejects_shrinking_transcript() {
        let store = MemorySessionStore::new();
        store.create(&record("a", Utc::now())).unwrap();

        let err = store
            .update("a", &mut |rec| rec.transcript.clear())
            .unwrap_err();
        assert!(matches!(err, WorkerError::InvariantViolation(_)));
        assert_eq!(store.get("a").unwrap().transcript.len(), 1);
    }
}
