//! File-backed session store
//!
//! Layout: `<dir>/<id>.json`, one self-contained record per file. Every
//! write goes to a temp file in the same directory and is renamed over the
//! target, so a crash never leaves a partial record behind.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::types::{Result, SessionRecord, SessionSummary, WorkerError};

use super::{
    SessionStore, check_update, require_lookup_id, resolve_prefix, sort_and_limit,
    validate_session_id,
};

const RECORD_EXTENSION: &str = "json";

/// Session store keeping one JSON file per session
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    dir: PathBuf,
}

impl FileSessionStore {
    /// Open (and create if needed) a store rooted at `dir`
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        tracing::debug!("Session store at {:?}", dir);
        Ok(Self { dir })
    }

    /// Directory holding the records
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.{RECORD_EXTENSION}"))
    }

    /// Ids of every record file, without reading them
    fn ids(&self) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if validate_session_id(stem).is_ok() {
                    ids.push(stem.to_string());
                }
            }
        }
        Ok(ids)
    }

    fn read_record(&self, id: &str) -> Result<SessionRecord> {
        let content = match fs::read_to_string(self.path_for(id)) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(WorkerError::session_not_found(id));
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_str(&content)?)
    }

    /// Serialize into a temp file next to the target, synced to disk
    fn write_temp(&self, record: &SessionRecord) -> Result<NamedTempFile> {
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        serde_json::to_writer_pretty(&mut tmp, record)?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        Ok(tmp)
    }

    fn replace(&self, record: &SessionRecord) -> Result<()> {
        let tmp = self.write_temp(record)?;
        tmp.persist(self.path_for(&record.id))
            .map_err(|e| WorkerError::Io(e.error))?;
        Ok(())
    }
}

impl SessionStore for FileSessionStore {
    fn create(&self, record: &SessionRecord) -> Result<String> {
        validate_session_id(&record.id)?;
        let tmp = self.write_temp(record)?;
        match tmp.persist_noclobber(self.path_for(&record.id)) {
            Ok(_) => {
                tracing::debug!(session_id = %record.id, "Created session record");
                Ok(record.id.clone())
            }
            Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => {
                Err(WorkerError::session_already_exists(&record.id))
            }
            Err(e) => Err(WorkerError::Io(e.error)),
        }
    }

    fn get(&self, id: &str) -> Result<SessionRecord> {
        require_lookup_id(id)?;
        self.read_record(id)
    }

    fn resolve(&self, id_or_prefix: &str) -> Result<String> {
        require_lookup_id(id_or_prefix)?;
        if self.path_for(id_or_prefix).is_file() {
            return Ok(id_or_prefix.to_string());
        }
        resolve_prefix(id_or_prefix, self.ids()?)
    }

    fn list(&self, limit: Option<usize>) -> Result<Vec<SessionSummary>> {
        let mut summaries = Vec::new();
        for id in self.ids()? {
            match self.read_record(&id) {
                Ok(record) => summaries.push(record.summary()),
                Err(e) => tracing::warn!(session_id = %id, "Skipping unreadable session record: {}", e),
            }
        }
        sort_and_limit(&mut summaries, limit);
        Ok(summaries)
    }

    fn update(
        &self,
        id: &str,
        mutator: &mut dyn FnMut(&mut SessionRecord),
    ) -> Result<SessionRecord> {
        let before = self.get(id)?;
        let mut after = before.clone();
        mutator(&mut after);
        check_update(&before, &after)?;
        self.replace(&after)?;
        tracing::debug!(session_id = %id, turns = after.transcript.len(), "Updated session record");
        Ok(after)
    }

    fn delete(&self, id: &str) -> Result<bool> {
        if validate_session_id(id).is_err() {
            return Ok(false);
        }
        match fs::remove_file(self.path_for(id)) {
            Ok(()) => {
                tracing::debug!(session_id = %id, "Deleted session record");
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::{completed_turn, record};
    use crate::types::SessionStatus;
    use chrono::{Duration, Utc};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn store() -> (TempDir, FileSessionStore) {
        let dir = TempDir::new().unwrap();
        let store = FileSessionStore::open(dir.path().join("sessions")).unwrap();
        (dir, store)
    }

    #[test]
    fn test_create_and_get() {
        let (_dir, store) = store();
        let rec = record("s1", Utc::now());

        assert_eq!(store.create(&rec).unwrap(), "s1");
        assert_eq!(store.get("s1").unwrap(), rec);
        assert!(store.dir().join("s1.json").is_file());
    }

    #[test]
    fn test_create_does_not_clobber() {
        let (_dir, store) = store();
        store.create(&record("s1", Utc::now())).unwrap();

        let err = store.create(&record("s1", Utc::now())).unwrap_err();
        assert!(matches!(err, WorkerError::SessionAlreadyExists(_)));
    }

    #[test]
    fn test_get_missing() {
        let (_dir, store) = store();
        assert!(matches!(
            store.get("nope"),
            Err(WorkerError::SessionNotFound(_))
        ));
        assert!(matches!(
            store.get("../escape"),
            Err(WorkerError::SessionNotFound(_))
        ));
        assert!(matches!(
            store.resolve("no such id!"),
            Err(WorkerError::SessionNotFound(_))
        ));
    }

    #[test]
    fn test_malformed_ids() {
        let (_dir, store) = store();
        fs::write(store.dir().parent().unwrap().join("outside.json"), "{}").unwrap();

        assert!(!store.delete("no such id!").unwrap());
        assert!(!store.delete("../outside").unwrap());
        assert!(store.dir().parent().unwrap().join("outside.json").is_file());

        let err = store.create(&record("bad id", Utc::now())).unwrap_err();
        assert!(matches!(err, WorkerError::InvalidSessionId(_)));
    }

    #[test]
    fn test_list_most_recent_first_with_limit() {
        let (_dir, store) = store();
        let base = Utc::now();
        store.create(&record("old", base)).unwrap();
        store
            .create(&record("new", base + Duration::seconds(10)))
            .unwrap();
        store
            .create(&record("mid", base + Duration::seconds(5)))
            .unwrap();

        let ids: Vec<String> = store
            .list(None)
            .unwrap()
            .into_iter()
            .map(|s| s.session_id)
            .collect();
        assert_eq!(ids, vec!["new", "mid", "old"]);

        let limited = store.list(Some(2)).unwrap();
        assert_eq!(limited.len(), 2);
        assert_eq!(limited[0].session_id, "new");
    }

    #[test]
    fn test_list_skips_corrupt_and_foreign_files() {
        let (_dir, store) = store();
        store.create(&record("good", Utc::now())).unwrap();
        fs::write(store.dir().join("broken.json"), "{ not json").unwrap();
        fs::write(store.dir().join("notes.txt"), "hello").unwrap();

        let list = store.list(None).unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].session_id, "good");
    }

    #[test]
    fn test_update_appends_and_persists() {
        let (_dir, store) = store();
        let start = Utc::now();
        store.create(&record("s1", start)).unwrap();

        let later = start + Duration::seconds(3);
        let updated = store
            .update("s1", &mut |rec| {
                rec.append_turn(completed_turn("follow up", later));
            })
            .unwrap();

        assert_eq!(updated.transcript.len(), 2);
        let reloaded = store.get("s1").unwrap();
        assert_eq!(reloaded, updated);
        assert_eq!(reloaded.updated_at, later);
        assert_eq!(reloaded.status, SessionStatus::Completed);
    }

    #[test]
    fn test_update_rejects_invariant_violation() {
        let (_dir, store) = store();
        let rec = record("s1", Utc::now());
        store.create(&rec).unwrap();

        let err = store
            .update("s1", &mut |rec| {
                rec.working_directory = "/elsewhere".into();
            })
            .unwrap_err();

        assert!(matches!(err, WorkerError::InvariantViolation(_)));
        assert_eq!(store.get("s1").unwrap(), rec);
    }

    #[test]
    fn test_update_missing() {
        let (_dir, store) = store();
        let err = store.update("ghost", &mut |_| {}).unwrap_err();
        assert!(matches!(err, WorkerError::SessionNotFound(_)));
    }

    #[test]
    fn test_delete_twice() {
        let (_dir, store) = store();
        store.create(&record("s1", Utc::now())).unwrap();

        assert!(store.delete("s1").unwrap());
        assert!(!store.delete("s1").unwrap());
        assert!(matches!(
            store.get("s1"),
            Err(WorkerError::SessionNotFound(_))
        ));
    }

    #[test]
    fn test_resolve_prefix_and_exact() {
        let (_dir, store) = store();
        let now = Utc::now();
        store.create(&record("abc", now)).unwrap();
        store.create(&record("abc123", now)).unwrap();
        store.create(&record("xyz789", now)).unwrap();

        assert_eq!(store.resolve("abc").unwrap(), "abc");
        assert_eq!(store.resolve("xyz").unwrap(), "xyz789");
        assert!(matches!(
            store.resolve("ab"),
            Err(WorkerError::AmbiguousSession { count: 2, .. })
        ));
        assert!(matches!(
            store.resolve("qqq"),
            Err(WorkerError::SessionNotFound(_))
        ));
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let (_dir, store) = store();
        store.create(&record("s1", Utc::now())).unwrap();
        store
            .update("s1", &mut |rec| {
                rec.append_turn(completed_turn("again", Utc::now()));
            })
            .unwrap();

        let names: Vec<String> = fs::read_dir(store.dir())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["s1.json".to_string()]);
    }
}
