//! File-backed cron job store.
//!
//! The store is a single JSON document shared with other writers (the cron
//! executor, operator tooling). Every read-modify-write happens under a
//! sibling `.lock` file and the document is replaced atomically via a temp
//! file and rename, so a crash mid-write never leaves a torn store behind.
//!
//! Jobs are kept as raw JSON values. Only the `id` of another writer's job
//! is ever looked at, so jobs this crate cannot model are carried through
//! untouched and never block a write.

use crate::error::{ConsolidationError, Result};
use crate::scheduler::jobs::{CronJob, now_epoch_millis};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, warn};
use uuid::Uuid;

/// Lock files older than this are assumed abandoned by a crashed writer.
const STALE_LOCK_AFTER: Duration = Duration::from_secs(30);

fn default_store_version() -> u8 {
    1
}

/// Persisted job collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CronStore {
    /// Schema version.
    #[serde(default = "default_store_version")]
    pub version: u8,
    #[serde(default)]
    pub jobs: Vec<serde_json::Value>,
    /// Top-level fields written by other store users.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Default for CronStore {
    fn default() -> Self {
        Self {
            version: default_store_version(),
            jobs: Vec::new(),
            extra: serde_json::Map::new(),
        }
    }
}

/// The `id` of a stored job, if it has a string one.
#[must_use]
pub fn job_id(job: &serde_json::Value) -> Option<&str> {
    job.get("id")?.as_str()
}

impl CronStore {
    /// Replace any job with the same id, then append `job`.
    ///
    /// Returns `true` when a previous job was removed.
    pub fn upsert(&mut self, job: &CronJob) -> Result<bool> {
        let value = serde_json::to_value(job).map_err(|e| {
            ConsolidationError::Persistence(format!("cannot serialize job {}: {e}", job.id))
        })?;
        let before = self.jobs.len();
        self.jobs
            .retain(|existing| job_id(existing) != Some(job.id.as_str()));
        let replaced = self.jobs.len() != before;
        self.jobs.push(value);
        Ok(replaced)
    }
}

/// Result of an upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpsertOutcome {
    /// A job with the same id was removed first.
    pub replaced: bool,
    /// Jobs in the store after the write.
    pub total_jobs: usize,
}

/// Load the store at `path`. A missing file is an empty store.
pub fn load_store(path: &Path) -> Result<CronStore> {
    let bytes = match std::fs::read(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(CronStore::default());
        }
        Err(e) => {
            return Err(ConsolidationError::Persistence(format!(
                "cannot read cron store {}: {e}",
                path.display()
            )));
        }
    };

    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(CronStore::default());
    }

    serde_json::from_slice(&bytes).map_err(|e| {
        ConsolidationError::Persistence(format!("cannot parse cron store {}: {e}", path.display()))
    })
}

/// Atomically replace the store at `path` with `store`.
pub fn save_store(path: &Path, store: &CronStore) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            ConsolidationError::Persistence(format!("cannot create cron store dir: {e}"))
        })?;
    }

    let json = serde_json::to_string_pretty(store)
        .map_err(|e| ConsolidationError::Persistence(format!("cannot serialize cron store: {e}")))?;

    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, json).map_err(|e| {
        ConsolidationError::Persistence(format!("cannot write cron store temp file: {e}"))
    })?;
    std::fs::rename(&tmp_path, path).map_err(|e| {
        let _ = std::fs::remove_file(&tmp_path);
        ConsolidationError::Persistence(format!("cannot finalize cron store: {e}"))
    })?;
    Ok(())
}

/// Insert `job`, replacing any job with the same id, under the store lock.
pub fn upsert_job(path: &Path, job: CronJob, lock_timeout: Duration) -> Result<UpsertOutcome> {
    let _guard = StoreLockGuard::acquire(path, lock_timeout)?;

    let mut store = load_store(path)?;
    let replaced = store.upsert(&job)?;
    save_store(path, &store)?;

    debug!(job_id = %job.id, replaced, total = store.jobs.len(), "cron job upserted");
    Ok(UpsertOutcome {
        replaced,
        total_jobs: store.jobs.len(),
    })
}

/// Anything that can durably accept a consolidation job.
pub trait JobStore: Send + Sync {
    /// Insert `job`, replacing any job with the same id.
    fn upsert(&self, job: CronJob) -> Result<UpsertOutcome>;
}

/// [`JobStore`] backed by a JSON file.
#[derive(Debug, Clone)]
pub struct FileJobStore {
    path: PathBuf,
    lock_timeout: Duration,
}

impl FileJobStore {
    #[must_use]
    pub fn new(path: PathBuf, lock_timeout: Duration) -> Self {
        Self { path, lock_timeout }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl JobStore for FileJobStore {
    fn upsert(&self, job: CronJob) -> Result<UpsertOutcome> {
        upsert_job(&self.path, job, self.lock_timeout)
    }
}

/// Exclusive lock on a store, released on drop.
///
/// The lock file holds a per-acquisition token. Release and stale eviction
/// only delete the file while it still holds the token they expect, so a
/// slow waiter never removes a lock that was re-created in the meantime.
struct StoreLockGuard {
    path: PathBuf,
    token: String,
}

impl StoreLockGuard {
    fn acquire(store_path: &Path, timeout: Duration) -> Result<Self> {
        let lock_path = store_path.with_extension("lock");
        if let Some(parent) = lock_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ConsolidationError::Persistence(format!("cannot create cron store lock dir: {e}"))
            })?;
        }

        let token = format!("{}:{}", Uuid::new_v4(), now_epoch_millis());
        let started = Instant::now();
        loop {
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&lock_path)
            {
                Ok(mut file) => {
                    if let Err(e) = file.write_all(token.as_bytes()).and_then(|()| file.sync_all()) {
                        let _ = std::fs::remove_file(&lock_path);
                        return Err(ConsolidationError::Persistence(format!(
                            "cannot write cron store lock {}: {e}",
                            lock_path.display()
                        )));
                    }
                    return Ok(Self {
                        path: lock_path,
                        token,
                    });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    evict_stale_lock(&lock_path);
                    if started.elapsed() > timeout {
                        return Err(ConsolidationError::Persistence(format!(
                            "timed out waiting for cron store lock {}",
                            lock_path.display()
                        )));
                    }
                    std::thread::sleep(Duration::from_millis(2));
                }
                Err(e) => {
                    return Err(ConsolidationError::Persistence(format!(
                        "cannot create cron store lock {}: {e}",
                        lock_path.display()
                    )));
                }
            }
        }
    }
}

impl Drop for StoreLockGuard {
    fn drop(&mut self) {
        if !remove_if_holds(&self.path, &self.token) {
            warn!(
                lock = %self.path.display(),
                "cron store lock no longer ours at release; left in place"
            );
        }
    }
}

/// Delete `lock_path` if it currently contains exactly `token`.
fn remove_if_holds(lock_path: &Path, token: &str) -> bool {
    match std::fs::read_to_string(lock_path) {
        Ok(current) if current == token => std::fs::remove_file(lock_path).is_ok(),
        _ => false,
    }
}

fn evict_stale_lock(lock_path: &Path) {
    let Ok(observed) = std::fs::read_to_string(lock_path) else {
        return;
    };
    let Ok(metadata) = std::fs::metadata(lock_path) else {
        return;
    };
    let Ok(modified) = metadata.modified() else {
        return;
    };
    let Ok(age) = SystemTime::now().duration_since(modified) else {
        return;
    };

    if age > STALE_LOCK_AFTER && remove_if_holds(lock_path, &observed) {
        warn!(
            lock = %lock_path.display(),
            age_secs = age.as_secs(),
            "evicted stale cron store lock"
        );
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::scheduler::jobs::{DeliveryMode, JobPayload, consolidation_job_id};
    use serde_json::json;
    use std::sync::Arc;

    const LOCK_TIMEOUT: Duration = Duration::from_millis(500);

    fn job(session_id: &str, message: &str) -> CronJob {
        CronJob::run_once_now(
            consolidation_job_id(session_id),
            format!("Memory consolidation ({session_id})"),
            JobPayload::agent_turn(message),
            DeliveryMode::None,
            now_epoch_millis(),
        )
    }

    fn find<'a>(store: &'a CronStore, id: &str) -> Option<&'a serde_json::Value> {
        store.jobs.iter().find(|j| job_id(j) == Some(id))
    }

    fn seed(path: &Path, store: serde_json::Value) {
        std::fs::write(path, serde_json::to_string_pretty(&store).unwrap()).unwrap();
    }

    #[test]
    fn missing_or_blank_file_is_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.json");
        assert!(load_store(&path).unwrap().jobs.is_empty());

        std::fs::write(&path, "  \n").unwrap();
        assert!(load_store(&path).unwrap().jobs.is_empty());
    }

    #[test]
    fn corrupt_file_is_persistence_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.json");
        std::fs::write(&path, "{not json").unwrap();

        let err = load_store(&path).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Persistence);
    }

    #[test]
    fn upsert_twice_keeps_one_job_with_latest_payload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cron").join("jobs.json");

        let first = upsert_job(&path, job("s1", "first"), LOCK_TIMEOUT).unwrap();
        assert!(!first.replaced);
        let second = upsert_job(&path, job("s1", "second"), LOCK_TIMEOUT).unwrap();
        assert!(second.replaced);
        assert_eq!(second.total_jobs, 1);

        let store = load_store(&path).unwrap();
        let matching: Vec<_> = store
            .jobs
            .iter()
            .filter(|j| job_id(j) == Some("memory-consolidation-s1"))
            .collect();
        assert_eq!(matching.len(), 1);
        assert_eq!(matching[0]["payload"]["message"], "second");
    }

    #[test]
    fn upsert_preserves_other_jobs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.json");

        upsert_job(&path, job("a", "a"), LOCK_TIMEOUT).unwrap();
        upsert_job(&path, job("b", "b"), LOCK_TIMEOUT).unwrap();
        upsert_job(&path, job("a", "a2"), LOCK_TIMEOUT).unwrap();

        let store = load_store(&path).unwrap();
        assert_eq!(store.jobs.len(), 2);
        assert_eq!(find(&store, "memory-consolidation-b").unwrap()["payload"]["message"], "b");
        assert_eq!(find(&store, "memory-consolidation-a").unwrap()["payload"]["message"], "a2");
    }

    #[test]
    fn foreign_nested_fields_survive_upsert() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.json");
        let foreign = json!({
            "id": "reminder",
            "name": "Reminder",
            "enabled": true,
            "createdAtMs": 1,
            "updatedAtMs": 1,
            "schedule": {"kind": "at", "atMs": 1},
            "sessionTarget": "main",
            "wakeMode": "now",
            "payload": {"kind": "agentTurn", "message": "ping", "channel": "telegram"},
            "delivery": {"mode": "announce", "bestEffort": true, "to": "@ops"},
            "state": {"runningAtMs": 7}
        });
        seed(&path, json!({"version": 1, "jobs": [foreign.clone()], "etag": "x1"}));

        upsert_job(&path, job("s1", "go"), LOCK_TIMEOUT).unwrap();

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["jobs"][0], foreign);
        assert_eq!(written["etag"], "x1");
        assert_eq!(written["jobs"][1]["id"], "memory-consolidation-s1");
    }

    #[test]
    fn unmodelled_foreign_jobs_do_not_block_upsert() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.json");
        let odd = json!([
            {"id": "heartbeat", "payload": {"kind": "systemEvent", "text": "ping"}},
            {"id": "weekly", "schedule": {"kind": "rrule", "rule": "FREQ=WEEKLY"}},
            {"name": "no id at all"}
        ]);
        seed(&path, json!({"version": 1, "jobs": odd.clone()}));

        let outcome = upsert_job(&path, job("s1", "go"), LOCK_TIMEOUT).unwrap();
        assert!(!outcome.replaced);
        assert_eq!(outcome.total_jobs, 4);

        let store = load_store(&path).unwrap();
        assert_eq!(store.jobs[..3], odd.as_array().unwrap()[..]);
        let ours: CronJob =
            serde_json::from_value(find(&store, "memory-consolidation-s1").unwrap().clone())
                .unwrap();
        assert_eq!(ours.payload.message, "go");
    }

    #[test]
    fn save_leaves_no_temp_or_lock_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.json");
        upsert_job(&path, job("s1", "x"), LOCK_TIMEOUT).unwrap();

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["jobs.json".to_owned()]);
    }

    #[test]
    fn held_lock_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.json");
        let _held = StoreLockGuard::acquire(&path, LOCK_TIMEOUT).unwrap();

        let err = upsert_job(&path, job("s1", "x"), Duration::from_millis(20)).unwrap_err();
        assert!(err.to_string().contains("timed out"), "got: {err}");
        assert!(load_store(&path).unwrap().jobs.is_empty());
    }

    #[test]
    fn stale_lock_is_evicted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.json");
        let lock_path = path.with_extension("lock");
        std::fs::write(&lock_path, "crashed-writer").unwrap();
        let old = SystemTime::now() - STALE_LOCK_AFTER - Duration::from_secs(60);
        std::fs::File::options()
            .write(true)
            .open(&lock_path)
            .unwrap()
            .set_modified(old)
            .unwrap();

        upsert_job(&path, job("s1", "x"), LOCK_TIMEOUT).unwrap();

        assert_eq!(load_store(&path).unwrap().jobs.len(), 1);
        assert!(!lock_path.exists());
    }

    #[test]
    fn fresh_lock_with_other_token_is_not_evicted() {
        let dir = tempfile::tempdir().unwrap();
        let lock_path = dir.path().join("jobs.lock");
        std::fs::write(&lock_path, "live-writer").unwrap();

        evict_stale_lock(&lock_path);
        assert!(!remove_if_holds(&lock_path, "someone-else"));
        assert_eq!(std::fs::read_to_string(&lock_path).unwrap(), "live-writer");
    }

    #[test]
    fn release_leaves_a_lock_it_no_longer_owns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.json");
        let lock_path = path.with_extension("lock");

        let guard = StoreLockGuard::acquire(&path, LOCK_TIMEOUT).unwrap();
        std::fs::write(&lock_path, "next-writer").unwrap();
        drop(guard);

        assert_eq!(std::fs::read_to_string(&lock_path).unwrap(), "next-writer");
    }

    #[test]
    fn concurrent_writers_do_not_lose_jobs() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileJobStore::new(
            dir.path().join("jobs.json"),
            Duration::from_secs(5),
        ));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || store.upsert(job(&format!("s{i}"), "x")).unwrap())
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let loaded = load_store(store.path()).unwrap();
        assert_eq!(loaded.jobs.len(), 8);
    }

    #[test]
    fn version_defaults_when_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.json");
        std::fs::write(&path, r#"{"jobs": []}"#).unwrap();
        assert_eq!(load_store(&path).unwrap().version, 1);
    }
}
