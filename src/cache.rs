//! Capsule cache: in-memory map backed by one JSON file per project.
//!
//! Records live at `<cache_dir>/capsule_<sha256(path)>.json`. Readers get
//! an `Arc<Capsule>` snapshot; [`CapsuleCache::put`] replaces the file via
//! write-to-temp + rename and then swaps the map entry to a new `Arc`, so
//! neither the map nor the file is ever observed half-written. Puts are
//! serialized, so the last put wins in memory and on disk alike.
//!
//! Disk errors are logged and swallowed: after a failed write the in-memory
//! record stays authoritative for the rest of the process.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use workspace_mcp_core::models::Capsule;

const RECORD_PREFIX: &str = "capsule_";
const RECORD_SUFFIX: &str = ".json";

pub struct CapsuleCache {
    dir: PathBuf,
    entries: RwLock<HashMap<PathBuf, Arc<Capsule>>>,
    writes: Mutex<()>,
    tmp_seq: AtomicU64,
}

impl CapsuleCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            entries: RwLock::new(HashMap::new()),
            writes: Mutex::new(()),
            tmp_seq: AtomicU64::new(0),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// On-disk location of the record for `root`.
    pub fn record_path(&self, root: &Path) -> PathBuf {
        let digest = Sha256::digest(root.to_string_lossy().as_bytes());
        self.dir
            .join(format!("{}{}{}", RECORD_PREFIX, hex::encode(digest), RECORD_SUFFIX))
    }

    /// Memory first, then disk. A disk hit is memoized.
    pub fn get(&self, root: &Path) -> Option<Arc<Capsule>> {
        if let Some(hit) = self.read_map().get(root) {
            return Some(Arc::clone(hit));
        }
        let capsule = match self.load_record(&self.record_path(root)) {
            Ok(Some(c)) if c.project_root == root => c,
            Ok(_) => return None,
            Err(e) => {
                tracing::warn!(app = %root.display(), error = %format!("{:#}", e), "unreadable capsule record");
                return None;
            }
        };
        let capsule = Arc::new(capsule);
        let mut map = self.write_map();
        // A concurrent put may have landed while we were reading the file.
        let entry = map
            .entry(root.to_path_buf())
            .or_insert_with(|| Arc::clone(&capsule));
        Some(Arc::clone(entry))
    }

    /// Replace the record for `capsule.project_root` in memory and on disk.
    pub fn put(&self, capsule: Capsule) -> Arc<Capsule> {
        let root = capsule.project_root.clone();
        let capsule = Arc::new(capsule);
        let _write = self.writes.lock().unwrap_or_else(|p| p.into_inner());
        if let Err(e) = self.write_record(&capsule) {
            tracing::warn!(app = %root.display(), error = %format!("{:#}", e), "capsule write failed; keeping in-memory copy");
        }
        self.write_map().insert(root, Arc::clone(&capsule));
        capsule
    }

    /// Every project with a capsule, in memory or on disk, sorted by root.
    pub fn list(&self) -> Vec<Arc<Capsule>> {
        if let Ok(entries) = std::fs::read_dir(&self.dir) {
            for entry in entries.filter_map(|e| e.ok()) {
                let name = entry.file_name().to_string_lossy().into_owned();
                if !name.starts_with(RECORD_PREFIX) || !name.ends_with(RECORD_SUFFIX) {
                    continue;
                }
                if let Ok(Some(c)) = self.load_record(&entry.path()) {
                    let root = c.project_root.clone();
                    self.write_map().entry(root).or_insert_with(|| Arc::new(c));
                }
            }
        }
        let mut all: Vec<Arc<Capsule>> = self.read_map().values().cloned().collect();
        all.sort_by(|a, b| a.project_root.cmp(&b.project_root));
        all
    }

    fn load_record(&self, path: &Path) -> Result<Option<Capsule>> {
        let text = match std::fs::read_to_string(path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
        };
        let capsule = serde_json::from_str(&text)
            .with_context(|| format!("parsing {}", path.display()))?;
        Ok(Some(capsule))
    }

    fn write_record(&self, capsule: &Capsule) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating {}", self.dir.display()))?;
        let target = self.record_path(&capsule.project_root);
        let seq = self.tmp_seq.fetch_add(1, Ordering::Relaxed);
        let tmp = target.with_extension(format!("json.tmp{}.{}", std::process::id(), seq));

        let body = serde_json::to_vec_pretty(capsule)?;
        let mut f = std::fs::File::create(&tmp)
            .with_context(|| format!("creating {}", tmp.display()))?;
        f.write_all(&body)?;
        f.sync_all()?;
        drop(f);

        if let Err(e) = std::fs::rename(&tmp, &target) {
            let _ = std::fs::remove_file(&tmp);
            return Err(e).with_context(|| format!("renaming into {}", target.display()));
        }
        Ok(())
    }

    fn read_map(&self) -> std::sync::RwLockReadGuard<'_, HashMap<PathBuf, Arc<Capsule>>> {
        self.entries.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write_map(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<PathBuf, Arc<Capsule>>> {
        self.entries.write().unwrap_or_else(|p| p.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use workspace_mcp_core::models::CapsuleSource;

    fn capsule(root: &str, purpose: &str) -> Capsule {
        Capsule {
            project_root: PathBuf::from(root),
            name: root.rsplit('/').next().unwrap().to_string(),
            purpose: purpose.to_string(),
            role: "service".to_string(),
            confidence: 0.8,
            evidence_paths: vec![],
            entrypoints: vec![PathBuf::from(root).join("src/main.ts")],
            key_modules: vec![],
            tests: vec![],
            docs: vec![],
            owners: vec![],
            source: CapsuleSource::Summarizer,
            generated_at: Utc::now(),
        }
    }

    #[test]
    fn test_put_then_get_from_memory() {
        let tmp = tempfile::TempDir::new().unwrap();
        let cache = CapsuleCache::new(tmp.path());
        cache.put(capsule("/ws/apps/web", "Web frontend"));
        let got = cache.get(Path::new("/ws/apps/web")).unwrap();
        assert_eq!(got.purpose, "Web frontend");
    }

    #[test]
    fn test_survives_restart_via_disk() {
        let tmp = tempfile::TempDir::new().unwrap();
        CapsuleCache::new(tmp.path()).put(capsule("/ws/apps/api", "HTTP API"));

        let fresh = CapsuleCache::new(tmp.path());
        let got = fresh.get(Path::new("/ws/apps/api")).unwrap();
        assert_eq!(got.purpose, "HTTP API");
        assert!(fresh.get(Path::new("/ws/apps/none")).is_none());
    }

    #[test]
    fn test_put_replaces_whole_record() {
        let tmp = tempfile::TempDir::new().unwrap();
        let cache = CapsuleCache::new(tmp.path());
        let before = cache.put(capsule("/ws/apps/web", "old"));
        cache.put(capsule("/ws/apps/web", "new"));
        assert_eq!(before.purpose, "old");
        assert_eq!(cache.get(Path::new("/ws/apps/web")).unwrap().purpose, "new");

        let fresh = CapsuleCache::new(tmp.path());
        assert_eq!(fresh.get(Path::new("/ws/apps/web")).unwrap().purpose, "new");
    }

    #[test]
    fn test_concurrent_puts_agree_with_disk() {
        let tmp = tempfile::TempDir::new().unwrap();
        let cache = Arc::new(CapsuleCache::new(tmp.path()));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    for round in 0..10 {
                        cache.put(capsule("/ws/apps/web", &format!("writer {} round {}", i, round)));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let in_memory = cache.get(Path::new("/ws/apps/web")).unwrap();
        let on_disk = CapsuleCache::new(tmp.path()).get(Path::new("/ws/apps/web")).unwrap();
        assert_eq!(in_memory.purpose, on_disk.purpose);
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let tmp = tempfile::TempDir::new().unwrap();
        let cache = CapsuleCache::new(tmp.path());
        cache.put(capsule("/ws/apps/a", "a"));
        cache.put(capsule("/ws/apps/a", "b"));
        let names: Vec<String> = std::fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 1);
        assert!(names[0].starts_with("capsule_") && names[0].ends_with(".json"));
    }

    #[test]
    fn test_keys_are_distinct_per_path() {
        let cache = CapsuleCache::new("/tmp/unused");
        assert_ne!(
            cache.record_path(Path::new("/ws/a/b")),
            cache.record_path(Path::new("/ws/a_b"))
        );
    }

    #[test]
    fn test_failed_write_keeps_memory_copy() {
        let tmp = tempfile::TempDir::new().unwrap();
        let blocker = tmp.path().join("not-a-dir");
        std::fs::write(&blocker, "x").unwrap();
        let cache = CapsuleCache::new(&blocker);
        cache.put(capsule("/ws/apps/web", "memory only"));
        assert_eq!(cache.get(Path::new("/ws/apps/web")).unwrap().purpose, "memory only");
    }

    #[test]
    fn test_list_merges_disk_records() {
        let tmp = tempfile::TempDir::new().unwrap();
        CapsuleCache::new(tmp.path()).put(capsule("/ws/apps/b", "b"));
        let cache = CapsuleCache::new(tmp.path());
        cache.put(capsule("/ws/apps/a", "a"));
        let roots: Vec<PathBuf> = cache.list().iter().map(|c| c.project_root.clone()).collect();
        assert_eq!(roots, vec![PathBuf::from("/ws/apps/a"), PathBuf::from("/ws/apps/b")]);
    }

    #[test]
    fn test_corrupt_record_is_absent() {
        let tmp = tempfile::TempDir::new().unwrap();
        let cache = CapsuleCache::new(tmp.path());
        std::fs::write(cache.record_path(Path::new("/ws/apps/x")), "{not json").unwrap();
        assert!(cache.get(Path::new("/ws/apps/x")).is_none());
    }
}
