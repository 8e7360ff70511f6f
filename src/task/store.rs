//! File-based task store.
//!
//! Layout, one flat directory shared by all tasks:
//!
//! ```text
//! <task_dir>/<id>.stdout   captured standard output (append-only while running)
//! <task_dir>/<id>.stderr   captured standard error
//! <task_dir>/<id>.meta     JSON status record
//! ```
//!
//! Tasks never share files, so no locking is needed across ids.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tokio::fs;

use super::error::{TaskError, TaskResult};
use super::task::{Task, TaskId};

const STDOUT_EXT: &str = "stdout";
const STDERR_EXT: &str = "stderr";
const META_EXT: &str = "meta";

/// Open capture handles for a freshly allocated task.
///
/// The handles are passed to the child as its stdout/stderr; the host drops
/// its copies right after spawning.
#[derive(Debug)]
pub struct CaptureFiles {
    pub stdout: std::fs::File,
    pub stderr: std::fs::File,
    pub stdout_path: PathBuf,
    pub stderr_path: PathBuf,
}

/// Whatever a task has flushed so far.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedOutput {
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Clone)]
pub struct TaskStore {
    dir: PathBuf,
}

impl TaskStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &TaskId, ext: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", id, ext))
    }

    pub fn stdout_path(&self, id: &TaskId) -> PathBuf {
        self.path_for(id, STDOUT_EXT)
    }

    pub fn stderr_path(&self, id: &TaskId) -> PathBuf {
        self.path_for(id, STDERR_EXT)
    }

    pub fn meta_path(&self, id: &TaskId) -> PathBuf {
        self.path_for(id, META_EXT)
    }

    /// Reserve the capture files for `id`, creating the task directory if absent.
    ///
    /// Files are created exclusively: an id collision fails with a storage
    /// error whose source kind is `AlreadyExists`.
    pub async fn allocate(&self, id: &TaskId) -> TaskResult<CaptureFiles> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| TaskError::storage(&self.dir, e))?;

        let stdout_path = self.stdout_path(id);
        let stderr_path = self.stderr_path(id);

        let stdout = create_exclusive(&stdout_path).await?;
        let stderr = match create_exclusive(&stderr_path).await {
            Ok(file) => file,
            Err(e) => {
                let _ = fs::remove_file(&stdout_path).await;
                return Err(e);
            }
        };

        Ok(CaptureFiles {
            stdout,
            stderr,
            stdout_path,
            stderr_path,
        })
    }

    /// Current content of both capture files. Missing files read as empty.
    pub async fn read_output(&self, id: &TaskId) -> TaskResult<CapturedOutput> {
        Ok(CapturedOutput {
            stdout: read_lossy(&self.stdout_path(id)).await?,
            stderr: read_lossy(&self.stderr_path(id)).await?,
        })
    }

    /// Latest modification time across the capture files.
    ///
    /// Used as a heartbeat: a finished stream stops advancing.
    pub async fn last_modified(&self, id: &TaskId) -> Option<SystemTime> {
        let mut latest = None;
        for path in [self.stdout_path(id), self.stderr_path(id)] {
            if let Ok(modified) = fs::metadata(&path).await.and_then(|m| m.modified()) {
                latest = latest.max(Some(modified));
            }
        }
        latest
    }

    pub async fn contains(&self, id: &TaskId) -> bool {
        fs::try_exists(self.meta_path(id)).await.unwrap_or(false)
    }

    /// Persist the status record (write to a temp file, then rename).
    pub async fn save(&self, task: &Task) -> TaskResult<()> {
        let path = self.meta_path(task.id());
        let data = serde_json::to_vec_pretty(task)
            .map_err(|e| TaskError::storage(&path, std::io::Error::other(e)))?;
        let tmp_path = path.with_extension("meta.tmp");
        fs::write(&tmp_path, data)
            .await
            .map_err(|e| TaskError::storage(&tmp_path, e))?;
        fs::rename(&tmp_path, &path)
            .await
            .map_err(|e| TaskError::storage(&path, e))?;
        Ok(())
    }

    /// Load the status record, `Ok(None)` if the task is unknown.
    pub async fn load(&self, id: &TaskId) -> TaskResult<Option<Task>> {
        let path = self.meta_path(id);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(TaskError::storage(&path, e)),
        };
        let task = serde_json::from_slice::<Task>(&bytes).map_err(|e| {
            TaskError::storage(
                &path,
                std::io::Error::new(std::io::ErrorKind::InvalidData, e),
            )
        })?;
        Ok(Some(task))
    }

    /// Remove every artifact of a task that never got off the ground.
    pub async fn discard(&self, id: &TaskId) {
        for path in [self.stdout_path(id), self.stderr_path(id), self.meta_path(id)] {
            match fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!("Failed to remove {}: {}", path.display(), e),
            }
        }
    }

    /// Delete every task whose newest file is older than `max_age`.
    ///
    /// Returns the number of tasks removed. A missing directory is not an
    /// error.
    pub async fn prune_older_than(&self, max_age: Duration) -> TaskResult<usize> {
        let Some(cutoff) = SystemTime::now().checked_sub(max_age) else {
            return Ok(0);
        };

        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(TaskError::storage(&self.dir, e)),
        };

        // stem -> (newest mtime, files)
        let mut groups: HashMap<String, (SystemTime, Vec<PathBuf>)> = HashMap::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| TaskError::storage(&self.dir, e))?
        {
            let path = entry.path();
            let Some(stem) = task_stem(&path) else {
                continue;
            };
            let modified = match entry.metadata().await.and_then(|m| m.modified()) {
                Ok(modified) => modified,
                Err(e) => {
                    tracing::warn!("Skipping {} during prune: {}", path.display(), e);
                    continue;
                }
            };
            let group = groups
                .entry(stem)
                .or_insert_with(|| (SystemTime::UNIX_EPOCH, Vec::new()));
            group.0 = group.0.max(modified);
            group.1.push(path);
        }

        let mut removed = 0;
        for (stem, (newest, files)) in groups {
            if newest >= cutoff {
                continue;
            }
            for file in files {
                if let Err(e) = fs::remove_file(&file).await {
                    tracing::warn!("Failed to remove {}: {}", file.display(), e);
                }
            }
            tracing::debug!(task_id = %stem, "Pruned task files");
            removed += 1;
        }
        Ok(removed)
    }
}

async fn create_exclusive(path: &Path) -> TaskResult<std::fs::File> {
    let file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await
        .map_err(|e| TaskError::storage(path, e))?;
    Ok(file.into_std().await)
}

async fn read_lossy(path: &Path) -> TaskResult<String> {
    match fs::read(path).await {
        Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
        Err(e) => Err(TaskError::storage(path, e)),
    }
}

/// `abc.stdout` -> `abc`; ignores files that are not task artifacts.
fn task_stem(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    let (stem, ext) = name.split_once('.')?;
    if !matches!(ext, STDOUT_EXT | STDERR_EXT | META_EXT | "meta.tmp") {
        return None;
    }
    TaskId::parse(stem).map(|id| id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_allocate_creates_directory_and_files() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = TaskStore::new(temp.path().join("nested").join("tasks"));
        let id = TaskId::new();

        let files = store.allocate(&id).await.expect("allocate");
        assert!(files.stdout_path.exists());
        assert!(files.stderr_path.exists());
        assert_eq!(files.stdout_path, store.stdout_path(&id));
    }

    #[tokio::test]
    async fn test_allocate_rejects_collision() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = TaskStore::new(temp.path());
        let id = TaskId::new();

        store.allocate(&id).await.expect("first allocate");
        match store.allocate(&id).await {
            Err(TaskError::Storage { source, .. }) => {
                assert_eq!(source.kind(), std::io::ErrorKind::AlreadyExists)
            }
            other => panic!("Expected AlreadyExists storage error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_allocate_unwritable_directory() {
        let temp = tempfile::tempdir().expect("tempdir");
        let blocker = temp.path().join("not-a-dir");
        std::fs::write(&blocker, b"x").unwrap();
        let store = TaskStore::new(blocker.join("tasks"));

        let err = store.allocate(&TaskId::new()).await.unwrap_err();
        assert!(matches!(err, TaskError::Storage { .. }));
    }

    #[tokio::test]
    async fn test_read_output_reflects_writes() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = TaskStore::new(temp.path());
        let id = TaskId::new();

        let mut files = store.allocate(&id).await.unwrap();
        assert_eq!(store.read_output(&id).await.unwrap(), CapturedOutput::default());

        files.stdout.write_all(b"hello\n").unwrap();
        files.stderr.write_all(b"warn\n").unwrap();
        let output = store.read_output(&id).await.unwrap();
        assert_eq!(output.stdout, "hello\n");
        assert_eq!(output.stderr, "warn\n");
    }

    #[tokio::test]
    async fn test_read_output_missing_task_is_empty() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = TaskStore::new(temp.path());
        let output = store.read_output(&TaskId::new()).await.unwrap();
        assert!(output.stdout.is_empty() && output.stderr.is_empty());
    }

    #[tokio::test]
    async fn test_last_modified() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = TaskStore::new(temp.path());
        let id = TaskId::new();
        assert!(store.last_modified(&id).await.is_none());

        store.allocate(&id).await.unwrap();
        assert!(store.last_modified(&id).await.is_some());
    }

    #[tokio::test]
    async fn test_save_and_load_roundtrip() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = TaskStore::new(temp.path());
        let id = TaskId::new();
        let mut task = Task::new(
            id.clone(),
            "codex exec test".to_string(),
            store.stdout_path(&id),
            store.stderr_path(&id),
        );
        task.mark_running(1234);

        assert!(!store.contains(&id).await);
        assert!(store.load(&id).await.unwrap().is_none());

        store.save(&task).await.unwrap();
        assert!(store.contains(&id).await);
        let loaded = store.load(&id).await.unwrap().expect("record");
        assert_eq!(loaded.id(), &id);
        assert_eq!(loaded.pid(), Some(1234));
        assert_eq!(loaded.command(), "codex exec test");
    }

    #[tokio::test]
    async fn test_discard_removes_artifacts() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = TaskStore::new(temp.path());
        let id = TaskId::new();
        store.allocate(&id).await.unwrap();

        store.discard(&id).await;
        assert!(!store.stdout_path(&id).exists());
        assert!(!store.stderr_path(&id).exists());
        // Discarding twice is harmless.
        store.discard(&id).await;
    }

    #[tokio::test]
    async fn test_load_corrupt_record() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = TaskStore::new(temp.path());
        let id = TaskId::new();
        std::fs::write(store.meta_path(&id), b"{not json").unwrap();

        assert!(matches!(
            store.load(&id).await,
            Err(TaskError::Storage { .. })
        ));
    }

    #[tokio::test]
    async fn test_prune_keeps_fresh_tasks() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = TaskStore::new(temp.path());
        let id = TaskId::new();
        store.allocate(&id).await.unwrap();
        std::fs::write(temp.path().join("unrelated.txt"), b"keep").unwrap();

        let removed = store
            .prune_older_than(Duration::from_secs(3600))
            .await
            .unwrap();
        assert_eq!(removed, 0);
        assert!(store.stdout_path(&id).exists());

        // Everything counts as stale with a zero window.
        tokio::time::sleep(Duration::from_millis(20)).await;
        let removed = store.prune_older_than(Duration::ZERO).await.unwrap();
        assert_eq!(removed, 1);
        assert!(!store.stdout_path(&id).exists());
        assert!(!store.stderr_path(&id).exists());
        assert!(temp.path().join("unrelated.txt").exists());
    }

    #[test]
    fn test_prune_missing_directory() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = TaskStore::new(temp.path().join("absent"));
        let pruned = tokio_test::block_on(store.prune_older_than(Duration::ZERO)).unwrap();
        assert_eq!(pruned, 0);
    }

    #[test]
    fn test_task_stem() {
        assert_eq!(task_stem(Path::new("/x/abc.stdout")), Some("abc".to_string()));
        assert_eq!(task_stem(Path::new("/x/abc.meta.tmp")), Some("abc".to_string()));
        assert_eq!(task_stem(Path::new("/x/unrelated.txt")), None);
        assert_eq!(task_stem(Path::new("/x/noext")), None);
    }
}
