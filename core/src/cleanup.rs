use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::fs;
use tokio::task::JoinHandle;
use tracing::debug;

type Pending = HashMap<PathBuf, (u64, JoinHandle<()>)>;

/// Deletes temporary files after a delay.
///
/// Each scheduled deletion is a task owned by the scheduler, so pending
/// deletions can be inspected, cancelled, or forced early. Deletion errors are
/// ignored. Must be used from within a tokio runtime.
#[derive(Debug)]
pub struct CleanupScheduler {
    delay: Duration,
    pending: Arc<Mutex<Pending>>,
    next_id: AtomicU64,
}

impl CleanupScheduler {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(0),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Deletes `path` once the delay has elapsed. Scheduling a path that is
    /// already pending restarts its delay.
    pub fn schedule(&self, path: PathBuf) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let delay = self.delay;
        let pending = Arc::clone(&self.pending);

        // Held across spawn so the task cannot deregister before it is registered.
        let mut guard = lock(&self.pending);
        let task_path = path.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            remove_quietly(&task_path).await;

            let mut map = lock(&pending);
            if map.get(&task_path).is_some_and(|(current, _)| *current == id) {
                map.remove(&task_path);
            }
        });

        if let Some((_, previous)) = guard.insert(path, (id, handle)) {
            previous.abort();
        }
    }

    pub fn pending(&self) -> usize {
        lock(&self.pending).len()
    }

    pub fn is_pending(&self, path: &Path) -> bool {
        lock(&self.pending).contains_key(path)
    }

    /// Drops every pending deletion, leaving the files in place.
    pub fn cancel_all(&self) {
        for (_, (_, handle)) in lock(&self.pending).drain() {
            handle.abort();
        }
    }

    /// Deletes every pending file now.
    pub async fn flush(&self) {
        let drained: Vec<PathBuf> = lock(&self.pending)
            .drain()
            .map(|(path, (_, handle))| {
                handle.abort();
                path
            })
            .collect();

        for path in drained {
            remove_quietly(&path).await;
        }
    }
}

fn lock(pending: &Mutex<Pending>) -> MutexGuard<'_, Pending> {
    pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

async fn remove_quietly(path: &Path) {
    match fs::remove_file(path).await {
        Ok(()) => debug!("Removed temporary file {}", path.display()),
        Err(e) => debug!("Temporary file {} not removed: {}", path.display(), e),
    }
}
