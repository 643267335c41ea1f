//! Admission control for watcher tasks.
//!
//! Every watcher task asks the registry before subscribing. The registry
//! counts outstanding requests per path so that symlink loops and
//! create/delete churn cannot spawn watchers without bound.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{trace, warn};

use crate::config::Quota;
use crate::error::WatcherError;

/// Decision returned by [`WatchRegistry::acquire`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The caller may watch the path.
    Allow,

    /// A quota was exceeded. The request is still counted.
    Deny {
        /// Outstanding requests for the path, including this one.
        count: usize,
        /// Distinct paths in the registry.
        distinct: usize,
    },
}

impl Admission {
    /// Whether the request was admitted.
    pub fn is_allowed(self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// Shared map from watched path to its outstanding request count.
#[derive(Debug)]
pub struct WatchRegistry {
    quota: Quota,
    paths: Mutex<HashMap<PathBuf, usize>>,
}

impl WatchRegistry {
    /// Create an empty registry enforcing `quota`.
    pub fn new(quota: Quota) -> Self {
        Self {
            quota,
            paths: Mutex::new(HashMap::new()),
        }
    }

    /// Count a request for `path` and decide whether it may proceed.
    ///
    /// The count is incremented even on [`Admission::Deny`]; every call must
    /// be paired with exactly one [`release`](Self::release).
    pub fn acquire(&self, path: &Path) -> Admission {
        let mut paths = self.lock();
        let count = paths.entry(path.to_path_buf()).or_insert(0);
        let repeat = *count > 0;
        *count += 1;
        let count = *count;

        if !repeat {
            trace!(path = %path.display(), "admitted first watcher");
            return Admission::Allow;
        }

        let distinct = paths.len();
        if count > self.quota.per_path_limit || distinct > self.quota.distinct_path_limit {
            warn!(
                path = %path.display(),
                count,
                per_path_limit = self.quota.per_path_limit,
                distinct,
                distinct_path_limit = self.quota.distinct_path_limit,
                "too many watchers"
            );
            return Admission::Deny { count, distinct };
        }

        Admission::Allow
    }

    /// Undo one [`acquire`](Self::acquire) for `path`.
    ///
    /// The entry disappears when its count reaches zero. Releasing a path
    /// that holds no requests is ignored.
    pub fn release(&self, path: &Path) {
        let mut paths = self.lock();
        let Some(count) = paths.get_mut(path) else {
            warn!(path = %path.display(), "release without matching acquire");
            return;
        };
        *count -= 1;
        if *count == 0 {
            paths.remove(path);
        }
    }

    /// Outstanding requests for `path`.
    pub fn count(&self, path: &Path) -> usize {
        self.lock().get(path).copied().unwrap_or(0)
    }

    /// Number of distinct paths with outstanding requests.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Check if no path is being watched.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PathBuf, usize>> {
        // No update spans a panic point, so a poisoned map is still whole.
        self.paths.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A counted request that is released when dropped.
///
/// Watcher tasks hold one for their whole lifetime so the registry entry is
/// cleaned up on every exit path, including denial.
#[derive(Debug)]
pub struct WatchLease {
    registry: Arc<WatchRegistry>,
    path: PathBuf,
}

impl WatchLease {
    /// Acquire `path` and return the lease together with the decision.
    pub fn acquire(registry: Arc<WatchRegistry>, path: impl Into<PathBuf>) -> (Self, Admission) {
        let path = path.into();
        let admission = registry.acquire(&path);
        (Self { registry, path }, admission)
    }

    /// Turn a denied admission into an error, keeping the lease alive until
    /// the caller drops it.
    pub fn check(&self, admission: Admission) -> Result<(), WatcherError> {
        match admission {
            Admission::Allow => Ok(()),
            Admission::Deny { count, distinct } => Err(WatcherError::AdmissionDenied {
                path: self.path.clone(),
                count,
                distinct,
            }),
        }
    }

    /// The leased path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for WatchLease {
    fn drop(&mut self) {
        self.registry.release(&self.path);
    }
}
