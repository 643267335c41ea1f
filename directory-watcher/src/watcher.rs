//! Recursive directory watcher.
//!
//! One task per directory. Each task asks the [`WatchRegistry`] for
//! admission, subscribes to its directory, spawns a task for every
//! subdirectory it finds or sees created, and fires the [`Trigger`] when a
//! created or written path matches the pattern. Tasks are not tracked by
//! their parent; each one reports its own [`WatchOutcome`] on the shared
//! completion channel.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use path_absolutize::Absolutize;
use rewatch_utils_trigger::{Fired, Trigger};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::{PathPattern, WatchConfig};
use crate::error::{Result, WatcherError};
use crate::event::{FileEvent, FileEventKind};
use crate::notifier::{Notifier, Subscription};
use crate::registry::{WatchLease, WatchRegistry};

/// Why a watcher task stopped without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchExit {
    /// The watched directory itself was removed.
    Removed,

    /// The subscription's event stream closed.
    StreamClosed,
}

/// Completion report of one watcher task.
#[derive(Debug)]
pub struct WatchOutcome {
    /// Directory the task was watching.
    pub path: PathBuf,

    /// Whether this task watched the root of the tree.
    pub root: bool,

    /// How the task ended.
    pub result: Result<WatchExit>,
}

impl WatchOutcome {
    /// Whether the whole program should stop because of this outcome.
    ///
    /// Subscription failures are always fatal. Any other error is fatal only
    /// for the root watcher.
    pub fn is_fatal(&self) -> bool {
        match &self.result {
            Ok(_) => false,
            Err(e) => self.root || e.is_fatal(),
        }
    }
}

struct WatchContext {
    /// Absolute root; every watched path is built from it.
    root: PathBuf,
    /// Root as given by the caller; names are matched and reported under it.
    display_root: PathBuf,
    notifier: Arc<dyn Notifier>,
    registry: Arc<WatchRegistry>,
    pattern: PathPattern,
    trigger: Trigger,
    done_tx: mpsc::UnboundedSender<WatchOutcome>,
}

impl WatchContext {
    fn display_path(&self, path: &Path) -> PathBuf {
        relative_to_root(&self.root, &self.display_root, path)
    }
}

/// Rewrite `path` under `root` so that it starts with `display_root`.
/// Paths outside `root` are returned unchanged.
fn relative_to_root(root: &Path, display_root: &Path, path: &Path) -> PathBuf {
    match path.strip_prefix(root) {
        Ok(rest) if rest.as_os_str().is_empty() => display_root.to_path_buf(),
        Ok(rest) => display_root.join(rest),
        Err(_) => path.to_path_buf(),
    }
}

/// Watches a directory tree and fires a trigger on matching changes.
pub struct DirectoryWatcher {
    ctx: Arc<WatchContext>,
}

impl DirectoryWatcher {
    /// Create a watcher for `config.root`.
    ///
    /// A relative root is made absolute against the current directory, but
    /// changed paths are still matched and reported relative to it, so root
    /// `.` sees `./foo.go`.
    ///
    /// Returns the receiver on which every watcher task reports its
    /// completion.
    pub fn new(
        config: WatchConfig,
        notifier: Arc<dyn Notifier>,
        trigger: Trigger,
    ) -> (Self, mpsc::UnboundedReceiver<WatchOutcome>) {
        let (done_tx, done_rx) = mpsc::unbounded_channel();
        let display_root = config.root;
        let root = match display_root.absolutize() {
            Ok(root) => root.into_owned(),
            Err(e) => {
                warn!("Cannot absolutize {}: {e}", display_root.display());
                display_root.clone()
            }
        };
        let ctx = WatchContext {
            root,
            display_root,
            notifier,
            registry: Arc::new(WatchRegistry::new(config.quota)),
            pattern: config.pattern,
            trigger,
            done_tx,
        };

        (Self { ctx: Arc::new(ctx) }, done_rx)
    }

    /// Spawn the root watcher task. Must be called within a tokio runtime.
    pub fn start(&self) {
        info!(
            "Watching {} for {}",
            self.ctx.root.display(),
            self.ctx.pattern.as_str()
        );
        spawn_watch(self.ctx.clone(), self.ctx.root.clone(), true);
    }

    /// Admission registry shared by all watcher tasks.
    pub fn registry(&self) -> &Arc<WatchRegistry> {
        &self.ctx.registry
    }
}

fn spawn_watch(ctx: Arc<WatchContext>, path: PathBuf, root: bool) {
    tokio::spawn(async move {
        let result = watch(&ctx, &path).await;
        let path = ctx.display_path(&path);
        match &result {
            Ok(exit) => debug!("Watcher for {} finished: {exit:?}", path.display()),
            Err(e) => warn!("Watcher for {} failed: {e}", path.display()),
        }
        // Only fails once the top-level loop has gone away.
        let _ = ctx.done_tx.send(WatchOutcome { path, root, result });
    });
}

async fn watch(ctx: &Arc<WatchContext>, path: &Path) -> Result<WatchExit> {
    debug!("New watcher: {}", path.display());

    let (lease, admission) = WatchLease::acquire(ctx.registry.clone(), path);
    lease.check(admission)?;

    let mut subscription = ctx
        .notifier
        .subscribe(path)
        .map_err(|e| WatcherError::subscribe(path, e))?;

    spawn_existing_subdirectories(ctx, path).await?;

    let exit = run_event_loop(ctx, path, &mut subscription).await;
    drop(subscription);
    drop(lease);
    exit
}

async fn spawn_existing_subdirectories(ctx: &Arc<WatchContext>, path: &Path) -> Result<()> {
    let mut entries = tokio::fs::read_dir(path)
        .await
        .map_err(|e| WatcherError::subscribe(path, e))?;

    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| WatcherError::subscribe(path, e))?
    {
        let child = path.join(entry.file_name());
        if is_directory(&child).await {
            spawn_watch(ctx.clone(), child, false);
        }
    }
    Ok(())
}

async fn run_event_loop(
    ctx: &Arc<WatchContext>,
    path: &Path,
    subscription: &mut Subscription,
) -> Result<WatchExit> {
    loop {
        tokio::select! {
            event = subscription.events.recv() => match event {
                Some(event) => {
                    if let Some(exit) = handle_event(ctx, path, event).await {
                        return Ok(exit);
                    }
                }
                None => return Ok(WatchExit::StreamClosed),
            },
            error = subscription.errors.recv() => match error {
                Some(e) => warn!("Watch error for {}: {e}", path.display()),
                None => return Err(WatcherError::StreamBroken(path.to_path_buf())),
            },
        }
    }
}

async fn handle_event(ctx: &Arc<WatchContext>, path: &Path, event: FileEvent) -> Option<WatchExit> {
    match event.kind {
        FileEventKind::Removed if event.path == path => return Some(WatchExit::Removed),
        kind if kind.is_creation() => {
            if is_directory(&event.path).await {
                spawn_watch(ctx.clone(), event.path.clone(), false);
            }
            signal_if_match(ctx, &event.path, "Created");
        }
        FileEventKind::Modified => signal_if_match(ctx, &event.path, "Modified"),
        _ => {}
    }
    None
}

fn signal_if_match(ctx: &WatchContext, path: &Path, what: &str) {
    let path = ctx.display_path(path);
    if !ctx.pattern.is_match(&path) {
        return;
    }
    debug!("{what} file: {}", path.display());
    if ctx.trigger.fire() == Fired::Closed {
        debug!("Trigger receiver gone, dropping change to {}", path.display());
    }
}

/// Follows symlinks, so a link to a directory is watched like the directory.
async fn is_directory(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
}
