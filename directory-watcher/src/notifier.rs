//! Per-directory change notification sources.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::error::{Result, WatcherError};
use crate::event::{FileEvent, FileEventKind};

/// Something that can deliver change notifications for a single directory.
pub trait Notifier: Send + Sync + 'static {
    /// Subscribe to changes of `path` itself and its direct entries.
    fn subscribe(&self, path: &Path) -> Result<Subscription>;
}

/// A live subscription for one directory.
///
/// Dropping it unsubscribes.
pub struct Subscription {
    /// Change events for the directory.
    pub events: mpsc::UnboundedReceiver<FileEvent>,

    /// Errors reported by the source. Closure means no more events will
    /// arrive.
    pub errors: mpsc::UnboundedReceiver<WatcherError>,

    /// Keeps the underlying source alive. Declared last so the receivers are
    /// closed before the source shuts down.
    _source: Box<dyn Any + Send>,
}

impl Subscription {
    /// Bundle receivers with the object that feeds them.
    pub fn new(
        events: mpsc::UnboundedReceiver<FileEvent>,
        errors: mpsc::UnboundedReceiver<WatcherError>,
        source: impl Any + Send,
    ) -> Self {
        Self {
            events,
            errors,
            _source: Box::new(source),
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}

#[derive(Clone)]
struct Route {
    id: u64,
    events: mpsc::UnboundedSender<FileEvent>,
    errors: mpsc::UnboundedSender<WatcherError>,
}

/// Subscribers keyed by the directory they watch.
#[derive(Default)]
struct RouteTable {
    next_id: u64,
    routes: HashMap<PathBuf, Vec<Route>>,
}

type SharedRoutes = Arc<Mutex<RouteTable>>;

fn lock_routes(routes: &Mutex<RouteTable>) -> MutexGuard<'_, RouteTable> {
    routes.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Backend {
    // Serializes watch/unwatch. The event callback only takes `routes`.
    watcher: Mutex<RecommendedWatcher>,
    routes: SharedRoutes,
}

/// [`Notifier`] backed by a single `notify` watcher.
///
/// Every subscription adds one non-recursive watch to the shared watcher, and
/// incoming events are routed to the subscriber of the affected entry's
/// parent directory. A directory's own removal is also routed to that
/// directory's subscriber.
#[derive(Clone)]
pub struct NotifyBackend {
    inner: Arc<Backend>,
}

impl fmt::Debug for NotifyBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotifyBackend").finish_non_exhaustive()
    }
}

impl NotifyBackend {
    /// Create the backend and its underlying `notify` watcher.
    pub fn new() -> Result<Self> {
        let routes = SharedRoutes::default();
        let dispatch_routes = routes.clone();
        let watcher = notify::recommended_watcher(
            move |res: std::result::Result<notify::Event, notify::Error>| match res {
                Ok(event) => dispatch_event(&dispatch_routes, event),
                Err(e) => dispatch_error(&dispatch_routes, e),
            },
        )?;

        Ok(Self {
            inner: Arc::new(Backend {
                watcher: Mutex::new(watcher),
                routes,
            }),
        })
    }
}

impl Notifier for NotifyBackend {
    fn subscribe(&self, path: &Path) -> Result<Subscription> {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (error_tx, error_rx) = mpsc::unbounded_channel();

        let mut watcher = self.inner.watcher.lock().unwrap_or_else(PoisonError::into_inner);
        let first = !lock_routes(&self.inner.routes).routes.contains_key(path);
        if first {
            watcher.watch(path, RecursiveMode::NonRecursive)?;
        }

        let id = {
            let mut table = lock_routes(&self.inner.routes);
            table.next_id += 1;
            let id = table.next_id;
            table.routes.entry(path.to_path_buf()).or_default().push(Route {
                id,
                events: event_tx,
                errors: error_tx,
            });
            id
        };
        drop(watcher);
        debug!("Subscribed to: {}", path.display());

        let guard = WatchGuard {
            backend: self.inner.clone(),
            path: path.to_path_buf(),
            id,
        };
        Ok(Subscription::new(event_rx, error_rx, guard))
    }
}

/// Removes one subscriber, and the underlying watch with the last one.
struct WatchGuard {
    backend: Arc<Backend>,
    path: PathBuf,
    id: u64,
}

impl Drop for WatchGuard {
    fn drop(&mut self) {
        let mut watcher = self.backend.watcher.lock().unwrap_or_else(PoisonError::into_inner);
        let last = {
            let mut table = lock_routes(&self.backend.routes);
            let Some(routes) = table.routes.get_mut(&self.path) else {
                return;
            };
            routes.retain(|route| route.id != self.id);
            let last = routes.is_empty();
            if last {
                table.routes.remove(&self.path);
            }
            last
        };
        if last {
            // The kernel drops the watch itself when the directory is removed.
            if let Err(e) = watcher.unwatch(&self.path) {
                trace!("Unwatch {} failed: {e}", self.path.display());
            }
            debug!("Unsubscribed from: {}", self.path.display());
        }
    }
}

/// Subscribers of `dir`, if any.
fn routes_for<'a>(table: &'a RouteTable, dir: Option<&Path>) -> impl Iterator<Item = &'a Route> {
    dir.and_then(|dir| table.routes.get(dir))
        .into_iter()
        .flatten()
}

/// Subscribers that should see `event`.
fn event_targets(table: &RouteTable, event: &FileEvent) -> Vec<Route> {
    let mut targets: Vec<Route> = routes_for(table, event.path.parent()).cloned().collect();
    if event.kind == FileEventKind::Removed {
        targets.extend(routes_for(table, Some(&event.path)).cloned());
    }
    targets
}

fn dispatch_event(routes: &Mutex<RouteTable>, event: notify::Event) {
    for file_event in FileEvent::from_notify(event) {
        let targets = event_targets(&lock_routes(routes), &file_event);
        if targets.is_empty() {
            trace!("No subscriber for {}", file_event.path.display());
        }
        for route in targets {
            // A closed receiver means the subscription is being dropped.
            let _ = route.events.send(file_event.clone());
        }
    }
}

/// Errors naming a path go to the subscribers of that path and its parent;
/// anything else goes to every subscriber.
fn dispatch_error(routes: &Mutex<RouteTable>, error: notify::Error) {
    let targets: Vec<Route> = {
        let table = lock_routes(routes);
        let mut matched = Vec::new();
        for path in &error.paths {
            matched.extend(routes_for(&table, Some(path)).cloned());
            matched.extend(routes_for(&table, path.parent()).cloned());
        }
        if matched.is_empty() {
            table.routes.values().flatten().cloned().collect()
        } else {
            matched
        }
    };

    let message = error.to_string();
    for route in targets {
        let copy = error
            .paths
            .iter()
            .cloned()
            .fold(notify::Error::generic(&message), notify::Error::add_path);
        let _ = route.errors.send(WatcherError::Notify(copy));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn table(paths: &[&str]) -> (RouteTable, Vec<mpsc::UnboundedReceiver<FileEvent>>) {
        let mut table = RouteTable::default();
        let mut receivers = Vec::new();
        for path in paths {
            let (events, events_rx) = mpsc::unbounded_channel();
            let (errors, _errors_rx) = mpsc::unbounded_channel();
            table.next_id += 1;
            table.routes.entry(PathBuf::from(path)).or_default().push(Route {
                id: table.next_id,
                events,
                errors,
            });
            receivers.push(events_rx);
        }
        (table, receivers)
    }

    fn target_ids(table: &RouteTable, kind: FileEventKind, path: &str) -> Vec<u64> {
        event_targets(table, &FileEvent::new(kind, path))
            .into_iter()
            .map(|route| route.id)
            .collect()
    }

    #[test]
    fn test_entry_events_go_to_parent_directory() {
        let (table, _rx) = table(&["/tree", "/tree/sub"]);

        assert_eq!(target_ids(&table, FileEventKind::Created, "/tree/a.go"), vec![1]);
        assert_eq!(target_ids(&table, FileEventKind::Modified, "/tree/sub/b.go"), vec![2]);
        assert_eq!(target_ids(&table, FileEventKind::Created, "/elsewhere/c.go"), Vec::<u64>::new());
    }

    #[test]
    fn test_directory_removal_reaches_parent_and_itself() {
        let (table, _rx) = table(&["/tree", "/tree/sub"]);

        assert_eq!(target_ids(&table, FileEventKind::Removed, "/tree/sub"), vec![1, 2]);
        assert_eq!(target_ids(&table, FileEventKind::Modified, "/tree/sub"), vec![1]);
    }

    #[test]
    fn test_repeat_subscribers_all_receive_events() {
        let (table, mut receivers) = table(&["/tree", "/tree"]);
        let routes = Mutex::new(table);

        let event = notify::Event::new(notify::EventKind::Create(notify::event::CreateKind::File))
            .add_path(PathBuf::from("/tree/a.go"));
        dispatch_event(&routes, event);

        for rx in &mut receivers {
            assert_eq!(
                rx.try_recv().unwrap(),
                FileEvent::new(FileEventKind::Created, "/tree/a.go")
            );
        }
    }
}
