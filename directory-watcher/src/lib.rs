//! # Directory Watcher
//!
//! Watches a directory tree and fires a rerun trigger when a created or
//! written path matches a pattern.
//!
//! ## Features
//!
//! - **Task per Directory**: one non-recursive subscription per directory,
//!   spawned as subdirectories appear
//! - **Admission Control**: a shared registry caps repeated watches of the
//!   same path
//! - **Coalesced Triggers**: any number of matches collapse into one pending
//!   rerun
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Directory Watcher                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  WatchConfig ──► DirectoryWatcher ──► watcher task per dir      │
//! │       │                │                   │          │         │
//! │       ▼                ▼                   ▼          ▼         │
//! │  PathPattern     WatchRegistry         Notifier    Trigger      │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod event;
pub mod notifier;
pub mod registry;
pub mod watcher;

pub use config::{PathPattern, Quota, WatchConfig};
pub use error::{Result, WatcherError};
pub use event::{FileEvent, FileEventKind};
pub use notifier::{Notifier, NotifyBackend, Subscription};
pub use registry::{Admission, WatchLease, WatchRegistry};
pub use watcher::{DirectoryWatcher, WatchExit, WatchOutcome};
