//! File events from directory watching.

use std::path::PathBuf;

use notify::event::{ModifyKind, RenameMode};

/// A file system event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEvent {
    /// The kind of event.
    pub kind: FileEventKind,

    /// Path to the affected file or directory.
    pub path: PathBuf,
}

impl FileEvent {
    /// Create a new file event.
    pub fn new(kind: FileEventKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }

    /// Split a notify event into one file event per affected path.
    pub fn from_notify(event: notify::Event) -> impl Iterator<Item = FileEvent> {
        let kind = FileEventKind::from(event.kind);
        event
            .paths
            .into_iter()
            .map(move |path| FileEvent::new(kind, path))
    }
}

/// Kind of file event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileEventKind {
    /// Entry was created.
    Created,

    /// File contents were written.
    Modified,

    /// Entry was removed.
    Removed,

    /// Entry was renamed away (old path).
    RenamedFrom,

    /// Entry was renamed into place (new path).
    RenamedTo,

    /// Metadata changed.
    MetadataChanged,

    /// Access time changed.
    Accessed,

    /// Unknown event type.
    Unknown,
}

impl FileEventKind {
    /// Whether a new entry appeared at the path.
    ///
    /// A rename into the directory is a creation from the watcher's point of
    /// view: the name did not exist before.
    pub fn is_creation(self) -> bool {
        matches!(self, Self::Created | Self::RenamedTo)
    }
}

impl From<notify::EventKind> for FileEventKind {
    fn from(kind: notify::EventKind) -> Self {
        match kind {
            notify::EventKind::Create(_) => Self::Created,
            notify::EventKind::Modify(modify_kind) => match modify_kind {
                ModifyKind::Name(RenameMode::From) => Self::RenamedFrom,
                ModifyKind::Name(RenameMode::To) => Self::RenamedTo,
                ModifyKind::Name(_) => Self::Unknown,
                ModifyKind::Metadata(_) => Self::MetadataChanged,
                _ => Self::Modified,
            },
            notify::EventKind::Remove(_) => Self::Removed,
            notify::EventKind::Access(_) => Self::Accessed,
            _ => Self::Unknown,
        }
    }
}
