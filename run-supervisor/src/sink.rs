//! Output sinks that receive run banners and command output.

use std::io;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Destination for everything a run displays.
///
/// Calls are made while the generation lock is held, so implementations
/// should not block for long.
pub trait OutputSink: Send + Sync + 'static {
    /// Discard all displayed content and mark the sink clean.
    fn reset(&self) -> io::Result<()>;

    /// Append output bytes.
    fn append(&self, bytes: &[u8]) -> io::Result<()>;

    /// Mark the content as unmodified.
    fn mark_clean(&self) -> io::Result<()>;

    /// Move focus to the start of the content and make it visible.
    fn show_start(&self) -> io::Result<()>;
}

/// In-memory sink. Useful for capturing runs and in tests.
#[derive(Debug, Default)]
pub struct BufferSink {
    state: Mutex<BufferState>,
}

#[derive(Debug, Default)]
struct BufferState {
    content: Vec<u8>,
    dirty: bool,
    resets: usize,
    at_start: bool,
}

impl BufferSink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw content since the last reset.
    pub fn contents(&self) -> Vec<u8> {
        self.lock().content.clone()
    }

    /// Content since the last reset, lossily decoded.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.lock().content).into_owned()
    }

    /// Whether the content has been marked clean since the last append.
    pub fn is_clean(&self) -> bool {
        !self.lock().dirty
    }

    /// Number of resets so far, one per run started.
    pub fn resets(&self) -> usize {
        self.lock().resets
    }

    /// Whether focus was moved to the start after the last append.
    pub fn is_at_start(&self) -> bool {
        self.lock().at_start
    }

    fn lock(&self) -> MutexGuard<'_, BufferState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl OutputSink for BufferSink {
    fn reset(&self) -> io::Result<()> {
        let mut state = self.lock();
        state.content.clear();
        state.dirty = false;
        state.at_start = false;
        state.resets += 1;
        Ok(())
    }

    fn append(&self, bytes: &[u8]) -> io::Result<()> {
        let mut state = self.lock();
        state.content.extend_from_slice(bytes);
        state.dirty = true;
        state.at_start = false;
        Ok(())
    }

    fn mark_clean(&self) -> io::Result<()> {
        self.lock().dirty = false;
        Ok(())
    }

    fn show_start(&self) -> io::Result<()> {
        self.lock().at_start = true;
        Ok(())
    }
}
