//! `rewatch`: rerun a command whenever files matching a pattern change.
//!
//! ```text
//!   DirectoryWatcher ──┐
//!   stdin (Get/Del)  ──┼──► Trigger ──► RunSupervisor ──► TerminalSink (stdout)
//!   startup          ──┘
//! ```

pub mod app;
pub mod cli;
pub mod config;
pub mod logging;
pub mod terminal;

pub use app::{Shutdown, run};
pub use cli::Cli;
pub use config::{LoggingConfig, OutputConfig, RewatchConfig};
pub use terminal::{InputEnd, TerminalSink, UserRequest, forward_requests, parse_request};
