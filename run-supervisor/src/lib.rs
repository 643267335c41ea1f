//! # Run Supervisor
//!
//! Reruns a command whenever the trigger fires, keeping only one run live.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      Run Supervisor                             │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  TriggerReceiver ──► RunSupervisor ──► CommandSpec::spawn       │
//! │                          │                   │                  │
//! │                          ▼                   ▼                  │
//! │                      Generation ◄──── OutputReader ──► Sink     │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every run gets a fresh generation id. The reader task of a run writes to
//! the sink only while its id is the live one; superseded runs are signaled
//! to stop and their remaining output is dropped.

pub mod error;
pub mod generation;
pub mod process;
pub mod sink;
pub mod supervisor;

pub use error::{Result, SupervisorError};
pub use generation::Generation;
pub use process::{CommandSpec, describe_exit};
pub use sink::{BufferSink, OutputSink};
pub use supervisor::{PROMPT, RunEnd, RunSupervisor};
