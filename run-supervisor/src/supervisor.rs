//! Run supervisor.
//!
//! Consumes the trigger channel. Each trigger starts a new generation,
//! signals the previous process to stop, resets the sink and launches the
//! command. A reader task per run streams output into the sink only while
//! its generation is still current, so output from a superseded run never
//! lands after the reset of the run that replaced it.

use std::sync::Arc;

use rewatch_utils_trigger::TriggerReceiver;
use tokio::process::Child;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Result, SupervisorError};
use crate::generation::Generation;
use crate::process::{CommandSpec, Launched, describe_exit};
use crate::sink::OutputSink;

/// Completion marker appended when a run ends.
pub const PROMPT: &[u8] = b"$\n";

/// How a launched run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunEnd {
    /// The process exited successfully.
    ExitedOk,

    /// The process exited with a failure status or could not be waited on.
    ExitedError,
}

/// The most recently launched process.
struct ActiveRun {
    id: u64,
    cancel: CancellationToken,
    task: JoinHandle<RunEnd>,
}

/// Reruns a command on every trigger, preempting the previous run.
pub struct RunSupervisor {
    command: Arc<CommandSpec>,
    sink: Arc<dyn OutputSink>,
    generation: Arc<Generation>,
    active: Option<ActiveRun>,
}

impl RunSupervisor {
    /// Create a supervisor for `command` writing to `sink`.
    pub fn new(command: CommandSpec, sink: Arc<dyn OutputSink>) -> Self {
        Self {
            command: Arc::new(command),
            sink,
            generation: Arc::new(Generation::new()),
            active: None,
        }
    }

    /// The generation counter shared with reader tasks.
    pub fn generation(&self) -> &Arc<Generation> {
        &self.generation
    }

    /// Start a run for every trigger until all triggers are dropped.
    pub async fn run(mut self, mut triggers: TriggerReceiver) {
        while triggers.recv().await.is_some() {
            if let Err(e) = self.start_run() {
                warn!("Run failed to start: {e}");
            }
        }

        info!("Trigger channel closed, supervisor stopping");
        if let Some(active) = self.active.take() {
            active.cancel.cancel();
        }
    }

    /// Start a new generation and launch the command.
    ///
    /// Returns the new generation id. Launch failures are reported to the
    /// sink before being returned.
    pub fn start_run(&mut self) -> Result<u64> {
        let id = self.generation.advance();

        if let Some(previous) = self.active.take() {
            debug!("Run {} superseded by run {id}", previous.id);
            previous.cancel.cancel();
        }

        let line = self.command.command_line();
        write_if_current(&self.generation, self.sink.as_ref(), id, |sink| {
            sink.reset()?;
            sink.append(format!("$ {line}\n").as_bytes())
        });

        let Launched { child, output } = match self.command.spawn() {
            Ok(launched) => launched,
            Err(source) => {
                write_if_current(&self.generation, self.sink.as_ref(), id, |sink| {
                    sink.append(format!("{line}: {source}\n").as_bytes())
                });
                return Err(SupervisorError::Launch {
                    command: line,
                    source,
                });
            }
        };

        info!("Run {id} launched: {line}");
        let cancel = CancellationToken::new();
        let reader = OutputReader {
            id,
            line,
            child,
            output,
            cancel: cancel.clone(),
            generation: self.generation.clone(),
            sink: self.sink.clone(),
        };
        let task = tokio::spawn(reader.stream());
        self.active = Some(ActiveRun { id, cancel, task });
        Ok(id)
    }

    /// Wait for the active run's reader to finish.
    ///
    /// Returns `None` when there is no active run.
    pub async fn wait_for_active_run(&mut self) -> Option<RunEnd> {
        let active = self.active.take()?;
        active.task.await.ok()
    }
}

/// Write to the sink under the generation lock if `id` is still live.
fn write_if_current(
    generation: &Generation,
    sink: &dyn OutputSink,
    id: u64,
    write: impl FnOnce(&dyn OutputSink) -> std::io::Result<()>,
) -> bool {
    match generation.if_current(id, || write(sink)) {
        Some(Ok(())) => true,
        Some(Err(e)) => {
            warn!("Failed to write run {id} output: {e}");
            true
        }
        None => false,
    }
}

/// Per-run task that owns the child process and its combined output.
struct OutputReader {
    id: u64,
    line: String,
    child: Child,
    output: mpsc::Receiver<std::io::Result<Vec<u8>>>,
    cancel: CancellationToken,
    generation: Arc<Generation>,
    sink: Arc<dyn OutputSink>,
}

impl OutputReader {
    async fn stream(mut self) -> RunEnd {
        let mut kill_sent = false;

        loop {
            tokio::select! {
                chunk = self.output.recv() => match chunk {
                    Some(Ok(bytes)) => {
                        self.write(&bytes);
                    }
                    Some(Err(e)) => {
                        debug!("Run {} output read failed: {e}", self.id);
                        break;
                    }
                    None => break,
                },
                _ = self.cancel.cancelled(), if !kill_sent => {
                    self.kill();
                    kill_sent = true;
                }
            }
        }

        let status = tokio::select! {
            status = self.child.wait() => status,
            _ = self.cancel.cancelled(), if !kill_sent => {
                self.kill();
                self.child.wait().await
            }
        };

        let end = match status {
            Ok(status) if status.success() => RunEnd::ExitedOk,
            Ok(status) => {
                let message = format!("{}: {}\n", self.line, describe_exit(status));
                self.write(message.as_bytes());
                RunEnd::ExitedError
            }
            Err(e) => {
                let message = format!("{}: {e}\n", self.line);
                self.write(message.as_bytes());
                RunEnd::ExitedError
            }
        };

        self.write(PROMPT);
        self.generation.serialized(|| {
            if let Err(e) = self.sink.show_start().and_then(|()| self.sink.mark_clean()) {
                warn!("Failed to finish run {} output: {e}", self.id);
            }
        });
        debug!("Run {} retired: {end:?}", self.id);
        end
    }

    fn write(&self, bytes: &[u8]) -> bool {
        write_if_current(&self.generation, self.sink.as_ref(), self.id, |sink| {
            sink.append(bytes)
        })
    }

    fn kill(&mut self) {
        debug!("Killing superseded run {}", self.id);
        if let Err(e) = self.child.start_kill() {
            debug!("Run {} already gone: {e}", self.id);
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::sink::BufferSink;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn supervisor(argv: &[&str]) -> (RunSupervisor, Arc<BufferSink>) {
        let sink = Arc::new(BufferSink::new());
        let command = CommandSpec::new(argv.iter().copied()).unwrap();
        (RunSupervisor::new(command, sink.clone()), sink)
    }

    async fn wait_for_text(sink: &BufferSink, needle: &str) {
        tokio::time::timeout(Duration::from_secs(10), async {
            while !sink.text().contains(needle) {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_successful_run() {
        let (mut supervisor, sink) = supervisor(&["echo", "done"]);

        assert_eq!(supervisor.start_run().unwrap(), 1);
        assert_eq!(supervisor.wait_for_active_run().await, Some(RunEnd::ExitedOk));

        assert_eq!(sink.text(), "$ echo done\ndone\n$\n");
        assert!(sink.is_clean());
        assert!(sink.is_at_start());
    }

    #[tokio::test]
    async fn test_failing_run_reports_exit_status() {
        let (mut supervisor, sink) = supervisor(&["sh", "-c", "echo oops >&2; exit 3"]);

        supervisor.start_run().unwrap();
        assert_eq!(supervisor.wait_for_active_run().await, Some(RunEnd::ExitedError));

        assert_eq!(
            sink.text(),
            "$ sh -c echo oops >&2; exit 3\noops\nsh -c echo oops >&2; exit 3: exit status 3\n$\n"
        );
    }

    #[tokio::test]
    async fn test_interleaved_stdout_and_stderr_keep_their_order() {
        let script = "i=0; while [ $i -lt 200 ]; do echo o$i; echo e$i >&2; i=$((i+1)); done";
        let (mut supervisor, sink) = supervisor(&["sh", "-c", script]);

        supervisor.start_run().unwrap();
        assert_eq!(supervisor.wait_for_active_run().await, Some(RunEnd::ExitedOk));

        let expected: String = (0..200).map(|i| format!("o{i}\ne{i}\n")).collect();
        assert_eq!(sink.text(), format!("$ sh -c {script}\n{expected}$\n"));
    }

    #[tokio::test]
    async fn test_missing_command_reports_inline_and_stays_ready() {
        let (mut supervisor, sink) = supervisor(&["rewatch-no-such-command"]);

        let err = supervisor.start_run().unwrap_err();
        assert!(matches!(err, SupervisorError::Launch { .. }));
        assert_eq!(supervisor.wait_for_active_run().await, None);

        let text = sink.text();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "$ rewatch-no-such-command");
        assert!(lines[1].starts_with("rewatch-no-such-command: "));

        assert!(supervisor.start_run().is_err());
        assert_eq!(sink.resets(), 2);
        assert_eq!(supervisor.generation().current(), 2);
    }

    #[tokio::test]
    async fn test_superseded_run_output_is_discarded() {
        let (mut supervisor, sink) = supervisor(&["sh", "-c", "echo start; sleep 1; echo end"]);

        let first = supervisor.start_run().unwrap();
        wait_for_text(&sink, "start").await;

        let second = supervisor.start_run().unwrap();
        assert!(!supervisor.generation().is_current(first));
        assert!(supervisor.generation().is_current(second));

        assert_eq!(supervisor.wait_for_active_run().await, Some(RunEnd::ExitedOk));
        assert_eq!(
            sink.text(),
            "$ sh -c echo start; sleep 1; echo end\nstart\nend\n$\n"
        );
        assert_eq!(sink.resets(), 2);
    }

    #[tokio::test]
    async fn test_burst_of_triggers_runs_once() {
        let (supervisor, sink) = supervisor(&["echo", "done"]);
        let (trigger, triggers) = rewatch_utils_trigger::channel();
        for _ in 0..5 {
            trigger.fire();
        }

        let handle = tokio::spawn(supervisor.run(triggers));
        wait_for_text(&sink, "done\n$\n").await;
        drop(trigger);
        handle.await.unwrap();

        assert_eq!(sink.resets(), 1);
        assert_eq!(sink.text(), "$ echo done\ndone\n$\n");
    }
}
