//! Top-level loop wiring the watcher, the supervisor and the terminal.

use std::io::IsTerminal;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use rewatch_directory_watcher::{
    DirectoryWatcher, NotifyBackend, WatchConfig, WatchExit, WatchOutcome,
};
use rewatch_run_supervisor::{CommandSpec, RunSupervisor};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::cli::Cli;
use crate::config::RewatchConfig;
use crate::terminal::{InputEnd, TerminalSink, forward_requests};

/// Why the program stopped without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shutdown {
    /// The user asked to close, or input ended at a terminal.
    Closed,

    /// Interrupted by Ctrl-C.
    Interrupted,

    /// The root watcher finished cleanly.
    RootFinished(WatchExit),
}

/// Run until the user closes, the root watcher ends, or a watcher fails
/// fatally.
pub async fn run(cli: Cli, config: RewatchConfig) -> Result<Shutdown> {
    let command = CommandSpec::new(cli.command)?;
    let clear_screen = config.output.clear_screen && !cli.no_clear;
    let sink = Arc::new(TerminalSink::stdout(clear_screen).context("starting terminal output")?);
    let notifier = NotifyBackend::new().context("starting file notifications")?;

    let (trigger, triggers) = rewatch_utils_trigger::channel();
    trigger.fire();
    tokio::spawn(RunSupervisor::new(command, sink.clone()).run(triggers));

    let (close_tx, mut close_rx) = mpsc::channel::<()>(1);
    if !cli.no_input {
        let trigger = trigger.clone();
        let close_tx = close_tx.clone();
        let interactive = std::io::stdin().is_terminal();
        tokio::spawn(async move {
            let end = match forward_requests(tokio::io::stdin(), trigger).await {
                Ok(end) => end,
                Err(e) => {
                    warn!("Reading requests failed: {e}");
                    InputEnd::Eof
                }
            };
            if end.requests_close(interactive) {
                let _ = close_tx.send(()).await;
            } else {
                debug!("No more requests from stdin");
            }
        });
    }

    let watch = WatchConfig::new(cli.root, cli.pattern).with_quota(config.watch);
    let (watcher, mut outcomes) = DirectoryWatcher::new(watch, Arc::new(notifier), trigger);
    watcher.start();

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let shutdown = loop {
        tokio::select! {
            outcome = outcomes.recv() => {
                let Some(outcome) = outcome else {
                    bail!("watcher completion channel closed");
                };
                if let Some(shutdown) = handle_outcome(outcome)? {
                    break shutdown;
                }
            }
            _ = close_rx.recv() => break Shutdown::Closed,
            result = &mut ctrl_c => {
                result.context("listening for Ctrl-C")?;
                break Shutdown::Interrupted;
            }
        }
    };

    drop(close_tx);
    info!("Shutting down: {shutdown:?}");
    sink.flush().await;
    Ok(shutdown)
}

/// Decide what a finished watcher means for the program.
///
/// Returns `Ok(Some(_))` when the program should stop cleanly and an error
/// when it should stop with a failure.
pub fn handle_outcome(outcome: WatchOutcome) -> Result<Option<Shutdown>> {
    let fatal = outcome.is_fatal();
    let WatchOutcome { path, root, result } = outcome;
    match result {
        Err(e) if fatal => Err(anyhow::Error::new(e))
            .with_context(|| format!("watcher for {} exited badly", path.display())),
        Err(e) => {
            warn!("Watcher for {} stopped: {e}", path.display());
            Ok(None)
        }
        Ok(exit) if root => Ok(Some(Shutdown::RootFinished(exit))),
        Ok(exit) => {
            debug!("Watcher for {} finished: {exit:?}", path.display());
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rewatch_directory_watcher::WatcherError;
    use std::path::PathBuf;

    fn outcome(root: bool, result: rewatch_directory_watcher::Result<WatchExit>) -> WatchOutcome {
        WatchOutcome {
            path: PathBuf::from("/tree/sub"),
            root,
            result,
        }
    }

    #[test]
    fn test_root_finishing_shuts_down() {
        let shutdown = handle_outcome(outcome(true, Ok(WatchExit::Removed))).unwrap();
        assert_eq!(shutdown, Some(Shutdown::RootFinished(WatchExit::Removed)));
    }

    #[test]
    fn test_child_finishing_keeps_running() {
        assert_eq!(handle_outcome(outcome(false, Ok(WatchExit::Removed))).unwrap(), None);
    }

    #[test]
    fn test_child_stream_error_keeps_running() {
        let result = Err(WatcherError::StreamBroken(PathBuf::from("/tree/sub")));
        assert_eq!(handle_outcome(outcome(false, result)).unwrap(), None);
    }

    #[test]
    fn test_subscribe_failure_is_fatal() {
        let source = WatcherError::Config("no such directory".to_string());
        let result = Err(WatcherError::subscribe("/tree/sub", source));

        let err = handle_outcome(outcome(false, result)).unwrap_err();
        assert_eq!(err.to_string(), "watcher for /tree/sub exited badly");
    }
}
