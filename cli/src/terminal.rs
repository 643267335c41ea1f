//! Terminal front end: stdout sink and stdin request bridge.

use std::io::{self, Write};

use rewatch_run_supervisor::OutputSink;
use rewatch_utils_trigger::Trigger;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

const CLEAR_SCREEN: &[u8] = b"\x1b[2J\x1b[H";

enum WriterCommand {
    Clear,
    Write(Vec<u8>),
    Flush(oneshot::Sender<()>),
}

/// Writes run output to stdout from a dedicated thread.
///
/// Sink calls only queue work, so a stalled stdout never blocks the
/// supervisor or its reader tasks while they hold the generation lock.
#[derive(Debug, Clone)]
pub struct TerminalSink {
    clear_screen: bool,
    tx: mpsc::UnboundedSender<WriterCommand>,
}

impl std::fmt::Debug for WriterCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Clear => f.write_str("Clear"),
            Self::Write(bytes) => write!(f, "Write({} bytes)", bytes.len()),
            Self::Flush(_) => f.write_str("Flush"),
        }
    }
}

impl TerminalSink {
    /// Start a sink writing to stdout.
    pub fn stdout(clear_screen: bool) -> io::Result<Self> {
        Self::with_writer(clear_screen, io::stdout())
    }

    /// Start a sink writing to `out`.
    pub fn with_writer<W>(clear_screen: bool, out: W) -> io::Result<Self>
    where
        W: Write + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        std::thread::Builder::new()
            .name("rewatch-stdout".to_string())
            .spawn(move || write_loop(out, rx))?;
        Ok(Self { clear_screen, tx })
    }

    /// Wait until everything queued so far has been written.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(WriterCommand::Flush(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }

    fn send(&self, command: WriterCommand) -> io::Result<()> {
        self.tx
            .send(command)
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "terminal writer stopped"))
    }
}

fn write_loop<W: Write>(mut out: W, mut rx: mpsc::UnboundedReceiver<WriterCommand>) {
    while let Some(command) = rx.blocking_recv() {
        let result = match command {
            WriterCommand::Clear => out.write_all(CLEAR_SCREEN).and_then(|()| out.flush()),
            WriterCommand::Write(bytes) => out.write_all(&bytes).and_then(|()| out.flush()),
            WriterCommand::Flush(done) => {
                let result = out.flush();
                let _ = done.send(());
                result
            }
        };
        if let Err(e) = result {
            warn!("Writing to the terminal failed: {e}");
        }
    }
}

impl OutputSink for TerminalSink {
    fn reset(&self) -> io::Result<()> {
        if self.clear_screen {
            self.send(WriterCommand::Clear)?;
        }
        Ok(())
    }

    fn append(&self, bytes: &[u8]) -> io::Result<()> {
        self.send(WriterCommand::Write(bytes.to_vec()))
    }

    // A terminal has no modified state.
    fn mark_clean(&self) -> io::Result<()> {
        Ok(())
    }

    // Output is already at the bottom of the terminal.
    fn show_start(&self) -> io::Result<()> {
        Ok(())
    }
}

/// A request typed by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserRequest {
    /// `Get`: rerun now.
    Rerun,

    /// `Del`: close the window and exit.
    Close,
}

/// Parse one input line. Unknown lines yield `None`.
pub fn parse_request(line: &str) -> Option<UserRequest> {
    match line.trim() {
        "Get" => Some(UserRequest::Rerun),
        "Del" => Some(UserRequest::Close),
        _ => None,
    }
}

/// Why [`forward_requests`] stopped reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEnd {
    /// The user asked to close.
    Closed,

    /// The input ran out.
    Eof,
}

impl InputEnd {
    /// Whether this should stop the program.
    ///
    /// Running out of input only counts as closing when a user was typing
    /// at a terminal; a redirected or absent stdin just means no requests.
    pub fn requests_close(self, interactive: bool) -> bool {
        match self {
            Self::Closed => true,
            Self::Eof => interactive,
        }
    }
}

/// Read requests from `input`, firing `trigger` on every `Get`.
///
/// Returns when the user asks to close or the input ends.
pub async fn forward_requests<R>(input: R, trigger: Trigger) -> io::Result<InputEnd>
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(input).lines();
    while let Some(line) = lines.next_line().await? {
        match parse_request(&line) {
            Some(UserRequest::Rerun) => {
                debug!("Rerun requested: {:?}", trigger.fire());
            }
            Some(UserRequest::Close) => {
                debug!("Close requested");
                return Ok(InputEnd::Closed);
            }
            None if line.trim().is_empty() => {}
            None => warn!("Ignoring unknown request {line:?}"),
        }
    }
    debug!("Input closed");
    Ok(InputEnd::Eof)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuffer {
        fn contents(&self) -> Vec<u8> {
            self.0.lock().unwrap().clone()
        }
    }

    #[tokio::test]
    async fn test_sink_writes_in_order_with_clear() {
        let out = SharedBuffer::default();
        let sink = TerminalSink::with_writer(true, out.clone()).unwrap();

        sink.append(b"stale\n").unwrap();
        sink.reset().unwrap();
        sink.append(b"$ make\n").unwrap();
        sink.flush().await;

        let mut expected = b"stale\n".to_vec();
        expected.extend_from_slice(CLEAR_SCREEN);
        expected.extend_from_slice(b"$ make\n");
        assert_eq!(out.contents(), expected);
    }

    #[tokio::test]
    async fn test_sink_without_clear_keeps_history() {
        let out = SharedBuffer::default();
        let sink = TerminalSink::with_writer(false, out.clone()).unwrap();

        sink.append(b"one\n").unwrap();
        sink.reset().unwrap();
        sink.append(b"two\n").unwrap();
        sink.flush().await;

        assert_eq!(out.contents(), b"one\ntwo\n");
    }

    #[test]
    fn test_parse_request() {
        assert_eq!(parse_request("Get"), Some(UserRequest::Rerun));
        assert_eq!(parse_request("Del\r"), Some(UserRequest::Close));
        assert_eq!(parse_request("Put"), None);
        assert_eq!(parse_request(""), None);
    }

    #[tokio::test]
    async fn test_get_fires_trigger() {
        let (trigger, mut rx) = rewatch_utils_trigger::channel();

        let end = forward_requests(&b"Get\nbogus\n"[..], trigger).await.unwrap();

        assert_eq!(end, InputEnd::Eof);
        assert!(rx.try_recv());
        assert!(!rx.try_recv());
    }

    #[tokio::test]
    async fn test_del_stops_reading() {
        let (trigger, mut rx) = rewatch_utils_trigger::channel();

        let end = forward_requests(&b"Del\nGet\n"[..], trigger).await.unwrap();

        assert_eq!(end, InputEnd::Closed);
        assert!(!rx.try_recv());
    }

    #[tokio::test]
    async fn test_empty_input_is_eof() {
        let (trigger, _rx) = rewatch_utils_trigger::channel();
        assert_eq!(forward_requests(&b""[..], trigger).await.unwrap(), InputEnd::Eof);
    }

    #[test]
    fn test_eof_closes_only_interactive_sessions() {
        assert!(InputEnd::Closed.requests_close(false));
        assert!(InputEnd::Closed.requests_close(true));
        assert!(InputEnd::Eof.requests_close(true));
        assert!(!InputEnd::Eof.requests_close(false));
    }
}
