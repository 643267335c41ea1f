//! Launching the configured command.

use std::io::{self, PipeReader, Read};
use std::process::{ExitStatus, Stdio};

use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::trace;

use crate::error::{Result, SupervisorError};

/// Size of a single output read.
pub const CHUNK_SIZE: usize = 4096;

/// Chunks queued between the pipe pump and the reader task.
const CHUNK_QUEUE: usize = 16;

/// The command rerun on every trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    program: String,
    args: Vec<String>,
}

/// A started command and its combined output.
pub(crate) struct Launched {
    pub(crate) child: Child,
    pub(crate) output: mpsc::Receiver<io::Result<Vec<u8>>>,
}

impl CommandSpec {
    /// Build from an argument vector whose first element is the program.
    pub fn new<I, S>(argv: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut argv = argv.into_iter().map(Into::into);
        let program = argv.next().ok_or(SupervisorError::EmptyCommand)?;
        Ok(Self {
            program,
            args: argv.collect(),
        })
    }

    /// The program name.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Arguments after the program.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Program and arguments joined by spaces, as shown in banners.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Start the command with stdout and stderr sharing one pipe and stdin
    /// closed.
    ///
    /// The pipe is drained on its own thread into the returned channel,
    /// which closes once every writer (the child and anything it spawned) is
    /// gone. The process is killed if its handle is dropped before it exits.
    pub(crate) fn spawn(&self) -> io::Result<Launched> {
        let (reader, writer) = io::pipe()?;
        // Our copies of the write end go away with `command` at the end of
        // this block, so the pipe closes when the child's copies do.
        let child = {
            let mut command = Command::new(&self.program);
            command
                .args(&self.args)
                .stdin(Stdio::null())
                .stdout(writer.try_clone()?)
                .stderr(writer)
                .kill_on_drop(true);
            command.spawn()?
        };

        // Detached, so a descendant holding the pipe open cannot block
        // runtime shutdown.
        let (tx, output) = mpsc::channel(CHUNK_QUEUE);
        std::thread::Builder::new()
            .name("rewatch-output".to_string())
            .spawn(move || pump(reader, &tx))?;
        Ok(Launched { child, output })
    }
}

/// Copy the pipe into `tx` until end of file, a read error, or the receiver
/// going away.
fn pump(mut reader: PipeReader, tx: &mpsc::Sender<io::Result<Vec<u8>>>) {
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let chunk = match reader.read(&mut buf) {
            Ok(0) => return,
            Ok(n) => Ok(buf[..n].to_vec()),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => Err(e),
        };
        let failed = chunk.is_err();
        if tx.blocking_send(chunk).is_err() {
            trace!("Output receiver gone, pump stopping");
            return;
        }
        if failed {
            return;
        }
    }
}

/// Describe an abnormal exit the way a shell would.
pub fn describe_exit(status: ExitStatus) -> String {
    if let Some(code) = status.code() {
        return format!("exit status {code}");
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return format!("signal: {signal}");
        }
    }
    status.to_string()
}
