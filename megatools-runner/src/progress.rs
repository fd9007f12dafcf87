//! Progress callbacks invoked once per decoded output line

use crate::process::ProcessControl;
use async_trait::async_trait;
use megatools_core::{Channel, OutputStream};
use std::fmt;
use std::io::{self, Write};

/// What a callback sees for each line
#[derive(Debug, Clone, Copy)]
pub struct LineEvent<'a> {
    /// Everything read from the line's channel so far, newest line last
    pub stream: &'a OutputStream,
    /// Extra arguments supplied by the caller, forwarded untouched
    pub args: &'a [String],
}

impl<'a> LineEvent<'a> {
    pub fn channel(&self) -> Channel {
        self.stream.channel()
    }

    /// The line that triggered this event
    pub fn line(&self) -> &'a str {
        self.stream.last().unwrap_or_default()
    }
}

/// Callback run directly on the blocking path
pub trait SyncProgress: Send {
    fn on_line(&mut self, event: &LineEvent<'_>, process: &mut dyn ProcessControl);
}

impl<F> SyncProgress for F
where
    F: FnMut(&LineEvent<'_>, &mut dyn ProcessControl) + Send,
{
    fn on_line(&mut self, event: &LineEvent<'_>, process: &mut dyn ProcessControl) {
        self(event, process)
    }
}

/// Callback awaited on the suspendable path
#[async_trait]
pub trait AsyncProgress: Send {
    async fn on_line(&mut self, event: &LineEvent<'_>, process: &mut dyn ProcessControl);
}

/// Writes each new line to a sink with no added formatting
pub struct EchoProgress<W = io::Stdout> {
    writer: W,
}

impl EchoProgress<io::Stdout> {
    pub fn stdout() -> Self {
        Self {
            writer: io::stdout(),
        }
    }
}

impl<W: Write + Send> EchoProgress<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn echo(&mut self, line: &str) {
        // A closed sink must not abort the transfer
        let _ = self
            .writer
            .write_all(line.as_bytes())
            .and_then(|_| self.writer.flush());
    }
}

impl<W: Write + Send> SyncProgress for EchoProgress<W> {
    fn on_line(&mut self, event: &LineEvent<'_>, _process: &mut dyn ProcessControl) {
        self.echo(event.line());
    }
}

#[async_trait]
impl<W: Write + Send> AsyncProgress for EchoProgress<W> {
    async fn on_line(&mut self, event: &LineEvent<'_>, _process: &mut dyn ProcessControl) {
        self.echo(event.line());
    }
}

/// Terminates the child as soon as a non-empty line arrives
#[derive(Debug, Default, Clone, Copy)]
pub struct StopOnFirstLine;

impl StopOnFirstLine {
    fn stop(&self, event: &LineEvent<'_>, process: &mut dyn ProcessControl) {
        if event.line().is_empty() {
            return;
        }
        if let Err(e) = process.terminate() {
            tracing::warn!(pid = ?process.id(), error = %e, "Failed to terminate process");
        }
    }
}

impl SyncProgress for StopOnFirstLine {
    fn on_line(&mut self, event: &LineEvent<'_>, process: &mut dyn ProcessControl) {
        self.stop(event, process);
    }
}

#[async_trait]
impl AsyncProgress for StopOnFirstLine {
    async fn on_line(&mut self, event: &LineEvent<'_>, process: &mut dyn ProcessControl) {
        self.stop(event, process);
    }
}

/// Callback selection for one invocation.
///
/// The calling convention is part of the variant: the blocking path refuses
/// [`Progress::Async`] and the suspendable path refuses [`Progress::Sync`].
/// [`Progress::Default`] echoes lines to stdout in whichever convention the
/// running path needs.
#[derive(Default)]
pub enum Progress {
    Silent,
    #[default]
    Default,
    Sync(Box<dyn SyncProgress>),
    Async(Box<dyn AsyncProgress>),
}

impl Progress {
    pub fn sync<P: SyncProgress + 'static>(progress: P) -> Self {
        Progress::Sync(Box::new(progress))
    }

    /// Wrap a closure; its argument types are inferred from the signature
    pub fn from_fn<F>(callback: F) -> Self
    where
        F: FnMut(&LineEvent<'_>, &mut dyn ProcessControl) + Send + 'static,
    {
        Progress::Sync(Box::new(callback))
    }

    pub fn from_async<P: AsyncProgress + 'static>(progress: P) -> Self {
        Progress::Async(Box::new(progress))
    }

    pub fn is_async(&self) -> bool {
        matches!(self, Progress::Async(_))
    }
}

impl fmt::Debug for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Progress::Silent => f.write_str("Silent"),
            Progress::Default => f.write_str("Default"),
            Progress::Sync(_) => f.write_str("Sync(..)"),
            Progress::Async(_) => f.write_str("Async(..)"),
        }
    }
}
