use crate::process::ProcessConfig;
use crate::progress::{AsyncProgress, EchoProgress, LineEvent, Progress, SyncProgress};
use chrono::Utc;
use megatools_core::{
    decode_line, Channel, CommandLine, ExecutionOutput, MegaError, OutputStream, Result,
};
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader as AsyncBufReader};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Runs one executable invocation and relays its output line by line.
///
/// Both channels are drained one after the other, stdout first. A child that
/// fills the stderr pipe while stdout is still open will stall until stdout
/// closes.
#[derive(Debug, Clone, Default)]
pub struct LineExecutor {
    config: ProcessConfig,
}

impl LineExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ProcessConfig) -> Self {
        Self { config }
    }

    pub fn with_work_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.config.working_directory = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Execute on the calling thread, invoking `progress` directly for each line
    pub fn execute_blocking(
        &self,
        command: &CommandLine,
        progress: Progress,
        args: &[String],
    ) -> Result<ExecutionOutput> {
        let mut callback: Option<Box<dyn SyncProgress>> = match progress {
            Progress::Silent => None,
            Progress::Default => Some(Box::new(EchoProgress::stdout())),
            Progress::Sync(callback) => Some(callback),
            Progress::Async(_) => {
                return Err(MegaError::CallingConvention(
                    "progress callback must be sync on the blocking path",
                ))
            }
        };

        let id = Uuid::new_v4();
        let started_at = Utc::now();
        let start_instant = Instant::now();

        info!(
            execution_id = %id,
            program = %command.program(),
            args = ?command.args(),
            "Executing command"
        );

        let mut child = self
            .config
            .std_command(command.program(), command.args())
            .spawn()
            .map_err(|source| MegaError::Launch {
                program: command.program().to_string(),
                source,
            })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let drained = drain_blocking(stdout, Channel::Stdout, &mut child, &mut callback, args)
            .and_then(|out| {
                drain_blocking(stderr, Channel::Stderr, &mut child, &mut callback, args)
                    .map(|err| (out, err))
            });

        let (out, err) = match drained {
            Ok(streams) => streams,
            Err(e) => {
                warn!(execution_id = %id, error = %e, "Reading process output failed");
                let _ = child.kill();
                let _ = child.wait();
                return Err(e.into());
            }
        };

        let status = child.wait()?;
        Ok(finish(id, started_at, start_instant, out, err, status.code()))
    }

    /// Execute on the tokio runtime, awaiting `progress` for each line
    pub async fn execute(
        &self,
        command: &CommandLine,
        progress: Progress,
        args: &[String],
    ) -> Result<ExecutionOutput> {
        let mut callback: Option<Box<dyn AsyncProgress>> = match progress {
            Progress::Silent => None,
            Progress::Default => Some(Box::new(EchoProgress::stdout())),
            Progress::Async(callback) => Some(callback),
            Progress::Sync(_) => {
                return Err(MegaError::CallingConvention(
                    "progress callback must be async on the suspendable path",
                ))
            }
        };

        let id = Uuid::new_v4();
        let started_at = Utc::now();
        let start_instant = Instant::now();

        info!(
            execution_id = %id,
            program = %command.program(),
            args = ?command.args(),
            "Executing command"
        );

        let mut child = self
            .config
            .tokio_command(command.program(), command.args())
            .spawn()
            .map_err(|source| MegaError::Launch {
                program: command.program().to_string(),
                source,
            })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let out = drain(stdout, Channel::Stdout, &mut child, &mut callback, args).await?;
        let err = drain(stderr, Channel::Stderr, &mut child, &mut callback, args).await?;

        let status = child.wait().await?;
        Ok(finish(id, started_at, start_instant, out, err, status.code()))
    }
}

/// Read `reader` to end-of-stream, one line per callback invocation
fn drain_blocking<R: Read>(
    reader: Option<R>,
    channel: Channel,
    child: &mut std::process::Child,
    callback: &mut Option<Box<dyn SyncProgress>>,
    args: &[String],
) -> std::io::Result<OutputStream> {
    let mut stream = OutputStream::new(channel);
    let Some(reader) = reader else {
        return Ok(stream);
    };

    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        stream.push(decode_line(&buf));
        debug!(channel = %channel, line = stream.last().unwrap_or_default().trim_end(), "Read line");

        if let Some(callback) = callback.as_mut() {
            let event = LineEvent {
                stream: &stream,
                args,
            };
            callback.on_line(&event, &mut *child);
        }
    }
    Ok(stream)
}

async fn drain<R: AsyncRead + Unpin>(
    reader: Option<R>,
    channel: Channel,
    child: &mut tokio::process::Child,
    callback: &mut Option<Box<dyn AsyncProgress>>,
    args: &[String],
) -> Result<OutputStream> {
    let mut stream = OutputStream::new(channel);
    let Some(reader) = reader else {
        return Ok(stream);
    };

    let mut reader = AsyncBufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }
        stream.push(decode_line(&buf));
        debug!(channel = %channel, line = stream.last().unwrap_or_default().trim_end(), "Read line");

        if let Some(callback) = callback.as_mut() {
            let event = LineEvent {
                stream: &stream,
                args,
            };
            callback.on_line(&event, &mut *child).await;
        }
    }
    Ok(stream)
}

fn finish(
    id: Uuid,
    started_at: chrono::DateTime<Utc>,
    start_instant: Instant,
    out: OutputStream,
    err: OutputStream,
    exit_code: Option<i32>,
) -> ExecutionOutput {
    let duration_ms = start_instant.elapsed().as_millis() as u64;

    info!(
        execution_id = %id,
        exit_code = ?exit_code,
        stdout_lines = out.len(),
        stderr_lines = err.len(),
        duration_ms,
        "Command execution completed"
    );

    ExecutionOutput {
        id,
        stdout: out.finish(),
        stderr: err.finish(),
        exit_code,
        duration_ms,
        started_at,
        completed_at: Utc::now(),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::process::ProcessControl;
    use crate::progress::StopOnFirstLine;
    use crate::testing::fake_executable;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    fn command(executable: &Path) -> CommandLine {
        CommandLine::new(executable.to_string_lossy(), vec![])
    }

    type Seen = Arc<Mutex<Vec<(Channel, String, Vec<String>)>>>;

    fn recording() -> (Seen, Progress) {
        let seen: Seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let progress = Progress::from_fn(move |event, _process| {
            sink.lock().unwrap().push((
                event.channel(),
                event.line().to_string(),
                event.args.to_vec(),
            ));
        });
        (seen, progress)
    }

    struct AsyncRecorder {
        seen: Seen,
    }

    #[async_trait]
    impl AsyncProgress for AsyncRecorder {
        async fn on_line(&mut self, event: &LineEvent<'_>, _process: &mut dyn ProcessControl) {
            tokio::task::yield_now().await;
            self.seen.lock().unwrap().push((
                event.channel(),
                event.line().to_string(),
                event.args.to_vec(),
            ));
        }
    }

    #[test]
    fn test_execute_blocking_collects_stdout_lines() {
        let dir = tempfile::tempdir().unwrap();
        let exe = fake_executable(dir.path(), "printf 'one\\ntwo\\nthree\\n'");

        let output = LineExecutor::new()
            .execute_blocking(&command(&exe), Progress::Silent, &[])
            .unwrap();

        assert_eq!(output.stdout, "one\ntwo\nthree\n");
        assert_eq!(output.stderr, "");
        assert_eq!(output.exit_code, Some(0));
        assert!(output.completed_at >= output.started_at);
    }

    #[test]
    fn test_execute_blocking_callback_order_and_args() {
        let dir = tempfile::tempdir().unwrap();
        let exe = fake_executable(dir.path(), "echo out1; echo err1 >&2; echo out2");
        let (seen, progress) = recording();
        let args = vec!["label".to_string()];

        let output = LineExecutor::new()
            .execute_blocking(&command(&exe), progress, &args)
            .unwrap();

        let seen = seen.lock().unwrap();
        let lines: Vec<_> = seen.iter().map(|(c, l, _)| (*c, l.as_str())).collect();
        assert_eq!(
            lines,
            vec![
                (Channel::Stdout, "out1\n"),
                (Channel::Stdout, "out2\n"),
                (Channel::Stderr, "err1\n"),
            ]
        );
        assert!(seen.iter().all(|(_, _, a)| a == &args));
        assert_eq!(output.stderr, "err1\n");
    }

    #[test]
    fn test_execute_blocking_tolerates_invalid_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let exe = fake_executable(dir.path(), "printf 'bad \\377\\376 bytes\\n'");

        let output = LineExecutor::new()
            .execute_blocking(&command(&exe), Progress::Silent, &[])
            .unwrap();

        assert!(output.stdout.contains('\u{FFFD}'));
        assert!(output.stdout.ends_with(" bytes\n"));
    }

    #[test]
    fn test_execute_blocking_keeps_unterminated_last_line() {
        let dir = tempfile::tempdir().unwrap();
        let exe = fake_executable(dir.path(), "printf 'a\\nb'");

        let output = LineExecutor::new()
            .execute_blocking(&command(&exe), Progress::Silent, &[])
            .unwrap();

        assert_eq!(output.stdout, "a\nb");
    }

    #[test]
    fn test_execute_blocking_reports_exit_code_without_error() {
        let dir = tempfile::tempdir().unwrap();
        let exe = fake_executable(dir.path(), "echo 'ERROR: nope' >&2; exit 3");

        let output = LineExecutor::new()
            .execute_blocking(&command(&exe), Progress::Silent, &[])
            .unwrap();

        assert_eq!(output.exit_code, Some(3));
        assert_eq!(output.stderr, "ERROR: nope\n");
    }

    #[test]
    fn test_execute_blocking_rejects_async_callback_before_spawn() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("spawned");
        let exe = fake_executable(dir.path(), &format!("touch '{}'", marker.display()));
        let seen: Seen = Arc::default();

        let result = LineExecutor::new().execute_blocking(
            &command(&exe),
            Progress::from_async(AsyncRecorder { seen }),
            &[],
        );

        assert!(matches!(result, Err(MegaError::CallingConvention(_))));
        assert!(!marker.exists());
    }

    #[test]
    fn test_execute_blocking_launch_failure() {
        let result = LineExecutor::new().execute_blocking(
            &CommandLine::new("/nonexistent/megatools", vec![]),
            Progress::Silent,
            &[],
        );

        match result {
            Err(MegaError::Launch { program, .. }) => assert_eq!(program, "/nonexistent/megatools"),
            other => panic!("Expected Launch error, got: {:?}", other),
        }
    }

    #[test]
    fn test_execute_blocking_callback_can_terminate() {
        let dir = tempfile::tempdir().unwrap();
        let exe = fake_executable(dir.path(), "echo 'file.bin: 0%'; exec sleep 30");

        let start = Instant::now();
        let output = LineExecutor::new()
            .execute_blocking(&command(&exe), Progress::sync(StopOnFirstLine), &[])
            .unwrap();

        assert!(start.elapsed().as_secs() < 10);
        assert_eq!(output.stdout, "file.bin: 0%\n");
        assert_eq!(output.exit_code, None);
    }

    #[test]
    fn test_execute_blocking_uses_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        let exe = fake_executable(dir.path(), "pwd");
        let work = tempfile::tempdir().unwrap();

        let output = LineExecutor::new()
            .with_work_dir(work.path())
            .execute_blocking(&command(&exe), Progress::Silent, &[])
            .unwrap();

        assert_eq!(
            std::fs::canonicalize(output.stdout.trim()).unwrap(),
            std::fs::canonicalize(work.path()).unwrap()
        );
    }

    #[tokio::test]
    async fn test_execute_collects_like_blocking() {
        let dir = tempfile::tempdir().unwrap();
        let exe = fake_executable(dir.path(), "echo out1; echo err1 >&2; echo out2; exit 1");
        let seen: Seen = Arc::default();
        let args = vec!["ctx".to_string()];

        let output = LineExecutor::new()
            .execute(
                &command(&exe),
                Progress::from_async(AsyncRecorder {
                    seen: Arc::clone(&seen),
                }),
                &args,
            )
            .await
            .unwrap();

        assert_eq!(output.stdout, "out1\nout2\n");
        assert_eq!(output.stderr, "err1\n");
        assert_eq!(output.exit_code, Some(1));

        let seen = seen.lock().unwrap();
        let lines: Vec<_> = seen.iter().map(|(c, l, _)| (*c, l.as_str())).collect();
        assert_eq!(
            lines,
            vec![
                (Channel::Stdout, "out1\n"),
                (Channel::Stdout, "out2\n"),
                (Channel::Stderr, "err1\n"),
            ]
        );
        assert!(seen.iter().all(|(_, _, a)| a == &args));
    }

    #[tokio::test]
    async fn test_execute_rejects_sync_callback_before_spawn() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("spawned");
        let exe = fake_executable(dir.path(), &format!("touch '{}'", marker.display()));
        let (_seen, progress) = recording();

        let result = LineExecutor::new().execute(&command(&exe), progress, &[]).await;

        assert!(matches!(result, Err(MegaError::CallingConvention(_))));
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn test_execute_callback_can_terminate() {
        let dir = tempfile::tempdir().unwrap();
        let exe = fake_executable(dir.path(), "echo 'file.bin: 0%'; exec sleep 30");

        let output = LineExecutor::new()
            .execute(&command(&exe), Progress::from_async(StopOnFirstLine), &[])
            .await
            .unwrap();

        assert_eq!(output.stdout, "file.bin: 0%\n");
        assert_eq!(output.exit_code, None);
    }

    #[tokio::test]
    async fn test_execute_launch_failure() {
        let result = LineExecutor::new()
            .execute(
                &CommandLine::new("/nonexistent/megatools", vec![]),
                Progress::Silent,
                &[],
            )
            .await;

        assert!(matches!(result, Err(MegaError::Launch { .. })));
    }
}
