use crate::config::MegatoolsConfig;
use crate::executor::LineExecutor;
use crate::install::{self, executable_file_name};
use crate::progress::{Progress, StopOnFirstLine};
use megatools_core::{CommandLine, ExecutionOutput, MegaError, OptionSet, OptionValue, Result};
use megatools_parser::{classify_error, parse_filename, parse_version};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use tracing::warn;

/// One `dl` invocation
#[derive(Debug, Default)]
pub struct FetchRequest {
    pub url: String,
    pub progress: Progress,
    /// Forwarded to every progress callback invocation
    pub progress_args: Vec<String>,
    /// Run on the suspendable path even if `progress` is not async
    pub assume_async: bool,
    pub options: OptionSet,
}

impl FetchRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_progress(mut self, progress: Progress) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_progress_args(mut self, args: Vec<String>) -> Self {
        self.progress_args = args;
        self
    }

    pub fn assume_async(mut self, assume: bool) -> Self {
        self.assume_async = assume;
        self
    }

    pub fn with_option(mut self, name: impl Into<String>, value: impl Into<OptionValue>) -> Self {
        self.options.set(name, value);
        self
    }

    pub fn with_options(mut self, options: OptionSet) -> Self {
        self.options = self.options.merged(&options);
        self
    }

    /// Whether [`Megatools::fetch`] takes the suspendable path
    pub fn is_async(&self) -> bool {
        self.assume_async || self.progress.is_async()
    }
}

pub type PendingFetch<'a> = Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>>;

/// Outcome of [`Megatools::fetch`]
pub enum Fetch<'a> {
    /// The blocking path already ran
    Complete(Result<String>),
    /// The suspendable path; nothing runs until polled
    Pending(PendingFetch<'a>),
}

impl<'a> Fetch<'a> {
    pub fn is_pending(&self) -> bool {
        matches!(self, Fetch::Pending(_))
    }

    /// Stdout of the transfer, awaiting it first if it is still pending
    pub async fn resolve(self) -> Result<String> {
        match self {
            Fetch::Complete(result) => result,
            Fetch::Pending(pending) => pending.await,
        }
    }
}

/// Entry point wrapping a megatools executable
#[derive(Debug, Clone)]
pub struct Megatools {
    executable: PathBuf,
    temp_dir: PathBuf,
    executor: LineExecutor,
}

impl Megatools {
    pub fn new<P: AsRef<Path>>(executable: P) -> Self {
        Self {
            executable: executable.as_ref().to_path_buf(),
            temp_dir: std::env::temp_dir(),
            executor: LineExecutor::new(),
        }
    }

    /// Use an executable that is already present; see [`install::locate`]
    pub fn from_config(config: &MegatoolsConfig) -> Result<Self> {
        let executable = install::locate(config).ok_or_else(|| {
            MegaError::ExecutableNotFound(config.temp_dir.join(executable_file_name()))
        })?;
        Ok(Self::with_parts(executable, config))
    }

    /// Like [`Megatools::from_config`], downloading the executable when it is missing
    pub async fn install(config: &MegatoolsConfig) -> Result<Self> {
        let executable = install::install(config).await?;
        Ok(Self::with_parts(executable, config))
    }

    fn with_parts(executable: PathBuf, config: &MegatoolsConfig) -> Self {
        Self {
            executable,
            temp_dir: config.temp_dir.clone(),
            executor: LineExecutor::with_config(config.process.clone()),
        }
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    fn command(&self, request: &FetchRequest) -> CommandLine {
        CommandLine::download(&self.executable, &request.url, &request.options)
    }

    /// Download, picking the path from the request.
    ///
    /// An async `progress` or `assume_async` yields [`Fetch::Pending`];
    /// anything else runs to completion on the calling thread. A default
    /// progress callback works on either path.
    pub fn fetch(&self, request: FetchRequest) -> Fetch<'_> {
        if request.is_async() {
            Fetch::Pending(Box::pin(self.download(request)))
        } else {
            Fetch::Complete(self.download_blocking(request))
        }
    }

    /// Download on the calling thread and return the executable's stdout
    pub fn download_blocking(&self, request: FetchRequest) -> Result<String> {
        self.execute_blocking(request).map(|output| output.stdout)
    }

    /// Download on the tokio runtime and return the executable's stdout
    pub async fn download(&self, request: FetchRequest) -> Result<String> {
        self.execute(request).await.map(|output| output.stdout)
    }

    /// Same as [`Megatools::download_blocking`], keeping the whole execution record
    pub fn execute_blocking(&self, request: FetchRequest) -> Result<ExecutionOutput> {
        let command = self.command(&request);
        let output =
            self.executor
                .execute_blocking(&command, request.progress, &request.progress_args)?;
        check(output)
    }

    /// Same as [`Megatools::download`], keeping the whole execution record
    pub async fn execute(&self, request: FetchRequest) -> Result<ExecutionOutput> {
        let command = self.command(&request);
        let output = self
            .executor
            .execute(&command, request.progress, &request.progress_args)
            .await?;
        check(output)
    }

    /// Version of the wrapped executable, e.g. `1.11.0`
    pub fn version(&self) -> Result<String> {
        let stdout = self.download_blocking(version_request())?;
        parse_version(&stdout)
    }

    pub async fn version_async(&self) -> Result<String> {
        let stdout = self.download(version_request()).await?;
        parse_version(&stdout)
    }

    /// Name of the remote file, without downloading it.
    ///
    /// The executable is stopped as soon as it prints the name.
    pub fn filename(&self, url: &str) -> Result<String> {
        let request = self.filename_request(url, Progress::sync(StopOnFirstLine));
        let stdout = self.download_blocking(request)?;
        parse_filename(&stdout)
    }

    pub async fn filename_async(&self, url: &str) -> Result<String> {
        let request = self.filename_request(url, Progress::from_async(StopOnFirstLine));
        let stdout = self.download(request).await?;
        parse_filename(&stdout)
    }

    fn filename_request(&self, url: &str, progress: Progress) -> FetchRequest {
        FetchRequest::new(url)
            .with_progress(progress)
            .with_option("print_names", true)
            .with_option("limit_speed", 1)
            .with_option("path", self.temp_dir.as_path())
    }
}

fn version_request() -> FetchRequest {
    FetchRequest::new("")
        .with_progress(Progress::Silent)
        .with_option("version", true)
}

fn check(output: ExecutionOutput) -> Result<ExecutionOutput> {
    if let Err(e) = classify_error(output.exit_code, &output.stderr) {
        warn!(execution_id = %output.id, error = %e, "Command reported an error");
        return Err(e);
    }
    Ok(output)
}
