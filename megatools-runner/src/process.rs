// Process spawning and control shared by both execution paths

use serde::{Deserialize, Serialize};
use std::io;
use std::path::PathBuf;
use std::process::Stdio;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProcessConfig {
    pub env: Vec<(String, String)>,
    pub working_directory: Option<PathBuf>,
}

impl ProcessConfig {
    /// Blocking command with both output channels piped
    pub(crate) fn std_command(&self, program: &str, args: &[String]) -> std::process::Command {
        let mut command = std::process::Command::new(program);
        command
            .args(args)
            .envs(self.env.iter().map(|(key, value)| (key, value)))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.working_directory {
            command.current_dir(dir);
        }
        command
    }

    /// Same as [`ProcessConfig::std_command`] for the tokio runtime
    pub(crate) fn tokio_command(&self, program: &str, args: &[String]) -> tokio::process::Command {
        let mut command = tokio::process::Command::new(program);
        command
            .args(args)
            .envs(self.env.iter().map(|(key, value)| (key, value)))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_directory {
            command.current_dir(dir);
        }
        command
    }
}

/// The live child process as seen by a progress callback
pub trait ProcessControl: Send {
    /// OS process id, `None` once the child has been reaped
    fn id(&self) -> Option<u32>;

    /// Forcefully stop the child. Its output channels reach end-of-stream afterwards.
    fn terminate(&mut self) -> io::Result<()>;
}

impl ProcessControl for std::process::Child {
    fn id(&self) -> Option<u32> {
        Some(std::process::Child::id(self))
    }

    fn terminate(&mut self) -> io::Result<()> {
        self.kill()
    }
}

impl ProcessControl for tokio::process::Child {
    fn id(&self) -> Option<u32> {
        tokio::process::Child::id(self)
    }

    fn terminate(&mut self) -> io::Result<()> {
        self.start_kill()
    }
}
