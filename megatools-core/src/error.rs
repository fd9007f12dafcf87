use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MegaError {
    /// The executable wrote to its error channel. `message` has its leading tag removed.
    #[error("[returnCode {}] {message}", format_exit_code(.exit_code))]
    Execution {
        exit_code: Option<i32>,
        message: String,
    },

    #[error("Failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Calling convention mismatch: {0}")]
    CallingConvention(&'static str),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Executable not found: {}", .0.display())]
    ExecutableNotFound(PathBuf),

    #[error("Unexpected output: {0}")]
    UnexpectedOutput(String),
}

impl MegaError {
    /// Message of a classified execution failure, `None` for every other kind.
    pub fn execution_message(&self) -> Option<&str> {
        match self {
            MegaError::Execution { message, .. } => Some(message),
            _ => None,
        }
    }
}

fn format_exit_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "signal".to_string(),
    }
}

pub type Result<T> = std::result::Result<T, MegaError>;
