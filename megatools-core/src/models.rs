use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};
use std::fmt;
use std::path::Path;

/// Verb used for every transfer invocation
pub const DOWNLOAD_VERB: &str = "dl";

/// Always appended so the executable never blocks on an interactive password prompt
pub const NO_ASK_PASSWORD: &str = "--no-ask-password";

/// Value of a single command-line option
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum OptionValue {
    Switch(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionValue::Switch(value) => write!(f, "{}", value),
            OptionValue::Integer(value) => write!(f, "{}", value),
            OptionValue::Float(value) => write!(f, "{}", value),
            OptionValue::Text(value) => f.write_str(value),
        }
    }
}

impl From<bool> for OptionValue {
    fn from(value: bool) -> Self {
        OptionValue::Switch(value)
    }
}

impl From<i64> for OptionValue {
    fn from(value: i64) -> Self {
        OptionValue::Integer(value)
    }
}

impl From<i32> for OptionValue {
    fn from(value: i32) -> Self {
        OptionValue::Integer(value.into())
    }
}

impl From<u32> for OptionValue {
    fn from(value: u32) -> Self {
        OptionValue::Integer(value.into())
    }
}

impl From<f64> for OptionValue {
    fn from(value: f64) -> Self {
        OptionValue::Float(value)
    }
}

impl From<&str> for OptionValue {
    fn from(value: &str) -> Self {
        OptionValue::Text(value.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(value: String) -> Self {
        OptionValue::Text(value)
    }
}

impl From<&Path> for OptionValue {
    fn from(value: &Path) -> Self {
        OptionValue::Text(value.to_string_lossy().into_owned())
    }
}

/// Ordered set of options forwarded to the executable.
///
/// Names are kept as the caller wrote them (`limit_speed`) and normalized
/// only when flattened (`--limit-speed`). Nothing is validated: the
/// executable's flag set changes independently of this crate.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct OptionSet {
    entries: Vec<(String, OptionValue)>,
}

impl OptionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `name` to `value`, replacing an earlier value in place
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<OptionValue>) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<OptionValue>) -> Self {
        self.set(name, value);
        self
    }

    /// Shorthand for a presence-only flag
    pub fn with_switch(self, name: impl Into<String>) -> Self {
        self.with(name, true)
    }

    pub fn get(&self, name: &str) -> Option<&OptionValue> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &OptionValue)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Entries of `other` override entries of `self` with the same name
    pub fn merged(mut self, other: &OptionSet) -> Self {
        for (name, value) in other.iter() {
            self.set(name, value.clone());
        }
        self
    }
}

impl<N, V> FromIterator<(N, V)> for OptionSet
where
    N: Into<String>,
    V: Into<OptionValue>,
{
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        let mut options = OptionSet::new();
        for (name, value) in iter {
            options.set(name, value);
        }
        options
    }
}

/// Render one option as a command-line token
pub fn option_token(name: &str, value: &OptionValue) -> String {
    let name = name.replace('_', "-");
    match value {
        OptionValue::Switch(true) => format!("--{}", name),
        other => format!("--{}={}", name, other),
    }
}

/// Append one token per option to a copy of `base`
pub fn flatten_options(base: &[String], options: &OptionSet) -> Vec<String> {
    let mut tokens = Vec::with_capacity(base.len() + options.len());
    tokens.extend_from_slice(base);
    tokens.extend(options.iter().map(|(name, value)| option_token(name, value)));
    tokens
}

/// A fully built invocation: program followed by its arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    tokens: Vec<String>,
}

impl CommandLine {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        let mut tokens = Vec::with_capacity(args.len() + 1);
        tokens.push(program.into());
        tokens.extend(args);
        Self { tokens }
    }

    /// `<exe> dl <url> --no-ask-password [options...]`
    pub fn download(executable: &Path, url: &str, options: &OptionSet) -> Self {
        let base = vec![
            executable.to_string_lossy().into_owned(),
            DOWNLOAD_VERB.to_string(),
            url.to_string(),
            NO_ASK_PASSWORD.to_string(),
        ];
        Self {
            tokens: flatten_options(&base, options),
        }
    }

    pub fn program(&self) -> &str {
        &self.tokens[0]
    }

    pub fn args(&self) -> &[String] {
        &self.tokens[1..]
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.tokens.join(" "))
    }
}

/// Output channel of a child process
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Channel {
    Stdout,
    Stderr,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Stdout => f.write_str("stdout"),
            Channel::Stderr => f.write_str("stderr"),
        }
    }
}

/// Decode one raw line, replacing invalid sequences with U+FFFD
pub fn decode_line(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Lines decoded so far from one channel, terminators included
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputStream {
    channel: Channel,
    lines: Vec<String>,
}

impl OutputStream {
    pub fn new(channel: Channel) -> Self {
        Self {
            channel,
            lines: Vec::new(),
        }
    }

    pub fn push(&mut self, line: String) {
        self.lines.push(line);
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Most recently appended line
    pub fn last(&self) -> Option<&str> {
        self.lines.last().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Join the lines; the stream cannot be appended to afterwards
    pub fn finish(self) -> String {
        self.lines.concat()
    }
}

/// Result of one executable invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionOutput {
    pub id: Uuid,
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was terminated by a signal
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl ExecutionOutput {
    pub fn into_parts(self) -> (String, String, Option<i32>) {
        (self.stdout, self.stderr, self.exit_code)
    }
}
