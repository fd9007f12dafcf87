use megatools_core::{MegaError, Result};
use regex::Regex;
use std::sync::OnceLock;

static ERROR_TAG: OnceLock<Regex> = OnceLock::new();

/// Matches conventional tags such as `ERROR: ` or `fatal: `
fn error_tag() -> &'static Regex {
    ERROR_TAG.get_or_init(|| Regex::new(r"\w+: ").expect("error tag pattern is valid"))
}

/// Remove the first `word: ` occurrence anywhere in `text`.
///
/// Only the first match is stripped, and it does not have to be at the
/// start of the text.
pub fn strip_error_tag(text: &str) -> String {
    match error_tag().find(text) {
        Some(tag) => {
            let mut message = String::with_capacity(text.len() - tag.len());
            message.push_str(&text[..tag.start()]);
            message.push_str(&text[tag.end()..]);
            message
        }
        None => text.to_string(),
    }
}

/// Turn the collected error channel into a failure.
///
/// An empty error channel is success whatever the exit code is.
pub fn classify_error(exit_code: Option<i32>, stderr: &str) -> Result<()> {
    if stderr.is_empty() {
        return Ok(());
    }

    let message = strip_error_tag(stderr).trim_end().to_string();
    Err(MegaError::Execution { exit_code, message })
}

/// Extract the version number from `megatools --version` output
pub fn parse_version(stdout: &str) -> Result<String> {
    stdout
        .split_whitespace()
        .nth(1)
        .map(str::to_string)
        .ok_or_else(|| {
            MegaError::UnexpectedOutput(format!("No version number in output: {:?}", stdout))
        })
}

/// Extract the file name from a `--print-names` progress line.
///
/// Returns the text before the first `:` with surrounding whitespace trimmed.
/// Output with no name at all is an [`MegaError::UnexpectedOutput`] rather
/// than an empty string.
pub fn parse_filename(stdout: &str) -> Result<String> {
    let name = stdout.split(':').next().unwrap_or_default().trim();
    if name.is_empty() {
        return Err(MegaError::UnexpectedOutput(
            "Executable did not print a file name".to_string(),
        ));
    }
    Ok(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_empty_stderr_is_success() {
        assert!(classify_error(Some(0), "").is_ok());
        assert!(classify_error(Some(3), "").is_ok());
    }

    #[test]
    fn test_classify_strips_leading_tag() {
        let err = classify_error(Some(1), "ERROR: disk full").unwrap_err();
        assert_eq!(err.execution_message(), Some("disk full"));
        assert_eq!(err.to_string(), "[returnCode 1] disk full");
    }

    #[test]
    fn test_classify_trims_trailing_newline() {
        let err = classify_error(Some(1), "ERROR: Can't open file\n").unwrap_err();
        assert_eq!(err.execution_message(), Some("Can't open file"));
    }

    #[test]
    fn test_classify_without_tag_keeps_text() {
        let err = classify_error(Some(2), "something broke").unwrap_err();
        assert_eq!(err.execution_message(), Some("something broke"));
    }

    #[test]
    fn test_strip_removes_only_first_match() {
        assert_eq!(strip_error_tag("fatal: ERROR: twice"), "ERROR: twice");
    }

    #[test]
    fn test_strip_first_match_may_be_mid_text() {
        assert_eq!(
            strip_error_tag("download failed, reason: timeout"),
            "download failed, timeout"
        );
    }

    #[test]
    fn test_strip_requires_space_after_colon() {
        assert_eq!(strip_error_tag("https://mega.nz"), "https://mega.nz");
    }

    #[test]
    fn test_parse_version() {
        assert_eq!(parse_version("megatools 1.11.0\n").unwrap(), "1.11.0");
        assert_eq!(
            parse_version("megatools 1.11.0 - command line tools\n").unwrap(),
            "1.11.0"
        );
    }

    #[test]
    fn test_parse_version_missing() {
        assert!(matches!(
            parse_version("megatools\n"),
            Err(MegaError::UnexpectedOutput(_))
        ));
    }

    #[test]
    fn test_parse_filename() {
        assert_eq!(parse_filename("somefile.txt: 100%").unwrap(), "somefile.txt");
        assert_eq!(parse_filename("plain.bin\n").unwrap(), "plain.bin");
    }

    #[test]
    fn test_parse_filename_empty() {
        assert!(parse_filename("").is_err());
    }
}
