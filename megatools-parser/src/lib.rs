mod parser;

pub use parser::{classify_error, parse_filename, parse_version, strip_error_tag};
