//! Error types for CalDAV request building and response extraction.
//!
//! Missing or malformed properties inside an otherwise parseable response
//! are not errors: extraction degrades to `None` or empty collections.
//! Only builder misuse, parse failures and bad URLs surface here.

use nextdav_xml::{BuilderError, XmlParseError};
use thiserror::Error;

/// A specialized Result type for CalDAV operations.
pub type CalDavResult<T> = Result<T, CalDavError>;

/// Errors raised by the CalDAV layer.
#[derive(Debug, Error)]
pub enum CalDavError {
    /// A request body could not be assembled.
    #[error("failed to build request body: {0}")]
    Builder(#[from] BuilderError),

    /// A response body was rejected or could not be parsed.
    #[error(transparent)]
    Parse(#[from] XmlParseError),

    /// A calendar URL could not be constructed.
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The base URL cannot carry path segments (e.g. `mailto:`).
    #[error("URL cannot be a base: {0}")]
    CannotBeBase(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use nextdav_xml::{ParseOptions, parse_xml};

    #[test]
    fn builder_error_display() {
        let err = CalDavError::from(BuilderError::Disposed);
        assert_eq!(
            err.to_string(),
            "failed to build request body: XML builder used after dispose"
        );
    }

    #[test]
    fn parse_error_is_transparent() {
        let parse_err = parse_xml("", &ParseOptions::default()).unwrap_err();
        let err = CalDavError::from(parse_err);
        assert_eq!(
            err.to_string(),
            "failed to parse XML: document contains no element"
        );
    }
}
