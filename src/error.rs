//! Typed errors for the parser and the remote gateway.
//!
//! Everything else in the crate uses `anyhow`; these two enums exist because
//! callers branch on them (a parse failure skips a file, a gateway failure
//! skips a block).

use reqwest::StatusCode;

/// Failure to read the arguments of a header line.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// A `"` opened a quoted token that never closed.
    #[error("unterminated quoted argument starting at offset {offset}")]
    UnterminatedQuote { offset: usize },

    /// Header line `line` (1-based) could not be tokenized.
    #[error("header on line {line}: {source}")]
    Header {
        line: usize,
        #[source]
        source: Box<ParseError>,
    },
}

/// Failure of a single request against the remote site.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("server responded {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("unexpected response: {0}")]
    Decode(String),

    #[error("invalid url: {0}")]
    Url(String),
}

pub type GatewayResult<T> = std::result::Result<T, GatewayError>;
