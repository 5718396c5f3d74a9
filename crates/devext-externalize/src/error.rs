use thiserror::Error;

/// Errors building externalize options.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid external pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex_lite::Error,
    },

    #[error("Invalid externalize options: {0}")]
    InvalidOptions(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
