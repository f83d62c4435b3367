//! Unified error type.

use thiserror::Error as ThisError;

/// A boxed, thread-safe error produced by application handlers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The error type returned by trellis's fallible operations.
///
/// Routing misses and unacceptable encodings are *not* errors: they become a
/// `404` response and a pass-through body respectively. An `Error` flowing out
/// of a handler or a stage aborts the rest of the pipeline, and
/// [`Pipeline::handle`](crate::Pipeline::handle) turns it into a `500`.
#[derive(Debug, ThisError)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Config(#[from] toml::de::Error),

    #[error("invalid socket address `{addr}`: {source}")]
    Addr {
        addr: String,
        source: std::net::AddrParseError,
    },

    #[error("reading request body: {0}")]
    Body(#[source] BoxError),

    #[error("handler failed: {0}")]
    Handler(#[source] BoxError),

    #[error("stage `{stage}` failed: {message}")]
    Stage { stage: &'static str, message: String },
}

impl Error {
    /// Wraps any application error as a handler fault.
    pub fn handler(err: impl Into<BoxError>) -> Self {
        Self::Handler(err.into())
    }

    /// A fault raised from inside a pipeline stage hook.
    pub fn stage(stage: &'static str, message: impl Into<String>) -> Self {
        Self::Stage { stage, message: message.into() }
    }
}
