//! Error types shared by the client, the job descriptor and the monitor.

use thiserror::Error;

/// Why a single REST call did not produce a usable response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestFailure {
    /// The server answered with a non-2xx status.
    #[error("{status_line}, response: {body}")]
    Status { status_line: String, body: String },

    /// Connection refused, reset, DNS failure, timeout...
    #[error("{0}")]
    Transport(String),

    /// A 2xx response whose body could not be decoded.
    #[error("invalid response body: {0}")]
    Decode(String),
}

/// Errors surfaced by a [`JobClient`](crate::client::JobClient).
///
/// Each variant names the operation that failed; the engine decides how
/// tolerant to be of each kind.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    #[error("Failed to submit batch: {0}")]
    Submission(RequestFailure),

    #[error("Failed to get batch: {0}")]
    StatusFetch(RequestFailure),

    #[error("Failed to get batch logs: {0}")]
    LogFetch(RequestFailure),

    #[error("Failed to kill batch: {0}")]
    Cancel(RequestFailure),
}

/// A job request that cannot be submitted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DescriptorError {
    #[error("Resource (jar or python file) is required")]
    MissingResource,

    #[error("--class is required for Spark (non-PySpark) jobs")]
    MissingClass,
}

/// Fatal outcomes of a monitoring session other than reaching a terminal state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MonitorError {
    #[error("Too many consecutive errors fetching status ({attempts}). Last error: {last}")]
    TooManyErrors { attempts: u32, last: ClientError },

    #[error("Interrupted while waiting for job completion")]
    Interrupted,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?} (expected a positive whole number of seconds)")]
    InvalidTimeout { key: String, value: String },
}
