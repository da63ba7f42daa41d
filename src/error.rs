//! Error types for request dispatch and cache storage.
//!
//! `RequestError` is the closed set of failures a request listener can
//! observe. `CacheError` covers the storage side and never reaches a
//! listener directly: dispatchers degrade cache failures to miss
//! semantics. `QueueError` reports configuration and lifecycle problems.

use std::fmt;

use crate::net::NetworkResponse;

/// Terminal failure of a dispatched request.
///
/// Every variant carries the originating [`NetworkResponse`] when one was
/// received, plus a `network_time_ms` stamp set by the network dispatcher
/// once the round trip (including transport-level retries) has ended.
#[derive(Debug, Clone)]
pub enum RequestError {
    /// Transport-level failure: connection reset, protocol error, I/O.
    Network {
        /// Partial response, when the failure happened after headers.
        response: Option<NetworkResponse>,
        /// Wall time spent on the round trip, in milliseconds.
        network_time_ms: u64,
    },
    /// The server answered with an error status code.
    Server {
        /// The full error response, status code included.
        response: NetworkResponse,
        /// Wall time spent on the round trip, in milliseconds.
        network_time_ms: u64,
    },
    /// Authentication or authorization failure (401/403).
    Auth {
        /// The rejecting response, when one was received.
        response: Option<NetworkResponse>,
        /// Wall time spent on the round trip, in milliseconds.
        network_time_ms: u64,
    },
    /// The response body could not be parsed into the requested type.
    Parse {
        /// The response that failed to parse, when available.
        response: Option<NetworkResponse>,
        /// Human-readable parse failure detail.
        detail: String,
        /// Wall time spent on the round trip, in milliseconds.
        network_time_ms: u64,
    },
    /// The retry policy exhausted its attempts waiting for a response.
    Timeout {
        /// Wall time spent on the round trip, in milliseconds.
        network_time_ms: u64,
    },
    /// No usable network connection.
    NoConnection {
        /// Wall time spent on the round trip, in milliseconds.
        network_time_ms: u64,
    },
}

impl RequestError {
    /// Transport-level failure without a response.
    #[inline]
    pub fn network() -> Self {
        Self::Network { response: None, network_time_ms: 0 }
    }

    /// Server error built from the received response.
    #[inline]
    pub fn server(response: NetworkResponse) -> Self {
        Self::Server { response, network_time_ms: 0 }
    }

    /// Auth failure built from the rejecting response.
    #[inline]
    pub fn auth(response: Option<NetworkResponse>) -> Self {
        Self::Auth { response, network_time_ms: 0 }
    }

    /// Parse failure with a detail message.
    #[inline]
    pub fn parse(detail: impl Into<String>) -> Self {
        Self::Parse { response: None, detail: detail.into(), network_time_ms: 0 }
    }

    /// Parse failure carrying the offending response.
    #[inline]
    pub fn parse_with_response(detail: impl Into<String>, response: NetworkResponse) -> Self {
        Self::Parse { response: Some(response), detail: detail.into(), network_time_ms: 0 }
    }

    /// Timed out after the retry policy gave up.
    #[inline]
    pub fn timeout() -> Self {
        Self::Timeout { network_time_ms: 0 }
    }

    /// No network connection available.
    #[inline]
    pub fn no_connection() -> Self {
        Self::NoConnection { network_time_ms: 0 }
    }

    /// The underlying response, when the failure produced one.
    pub fn response(&self) -> Option<&NetworkResponse> {
        match self {
            Self::Network { response, .. }
            | Self::Auth { response, .. }
            | Self::Parse { response, .. } => response.as_ref(),
            Self::Server { response, .. } => Some(response),
            Self::Timeout { .. } | Self::NoConnection { .. } => None,
        }
    }

    /// Round-trip duration stamp, in milliseconds.
    pub fn network_time_ms(&self) -> u64 {
        match self {
            Self::Network { network_time_ms, .. }
            | Self::Server { network_time_ms, .. }
            | Self::Auth { network_time_ms, .. }
            | Self::Parse { network_time_ms, .. }
            | Self::Timeout { network_time_ms }
            | Self::NoConnection { network_time_ms } => *network_time_ms,
        }
    }

    /// Stamp the round-trip duration. Called once by the network
    /// dispatcher before the error is delivered.
    pub fn set_network_time(&mut self, elapsed_ms: u64) {
        match self {
            Self::Network { network_time_ms, .. }
            | Self::Server { network_time_ms, .. }
            | Self::Auth { network_time_ms, .. }
            | Self::Parse { network_time_ms, .. }
            | Self::Timeout { network_time_ms }
            | Self::NoConnection { network_time_ms } => *network_time_ms = elapsed_ms,
        }
    }
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network { .. } => write!(f, "network error"),
            Self::Server { response, .. } => {
                write!(f, "server error: status {}", response.status)
            }
            Self::Auth { .. } => write!(f, "authentication failure"),
            Self::Parse { detail, .. } => write!(f, "parse error: {}", detail),
            Self::Timeout { .. } => write!(f, "request timed out"),
            Self::NoConnection { .. } => write!(f, "no network connection"),
        }
    }
}

impl std::error::Error for RequestError {}

/// Storage-side failure of a [`Cache`](crate::cache::Cache) implementation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// Underlying I/O failed.
    Io(String),
    /// An on-disk entry did not match the expected layout.
    Corrupt(String),
}

impl CacheError {
    /// I/O failure with a detail message.
    #[inline]
    pub fn io(msg: impl Into<String>) -> Self {
        Self::Io(msg.into())
    }

    /// Corrupt-entry failure with a detail message.
    #[inline]
    pub fn corrupt(msg: impl Into<String>) -> Self {
        Self::Corrupt(msg.into())
    }
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(msg) => write!(f, "cache I/O error: {}", msg),
            Self::Corrupt(msg) => write!(f, "corrupt cache entry: {}", msg),
        }
    }
}

impl std::error::Error for CacheError {}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Configuration or lifecycle failure of a request queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// A configuration value makes no sense.
    InvalidConfiguration(String),
    /// A worker thread could not be spawned.
    WorkerSpawn(String),
}

impl QueueError {
    /// Invalid-configuration error with a detail message.
    #[inline]
    pub fn invalid_configuration(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    /// Worker-spawn error with a detail message.
    #[inline]
    pub fn worker_spawn(msg: impl Into<String>) -> Self {
        Self::WorkerSpawn(msg.into())
    }
}

impl fmt::Display for QueueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfiguration(msg) => write!(f, "invalid configuration: {}", msg),
            Self::WorkerSpawn(msg) => write!(f, "failed to spawn worker: {}", msg),
        }
    }
}

impl std::error::Error for QueueError {}
