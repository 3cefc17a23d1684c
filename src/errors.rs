// =============================================================================
// errors.rs — A FIELD GUIDE TO EVERYTHING THAT CAN GO WRONG
// =============================================================================
//
// Scanning other people's forgotten DNS records is an exercise in failure
// handling. Files go missing, APIs rate-limit us, hosts refuse connections,
// and GitHub occasionally decides we have made enough repositories today.
//
// Most of those failures are NOT fatal. A dead host is a scan result, not an
// error. The types here cover the failures that actually need a name:
// startup problems (fatal) and collaborator API failures (logged, non-fatal).
// =============================================================================

use std::fmt;
use std::io;

use thiserror::Error;

/// Coarse classification, mostly so log lines can be filtered sensibly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The user handed us something unusable (files, env, flags).
    Input,
    /// A remote service said no, or said nothing at all.
    Network,
    /// A remote service said something we could not understand.
    Parse,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCategory::Input => "input",
            ErrorCategory::Network => "network",
            ErrorCategory::Parse => "parse",
        };
        f.write_str(s)
    }
}

/// The one error type of the engine.
#[derive(Error, Debug)]
pub enum EngineError {
    // ------------------------ Input / Startup --------------------------------
    #[error("I/O error during {operation} on {path}: {source}")]
    Io {
        path: String,
        operation: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to read fingerprint database {path}: {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    // ----------------------------- Collaborators -----------------------------
    #[error("hit rate limit during {operation}")]
    RateLimited { operation: String },

    #[error("{operation} failed with HTTP {status}: {message}")]
    Api {
        operation: String,
        status: u16,
        message: String,
    },

    #[error("HTTP error during {operation}: {source}")]
    Http {
        operation: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Unexpected response during {operation}: {reason}")]
    Decode { operation: String, reason: String },
}

impl EngineError {
    pub fn category(&self) -> ErrorCategory {
        use EngineError::*;
        match self {
            Io { .. } | Csv { .. } | Configuration { .. } => ErrorCategory::Input,
            RateLimited { .. } | Api { .. } | Http { .. } => ErrorCategory::Network,
            Decode { .. } => ErrorCategory::Parse,
        }
    }

    /// True when the failure was the remote side throttling us.
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, EngineError::RateLimited { .. })
    }

    // ---------------------------- Constructors -------------------------------

    pub fn io(path: impl Into<String>, operation: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            operation: operation.into(),
            source,
        }
    }

    pub fn csv(path: impl Into<String>, source: csv::Error) -> Self {
        Self::Csv {
            path: path.into(),
            source,
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn rate_limited(operation: impl Into<String>) -> Self {
        Self::RateLimited {
            operation: operation.into(),
        }
    }

    pub fn api(operation: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            operation: operation.into(),
            status,
            message: message.into(),
        }
    }

    pub fn http(operation: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Http {
            operation: operation.into(),
            source,
        }
    }

    pub fn decode(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Decode {
            operation: operation.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// Attach a path and an operation name to a bare `io::Error`.
pub trait IoResultExt<T> {
    fn with_path(self, path: impl Into<String>, operation: impl Into<String>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::result::Result<T, io::Error> {
    fn with_path(self, path: impl Into<String>, operation: impl Into<String>) -> Result<T> {
        self.map_err(|e| EngineError::io(path, operation, e))
    }
}
