//! Error types for chatmtl.
//!
//! Every component reports failures through the single [`Error`] enum so the
//! chat session can decide, per variant, whether a failure is tolerated,
//! shown to the user, or fatal at startup.

use std::error;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Why an inference request failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InferenceFailure {
    /// The model endpoint could not be reached.
    Unreachable,
    /// The request exceeded the configured timeout.
    Timeout,
    /// The endpoint answered with a non-success status code.
    Status(u16),
    /// The endpoint answered, but not with a usable completion.
    Malformed,
}

/// The main error type for chatmtl.
#[derive(Clone, Debug)]
pub enum Error {
    /// Fetching or parsing a blog page failed.
    Fetch {
        /// Human-readable error message.
        message: String,
        /// The page that was being fetched.
        url: Option<String>,
        /// Underlying cause.
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    },

    /// The user supplied input that cannot be processed.
    InvalidInput {
        /// Human-readable error message.
        message: String,
        /// The input that failed validation.
        param: Option<String>,
    },

    /// The model could not produce a response.
    Inference {
        /// Human-readable error message.
        message: String,
        /// Failure classification.
        kind: InferenceFailure,
        /// Underlying cause.
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    },

    /// Appending to the CSV log failed.
    LogWrite {
        /// Human-readable error message.
        message: String,
        /// The log file.
        path: Option<PathBuf>,
        /// Underlying cause.
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    },

    /// Startup configuration is missing or invalid.
    Config {
        /// Human-readable error message.
        message: String,
        /// The setting that was rejected.
        param: Option<String>,
    },

    /// I/O error.
    Io {
        /// Human-readable error message.
        message: String,
        /// The underlying error.
        source: Arc<io::Error>,
    },

    /// Error during JSON serialization or deserialization.
    Serialization {
        /// Human-readable error message.
        message: String,
        /// The underlying error.
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    },

    /// A URL parsing or manipulation error.
    Url {
        /// Human-readable error message.
        message: String,
        /// The underlying error.
        source: Option<url::ParseError>,
    },
}

impl Error {
    /// Creates a new fetch error.
    pub fn fetch(
        message: impl Into<String>,
        url: Option<String>,
        source: Option<Box<dyn error::Error + Send + Sync>>,
    ) -> Self {
        Error::Fetch {
            message: message.into(),
            url,
            source: source.map(Arc::from),
        }
    }

    /// Creates a new invalid input error.
    pub fn invalid_input(message: impl Into<String>, param: Option<String>) -> Self {
        Error::InvalidInput {
            message: message.into(),
            param,
        }
    }

    /// Creates a new inference error.
    pub fn inference(
        message: impl Into<String>,
        kind: InferenceFailure,
        source: Option<Box<dyn error::Error + Send + Sync>>,
    ) -> Self {
        Error::Inference {
            message: message.into(),
            kind,
            source: source.map(Arc::from),
        }
    }

    /// Creates a new log write error.
    pub fn log_write(
        message: impl Into<String>,
        path: Option<&Path>,
        source: Option<Box<dyn error::Error + Send + Sync>>,
    ) -> Self {
        Error::LogWrite {
            message: message.into(),
            path: path.map(Path::to_path_buf),
            source: source.map(Arc::from),
        }
    }

    /// Creates a new configuration error.
    pub fn config(message: impl Into<String>, param: Option<String>) -> Self {
        Error::Config {
            message: message.into(),
            param,
        }
    }

    /// Creates a new I/O error.
    pub fn io(message: impl Into<String>, source: io::Error) -> Self {
        Error::Io {
            message: message.into(),
            source: Arc::new(source),
        }
    }

    /// Creates a new serialization error.
    pub fn serialization(
        message: impl Into<String>,
        source: Option<Box<dyn error::Error + Send + Sync>>,
    ) -> Self {
        Error::Serialization {
            message: message.into(),
            source: source.map(Arc::from),
        }
    }

    /// Creates a new URL error.
    pub fn url(message: impl Into<String>, source: Option<url::ParseError>) -> Self {
        Error::Url {
            message: message.into(),
            source,
        }
    }

    /// Returns true if this error came from the content fetcher.
    pub fn is_fetch(&self) -> bool {
        matches!(self, Error::Fetch { .. })
    }

    /// Returns true if this error rejects user input.
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, Error::InvalidInput { .. })
    }

    /// Returns true if this error came from the inference client.
    pub fn is_inference(&self) -> bool {
        matches!(self, Error::Inference { .. })
    }

    /// Returns true if this error is an inference timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Error::Inference {
                kind: InferenceFailure::Timeout,
                ..
            }
        )
    }

    /// Returns true if this error came from the session logger.
    pub fn is_log_write(&self) -> bool {
        matches!(self, Error::LogWrite { .. })
    }

    /// Returns true if this error is a startup configuration error.
    pub fn is_config(&self) -> bool {
        matches!(self, Error::Config { .. })
    }

    /// Returns true if repeating the same inference request might succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Inference { kind, .. } => match kind {
                InferenceFailure::Unreachable | InferenceFailure::Timeout => true,
                InferenceFailure::Status(code) => matches!(code, 408 | 429 | 500..=599),
                InferenceFailure::Malformed => false,
            },
            _ => false,
        }
    }

    /// Returns the HTTP status code associated with this error, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Error::Inference {
                kind: InferenceFailure::Status(code),
                ..
            } => Some(*code),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Fetch { message, url, .. } => {
                if let Some(url) = url {
                    write!(f, "Fetch error: {message} ({url})")
                } else {
                    write!(f, "Fetch error: {message}")
                }
            }
            Error::InvalidInput { message, param } => {
                if let Some(param) = param {
                    write!(f, "Invalid input: {message} (input: {param})")
                } else {
                    write!(f, "Invalid input: {message}")
                }
            }
            Error::Inference { message, kind, .. } => match kind {
                InferenceFailure::Unreachable => {
                    write!(f, "Inference error: model unreachable: {message}")
                }
                InferenceFailure::Timeout => {
                    write!(f, "Inference error: timed out: {message}")
                }
                InferenceFailure::Status(code) => {
                    write!(f, "Inference error: HTTP {code}: {message}")
                }
                InferenceFailure::Malformed => {
                    write!(f, "Inference error: malformed response: {message}")
                }
            },
            Error::LogWrite { message, path, .. } => {
                if let Some(path) = path {
                    write!(f, "Log write error: {message} ({})", path.display())
                } else {
                    write!(f, "Log write error: {message}")
                }
            }
            Error::Config { message, param } => {
                if let Some(param) = param {
                    write!(f, "Configuration error: {message} (setting: {param})")
                } else {
                    write!(f, "Configuration error: {message}")
                }
            }
            Error::Io { message, .. } => {
                write!(f, "I/O error: {message}")
            }
            Error::Serialization { message, .. } => {
                write!(f, "Serialization error: {message}")
            }
            Error::Url { message, .. } => {
                write!(f, "URL error: {message}")
            }
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::Fetch { source, .. }
            | Error::Inference { source, .. }
            | Error::LogWrite { source, .. }
            | Error::Serialization { source, .. } => source
                .as_ref()
                .map(|e| e.as_ref() as &(dyn error::Error + 'static)),
            Error::Io { source, .. } => Some(source),
            Error::Url { source, .. } => {
                source.as_ref().map(|e| e as &(dyn error::Error + 'static))
            }
            Error::InvalidInput { .. } | Error::Config { .. } => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::io(err.to_string(), err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::serialization(format!("JSON error: {err}"), Some(Box::new(err)))
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error::url(format!("URL parse error: {err}"), Some(err))
    }
}

/// A specialized Result type for chatmtl operations.
pub type Result<T> = std::result::Result<T, Error>;
