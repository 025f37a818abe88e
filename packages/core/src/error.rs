//! Error types shared by every procbridge layer.

/// Errors raised while talking to a subprocess peer.
///
/// Lower layers (the framed channel, the subprocess handle) surface `Io` and
/// `ProcessDied` immediately. The codec raises `Protocol`, `TypeMismatch` and
/// `SizeMismatch`. `Execution` is reserved for the task executor.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Pipe creation, read, write, descriptor flag or wait failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The child process exited before the exchange completed.
    #[error("process died: {context}")]
    ProcessDied { context: String },

    /// A line could not be parsed, carried an unknown tag, or misused a sentinel.
    #[error("protocol error: {message}")]
    Protocol { message: String },

    /// The decode target is incompatible with the wire tag.
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: String,
    },

    /// Tuple arity or name/value count mismatch.
    #[error("size mismatch ({what}): expected {expected}, found {found}")]
    SizeMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    /// The task executor could not complete the run.
    #[error("execution error: {message}")]
    Execution { message: String },
}

impl Error {
    /// Create a protocol error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Error::Protocol {
            message: message.into(),
        }
    }

    /// Create a process-died error.
    pub fn process_died(context: impl Into<String>) -> Self {
        Error::ProcessDied {
            context: context.into(),
        }
    }

    /// Create a type mismatch error.
    pub fn type_mismatch(expected: &'static str, found: impl Into<String>) -> Self {
        Error::TypeMismatch {
            expected,
            found: found.into(),
        }
    }

    /// Create a size mismatch error.
    pub fn size_mismatch(what: &'static str, expected: usize, found: usize) -> Self {
        Error::SizeMismatch {
            what,
            expected,
            found,
        }
    }

    /// Create an execution error.
    pub fn execution(message: impl Into<String>) -> Self {
        Error::Execution {
            message: message.into(),
        }
    }

    /// Whether this error means the peer process is gone.
    pub fn is_process_died(&self) -> bool {
        matches!(self, Error::ProcessDied { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::protocol(e.to_string())
    }
}

/// Result type alias used across procbridge.
pub type Result<T> = std::result::Result<T, Error>;
