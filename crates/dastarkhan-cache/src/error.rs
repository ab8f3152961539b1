//! Cache tier errors.
//!
//! None of these ever reach a repository caller: every variant is logged at
//! `warn` and turned into a miss (reads) or a no-op (writes).

/// Errors raised by the distributed tier or the cache codec.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CacheError {
    /// The distributed cache is configured but cannot be reached.
    #[error("Cache unavailable: {message}")]
    Unavailable { message: String },

    /// A read command failed.
    #[error("Cache read error on {key}: {message}")]
    Read { key: String, message: String },

    /// A write command failed.
    #[error("Cache write error on {key}: {message}")]
    Write { key: String, message: String },

    /// Cached bytes do not decode as the expected entity.
    #[error("Cache decode error on {key}: {message}")]
    Decode { key: String, message: String },
}

impl CacheError {
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn read(key: impl Into<String>, message: impl ToString) -> Self {
        Self::Read {
            key: key.into(),
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn write(key: impl Into<String>, message: impl ToString) -> Self {
        Self::Write {
            key: key.into(),
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn decode(key: impl Into<String>, message: impl ToString) -> Self {
        Self::Decode {
            key: key.into(),
            message: message.to_string(),
        }
    }

    /// Returns `true` if the cached value itself is bad (as opposed to I/O).
    #[must_use]
    pub fn is_decode(&self) -> bool {
        matches!(self, Self::Decode { .. })
    }
}

/// Result type alias for cache tier operations.
pub type CacheResult<T> = Result<T, CacheError>;
