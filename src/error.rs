//! Error types for the circuit breaker engine.

use std::error::Error;
use std::fmt::{self, Display, Formatter};

/// Result type for calls executed through a circuit breaker.
pub type BreakerResult<T, E> = Result<T, BreakerError<E>>;

/// Error type returned when executing a call through a circuit breaker.
#[derive(Debug)]
pub enum BreakerError<E> {
    /// The breaker denied permission: it is open, forced open, or the
    /// half-open probe quota is exhausted.
    NotPermitted,

    /// The protected operation itself failed.
    Operation(E),
}

impl<E> BreakerError<E> {
    /// Returns true if this error is a permission denial rather than an
    /// operation failure.
    pub fn is_not_permitted(&self) -> bool {
        matches!(self, BreakerError::NotPermitted)
    }
}

impl<E> Display for BreakerError<E>
where
    E: Display,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            BreakerError::NotPermitted => write!(f, "circuit breaker denied the call"),
            BreakerError::Operation(e) => write!(f, "operation error: {}", e),
        }
    }
}

impl<E: Error + 'static> Error for BreakerError<E> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            BreakerError::NotPermitted => None,
            BreakerError::Operation(e) => Some(e),
        }
    }
}

/// Error produced when a configuration parameter is out of range.
///
/// Raised at build time, before any breaker using the configuration exists.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// The failure rate threshold must lie in the interval (0, 100].
    ThresholdOutOfRange(f32),

    /// A ring buffer size was zero; carries the name of the offending field.
    ZeroRingBufferSize(&'static str),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ThresholdOutOfRange(value) => write!(
                f,
                "failure rate threshold must be in (0, 100], got {}",
                value
            ),
            ConfigError::ZeroRingBufferSize(field) => {
                write!(f, "{} must be at least 1", field)
            }
        }
    }
}

impl Error for ConfigError {}
