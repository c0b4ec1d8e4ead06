//! Configuration for circuit breakers.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::ConfigError;

/// Predicate deciding how an error kind is classified.
type Predicate<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;

/// How a reported error was classified by the configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Classification {
    /// Counts as a failure in the active ring buffer.
    Failure,
    /// Excluded from the ring buffer entirely.
    Ignored,
}

/// Immutable configuration shared by reference across circuit breakers.
///
/// Built through [`ConfigBuilder`], which validates every parameter before a
/// breaker can exist. The generic parameter is the error type of the calls
/// the breaker protects; the record/ignore predicates run against it.
pub struct BreakerConfig<E> {
    failure_rate_threshold: f32,
    wait_in_open: Duration,
    closed_buffer_size: usize,
    half_open_buffer_size: usize,
    record: Option<Predicate<E>>,
    ignore: Option<Predicate<E>>,
}

impl<E> BreakerConfig<E> {
    /// Creates a builder preloaded with the default settings: 50% threshold,
    /// 60 second open-state wait, closed ring of 100, half-open ring of 10,
    /// every error recorded.
    pub fn builder() -> ConfigBuilder<E> {
        ConfigBuilder::new()
    }

    /// The failure rate percentage at or above which the breaker opens.
    pub fn failure_rate_threshold(&self) -> f32 {
        self.failure_rate_threshold
    }

    /// How long the breaker stays open before admitting a probe call.
    pub fn wait_in_open(&self) -> Duration {
        self.wait_in_open
    }

    /// Capacity of the ring buffer used while closed.
    pub fn closed_buffer_size(&self) -> usize {
        self.closed_buffer_size
    }

    /// Capacity of the ring buffer used while half-open. Also the number of
    /// probe calls permitted in that state.
    pub fn half_open_buffer_size(&self) -> usize {
        self.half_open_buffer_size
    }

    /// Classifies a reported error. The ignore predicate takes precedence
    /// over the record predicate; with no record predicate every
    /// non-ignored error is a failure.
    pub(crate) fn classify(&self, error: &E) -> Classification {
        if let Some(ignore) = &self.ignore {
            if ignore(error) {
                return Classification::Ignored;
            }
        }

        match &self.record {
            Some(record) if !record(error) => Classification::Ignored,
            _ => Classification::Failure,
        }
    }
}

impl<E> fmt::Debug for BreakerConfig<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BreakerConfig")
            .field("failure_rate_threshold", &self.failure_rate_threshold)
            .field("wait_in_open", &self.wait_in_open)
            .field("closed_buffer_size", &self.closed_buffer_size)
            .field("half_open_buffer_size", &self.half_open_buffer_size)
            .field("record", &self.record.is_some())
            .field("ignore", &self.ignore.is_some())
            .finish()
    }
}

impl<E> Default for BreakerConfig<E> {
    fn default() -> Self {
        // Defaults are always in range.
        ConfigBuilder::new().build().unwrap()
    }
}

/// Builder for [`BreakerConfig`] with fail-fast validation.
pub struct ConfigBuilder<E> {
    failure_rate_threshold: f32,
    wait_in_open: Duration,
    closed_buffer_size: usize,
    half_open_buffer_size: usize,
    record: Option<Predicate<E>>,
    ignore: Option<Predicate<E>>,
}

impl<E> ConfigBuilder<E> {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            failure_rate_threshold: 50.0,
            wait_in_open: Duration::from_secs(60),
            closed_buffer_size: 100,
            half_open_buffer_size: 10,
            record: None,
            ignore: None,
        }
    }

    /// Sets the failure rate threshold as a percentage in (0, 100].
    pub fn failure_rate_threshold(mut self, percentage: f32) -> Self {
        self.failure_rate_threshold = percentage;
        self
    }

    /// Sets how long the breaker waits in the open state before a probe
    /// call is admitted.
    pub fn wait_in_open(mut self, duration: Duration) -> Self {
        self.wait_in_open = duration;
        self
    }

    /// Sets the ring buffer capacity used in the closed state.
    pub fn closed_buffer_size(mut self, size: usize) -> Self {
        self.closed_buffer_size = size;
        self
    }

    /// Sets the ring buffer capacity (and probe quota) used in the
    /// half-open state.
    pub fn half_open_buffer_size(mut self, size: usize) -> Self {
        self.half_open_buffer_size = size;
        self
    }

    /// Records an error as a failure only when the predicate returns true.
    /// Errors failing the predicate are classified as ignored.
    pub fn record_if<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.record = Some(Arc::new(predicate));
        self
    }

    /// Classifies an error as ignored when the predicate returns true.
    /// Takes precedence over [`record_if`](Self::record_if).
    pub fn ignore_if<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.ignore = Some(Arc::new(predicate));
        self
    }

    /// Validates the parameters and builds the configuration.
    pub fn build(self) -> Result<BreakerConfig<E>, ConfigError> {
        if !(self.failure_rate_threshold > 0.0 && self.failure_rate_threshold <= 100.0) {
            return Err(ConfigError::ThresholdOutOfRange(self.failure_rate_threshold));
        }
        if self.closed_buffer_size == 0 {
            return Err(ConfigError::ZeroRingBufferSize("closed_buffer_size"));
        }
        if self.half_open_buffer_size == 0 {
            return Err(ConfigError::ZeroRingBufferSize("half_open_buffer_size"));
        }

        Ok(BreakerConfig {
            failure_rate_threshold: self.failure_rate_threshold,
            wait_in_open: self.wait_in_open,
            closed_buffer_size: self.closed_buffer_size,
            half_open_buffer_size: self.half_open_buffer_size,
            record: self.record,
            ignore: self.ignore,
        })
    }
}

impl<E> Default for ConfigBuilder<E> {
    fn default() -> Self {
        Self::new()
    }
}
