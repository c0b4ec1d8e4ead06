//! Re-exports the types most callers need.
//!
//! # Example
//! ```rust,no_run
//! use fusebox::prelude::*;
//! ```

pub use crate::breaker::{CircuitBreaker, Metrics};
pub use crate::config::BreakerConfig;
pub use crate::error::{BreakerError, BreakerResult};
pub use crate::event::{BreakerEvent, EventKind};
pub use crate::registry::BreakerRegistry;
pub use crate::state::State;
