//! # fusebox
//!
//! A lock-efficient circuit breaker engine with ring-buffer sliding-window
//! metrics, typed lifecycle events, and a concurrent registry of named
//! breaker instances.
//!
//! A circuit breaker shields a caller from a degraded or unreachable
//! dependency by tracking recent call outcomes and short-circuiting further
//! calls once a failure threshold is crossed, then probing recovery before
//! fully re-opening traffic. The engine knows nothing about the transport it
//! protects: callers ask for permission, execute the work themselves, and
//! report the outcome back.
//!
//! ## States
//!
//! - **Closed**: calls pass through; every outcome lands in a fixed-capacity
//!   ring buffer. When the ring is full and the failure rate reaches the
//!   configured threshold, the breaker opens.
//! - **Open**: calls are denied without touching the dependency. After the
//!   configured wait, the first arriving call transitions the breaker to
//!   half-open — the deadline is checked on the permission path, never by a
//!   background timer.
//! - **HalfOpen**: a bounded number of probe calls sample whether the
//!   dependency recovered; once the half-open ring fills, the breaker closes
//!   or re-opens based on the probe failure rate.
//! - **Disabled** / **ForcedOpen**: administrative overrides that always
//!   permit or always deny until explicitly lifted.
//!
//! ## Basic usage
//!
//! ```rust
//! use fusebox::{BreakerConfig, BreakerError, CircuitBreaker};
//! use std::io;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let config = Arc::new(
//!     BreakerConfig::builder()
//!         .failure_rate_threshold(50.0)
//!         .wait_in_open(Duration::from_secs(30))
//!         .closed_buffer_size(20)
//!         .half_open_buffer_size(5)
//!         .build()
//!         .expect("valid configuration"),
//! );
//! let breaker = CircuitBreaker::new("payments", config);
//!
//! match breaker.call(|| -> Result<&str, io::Error> { Ok("response") }) {
//!     Ok(response) => println!("call succeeded: {}", response),
//!     Err(BreakerError::NotPermitted) => println!("short-circuited"),
//!     Err(BreakerError::Operation(err)) => println!("call failed: {}", err),
//! }
//! ```
//!
//! The same breaker can also be driven by hand, which is the core contract:
//! [`CircuitBreaker::try_acquire_permission`], then exactly one of
//! [`CircuitBreaker::on_success`] or [`CircuitBreaker::on_error`] with the
//! duration the caller measured.
//!
//! ## Registry
//!
//! A [`BreakerRegistry`] lazily creates and shares breakers by name, so all
//! call sites protecting the same dependency cooperate on one instance:
//!
//! ```rust
//! use fusebox::BreakerRegistry;
//! use std::io;
//!
//! let registry = BreakerRegistry::<io::Error>::new();
//! let breaker = registry.get_or_create("inventory");
//! assert_eq!(registry.get_or_create("inventory").name(), breaker.name());
//! ```
//!
//! ## Features
//!
//! - `std` - standard library support (default)
//! - `async` - `call_async` support via Tokio

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod breaker;
mod config;
mod error;
mod event;
pub mod prelude;
mod registry;
mod state;
mod window;

// Re-exports
pub use breaker::{CircuitBreaker, Metrics};
pub use config::{BreakerConfig, ConfigBuilder};
pub use error::{BreakerError, BreakerResult, ConfigError};
pub use event::{BreakerEvent, EventKind, EventRing};
pub use registry::{BreakerRegistry, RegistryEvent};
pub use state::State;
pub use window::NO_DATA;
