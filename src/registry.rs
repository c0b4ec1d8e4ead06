//! Concurrency-safe directory of named circuit breakers.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use ahash::RandomState;
use parking_lot::RwLock;
use smallvec::SmallVec;

use crate::breaker::CircuitBreaker;
use crate::config::BreakerConfig;

/// Registry-level lifecycle events.
#[derive(Debug, Clone)]
pub enum RegistryEvent {
    /// A breaker was created under a previously unused name.
    Added {
        /// Name of the new breaker.
        name: Arc<str>,
    },
    /// A breaker was removed from the registry. Callers still holding the
    /// instance keep a working breaker; it is just no longer reachable by
    /// name.
    Removed {
        /// Name of the removed breaker.
        name: Arc<str>,
    },
}

impl RegistryEvent {
    /// The breaker name this event concerns.
    pub fn name(&self) -> &str {
        match self {
            RegistryEvent::Added { name } | RegistryEvent::Removed { name } => name,
        }
    }
}

type Listener = Arc<dyn Fn(&RegistryEvent) + Send + Sync + 'static>;

/// A concurrent factory and directory of named breakers.
///
/// The registry is an explicit handle: construct one, share it (it is
/// `Send + Sync`), and pass it down. It holds no per-call state; breakers
/// looked up by different callers under the same name are the same shared
/// instance.
pub struct BreakerRegistry<E> {
    default_config: Arc<BreakerConfig<E>>,
    breakers: RwLock<HashMap<Arc<str>, CircuitBreaker<E>, RandomState>>,
    listeners: RwLock<SmallVec<[Listener; 2]>>,
}

impl<E> BreakerRegistry<E>
where
    E: std::error::Error + 'static,
{
    /// Creates a registry whose breakers default to the default
    /// configuration.
    pub fn new() -> Self {
        Self::with_config(Arc::new(BreakerConfig::default()))
    }

    /// Creates a registry with an explicit default configuration.
    pub fn with_config(default_config: Arc<BreakerConfig<E>>) -> Self {
        Self {
            default_config,
            breakers: RwLock::new(HashMap::with_hasher(RandomState::new())),
            listeners: RwLock::new(SmallVec::new()),
        }
    }

    /// The configuration applied to breakers created without an explicit one.
    pub fn default_config(&self) -> &Arc<BreakerConfig<E>> {
        &self.default_config
    }

    /// Returns the breaker registered under `name`, creating it under the
    /// default configuration if absent.
    pub fn get_or_create(&self, name: &str) -> CircuitBreaker<E> {
        self.get_or_create_with(name, Arc::clone(&self.default_config))
    }

    /// Returns the breaker registered under `name`, creating it under the
    /// supplied configuration if absent.
    ///
    /// Racing creators resolve to a single winner observed identically by
    /// every caller. If the name already exists, the existing instance and
    /// its original configuration win; the supplied configuration is
    /// discarded (first write wins — use [`replace`](Self::replace) to
    /// change a name's configuration).
    pub fn get_or_create_with(
        &self,
        name: &str,
        config: Arc<BreakerConfig<E>>,
    ) -> CircuitBreaker<E> {
        if let Some(breaker) = self.breakers.read().get(name) {
            return breaker.clone();
        }

        let (breaker, created) = {
            let mut breakers = self.breakers.write();
            match breakers.get(name) {
                // Another caller won the creation race.
                Some(existing) => (existing.clone(), false),
                None => {
                    let breaker = CircuitBreaker::new(name, config);
                    breakers.insert(Arc::from(name), breaker.clone());
                    (breaker, true)
                }
            }
        };

        if created {
            tracing::debug!(breaker = name, "registered circuit breaker");
            self.emit(&RegistryEvent::Added {
                name: Arc::from(name),
            });
        }
        breaker
    }

    /// Returns the breaker registered under `name`, if any.
    pub fn get(&self, name: &str) -> Option<CircuitBreaker<E>> {
        self.breakers.read().get(name).cloned()
    }

    /// Removes and returns the breaker registered under `name`.
    pub fn remove(&self, name: &str) -> Option<CircuitBreaker<E>> {
        let removed = self.breakers.write().remove(name);
        if removed.is_some() {
            tracing::debug!(breaker = name, "removed circuit breaker");
            self.emit(&RegistryEvent::Removed {
                name: Arc::from(name),
            });
        }
        removed
    }

    /// Replaces the breaker under `name` with a fresh one built from the
    /// supplied configuration. Modeled as remove-then-add: a removal event
    /// fires for the old instance (when one existed) followed by an add
    /// event for the new one.
    pub fn replace(&self, name: &str, config: Arc<BreakerConfig<E>>) -> CircuitBreaker<E> {
        let breaker = CircuitBreaker::new(name, config);
        let old = {
            let mut breakers = self.breakers.write();
            breakers.insert(Arc::from(name), breaker.clone())
        };

        if old.is_some() {
            self.emit(&RegistryEvent::Removed {
                name: Arc::from(name),
            });
        }
        tracing::debug!(breaker = name, "replaced circuit breaker");
        self.emit(&RegistryEvent::Added {
            name: Arc::from(name),
        });
        breaker
    }

    /// All registered breakers, in no particular order.
    pub fn all(&self) -> Vec<CircuitBreaker<E>> {
        self.breakers.read().values().cloned().collect()
    }

    /// Number of registered breakers.
    pub fn len(&self) -> usize {
        self.breakers.read().len()
    }

    /// True when no breakers are registered.
    pub fn is_empty(&self) -> bool {
        self.breakers.read().is_empty()
    }

    /// Registers a consumer for registry-level add/remove events.
    pub fn on_registry_event<F>(&self, consumer: F)
    where
        F: Fn(&RegistryEvent) + Send + Sync + 'static,
    {
        self.listeners.write().push(Arc::new(consumer));
    }

    fn emit(&self, event: &RegistryEvent) {
        let listeners: SmallVec<[Listener; 2]> =
            self.listeners.read().iter().cloned().collect();
        for listener in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
                tracing::warn!(name = event.name(), "registry event consumer panicked");
            }
        }
    }
}

impl<E> Default for BreakerRegistry<E>
where
    E: std::error::Error + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
