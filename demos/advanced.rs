//! Advanced circuit breaker walkthrough.
//!
//! This demo shows:
//! 1. A registry shared by several call sites
//! 2. Classifying errors with record/ignore predicates
//! 3. Subscribing to typed breaker events
//! 4. Inspecting recent history through a bounded event ring

use fusebox::{BreakerConfig, BreakerError, BreakerRegistry, EventKind};
use std::error::Error;
use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Debug)]
struct ServiceError {
    message: String,
    transient: bool,
}

impl ServiceError {
    fn new(message: &str, transient: bool) -> Self {
        ServiceError {
            message: message.to_string(),
            transient,
        }
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Service error: {}", self.message)
    }
}

impl Error for ServiceError {}

// Simulates an external service: healthy, then broken, then recovered.
fn external_service_call(call_count: &mut u32) -> Result<String, ServiceError> {
    *call_count += 1;

    if *call_count <= 3 {
        Ok("Initial success".to_string())
    } else if *call_count == 4 {
        // Business errors are ignored by the breaker below.
        Err(ServiceError::new("Validation rejected", true))
    } else if *call_count <= 9 {
        Err(ServiceError::new("Service temporarily unavailable", false))
    } else {
        Ok("Stable success".to_string())
    }
}

fn main() {
    println!("=== Advanced Circuit Breaker Demo ===\n");

    // 1. A registry with a default configuration for every breaker it creates.
    let config = Arc::new(
        BreakerConfig::<ServiceError>::builder()
            .failure_rate_threshold(50.0)
            .wait_in_open(Duration::from_secs(2))
            .closed_buffer_size(4)
            .half_open_buffer_size(2)
            .ignore_if(|e| e.transient) // transient errors never trip the breaker
            .build()
            .expect("valid configuration"),
    );
    let registry = BreakerRegistry::with_config(config);
    registry.on_registry_event(|event| println!("[registry] {:?}", event));

    let breaker = registry.get_or_create("inventory-service");

    // 2. Subscribe to the events worth watching.
    breaker.on_event(EventKind::StateTransition, |event| {
        if let Some((from, to)) = event.transition() {
            println!("[breaker] state transition: {} -> {}", from, to);
        }
    });
    breaker.on_event(EventKind::NotPermitted, |_| {
        println!("[breaker] call denied");
    });

    // 3. Keep the last 16 events around for inspection.
    let history = breaker.retain_events(16);

    let mut call_count = 0;
    for i in 1..=15 {
        println!("\n--- Call {} ---", i);

        match breaker.call(|| external_service_call(&mut call_count)) {
            Ok(response) => println!("Service response: {}", response),
            Err(BreakerError::NotPermitted) => {
                println!("Circuit open, call not attempted");
                thread::sleep(Duration::from_millis(700));
            }
            Err(BreakerError::Operation(err)) => println!("Service error: {}", err),
        }

        let metrics = breaker.metrics();
        println!(
            "state={}, failure_rate={:.1}, buffered={}, denied={}",
            breaker.state(),
            metrics.failure_rate,
            metrics.buffered_calls,
            metrics.not_permitted_calls
        );

        thread::sleep(Duration::from_millis(200));
    }

    println!("\n=== Recent event history ===");
    for event in history.events() {
        println!("{:?}", event.kind());
    }
}
