use fusebox::{BreakerConfig, BreakerError, CircuitBreaker};
use std::error::Error;
use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

// Custom error type that implements Error trait
#[derive(Debug)]
struct ServiceError(String);

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Service error: {}", self.0)
    }
}

impl Error for ServiceError {}

fn main() {
    let config = Arc::new(
        BreakerConfig::builder()
            .failure_rate_threshold(50.0) // 50% failure rate trips the circuit
            .wait_in_open(Duration::from_secs(2)) // 2 second wait before probing
            .closed_buffer_size(4) // sample the last 4 calls while closed
            .half_open_buffer_size(2) // allow 2 probe calls when half-open
            .build()
            .expect("valid configuration"),
    );
    let breaker = CircuitBreaker::new("demo-service", config);

    println!("Circuit initial state: {}", breaker.state());

    // Simulate a flaky dependency that recovers after a while
    let mut call_count = 0;
    let mut call_service = move || -> Result<String, ServiceError> {
        call_count += 1;
        if call_count <= 6 && call_count % 2 == 0 {
            Err(ServiceError("External service error".to_string()))
        } else {
            Ok("Success".to_string())
        }
    };

    for i in 1..=15 {
        println!("\nAttempt {}: ", i);

        match breaker.call(&mut call_service) {
            Ok(result) => println!("Call succeeded with result: {}", result),
            Err(BreakerError::NotPermitted) => {
                println!("Circuit denied the call, waiting before retry...");
                thread::sleep(Duration::from_secs(1));
            }
            Err(BreakerError::Operation(err)) => {
                println!("Call failed with error: {}", err);
            }
        }

        let metrics = breaker.metrics();
        println!(
            "Current state: {}, failure rate: {:.2}, buffered: {}",
            breaker.state(),
            metrics.failure_rate,
            metrics.buffered_calls
        );

        thread::sleep(Duration::from_millis(300));
    }
}
