//! Circuit breaker example demonstrating resilience patterns.
//!
//! This example shows how to:
//! - Gate a resilient operation through a circuit breaker
//! - Configure failure thresholds and the open-state wait
//! - Handle denied attempts
//! - Monitor circuit breaker metrics
//!
//! Run with: cargo run --example with_circuit_breaker

use breakwater::prelude::*;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    println!("=== Circuit Breaker Example ===\n");

    // Configure the circuit breaker
    let config = CircuitBreakerConfig::new()
        .with_minimum_number_of_calls(3)
        .with_failure_count_threshold(3)
        .with_permitted_calls_in_half_open_state(2)
        .with_wait_duration_in_open_state(Duration::from_secs(2));

    println!("Circuit Breaker Configuration:");
    println!("  Failure count threshold: {}", config.failure_count_threshold);
    println!("  Half-open probes: {}", config.permitted_calls_in_half_open_state);
    println!("  Open wait: {:?}", config.wait_duration_in_open_state);
    println!();

    let breaker = Arc::new(CircuitBreaker::new("inventory-service", config));

    // A dependency that is down; every unit is given up on after one attempt
    let failing = Arc::new(MockOperation::always_failing(ErrorKind::Unavailable).with_name("reserve-stock"));
    let wrapper = ResilientOperation::builder(failing.clone())
        .with_handler(FailureHandler::always_give_up(None))
        .with_circuit_breaker(Arc::clone(&breaker))
        .build();

    println!("Sending units to trigger the circuit breaker...\n");

    for i in 1..=6 {
        println!("Unit #{}: circuit state = {}", i, breaker.state().name());

        let unit = UnitOfWork::new(format!("order-{i}"), "reserve", b"{\"sku\":\"A-1\"}".to_vec());
        match wrapper.execute(unit).await {
            Ok(completion) => println!("  Done after {} attempt(s)", completion.attempts()),
            Err(ResilienceError::CircuitOpen { name, recovery_hint }) => {
                println!("  Circuit OPEN for '{}', attempt denied ({:?})", name, recovery_hint);
            }
            Err(e) => println!("  Failed: {}", e),
        }

        let metrics = breaker.metrics();
        println!(
            "  Metrics: {} total, {} success, {} failed, {} rejected",
            metrics.total_calls, metrics.successful_calls, metrics.failed_calls, metrics.rejected_calls
        );
    }
    println!("\nOperation invoked {} time(s)", failing.invocation_count());

    // Wait for the circuit to admit probes again
    println!("\nWaiting for the open-state wait to elapse...");
    tokio::time::sleep(Duration::from_millis(2100)).await;

    println!("\n=== Demonstrating Recovery ===\n");

    // The dependency is back; the same breaker now guards a healthy operation
    let healthy = ResilientOperation::builder(Arc::new(MockOperation::new().with_name("reserve-stock")))
        .with_handler(FailureHandler::always_give_up(None))
        .with_circuit_breaker(Arc::clone(&breaker))
        .build();

    for i in 1..=3 {
        let unit = UnitOfWork::new(format!("retry-order-{i}"), "reserve", b"{}".to_vec());
        match healthy.execute(unit).await {
            Ok(_) => println!("Probe #{}: success, state = {}", i, breaker.state().name()),
            Err(e) => println!("Probe #{}: failed: {}", i, e),
        }
    }

    println!("\nFinal state: {}", breaker.state().name());
    println!("Final metrics: {:?}", breaker.metrics());

    // Manual control
    println!("\n=== Manual Control ===\n");
    breaker.force_open();
    println!("Forced circuit to {}", breaker.state().name());
    println!("Call permitted: {}", breaker.is_call_permitted());
    breaker.force_close();
    println!("Forced circuit to {}", breaker.state().name());

    wrapper.scheduler().shutdown();
    healthy.scheduler().shutdown();

    println!("\n=== Example Complete ===");
    Ok(())
}
