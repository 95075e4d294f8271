//! Travel Gateway Example
//!
//! This example demonstrates:
//! 1. Building the destination and attractions gateways from a registry
//! 2. Falling back to an "unavailable" record while the service is down
//! 3. Watching the breaker open and recover through hooks
//! 4. Running into the attractions rate limit
//!
//! Run with `RUST_LOG=travelguard_rs=debug` to see the resilience layer's logs.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing_subscriber::EnvFilter;
use travelguard_rs::{
    AttractionsGateway, DestinationGateway, FetchError, Registry, ResilienceConfig,
    TravelDestination,
};

const CONFIG: &str = r#"
[circuit_breakers.travelDestination]
failure_rate_threshold_pct = 50.0
slow_call_rate_threshold_pct = 50.0
slow_call_duration_threshold_ms = 5000
sliding_window_size = 10
minimum_sample_size = 5
wait_duration_in_open_state_ms = 2000
half_open_permitted_calls = 2

[rate_limiters.travelAttractions]
capacity = 5
refresh_period_ms = 60000

[call_sites.travelDestination]
timeout_ms = 1000
"#;

// A destination service that fails for a while, then recovers
fn flaky_service(
    attempts: Arc<AtomicU32>,
) -> impl Fn(&str, &str) -> Result<TravelDestination, FetchError> + Send + Sync + 'static {
    move |name: &str, country: &str| {
        let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if (3..=8).contains(&attempt) {
            return Err(FetchError::remote("service temporarily unavailable"));
        }
        Ok(TravelDestination::new(format!("DEST{:03}", attempt), country, name)
            .with_city("Estes Park")
            .with_category("National Park")
            .with_best_season_to_visit("Summer"))
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    println!("=== Travel Gateway Example ===\n");

    let registry = Registry::from_config(ResilienceConfig::from_toml_str(CONFIG)?)?;
    let attempts = Arc::new(AtomicU32::new(0));
    let destinations = DestinationGateway::from_registry(&registry, flaky_service(Arc::clone(&attempts)));

    if let Some(breaker) = destinations.breaker() {
        breaker
            .hooks()
            .on_state_transition(|from, to| println!("  breaker: {} -> {}", from, to));
    }

    for i in 1..=12 {
        let destination = destinations.lookup("Rocky Mountain", "USA")?;
        let state = destinations
            .breaker()
            .map(|b| b.current_state().to_string())
            .unwrap_or_default();
        if destination.is_unavailable() {
            println!("Lookup {:2}: fallback ({})", i, state);
        } else {
            println!("Lookup {:2}: {} ({})", i, destination, state);
        }

        if i == 8 {
            println!("\nWaiting for the breaker cooldown...\n");
            thread::sleep(Duration::from_millis(2100));
        }
    }

    println!("\nService was called {} times\n", attempts.load(Ordering::SeqCst));

    match destinations.lookup("  ", "USA") {
        Ok(_) => println!("Blank name was accepted"),
        Err(e) => println!("Blank name rejected: {}", e),
    }

    println!("\n=== Attractions ===\n");

    let attractions = AttractionsGateway::from_registry(&registry);
    for i in 1..=7 {
        println!("Request {}: {}", i, attractions.lookup("Banff", "Canada")?);
    }

    Ok(())
}
