//! Flight search example
//!
//! Usage:
//!   MYAGENT_API_LOGIN=... MYAGENT_API_PASSWORD=... cargo run --example flight_search -- JFK LAX 2025-06-01

use chrono::NaiveDate;
use myagent_rs_client::{ApiClient, SearchQuery};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut args = std::env::args().skip(1);
    let from = args.next().unwrap_or_else(|| "JFK".to_string());
    let to = args.next().unwrap_or_else(|| "LAX".to_string());
    let date = args.next().unwrap_or_else(|| "2025-06-01".to_string());
    let departure = NaiveDate::parse_from_str(&date, "%Y-%m-%d")?;

    println!("=== MyAgent Flight Search Example ===");
    println!("Route: {from} -> {to} on {departure}");
    println!();

    // Credentials and base URL come from MYAGENT_* variables or .env
    let client = ApiClient::from_env()?;
    println!("✓ Client created for {}", client.config().base_url);

    // Two concurrent lookups share one login
    let query = SearchQuery::one_way(&from, &to, departure);
    let (results, airlines) = tokio::join!(client.search_recommendations(&query), client.search_airlines("aer"));

    match results {
        Ok(results) => {
            println!("✓ {} offers found", results.len());
            if let Some(cheapest) = results.cheapest("USD") {
                println!(
                    "  Cheapest: {} at {:.2} USD, {} min",
                    cheapest.id,
                    cheapest.price_in("USD").unwrap_or_default(),
                    cheapest.duration
                );
            }
        }
        Err(e) => {
            println!("! Search failed: {}", e.user_notice());
            println!("  severity={:?} retry={} action={:?}", e.severity, e.can_retry, e.action);
        }
    }

    match airlines {
        Ok(airlines) => {
            for airline in airlines.iter().take(5) {
                println!("  Airline {}: {}", airline.code, airline.name);
            }
        }
        Err(e) => println!("! Airline lookup failed: {}", e.user_notice()),
    }
    println!();

    if let Some(expires_at) = client.token_expiry() {
        println!("Token valid until {expires_at}");
    }

    client.clear_auth();
    println!("Done!");

    Ok(())
}
