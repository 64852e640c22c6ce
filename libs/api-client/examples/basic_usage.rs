//! Blocking usage of the API client against a JSON placeholder service.
//!
//! To run this example:
//! ```bash
//! export API_BASE_URL="https://jsonplaceholder.typicode.com"  # Optional
//! export API_TOKEN="your-token-here"                            # Optional
//! cargo run -p cf-api-client --example basic_usage
//! ```

use api_client::{ApiClient, ApiError, BodyType, Configuration};
use serde_json::json;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let base_url = std::env::var("API_BASE_URL")
        .unwrap_or_else(|_| "https://jsonplaceholder.typicode.com".to_owned());
    let mut config = Configuration::new(base_url)
        .with_timeout(10)
        .with_connect_timeout(5)
        .with_user_agent("cf-api-client-example/0.1")
        .with_env("example")
        .with_header("Accept", "application/json")?;
    if let Ok(token) = std::env::var("API_TOKEN") {
        config = config.with_access_token(token);
    }
    let client = ApiClient::from_config(config);

    println!("=== Example 1: GET with URI template ===\n");

    let response = client
        .request()
        .get("/posts/{id}")
        .params([("id", 1)])
        .bearer()
        .call_blocking()?;
    println!("{} {} -> {}", response.method(), response.uri(), response.status());
    println!("Title: {}\n", response.json::<serde_json::Value>()?["title"]);

    println!("=== Example 2: POST a form-encoded body ===\n");

    let response = client
        .request()
        .post("/posts", json!({"title": "foo", "body": "bar", "userId": 1}))?
        .header("Content-Type", "application/x-www-form-urlencoded")?
        .call_blocking()?;
    println!("Sent: {}", response.request().body().unwrap_or_default());
    println!("Status: {}\n", response.status());

    println!("=== Example 3: Query string and raw text ===\n");

    let response = client
        .request()
        .get("/comments")
        .query(&json!({"postId": 1}))?
        .response_type(BodyType::String)?
        .call_blocking()?;
    println!("Fetched {} bytes from {}\n", response.text().len(), response.info().url);

    println!("=== Example 4: Error handling ===\n");

    match client.request().get("/does-not-exist").call_blocking() {
        Ok(response) => println!("Unexpected success: {}", response.status()),
        Err(ApiError::Response(err)) => println!("Server answered {}: {}", err.status(), err.response().text()),
        Err(err) if err.is_transport() => println!("Server unreachable: {err}"),
        Err(err) => return Err(err.into()),
    }

    Ok(())
}
