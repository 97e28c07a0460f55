//! Integration tests for the request dispatcher against a mocked vendor API.
//!
//! These tests verify:
//! 1. The token is attached per method (query for GET, header for POST, bearer for OAuth)
//! 2. Successful calls slide the token expiry forward
//! 3. Auth-invalid codes clear the cache and the next call logs in exactly once
//! 4. Domain, transport and malformed failures are normalized into `ApiError`
//! 5. Search, airline and location operations work end to end

use chrono::NaiveDate;
use myagent_rs_client::classifier::RecoveryAction;
use myagent_rs_client::{
    ApiClient, ApiErrorKind, ClientConfig, Credentials, PassengerCounts, SearchQuery, Severity, TravelClass,
};
use serde_json::{json, Value};
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const HOUR: Duration = Duration::from_secs(3600);

fn password_config(server: &MockServer) -> ClientConfig {
    ClientConfig::new(
        server.uri(),
        Credentials::Password {
            login: "agent".to_string(),
            password: "secret".to_string(),
        },
    )
}

fn oauth_config(server: &MockServer) -> ClientConfig {
    ClientConfig::new(
        server.uri(),
        Credentials::ClientCredentials {
            token_url: format!("{}/v1/security/oauth2/token", server.uri()),
            client_id: "app-id".to_string(),
            client_secret: "app-secret".to_string(),
        },
    )
}

async fn mount_login(server: &MockServer, token: &str, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/user/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": { "auth_token": token }
        })))
        .expect(expected_calls)
        .mount(server)
        .await;
}

fn offer(id: &str, usd: f64) -> Value {
    json!({
        "id": id,
        "duration": 330,
        "price": { "USD": { "amount": usd } },
        "segments": [{
            "dep": { "date": "01.06.2025", "time": "08:00", "airport": { "code": "JFK" } },
            "arr": { "date": "01.06.2025", "time": "11:30", "airport": { "code": "LAX" } },
            "flight_number": "1",
            "carrier": { "code": "AA", "title": "American Airlines" }
        }],
        "segments_direction": [[0]]
    })
}

#[tokio::test]
async fn test_search_attaches_token_to_query() {
    let server = MockServer::start().await;
    mount_login(&server, "tok-1", 1).await;
    Mock::given(method("GET"))
        .and(path("/avia/search-recommendations"))
        .and(query_param("auth_key", "tok-1"))
        .and(query_param("segments[0][from]", "JFK"))
        .and(query_param("segments[0][to]", "LAX"))
        .and(query_param("segments[0][date]", "01.06.2025"))
        .and(query_param("segments[1][from]", "LAX"))
        .and(query_param("segments[1][date]", "08.06.2025"))
        .and(query_param("adt", "2"))
        .and(query_param("chd", "1"))
        .and(query_param("src", "0"))
        .and(query_param("class", "b"))
        .and(query_param("is_direct_only", "1"))
        .and(query_param("lang", "en"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": {
                "search": { "adt": 2, "chd": 1, "inf": 0, "class": "b", "token": "s-1" },
                "flights": [offer("a", 820.0), offer("b", 640.0)],
                "segments_comments": {}
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = ApiClient::new(password_config(&server)).unwrap();
    let query = SearchQuery::round_trip(
        "JFK",
        "LAX",
        NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
        NaiveDate::from_ymd_opt(2025, 6, 8).unwrap(),
    )
    .with_passengers(PassengerCounts {
        adults: 2,
        children: 1,
        infants: 0,
    })
    .with_class(TravelClass::Business)
    .direct_only(true);

    let results = client.search_recommendations(&query).await.unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results.search.as_ref().unwrap().token.as_deref(), Some("s-1"));
    assert_eq!(results.cheapest("USD").unwrap().id, "b");
    assert!(client.is_authenticated());
}

#[tokio::test]
async fn test_post_attaches_token_header() {
    let server = MockServer::start().await;
    mount_login(&server, "tok-1", 1).await;
    Mock::given(method("POST"))
        .and(path("/avia/fare-family"))
        .and(header("auth_key", "tok-1"))
        .and(body_partial_json(json!({ "recommendation_id": "r-1" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "pid": "p-9",
            "data": { "families": [] }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = ApiClient::new(password_config(&server)).unwrap();
    let response = client
        .post::<Value>("/avia/fare-family", &json!({ "recommendation_id": "r-1" }))
        .await
        .unwrap();

    assert!(response.success);
    assert_eq!(response.pid.as_deref(), Some("p-9"));
    assert_eq!(response.data.unwrap()["families"], json!([]));
}

#[tokio::test]
async fn test_successful_call_extends_token() {
    let server = MockServer::start().await;
    mount_login(&server, "unused", 0).await;
    Mock::given(method("GET"))
        .and(path("/avia/airlines"))
        .and(query_param("part", "aer"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": [{ "code": "SU", "name": "Аэрофлот", "name_en": "Aeroflot" }]
        })))
        .mount(&server)
        .await;

    let client = ApiClient::new(password_config(&server)).unwrap();
    let seeded = client.seed_token("seeded", Duration::from_secs(60));

    let airlines = client.search_airlines("aer").await.unwrap();
    assert_eq!(airlines[0].name, "Aeroflot");
    assert!(client.token_expiry().unwrap() > seeded.expires_at);
}

#[tokio::test]
async fn test_long_lived_token_slides_on_every_call() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/user/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": { "auth_token": "long", "expires_in": 7200 }
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/avia/airlines"))
        .and(query_param("auth_key", "long"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true, "data": [] })))
        .expect(2)
        .mount(&server)
        .await;

    let client = ApiClient::new(password_config(&server)).unwrap();

    client.search_airlines("aer").await.unwrap();
    let first = client.token_expiry().unwrap();

    tokio::time::sleep(Duration::from_millis(20)).await;
    client.search_airlines("aer").await.unwrap();
    let second = client.token_expiry().unwrap();

    assert!(second > first);
}

#[tokio::test]
async fn test_auth_invalid_code_clears_cache_and_relogs_once() {
    let server = MockServer::start().await;
    mount_login(&server, "fresh", 1).await;
    Mock::given(method("GET"))
        .and(path("/avia/airlines"))
        .and(query_param("auth_key", "stale"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": false,
            "code": 9,
            "pid": "p-1",
            "message": "Auth key is invalid"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/avia/airlines"))
        .and(query_param("auth_key", "fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true, "data": [] })))
        .expect(1)
        .mount(&server)
        .await;

    let client = ApiClient::new(password_config(&server)).unwrap();
    client.seed_token("stale", HOUR);

    let err = client.search_airlines("aer").await.unwrap_err();
    assert_eq!(err.kind, ApiErrorKind::Authentication);
    assert_eq!(err.code, Some(9));
    assert_eq!(err.message, "Auth key is invalid");
    assert_eq!(err.action, Some(RecoveryAction::Redirect));
    assert!(err.is_auth_error());
    assert!(!client.is_authenticated());
    assert!(client.token_cache().get().is_none());

    assert!(client.search_airlines("aer").await.unwrap().is_empty());
    assert_eq!(client.token_cache().get().unwrap().value, "fresh");
}

#[tokio::test]
async fn test_domain_error_keeps_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/avia/search-recommendations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": false,
            "code": 4,
            "pid": "p-7",
            "data": { "message": "Rate limit exceeded" }
        })))
        .mount(&server)
        .await;

    let client = ApiClient::new(password_config(&server)).unwrap();
    client.seed_token("tok-1", HOUR);

    let query = SearchQuery::one_way("JFK", "LAX", NaiveDate::from_ymd_opt(2025, 6, 1).unwrap());
    let err = client.search_recommendations(&query).await.unwrap_err();

    assert_eq!(err.kind, ApiErrorKind::Domain);
    assert_eq!(err.message, "Rate limit exceeded");
    assert_eq!(err.severity, Severity::Low);
    assert!(err.can_retry);
    assert_eq!(err.retry_delay, Some(Duration::from_secs(5)));
    assert_eq!(err.user_notice(), "Too many requests. Please wait a moment. (Error 4 • ID: p-7)");
    assert_eq!(client.token_cache().get().unwrap().value, "tok-1");
}

#[tokio::test]
async fn test_unknown_code_suggests_support() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/avia/airlines"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({ "success": false, "code": 4242 })))
        .mount(&server)
        .await;

    let client = ApiClient::new(password_config(&server)).unwrap();
    client.seed_token("tok-1", HOUR);

    let err = client.search_airlines("aer").await.unwrap_err();
    assert_eq!(err.kind, ApiErrorKind::Unknown);
    assert_eq!(err.message, "API Error");
    assert_eq!(err.severity, Severity::Medium);
    assert_eq!(err.action, Some(RecoveryAction::ContactSupport));
    assert!(!err.can_retry);
    assert!(client.is_authenticated());
}

#[tokio::test]
async fn test_timeout_is_a_retryable_network_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/avia/airlines"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "success": true, "data": [] }))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let config = password_config(&server).with_request_timeout(Duration::from_millis(200));
    let client = ApiClient::new(config).unwrap();
    client.seed_token("tok-1", HOUR);

    let err = client.search_airlines("aer").await.unwrap_err();
    assert_eq!(err.kind, ApiErrorKind::Network);
    assert_eq!(err.code, Some(7));
    assert_eq!(err.pid.as_deref(), Some("network-error"));
    assert_eq!(err.message, "Request timed out. Please try again.");
    assert!(err.original_message.is_some());
    assert!(err.can_retry);
    assert!(client.is_authenticated());
}

#[tokio::test]
async fn test_malformed_bodies_are_unknown_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/html"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>Bad gateway</html>"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/wrong-shape"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "pid": "p-3",
            "data": "not a list"
        })))
        .mount(&server)
        .await;

    let client = ApiClient::new(password_config(&server)).unwrap();
    client.seed_token("tok-1", HOUR);

    let err = client.get::<Value>("/html", &json!({})).await.unwrap_err();
    assert_eq!(err.kind, ApiErrorKind::Unknown);
    assert_eq!(err.action, Some(RecoveryAction::ContactSupport));

    let err = client.get::<Vec<u32>>("/wrong-shape", &json!({})).await.unwrap_err();
    assert_eq!(err.kind, ApiErrorKind::Unknown);
    assert_eq!(err.pid.as_deref(), Some("p-3"));
    assert!(err.original_message.is_some());
}

#[tokio::test]
async fn test_locations_with_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/security/oauth2/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "oauth-token",
            "token_type": "Bearer",
            "expires_in": 1799
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/reference-data/locations"))
        .and(header("authorization", "Bearer oauth-token"))
        .and(query_param("subType", "CITY,AIRPORT"))
        .and(query_param("keyword", "PAR"))
        .and(query_param("countryCode", "FR"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "meta": { "count": 1 },
            "data": [{
                "iataCode": "CDG",
                "name": "CHARLES DE GAULLE",
                "address": { "cityName": "PARIS", "countryName": "FRANCE" },
                "geoCode": { "latitude": 49.0097, "longitude": 2.5479 }
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = ApiClient::new(oauth_config(&server)).unwrap();
    let airports = client.search_locations("PAR", Some("FR")).await.unwrap();

    assert_eq!(airports.len(), 1);
    assert_eq!(airports[0].iata, "CDG");
    assert_eq!(airports[0].city, "PARIS");
    assert_eq!(airports[0].latitude, Some(49.0097));
}

#[tokio::test]
async fn test_plain_unauthorized_clears_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/reference-data/locations"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "errors": [{ "code": 38192, "title": "Invalid access token", "status": 401 }]
        })))
        .mount(&server)
        .await;

    let client = ApiClient::new(oauth_config(&server)).unwrap();
    client.seed_token("expired-upstream", HOUR);

    let err = client.search_locations("PAR", None).await.unwrap_err();
    assert_eq!(err.kind, ApiErrorKind::Authentication);
    assert_eq!(err.code, Some(9));
    assert_eq!(err.message, "Invalid access token");
    assert!(!client.is_authenticated());
}

#[tokio::test]
async fn test_short_queries_make_no_calls() {
    let server = MockServer::start().await;
    mount_login(&server, "unused", 0).await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true, "data": [] })))
        .expect(0)
        .mount(&server)
        .await;

    let client = ApiClient::new(password_config(&server)).unwrap();
    assert!(client.search_airlines("a").await.unwrap().is_empty());
    assert!(client.search_airlines("  ").await.unwrap().is_empty());
    assert!(client.search_locations("PA", None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_clear_auth_forces_login() {
    let server = MockServer::start().await;
    mount_login(&server, "fresh", 1).await;
    Mock::given(method("GET"))
        .and(path("/avia/airlines"))
        .and(query_param("auth_key", "fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true, "data": [] })))
        .expect(1)
        .mount(&server)
        .await;

    let client = ApiClient::new(password_config(&server)).unwrap();
    client.seed_token("seeded", HOUR);
    client.clear_auth();
    assert!(client.token_expiry().is_none());

    client.search_airlines("aer").await.unwrap();
    assert!(client.is_authenticated());
}
