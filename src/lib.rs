//! MyAgent Rust Client
//!
//! A Rust client library for the MyAgent flight-search API,
//! with automatic authentication, single-flight login, token caching and typed errors.

pub mod api_client;
pub mod auth_client;
pub mod classifier;
pub mod config;
pub mod error;
pub mod flights;
pub mod locations;
pub mod search;
pub mod storage;
pub mod token_store;
pub mod types;

pub use api_client::ApiClient;
pub use auth_client::{AuthClient, AuthClientHttp};
pub use classifier::{ErrorInfo, Presentation, RecoveryAction, Severity};
pub use config::{ClientConfig, Credentials};
pub use error::{ApiError, ApiErrorKind, ApiResult, ClientError, Result};
pub use flights::{Airline, FlightRecommendation, SearchResults};
pub use locations::{Airport, AirportIndex};
pub use search::{PassengerCounts, SearchQuery, TravelClass, TripType};
pub use storage::{FileStore, KeyValueStore, MemoryStore};
pub use token_store::TokenCache;
pub use types::{ApiResponse, Method, Token};
