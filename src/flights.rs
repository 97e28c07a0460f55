//! Flight offers returned by the search call, and the search/airline operations

use crate::api_client::ApiClient;
use crate::auth_client::AuthClient;
use crate::error::ApiResult;
use crate::search::{build_search_params, SearchQuery};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::{debug, info};

pub const SEARCH_ENDPOINT: &str = "/avia/search-recommendations";
pub const AIRLINES_ENDPOINT: &str = "/avia/airlines";

/// Airline lookups shorter than this return nothing without a call
pub const MIN_AIRLINE_QUERY_LEN: usize = 2;

/// Bookable offer
///
/// Only the fields this crate interprets are typed; everything else the
/// vendor sends is kept in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlightRecommendation {
    pub id: String,
    #[serde(default)]
    pub tariff: Option<String>,
    #[serde(default)]
    pub fare_family_marketing_name: Option<String>,
    /// Total travel time in minutes
    #[serde(default)]
    pub duration: u32,
    #[serde(default)]
    pub segments_count: u32,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub is_baggage: bool,
    #[serde(default)]
    pub is_charter: bool,
    #[serde(default)]
    pub is_refund: bool,
    #[serde(default)]
    pub is_change: bool,
    #[serde(default)]
    pub book_url: Option<String>,
    #[serde(default)]
    pub provider: Option<Provider>,
    /// Keyed by currency code (`USD`, `RUB`, ...)
    #[serde(default)]
    pub price: HashMap<String, CurrencyPrice>,
    #[serde(default)]
    pub segments: Vec<FlightSegment>,
    /// Indices into `segments`, one list per itinerary direction
    #[serde(default)]
    pub segments_direction: Vec<Vec<usize>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FlightRecommendation {
    pub fn price_in(&self, currency: &str) -> Option<f64> {
        self.price.get(currency).map(|price| price.amount)
    }

    /// Segments flown in direction `direction` (0 outbound, 1 return)
    pub fn segments_in_direction(&self, direction: usize) -> Vec<&FlightSegment> {
        match self.segments_direction.get(direction) {
            Some(indices) => indices.iter().filter_map(|&i| self.segments.get(i)).collect(),
            None => self
                .segments
                .iter()
                .filter(|segment| segment.direction == direction as u32)
                .collect(),
        }
    }

    pub fn is_direct(&self) -> bool {
        (0..self.segments_direction.len().max(1)).all(|direction| self.segments_in_direction(direction).len() <= 1)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrencyPrice {
    pub amount: f64,
    #[serde(default)]
    pub passengers_amounts: PassengerAmounts,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PassengerAmounts {
    pub adult: Option<f64>,
    pub child: Option<f64>,
    pub infant: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlightSegment {
    pub dep: FlightPoint,
    pub arr: FlightPoint,
    #[serde(default)]
    pub flight_number: String,
    #[serde(default)]
    pub direction: u32,
    #[serde(default)]
    pub seats: Option<u32>,
    #[serde(default)]
    pub carrier: Option<Carrier>,
    #[serde(default)]
    pub aircraft: Option<Aircraft>,
    #[serde(default)]
    pub baggage: Option<Baggage>,
    #[serde(default)]
    pub cbaggage: Option<Baggage>,
    #[serde(rename = "class", default)]
    pub cabin: Option<CabinClass>,
    #[serde(default)]
    pub is_refund: bool,
    #[serde(default)]
    pub is_change: bool,
    #[serde(default)]
    pub stops: Vec<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Departure or arrival of a segment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlightPoint {
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub time: String,
    #[serde(default)]
    pub datetime: Option<String>,
    /// Unix seconds
    #[serde(default)]
    pub ts: Option<i64>,
    #[serde(default)]
    pub terminal: Option<String>,
    pub airport: NamedPlace,
    #[serde(default)]
    pub city: Option<NamedPlace>,
    #[serde(default)]
    pub country: Option<NamedPlace>,
}

/// Airport, city or country reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedPlace {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Carrier {
    #[serde(default)]
    pub id: Option<i64>,
    pub code: String,
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Aircraft {
    pub code: String,
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Baggage {
    #[serde(default)]
    pub piece: u32,
    pub weight: Option<f64>,
    pub dimensions: Option<String>,
    pub weight_unit: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CabinClass {
    #[serde(default)]
    pub type_id: Option<i64>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub service: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provider {
    pub gds: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub supplier: Option<Carrier>,
}

/// Search parameters as echoed back by the vendor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchEcho {
    #[serde(default)]
    pub adt: u32,
    #[serde(default)]
    pub chd: u32,
    #[serde(default)]
    pub inf: u32,
    #[serde(rename = "class", default)]
    pub cabin: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `data` of a search response
///
/// The vendor sends either `{search, flights, segments_comments}` or a bare
/// list of offers; both deserialize into this.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawSearchResults")]
pub struct SearchResults {
    pub search: Option<SearchEcho>,
    pub flights: Vec<FlightRecommendation>,
    pub segments_comments: HashMap<String, String>,
}

impl SearchResults {
    /// Cheapest offer priced in `currency`
    pub fn cheapest(&self, currency: &str) -> Option<&FlightRecommendation> {
        self.flights
            .iter()
            .filter_map(|flight| flight.price_in(currency).map(|amount| (flight, amount)))
            .min_by(|(_, a), (_, b)| a.total_cmp(b))
            .map(|(flight, _)| flight)
    }

    pub fn len(&self) -> usize {
        self.flights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flights.is_empty()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawSearchResults {
    // Tried first: a sequence would otherwise be accepted by the struct variant
    Flights(Vec<FlightRecommendation>),
    Full {
        #[serde(default)]
        search: Option<SearchEcho>,
        #[serde(default)]
        flights: Vec<FlightRecommendation>,
        #[serde(default)]
        segments_comments: HashMap<String, String>,
    },
}

impl From<RawSearchResults> for SearchResults {
    fn from(raw: RawSearchResults) -> Self {
        match raw {
            RawSearchResults::Full {
                search,
                flights,
                segments_comments,
            } => Self {
                search,
                flights,
                segments_comments,
            },
            RawSearchResults::Flights(flights) => Self {
                flights,
                ..Self::default()
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Airline {
    pub code: String,
    pub name: String,
}

#[derive(Deserialize)]
struct RawAirline {
    code: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    name_en: Option<String>,
}

impl From<RawAirline> for Airline {
    fn from(raw: RawAirline) -> Self {
        let name = raw.name_en.filter(|name| !name.is_empty()).unwrap_or(raw.name);
        Self { code: raw.code, name }
    }
}

#[derive(Serialize)]
struct AirlineLookup<'a> {
    part: &'a str,
    lang: &'a str,
}

impl<A: AuthClient> ApiClient<A> {
    /// Search bookable offers for `query`
    pub async fn search_recommendations(&self, query: &SearchQuery) -> ApiResult<SearchResults> {
        let params = build_search_params(query, &self.config().lang);
        debug!(
            from = %query.from,
            to = %query.to,
            segments = params.segments.len(),
            class = params.class.code(),
            "Searching flights"
        );

        let response = self.get::<SearchResults>(SEARCH_ENDPOINT, &params).await?;
        let results = response.data.unwrap_or_default();

        info!(offers = results.len(), from = %query.from, to = %query.to, "Flight search completed");
        Ok(results)
    }

    /// Airlines whose name or code matches `part`
    pub async fn search_airlines(&self, part: &str) -> ApiResult<Vec<Airline>> {
        let part = part.trim();
        if part.chars().count() < MIN_AIRLINE_QUERY_LEN {
            return Ok(Vec::new());
        }

        let lookup = AirlineLookup {
            part,
            lang: &self.config().lang,
        };
        let response = self.get::<Vec<RawAirline>>(AIRLINES_ENDPOINT, &lookup).await?;

        Ok(response
            .data
            .unwrap_or_default()
            .into_iter()
            .map(Airline::from)
            .collect())
    }
}
