//! Airport lookup: a static dataset index and the reference-data location call

use crate::api_client::ApiClient;
use crate::auth_client::AuthClient;
use crate::error::{ApiResult, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

/// Public airport dataset, one object per airport
pub const AIRPORTS_JSON_URL: &str = "https://raw.githubusercontent.com/jbrooksuk/JSON-Airports/master/airports.json";

pub const LOCATIONS_ENDPOINT: &str = "/v1/reference-data/locations";

/// Shortest query the local index answers
pub const MIN_QUERY_LEN: usize = 2;

/// Shortest keyword sent to the location call
pub const MIN_LOCATION_KEYWORD_LEN: usize = 3;

/// Most results returned by [`AirportIndex::search`]
pub const MAX_RESULTS: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Airport {
    pub iata: String,
    pub name: String,
    pub city: String,
    pub country: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
}

impl Airport {
    /// Build from a loosely shaped dataset entry; entries missing any of
    /// code, name, city or country are rejected
    fn from_entry(entry: &Value) -> Option<Self> {
        let text = |keys: &[&str]| {
            keys.iter()
                .find_map(|key| entry.get(*key).and_then(Value::as_str))
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(String::from)
        };
        let coordinate = |keys: &[&str]| {
            keys.iter().find_map(|key| match entry.get(*key)? {
                Value::Number(number) => number.as_f64(),
                Value::String(raw) => raw.trim().parse().ok(),
                _ => None,
            })
        };

        Some(Self {
            iata: text(&["iata", "code"])?,
            name: text(&["name"])?,
            city: text(&["city"])?,
            country: text(&["country"])?,
            latitude: coordinate(&["lat", "latitude"]),
            longitude: coordinate(&["lon", "longitude"]),
        })
    }

    fn matches(&self, term: &str) -> bool {
        [&self.city, &self.name, &self.iata, &self.country]
            .iter()
            .any(|field| field.to_lowercase().contains(term))
    }
}

/// In-memory airport index
#[derive(Debug, Clone, Default)]
pub struct AirportIndex {
    airports: Vec<Airport>,
}

impl AirportIndex {
    pub fn new(airports: Vec<Airport>) -> Self {
        Self { airports }
    }

    /// Index a dataset document (a JSON array of airport objects)
    ///
    /// Unusable entries are skipped; a document that is not an array yields
    /// an empty index.
    pub fn from_json(document: &Value) -> Self {
        let airports: Vec<Airport> = document
            .as_array()
            .map(|entries| entries.iter().filter_map(Airport::from_entry).collect())
            .unwrap_or_default();
        debug!(airports = airports.len(), "Airport index built");
        Self { airports }
    }

    /// Download and index the dataset at `url`
    pub async fn fetch(client: &Client, url: &str) -> Result<Self> {
        let document = client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json::<Value>()
            .await?;

        let index = Self::from_json(&document);
        if index.is_empty() {
            warn!(url = %url, "Airport dataset contained no usable entries");
        } else {
            info!(url = %url, airports = index.len(), "Airport dataset loaded");
        }
        Ok(index)
    }

    /// Case-insensitive substring match on city, name, code and country
    pub fn search(&self, query: &str) -> Vec<&Airport> {
        let term = query.trim().to_lowercase();
        if term.chars().count() < MIN_QUERY_LEN {
            return Vec::new();
        }

        self.airports
            .iter()
            .filter(|airport| airport.matches(&term))
            .take(MAX_RESULTS)
            .collect()
    }

    pub fn get(&self, iata: &str) -> Option<&Airport> {
        self.airports
            .iter()
            .find(|airport| airport.iata.eq_ignore_ascii_case(iata))
    }

    pub fn len(&self) -> usize {
        self.airports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.airports.is_empty()
    }
}

#[derive(Debug, Deserialize)]
struct LocationsPage {
    #[serde(default)]
    data: Vec<Location>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Location {
    #[serde(default)]
    iata_code: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    address: Option<LocationAddress>,
    #[serde(default)]
    geo_code: Option<GeoCode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LocationAddress {
    city_name: Option<String>,
    country_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeoCode {
    latitude: Option<f64>,
    longitude: Option<f64>,
}

impl From<Location> for Airport {
    fn from(location: Location) -> Self {
        let address = location.address;
        let (city, country) = match address {
            Some(address) => (address.city_name, address.country_name),
            None => (None, None),
        };
        let geo = location.geo_code;

        Self {
            iata: location.iata_code,
            city: city.unwrap_or_else(|| location.name.clone()),
            country: country.unwrap_or_default(),
            name: location.name,
            latitude: geo.as_ref().and_then(|geo| geo.latitude),
            longitude: geo.as_ref().and_then(|geo| geo.longitude),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LocationLookup<'a> {
    sub_type: &'a str,
    keyword: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    country_code: Option<&'a str>,
}

impl<A: AuthClient> ApiClient<A> {
    /// Cities and airports matching `keyword`, optionally within one country
    pub async fn search_locations(&self, keyword: &str, country_code: Option<&str>) -> ApiResult<Vec<Airport>> {
        let keyword = keyword.trim();
        if keyword.chars().count() < MIN_LOCATION_KEYWORD_LEN {
            return Ok(Vec::new());
        }

        let lookup = LocationLookup {
            sub_type: "CITY,AIRPORT",
            keyword,
            country_code: country_code.filter(|code| !code.is_empty()),
        };
        let response = self.get::<LocationsPage>(LOCATIONS_ENDPOINT, &lookup).await?;

        Ok(response
            .data
            .map(|page| page.data)
            .unwrap_or_default()
            .into_iter()
            .map(Airport::from)
            .collect())
    }
}
