//! Search query model and its translation into vendor wire parameters

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Date format the vendor expects in segments
pub const VENDOR_DATE_FORMAT: &str = "%d.%m.%Y";

/// Date format of user-facing queries
pub const ISO_DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TripType {
    Oneway,
    Roundtrip,
}

/// Cabin class, serialized as the vendor's single-letter code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TravelClass {
    #[default]
    #[serde(rename = "e")]
    Economy,
    #[serde(rename = "w")]
    PremiumEconomy,
    #[serde(rename = "b")]
    Business,
    #[serde(rename = "f")]
    First,
}

impl TravelClass {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Economy => "e",
            Self::PremiumEconomy => "w",
            Self::Business => "b",
            Self::First => "f",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Economy => "Economy",
            Self::PremiumEconomy => "Premium Economy",
            Self::Business => "Business",
            Self::First => "First Class",
        }
    }

    /// Parse a class code; unknown codes fall back to economy
    pub fn from_code(code: &str) -> Self {
        match code {
            "w" => Self::PremiumEconomy,
            "b" => Self::Business,
            "f" => Self::First,
            _ => Self::Economy,
        }
    }
}

impl fmt::Display for TravelClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassengerCounts {
    pub adults: u32,
    #[serde(default)]
    pub children: u32,
    #[serde(default)]
    pub infants: u32,
}

impl PassengerCounts {
    pub fn total(&self) -> u32 {
        self.adults.saturating_add(self.children).saturating_add(self.infants)
    }
}

impl Default for PassengerCounts {
    fn default() -> Self {
        Self {
            adults: 1,
            children: 0,
            infants: 0,
        }
    }
}

impl fmt::Display for PassengerCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let plural = |n: u32, one: &str, many: &str| format!("{n} {}", if n == 1 { one } else { many });

        let mut parts = Vec::new();
        if self.adults > 0 {
            parts.push(plural(self.adults, "Adult", "Adults"));
        }
        if self.children > 0 {
            parts.push(plural(self.children, "Child", "Children"));
        }
        if self.infants > 0 {
            parts.push(plural(self.infants, "Infant", "Infants"));
        }
        f.write_str(&parts.join(", "))
    }
}

/// Validated user flight search
///
/// Upstream validation owns structural checks; building wire parameters
/// from a query never fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    pub trip_type: TripType,
    pub from: String,
    pub to: String,
    pub departure_date: NaiveDate,
    #[serde(default, deserialize_with = "empty_date_as_none")]
    pub return_date: Option<NaiveDate>,
    #[serde(default)]
    pub passengers: PassengerCounts,
    #[serde(default)]
    pub travel_class: TravelClass,
    #[serde(default)]
    pub direct_only: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_airlines: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gds_white_list: Option<Vec<u32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gds_black_list: Option<Vec<u32>>,
}

impl SearchQuery {
    pub fn one_way(from: impl Into<String>, to: impl Into<String>, departure_date: NaiveDate) -> Self {
        Self {
            trip_type: TripType::Oneway,
            from: from.into(),
            to: to.into(),
            departure_date,
            return_date: None,
            passengers: PassengerCounts::default(),
            travel_class: TravelClass::default(),
            direct_only: false,
            filter_airlines: None,
            gds_white_list: None,
            gds_black_list: None,
        }
    }

    pub fn round_trip(
        from: impl Into<String>,
        to: impl Into<String>,
        departure_date: NaiveDate,
        return_date: NaiveDate,
    ) -> Self {
        Self {
            trip_type: TripType::Roundtrip,
            return_date: Some(return_date),
            ..Self::one_way(from, to, departure_date)
        }
    }

    pub fn with_passengers(mut self, passengers: PassengerCounts) -> Self {
        self.passengers = passengers;
        self
    }

    pub fn with_class(mut self, travel_class: TravelClass) -> Self {
        self.travel_class = travel_class;
        self
    }

    pub fn direct_only(mut self, direct_only: bool) -> Self {
        self.direct_only = direct_only;
        self
    }
}

fn empty_date_as_none<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => NaiveDate::parse_from_str(raw.trim(), ISO_DATE_FORMAT)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

/// One leg of the requested itinerary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchSegment {
    pub from: String,
    pub to: String,
    /// `DD.MM.YYYY`
    pub date: String,
}

/// Parameters of `/avia/search-recommendations`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlightSearchParams {
    pub adt: u32,
    pub chd: u32,
    pub inf: u32,
    /// Seniors; not collected from users
    pub src: u32,
    /// Youths; not collected from users
    pub yth: u32,
    pub class: TravelClass,
    pub segments: Vec<SearchSegment>,
    pub is_direct_only: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter_airlines: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gds_white_list: Option<Vec<u32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gds_black_list: Option<Vec<u32>>,
    pub lang: String,
}

/// Translate a query into vendor wire parameters
///
/// Round trips get a second segment with origin and destination swapped. A
/// round trip without a return date only yields the outbound segment.
pub fn build_search_params(query: &SearchQuery, lang: &str) -> FlightSearchParams {
    let mut segments = vec![SearchSegment {
        from: query.from.clone(),
        to: query.to.clone(),
        date: format_vendor_date(query.departure_date),
    }];

    if query.trip_type == TripType::Roundtrip {
        if let Some(return_date) = query.return_date {
            segments.push(SearchSegment {
                from: query.to.clone(),
                to: query.from.clone(),
                date: format_vendor_date(return_date),
            });
        }
    }

    FlightSearchParams {
        adt: query.passengers.adults,
        chd: query.passengers.children,
        inf: query.passengers.infants,
        src: 0,
        yth: 0,
        class: query.travel_class,
        segments,
        is_direct_only: u8::from(query.direct_only),
        filter_airlines: query.filter_airlines.clone(),
        gds_white_list: query.gds_white_list.clone(),
        gds_black_list: query.gds_black_list.clone(),
        lang: lang.to_string(),
    }
}

pub fn format_vendor_date(date: NaiveDate) -> String {
    date.format(VENDOR_DATE_FORMAT).to_string()
}

pub fn parse_vendor_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), VENDOR_DATE_FORMAT).ok()
}

/// `YYYY-MM-DD` to `DD.MM.YYYY`
pub fn reformat_iso_date(iso: &str) -> Option<String> {
    NaiveDate::parse_from_str(iso.trim(), ISO_DATE_FORMAT)
        .ok()
        .map(format_vendor_date)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_one_way_query() {
        let query: SearchQuery = serde_json::from_value(json!({
            "tripType": "oneway",
            "from": "JFK",
            "to": "LAX",
            "departureDate": "2025-06-01",
            "passengers": { "adults": 1, "children": 0, "infants": 0 },
            "travelClass": "e",
            "directOnly": false
        }))
        .unwrap();

        let params = build_search_params(&query, "en");
        assert_eq!(
            params.segments,
            vec![SearchSegment {
                from: "JFK".to_string(),
                to: "LAX".to_string(),
                date: "01.06.2025".to_string(),
            }]
        );
        assert_eq!(params.class, TravelClass::Economy);
        assert_eq!(params.is_direct_only, 0);
        assert_eq!((params.adt, params.chd, params.inf, params.src, params.yth), (1, 0, 0, 0, 0));

        let wire = serde_json::to_value(&params).unwrap();
        assert_eq!(wire["class"], "e");
        assert_eq!(wire["is_direct_only"], 0);
        assert_eq!(wire["lang"], "en");
        assert!(wire.get("filter_airlines").is_none());
    }

    #[test]
    fn test_round_trip_inverts_segment() {
        let query = SearchQuery::round_trip("JFK", "LAX", date(2025, 6, 1), date(2025, 6, 8))
            .with_class(TravelClass::Business)
            .direct_only(true);

        let params = build_search_params(&query, "ru");
        assert_eq!(params.segments.len(), 2);
        let (outbound, inbound) = (&params.segments[0], &params.segments[1]);
        assert_eq!((outbound.from.as_str(), outbound.to.as_str()), ("JFK", "LAX"));
        assert_eq!((inbound.from.as_str(), inbound.to.as_str()), ("LAX", "JFK"));
        assert_eq!(outbound.date, "01.06.2025");
        assert_eq!(inbound.date, "08.06.2025");
        assert_eq!(params.is_direct_only, 1);
        assert_eq!(params.class.code(), "b");
        assert_eq!(params.lang, "ru");
    }

    #[test]
    fn test_round_trip_without_return_date() {
        let query: SearchQuery = serde_json::from_value(json!({
            "tripType": "roundtrip",
            "from": "JFK",
            "to": "LAX",
            "departureDate": "2025-06-01",
            "returnDate": ""
        }))
        .unwrap();
        assert_eq!(query.return_date, None);
        assert_eq!(build_search_params(&query, "en").segments.len(), 1);
    }

    #[test]
    fn test_vendor_date_round_trip() {
        for day in [date(2025, 1, 1), date(2024, 2, 29), date(2025, 12, 31), date(1999, 7, 9)] {
            let vendor = format_vendor_date(day);
            assert_eq!(parse_vendor_date(&vendor), Some(day));
        }
        assert_eq!(reformat_iso_date("2025-06-01").as_deref(), Some("01.06.2025"));
        assert_eq!(reformat_iso_date("06/01/2025"), None);
    }

    #[test]
    fn test_travel_class_codes() {
        assert_eq!(TravelClass::from_code("w"), TravelClass::PremiumEconomy);
        assert_eq!(TravelClass::from_code("x"), TravelClass::Economy);
        assert_eq!(TravelClass::First.to_string(), "First Class");
        assert_eq!(serde_json::to_value(TravelClass::PremiumEconomy).unwrap(), "w");
    }

    #[test]
    fn test_passenger_text() {
        assert_eq!(PassengerCounts::default().to_string(), "1 Adult");
        let family = PassengerCounts {
            adults: 2,
            children: 1,
            infants: 2,
        };
        assert_eq!(family.to_string(), "2 Adults, 1 Child, 2 Infants");
        assert_eq!(family.total(), 5);
    }

    #[test]
    fn test_passenger_total_saturates() {
        let counts = PassengerCounts {
            adults: u32::MAX,
            children: 1,
            infants: 1,
        };
        assert_eq!(counts.total(), u32::MAX);
    }
}
