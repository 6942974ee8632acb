//! Property listing search tool.
//!
//! Aggregates results from two property-data providers queried concurrently,
//! preferring whichever the primary returns; the secondary only fills in
//! when the primary parse comes back empty. Records are normalized into one
//! shape regardless of source.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

use super::ToolError;

/// How many listings a single search returns at most.
const RESULT_LIMIT: usize = 3;

/// Default freshness window sent to the primary provider, in days.
const DAYS_ON_MARKET: u32 = 7;

/// Listing status filter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ListingStatus {
    #[default]
    ForSale,
    ForRent,
}

impl ListingStatus {
    /// Parameter value for the secondary provider's `status` field.
    fn secondary_param(self) -> &'static str {
        match self {
            ListingStatus::ForSale => "forSale",
            ListingStatus::ForRent => "forRent",
        }
    }

    fn primary_param(self) -> &'static str {
        match self {
            ListingStatus::ForSale => "ForSale",
            ListingStatus::ForRent => "ForRent",
        }
    }
}

/// Search for property listings in a location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PropertySearch {
    /// Location to search for properties.
    pub location: String,
    /// Listing status filter; defaults to for-sale.
    #[serde(default)]
    pub status_type: ListingStatus,
}

/// One normalized property listing.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PropertyRecord {
    pub address: String,
    pub price: f64,
    pub bedrooms: u32,
    pub bathrooms: f64,
    pub living_area: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lot_area: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lot_area_unit: Option<String>,
    pub property_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rent_estimate: Option<f64>,
    pub days_on_market: u32,
    pub listing_status: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// Client querying both property-data providers.
pub struct PropertyClient {
    primary_base_url: String,
    secondary_base_url: String,
    api_key: Option<String>,
    http: reqwest::Client,
}

impl PropertyClient {
    pub fn new(
        primary_base_url: impl Into<String>,
        secondary_base_url: impl Into<String>,
        api_key: Option<String>,
    ) -> Self {
        let trim = |url: String| url.trim_end_matches('/').to_string();
        Self {
            primary_base_url: trim(primary_base_url.into()),
            secondary_base_url: trim(secondary_base_url.into()),
            api_key,
            http: reqwest::Client::new(),
        }
    }

    /// Search both providers and return up to three normalized listings.
    pub async fn search(&self, request: &PropertySearch) -> Result<Value, ToolError> {
        let (primary, secondary) = tokio::join!(
            self.fetch_primary(request),
            self.fetch_secondary(request)
        );

        let mut records = primary
            .map(|body| parse_primary(&body))
            .unwrap_or_default();
        if records.is_empty() {
            records = secondary
                .map(|body| parse_secondary(&body))
                .unwrap_or_default();
        }
        records.truncate(RESULT_LIMIT);

        if records.is_empty() {
            Ok(json!({
                "properties": [],
                "message": "No listings available for the area",
            }))
        } else {
            Ok(json!({ "properties": records }))
        }
    }

    async fn fetch_primary(&self, request: &PropertySearch) -> Option<Value> {
        let url = format!("{}/propertyExtendedSearch", self.primary_base_url);
        let days = DAYS_ON_MARKET.to_string();
        self.fetch(
            &url,
            &self.primary_base_url,
            &[
                ("location", request.location.as_str()),
                ("status_type", request.status_type.primary_param()),
                ("home_type", "Houses"),
                ("daysOn", days.as_str()),
            ],
        )
        .await
    }

    async fn fetch_secondary(&self, request: &PropertySearch) -> Option<Value> {
        let url = format!("{}/search", self.secondary_base_url);
        self.fetch(
            &url,
            &self.secondary_base_url,
            &[
                ("location", request.location.as_str()),
                ("status", request.status_type.secondary_param()),
                ("listing_type", "by_agent"),
                ("sortSelection", "priorityscore"),
                ("output", "json"),
                ("doz", "any"),
            ],
        )
        .await
    }

    /// One provider fetch. Provider failures degrade to `None`: the search
    /// answers with whatever the other source produced.
    async fn fetch(&self, url: &str, base: &str, params: &[(&str, &str)]) -> Option<Value> {
        let mut builder = self.http.get(url).query(params);
        if let Some(key) = &self.api_key {
            builder = builder
                .header("x-rapidapi-host", host_of(base))
                .header("x-rapidapi-key", key);
        }
        match builder.send().await {
            Ok(response) if response.status().is_success() => response.json().await.ok(),
            Ok(response) => {
                debug!(url, status = %response.status(), "property provider returned error");
                None
            }
            Err(e) => {
                debug!(url, error = %e, "property provider unreachable");
                None
            }
        }
    }
}

fn host_of(base_url: &str) -> &str {
    let stripped = base_url
        .strip_prefix("https://")
        .or_else(|| base_url.strip_prefix("http://"))
        .unwrap_or(base_url);
    stripped.split('/').next().unwrap_or(stripped)
}

/// Strip bare house numbers out of an address so listings read as areas,
/// not exact street addresses.
fn clean_address(raw: &str) -> String {
    raw.split_whitespace()
        .filter(|part| !part.chars().all(|c| c.is_ascii_digit()))
        .collect::<Vec<_>>()
        .join(" ")
}

fn num_f64(value: Option<&Value>) -> f64 {
    opt_f64(value).unwrap_or(0.0)
}

fn opt_f64(value: Option<&Value>) -> Option<f64> {
    let value = value?;
    value
        .as_f64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
}

fn num_u32(value: Option<&Value>) -> u32 {
    opt_f64(value).map(|f| f as u32).unwrap_or(0)
}

fn text(value: Option<&Value>) -> String {
    value
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

/// Parse the primary provider's `props` array.
fn parse_primary(body: &Value) -> Vec<PropertyRecord> {
    let Some(props) = body.get("props").and_then(|p| p.as_array()) else {
        return Vec::new();
    };
    props
        .iter()
        .filter(|p| p.is_object())
        .map(|prop| PropertyRecord {
            address: clean_address(prop.get("address").and_then(|v| v.as_str()).unwrap_or("")),
            price: num_f64(prop.get("price")),
            bedrooms: num_u32(prop.get("bedrooms")),
            bathrooms: num_f64(prop.get("bathrooms")),
            living_area: num_f64(prop.get("livingArea")),
            lot_area: opt_f64(prop.get("lotAreaValue")),
            lot_area_unit: prop
                .get("lotAreaUnit")
                .and_then(|v| v.as_str())
                .map(str::to_owned),
            property_type: text(prop.get("propertyType")),
            estimate: opt_f64(prop.get("zestimate")),
            rent_estimate: opt_f64(prop.get("rentZestimate")),
            days_on_market: num_u32(prop.get("daysOnZillow")),
            listing_status: text(prop.get("listingStatus")),
            latitude: num_f64(prop.get("latitude")),
            longitude: num_f64(prop.get("longitude")),
        })
        .collect()
}

/// Parse the secondary provider's `results` array.
fn parse_secondary(body: &Value) -> Vec<PropertyRecord> {
    let Some(results) = body.get("results").and_then(|r| r.as_array()) else {
        return Vec::new();
    };
    results
        .iter()
        .filter(|p| p.is_object())
        .map(|prop| PropertyRecord {
            address: clean_address(
                prop.get("streetAddress")
                    .and_then(|v| v.as_str())
                    .unwrap_or(""),
            ),
            price: num_f64(prop.get("price")),
            bedrooms: num_u32(prop.get("bedrooms")),
            bathrooms: num_f64(prop.get("bathrooms")),
            living_area: num_f64(prop.get("livingArea")),
            lot_area: None,
            lot_area_unit: None,
            property_type: text(prop.get("homeType")),
            estimate: opt_f64(prop.get("zestimate")),
            rent_estimate: opt_f64(prop.get("rentZestimate")),
            days_on_market: num_u32(prop.get("daysOnZillow")),
            listing_status: String::new(),
            latitude: num_f64(prop.get("latitude")),
            longitude: num_f64(prop.get("longitude")),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_cleaning_strips_house_numbers() {
        assert_eq!(
            clean_address("1421 Maple Ave Unit 4B Austin"),
            "Maple Ave Unit 4B Austin"
        );
        assert_eq!(clean_address(""), "");
    }

    #[test]
    fn primary_listings_are_normalized() {
        let body = json!({
            "props": [{
                "address": "12 Oak St Dallas",
                "price": "450000",
                "bedrooms": 3,
                "bathrooms": 2.5,
                "livingArea": 1850.0,
                "lotAreaValue": 0.21,
                "lotAreaUnit": "acres",
                "propertyType": "SINGLE_FAMILY",
                "zestimate": 460000.0,
                "daysOnZillow": 4,
                "listingStatus": "FOR_SALE",
                "latitude": 32.78,
                "longitude": -96.80
            }]
        });
        let records = parse_primary(&body);
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.address, "Oak St Dallas");
        assert_eq!(record.price, 450000.0);
        assert_eq!(record.bedrooms, 3);
        assert_eq!(record.lot_area, Some(0.21));
        assert_eq!(record.estimate, Some(460000.0));
        assert!(record.rent_estimate.is_none());
    }

    #[test]
    fn secondary_listings_use_their_field_names() {
        let body = json!({
            "results": [{
                "streetAddress": "77 Pine Rd Houston",
                "price": 325000,
                "bedrooms": "4",
                "bathrooms": 2,
                "livingArea": 2100,
                "homeType": "TOWNHOUSE",
                "rentZestimate": 2400
            }]
        });
        let records = parse_secondary(&body);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].address, "Pine Rd Houston");
        assert_eq!(records[0].bedrooms, 4);
        assert_eq!(records[0].property_type, "TOWNHOUSE");
        assert_eq!(records[0].rent_estimate, Some(2400.0));
    }

    #[test]
    fn malformed_bodies_parse_to_nothing() {
        assert!(parse_primary(&json!({"props": "nope"})).is_empty());
        assert!(parse_secondary(&json!(null)).is_empty());
    }

    #[test]
    fn status_params_match_each_provider() {
        assert_eq!(ListingStatus::ForSale.primary_param(), "ForSale");
        assert_eq!(ListingStatus::ForSale.secondary_param(), "forSale");
        assert_eq!(ListingStatus::ForRent.secondary_param(), "forRent");
    }

    #[test]
    fn status_defaults_to_for_sale() {
        let request: PropertySearch =
            serde_json::from_str(r#"{"location": "Austin"}"#).expect("parse");
        assert_eq!(request.status_type, ListingStatus::ForSale);
    }
}
