//! Place search tool.
//!
//! Read-only text search against the configured places API. Results come
//! back as short human-readable descriptions the model can speak directly.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ToolError;
use crate::backend::BackendError;

/// How many places a single search returns at most.
const RESULT_LIMIT: usize = 5;

/// Search for places near a specific location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlacesSearch {
    /// Location to search around.
    pub location: String,
    /// Type of place to search for (e.g., restaurants, parks, schools).
    pub query_type: String,
}

/// Client for the places text-search API.
pub struct PlacesClient {
    base_url: String,
    api_key: Option<String>,
    http: reqwest::Client,
}

impl PlacesClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            base_url: {
                let url: String = base_url.into();
                url.trim_end_matches('/').to_string()
            },
            api_key,
            http: reqwest::Client::new(),
        }
    }

    /// Search for open places matching the query, formatted for speech.
    pub async fn find_places(&self, request: &PlacesSearch) -> Result<Vec<String>, ToolError> {
        let url = format!("{}/maps/api/place/textsearch/json", self.base_url);
        let query = format!("{} in {}", request.query_type, request.location);

        let mut builder = self.http.get(&url).query(&[
            ("query", query.as_str()),
            ("opennow", "true"),
            ("language", "en"),
        ]);
        if let Some(key) = &self.api_key {
            builder = builder
                .header("x-rapidapi-host", host_of(&self.base_url))
                .header("x-rapidapi-key", key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| BackendError::Request(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::UnexpectedStatus {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            }
            .into());
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))?;

        Ok(format_results(&body))
    }
}

/// Host portion of a base URL, used for API-gateway host headers.
fn host_of(base_url: &str) -> &str {
    let stripped = base_url
        .strip_prefix("https://")
        .or_else(|| base_url.strip_prefix("http://"))
        .unwrap_or(base_url);
    stripped.split('/').next().unwrap_or(stripped)
}

/// Turn a raw search response into speakable place descriptions.
fn format_results(body: &Value) -> Vec<String> {
    let Some(results) = body.get("results").and_then(|r| r.as_array()) else {
        return vec!["Sorry, no places found or there was an error with the search.".to_string()];
    };
    if results.is_empty() {
        return vec!["Sorry, no places found or there was an error with the search.".to_string()];
    }

    results
        .iter()
        .take(RESULT_LIMIT)
        .map(describe_place)
        .collect()
}

fn describe_place(place: &Value) -> String {
    let name = place.get("name").and_then(|v| v.as_str()).unwrap_or("Unknown");
    let address = place
        .get("formatted_address")
        .and_then(|v| v.as_str())
        .unwrap_or("Address unavailable");
    let rating = place
        .get("rating")
        .and_then(|v| v.as_f64())
        .map(|r| r.to_string())
        .unwrap_or_else(|| "No rating".to_string());
    let reviews = place
        .get("user_ratings_total")
        .and_then(|v| v.as_u64())
        .unwrap_or(0);
    let open_now = place
        .get("opening_hours")
        .and_then(|h| h.get("open_now"))
        .and_then(|v| v.as_bool());
    let status = match open_now {
        Some(true) => "Open",
        Some(false) => "Closed",
        None => "Status unknown",
    };
    let kinds: Vec<&str> = place
        .get("types")
        .and_then(|v| v.as_array())
        .map(|types| {
            types
                .iter()
                .filter_map(|t| t.as_str())
                .filter(|t| *t != "point_of_interest" && *t != "establishment")
                .collect()
        })
        .unwrap_or_default();

    format!(
        "{name}\nAddress: {address}\nRating: {rating} ({reviews} reviews)\nStatus: {status}\nType: {}",
        kinds.join(", ")
    )
}
