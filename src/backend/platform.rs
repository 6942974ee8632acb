//! Voice platform call-detail client.
//!
//! After a call ends the platform runs analysis asynchronously; the session's
//! teardown path polls [`VoicePlatformClient::get_call`] until the summary is
//! ready (bounded retries) and then persists a communication record.

use serde::Deserialize;

use super::BackendError;

/// One call record from the platform's call-detail endpoint. Only the fields
/// needed for summary persistence are decoded.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CallRecord {
    pub call_analysis: Option<CallAnalysis>,
    pub duration_ms: Option<f64>,
    /// Call start, milliseconds since the Unix epoch.
    pub start_timestamp: Option<i64>,
    pub recording_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CallAnalysis {
    pub call_summary: Option<String>,
}

impl CallRecord {
    /// The analysis summary, once the platform has produced one.
    pub fn summary(&self) -> Option<&str> {
        self.call_analysis
            .as_ref()
            .and_then(|a| a.call_summary.as_deref())
            .filter(|s| !s.is_empty())
    }

    /// Call duration in whole seconds.
    pub fn duration_secs(&self) -> i64 {
        (self.duration_ms.unwrap_or(0.0) / 1000.0) as i64
    }
}

/// Client for the voice platform's call-detail API.
pub struct VoicePlatformClient {
    base_url: String,
    api_key: Option<String>,
    http: reqwest::Client,
}

impl VoicePlatformClient {
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

    /// Fetch the detail record for one call.
    pub async fn get_call(&self, call_id: &str) -> Result<CallRecord, BackendError> {
        let url = format!("{}/v2/get-call/{call_id}", self.base_url);
        let mut builder = self.http.get(&url);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::UnexpectedStatus {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }
        response
            .json()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_requires_non_empty_text() {
        let record: CallRecord = serde_json::from_str(
            r#"{"call_analysis": {"call_summary": ""}, "duration_ms": 4500.0}"#,
        )
        .expect("parse");
        assert!(record.summary().is_none());

        let record: CallRecord = serde_json::from_str(
            r#"{"call_analysis": {"call_summary": "Caller asked about listings"}}"#,
        )
        .expect("parse");
        assert_eq!(record.summary(), Some("Caller asked about listings"));
    }

    #[test]
    fn duration_is_truncated_to_seconds() {
        let record = CallRecord {
            duration_ms: Some(95_600.0),
            ..Default::default()
        };
        assert_eq!(record.duration_secs(), 95);

        let empty = CallRecord::default();
        assert_eq!(empty.duration_secs(), 0);
    }

    #[test]
    fn record_parses_without_analysis() {
        let record: CallRecord =
            serde_json::from_str(r#"{"duration_ms": 1000.0, "start_timestamp": 1754000000000}"#)
                .expect("parse");
        assert!(record.summary().is_none());
        assert_eq!(record.start_timestamp, Some(1_754_000_000_000));
    }
}
