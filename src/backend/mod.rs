//! External collaborator clients.
//!
//! The relay core treats every downstream system as a narrow request/response
//! contract behind a configured base URL:
//!
//! - [`CrmClient`]: the communications/CRM backend: user history snapshots,
//!   communication persistence, and the booking/call/message dispatch
//!   endpoints used by tools.
//! - [`platform::VoicePlatformClient`]: the voice platform's call-detail API,
//!   polled after a call ends for the analysis summary.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

pub mod platform;

pub use platform::{CallRecord, VoicePlatformClient};

// =============================================================================
// Error Types
// =============================================================================

/// Errors from any external backend call.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The HTTP request failed before a response arrived
    #[error("request failed: {0}")]
    Request(String),

    /// The backend answered with a status outside the expected families
    #[error("backend returned HTTP {status}: {message}")]
    UnexpectedStatus { status: u16, message: String },

    /// The response body could not be decoded
    #[error("failed to decode backend response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        BackendError::Request(e.to_string())
    }
}

// =============================================================================
// Identity
// =============================================================================

/// The resolved user/lead identity a call is running under. Every downstream
/// dispatch carries it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallerIdentity {
    pub user_id: Option<String>,
    pub lead_id: Option<String>,
}

// =============================================================================
// Dispatch Outcomes
// =============================================================================

/// Status families a dispatch endpoint may answer with. Each is surfaced
/// distinctly to the model rather than collapsed into a generic error.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// 200/202: the action is confirmed or scheduled.
    Accepted(Value),
    /// 300: the lead/contact name matched more than one record.
    MultipleMatches(Value),
    /// 404: no matching lead/contact.
    NotFound(Value),
}

// =============================================================================
// Communications Snapshot
// =============================================================================

/// Last-fetched history/metrics for the current user. Advisory only: it
/// enriches prompts and tolerates staleness or absence.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CommunicationsSnapshot {
    pub metrics: SnapshotMetrics,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SnapshotMetrics {
    pub call_metrics: CallMetrics,
    pub lead_metrics: LeadMetrics,
    pub appointments: AppointmentMetrics,
    pub actionable_metrics: ActionableMetrics,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CallMetrics {
    pub total_calls: u64,
    pub calls_by_status: BTreeMap<String, u64>,
    pub average_duration: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LeadMetrics {
    pub total_leads: u64,
    pub leads_by_status: BTreeMap<String, u64>,
    pub latest_interactions: Vec<LeadInteraction>,
    pub most_active_lead: Option<MostActiveLead>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LeadInteraction {
    pub lead_name: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub status: Option<String>,
    pub details: Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MostActiveLead {
    pub name: Option<String>,
    pub interaction_count: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppointmentMetrics {
    pub recent_appointments: Vec<Appointment>,
    pub upcoming_count: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Appointment {
    pub appointment_time: Option<String>,
    pub status: Option<String>,
    pub participant_details: Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ActionableMetrics {
    pub new_leads_last_30_days: u64,
    pub successful_calls_rate: f64,
    pub average_interactions_per_lead: f64,
    pub leads_needing_followup: u64,
}

// =============================================================================
// Communication Record
// =============================================================================

/// One persisted communication, written after a call ends.
#[derive(Debug, Clone, Serialize)]
pub struct CommunicationRecord {
    pub user_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assistant_id: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    pub status: String,
    pub details: CommunicationDetails,
    pub duration: i64,
    pub call_time: String,
    pub call_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommunicationDetails {
    pub notes: String,
    pub recording_url: String,
}

// =============================================================================
// CRM Client
// =============================================================================

/// Client for the communications/CRM backend.
pub struct CrmClient {
    base_url: String,
    http: reqwest::Client,
}

impl CrmClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: {
                let url: String = base_url.into();
                url.trim_end_matches('/').to_string()
            },
            http: reqwest::Client::new(),
        }
    }

    /// Fetch the user's communications/metrics snapshot.
    pub async fn fetch_user_communications(
        &self,
        user_id: &str,
    ) -> Result<CommunicationsSnapshot, BackendError> {
        let url = format!("{}/get_user_communications/{user_id}", self.base_url);
        let response = self.http.get(&url).send().await?;
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

    /// Persist one communication record. The backend answers 201 on success.
    pub async fn save_communication(
        &self,
        record: &CommunicationRecord,
    ) -> Result<(), BackendError> {
        let url = format!("{}/save_communication", self.base_url);
        let response = self.http.post(&url).json(record).send().await?;
        let status = response.status();
        if status.as_u16() != 201 {
            return Err(BackendError::UnexpectedStatus {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }
        debug!(call_id = %record.call_id, "communication record saved");
        Ok(())
    }

    /// Request an appointment booking. Returns a "scheduled" acknowledgment
    /// while the calendar write happens out of band.
    pub async fn book_appointment(&self, payload: &Value) -> Result<DispatchOutcome, BackendError> {
        self.post_dispatch("/book_appointment", payload).await
    }

    /// Request an outbound call.
    pub async fn initiate_call(&self, payload: &Value) -> Result<DispatchOutcome, BackendError> {
        self.post_dispatch("/initiate_call", payload).await
    }

    /// Request an SMS or email dispatch.
    pub async fn send_message(&self, payload: &Value) -> Result<DispatchOutcome, BackendError> {
        self.post_dispatch("/send_message", payload).await
    }

    /// Shared dispatch POST handling the 200/202, 300, and 404 families.
    async fn post_dispatch(
        &self,
        path: &str,
        payload: &Value,
    ) -> Result<DispatchOutcome, BackendError> {
        let url = format!("{}{path}", self.base_url);
        let response = self.http.post(&url).json(payload).send().await?;
        let status = response.status().as_u16();
        let body: Value = response.json().await.unwrap_or(Value::Null);

        match status {
            200 | 202 => Ok(DispatchOutcome::Accepted(body)),
            300 => Ok(DispatchOutcome::MultipleMatches(body)),
            404 => Ok(DispatchOutcome::NotFound(body)),
            _ => {
                let message = body
                    .get("message")
                    .and_then(|m| m.as_str())
                    .unwrap_or("unknown error")
                    .to_string();
                Err(BackendError::UnexpectedStatus { status, message })
            }
        }
    }
}
