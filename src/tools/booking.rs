//! Appointment booking tool.
//!
//! Sends a booking request to the CRM backend. The backend acknowledges with
//! 202 while the actual calendar write happens out of band, so a successful
//! call means "scheduled", not "written".

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::{ToolError, dispatch_payload};
use crate::backend::{CallerIdentity, CrmClient};

/// Book an appointment with a lead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BookingRequest {
    /// The name of the lead to be scheduled for the appointment.
    pub lead_name: String,
    /// Start time in ISO format (YYYY-MM-DDTHH:MM:SS).
    pub start_time: String,
    /// A meeting location if the meeting is in person.
    #[serde(default)]
    pub location: Option<String>,
    /// A clear and detailed appointment description.
    #[serde(default)]
    pub description: Option<String>,
}

impl BookingRequest {
    /// Validate the start time and dispatch the booking.
    pub async fn dispatch(
        self,
        crm: &CrmClient,
        identity: &CallerIdentity,
    ) -> Result<Value, ToolError> {
        let start = parse_iso_datetime(&self.start_time).ok_or_else(|| {
            ToolError::Validation(format!(
                "start_time must be ISO formatted (YYYY-MM-DDTHH:MM:SS), got {:?}",
                self.start_time
            ))
        })?;

        let payload = json!({
            "user_id": identity.user_id,
            "lead_name": self.lead_name,
            "start_time": start.format("%Y-%m-%dT%H:%M:%S").to_string(),
            "location": self.location,
            "description": self.description,
        });

        let outcome = crm.book_appointment(&payload).await?;
        Ok(dispatch_payload(outcome, "scheduled"))
    }
}

/// Parse an ISO-8601 local datetime, with or without seconds.
pub(crate) fn parse_iso_datetime(value: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M"))
        .ok()
}
