//! Outbound call scheduling tool.
//!
//! Call times are constrained to "now" (today) or the following calendar
//! day; anything further out is rejected with a validation error before any
//! backend traffic happens.

use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::booking::parse_iso_datetime;
use super::{ToolError, dispatch_payload};
use crate::backend::{CallerIdentity, CrmClient};

/// Schedule a call with a contact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CallRequest {
    /// Name of the contact to call.
    pub contact_name: String,
    /// Scheduled call time in ISO format; must fall on today or tomorrow.
    pub call_time: String,
    /// Specific discussion points to address during the call.
    #[serde(default)]
    pub discussion_points: Option<String>,
}

impl CallRequest {
    /// Validate the call window and dispatch the request.
    pub async fn dispatch(
        self,
        crm: &CrmClient,
        identity: &CallerIdentity,
    ) -> Result<Value, ToolError> {
        let when = parse_iso_datetime(&self.call_time).ok_or_else(|| {
            ToolError::Validation(format!(
                "call_time must be ISO formatted (YYYY-MM-DDTHH:MM:SS), got {:?}",
                self.call_time
            ))
        })?;

        validate_call_window(when.date(), Local::now().date_naive())?;

        let payload = json!({
            "user_id": identity.user_id,
            "contact_name": self.contact_name,
            "call_time": when.format("%Y-%m-%dT%H:%M:%S").to_string(),
            "discussion_points": self.discussion_points,
        });

        let outcome = crm.initiate_call(&payload).await?;
        Ok(dispatch_payload(outcome, "accepted"))
    }
}

/// The requested date must be today or the next calendar day.
fn validate_call_window(requested: NaiveDate, today: NaiveDate) -> Result<(), ToolError> {
    let tomorrow = today.succ_opt().unwrap_or(today);
    if requested == today || requested == tomorrow {
        Ok(())
    } else {
        Err(ToolError::Validation(
            "call time must be either now (today) or the next day".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn today_is_accepted() {
        assert!(validate_call_window(date(2026, 8, 6), date(2026, 8, 6)).is_ok());
    }

    #[test]
    fn tomorrow_is_accepted() {
        assert!(validate_call_window(date(2026, 8, 7), date(2026, 8, 6)).is_ok());
    }

    #[test]
    fn three_days_out_is_rejected() {
        let err = validate_call_window(date(2026, 8, 9), date(2026, 8, 6)).unwrap_err();
        assert!(matches!(err, ToolError::Validation(_)));
    }

    #[test]
    fn yesterday_is_rejected() {
        assert!(validate_call_window(date(2026, 8, 5), date(2026, 8, 6)).is_err());
    }

    #[test]
    fn month_boundary_tomorrow_is_accepted() {
        assert!(validate_call_window(date(2026, 9, 1), date(2026, 8, 31)).is_ok());
    }

    #[tokio::test]
    async fn far_future_call_rejects_before_dispatch() {
        let request = CallRequest {
            contact_name: "Jordan".into(),
            call_time: "2030-01-01T09:00:00".into(),
            discussion_points: Some("pricing".into()),
        };
        let crm = CrmClient::new("http://127.0.0.1:1");
        let err = request
            .dispatch(&crm, &CallerIdentity::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Validation(_)));
    }
}
