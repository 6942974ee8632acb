//! Lead messaging tool (SMS or email dispatch).

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::{ToolError, dispatch_payload};
use crate::backend::{CallerIdentity, CrmClient};

/// Delivery channel for an outbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageChannel {
    #[serde(rename = "SMS")]
    Sms,
    #[serde(rename = "Email")]
    Email,
}

/// Send a message to a lead via SMS or email.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MessageRequest {
    /// The name of the lead to send the message to.
    pub lead_name: String,
    /// Delivery channel.
    pub message_type: MessageChannel,
    /// The content of the message that should be sent.
    pub message_content: String,
}

impl MessageRequest {
    pub async fn dispatch(
        self,
        crm: &CrmClient,
        identity: &CallerIdentity,
    ) -> Result<Value, ToolError> {
        if self.message_content.trim().is_empty() {
            return Err(ToolError::Validation(
                "message_content must not be empty".to_string(),
            ));
        }

        let payload = json!({
            "user_id": identity.user_id,
            "lead_name": self.lead_name,
            "message_type": self.message_type,
            "message_content": self.message_content,
            "timestamp": Utc::now().format("%Y-%m-%dT%H:%M:%S").to_string(),
        });

        let outcome = crm.send_message(&payload).await?;
        Ok(dispatch_payload(outcome, "accepted"))
    }
}
