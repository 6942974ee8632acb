//! Tool invocation layer.
//!
//! The model requests external actions as named tool calls with a JSON
//! argument string. This module owns the uniform dispatch path:
//!
//! 1. [`ToolRequest::parse`] turns (name, argument string) into a validated,
//!    tagged request type; invalid input fails closed with a structured
//!    error, never a silent coercion.
//! 2. [`ToolInvoker::invoke`] executes the request against the right backend
//!    and returns one normalized JSON payload per call, success or error.
//!
//! Read-only lookups (places, properties) go through the [`cache::ToolCache`].

use std::sync::Arc;

use serde_json::{Value, json};
use thiserror::Error;

use crate::backend::{BackendError, CallerIdentity, CrmClient, DispatchOutcome};

pub mod booking;
pub mod cache;
pub mod calling;
pub mod messaging;
pub mod places;
pub mod properties;

pub use booking::BookingRequest;
pub use cache::ToolCache;
pub use calling::CallRequest;
pub use messaging::{MessageChannel, MessageRequest};
pub use places::{PlacesClient, PlacesSearch};
pub use properties::{ListingStatus, PropertyClient, PropertySearch};

// =============================================================================
// Error Types
// =============================================================================

/// Errors from parsing, validating, or executing one tool call.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The model asked for a capability that does not exist. A contract
    /// error for that call only, never fatal to the session.
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    /// The argument string did not match the tool's schema
    #[error("invalid arguments for {tool}: {message}")]
    InvalidArguments { tool: String, message: String },

    /// Arguments parsed but failed a semantic constraint
    #[error("validation failed: {0}")]
    Validation(String),

    /// The downstream backend call failed
    #[error(transparent)]
    Backend(#[from] BackendError),
}

// =============================================================================
// Tool Requests
// =============================================================================

/// A fully parsed and validated tool call, one variant per capability.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolRequest {
    PlacesSearch(PlacesSearch),
    Booking(BookingRequest),
    Call(CallRequest),
    Message(MessageRequest),
    PropertySearch(PropertySearch),
}

impl ToolRequest {
    /// Parse one tool call by name. Unknown names and malformed argument
    /// strings fail closed.
    pub fn parse(name: &str, arguments: &str) -> Result<Self, ToolError> {
        fn decode<T: serde::de::DeserializeOwned>(
            tool: &str,
            arguments: &str,
        ) -> Result<T, ToolError> {
            serde_json::from_str(arguments).map_err(|e| ToolError::InvalidArguments {
                tool: tool.to_string(),
                message: e.to_string(),
            })
        }

        match name {
            "PlacesSearch" => Ok(Self::PlacesSearch(decode(name, arguments)?)),
            "BookingRequest" => Ok(Self::Booking(decode(name, arguments)?)),
            "CallRequest" => Ok(Self::Call(decode(name, arguments)?)),
            "MessageRequest" => Ok(Self::Message(decode(name, arguments)?)),
            "PropertySearch" => Ok(Self::PropertySearch(decode(name, arguments)?)),
            other => Err(ToolError::UnknownTool(other.to_string())),
        }
    }
}

/// Map a dispatch outcome onto the payload fed back to the model, keeping
/// the status families distinguishable.
pub(crate) fn dispatch_payload(outcome: DispatchOutcome, accepted_status: &str) -> Value {
    match outcome {
        DispatchOutcome::Accepted(body) => json!({"status": accepted_status, "response": body}),
        DispatchOutcome::MultipleMatches(body) => {
            json!({"status": "multiple_matches", "response": body})
        }
        DispatchOutcome::NotFound(body) => json!({"status": "not_found", "response": body}),
    }
}

// =============================================================================
// Tool Schemas
// =============================================================================

/// The tool schemas offered to the model on the first generation pass.
pub fn tool_definitions() -> Vec<Value> {
    vec![
        json!({
            "type": "function",
            "function": {
                "name": "PlacesSearch",
                "description": "Search for places near a location. Use ONLY when the agent asks \
                    about local amenities or needs specific business/place names. Do not use for \
                    general area talk or when results from a previous search already cover it.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "location": {
                            "type": "string",
                            "description": "Location to search around"
                        },
                        "query_type": {
                            "type": "string",
                            "description": "Type of place to search for (e.g., restaurants, parks, schools)"
                        }
                    },
                    "required": ["location", "query_type"]
                }
            }
        }),
        json!({
            "type": "function",
            "function": {
                "name": "BookingRequest",
                "description": "Book a specific appointment. Use ONLY when the agent explicitly \
                    asks to schedule an appointment and has given a concrete date and time. Do \
                    not use while availability is still being discussed.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "lead_name": {
                            "type": "string",
                            "description": "The name of the lead to be scheduled for the appointment"
                        },
                        "start_time": {
                            "type": "string",
                            "description": "Start time in ISO format (YYYY-MM-DDTHH:MM:SS)"
                        },
                        "location": {
                            "type": "string",
                            "description": "A meeting location if the meeting is in person"
                        },
                        "description": {
                            "type": "string",
                            "description": "A clear and detailed appointment description"
                        }
                    },
                    "required": ["lead_name", "start_time", "description"]
                }
            }
        }),
        json!({
            "type": "function",
            "function": {
                "name": "CallRequest",
                "description": "Schedule a call with a contact. Use ONLY when the agent asks to \
                    call someone. The call time must be either now (today) or the next day; ask \
                    clarifying questions if the timing is unclear.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "contact_name": {
                            "type": "string",
                            "description": "Name of the contact to call"
                        },
                        "discussion_points": {
                            "type": "string",
                            "description": "Specific discussion points to address during the call"
                        },
                        "call_time": {
                            "type": "string",
                            "description": "Scheduled call time in ISO format (YYYY-MM-DDTHH:MM:SS). Must be today or the next day."
                        }
                    },
                    "required": ["contact_name", "call_time", "discussion_points"]
                }
            }
        }),
        json!({
            "type": "function",
            "function": {
                "name": "MessageRequest",
                "description": "Send a message to a lead. Use ONLY when the agent asks to send a \
                    message and has named the lead, the channel (SMS or Email), and the content.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "lead_name": {
                            "type": "string",
                            "description": "The name of the lead to send the message to"
                        },
                        "message_type": {
                            "type": "string",
                            "description": "Type of message to send. Allowed values: 'SMS' or 'Email'"
                        },
                        "message_content": {
                            "type": "string",
                            "description": "The content of the message that should be sent"
                        }
                    },
                    "required": ["lead_name", "message_type", "message_content"]
                }
            }
        }),
        json!({
            "type": "function",
            "function": {
                "name": "PropertySearch",
                "description": "Search for property listings in a location. Use when the agent \
                    asks about homes for sale or for rent in a specific area.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "location": {
                            "type": "string",
                            "description": "Location to search for properties"
                        },
                        "status_type": {
                            "type": "string",
                            "description": "Listing status: ForSale or ForRent"
                        }
                    },
                    "required": ["location"]
                }
            }
        }),
    ]
}

// =============================================================================
// Tool Invoker
// =============================================================================

/// Uniform dispatch of named tool calls to their backends.
pub struct ToolInvoker {
    crm: Arc<CrmClient>,
    places: PlacesClient,
    properties: PropertyClient,
    cache: ToolCache,
}

impl ToolInvoker {
    pub fn new(
        crm: Arc<CrmClient>,
        places: PlacesClient,
        properties: PropertyClient,
        cache: ToolCache,
    ) -> Self {
        Self {
            crm,
            places,
            properties,
            cache,
        }
    }

    /// Execute one tool call and return its normalized result payload.
    ///
    /// Every failure mode maps to a `ToolError`; the caller decides whether
    /// to surface it as an error payload (it never aborts the turn).
    pub async fn invoke(
        &self,
        identity: &CallerIdentity,
        name: &str,
        arguments: &str,
    ) -> Result<Value, ToolError> {
        match ToolRequest::parse(name, arguments)? {
            ToolRequest::PlacesSearch(request) => {
                let key = serde_json::to_value(&request).unwrap_or(Value::Null);
                if let Some(hit) = self.cache.get(name, &key).await {
                    return Ok(hit);
                }
                let places = self.places.find_places(&request).await?;
                let payload = json!({ "places": places });
                self.cache.insert(name, &key, payload.clone()).await;
                Ok(payload)
            }
            ToolRequest::Booking(request) => request.dispatch(&self.crm, identity).await,
            ToolRequest::Call(request) => request.dispatch(&self.crm, identity).await,
            ToolRequest::Message(request) => request.dispatch(&self.crm, identity).await,
            ToolRequest::PropertySearch(request) => {
                let key = serde_json::to_value(&request).unwrap_or(Value::Null);
                if let Some(hit) = self.cache.get(name, &key).await {
                    return Ok(hit);
                }
                let payload = self.properties.search(&request).await?;
                self.cache.insert(name, &key, payload.clone()).await;
                Ok(payload)
            }
        }
    }
}
