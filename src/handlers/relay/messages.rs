//! Relay WebSocket message types.
//!
//! Wire contract with the voice platform: inbound events are JSON objects
//! tagged by `interaction_type`; outbound frames are tagged by
//! `response_type`. The response frame is the universal streaming unit:
//! zero or more non-complete frames followed by exactly one complete frame
//! per response id.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::llm::ResponseFrame;
use crate::session::Utterance;

/// Upper bound on the total transcript text carried by one event (1 MB).
pub const MAX_TRANSCRIPT_BYTES: usize = 1024 * 1024;

// =============================================================================
// Inbound Events (Platform -> Server)
// =============================================================================

/// Incoming events on the call connection.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "interaction_type", rename_all = "snake_case")]
pub enum InboundEvent {
    /// One-time session bootstrap carrying call id and dynamic variables.
    CallDetails(CallDetailsEvent),

    /// Keepalive echo request.
    PingPong { timestamp: i64 },

    /// Transcript update that requires no reply.
    UpdateOnly,

    /// New user input needs a generated response.
    ResponseRequired(GenerationTrigger),

    /// Proactive nudge with no new user utterance.
    ReminderRequired(GenerationTrigger),

    /// Any interaction type this server does not recognize. Logged, ignored.
    #[serde(other)]
    Unknown,
}

/// Payload of a `call_details` event.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CallDetailsEvent {
    pub call: CallDescriptor,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CallDescriptor {
    pub call_id: Option<String>,
    pub dynamic_variables: Option<Value>,
}

/// Payload shared by the generation-triggering events.
#[derive(Debug, Clone, Deserialize)]
pub struct GenerationTrigger {
    pub response_id: u64,
    #[serde(default)]
    pub transcript: Vec<Utterance>,
}

/// Error produced by inbound size validation.
#[derive(Debug, thiserror::Error)]
#[error("transcript too large: {size} bytes (max: {max} bytes)")]
pub struct TranscriptTooLarge {
    pub size: usize,
    pub max: usize,
}

impl InboundEvent {
    /// Validate inbound field sizes to bound per-frame memory use.
    pub fn validate_size(&self) -> Result<(), TranscriptTooLarge> {
        let transcript = match self {
            InboundEvent::ResponseRequired(trigger) | InboundEvent::ReminderRequired(trigger) => {
                &trigger.transcript
            }
            _ => return Ok(()),
        };
        let size: usize = transcript
            .iter()
            .map(|u| u.role.len() + u.content.len())
            .sum();
        if size > MAX_TRANSCRIPT_BYTES {
            return Err(TranscriptTooLarge {
                size,
                max: MAX_TRANSCRIPT_BYTES,
            });
        }
        Ok(())
    }

    /// Best-effort response id for fault reporting on a raw frame.
    pub fn fallback_response_id(raw: &Value) -> u64 {
        raw.get("response_id").and_then(|v| v.as_u64()).unwrap_or(0)
    }
}

// =============================================================================
// Outbound Frames (Server -> Platform)
// =============================================================================

/// Connection-level options declared right after accept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionSettings {
    /// The platform may transparently reconnect a dropped connection.
    pub auto_reconnect: bool,
    /// This server wants the one-time `call_details` event.
    pub call_details: bool,
}

/// Outgoing frames on the call connection.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "response_type", rename_all = "snake_case")]
pub enum OutboundFrame {
    /// Configuration frame sent once after accept.
    Config {
        config: ConnectionSettings,
        response_id: u64,
    },

    /// Heartbeat or ping echo.
    PingPong { timestamp: i64 },

    /// The universal streaming unit.
    Response(ResponseFrame),
}

impl OutboundFrame {
    /// The one-time configuration frame.
    pub fn config() -> Self {
        OutboundFrame::Config {
            config: ConnectionSettings {
                auto_reconnect: true,
                call_details: true,
            },
            response_id: 1,
        }
    }

    /// A heartbeat stamped with the current time.
    pub fn heartbeat() -> Self {
        OutboundFrame::PingPong {
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    /// Echo for an inbound ping, carrying the peer's timestamp unchanged.
    pub fn pong(timestamp: i64) -> Self {
        OutboundFrame::PingPong { timestamp }
    }
}

/// Routing envelope between the connection tasks and the socket sender.
#[derive(Debug)]
pub enum FrameRoute {
    /// Serialize and send a JSON frame.
    Outgoing(OutboundFrame),
    /// Close the connection after flushing.
    Close,
}
