//! Language-model integration layer.
//!
//! This module owns everything between an interaction request and the stream
//! of response frames sent back to the peer:
//!
//! - [`openai`]: OpenAI-compatible chat-completions client with SSE streaming
//! - [`sse`]: SSE wire decoding shared by streaming clients
//! - [`prompt`]: prompt assembly (persona, personalized context, transcript)
//! - [`engine`]: the streaming response engine driving one generation cycle
//!
//! The [`ChatApi`] trait is the seam between the engine and a concrete model
//! backend, so the engine can be exercised against scripted streams in tests.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod engine;
pub mod openai;
pub mod prompt;
pub mod sse;

pub use engine::ResponseEngine;
pub use openai::OpenAiChatClient;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur while talking to a model backend.
#[derive(Debug, Error)]
pub enum LlmError {
    /// The HTTP request itself failed (connect, TLS, timeout)
    #[error("request failed: {0}")]
    Request(String),

    /// The backend answered with a non-success status
    #[error("backend returned HTTP {status}: {message}")]
    Api { status: u16, message: String },

    /// A streamed payload could not be decoded
    #[error("failed to decode stream payload: {0}")]
    Decode(String),

    /// The stream was interrupted mid-generation
    #[error("stream interrupted: {0}")]
    Stream(String),
}

// =============================================================================
// Chat Types
// =============================================================================

/// Message role in a model conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A fully assembled tool call extracted from model output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub function: FunctionCall,
}

/// The function portion of a tool call: name plus the raw argument string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: String,
}

/// One message in the conversation sent to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    /// Tool calls carried by an assistant message.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub tool_calls: Option<Vec<ToolCallRecord>>,
    /// The call this tool-role message answers.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub tool_call_id: Option<String>,
    /// Tool name on a tool-role message.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub name: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(Role::Assistant, content)
    }

    /// Assistant message carrying the tool calls accumulated from a stream.
    pub fn assistant_with_tool_calls(
        content: impl Into<String>,
        tool_calls: Vec<ToolCallRecord>,
    ) -> Self {
        Self {
            tool_calls: Some(tool_calls),
            ..Self::plain(Role::Assistant, content)
        }
    }

    /// Tool-role message answering one tool call.
    pub fn tool_result(
        call_id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            tool_call_id: Some(call_id.into()),
            name: Some(name.into()),
            ..Self::plain(Role::Tool, content)
        }
    }

    fn plain(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: None,
            tool_call_id: None,
            name: None,
        }
    }
}

/// One chat request to a model backend.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    /// Tool schemas offered to the model; empty means no tool calling.
    pub tools: Vec<serde_json::Value>,
    pub temperature: Option<f32>,
}

// =============================================================================
// Streamed Events
// =============================================================================

/// One incremental event from a streaming generation.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A fragment of assistant text.
    TextDelta(String),
    /// A fragment of a tool call. Name and arguments both arrive
    /// incrementally and are accumulated by index.
    ToolCallDelta {
        index: usize,
        id: Option<String>,
        name: Option<String>,
        arguments: Option<String>,
    },
    /// The stream finished.
    Done { finish_reason: Option<String> },
}

/// A pinned, boxed stream of model events.
pub type EventStream = BoxStream<'static, Result<StreamEvent, LlmError>>;

/// The seam between the response engine and a concrete model backend.
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// Start one streaming generation.
    async fn chat_stream(&self, request: ChatRequest) -> Result<EventStream, LlmError>;
}

// =============================================================================
// Response Frames
// =============================================================================

/// The universal streaming unit relayed to the peer: zero or more
/// non-complete frames followed by exactly one complete frame per response id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseFrame {
    pub response_id: u64,
    pub content: String,
    pub content_complete: bool,
    pub end_call: bool,
}

impl ResponseFrame {
    /// A non-terminal text fragment.
    pub fn delta(response_id: u64, content: impl Into<String>) -> Self {
        Self {
            response_id,
            content: content.into(),
            content_complete: false,
            end_call: false,
        }
    }

    /// The empty terminal frame signalling end of turn.
    pub fn finished(response_id: u64) -> Self {
        Self {
            response_id,
            content: String::new(),
            content_complete: true,
            end_call: false,
        }
    }

    /// A terminal frame carrying text (greetings, apologies).
    pub fn terminal(response_id: u64, content: impl Into<String>) -> Self {
        Self {
            response_id,
            content: content.into(),
            content_complete: true,
            end_call: false,
        }
    }
}
