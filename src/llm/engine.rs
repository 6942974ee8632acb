//! Streaming response engine.
//!
//! Drives one generation cycle end to end:
//!
//! ```text
//! STREAMING_TEXT ──(no tool calls)──────────────────────────▶ DONE
//! STREAMING_TEXT ─▶ TOOL_CALLS_DETECTED ─▶ EXECUTING_TOOLS ─▶ STREAMING_FOLLOWUP ─▶ DONE
//!        └──────────────(any fault)──────▶ ERROR ───────────▶ DONE
//! ```
//!
//! Text deltas are forwarded to the peer the moment they arrive; tool-call
//! deltas are accumulated by index, since both the name and the argument
//! string may be split across chunks. When the first pass requested tools, a
//! "please hold" filler goes out before any tool work so the peer hears
//! something during the latency, each tool call yields exactly one result
//! entry (error payloads included), and a second, tool-free pass streams the
//! final wording. Every cycle ends in exactly one complete frame; any fault
//! collapses into a single apologetic complete frame instead of propagating.

use std::sync::Arc;

use chrono::Local;
use futures::{Stream, StreamExt};
use rand::seq::SliceRandom;
use serde_json::json;
use tracing::{debug, warn};

use super::prompt::assemble_prompt;
use super::{
    ChatApi, ChatMessage, ChatRequest, FunctionCall, ResponseFrame, StreamEvent, ToolCallRecord,
};
use crate::backend::CallerIdentity;
use crate::session::{InteractionRequest, PromptContext};
use crate::tools::{ToolInvoker, tool_definitions};

/// Sampling temperature for the first (tool-enabled) pass.
const GENERATION_TEMPERATURE: f32 = 0.3;

/// Terminal apology used whenever a cycle fails.
pub const GENERATION_APOLOGY: &str =
    "I apologize, but I ran into an unexpected problem. Could you please try again?";

/// Filler lines spoken while tool calls execute.
const HOLD_PHRASES: &[&str] = &[
    "Sure thing, just a sec.",
    "Hold on, let me check.",
    "Got it, give me a moment.",
    "Alright, let me handle that.",
    "No problem, just a moment.",
    "One second, I'm on it.",
    "Right away, hold tight.",
    "Let me get to that real quick.",
    "Certainly, one moment please.",
];

/// A tool call being reassembled from streamed fragments.
#[derive(Debug, Default, Clone, PartialEq)]
struct ToolCallDraft {
    id: String,
    name: String,
    arguments: String,
}

impl ToolCallDraft {
    fn into_record(self) -> ToolCallRecord {
        ToolCallRecord {
            id: self.id,
            kind: "function".to_string(),
            function: FunctionCall {
                name: self.name,
                arguments: self.arguments,
            },
        }
    }
}

/// Fold one streamed tool-call fragment into the drafts, growing the list
/// when a new index appears. Name and argument fragments append.
fn absorb_tool_delta(
    drafts: &mut Vec<ToolCallDraft>,
    index: usize,
    id: Option<String>,
    name: Option<String>,
    arguments: Option<String>,
) {
    while drafts.len() <= index {
        drafts.push(ToolCallDraft::default());
    }
    let draft = &mut drafts[index];
    if let Some(id) = id {
        draft.id = id;
    }
    if let Some(name) = name {
        draft.name.push_str(&name);
    }
    if let Some(arguments) = arguments {
        draft.arguments.push_str(&arguments);
    }
}

fn hold_phrase() -> &'static str {
    HOLD_PHRASES
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(HOLD_PHRASES[0])
}

/// The engine: one instance per process, shared by every call session.
pub struct ResponseEngine {
    chat: Arc<dyn ChatApi>,
    invoker: Arc<ToolInvoker>,
    assistant_name: String,
}

impl ResponseEngine {
    pub fn new(chat: Arc<dyn ChatApi>, invoker: Arc<ToolInvoker>, assistant_name: String) -> Self {
        Self {
            chat,
            invoker,
            assistant_name,
        }
    }

    /// Run one generation cycle, yielding response frames as they become
    /// available. The returned stream always terminates with exactly one
    /// complete frame for `request.response_id` and never yields a fault.
    pub fn draft_response(
        &self,
        request: InteractionRequest,
        context: PromptContext,
        identity: CallerIdentity,
    ) -> impl Stream<Item = ResponseFrame> + Send + 'static {
        let chat = Arc::clone(&self.chat);
        let invoker = Arc::clone(&self.invoker);
        let assistant_name = self.assistant_name.clone();
        let response_id = request.response_id;

        async_stream::stream! {
            let mut messages = assemble_prompt(&assistant_name, &context, &request, Local::now());

            // First pass: text plus potential tool calls.
            let first = chat
                .chat_stream(ChatRequest {
                    messages: messages.clone(),
                    tools: tool_definitions(),
                    temperature: Some(GENERATION_TEMPERATURE),
                })
                .await;
            let mut stream = match first {
                Ok(stream) => stream,
                Err(e) => {
                    warn!(response_id, error = %e, "model call failed");
                    yield ResponseFrame::terminal(response_id, GENERATION_APOLOGY);
                    return;
                }
            };

            let mut drafts: Vec<ToolCallDraft> = Vec::new();
            let mut streamed_text = String::new();
            let mut faulted = false;

            while let Some(event) = stream.next().await {
                match event {
                    Ok(StreamEvent::TextDelta(delta)) => {
                        streamed_text.push_str(&delta);
                        yield ResponseFrame::delta(response_id, delta);
                    }
                    Ok(StreamEvent::ToolCallDelta { index, id, name, arguments }) => {
                        absorb_tool_delta(&mut drafts, index, id, name, arguments);
                    }
                    Ok(StreamEvent::Done { finish_reason }) => {
                        debug!(response_id, ?finish_reason, "first pass complete");
                        break;
                    }
                    Err(e) => {
                        warn!(response_id, error = %e, "generation stream interrupted");
                        faulted = true;
                        break;
                    }
                }
            }
            if faulted {
                yield ResponseFrame::terminal(response_id, GENERATION_APOLOGY);
                return;
            }

            if !drafts.is_empty() {
                // Audible feedback before any tool latency.
                yield ResponseFrame::delta(response_id, hold_phrase());

                let records: Vec<ToolCallRecord> =
                    drafts.iter().cloned().map(ToolCallDraft::into_record).collect();

                // Every tool call gets exactly one result entry, error or not.
                let mut results = Vec::with_capacity(drafts.len());
                for draft in &drafts {
                    let payload = match invoker
                        .invoke(&identity, &draft.name, &draft.arguments)
                        .await
                    {
                        Ok(payload) => payload,
                        Err(e) => {
                            warn!(response_id, tool = %draft.name, error = %e, "tool call failed");
                            json!({ "error": format!("tool execution failed: {e}") })
                        }
                    };
                    results.push(ChatMessage::tool_result(
                        draft.id.clone(),
                        draft.name.clone(),
                        payload.to_string(),
                    ));
                }

                messages.push(ChatMessage::assistant_with_tool_calls(
                    streamed_text.clone(),
                    records,
                ));
                messages.extend(results);

                // Follow-up pass: no tools, stream the final wording.
                match chat
                    .chat_stream(ChatRequest {
                        messages,
                        tools: Vec::new(),
                        temperature: None,
                    })
                    .await
                {
                    Ok(mut followup) => {
                        while let Some(event) = followup.next().await {
                            match event {
                                Ok(StreamEvent::TextDelta(delta)) => {
                                    yield ResponseFrame::delta(response_id, delta);
                                }
                                Ok(StreamEvent::Done { .. }) => break,
                                Ok(StreamEvent::ToolCallDelta { .. }) => {
                                    // Tools were not offered on this pass.
                                }
                                Err(e) => {
                                    warn!(response_id, error = %e, "follow-up stream interrupted");
                                    yield ResponseFrame::terminal(response_id, GENERATION_APOLOGY);
                                    return;
                                }
                            }
                        }
                    }
                    Err(e) => {
                        warn!(response_id, error = %e, "follow-up model call failed");
                        yield ResponseFrame::terminal(response_id, GENERATION_APOLOGY);
                        return;
                    }
                }
            }

            yield ResponseFrame::finished(response_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_fragments_reassemble_by_index() {
        let mut drafts = Vec::new();
        absorb_tool_delta(
            &mut drafts,
            0,
            Some("call_1".into()),
            Some("Places".into()),
            Some(String::new()),
        );
        absorb_tool_delta(&mut drafts, 0, None, Some("Search".into()), Some("{\"loc".into()));
        absorb_tool_delta(&mut drafts, 0, None, None, Some("ation\":\"Austin\"}".into()));

        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].id, "call_1");
        assert_eq!(drafts[0].name, "PlacesSearch");
        assert_eq!(drafts[0].arguments, "{\"location\":\"Austin\"}");
    }

    #[test]
    fn out_of_order_index_grows_the_draft_list() {
        let mut drafts = Vec::new();
        absorb_tool_delta(&mut drafts, 2, Some("call_3".into()), None, None);
        assert_eq!(drafts.len(), 3);
        assert_eq!(drafts[2].id, "call_3");
        assert!(drafts[0].id.is_empty());
    }

    #[test]
    fn draft_converts_to_wire_record() {
        let draft = ToolCallDraft {
            id: "call_9".into(),
            name: "BookingRequest".into(),
            arguments: "{}".into(),
        };
        let record = draft.into_record();
        assert_eq!(record.kind, "function");
        assert_eq!(record.function.name, "BookingRequest");
    }

    #[test]
    fn hold_phrase_is_always_available() {
        let phrase = hold_phrase();
        assert!(HOLD_PHRASES.contains(&phrase));
    }
}
