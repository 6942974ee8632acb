//! Per-call session state machine.
//!
//! One [`CallSession`] exists per live connection and is never shared across
//! connections. It owns the call's mutable state: the set-once call id and
//! metadata, the append-only message history seeded with the greeting, the
//! monotonically non-decreasing `latest_response_id` that implements request
//! supersession, and the advisory communications snapshot.
//!
//! Supersession rule: a generation run may keep emitting frames only while
//! its response id is still the latest one started ([`CallSession::is_current`]
//! is checked immediately before every frame is handed to the socket).
//! Side effects already committed by superseded runs are not rolled back.

use std::sync::Arc;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use arc_swap::ArcSwapOption;
use chrono::{DateTime, Local, Timelike};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::backend::{
    CallerIdentity, CommunicationDetails, CommunicationRecord, CommunicationsSnapshot, CrmClient,
    VoicePlatformClient,
};
use crate::llm::{ChatMessage, ResponseFrame};
use crate::utils::{Attempt, RetryOutcome, RetryPolicy, poll_until};

pub mod greeting;

// =============================================================================
// Call Metadata
// =============================================================================

/// Dynamic variables supplied by the peer at call start. All fields are
/// optional strings; unknown keys are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CallMetadata {
    pub user_id: Option<String>,
    pub lead_id: Option<String>,
    pub user_name: Option<String>,
    pub role: Option<String>,
    pub bot_name: Option<String>,
    pub assistant_id: Option<String>,
    pub additional_info: Option<String>,
    /// "true" when this is the user's first conversation with the assistant.
    pub first_interaction: Option<String>,
}

impl CallMetadata {
    pub fn is_first_interaction(&self) -> bool {
        self.first_interaction
            .as_deref()
            .is_some_and(|flag| flag.eq_ignore_ascii_case("true"))
    }
}

// =============================================================================
// Interaction Requests
// =============================================================================

/// What kind of output the peer asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionKind {
    /// New user input needs an answer.
    ResponseRequired,
    /// Proactive nudge with no new user utterance.
    ReminderRequired,
}

/// One utterance in the transcript snapshot the peer sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Utterance {
    pub role: String,
    pub content: String,
}

/// A transient value describing one generation-triggering event. Exists only
/// for the duration of one generation cycle.
#[derive(Debug, Clone)]
pub struct InteractionRequest {
    pub kind: InteractionKind,
    pub response_id: u64,
    pub transcript: Vec<Utterance>,
}

/// Read-only view of session state handed to the prompt assembler.
#[derive(Debug, Clone, Default)]
pub struct PromptContext {
    pub metadata: Option<CallMetadata>,
    pub history: Vec<ChatMessage>,
    pub snapshot: Option<Arc<CommunicationsSnapshot>>,
}

// =============================================================================
// Call Session
// =============================================================================

/// Mutable per-call state. Created on connection accept, populated by the
/// call-details event, cleaned up (summarized and persisted) on teardown.
pub struct CallSession {
    assistant_name: String,
    summary_retry: RetryPolicy,
    crm: Arc<CrmClient>,
    platform: Arc<VoicePlatformClient>,

    call_id: OnceLock<String>,
    metadata: OnceLock<CallMetadata>,
    history: Mutex<Vec<ChatMessage>>,
    latest_response_id: AtomicU64,
    snapshot: ArcSwapOption<CommunicationsSnapshot>,
    finalized: AtomicBool,
}

impl CallSession {
    pub fn new(
        assistant_name: String,
        summary_retry: RetryPolicy,
        crm: Arc<CrmClient>,
        platform: Arc<VoicePlatformClient>,
    ) -> Arc<Self> {
        Arc::new(Self {
            assistant_name,
            summary_retry,
            crm,
            platform,
            call_id: OnceLock::new(),
            metadata: OnceLock::new(),
            history: Mutex::new(Vec::new()),
            latest_response_id: AtomicU64::new(0),
            snapshot: ArcSwapOption::const_empty(),
            finalized: AtomicBool::new(false),
        })
    }

    // ── Bootstrap ─────────────────────────────────────────────────────

    /// Apply the one-time call-details event: capture the call id and
    /// dynamic variables (each set at most once) and kick off a non-blocking
    /// refresh of the communications snapshot when a user identity is known.
    pub fn apply_call_details(self: &Arc<Self>, call_id: Option<&str>, variables: Option<&Value>) {
        if let Some(id) = call_id.filter(|id| !id.is_empty()) {
            let _ = self.call_id.set(id.to_string());
        }

        let Some(variables) = variables else {
            return;
        };
        let metadata: CallMetadata = match serde_json::from_value(variables.clone()) {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!(error = %e, "unusable dynamic variables in call details");
                return;
            }
        };

        let user_id = metadata.user_id.clone();
        if self.metadata.set(metadata).is_err() {
            debug!("call details received more than once; keeping the first");
            return;
        }

        if let Some(user_id) = user_id {
            let session = Arc::clone(self);
            tokio::spawn(async move {
                match session.crm.fetch_user_communications(&user_id).await {
                    Ok(snapshot) => {
                        session.snapshot.store(Some(Arc::new(snapshot)));
                        debug!(user_id = %user_id, "communications snapshot refreshed");
                    }
                    Err(e) => {
                        warn!(user_id = %user_id, error = %e, "communications snapshot refresh failed")
                    }
                }
            });
        }
    }

    /// Produce the opening greeting: exactly one complete frame under
    /// response id 0, appended to the history before it is returned.
    pub fn draft_begin_message(&self) -> ResponseFrame {
        self.draft_begin_message_at(Local::now())
    }

    /// Clock-injected variant of [`Self::draft_begin_message`].
    pub fn draft_begin_message_at(&self, now: DateTime<Local>) -> ResponseFrame {
        let greeting = greeting::select_greeting(
            self.metadata.get(),
            &self.assistant_name,
            now.hour(),
            &mut rand::thread_rng(),
        );
        self.history.lock().push(ChatMessage::assistant(greeting.clone()));
        ResponseFrame::terminal(0, greeting)
    }

    // ── Supersession ──────────────────────────────────────────────────

    /// Mark a generation as started. `latest_response_id` only ever moves
    /// forward; an out-of-order older id does not lower it.
    pub fn begin_response(&self, response_id: u64) {
        self.latest_response_id
            .fetch_max(response_id, Ordering::SeqCst);
    }

    /// Whether a generation for `response_id` may still emit frames.
    pub fn is_current(&self, response_id: u64) -> bool {
        response_id >= self.latest_response_id.load(Ordering::SeqCst)
    }

    /// The most recently started response id.
    pub fn latest_response_id(&self) -> u64 {
        self.latest_response_id.load(Ordering::SeqCst)
    }

    // ── Views ─────────────────────────────────────────────────────────

    pub fn call_id(&self) -> Option<&str> {
        self.call_id.get().map(String::as_str)
    }

    pub fn metadata(&self) -> Option<&CallMetadata> {
        self.metadata.get()
    }

    /// Snapshot of the state the prompt assembler needs.
    pub fn prompt_context(&self) -> PromptContext {
        PromptContext {
            metadata: self.metadata.get().cloned(),
            history: self.history.lock().clone(),
            snapshot: self.snapshot.load_full(),
        }
    }

    /// The resolved user/lead identity carried by every tool dispatch.
    pub fn identity(&self) -> CallerIdentity {
        let metadata = self.metadata.get();
        CallerIdentity {
            user_id: metadata.and_then(|m| m.user_id.clone()),
            lead_id: metadata.and_then(|m| m.lead_id.clone()),
        }
    }

    // ── Teardown ──────────────────────────────────────────────────────

    /// Flush the call to the communications backend and clear state.
    ///
    /// Idempotent; persistence faults are logged and swallowed. Teardown
    /// must never raise past its own boundary.
    pub async fn finalize(&self) {
        if self.finalized.swap(true, Ordering::SeqCst) {
            return;
        }
        self.persist_call_summary().await;
        self.history.lock().clear();
        self.snapshot.store(None);
    }

    /// Poll the platform for the post-call analysis summary and persist one
    /// communication record when it becomes available. Gives up silently
    /// once the retry budget is exhausted.
    async fn persist_call_summary(&self) {
        let Some(call_id) = self.call_id.get() else {
            return;
        };
        let Some(metadata) = self.metadata.get() else {
            return;
        };
        let Some(user_id) = metadata.user_id.as_deref() else {
            return;
        };
        let Ok(user_id_num) = user_id.parse::<i64>() else {
            warn!(user_id, "non-numeric user id; skipping call persistence");
            return;
        };

        let outcome = poll_until(self.summary_retry, |attempt| {
            let platform = Arc::clone(&self.platform);
            let call_id = call_id.clone();
            async move {
                match platform.get_call(&call_id).await {
                    Ok(record) if record.summary().is_some() => Attempt::Ready(record),
                    Ok(_) => {
                        debug!(call_id = %call_id, attempt, "call analysis not ready yet");
                        Attempt::Pending
                    }
                    Err(e) => {
                        warn!(call_id = %call_id, error = %e, "failed to fetch call record");
                        Attempt::Abort
                    }
                }
            }
        })
        .await;

        let RetryOutcome::Completed(record) = outcome else {
            debug!(call_id = %call_id, "no call summary within retry budget; nothing persisted");
            return;
        };

        let call_time = record
            .start_timestamp
            .and_then(DateTime::from_timestamp_millis)
            .map(|t| t.naive_utc().format("%Y-%m-%dT%H:%M:%S").to_string())
            .unwrap_or_default();

        let communication = CommunicationRecord {
            user_id: user_id_num,
            assistant_id: metadata.assistant_id.clone(),
            kind: "CALL".to_string(),
            status: "successful".to_string(),
            details: CommunicationDetails {
                notes: record.summary().unwrap_or_default().to_string(),
                recording_url: record.recording_url.clone().unwrap_or_default(),
            },
            duration: record.duration_secs(),
            call_time,
            call_id: call_id.clone(),
        };

        if let Err(e) = self.crm.save_communication(&communication).await {
            warn!(call_id = %call_id, error = %e, "failed to persist call summary");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn test_session() -> Arc<CallSession> {
        CallSession::new(
            "Ava".to_string(),
            RetryPolicy::new(1, Duration::from_millis(1)),
            Arc::new(CrmClient::new("http://127.0.0.1:1")),
            Arc::new(VoicePlatformClient::new("http://127.0.0.1:1", None)),
        )
    }

    #[tokio::test]
    async fn call_id_is_set_once() {
        let session = test_session();
        session.apply_call_details(Some("call-1"), None);
        session.apply_call_details(Some("call-2"), None);
        assert_eq!(session.call_id(), Some("call-1"));
    }

    #[tokio::test]
    async fn metadata_is_set_once() {
        let session = test_session();
        session.apply_call_details(None, Some(&json!({"user_name": "Taylor"})));
        session.apply_call_details(None, Some(&json!({"user_name": "Jordan"})));
        assert_eq!(
            session.metadata().unwrap().user_name.as_deref(),
            Some("Taylor")
        );
    }

    #[tokio::test]
    async fn response_ids_only_move_forward() {
        let session = test_session();
        session.begin_response(3);
        assert!(session.is_current(3));
        assert!(!session.is_current(2));

        session.begin_response(2);
        assert_eq!(session.latest_response_id(), 3);

        session.begin_response(7);
        assert!(!session.is_current(3));
        assert!(session.is_current(7));
    }

    #[tokio::test]
    async fn greeting_seeds_history() {
        let session = test_session();
        let frame = session.draft_begin_message();
        assert_eq!(frame.response_id, 0);
        assert!(frame.content_complete);
        assert!(!frame.content.is_empty());

        let context = session.prompt_context();
        assert_eq!(context.history.len(), 1);
        assert_eq!(context.history[0].content, frame.content);
    }

    #[tokio::test]
    async fn identity_reflects_metadata() {
        let session = test_session();
        assert_eq!(session.identity(), CallerIdentity::default());

        session.apply_call_details(
            Some("call-1"),
            Some(&json!({"user_id": "42", "lead_id": "7"})),
        );
        let identity = session.identity();
        assert_eq!(identity.user_id.as_deref(), Some("42"));
        assert_eq!(identity.lead_id.as_deref(), Some("7"));
    }

    #[tokio::test]
    async fn finalize_without_call_id_is_a_no_op() {
        let session = test_session();
        session.draft_begin_message();
        session.finalize().await;
        assert!(session.prompt_context().history.is_empty());
    }

    #[test]
    fn first_interaction_flag_parsing() {
        let metadata: CallMetadata =
            serde_json::from_value(json!({"first_interaction": "true"})).unwrap();
        assert!(metadata.is_first_interaction());

        let metadata: CallMetadata =
            serde_json::from_value(json!({"first_interaction": "false"})).unwrap();
        assert!(!metadata.is_first_interaction());

        let metadata: CallMetadata = serde_json::from_value(json!({})).unwrap();
        assert!(!metadata.is_first_interaction());
    }
}
