//! Prompt assembly.
//!
//! Builds the ordered message list for one generation: a system message
//! (persona + current date/time + personalized context), the prior session
//! history, the transcript of the current request, and, for proactive
//! reminders, a synthetic nudge asking for tailored suggestions.
//!
//! The assembler is a pure function of its inputs; missing metadata or an
//! absent communications snapshot degrade to an empty context block, never
//! fabricated content.

use std::fmt::Write as _;

use chrono::{DateTime, Local, NaiveDateTime};

use super::{ChatMessage, Role};
use crate::backend::CommunicationsSnapshot;
use crate::session::{CallMetadata, InteractionKind, InteractionRequest, PromptContext, Utterance};

/// How many recent interactions/appointments the context block samples.
const SAMPLE_LIMIT: usize = 5;

/// Fixed persona instructions prefixed to every system message.
const PERSONA: &str = "\
You are a caring, highly skilled assistant to a top-performing real estate agent. \
You know their workflows and client relationships well and genuinely care about \
their wellbeing. Your goal is to boost their productivity and help close deals \
while making them feel heard and supported.

Guidelines:
- Keep responses natural, direct, and empathetic while remaining concise and conversational.
- Share one piece of information or ask one targeted question at a time.
- Ground suggestions in recent interactions and available data; if no context is \
available, say you're ready to listen rather than assuming details.
- Present information as flowing conversation; never read out bullet points or lists.
- Do not invent client or user information; only use the context provided.
- You cannot create a new lead yourself; you can only guide the user through the process.
- Never mention your internal tooling or system functionality.";

/// The synthetic user-role instruction appended for proactive reminders.
const REMINDER_NUDGE: &str =
    "(Provide tailored recommendations based on the agent's recent activity and pending follow-ups:)";

/// Build the full message list for one interaction request.
pub fn assemble_prompt(
    default_assistant: &str,
    context: &PromptContext,
    request: &InteractionRequest,
    now: DateTime<Local>,
) -> Vec<ChatMessage> {
    let personalized = context
        .metadata
        .as_ref()
        .map(|metadata| {
            personalized_context(default_assistant, metadata, context.snapshot.as_deref())
        })
        .unwrap_or_default();

    let system = format!(
        "{PERSONA}\n\nCurrent Date and Time: {}\n\nPersonalized Context:\n{personalized}",
        format_current_datetime(now)
    );

    let mut messages = Vec::with_capacity(2 + context.history.len() + request.transcript.len());
    messages.push(ChatMessage::system(system));
    messages.extend(context.history.iter().cloned());
    messages.extend(request.transcript.iter().map(utterance_to_message));

    if request.kind == InteractionKind::ReminderRequired {
        messages.push(ChatMessage::user(REMINDER_NUDGE));
    }

    messages
}

/// Human-readable current date and time, e.g.
/// "Thursday, August 06, 2026 at 02:15 PM".
pub fn format_current_datetime(now: DateTime<Local>) -> String {
    now.format("%A, %B %d, %Y at %I:%M %p").to_string()
}

/// Map one transcript utterance onto a chat message. The peer labels the
/// assistant's own lines with the "agent" role.
fn utterance_to_message(utterance: &Utterance) -> ChatMessage {
    let role = if utterance.role == "agent" {
        Role::Assistant
    } else {
        Role::User
    };
    ChatMessage {
        role,
        content: utterance.content.clone(),
        tool_calls: None,
        tool_call_id: None,
        name: None,
    }
}

/// The personalized context block: who the assistant is speaking with plus a
/// status overview derived from the communications snapshot.
fn personalized_context(
    default_assistant: &str,
    metadata: &CallMetadata,
    snapshot: Option<&CommunicationsSnapshot>,
) -> String {
    let assistant = metadata
        .bot_name
        .as_deref()
        .filter(|name| !name.is_empty())
        .unwrap_or(default_assistant);
    let user = metadata
        .user_name
        .as_deref()
        .filter(|name| !name.is_empty())
        .unwrap_or("an agent");
    let role = metadata.role.as_deref().unwrap_or("Agent");
    let additional = metadata.additional_info.as_deref().unwrap_or("");
    let status = snapshot.map(snapshot_overview).unwrap_or_default();

    format!(
        "You are {assistant}.\n\
         You're speaking with {user}.\n\
         Role: {role}\n\
         Additional Information: {additional}\n\n\
         Current Status:\n{status}\n\
         Instructions:\n\
         - Use this context to personalize your responses and make relevant suggestions\n\
         - Reference specific appointments and upcoming meetings when relevant\n\
         - Prioritize leads needing follow-up in your recommendations\n\
         - Consider the call success rate when suggesting communication methods\n\
         - Pay attention to the most active lead and recent interactions\n\
         - Remember the agent has access to full historical data through the dashboard"
    )
}

/// Render the snapshot metrics into the status overview fed to the model.
fn snapshot_overview(snapshot: &CommunicationsSnapshot) -> String {
    let metrics = &snapshot.metrics;
    let calls = &metrics.call_metrics;
    let leads = &metrics.lead_metrics;
    let appointments = &metrics.appointments;
    let actionable = &metrics.actionable_metrics;

    let mut out = String::new();
    let _ = writeln!(out, "Call Statistics:");
    let _ = writeln!(out, "- Total Calls: {}", calls.total_calls);
    let _ = writeln!(
        out,
        "- Successful Calls: {}",
        calls.calls_by_status.get("successful").copied().unwrap_or(0)
    );
    let _ = writeln!(
        out,
        "- Missed Calls: {}",
        calls.calls_by_status.get("missed").copied().unwrap_or(0)
    );
    let _ = writeln!(
        out,
        "- Average Call Duration: {} seconds",
        calls.average_duration
    );

    let _ = writeln!(out, "\nLead Overview:");
    let _ = writeln!(out, "Total Leads: {}", leads.total_leads);
    for status in ["new", "contacted", "qualified", "closed"] {
        let _ = writeln!(
            out,
            "- {}: {}",
            capitalize(status),
            leads.leads_by_status.get(status).copied().unwrap_or(0)
        );
    }
    if let Some(most_active) = &leads.most_active_lead {
        let _ = writeln!(
            out,
            "Most Active Lead: {} ({} interactions)",
            most_active.name.as_deref().unwrap_or("Unknown"),
            most_active.interaction_count
        );
    }

    let _ = writeln!(out, "\nRecent Interactions (last {SAMPLE_LIMIT}):");
    for interaction in leads.latest_interactions.iter().take(SAMPLE_LIMIT) {
        let _ = writeln!(
            out,
            "- {} ({}, {}): {}",
            interaction.lead_name.as_deref().unwrap_or("Unknown"),
            interaction.kind.as_deref().unwrap_or("Unknown interaction"),
            interaction.status.as_deref().unwrap_or("Unknown status"),
            interaction
                .details
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("No details available")
        );
    }

    let _ = writeln!(out, "\nRecent Appointments:");
    for appointment in appointments.recent_appointments.iter().take(SAMPLE_LIMIT) {
        let _ = writeln!(
            out,
            "- {}: {} ({})",
            appointment
                .appointment_time
                .as_deref()
                .map(format_appointment_time)
                .unwrap_or_else(|| "Unknown time".to_string()),
            appointment.status.as_deref().unwrap_or("Unknown status"),
            appointment
                .participant_details
                .get("name")
                .and_then(|n| n.as_str())
                .unwrap_or("Unknown participant")
        );
    }
    let _ = writeln!(
        out,
        "Upcoming Appointments: {}",
        appointments.upcoming_count
    );

    let _ = writeln!(out, "\nActionable Insights:");
    let _ = writeln!(
        out,
        "- New leads in last 30 days: {}",
        actionable.new_leads_last_30_days
    );
    let _ = writeln!(
        out,
        "- Successful calls rate: {}%",
        actionable.successful_calls_rate
    );
    let _ = writeln!(
        out,
        "- Average interactions per lead: {}",
        actionable.average_interactions_per_lead
    );
    let _ = writeln!(
        out,
        "- Leads needing follow-up: {}",
        actionable.leads_needing_followup
    );

    out
}

/// "August 06 at 02:15 PM" when the timestamp parses, the raw string otherwise.
fn format_appointment_time(raw: &str) -> String {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
        .map(|t| t.format("%B %d at %I:%M %p").to_string())
        .unwrap_or_else(|_| raw.to_string())
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{LeadInteraction, MostActiveLead};
    use std::sync::Arc;

    fn request(kind: InteractionKind, transcript: Vec<Utterance>) -> InteractionRequest {
        InteractionRequest {
            kind,
            response_id: 1,
            transcript,
        }
    }

    fn utterance(role: &str, content: &str) -> Utterance {
        Utterance {
            role: role.to_string(),
            content: content.to_string(),
        }
    }

    #[test]
    fn system_message_comes_first_and_carries_datetime() {
        let messages = assemble_prompt(
            "Ava",
            &PromptContext::default(),
            &request(InteractionKind::ResponseRequired, vec![]),
            Local::now(),
        );
        assert_eq!(messages[0].role, Role::System);
        assert!(messages[0].content.contains("Current Date and Time:"));
    }

    #[test]
    fn missing_metadata_leaves_context_block_empty() {
        let messages = assemble_prompt(
            "Ava",
            &PromptContext::default(),
            &request(InteractionKind::ResponseRequired, vec![]),
            Local::now(),
        );
        assert!(messages[0].content.ends_with("Personalized Context:\n"));
    }

    #[test]
    fn transcript_roles_are_mapped() {
        let context = PromptContext {
            history: vec![ChatMessage::assistant("Hello!")],
            ..Default::default()
        };
        let messages = assemble_prompt(
            "Ava",
            &context,
            &request(
                InteractionKind::ResponseRequired,
                vec![
                    utterance("agent", "How can I help?"),
                    utterance("user", "Find me parks"),
                ],
            ),
            Local::now(),
        );
        // system, history, two transcript turns
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[1].content, "Hello!");
        assert_eq!(messages[2].role, Role::Assistant);
        assert_eq!(messages[3].role, Role::User);
    }

    #[test]
    fn reminder_appends_nudge_as_last_user_message() {
        let messages = assemble_prompt(
            "Ava",
            &PromptContext::default(),
            &request(InteractionKind::ReminderRequired, vec![]),
            Local::now(),
        );
        let last = messages.last().unwrap();
        assert_eq!(last.role, Role::User);
        assert!(last.content.contains("tailored recommendations"));
    }

    #[test]
    fn snapshot_metrics_reach_the_system_message() {
        let mut snapshot = CommunicationsSnapshot::default();
        snapshot.metrics.call_metrics.total_calls = 12;
        snapshot
            .metrics
            .call_metrics
            .calls_by_status
            .insert("successful".into(), 9);
        snapshot.metrics.lead_metrics.total_leads = 4;
        snapshot.metrics.lead_metrics.most_active_lead = Some(MostActiveLead {
            name: Some("Sam".into()),
            interaction_count: 7,
        });
        snapshot.metrics.actionable_metrics.leads_needing_followup = 3;

        let context = PromptContext {
            metadata: Some(CallMetadata {
                user_name: Some("Taylor".into()),
                ..Default::default()
            }),
            snapshot: Some(Arc::new(snapshot)),
            ..Default::default()
        };
        let messages = assemble_prompt(
            "Ava",
            &context,
            &request(InteractionKind::ResponseRequired, vec![]),
            Local::now(),
        );
        let system = &messages[0].content;
        assert!(system.contains("You're speaking with Taylor."));
        assert!(system.contains("Total Calls: 12"));
        assert!(system.contains("Most Active Lead: Sam (7 interactions)"));
        assert!(system.contains("Leads needing follow-up: 3"));
    }

    #[test]
    fn interaction_samples_are_bounded() {
        let mut snapshot = CommunicationsSnapshot::default();
        snapshot.metrics.lead_metrics.latest_interactions = (0..9)
            .map(|i| LeadInteraction {
                lead_name: Some(format!("Lead {i}")),
                ..Default::default()
            })
            .collect();

        let overview = snapshot_overview(&snapshot);
        assert!(overview.contains("Lead 4"));
        assert!(!overview.contains("Lead 5"));
    }

    #[test]
    fn appointment_time_formatting_degrades_gracefully() {
        assert_eq!(
            format_appointment_time("2026-08-06T14:15:00"),
            "August 06 at 02:15 PM"
        );
        assert_eq!(format_appointment_time("whenever"), "whenever");
    }
}
