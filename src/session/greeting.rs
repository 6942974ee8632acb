//! Greeting selection for the start of a call.
//!
//! The opening line is chosen before any model traffic happens, by a
//! deterministic priority: no metadata yet, first-time user, or returning
//! user. Within a bucket the concrete phrasing is randomized.

use rand::Rng;
use rand::seq::SliceRandom;

use super::CallMetadata;

/// Time-of-day salutation for a local hour (0-23).
pub fn time_of_day_greeting(hour: u32) -> &'static str {
    match hour {
        5..=11 => "Good morning",
        12..=16 => "Good afternoon",
        17..=21 => "Good evening",
        _ => "Happy late night",
    }
}

/// Pick the greeting for the call's first frame.
///
/// Priority: (a) no metadata yet → generic time-of-day greeting;
/// (b) first interaction → onboarding greeting introducing the assistant's
/// capabilities; (c) otherwise → a short contextual greeting. Both (b) and
/// (c) fall back to stock opening lines when no user name is known.
pub fn select_greeting<R: Rng + ?Sized>(
    metadata: Option<&CallMetadata>,
    default_assistant: &str,
    hour: u32,
    rng: &mut R,
) -> String {
    let tod = time_of_day_greeting(hour);
    let assistant = metadata
        .and_then(|m| m.bot_name.as_deref())
        .filter(|name| !name.is_empty())
        .unwrap_or(default_assistant);

    let candidates: Vec<String> = match metadata {
        None => vec![
            format!("{tod}! I'm {assistant}. How can I assist you today?"),
            format!("{tod}! I'm {assistant}. What do you need help with?"),
            format!("Hey there! I'm {assistant}. How can I support you today?"),
            format!("{tod}! I'm {assistant}. Let me know how I can help!"),
            format!("Hi! I'm {assistant}. Need help with anything?"),
        ],
        Some(meta) => {
            let user = meta.user_name.as_deref().filter(|name| !name.is_empty());
            match (user, meta.is_first_interaction()) {
                (None, _) => opening_lines(assistant),
                (Some(user), true) => vec![
                    format!(
                        "{tod}, {user}! Welcome aboard! I'm {assistant}, your personal \
                         assistant. I help manage leads, schedule appointments, and track \
                         your key metrics. Let's get started!"
                    ),
                    format!(
                        "Hey {user}, great to have you here! I'm {assistant}. I'll keep you \
                         organized by managing leads, scheduling, and tracking performance."
                    ),
                    format!(
                        "Welcome, {user}! I'm {assistant}, here to handle lead tracking, \
                         scheduling, and key insights so you can focus on closing deals."
                    ),
                    format!(
                        "Nice to meet you, {user}! I'm {assistant}, your smart assistant for \
                         leads, appointments, and performance insights. Let's go!"
                    ),
                ],
                (Some(user), false) => vec![
                    format!("{tod}, {user}! Hope you're having a great day!"),
                    format!("{tod}, {user}. How can I assist you today?"),
                    format!("Welcome back, {user}. What's your priority today?"),
                    format!("Hey {user}, let's make today productive!"),
                    format!("Hi {user}, how's business looking today?"),
                    format!("{tod}, {user}! Ready to close some deals?"),
                ],
            }
        }
    };

    candidates
        .choose(rng)
        .cloned()
        .unwrap_or_else(|| format!("{tod}! I'm {assistant}."))
}

/// Stock opening lines used when no user name is available.
fn opening_lines(assistant: &str) -> Vec<String> {
    vec![
        format!("Hi, I'm {assistant}, your virtual real estate assistant. How can I help you today?"),
        format!("Hello, I'm {assistant}! Ready to assist with all your real estate needs."),
        format!("Hey there, I'm {assistant}! Whether it's scheduling a showing or finding leads, I've got you covered!"),
        format!("Hi, I'm {assistant}! Need help finding a home or managing your clients? Just say the word!"),
    ]
}
