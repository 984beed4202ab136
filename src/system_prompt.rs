//! System message utilities for constructing context-aware prompts.
//!
//! The conversation prompt carries the persona, the learner's local time, the
//! current mood tone and the cached weather, followed by recent history.

use crate::engagement::WeatherSummary;
use crate::llm::{ChatTurn, Role};
use crate::mood::describe_mood;
use crate::store::StoredMessage;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;

/// Format the learner's local date and time for inclusion in system prompts.
///
/// ```text
/// Hora local del estudiante: Wednesday, February 05, 2025, 09:30 CET (Europe/Madrid)
/// ```
pub fn get_datetime_context(now: DateTime<Utc>, tz: Tz) -> String {
    let local = now.with_timezone(&tz);
    format!(
        "Hora local del estudiante: {}, {} ({})",
        local.format("%A, %B %d, %Y"),
        local.format("%H:%M %Z"),
        tz.name()
    )
}

pub fn weather_context(weather: Option<&WeatherSummary>) -> Option<String> {
    weather.map(|w| {
        format!(
            "El tiempo hoy: {} y {:.0} °C. Puedes mencionarlo si surge de forma natural.",
            w.category.replace('_', " "),
            w.temp_celsius
        )
    })
}

/// Inputs for one conversational reply.
pub struct PromptInput<'a> {
    pub system_prompt: &'a str,
    pub now: DateTime<Utc>,
    pub timezone: Tz,
    pub mood_score: f64,
    pub weather: Option<&'a WeatherSummary>,
    pub history: &'a [StoredMessage],
    pub user_message: &'a str,
}

pub fn build_conversation(input: &PromptInput<'_>) -> Vec<ChatTurn> {
    let mood = describe_mood(input.mood_score);
    let mut system = format!(
        "{}\n\n{}\nEstado de ánimo actual: {}. {}",
        input.system_prompt,
        get_datetime_context(input.now, input.timezone),
        mood.as_str(),
        mood.tone_instruction()
    );
    if let Some(weather) = weather_context(input.weather) {
        system.push('\n');
        system.push_str(&weather);
    }

    let mut turns = Vec::with_capacity(input.history.len() + 2);
    turns.push(ChatTurn::new(Role::System, system));
    turns.extend(
        input
            .history
            .iter()
            .map(|m| ChatTurn::new(Role::from_stored(&m.role), m.content.clone())),
    );
    turns.push(ChatTurn::new(Role::User, input.user_message));
    turns
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_datetime_context_uses_user_timezone() {
        let now = Utc.with_ymd_and_hms(2026, 1, 15, 23, 30, 0).unwrap();
        let context = get_datetime_context(now, chrono_tz::Europe::Madrid);
        assert!(context.contains("January 16, 2026"));
        assert!(context.contains("00:30"));
        assert!(context.contains("Europe/Madrid"));
    }

    #[test]
    fn test_build_conversation_layout() {
        let history = vec![
            StoredMessage {
                role: "user".into(),
                content: "hola".into(),
            },
            StoredMessage {
                role: "assistant".into(),
                content: "¡hola, guapo!".into(),
            },
        ];
        let weather = WeatherSummary {
            category: "partly_cloudy".into(),
            temp_celsius: 19.6,
        };
        let input = PromptInput {
            system_prompt: "Eres Sofía.",
            now: Utc.with_ymd_and_hms(2026, 6, 1, 10, 0, 0).unwrap(),
            timezone: chrono_tz::Europe::Madrid,
            mood_score: 0.9,
            weather: Some(&weather),
            history: &history,
            user_message: "¿qué tal?",
        };

        let turns = build_conversation(&input);
        assert_eq!(turns.len(), 4);
        assert_eq!(turns[0].role, Role::System);
        assert!(turns[0].content.starts_with("Eres Sofía."));
        assert!(turns[0].content.contains("delighted"));
        assert!(turns[0].content.contains("partly cloudy y 20 °C"));
        assert_eq!(turns[2].role, Role::Assistant);
        assert_eq!(turns[3], ChatTurn::new(Role::User, "¿qué tal?"));
    }
}
