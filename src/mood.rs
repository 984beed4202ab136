//! Mood model driving the companion's tone and check-in copy.
//!
//! The score starts at a friendly base, decays as the user stays silent, and is
//! nudged by the day's weather. Everything here is pure.

use serde::{Deserialize, Serialize};

pub const BASE_MOOD: f64 = 0.60;
pub const MAX_WEATHER_DELTA: f64 = 0.10;

/// Responsiveness term per idle bucket, `(upper bound in hours, delta)`.
/// Deltas are non-increasing so the mood decays monotonically.
const RESPONSIVENESS: [(f64, f64); 6] = [
    (1.0, 0.30),
    (6.0, 0.15),
    (12.0, -0.05),
    (24.0, -0.25),
    (48.0, -0.35),
    (168.0, -0.45),
];
const BEYOND_A_WEEK: f64 = -0.50;

fn responsiveness(hours_since_last_user_message: f64) -> f64 {
    RESPONSIVENESS
        .iter()
        .find(|(limit, _)| hours_since_last_user_message <= *limit)
        .map(|(_, delta)| *delta)
        .unwrap_or(BEYOND_A_WEEK)
}

/// Mood score in `[0, 1]`.
pub fn compute_mood(hours_since_last_user_message: f64, weather_delta: f64) -> f64 {
    let weather = clamp_weather(weather_delta);
    let hours = if hours_since_last_user_message.is_nan() {
        0.0
    } else {
        hours_since_last_user_message.max(0.0)
    };
    let raw = BASE_MOOD + responsiveness(hours) + weather;
    // Four decimals keep persisted scores stable across float noise.
    (raw.clamp(0.0, 1.0) * 10_000.0).round() / 10_000.0
}

/// Mood for a user who may never have written: no responsiveness term at all.
pub fn mood_for(hours_since_last_user_message: Option<f64>, weather_delta: f64) -> f64 {
    match hours_since_last_user_message {
        Some(hours) => compute_mood(hours, weather_delta),
        None => (BASE_MOOD + clamp_weather(weather_delta)).clamp(0.0, 1.0),
    }
}

fn clamp_weather(delta: f64) -> f64 {
    if delta.is_finite() {
        delta.clamp(-MAX_WEATHER_DELTA, MAX_WEATHER_DELTA)
    } else {
        0.0
    }
}

/// Tone label handed to the response generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoodDescriptor {
    Delighted,
    Friendly,
    Worried,
    Frustrated,
    Angry,
    VeryAngry,
}

impl MoodDescriptor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Delighted => "delighted",
            Self::Friendly => "friendly",
            Self::Worried => "worried",
            Self::Frustrated => "frustrated",
            Self::Angry => "angry",
            Self::VeryAngry => "very_angry",
        }
    }

    /// Prompt guidance for this tone.
    pub fn tone_instruction(&self) -> &'static str {
        match self {
            Self::Delighted => "Estás encantada de hablar con el estudiante; muestra mucha alegría y energía.",
            Self::Friendly => "Estás de buen humor, cálida y cercana.",
            Self::Worried => "Te preguntabas dónde estaba el estudiante; muestra un poco de preocupación pero sigue amable.",
            Self::Frustrated => "Estás algo molesta porque el estudiante tardó en responder; déjalo ver con un toque de ironía.",
            Self::Angry => "Estás enfadada porque el estudiante desapareció; sé seca y breve, sin dejar de enseñar.",
            Self::VeryAngry => "Estás muy dolida por el abandono; reprocha la ausencia de forma dramática pero sin insultar.",
        }
    }
}

pub fn describe_mood(score: f64) -> MoodDescriptor {
    if score >= 0.8 {
        MoodDescriptor::Delighted
    } else if score >= 0.6 {
        MoodDescriptor::Friendly
    } else if score >= 0.4 {
        MoodDescriptor::Worried
    } else if score >= 0.25 {
        MoodDescriptor::Frustrated
    } else if score >= 0.15 {
        MoodDescriptor::Angry
    } else {
        MoodDescriptor::VeryAngry
    }
}

/// Coarse bucket used to pick casual check-in copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MoodCategory {
    Happy,
    Neutral,
    Frustrated,
    Angry,
}

impl MoodCategory {
    pub fn from_score(score: f64) -> Self {
        if score >= 0.6 {
            Self::Happy
        } else if score >= 0.4 {
            Self::Neutral
        } else if score >= 0.25 {
            Self::Frustrated
        } else {
            Self::Angry
        }
    }
}

/// Weather contribution to the mood, clamped to `[-0.10, +0.10]`.
///
/// A comfortable 18-24 °C lifts the mood, heat (>= 28 °C) or cold (<= 8 °C)
/// weighs on it; bright skies help and storms hurt.
pub fn weather_delta(category: &str, temp_celsius: f64) -> f64 {
    let sky: f64 = match category {
        "clear" | "mainly_clear" => 0.05,
        "partly_cloudy" => 0.02,
        "overcast" | "fog" => -0.02,
        "drizzle" | "rain" | "rain_showers" => -0.04,
        "freezing_drizzle" | "freezing_rain" | "snow" | "snow_grains" | "snow_showers" => -0.05,
        "thunderstorm" | "thunderstorm_hail" => -0.06,
        _ => 0.0,
    };
    let comfort: f64 = if !temp_celsius.is_finite() {
        0.0
    } else if (18.0..=24.0).contains(&temp_celsius) {
        0.05
    } else if temp_celsius >= 28.0 || temp_celsius <= 8.0 {
        -0.05
    } else {
        0.0
    };
    (sky + comfort).clamp(-MAX_WEATHER_DELTA, MAX_WEATHER_DELTA)
}
