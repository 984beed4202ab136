//! Daily weather lookup used as a mood input.

use crate::engagement::WeatherSummary;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const OPEN_METEO_URL: &str = "https://api.open-meteo.com/v1/forecast";

/// Source of the daily weather summary. Failures surface as `None`.
#[async_trait]
pub trait WeatherLookup: Send + Sync {
    async fn daily_summary(&self) -> Option<WeatherSummary>;
}

/// Open-Meteo current-weather client for a fixed location.
pub struct OpenMeteo {
    http: reqwest::Client,
    latitude: f64,
    longitude: f64,
}

#[derive(Deserialize)]
struct ForecastResponse {
    current_weather: Option<CurrentWeather>,
}

#[derive(Deserialize)]
struct CurrentWeather {
    temperature: f64,
    weathercode: i64,
}

impl OpenMeteo {
    pub fn new(http: reqwest::Client, latitude: f64, longitude: f64) -> Self {
        Self {
            http,
            latitude,
            longitude,
        }
    }

    async fn fetch(&self) -> anyhow::Result<WeatherSummary> {
        let response: ForecastResponse = self
            .http
            .get(OPEN_METEO_URL)
            .query(&[
                ("latitude", self.latitude.to_string()),
                ("longitude", self.longitude.to_string()),
                ("current_weather", "true".to_string()),
            ])
            .timeout(Duration::from_secs(10))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let current = response
            .current_weather
            .ok_or_else(|| anyhow::anyhow!("response has no current_weather block"))?;
        Ok(WeatherSummary {
            category: category_for_code(current.weathercode).to_string(),
            temp_celsius: current.temperature,
        })
    }
}

#[async_trait]
impl WeatherLookup for OpenMeteo {
    async fn daily_summary(&self) -> Option<WeatherSummary> {
        match self.fetch().await {
            Ok(summary) => Some(summary),
            Err(e) => {
                debug!("Weather fetch failed: {}", e);
                None
            }
        }
    }
}

/// Lookup that never has weather, for deployments with the feature off.
pub struct NoWeather;

#[async_trait]
impl WeatherLookup for NoWeather {
    async fn daily_summary(&self) -> Option<WeatherSummary> {
        None
    }
}

/// Maps a WMO weather code to the coarse category the mood engine understands.
pub fn category_for_code(code: i64) -> &'static str {
    match code {
        0 => "clear",
        1 => "mainly_clear",
        2 => "partly_cloudy",
        3 => "overcast",
        45 | 48 => "fog",
        51 | 53 | 55 => "drizzle",
        56 | 57 => "freezing_drizzle",
        61 | 63 | 65 => "rain",
        66 | 67 => "freezing_rain",
        71 | 73 | 75 => "snow",
        77 => "snow_grains",
        80..=82 => "rain_showers",
        85 | 86 => "snow_showers",
        95 => "thunderstorm",
        96 | 99 => "thunderstorm_hail",
        _ => "unknown",
    }
}
