use std::time::Duration;

use anyhow::{Context, Result};
use growwise_core::{WeatherLookup, WeatherReport};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

pub const OPENWEATHER_URL: &str = "https://api.openweathermap.org/data/2.5/weather";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WeatherError {
    #[error("Either city name or coordinates are required")]
    MissingLocation,
    #[error("Weather service is not configured")]
    NotConfigured,
    #[error("Weather data not found for the specified location")]
    LocationNotFound,
    #[error("Weather service is currently unavailable")]
    Unavailable,
}

/// OpenWeatherMap current-weather client (metric units).
#[derive(Debug, Clone)]
pub struct WeatherClient {
    http: Client,
    api_key: Option<String>,
    base_url: String,
}

impl WeatherClient {
    pub fn new(api_key: Option<String>, base_url: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(6))
            .timeout(Duration::from_secs(10))
            .build()
            .context("failed to build weather HTTP client")?;

        Ok(Self {
            http,
            api_key: api_key.filter(|key| !key.trim().is_empty()),
            base_url: base_url.into(),
        })
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    pub async fn fetch(&self, lookup: &WeatherLookup) -> Result<WeatherReport, WeatherError> {
        let mut params = request_params(lookup)?;
        let api_key = self.api_key.as_deref().ok_or(WeatherError::NotConfigured)?;
        params.push(("appid", api_key.to_string()));
        params.push(("units", "metric".to_string()));

        let response = self
            .http
            .get(&self.base_url)
            .query(&params)
            .send()
            .await
            .map_err(|error| {
                warn!(%error, "weather request failed");
                WeatherError::Unavailable
            })?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(WeatherError::LocationNotFound);
        }

        let response = response.error_for_status().map_err(|error| {
            warn!(%error, "weather api returned an error status");
            WeatherError::Unavailable
        })?;

        let body: Value = response.json().await.map_err(|error| {
            warn!(%error, "weather response was not json");
            WeatherError::Unavailable
        })?;

        parse_report(&body)
    }
}

/// Query parameters identifying the location. Coordinates win over a city name.
pub fn request_params(lookup: &WeatherLookup) -> Result<Vec<(&'static str, String)>, WeatherError> {
    if let (Some(lat), Some(lon)) = (lookup.lat, lookup.lon) {
        return Ok(vec![("lat", lat.to_string()), ("lon", lon.to_string())]);
    }

    match lookup.city.as_deref().map(str::trim) {
        Some(city) if !city.is_empty() => Ok(vec![("q", city.to_string())]),
        _ => Err(WeatherError::MissingLocation),
    }
}

pub fn parse_report(body: &Value) -> Result<WeatherReport, WeatherError> {
    let city = body
        .get("name")
        .and_then(Value::as_str)
        .ok_or(WeatherError::LocationNotFound)?;
    let temperature = body
        .pointer("/main/temp")
        .and_then(Value::as_f64)
        .ok_or(WeatherError::LocationNotFound)?;

    Ok(WeatherReport {
        city: city.to_string(),
        country: body
            .pointer("/sys/country")
            .and_then(Value::as_str)
            .map(ToString::to_string),
        temperature,
        description: body
            .pointer("/weather/0/description")
            .and_then(Value::as_str)
            .map(title_case),
        humidity: body.pointer("/main/humidity").and_then(Value::as_i64),
        wind_speed: body.pointer("/wind/speed").and_then(Value::as_f64),
    })
}

fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
