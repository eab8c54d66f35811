//! Open-Meteo forecast lookup.

use async_trait::async_trait;
use reqwest::Client;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument};
use url::Url;

use super::{CapabilityError, CapabilityHandler, CapabilityInput};
use crate::outbound::CLIENT;

const CURRENT_FIELDS: &str = "temperature_2m,weather_code,wind_speed_10m";
const HOURLY_FIELDS: &str = "temperature_2m,weather_code";
const DAILY_FIELDS: &str = "weather_code,temperature_2m_max,temperature_2m_min,sunrise,sunset";
const HOURLY_POINTS: usize = 24;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct WeatherInput {
    /// Latitude in decimal degrees
    pub latitude: f64,
    /// Longitude in decimal degrees
    pub longitude: f64,
}

impl WeatherInput {
    pub(crate) fn validate(&self) -> Result<(), String> {
        if !(-90.0..=90.0).contains(&self.latitude) {
            return Err(format!("latitude {} is out of range", self.latitude));
        }
        if !(-180.0..=180.0).contains(&self.longitude) {
            return Err(format!("longitude {} is out of range", self.longitude));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherReport {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current: Option<CurrentConditions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hourly: Option<HourlyForecast>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daily: Option<DailyForecast>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentConditions {
    pub time: String,
    pub temperature_2m: Option<f64>,
    #[serde(default)]
    pub weather_code: Option<u32>,
    #[serde(default)]
    pub wind_speed_10m: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyForecast {
    pub time: Vec<String>,
    #[serde(default)]
    pub temperature_2m: Vec<Option<f64>>,
    #[serde(default)]
    pub weather_code: Vec<Option<u32>>,
}

impl HourlyForecast {
    fn truncate(&mut self, n: usize) {
        self.time.truncate(n);
        self.temperature_2m.truncate(n);
        self.weather_code.truncate(n);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyForecast {
    pub time: Vec<String>,
    #[serde(default)]
    pub weather_code: Vec<Option<u32>>,
    #[serde(default)]
    pub temperature_2m_max: Vec<Option<f64>>,
    #[serde(default)]
    pub temperature_2m_min: Vec<Option<f64>>,
    #[serde(default)]
    pub sunrise: Vec<String>,
    #[serde(default)]
    pub sunset: Vec<String>,
}

#[derive(Clone)]
pub struct WeatherClient {
    client: Client,
    base_url: Url,
}

impl WeatherClient {
    pub fn new(base_url: Url) -> Self {
        Self {
            client: CLIENT.clone(),
            base_url,
        }
    }

    fn forecast_url(&self, input: &WeatherInput) -> Result<Url, CapabilityError> {
        let mut url = self
            .base_url
            .join("forecast")
            .map_err(|e| CapabilityError::Execution(e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("latitude", &input.latitude.to_string())
            .append_pair("longitude", &input.longitude.to_string())
            .append_pair("current", CURRENT_FIELDS)
            .append_pair("hourly", HOURLY_FIELDS)
            .append_pair("daily", DAILY_FIELDS)
            .append_pair("timezone", "auto");
        Ok(url)
    }

    #[instrument(name = "weather.forecast", skip_all, fields(lat = input.latitude, lon = input.longitude))]
    pub async fn forecast(&self, input: &WeatherInput) -> Result<WeatherReport, CapabilityError> {
        let url = self.forecast_url(input)?;
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| CapabilityError::Execution(format!("weather request failed: {e}")))?;
        let status = resp.status();
        let body = resp
            .bytes()
            .await
            .map_err(|e| CapabilityError::Execution(e.to_string()))?;
        if !status.is_success() {
            return Err(CapabilityError::Execution(error_reason(&body, status.as_u16())));
        }
        let report = decode_forecast(&body)?;
        debug!(timezone = ?report.timezone, "forecast received");
        Ok(report)
    }
}

fn error_reason(body: &[u8], status: u16) -> String {
    serde_json::from_slice::<Value>(body)
        .ok()
        .and_then(|v| v.get("reason").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| format!("weather service returned HTTP {status}"))
}

/// Only the first day of hourly points is kept.
pub(crate) fn decode_forecast(body: &[u8]) -> Result<WeatherReport, CapabilityError> {
    let mut report: WeatherReport = serde_json::from_slice(body)
        .map_err(|e| CapabilityError::Execution(format!("unexpected weather response: {e}")))?;
    if let Some(hourly) = report.hourly.as_mut() {
        hourly.truncate(HOURLY_POINTS);
    }
    Ok(report)
}

#[async_trait]
impl CapabilityHandler for WeatherClient {
    async fn execute(&self, input: &CapabilityInput) -> Result<Value, CapabilityError> {
        let CapabilityInput::Weather(input) = input else {
            return Err(CapabilityError::Execution(format!(
                "weather cannot handle {}",
                input.capability()
            )));
        };
        let report = self.forecast(input).await?;
        serde_json::to_value(report).map_err(|e| CapabilityError::Execution(e.to_string()))
    }
}
