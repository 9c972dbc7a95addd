use std::env;
use std::path::PathBuf;
use std::time::Duration;

use growwise_services::market::DEFAULT_CACHE_PATH;
use growwise_services::weather::OPENWEATHER_URL;

const DEFAULT_RATE_LIMIT_WINDOW_SECONDS: u64 = 60;
const DEFAULT_RATE_LIMIT_MAX: usize = 120;
const DEFAULT_MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

/// Runtime settings for the HTTP service, read from `GROWWISE_*` variables.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// SQLite URL; history stays in memory when unset.
    pub database_url: Option<String>,
    pub market_cache: PathBuf,
    /// JSON file overriding the built-in keyword and response tables.
    pub responder_tables: Option<PathBuf>,
    pub weather_api_key: Option<String>,
    pub weather_base_url: String,
    pub rate_limit_window: Duration,
    pub rate_limit_max: usize,
    /// Empty means any origin.
    pub allowed_origins: Vec<String>,
    pub max_upload_bytes: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            market_cache: PathBuf::from(DEFAULT_CACHE_PATH),
            responder_tables: None,
            weather_api_key: None,
            weather_base_url: OPENWEATHER_URL.to_string(),
            rate_limit_window: Duration::from_secs(DEFAULT_RATE_LIMIT_WINDOW_SECONDS),
            rate_limit_max: DEFAULT_RATE_LIMIT_MAX,
            allowed_origins: Vec::new(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

impl ApiConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            database_url: non_empty_var("GROWWISE_DATABASE_URL"),
            market_cache: non_empty_var("GROWWISE_MARKET_CACHE")
                .map(PathBuf::from)
                .unwrap_or(defaults.market_cache),
            responder_tables: non_empty_var("GROWWISE_RESPONDER_TABLES").map(PathBuf::from),
            weather_api_key: non_empty_var("OPENWEATHER_API_KEY"),
            weather_base_url: non_empty_var("GROWWISE_WEATHER_BASE_URL")
                .unwrap_or(defaults.weather_base_url),
            rate_limit_window: parsed_var::<u64>("GROWWISE_RATE_LIMIT_WINDOW_SECONDS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.rate_limit_window),
            rate_limit_max: parsed_var("GROWWISE_RATE_LIMIT_MAX")
                .unwrap_or(defaults.rate_limit_max),
            allowed_origins: non_empty_var("GROWWISE_ALLOWED_ORIGINS")
                .map(|value| parse_origins(&value))
                .unwrap_or_default(),
            max_upload_bytes: parsed_var("GROWWISE_MAX_UPLOAD_BYTES")
                .unwrap_or(defaults.max_upload_bytes),
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parsed_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    non_empty_var(name).and_then(|value| value.parse().ok())
}

pub(crate) fn parse_origins(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|origin| origin.trim().trim_end_matches('/').to_string())
        .filter(|origin| !origin.is_empty())
        .collect()
}
