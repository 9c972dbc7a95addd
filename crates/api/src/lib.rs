mod config;
mod rate_limit;

use std::sync::Arc;

use anyhow::Result;
use axum::extract::multipart::{Multipart, MultipartRejection};
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{DefaultBodyLimit, Json, Path, Query, State};
use axum::http::{header, HeaderValue, Method, Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{body::Body, Router};
use growwise_core::{DiseaseAssessment, IntentResponder, WeatherLookup};
use growwise_observability::{AppMetrics, MetricsSnapshot};
use growwise_services::imaging::is_allowed_filename;
use growwise_services::{
    FarmAssistant, MarketPriceCache, ServiceError, WeatherClient, WeatherError,
};
use growwise_storage::Store;
use serde::{Deserialize, Serialize};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

pub use crate::config::ApiConfig;
use crate::rate_limit::IpRateLimiter;

const DEFAULT_HISTORY_LIMIT: usize = 10;
const MAX_HISTORY_LIMIT: usize = 100;
const INVALID_IMAGE_TYPE: &str = "Invalid file type. Please upload PNG, JPG, JPEG, or GIF files.";

#[derive(Clone)]
pub struct ApiState {
    pub assistant: Arc<FarmAssistant<Store>>,
    pub metrics: Arc<AppMetrics>,
    pub storage_backend: &'static str,
    pub limiter: IpRateLimiter,
    pub allowed_origins: Arc<Vec<String>>,
    pub max_upload_bytes: usize,
}

#[derive(Debug, Serialize)]
struct Envelope<T> {
    success: bool,
    data: T,
}

fn ok<T: Serialize>(data: T) -> Json<Envelope<T>> {
    Json(Envelope {
        success: true,
        data,
    })
}

/// Failure rendered as `{"success": false, "error": ...}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({
                "success": false,
                "error": self.message,
            })),
        )
            .into_response()
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Weather(weather) => {
                let status = match weather {
                    WeatherError::MissingLocation => StatusCode::BAD_REQUEST,
                    WeatherError::NotConfigured => StatusCode::SERVICE_UNAVAILABLE,
                    WeatherError::LocationNotFound => StatusCode::NOT_FOUND,
                    WeatherError::Unavailable => StatusCode::BAD_GATEWAY,
                };
                Self::new(status, weather.to_string())
            }
            ServiceError::Storage(source) => {
                error!(error = %format!("{source:#}"), "storage failure");
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct VoiceQueryRequest {
    #[serde(default)]
    query: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MarketPriceQuery {
    category: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    limit: Option<usize>,
}

#[derive(Debug, Serialize)]
struct ApiInfo {
    message: &'static str,
    version: &'static str,
    features: Vec<String>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: String,
    service: &'static str,
    storage: &'static str,
    weather_configured: bool,
    metrics: MetricsSnapshot,
}

pub async fn build_app(config: ApiConfig) -> Result<Router> {
    let metrics = AppMetrics::shared();

    let responder = match config.responder_tables.as_ref() {
        Some(path) => IntentResponder::from_json_file(path)?,
        None => IntentResponder::builtin(),
    };

    let store = match config.database_url.as_deref() {
        Some(database_url) => Store::sqlite(database_url).await?,
        None => {
            warn!("GROWWISE_DATABASE_URL not set, history is kept in memory");
            Store::memory()
        }
    };
    let storage_backend = store.backend_name();

    let prices = MarketPriceCache::new(&config.market_cache);
    if let Err(err) = prices.ensure_seeded().await {
        warn!(error = %format!("{err:#}"), "market price cache could not be seeded");
    }

    let weather = WeatherClient::new(
        config.weather_api_key.clone(),
        config.weather_base_url.clone(),
    )?;
    if !weather.is_configured() {
        warn!("OPENWEATHER_API_KEY not set, weather lookups will be refused");
    }

    let assistant = Arc::new(FarmAssistant::new(
        Arc::new(responder),
        weather,
        prices,
        Arc::new(store),
        metrics.clone(),
    ));

    let state = ApiState {
        assistant,
        metrics,
        storage_backend,
        limiter: IpRateLimiter::new(config.rate_limit_window, config.rate_limit_max),
        allowed_origins: Arc::new(config.allowed_origins),
        max_upload_bytes: config.max_upload_bytes,
    };

    Ok(build_router(state))
}

pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/api/voice-query", post(voice_query))
        .route("/api/voice-help", get(voice_help))
        .route("/api/weather", post(weather))
        .route("/api/disease-detection", post(disease_detection))
        .route("/api/market-prices", get(market_prices))
        .route("/api/stats", get(stats))
        .route("/api/history/:kind", get(history))
        .layer(build_cors_layer(&state.allowed_origins))
        .layer(middleware::from_fn(security_headers_middleware))
        .layer(TraceLayer::new_for_http())
        // layers added later run first: the id must be set before it is propagated
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(DefaultBodyLimit::max(state.max_upload_bytes))
        .layer(RequestBodyLimitLayer::new(state.max_upload_bytes))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .with_state(state)
}

async fn index(State(state): State<ApiState>) -> impl IntoResponse {
    ok(ApiInfo {
        message: "GrowWise farming assistant API",
        version: env!("CARGO_PKG_VERSION"),
        features: state.assistant.help_info().features.clone(),
    })
}

async fn health(State(state): State<ApiState>) -> impl IntoResponse {
    let payload = HealthResponse {
        status: "healthy",
        timestamp: chrono::Utc::now().to_rfc3339(),
        service: "GrowWise API",
        storage: state.storage_backend,
        weather_configured: state.assistant.weather_configured(),
        metrics: state.metrics.snapshot(),
    };
    (StatusCode::OK, Json(payload))
}

async fn voice_query(
    State(state): State<ApiState>,
    payload: Result<Json<VoiceQueryRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(payload) = payload.map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;

    let query = payload.query.as_deref().unwrap_or_default().trim();
    if query.is_empty() {
        return Err(ApiError::bad_request("Query is required"));
    }

    let reply = state.assistant.ask(query).await?;
    Ok(ok(reply))
}

async fn voice_help(State(state): State<ApiState>) -> impl IntoResponse {
    ok(state.assistant.help_info().clone())
}

async fn weather(
    State(state): State<ApiState>,
    payload: Result<Json<WeatherLookup>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(lookup) = payload.map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;
    let report = state.assistant.lookup_weather(lookup).await?;
    Ok(ok(report))
}

async fn disease_detection(
    State(state): State<ApiState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Envelope<DiseaseAssessment>>, ApiError> {
    let Ok(mut multipart) = multipart else {
        return Err(ApiError::bad_request("No image file provided"));
    };

    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ApiError::new(err.status(), err.body_text()))?
    {
        if field.name() != Some("image") {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|err| ApiError::new(err.status(), err.body_text()))?;
        upload = Some((filename, bytes));
        break;
    }

    let Some((filename, bytes)) = upload else {
        return Err(ApiError::bad_request("No image file provided"));
    };
    if filename.trim().is_empty() {
        return Err(ApiError::bad_request("No file selected"));
    }
    if !is_allowed_filename(&filename) {
        return Err(ApiError::bad_request(INVALID_IMAGE_TYPE));
    }

    let assessment = state.assistant.diagnose(&bytes).await?;
    Ok(ok(assessment))
}

async fn market_prices(
    State(state): State<ApiState>,
    query: Result<Query<MarketPriceQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(query) = query.map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;
    let category = query.category.as_deref().unwrap_or("all");
    let prices = state.assistant.market_prices(category).await?;
    Ok(ok(prices))
}

async fn stats(State(state): State<ApiState>) -> Result<impl IntoResponse, ApiError> {
    Ok(ok(state.assistant.stats().await?))
}

async fn history(
    State(state): State<ApiState>,
    Path(kind): Path<String>,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(query) = query.map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;
    let limit = history_limit(query.limit);

    let response = match kind.as_str() {
        "voice" => ok(state.assistant.voice_history(limit).await?).into_response(),
        "predictions" => ok(state.assistant.prediction_history(limit).await?).into_response(),
        "weather" => ok(state.assistant.weather_history(limit).await?).into_response(),
        _ => {
            return Err(ApiError::new(
                StatusCode::NOT_FOUND,
                format!("Unknown history kind '{kind}'"),
            ))
        }
    };
    Ok(response)
}

fn history_limit(requested: Option<usize>) -> usize {
    requested
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT)
}

fn build_cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins = allowed_origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect::<Vec<_>>();

    let allow_origin = if origins.is_empty() {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
}

async fn rate_limit_middleware(
    State(state): State<ApiState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if request.method() == Method::OPTIONS || request.uri().path() == "/health" {
        return next.run(request).await;
    }

    let ip = request_ip(&request);
    if !state.limiter.allow(&ip) {
        warn!(client = %ip, "rate limit exceeded");
        return ApiError::new(
            StatusCode::TOO_MANY_REQUESTS,
            "Rate limit exceeded, please retry later",
        )
        .into_response();
    }

    next.run(request).await
}

fn request_ip(request: &Request<Body>) -> String {
    request
        .headers()
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| "local".to_string())
}

async fn security_headers_middleware(request: Request<Body>, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(
        header::REFERRER_POLICY,
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );
    headers.insert(
        header::HeaderName::from_static("permissions-policy"),
        HeaderValue::from_static("camera=(self), microphone=(self), geolocation=(self)"),
    );
    headers.insert(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static("default-src 'none'; frame-ancestors 'none'; base-uri 'none'"),
    );

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_limit_defaults_and_caps() {
        assert_eq!(history_limit(None), 10);
        assert_eq!(history_limit(Some(0)), 1);
        assert_eq!(history_limit(Some(25)), 25);
        assert_eq!(history_limit(Some(5_000)), 100);
    }

    #[test]
    fn weather_errors_map_to_statuses() {
        let cases = [
            (WeatherError::MissingLocation, StatusCode::BAD_REQUEST),
            (WeatherError::NotConfigured, StatusCode::SERVICE_UNAVAILABLE),
            (WeatherError::LocationNotFound, StatusCode::NOT_FOUND),
            (WeatherError::Unavailable, StatusCode::BAD_GATEWAY),
        ];

        for (weather, expected) in cases {
            let message = weather.to_string();
            let err = ApiError::from(ServiceError::Weather(weather));
            assert_eq!(err.status, expected);
            assert_eq!(err.message, message);
        }
    }

    #[test]
    fn forwarded_for_uses_first_hop() {
        let request = Request::builder()
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
            .body(Body::empty())
            .unwrap();
        assert_eq!(request_ip(&request), "203.0.113.7");

        let direct = Request::builder().body(Body::empty()).unwrap();
        assert_eq!(request_ip(&direct), "local");
    }
}
