pub mod imaging;
pub mod market;
pub mod weather;

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use growwise_core::{
    query_preview, AppStats, Category, DiseaseAssessment, HelpInfo, IntentResponder, MarketPrice,
    PredictionRecord, VoiceQueryRecord, WeatherLookup, WeatherRecord, WeatherReport,
};
use growwise_observability::AppMetrics;
use growwise_storage::FarmStore;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, instrument};
use uuid::Uuid;

pub use market::MarketPriceCache;
pub use weather::{WeatherClient, WeatherError};

const LOG_PREVIEW_GRAPHEMES: usize = 80;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Weather(#[from] WeatherError),
    #[error("storage failure: {0:#}")]
    Storage(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Serialize)]
pub struct VoiceReply {
    pub query: String,
    pub response: String,
    pub category: Category,
}

/// Front door for every farming feature: answers voice queries through the
/// injected [`IntentResponder`], calls the adapters and records history.
pub struct FarmAssistant<S>
where
    S: FarmStore,
{
    responder: Arc<IntentResponder>,
    weather: WeatherClient,
    prices: MarketPriceCache,
    store: Arc<S>,
    metrics: Arc<AppMetrics>,
}

impl<S> FarmAssistant<S>
where
    S: FarmStore,
{
    pub fn new(
        responder: Arc<IntentResponder>,
        weather: WeatherClient,
        prices: MarketPriceCache,
        store: Arc<S>,
        metrics: Arc<AppMetrics>,
    ) -> Self {
        Self {
            responder,
            weather,
            prices,
            store,
            metrics,
        }
    }

    pub fn responder(&self) -> &IntentResponder {
        &self.responder
    }

    pub fn help_info(&self) -> &HelpInfo {
        self.responder.help_info()
    }

    pub fn weather_configured(&self) -> bool {
        self.weather.is_configured()
    }

    /// Answers a voice query and records it. Blank queries are the caller's
    /// to reject; here they simply fall through to the default response.
    #[instrument(skip_all)]
    pub async fn ask(&self, query: &str) -> Result<VoiceReply, ServiceError> {
        let started = Instant::now();
        self.metrics.inc_request();

        let answer = self.responder.answer(query);
        let reply = VoiceReply {
            query: query.to_string(),
            response: answer.response.to_string(),
            category: answer.category,
        };

        self.store
            .save_voice_query(&VoiceQueryRecord {
                id: Uuid::new_v4().to_string(),
                query: reply.query.clone(),
                response: reply.response.clone(),
                category: reply.category,
                timestamp: Utc::now(),
            })
            .await?;

        self.metrics.record_voice_query(
            reply.category.as_code(),
            reply.category == Category::Default,
        );
        self.metrics.observe_latency(started.elapsed());
        info!(
            category = %reply.category,
            query = %query_preview(query, LOG_PREVIEW_GRAPHEMES),
            "voice query answered"
        );

        Ok(reply)
    }

    #[instrument(skip(self))]
    pub async fn lookup_weather(&self, lookup: WeatherLookup) -> Result<WeatherReport, ServiceError> {
        let started = Instant::now();
        self.metrics.inc_request();

        let report = self.weather.fetch(&lookup).await?;
        self.store
            .save_weather(&WeatherRecord {
                id: Uuid::new_v4().to_string(),
                city: report.city.clone(),
                country: report.country.clone(),
                temperature: report.temperature,
                description: report.description.clone(),
                humidity: report.humidity,
                wind_speed: report.wind_speed,
                timestamp: Utc::now(),
            })
            .await?;

        self.metrics.inc_weather_lookup();
        self.metrics.observe_latency(started.elapsed());
        info!(city = %report.city, temperature = report.temperature, "weather fetched");

        Ok(report)
    }

    #[instrument(skip_all, fields(bytes = image.len()))]
    pub async fn diagnose(&self, image: &[u8]) -> Result<DiseaseAssessment, ServiceError> {
        let started = Instant::now();
        self.metrics.inc_request();

        let assessment = imaging::analyze_image(image);
        self.store
            .save_prediction(&PredictionRecord {
                id: Uuid::new_v4().to_string(),
                disease: assessment.disease.as_code().to_string(),
                confidence: assessment.confidence,
                treatment: Some(assessment.treatment.clone()),
                formatted_name: Some(assessment.formatted_name.clone()),
                timestamp: Utc::now(),
            })
            .await?;

        self.metrics
            .record_disease_prediction(assessment.disease.as_code());
        self.metrics.observe_latency(started.elapsed());
        info!(
            disease = assessment.disease.as_code(),
            confidence = assessment.confidence,
            "image assessed"
        );

        Ok(assessment)
    }

    #[instrument(skip(self))]
    pub async fn market_prices(&self, category: &str) -> Result<Vec<MarketPrice>, ServiceError> {
        self.metrics.inc_request();

        let prices = self.prices.load(category).await;
        let pruned = self.store.save_market_prices(&prices, Utc::now()).await?;
        info!(served = prices.len(), pruned, "market prices served");

        Ok(prices)
    }

    pub async fn stats(&self) -> Result<AppStats, ServiceError> {
        Ok(self.store.app_stats().await?)
    }

    pub async fn voice_history(&self, limit: usize) -> Result<Vec<VoiceQueryRecord>, ServiceError> {
        Ok(self.store.recent_voice_queries(limit).await?)
    }

    pub async fn prediction_history(
        &self,
        limit: usize,
    ) -> Result<Vec<PredictionRecord>, ServiceError> {
        Ok(self.store.recent_predictions(limit).await?)
    }

    pub async fn weather_history(&self, limit: usize) -> Result<Vec<WeatherRecord>, ServiceError> {
        Ok(self.store.recent_weather(limit).await?)
    }
}
