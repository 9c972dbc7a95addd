use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use growwise_core::{
    AppStats, Category, DiseaseCount, MarketPrice, PredictionRecord, VoiceQueryRecord,
    WeatherRecord,
};
use parking_lot::RwLock;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};

/// Number of diseases reported in [`AppStats::common_diseases`].
pub const COMMON_DISEASE_LIMIT: usize = 5;

/// Market price snapshots older than this are pruned on every save.
pub fn market_price_retention() -> Duration {
    Duration::days(1)
}

pub trait VoiceQueryRepository: Send + Sync {
    async fn save_voice_query(&self, record: &VoiceQueryRecord) -> Result<()>;
    async fn recent_voice_queries(&self, limit: usize) -> Result<Vec<VoiceQueryRecord>>;
}

pub trait PredictionRepository: Send + Sync {
    async fn save_prediction(&self, record: &PredictionRecord) -> Result<()>;
    async fn recent_predictions(&self, limit: usize) -> Result<Vec<PredictionRecord>>;
}

pub trait WeatherRepository: Send + Sync {
    async fn save_weather(&self, record: &WeatherRecord) -> Result<()>;
    async fn recent_weather(&self, limit: usize) -> Result<Vec<WeatherRecord>>;
}

pub trait MarketPriceRepository: Send + Sync {
    /// Stores a snapshot and returns the number of stale rows pruned.
    async fn save_market_prices(&self, prices: &[MarketPrice], now: DateTime<Utc>) -> Result<u64>;
    async fn count_market_prices(&self) -> Result<i64>;
}

pub trait StatsRepository: Send + Sync {
    async fn app_stats(&self) -> Result<AppStats>;
}

/// Everything the assistant persists, in one bound.
pub trait FarmStore:
    VoiceQueryRepository
    + PredictionRepository
    + WeatherRepository
    + MarketPriceRepository
    + StatsRepository
{
}

impl<T> FarmStore for T where
    T: VoiceQueryRepository
        + PredictionRepository
        + WeatherRepository
        + MarketPriceRepository
        + StatsRepository
{
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    voice_queries: Arc<RwLock<Vec<VoiceQueryRecord>>>,
    predictions: Arc<RwLock<Vec<PredictionRecord>>>,
    weather: Arc<RwLock<Vec<WeatherRecord>>>,
    market_prices: Arc<RwLock<Vec<(MarketPrice, DateTime<Utc>)>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn newest_first<T: Clone>(items: &[T], limit: usize) -> Vec<T> {
    items.iter().rev().take(limit).cloned().collect()
}

impl VoiceQueryRepository for MemoryStore {
    async fn save_voice_query(&self, record: &VoiceQueryRecord) -> Result<()> {
        self.voice_queries.write().push(record.clone());
        Ok(())
    }

    async fn recent_voice_queries(&self, limit: usize) -> Result<Vec<VoiceQueryRecord>> {
        Ok(newest_first(&self.voice_queries.read(), limit))
    }
}

impl PredictionRepository for MemoryStore {
    async fn save_prediction(&self, record: &PredictionRecord) -> Result<()> {
        self.predictions.write().push(record.clone());
        Ok(())
    }

    async fn recent_predictions(&self, limit: usize) -> Result<Vec<PredictionRecord>> {
        Ok(newest_first(&self.predictions.read(), limit))
    }
}

impl WeatherRepository for MemoryStore {
    async fn save_weather(&self, record: &WeatherRecord) -> Result<()> {
        self.weather.write().push(record.clone());
        Ok(())
    }

    async fn recent_weather(&self, limit: usize) -> Result<Vec<WeatherRecord>> {
        Ok(newest_first(&self.weather.read(), limit))
    }
}

impl MarketPriceRepository for MemoryStore {
    async fn save_market_prices(&self, prices: &[MarketPrice], now: DateTime<Utc>) -> Result<u64> {
        let cutoff = now - market_price_retention();
        let mut guard = self.market_prices.write();
        let before = guard.len();
        guard.retain(|(_, recorded_at)| *recorded_at >= cutoff);
        let pruned = (before - guard.len()) as u64;

        guard.extend(prices.iter().cloned().map(|price| (price, now)));
        Ok(pruned)
    }

    async fn count_market_prices(&self) -> Result<i64> {
        Ok(self.market_prices.read().len() as i64)
    }
}

impl StatsRepository for MemoryStore {
    async fn app_stats(&self) -> Result<AppStats> {
        let predictions = self.predictions.read();

        let mut counts: HashMap<&str, i64> = HashMap::new();
        for prediction in predictions.iter() {
            *counts.entry(prediction.disease.as_str()).or_default() += 1;
        }
        let mut common_diseases = counts
            .into_iter()
            .map(|(disease, count)| DiseaseCount {
                disease: disease.to_string(),
                count,
            })
            .collect::<Vec<_>>();
        common_diseases.sort_by(|a, b| b.count.cmp(&a.count).then(a.disease.cmp(&b.disease)));
        common_diseases.truncate(COMMON_DISEASE_LIMIT);

        Ok(AppStats {
            total_predictions: predictions.len() as i64,
            weather_queries: self.weather.read().len() as i64,
            voice_queries: self.voice_queries.read().len() as i64,
            common_diseases,
        })
    }
}

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("invalid sqlite url {}", database_url))?
            .create_if_missing(true);

        // Every connection to an in-memory database sees its own empty
        // database, so those pools are pinned to one long-lived connection.
        let in_memory = database_url.contains(":memory:") || database_url.contains("mode=memory");
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new()
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .with_context(|| format!("failed connecting to sqlite at {}", database_url))?;

        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS voice_queries (
              id TEXT PRIMARY KEY,
              query TEXT NOT NULL,
              response TEXT NOT NULL,
              category TEXT NOT NULL,
              created_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS predictions (
              id TEXT PRIMARY KEY,
              disease TEXT NOT NULL,
              confidence REAL NOT NULL,
              treatment TEXT,
              formatted_name TEXT,
              created_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS weather_queries (
              id TEXT PRIMARY KEY,
              city TEXT NOT NULL,
              country TEXT,
              temperature REAL NOT NULL,
              description TEXT,
              humidity INTEGER,
              wind_speed REAL,
              created_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS market_prices (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              category TEXT NOT NULL,
              name TEXT NOT NULL,
              price TEXT NOT NULL,
              recorded_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn to_db_time(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn from_db_time(row: &SqliteRow, column: &str) -> DateTime<Utc> {
    row.get::<String, _>(column)
        .parse()
        .unwrap_or_else(|_| Utc::now())
}

impl VoiceQueryRepository for SqliteStore {
    async fn save_voice_query(&self, record: &VoiceQueryRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO voice_queries (id, query, response, category, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&record.id)
        .bind(&record.query)
        .bind(&record.response)
        .bind(record.category.as_code())
        .bind(to_db_time(record.timestamp))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn recent_voice_queries(&self, limit: usize) -> Result<Vec<VoiceQueryRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, query, response, category, created_at
            FROM voice_queries
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let records = rows
            .iter()
            .map(|row| VoiceQueryRecord {
                id: row.get("id"),
                query: row.get("query"),
                response: row.get("response"),
                category: Category::parse(row.get::<String, _>("category").as_str())
                    .unwrap_or(Category::Default),
                timestamp: from_db_time(row, "created_at"),
            })
            .collect();

        Ok(records)
    }
}

impl PredictionRepository for SqliteStore {
    async fn save_prediction(&self, record: &PredictionRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO predictions (id, disease, confidence, treatment, formatted_name, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&record.id)
        .bind(&record.disease)
        .bind(record.confidence)
        .bind(&record.treatment)
        .bind(&record.formatted_name)
        .bind(to_db_time(record.timestamp))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn recent_predictions(&self, limit: usize) -> Result<Vec<PredictionRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, disease, confidence, treatment, formatted_name, created_at
            FROM predictions
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let records = rows
            .iter()
            .map(|row| PredictionRecord {
                id: row.get("id"),
                disease: row.get("disease"),
                confidence: row.get("confidence"),
                treatment: row.get("treatment"),
                formatted_name: row.get("formatted_name"),
                timestamp: from_db_time(row, "created_at"),
            })
            .collect();

        Ok(records)
    }
}

impl WeatherRepository for SqliteStore {
    async fn save_weather(&self, record: &WeatherRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO weather_queries
              (id, city, country, temperature, description, humidity, wind_speed, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&record.id)
        .bind(&record.city)
        .bind(&record.country)
        .bind(record.temperature)
        .bind(&record.description)
        .bind(record.humidity)
        .bind(record.wind_speed)
        .bind(to_db_time(record.timestamp))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn recent_weather(&self, limit: usize) -> Result<Vec<WeatherRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, city, country, temperature, description, humidity, wind_speed, created_at
            FROM weather_queries
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let records = rows
            .iter()
            .map(|row| WeatherRecord {
                id: row.get("id"),
                city: row.get("city"),
                country: row.get("country"),
                temperature: row.get("temperature"),
                description: row.get("description"),
                humidity: row.get("humidity"),
                wind_speed: row.get("wind_speed"),
                timestamp: from_db_time(row, "created_at"),
            })
            .collect();

        Ok(records)
    }
}

impl MarketPriceRepository for SqliteStore {
    async fn save_market_prices(&self, prices: &[MarketPrice], now: DateTime<Utc>) -> Result<u64> {
        let mut tx = self.pool.begin().await?;

        let pruned = sqlx::query("DELETE FROM market_prices WHERE recorded_at < ?1")
            .bind(to_db_time(now - market_price_retention()))
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let recorded_at = to_db_time(now);
        for price in prices {
            sqlx::query(
                r#"
                INSERT INTO market_prices (category, name, price, recorded_at)
                VALUES (?1, ?2, ?3, ?4)
                "#,
            )
            .bind(&price.category)
            .bind(&price.name)
            .bind(&price.price)
            .bind(&recorded_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(pruned)
    }

    async fn count_market_prices(&self) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM market_prices")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

impl StatsRepository for SqliteStore {
    async fn app_stats(&self) -> Result<AppStats> {
        let total_predictions = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM predictions")
            .fetch_one(&self.pool)
            .await?;
        let weather_queries = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM weather_queries")
            .fetch_one(&self.pool)
            .await?;
        let voice_queries = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM voice_queries")
            .fetch_one(&self.pool)
            .await?;

        let rows = sqlx::query(
            r#"
            SELECT disease, COUNT(*) AS count
            FROM predictions
            GROUP BY disease
            ORDER BY count DESC, disease ASC
            LIMIT ?1
            "#,
        )
        .bind(COMMON_DISEASE_LIMIT as i64)
        .fetch_all(&self.pool)
        .await?;

        let common_diseases = rows
            .iter()
            .map(|row| DiseaseCount {
                disease: row.get("disease"),
                count: row.get("count"),
            })
            .collect();

        Ok(AppStats {
            total_predictions,
            weather_queries,
            voice_queries,
            common_diseases,
        })
    }
}

#[derive(Clone)]
pub enum Store {
    Memory(MemoryStore),
    Sqlite(SqliteStore),
}

impl Store {
    pub fn memory() -> Self {
        Self::Memory(MemoryStore::new())
    }

    pub async fn sqlite(database_url: &str) -> Result<Self> {
        let sqlite = SqliteStore::connect(database_url).await?;
        Ok(Self::Sqlite(sqlite))
    }

    pub fn backend_name(&self) -> &'static str {
        match self {
            Store::Memory(_) => "memory",
            Store::Sqlite(_) => "sqlite",
        }
    }
}

impl VoiceQueryRepository for Store {
    async fn save_voice_query(&self, record: &VoiceQueryRecord) -> Result<()> {
        match self {
            Store::Memory(store) => store.save_voice_query(record).await,
            Store::Sqlite(store) => store.save_voice_query(record).await,
        }
    }

    async fn recent_voice_queries(&self, limit: usize) -> Result<Vec<VoiceQueryRecord>> {
        match self {
            Store::Memory(store) => store.recent_voice_queries(limit).await,
            Store::Sqlite(store) => store.recent_voice_queries(limit).await,
        }
    }
}

impl PredictionRepository for Store {
    async fn save_prediction(&self, record: &PredictionRecord) -> Result<()> {
        match self {
            Store::Memory(store) => store.save_prediction(record).await,
            Store::Sqlite(store) => store.save_prediction(record).await,
        }
    }

    async fn recent_predictions(&self, limit: usize) -> Result<Vec<PredictionRecord>> {
        match self {
            Store::Memory(store) => store.recent_predictions(limit).await,
            Store::Sqlite(store) => store.recent_predictions(limit).await,
        }
    }
}

impl WeatherRepository for Store {
    async fn save_weather(&self, record: &WeatherRecord) -> Result<()> {
        match self {
            Store::Memory(store) => store.save_weather(record).await,
            Store::Sqlite(store) => store.save_weather(record).await,
        }
    }

    async fn recent_weather(&self, limit: usize) -> Result<Vec<WeatherRecord>> {
        match self {
            Store::Memory(store) => store.recent_weather(limit).await,
            Store::Sqlite(store) => store.recent_weather(limit).await,
        }
    }
}

impl MarketPriceRepository for Store {
    async fn save_market_prices(&self, prices: &[MarketPrice], now: DateTime<Utc>) -> Result<u64> {
        match self {
            Store::Memory(store) => store.save_market_prices(prices, now).await,
            Store::Sqlite(store) => store.save_market_prices(prices, now).await,
        }
    }

    async fn count_market_prices(&self) -> Result<i64> {
        match self {
            Store::Memory(store) => store.count_market_prices().await,
            Store::Sqlite(store) => store.count_market_prices().await,
        }
    }
}

impl StatsRepository for Store {
    async fn app_stats(&self) -> Result<AppStats> {
        match self {
            Store::Memory(store) => store.app_stats().await,
            Store::Sqlite(store) => store.app_stats().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use growwise_core::market::default_prices;

    fn voice(id: &str, query: &str, category: Category, at: DateTime<Utc>) -> VoiceQueryRecord {
        VoiceQueryRecord {
            id: id.to_string(),
            query: query.to_string(),
            response: format!("response to {query}"),
            category,
            timestamp: at,
        }
    }

    fn prediction(id: &str, disease: &str, at: DateTime<Utc>) -> PredictionRecord {
        PredictionRecord {
            id: id.to_string(),
            disease: disease.to_string(),
            confidence: 75.0,
            treatment: Some("treat".to_string()),
            formatted_name: None,
            timestamp: at,
        }
    }

    async fn sqlite_store() -> Store {
        Store::sqlite("sqlite::memory:")
            .await
            .expect("in-memory sqlite should open")
    }

    async fn exercise_history_and_stats(store: Store) {
        let base = Utc::now();
        store
            .save_voice_query(&voice("v1", "weather today", Category::Weather, base))
            .await
            .unwrap();
        store
            .save_voice_query(&voice(
                "v2",
                "soil price",
                Category::Prices,
                base + Duration::seconds(1),
            ))
            .await
            .unwrap();

        let recent = store.recent_voice_queries(10).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].id, "v2");
        assert_eq!(recent[0].category, Category::Prices);
        assert_eq!(store.recent_voice_queries(1).await.unwrap().len(), 1);

        for (idx, disease) in ["healthy", "brown_spots", "healthy", "dark_patches"]
            .iter()
            .enumerate()
        {
            store
                .save_prediction(&prediction(
                    &format!("p{idx}"),
                    disease,
                    base + Duration::seconds(idx as i64),
                ))
                .await
                .unwrap();
        }

        store
            .save_weather(&WeatherRecord {
                id: "w1".to_string(),
                city: "Chennai".to_string(),
                country: Some("IN".to_string()),
                temperature: 31.5,
                description: Some("Clear Sky".to_string()),
                humidity: Some(70),
                wind_speed: Some(3.1),
                timestamp: base,
            })
            .await
            .unwrap();

        let stats = store.app_stats().await.unwrap();
        assert_eq!(stats.total_predictions, 4);
        assert_eq!(stats.weather_queries, 1);
        assert_eq!(stats.voice_queries, 2);
        assert_eq!(
            stats.common_diseases[0],
            DiseaseCount {
                disease: "healthy".to_string(),
                count: 2
            }
        );
        assert_eq!(stats.common_diseases[1].disease, "brown_spots");

        let predictions = store.recent_predictions(2).await.unwrap();
        assert_eq!(predictions[0].id, "p3");
        let weather = store.recent_weather(5).await.unwrap();
        assert_eq!(weather[0].city, "Chennai");
        assert_eq!(weather[0].humidity, Some(70));
    }

    async fn exercise_market_pruning(store: Store) {
        let now = Utc::now();
        let prices = default_prices();

        let pruned = store
            .save_market_prices(&prices, now - Duration::days(2))
            .await
            .unwrap();
        assert_eq!(pruned, 0);
        assert_eq!(store.count_market_prices().await.unwrap(), 20);

        let pruned = store.save_market_prices(&prices[..4], now).await.unwrap();
        assert_eq!(pruned, 20);
        assert_eq!(store.count_market_prices().await.unwrap(), 4);
    }

    #[tokio::test]
    async fn memory_store_tracks_history_and_stats() {
        exercise_history_and_stats(Store::memory()).await;
    }

    #[tokio::test]
    async fn sqlite_store_tracks_history_and_stats() {
        exercise_history_and_stats(sqlite_store().await).await;
    }

    #[tokio::test]
    async fn memory_store_prunes_stale_market_prices() {
        exercise_market_pruning(Store::memory()).await;
    }

    #[tokio::test]
    async fn sqlite_store_prunes_stale_market_prices() {
        exercise_market_pruning(sqlite_store().await).await;
    }

    #[tokio::test]
    async fn empty_store_reports_zero_stats() {
        let stats = sqlite_store().await.app_stats().await.unwrap();
        assert_eq!(stats.total_predictions, 0);
        assert!(stats.common_diseases.is_empty());
    }
}
