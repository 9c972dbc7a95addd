use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use growwise_core::market::{default_prices, fallback_prices, filter_by_category};
use growwise_core::MarketPrice;
use tracing::{info, warn};

pub const DEFAULT_CACHE_PATH: &str = "data/market_prices.json";

/// JSON file holding the served price list.
#[derive(Debug, Clone)]
pub struct MarketPriceCache {
    path: PathBuf,
}

impl MarketPriceCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes the default catalogue when no cache file exists yet.
    /// Returns whether a file was created.
    pub async fn ensure_seeded(&self) -> Result<bool> {
        if tokio::fs::try_exists(&self.path).await.unwrap_or(false) {
            return Ok(false);
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed creating {}", parent.display()))?;
        }

        let body = serde_json::to_string_pretty(&default_prices())?;
        tokio::fs::write(&self.path, body)
            .await
            .with_context(|| format!("failed writing {}", self.path.display()))?;

        info!(path = %self.path.display(), "market price cache initialized");
        Ok(true)
    }

    /// Prices for `category` (`all` for everything). An unreadable cache
    /// serves the short fallback list instead.
    pub async fn load(&self, category: &str) -> Vec<MarketPrice> {
        let prices = match self.read_all().await {
            Ok(prices) => prices,
            Err(error) => {
                warn!(error = %format!("{error:#}"), "serving fallback market prices");
                fallback_prices()
            }
        };

        filter_by_category(prices, category)
    }

    async fn read_all(&self) -> Result<Vec<MarketPrice>> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("failed reading {}", self.path.display()))?;
        let prices = serde_json::from_str(&raw)
            .with_context(|| format!("invalid price cache {}", self.path.display()))?;
        Ok(prices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn seeds_once_and_filters() {
        let dir = tempfile::tempdir().unwrap();
        let cache = MarketPriceCache::new(dir.path().join("nested/prices.json"));

        assert!(cache.ensure_seeded().await.unwrap());
        assert!(!cache.ensure_seeded().await.unwrap());

        assert_eq!(cache.load("all").await.len(), 20);
        let fruit = cache.load("fruit").await;
        assert_eq!(fruit.len(), 10);
        assert!(fruit.iter().all(|price| price.category == "Fruit"));
    }

    #[tokio::test]
    async fn keeps_an_existing_cache_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prices.json");
        let custom = vec![MarketPrice::new("Grain", "Rice", "₹45-55/kg")];
        tokio::fs::write(&path, serde_json::to_string(&custom).unwrap())
            .await
            .unwrap();

        let cache = MarketPriceCache::new(&path);
        assert!(!cache.ensure_seeded().await.unwrap());
        assert_eq!(cache.load("grain").await, custom);
    }

    #[tokio::test]
    async fn unreadable_cache_serves_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prices.json");
        tokio::fs::write(&path, "not json").await.unwrap();

        let cache = MarketPriceCache::new(&path);
        assert_eq!(cache.load("all").await.len(), 4);
        assert_eq!(cache.load("vegetable").await.len(), 2);
    }
}
