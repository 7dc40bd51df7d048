pub mod alpha_vantage;
pub mod synthetic;
pub mod types;

use crate::domain::snapshot::{IndicatorSnapshot, Indicators, Quote};
use crate::market::synthetic::SyntheticMarketData;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_COLLABORATOR_TIMEOUT: Duration = Duration::from_secs(20);

#[async_trait::async_trait]
pub trait MarketDataProvider: Send + Sync {
    fn provider_name(&self) -> &'static str;

    /// `Ok(None)` when the provider answered without data (unknown symbol, rate limit).
    async fn quote(&self, symbol: &str) -> anyhow::Result<Option<Quote>>;

    /// Any indicator may be missing.
    async fn indicators(&self, symbol: &str) -> anyhow::Result<Indicators>;
}

/// Soft-failing market data: live provider when it answers in time, deterministic
/// synthetic data otherwise. Never returns an error.
#[derive(Clone)]
pub struct MarketData {
    live: Option<Arc<dyn MarketDataProvider>>,
    timeout: Duration,
}

impl MarketData {
    pub fn new(live: Option<Arc<dyn MarketDataProvider>>, timeout: Duration) -> Self {
        Self { live, timeout }
    }

    pub fn synthetic_only() -> Self {
        Self::new(None, DEFAULT_COLLABORATOR_TIMEOUT)
    }

    pub async fn quote(&self, symbol: &str) -> Quote {
        let Some(live) = &self.live else {
            return SyntheticMarketData::quote(symbol);
        };

        match tokio::time::timeout(self.timeout, live.quote(symbol)).await {
            Ok(Ok(Some(quote))) => quote,
            Ok(Ok(None)) => {
                tracing::info!(%symbol, provider = live.provider_name(), "no quote data; using synthetic quote");
                SyntheticMarketData::quote(symbol)
            }
            Ok(Err(err)) => {
                tracing::warn!(%symbol, provider = live.provider_name(), error = %err, "quote fetch failed; using synthetic quote");
                SyntheticMarketData::quote(symbol)
            }
            Err(_) => {
                tracing::warn!(%symbol, provider = live.provider_name(), timeout = ?self.timeout, "quote fetch timed out; using synthetic quote");
                SyntheticMarketData::quote(symbol)
            }
        }
    }

    pub async fn indicators(&self, symbol: &str) -> Indicators {
        let Some(live) = &self.live else {
            return SyntheticMarketData::indicators(symbol);
        };

        match tokio::time::timeout(self.timeout, live.indicators(symbol)).await {
            Ok(Ok(indicators)) if !indicators.is_empty() => indicators,
            Ok(Ok(_)) => {
                tracing::info!(%symbol, provider = live.provider_name(), "no indicator data; using synthetic indicators");
                SyntheticMarketData::indicators(symbol)
            }
            Ok(Err(err)) => {
                tracing::warn!(%symbol, provider = live.provider_name(), error = %err, "indicator fetch failed; using synthetic indicators");
                SyntheticMarketData::indicators(symbol)
            }
            Err(_) => {
                tracing::warn!(%symbol, provider = live.provider_name(), timeout = ?self.timeout, "indicator fetch timed out; using synthetic indicators");
                SyntheticMarketData::indicators(symbol)
            }
        }
    }

    pub async fn snapshot(&self, symbol: &str) -> IndicatorSnapshot {
        let quote = self.quote(symbol).await;
        let indicators = self.indicators(symbol).await;
        IndicatorSnapshot::from_parts(&quote, indicators, chrono::Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::snapshot::DataSource;

    struct Failing;

    #[async_trait::async_trait]
    impl MarketDataProvider for Failing {
        fn provider_name(&self) -> &'static str {
            "failing"
        }

        async fn quote(&self, _symbol: &str) -> anyhow::Result<Option<Quote>> {
            anyhow::bail!("connection refused")
        }

        async fn indicators(&self, _symbol: &str) -> anyhow::Result<Indicators> {
            Ok(Indicators::default())
        }
    }

    struct Slow;

    #[async_trait::async_trait]
    impl MarketDataProvider for Slow {
        fn provider_name(&self) -> &'static str {
            "slow"
        }

        async fn quote(&self, _symbol: &str) -> anyhow::Result<Option<Quote>> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(None)
        }

        async fn indicators(&self, _symbol: &str) -> anyhow::Result<Indicators> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Indicators::default())
        }
    }

    #[tokio::test]
    async fn errors_fall_back_to_synthetic() {
        let market = MarketData::new(Some(Arc::new(Failing)), Duration::from_secs(1));
        let snap = market.snapshot("AAPL").await;
        assert_eq!(snap.source, DataSource::Synthetic);
        assert_eq!(snap.price, SyntheticMarketData::quote("AAPL").price);
        assert_eq!(snap.rsi, SyntheticMarketData::indicators("AAPL").rsi);
    }

    #[tokio::test]
    async fn timeouts_fall_back_to_synthetic() {
        let market = MarketData::new(Some(Arc::new(Slow)), Duration::from_millis(20));
        let quote = market.quote("ETH").await;
        assert_eq!(quote.source, DataSource::Synthetic);
        let ind = market.indicators("ETH").await;
        assert_eq!(ind, SyntheticMarketData::indicators("ETH"));
    }
}
