use crate::config::Settings;
use crate::domain::snapshot::{DataSource, Indicators, Quote};
use crate::market::types::{latest_indicator_value, parse_number, GlobalQuoteResponse};
use crate::market::MarketDataProvider;
use anyhow::{Context, Result};
use serde_json::Value;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://www.alphavantage.co";
const DEFAULT_API_KEY: &str = "demo";
const DEFAULT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_RETRIES: u32 = 2;

#[derive(Debug, Clone)]
pub struct AlphaVantageClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    retries: u32,
}

impl AlphaVantageClient {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let base_url = settings
            .market_data_base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let api_key = settings
            .alpha_vantage_api_key
            .clone()
            .unwrap_or_else(|| DEFAULT_API_KEY.to_string());

        let timeout_secs = std::env::var("MARKET_DATA_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let retries = std::env::var("MARKET_DATA_RETRIES")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(DEFAULT_RETRIES)
            .max(1);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build market data http client")?;

        Ok(Self {
            http,
            base_url,
            api_key,
            retries,
        })
    }

    fn url(&self) -> String {
        format!("{}/query", self.base_url.trim_end_matches('/'))
    }

    async fn fetch_once(&self, params: &[(&str, &str)]) -> Result<Value> {
        let res = self
            .http
            .get(self.url())
            .query(params)
            .query(&[("apikey", self.api_key.as_str())])
            .send()
            .await
            .context("market data request failed")?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read market data response")?;

        if !status.is_success() {
            anyhow::bail!("market data HTTP {status}: {text}");
        }

        serde_json::from_str::<Value>(&text)
            .with_context(|| format!("market data response is not valid JSON: {text}"))
    }

    async fn fetch(&self, params: &[(&str, &str)]) -> Result<Value> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.fetch_once(params).await {
                Ok(body) => return Ok(body),
                Err(err) => {
                    if attempt >= self.retries {
                        return Err(err);
                    }
                    let backoff = Duration::from_millis(500 << (attempt - 1));
                    tracing::warn!(attempt, ?backoff, error = %err, "market data fetch failed; retrying");
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }

    async fn indicator(&self, symbol: &str, params: &[(&str, &str)], section: &str, field: &str) -> Option<f64> {
        let mut all = vec![("symbol", symbol), ("interval", "daily"), ("series_type", "close")];
        all.extend_from_slice(params);
        match self.fetch(&all).await {
            Ok(body) => latest_indicator_value(&body, section, field),
            Err(err) => {
                tracing::warn!(%symbol, section, error = %err, "indicator fetch failed");
                None
            }
        }
    }
}

#[async_trait::async_trait]
impl MarketDataProvider for AlphaVantageClient {
    fn provider_name(&self) -> &'static str {
        "alpha_vantage"
    }

    async fn quote(&self, symbol: &str) -> Result<Option<Quote>> {
        let body = self
            .fetch(&[("function", "GLOBAL_QUOTE"), ("symbol", symbol)])
            .await?;
        Ok(parse_global_quote(symbol, body))
    }

    async fn indicators(&self, symbol: &str) -> Result<Indicators> {
        Ok(Indicators {
            rsi: self
                .indicator(symbol, &[("function", "RSI"), ("time_period", "14")], "Technical Analysis: RSI", "RSI")
                .await,
            sma20: self
                .indicator(symbol, &[("function", "SMA"), ("time_period", "20")], "Technical Analysis: SMA", "SMA")
                .await,
            sma50: self
                .indicator(symbol, &[("function", "SMA"), ("time_period", "50")], "Technical Analysis: SMA", "SMA")
                .await,
            macd: self
                .indicator(symbol, &[("function", "MACD")], "Technical Analysis: MACD", "MACD")
                .await,
        })
    }
}

/// Rate-limit notices and unknown symbols come back as 200 with no quote section.
fn parse_global_quote(symbol: &str, body: Value) -> Option<Quote> {
    let parsed = serde_json::from_value::<GlobalQuoteResponse>(body).ok()?;
    let q = parsed.global_quote?;
    let price = q.price.as_deref().and_then(parse_number).filter(|p| *p > 0.0)?;
    let volume = q
        .volume
        .as_deref()
        .and_then(parse_number)
        .map(|v| v.max(0.0) as u64)
        .unwrap_or(0);

    Some(Quote {
        symbol: q.symbol.filter(|s| !s.is_empty()).unwrap_or_else(|| symbol.to_string()),
        price,
        change: q.change.as_deref().and_then(parse_number).unwrap_or(0.0),
        change_percent: q.change_percent.as_deref().and_then(parse_number).unwrap_or(0.0),
        volume,
        previous_close: q.previous_close.as_deref().and_then(parse_number),
        open: q.open.as_deref().and_then(parse_number),
        high: q.high.as_deref().and_then(parse_number),
        low: q.low.as_deref().and_then(parse_number),
        source: DataSource::Live,
    })
}
