use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    Live,
    Synthetic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    pub price: f64,
    pub change: f64,
    pub change_percent: f64,
    pub volume: u64,
    pub previous_close: Option<f64>,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub source: DataSource,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Indicators {
    pub rsi: Option<f64>,
    pub macd: Option<f64>,
    pub sma20: Option<f64>,
    pub sma50: Option<f64>,
}

impl Indicators {
    pub fn is_empty(&self) -> bool {
        self.rsi.is_none() && self.macd.is_none() && self.sma20.is_none() && self.sma50.is_none()
    }
}

/// Quote and indicator bundle for one symbol at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub symbol: String,
    pub price: f64,
    pub change_percent: f64,
    pub volume: u64,
    pub rsi: Option<f64>,
    pub macd: Option<f64>,
    pub sma20: Option<f64>,
    pub sma50: Option<f64>,
    pub taken_at: DateTime<Utc>,
    pub source: DataSource,
}

impl IndicatorSnapshot {
    pub fn from_parts(quote: &Quote, indicators: Indicators, taken_at: DateTime<Utc>) -> Self {
        Self {
            symbol: quote.symbol.clone(),
            price: quote.price,
            change_percent: quote.change_percent,
            volume: quote.volume,
            rsi: indicators.rsi,
            macd: indicators.macd,
            sma20: indicators.sma20,
            sma50: indicators.sma50,
            taken_at,
            source: quote.source,
        }
    }
}

/// Percentage move from `from` to `to`. `from` must be positive.
pub fn price_change_percent(from: f64, to: f64) -> f64 {
    (to - from) / from * 100.0
}
