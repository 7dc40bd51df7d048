//! Wire shapes of the Alpha Vantage query API.

use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Deserialize)]
pub struct GlobalQuoteResponse {
    #[serde(rename = "Global Quote", default)]
    pub global_quote: Option<GlobalQuote>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GlobalQuote {
    #[serde(rename = "01. symbol", default)]
    pub symbol: Option<String>,
    #[serde(rename = "02. open", default)]
    pub open: Option<String>,
    #[serde(rename = "03. high", default)]
    pub high: Option<String>,
    #[serde(rename = "04. low", default)]
    pub low: Option<String>,
    #[serde(rename = "05. price", default)]
    pub price: Option<String>,
    #[serde(rename = "06. volume", default)]
    pub volume: Option<String>,
    #[serde(rename = "08. previous close", default)]
    pub previous_close: Option<String>,
    #[serde(rename = "09. change", default)]
    pub change: Option<String>,
    #[serde(rename = "10. change percent", default)]
    pub change_percent: Option<String>,
}

/// Indicator payloads are keyed by a section name such as `Technical Analysis: RSI`,
/// then by date, then by field.
pub type IndicatorSeries = BTreeMap<String, BTreeMap<String, String>>;

/// Value of `field` on the most recent date in `section`, if present and numeric.
pub fn latest_indicator_value(body: &Value, section: &str, field: &str) -> Option<f64> {
    let series: IndicatorSeries = serde_json::from_value(body.get(section)?.clone()).ok()?;
    // ISO dates sort lexicographically.
    let (_, values) = series.iter().next_back()?;
    parse_number(values.get(field)?)
}

pub fn parse_number(s: &str) -> Option<f64> {
    s.trim()
        .trim_end_matches('%')
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}
