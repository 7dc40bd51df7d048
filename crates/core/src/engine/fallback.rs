//! Fixed-weight responder standing in for the language-model advisor.
//!
//! This path is independent of the adaptive strategy: its weights and threshold
//! never change.

use crate::domain::advice::{Action, Recommendation};
use crate::domain::snapshot::IndicatorSnapshot;
use crate::engine::scoring::join_reasons;

const RSI_POINTS: f64 = 30.0;
const MACD_POINTS: f64 = 25.0;
const TREND_POINTS: f64 = 25.0;
const MOMENTUM_POINTS: f64 = 10.0;
const ACTION_THRESHOLD: f64 = 40.0;
const RSI_OVERSOLD: f64 = 30.0;
const RSI_OVERBOUGHT: f64 = 70.0;
const MAX_FALLBACK_CONFIDENCE: f64 = 90.0;
const HOLD_CONFIDENCE: u8 = 60;

pub fn respond(snapshot: &IndicatorSnapshot) -> Recommendation {
    let mut buy = 0.0;
    let mut sell = 0.0;
    let mut reasons = Vec::new();

    if let Some(rsi) = snapshot.rsi {
        if rsi < RSI_OVERSOLD {
            buy += RSI_POINTS;
            reasons.push(format!("RSI ({rsi:.1}) indicates oversold conditions"));
        } else if rsi > RSI_OVERBOUGHT {
            sell += RSI_POINTS;
            reasons.push(format!("RSI ({rsi:.1}) indicates overbought conditions"));
        }
    }

    if let Some(macd) = snapshot.macd {
        if macd > 0.0 {
            buy += MACD_POINTS;
            reasons.push(format!("MACD ({macd:.2}) shows bullish momentum"));
        } else {
            sell += MACD_POINTS;
            reasons.push(format!("MACD ({macd:.2}) shows bearish momentum"));
        }
    }

    if let (Some(sma20), Some(sma50)) = (snapshot.sma20, snapshot.sma50) {
        if sma20 > sma50 {
            buy += TREND_POINTS;
            reasons.push("Price trend is bullish (SMA20 > SMA50)".to_string());
        } else {
            sell += TREND_POINTS;
            reasons.push("Price trend is bearish (SMA20 <= SMA50)".to_string());
        }
    }

    let change = snapshot.change_percent;
    if change > 0.0 {
        buy += MOMENTUM_POINTS;
        reasons.push(format!("Positive daily momentum (+{change:.2}%)"));
    } else {
        sell += MOMENTUM_POINTS;
        reasons.push(format!("Negative daily momentum ({change:.2}%)"));
    }

    let (action, confidence) = if buy > sell && buy > ACTION_THRESHOLD {
        (Action::Buy, gap_confidence(buy - sell))
    } else if sell > buy && sell > ACTION_THRESHOLD {
        (Action::Sell, gap_confidence(sell - buy))
    } else {
        (Action::Hold, HOLD_CONFIDENCE)
    };

    Recommendation {
        action,
        confidence,
        target_price: snapshot.price * action.target_multiplier(),
        reasoning: join_reasons(&reasons),
    }
}

fn gap_confidence(gap: f64) -> u8 {
    (50.0 + gap).min(MAX_FALLBACK_CONFIDENCE) as u8
}
