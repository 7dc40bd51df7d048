//! Strategy-weighted scoring used by the scheduled advice pipeline.

use crate::domain::advice::{Action, Recommendation, MAX_CONFIDENCE};
use crate::domain::snapshot::IndicatorSnapshot;
use crate::domain::strategy::Strategy;

/// Reference daily volume for the confirmation bonus.
pub const REFERENCE_AVG_VOLUME: f64 = 5_000_000.0;
const VOLUME_CONFIRMATION_RATIO: f64 = 1.2;
const MACD_SATURATION: f64 = 5.0;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoreCard {
    pub buy: f64,
    pub sell: f64,
    pub reasons: Vec<String>,
}

impl ScoreCard {
    fn add_buy(&mut self, amount: f64, reason: String) {
        self.buy += amount;
        self.reasons.push(reason);
    }

    fn add_sell(&mut self, amount: f64, reason: String) {
        self.sell += amount;
        self.reasons.push(reason);
    }

    pub fn reasoning(&self) -> String {
        join_reasons(&self.reasons)
    }
}

/// Accumulates buy/sell pressure from every available indicator.
pub fn score_card(snapshot: &IndicatorSnapshot, strategy: &Strategy) -> ScoreCard {
    let weights = &strategy.weights;
    let thresholds = &strategy.thresholds;
    let mut card = ScoreCard::default();

    if let Some(rsi) = snapshot.rsi {
        if rsi < thresholds.rsi_oversold {
            card.add_buy(
                weights.rsi * 100.0,
                format!("RSI ({rsi:.1}) indicates oversold conditions"),
            );
        } else if rsi > thresholds.rsi_overbought {
            card.add_sell(
                weights.rsi * 100.0,
                format!("RSI ({rsi:.1}) indicates overbought conditions"),
            );
        }
    }

    if let Some(macd) = snapshot.macd {
        let strength = macd.abs().min(MACD_SATURATION) / MACD_SATURATION * 100.0;
        if macd > 0.0 {
            card.add_buy(
                weights.macd * strength,
                format!("MACD ({macd:.2}) shows bullish momentum"),
            );
        } else {
            card.add_sell(
                weights.macd * strength,
                format!("MACD ({macd:.2}) shows bearish momentum"),
            );
        }
    }

    if let (Some(sma20), Some(sma50)) = (snapshot.sma20, snapshot.sma50) {
        if sma50 != 0.0 {
            let trend_strength = (sma20 - sma50) / sma50 * 100.0;
            let contribution = weights.trend * (trend_strength.abs() * 10.0).min(100.0);
            if sma20 > sma50 {
                card.add_buy(
                    contribution,
                    format!("SMA20 above SMA50 by {trend_strength:.2}%, uptrend confirmed"),
                );
            } else {
                card.add_sell(
                    contribution,
                    format!("SMA20 below SMA50 by {:.2}%, downtrend indicated", trend_strength.abs()),
                );
            }
        }
    }

    let change = snapshot.change_percent;
    let momentum = weights.momentum * (change.abs() * 10.0).min(100.0);
    if change > 0.0 {
        card.add_buy(momentum, format!("Positive daily momentum (+{change:.2}%)"));
    } else {
        card.add_sell(momentum, format!("Negative daily momentum ({change:.2}%)"));
    }

    // Confirmation only: must run after every directional contribution.
    let volume = snapshot.volume as f64;
    if volume > REFERENCE_AVG_VOLUME * VOLUME_CONFIRMATION_RATIO {
        let bonus = weights.volume * (volume / REFERENCE_AVG_VOLUME).min(2.0) * 50.0;
        // Ties go to the sell side.
        if card.buy > card.sell {
            card.add_buy(bonus, "High volume confirms bullish sentiment".to_string());
        } else {
            card.add_sell(bonus, "High volume confirms bearish sentiment".to_string());
        }
    }

    card
}

pub fn decide(card: &ScoreCard, confidence_min: f64) -> (Action, u8) {
    let total = card.buy + card.sell;
    let total = if total == 0.0 { 1.0 } else { total };

    if card.buy > card.sell && card.buy > confidence_min {
        (Action::Buy, dominance_confidence(card.buy, total))
    } else if card.sell > card.buy && card.sell > confidence_min {
        (Action::Sell, dominance_confidence(card.sell, total))
    } else {
        let confidence = (50.0 + (card.buy - card.sell).abs() / 2.0).round();
        (Action::Hold, confidence.clamp(0.0, f64::from(MAX_CONFIDENCE)) as u8)
    }
}

fn dominance_confidence(side: f64, total: f64) -> u8 {
    (side / total * 100.0)
        .round()
        .clamp(0.0, f64::from(MAX_CONFIDENCE)) as u8
}

pub fn score(snapshot: &IndicatorSnapshot, strategy: &Strategy) -> Recommendation {
    let card = score_card(snapshot, strategy);
    let (action, confidence) = decide(&card, strategy.thresholds.confidence_min);
    Recommendation {
        action,
        confidence,
        target_price: snapshot.price * action.target_multiplier(),
        reasoning: card.reasoning(),
    }
}

pub(crate) fn join_reasons(reasons: &[String]) -> String {
    if reasons.is_empty() {
        return "No decisive indicator signals.".to_string();
    }
    reasons
        .iter()
        .map(|r| format!("{}.", r.trim_end_matches('.')))
        .collect::<Vec<_>>()
        .join(" ")
}
