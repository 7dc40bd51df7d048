use crate::domain::advice::{Action, Advice};
use crate::domain::contract::LlmCorrection;
use crate::domain::snapshot::IndicatorSnapshot;
use crate::engine::evaluator::STABLE_BAND_PERCENT;

const CORRECTION_RSI_OVERSOLD: f64 = 30.0;
const CORRECTION_RSI_OVERBOUGHT: f64 = 70.0;
const LARGE_MOVE_PERCENT: f64 = 5.0;

#[derive(Debug, Clone, PartialEq)]
pub struct CorrectionDecision {
    pub should_correct: bool,
    pub corrected_action: Action,
    pub corrected_confidence: u8,
    pub reason: String,
    pub learnings: Option<String>,
}

pub fn was_correct(action: Action, price_change: f64) -> bool {
    match action {
        Action::Buy => price_change > 0.0,
        Action::Sell => price_change < 0.0,
        Action::Hold => price_change.abs() < STABLE_BAND_PERCENT,
    }
}

/// Rule-based review of a past advice against current conditions.
/// `None` means the original call is on track.
pub fn review(
    advice: &Advice,
    current: &IndicatorSnapshot,
    price_change: f64,
) -> Option<CorrectionDecision> {
    if was_correct(advice.action, price_change) {
        return None;
    }

    let (action, confidence, reason) = match current.rsi {
        Some(rsi) if rsi < CORRECTION_RSI_OVERSOLD => (
            Action::Buy,
            70,
            format!("Current RSI ({rsi:.1}) indicates oversold conditions, suggesting a buying opportunity"),
        ),
        Some(rsi) if rsi > CORRECTION_RSI_OVERBOUGHT => (
            Action::Sell,
            70,
            format!("Current RSI ({rsi:.1}) indicates overbought conditions, suggesting a selling opportunity"),
        ),
        _ if price_change > LARGE_MOVE_PERCENT => (
            Action::Sell,
            65,
            format!("Price rose {price_change:.2}% since the advice; taking profits is prudent"),
        ),
        _ if price_change < -LARGE_MOVE_PERCENT => (
            Action::Buy,
            65,
            format!("Price fell {:.2}% since the advice; the dip may be a buying opportunity", price_change.abs()),
        ),
        _ => (Action::Hold, 60, "Market conditions have changed".to_string()),
    };

    Some(CorrectionDecision {
        should_correct: action != advice.action,
        corrected_action: action,
        corrected_confidence: confidence,
        reason,
        learnings: Some(format!(
            "Original {} recommendation at confidence {}% resulted in {price_change:.2}% price change",
            advice.action, advice.confidence
        )),
    })
}

/// Advisor verdicts take precedence, but never "correct" to the same action.
pub fn from_advisor(advice: &Advice, verdict: LlmCorrection) -> CorrectionDecision {
    CorrectionDecision {
        should_correct: verdict.should_correct && verdict.corrected_action != advice.action,
        corrected_action: verdict.corrected_action,
        corrected_confidence: verdict.corrected_confidence,
        reason: verdict.correction_reason,
        learnings: verdict.learnings,
    }
}
