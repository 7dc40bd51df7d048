use super::*;
use crate::domain::asset::Category;
use crate::domain::snapshot::{DataSource, Indicators, Quote};
use crate::llm::Provider;
use crate::market::MarketDataProvider;
use crate::storage::MemoryStore;
use std::sync::atomic::{AtomicBool, Ordering};

struct ScriptedMarket {
    price: std::sync::Mutex<f64>,
    change_percent: f64,
    volume: u64,
    indicators: Indicators,
}

impl ScriptedMarket {
    fn new(price: f64, indicators: Indicators) -> Arc<Self> {
        Arc::new(Self {
            price: std::sync::Mutex::new(price),
            change_percent: 1.5,
            volume: 1_000_000,
            indicators,
        })
    }

    fn set_price(&self, price: f64) {
        *self.price.lock().unwrap() = price;
    }
}

#[async_trait::async_trait]
impl MarketDataProvider for ScriptedMarket {
    fn provider_name(&self) -> &'static str {
        "scripted"
    }

    async fn quote(&self, symbol: &str) -> anyhow::Result<Option<Quote>> {
        let price = *self.price.lock().unwrap();
        Ok(Some(Quote {
            symbol: symbol.to_string(),
            price,
            change: price * self.change_percent / 100.0,
            change_percent: self.change_percent,
            volume: self.volume,
            previous_close: None,
            open: None,
            high: None,
            low: None,
            source: DataSource::Live,
        }))
    }

    async fn indicators(&self, _symbol: &str) -> anyhow::Result<Indicators> {
        Ok(self.indicators)
    }
}

struct ScriptedAdvisor {
    reply: Result<String, String>,
    delay: Option<Duration>,
    prompts: std::sync::Mutex<Vec<(String, String)>>,
}

impl ScriptedAdvisor {
    fn replying(text: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Ok(text.to_string()),
            delay: None,
            prompts: std::sync::Mutex::new(Vec::new()),
        })
    }

    fn failing(detail: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Err(detail.to_string()),
            delay: None,
            prompts: std::sync::Mutex::new(Vec::new()),
        })
    }

    fn slow(text: &str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            reply: Ok(text.to_string()),
            delay: Some(delay),
            prompts: std::sync::Mutex::new(Vec::new()),
        })
    }

    fn prompts(&self) -> Vec<(String, String)> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl AdvisorClient for ScriptedAdvisor {
    fn provider(&self) -> Provider {
        Provider::Anthropic
    }

    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> anyhow::Result<String> {
        self.prompts
            .lock()
            .unwrap()
            .push((system_prompt.to_string(), user_prompt.to_string()));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.reply {
            Ok(text) => Ok(text.clone()),
            Err(detail) => Err(LlmDiagnosticsError {
                provider: Provider::Anthropic,
                stage: "http",
                detail: detail.clone(),
                raw_output: None,
                raw_response_json: None,
            }
            .into()),
        }
    }
}

/// Memory store whose strategy writes can be switched off.
#[derive(Default)]
struct FlakyStore {
    inner: MemoryStore,
    fail_strategy_writes: AtomicBool,
}

#[async_trait::async_trait]
impl AdvisorStore for FlakyStore {
    async fn save_advice(&self, advice: &Advice) -> anyhow::Result<()> {
        self.inner.save_advice(advice).await
    }

    async fn get_advice(&self, id: Uuid) -> anyhow::Result<Option<Advice>> {
        self.inner.get_advice(id).await
    }

    async fn latest_advice(&self) -> anyhow::Result<Option<Advice>> {
        self.inner.latest_advice().await
    }

    async fn list_advice(&self, filter: &AdviceFilter) -> anyhow::Result<AdvicePage> {
        self.inner.list_advice(filter).await
    }

    async fn count_advice(&self) -> anyhow::Result<u64> {
        self.inner.count_advice().await
    }

    async fn find_pending(&self, older_than: DateTime<Utc>) -> anyhow::Result<Vec<Advice>> {
        self.inner.find_pending(older_than).await
    }

    async fn list_evaluated(&self) -> anyhow::Result<Vec<Advice>> {
        self.inner.list_evaluated().await
    }

    async fn record_outcome(
        &self,
        id: Uuid,
        evaluation: &crate::domain::advice::Evaluation,
    ) -> anyhow::Result<bool> {
        self.inner.record_outcome(id, evaluation).await
    }

    async fn load_strategy(&self, name: &str) -> anyhow::Result<Option<Strategy>> {
        self.inner.load_strategy(name).await
    }

    async fn save_strategy(&self, strategy: &Strategy) -> anyhow::Result<()> {
        if self.fail_strategy_writes.load(Ordering::SeqCst) {
            anyhow::bail!("connection reset while saving strategy");
        }
        self.inner.save_strategy(strategy).await
    }

    async fn append_correction(&self, log: &CorrectionLog) -> anyhow::Result<()> {
        self.inner.append_correction(log).await
    }

    async fn list_corrections(&self, limit: u32) -> anyhow::Result<Vec<CorrectionLog>> {
        self.inner.list_corrections(limit).await
    }

    async fn create_prompt(&self, prompt: &AnalysisPrompt) -> anyhow::Result<bool> {
        self.inner.create_prompt(prompt).await
    }

    async fn update_prompt(&self, prompt: &AnalysisPrompt) -> anyhow::Result<bool> {
        self.inner.update_prompt(prompt).await
    }

    async fn get_prompt(&self, id: Uuid) -> anyhow::Result<Option<AnalysisPrompt>> {
        self.inner.get_prompt(id).await
    }

    async fn get_prompt_by_name(&self, name: &str) -> anyhow::Result<Option<AnalysisPrompt>> {
        self.inner.get_prompt_by_name(name).await
    }

    async fn list_prompts(&self, category: Option<PromptCategory>) -> anyhow::Result<Vec<AnalysisPrompt>> {
        self.inner.list_prompts(category).await
    }

    async fn record_prompt_use(&self, name: &str, at: DateTime<Utc>) -> anyhow::Result<bool> {
        self.inner.record_prompt_use(name, at).await
    }
}

fn bullish_indicators() -> Indicators {
    Indicators {
        rsi: Some(25.0),
        macd: Some(1.2),
        sma20: Some(105.0),
        sma50: Some(100.0),
    }
}

fn neutral_indicators() -> Indicators {
    Indicators {
        rsi: Some(50.0),
        macd: Some(0.4),
        sma20: Some(101.0),
        sma50: Some(100.0),
    }
}

fn options() -> EngineOptions {
    EngineOptions {
        maturation_window: chrono::Duration::hours(24),
        call_timeout: Duration::from_millis(200),
    }
}

async fn engine(
    store: Arc<dyn AdvisorStore>,
    market: &Arc<ScriptedMarket>,
    advisor: Option<Arc<ScriptedAdvisor>>,
) -> AdvisorEngine {
    let live: Arc<dyn MarketDataProvider> = market.clone();
    let advisor = advisor.map(|a| a as Arc<dyn AdvisorClient>);
    AdvisorEngine::initialize(
        store,
        MarketData::new(Some(live), Duration::from_secs(1)),
        advisor,
        options(),
    )
    .await
    .unwrap()
}

/// Stores a matured advice priced at 100.
async fn seed_advice(
    store: &dyn AdvisorStore,
    symbol: &str,
    action: Action,
    created_at: DateTime<Utc>,
) -> Advice {
    let snapshot = IndicatorSnapshot {
        symbol: symbol.to_string(),
        price: 100.0,
        change_percent: 0.0,
        volume: 2_000_000,
        rsi: Some(50.0),
        macd: Some(0.1),
        sma20: None,
        sma50: None,
        taken_at: created_at,
        source: DataSource::Live,
    };
    let advice = Advice::new(
        category_of(symbol),
        snapshot,
        Recommendation {
            action,
            confidence: 70,
            target_price: 100.0 * action.target_multiplier(),
            reasoning: "Seeded.".to_string(),
        },
        AdviceOrigin::Scoring,
        created_at,
    );
    store.save_advice(&advice).await.unwrap();
    advice
}

fn invalid_input(err: &anyhow::Error) -> bool {
    matches!(err.downcast_ref::<EngineError>(), Some(EngineError::InvalidInput(_)))
}

#[tokio::test]
async fn initialize_persists_default_strategy_once() {
    let store = Arc::new(MemoryStore::new());
    let market = ScriptedMarket::new(100.0, neutral_indicators());

    let first = engine(store.clone(), &market, None).await;
    let created = first.strategy().await.unwrap();
    assert_eq!(created.name, DEFAULT_STRATEGY_NAME);
    assert_eq!(created.thresholds.confidence_min, 60.0);

    let stored = store.load_strategy(DEFAULT_STRATEGY_NAME).await.unwrap().unwrap();
    assert_eq!(stored, created);

    let second = engine(store.clone(), &market, None).await;
    assert_eq!(second.strategy().await.unwrap().created_at, created.created_at);
}

#[tokio::test]
async fn generate_scores_with_strategy_and_persists() {
    let store = Arc::new(MemoryStore::new());
    let market = ScriptedMarket::new(100.0, bullish_indicators());
    let engine = engine(store.clone(), &market, None).await;

    let advice = engine.generate_advice(" aapl ").await.unwrap();
    // buy 40.75 stays under the default confidence floor of 60.
    assert_eq!(advice.symbol, "AAPL");
    assert_eq!(advice.category, Category::Stocks);
    assert_eq!(advice.action, Action::Hold);
    assert_eq!(advice.confidence, 70);
    assert_eq!(advice.target_price, 100.0);
    assert_eq!(advice.origin, AdviceOrigin::Scoring);
    assert_eq!(advice.outcome, Outcome::Pending);
    assert_eq!(advice.indicators.source, DataSource::Live);

    let stored = engine.advice(advice.id).await.unwrap();
    assert_eq!(stored, advice);
    assert_eq!(engine.latest_advice().await.unwrap().unwrap().id, advice.id);
}

#[tokio::test]
async fn invalid_symbol_is_rejected_before_any_work() {
    let store = Arc::new(MemoryStore::new());
    let market = ScriptedMarket::new(100.0, bullish_indicators());
    let engine = engine(store.clone(), &market, None).await;

    let err = engine.generate_advice("BRK.B").await.unwrap_err();
    assert!(invalid_input(&err));
    let err = engine.analyze_realtime("", None).await.unwrap_err();
    assert!(invalid_input(&err));
    assert_eq!(store.count_advice().await.unwrap(), 0);
}

#[tokio::test]
async fn evaluation_classifies_matured_advice_once() {
    let store = Arc::new(MemoryStore::new());
    let market = ScriptedMarket::new(100.0, neutral_indicators());
    let engine = engine(store.clone(), &market, None).await;

    let now = Utc::now();
    let old = now - chrono::Duration::days(2);
    let buy = seed_advice(store.as_ref(), "AAPL", Action::Buy, old).await;
    let sell = seed_advice(store.as_ref(), "MSFT", Action::Sell, old).await;
    let hold = seed_advice(store.as_ref(), "SPY", Action::Hold, old).await;
    let young = seed_advice(store.as_ref(), "NVDA", Action::Buy, now - chrono::Duration::hours(2)).await;

    market.set_price(103.0);
    let report = engine.evaluate_pending(now).await.unwrap();
    assert_eq!(report.considered, 3);
    assert!(report.failures.is_empty());
    assert!(report.adaptation.is_some());

    let outcome_of = |id: Uuid| report.evaluated.iter().find(|e| e.id == id).unwrap().clone();
    let b = outcome_of(buy.id);
    assert_eq!(b.outcome, Outcome::Success);
    assert!((b.performance_score - 80.0).abs() < 1e-9);
    let s = outcome_of(sell.id);
    assert_eq!(s.outcome, Outcome::Failure);
    assert!((s.performance_score - 25.0).abs() < 1e-9);
    let h = outcome_of(hold.id);
    assert_eq!(h.outcome, Outcome::Partial);
    assert_eq!(h.performance_score, 50.0);

    let stored = engine.advice(buy.id).await.unwrap();
    assert_eq!(stored.current_price, Some(103.0));
    assert_eq!(stored.evaluated_at, Some(now));
    assert_eq!(engine.advice(young.id).await.unwrap().outcome, Outcome::Pending);

    // Second run finds nothing new and leaves outcomes alone.
    market.set_price(50.0);
    let again = engine.evaluate_pending(now).await.unwrap();
    assert_eq!(again.considered, 0);
    assert_eq!(engine.advice(buy.id).await.unwrap().outcome, Outcome::Success);
}

#[tokio::test]
async fn one_bad_record_does_not_abort_the_batch() {
    let store = Arc::new(MemoryStore::new());
    let market = ScriptedMarket::new(103.0, neutral_indicators());
    let engine = engine(store.clone(), &market, None).await;

    let now = Utc::now();
    let old = now - chrono::Duration::days(2);
    let good = seed_advice(store.as_ref(), "AAPL", Action::Buy, old).await;

    let mut broken = Advice::new(
        Category::Stocks,
        good.indicators.clone(),
        Recommendation {
            action: Action::Buy,
            confidence: 60,
            target_price: 0.0,
            reasoning: "Broken.".to_string(),
        },
        AdviceOrigin::Scoring,
        old,
    );
    broken.price_at_advice = 0.0;
    store.save_advice(&broken).await.unwrap();

    let report = engine.evaluate_pending(now).await.unwrap();
    assert_eq!(report.considered, 2);
    assert_eq!(report.evaluated.len(), 1);
    assert_eq!(report.evaluated[0].id, good.id);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].id, broken.id);
    assert_eq!(engine.advice(broken.id).await.unwrap().outcome, Outcome::Pending);
}

#[tokio::test]
async fn poor_results_adapt_the_strategy_once() {
    let store = Arc::new(MemoryStore::new());
    let market = ScriptedMarket::new(100.0, neutral_indicators());
    let engine = engine(store.clone(), &market, None).await;

    let now = Utc::now();
    for symbol in ["AAPL", "MSFT", "TSLA", "META", "NVDA"] {
        seed_advice(store.as_ref(), symbol, Action::Buy, now - chrono::Duration::days(2)).await;
    }
    market.set_price(97.0);

    let report = engine.evaluate_pending(now).await.unwrap();
    assert_eq!(report.evaluated.len(), 5);
    assert!(report.evaluated.iter().all(|e| e.outcome == Outcome::Failure));

    let adaptation = report.adaptation.unwrap();
    assert_eq!(adaptation.performance.total_advices, 5);
    assert_eq!(adaptation.performance.success_rate, 0.0);
    let entry = adaptation.learning_entry.unwrap();
    assert_eq!(entry.reason, "Success rate dropped to 0.0%");
    assert_eq!(entry.adjustments.confidence_min, Some(65.0));

    let strategy = engine.strategy().await.unwrap();
    assert!(strategy.weights.is_normalized());
    assert!((strategy.weights.rsi - 0.18).abs() < 1e-9);
    assert!((strategy.weights.macd - 0.27).abs() < 1e-9);
    assert_eq!(strategy.thresholds.confidence_min, 65.0);
    assert_eq!(strategy.learning_history.len(), 1);

    // Nothing new evaluated: no second learning entry.
    let again = engine.adapt(now + chrono::Duration::hours(1)).await.unwrap();
    assert!(again.learning_entry.is_none());
    let strategy = engine.strategy().await.unwrap();
    assert_eq!(strategy.learning_history.len(), 1);
    assert_eq!(strategy.thresholds.confidence_min, 65.0);
    assert!(strategy.weights.is_normalized());
}

#[tokio::test]
async fn failed_strategy_write_is_not_committed() {
    let store = Arc::new(FlakyStore::default());
    let market = ScriptedMarket::new(100.0, neutral_indicators());
    let engine = engine(store.clone(), &market, None).await;

    let now = Utc::now();
    for symbol in ["AAPL", "MSFT", "TSLA", "META", "NVDA"] {
        seed_advice(store.as_ref(), symbol, Action::Buy, now - chrono::Duration::days(2)).await;
    }
    market.set_price(97.0);
    store.fail_strategy_writes.store(true, Ordering::SeqCst);

    let report = engine.evaluate_pending(now).await.unwrap();
    assert_eq!(report.evaluated.len(), 5);
    assert!(report.adaptation.is_none());
    assert!(report.adaptation_error.unwrap().contains("saving strategy"));

    let strategy = engine.strategy().await.unwrap();
    assert_eq!(strategy.thresholds.confidence_min, 60.0);
    assert!(strategy.learning_history.is_empty());

    // The engine stays usable and commits once the store recovers.
    store.fail_strategy_writes.store(false, Ordering::SeqCst);
    let report = engine.adapt(now).await.unwrap();
    assert!(report.learning_entry.is_some());
    assert_eq!(engine.strategy().await.unwrap().thresholds.confidence_min, 65.0);
}

#[tokio::test]
async fn rule_based_correction_is_logged() {
    let store = Arc::new(MemoryStore::new());
    let market = ScriptedMarket::new(97.0, Indicators {
        rsi: Some(75.0),
        ..neutral_indicators()
    });
    let engine = engine(store.clone(), &market, None).await;
    let advice = seed_advice(store.as_ref(), "TSLA", Action::Buy, Utc::now()).await;

    let outcome = engine.self_correct(advice.id).await.unwrap();
    assert!(outcome.should_correct);
    assert!((outcome.price_change_percent + 3.0).abs() < 1e-9);
    let log = outcome.correction.unwrap();
    assert_eq!(log.original_action, Action::Buy);
    assert_eq!(log.corrected_action, Action::Sell);
    assert_eq!(log.corrected_confidence, 70);
    assert_eq!(log.market_conditions.snapshot.rsi, Some(75.0));

    let history = engine.correction_history(20).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].id, log.id);
    // The original advice is untouched.
    assert_eq!(engine.advice(advice.id).await.unwrap(), advice);
}

#[tokio::test]
async fn on_track_advice_writes_no_correction() {
    let store = Arc::new(MemoryStore::new());
    let market = ScriptedMarket::new(101.0, neutral_indicators());
    let engine = engine(store.clone(), &market, None).await;
    let advice = seed_advice(store.as_ref(), "AAPL", Action::Buy, Utc::now()).await;

    let outcome = engine.self_correct(advice.id).await.unwrap();
    assert!(!outcome.should_correct);
    assert!(outcome.correction.is_none());
    assert!(engine.correction_history(20).await.unwrap().is_empty());
}

#[tokio::test]
async fn unknown_advice_is_not_found() {
    let store = Arc::new(MemoryStore::new());
    let market = ScriptedMarket::new(100.0, neutral_indicators());
    let engine = engine(store, &market, None).await;

    let err = engine.self_correct(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err.downcast_ref::<EngineError>(), Some(EngineError::NotFound(_))));
}

#[tokio::test]
async fn advisor_correction_takes_precedence() {
    let store = Arc::new(MemoryStore::new());
    let market = ScriptedMarket::new(97.0, Indicators {
        rsi: Some(75.0),
        ..neutral_indicators()
    });
    let advisor = ScriptedAdvisor::replying(
        r#"Review: {"shouldCorrect": true, "correctedAction": "hold", "correctedConfidence": 55, "correctionReason": "Range-bound after the drop", "learnings": "Wait for a breakout"}"#,
    );
    let engine = engine(store.clone(), &market, Some(advisor.clone())).await;
    let advice = seed_advice(store.as_ref(), "TSLA", Action::Buy, Utc::now()).await;

    let outcome = engine.self_correct(advice.id).await.unwrap();
    let log = outcome.correction.unwrap();
    assert_eq!(log.corrected_action, Action::Hold);
    assert_eq!(log.corrected_confidence, 55);
    assert_eq!(log.correction_reason, "Range-bound after the drop");
    assert_eq!(outcome.learnings.as_deref(), Some("Wait for a breakout"));

    let prompts = advisor.prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].1.contains("- Recommendation: BUY"));
    assert!(prompts[0].1.contains("- Price Change: -3.00%"));
}

#[tokio::test]
async fn malformed_advisor_correction_falls_back_to_rules() {
    let store = Arc::new(MemoryStore::new());
    let market = ScriptedMarket::new(97.0, Indicators {
        rsi: Some(75.0),
        ..neutral_indicators()
    });
    let advisor = ScriptedAdvisor::replying("I would probably sell.");
    let engine = engine(store.clone(), &market, Some(advisor)).await;
    let advice = seed_advice(store.as_ref(), "TSLA", Action::Buy, Utc::now()).await;

    let log = engine.self_correct(advice.id).await.unwrap().correction.unwrap();
    assert_eq!(log.corrected_action, Action::Sell);
    assert_eq!(log.corrected_confidence, 70);
}

#[tokio::test]
async fn prompt_analysis_without_advisor_uses_fallback_responder() {
    let store = Arc::new(MemoryStore::new());
    let market = ScriptedMarket::new(100.0, bullish_indicators());
    let engine = engine(store.clone(), &market, None).await;

    let result = engine
        .analyze_with_prompt("AAPL", Some("momentum_analysis"), None)
        .await
        .unwrap();
    // 30 + 25 + 25 + 10 against nothing.
    assert_eq!(result.analysis.action, Action::Buy);
    assert_eq!(result.analysis.confidence, 90);
    assert!((result.analysis.target_price - 105.0).abs() < 1e-9);
    assert_eq!(result.prompt_used, "momentum_analysis");
    assert_eq!(result.advice.origin, AdviceOrigin::Fallback);
    assert_eq!(result.asset.unwrap().name, "Apple");
    assert_eq!(store.count_advice().await.unwrap(), 1);
}

#[tokio::test]
async fn prompt_analysis_prefers_valid_advisor_output() {
    let store = Arc::new(MemoryStore::new());
    let market = ScriptedMarket::new(100.0, bullish_indicators());
    let advisor = ScriptedAdvisor::replying(
        r#"Here you go: {"action": "sell", "confidence": 88, "targetPrice": 95.5, "reasoning": "Overextended."}"#,
    );
    let engine = engine(store.clone(), &market, Some(advisor.clone())).await;

    let result = engine
        .analyze_with_prompt("AAPL", Some("no_such_prompt"), None)
        .await
        .unwrap();
    assert_eq!(result.prompt_used, "technical_analysis");
    assert_eq!(result.advice.origin, AdviceOrigin::Advisor);
    assert_eq!(result.advice.action, Action::Sell);
    assert_eq!(result.advice.confidence, 88);
    assert_eq!(result.advice.target_price, 95.5);

    let prompts = advisor.prompts();
    assert_eq!(prompts.len(), 1);
    assert_eq!(prompts[0].0, prompt::analysis_prompt(None).system_prompt);
    assert!(prompts[0].1.contains("AAPL (Apple)"));
    assert!(prompts[0].1.contains("Current Price: $100.00"));
    assert!(!prompts[0].1.contains("{{"));
}

#[tokio::test]
async fn advisor_failure_and_timeout_fall_back() {
    let market = ScriptedMarket::new(100.0, bullish_indicators());

    let failing = engine(
        Arc::new(MemoryStore::new()),
        &market,
        Some(ScriptedAdvisor::failing("status=529 Overloaded")),
    )
    .await;
    let result = failing.analyze_with_prompt("NVDA", None, None).await.unwrap();
    assert_eq!(result.advice.origin, AdviceOrigin::Fallback);
    assert_eq!(result.analysis.action, Action::Buy);

    let slow = engine(
        Arc::new(MemoryStore::new()),
        &market,
        Some(ScriptedAdvisor::slow(
            r#"{"action": "SELL", "confidence": 80}"#,
            Duration::from_secs(5),
        )),
    )
    .await;
    let result = slow.analyze_with_prompt("NVDA", None, None).await.unwrap();
    assert_eq!(result.advice.origin, AdviceOrigin::Fallback);
    assert_eq!(result.analysis.action, Action::Buy);
}

#[tokio::test]
async fn custom_prompt_is_filled_and_empty_one_rejected() {
    let store = Arc::new(MemoryStore::new());
    let market = ScriptedMarket::new(100.0, neutral_indicators());
    let advisor = ScriptedAdvisor::replying(r#"{"action": "HOLD", "confidence": 61, "targetPrice": 100}"#);
    let engine = engine(store.clone(), &market, Some(advisor.clone())).await;

    let empty = CustomPrompt {
        system_prompt: None,
        template: String::new(),
    };
    let err = engine
        .analyze_with_prompt("AAPL", None, Some(&empty))
        .await
        .unwrap_err();
    assert!(invalid_input(&err));
    assert!(advisor.prompts().is_empty());

    let custom = CustomPrompt {
        system_prompt: None,
        template: "Is {{symbol}} at ${{price}} with RSI {{rsi}} a buy?".to_string(),
    };
    let result = engine
        .analyze_with_prompt("ETH", None, Some(&custom))
        .await
        .unwrap();
    assert_eq!(result.prompt_used, "custom");
    assert_eq!(result.advice.category, Category::Crypto);
    assert_eq!(
        advisor.prompts()[0],
        (
            prompt::DEFAULT_CUSTOM_SYSTEM_PROMPT.to_string(),
            "Is ETH at $100.00 with RSI 50.0 a buy?".to_string()
        )
    );
}

#[tokio::test]
async fn stored_prompts_are_seeded_once_and_count_usage() {
    let store = Arc::new(MemoryStore::new());
    let market = ScriptedMarket::new(100.0, bullish_indicators());
    // a restart must not duplicate the built-ins
    engine(store.clone(), &market, None).await;
    let engine = engine(store.clone(), &market, None).await;
    assert_eq!(engine.list_prompts(None).await.unwrap().len(), 4);

    for name in [Some("momentum_analysis"), Some("momentum_analysis"), Some("no_such_prompt"), Some("self_correction")] {
        engine.analyze_with_prompt("AAPL", name, None).await.unwrap();
    }
    let custom = CustomPrompt {
        system_prompt: None,
        template: "{{symbol}}?".to_string(),
    };
    engine.analyze_with_prompt("AAPL", None, Some(&custom)).await.unwrap();

    let listed = engine.list_prompts(None).await.unwrap();
    let counts: Vec<(&str, u64)> = listed.iter().map(|p| (p.name.as_str(), p.usage_count)).collect();
    assert_eq!(
        counts,
        vec![
            ("momentum_analysis", 2),
            ("technical_analysis", 2),
            ("risk_assessment", 0),
            ("self_correction", 0),
        ]
    );
    assert!(listed[0].last_used.is_some());
    assert!(listed[2].last_used.is_none());

    let fundamental = engine.list_prompts(Some(PromptCategory::Fundamental)).await.unwrap();
    assert_eq!(fundamental.len(), 1);
    assert_eq!(fundamental[0].name, "risk_assessment");
}

#[tokio::test]
async fn created_prompt_drives_analysis_until_deactivated() {
    let store = Arc::new(MemoryStore::new());
    let market = ScriptedMarket::new(100.0, neutral_indicators());
    let advisor = ScriptedAdvisor::replying(r#"{"action": "HOLD", "confidence": 60}"#);
    let engine = engine(store.clone(), &market, Some(advisor.clone())).await;

    let created = engine
        .create_prompt(NewPrompt {
            name: "swing_trade".to_string(),
            category: PromptCategory::Custom,
            template: "Swing {{symbol}} at ${{price}}?".to_string(),
            ..NewPrompt::default()
        })
        .await
        .unwrap();
    assert_eq!(created.system_prompt, prompt::DEFAULT_CUSTOM_SYSTEM_PROMPT);

    let dup = engine
        .create_prompt(NewPrompt {
            name: "swing_trade".to_string(),
            template: "again".to_string(),
            ..NewPrompt::default()
        })
        .await
        .unwrap_err();
    assert!(invalid_input(&dup));

    let result = engine
        .analyze_with_prompt("MSFT", Some("swing_trade"), None)
        .await
        .unwrap();
    assert_eq!(result.prompt_used, "swing_trade");
    assert_eq!(advisor.prompts()[0].1, "Swing MSFT at $100.00?");

    let updated = engine
        .update_prompt(
            created.id,
            PromptUpdate {
                is_active: Some(false),
                ..PromptUpdate::default()
            },
        )
        .await
        .unwrap();
    assert!(!updated.is_active);
    assert_eq!(updated.usage_count, 1);

    let result = engine
        .analyze_with_prompt("MSFT", Some("swing_trade"), None)
        .await
        .unwrap();
    assert_eq!(result.prompt_used, "technical_analysis");
    assert!(engine
        .list_prompts(Some(PromptCategory::Custom))
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn updating_unknown_prompt_is_not_found() {
    let store = Arc::new(MemoryStore::new());
    let market = ScriptedMarket::new(100.0, neutral_indicators());
    let engine = engine(store, &market, None).await;

    let err = engine
        .update_prompt(
            Uuid::new_v4(),
            PromptUpdate {
                template: Some("x".to_string()),
                ..PromptUpdate::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err.downcast_ref::<EngineError>(), Some(EngineError::NotFound(_))));

    let technical = engine
        .list_prompts(Some(PromptCategory::Technical))
        .await
        .unwrap()
        .remove(0);
    let err = engine
        .update_prompt(
            technical.id,
            PromptUpdate {
                template: Some("   ".to_string()),
                ..PromptUpdate::default()
            },
        )
        .await
        .unwrap_err();
    assert!(invalid_input(&err));
}

#[tokio::test]
async fn realtime_consults_advisor_only_for_questions() {
    let store = Arc::new(MemoryStore::new());
    let market = ScriptedMarket::new(100.0, bullish_indicators());
    let advisor = ScriptedAdvisor::replying(r#"{"action": "HOLD", "confidence": 64, "reasoning": "Wait."}"#);
    let engine = engine(store.clone(), &market, Some(advisor.clone())).await;

    let plain = engine.analyze_realtime("btc", Some("   ")).await.unwrap();
    assert_eq!(plain.symbol, "BTC");
    assert_eq!(plain.asset_name, "Bitcoin");
    assert_eq!(plain.origin, AdviceOrigin::Fallback);
    assert!(plain.user_query.is_none());
    assert!(advisor.prompts().is_empty());

    let asked = engine
        .analyze_realtime("BTC", Some("Is it a buy?"))
        .await
        .unwrap();
    assert_eq!(asked.origin, AdviceOrigin::Advisor);
    assert_eq!(asked.analysis.confidence, 64);
    assert_eq!(asked.user_query.as_deref(), Some("Is it a buy?"));
    assert!(advisor.prompts()[0].1.contains("User Question: Is it a buy?"));

    assert_eq!(store.count_advice().await.unwrap(), 0);
}

#[tokio::test]
async fn performance_stats_summarize_outcomes() {
    let store = Arc::new(MemoryStore::new());
    let market = ScriptedMarket::new(103.0, neutral_indicators());
    let engine = engine(store.clone(), &market, None).await;

    let now = Utc::now();
    seed_advice(store.as_ref(), "AAPL", Action::Buy, now - chrono::Duration::days(2)).await;
    seed_advice(store.as_ref(), "MSFT", Action::Sell, now - chrono::Duration::days(2)).await;
    seed_advice(store.as_ref(), "SPY", Action::Hold, now).await;
    engine.evaluate_pending(now).await.unwrap();

    let stats = engine.performance_stats().await.unwrap();
    assert_eq!(stats.total_advices, 3);
    assert_eq!(stats.evaluated_advices, 2);
    assert_eq!(stats.pending_advices, 1);
    assert_eq!(stats.successful_advices, 1);
    assert_eq!(stats.failed_advices, 1);
    assert!((stats.success_rate - 50.0).abs() < 1e-9);
    assert!((stats.average_score - 52.5).abs() < 1e-9);
    assert_eq!(stats.recent_advices.len(), 3);
    assert!(stats.recent_learnings.is_empty());
    assert!((stats.weights.rsi - Weights::default().rsi).abs() < 1e-9);
    assert_eq!(stats.thresholds.confidence_min, 60.0);
}

#[tokio::test]
async fn history_filters_by_normalized_symbol() {
    let store = Arc::new(MemoryStore::new());
    let market = ScriptedMarket::new(100.0, neutral_indicators());
    let engine = engine(store.clone(), &market, None).await;

    let now = Utc::now();
    seed_advice(store.as_ref(), "AAPL", Action::Buy, now).await;
    seed_advice(store.as_ref(), "MSFT", Action::Buy, now).await;

    let page = engine
        .advice_history(AdviceFilter {
            symbol: Some("aapl".to_string()),
            page: 1,
            limit: 20,
            ..AdviceFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].symbol, "AAPL");

    let err = engine
        .advice_history(AdviceFilter {
            symbol: Some("not a symbol".to_string()),
            ..AdviceFilter::default()
        })
        .await
        .unwrap_err();
    assert!(invalid_input(&err));
}
