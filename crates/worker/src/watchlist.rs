use advisory_core::domain::asset::{self, normalize_symbol, Category};
use chrono::NaiveDate;

#[derive(Debug, Clone, Default)]
pub struct WatchlistOptions {
    /// Restricts the catalogue to one category.
    pub category: Option<Category>,

    /// Explicit symbol list; takes precedence over the catalogue.
    pub symbols: Option<Vec<String>>,
}

impl WatchlistOptions {
    pub fn from_env() -> anyhow::Result<Self> {
        let mut out = Self::default();

        if let Ok(s) = std::env::var("WATCHLIST_CATEGORY") {
            if !s.trim().is_empty() {
                out.category = Some(s.parse()?);
            }
        }

        if let Ok(s) = std::env::var("WATCHLIST_SYMBOLS") {
            let symbols = parse_symbols(&s);
            if !symbols.is_empty() {
                out.symbols = Some(symbols);
            }
        }

        Ok(out)
    }

    /// A category given on the command line replaces the configured list.
    pub fn with_category(mut self, category: Option<Category>) -> Self {
        if category.is_some() {
            self.category = category;
            self.symbols = None;
        }
        self
    }
}

/// Comma separated symbols. Invalid entries are dropped with a warning.
pub fn parse_symbols(raw: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        match normalize_symbol(part) {
            Ok(symbol) if !out.contains(&symbol) => out.push(symbol),
            Ok(_) => {}
            Err(e) => tracing::warn!(entry = part, error = %e, "ignoring WATCHLIST_SYMBOLS entry"),
        }
    }
    out
}

pub fn build_watchlist(opts: &WatchlistOptions) -> Vec<String> {
    if let Some(symbols) = &opts.symbols {
        return symbols.clone();
    }
    asset::watchlist(opts.category)
        .into_iter()
        .map(str::to_string)
        .collect()
}

/// Deterministic rotation: one symbol per market date.
pub fn select_symbol(watchlist: &[String], market_date: NaiveDate) -> anyhow::Result<String> {
    asset::pick_for_date(watchlist, market_date)
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("watchlist is empty"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbols_are_normalized_and_deduplicated() {
        let symbols = parse_symbols(" aapl, BTC ,, brk.b, AAPL ,nvda");
        assert_eq!(symbols, vec!["AAPL", "BTC", "NVDA"]);
    }

    #[test]
    fn category_override_drops_explicit_symbols() {
        let opts = WatchlistOptions {
            category: None,
            symbols: Some(vec!["AAPL".to_string()]),
        };
        assert_eq!(build_watchlist(&opts), vec!["AAPL"]);

        let crypto = build_watchlist(&opts.clone().with_category(Some(Category::Crypto)));
        assert_eq!(crypto, vec!["BTC", "ETH", "SOL"]);

        assert_eq!(build_watchlist(&opts.with_category(None)), vec!["AAPL"]);
    }

    #[test]
    fn rotation_advances_daily_and_wraps() {
        let list: Vec<String> = ["BTC", "ETH", "SOL"].iter().map(|s| s.to_string()).collect();
        let d = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let first = select_symbol(&list, d).unwrap();
        let next = select_symbol(&list, d.succ_opt().unwrap()).unwrap();
        let wrapped = select_symbol(&list, d + chrono::Duration::days(3)).unwrap();
        assert_ne!(first, next);
        assert_eq!(first, wrapped);
        assert!(select_symbol(&[], d).is_err());
    }
}
