use crate::domain::EngineError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Crypto,
    Stocks,
    Etf,
    Indices,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Crypto,
        Category::Stocks,
        Category::Etf,
        Category::Indices,
    ];

    pub fn id(self) -> &'static str {
        match self {
            Category::Crypto => "crypto",
            Category::Stocks => "stocks",
            Category::Etf => "etf",
            Category::Indices => "indices",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Category::Crypto => "Cryptocurrencies",
            Category::Stocks => "Stocks",
            Category::Etf => "ETF",
            Category::Indices => "Indices",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Category {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "crypto" => Ok(Category::Crypto),
            "stocks" => Ok(Category::Stocks),
            "etf" => Ok(Category::Etf),
            "indices" => Ok(Category::Indices),
            other => Err(EngineError::InvalidInput(format!(
                "unknown category: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AssetMeta {
    pub symbol: &'static str,
    pub name: &'static str,
    pub category: Category,
    pub base_price: f64,
}

const fn asset(
    symbol: &'static str,
    name: &'static str,
    category: Category,
    base_price: f64,
) -> AssetMeta {
    AssetMeta {
        symbol,
        name,
        category,
        base_price,
    }
}

static ASSETS: [AssetMeta; 18] = [
    asset("BTC", "Bitcoin", Category::Crypto, 43_000.0),
    asset("ETH", "Ethereum", Category::Crypto, 2_300.0),
    asset("SOL", "Solana", Category::Crypto, 95.0),
    asset("AAPL", "Apple", Category::Stocks, 175.0),
    asset("GOOGL", "Google", Category::Stocks, 140.0),
    asset("MSFT", "Microsoft", Category::Stocks, 370.0),
    asset("AMZN", "Amazon", Category::Stocks, 150.0),
    asset("TSLA", "Tesla", Category::Stocks, 240.0),
    asset("META", "Meta", Category::Stocks, 330.0),
    asset("NVDA", "Nvidia", Category::Stocks, 470.0),
    asset("SPY", "SPDR S&P 500 ETF", Category::Etf, 450.0),
    asset("QQQ", "Invesco QQQ Trust", Category::Etf, 380.0),
    asset("VTI", "Vanguard Total Stock Market", Category::Etf, 220.0),
    asset("IWDA", "iShares MSCI World", Category::Etf, 78.0),
    asset("SPX", "S&P 500", Category::Indices, 4_500.0),
    asset("MSCIWORLD", "MSCI World", Category::Indices, 3_200.0),
    asset("DJI", "Dow Jones Industrial", Category::Indices, 35_000.0),
    asset("IXIC", "NASDAQ Composite", Category::Indices, 14_000.0),
];

pub fn asset_meta(symbol: &str) -> Option<&'static AssetMeta> {
    ASSETS.iter().find(|a| a.symbol == symbol)
}

/// Symbols outside the catalogue are treated as stocks.
pub fn category_of(symbol: &str) -> Category {
    asset_meta(symbol)
        .map(|a| a.category)
        .unwrap_or(Category::Stocks)
}

pub fn watchlist(category: Option<Category>) -> Vec<&'static str> {
    ASSETS
        .iter()
        .filter(|a| category.map_or(true, |c| a.category == c))
        .map(|a| a.symbol)
        .collect()
}

/// Deterministic daily rotation through `symbols`.
pub fn pick_for_date<S: AsRef<str>>(symbols: &[S], date: chrono::NaiveDate) -> Option<&str> {
    use chrono::Datelike;
    if symbols.is_empty() {
        return None;
    }
    let day = usize::try_from(date.num_days_from_ce()).unwrap_or(0);
    Some(symbols[day % symbols.len()].as_ref())
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryListing {
    pub id: &'static str,
    pub name: &'static str,
    pub symbols: Vec<SymbolListing>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SymbolListing {
    pub symbol: &'static str,
    pub name: &'static str,
}

pub fn categories() -> Vec<CategoryListing> {
    Category::ALL
        .iter()
        .map(|&category| CategoryListing {
            id: category.id(),
            name: category.display_name(),
            symbols: ASSETS
                .iter()
                .filter(|a| a.category == category)
                .map(|a| SymbolListing {
                    symbol: a.symbol,
                    name: a.name,
                })
                .collect(),
        })
        .collect()
}

pub const MAX_SYMBOL_LEN: usize = 10;

/// Uppercases and validates a user-supplied symbol before any market call.
pub fn normalize_symbol(raw: &str) -> Result<String, EngineError> {
    let symbol = raw.trim().to_ascii_uppercase();
    if symbol.is_empty() {
        return Err(EngineError::InvalidInput("symbol is required".to_string()));
    }
    if symbol.len() > MAX_SYMBOL_LEN {
        return Err(EngineError::InvalidInput(format!(
            "symbol must be at most {MAX_SYMBOL_LEN} characters (got {})",
            symbol.len()
        )));
    }
    if !symbol.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(EngineError::InvalidInput(format!(
            "symbol must be alphanumeric: {raw:?}"
        )));
    }
    Ok(symbol)
}
