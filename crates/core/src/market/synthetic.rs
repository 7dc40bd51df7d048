use crate::domain::asset::asset_meta;
use crate::domain::snapshot::{DataSource, Indicators, Quote};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Deterministic stand-in for the live provider. Output depends on the symbol only,
/// so repeated calls for one symbol agree with each other.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyntheticMarketData;

impl SyntheticMarketData {
    pub fn base_price(symbol: &str) -> f64 {
        match asset_meta(symbol) {
            Some(meta) => meta.base_price,
            None => symbol_rng(symbol, BASE_PRICE_STREAM).gen_range(100.0..200.0),
        }
    }

    pub fn quote(symbol: &str) -> Quote {
        let base = Self::base_price(symbol);
        let mut rng = symbol_rng(symbol, QUOTE_STREAM);

        let change = base * rng.gen_range(-0.025..0.025);
        let volume = rng.gen_range(1_000_000..11_000_000);
        let open = base * (1.0 + rng.gen_range(-0.005..0.005));
        let high = base + change.abs() + base * rng.gen::<f64>() * 0.01;
        let low = base - change.abs() - base * rng.gen::<f64>() * 0.01;

        Quote {
            symbol: symbol.to_string(),
            price: base + change,
            change,
            change_percent: change / base * 100.0,
            volume,
            previous_close: Some(base),
            open: Some(open),
            high: Some(high),
            low: Some(low),
            source: DataSource::Synthetic,
        }
    }

    pub fn indicators(symbol: &str) -> Indicators {
        let base = Self::base_price(symbol);
        let mut rng = symbol_rng(symbol, INDICATOR_STREAM);

        Indicators {
            rsi: Some(rng.gen_range(30.0..70.0)),
            sma20: Some(base * (1.0 + rng.gen_range(-0.03..0.03))),
            sma50: Some(base * (0.99 + rng.gen_range(-0.03..0.03))),
            macd: Some(rng.gen_range(-2.5..2.5)),
        }
    }
}

const QUOTE_STREAM: u64 = 0;
const INDICATOR_STREAM: u64 = 1;
const BASE_PRICE_STREAM: u64 = 2;

/// ChaCha8 stream keyed by the symbol bytes. ChaCha output is stable across `rand`
/// releases, so the same symbol yields the same demo data everywhere.
fn symbol_rng(symbol: &str, stream: u64) -> ChaCha8Rng {
    let mut seed = [0u8; 32];
    for (i, byte) in symbol.bytes().enumerate() {
        seed[i % seed.len()] ^= byte.rotate_left((i / seed.len()) as u32);
    }
    let mut rng = ChaCha8Rng::from_seed(seed);
    rng.set_stream(stream);
    rng
}
