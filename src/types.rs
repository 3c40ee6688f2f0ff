use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A `BASE/QUOTE` market such as `BTC/USD`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TradingPair {
    pub base: String,
    pub quote: String,
}

impl TradingPair {
    /// Key-safe form, `BTC-USD`.
    pub fn slug(&self) -> String {
        format!("{}-{}", self.base, self.quote)
    }
}

impl FromStr for TradingPair {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (base, quote) = s
            .trim()
            .split_once('/')
            .ok_or_else(|| format!("pair {s:?} is not of the form BASE/QUOTE"))?;
        let valid = |x: &str| !x.is_empty() && x.chars().all(|c| c.is_ascii_alphanumeric());
        if !valid(base) || !valid(quote) {
            return Err(format!("pair {s:?} has an empty or non-alphanumeric side"));
        }
        Ok(Self {
            base: base.to_ascii_uppercase(),
            quote: quote.to_ascii_uppercase(),
        })
    }
}

impl TryFrom<String> for TradingPair {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<TradingPair> for String {
    fn from(p: TradingPair) -> Self {
        p.to_string()
    }
}

impl fmt::Display for TradingPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: Decimal,
    pub size: Decimal,
}

impl PriceLevel {
    pub fn new(price: Decimal, size: Decimal) -> Self {
        Self { price, size }
    }
}

/// Why a set of levels could not form a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BookError {
    #[error("{side} level {index} has non-positive price {price}")]
    NonPositivePrice { side: &'static str, index: usize, price: Decimal },

    #[error("{side} level {index} has non-positive size {size}")]
    NonPositiveSize { side: &'static str, index: usize, size: Decimal },

    #[error("{side} prices out of order at level {index}: {prev} then {next}")]
    OutOfOrder { side: &'static str, index: usize, prev: Decimal, next: Decimal },

    #[error("crossed book: best bid {bid} >= best ask {ask}")]
    Crossed { bid: Decimal, ask: Decimal },
}

/// Point-in-time capture of one market's depth.
///
/// Bids are strictly descending, asks strictly ascending and the book is
/// never crossed. The only way to build one is [`OrderBookSnapshot::new`],
/// which enforces that.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderBookSnapshot {
    pair: TradingPair,
    captured_at: DateTime<Utc>,
    bids: Vec<PriceLevel>,
    asks: Vec<PriceLevel>,
}

impl OrderBookSnapshot {
    pub fn new(
        pair: TradingPair,
        captured_at: DateTime<Utc>,
        bids: Vec<PriceLevel>,
        asks: Vec<PriceLevel>,
    ) -> Result<Self, BookError> {
        check_side("bid", &bids, |prev, next| next < prev)?;
        check_side("ask", &asks, |prev, next| next > prev)?;
        if let (Some(bid), Some(ask)) = (bids.first(), asks.first()) {
            if bid.price >= ask.price {
                return Err(BookError::Crossed { bid: bid.price, ask: ask.price });
            }
        }
        Ok(Self { pair, captured_at, bids, asks })
    }

    pub fn pair(&self) -> &TradingPair {
        &self.pair
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    pub fn bids(&self) -> &[PriceLevel] {
        &self.bids
    }

    pub fn asks(&self) -> &[PriceLevel] {
        &self.asks
    }

    pub fn best_bid(&self) -> Option<&PriceLevel> {
        self.bids.first()
    }

    pub fn best_ask(&self) -> Option<&PriceLevel> {
        self.asks.first()
    }
}

// Re-validate on the way in so a stored object can't smuggle in a bad book.
impl<'de> Deserialize<'de> for OrderBookSnapshot {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Raw {
            pair: TradingPair,
            captured_at: DateTime<Utc>,
            bids: Vec<PriceLevel>,
            asks: Vec<PriceLevel>,
        }

        let raw = Raw::deserialize(deserializer)?;
        OrderBookSnapshot::new(raw.pair, raw.captured_at, raw.bids, raw.asks)
            .map_err(serde::de::Error::custom)
    }
}

fn check_side(
    side: &'static str,
    levels: &[PriceLevel],
    ordered: impl Fn(Decimal, Decimal) -> bool,
) -> Result<(), BookError> {
    for (index, lvl) in levels.iter().enumerate() {
        if lvl.price <= Decimal::ZERO {
            return Err(BookError::NonPositivePrice { side, index, price: lvl.price });
        }
        if lvl.size <= Decimal::ZERO {
            return Err(BookError::NonPositiveSize { side, index, size: lvl.size });
        }
    }
    for (i, w) in levels.windows(2).enumerate() {
        if !ordered(w[0].price, w[1].price) {
            return Err(BookError::OutOfOrder {
                side,
                index: i + 1,
                prev: w[0].price,
                next: w[1].price,
            });
        }
    }
    Ok(())
}
