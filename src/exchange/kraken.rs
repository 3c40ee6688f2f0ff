use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use rust_decimal::Decimal;

use super::wire::{DepthBook, KrakenResponse};
use super::OrderBookSource;
use crate::error::FetchError;
use crate::types::{OrderBookSnapshot, PriceLevel, TradingPair};

/// Read-only client for Kraken's public depth endpoint.
#[derive(Clone)]
pub struct KrakenClient {
    base_url: String,
    http: reqwest::Client,
}

impl KrakenClient {
    pub fn new(base_url: impl Into<String>, http: reqwest::Client) -> Self {
        Self {
            base_url: base_url.into(),
            http,
        }
    }
}

/// Kraken still names bitcoin and dogecoin by their legacy ISO-style codes.
pub fn kraken_symbol(pair: &TradingPair) -> String {
    let asset = |a: &str| match a {
        "BTC" => "XBT".to_string(),
        "DOGE" => "XDG".to_string(),
        other => other.to_string(),
    };
    format!("{}{}", asset(&pair.base), asset(&pair.quote))
}

#[async_trait]
impl OrderBookSource for KrakenClient {
    async fn fetch(&self, pair: &TradingPair, depth: usize) -> Result<OrderBookSnapshot, FetchError> {
        let symbol = kraken_symbol(pair);
        let url = format!("{}/0/public/Depth", self.base_url.trim_end_matches('/'));
        tracing::debug!(pair = %pair, symbol = %symbol, depth, "fetching depth");

        let resp = self
            .http
            .get(&url)
            .query(&[("pair", symbol.clone()), ("count", depth.to_string())])
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;
        let captured_at = Utc::now();

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(FetchError::RateLimited(format!("GET Depth status={status}")));
        }
        if status.is_server_error() {
            return Err(FetchError::Network(format!("GET Depth status={status}")));
        }
        if !status.is_success() {
            let snippet: String = body.chars().take(512).collect();
            return Err(FetchError::MalformedResponse(format!(
                "GET Depth non-200: status={status} body_snippet={snippet}"
            )));
        }

        let parsed: KrakenResponse<DepthBook> = serde_json::from_str(&body).map_err(|e| {
            let snippet: String = body.chars().take(512).collect();
            FetchError::MalformedResponse(format!("decode Depth json failed: {e} body_snippet={snippet}"))
        })?;

        let snap = into_snapshot(pair, &symbol, captured_at, parsed, depth)?;
        tracing::debug!(
            pair = %pair,
            bids = snap.bids().len(),
            asks = snap.asks().len(),
            "depth fetched"
        );
        Ok(snap)
    }
}

fn classify_api_errors(errors: &[String]) -> FetchError {
    let joined = errors.join("; ");
    let has = |needle: &str| errors.iter().any(|e| e.contains(needle));

    if has("Unknown asset pair") || has("Invalid arguments:pair") {
        FetchError::InvalidPair(joined)
    } else if has("Rate limit exceeded") || has("Too many requests") {
        FetchError::RateLimited(joined)
    } else if has("EService:Unavailable") || has("EService:Busy") {
        FetchError::Network(joined)
    } else {
        FetchError::MalformedResponse(joined)
    }
}

fn into_snapshot(
    pair: &TradingPair,
    symbol: &str,
    captured_at: DateTime<Utc>,
    resp: KrakenResponse<DepthBook>,
    depth: usize,
) -> Result<OrderBookSnapshot, FetchError> {
    if !resp.error.is_empty() {
        return Err(classify_api_errors(&resp.error));
    }

    let mut books = resp.result.into_values();
    let book = match (books.next(), books.next()) {
        (Some(b), None) => b,
        (None, _) => return Err(FetchError::InvalidPair(format!("no book returned for {symbol}"))),
        (Some(_), Some(_)) => {
            return Err(FetchError::MalformedResponse(format!(
                "expected one book for {symbol}, got several"
            )))
        }
    };

    let bids = parse_levels("bid", &book.bids, depth)?;
    let asks = parse_levels("ask", &book.asks, depth)?;
    Ok(OrderBookSnapshot::new(pair.clone(), captured_at, bids, asks)?)
}

fn parse_levels(
    side: &str,
    raw: &[Vec<serde_json::Value>],
    depth: usize,
) -> Result<Vec<PriceLevel>, FetchError> {
    raw.iter()
        .take(depth)
        .enumerate()
        .map(|(i, lvl)| {
            let price = lvl.first().and_then(parse_dec);
            let size = lvl.get(1).and_then(parse_dec);
            match (price, size) {
                (Some(price), Some(size)) => Ok(PriceLevel::new(price, size)),
                _ => Err(FetchError::MalformedResponse(format!(
                    "{side} level {i} is not [price, volume, ...]: {lvl:?}"
                ))),
            }
        })
        .collect()
}

fn parse_dec(v: &serde_json::Value) -> Option<Decimal> {
    let d = match v {
        serde_json::Value::String(s) => s.parse::<Decimal>().ok()?,
        serde_json::Value::Number(n) => n.to_string().parse::<Decimal>().ok()?,
        _ => return None,
    };
    Some(d.normalize())
}
