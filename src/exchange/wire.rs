use std::collections::BTreeMap;

use serde::de::Deserializer;
use serde::Deserialize;

fn vec_or_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    let opt = Option::<Vec<T>>::deserialize(deserializer)?;
    Ok(opt.unwrap_or_default())
}

fn map_or_empty<'de, D, T>(deserializer: D) -> Result<BTreeMap<String, T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    let opt = Option::<BTreeMap<String, T>>::deserialize(deserializer)?;
    Ok(opt.unwrap_or_default())
}

/// Envelope for every Kraken public REST response.
///
/// Failures come back as HTTP 200 with a non-empty `error` array, e.g.
/// `{"error":["EQuery:Unknown asset pair"]}`, and `result` may be missing.
#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct KrakenResponse<T> {
    #[serde(default, deserialize_with = "vec_or_empty")]
    pub error: Vec<String>,
    #[serde(default, deserialize_with = "map_or_empty")]
    pub result: BTreeMap<String, T>,
}

/// One book as returned by `/0/public/Depth`, keyed by Kraken's pair name.
#[derive(Debug, Deserialize)]
pub struct DepthBook {
    #[serde(default, deserialize_with = "vec_or_empty")]
    pub bids: Vec<Vec<serde_json::Value>>,
    #[serde(default, deserialize_with = "vec_or_empty")]
    pub asks: Vec<Vec<serde_json::Value>>,
}
