// src/models.rs
use crate::error::ApiError;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub const DEFAULT_CURRENCY: &str = "USD";

/// Ticker symbol, always trimmed, uppercase and non-empty.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    pub fn parse(raw: &str) -> Result<Self, ApiError> {
        let symbol = raw.trim().to_uppercase();
        if symbol.is_empty() {
            return Err(ApiError::InvalidInput("symbol required"));
        }
        Ok(Symbol(symbol))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Login email, trimmed and lowercased. Emptiness is checked by the caller
/// together with the password.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Email(String);

impl Email {
    pub fn normalize(raw: &str) -> Self {
        Email(raw.trim().to_lowercase())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn generate() -> Self {
        UserId(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for UserId {
    fn from(id: String) -> Self {
        UserId(id)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone)]
pub struct User {
    pub id: UserId,
    pub email: Email,
    pub password_hash: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stock {
    pub symbol: Symbol,
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    pub currency: String,
    pub updated_at: i64,
}

/// Per-field update rule: leave the stored value alone, or overwrite it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Patch<T> {
    Keep,
    Set(T),
}

impl<T> From<Option<T>> for Patch<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Patch::Set(v),
            None => Patch::Keep,
        }
    }
}

/// Metadata upsert. `name`, `currency` and `updated_at` are always written;
/// `price` only when supplied.
#[derive(Debug, Clone, PartialEq)]
pub struct StockPatch {
    pub symbol: Symbol,
    pub name: Option<String>,
    pub price: Patch<f64>,
    pub currency: String,
    pub updated_at: i64,
}

impl StockPatch {
    // An omitted or empty currency resets to USD even if another currency was
    // stored before.
    pub fn new(
        symbol: Symbol,
        name: Option<String>,
        price: Option<f64>,
        currency: Option<String>,
        updated_at: i64,
    ) -> Self {
        let currency = currency
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| DEFAULT_CURRENCY.to_string());
        StockPatch {
            symbol,
            name,
            price: price.into(),
            currency,
            updated_at,
        }
    }

    pub fn apply(&self, existing: Option<Stock>) -> Stock {
        let price = match self.price {
            Patch::Set(p) => Some(p),
            Patch::Keep => existing.and_then(|s| s.price),
        };
        Stock {
            symbol: self.symbol.clone(),
            name: self.name.clone(),
            price,
            currency: self.currency.clone(),
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteView {
    pub symbol: Symbol,
    pub name: String,
    pub c: f64,
    pub currency: String,
    pub updated_at: i64,
    pub source: &'static str,
}

impl QuoteView {
    pub fn from_stock(stock: Stock, source: &'static str) -> Self {
        QuoteView {
            symbol: stock.symbol,
            name: stock.name.unwrap_or_default(),
            c: stock.price.unwrap_or(0.0),
            currency: if stock.currency.is_empty() {
                DEFAULT_CURRENCY.to_string()
            } else {
                stock.currency
            },
            updated_at: stock.updated_at,
            source,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    pub ts: i64,
    pub price: f64,
    pub volume: i64,
}

/// Stored history for one symbol, in whatever order it was written.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRecord {
    pub points: Vec<HistoryPoint>,
    pub updated_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryView {
    pub symbol: Symbol,
    pub points: Vec<HistoryPoint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
}

impl HistoryView {
    pub fn new(symbol: Symbol, record: Option<HistoryRecord>) -> Self {
        match record {
            Some(mut record) => {
                sort_points(&mut record.points);
                HistoryView {
                    symbol,
                    points: record.points,
                    updated_at: Some(record.updated_at),
                }
            }
            None => HistoryView {
                symbol,
                points: Vec::new(),
                updated_at: None,
            },
        }
    }
}

/// Stable ascending sort by timestamp; equal timestamps keep insertion order.
pub fn sort_points(points: &mut [HistoryPoint]) {
    points.sort_by_key(|p| p.ts);
}

// Request bodies

#[derive(Debug, Deserialize)]
pub struct AuthBody {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct WatchBody {
    pub symbol: String,
}

#[derive(Debug, Deserialize)]
pub struct StockUpsertBody {
    pub symbol: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub currency: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StockHistoryBody {
    pub symbol: String,
    pub points: Vec<HistoryPoint>,
}
