// src/store.rs
use crate::error::StoreError;
use crate::models::{
    Email, HistoryPoint, HistoryRecord, Stock, StockPatch, Symbol, User, UserId,
};
use async_trait::async_trait;

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait CredentialStore {
    async fn find_user(&self, email: &Email) -> StoreResult<Option<User>>;

    /// Inserts the user unless the email is taken. Returns `false` on conflict.
    async fn insert_user(&self, user: &User) -> StoreResult<bool>;
}

#[async_trait]
pub trait StockCatalog {
    async fn upsert_stock(&self, patch: &StockPatch) -> StoreResult<()>;

    /// All stocks ordered by symbol.
    async fn list_stocks(&self) -> StoreResult<Vec<Stock>>;

    async fn get_stock(&self, symbol: &Symbol) -> StoreResult<Option<Stock>>;

    /// Tag reported in quotes.
    fn source(&self) -> &'static str;
}

#[async_trait]
pub trait HistoryStore {
    /// Overwrites the stored points. Callers pass them already sorted.
    async fn replace_history(
        &self,
        symbol: &Symbol,
        points: &[HistoryPoint],
        updated_at: i64,
    ) -> StoreResult<()>;

    /// Points come back in stored order.
    async fn get_history(&self, symbol: &Symbol) -> StoreResult<Option<HistoryRecord>>;

    async fn append_point(
        &self,
        symbol: &Symbol,
        point: &HistoryPoint,
        updated_at: i64,
    ) -> StoreResult<()>;
}

#[async_trait]
pub trait WatchlistStore {
    async fn create_watchlist(&self, user: &UserId) -> StoreResult<()>;

    /// Empty when the user has no watchlist yet.
    async fn watchlist(&self, user: &UserId) -> StoreResult<Vec<Symbol>>;

    async fn watch(&self, user: &UserId, symbol: &Symbol) -> StoreResult<()>;

    async fn unwatch(&self, user: &UserId, symbol: &Symbol) -> StoreResult<()>;
}

pub trait Store:
    CredentialStore + StockCatalog + HistoryStore + WatchlistStore + Send + Sync
{
}

impl<T> Store for T where
    T: CredentialStore + StockCatalog + HistoryStore + WatchlistStore + Send + Sync
{
}
