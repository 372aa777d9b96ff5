// src/memory.rs
use crate::models::{
    Email, HistoryPoint, HistoryRecord, Stock, StockPatch, Symbol, User, UserId,
};
use crate::store::{CredentialStore, HistoryStore, StockCatalog, StoreResult, WatchlistStore};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tokio::sync::RwLock;

/// In-process store with the same single-record semantics as the Scylla tables.
#[derive(Default)]
pub struct MemoryStore {
    users: RwLock<HashMap<Email, User>>,
    watchlists: RwLock<HashMap<UserId, BTreeSet<Symbol>>>,
    stocks: RwLock<BTreeMap<Symbol, Stock>>,
    history: RwLock<HashMap<Symbol, HistoryRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn has_watchlist(&self, user: &UserId) -> bool {
        self.watchlists.read().await.contains_key(user)
    }

    pub async fn user_count(&self) -> usize {
        self.users.read().await.len()
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn find_user(&self, email: &Email) -> StoreResult<Option<User>> {
        Ok(self.users.read().await.get(email).cloned())
    }

    async fn insert_user(&self, user: &User) -> StoreResult<bool> {
        let mut users = self.users.write().await;
        if users.contains_key(&user.email) {
            return Ok(false);
        }
        users.insert(user.email.clone(), user.clone());
        Ok(true)
    }
}

#[async_trait]
impl StockCatalog for MemoryStore {
    async fn upsert_stock(&self, patch: &StockPatch) -> StoreResult<()> {
        let mut stocks = self.stocks.write().await;
        let existing = stocks.remove(&patch.symbol);
        stocks.insert(patch.symbol.clone(), patch.apply(existing));
        Ok(())
    }

    async fn list_stocks(&self) -> StoreResult<Vec<Stock>> {
        Ok(self.stocks.read().await.values().cloned().collect())
    }

    async fn get_stock(&self, symbol: &Symbol) -> StoreResult<Option<Stock>> {
        Ok(self.stocks.read().await.get(symbol).cloned())
    }

    fn source(&self) -> &'static str {
        "memory"
    }
}

#[async_trait]
impl HistoryStore for MemoryStore {
    async fn replace_history(
        &self,
        symbol: &Symbol,
        points: &[HistoryPoint],
        updated_at: i64,
    ) -> StoreResult<()> {
        self.history.write().await.insert(
            symbol.clone(),
            HistoryRecord {
                points: points.to_vec(),
                updated_at,
            },
        );
        Ok(())
    }

    async fn get_history(&self, symbol: &Symbol) -> StoreResult<Option<HistoryRecord>> {
        Ok(self.history.read().await.get(symbol).cloned())
    }

    async fn append_point(
        &self,
        symbol: &Symbol,
        point: &HistoryPoint,
        updated_at: i64,
    ) -> StoreResult<()> {
        let mut history = self.history.write().await;
        let record = history.entry(symbol.clone()).or_insert_with(|| HistoryRecord {
            points: Vec::new(),
            updated_at,
        });
        record.points.push(*point);
        record.updated_at = updated_at;
        Ok(())
    }
}

#[async_trait]
impl WatchlistStore for MemoryStore {
    async fn create_watchlist(&self, user: &UserId) -> StoreResult<()> {
        self.watchlists
            .write()
            .await
            .insert(user.clone(), BTreeSet::new());
        Ok(())
    }

    async fn watchlist(&self, user: &UserId) -> StoreResult<Vec<Symbol>> {
        Ok(self
            .watchlists
            .read()
            .await
            .get(user)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn watch(&self, user: &UserId, symbol: &Symbol) -> StoreResult<()> {
        self.watchlists
            .write()
            .await
            .entry(user.clone())
            .or_default()
            .insert(symbol.clone());
        Ok(())
    }

    async fn unwatch(&self, user: &UserId, symbol: &Symbol) -> StoreResult<()> {
        self.watchlists
            .write()
            .await
            .entry(user.clone())
            .or_default()
            .remove(symbol);
        Ok(())
    }
}
