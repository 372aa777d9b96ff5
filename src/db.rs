// src/db.rs
use crate::error::StoreError;
use crate::models::{
    Email, HistoryPoint, HistoryRecord, Patch, Stock, StockPatch, Symbol, User, UserId,
};
use crate::store::{CredentialStore, HistoryStore, StockCatalog, StoreResult, WatchlistStore};
use async_trait::async_trait;
use log::info;
use scylla::frame::response::result::{CqlValue, Row};
use scylla::{Session, SessionBuilder};

pub async fn connect(uri: &str) -> Result<Session, StoreError> {
    let session = SessionBuilder::new()
        .known_node(uri)
        .build()
        .await
        .map_err(StoreError::database)?;
    info!("Connected to ScyllaDB at {}.", uri);
    Ok(session)
}

/// Statements bound to one keyspace. The keyspace name is validated by the
/// config loader before it reaches here.
struct Statements {
    find_user: String,
    insert_user: String,
    create_watchlist: String,
    get_watchlist: String,
    watch: String,
    unwatch: String,
    upsert_stock: String,
    upsert_stock_with_price: String,
    list_stocks: String,
    get_stock: String,
    replace_history: String,
    get_history: String,
    append_point: String,
}

impl Statements {
    fn new(ks: &str) -> Self {
        Statements {
            find_user: format!(
                "SELECT user_id, email, password_hash, created_at FROM {}.users WHERE email = ?",
                ks
            ),
            insert_user: format!(
                "INSERT INTO {}.users (email, user_id, password_hash, created_at) VALUES (?, ?, ?, ?) IF NOT EXISTS",
                ks
            ),
            create_watchlist: format!(
                "INSERT INTO {}.watchlists (user_id, symbols) VALUES (?, ?)",
                ks
            ),
            get_watchlist: format!("SELECT symbols FROM {}.watchlists WHERE user_id = ?", ks),
            watch: format!(
                "UPDATE {}.watchlists SET symbols = symbols + ? WHERE user_id = ?",
                ks
            ),
            unwatch: format!(
                "UPDATE {}.watchlists SET symbols = symbols - ? WHERE user_id = ?",
                ks
            ),
            upsert_stock: format!(
                "UPDATE {}.stocks SET name = ?, currency = ?, updated_at = ? WHERE symbol = ?",
                ks
            ),
            upsert_stock_with_price: format!(
                "UPDATE {}.stocks SET name = ?, currency = ?, updated_at = ?, price = ? WHERE symbol = ?",
                ks
            ),
            list_stocks: format!(
                "SELECT symbol, name, price, currency, updated_at FROM {}.stocks",
                ks
            ),
            get_stock: format!(
                "SELECT symbol, name, price, currency, updated_at FROM {}.stocks WHERE symbol = ?",
                ks
            ),
            replace_history: format!(
                "INSERT INTO {}.stock_history (symbol, points, updated_at) VALUES (?, ?, ?)",
                ks
            ),
            get_history: format!(
                "SELECT points, updated_at FROM {}.stock_history WHERE symbol = ?",
                ks
            ),
            append_point: format!(
                "UPDATE {}.stock_history SET points = points + ?, updated_at = ? WHERE symbol = ?",
                ks
            ),
        }
    }
}

pub struct ScyllaStore {
    session: Session,
    keyspace: String,
    stmts: Statements,
}

impl ScyllaStore {
    pub fn new(session: Session, keyspace: &str) -> Self {
        ScyllaStore {
            session,
            keyspace: keyspace.to_string(),
            stmts: Statements::new(keyspace),
        }
    }

    /// Creates the keyspace and tables if they don't exist.
    pub async fn init_schema(&self) -> Result<(), StoreError> {
        let keyspace = self.keyspace.as_str();
        let schema = [
            format!("CREATE KEYSPACE IF NOT EXISTS {} WITH REPLICATION = {{'class': 'SimpleStrategy', 'replication_factor': 1}}", keyspace),
            format!("CREATE TABLE IF NOT EXISTS {}.users (email TEXT PRIMARY KEY, user_id TEXT, password_hash TEXT, created_at BIGINT)", keyspace),
            format!("CREATE TABLE IF NOT EXISTS {}.watchlists (user_id TEXT PRIMARY KEY, symbols SET<TEXT>)", keyspace),
            format!("CREATE TABLE IF NOT EXISTS {}.stocks (symbol TEXT PRIMARY KEY, name TEXT, price DOUBLE, currency TEXT, updated_at BIGINT)", keyspace),
            format!("CREATE TABLE IF NOT EXISTS {}.stock_history (symbol TEXT PRIMARY KEY, points LIST<TEXT>, updated_at BIGINT)", keyspace),
        ];
        for statement in schema.iter() {
            self.session
                .query(statement.as_str(), ())
                .await
                .map_err(StoreError::database)?;
        }
        info!("Schema ready in keyspace {}.", keyspace);
        Ok(())
    }
}

fn rows(rows: Option<Vec<Row>>) -> Vec<Row> {
    rows.unwrap_or_default()
}

fn text(row: &Row, idx: usize) -> Option<String> {
    match row.columns.get(idx) {
        Some(Some(CqlValue::Text(s))) | Some(Some(CqlValue::Ascii(s))) => Some(s.clone()),
        _ => None,
    }
}

fn bigint(row: &Row, idx: usize) -> Option<i64> {
    match row.columns.get(idx) {
        Some(Some(CqlValue::BigInt(v))) => Some(*v),
        _ => None,
    }
}

fn double(row: &Row, idx: usize) -> Option<f64> {
    match row.columns.get(idx) {
        Some(Some(CqlValue::Double(v))) => Some(*v),
        _ => None,
    }
}

/// Elements of a list or set column. Empty collections read back as null.
fn text_items(row: &Row, idx: usize) -> Vec<String> {
    match row.columns.get(idx) {
        Some(Some(CqlValue::List(items))) | Some(Some(CqlValue::Set(items))) => items
            .iter()
            .filter_map(|v| match v {
                CqlValue::Text(s) | CqlValue::Ascii(s) => Some(s.clone()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn required<T>(value: Option<T>, column: &str) -> Result<T, StoreError> {
    value.ok_or_else(|| StoreError::Corrupt(format!("missing column {}", column)))
}

fn stock_from_row(row: &Row) -> Result<Stock, StoreError> {
    let symbol = Symbol::parse(&required(text(row, 0), "symbol")?)
        .map_err(|e| StoreError::Corrupt(e.to_string()))?;
    Ok(Stock {
        symbol,
        name: text(row, 1),
        price: double(row, 2),
        currency: text(row, 3).unwrap_or_default(),
        updated_at: bigint(row, 4).unwrap_or_default(),
    })
}

/// Reads the `[applied]` flag a lightweight transaction answers with.
fn applied_from_rows(rows: &[Row]) -> Result<bool, StoreError> {
    let applied = rows.first().and_then(|row| match row.columns.first() {
        Some(Some(CqlValue::Boolean(b))) => Some(*b),
        _ => None,
    });
    required(applied, "[applied]")
}

fn history_from_row(row: &Row) -> Result<HistoryRecord, StoreError> {
    let points = text_items(row, 0)
        .iter()
        .map(|raw| decode_point(raw))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(HistoryRecord {
        points,
        updated_at: bigint(row, 1).unwrap_or_default(),
    })
}

fn encode_point(point: &HistoryPoint) -> Result<String, StoreError> {
    serde_json::to_string(point).map_err(|e| StoreError::Corrupt(e.to_string()))
}

fn decode_point(raw: &str) -> Result<HistoryPoint, StoreError> {
    serde_json::from_str(raw).map_err(|e| StoreError::Corrupt(e.to_string()))
}

#[async_trait]
impl CredentialStore for ScyllaStore {
    async fn find_user(&self, email: &Email) -> StoreResult<Option<User>> {
        let result = self
            .session
            .query(self.stmts.find_user.as_str(), (email.as_str(),))
            .await
            .map_err(StoreError::database)?;
        match rows(result.rows).first() {
            Some(row) => Ok(Some(User {
                id: UserId::from(required(text(row, 0), "user_id")?),
                email: Email::normalize(&required(text(row, 1), "email")?),
                password_hash: required(text(row, 2), "password_hash")?,
                created_at: bigint(row, 3).unwrap_or_default(),
            })),
            None => Ok(None),
        }
    }

    async fn insert_user(&self, user: &User) -> StoreResult<bool> {
        let result = self
            .session
            .query(
                self.stmts.insert_user.as_str(),
                (
                    user.email.as_str(),
                    user.id.as_str(),
                    user.password_hash.as_str(),
                    user.created_at,
                ),
            )
            .await
            .map_err(StoreError::database)?;
        applied_from_rows(&rows(result.rows))
    }
}

#[async_trait]
impl StockCatalog for ScyllaStore {
    async fn upsert_stock(&self, patch: &StockPatch) -> StoreResult<()> {
        let name = patch.name.as_deref();
        let currency = patch.currency.as_str();
        let symbol = patch.symbol.as_str();
        let outcome = match patch.price {
            Patch::Set(price) => {
                self.session
                    .query(
                        self.stmts.upsert_stock_with_price.as_str(),
                        (name, currency, patch.updated_at, price, symbol),
                    )
                    .await
            }
            Patch::Keep => {
                self.session
                    .query(
                        self.stmts.upsert_stock.as_str(),
                        (name, currency, patch.updated_at, symbol),
                    )
                    .await
            }
        };
        outcome.map_err(StoreError::database)?;
        Ok(())
    }

    async fn list_stocks(&self) -> StoreResult<Vec<Stock>> {
        let result = self
            .session
            .query(self.stmts.list_stocks.as_str(), ())
            .await
            .map_err(StoreError::database)?;
        let mut stocks = rows(result.rows)
            .iter()
            .map(stock_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        // Partitions come back in token order.
        stocks.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        info!("Fetched {} stocks.", stocks.len());
        Ok(stocks)
    }

    async fn get_stock(&self, symbol: &Symbol) -> StoreResult<Option<Stock>> {
        let result = self
            .session
            .query(self.stmts.get_stock.as_str(), (symbol.as_str(),))
            .await
            .map_err(StoreError::database)?;
        rows(result.rows).first().map(stock_from_row).transpose()
    }

    fn source(&self) -> &'static str {
        "scylladb"
    }
}

#[async_trait]
impl HistoryStore for ScyllaStore {
    async fn replace_history(
        &self,
        symbol: &Symbol,
        points: &[HistoryPoint],
        updated_at: i64,
    ) -> StoreResult<()> {
        let encoded = points
            .iter()
            .map(encode_point)
            .collect::<Result<Vec<_>, _>>()?;
        self.session
            .query(
                self.stmts.replace_history.as_str(),
                (symbol.as_str(), encoded, updated_at),
            )
            .await
            .map_err(StoreError::database)?;
        Ok(())
    }

    async fn get_history(&self, symbol: &Symbol) -> StoreResult<Option<HistoryRecord>> {
        let result = self
            .session
            .query(self.stmts.get_history.as_str(), (symbol.as_str(),))
            .await
            .map_err(StoreError::database)?;
        match rows(result.rows).first() {
            Some(row) => {
                let record = history_from_row(row)?;
                info!("Fetched {} history points for {}.", record.points.len(), symbol);
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    async fn append_point(
        &self,
        symbol: &Symbol,
        point: &HistoryPoint,
        updated_at: i64,
    ) -> StoreResult<()> {
        self.session
            .query(
                self.stmts.append_point.as_str(),
                (vec![encode_point(point)?], updated_at, symbol.as_str()),
            )
            .await
            .map_err(StoreError::database)?;
        Ok(())
    }
}

#[async_trait]
impl WatchlistStore for ScyllaStore {
    async fn create_watchlist(&self, user: &UserId) -> StoreResult<()> {
        self.session
            .query(
                self.stmts.create_watchlist.as_str(),
                (user.as_str(), Vec::<String>::new()),
            )
            .await
            .map_err(StoreError::database)?;
        Ok(())
    }

    async fn watchlist(&self, user: &UserId) -> StoreResult<Vec<Symbol>> {
        let result = self
            .session
            .query(self.stmts.get_watchlist.as_str(), (user.as_str(),))
            .await
            .map_err(StoreError::database)?;
        match rows(result.rows).first() {
            Some(row) => text_items(row, 0)
                .iter()
                .map(|s| Symbol::parse(s).map_err(|e| StoreError::Corrupt(e.to_string())))
                .collect(),
            None => Ok(Vec::new()),
        }
    }

    async fn watch(&self, user: &UserId, symbol: &Symbol) -> StoreResult<()> {
        self.session
            .query(
                self.stmts.watch.as_str(),
                (vec![symbol.to_string()], user.as_str()),
            )
            .await
            .map_err(StoreError::database)?;
        Ok(())
    }

    async fn unwatch(&self, user: &UserId, symbol: &Symbol) -> StoreResult<()> {
        self.session
            .query(
                self.stmts.unwatch.as_str(),
                (vec![symbol.to_string()], user.as_str()),
            )
            .await
            .map_err(StoreError::database)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(columns: Vec<Option<CqlValue>>) -> Row {
        Row { columns }
    }

    fn text_value(s: &str) -> Option<CqlValue> {
        Some(CqlValue::Text(s.to_string()))
    }

    #[test]
    fn stock_row_with_null_name_and_price() {
        let stock = stock_from_row(&row(vec![
            text_value("MSFT"),
            None,
            None,
            text_value("USD"),
            Some(CqlValue::BigInt(1_700_000_000)),
        ]))
        .unwrap();
        assert_eq!(stock.symbol.as_str(), "MSFT");
        assert_eq!(stock.name, None);
        assert_eq!(stock.price, None);
        assert_eq!(stock.currency, "USD");
        assert_eq!(stock.updated_at, 1_700_000_000);
    }

    #[test]
    fn stock_row_with_all_columns() {
        let stock = stock_from_row(&row(vec![
            text_value("NVDA"),
            text_value("Nvidia"),
            Some(CqlValue::Double(912.25)),
            text_value("USD"),
            Some(CqlValue::BigInt(5)),
        ]))
        .unwrap();
        assert_eq!(stock.name.as_deref(), Some("Nvidia"));
        assert_eq!(stock.price, Some(912.25));
    }

    #[test]
    fn stock_row_without_symbol_is_corrupt() {
        let err = stock_from_row(&row(vec![None, None, None, None, None])).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt(_)));

        let blank = stock_from_row(&row(vec![text_value("  "), None, None, None, None]));
        assert!(matches!(blank, Err(StoreError::Corrupt(_))));
    }

    #[test]
    fn null_points_column_reads_as_empty_history() {
        let record = history_from_row(&row(vec![None, Some(CqlValue::BigInt(9))])).unwrap();
        assert!(record.points.is_empty());
        assert_eq!(record.updated_at, 9);
    }

    #[test]
    fn history_points_decode_in_stored_order() {
        let record = history_from_row(&row(vec![
            Some(CqlValue::List(vec![
                CqlValue::Text(r#"{"ts":3,"price":1.5,"volume":10}"#.to_string()),
                CqlValue::Text(r#"{"ts":1,"price":1.0,"volume":20}"#.to_string()),
            ])),
            Some(CqlValue::BigInt(2)),
        ]))
        .unwrap();
        let ts: Vec<i64> = record.points.iter().map(|p| p.ts).collect();
        assert_eq!(ts, vec![3, 1]);
        assert_eq!(record.points[0].price, 1.5);
        assert_eq!(record.points[1].volume, 20);
    }

    #[test]
    fn malformed_history_point_is_corrupt() {
        let err = history_from_row(&row(vec![
            Some(CqlValue::List(vec![CqlValue::Text("{\"ts\":".to_string())])),
            None,
        ]))
        .unwrap_err();
        assert!(matches!(err, StoreError::Corrupt(_)));
    }

    #[test]
    fn point_encoding_survives_storage_format() {
        let point = HistoryPoint {
            ts: 1_700_000_000,
            price: 101.25,
            volume: 42,
        };
        assert_eq!(decode_point(&encode_point(&point).unwrap()).unwrap(), point);
    }

    #[test]
    fn set_and_list_columns_yield_text_items() {
        let set = row(vec![Some(CqlValue::Set(vec![
            CqlValue::Text("AAPL".to_string()),
            CqlValue::Text("NKE".to_string()),
        ]))]);
        assert_eq!(text_items(&set, 0), vec!["AAPL", "NKE"]);

        let list = row(vec![Some(CqlValue::List(vec![CqlValue::Ascii("X".to_string())]))]);
        assert_eq!(text_items(&list, 0), vec!["X"]);

        assert!(text_items(&row(vec![None]), 0).is_empty());
        assert!(text_items(&row(vec![]), 0).is_empty());
    }

    #[test]
    fn applied_flag_reports_insert_outcome() {
        let applied = vec![row(vec![Some(CqlValue::Boolean(true))])];
        assert!(applied_from_rows(&applied).unwrap());

        // A refused insert also returns the existing row's columns.
        let refused = vec![row(vec![
            Some(CqlValue::Boolean(false)),
            text_value("bob@example.com"),
        ])];
        assert!(!applied_from_rows(&refused).unwrap());
    }

    #[test]
    fn missing_applied_flag_is_corrupt() {
        assert!(matches!(applied_from_rows(&[]), Err(StoreError::Corrupt(_))));
        assert!(matches!(
            applied_from_rows(&[row(vec![])]),
            Err(StoreError::Corrupt(_))
        ));
        assert!(matches!(
            applied_from_rows(&[row(vec![text_value("yes")])]),
            Err(StoreError::Corrupt(_))
        ));
    }
}
