// src/api.rs
use crate::auth::{self, TokenIssuer};
use crate::error::{handle_rejection, ApiError};
use crate::models::{
    sort_points, AuthBody, HistoryPoint, HistoryView, QuoteView, StockHistoryBody, StockPatch,
    StockUpsertBody, Symbol, UserId, WatchBody,
};
use crate::store::Store;
use chrono::Utc;
use log::info;
use percent_encoding::percent_decode_str;
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use warp::{Filter, Rejection, Reply};

pub fn routes(
    store: Arc<dyn Store>,
    tokens: Arc<TokenIssuer>,
) -> impl Filter<Extract = impl Reply, Error = Infallible> + Clone {
    let health = warp::path!("health").and(warp::get()).map(|| {
        warp::reply::json(&json!({ "status": "ok" }))
    });

    let register = warp::path!("auth" / "register")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_store(store.clone()))
        .and(with_tokens(tokens.clone()))
        .and_then(register_handler);

    let login = warp::path!("auth" / "login")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_store(store.clone()))
        .and(with_tokens(tokens.clone()))
        .and_then(login_handler);

    let seed = warp::path!("stocks" / "seed")
        .and(warp::post())
        .and(with_user(tokens.clone()))
        .and(warp::body::json())
        .and(with_store(store.clone()))
        .and_then(upsert_stock_handler);

    let list = warp::path!("stocks")
        .and(warp::get())
        .and(with_user(tokens.clone()))
        .and(with_store(store.clone()))
        .and_then(list_stocks_handler);

    let quote = warp::path!("stocks" / String / "quote")
        .and(warp::get())
        .and(with_user(tokens.clone()))
        .and(with_store(store.clone()))
        .and_then(quote_handler);

    let replace_history = warp::path!("stocks" / "history")
        .and(warp::post())
        .and(with_user(tokens.clone()))
        .and(warp::body::json())
        .and(with_store(store.clone()))
        .and_then(replace_history_handler);

    let get_history = warp::path!("stocks" / String / "history")
        .and(warp::get())
        .and(with_user(tokens.clone()))
        .and(with_store(store.clone()))
        .and_then(get_history_handler);

    let append_history = warp::path!("stocks" / String / "history" / "append")
        .and(warp::post())
        .and(with_user(tokens.clone()))
        .and(warp::body::json())
        .and(with_store(store.clone()))
        .and_then(append_point_handler);

    let get_watchlist = warp::path!("watchlist")
        .and(warp::get())
        .and(with_user(tokens.clone()))
        .and(with_store(store.clone()))
        .and_then(get_watchlist_handler);

    let add_watch = warp::path!("watchlist")
        .and(warp::post())
        .and(with_user(tokens.clone()))
        .and(warp::body::json())
        .and(with_store(store.clone()))
        .and_then(add_watch_handler);

    let remove_watch = warp::path!("watchlist" / String)
        .and(warp::delete())
        .and(with_user(tokens))
        .and(with_store(store))
        .and_then(remove_watch_handler);

    health
        .or(register)
        .or(login)
        .or(seed)
        .or(list)
        .or(quote)
        .or(replace_history)
        .or(get_history)
        .or(append_history)
        .or(get_watchlist)
        .or(add_watch)
        .or(remove_watch)
        .recover(handle_rejection)
}

fn with_store(
    store: Arc<dyn Store>,
) -> impl Filter<Extract = (Arc<dyn Store>,), Error = Infallible> + Clone {
    warp::any().map(move || store.clone())
}

fn with_tokens(
    tokens: Arc<TokenIssuer>,
) -> impl Filter<Extract = (Arc<TokenIssuer>,), Error = Infallible> + Clone {
    warp::any().map(move || tokens.clone())
}

/// Resolves the caller from the bearer token or rejects with 401.
fn with_user(
    tokens: Arc<TokenIssuer>,
) -> impl Filter<Extract = (UserId,), Error = Rejection> + Clone {
    warp::header::optional::<String>("authorization").and_then(move |header: Option<String>| {
        let tokens = tokens.clone();
        async move {
            tokens
                .authorize(header.as_deref())
                .map_err(|e| reject(ApiError::from(e)))
        }
    })
}

fn reject(e: ApiError) -> Rejection {
    warp::reject::custom(e)
}

/// Symbols taken from the URL arrive still percent-encoded.
fn path_symbol(raw: &str) -> Result<Symbol, Rejection> {
    let decoded = percent_decode_str(raw)
        .decode_utf8()
        .map_err(|_| reject(ApiError::InvalidInput("symbol must be valid UTF-8")))?;
    Symbol::parse(&decoded).map_err(reject)
}

fn now() -> i64 {
    Utc::now().timestamp()
}

async fn register_handler(
    body: AuthBody,
    store: Arc<dyn Store>,
    tokens: Arc<TokenIssuer>,
) -> Result<impl Reply, Rejection> {
    let uid = auth::register(store.as_ref(), &body.email, &body.password)
        .await
        .map_err(reject)?;
    let token = tokens.issue(&uid).map_err(reject)?;
    Ok(warp::reply::json(&json!({ "token": token })))
}

async fn login_handler(
    body: AuthBody,
    store: Arc<dyn Store>,
    tokens: Arc<TokenIssuer>,
) -> Result<impl Reply, Rejection> {
    let uid = auth::login(store.as_ref(), &body.email, &body.password)
        .await
        .map_err(reject)?;
    let token = tokens.issue(&uid).map_err(reject)?;
    Ok(warp::reply::json(&json!({ "token": token })))
}

async fn upsert_stock_handler(
    uid: UserId,
    body: StockUpsertBody,
    store: Arc<dyn Store>,
) -> Result<impl Reply, Rejection> {
    let symbol = Symbol::parse(&body.symbol).map_err(reject)?;
    let patch = StockPatch::new(symbol, body.name, body.price, body.currency, now());
    store
        .upsert_stock(&patch)
        .await
        .map_err(|e| reject(e.into()))?;
    info!("Stock {} upserted by {}.", patch.symbol, uid);
    Ok(warp::reply::json(
        &json!({ "ok": true, "symbol": patch.symbol }),
    ))
}

async fn list_stocks_handler(
    _uid: UserId,
    store: Arc<dyn Store>,
) -> Result<impl Reply, Rejection> {
    let items = store.list_stocks().await.map_err(|e| reject(e.into()))?;
    Ok(warp::reply::json(&json!({ "items": items })))
}

async fn quote_handler(
    symbol: String,
    _uid: UserId,
    store: Arc<dyn Store>,
) -> Result<impl Reply, Rejection> {
    let symbol = path_symbol(&symbol)?;
    let stock = store
        .get_stock(&symbol)
        .await
        .map_err(|e| reject(e.into()))?
        .ok_or_else(|| reject(ApiError::NotFound("symbol not found in DB")))?;
    Ok(warp::reply::json(&QuoteView::from_stock(
        stock,
        store.source(),
    )))
}

async fn replace_history_handler(
    uid: UserId,
    body: StockHistoryBody,
    store: Arc<dyn Store>,
) -> Result<impl Reply, Rejection> {
    let symbol = Symbol::parse(&body.symbol).map_err(reject)?;
    let mut points = body.points;
    sort_points(&mut points);
    store
        .replace_history(&symbol, &points, now())
        .await
        .map_err(|e| reject(e.into()))?;
    info!("Stored {} history points for {} by {}.", points.len(), symbol, uid);
    Ok(warp::reply::json(
        &json!({ "ok": true, "symbol": symbol, "count": points.len() }),
    ))
}

async fn get_history_handler(
    symbol: String,
    _uid: UserId,
    store: Arc<dyn Store>,
) -> Result<impl Reply, Rejection> {
    let symbol = path_symbol(&symbol)?;
    let record = store
        .get_history(&symbol)
        .await
        .map_err(|e| reject(e.into()))?;
    Ok(warp::reply::json(&HistoryView::new(symbol, record)))
}

async fn append_point_handler(
    symbol: String,
    uid: UserId,
    point: HistoryPoint,
    store: Arc<dyn Store>,
) -> Result<impl Reply, Rejection> {
    let symbol = path_symbol(&symbol)?;
    store
        .append_point(&symbol, &point, now())
        .await
        .map_err(|e| reject(e.into()))?;
    info!("Appended point ts={} to {} by {}.", point.ts, symbol, uid);
    Ok(warp::reply::json(&json!({ "ok": true, "symbol": symbol })))
}

async fn get_watchlist_handler(
    uid: UserId,
    store: Arc<dyn Store>,
) -> Result<impl Reply, Rejection> {
    let symbols = store.watchlist(&uid).await.map_err(|e| reject(e.into()))?;
    Ok(warp::reply::json(&json!({ "symbols": symbols })))
}

async fn add_watch_handler(
    uid: UserId,
    body: WatchBody,
    store: Arc<dyn Store>,
) -> Result<impl Reply, Rejection> {
    let symbol = Symbol::parse(&body.symbol).map_err(reject)?;
    store
        .watch(&uid, &symbol)
        .await
        .map_err(|e| reject(e.into()))?;
    info!("User {} now watches {}.", uid, symbol);
    Ok(warp::reply::json(&json!({ "ok": true, "symbol": symbol })))
}

async fn remove_watch_handler(
    symbol: String,
    uid: UserId,
    store: Arc<dyn Store>,
) -> Result<impl Reply, Rejection> {
    let symbol = path_symbol(&symbol)?;
    store
        .unwatch(&uid, &symbol)
        .await
        .map_err(|e| reject(e.into()))?;
    info!("User {} stopped watching {}.", uid, symbol);
    Ok(warp::reply::json(&json!({ "ok": true })))
}
