//! Dashboard Example
//!
//! Serves dashboard card data through a cardgate gateway with axum.
//!
//! Cards shown:
//! - `clock`: current server time, never cached
//! - `quote`: slow upstream (800ms), cached for a minute and coalesced
//! - `btc-price`, `eth-price`: single resources of the batched `prices` source
//! - `portfolio`: several `prices` resources in one card
//!
//! Run:
//!   cargo run -p cardgate-demos --example dashboard
//!
//! Endpoints:
//!   - http://localhost:3000/api/cards            - Card list
//!   - http://localhost:3000/api/cards/{card_id}  - Card data
//!   - http://localhost:3000/health               - Health check
//!
//! Try it:
//!   curl -v http://localhost:3000/api/cards/quote        # Slow, then cached
//!   curl -v http://localhost:3000/api/cards/portfolio    # One batch call for three coins
//!   curl -v http://localhost:3000/api/cards/missing      # 404 CARD_NOT_FOUND
//!
//! Fire a burst to see coalescing and the price rate limit:
//!   for i in $(seq 20); do curl -s http://localhost:3000/api/cards/btc-price & done

use std::collections::HashMap;
use std::error::Error;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use cardgate::{
    BatchFn, BatchResponse, Card, CardData, CardFn, DataPolicy, Gateway, GatewayError, ResourceId,
    UpstreamError, UpstreamResult,
};
use serde::Serialize;
use serde_json::{Value, json};

const CONFIG: &str = r#"
sources:
  prices:
    cache_ttl: 30s
    batch: true
    batch_window: 25ms
    rate_limit:
      window: 1m
      max_requests: 10
      fallback: cache
  quotes:
    cache_ttl: 1m
"#;

const QUOTES: &[(&str, &str)] = &[
    ("Talk is cheap. Show me the code.", "Linus Torvalds"),
    ("Simplicity is the soul of efficiency.", "Austin Freeman"),
    ("Stay hungry, stay foolish.", "Steve Jobs"),
    ("It always seems impossible until it's done.", "Nelson Mandela"),
];

// Dashboard

struct DashboardCard {
    title: &'static str,
    card: Arc<dyn Card<Value>>,
}

#[derive(Clone)]
struct AppState {
    gateway: Gateway<Value>,
    cards: Arc<Vec<DashboardCard>>,
}

impl AppState {
    fn card(&self, id: &str) -> Option<&DashboardCard> {
        self.cards.iter().find(|entry| entry.card.id().as_str() == id)
    }
}

fn dashboard_card<F, Fut>(title: &'static str, id: &str, policy: DataPolicy, fetch: F) -> DashboardCard
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = UpstreamResult<Value>> + Send + 'static,
{
    DashboardCard {
        title,
        card: Arc::new(CardFn::new(id, fetch).with_policy(policy)),
    }
}

fn price_policy(coins: &[&str]) -> DataPolicy {
    DataPolicy::builder()
        .source("prices")
        .resource_ids(coins.iter().copied())
        .build()
}

fn cards() -> Vec<DashboardCard> {
    let quote_calls = Arc::new(AtomicU64::new(0));

    vec![
        dashboard_card("Clock", "clock", DataPolicy::default(), || async {
            let now = chrono::Utc::now();
            Ok::<_, UpstreamError>(json!({
                "time": now.format("%H:%M:%S").to_string(),
                "date": now.format("%A, %B %-d, %Y").to_string(),
                "timezone": "UTC",
            }))
        }),
        dashboard_card(
            "Quote of the moment",
            "quote",
            DataPolicy::builder().source("quotes").build(),
            move || {
                let calls = Arc::clone(&quote_calls);
                async move {
                    tokio::time::sleep(Duration::from_millis(800)).await;
                    let n = calls.fetch_add(1, Ordering::Relaxed) as usize;
                    let (content, author) = QUOTES[n % QUOTES.len()];
                    Ok::<_, UpstreamError>(json!({ "content": content, "author": author }))
                }
            },
        ),
        dashboard_card("BTC Price", "btc-price", price_policy(&["btc"]), unbatched),
        dashboard_card("ETH Price", "eth-price", price_policy(&["eth"]), unbatched),
        dashboard_card(
            "Portfolio",
            "portfolio",
            price_policy(&["btc", "eth", "sol"]),
            unbatched,
        ),
    ]
}

/// Batched cards are served by the `prices` fetcher.
async fn unbatched() -> UpstreamResult<Value> {
    Err("price cards are served by the batch fetcher".into())
}

/// Simulated market feed: one call quotes every requested coin.
async fn fetch_prices(coins: Vec<ResourceId>) -> UpstreamResult<BatchResponse<Value>> {
    tracing::info!(?coins, "Calling price feed");
    tokio::time::sleep(Duration::from_millis(150)).await;

    let base: HashMap<&str, f64> = [("btc", 67_000.0), ("eth", 3_400.0), ("sol", 150.0)].into();
    let drift = (chrono::Utc::now().timestamp() % 100) as f64 / 1_000.0;

    Ok(coins
        .into_iter()
        .filter_map(|coin| {
            let price = base.get(coin.as_str())? * (1.0 + drift);
            let quote = json!({ "symbol": coin.as_str().to_uppercase(), "price": price });
            Some((coin, quote))
        })
        .collect())
}

// Responses

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CardSummary {
    id: String,
    title: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CardDataResponse {
    card_id: String,
    data: CardData<Value>,
    timestamp: i64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorResponse {
    error: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    card_id: Option<String>,
}

fn error_status(error: &GatewayError) -> StatusCode {
    match error {
        GatewayError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        GatewayError::NoDataForResource { .. } => StatusCode::NOT_FOUND,
        _ => StatusCode::BAD_GATEWAY,
    }
}

// Handlers

async fn list_cards(State(state): State<AppState>) -> Json<Value> {
    let cards: Vec<_> = state
        .cards
        .iter()
        .map(|entry| CardSummary {
            id: entry.card.id().to_string(),
            title: entry.title,
        })
        .collect();
    Json(json!({ "cards": cards }))
}

async fn get_card(State(state): State<AppState>, Path(card_id): Path<String>) -> Response {
    let Some(entry) = state.card(&card_id) else {
        let body = ErrorResponse {
            error: "CARD_NOT_FOUND",
            message: format!("Card with id '{card_id}' not found"),
            card_id: None,
        };
        return (StatusCode::NOT_FOUND, Json(body)).into_response();
    };

    match state.gateway.fetch_card_data(Arc::clone(&entry.card)).await {
        Ok(data) => Json(CardDataResponse {
            card_id,
            data,
            timestamp: chrono::Utc::now().timestamp_millis(),
        })
        .into_response(),
        Err(error) => {
            tracing::error!(%card_id, %error, "Failed to fetch card data");
            let body = ErrorResponse {
                error: "FETCH_ERROR",
                message: error.to_string(),
                card_id: Some(card_id),
            };
            (error_status(&error), Json(body)).into_response()
        }
    }
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "timestamp": chrono::Utc::now().timestamp_millis() }))
}

// Main

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let subscriber = tracing_subscriber::fmt()
        .pretty()
        .with_env_filter("info,cardgate=debug")
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = cardgate_configuration::from_yaml(CONFIG)?;
    let gateway = Gateway::<Value>::builder()
        .config(config)
        .batch_fetcher("prices", BatchFn::new(fetch_prices))
        .build();

    let state = AppState {
        gateway,
        cards: Arc::new(cards()),
    };

    let app = Router::new()
        .route("/api/cards", get(list_cards))
        .route("/api/cards/{card_id}", get(get_card))
        .route("/health", get(health))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
    tracing::info!("Listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
