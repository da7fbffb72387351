//! REST API for the resolver.
//!
//! Every response carries `{success, ..., timestamp}`; failures are
//! `{success: false, error, details, timestamp}` with a matching HTTP
//! status.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use resolver_auction::{current_price, END_MULTIPLIER, START_MULTIPLIER};
use resolver_orderbook::OrderBookError;
use resolver_types::{now_secs, OrderFilter, OrderParams, OrderStatus};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::service::ResolverService;

type ApiResult = Result<Json<Value>, (StatusCode, Json<Value>)>;

pub fn router(service: Arc<ResolverService>) -> Router {
	Router::new()
		.route("/health", get(health))
		.route("/quote", post(quote))
		.route("/submit", post(submit_order))
		.route("/orders", get(list_orders))
		.route("/orders/{hash}", get(get_order).delete(cancel_order))
		.route("/auctions/{hash}", get(get_auction))
		.route("/stats", get(stats))
		.route("/pairs", get(list_pairs))
		.with_state(service)
		.layer(TraceLayer::new_for_http())
		.layer(CorsLayer::permissive())
}

pub async fn serve(service: Arc<ResolverService>) -> anyhow::Result<()> {
	let bind = format!(
		"{}:{}",
		service.config.api.host, service.config.api.port
	);
	let app = router(service);
	let listener = tokio::net::TcpListener::bind(&bind).await?;
	info!("resolver API listening on {}", bind);
	axum::serve(listener, app).await?;
	Ok(())
}

fn ok(mut body: Value) -> Json<Value> {
	let obj = body.as_object_mut().expect("response body is an object");
	obj.insert("success".into(), json!(true));
	obj.insert("timestamp".into(), json!(now_secs()));
	Json(body)
}

fn fail(status: StatusCode, error: &str, details: impl ToString) -> (StatusCode, Json<Value>) {
	(
		status,
		Json(json!({
			"success": false,
			"error": error,
			"details": details.to_string(),
			"timestamp": now_secs(),
		})),
	)
}

fn order_book_failure(err: OrderBookError) -> (StatusCode, Json<Value>) {
	match &err {
		OrderBookError::NotFound(_) => fail(StatusCode::NOT_FOUND, "ORDER_NOT_FOUND", err),
		OrderBookError::InvalidOrder(_) => fail(StatusCode::BAD_REQUEST, "INVALID_ORDER", err),
		OrderBookError::HashCollision(_) => fail(StatusCode::CONFLICT, "ORDER_EXISTS", err),
		OrderBookError::InvalidCancellation { .. } => {
			fail(StatusCode::CONFLICT, "CANCELLATION_REJECTED", err)
		}
	}
}

async fn health(State(service): State<Arc<ResolverService>>) -> Json<Value> {
	ok(json!({
		"status": "ok",
		"resolver": service.config.resolver.name,
		"uptime_secs": now_secs().saturating_sub(service.started_at),
	}))
}

#[derive(Debug, Deserialize)]
struct QuoteRequest {
	maker_asset: String,
	taker_asset: String,
	making_amount: String,
	taking_amount: String,
}

async fn quote(
	State(service): State<Arc<ResolverService>>,
	Json(request): Json<QuoteRequest>,
) -> ApiResult {
	for asset in [&request.maker_asset, &request.taker_asset] {
		if !service.registry.is_supported(asset) {
			return Err(fail(
				StatusCode::BAD_REQUEST,
				"ASSET_NOT_SUPPORTED",
				format!("asset not supported: {}", asset),
			));
		}
	}
	let making: f64 = request
		.making_amount
		.parse()
		.map_err(|_| fail(StatusCode::BAD_REQUEST, "INVALID_AMOUNT", "malformed making amount"))?;
	let taking: f64 = request
		.taking_amount
		.parse()
		.map_err(|_| fail(StatusCode::BAD_REQUEST, "INVALID_AMOUNT", "malformed taking amount"))?;
	if making <= 0.0 || taking <= 0.0 {
		return Err(fail(
			StatusCode::BAD_REQUEST,
			"INVALID_AMOUNT",
			"amounts must be positive",
		));
	}

	Ok(ok(json!({
		"maker_asset": request.maker_asset,
		"taker_asset": request.taker_asset,
		"opening_price": taking * START_MULTIPLIER,
		"reserve_price": taking * END_MULTIPLIER,
		"auction_duration_secs": service.config.auction.duration_secs,
	})))
}

async fn submit_order(
	State(service): State<Arc<ResolverService>>,
	Json(params): Json<OrderParams>,
) -> ApiResult {
	let order = service
		.orderbook
		.create_order(params)
		.map_err(order_book_failure)?;
	Ok(ok(json!({ "order": order })))
}

#[derive(Debug, Deserialize)]
struct OrdersQuery {
	status: Option<String>,
	maker: Option<String>,
}

async fn list_orders(
	State(service): State<Arc<ResolverService>>,
	Query(query): Query<OrdersQuery>,
) -> ApiResult {
	let status = match query.status {
		Some(raw) => Some(
			serde_json::from_value::<OrderStatus>(Value::String(raw.clone())).map_err(|_| {
				fail(
					StatusCode::BAD_REQUEST,
					"INVALID_STATUS",
					format!("unknown status: {}", raw),
				)
			})?,
		),
		None => None,
	};

	let orders = service.orderbook.list_orders(&OrderFilter {
		status,
		maker: query.maker,
	});
	Ok(ok(json!({ "count": orders.len(), "orders": orders })))
}

async fn get_order(
	State(service): State<Arc<ResolverService>>,
	Path(hash): Path<String>,
) -> ApiResult {
	let order = service
		.orderbook
		.get_order(&hash)
		.ok_or_else(|| fail(StatusCode::NOT_FOUND, "ORDER_NOT_FOUND", &hash))?;
	Ok(ok(json!({ "order": order })))
}

async fn cancel_order(
	State(service): State<Arc<ResolverService>>,
	Path(hash): Path<String>,
) -> ApiResult {
	let order = service
		.orderbook
		.cancel_order(&hash)
		.map_err(order_book_failure)?;
	Ok(ok(json!({ "order": order })))
}

async fn get_auction(
	State(service): State<Arc<ResolverService>>,
	Path(hash): Path<String>,
) -> ApiResult {
	let order = service
		.orderbook
		.get_order(&hash)
		.ok_or_else(|| fail(StatusCode::NOT_FOUND, "ORDER_NOT_FOUND", &hash))?;

	let now = now_secs();
	Ok(ok(json!({
		"order_hash": order.hash,
		"status": order.status,
		"current_price": current_price(&order, now),
		"reserve_price": order.reserve_price,
		"auction_start_time": order.auction_start_time,
		"auction_end_time": order.auction_end_time,
		"seconds_remaining": order.auction_end_time.saturating_sub(now),
		"bids": service.engine.bids_for(&order.hash),
	})))
}

async fn stats(State(service): State<Arc<ResolverService>>) -> Json<Value> {
	let reserved: std::collections::HashMap<String, String> = service
		.liquidity
		.ledger()
		.totals()
		.into_iter()
		.map(|(asset, amount)| (asset, amount.to_string()))
		.collect();

	ok(json!({
		"resolver": service.config.resolver.name,
		"uptime_secs": now_secs().saturating_sub(service.started_at),
		"orders": service.orderbook.counts_by_status(),
		"reserved": reserved,
		"pairs": service.settlement.counts_by_status(),
	}))
}

async fn list_pairs(State(service): State<Arc<ResolverService>>) -> Json<Value> {
	let pairs = service.settlement.list_pairs();
	ok(json!({ "count": pairs.len(), "pairs": pairs }))
}

#[cfg(test)]
mod tests {
	use super::*;
	use axum::body::Body;
	use axum::http::Request;
	use resolver_config::Config;
	use tower::ServiceExt;

	fn test_config() -> Config {
		toml::from_str::<Config>(
			r#"
[resolver]
name = "resolver-test"
ethereum_address = "0xresolver"
stellar_address = "GRESOLVER"

[api]
port = 0

[[chains]]
network = "ethereum"
chain_id = 11155111

[[chains]]
network = "stellar"
chain_id = 1001

[[assets]]
address = "0xeth"
symbol = "ETH"
decimals = 18
network = "ethereum"
is_native = true
min_threshold = "0.5"
warning_threshold = "1.0"

[[assets]]
address = "xlm-native"
symbol = "XLM"
decimals = 7
network = "stellar"
is_native = true
min_threshold = "100"
warning_threshold = "500"
"#,
		)
		.unwrap()
	}

	fn test_router() -> Router {
		let service = Arc::new(ResolverService::build(test_config()).unwrap());
		router(service)
	}

	async fn body_json(response: axum::response::Response) -> Value {
		let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
			.await
			.unwrap();
		serde_json::from_slice(&bytes).unwrap()
	}

	#[tokio::test]
	async fn health_reports_the_resolver() {
		let app = test_router();
		let response = app
			.oneshot(Request::get("/health").body(Body::empty()).unwrap())
			.await
			.unwrap();
		assert_eq!(response.status(), StatusCode::OK);

		let body = body_json(response).await;
		assert_eq!(body["success"], true);
		assert_eq!(body["resolver"], "resolver-test");
		assert!(body["timestamp"].is_number());
	}

	#[tokio::test]
	async fn quote_prices_the_auction_window() {
		let app = test_router();
		let request = Request::post("/quote")
			.header("content-type", "application/json")
			.body(Body::from(
				json!({
					"maker_asset": "ETH",
					"taker_asset": "XLM",
					"making_amount": "10",
					"taking_amount": "20",
				})
				.to_string(),
			))
			.unwrap();
		let response = app.oneshot(request).await.unwrap();
		assert_eq!(response.status(), StatusCode::OK);

		let body = body_json(response).await;
		assert_eq!(body["opening_price"], 21.0);
		assert_eq!(body["reserve_price"], 19.0);
	}

	#[tokio::test]
	async fn quote_rejects_unknown_assets() {
		let app = test_router();
		let request = Request::post("/quote")
			.header("content-type", "application/json")
			.body(Body::from(
				json!({
					"maker_asset": "DOGE",
					"taker_asset": "XLM",
					"making_amount": "10",
					"taking_amount": "20",
				})
				.to_string(),
			))
			.unwrap();
		let response = app.oneshot(request).await.unwrap();
		assert_eq!(response.status(), StatusCode::BAD_REQUEST);

		let body = body_json(response).await;
		assert_eq!(body["success"], false);
		assert_eq!(body["error"], "ASSET_NOT_SUPPORTED");
	}

	#[tokio::test]
	async fn submit_then_fetch_and_cancel() {
		let service = Arc::new(ResolverService::build(test_config()).unwrap());

		let submit = Request::post("/submit")
			.header("content-type", "application/json")
			.body(Body::from(
				json!({
					"maker": "0xmaker",
					"receiver": "GRECEIVER",
					"maker_asset": "ETH",
					"taker_asset": "XLM",
					"making_amount": "1.5",
					"taking_amount": "3000",
					"src_chain_id": 11155111,
					"dst_chain_id": 1001,
					"timelock": now_secs() + 3600,
				})
				.to_string(),
			))
			.unwrap();
		let response = router(service.clone()).oneshot(submit).await.unwrap();
		assert_eq!(response.status(), StatusCode::OK);
		let body = body_json(response).await;
		let hash = body["order"]["hash"].as_str().unwrap().to_string();
		assert_eq!(body["order"]["status"], "pending");

		let response = router(service.clone())
			.oneshot(
				Request::get(format!("/orders/{}", hash))
					.body(Body::empty())
					.unwrap(),
			)
			.await
			.unwrap();
		assert_eq!(response.status(), StatusCode::OK);

		let response = router(service.clone())
			.oneshot(
				Request::delete(format!("/orders/{}", hash))
					.body(Body::empty())
					.unwrap(),
			)
			.await
			.unwrap();
		assert_eq!(response.status(), StatusCode::OK);
		let body = body_json(response).await;
		assert_eq!(body["order"]["status"], "cancelled");

		let response = router(service)
			.oneshot(Request::get("/orders/0xmissing").body(Body::empty()).unwrap())
			.await
			.unwrap();
		assert_eq!(response.status(), StatusCode::NOT_FOUND);
	}

	#[tokio::test]
	async fn auction_view_exposes_the_descending_price() {
		let service = Arc::new(ResolverService::build(test_config()).unwrap());
		let order = service
			.orderbook
			.create_order(OrderParams {
				maker: "0xmaker".into(),
				receiver: "GRECEIVER".into(),
				maker_asset: "ETH".into(),
				taker_asset: "XLM".into(),
				making_amount: "10".into(),
				taking_amount: "20".into(),
				src_chain_id: 11155111,
				dst_chain_id: 1001,
				timelock: now_secs() + 3600,
			})
			.unwrap();

		let response = router(service)
			.oneshot(
				Request::get(format!("/auctions/{}", order.hash))
					.body(Body::empty())
					.unwrap(),
			)
			.await
			.unwrap();
		assert_eq!(response.status(), StatusCode::OK);
		let body = body_json(response).await;

		// Fresh auction: price sits at the opening multiplier.
		let price = body["current_price"].as_f64().unwrap();
		assert!(price <= 21.0 + 1e-9 && price >= 19.0 - 1e-9);
		assert_eq!(body["reserve_price"], 19.0);
		assert_eq!(body["bids"].as_array().unwrap().len(), 0);
	}

	#[tokio::test]
	async fn stats_and_pairs_start_empty() {
		let app = test_router();
		let response = app
			.oneshot(Request::get("/stats").body(Body::empty()).unwrap())
			.await
			.unwrap();
		let body = body_json(response).await;
		assert_eq!(body["success"], true);
		assert_eq!(body["pairs"], json!({}));

		let app = test_router();
		let response = app
			.oneshot(Request::get("/pairs").body(Body::empty()).unwrap())
			.await
			.unwrap();
		let body = body_json(response).await;
		assert_eq!(body["count"], 0);
	}
}
