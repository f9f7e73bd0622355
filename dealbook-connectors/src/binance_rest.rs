//! Binance Spot REST adapter for the `ExchangeGateway` port.
//!
//! Covers the endpoints the journal needs: server time, ticker price,
//! exchange filters, account balances, order placement/cancel, and
//! per-order trade fills.
//!
//! # Authentication
//!
//! Binance uses API key + secret with HMAC SHA256 signatures.
//! All signed requests require:
//! - `X-MBX-APIKEY` header
//! - `signature` query parameter (HMAC SHA256 of query string)
//! - `timestamp` query parameter
//!
//! Error bodies are mapped through `classify_exchange_error`, which
//! recognizes the common rejection codes and sanitizes everything else,
//! so no signature or key material ever leaves this module.

use chrono::{DateTime, TimeZone, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::timeout;

use async_trait::async_trait;
use dealbook_domain::{parse_decimal, OrderSide, Symbol, TradeFill};
use dealbook_exec::{
    classify_exchange_error, sanitize_message, ExchangeGateway, ExecError, ExecResult,
    LotSizeFilter, NotionalFilter, OrderAck, OrderKind, OrderRequest, PriceFilter, SymbolFilters,
};

// =============================================================================
// Constants
// =============================================================================

/// Binance Spot REST API base URL
const BINANCE_API_URL: &str = "https://api.binance.com";

/// Request timeout in seconds
const REQUEST_TIMEOUT_SECS: u64 = 10;

// =============================================================================
// Client
// =============================================================================

/// Binance Spot REST client implementing `ExchangeGateway`.
pub struct BinanceSpotClient {
    client: Client,
    api_key: String,
    api_secret: String,
    testnet: bool,
}

impl BinanceSpotClient {
    /// Create a client against production.
    pub fn new(api_key: String, api_secret: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            api_secret,
            testnet: false,
        }
    }

    /// Create a client against the spot testnet.
    pub fn testnet(api_key: String, api_secret: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            api_secret,
            testnet: true,
        }
    }

    fn base_url(&self) -> &str {
        if self.testnet {
            "https://testnet.binance.vision"
        } else {
            BINANCE_API_URL
        }
    }

    /// Build query string with signature for signed requests.
    ///
    /// Binance requires the HMAC SHA256 of the full query string, with
    /// `timestamp` included and `signature` appended last.
    fn build_signed_query(&self, mut params: Vec<(&str, String)>) -> ExecResult<String> {
        let timestamp = Utc::now().timestamp_millis().to_string();
        params.push(("timestamp", timestamp));
        params.sort_by(|a, b| a.0.cmp(b.0));

        let query_string: String = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");

        use hmac::{Hmac, Mac};
        use sha2::Sha256;

        type HmacSha256 = Hmac<Sha256>;

        let mut mac = HmacSha256::new_from_slice(self.api_secret.as_bytes()).map_err(|e| {
            ExecError::Upstream {
                code: None,
                message: format!("failed to build signature: {}", e),
            }
        })?;
        mac.update(query_string.as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());

        Ok(format!("{}&signature={}", query_string, signature))
    }

    async fn execute(&self, request: reqwest::RequestBuilder) -> ExecResult<String> {
        let response = timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS), request.send())
            .await
            .map_err(|_| ExecError::Upstream {
                code: None,
                message: "request timed out".to_string(),
            })?
            .map_err(|e| ExecError::Upstream {
                code: None,
                message: sanitize_message(&e.to_string()),
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| ExecError::Upstream {
            code: None,
            message: sanitize_message(&e.to_string()),
        })?;

        if !status.is_success() {
            if let Ok(err) = serde_json::from_str::<BinanceErrorResponse>(&body) {
                return Err(classify_exchange_error(err.code, &err.msg));
            }
            return Err(ExecError::Upstream {
                code: None,
                message: sanitize_message(&format!("HTTP {}: {}", status, body)),
            });
        }

        Ok(body)
    }

    async fn get_public(&self, endpoint: &str, params: Vec<(&str, String)>) -> ExecResult<String> {
        let url = if params.is_empty() {
            format!("{}{}", self.base_url(), endpoint)
        } else {
            let query = params
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join("&");
            format!("{}{}?{}", self.base_url(), endpoint, query)
        };
        self.execute(self.client.get(&url)).await
    }

    async fn get_signed(&self, endpoint: &str, params: Vec<(&str, String)>) -> ExecResult<String> {
        let query = self.build_signed_query(params)?;
        let url = format!("{}{}?{}", self.base_url(), endpoint, query);
        self.execute(self.client.get(&url).header("X-MBX-APIKEY", &self.api_key))
            .await
    }

    async fn post_signed(&self, endpoint: &str, params: Vec<(&str, String)>) -> ExecResult<String> {
        let query = self.build_signed_query(params)?;
        let url = format!("{}{}?{}", self.base_url(), endpoint, query);
        self.execute(self.client.post(&url).header("X-MBX-APIKEY", &self.api_key))
            .await
    }

    async fn delete_signed(
        &self,
        endpoint: &str,
        params: Vec<(&str, String)>,
    ) -> ExecResult<String> {
        let query = self.build_signed_query(params)?;
        let url = format!("{}{}?{}", self.base_url(), endpoint, query);
        self.execute(self.client.delete(&url).header("X-MBX-APIKEY", &self.api_key))
            .await
    }
}

fn parse_body<T: serde::de::DeserializeOwned>(body: &str) -> ExecResult<T> {
    serde_json::from_str(body).map_err(|e| ExecError::Upstream {
        code: None,
        message: format!("failed to parse response: {}", e),
    })
}

fn millis_to_utc(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_else(Utc::now)
}

// =============================================================================
// Gateway implementation
// =============================================================================

#[async_trait]
impl ExchangeGateway for BinanceSpotClient {
    async fn get_server_time(&self) -> ExecResult<DateTime<Utc>> {
        let body = self.get_public("/api/v3/time", vec![]).await?;
        let response: ServerTimeResponse = parse_body(&body)?;
        Ok(millis_to_utc(response.server_time))
    }

    async fn get_ticker_price(&self, symbol: &Symbol) -> ExecResult<Decimal> {
        let params = vec![("symbol", symbol.as_pair())];
        let body = self.get_public("/api/v3/ticker/price", params).await?;
        let response: PriceResponse = parse_body(&body)?;
        Ok(response.price)
    }

    async fn get_exchange_info(&self, symbol: &Symbol) -> ExecResult<SymbolFilters> {
        let params = vec![("symbol", symbol.as_pair())];
        let body = self.get_public("/api/v3/exchangeInfo", params).await?;
        let response: ExchangeInfoResponse = parse_body(&body)?;

        let info = response
            .symbols
            .into_iter()
            .find(|s| s.symbol == symbol.as_pair())
            .ok_or_else(|| ExecError::Upstream {
                code: None,
                message: format!("symbol {} not in exchangeInfo", symbol.as_pair()),
            })?;

        parse_symbol_filters(info)
    }

    async fn get_account_balances(&self) -> ExecResult<HashMap<String, Decimal>> {
        let body = self.get_signed("/api/v3/account", vec![]).await?;
        let response: AccountResponse = parse_body(&body)?;
        Ok(response
            .balances
            .into_iter()
            .map(|b| (b.asset, b.free))
            .collect())
    }

    async fn place_order(&self, order: &OrderRequest) -> ExecResult<OrderAck> {
        let side = match order.side {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        };

        let mut params = vec![
            ("symbol", order.symbol.as_pair()),
            ("side", side.to_string()),
        ];

        match order.kind {
            OrderKind::Limit { price } => {
                let qty = order.qty.ok_or_else(|| {
                    ExecError::InvalidOrder("LIMIT order requires a quantity".to_string())
                })?;
                params.push(("type", "LIMIT".to_string()));
                params.push(("timeInForce", "GTC".to_string()));
                params.push(("price", price.to_string()));
                params.push(("quantity", qty.to_string()));
            },
            OrderKind::Market => {
                params.push(("type", "MARKET".to_string()));
                match (order.qty, order.quote_qty) {
                    (Some(qty), None) => params.push(("quantity", qty.to_string())),
                    (None, Some(quote)) => params.push(("quoteOrderQty", quote.to_string())),
                    _ => {
                        return Err(ExecError::InvalidOrder(
                            "MARKET order requires exactly one of quantity or quoteOrderQty"
                                .to_string(),
                        ))
                    },
                }
            },
        }

        let body = self.post_signed("/api/v3/order", params).await?;
        let response: OrderResponse = parse_body(&body)?;

        tracing::info!(
            symbol = %order.symbol,
            order_id = response.order_id,
            status = %response.status,
            "order placed"
        );

        Ok(OrderAck {
            order_id: response.order_id,
            client_order_id: Some(response.client_order_id),
            transact_time: millis_to_utc(response.transact_time),
        })
    }

    async fn cancel_order(&self, symbol: &Symbol, order_id: i64) -> ExecResult<()> {
        let params = vec![
            ("symbol", symbol.as_pair()),
            ("orderId", order_id.to_string()),
        ];
        self.delete_signed("/api/v3/order", params).await?;
        tracing::info!(symbol = %symbol, order_id, "order cancelled");
        Ok(())
    }

    async fn get_fills_by_order_id(
        &self,
        symbol: &Symbol,
        order_id: i64,
    ) -> ExecResult<Vec<TradeFill>> {
        let params = vec![
            ("symbol", symbol.as_pair()),
            ("orderId", order_id.to_string()),
        ];
        let body = self.get_signed("/api/v3/myTrades", params).await?;
        let trades: Vec<MyTrade> = parse_body(&body)?;
        Ok(trades.into_iter().map(TradeFill::from).collect())
    }
}

// =============================================================================
// Wire types
// =============================================================================

/// Binance error response.
#[derive(Debug, Deserialize)]
struct BinanceErrorResponse {
    code: i64,
    msg: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerTimeResponse {
    server_time: i64,
}

#[derive(Debug, Deserialize)]
struct PriceResponse {
    #[allow(dead_code)]
    symbol: String,
    price: Decimal,
}

#[derive(Debug, Deserialize)]
struct ExchangeInfoResponse {
    symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SymbolInfo {
    symbol: String,
    base_asset: String,
    quote_asset: String,
    /// Filter objects, discriminated by their `filterType` field
    filters: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountResponse {
    balances: Vec<Balance>,
}

#[derive(Debug, Deserialize)]
struct Balance {
    asset: String,
    free: Decimal,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderResponse {
    order_id: i64,
    client_order_id: String,
    transact_time: i64,
    status: String,
}

/// One row of `GET /api/v3/myTrades`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MyTrade {
    id: i64,
    order_id: i64,
    price: Decimal,
    qty: Decimal,
    quote_qty: Decimal,
    commission: Decimal,
    commission_asset: String,
    time: i64,
    is_buyer: bool,
    is_maker: bool,
}

impl From<MyTrade> for TradeFill {
    fn from(t: MyTrade) -> Self {
        TradeFill {
            id: t.id,
            order_id: t.order_id,
            price: t.price,
            qty: t.qty,
            quote_qty: t.quote_qty,
            commission: t.commission,
            commission_asset: t.commission_asset,
            time: millis_to_utc(t.time),
            is_buyer: t.is_buyer,
            is_maker: t.is_maker,
        }
    }
}

fn decimal_field(value: &serde_json::Value, key: &str) -> ExecResult<Option<Decimal>> {
    match value.get(key).and_then(|v| v.as_str()) {
        Some(raw) => Ok(Some(parse_decimal(key, raw)?)),
        None => Ok(None),
    }
}

/// Extract the three filters the validator needs.
///
/// Binance reports the minimum notional as either `NOTIONAL` (current)
/// or `MIN_NOTIONAL` (legacy); both are accepted.
fn parse_symbol_filters(info: SymbolInfo) -> ExecResult<SymbolFilters> {
    let mut lot_size = None;
    let mut price = None;
    let mut notional = None;

    for filter in &info.filters {
        match filter.get("filterType").and_then(|t| t.as_str()) {
            Some("LOT_SIZE") => {
                lot_size = Some(LotSizeFilter {
                    min_qty: decimal_field(filter, "minQty")?.unwrap_or(Decimal::ZERO),
                    max_qty: decimal_field(filter, "maxQty")?.unwrap_or(Decimal::MAX),
                    step_size: decimal_field(filter, "stepSize")?.unwrap_or(Decimal::ZERO),
                });
            },
            Some("PRICE_FILTER") => {
                price = Some(PriceFilter {
                    min_price: decimal_field(filter, "minPrice")?.unwrap_or(Decimal::ZERO),
                    max_price: decimal_field(filter, "maxPrice")?.unwrap_or(Decimal::MAX),
                    tick_size: decimal_field(filter, "tickSize")?.unwrap_or(Decimal::ZERO),
                });
            },
            Some("NOTIONAL") | Some("MIN_NOTIONAL") => {
                notional = Some(NotionalFilter {
                    min_notional: decimal_field(filter, "minNotional")?.unwrap_or(Decimal::ZERO),
                });
            },
            _ => {},
        }
    }

    let missing = |name: &str| ExecError::Upstream {
        code: None,
        message: format!("exchangeInfo for {} is missing {}", info.symbol, name),
    };

    Ok(SymbolFilters {
        symbol: info.symbol.clone(),
        base_asset: info.base_asset,
        quote_asset: info.quote_asset,
        lot_size: lot_size.ok_or_else(|| missing("LOT_SIZE"))?,
        price: price.ok_or_else(|| missing("PRICE_FILTER"))?,
        notional: notional.ok_or_else(|| missing("NOTIONAL"))?,
    })
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_build_signed_query() {
        let client = BinanceSpotClient::new("test_key".to_string(), "test_secret".to_string());

        let params = vec![("symbol", "BTCUSDT".to_string())];
        let query = client.build_signed_query(params).unwrap();

        assert!(query.contains("timestamp="));
        assert!(query.contains("symbol=BTCUSDT"));
        // Signature is appended last
        assert!(query.rfind("signature=").unwrap() > query.rfind("symbol=").unwrap());
    }

    #[test]
    fn test_build_signed_query_sorts_params() {
        let client = BinanceSpotClient::new("test_key".to_string(), "test_secret".to_string());

        let params = vec![
            ("symbol", "BTCUSDT".to_string()),
            ("side", "SELL".to_string()),
        ];
        let query = client.build_signed_query(params).unwrap();

        let side_idx = query.find("side=").unwrap();
        let symbol_idx = query.find("symbol=").unwrap();
        assert!(side_idx < symbol_idx);
    }

    #[test]
    fn test_parse_exchange_info_filters() {
        let body = r#"{
            "symbols": [{
                "symbol": "BTCUSDT",
                "baseAsset": "BTC",
                "quoteAsset": "USDT",
                "filters": [
                    {"filterType": "PRICE_FILTER", "minPrice": "0.01000000", "maxPrice": "1000000.00000000", "tickSize": "0.01000000"},
                    {"filterType": "LOT_SIZE", "minQty": "0.00100000", "maxQty": "9000.00000000", "stepSize": "0.00100000"},
                    {"filterType": "NOTIONAL", "minNotional": "10.00000000", "applyMinToMarket": true},
                    {"filterType": "ICEBERG_PARTS", "limit": 10}
                ]
            }]
        }"#;
        let response: ExchangeInfoResponse = serde_json::from_str(body).unwrap();
        let filters = parse_symbol_filters(response.symbols.into_iter().next().unwrap()).unwrap();

        assert_eq!(filters.base_asset, "BTC");
        assert_eq!(filters.quote_asset, "USDT");
        assert_eq!(filters.lot_size.step_size, dec!(0.001));
        assert_eq!(filters.price.tick_size, dec!(0.01));
        assert_eq!(filters.notional.min_notional, dec!(10));
    }

    #[test]
    fn test_parse_legacy_min_notional_filter() {
        let body = r#"{
            "symbols": [{
                "symbol": "ETHUSDT",
                "baseAsset": "ETH",
                "quoteAsset": "USDT",
                "filters": [
                    {"filterType": "PRICE_FILTER", "minPrice": "0.01", "maxPrice": "100000", "tickSize": "0.01"},
                    {"filterType": "LOT_SIZE", "minQty": "0.0001", "maxQty": "9000", "stepSize": "0.0001"},
                    {"filterType": "MIN_NOTIONAL", "minNotional": "5.00"}
                ]
            }]
        }"#;
        let response: ExchangeInfoResponse = serde_json::from_str(body).unwrap();
        let filters = parse_symbol_filters(response.symbols.into_iter().next().unwrap()).unwrap();
        assert_eq!(filters.notional.min_notional, dec!(5));
    }

    #[test]
    fn test_parse_missing_filter_is_an_error() {
        let body = r#"{
            "symbols": [{
                "symbol": "XUSDT",
                "baseAsset": "X",
                "quoteAsset": "USDT",
                "filters": [
                    {"filterType": "LOT_SIZE", "minQty": "1", "maxQty": "100", "stepSize": "1"}
                ]
            }]
        }"#;
        let response: ExchangeInfoResponse = serde_json::from_str(body).unwrap();
        let err = parse_symbol_filters(response.symbols.into_iter().next().unwrap()).unwrap_err();
        assert!(err.to_string().contains("PRICE_FILTER"));
    }

    #[test]
    fn test_parse_malformed_filter_decimal_is_an_error() {
        let body = r#"{
            "symbols": [{
                "symbol": "BTCUSDT",
                "baseAsset": "BTC",
                "quoteAsset": "USDT",
                "filters": [
                    {"filterType": "PRICE_FILTER", "minPrice": "0.01", "maxPrice": "100000", "tickSize": "0.01"},
                    {"filterType": "LOT_SIZE", "minQty": "0.001", "maxQty": "9000", "stepSize": "not-a-number"},
                    {"filterType": "NOTIONAL", "minNotional": "10"}
                ]
            }]
        }"#;
        let response: ExchangeInfoResponse = serde_json::from_str(body).unwrap();
        let err = parse_symbol_filters(response.symbols.into_iter().next().unwrap()).unwrap_err();
        assert!(matches!(err, ExecError::Domain(_)));
        assert!(err.to_string().contains("stepSize"));
    }

    #[test]
    fn test_my_trade_maps_to_trade_fill() {
        let body = r#"[{
            "symbol": "BTCUSDT",
            "id": 28457,
            "orderId": 100234,
            "price": "4000.00000100",
            "qty": "12.00000000",
            "quoteQty": "48000.000012",
            "commission": "10.10000000",
            "commissionAsset": "BNB",
            "time": 1499865549590,
            "isBuyer": true,
            "isMaker": false,
            "isBestMatch": true
        }]"#;
        let trades: Vec<MyTrade> = serde_json::from_str(body).unwrap();
        let fill = TradeFill::from(trades.into_iter().next().unwrap());

        assert_eq!(fill.id, 28457);
        assert_eq!(fill.order_id, 100234);
        assert_eq!(fill.price, dec!(4000.000001));
        assert_eq!(fill.commission_asset, "BNB");
        assert!(fill.is_buyer);
        assert!(!fill.is_maker);
        assert_eq!(fill.time.timestamp_millis(), 1499865549590);
    }

    #[test]
    fn test_order_response_parses() {
        let body = r#"{
            "symbol": "BTCUSDT",
            "orderId": 28,
            "orderListId": -1,
            "clientOrderId": "6gCrw2kRUAF9CvJDGP16IP",
            "transactTime": 1507725176595,
            "price": "0.00000000",
            "origQty": "10.00000000",
            "executedQty": "10.00000000",
            "cummulativeQuoteQty": "10.00000000",
            "status": "FILLED",
            "timeInForce": "GTC",
            "type": "MARKET",
            "side": "SELL"
        }"#;
        let response: OrderResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.order_id, 28);
        assert_eq!(response.status, "FILLED");
    }
}
