//! JSON-RPC transport and the typed venue facade built on top of it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ethers::providers::{Http, HttpClientError, JsonRpcClient};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::asset::Asset;
use crate::dex::request::{
    Endpoint, RequestBuilder, RpcRequest, SetLimitOrderParams, SetRangeOrderParams,
    UpdateLimitOrderParams, UpdateRangeOrderParams,
};
use crate::errors::{AppError, Result};
use crate::models::VenueVersion;

/// Business-level error object carried by an otherwise successful response.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RpcError {
    #[serde(default)]
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct RpcResponse {
    pub result: Value,
    pub error: Option<RpcError>,
}

impl RpcResponse {
    pub fn ok(result: Value) -> Self {
        Self {
            result,
            error: None,
        }
    }

    pub fn err(code: i64, message: impl Into<String>) -> Self {
        Self {
            result: Value::Null,
            error: Some(RpcError {
                code,
                message: message.into(),
            }),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// The result, or [`AppError::Venue`] when the venue reported an error.
    pub fn into_result(self, operation: &str) -> Result<Value> {
        match self.error {
            Some(e) => Err(AppError::Venue {
                operation: operation.to_string(),
                message: e.message,
            }),
            None => Ok(self.result),
        }
    }
}

/// Anything that can execute a venue JSON-RPC request.
///
/// `Err` means the request never produced a response (transport failure);
/// venue-side failures come back as `Ok` with [`RpcResponse::error`] set.
#[async_trait]
pub trait RpcClient: Send + Sync {
    async fn call(&self, request: &RpcRequest) -> Result<RpcResponse>;
}

/// HTTP client routing `cf_*` calls to the node and `lp_*` calls to the LP API.
#[derive(Debug, Clone)]
pub struct HttpRpcClient {
    node: Http,
    lp: Http,
}

impl HttpRpcClient {
    pub fn new(node_url: &str, lp_url: &str) -> Result<Self> {
        Ok(Self {
            node: Http::new(Url::parse(node_url)?),
            lp: Http::new(Url::parse(lp_url)?),
        })
    }

    fn transport(&self, endpoint: Endpoint) -> &Http {
        match endpoint {
            Endpoint::Node => &self.node,
            Endpoint::LiquidityProvider => &self.lp,
        }
    }
}

#[async_trait]
impl RpcClient for HttpRpcClient {
    async fn call(&self, request: &RpcRequest) -> Result<RpcResponse> {
        let transport = self.transport(request.method.endpoint());
        let outcome: std::result::Result<Value, HttpClientError> = transport
            .request(request.method.as_str(), request.params.clone())
            .await;
        match outcome {
            Ok(result) => Ok(RpcResponse::ok(result)),
            Err(HttpClientError::JsonRpcError(e)) => Ok(RpcResponse::err(e.code, e.message)),
            Err(e) => Err(e.into()),
        }
    }
}

/// Typed access to the venue for one LP account.
#[derive(Clone)]
pub struct DexClient {
    rpc: Arc<dyn RpcClient>,
    builder: RequestBuilder,
    timeout: Duration,
    account: String,
}

impl DexClient {
    pub fn new(
        rpc: Arc<dyn RpcClient>,
        version: VenueVersion,
        account: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            rpc,
            builder: RequestBuilder::new(version),
            timeout,
            account: account.into(),
        }
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    pub fn version(&self) -> VenueVersion {
        self.builder.version()
    }

    pub fn builder(&self) -> &RequestBuilder {
        &self.builder
    }

    /// Execute a request under the configured deadline.
    pub async fn call(&self, request: RpcRequest) -> Result<RpcResponse> {
        let method = request.method.as_str();
        debug!(method, params = %request.params, "[RPC] request");
        match tokio::time::timeout(self.timeout, self.rpc.call(&request)).await {
            Ok(response) => response,
            Err(_) => Err(AppError::Timeout {
                method: method.to_string(),
                timeout: self.timeout,
            }),
        }
    }

    async fn query(&self, request: RpcRequest) -> Result<Value> {
        let method = request.method.as_str();
        self.call(request).await?.into_result(method)
    }

    pub async fn account_info(&self) -> Result<Value> {
        self.query(self.builder.account_info(&self.account)).await
    }

    pub async fn pool_info(&self, base: Asset, quote: Asset) -> Result<Value> {
        self.query(self.builder.pool_info(base, quote)).await
    }

    pub async fn pool_depth(&self, base: Asset, quote: Asset, ticks: (i32, i32)) -> Result<Value> {
        self.query(self.builder.pool_depth(base, quote, ticks)).await
    }

    pub async fn pool_liquidity(&self, base: Asset, quote: Asset) -> Result<Value> {
        self.query(self.builder.pool_liquidity(base, quote)).await
    }

    /// Full order snapshot for a pool, across all LPs.
    pub async fn pool_orders(&self, base: Asset, quote: Asset) -> Result<Value> {
        self.query(self.builder.pool_orders(base, quote, None)).await
    }

    pub async fn pool_range_liquidity_value(
        &self,
        base: Asset,
        quote: Asset,
        ticks: (i32, i32),
        liquidity: u128,
    ) -> Result<Value> {
        let request = self
            .builder
            .pool_range_orders_liquidity_value(base, quote, ticks, liquidity);
        self.query(request).await
    }

    pub async fn required_ratio_for_range_order(
        &self,
        base: Asset,
        quote: Asset,
        ticks: (i32, i32),
    ) -> Result<Value> {
        let request = self.builder.required_ratio_for_range_order(base, quote, ticks);
        self.query(request).await
    }

    pub async fn asset_balances(&self) -> Result<Value> {
        self.query(self.builder.asset_balances()).await
    }

    pub async fn set_limit_order(&self, params: &SetLimitOrderParams) -> Result<RpcResponse> {
        self.call(self.builder.set_limit_order(params)).await
    }

    pub async fn update_limit_order(&self, params: &UpdateLimitOrderParams) -> Result<RpcResponse> {
        self.call(self.builder.update_limit_order(params)).await
    }

    pub async fn set_range_order(&self, params: &SetRangeOrderParams) -> Result<RpcResponse> {
        self.call(self.builder.set_range_order(params)).await
    }

    pub async fn update_range_order(&self, params: &UpdateRangeOrderParams) -> Result<RpcResponse> {
        self.call(self.builder.update_range_order(params)).await
    }
}
