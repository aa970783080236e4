use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Environment variable error: {0}")]
    Env(#[from] std::env::VarError),

    #[error("Parse float error: {0}")]
    ParseFloat(#[from] std::num::ParseFloatError),

    #[error("Parse int error: {0}")]
    ParseInt(#[from] std::num::ParseIntError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("HTTP transport error: {0}")]
    Http(#[from] ethers::providers::HttpClientError),

    #[error("Serialization error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    #[error("RPC call {method} timed out after {timeout:?}")]
    Timeout { method: String, timeout: Duration },

    #[error("Stream closed: {0}")]
    StreamClosed(String),

    #[error("Cancelled")]
    Cancelled,

    #[error("Unknown asset: {0}")]
    UnknownAsset(String),

    #[error("Invalid price: {0}")]
    InvalidPrice(f64),

    #[error("Invalid amount: {0}")]
    InvalidAmount(f64),

    #[error("Tick {0} outside the supported range")]
    TickOutOfRange(i32),

    #[error("Invalid tick range: lower={lower} must be below upper={upper}")]
    InvalidTickRange { lower: i32, upper: i32 },

    #[error("Hex decode error: {0}")]
    HexDecode(String),

    #[error("{kind} order id={id} not found")]
    NotFound { kind: &'static str, id: u64 },

    #[error("Venue rejected {operation}: {message}")]
    Venue { operation: String, message: String },

    #[error("Other: {0}")]
    Other(String),
}
