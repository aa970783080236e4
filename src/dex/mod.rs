//! Venue integration: tick math, JSON-RPC requests and pool state.

pub mod calc;
pub mod client;
pub mod pools;
pub mod request;
pub mod state;

pub use client::{DexClient, HttpRpcClient, RpcClient, RpcResponse};
pub use pools::PoolRegistry;
pub use request::{RequestBuilder, RpcMethod, RpcRequest};
pub use state::{Pool, PoolFees, PoolHandle};
