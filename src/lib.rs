//! Liquidity-provider client for a Chainflip-style AMM.
//!
//! The binary (`main.rs`) wires these modules together; strategies are
//! expected to drive the [`controller::OrderController`] from outside.

pub mod asset;
pub mod book;
pub mod config;
pub mod controller;
pub mod dex;
pub mod errors;
pub mod models;
pub mod prewitness;
pub mod stream;
pub mod tracker;
pub mod utils;
