#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! EIP-155 (EVM) chain support for papaya subscription checkout.
//!
//! Implements [`papaya::chain::ChainClient`] on top of alloy providers: one
//! HTTP provider per configured chain, all sharing a single wallet. Balance
//! reads and gas figures go through plain `eth_call` / `eth_estimateGas`;
//! state-changing steps are simulated with `eth_call`, signed by the wallet
//! filler, and confirmed by polling for the receipt.
//!
//! # Modules
//!
//! - [`calls`] - ABI encoding of papaya calls and decoding of reads
//! - [`client`] - The [`Eip155ChainClient`] implementation
//! - [`contract`] - Solidity bindings for ERC-20 and the custody contract
//! - [`error`] - Client errors and their mapping onto [`papaya::chain::ChainError`]
//!
//! # Feature Flags
//!
//! - `telemetry` - Enables tracing instrumentation for RPC calls

pub mod calls;
pub mod client;
pub mod contract;
pub mod error;

mod networks;
pub use networks::*;

pub use client::{ChainEndpoint, Eip155ChainClient};
pub use error::Eip155ClientError;
