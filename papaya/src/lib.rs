#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Core types for papaya subscription checkout.
//!
//! This crate decides which on-chain steps a payer still needs before a
//! recurring subscription can start, and drives those steps through their
//! transaction lifecycle. It is chain-agnostic: reads, gas estimates and
//! submissions go through the [`chain::ChainClient`] trait, which chain
//! specific crates implement.
//!
//! # Overview
//!
//! A payer subscribes to a payee by depositing collateral into a custody
//! contract, which then streams a per-second rate to the payee. Before the
//! subscription can be created the custody balance must cover one full pay
//! cycle plus a safety buffer. Getting there may take an ERC-20 approval, a
//! deposit, or both.
//!
//! # Modules
//!
//! - [`amount`] - Decimal string to fixed-point conversion
//! - [`chain`] - Chain identifiers, contract calls and the chain client trait
//! - [`controller`] - Stateful orchestration of a checkout session
//! - [`cycle`] - Pay cycles and per-second rate calculation
//! - [`error`] - Error classification and user-facing messages
//! - [`fee`] - Network fee estimation with a cached fiat rate
//! - [`lifecycle`] - Per-step transaction state machines
//! - [`networks`] - Token and network registry
//! - [`readiness`] - On-chain snapshot evaluation
//! - [`terms`] - Subscription terms supplied by the payee
//! - [`view`] - Render projection consumed by the presentation layer
//!
//! # Feature Flags
//!
//! - `telemetry` - Enables tracing instrumentation for debugging and monitoring

pub mod amount;
pub mod chain;
pub mod controller;
pub mod cycle;
pub mod error;
pub mod fee;
pub mod lifecycle;
pub mod networks;
pub mod readiness;
pub mod terms;
pub mod view;
