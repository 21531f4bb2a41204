//! Vide-Grenier Kamer Core - Domain types and marketplace analytics.
//!
//! This crate is shared by every Vide-Grenier Kamer component:
//! - `marketplace` - JSON API and chat server
//! - `cli` - Command-line tools for migrations and scheduled jobs
//!
//! # Architecture
//!
//! The core crate contains only types and pure computations - no I/O, no
//! database access, no HTTP clients. Callers load rows, hand plain values to
//! the analytics, and persist the results themselves.
//!
//! # Modules
//!
//! - [`types`] - Type-safe IDs, money, contact details, vocabularies and lifecycles
//! - [`recommend`] - Collaborative, content-based and trending recommendations
//! - [`stock`] - Stock health, demand forecasting and reorder planning
//! - [`commission`] - Platform commission and seller payouts
//! - [`finance`] - Wallet ledger, escrow terms and installment schedules

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod commission;
pub mod finance;
pub mod recommend;
pub mod stock;
pub mod types;

pub use types::*;
