//! tickwatch: watchlist-driven live market data collector
//!
//! This library provides the core components for:
//! - Market session phase classification
//! - Phase-aware screening into a bounded watchlist
//! - Historical backfill for symbols entering the watchlist
//! - One supervised live poller per watchlisted symbol
//! - Bar storage in memory or Parquet
//! - Logging and Prometheus metrics

pub mod backfill;
pub mod bar;
pub mod cli;
pub mod config;
pub mod orchestrator;
pub mod provider;
pub mod screen;
pub mod session;
pub mod store;
pub mod stream;
pub mod telemetry;
pub mod watchlist;

#[cfg(test)]
mod testing;
