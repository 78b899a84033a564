//! Sluice - autonomous liquidity-provision bot for WSOL constant-product pools
//!
//! Continuously discovers WSOL-quoted pools, filters out rug setups, ranks
//! the survivors, opens LP positions in the best of them, monitors every
//! position at high frequency, and exits on stop-loss / take-profit /
//! impermanent-loss / time / ghost conditions - surviving restarts without
//! losing track of a single position.
//!
//! # Modules
//!
//! - `domain`: pools, scoring, safety policy, positions, exit arbitration,
//!   penalties, durable state
//! - `ports`: trait seams (execution backend, chain queries, market data)
//!   plus scripted mocks
//! - `adapters`: REST clients, the chain RPC adapter, the sidecar execution
//!   backend, the paper backend
//! - `application`: the four-lane engine, startup recovery, status display
//! - `config`: TOML configuration loading and validation

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
