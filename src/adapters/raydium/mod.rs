//! Client for the pool listing service (C1).

mod client;
mod types;

pub use client::PoolDirectory;
