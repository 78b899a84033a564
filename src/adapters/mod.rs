//! Concrete implementations of the port seams: REST clients, the chain RPC
//! adapter, the sidecar execution backend, and the paper backend.

pub mod bridge;
pub mod paper;
pub mod price;
pub mod raydium;
pub mod rugcheck;
pub mod solana;
