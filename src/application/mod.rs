//! The engine, its startup reconciliation, and the status display.

pub mod display;
pub mod engine;
pub mod recovery;

pub use engine::{Engine, EngineInner};
pub use recovery::{run_recovery, RecoveryReport};
