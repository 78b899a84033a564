//! Core business logic: pools, scoring, safety policy, positions, exit
//! arbitration, penalties, and durable state. Nothing in here talks to the
//! network; collaborators come in through `crate::ports`.

pub mod blacklist;
pub mod exit;
pub mod known_addresses;
pub mod math;
pub mod pool;
pub mod position;
pub mod safety;
pub mod score;
pub mod snapshots;
pub mod state;

pub use blacklist::{BlacklistEntry, CooldownEntry, CooldownPolicy, PenaltyBook};
pub use exit::{ExitDecision, ExitPolicy};
pub use pool::{Pool, WSOL_MINT};
pub use position::{ClosedTrade, ExitReason, Position};
pub use safety::{SafetyPolicy, SafetyReport, SafetyScreen, TokenSafetyData};
pub use score::{Score, SizingPolicy};
pub use snapshots::SnapshotTracker;
pub use state::{AppState, RestoreOutcome, StateError, StateStore};
