//! Trait seams between the engine and its external collaborators, plus
//! scripted mocks for tests.

pub mod chain;
pub mod execution;
pub mod market_data;
pub mod mocks;

pub use chain::{ChainError, ChainQueryPort};
pub use execution::{
    AddLiquidityOutcome, CloseAccountsOutcome, ExecutionError, ExecutionPort, LpValuation,
    LpValueRequest, SwapDirection, TokenHolding, TxOutcome,
};
pub use market_data::{MarketDataError, PoolDirectoryPort, PriceFeedPort, TokenSafetyPort};
