//! Liquidator core logic.
//!
//! This crate provides the liquidation decision-and-execution pipeline:
//! - Fixed-point math in wad, ray, basis points and oracle base currency
//! - Time-boxed backoff memory for borrowers, optionally persisted
//! - Position reads with bounded-concurrency batching
//! - Liquidation sizing (close factor, collateral cap, profit)
//! - Swap route assembly (direct, principal-token redemption, unstake)
//! - Flash-mint / flash-loan execution routing
//! - The per-borrower pipeline and the scan loop
//!
//! Every external collaborator is a trait object, so the whole pipeline can
//! be built from the fakes in [`testing`].

mod attempt_log;
mod backoff;
pub mod batch;
pub mod clock;
pub mod config;
mod error;
mod liquidator;
mod position;
mod quote;
mod reader;
mod router;
mod scanner;
pub mod sizing;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod u256_math;

pub use attempt_log::{AttemptLog, AttemptRecord};
pub use backoff::{BackoffCache, BackoffError};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{BotConfig, ConfigError};
pub use error::{LiquidationError, Step};
pub use liquidator::{LiquidationOutcome, Liquidator};
pub use position::{LiquidationCandidate, ReserveInfo, UserReserve, UserReserves};
pub use quote::{QuoteAssembler, QuoteSettings, RoutePlan, SwapRoute};
pub use reader::{HealthRead, PositionReader, ReaderLimits};
pub use router::ExecutionRouter;
pub use scanner::{CycleReport, Scanner, ScannerSettings};
pub use sizing::{compute_max_repay, compute_profit, SizingInput};
