//! Liquidator API clients for external services.
//!
//! This crate provides HTTP clients for:
//! - Borrower indexing service (GraphQL accounts registry)
//! - Swap aggregator: quotes, transaction assembly, spot prices
//! - Yield market: active markets and principal-token redemption quotes
//! - Operator notifications (log or webhook)

mod error;
pub mod market;
mod notify;
mod subgraph;
pub mod swap;

pub use error::ApiError;
pub use market::{find_market, MarketInfo, PendleClient, RedeemQuote, RedeemRequest, YieldMarketApi};
pub use notify::{LogNotifier, Notification, Notifier, Severity, WebhookNotifier};
pub use subgraph::{BorrowerIndex, SubgraphClient};
pub use swap::{AssembledSwap, OdosClient, Quote, QuoteRequest, SwapAggregator};
