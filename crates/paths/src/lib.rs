//! Payment pathfinding for rtx-node.
//!
//! Given a funding position and a wanted destination amount, this crate
//! enumerates candidate payment paths across the ledger's trust-line
//! and order-book topology, then ranks them by realizable liquidity and
//! exchange quality:
//!
//! - [`Pathfinder`]: the bounded, typed breadth-first search and its
//!   ranking pass
//! - [`table`]: the static table of path shapes per payment type
//! - [`LedgerView`]/[`LineCache`]: the read-only snapshot the search
//!   runs over
//! - [`QualityCalculator`]/[`FlowEstimator`]: liquidity valuation of
//!   candidates
//!
//! All failures are per-path and non-fatal except the absence of a
//! ledger snapshot.

pub mod table;

mod error;
mod flow;
mod ledger;
mod path;
mod pathfinder;
mod types;

pub use error::PathError;
pub use flow::{FlowEstimator, PathLiquidity, QualityCalculator};
pub use ledger::{BookDepth, InMemoryLedger, LedgerView, LineCache, TrustLine};
pub use path::{path_type_string, NodeType, Path, PathElement, PathType, MAX_PATH_LENGTH};
pub use pathfinder::{
    PathRank, Pathfinder, ADD_ACCOUNTS, ADD_BOOKS, AC_LAST, OB_LAST, OB_XRP,
};
pub use types::{
    compose_quality, output_at_quality, quality_from_in_out, AccountId, Amount, Currency, Issue,
    QUALITY_ONE,
};
