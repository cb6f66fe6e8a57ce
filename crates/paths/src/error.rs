//! Pathfinding errors.

use thiserror::Error;

/// Errors surfaced by pathfinding.
///
/// Only [`PathError::NoLedger`] is a hard failure. Everything else is
/// per-path: a path that errors is simply not returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    /// No ledger snapshot was supplied; nothing can be searched.
    #[error("no ledger snapshot available")]
    NoLedger,

    /// The path cannot deliver the required minimum.
    #[error("path has insufficient liquidity")]
    NoLiquidity,

    /// The request itself is inconsistent (e.g. an issuer given for
    /// XRP).
    #[error("malformed path request: {0}")]
    Malformed(&'static str),
}
