//! Liquidity estimation along a path.
//!
//! Ranking needs to know, for each candidate path, how much it can
//! actually deliver and at what blended rate. The [`QualityCalculator`]
//! trait is that collaborator; [`FlowEstimator`] is the built-in
//! implementation, which walks a path hop by hop: trust-line hops are
//! capacity-limited and rate-neutral, book hops convert through the
//! book's top-of-book quality and are depth-limited.

use crate::error::PathError;
use crate::ledger::LineCache;
use crate::path::Path;
use crate::types::{
    compose_quality, output_at_quality, AccountId, Amount, Issue, QUALITY_ONE,
};

/// What a path can deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathLiquidity {
    /// Deliverable destination amount.
    pub out: i64,
    /// Blended input-per-output quality. Lower is better.
    pub quality: u64,
}

/// Computes exchange output given a path and the wanted amount.
pub trait QualityCalculator: Send + Sync {
    /// Liquidity of `path`, which must run source to destination.
    ///
    /// Errors with [`PathError::NoLiquidity`] when the path cannot
    /// deliver at least `min_dst`.
    fn path_liquidity(
        &self,
        cache: &LineCache,
        path: &Path,
        dst_amount: &Amount,
        min_dst: i64,
    ) -> Result<PathLiquidity, PathError>;

    /// Liquidity of the default (direct) payment, when one exists:
    /// a native transfer, or a same-currency payment rippling through
    /// the destination issue's gateway.
    fn default_liquidity(
        &self,
        cache: &LineCache,
        src: &AccountId,
        src_issue: &Issue,
        dst: &AccountId,
        dst_amount: &Amount,
    ) -> Option<PathLiquidity>;
}

/// Built-in liquidity estimator.
#[derive(Debug, Default)]
pub struct FlowEstimator;

impl FlowEstimator {
    /// Funds `account` can spend of `issue`.
    fn available_funds(cache: &LineCache, account: &AccountId, issue: &Issue) -> i64 {
        let ledger = cache.ledger();
        if issue.is_xrp() {
            return ledger.holding(account, issue);
        }
        if issue.issuer == Some(*account) {
            // Issuers mint what they spend.
            return i64::MAX;
        }
        let held = ledger.holding(account, issue);
        if held > 0 {
            return held;
        }
        // Fall back to the balance on the line to the issuer.
        let Some(issuer) = issue.issuer else {
            return 0;
        };
        cache
            .trust_lines(account)
            .iter()
            .find(|line| line.currency == issue.currency && line.peer == issuer)
            .map(|line| line.balance)
            .unwrap_or(0)
    }
}

impl QualityCalculator for FlowEstimator {
    fn path_liquidity(
        &self,
        cache: &LineCache,
        path: &Path,
        dst_amount: &Amount,
        min_dst: i64,
    ) -> Result<PathLiquidity, PathError> {
        let ledger = cache.ledger();
        let elements = path.elements();
        let first = elements.first().ok_or(PathError::NoLiquidity)?;
        let src_account = first.account.ok_or(PathError::NoLiquidity)?;
        let currency = first.currency.ok_or(PathError::NoLiquidity)?;

        let mut cur_issue = Issue {
            currency,
            issuer: if currency.is_xrp() { None } else { first.issuer },
        };
        let mut cap = Self::available_funds(cache, &src_account, &cur_issue);
        let mut quality = QUALITY_ONE;

        for pair in elements.windows(2) {
            let (prev, next) = (&pair[0], &pair[1]);

            if next.is_account() {
                let to = next.account.ok_or(PathError::NoLiquidity)?;
                if !cur_issue.currency.is_xrp() {
                    let from = prev
                        .account
                        .or(prev.issuer)
                        .ok_or(PathError::NoLiquidity)?;
                    let available = if cur_issue.issuer == Some(to) {
                        // Delivering back to the issuer redeems.
                        i64::MAX
                    } else {
                        ledger.line_available(&from, &to, &cur_issue.currency)
                    };
                    cap = cap.min(available);
                    cur_issue = Issue::new(cur_issue.currency, to);
                }
            } else {
                let to_currency = next.currency.ok_or(PathError::NoLiquidity)?;
                let to_issue = Issue {
                    currency: to_currency,
                    issuer: if to_currency.is_xrp() {
                        None
                    } else {
                        next.issuer
                    },
                };
                if to_issue == cur_issue {
                    // The XRP node entered from a native position.
                    continue;
                }
                let book = ledger
                    .book(&cur_issue, &to_issue)
                    .ok_or(PathError::NoLiquidity)?;
                cap = output_at_quality(cap, book.quality).min(book.out_capacity);
                quality = compose_quality(quality, book.quality);
                cur_issue = to_issue;
            }

            if cap <= 0 {
                return Err(PathError::NoLiquidity);
            }
        }

        if cur_issue.currency != dst_amount.issue.currency {
            return Err(PathError::NoLiquidity);
        }

        let out = cap.min(dst_amount.value);
        if out < min_dst {
            return Err(PathError::NoLiquidity);
        }
        Ok(PathLiquidity { out, quality })
    }

    fn default_liquidity(
        &self,
        cache: &LineCache,
        src: &AccountId,
        src_issue: &Issue,
        dst: &AccountId,
        dst_amount: &Amount,
    ) -> Option<PathLiquidity> {
        let ledger = cache.ledger();

        if src_issue.is_xrp() && dst_amount.issue.is_xrp() {
            let out = Self::available_funds(cache, src, src_issue).min(dst_amount.value);
            return (out > 0).then_some(PathLiquidity {
                out,
                quality: QUALITY_ONE,
            });
        }

        if src_issue.currency != dst_amount.issue.currency {
            return None;
        }

        // Same currency: ripple through the destination issue's gateway.
        let issuer = dst_amount.issue.issuer?;
        let funds = Self::available_funds(cache, src, src_issue);
        let last_leg = if issuer == *dst {
            i64::MAX
        } else {
            ledger.line_available(&issuer, dst, &src_issue.currency)
        };
        let out = funds.min(last_leg).min(dst_amount.value);
        (out > 0).then_some(PathLiquidity {
            out,
            quality: QUALITY_ONE,
        })
    }
}
