//! Candidate path enumeration and ranking.
//!
//! The pathfinder expands partial paths one element at a time, following
//! the shapes listed in the static path table for the payment's type.
//! Shapes share work: the partial paths computed for a prefix are
//! memoized per path type and reused by every longer shape with the
//! same prefix.
//!
//! Search produces candidates; ranking walks each candidate through the
//! quality calculator and orders survivors by (quality, length,
//! liquidity), stably.

use crate::error::PathError;
use crate::flow::{FlowEstimator, QualityCalculator};
use crate::ledger::{LedgerView, LineCache};
use crate::path::{NodeType, Path, PathElement, PathType};
use crate::table::{init_path_table, payment_type};
use crate::types::{AccountId, Amount, Currency, Issue};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, trace};

/// Extend to accounts reachable over trust lines.
pub const ADD_ACCOUNTS: u32 = 0x001;

/// Extend by order books out of the current issue.
pub const ADD_BOOKS: u32 = 0x002;

/// Restrict book extension to books delivering XRP.
pub const OB_XRP: u32 = 0x010;

/// Require the new element's currency to equal the destination's.
pub const OB_LAST: u32 = 0x040;

/// Only the destination account may be added.
pub const AC_LAST: u32 = 0x080;

/// Rank of one candidate path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathRank {
    /// Blended input-per-output quality; lower is better.
    pub quality: u64,
    /// Path length in elements.
    pub length: u64,
    /// Deliverable destination amount.
    pub liquidity: i64,
    /// Index into the complete-path set; stable tiebreaker.
    pub index: usize,
}

/// Payment path search over one ledger snapshot.
pub struct Pathfinder {
    cache: Arc<LineCache>,
    src_account: AccountId,
    dst_account: AccountId,
    src_currency: Currency,
    src_issuer: Option<AccountId>,
    dst_amount: Amount,
    remaining: Amount,
    source: PathElement,
    complete_paths: Vec<Path>,
    complete_keys: HashSet<Vec<(Option<AccountId>, Option<Currency>, Option<AccountId>)>>,
    paths_by_type: HashMap<PathType, Vec<Path>>,
    paths_out_cache: HashMap<(AccountId, Currency), usize>,
    ranks: Vec<PathRank>,
    estimator: Box<dyn QualityCalculator>,
}

impl std::fmt::Debug for Pathfinder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pathfinder")
            .field("src_account", &self.src_account)
            .field("dst_account", &self.dst_account)
            .field("src_currency", &self.src_currency)
            .field("src_issuer", &self.src_issuer)
            .field("dst_amount", &self.dst_amount)
            .field("remaining", &self.remaining)
            .field("source", &self.source)
            .field("complete_paths", &self.complete_paths)
            .field("ranks", &self.ranks)
            .finish()
    }
}

impl Pathfinder {
    /// Construct a search.
    ///
    /// `cache == None` is the one hard failure: there is no snapshot to
    /// search. An issuer may only be given for an issued source
    /// currency.
    pub fn new(
        cache: Option<Arc<LineCache>>,
        src_account: AccountId,
        dst_account: AccountId,
        src_currency: Currency,
        src_issuer: Option<AccountId>,
        dst_amount: Amount,
    ) -> Result<Self, PathError> {
        let cache = cache.ok_or(PathError::NoLedger)?;
        if src_currency.is_xrp() && src_issuer.is_some() {
            return Err(PathError::Malformed("issuer given for XRP source"));
        }
        if !dst_amount.is_positive() {
            return Err(PathError::Malformed("destination amount must be positive"));
        }

        let source = PathElement::source(src_account, src_currency, src_issuer);
        Ok(Self {
            cache,
            src_account,
            dst_account,
            src_currency,
            src_issuer,
            dst_amount,
            remaining: dst_amount,
            source,
            complete_paths: Vec::new(),
            complete_keys: HashSet::new(),
            paths_by_type: HashMap::new(),
            paths_out_cache: HashMap::new(),
            ranks: Vec::new(),
            estimator: Box::new(FlowEstimator),
        })
    }

    /// Swap in a different quality calculator.
    pub fn with_estimator(mut self, estimator: Box<dyn QualityCalculator>) -> Self {
        self.estimator = estimator;
        self
    }

    fn ledger(&self) -> &Arc<dyn LedgerView> {
        self.cache.ledger()
    }

    fn source_issue(&self) -> Issue {
        Issue {
            currency: self.src_currency,
            issuer: if self.src_currency.is_xrp() {
                None
            } else {
                Some(self.src_issuer.unwrap_or(self.src_account))
            },
        }
    }

    /// Candidate paths found so far.
    pub fn complete_paths(&self) -> &[Path] {
        &self.complete_paths
    }

    /// Ranks computed by the last [`Pathfinder::compute_path_ranks`].
    pub fn path_ranks(&self) -> &[PathRank] {
        &self.ranks
    }

    /// Destination amount still unsatisfied after the default path.
    pub fn remaining_amount(&self) -> Amount {
        self.remaining
    }

    /// Enumerate candidate paths for every table shape at or below
    /// `level`. Returns whether any complete path exists afterwards.
    pub fn find_paths(&mut self, level: u8) -> bool {
        let kind = payment_type(
            self.src_currency.is_xrp(),
            self.dst_amount.issue.is_xrp(),
            self.src_currency == self.dst_amount.issue.currency,
        );
        debug!(?kind, level, "path search");

        if let Some(entries) = init_path_table().get(&kind) {
            let shapes: Vec<PathType> = entries
                .iter()
                .filter(|entry| entry.level <= level)
                .map(|entry| entry.path_type.clone())
                .collect();
            for shape in shapes {
                self.add_paths_for_type(&shape);
            }
        }

        debug!(found = self.complete_paths.len(), "path search done");
        !self.complete_paths.is_empty()
    }

    /// Partial (or, for `Destination`-terminated types, complete) paths
    /// of one shape, memoized per shape so longer shapes reuse their
    /// prefixes.
    fn add_paths_for_type(&mut self, path_type: &PathType) -> Vec<Path> {
        if let Some(cached) = self.paths_by_type.get(path_type) {
            return cached.clone();
        }

        let Some((last, parent)) = path_type.split_last() else {
            return Vec::new();
        };

        let paths = match last {
            NodeType::Source => {
                // Only valid as the first node.
                vec![Path::seeded(self.source)]
            }
            other => {
                let parents = self.add_paths_for_type(&parent.to_vec());
                let flags = match other {
                    NodeType::Accounts => ADD_ACCOUNTS,
                    NodeType::Books => ADD_BOOKS,
                    NodeType::XrpBook => ADD_BOOKS | OB_XRP,
                    NodeType::DestBook => ADD_BOOKS | OB_LAST,
                    NodeType::Destination => ADD_ACCOUNTS | AC_LAST,
                    NodeType::Source => unreachable!("handled above"),
                };
                let mut out = Vec::new();
                self.add_links(&parents, &mut out, flags);
                out
            }
        };

        if *last == NodeType::Destination {
            for path in &paths {
                self.try_complete(path);
            }
        }

        self.paths_by_type.insert(path_type.clone(), paths.clone());
        paths
    }

    /// Call [`Pathfinder::add_link`] for each current partial path.
    fn add_links(&mut self, current: &[Path], out: &mut Vec<Path>, flags: u32) {
        for path in current {
            self.add_link(path, out, flags);
        }
    }

    /// Append one element to `path` under the extension rule selected by
    /// `flags`, pushing each viable extension into `out`.
    pub fn add_link(&mut self, path: &Path, out: &mut Vec<Path>, flags: u32) {
        let Some(last) = path.last() else { return };
        let cur_currency = last.currency.unwrap_or(Currency::XRP);
        let cur_issuer = if cur_currency.is_xrp() {
            None
        } else {
            last.issuer
        };
        let anchor = last.account.or(last.issuer);

        if flags & ADD_ACCOUNTS != 0 {
            if flags & AC_LAST != 0 {
                self.add_destination_link(path, out, last, cur_currency, cur_issuer, anchor);
            } else {
                self.add_account_links(path, out, cur_currency, anchor);
            }
        }

        if flags & ADD_BOOKS != 0 {
            self.add_book_links(path, out, cur_currency, cur_issuer, flags);
        }
    }

    fn add_destination_link(
        &mut self,
        path: &Path,
        out: &mut Vec<Path>,
        last: &PathElement,
        cur_currency: Currency,
        cur_issuer: Option<AccountId>,
        anchor: Option<AccountId>,
    ) {
        if last.account == Some(self.dst_account) {
            // Already at the destination; the path is complete as-is.
            out.push(path.clone());
            return;
        }

        let reachable = if cur_currency.is_xrp() {
            // Anyone can receive XRP.
            true
        } else if cur_issuer == Some(self.dst_account) {
            true
        } else if let Some(anchor) = anchor {
            self.ledger()
                .line_available(&anchor, &self.dst_account, &cur_currency)
                > 0
        } else {
            false
        };

        if reachable {
            let element =
                PathElement::account(NodeType::Destination, self.dst_account, cur_currency);
            if let Some(extended) = path.extended(element) {
                out.push(extended);
            }
        }
    }

    fn add_account_links(
        &mut self,
        path: &Path,
        out: &mut Vec<Path>,
        cur_currency: Currency,
        anchor: Option<AccountId>,
    ) {
        if cur_currency.is_xrp() {
            // No trust lines in the native currency.
            return;
        }
        let Some(anchor) = anchor else { return };

        let lines = self.cache.trust_lines(&anchor);
        for line in lines.iter() {
            if line.currency != cur_currency {
                continue;
            }
            if line.no_ripple {
                // Transit out of the current account is forbidden here.
                continue;
            }
            let peer = line.peer;
            if peer == self.src_account {
                // Paths never loop back through the source.
                continue;
            }
            if path.has_seen(&peer, &cur_currency, Some(&peer)) {
                continue;
            }
            if peer != self.dst_account && self.get_paths_out(cur_currency, peer) == 0 {
                trace!(%peer, "pruned dead-end account");
                continue;
            }
            let element = PathElement::account(NodeType::Accounts, peer, cur_currency);
            if let Some(extended) = path.extended(element) {
                out.push(extended);
            }
        }
    }

    fn add_book_links(
        &mut self,
        path: &Path,
        out: &mut Vec<Path>,
        cur_currency: Currency,
        cur_issuer: Option<AccountId>,
        flags: u32,
    ) {
        let src_issue = Issue {
            currency: cur_currency,
            issuer: cur_issuer,
        };

        if flags & OB_XRP != 0 {
            let element = PathElement::book(NodeType::XrpBook, Currency::XRP, None);
            if cur_currency.is_xrp() {
                // Already native: mark the position in the XRP node so
                // following book hops share it.
                if let Some(extended) = path.extended(element) {
                    out.push(extended);
                }
            } else if self.ledger().book(&src_issue, &Issue::XRP).is_some() {
                if let Some(extended) = path.extended(element) {
                    out.push(extended);
                }
            }
            return;
        }

        let want_dest_currency = flags & OB_LAST != 0;
        for dst_issue in self.ledger().books_from(&src_issue) {
            if want_dest_currency && dst_issue.currency != self.dst_amount.issue.currency {
                continue;
            }
            let node_type = if want_dest_currency {
                NodeType::DestBook
            } else {
                NodeType::Books
            };
            let element = PathElement::book(node_type, dst_issue.currency, dst_issue.issuer);
            if let Some(extended) = path.extended(element) {
                out.push(extended);
            }
        }
    }

    /// Fan-out at a node, memoized per (account, currency).
    pub fn get_paths_out(&mut self, currency: Currency, account: AccountId) -> usize {
        if let Some(cached) = self.paths_out_cache.get(&(account, currency)) {
            return *cached;
        }

        let mut count = 0;
        if self.ledger().account_exists(&account) {
            if account == self.dst_account {
                count += 1;
            }
            let lines = self.cache.trust_lines(&account);
            count += lines
                .iter()
                .filter(|line| {
                    line.currency == currency && !line.no_ripple && line.limit > 0
                })
                .count();
            count += self
                .ledger()
                .books_from(&Issue::new(currency, account))
                .len();
        }

        self.paths_out_cache.insert((account, currency), count);
        count
    }

    /// Whether the path ends on an account-to-account link whose source
    /// forbids rippling. Such paths are discarded.
    pub fn is_no_ripple_out(&self, path: &Path) -> bool {
        let elements = path.elements();
        let [.., prev, last] = elements else {
            return false;
        };
        let (Some(from), Some(to)) = (prev.account, last.account) else {
            return false;
        };
        let Some(currency) = last.currency else {
            return false;
        };
        if currency.is_xrp() {
            return false;
        }
        self.ledger().is_no_ripple(&from, &to, &currency)
    }

    /// Admit a finished path to the complete set, unless it is a
    /// duplicate or fails the no-ripple exit check.
    fn try_complete(&mut self, path: &Path) {
        let valid = path.elements().first().map(|e| e.account) == Some(Some(self.src_account))
            && path.last().map(|e| e.account) == Some(Some(self.dst_account));
        if !valid {
            return;
        }
        if self.is_no_ripple_out(path) {
            trace!("path discarded by no-ripple exit");
            return;
        }
        if self.complete_keys.insert(path.fingerprint()) {
            self.complete_paths.push(path.clone());
        }
    }

    /// Rank candidates by realizable liquidity and quality.
    ///
    /// The default (direct) path is valued first; its deliverable amount
    /// is subtracted from the wanted amount to obtain the remainder the
    /// candidates compete over. Candidates that cannot deliver a token
    /// share of the remainder are discarded.
    pub fn compute_path_ranks(&mut self, max_paths: usize) {
        let default = self.estimator.default_liquidity(
            &self.cache,
            &self.src_account,
            &self.source_issue(),
            &self.dst_account,
            &self.dst_amount,
        );
        let delivered = default.map(|liq| liq.out).unwrap_or(0);
        self.remaining = self.dst_amount.saturating_sub(delivered);

        let min_dst = (self.remaining.value / (max_paths as i64 + 2)).max(1);

        self.ranks.clear();
        for (index, path) in self.complete_paths.iter().enumerate() {
            match self
                .estimator
                .path_liquidity(&self.cache, path, &self.dst_amount, min_dst)
            {
                Ok(liq) => self.ranks.push(PathRank {
                    quality: liq.quality,
                    length: path.len() as u64,
                    liquidity: liq.out,
                    index,
                }),
                Err(err) => trace!(index, %err, "path discarded during ranking"),
            }
        }

        self.ranks.sort_by(|a, b| {
            a.quality
                .cmp(&b.quality)
                .then(a.length.cmp(&b.length))
                .then(b.liquidity.cmp(&a.liquidity))
                .then(a.index.cmp(&b.index))
        });
    }

    /// The top `max_paths` candidates by rank.
    ///
    /// When a path that missed the cut could alone satisfy the
    /// remaining amount, it is returned through `full_liquidity_out`;
    /// all other non-top survivors land in `extras_out`. When
    /// `src_issuer` is given, paths departing on a different issuer are
    /// skipped entirely.
    pub fn get_best_paths(
        &self,
        max_paths: usize,
        full_liquidity_out: &mut Option<Path>,
        extras_out: &mut Vec<Path>,
        src_issuer: Option<AccountId>,
    ) -> Vec<Path> {
        let mut best = Vec::new();

        for rank in &self.ranks {
            let path = &self.complete_paths[rank.index];

            if let Some(issuer) = src_issuer {
                let departs_on_issuer = path
                    .elements()
                    .first()
                    .map(|e| e.issuer == Some(issuer) || e.account == Some(issuer))
                    .unwrap_or(false);
                if !departs_on_issuer {
                    continue;
                }
            }

            if best.len() < max_paths {
                best.push(path.clone());
            } else if full_liquidity_out.is_none()
                && self.remaining.is_positive()
                && rank.liquidity >= self.remaining.value
            {
                *full_liquidity_out = Some(path.clone());
            } else {
                extras_out.push(path.clone());
            }
        }

        best
    }
}
