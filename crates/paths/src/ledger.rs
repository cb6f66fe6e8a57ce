//! Read-only ledger access for pathfinding.
//!
//! The pathfinder never touches ledger storage directly; it sees a
//! snapshot through [`LedgerView`] and memoizes the hot lookups in a
//! [`LineCache`]. [`InMemoryLedger`] is the hand-built implementation
//! used by tests.

use crate::types::{AccountId, Currency, Issue};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// One side of a trust line, viewed from its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrustLine {
    /// The account on the other end.
    pub peer: AccountId,
    /// Currency of the line.
    pub currency: Currency,
    /// How much of this currency the owner is willing to hold.
    pub limit: i64,
    /// How much the owner currently holds across this line.
    pub balance: i64,
    /// Whether the owner forbids rippling through this line.
    pub no_ripple: bool,
}

/// Aggregate depth of one order book.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookDepth {
    /// Blended input-per-output quality of the book's top. Lower is
    /// better; scaled by [`crate::types::QUALITY_ONE`].
    pub quality: u64,
    /// Output the book can absorb before the quality figure is a lie.
    pub out_capacity: i64,
}

/// A read-only snapshot of the ledger state pathfinding needs.
pub trait LedgerView: Send + Sync {
    /// Whether the account exists in this snapshot.
    fn account_exists(&self, account: &AccountId) -> bool;

    /// Trust lines owned by `account`, in stable order.
    fn trust_lines(&self, account: &AccountId) -> Vec<TrustLine>;

    /// How much more of `currency` can move from `from` to `to` across
    /// their trust line. Zero when no line exists.
    fn line_available(&self, from: &AccountId, to: &AccountId, currency: &Currency) -> i64;

    /// Whether `from` forbids rippling through its line to `to`.
    fn is_no_ripple(&self, from: &AccountId, to: &AccountId, currency: &Currency) -> bool;

    /// Issues reachable from `src` by crossing one order book, in
    /// stable order.
    fn books_from(&self, src: &Issue) -> Vec<Issue>;

    /// Depth of the book converting `src` into `dst`, if one exists.
    fn book(&self, src: &Issue, dst: &Issue) -> Option<BookDepth>;

    /// How much of `issue` the account holds (drops for XRP).
    fn holding(&self, account: &AccountId, issue: &Issue) -> i64;
}

#[derive(Debug, Clone)]
struct LineRecord {
    a: AccountId,
    b: AccountId,
    currency: Currency,
    /// How much `a` will hold.
    limit_a: i64,
    /// How much `b` will hold.
    limit_b: i64,
    /// Positive when `a` holds value, negative when `b` does.
    balance_a: i64,
    no_ripple_a: bool,
    no_ripple_b: bool,
}

#[derive(Debug, Clone)]
struct BookRecord {
    src: Issue,
    dst: Issue,
    depth: BookDepth,
}

/// Hand-built ledger snapshot.
#[derive(Default)]
pub struct InMemoryLedger {
    accounts: HashSet<AccountId>,
    lines: Vec<LineRecord>,
    books: Vec<BookRecord>,
    holdings: HashMap<(AccountId, Issue), i64>,
}

impl InMemoryLedger {
    /// An empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an account.
    pub fn add_account(&mut self, account: AccountId) -> &mut Self {
        self.accounts.insert(account);
        self
    }

    /// Add a symmetric trust line between `a` and `b`.
    pub fn add_trust_line(
        &mut self,
        a: AccountId,
        b: AccountId,
        currency: Currency,
        limit_a: i64,
        limit_b: i64,
    ) -> &mut Self {
        self.add_account(a);
        self.add_account(b);
        self.lines.push(LineRecord {
            a,
            b,
            currency,
            limit_a,
            limit_b,
            balance_a: 0,
            no_ripple_a: false,
            no_ripple_b: false,
        });
        self
    }

    /// Set the no-ripple flag `owner` imposes on its line to `peer`.
    pub fn set_no_ripple(&mut self, owner: AccountId, peer: AccountId, currency: Currency) {
        for line in &mut self.lines {
            if line.currency != currency {
                continue;
            }
            if line.a == owner && line.b == peer {
                line.no_ripple_a = true;
            } else if line.b == owner && line.a == peer {
                line.no_ripple_b = true;
            }
        }
    }

    /// Set how much of `issue` the account holds.
    pub fn set_holding(&mut self, account: AccountId, issue: Issue, value: i64) -> &mut Self {
        self.add_account(account);
        self.holdings.insert((account, issue), value);
        self
    }

    /// Add an order book converting `src` into `dst`.
    pub fn add_book(&mut self, src: Issue, dst: Issue, quality: u64, out_capacity: i64) -> &mut Self {
        self.books.push(BookRecord {
            src,
            dst,
            depth: BookDepth {
                quality,
                out_capacity,
            },
        });
        self
    }

    fn find_line(&self, x: &AccountId, y: &AccountId, currency: &Currency) -> Option<&LineRecord> {
        self.lines.iter().find(|l| {
            l.currency == *currency && ((l.a == *x && l.b == *y) || (l.a == *y && l.b == *x))
        })
    }
}

impl LedgerView for InMemoryLedger {
    fn account_exists(&self, account: &AccountId) -> bool {
        self.accounts.contains(account)
    }

    fn trust_lines(&self, account: &AccountId) -> Vec<TrustLine> {
        self.lines
            .iter()
            .filter_map(|l| {
                if l.a == *account {
                    Some(TrustLine {
                        peer: l.b,
                        currency: l.currency,
                        limit: l.limit_a,
                        balance: l.balance_a.max(0),
                        no_ripple: l.no_ripple_a,
                    })
                } else if l.b == *account {
                    Some(TrustLine {
                        peer: l.a,
                        currency: l.currency,
                        limit: l.limit_b,
                        balance: (-l.balance_a).max(0),
                        no_ripple: l.no_ripple_b,
                    })
                } else {
                    None
                }
            })
            .collect()
    }

    fn line_available(&self, from: &AccountId, to: &AccountId, currency: &Currency) -> i64 {
        let Some(line) = self.find_line(from, to, currency) else {
            return 0;
        };
        // Capacity is what the receiving side is still willing to hold.
        let (limit, held) = if line.a == *to {
            (line.limit_a, line.balance_a.max(0))
        } else {
            (line.limit_b, (-line.balance_a).max(0))
        };
        (limit - held).max(0)
    }

    fn is_no_ripple(&self, from: &AccountId, to: &AccountId, currency: &Currency) -> bool {
        let Some(line) = self.find_line(from, to, currency) else {
            return false;
        };
        if line.a == *from {
            line.no_ripple_a
        } else {
            line.no_ripple_b
        }
    }

    fn books_from(&self, src: &Issue) -> Vec<Issue> {
        self.books
            .iter()
            .filter(|b| b.src == *src)
            .map(|b| b.dst)
            .collect()
    }

    fn book(&self, src: &Issue, dst: &Issue) -> Option<BookDepth> {
        self.books
            .iter()
            .find(|b| b.src == *src && b.dst == *dst)
            .map(|b| b.depth)
    }

    fn holding(&self, account: &AccountId, issue: &Issue) -> i64 {
        self.holdings
            .get(&(*account, *issue))
            .copied()
            .unwrap_or(0)
    }
}

/// Per-search memo of trust-line enumerations over one snapshot.
///
/// A pathfinding run touches the same gateway accounts many times; the
/// cache makes the second and later touches free.
pub struct LineCache {
    ledger: Arc<dyn LedgerView>,
    lines: Mutex<HashMap<AccountId, Arc<Vec<TrustLine>>>>,
}

impl LineCache {
    /// Wrap a snapshot.
    pub fn new(ledger: Arc<dyn LedgerView>) -> Arc<Self> {
        Arc::new(Self {
            ledger,
            lines: Mutex::new(HashMap::new()),
        })
    }

    /// The underlying snapshot.
    pub fn ledger(&self) -> &Arc<dyn LedgerView> {
        &self.ledger
    }

    /// Trust lines of `account`, memoized.
    pub fn trust_lines(&self, account: &AccountId) -> Arc<Vec<TrustLine>> {
        let mut lines = self.lines.lock();
        if let Some(cached) = lines.get(account) {
            return Arc::clone(cached);
        }
        let fetched = Arc::new(self.ledger.trust_lines(account));
        lines.insert(*account, Arc::clone(&fetched));
        fetched
    }
}
