//! End-to-end pathfinding scenarios over hand-built ledgers.

use rtx_paths::{
    AccountId, Amount, Currency, InMemoryLedger, Issue, LineCache, NodeType, Path, PathError,
    Pathfinder, QUALITY_ONE,
};
use std::sync::Arc;

fn acct(n: u8) -> AccountId {
    AccountId([n; 20])
}

fn usd() -> Currency {
    Currency::from_code("USD")
}

fn eur() -> Currency {
    Currency::from_code("EUR")
}

fn cache_of(ledger: InMemoryLedger) -> Arc<LineCache> {
    LineCache::new(Arc::new(ledger))
}

fn node_types(path: &Path) -> Vec<NodeType> {
    path.elements().iter().map(|e| e.node_type).collect()
}

/// Check the structural invariants every returned path must satisfy.
fn assert_well_formed(path: &Path, src: AccountId, dst: AccountId) {
    let elements = path.elements();
    assert_eq!(elements.first().unwrap().account, Some(src), "starts at source");
    assert_eq!(elements.last().unwrap().account, Some(dst), "ends at destination");
    for pair in elements.windows(2) {
        assert!(!pair[0].same_hop(&pair[1]), "no adjacent duplicates");
    }
    assert!(elements.len() <= rtx_paths::MAX_PATH_LENGTH);
}

/// A native-funded purchase of an issued currency: the canonical
/// source, XRP node, destination book, destination shape.
#[test]
fn test_xrp_to_issued_currency() {
    let x = acct(1); // source, holds XRP
    let y = acct(2); // destination, trusts Z for USD
    let z = acct(9); // USD gateway

    let usd_issue = Issue::new(usd(), z);
    let mut ledger = InMemoryLedger::new();
    ledger.add_account(x);
    ledger.set_holding(x, Issue::XRP, 1_000);
    // 2 drops per USD unit, 500 units of depth.
    ledger.add_book(Issue::XRP, usd_issue, 2 * QUALITY_ONE, 500);
    ledger.add_trust_line(z, y, usd(), 0, 1_000);

    let mut finder = Pathfinder::new(
        Some(cache_of(ledger)),
        x,
        y,
        Currency::XRP,
        None,
        Amount::issued(usd_issue, 10),
    )
    .unwrap();

    assert!(finder.find_paths(3));
    finder.compute_path_ranks(4);

    let mut full = None;
    let mut extras = Vec::new();
    let best = finder.get_best_paths(4, &mut full, &mut extras, None);

    assert_eq!(best.len(), 1, "exactly one path");
    assert!(full.is_none());
    assert!(extras.is_empty());

    let path = &best[0];
    assert_well_formed(path, x, y);
    assert_eq!(
        node_types(path),
        vec![
            NodeType::Source,
            NodeType::XrpBook,
            NodeType::DestBook,
            NodeType::Destination,
        ]
    );
    // The destination book element names the wanted issue.
    let book = &path.elements()[2];
    assert_eq!(book.currency, Some(usd()));
    assert_eq!(book.issuer, Some(z));

    // Non-zero quality survived ranking.
    let rank = &finder.path_ranks()[0];
    assert_eq!(rank.quality, 2 * QUALITY_ONE);
    assert_eq!(rank.liquidity, 10);
}

/// Selling an issued currency for XRP crosses the book into the XRP
/// node.
#[test]
fn test_issued_currency_to_xrp() {
    let x = acct(1);
    let y = acct(2);
    let g = acct(9);

    let usd_issue = Issue::new(usd(), g);
    let mut ledger = InMemoryLedger::new();
    ledger.add_account(y);
    ledger.add_trust_line(x, g, usd(), 1_000, 0);
    ledger.set_holding(x, usd_issue, 300);
    ledger.add_book(usd_issue, Issue::XRP, QUALITY_ONE / 2, 10_000);

    let mut finder = Pathfinder::new(
        Some(cache_of(ledger)),
        x,
        y,
        usd(),
        Some(g),
        Amount::xrp(100),
    )
    .unwrap();

    assert!(finder.find_paths(1));
    finder.compute_path_ranks(4);

    let mut full = None;
    let mut extras = Vec::new();
    let best = finder.get_best_paths(4, &mut full, &mut extras, None);
    assert_eq!(best.len(), 1);

    let path = &best[0];
    assert_well_formed(path, x, y);
    assert_eq!(
        node_types(path),
        vec![NodeType::Source, NodeType::XrpBook, NodeType::Destination]
    );
}

/// Same-currency payments ripple through intermediate accounts.
#[test]
fn test_same_currency_account_chain() {
    let x = acct(1);
    let y = acct(2);
    let g = acct(9); // common gateway

    let mut ledger = InMemoryLedger::new();
    ledger.add_trust_line(x, g, usd(), 1_000, 1_000);
    ledger.add_trust_line(g, y, usd(), 1_000, 1_000);
    ledger.set_holding(x, Issue::new(usd(), g), 400);

    let mut finder = Pathfinder::new(
        Some(cache_of(ledger)),
        x,
        y,
        usd(),
        Some(g),
        Amount::issued(Issue::new(usd(), g), 50),
    )
    .unwrap();

    assert!(finder.find_paths(3));
    finder.compute_path_ranks(4);

    let mut full = None;
    let mut extras = Vec::new();
    let best = finder.get_best_paths(4, &mut full, &mut extras, None);
    assert!(!best.is_empty());
    for path in &best {
        assert_well_formed(path, x, y);
    }
}

/// A no-ripple flag on the final account link discards the path.
#[test]
fn test_no_ripple_exit_discards_path() {
    let x = acct(1);
    let y = acct(2);
    let g = acct(9);

    let build = |flagged: bool| {
        let mut ledger = InMemoryLedger::new();
        ledger.add_trust_line(x, g, usd(), 1_000, 1_000);
        ledger.add_trust_line(g, y, usd(), 1_000, 1_000);
        ledger.set_holding(x, Issue::new(usd(), g), 400);
        if flagged {
            ledger.set_no_ripple(g, y, usd());
        }
        ledger
    };

    let mut open = Pathfinder::new(
        Some(cache_of(build(false))),
        x,
        y,
        usd(),
        Some(g),
        Amount::issued(Issue::new(usd(), g), 50),
    )
    .unwrap();
    assert!(open.find_paths(3));

    let mut flagged = Pathfinder::new(
        Some(cache_of(build(true))),
        x,
        y,
        usd(),
        Some(g),
        Amount::issued(Issue::new(usd(), g), 50),
    )
    .unwrap();
    assert!(!flagged.find_paths(3));
    assert!(flagged.complete_paths().is_empty());
}

/// Cross-currency payments choose the better book; ranking is a stable
/// total order.
#[test]
fn test_cross_currency_ranks_by_quality() {
    let x = acct(1);
    let y = acct(2);
    let g1 = acct(8); // cheap EUR gateway
    let g2 = acct(9); // expensive EUR gateway
    let gu = acct(7); // USD gateway funding the source

    let usd_issue = Issue::new(usd(), gu);
    let mut ledger = InMemoryLedger::new();
    ledger.add_trust_line(x, gu, usd(), 10_000, 0);
    ledger.set_holding(x, usd_issue, 1_000);
    // Two books to EUR at different rates.
    ledger.add_book(usd_issue, Issue::new(eur(), g1), QUALITY_ONE, 10_000);
    ledger.add_book(usd_issue, Issue::new(eur(), g2), 3 * QUALITY_ONE, 10_000);
    ledger.add_trust_line(g1, y, eur(), 0, 10_000);
    ledger.add_trust_line(g2, y, eur(), 0, 10_000);

    let mut finder = Pathfinder::new(
        Some(cache_of(ledger)),
        x,
        y,
        usd(),
        Some(gu),
        Amount::issued(Issue::new(eur(), g1), 100),
    )
    .unwrap();

    assert!(finder.find_paths(3));
    finder.compute_path_ranks(4);

    let ranks = finder.path_ranks();
    assert!(ranks.len() >= 2);
    // Best quality first; the order is deterministic.
    assert!(ranks[0].quality <= ranks[1].quality);
    assert_eq!(ranks[0].quality, QUALITY_ONE);

    let mut full = None;
    let mut extras = Vec::new();
    let best = finder.get_best_paths(1, &mut full, &mut extras, None);
    assert_eq!(best.len(), 1);
    // The winner routes through the cheap gateway's book.
    assert_eq!(best[0].elements()[1].issuer, Some(g1));
}

/// Repeating the same search yields identical output.
#[test]
fn test_search_is_deterministic() {
    let build = || {
        let x = acct(1);
        let y = acct(2);
        let gu = acct(7);
        let usd_issue = Issue::new(usd(), gu);
        let mut ledger = InMemoryLedger::new();
        ledger.add_trust_line(x, gu, usd(), 10_000, 0);
        ledger.set_holding(x, usd_issue, 1_000);
        ledger.add_book(usd_issue, Issue::new(eur(), acct(8)), QUALITY_ONE, 10_000);
        ledger.add_book(usd_issue, Issue::new(eur(), acct(9)), QUALITY_ONE, 10_000);
        ledger.add_trust_line(acct(8), y, eur(), 0, 10_000);
        ledger.add_trust_line(acct(9), y, eur(), 0, 10_000);

        let mut finder = Pathfinder::new(
            Some(cache_of(ledger)),
            x,
            y,
            usd(),
            Some(gu),
            Amount::issued(Issue::new(eur(), acct(8)), 100),
        )
        .unwrap();
        finder.find_paths(3);
        finder.compute_path_ranks(4);
        let mut full = None;
        let mut extras = Vec::new();
        let best = finder.get_best_paths(4, &mut full, &mut extras, None);
        best.iter().map(node_types).collect::<Vec<_>>()
    };

    assert_eq!(build(), build());
}

/// A path that alone satisfies the remainder but misses the cut is
/// surfaced separately.
#[test]
fn test_full_liquidity_path_reported() {
    let x = acct(1);
    let y = acct(2);
    let g1 = acct(8);
    let g2 = acct(9);
    let gu = acct(7);

    let usd_issue = Issue::new(usd(), gu);
    let mut ledger = InMemoryLedger::new();
    ledger.add_trust_line(x, gu, usd(), 100_000, 0);
    ledger.set_holding(x, usd_issue, 100_000);
    // The better-quality book is shallow; the worse one is deep enough
    // to satisfy the whole remainder on its own.
    ledger.add_book(usd_issue, Issue::new(eur(), g1), QUALITY_ONE, 400);
    ledger.add_book(usd_issue, Issue::new(eur(), g2), 2 * QUALITY_ONE, 10_000);
    ledger.add_trust_line(g1, y, eur(), 0, 100_000);
    ledger.add_trust_line(g2, y, eur(), 0, 100_000);

    let mut finder = Pathfinder::new(
        Some(cache_of(ledger)),
        x,
        y,
        usd(),
        Some(gu),
        Amount::issued(Issue::new(eur(), g1), 1_000),
    )
    .unwrap();

    assert!(finder.find_paths(1));
    finder.compute_path_ranks(1);

    let mut full = None;
    let mut extras = Vec::new();
    let best = finder.get_best_paths(1, &mut full, &mut extras, None);

    assert_eq!(best.len(), 1);
    // The shallow best-quality book won the cut...
    assert_eq!(best[0].elements()[1].issuer, Some(g1));
    // ...and the deep runner-up is reported as the full-liquidity path.
    let full = full.expect("full-liquidity path");
    assert_eq!(full.elements()[1].issuer, Some(g2));
    assert!(extras.is_empty());
}

/// The hard failure: no snapshot.
#[test]
fn test_missing_snapshot() {
    assert_eq!(
        Pathfinder::new(None, acct(1), acct(2), usd(), None, Amount::xrp(1)).unwrap_err(),
        PathError::NoLedger
    );
}
