//! The static path-type table.
//!
//! The (source currency, destination currency) pair selects one of five
//! payment types; each payment type has a fixed, ordered list of path
//! shapes worth attempting, gated by search level. The table is built
//! once and shared; both dispatch and search read it.
//!
//! XRP legs are explicit: an `XrpBook` node is the position-in-XRP
//! element, so a native-funded payment always routes through the XRP
//! node rather than treating the first book as implicit.

use crate::path::{NodeType, PathType};
use std::collections::HashMap;
use std::sync::OnceLock;

/// Classification of a payment by its endpoint currencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PaymentType {
    /// Native to native; direct transfer only, no paths.
    XrpToXrp,
    /// Native source, issued destination.
    XrpToNonXrp,
    /// Issued source, native destination.
    NonXrpToXrp,
    /// Issued, same currency on both ends.
    NonXrpToSame,
    /// Issued, different currencies.
    NonXrpToNonXrp,
}

/// Select the payment type for a currency pair.
pub fn payment_type(src_is_xrp: bool, dst_is_xrp: bool, same_currency: bool) -> PaymentType {
    match (src_is_xrp, dst_is_xrp) {
        (true, true) => PaymentType::XrpToXrp,
        (true, false) => PaymentType::XrpToNonXrp,
        (false, true) => PaymentType::NonXrpToXrp,
        (false, false) if same_currency => PaymentType::NonXrpToSame,
        (false, false) => PaymentType::NonXrpToNonXrp,
    }
}

/// A path shape with the search level at which it becomes worth trying.
#[derive(Debug, Clone)]
pub struct PathTableEntry {
    /// Minimum search level for this shape.
    pub level: u8,
    /// The shape itself.
    pub path_type: PathType,
}

/// Path shapes per payment type.
pub type PathTable = HashMap<PaymentType, Vec<PathTableEntry>>;

fn entry(level: u8, nodes: &[NodeType]) -> PathTableEntry {
    PathTableEntry {
        level,
        path_type: nodes.to_vec(),
    }
}

/// Build (once) and return the path table.
pub fn init_path_table() -> &'static PathTable {
    static TABLE: OnceLock<PathTable> = OnceLock::new();
    TABLE.get_or_init(|| {
        use NodeType::{Accounts, Books, DestBook, Destination, Source, XrpBook};
        let mut table = PathTable::new();

        // Native to native settles directly; no path shapes at all.
        table.insert(PaymentType::XrpToXrp, Vec::new());

        table.insert(
            PaymentType::XrpToNonXrp,
            vec![
                entry(1, &[Source, XrpBook, DestBook, Destination]),
                entry(3, &[Source, XrpBook, DestBook, Accounts, Destination]),
                entry(5, &[Source, XrpBook, Books, DestBook, Destination]),
                entry(6, &[Source, XrpBook, Books, DestBook, Accounts, Destination]),
            ],
        );

        table.insert(
            PaymentType::NonXrpToXrp,
            vec![
                entry(1, &[Source, XrpBook, Destination]),
                entry(2, &[Source, Accounts, XrpBook, Destination]),
                entry(4, &[Source, Books, XrpBook, Destination]),
                entry(5, &[Source, Accounts, Books, XrpBook, Destination]),
            ],
        );

        table.insert(
            PaymentType::NonXrpToSame,
            vec![
                entry(1, &[Source, Destination]),
                entry(1, &[Source, Accounts, Destination]),
                entry(2, &[Source, Accounts, Accounts, Destination]),
                entry(4, &[Source, Accounts, Accounts, Accounts, Destination]),
                entry(5, &[Source, Books, DestBook, Destination]),
                entry(6, &[Source, XrpBook, DestBook, Destination]),
            ],
        );

        table.insert(
            PaymentType::NonXrpToNonXrp,
            vec![
                entry(1, &[Source, DestBook, Destination]),
                entry(2, &[Source, Accounts, DestBook, Destination]),
                entry(3, &[Source, DestBook, Accounts, Destination]),
                entry(4, &[Source, XrpBook, DestBook, Destination]),
                entry(5, &[Source, Accounts, XrpBook, DestBook, Destination]),
                entry(6, &[Source, Books, DestBook, Destination]),
                entry(7, &[Source, Accounts, DestBook, Accounts, Destination]),
            ],
        );

        table
    })
}
