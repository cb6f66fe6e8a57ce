//! Payment paths and their element alphabet.

use crate::types::{AccountId, Currency};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Longest path we will build, in elements.
pub const MAX_PATH_LENGTH: usize = 8;

/// Classification of a path element within a path type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeType {
    /// The source account, with its issuer when one applies.
    Source,
    /// An account reached over a trust line.
    Accounts,
    /// Any order book out of the current issue.
    Books,
    /// The position in XRP: the order book into XRP, or the XRP node
    /// itself when the position is already native.
    XrpBook,
    /// The order book delivering the destination currency.
    DestBook,
    /// The destination account.
    Destination,
}

/// An ordered sequence of node types describing the shape of a path.
pub type PathType = Vec<NodeType>;

/// Render a path type compactly for logs, e.g. `s-x-f-d`.
pub fn path_type_string(path_type: &PathType) -> String {
    path_type
        .iter()
        .map(|nt| match nt {
            NodeType::Source => "s",
            NodeType::Accounts => "a",
            NodeType::Books => "b",
            NodeType::XrpBook => "x",
            NodeType::DestBook => "f",
            NodeType::Destination => "d",
        })
        .collect::<Vec<_>>()
        .join("-")
}

/// One step of a payment path: a node-type-tagged (account, currency,
/// issuer) triple. Account elements carry an account; book elements
/// carry only the issue they deliver.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PathElement {
    /// How this element was produced.
    pub node_type: NodeType,
    /// The account, for account-shaped elements.
    pub account: Option<AccountId>,
    /// The currency held after this element.
    pub currency: Option<Currency>,
    /// The issuer of that currency; `None` for XRP.
    pub issuer: Option<AccountId>,
}

impl PathElement {
    /// An account element.
    pub fn account(node_type: NodeType, account: AccountId, currency: Currency) -> Self {
        let issuer = if currency.is_xrp() {
            None
        } else {
            Some(account)
        };
        Self {
            node_type,
            account: Some(account),
            currency: Some(currency),
            issuer,
        }
    }

    /// A book element delivering `currency`/`issuer`.
    pub fn book(node_type: NodeType, currency: Currency, issuer: Option<AccountId>) -> Self {
        Self {
            node_type,
            account: None,
            currency: Some(currency),
            issuer,
        }
    }

    /// The source element of a search.
    pub fn source(account: AccountId, currency: Currency, issuer: Option<AccountId>) -> Self {
        let issuer = if currency.is_xrp() {
            None
        } else {
            Some(issuer.unwrap_or(account))
        };
        Self {
            node_type: NodeType::Source,
            account: Some(account),
            currency: Some(currency),
            issuer,
        }
    }

    /// Whether two elements describe the same hop, ignoring their tags.
    /// Adjacent elements with the same triple are forbidden.
    pub fn same_hop(&self, other: &PathElement) -> bool {
        self.account == other.account
            && self.currency == other.currency
            && self.issuer == other.issuer
    }

    /// Whether this element is account-shaped.
    pub fn is_account(&self) -> bool {
        self.account.is_some()
    }
}

impl fmt::Debug for PathElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.account, self.currency, self.issuer) {
            (Some(account), _, _) => write!(f, "{:?}({})", self.node_type, account),
            (None, Some(currency), Some(issuer)) => {
                write!(f, "{:?}({}/{})", self.node_type, currency, issuer)
            }
            (None, Some(currency), None) => write!(f, "{:?}({})", self.node_type, currency),
            _ => write!(f, "{:?}", self.node_type),
        }
    }
}

/// An ordered sequence of path elements from source to destination.
///
/// Immutable once complete; the search only ever appends while a path is
/// partial.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Path {
    elements: Vec<PathElement>,
}

impl Path {
    /// A path holding just the source element.
    pub fn seeded(source: PathElement) -> Self {
        Self {
            elements: vec![source],
        }
    }

    /// The elements in order.
    pub fn elements(&self) -> &[PathElement] {
        &self.elements
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Whether the path has no elements.
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// The last element, if any.
    pub fn last(&self) -> Option<&PathElement> {
        self.elements.last()
    }

    /// Extend by one element. Fails (returns `None`) when the element
    /// duplicates the previous hop or the path is at maximum length.
    pub fn extended(&self, element: PathElement) -> Option<Path> {
        if self.elements.len() >= MAX_PATH_LENGTH {
            return None;
        }
        if let Some(last) = self.elements.last() {
            if last.same_hop(&element) {
                return None;
            }
        }
        let mut elements = self.elements.clone();
        elements.push(element);
        Some(Path { elements })
    }

    /// Whether the path already visits this (account, currency, issuer)
    /// triple. Used to prevent loops.
    pub fn has_seen(
        &self,
        account: &AccountId,
        currency: &Currency,
        issuer: Option<&AccountId>,
    ) -> bool {
        self.elements.iter().any(|e| {
            e.account.as_ref() == Some(account)
                && e.currency.as_ref() == Some(currency)
                && e.issuer.as_ref() == issuer
        })
    }

    /// Structural key ignoring node-type tags; two paths with the same
    /// key move value identically.
    pub fn fingerprint(&self) -> Vec<(Option<AccountId>, Option<Currency>, Option<AccountId>)> {
        self.elements
            .iter()
            .map(|e| (e.account, e.currency, e.issuer))
            .collect()
    }
}
