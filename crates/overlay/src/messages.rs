//! Peer protocol messages.
//!
//! Only the handshake and ledger-data subset of the catalog lives here;
//! consensus and transaction relay have their own crates. On the wire a
//! message is a 6-byte header (length then type code) followed by a
//! bincode body; see [`crate::codec`].

use rtx_common::Hash256;
use rtx_crypto::handshake::Hello;
use serde::{Deserialize, Serialize};

/// Wire type codes. The gap between the handshake block and the ledger
/// block is reserved for the rest of the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum MessageType {
    /// First message on every connection.
    Hello = 1,
    /// Liveness probe.
    Ping = 2,
    /// Request ledger nodes by fingerprint.
    GetLedger = 31,
    /// Ledger nodes answering a `GetLedger`.
    LedgerData = 32,
    /// Request a transaction set by fingerprint.
    GetTxSet = 33,
    /// Transaction set answering a `GetTxSet`.
    TxSetData = 34,
}

impl MessageType {
    /// Decode a wire type code.
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(MessageType::Hello),
            2 => Some(MessageType::Ping),
            31 => Some(MessageType::GetLedger),
            32 => Some(MessageType::LedgerData),
            33 => Some(MessageType::GetTxSet),
            34 => Some(MessageType::TxSetData),
            _ => None,
        }
    }

    /// Human-readable name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            MessageType::Hello => "HELLO",
            MessageType::Ping => "PING",
            MessageType::GetLedger => "GET_LEDGER",
            MessageType::LedgerData => "LEDGER_DATA",
            MessageType::GetTxSet => "GET_TX_SET",
            MessageType::TxSetData => "TX_SET_DATA",
        }
    }
}

/// Liveness probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ping {
    /// Echoed back by the peer.
    pub seq: u32,
}

/// Which part of a ledger a `GetLedger` asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerItemKind {
    /// Header and root information.
    Base,
    /// Transaction tree nodes.
    TxNode,
    /// Account state tree nodes.
    AsNode,
}

/// Request for ledger data, broadcast or unicast by an acquisition set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetLedger {
    /// Fingerprint of the wanted ledger.
    pub fingerprint: Hash256,
    /// Sequence hint, when known.
    pub seq: Option<u32>,
    /// Which part of the ledger is wanted.
    pub item: LedgerItemKind,
    /// How many tree levels below the requested nodes to include.
    pub query_depth: u8,
}

impl GetLedger {
    /// The base query issued when acquisition of a ledger starts.
    pub fn base(fingerprint: Hash256) -> Self {
        Self {
            fingerprint,
            seq: None,
            item: LedgerItemKind::Base,
            query_depth: 0,
        }
    }
}

/// Ledger nodes answering a [`GetLedger`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerData {
    /// Fingerprint the nodes belong to; routes the reply to its peer set.
    pub fingerprint: Hash256,
    /// Raw tree nodes.
    pub nodes: Vec<Vec<u8>>,
}

/// Request for a transaction set by fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetTxSet {
    /// Fingerprint of the wanted transaction set.
    pub fingerprint: Hash256,
}

/// Transaction set answering a [`GetTxSet`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxSetData {
    /// Fingerprint of the carried set.
    pub fingerprint: Hash256,
    /// Serialized transactions.
    pub transactions: Vec<Vec<u8>>,
}

/// A peer protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Handshake Hello.
    Hello(Hello),
    /// Liveness probe.
    Ping(Ping),
    /// Ledger data request.
    GetLedger(GetLedger),
    /// Ledger data reply.
    LedgerData(LedgerData),
    /// Transaction set request.
    GetTxSet(GetTxSet),
    /// Transaction set reply.
    TxSetData(TxSetData),
}

impl Message {
    /// The wire type code for this message.
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::Hello(_) => MessageType::Hello,
            Message::Ping(_) => MessageType::Ping,
            Message::GetLedger(_) => MessageType::GetLedger,
            Message::LedgerData(_) => MessageType::LedgerData,
            Message::GetTxSet(_) => MessageType::GetTxSet,
            Message::TxSetData(_) => MessageType::TxSetData,
        }
    }

    /// Human-readable name for logs.
    pub fn type_name(&self) -> &'static str {
        self.message_type().name()
    }
}
