//! Persistent record types for the BTC settlement core.
//!
//! Everything in this crate is either written to the host cache (UTXO sets,
//! signature tables, origin records) or decoded from a host payload
//! (cross-chain messages, deposit parameters). Record layouts are hand-written
//! borsh impls over the [`pontis_codec`] primitives so stored bytes stay
//! stable across releases.

mod msgs;
mod multisig;
mod origin;
mod policy;
mod utxo;

pub use msgs::{CrossChainMsg, DepositParams, WithdrawRequest};
pub use multisig::MultiSignInfo;
pub use origin::TxOrigin;
pub use policy::{CustodyPolicy, PolicyError, RedeemKey};
pub use utxo::{OutPoint, Utxo, UtxoSet};

/// Total bitcoin supply cap in satoshis.
///
/// Per-payee amounts and their sum are both bounded by this.
pub const MAX_SATOSHI: u64 = 2_100_000_000_000_000;
