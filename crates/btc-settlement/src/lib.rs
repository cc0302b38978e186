//! Cross-chain BTC settlement core.
//!
//! This crate turns validated inbound Bitcoin deposits into outbound
//! settlement transactions under a federated M-of-N custody policy. It owns
//! three tightly coupled pieces:
//!
//! - the custody pool: persisted UTXO/STXO sets per `(chain, redeem key)`,
//!   credited by deposits and retired when settlements finalize;
//! - transaction assembly: coin selection under a fee-loss bound, payee
//!   outputs with proportional fee sharing, change back to the pool;
//! - multisig aggregation: per-signer signature verification against the
//!   input digests, and final witness/scriptSig assembly once the quorum
//!   completes.
//!
//! Everything else (SPV proof verification, registry data, deposit
//! deduplication, persistence, event delivery) is consumed through the
//! traits in [`traits`], supplied by the hosting dispatch layer.

mod builder;
mod config;
mod errors;
mod events;
mod handler;
mod keys;
mod multisig;
mod selector;
mod store;
mod traits;

#[cfg(test)]
mod test_utils;

pub use config::SettlementParams;
pub use errors::SettlementError;
pub use events::SettlementEvent;
pub use handler::{MultiSignParams, SettlementHandler};
pub use keys::{
    SIG_INFO_PREFIX, STXOS_PREFIX, TX_ORIGIN_PREFIX, UNSIGNED_TX_PREFIX, UTXOS_PREFIX,
};
pub use selector::{CoinSelector, Selection};
pub use traits::{
    CacheDb, ContractBind, DepositVerifier, DoneTxLedger, EventSink, SideChainRegistry,
};
