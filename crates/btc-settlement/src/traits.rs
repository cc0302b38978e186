//! Host collaborator seams.
//!
//! The settlement core runs inside a block-processing pipeline that owns
//! persistence, registry data, deposit deduplication, SPV verification, and
//! event delivery. Each of those concerns is consumed through one of the
//! small traits here; the host wires in its implementations when it
//! constructs the handler.

use bitcoin::Network;
use pontis_btc_state::{CrossChainMsg, RedeemKey};

use crate::{errors::SettlementError, events::SettlementEvent};

/// Byte-keyed transactional cache supplied by the host.
///
/// The host is expected to wrap each handler call in a commit/rollback
/// boundary; the handler additionally stages its own writes and applies them
/// only on success, so a failed operation leaves no partial state either way.
pub trait CacheDb {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, SettlementError>;
    fn put(&mut self, key: Vec<u8>, value: Vec<u8>) -> Result<(), SettlementError>;
    fn delete(&mut self, key: &[u8]) -> Result<(), SettlementError>;
}

/// Registered binding between a custody pool and a source-chain contract.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ContractBind {
    /// Contract allowed to request payouts from the pool.
    pub contract: Vec<u8>,
}

/// Side-chain registry lookups.
pub trait SideChainRegistry {
    /// Redeem script registered under `redeem_key` for `chain_id`.
    fn redeem_script(
        &self,
        redeem_key: &RedeemKey,
        chain_id: u64,
    ) -> Result<Option<Vec<u8>>, SettlementError>;

    /// Bitcoin network parameters for `chain_id`.
    fn net_param(&self, chain_id: u64) -> Result<Option<Network>, SettlementError>;

    /// Contract binding for payouts from `redeem_key` requested by
    /// `from_chain_id` toward `to_chain_id`.
    fn contract_bind(
        &self,
        to_chain_id: u64,
        from_chain_id: u64,
        redeem_key: &RedeemKey,
    ) -> Result<Option<ContractBind>, SettlementError>;

    /// Every custody redeem script registered for `chain_id`; deposit
    /// crediting matches transaction outputs against their lock scripts.
    fn tracked_redeem_scripts(&self, chain_id: u64) -> Result<Vec<Vec<u8>>, SettlementError>;
}

/// Ledger of already-processed source-chain transactions.
pub trait DoneTxLedger {
    /// Whether `tx_hash` on `chain_id` was already processed.
    fn check(&self, tx_hash: &[u8], chain_id: u64) -> Result<bool, SettlementError>;

    /// Marks `tx_hash` on `chain_id` as processed.
    fn put(&mut self, tx_hash: &[u8], chain_id: u64) -> Result<(), SettlementError>;
}

/// External SPV proof verification for inbound deposits.
pub trait DepositVerifier {
    /// Verifies `proof` against `extra` (the consensus-encoded deposit
    /// transaction) and yields the canonical cross-chain message.
    fn verify_from_btc_tx(
        &self,
        proof: &[u8],
        extra: &[u8],
        source_chain_id: u64,
        height: u32,
    ) -> Result<CrossChainMsg, SettlementError>;
}

/// Outbound notification sink.
///
/// Events are delivered only after the emitting operation has committed; the
/// handler buffers them internally until then.
pub trait EventSink {
    fn emit(&mut self, event: SettlementEvent);
}
