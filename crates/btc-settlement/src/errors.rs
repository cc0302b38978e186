//! Error types for the settlement core.
//!
//! Every public operation surfaces one [`SettlementError`]; the host treats
//! any variant as fatal to the call. No variant implies partial writes: an
//! operation that errors has committed nothing.

use pontis_btc_state::PolicyError;
use thiserror::Error;

/// Errors surfaced by the settlement handler and its internals.
#[derive(Debug, Error)]
pub enum SettlementError {
    /// A stored record or submitted payload failed to decode.
    #[error("malformed record or payload: {0}")]
    Decode(#[from] std::io::Error),

    /// A transaction failed Bitcoin consensus decoding.
    #[error("malformed transaction encoding: {0}")]
    TxDecode(#[from] bitcoin::consensus::encode::Error),

    /// A record expected to exist was absent from the cache.
    #[error("no stored {0} for this transaction")]
    MissingRecord(&'static str),

    /// A stored record held data that cannot be interpreted.
    #[error("corrupt stored record: {0}")]
    CorruptRecord(&'static str),

    /// The signer already contributed to this transaction.
    #[error("signer {0} already recorded")]
    DuplicateSigner(String),

    /// The signature table already holds every required entry.
    #[error("signature table already complete with {0} entries")]
    QuorumClosed(usize),

    /// The coin selector found no viable input subset.
    #[error("no viable input selection for target of {target} sat")]
    InsufficientFunds { target: u64 },

    /// The submitted signature count does not match the input count.
    #[error("expected {want} signatures (one per input), got {got}")]
    SignatureCount { want: usize, got: usize },

    /// A submitted signature failed verification.
    #[error("signature verification failed for signer {signer} on input {input}")]
    SignatureVerify { signer: String, input: usize },

    /// Computing a signature hash failed.
    #[error("sighash computation failed: {0}")]
    Sighash(String),

    /// A transaction input matches neither a live nor a spent output.
    #[error("input {0} references no live or spent custody output")]
    UnknownUtxo(String),

    /// A payout request carried no payees.
    #[error("no payees in payout request")]
    NoPayees,

    /// A payee amount is zero or above the supply cap.
    #[error("invalid amount {amount} for payee {payee}")]
    InvalidAmount { payee: String, amount: u64 },

    /// The payee amounts sum past the supply cap.
    #[error("amount sum exceeds the satoshi supply cap")]
    AmountOverflow,

    /// The requesting contract is not the one bound to the custody pool.
    #[error("contract {got} does not match registered binding {want}")]
    ContractBindMismatch { got: String, want: String },

    /// The registry has no entry for the requested lookup.
    #[error("registry has no {what} for chain {chain_id}")]
    RegistryMissing { what: &'static str, chain_id: u64 },

    /// A required deposit payload field was empty.
    #[error("empty {0} in deposit payload")]
    EmptyDepositField(&'static str),

    /// The deposit transaction was already processed.
    #[error("deposit transaction already processed")]
    DuplicateDeposit,

    /// The redeem script is not a usable custody policy.
    #[error("custody policy: {0}")]
    Policy(#[from] PolicyError),

    /// A payee address failed to parse for the configured network.
    #[error("invalid payee address: {0}")]
    Address(String),

    /// The external proof verifier rejected the deposit.
    #[error("deposit proof rejected: {0}")]
    ProofVerify(String),

    /// Final witness or script assembly failed.
    #[error("final script assembly failed: {0}")]
    ScriptAssembly(String),

    /// A host collaborator failed.
    #[error("host collaborator failure: {0}")]
    Host(String),
}
