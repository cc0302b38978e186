//! Events the settlement core announces to the host.

use pontis_btc_state::RedeemKey;

/// Notifications emitted by the settlement handler.
///
/// Raw transactions travel hex-encoded, matching what relayers and off-chain
/// signers consume directly.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SettlementEvent {
    /// An unsigned settlement transaction was assembled and persisted;
    /// off-chain signers should produce partial signatures for it.
    TxAssembled {
        redeem_key: RedeemKey,
        raw_tx_hex: String,
        /// Value of each selected input, in selection order.
        input_amounts: Vec<u64>,
    },

    /// A partial signature was accepted but the quorum is not complete yet.
    SignatureCollected {
        tx_hash: Vec<u8>,
        /// Serialized signature table after the insertion.
        info_bytes: Vec<u8>,
    },

    /// The quorum completed; the finalized transaction is ready to relay.
    RelayReady {
        from_chain_id: u64,
        to_chain_id: u64,
        raw_tx_hex: String,
        from_tx_hash_hex: String,
        redeem_key: RedeemKey,
    },
}
