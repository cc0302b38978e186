//! Cache key construction.
//!
//! Every key is the hosting contract address, a record-kind prefix, then the
//! record-specific parts, concatenated. Chain identifiers are fixed-width
//! little-endian so keys never collide across part boundaries.

use pontis_btc_state::RedeemKey;

pub const UNSIGNED_TX_PREFIX: &[u8] = b"unsignedTx";
pub const SIG_INFO_PREFIX: &[u8] = b"sigInfo";
pub const UTXOS_PREFIX: &[u8] = b"utxos";
pub const STXOS_PREFIX: &[u8] = b"stxos";
pub const TX_ORIGIN_PREFIX: &[u8] = b"txOrigin";

fn concat_key(contract: &[u8], prefix: &[u8], parts: &[&[u8]]) -> Vec<u8> {
    let len = contract.len() + prefix.len() + parts.iter().map(|p| p.len()).sum::<usize>();
    let mut key = Vec::with_capacity(len);
    key.extend_from_slice(contract);
    key.extend_from_slice(prefix);
    for part in parts {
        key.extend_from_slice(part);
    }
    key
}

pub(crate) fn unsigned_tx_key(contract: &[u8], tx_hash: &[u8]) -> Vec<u8> {
    concat_key(contract, UNSIGNED_TX_PREFIX, &[tx_hash])
}

pub(crate) fn sig_info_key(contract: &[u8], tx_hash: &[u8]) -> Vec<u8> {
    concat_key(contract, SIG_INFO_PREFIX, &[tx_hash])
}

pub(crate) fn utxos_key(contract: &[u8], chain_id: u64, redeem_key: &RedeemKey) -> Vec<u8> {
    concat_key(
        contract,
        UTXOS_PREFIX,
        &[&chain_id.to_le_bytes(), redeem_key.as_bytes()],
    )
}

pub(crate) fn stxos_key(contract: &[u8], chain_id: u64, redeem_key: &RedeemKey) -> Vec<u8> {
    concat_key(
        contract,
        STXOS_PREFIX,
        &[&chain_id.to_le_bytes(), redeem_key.as_bytes()],
    )
}

pub(crate) fn tx_origin_key(contract: &[u8], tx_hash: &[u8]) -> Vec<u8> {
    concat_key(contract, TX_ORIGIN_PREFIX, &[tx_hash])
}
