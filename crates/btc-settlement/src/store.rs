//! Persistence over the host cache.
//!
//! Reads go straight to the [`CacheDb`]; writes are staged in a
//! [`WriteBatch`] and applied only when the surrounding operation has fully
//! succeeded. Missing UTXO/STXO/signature records read as empty; missing
//! transaction and origin records are errors.

use bitcoin::{consensus, Transaction, TxIn};
use borsh::BorshDeserialize;
use pontis_btc_state::{MultiSignInfo, OutPoint, RedeemKey, TxOrigin, Utxo, UtxoSet};

use crate::{
    errors::SettlementError,
    keys,
    traits::{CacheDb, SideChainRegistry},
};

/// Staged cache writes for one operation.
///
/// Nothing reaches the cache until [`WriteBatch::commit`]; dropping the batch
/// discards everything, which is how failed operations leave no partial
/// state.
#[derive(Debug, Default)]
pub(crate) struct WriteBatch {
    puts: Vec<(Vec<u8>, Vec<u8>)>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.puts.push((key, value));
    }

    pub fn commit(self, cache: &mut dyn CacheDb) -> Result<(), SettlementError> {
        for (key, value) in self.puts {
            cache.put(key, value)?;
        }
        Ok(())
    }
}

fn load_record<T: BorshDeserialize>(
    cache: &dyn CacheDb,
    key: &[u8],
) -> Result<Option<T>, SettlementError> {
    match cache.get(key)? {
        Some(bytes) => Ok(Some(borsh::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

/// Loads the live output set for a custody pool; absent reads as empty.
pub(crate) fn load_utxos(
    cache: &dyn CacheDb,
    contract: &[u8],
    chain_id: u64,
    redeem_key: &RedeemKey,
) -> Result<UtxoSet, SettlementError> {
    Ok(load_record(cache, &keys::utxos_key(contract, chain_id, redeem_key))?.unwrap_or_default())
}

/// Loads the spent-output receipts for a custody pool; absent reads as empty.
pub(crate) fn load_stxos(
    cache: &dyn CacheDb,
    contract: &[u8],
    chain_id: u64,
    redeem_key: &RedeemKey,
) -> Result<UtxoSet, SettlementError> {
    Ok(load_record(cache, &keys::stxos_key(contract, chain_id, redeem_key))?.unwrap_or_default())
}

/// Loads the signature table for a transaction; absent reads as empty.
pub(crate) fn load_sig_info(
    cache: &dyn CacheDb,
    contract: &[u8],
    tx_hash: &[u8],
) -> Result<MultiSignInfo, SettlementError> {
    Ok(load_record(cache, &keys::sig_info_key(contract, tx_hash))?
        .unwrap_or_else(MultiSignInfo::new_empty))
}

/// Loads and decodes a stored unsigned transaction.
pub(crate) fn load_unsigned_tx(
    cache: &dyn CacheDb,
    contract: &[u8],
    tx_hash: &[u8],
) -> Result<Transaction, SettlementError> {
    let bytes = cache
        .get(&keys::unsigned_tx_key(contract, tx_hash))?
        .ok_or(SettlementError::MissingRecord("unsigned transaction"))?;
    Ok(consensus::deserialize(&bytes)?)
}

/// Loads the origin record of a settlement transaction.
pub(crate) fn load_tx_origin(
    cache: &dyn CacheDb,
    contract: &[u8],
    tx_hash: &[u8],
) -> Result<TxOrigin, SettlementError> {
    load_record(cache, &keys::tx_origin_key(contract, tx_hash))?
        .ok_or(SettlementError::MissingRecord("origin record"))
}

pub(crate) fn stage_utxos(
    batch: &mut WriteBatch,
    contract: &[u8],
    chain_id: u64,
    redeem_key: &RedeemKey,
    utxos: &UtxoSet,
) -> Result<(), SettlementError> {
    batch.put(
        keys::utxos_key(contract, chain_id, redeem_key),
        borsh::to_vec(utxos)?,
    );
    Ok(())
}

/// Appends spent-output receipts, skipping any outpoint already recorded.
pub(crate) fn stage_stxos_append(
    batch: &mut WriteBatch,
    cache: &dyn CacheDb,
    contract: &[u8],
    chain_id: u64,
    redeem_key: &RedeemKey,
    spent: Vec<Utxo>,
) -> Result<(), SettlementError> {
    let mut stxos = load_stxos(cache, contract, chain_id, redeem_key)?;
    for utxo in spent {
        if !stxos.contains(utxo.outpoint()) {
            stxos.push(utxo);
        }
    }
    batch.put(
        keys::stxos_key(contract, chain_id, redeem_key),
        borsh::to_vec(&stxos)?,
    );
    Ok(())
}

pub(crate) fn stage_sig_info(
    batch: &mut WriteBatch,
    contract: &[u8],
    tx_hash: &[u8],
    info: &MultiSignInfo,
) -> Result<(), SettlementError> {
    batch.put(keys::sig_info_key(contract, tx_hash), borsh::to_vec(info)?);
    Ok(())
}

pub(crate) fn stage_unsigned_tx(
    batch: &mut WriteBatch,
    contract: &[u8],
    tx_hash: &[u8],
    raw: Vec<u8>,
) {
    batch.put(keys::unsigned_tx_key(contract, tx_hash), raw);
}

pub(crate) fn stage_tx_origin(
    batch: &mut WriteBatch,
    contract: &[u8],
    tx_hash: &[u8],
    origin: &TxOrigin,
) -> Result<(), SettlementError> {
    batch.put(
        keys::tx_origin_key(contract, tx_hash),
        borsh::to_vec(origin)?,
    );
    Ok(())
}

/// Credits custody outputs of a confirmed deposit transaction.
///
/// Each output whose script matches the lock script of a redeem script
/// registered for `chain_id` becomes a new tracked UTXO. Idempotent within
/// the call: an outpoint already present in the set is not appended twice.
pub(crate) fn add_utxos(
    batch: &mut WriteBatch,
    cache: &dyn CacheDb,
    registry: &dyn SideChainRegistry,
    contract: &[u8],
    chain_id: u64,
    height: u32,
    tx: &Transaction,
) -> Result<(), SettlementError> {
    let txid = tx.compute_txid();
    for redeem_script in registry.tracked_redeem_scripts(chain_id)? {
        let lock = bitcoin::ScriptBuf::new_p2wsh(
            &bitcoin::Script::from_bytes(&redeem_script).wscript_hash(),
        );
        let redeem_key = RedeemKey::of_script(&redeem_script);

        let mut utxos: Option<UtxoSet> = None;
        for (index, out) in tx.output.iter().enumerate() {
            if out.script_pubkey != lock {
                continue;
            }
            let set = match utxos.as_mut() {
                Some(set) => set,
                None => {
                    utxos = Some(load_utxos(cache, contract, chain_id, &redeem_key)?);
                    utxos.as_mut().expect("just inserted")
                }
            };
            let outpoint = OutPoint::from_txid(txid, index as u32);
            if set.contains(&outpoint) {
                continue;
            }
            set.push(Utxo::new(
                outpoint,
                height,
                out.value.to_sat(),
                out.script_pubkey.to_bytes(),
            ));
        }
        if let Some(set) = utxos {
            stage_utxos(batch, contract, chain_id, &redeem_key, &set)?;
        }
    }
    Ok(())
}

/// Resolves each input of a settlement transaction to its funding value.
///
/// Live entries are pruned from the in-memory `utxos` copy and returned as
/// the receipts to persist on completion; inputs no longer live fall back to
/// the already-persisted receipts in `stxos`. Unknown inputs are fatal.
pub(crate) fn resolve_input_amounts(
    utxos: &mut UtxoSet,
    stxos: &UtxoSet,
    inputs: &[TxIn],
) -> Result<(Vec<u64>, Vec<Utxo>), SettlementError> {
    let mut amounts = Vec::with_capacity(inputs.len());
    let mut spent = Vec::with_capacity(inputs.len());
    for input in inputs {
        if let Some(pos) = utxos.position_spent_by(&input.previous_output) {
            let utxo = utxos.remove_at(pos);
            amounts.push(utxo.value());
            spent.push(utxo);
        } else if let Some(utxo) = stxos.find_spent_by(&input.previous_output) {
            amounts.push(utxo.value());
            spent.push(utxo.clone());
        } else {
            return Err(SettlementError::UnknownUtxo(
                input.previous_output.to_string(),
            ));
        }
    }
    Ok((amounts, spent))
}
