//! Unsigned settlement transaction assembly.
//!
//! The builder turns a validated payout request into an unsigned transaction:
//! payee outputs resolved against the configured network, inputs chosen by
//! the coin selector, the fee shared across payees in proportion to their
//! amounts, and any change routed back to the custody lock script.

use std::{collections::BTreeMap, str::FromStr};

use bitcoin::{
    absolute::LockTime, consensus, hashes::Hash, transaction::Version, Address, Amount, Network,
    OutPoint as BtcOutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid, Witness,
};
use pontis_btc_state::{CustodyPolicy, UtxoSet, MAX_SATOSHI};

use crate::{config::SettlementParams, errors::SettlementError, selector::CoinSelector};

/// An assembled unsigned transaction, ready to persist and announce.
#[derive(Debug)]
pub(crate) struct BuiltTx {
    pub tx: Transaction,
    pub txid: Txid,
    /// Consensus encoding of `tx`.
    pub raw: Vec<u8>,
    /// Value of each input, in input order.
    pub input_amounts: Vec<u64>,
}

/// Assembles an unsigned payout transaction drawing on `available`.
pub(crate) fn assemble_unsigned_tx(
    params: &SettlementParams,
    network: Network,
    policy: &CustodyPolicy,
    available: UtxoSet,
    amounts: &BTreeMap<String, u64>,
) -> Result<BuiltTx, SettlementError> {
    if amounts.is_empty() {
        return Err(SettlementError::NoPayees);
    }
    let mut amount_sum: u64 = 0;
    for (payee, &amount) in amounts {
        if amount == 0 || amount > MAX_SATOSHI {
            return Err(SettlementError::InvalidAmount {
                payee: payee.clone(),
                amount,
            });
        }
        amount_sum = amount_sum
            .checked_add(amount)
            .ok_or(SettlementError::AmountOverflow)?;
    }
    if amount_sum > MAX_SATOSHI {
        return Err(SettlementError::AmountOverflow);
    }

    let mut outs = Vec::with_capacity(amounts.len() + 1);
    for (payee, &amount) in amounts {
        let address = Address::from_str(payee)
            .map_err(|e| SettlementError::Address(format!("{payee}: {e}")))?
            .require_network(network)
            .map_err(|e| SettlementError::Address(format!("{payee}: {e}")))?;
        outs.push(TxOut {
            value: Amount::from_sat(amount),
            script_pubkey: address.script_pubkey(),
        });
    }

    let change_script = policy.lock_script();

    // The change slot participates in size estimation even when the final
    // transaction ends up without a change output.
    let mut projected = outs.clone();
    projected.push(TxOut {
        value: Amount::ZERO,
        script_pubkey: change_script.clone(),
    });

    let mut sorted = available;
    sorted.sort_for_selection();
    let selection = CoinSelector::new(
        sorted.as_slice(),
        amount_sum,
        params.min_change,
        params.max_fee_ratio,
        params.overshoot,
        &projected,
        params.search_tries,
        params.fee_rate,
        policy.m(),
        policy.n(),
    )
    .select()
    .ok_or(SettlementError::InsufficientFunds { target: amount_sum })?;

    // Inputs preserve selection order. Each carries the spent output's
    // locking script in script_sig; the aggregator lifts it out later to
    // recover the input's script class.
    let mut inputs = Vec::with_capacity(selection.utxos.len());
    let mut input_amounts = Vec::with_capacity(selection.utxos.len());
    for utxo in &selection.utxos {
        let txid = Txid::from_slice(utxo.outpoint().hash())
            .map_err(|_| SettlementError::CorruptRecord("stored outpoint is not a txid"))?;
        inputs.push(TxIn {
            previous_output: BtcOutPoint {
                txid,
                vout: utxo.outpoint().index(),
            },
            script_sig: ScriptBuf::from_bytes(utxo.script_pubkey().to_vec()),
            sequence: Sequence::MAX,
            witness: Witness::new(),
        });
        input_amounts.push(utxo.value());
    }

    apportion_fee(&mut outs, selection.fee, amount_sum);

    let change_value = selection.sum - amount_sum;
    if change_value > 0 {
        outs.push(TxOut {
            value: Amount::from_sat(change_value),
            script_pubkey: change_script,
        });
    }

    let tx = Transaction {
        version: Version::ONE,
        lock_time: LockTime::ZERO,
        input: inputs,
        output: outs,
    };
    let raw = consensus::serialize(&tx);
    let txid = tx.compute_txid();

    Ok(BuiltTx {
        tx,
        txid,
        raw,
        input_amounts,
    })
}

/// Splits `fee` across the payee outputs in proportion to their value.
///
/// Each payee pays `floor(fee * value / amount_sum)`; flooring means the
/// payees collectively cover slightly less than the estimate, and the
/// difference is simply not charged.
pub(crate) fn apportion_fee(outs: &mut [TxOut], fee: u64, amount_sum: u64) {
    for out in outs {
        let value = out.value.to_sat();
        let share = ((fee as u128 * value as u128) / amount_sum as u128) as u64;
        out.value = Amount::from_sat(value - share);
    }
}
