//! Partial-signature verification and final script assembly.
//!
//! Signatures arrive as DER bytes with a trailing sighash-type byte, one per
//! input. Each is checked against the digest the input actually commits to:
//! BIP143 for inputs that spent a P2WSH custody output, the legacy digest
//! otherwise, in both cases over the redeem script. A signature counts only
//! if it verifies under a policy key whose signer address matches the
//! submitting signer.

use bitcoin::{
    hashes::Hash,
    script::{Builder, PushBytesBuf},
    secp256k1::{ecdsa::Signature, Message, Secp256k1},
    sighash::SighashCache,
    Amount, EcdsaSighashType, ScriptBuf, Transaction, Witness,
};
use pontis_btc_state::{CustodyPolicy, MultiSignInfo};

use crate::errors::SettlementError;

/// Verifies one signer's per-input signatures against the hashable
/// transaction form (input scripts already lifted into `pk_scripts`).
pub(crate) fn verify_signer_sigs(
    tx: &Transaction,
    pk_scripts: &[ScriptBuf],
    policy: &CustodyPolicy,
    signer: &str,
    sigs: &[Vec<u8>],
    input_amounts: &[u64],
) -> Result<(), SettlementError> {
    if sigs.len() != tx.input.len() {
        return Err(SettlementError::SignatureCount {
            want: tx.input.len(),
            got: sigs.len(),
        });
    }

    let secp = Secp256k1::verification_only();
    let mut cache = SighashCache::new(tx);

    for (i, sig) in sigs.iter().enumerate() {
        let [der @ .., hash_byte] = sig.as_slice() else {
            return Err(SettlementError::SignatureVerify {
                signer: signer.to_owned(),
                input: i,
            });
        };
        let hash_ty = EcdsaSighashType::from_consensus(*hash_byte as u32);
        let signature = Signature::from_der(der).map_err(|_| SettlementError::SignatureVerify {
            signer: signer.to_owned(),
            input: i,
        })?;

        let digest = if pk_scripts[i].is_p2wsh() {
            cache
                .p2wsh_signature_hash(
                    i,
                    policy.redeem_script(),
                    Amount::from_sat(input_amounts[i]),
                    hash_ty,
                )
                .map_err(|e| SettlementError::Sighash(e.to_string()))?
                .to_byte_array()
        } else {
            cache
                .legacy_signature_hash(i, policy.redeem_script(), hash_ty.to_u32())
                .map_err(|e| SettlementError::Sighash(e.to_string()))?
                .to_byte_array()
        };
        let msg = Message::from_digest(digest);

        let matched = policy
            .pubkeys()
            .iter()
            .zip(policy.addresses())
            .any(|(pk, addr)| {
                secp.verify_ecdsa(&msg, &signature, &pk.inner).is_ok() && addr.as_str() == signer
            });
        if !matched {
            return Err(SettlementError::SignatureVerify {
                signer: signer.to_owned(),
                input: i,
            });
        }
    }
    Ok(())
}

/// Installs the final witness or scriptSig on every input.
///
/// Takes the first `m` recorded signature sets in policy address order
/// (script key order), so CHECKMULTISIG sees signatures in the order it
/// expects.
pub(crate) fn finalize_tx(
    tx: &mut Transaction,
    pk_scripts: &[ScriptBuf],
    policy: &CustodyPolicy,
    info: &MultiSignInfo,
) -> Result<(), SettlementError> {
    for i in 0..tx.input.len() {
        let mut chosen: Vec<&[u8]> = Vec::with_capacity(policy.m());
        for addr in policy.addresses() {
            if chosen.len() == policy.m() {
                break;
            }
            if let Some(sigs) = info.signatures(addr) {
                let sig = sigs.get(i).ok_or(SettlementError::CorruptRecord(
                    "signature table shorter than transaction inputs",
                ))?;
                chosen.push(sig);
            }
        }
        if chosen.len() < policy.m() {
            return Err(SettlementError::ScriptAssembly(format!(
                "only {} of {} required signatures available",
                chosen.len(),
                policy.m()
            )));
        }

        if pk_scripts[i].is_p2wsh() {
            let mut items: Vec<Vec<u8>> = Vec::with_capacity(chosen.len() + 2);
            // CHECKMULTISIG pops one item more than it verifies.
            items.push(Vec::new());
            items.extend(chosen.iter().map(|sig| sig.to_vec()));
            items.push(policy.redeem_script().to_bytes());
            tx.input[i].witness = Witness::from_slice(&items);
            tx.input[i].script_sig = ScriptBuf::new();
        } else {
            let mut builder = Builder::new().push_opcode(bitcoin::opcodes::OP_0);
            for sig in &chosen {
                let push = PushBytesBuf::try_from(sig.to_vec()).map_err(|_| {
                    SettlementError::ScriptAssembly("oversized signature push".to_owned())
                })?;
                builder = builder.push_slice(push);
            }
            let redeem = PushBytesBuf::try_from(policy.redeem_script().to_bytes())
                .map_err(|_| {
                    SettlementError::ScriptAssembly("oversized redeem script push".to_owned())
                })?;
            tx.input[i].script_sig = builder.push_slice(redeem).into_script();
            tx.input[i].witness = Witness::new();
        }
    }
    Ok(())
}
