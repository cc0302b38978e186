//! In-memory host collaborators and fixtures for tests.

use std::collections::{HashMap, HashSet};

use bitcoin::{
    hashes::Hash,
    opcodes::all::{OP_CHECKMULTISIG, OP_PUSHNUM_1},
    script::Builder,
    secp256k1::{Message, Secp256k1, SecretKey},
    sighash::SighashCache,
    Address, Amount, EcdsaSighashType, Network, PublicKey, ScriptBuf, Transaction,
};
use pontis_btc_state::{CrossChainMsg, CustodyPolicy, RedeemKey};

use crate::{
    errors::SettlementError,
    events::SettlementEvent,
    traits::{CacheDb, ContractBind, DepositVerifier, DoneTxLedger, EventSink, SideChainRegistry},
};

#[derive(Debug, Default)]
pub(crate) struct MemCache {
    entries: HashMap<Vec<u8>, Vec<u8>>,
}

impl CacheDb for MemCache {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, SettlementError> {
        Ok(self.entries.get(key).cloned())
    }

    fn put(&mut self, key: Vec<u8>, value: Vec<u8>) -> Result<(), SettlementError> {
        self.entries.insert(key, value);
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), SettlementError> {
        self.entries.remove(key);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub(crate) struct MockRegistry {
    pub redeem_scripts: HashMap<(RedeemKey, u64), Vec<u8>>,
    pub networks: HashMap<u64, Network>,
    pub binds: HashMap<(u64, u64, RedeemKey), ContractBind>,
    pub tracked: HashMap<u64, Vec<Vec<u8>>>,
}

impl MockRegistry {
    /// Registers a custody policy for `chain_id` with the given binding.
    pub fn register(
        &mut self,
        chain_id: u64,
        redeem_script: &[u8],
        network: Network,
        from_chain_id: u64,
        bound_contract: &[u8],
    ) -> RedeemKey {
        let rk = RedeemKey::of_script(redeem_script);
        self.redeem_scripts
            .insert((rk, chain_id), redeem_script.to_vec());
        self.networks.insert(chain_id, network);
        self.binds.insert(
            (chain_id, from_chain_id, rk),
            ContractBind {
                contract: bound_contract.to_vec(),
            },
        );
        self.tracked
            .entry(chain_id)
            .or_default()
            .push(redeem_script.to_vec());
        rk
    }
}

impl SideChainRegistry for MockRegistry {
    fn redeem_script(
        &self,
        redeem_key: &RedeemKey,
        chain_id: u64,
    ) -> Result<Option<Vec<u8>>, SettlementError> {
        Ok(self.redeem_scripts.get(&(*redeem_key, chain_id)).cloned())
    }

    fn net_param(&self, chain_id: u64) -> Result<Option<Network>, SettlementError> {
        Ok(self.networks.get(&chain_id).copied())
    }

    fn contract_bind(
        &self,
        to_chain_id: u64,
        from_chain_id: u64,
        redeem_key: &RedeemKey,
    ) -> Result<Option<ContractBind>, SettlementError> {
        Ok(self
            .binds
            .get(&(to_chain_id, from_chain_id, *redeem_key))
            .cloned())
    }

    fn tracked_redeem_scripts(&self, chain_id: u64) -> Result<Vec<Vec<u8>>, SettlementError> {
        Ok(self.tracked.get(&chain_id).cloned().unwrap_or_default())
    }
}

#[derive(Debug, Default)]
pub(crate) struct MemLedger {
    done: HashSet<(Vec<u8>, u64)>,
}

impl DoneTxLedger for MemLedger {
    fn check(&self, tx_hash: &[u8], chain_id: u64) -> Result<bool, SettlementError> {
        Ok(self.done.contains(&(tx_hash.to_vec(), chain_id)))
    }

    fn put(&mut self, tx_hash: &[u8], chain_id: u64) -> Result<(), SettlementError> {
        self.done.insert((tx_hash.to_vec(), chain_id));
        Ok(())
    }
}

/// Verifier that accepts every proof and returns a fixed message.
#[derive(Debug)]
pub(crate) struct StaticVerifier {
    pub msg: CrossChainMsg,
}

impl DepositVerifier for StaticVerifier {
    fn verify_from_btc_tx(
        &self,
        _proof: &[u8],
        _extra: &[u8],
        _source_chain_id: u64,
        _height: u32,
    ) -> Result<CrossChainMsg, SettlementError> {
        Ok(self.msg.clone())
    }
}

#[derive(Debug, Default)]
pub(crate) struct RecordingSink {
    pub events: Vec<SettlementEvent>,
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: SettlementEvent) {
        self.events.push(event);
    }
}

fn pushnum_opcode(value: usize) -> bitcoin::Opcode {
    bitcoin::Opcode::from(OP_PUSHNUM_1.to_u8() + (value as u8 - 1))
}

/// Deterministic M-of-N custody policy on regtest, with the participant
/// secret keys in script order.
pub(crate) fn test_policy(m: usize, n: usize) -> (CustodyPolicy, Vec<SecretKey>) {
    let secp = Secp256k1::new();
    let keys: Vec<SecretKey> = (1..=n as u8)
        .map(|i| SecretKey::from_slice(&[i; 32]).expect("nonzero key bytes"))
        .collect();

    let mut builder = Builder::new().push_opcode(pushnum_opcode(m));
    for key in &keys {
        builder = builder.push_key(&PublicKey::new(key.public_key(&secp)));
    }
    let redeem = builder
        .push_opcode(pushnum_opcode(n))
        .push_opcode(OP_CHECKMULTISIG)
        .into_script();

    let policy =
        CustodyPolicy::parse(redeem.as_bytes(), Network::Regtest).expect("valid test policy");
    (policy, keys)
}

/// Regtest P2PKH address derived from a fixed seed byte.
pub(crate) fn payee_address(seed: u8) -> String {
    let secp = Secp256k1::new();
    let sk = SecretKey::from_slice(&[seed; 32]).expect("nonzero seed");
    let pk = PublicKey::new(sk.public_key(&secp));
    Address::p2pkh(&pk, Network::Regtest).to_string()
}

/// Produces one signature per input the way an off-chain signer would:
/// DER-encoded over the input's actual digest, with the sighash-type byte
/// appended. `pk_scripts` are the spent lock scripts, index-aligned with the
/// inputs of `tx` (whose script_sigs must already be empty).
pub(crate) fn sign_unsigned_tx(
    tx: &Transaction,
    pk_scripts: &[ScriptBuf],
    policy: &CustodyPolicy,
    input_amounts: &[u64],
    key: &SecretKey,
) -> Vec<Vec<u8>> {
    let secp = Secp256k1::new();
    let mut cache = SighashCache::new(tx);
    (0..tx.input.len())
        .map(|i| {
            let digest = if pk_scripts[i].is_p2wsh() {
                cache
                    .p2wsh_signature_hash(
                        i,
                        policy.redeem_script(),
                        Amount::from_sat(input_amounts[i]),
                        EcdsaSighashType::All,
                    )
                    .expect("input index in range")
                    .to_byte_array()
            } else {
                cache
                    .legacy_signature_hash(
                        i,
                        policy.redeem_script(),
                        EcdsaSighashType::All.to_u32(),
                    )
                    .expect("input index in range")
                    .to_byte_array()
            };
            let msg = Message::from_digest(digest);
            let mut sig = secp.sign_ecdsa(&msg, key).serialize_der().to_vec();
            sig.push(EcdsaSighashType::All.to_u32() as u8);
            sig
        })
        .collect()
}
