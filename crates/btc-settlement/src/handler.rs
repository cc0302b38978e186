//! Public operations of the settlement core.
//!
//! The handler is constructed per call batch by the host dispatch layer,
//! borrowing the host's cache, registry, dedup ledger, proof verifier, and
//! event sink. Every operation either commits all of its writes or none of
//! them, and emits its events only after committing.

use std::collections::BTreeMap;

use bitcoin::{consensus, hashes::Hash, ScriptBuf, Transaction};
use pontis_btc_state::{
    CrossChainMsg, CustodyPolicy, DepositParams, OutPoint, RedeemKey, TxOrigin, Utxo,
    WithdrawRequest,
};
use tracing::debug;

use crate::{
    builder,
    config::SettlementParams,
    errors::SettlementError,
    events::SettlementEvent,
    multisig, store,
    store::WriteBatch,
    traits::{CacheDb, DepositVerifier, DoneTxLedger, EventSink, SideChainRegistry},
};

/// Submission of one signer's partial signatures for a pending transaction.
#[derive(Clone, Debug)]
pub struct MultiSignParams {
    /// Chain the custody pool settles on.
    pub chain_id: u64,
    /// Custody pool being spent.
    pub redeem_key: RedeemKey,
    /// Txid (internal byte order) of the pending unsigned transaction.
    pub tx_hash: Vec<u8>,
    /// Signer address as derived from the policy keys.
    pub address: String,
    /// One signature per transaction input, DER with a trailing
    /// sighash-type byte.
    pub signatures: Vec<Vec<u8>>,
}

/// The settlement handler; one instance serves one host call.
pub struct SettlementHandler<'a> {
    cache: &'a mut dyn CacheDb,
    registry: &'a dyn SideChainRegistry,
    done_txs: &'a mut dyn DoneTxLedger,
    verifier: &'a dyn DepositVerifier,
    events: &'a mut dyn EventSink,
    params: SettlementParams,
}

impl std::fmt::Debug for SettlementHandler<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettlementHandler")
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

impl<'a> SettlementHandler<'a> {
    pub fn new(
        cache: &'a mut dyn CacheDb,
        registry: &'a dyn SideChainRegistry,
        done_txs: &'a mut dyn DoneTxLedger,
        verifier: &'a dyn DepositVerifier,
        events: &'a mut dyn EventSink,
        params: SettlementParams,
    ) -> Self {
        Self {
            cache,
            registry,
            done_txs,
            verifier,
            events,
            params,
        }
    }

    /// Processes an inbound deposit proposal.
    ///
    /// Verifies the SPV proof through the external verifier, rejects
    /// transactions the dedup ledger has seen, then credits every output of
    /// the deposit transaction that pays a tracked custody lock script.
    /// `block_height` is the host chain's current height, recorded on the
    /// new entries.
    pub fn make_deposit_proposal(
        &mut self,
        payload: &[u8],
        block_height: u32,
    ) -> Result<CrossChainMsg, SettlementError> {
        let deposit: DepositParams = borsh::from_slice(payload)?;
        if deposit.proof.is_empty() {
            return Err(SettlementError::EmptyDepositField("proof"));
        }
        if deposit.extra.is_empty() {
            return Err(SettlementError::EmptyDepositField("extra"));
        }

        let msg = self.verifier.verify_from_btc_tx(
            &deposit.proof,
            &deposit.extra,
            deposit.source_chain_id,
            deposit.height,
        )?;

        if self.done_txs.check(&msg.tx_hash, deposit.source_chain_id)? {
            return Err(SettlementError::DuplicateDeposit);
        }
        self.done_txs.put(&msg.tx_hash, deposit.source_chain_id)?;

        let tx: Transaction = consensus::deserialize(&deposit.extra)?;
        let mut batch = WriteBatch::new();
        store::add_utxos(
            &mut batch,
            &*self.cache,
            self.registry,
            &self.params.contract_address,
            deposit.source_chain_id,
            block_height,
            &tx,
        )?;
        batch.commit(self.cache)?;

        debug!(
            chain_id = deposit.source_chain_id,
            txid = %tx.compute_txid(),
            "credited deposit transaction"
        );
        Ok(msg)
    }

    /// Assembles and persists an unsigned settlement transaction for a
    /// validated payout request.
    pub fn make_transaction(
        &mut self,
        msg: &CrossChainMsg,
        from_chain_id: u64,
    ) -> Result<(), SettlementError> {
        let req: WithdrawRequest = borsh::from_slice(&msg.args)?;
        let redeem_key = RedeemKey::of_script(&req.redeem_script);

        let bind = self
            .registry
            .contract_bind(msg.to_chain_id, from_chain_id, &redeem_key)?
            .ok_or(SettlementError::RegistryMissing {
                what: "contract binding",
                chain_id: from_chain_id,
            })?;
        if bind.contract != msg.from_contract {
            return Err(SettlementError::ContractBindMismatch {
                got: hex::encode(&msg.from_contract),
                want: hex::encode(&bind.contract),
            });
        }

        let network = self.registry.net_param(msg.to_chain_id)?.ok_or(
            SettlementError::RegistryMissing {
                what: "network parameters",
                chain_id: msg.to_chain_id,
            },
        )?;
        let policy = CustodyPolicy::parse(&req.redeem_script, network)?;

        let payee = String::from_utf8(req.to_addr.clone())
            .map_err(|_| SettlementError::Address("payee address is not utf-8".to_owned()))?;
        let amounts = BTreeMap::from([(payee, req.amount)]);

        let utxos = store::load_utxos(
            &*self.cache,
            &self.params.contract_address,
            msg.to_chain_id,
            &redeem_key,
        )?;
        let built = builder::assemble_unsigned_tx(&self.params, network, &policy, utxos, &amounts)?;

        let txid_bytes = built.txid.to_byte_array();
        let mut batch = WriteBatch::new();
        store::stage_unsigned_tx(
            &mut batch,
            &self.params.contract_address,
            &txid_bytes,
            built.raw.clone(),
        );
        store::stage_tx_origin(
            &mut batch,
            &self.params.contract_address,
            &txid_bytes,
            &TxOrigin::new(msg.tx_hash.clone(), from_chain_id),
        )?;
        batch.commit(self.cache)?;

        self.events.emit(SettlementEvent::TxAssembled {
            redeem_key,
            raw_tx_hex: hex::encode(&built.raw),
            input_amounts: built.input_amounts,
        });
        debug!(txid = %built.txid, "assembled unsigned settlement transaction");
        Ok(())
    }

    /// Accepts one signer's partial signatures, finalizing the transaction
    /// on the call that completes the quorum.
    pub fn multi_sign(&mut self, params: &MultiSignParams) -> Result<(), SettlementError> {
        let contract = &self.params.contract_address;

        let mut info = store::load_sig_info(&*self.cache, contract, &params.tx_hash)?;
        if info.contains(&params.address) {
            return Err(SettlementError::DuplicateSigner(params.address.clone()));
        }

        let redeem = self
            .registry
            .redeem_script(&params.redeem_key, params.chain_id)?
            .ok_or(SettlementError::RegistryMissing {
                what: "redeem script",
                chain_id: params.chain_id,
            })?;
        let network = self.registry.net_param(params.chain_id)?.ok_or(
            SettlementError::RegistryMissing {
                what: "network parameters",
                chain_id: params.chain_id,
            },
        )?;
        let policy = CustodyPolicy::parse(&redeem, network)?;

        let threshold = if self.params.require_full_quorum {
            policy.n()
        } else {
            policy.m()
        };
        if info.len() >= threshold {
            return Err(SettlementError::QuorumClosed(threshold));
        }

        let mut tx = store::load_unsigned_tx(&*self.cache, contract, &params.tx_hash)?;
        // Lift the spent lock scripts out of the inputs; what remains is the
        // form every signature commits to.
        let pk_scripts: Vec<ScriptBuf> = tx
            .input
            .iter_mut()
            .map(|input| std::mem::take(&mut input.script_sig))
            .collect();

        let mut utxos = store::load_utxos(&*self.cache, contract, params.chain_id, &params.redeem_key)?;
        let stxos = store::load_stxos(&*self.cache, contract, params.chain_id, &params.redeem_key)?;
        let (input_amounts, spent) = store::resolve_input_amounts(&mut utxos, &stxos, &tx.input)?;

        multisig::verify_signer_sigs(
            &tx,
            &pk_scripts,
            &policy,
            &params.address,
            &params.signatures,
            &input_amounts,
        )?;
        info.insert(params.address.clone(), params.signatures.clone());

        let mut batch = WriteBatch::new();
        store::stage_sig_info(&mut batch, contract, &params.tx_hash, &info)?;

        if info.len() < threshold {
            batch.commit(self.cache)?;
            self.events.emit(SettlementEvent::SignatureCollected {
                tx_hash: params.tx_hash.clone(),
                info_bytes: borsh::to_vec(&info)?,
            });
            debug!(
                signer = %params.address,
                collected = info.len(),
                threshold,
                "collected partial signature"
            );
            return Ok(());
        }

        // Quorum complete: finalize, credit change back to the pool, retire
        // the spent outputs, and announce the relay-ready transaction in a
        // single commit.
        multisig::finalize_tx(&mut tx, &pk_scripts, &policy, &info)?;
        let raw_final = consensus::serialize(&tx);
        let final_txid = tx.compute_txid();

        let lock = policy.lock_script();
        for (index, out) in tx.output.iter().enumerate() {
            if out.script_pubkey == lock {
                utxos.push(Utxo::new(
                    OutPoint::from_txid(final_txid, index as u32),
                    0,
                    out.value.to_sat(),
                    out.script_pubkey.to_bytes(),
                ));
            }
        }
        store::stage_utxos(&mut batch, contract, params.chain_id, &params.redeem_key, &utxos)?;
        store::stage_stxos_append(
            &mut batch,
            &*self.cache,
            contract,
            params.chain_id,
            &params.redeem_key,
            spent,
        )?;
        let origin = store::load_tx_origin(&*self.cache, contract, &params.tx_hash)?;
        batch.commit(self.cache)?;

        self.events.emit(SettlementEvent::RelayReady {
            from_chain_id: origin.from_chain_id(),
            to_chain_id: params.chain_id,
            raw_tx_hex: hex::encode(&raw_final),
            from_tx_hash_hex: hex::encode(origin.from_tx_hash()),
            redeem_key: params.redeem_key,
        });
        debug!(txid = %final_txid, "settlement transaction finalized");
        Ok(())
    }
}
