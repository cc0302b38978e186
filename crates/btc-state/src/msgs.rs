//! Host-facing message payloads.
//!
//! [`CrossChainMsg`] is the canonical message the proof verifier yields for a
//! validated deposit; [`WithdrawRequest`] is the argument stream it carries
//! for an outbound payout; [`DepositParams`] is the raw payload of a deposit
//! proposal call.

use std::io::{self, Read, Write};

use arbitrary::Arbitrary;
use borsh::{BorshDeserialize, BorshSerialize};
use pontis_codec::{read_string, read_var_bytes, write_string, write_var_bytes};
use serde::{Deserialize, Serialize};

/// Canonical cross-chain message for a validated transfer.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct CrossChainMsg {
    /// Hash of the transaction on the source chain.
    pub tx_hash: Vec<u8>,
    /// Globally unique transfer identifier assigned by the source contract.
    pub cross_chain_id: Vec<u8>,
    /// Source-chain contract that initiated the transfer.
    pub from_contract: Vec<u8>,
    /// Destination chain identifier.
    pub to_chain_id: u64,
    /// Destination contract.
    pub to_contract: Vec<u8>,
    /// Method to invoke on the destination contract.
    pub method: String,
    /// Method argument stream; for BTC payouts this decodes as
    /// [`WithdrawRequest`].
    pub args: Vec<u8>,
}

impl BorshSerialize for CrossChainMsg {
    fn serialize<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        write_var_bytes(writer, &self.tx_hash)?;
        write_var_bytes(writer, &self.cross_chain_id)?;
        write_var_bytes(writer, &self.from_contract)?;
        BorshSerialize::serialize(&self.to_chain_id, writer)?;
        write_var_bytes(writer, &self.to_contract)?;
        write_string(writer, &self.method)?;
        write_var_bytes(writer, &self.args)?;
        Ok(())
    }
}

impl BorshDeserialize for CrossChainMsg {
    fn deserialize_reader<R: Read>(reader: &mut R) -> io::Result<Self> {
        Ok(Self {
            tx_hash: read_var_bytes(reader)?,
            cross_chain_id: read_var_bytes(reader)?,
            from_contract: read_var_bytes(reader)?,
            to_chain_id: u64::deserialize_reader(reader)?,
            to_contract: read_var_bytes(reader)?,
            method: read_string(reader)?,
            args: read_var_bytes(reader)?,
        })
    }
}

impl<'a> Arbitrary<'a> for CrossChainMsg {
    fn arbitrary(u: &mut arbitrary::Unstructured<'a>) -> arbitrary::Result<Self> {
        let mut tx_hash = [0u8; 32];
        u.fill_buffer(&mut tx_hash)?;
        Ok(Self {
            tx_hash: tx_hash.to_vec(),
            cross_chain_id: u.arbitrary()?,
            from_contract: u.arbitrary()?,
            to_chain_id: u.arbitrary()?,
            to_contract: u.arbitrary()?,
            method: "unlock".to_owned(),
            args: u.arbitrary()?,
        })
    }
}

/// Outbound payout request carried in [`CrossChainMsg::args`].
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct WithdrawRequest {
    /// Destination address, as UTF-8 address text.
    pub to_addr: Vec<u8>,
    /// Payout amount in satoshis.
    pub amount: u64,
    /// Redeem script of the custody pool to draw from.
    pub redeem_script: Vec<u8>,
}

impl BorshSerialize for WithdrawRequest {
    fn serialize<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        write_var_bytes(writer, &self.to_addr)?;
        BorshSerialize::serialize(&self.amount, writer)?;
        write_var_bytes(writer, &self.redeem_script)?;
        Ok(())
    }
}

impl BorshDeserialize for WithdrawRequest {
    fn deserialize_reader<R: Read>(reader: &mut R) -> io::Result<Self> {
        Ok(Self {
            to_addr: read_var_bytes(reader)?,
            amount: u64::deserialize_reader(reader)?,
            redeem_script: read_var_bytes(reader)?,
        })
    }
}

/// Payload of a deposit proposal call.
///
/// `extra` carries the consensus-encoded deposit transaction; `proof` is the
/// SPV proof handed to the external verifier.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct DepositParams {
    pub source_chain_id: u64,
    pub height: u32,
    pub proof: Vec<u8>,
    pub relayer: Vec<u8>,
    pub extra: Vec<u8>,
}

impl BorshSerialize for DepositParams {
    fn serialize<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        BorshSerialize::serialize(&self.source_chain_id, writer)?;
        BorshSerialize::serialize(&self.height, writer)?;
        write_var_bytes(writer, &self.proof)?;
        write_var_bytes(writer, &self.relayer)?;
        write_var_bytes(writer, &self.extra)?;
        Ok(())
    }
}

impl BorshDeserialize for DepositParams {
    fn deserialize_reader<R: Read>(reader: &mut R) -> io::Result<Self> {
        Ok(Self {
            source_chain_id: u64::deserialize_reader(reader)?,
            height: u32::deserialize_reader(reader)?,
            proof: read_var_bytes(reader)?,
            relayer: read_var_bytes(reader)?,
            extra: read_var_bytes(reader)?,
        })
    }
}
