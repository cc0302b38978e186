//! Custody policy parsing.
//!
//! A custody pool is identified by the HASH160 of its redeem script, a
//! standard `OP_m <pk…> OP_n OP_CHECKMULTISIG` multisig script. Parsing
//! recovers the threshold, the participant keys in script order, and the
//! per-key signer addresses used to attribute partial signatures.

use std::io::{self, Read, Write};

use arbitrary::Arbitrary;
use bitcoin::{
    hashes::{hash160, Hash},
    opcodes::all::{OP_CHECKMULTISIG, OP_PUSHNUM_1, OP_PUSHNUM_16},
    script::Instruction,
    Address, Network, Opcode, PublicKey, Script, ScriptBuf,
};
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// HASH160 of a redeem script; the 20-byte custody-pool identifier.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct RedeemKey([u8; 20]);

impl RedeemKey {
    pub fn of_script(redeem_script: &[u8]) -> Self {
        Self(hash160::Hash::hash(redeem_script).to_byte_array())
    }

    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl std::fmt::Display for RedeemKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl std::fmt::Debug for RedeemKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RedeemKey({})", self)
    }
}

impl BorshSerialize for RedeemKey {
    fn serialize<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&self.0)
    }
}

impl BorshDeserialize for RedeemKey {
    fn deserialize_reader<R: Read>(reader: &mut R) -> io::Result<Self> {
        let mut bytes = [0u8; 20];
        reader.read_exact(&mut bytes)?;
        Ok(Self(bytes))
    }
}

impl<'a> Arbitrary<'a> for RedeemKey {
    fn arbitrary(u: &mut arbitrary::Unstructured<'a>) -> arbitrary::Result<Self> {
        let mut bytes = [0u8; 20];
        u.fill_buffer(&mut bytes)?;
        Ok(Self(bytes))
    }
}

/// Errors raised while parsing a redeem script into a custody policy.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// The script is not a standard CHECKMULTISIG redeem script.
    #[error("redeem script is not a standard multisig script")]
    NotMultisig,

    /// The threshold exceeds the participant count.
    #[error("invalid threshold {m} of {n}")]
    BadThreshold { m: usize, n: usize },

    /// A participant slot held something other than a public key.
    #[error("invalid participant public key: {0}")]
    InvalidKey(#[from] bitcoin::key::FromSliceError),

    /// The script failed to tokenize.
    #[error("malformed script: {0}")]
    Script(#[from] bitcoin::script::Error),
}

/// Parsed custody policy: M-of-N threshold plus the participant keys.
#[derive(Clone, Debug)]
pub struct CustodyPolicy {
    m: usize,
    n: usize,
    keys: Vec<PublicKey>,
    addresses: Vec<String>,
    redeem_script: ScriptBuf,
    network: Network,
}

fn pushnum(op: Opcode) -> Option<usize> {
    let v = op.to_u8();
    if (OP_PUSHNUM_1.to_u8()..=OP_PUSHNUM_16.to_u8()).contains(&v) {
        Some((v - OP_PUSHNUM_1.to_u8()) as usize + 1)
    } else {
        None
    }
}

impl CustodyPolicy {
    /// Parses `redeem_script`, attributing signer addresses on `network`.
    pub fn parse(redeem_script: &[u8], network: Network) -> Result<Self, PolicyError> {
        let script = Script::from_bytes(redeem_script);
        let insns: Vec<Instruction<'_>> =
            script.instructions().collect::<Result<_, _>>()?;

        // OP_m, n key pushes, OP_n, OP_CHECKMULTISIG.
        if insns.len() < 4 {
            return Err(PolicyError::NotMultisig);
        }
        let m = match insns[0] {
            Instruction::Op(op) => pushnum(op).ok_or(PolicyError::NotMultisig)?,
            _ => return Err(PolicyError::NotMultisig),
        };
        match insns[insns.len() - 1] {
            Instruction::Op(op) if op == OP_CHECKMULTISIG => {}
            _ => return Err(PolicyError::NotMultisig),
        }
        let n = match insns[insns.len() - 2] {
            Instruction::Op(op) => pushnum(op).ok_or(PolicyError::NotMultisig)?,
            _ => return Err(PolicyError::NotMultisig),
        };

        let mut keys = Vec::with_capacity(n);
        for insn in &insns[1..insns.len() - 2] {
            match insn {
                Instruction::PushBytes(push) => {
                    keys.push(PublicKey::from_slice(push.as_bytes())?);
                }
                _ => return Err(PolicyError::NotMultisig),
            }
        }
        if keys.len() != n {
            return Err(PolicyError::NotMultisig);
        }
        if m == 0 || m > n {
            return Err(PolicyError::BadThreshold { m, n });
        }

        let addresses = keys
            .iter()
            .map(|pk| Address::p2pkh(pk, network).to_string())
            .collect();

        Ok(Self {
            m,
            n,
            keys,
            addresses,
            redeem_script: ScriptBuf::from_bytes(redeem_script.to_vec()),
            network,
        })
    }

    /// Required signature count.
    pub fn m(&self) -> usize {
        self.m
    }

    /// Participant count.
    pub fn n(&self) -> usize {
        self.n
    }

    /// Participant keys in script order.
    pub fn pubkeys(&self) -> &[PublicKey] {
        &self.keys
    }

    /// Signer addresses, index-aligned with [`Self::pubkeys`].
    pub fn addresses(&self) -> &[String] {
        &self.addresses
    }

    /// Position of a signer address within the policy, if it belongs to it.
    pub fn signer_index(&self, address: &str) -> Option<usize> {
        self.addresses.iter().position(|a| a.as_str() == address)
    }

    pub fn redeem_script(&self) -> &Script {
        &self.redeem_script
    }

    /// Pay-to-witness-script-hash lock script of the custody pool. Deposits
    /// and change both land on this script.
    pub fn lock_script(&self) -> ScriptBuf {
        ScriptBuf::new_p2wsh(&self.redeem_script.wscript_hash())
    }

    pub fn redeem_key(&self) -> RedeemKey {
        RedeemKey::of_script(self.redeem_script.as_bytes())
    }

    pub fn network(&self) -> Network {
        self.network
    }
}
