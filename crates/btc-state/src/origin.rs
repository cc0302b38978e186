//! Origin record linking a settlement transaction to its cross-chain request.

use std::io::{self, Read, Write};

use arbitrary::Arbitrary;
use borsh::{BorshDeserialize, BorshSerialize};
use pontis_codec::{read_var_bytes, write_var_bytes};
use serde::{Deserialize, Serialize};

/// Where an outbound settlement transaction came from.
///
/// Written once when the unsigned transaction is assembled; the final relay
/// event cites it. Never mutated.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct TxOrigin {
    from_tx_hash: Vec<u8>,
    from_chain_id: u64,
}

impl TxOrigin {
    pub fn new(from_tx_hash: Vec<u8>, from_chain_id: u64) -> Self {
        Self {
            from_tx_hash,
            from_chain_id,
        }
    }

    pub fn from_tx_hash(&self) -> &[u8] {
        &self.from_tx_hash
    }

    pub fn from_chain_id(&self) -> u64 {
        self.from_chain_id
    }
}

impl BorshSerialize for TxOrigin {
    fn serialize<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        write_var_bytes(writer, &self.from_tx_hash)?;
        BorshSerialize::serialize(&self.from_chain_id, writer)
    }
}

impl BorshDeserialize for TxOrigin {
    fn deserialize_reader<R: Read>(reader: &mut R) -> io::Result<Self> {
        let from_tx_hash = read_var_bytes(reader)?;
        let from_chain_id = u64::deserialize_reader(reader)?;
        Ok(Self {
            from_tx_hash,
            from_chain_id,
        })
    }
}

impl<'a> Arbitrary<'a> for TxOrigin {
    fn arbitrary(u: &mut arbitrary::Unstructured<'a>) -> arbitrary::Result<Self> {
        let mut hash = [0u8; 32];
        u.fill_buffer(&mut hash)?;
        Ok(Self {
            from_tx_hash: hash.to_vec(),
            from_chain_id: u.arbitrary()?,
        })
    }
}
