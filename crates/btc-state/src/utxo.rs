//! Unspent-output records and the per-custody-pool set they live in.
//!
//! A [`UtxoSet`] is persisted in insertion order. The coin selector works on a
//! sorted view produced by [`UtxoSet::sort_for_selection`]; the on-disk order
//! is never rewritten by sorting.

use std::io::{self, Read, Write};

use arbitrary::{Arbitrary, Unstructured};
use bitcoin::{hashes::Hash, Script, Txid};
use borsh::{BorshDeserialize, BorshSerialize};
use pontis_codec::{read_var_bytes, read_varuint, write_var_bytes, write_varuint};
use serde::{Deserialize, Serialize};

use crate::MAX_SATOSHI;

/// Reference to a previous transaction output.
///
/// The hash is kept as raw bytes in internal (non-display) order, exactly as
/// it appears in the consensus encoding of the spending input.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct OutPoint {
    hash: Vec<u8>,
    index: u32,
}

impl OutPoint {
    pub fn new(hash: Vec<u8>, index: u32) -> Self {
        Self { hash, index }
    }

    /// Builds an outpoint from a txid, in internal byte order.
    pub fn from_txid(txid: Txid, index: u32) -> Self {
        Self {
            hash: txid.to_byte_array().to_vec(),
            index,
        }
    }

    pub fn hash(&self) -> &[u8] {
        &self.hash
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    /// Whether a transaction input's previous output refers to this record.
    pub fn is_spent_by(&self, prev: &bitcoin::OutPoint) -> bool {
        self.hash == prev.txid.to_byte_array() && self.index == prev.vout
    }
}

impl std::fmt::Display for OutPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match Txid::from_slice(&self.hash) {
            Ok(txid) => write!(f, "{}:{}", txid, self.index),
            Err(_) => write!(f, "{}:{}", hex::encode(&self.hash), self.index),
        }
    }
}

impl BorshSerialize for OutPoint {
    fn serialize<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        write_var_bytes(writer, &self.hash)?;
        BorshSerialize::serialize(&self.index, writer)
    }
}

impl BorshDeserialize for OutPoint {
    fn deserialize_reader<R: Read>(reader: &mut R) -> io::Result<Self> {
        let hash = read_var_bytes(reader)?;
        let index = u32::deserialize_reader(reader)?;
        Ok(Self { hash, index })
    }
}

impl<'a> Arbitrary<'a> for OutPoint {
    fn arbitrary(u: &mut Unstructured<'a>) -> arbitrary::Result<Self> {
        let mut hash = [0u8; 32];
        u.fill_buffer(&mut hash)?;
        Ok(Self {
            hash: hash.to_vec(),
            index: u.int_in_range(0..=64)?,
        })
    }
}

/// A spendable output tracked for a custody pool.
///
/// `at_height` is the confirmation height of the funding transaction, zero
/// for unconfirmed. It is persisted for round-trip stability but selection
/// does not consult it.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Utxo {
    outpoint: OutPoint,
    at_height: u32,
    value: u64,
    script_pubkey: Vec<u8>,
}

impl Utxo {
    pub fn new(outpoint: OutPoint, at_height: u32, value: u64, script_pubkey: Vec<u8>) -> Self {
        Self {
            outpoint,
            at_height,
            value,
            script_pubkey,
        }
    }

    pub fn outpoint(&self) -> &OutPoint {
        &self.outpoint
    }

    pub fn at_height(&self) -> u32 {
        self.at_height
    }

    /// Value in satoshis.
    pub fn value(&self) -> u64 {
        self.value
    }

    pub fn script_pubkey(&self) -> &[u8] {
        &self.script_pubkey
    }

    /// The locking script as a script reference.
    pub fn script(&self) -> &Script {
        Script::from_bytes(&self.script_pubkey)
    }
}

impl BorshSerialize for Utxo {
    fn serialize<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        BorshSerialize::serialize(&self.outpoint, writer)?;
        BorshSerialize::serialize(&self.at_height, writer)?;
        BorshSerialize::serialize(&self.value, writer)?;
        write_var_bytes(writer, &self.script_pubkey)?;
        Ok(())
    }
}

impl BorshDeserialize for Utxo {
    fn deserialize_reader<R: Read>(reader: &mut R) -> io::Result<Self> {
        let outpoint = OutPoint::deserialize_reader(reader)?;
        let at_height = u32::deserialize_reader(reader)?;
        let value = u64::deserialize_reader(reader)?;
        let script_pubkey = read_var_bytes(reader)?;
        Ok(Self {
            outpoint,
            at_height,
            value,
            script_pubkey,
        })
    }
}

impl<'a> Arbitrary<'a> for Utxo {
    fn arbitrary(u: &mut Unstructured<'a>) -> arbitrary::Result<Self> {
        let outpoint = OutPoint::arbitrary(u)?;
        let script_len = u.int_in_range(0..=40)?;
        let mut script_pubkey = vec![0u8; script_len];
        u.fill_buffer(&mut script_pubkey)?;
        Ok(Self {
            outpoint,
            at_height: u.arbitrary()?,
            value: u.int_in_range(1..=MAX_SATOSHI)?,
            script_pubkey,
        })
    }
}

/// Ordered collection of [`Utxo`] records for one `(chain, redeem key)` pair.
///
/// Invariant: no two entries share an outpoint. Insertion order is the
/// persisted order.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct UtxoSet {
    utxos: Vec<Utxo>,
}

impl UtxoSet {
    pub fn new_empty() -> Self {
        Self { utxos: Vec::new() }
    }

    pub fn from_utxos(utxos: Vec<Utxo>) -> Self {
        Self { utxos }
    }

    pub fn len(&self) -> usize {
        self.utxos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.utxos.is_empty()
    }

    pub fn as_slice(&self) -> &[Utxo] {
        &self.utxos
    }

    pub fn iter(&self) -> impl Iterator<Item = &Utxo> {
        self.utxos.iter()
    }

    pub fn push(&mut self, utxo: Utxo) {
        self.utxos.push(utxo);
    }

    /// Whether any entry carries this outpoint.
    pub fn contains(&self, outpoint: &OutPoint) -> bool {
        self.utxos.iter().any(|u| u.outpoint() == outpoint)
    }

    /// Index of the entry spent by `prev`, if present.
    pub fn position_spent_by(&self, prev: &bitcoin::OutPoint) -> Option<usize> {
        self.utxos.iter().position(|u| u.outpoint().is_spent_by(prev))
    }

    /// The entry spent by `prev`, if present.
    pub fn find_spent_by(&self, prev: &bitcoin::OutPoint) -> Option<&Utxo> {
        self.position_spent_by(prev).map(|i| &self.utxos[i])
    }

    pub fn remove_at(&mut self, idx: usize) -> Utxo {
        self.utxos.remove(idx)
    }

    /// Sum of entry values in satoshis.
    pub fn total_value(&self) -> u64 {
        self.utxos.iter().map(|u| u.value()).sum()
    }

    /// Orders entries by value ascending, tie-broken by outpoint hash
    /// ascending. This is the view the coin selector expects.
    pub fn sort_for_selection(&mut self) {
        self.utxos.sort_by(|a, b| {
            a.value()
                .cmp(&b.value())
                .then_with(|| a.outpoint().hash().cmp(b.outpoint().hash()))
        });
    }
}

impl BorshSerialize for UtxoSet {
    fn serialize<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        write_varuint(writer, self.utxos.len() as u64)?;
        for utxo in &self.utxos {
            BorshSerialize::serialize(&utxo, writer)?;
        }
        Ok(())
    }
}

impl BorshDeserialize for UtxoSet {
    fn deserialize_reader<R: Read>(reader: &mut R) -> io::Result<Self> {
        let count = read_varuint(reader)?;
        let mut utxos = Vec::new();
        for _ in 0..count {
            utxos.push(Utxo::deserialize_reader(reader)?);
        }
        Ok(Self { utxos })
    }
}

impl<'a> Arbitrary<'a> for UtxoSet {
    fn arbitrary(u: &mut Unstructured<'a>) -> arbitrary::Result<Self> {
        let count = u.int_in_range(0..=12)?;
        let mut utxos = Vec::with_capacity(count);
        for _ in 0..count {
            utxos.push(Utxo::arbitrary(u)?);
        }
        Ok(Self { utxos })
    }
}
