//! Partial-signature table for an in-flight settlement transaction.

use std::{
    collections::BTreeMap,
    io::{self, Read, Write},
};

use arbitrary::{Arbitrary, Unstructured};
use borsh::{BorshDeserialize, BorshSerialize};
use pontis_codec::{read_string, read_var_bytes, read_varuint, write_string, write_var_bytes, write_varuint};
use serde::{Deserialize, Serialize};

/// Per-signer signature sets, keyed by signer address.
///
/// Each entry holds one signature per input of the transaction being signed.
/// Encoding emits entries in descending lexicographic key order; the stored
/// bytes are therefore identical no matter what order signers arrived in.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct MultiSignInfo {
    sigs: BTreeMap<String, Vec<Vec<u8>>>,
}

impl MultiSignInfo {
    pub fn new_empty() -> Self {
        Self {
            sigs: BTreeMap::new(),
        }
    }

    /// Number of signers recorded.
    pub fn len(&self) -> usize {
        self.sigs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sigs.is_empty()
    }

    pub fn contains(&self, signer: &str) -> bool {
        self.sigs.contains_key(signer)
    }

    /// The recorded signatures for `signer`, one per input.
    pub fn signatures(&self, signer: &str) -> Option<&[Vec<u8>]> {
        self.sigs.get(signer).map(|v| v.as_slice())
    }

    /// Records a signer's signatures. Returns `false` (and leaves the table
    /// untouched) if the signer is already present.
    pub fn insert(&mut self, signer: String, sigs: Vec<Vec<u8>>) -> bool {
        if self.sigs.contains_key(&signer) {
            return false;
        }
        self.sigs.insert(signer, sigs);
        true
    }

    /// Iterates entries in ascending key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<Vec<u8>>)> {
        self.sigs.iter()
    }
}

impl BorshSerialize for MultiSignInfo {
    fn serialize<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        write_varuint(writer, self.sigs.len() as u64)?;
        // Descending key order keeps the stored bytes hash-stable regardless
        // of signer arrival order.
        for (signer, sigs) in self.sigs.iter().rev() {
            write_string(writer, signer)?;
            write_varuint(writer, sigs.len() as u64)?;
            for sig in sigs {
                write_var_bytes(writer, sig)?;
            }
        }
        Ok(())
    }
}

impl BorshDeserialize for MultiSignInfo {
    fn deserialize_reader<R: Read>(reader: &mut R) -> io::Result<Self> {
        let count = read_varuint(reader)?;
        let mut sigs = BTreeMap::new();
        for _ in 0..count {
            let signer = read_string(reader)?;
            let sig_count = read_varuint(reader)?;
            let mut entry = Vec::with_capacity(sig_count.min(64) as usize);
            for _ in 0..sig_count {
                entry.push(read_var_bytes(reader)?);
            }
            sigs.insert(signer, entry);
        }
        Ok(Self { sigs })
    }
}

impl<'a> Arbitrary<'a> for MultiSignInfo {
    fn arbitrary(u: &mut Unstructured<'a>) -> arbitrary::Result<Self> {
        let signers = u.int_in_range(0..=6)?;
        let inputs = u.int_in_range(1..=4)?;
        let mut info = Self::new_empty();
        for i in 0..signers {
            let mut sigs = Vec::with_capacity(inputs);
            for _ in 0..inputs {
                let len = u.int_in_range(70..=72)?;
                let mut sig = vec![0u8; len];
                u.fill_buffer(&mut sig)?;
                sigs.push(sig);
            }
            info.insert(format!("signer-{i}"), sigs);
        }
        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use pontis_test_utils::ArbitraryGenerator;

    use super::*;

    #[test]
    fn test_roundtrip() {
        let mut arb = ArbitraryGenerator::new();
        for _ in 0..16 {
            let info: MultiSignInfo = arb.generate();
            let bytes = borsh::to_vec(&info).unwrap();
            let decoded: MultiSignInfo = borsh::from_slice(&bytes).unwrap();
            assert_eq!(decoded, info);
            assert_eq!(borsh::to_vec(&decoded).unwrap(), bytes);
        }
    }

    #[test]
    fn test_encoding_is_insertion_order_independent() {
        let mut a = MultiSignInfo::new_empty();
        assert!(a.insert("alpha".into(), vec![vec![1]]));
        assert!(a.insert("bravo".into(), vec![vec![2]]));
        assert!(a.insert("charlie".into(), vec![vec![3]]));

        let mut b = MultiSignInfo::new_empty();
        assert!(b.insert("charlie".into(), vec![vec![3]]));
        assert!(b.insert("alpha".into(), vec![vec![1]]));
        assert!(b.insert("bravo".into(), vec![vec![2]]));

        assert_eq!(borsh::to_vec(&a).unwrap(), borsh::to_vec(&b).unwrap());
    }

    #[test]
    fn test_keys_emitted_descending() {
        let mut info = MultiSignInfo::new_empty();
        info.insert("aa".into(), vec![]);
        info.insert("zz".into(), vec![]);

        let bytes = borsh::to_vec(&info).unwrap();
        // count, then "zz" before "aa".
        let expect = [
            2u8, // entry count
            2, b'z', b'z', 0, // "zz", zero signatures
            2, b'a', b'a', 0, // "aa", zero signatures
        ];
        assert_eq!(bytes, expect);
    }

    #[test]
    fn test_insert_rejects_duplicate() {
        let mut info = MultiSignInfo::new_empty();
        assert!(info.insert("alpha".into(), vec![vec![1]]));
        assert!(!info.insert("alpha".into(), vec![vec![9]]));
        assert_eq!(info.signatures("alpha").unwrap(), &[vec![1u8]]);
        assert_eq!(info.len(), 1);
    }
}
