//! Order-stable wrappers around hash containers for serialization.
//!
//! Model files must round-trip byte-identically, so every persistent map
//! and set is encoded in ascending key order regardless of the in-memory
//! bucket layout.

use core::hash::Hash;
use core::ops::{Deref, DerefMut};
use std::io::{Read, Write};

use bincode::{
    de::{BorrowDecoder, Decoder},
    enc::Encoder,
    error::{DecodeError, EncodeError},
    BorrowDecode, Decode, Encode,
};
use hashbrown::{HashMap, HashSet};

use crate::errors::Result;

/// Hash map encoded as a key-sorted sequence of entries.
#[derive(Clone, Debug)]
pub struct OrderedMap<K, V>(HashMap<K, V>);

impl<K: Eq + Hash, V: PartialEq> PartialEq for OrderedMap<K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl<K, V> OrderedMap<K, V> {
    pub fn new() -> Self {
        Self(HashMap::new())
    }
}

impl<K, V> Default for OrderedMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Deref for OrderedMap<K, V> {
    type Target = HashMap<K, V>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<K, V> DerefMut for OrderedMap<K, V> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl<K, V> Encode for OrderedMap<K, V>
where
    K: Encode + Ord,
    V: Encode,
{
    fn encode<E: Encoder>(&self, encoder: &mut E) -> std::result::Result<(), EncodeError> {
        Encode::encode(&(self.0.len() as u64), encoder)?;
        let mut entries: Vec<(&K, &V)> = self.0.iter().collect();
        entries.sort_unstable_by(|a, b| a.0.cmp(b.0));
        for (k, v) in entries {
            Encode::encode(k, encoder)?;
            Encode::encode(v, encoder)?;
        }
        Ok(())
    }
}

impl<K, V, Context> Decode<Context> for OrderedMap<K, V>
where
    K: Decode<Context> + Eq + Hash,
    V: Decode<Context>,
{
    fn decode<D: Decoder<Context = Context>>(decoder: &mut D) -> std::result::Result<Self, DecodeError> {
        let len: u64 = Decode::decode(decoder)?;
        let mut map = HashMap::with_capacity(len as usize);
        for _ in 0..len {
            let k = Decode::decode(decoder)?;
            let v = Decode::decode(decoder)?;
            map.insert(k, v);
        }
        Ok(Self(map))
    }
}

impl<'de, K, V, Context> BorrowDecode<'de, Context> for OrderedMap<K, V>
where
    K: Decode<Context> + Eq + Hash,
    V: Decode<Context>,
{
    fn borrow_decode<D: BorrowDecoder<'de, Context = Context>>(decoder: &mut D) -> std::result::Result<Self, DecodeError> {
        Decode::decode(decoder)
    }
}

/// Hash set encoded as a sorted sequence of elements.
#[derive(Clone, Debug)]
pub struct OrderedSet<T>(HashSet<T>);

impl<T: Eq + Hash> PartialEq for OrderedSet<T> {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl<T> OrderedSet<T> {
    pub fn new() -> Self {
        Self(HashSet::new())
    }
}

impl<T> Default for OrderedSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Deref for OrderedSet<T> {
    type Target = HashSet<T>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T> DerefMut for OrderedSet<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl<T> Encode for OrderedSet<T>
where
    T: Encode + Ord,
{
    fn encode<E: Encoder>(&self, encoder: &mut E) -> std::result::Result<(), EncodeError> {
        Encode::encode(&(self.0.len() as u64), encoder)?;
        let mut elems: Vec<&T> = self.0.iter().collect();
        elems.sort_unstable();
        for e in elems {
            Encode::encode(e, encoder)?;
        }
        Ok(())
    }
}

impl<T, Context> Decode<Context> for OrderedSet<T>
where
    T: Decode<Context> + Eq + Hash,
{
    fn decode<D: Decoder<Context = Context>>(decoder: &mut D) -> std::result::Result<Self, DecodeError> {
        let len: u64 = Decode::decode(decoder)?;
        let mut set = HashSet::with_capacity(len as usize);
        for _ in 0..len {
            set.insert(Decode::decode(decoder)?);
        }
        Ok(Self(set))
    }
}

impl<'de, T, Context> BorrowDecode<'de, Context> for OrderedSet<T>
where
    T: Decode<Context> + Eq + Hash,
{
    fn borrow_decode<D: BorrowDecoder<'de, Context = Context>>(decoder: &mut D) -> std::result::Result<Self, DecodeError> {
        Decode::decode(decoder)
    }
}

/// Writes `s` as a NUL-terminated c-string.
pub fn write_cstr<W: Write>(mut wtr: W, s: &str) -> Result<()> {
    debug_assert!(!s.as_bytes().contains(&0));
    wtr.write_all(s.as_bytes())?;
    wtr.write_all(&[0])?;
    Ok(())
}

/// Reads bytes up to (and consuming) the next NUL byte.
pub fn read_cstr<R: Read>(mut rdr: R) -> Result<Vec<u8>> {
    let mut bytes = vec![];
    let mut buf = [0u8; 1];
    loop {
        rdr.read_exact(&mut buf)?;
        if buf[0] == 0 {
            return Ok(bytes);
        }
        bytes.push(buf[0]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::common;

    #[test]
    fn test_ordered_map_stable_encoding() {
        let mut a = OrderedMap::new();
        let mut b = OrderedMap::new();
        for k in [7u64, 1, 3, 2] {
            a.insert(k, k as f32);
        }
        for k in [2u64, 3, 1, 7] {
            b.insert(k, k as f32);
        }
        let bytes_a = bincode::encode_to_vec(&a, common::bincode_config()).unwrap();
        let bytes_b = bincode::encode_to_vec(&b, common::bincode_config()).unwrap();
        assert_eq!(bytes_a, bytes_b);

        let (decoded, _): (OrderedMap<u64, f32>, usize) =
            bincode::decode_from_slice(&bytes_a, common::bincode_config()).unwrap();
        assert_eq!(a, decoded);
    }

    #[test]
    fn test_ordered_set_roundtrip() {
        let mut s = OrderedSet::new();
        s.insert("koira".to_string());
        s.insert("kissa".to_string());
        let bytes = bincode::encode_to_vec(&s, common::bincode_config()).unwrap();
        let (decoded, _): (OrderedSet<String>, usize) =
            bincode::decode_from_slice(&bytes, common::bincode_config()).unwrap();
        assert_eq!(s, decoded);
    }

    #[test]
    fn test_cstr_roundtrip() {
        let mut buf = vec![];
        write_cstr(&mut buf, "FinnPosModel").unwrap();
        assert_eq!(buf.len(), "FinnPosModel".len() + 1);
        let read = read_cstr(buf.as_slice()).unwrap();
        assert_eq!(read, b"FinnPosModel");
    }
}
