//! Blob codec for persisted Query Representation records.
//!
//! Records are serialized as JSON and gzip-compressed. Ordered maps are
//! `IndexMap`s, which serialize as JSON objects in insertion order, so a
//! decoded value preserves the key order of the encoded one.

use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::errors::{LsifError, LsifResult};

pub fn encode_json<T: Serialize>(value: &T) -> LsifResult<Vec<u8>> {
    let raw = serde_json::to_vec(value)?;
    let mut encoder = GzEncoder::new(Vec::with_capacity(raw.len() / 4), Compression::fast());
    encoder.write_all(&raw)?;
    Ok(encoder.finish()?)
}

pub fn decode_json<T: DeserializeOwned>(bytes: &[u8]) -> LsifResult<T> {
    let mut raw = Vec::new();
    GzDecoder::new(bytes)
        .read_to_end(&mut raw)
        .map_err(|e| LsifError::Database(format!("decompress blob: {e}")))?;
    Ok(serde_json::from_slice(&raw)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;
    use proptest::prelude::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Value {
        foo: Vec<i64>,
        bar: Vec<String>,
        baz: IndexMap<String, i64>,
    }

    #[test]
    fn preserves_maps() {
        let mut baz = IndexMap::new();
        baz.insert("c".to_string(), 3);
        baz.insert("a".to_string(), 1);
        baz.insert("b".to_string(), 2);
        let value = Value {
            foo: vec![1, 2, 3],
            bar: vec!["abc".into(), "xyz".into()],
            baz,
        };

        let decoded: Value = decode_json(&encode_json(&value).unwrap()).unwrap();
        assert_eq!(decoded, value);
        let keys: Vec<&str> = decoded.baz.keys().map(String::as_str).collect();
        assert_eq!(keys, ["c", "a", "b"]);
    }

    #[test]
    fn garbage_is_rejected() {
        let err = decode_json::<Value>(b"definitely not gzip").unwrap_err();
        assert!(matches!(err, LsifError::Database(_)));
    }

    proptest! {
        #[test]
        fn round_trip_keeps_structure_and_order(
            foo in proptest::collection::vec(any::<i64>(), 0..16),
            bar in proptest::collection::vec(".{0,12}", 0..8),
            entries in proptest::collection::vec(("[a-z]{1,6}", any::<i64>()), 0..16),
        ) {
            let baz: IndexMap<String, i64> = entries.into_iter().collect();
            let value = Value { foo, bar, baz };
            let decoded: Value = decode_json(&encode_json(&value).unwrap()).unwrap();

            prop_assert!(decoded.baz.keys().eq(value.baz.keys()));
            prop_assert_eq!(decoded, value);
        }
    }
}
