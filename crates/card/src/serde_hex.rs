//! Hex string (de)serialization for byte fields
//!
//! Dumps stay readable and byte-exact: every `Bytes` is written as a lowercase
//! hex string.

use bytes::Bytes;
use serde::{Deserialize, Deserializer, Serializer, de::Error as _};

pub(crate) fn serialize<S: Serializer>(bytes: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&hex::encode(bytes))
}

pub(crate) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
    let s = String::deserialize(deserializer)?;
    hex::decode(s).map(Bytes::from).map_err(D::Error::custom)
}

/// `Option<Bytes>`
pub(crate) mod option {
    use super::*;

    pub(crate) fn serialize<S: Serializer>(
        bytes: &Option<Bytes>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match bytes {
            Some(b) => serializer.serialize_some(&hex::encode(b)),
            None => serializer.serialize_none(),
        }
    }

    pub(crate) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Bytes>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|s| hex::decode(s).map(Bytes::from).map_err(D::Error::custom))
            .transpose()
    }
}

/// `Vec<Bytes>`
pub(crate) mod seq {
    use super::*;
    use serde::ser::SerializeSeq;

    pub(crate) fn serialize<S: Serializer>(
        items: &[Bytes],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(items.len()))?;
        for item in items {
            seq.serialize_element(&hex::encode(item))?;
        }
        seq.end()
    }

    pub(crate) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<Bytes>, D::Error> {
        Vec::<String>::deserialize(deserializer)?
            .into_iter()
            .map(|s| hex::decode(s).map(Bytes::from).map_err(D::Error::custom))
            .collect()
    }
}

/// `BTreeMap<K, Bytes>`
pub(crate) mod map {
    use std::collections::BTreeMap;

    use super::*;
    use serde::Serialize;
    use serde::ser::SerializeMap;

    pub(crate) fn serialize<K, S>(
        map: &BTreeMap<K, Bytes>,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        K: Serialize,
        S: Serializer,
    {
        let mut out = serializer.serialize_map(Some(map.len()))?;
        for (k, v) in map {
            out.serialize_entry(k, &hex::encode(v))?;
        }
        out.end()
    }

    pub(crate) fn deserialize<'de, K, D>(deserializer: D) -> Result<BTreeMap<K, Bytes>, D::Error>
    where
        K: Deserialize<'de> + Ord,
        D: Deserializer<'de>,
    {
        BTreeMap::<K, String>::deserialize(deserializer)?
            .into_iter()
            .map(|(k, s)| {
                hex::decode(s)
                    .map(|v| (k, Bytes::from(v)))
                    .map_err(D::Error::custom)
            })
            .collect()
    }
}
