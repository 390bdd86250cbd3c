//! Serde adapters that render keys and 32-byte values as base58 text.

use std::collections::HashMap;
use std::str::FromStr;

use serde::de::{self, Deserialize, Deserializer};
use serde::{Serialize, Serializer};
use solana_sdk::pubkey::Pubkey;

/// Decode a base58 string into exactly 32 bytes.
pub fn decode_bytes32(text: &str) -> Option<[u8; 32]> {
    let bytes = bs58::decode(text).into_vec().ok()?;
    bytes.try_into().ok()
}

pub fn encode_bytes32(bytes: &[u8; 32]) -> String {
    bs58::encode(bytes).into_string()
}

pub mod pubkey {
    use super::*;

    pub fn serialize<S: Serializer>(key: &Pubkey, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(key)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Pubkey, D::Error> {
        let text = String::deserialize(deserializer)?;
        Pubkey::from_str(&text).map_err(de::Error::custom)
    }
}

pub mod pubkey_map {
    use super::*;

    pub fn serialize<S, V>(map: &HashMap<Pubkey, V>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        V: Serialize,
    {
        serializer.collect_map(map.iter().map(|(key, value)| (key.to_string(), value)))
    }

    pub fn deserialize<'de, D, V>(deserializer: D) -> Result<HashMap<Pubkey, V>, D::Error>
    where
        D: Deserializer<'de>,
        V: Deserialize<'de>,
    {
        let raw = HashMap::<String, V>::deserialize(deserializer)?;
        raw.into_iter()
            .map(|(key, value)| {
                Pubkey::from_str(&key)
                    .map(|key| (key, value))
                    .map_err(de::Error::custom)
            })
            .collect()
    }
}

pub mod bytes32 {
    use super::*;

    pub fn serialize<S: Serializer>(bytes: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&encode_bytes32(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; 32], D::Error> {
        let text = String::deserialize(deserializer)?;
        decode_bytes32(&text)
            .ok_or_else(|| de::Error::custom(format!("expected 32 base58-encoded bytes: {text}")))
    }
}
