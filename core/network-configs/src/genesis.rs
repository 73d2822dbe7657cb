//! Genesis document as produced by the BFT setup utility.
//!
//! Only the allocation map and the validator-set encoding are interpreted. Every other field
//! is carried through untouched so that composing never alters unrelated configuration.
use crate::types::{Address, Balance};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(thiserror::Error, Debug)]
pub enum GenesisError {
    #[error("could not read genesis file {}", .0.display())]
    Read(PathBuf, #[source] std::io::Error),
    #[error("could not write genesis file {}", .0.display())]
    Write(PathBuf, #[source] std::io::Error),
    #[error("genesis file {} is malformed", .0.display())]
    Parse(PathBuf, #[source] serde_json::Error),
    #[error("could not serialize the genesis document")]
    Serialize(#[source] serde_json::Error),
}

/// A single allocation: a balance, plus deployed bytecode for contracts seeded at genesis.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct AllocEntry {
    pub balance: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(flatten)]
    pub other: BTreeMap<String, serde_json::Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct GenesisDoc {
    /// Validator-set encoding.
    #[serde(rename = "extraData")]
    pub extra_data: String,
    /// Keyed by checksummed address.
    #[serde(default)]
    pub alloc: BTreeMap<Address, AllocEntry>,
    #[serde(flatten)]
    pub other: serde_json::Map<String, serde_json::Value>,
}

impl GenesisDoc {
    pub fn from_file(path: &Path) -> Result<Self, GenesisError> {
        let content =
            std::fs::read_to_string(path).map_err(|err| GenesisError::Read(path.into(), err))?;
        serde_json::from_str(&content).map_err(|err| GenesisError::Parse(path.into(), err))
    }

    /// Canonical serialization: pretty-printed, keys sorted, trailing newline.
    pub fn to_bytes(&self) -> Result<Vec<u8>, GenesisError> {
        let mut bytes = serde_json::to_vec_pretty(self).map_err(GenesisError::Serialize)?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    pub fn write_to_file(&self, path: &Path) -> Result<(), GenesisError> {
        let bytes = self.to_bytes()?;
        std::fs::write(path, bytes).map_err(|err| GenesisError::Write(path.into(), err))
    }

    pub fn clear_alloc(&mut self) {
        self.alloc.clear();
    }

    pub fn allocate(&mut self, address: Address, balance: Balance) {
        self.alloc.insert(
            address,
            AllocEntry { balance: balance.to_string(), code: None, other: Default::default() },
        );
    }

    /// Pre-seeds runtime bytecode at `address`. `code` is hex, with or without `0x`.
    pub fn seed_contract(&mut self, address: Address, code: &str) {
        let code = code.trim();
        let code = if code.starts_with("0x") { code.to_string() } else { format!("0x{code}") };
        self.alloc.insert(
            address,
            AllocEntry { balance: "0".to_string(), code: Some(code), other: Default::default() },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SKELETON: &str = r#"{
        "config": {"chainId": 10, "istanbul": {"epoch": 30000, "policy": 0}},
        "nonce": "0x0",
        "timestamp": "0x5cdd6d33",
        "extraData": "0x0000000000000000000000000000000000000000000000000000000000000000f85ad594",
        "gasLimit": "0xe0000000",
        "alloc": {
            "0x6e1d2aac63cd7fa8cd6a4416d3cb1e83a03d7b51": {"balance": "0x446c3b15f9926687d2c40534fdb564000000000000"}
        }
    }"#;

    #[test]
    fn unrelated_fields_survive() {
        let doc: GenesisDoc = serde_json::from_str(SKELETON).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&doc.to_bytes().unwrap()).unwrap();
        assert_eq!(value["config"]["istanbul"]["epoch"], 30000);
        assert_eq!(value["gasLimit"], "0xe0000000");
        assert!(value["extraData"].as_str().unwrap().ends_with("f85ad594"));
    }

    #[test]
    fn alloc_keys_are_checksummed() {
        let mut doc: GenesisDoc = serde_json::from_str(SKELETON).unwrap();
        doc.clear_alloc();
        let addr: Address = "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed".parse().unwrap();
        doc.allocate(addr, Balance::from(1000u64));
        let value: serde_json::Value = serde_json::from_slice(&doc.to_bytes().unwrap()).unwrap();
        let alloc = value["alloc"].as_object().unwrap();
        assert_eq!(alloc.len(), 1);
        assert_eq!(alloc["0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed"]["balance"], "1000");
        assert!(alloc["0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed"].get("code").is_none());
    }

    #[test]
    fn seeded_contract() {
        let mut doc: GenesisDoc = serde_json::from_str(SKELETON).unwrap();
        let addr: Address = "0x0000000000000000000000000000000000000042".parse().unwrap();
        doc.seed_contract(addr, "6080604052\n");
        assert_eq!(doc.alloc[&addr].code.as_deref(), Some("0x6080604052"));
        assert_eq!(doc.alloc[&addr].balance, "0");
    }

    #[test]
    fn file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("genesis.json");
        let doc: GenesisDoc = serde_json::from_str(SKELETON).unwrap();
        doc.write_to_file(&path).unwrap();
        assert_eq!(GenesisDoc::from_file(&path).unwrap(), doc);
        assert!(matches!(
            GenesisDoc::from_file(&dir.path().join("missing.json")),
            Err(GenesisError::Read(..))
        ));
    }
}
