//! The persisted contract artifact and its per-network deployment records

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// The prefix that marks a top level key of an artifact as a non-canonical extension
pub const EXTENSION_PREFIX: &str = "x-";

/// The canonical record of one compiled contract.
///
/// Every canonical field is always serialized, absent values are written as `null`, so consumers
/// never need to check whether a key is present. Keys prefixed with [`EXTENSION_PREFIX`] are kept
/// in `extensions`.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Artifact {
    pub contract_name: Option<String>,
    pub abi: Option<Value>,
    pub metadata: Option<Value>,
    pub bytecode: Option<String>,
    pub deployed_bytecode: Option<String>,
    pub immutable_references: Option<Value>,
    pub source_map: Option<String>,
    pub deployed_source_map: Option<String>,
    pub source: Option<String>,
    pub source_path: Option<String>,
    pub ast: Option<Value>,
    #[serde(rename = "legacyAST")]
    pub legacy_ast: Option<Value>,
    pub compiler: Option<Value>,
    /// deployments by network id
    pub networks: BTreeMap<String, NetworkRecord>,
    pub schema_version: String,
    /// ISO-8601 timestamp of the last write
    pub updated_at: Option<String>,
    pub network_type: Option<String>,
    pub devdoc: Option<Value>,
    pub userdoc: Option<Value>,
    #[serde(flatten)]
    pub extensions: BTreeMap<String, Value>,
}

impl Artifact {
    /// All canonical keys as they appear in the serialized artifact
    pub const CANONICAL_FIELDS: [&'static str; 19] = [
        "contractName",
        "abi",
        "metadata",
        "bytecode",
        "deployedBytecode",
        "immutableReferences",
        "sourceMap",
        "deployedSourceMap",
        "source",
        "sourcePath",
        "ast",
        "legacyAST",
        "compiler",
        "networks",
        "schemaVersion",
        "updatedAt",
        "networkType",
        "devdoc",
        "userdoc",
    ];

    /// Returns the contract name if it is set and not empty
    pub fn name(&self) -> Option<&str> {
        self.contract_name.as_deref().filter(|name| !name.is_empty())
    }

    /// Returns the deployment record for the network
    pub fn network(&self, network_id: &str) -> Option<&NetworkRecord> {
        self.networks.get(network_id)
    }
}

/// Deployment data of a contract on a single network
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_hash: Option<String>,
    /// linked library name -> address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub links: Option<BTreeMap<String, Value>>,
    /// event topic -> event metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub events: Option<BTreeMap<String, Value>>,
    #[serde(flatten)]
    pub other: BTreeMap<String, Value>,
}

impl NetworkRecord {
    /// Converts any json value into a record, keeping what is usable.
    ///
    /// Keys with unexpected types are kept in `other` rather than dropped.
    pub fn from_value(value: Value) -> Self {
        let mut record = NetworkRecord::default();
        let Value::Object(obj) = value else { return record };
        for (key, value) in obj {
            match (key.as_str(), value) {
                (_, Value::Null) => {}
                ("address", Value::String(address)) => record.address = Some(address),
                ("transactionHash", Value::String(hash)) => record.transaction_hash = Some(hash),
                ("links", Value::Object(links)) => record.links = Some(links.into_iter().collect()),
                ("events", Value::Object(events)) => {
                    record.events = Some(events.into_iter().collect())
                }
                (_, value) => {
                    record.other.insert(key, value);
                }
            }
        }
        record
    }

    /// Merges a newer record into this one.
    ///
    /// Sub-fields the newer record provides win, everything it lacks is kept. Nested maps are
    /// merged key by key.
    pub fn merge(&mut self, newer: NetworkRecord) {
        let NetworkRecord { address, transaction_hash, links, events, other } = newer;
        if address.is_some() {
            self.address = address;
        }
        if transaction_hash.is_some() {
            self.transaction_hash = transaction_hash;
        }
        if let Some(links) = links {
            merge_maps(self.links.get_or_insert_with(Default::default), links);
        }
        if let Some(events) = events {
            merge_maps(self.events.get_or_insert_with(Default::default), events);
        }
        merge_maps(&mut self.other, other);
    }
}

fn merge_maps(target: &mut BTreeMap<String, Value>, source: BTreeMap<String, Value>) {
    for (key, value) in source {
        match target.get_mut(&key) {
            Some(existing) => deep_merge(existing, value),
            None => {
                if !value.is_null() {
                    target.insert(key, value);
                }
            }
        }
    }
}

/// Recursively merges `source` into `target`: objects are merged key-wise, any other non-null
/// value replaces the target value.
pub fn deep_merge(target: &mut Value, source: Value) {
    match (target, source) {
        (_, Value::Null) => {}
        (Value::Object(target), Value::Object(source)) => merge_objects(target, source),
        (target, source) => *target = source,
    }
}

fn merge_objects(target: &mut Map<String, Value>, source: Map<String, Value>) {
    for (key, value) in source {
        match target.get_mut(&key) {
            Some(existing) => deep_merge(existing, value),
            None => {
                if !value.is_null() {
                    target.insert(key, value);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn serializes_all_canonical_fields() {
        let artifact = Artifact { contract_name: Some("Foo".to_string()), ..Default::default() };
        let value = serde_json::to_value(&artifact).unwrap();
        let obj = value.as_object().unwrap();
        for key in Artifact::CANONICAL_FIELDS {
            assert!(obj.contains_key(key), "missing {key}");
        }
        assert_eq!(obj["abi"], Value::Null);
        assert_eq!(obj["networks"], json!({}));
    }

    #[test]
    fn keeps_extension_fields_flat() {
        let mut artifact = Artifact::default();
        artifact.extensions.insert("x-custom".to_string(), json!({"a": 1}));
        let value = serde_json::to_value(&artifact).unwrap();
        assert_eq!(value["x-custom"], json!({"a": 1}));
    }

    #[test]
    fn converts_network_values() {
        let record = NetworkRecord::from_value(json!({
            "address": "0xAA",
            "transactionHash": "0x01",
            "links": { "Lib": "0xBB" },
            "events": {},
            "blockNumber": 7,
            "ignored": null
        }));
        assert_eq!(record.address.as_deref(), Some("0xAA"));
        assert_eq!(record.transaction_hash.as_deref(), Some("0x01"));
        assert_eq!(record.links.unwrap()["Lib"], json!("0xBB"));
        assert_eq!(record.other, BTreeMap::from([("blockNumber".to_string(), json!(7))]));
        assert_eq!(NetworkRecord::from_value(json!("0xAA")), NetworkRecord::default());
    }

    #[test]
    fn merges_network_sub_fields() {
        let mut existing = NetworkRecord::from_value(json!({
            "address": "0xAA",
            "transactionHash": "0x01",
            "links": { "LibA": "0x0A" },
            "events": { "0xtopic": { "anonymous": false, "name": "Old" } }
        }));
        let newer = NetworkRecord::from_value(json!({
            "address": "0xCC",
            "links": { "LibB": "0x0B" },
            "events": { "0xtopic": { "name": "New" } }
        }));
        existing.merge(newer);

        assert_eq!(existing.address.as_deref(), Some("0xCC"));
        assert_eq!(existing.transaction_hash.as_deref(), Some("0x01"));
        let links = existing.links.unwrap();
        assert_eq!(links.len(), 2);
        assert_eq!(
            existing.events.unwrap()["0xtopic"],
            json!({ "anonymous": false, "name": "New" })
        );
    }
}
