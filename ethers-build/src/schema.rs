//! Normalization of "dirty" artifact-shaped json into canonical [`Artifact`]s.
//!
//! Artifacts show up in many shapes: fresh compiler output, files written by older tools that use
//! legacy key names (`contract_name`, `unlinked_binary`, `srcmap`, ...), raw standard-json
//! contract objects (`evm.bytecode.object`) or contract abstractions that carry their current
//! network as flat `network_id`/`links`/`events` fields. For every canonical field an ordered list
//! of dotted key paths is tried and the first one that yields a value wins.

use crate::artifacts::contract::{Artifact, NetworkRecord, EXTENSION_PREFIX};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// The artifact schema version every normalized artifact is pinned to
pub const SCHEMA_VERSION: &str = "4.0.0";

const CONTRACT_NAME: &[&str] = &["contractName", "contract_name"];
const ABI: &[&str] = &["abi", "interface"];
const BYTECODE: &[&str] = &["bytecode", "binary", "unlinkedBinary", "evm.bytecode.object"];
const DEPLOYED_BYTECODE: &[&str] =
    &["deployedBytecode", "runtimeBytecode", "evm.deployedBytecode.object"];
const SOURCE_MAP: &[&str] = &["sourceMap", "srcmap", "evm.bytecode.sourceMap"];
const DEPLOYED_SOURCE_MAP: &[&str] =
    &["deployedSourceMap", "srcmapRuntime", "evm.deployedBytecode.sourceMap"];
const UPDATED_AT: &[&str] = &["updatedAt", "updated_at"];
const SCHEMA_VERSION_KEYS: &[&str] = &["schemaVersion", "schema_version"];

/// Normalizes any serializable artifact-shaped value, see [`normalize`]
pub fn normalize_artifact<T: Serialize>(artifact: &T) -> serde_json::Result<Artifact> {
    Ok(normalize(&serde_json::to_value(artifact)?))
}

/// Maps the dirty json object onto a canonical [`Artifact`].
///
/// Fields that can't be found are `None`, `schemaVersion` is always [`SCHEMA_VERSION`].
pub fn normalize(dirty: &Value) -> Artifact {
    let input_schema_version =
        lookup_any(dirty, SCHEMA_VERSION_KEYS).and_then(Value::as_str).unwrap_or("0.0.0");
    let ast = lookup(dirty, "ast").cloned();
    let legacy_ast = if schema_major(input_schema_version) < 2 {
        // `legacyAST` was introduced with schema v2, older artifacts only have `ast`
        ast.clone()
    } else {
        lookup(dirty, "legacyAST").cloned()
    };

    Artifact {
        contract_name: lookup_any(dirty, CONTRACT_NAME).and_then(Value::as_str).map(Into::into),
        abi: lookup_any(dirty, ABI).cloned().and_then(sanitize_abi),
        metadata: lookup(dirty, "metadata").cloned(),
        bytecode: lookup_any(dirty, BYTECODE).and_then(Value::as_str).map(prefix_hex),
        deployed_bytecode: lookup_any(dirty, DEPLOYED_BYTECODE)
            .and_then(Value::as_str)
            .map(prefix_hex),
        immutable_references: lookup(dirty, "immutableReferences").cloned(),
        source_map: lookup_string(dirty, SOURCE_MAP),
        deployed_source_map: lookup_string(dirty, DEPLOYED_SOURCE_MAP),
        source: lookup_string(dirty, &["source"]),
        source_path: lookup_string(dirty, &["sourcePath"]),
        ast,
        legacy_ast,
        compiler: lookup(dirty, "compiler").cloned(),
        networks: normalize_networks(dirty),
        schema_version: SCHEMA_VERSION.to_string(),
        updated_at: lookup_any(dirty, UPDATED_AT).and_then(normalize_timestamp),
        network_type: lookup_string(dirty, &["networkType"]),
        devdoc: lookup(dirty, "devdoc").cloned(),
        userdoc: lookup(dirty, "userdoc").cloned(),
        extensions: dirty
            .as_object()
            .map(|obj| {
                obj.iter()
                    .filter(|(key, _)| key.starts_with(EXTENSION_PREFIX))
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect()
            })
            .unwrap_or_default(),
    }
}

/// Follows the dot separated key path, `null` counts as absent
fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(value, |current, key| current.as_object()?.get(key))
        .filter(|value| !value.is_null())
}

/// Returns the value of the first path that yields one
fn lookup_any<'a>(value: &'a Value, paths: &[&str]) -> Option<&'a Value> {
    paths.iter().find_map(|path| lookup(value, path))
}

fn lookup_string(value: &Value, paths: &[&str]) -> Option<String> {
    lookup_any(value, paths).and_then(Value::as_str).map(Into::into)
}

fn schema_major(version: &str) -> u64 {
    version.split('.').next().and_then(|major| major.trim().parse().ok()).unwrap_or_default()
}

/// Ensures the bytecode starts with `0x`
pub fn prefix_hex(bytecode: &str) -> String {
    if bytecode.is_empty() || bytecode.starts_with("0x") {
        bytecode.to_string()
    } else {
        format!("0x{bytecode}")
    }
}

/// Parses an abi that is encoded as json text and removes the derived `signature` of every entry
fn sanitize_abi(abi: Value) -> Option<Value> {
    let abi = match abi {
        Value::String(s) => serde_json::from_str(&s).ok()?,
        abi => abi,
    };
    Some(match abi {
        Value::Array(entries) => Value::Array(entries.into_iter().map(strip_signature).collect()),
        abi => abi,
    })
}

fn strip_signature(entry: Value) -> Value {
    match entry {
        Value::Object(mut obj) => {
            obj.remove("signature");
            Value::Object(obj)
        }
        entry => entry,
    }
}

fn sanitize_events(events: BTreeMap<String, Value>) -> BTreeMap<String, Value> {
    events.into_iter().map(|(topic, event)| (topic, strip_signature(event))).collect()
}

/// Normalizes the `networks` object and folds legacy flat `network_id`, `links` and `events`
/// fields into the matching network entry
fn normalize_networks(dirty: &Value) -> BTreeMap<String, NetworkRecord> {
    let mut networks: BTreeMap<String, NetworkRecord> = lookup(dirty, "networks")
        .and_then(Value::as_object)
        .map(|networks| {
            networks
                .iter()
                .map(|(id, network)| (id.clone(), NetworkRecord::from_value(network.clone())))
                .collect()
        })
        .unwrap_or_default();

    for network in networks.values_mut() {
        if let Some(events) = network.events.take() {
            network.events = Some(sanitize_events(events));
        }
    }

    let network_id = lookup(dirty, "network_id").and_then(|id| match id {
        Value::String(id) => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    });
    if let Some(network) = network_id.and_then(|id| networks.get_mut(&id)) {
        network.links = lookup(dirty, "links").and_then(Value::as_object).map(map_to_btree);
        network.events = lookup(dirty, "events")
            .and_then(Value::as_object)
            .map(|events| sanitize_events(map_to_btree(events)));
    }

    networks
}

fn map_to_btree(map: &Map<String, Value>) -> BTreeMap<String, Value> {
    map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
}

/// Timestamps given as epoch millis are converted to ISO-8601
fn normalize_timestamp(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .map(|ts| ts.to_rfc3339_opts(SecondsFormat::Millis, true)),
        _ => None,
    }
}

/// Returns the current time formatted like `2021-01-01T00:00:00.000Z`
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parses an ISO-8601 `updatedAt` timestamp
pub fn parse_timestamp(timestamp: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(timestamp).ok().map(|ts| ts.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn normalizes_minimal_artifact() {
        let artifact = normalize(&json!({ "contractName": "Foo" }));
        assert_eq!(artifact.contract_name.as_deref(), Some("Foo"));
        assert_eq!(artifact.schema_version, SCHEMA_VERSION);
        assert!(artifact.abi.is_none());
        assert!(artifact.bytecode.is_none());
        assert!(artifact.networks.is_empty());

        let value = serde_json::to_value(&artifact).unwrap();
        for key in Artifact::CANONICAL_FIELDS {
            assert!(value.as_object().unwrap().contains_key(key), "missing {key}");
        }
    }

    #[test]
    fn pins_schema_version() {
        let artifact = normalize(&json!({ "contractName": "Foo", "schemaVersion": "1.0.0" }));
        assert_eq!(artifact.schema_version, SCHEMA_VERSION);
        let artifact = normalize(&json!({ "contract_name": "Foo", "schema_version": "9.9.9" }));
        assert_eq!(artifact.schema_version, SCHEMA_VERSION);
    }

    #[test]
    fn prefixes_bytecode() {
        let artifact = normalize(&json!({ "bytecode": "600160", "deployedBytecode": "0x600160" }));
        assert_eq!(artifact.bytecode.as_deref(), Some("0x600160"));
        assert_eq!(artifact.deployed_bytecode.as_deref(), Some("0x600160"));
        assert_eq!(prefix_hex(""), "");
    }

    #[test]
    fn reads_legacy_and_nested_keys() {
        let artifact = normalize(&json!({
            "contract_name": "Legacy",
            "unlinkedBinary": "6001",
            "srcmap": "1:2:0",
            "evm": {
                "deployedBytecode": { "object": "6002", "sourceMap": "3:4:0" }
            },
            "updated_at": 0
        }));
        assert_eq!(artifact.contract_name.as_deref(), Some("Legacy"));
        assert_eq!(artifact.bytecode.as_deref(), Some("0x6001"));
        assert_eq!(artifact.deployed_bytecode.as_deref(), Some("0x6002"));
        assert_eq!(artifact.source_map.as_deref(), Some("1:2:0"));
        assert_eq!(artifact.deployed_source_map.as_deref(), Some("3:4:0"));
        assert_eq!(artifact.updated_at.as_deref(), Some("1970-01-01T00:00:00.000Z"));
    }

    #[test]
    fn first_source_key_wins() {
        let artifact = normalize(&json!({ "bytecode": "01", "binary": "02" }));
        assert_eq!(artifact.bytecode.as_deref(), Some("0x01"));
        let artifact = normalize(&json!({ "bytecode": null, "binary": "02" }));
        assert_eq!(artifact.bytecode.as_deref(), Some("0x02"));
    }

    #[test]
    fn sanitizes_abi() {
        let abi = json!([{ "type": "function", "name": "foo", "signature": "0x12345678" }]);
        let artifact = normalize(&json!({ "abi": abi }));
        assert_eq!(artifact.abi, Some(json!([{ "type": "function", "name": "foo" }])));

        let artifact = normalize(&json!({ "interface": abi.to_string() }));
        assert_eq!(artifact.abi, Some(json!([{ "type": "function", "name": "foo" }])));

        let artifact = normalize(&json!({ "abi": "not json" }));
        assert_eq!(artifact.abi, None);
    }

    #[test]
    fn sanitizes_network_events() {
        let artifact = normalize(&json!({
            "networks": {
                "1": {
                    "address": "0xAA",
                    "events": { "0xtopic": { "name": "Transfer", "signature": "Transfer()" } }
                }
            }
        }));
        let events = artifact.networks["1"].events.as_ref().unwrap();
        assert_eq!(events["0xtopic"], json!({ "name": "Transfer" }));
    }

    #[test]
    fn folds_flat_network_fields() {
        let artifact = normalize(&json!({
            "network_id": 5,
            "links": { "Lib": "0xBB" },
            "events": { "0xtopic": { "name": "E", "signature": "E()" } },
            "networks": { "5": { "address": "0xAA" }, "1": { "address": "0xCC" } }
        }));
        let network = &artifact.networks["5"];
        assert_eq!(network.address.as_deref(), Some("0xAA"));
        assert_eq!(network.links.as_ref().unwrap()["Lib"], json!("0xBB"));
        assert_eq!(network.events.as_ref().unwrap()["0xtopic"], json!({ "name": "E" }));
        assert!(artifact.networks["1"].links.is_none());
    }

    #[test]
    fn copies_legacy_ast_for_old_schemas() {
        let artifact = normalize(&json!({ "ast": { "id": 1 } }));
        assert_eq!(artifact.legacy_ast, Some(json!({ "id": 1 })));

        let artifact = normalize(&json!({
            "schemaVersion": "3.0.0",
            "ast": { "id": 1 },
            "legacyAST": { "id": 2 }
        }));
        assert_eq!(artifact.legacy_ast, Some(json!({ "id": 2 })));
    }

    #[test]
    fn copies_extension_fields() {
        let artifact = normalize(&json!({ "x-truffle": { "a": 1 }, "unknown": true }));
        assert_eq!(artifact.extensions.len(), 1);
        assert_eq!(artifact.extensions["x-truffle"], json!({ "a": 1 }));
    }

    #[test]
    fn normalization_is_idempotent() {
        let artifact = normalize(&json!({
            "contractName": "Foo",
            "bytecode": "6001",
            "networks": { "1": { "address": "0xAA" } },
            "x-ext": 1
        }));
        let again = normalize_artifact(&artifact).unwrap();
        assert_eq!(artifact, again);
    }

    #[test]
    fn parses_timestamps() {
        let ts = now_timestamp();
        assert!(parse_timestamp(&ts).is_some());
        assert!(parse_timestamp("yesterday").is_none());
    }
}
