//! Persistence of contract artifacts.
//!
//! Every contract is stored as `<destination>/<ContractName>.json`. Writing an artifact never
//! discards the deployment history that is already recorded in the existing file: its `networks`
//! are merged with the new ones.

use crate::{
    artifacts::{Artifact, CompiledContract},
    error::{Result, SolcError},
    schema, utils,
};
use rayon::prelude::*;
use serde::Serialize;
use serde_json::Value;
use std::{
    collections::BTreeMap,
    fs, io,
    path::{Path, PathBuf},
};

/// Writes normalized artifacts into a destination directory
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Artifactor {
    destination: PathBuf,
}

impl Artifactor {
    pub fn new(destination: impl Into<PathBuf>) -> Self {
        Self { destination: destination.into() }
    }

    /// The directory the artifacts are written to
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Returns the file the artifact of the contract is stored in
    pub fn artifact_path(&self, contract_name: &str) -> PathBuf {
        self.destination.join(format!("{contract_name}.json"))
    }

    /// Normalizes the artifact, merges it with the existing file of the same contract and writes
    /// it.
    ///
    /// Returns the path of the written file.
    pub fn save<T: Serialize>(&self, artifact: &T) -> Result<PathBuf> {
        let artifact = schema::normalize_artifact(artifact)?;
        let name = artifact
            .name()
            .filter(|name| is_file_name(name))
            .ok_or(SolcError::InvalidArtifact)?
            .to_string();
        let path = self.artifact_path(&name);

        let mut artifact = match self.read_existing(&path)? {
            Some(existing) => merge(existing, artifact),
            None => artifact,
        };
        artifact.updated_at = Some(schema::now_timestamp());

        tracing::trace!("writing artifact \"{}\"", path.display());
        utils::write_json_file(&artifact, &path)?;
        Ok(path)
    }

    /// Saves all artifacts in parallel.
    ///
    /// Fails if the destination directory doesn't exist.
    #[tracing::instrument(skip_all, name = "artifactor::save_all")]
    pub fn save_all<T: Serialize + Sync>(&self, artifacts: &BTreeMap<String, T>) -> Result<()> {
        if !self.destination.is_dir() {
            return Err(SolcError::MissingDestination(self.destination.clone()))
        }
        tracing::trace!(
            "saving {} artifacts to \"{}\"",
            artifacts.len(),
            self.destination.display()
        );
        artifacts.par_iter().try_for_each(|(_, artifact)| self.save(artifact).map(drop))
    }

    /// Reads and normalizes the existing artifact file, if any
    fn read_existing(&self, path: &Path) -> Result<Option<Artifact>> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) if err.kind() == io::ErrorKind::InvalidData => {
                return Err(SolcError::corrupt(path, err))
            }
            Err(err) => return Err(SolcError::corrupt(path, SolcError::io(err, path))),
        };
        let existing: Value =
            serde_json::from_str(&content).map_err(|err| SolcError::corrupt(path, err))?;
        Ok(Some(schema::normalize(&existing)))
    }
}

/// Whether the contract name can be used as the file name of its artifact inside the destination
fn is_file_name(name: &str) -> bool {
    !name.contains(['/', '\\']) && name != "." && name != ".."
}

/// Merges the newer artifact into the existing one.
///
/// Deployments on networks the newer artifact doesn't know about are kept, overlapping network
/// records are merged field by field. All other fields come from the newer artifact, extension
/// fields of both are kept.
pub fn merge(existing: Artifact, newer: Artifact) -> Artifact {
    let Artifact { networks: mut merged_networks, extensions: mut merged_extensions, .. } =
        existing;
    let Artifact { networks, extensions, .. } = &newer;

    for (network_id, record) in networks {
        match merged_networks.get_mut(network_id) {
            Some(existing) => existing.merge(record.clone()),
            None => {
                merged_networks.insert(network_id.clone(), record.clone());
            }
        }
    }
    merged_extensions.extend(extensions.iter().map(|(k, v)| (k.clone(), v.clone())));

    Artifact { networks: merged_networks, extensions: merged_extensions, ..newer }
}

/// Keys the compiled contracts by their contract name, later contracts win on duplicate names
pub fn by_contract_name(contracts: Vec<CompiledContract>) -> BTreeMap<String, CompiledContract> {
    contracts.into_iter().map(|contract| (contract.contract_name.clone(), contract)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::{tempdir, touch};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn read(path: &Path) -> Value {
        utils::read_json_file(path).unwrap()
    }

    #[test]
    fn merge_preserves_history() {
        let tmp = tempdir("artifacts").unwrap();
        let artifactor = Artifactor::new(tmp.path());

        let path = artifactor
            .save(&json!({
                "contractName": "Foo",
                "bytecode": "0x01",
                "networks": { "1": { "address": "0xAA", "transactionHash": "0x11" } }
            }))
            .unwrap();
        assert_eq!(path, tmp.path().join("Foo.json"));

        artifactor
            .save(&json!({
                "contractName": "Foo",
                "bytecode": "0x02",
                "networks": { "2": { "address": "0xBB" } }
            }))
            .unwrap();

        let saved = read(&path);
        assert_eq!(saved["bytecode"], json!("0x02"));
        assert_eq!(saved["networks"]["1"], json!({ "address": "0xAA", "transactionHash": "0x11" }));
        assert_eq!(saved["networks"]["2"], json!({ "address": "0xBB" }));
        assert_eq!(saved["schemaVersion"], json!(schema::SCHEMA_VERSION));
        assert!(schema::parse_timestamp(saved["updatedAt"].as_str().unwrap()).is_some());
    }

    #[test]
    fn overlapping_networks_merge_sub_fields() {
        let tmp = tempdir("artifacts").unwrap();
        let artifactor = Artifactor::new(tmp.path());
        artifactor
            .save(&json!({
                "contractName": "Foo",
                "networks": { "1": { "address": "0xAA", "links": { "LibA": "0x0A" } } },
                "x-old": true
            }))
            .unwrap();
        let path = artifactor
            .save(&json!({
                "contractName": "Foo",
                "networks": { "1": { "transactionHash": "0x11", "links": { "LibB": "0x0B" } } },
                "x-new": true
            }))
            .unwrap();

        let saved = read(&path);
        assert_eq!(
            saved["networks"]["1"],
            json!({
                "address": "0xAA",
                "transactionHash": "0x11",
                "links": { "LibA": "0x0A", "LibB": "0x0B" }
            })
        );
        assert_eq!(saved["x-old"], json!(true));
        assert_eq!(saved["x-new"], json!(true));
    }

    #[test]
    fn does_not_overwrite_corrupt_files() {
        let tmp = tempdir("artifacts").unwrap();
        let path = tmp.path().join("Foo.json");
        touch(&path, "{ not json");

        let artifactor = Artifactor::new(tmp.path());
        let err = artifactor.save(&json!({ "contractName": "Foo" })).unwrap_err();
        assert!(matches!(err, SolcError::CorruptArtifact { .. }), "{err}");
        assert_eq!(fs::read_to_string(&path).unwrap(), "{ not json");

        fs::write(&path, [0xff, 0xfe, 0x00]).unwrap();
        let err = artifactor.save(&json!({ "contractName": "Foo" })).unwrap_err();
        assert!(matches!(err, SolcError::CorruptArtifact { .. }), "{err}");
    }

    #[test]
    fn requires_contract_name() {
        let tmp = tempdir("artifacts").unwrap();
        let artifactor = Artifactor::new(tmp.path());
        let err = artifactor.save(&json!({ "bytecode": "0x01" })).unwrap_err();
        assert!(matches!(err, SolcError::InvalidArtifact));
        let err = artifactor.save(&json!({ "contractName": "" })).unwrap_err();
        assert_eq!(err.to_string(), "You must specify a contract name.");
        assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[test]
    fn rejects_names_outside_destination() {
        let tmp = tempdir("artifacts").unwrap();
        let destination = tmp.path().join("build");
        fs::create_dir_all(&destination).unwrap();
        let artifactor = Artifactor::new(&destination);

        for name in ["../Escape", "nested/Foo", "nested\\Foo", ".."] {
            let err = artifactor.save(&json!({ "contractName": name })).unwrap_err();
            assert!(matches!(err, SolcError::InvalidArtifact), "{name}: {err}");
        }
        assert!(!tmp.path().join("Escape.json").exists());
        assert_eq!(fs::read_dir(&destination).unwrap().count(), 0);
    }

    #[test]
    fn save_all_requires_destination() {
        let tmp = tempdir("artifacts").unwrap();
        let missing = tmp.path().join("build").join("contracts");
        let artifactor = Artifactor::new(&missing);
        let artifacts = BTreeMap::from([("Foo".to_string(), json!({ "contractName": "Foo" }))]);

        let err = artifactor.save_all(&artifacts).unwrap_err();
        assert!(err.to_string().contains("doesn't exist!"), "{err}");

        fs::create_dir_all(&missing).unwrap();
        artifactor.save_all(&artifacts).unwrap();
        assert!(missing.join("Foo.json").is_file());
    }

    #[test]
    fn keys_contracts_by_name() {
        let contracts = vec![
            CompiledContract { contract_name: "A".to_string(), ..Default::default() },
            CompiledContract { contract_name: "B".to_string(), ..Default::default() },
        ];
        let by_name = by_contract_name(contracts);
        assert_eq!(by_name.keys().collect::<Vec<_>>(), vec!["A", "B"]);
    }
}
