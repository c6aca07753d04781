//! A compiler stand-in for tests that don't have `solc` available

use crate::{
    artifacts::{CompiledContract, CompilerInfo, Sources},
    compile::{CompileOptions, CompilerOutput, VERSION_MISMATCH_MESSAGE},
    error::{Result, SolcError},
    utils, Compiler, Solc,
};
use once_cell::sync::Lazy;
use regex::Regex;
use semver::Version;
use serde_json::json;
use std::{
    path::PathBuf,
    sync::{Arc, Mutex},
};

/// Matches the name of every contract, library and interface definition
static RE_CONTRACT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:contract|library|interface)\s+(?P<name>\w+)").unwrap());

/// Compiles sources by "finding" their contract definitions.
///
/// The bytecode of a contract is the hex encoded contract name. Every compiler run is recorded,
/// clones share the record.
#[derive(Clone, Debug)]
pub struct MockCompiler {
    version: Version,
    runs: Arc<Mutex<Vec<Vec<PathBuf>>>>,
}

impl Default for MockCompiler {
    fn default() -> Self {
        Self::new("0.8.17")
    }
}

impl MockCompiler {
    /// Creates a mock compiler that reports the given version
    ///
    /// **Panics if the version is not valid semver**
    pub fn new(version: &str) -> Self {
        Self { version: Version::parse(version).expect("valid version"), runs: Default::default() }
    }

    /// The compilation targets of all runs so far
    pub fn runs(&self) -> Vec<Vec<PathBuf>> {
        self.runs.lock().map(|runs| runs.clone()).unwrap_or_default()
    }
}

impl Compiler for MockCompiler {
    fn compile(&self, sources: &Sources, options: &CompileOptions) -> Result<CompilerOutput> {
        if let Ok(mut runs) = self.runs.lock() {
            runs.push(options.targets.clone());
        }
        let compiler_info =
            CompilerInfo { name: "mock".to_string(), version: self.version.to_string() };
        let info = &compiler_info;
        let contracts = sources
            .iter()
            .filter(|(path, _)| options.targets.is_empty() || options.targets.contains(*path))
            .flat_map(|(path, source)| {
                RE_CONTRACT.captures_iter(&source.content).filter_map(|cap| cap.name("name")).map(
                    move |name| {
                        let bytecode = hex::encode(name.as_str());
                        CompiledContract {
                            contract_name: name.as_str().to_string(),
                            abi: Some(json!([])),
                            bytecode: Some(bytecode.clone()),
                            deployed_bytecode: Some(bytecode),
                            source: Some(source.content.clone()),
                            source_path: Some(path.to_string_lossy().into_owned()),
                            compiler: info.clone(),
                            ..Default::default()
                        }
                    },
                )
            })
            .collect();
        Ok(CompilerOutput { contracts, compiler_info })
    }

    fn parse_imports(&self, source: &str) -> Result<Vec<String>> {
        if let Some(pragma) = utils::find_version_pragma(source) {
            let req = Solc::version_req(pragma)?;
            if !req.matches(&self.version) {
                return Err(SolcError::Compiler(format!(
                    "Source file {VERSION_MISMATCH_MESSAGE} (current compiler is {})\npragma solidity {pragma};",
                    self.version
                )))
            }
        }
        Ok(utils::find_import_paths(source).into_iter().map(str::to_string).collect())
    }

    fn version(&self) -> Result<Version> {
        Ok(self.version.clone())
    }
}
