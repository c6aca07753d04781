use crate::{
    artifacts::{
        CompiledContract, CompilerInfo, CompilerInput, Contract, Settings, SolcOutput, Source,
        Sources,
    },
    config::CompilerSettings,
    error::{Result, SolcError},
    utils,
};
use once_cell::sync::OnceCell;
use semver::{Version, VersionReq};
use serde::{de::DeserializeOwned, Serialize};
use std::{
    fmt,
    io::BufRead,
    path::{Path, PathBuf},
    process::{Command, Output, Stdio},
    str::FromStr,
};

pub mod supplier;
pub use supplier::CompilerSupplier;

/// The name of the `solc` binary on the system
pub const SOLC: &str = "solc";

/// The message solc emits if the version pragma of a source doesn't match the compiler
pub const VERSION_MISMATCH_MESSAGE: &str = "requires different compiler version";

/// Options of a single compiler run
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CompileOptions {
    pub settings: CompilerSettings,
    /// Files to produce contract output for, all files if empty
    pub targets: Vec<PathBuf>,
    /// Suppresses warnings
    pub quiet: bool,
}

/// The contracts of a compiler run
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CompilerOutput {
    pub contracts: Vec<CompiledContract>,
    pub compiler_info: CompilerInfo,
}

/// The interface to a solidity compiler.
///
/// Besides producing contract output the compiler is also used to extract the imports of a source
/// file, which fails for sources the compiler can't handle.
pub trait Compiler: Send + Sync {
    /// Compiles the sources, contract output is produced for the `targets` of the options
    fn compile(&self, sources: &Sources, options: &CompileOptions) -> Result<CompilerOutput>;

    /// Returns the import paths of the source, as written
    fn parse_imports(&self, source: &str) -> Result<Vec<String>>;

    /// The version of the compiler
    fn version(&self) -> Result<Version>;
}

/// Abstraction over `solc` command line utility
///
/// By default the solc path is configured as follows, with descending priority:
///   1. `SOLC_PATH` environment variable
///   2. `solc` otherwise
#[derive(Debug, Clone)]
pub struct Solc {
    /// Path to the `solc` executable
    pub solc: PathBuf,
    /// Additional arguments passed to the `solc` exectuable
    pub args: Vec<String>,
    version: OnceCell<Version>,
}

impl Default for Solc {
    fn default() -> Self {
        if let Ok(solc) = std::env::var("SOLC_PATH") {
            return Solc::new(solc)
        }
        Solc::new(SOLC)
    }
}

impl fmt::Display for Solc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.solc.display())?;
        if !self.args.is_empty() {
            write!(f, " {}", self.args.join(" "))?;
        }
        Ok(())
    }
}

impl Solc {
    /// A new instance which points to `solc`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Solc { solc: path.into(), args: Vec::new(), version: OnceCell::new() }
    }

    /// Adds an argument to pass to the `solc` command.
    #[must_use]
    pub fn arg<T: Into<String>>(mut self, arg: T) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Adds multiple arguments to pass to the `solc`.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for arg in args {
            self = self.arg(arg);
        }
        self
    }

    /// Parses the given source looking for the `pragma` definition and
    /// returns the corresponding SemVer version requirement.
    pub fn source_version_req(source: &Source) -> Result<Option<VersionReq>> {
        utils::find_version_pragma(&source.content).map(Self::version_req).transpose()
    }

    /// Returns the corresponding SemVer version requirement for the solidity version
    pub fn version_req(version: &str) -> Result<VersionReq> {
        let version = version.trim().replace(' ', ",");

        // Somehow, Solidity semver without an operator is considered to be "exact",
        // but lack of operator automatically marks the operator as Caret, so we need
        // to manually patch it? :shrug:
        let exact = !version.starts_with(['*', '^', '=', '>', '<', '~']);
        let mut version = VersionReq::parse(&version)?;
        // a bare wildcard (`x`, `X`) parses without comparators
        if let Some(comparator) = version.comparators.first_mut().filter(|_| exact) {
            comparator.op = semver::Op::Exact;
        }

        Ok(version)
    }

    /// Returns the version from the configured `solc`, without pre-release and build metadata
    pub fn version_short(&self) -> Result<Version> {
        let version = self.full_version()?;
        Ok(Version::new(version.major, version.minor, version.patch))
    }

    /// Returns the version from the configured `solc`.
    ///
    /// `solc --version` is only invoked once.
    pub fn full_version(&self) -> Result<Version> {
        self.version
            .get_or_try_init(|| {
                version_from_output(
                    Command::new(&self.solc)
                        .arg("--version")
                        .stdin(Stdio::piped())
                        .stderr(Stdio::piped())
                        .stdout(Stdio::piped())
                        .output()
                        .map_err(|err| SolcError::io(err, &self.solc))?,
                )
            })
            .cloned()
    }

    /// Fails if the version pragma of the source doesn't accept this compiler
    pub fn ensure_compatible(&self, source: &Source) -> Result<()> {
        let Some(req) = Self::source_version_req(source)? else { return Ok(()) };
        let version = self.version_short()?;
        if req.matches(&version) {
            return Ok(())
        }
        let pragma = utils::RE_SOL_PRAGMA
            .find(&source.content)
            .map(|m| m.as_str())
            .unwrap_or_default();
        Err(SolcError::compiler(format!(
            "Source file {VERSION_MISMATCH_MESSAGE} (current compiler is {}) - note that nightly builds are considered to be strictly less than the released version\n{pragma};",
            self.full_version()?
        )))
    }

    /// Run `solc --stand-json` and return the `solc`'s output as the given json
    /// output
    pub fn compile_as<T: Serialize, D: DeserializeOwned>(&self, input: &T) -> Result<D> {
        let output = self.compile_output(input)?;
        Ok(serde_json::from_slice(&output)?)
    }

    pub fn compile_output<T: Serialize>(&self, input: &T) -> Result<Vec<u8>> {
        let mut child = Command::new(&self.solc)
            .args(&self.args)
            .arg("--standard-json")
            .stdin(Stdio::piped())
            .stderr(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()
            .map_err(|err| SolcError::io(err, &self.solc))?;
        let stdin = child.stdin.take().ok_or_else(|| SolcError::msg("solc stdin unavailable"))?;
        serde_json::to_writer(stdin, input)?;
        compile_output(child.wait_with_output().map_err(|err| SolcError::io(err, &self.solc))?)
    }

    fn compiler_info(&self) -> Result<CompilerInfo> {
        Ok(CompilerInfo { name: SOLC.to_string(), version: self.full_version()?.to_string() })
    }
}

impl Compiler for Solc {
    #[tracing::instrument(skip_all, name = "solc::compile")]
    fn compile(&self, sources: &Sources, options: &CompileOptions) -> Result<CompilerOutput> {
        let settings = Settings {
            optimizer: options.settings.optimizer.clone(),
            evm_version: options.settings.evm_version.clone(),
            ..Default::default()
        }
        .select_outputs(options.targets.iter().map(PathBuf::as_path));
        let input = CompilerInput::with_sources(sources.clone()).settings(settings);

        tracing::trace!("compiling {} sources with {}", sources.len(), self);
        let output: SolcOutput = self.compile_as(&input)?;

        if output.has_error() {
            let errors = output
                .errors
                .iter()
                .filter(|err| err.severity.is_error())
                .map(ToString::to_string)
                .collect::<Vec<_>>();
            return Err(SolcError::compiler(errors.join("\n\n")))
        }
        if !options.quiet {
            for warning in output.errors.iter().filter(|err| !err.severity.is_error()) {
                tracing::warn!("{}", warning);
            }
        }

        let compiler_info = self.compiler_info()?;
        let contracts = flatten_output(output, sources, &compiler_info);
        Ok(CompilerOutput { contracts, compiler_info })
    }

    fn parse_imports(&self, source: &str) -> Result<Vec<String>> {
        let source = Source::new(source);
        self.ensure_compatible(&source)?;
        Ok(utils::find_import_paths(&source.content).into_iter().map(str::to_string).collect())
    }

    fn version(&self) -> Result<Version> {
        self.full_version()
    }
}

/// Converts the nested `file -> name -> contract` output into one entry per contract
fn flatten_output(
    output: SolcOutput,
    sources: &Sources,
    compiler: &CompilerInfo,
) -> Vec<CompiledContract> {
    let SolcOutput { sources: source_files, contracts, .. } = output;
    contracts
        .into_iter()
        .flat_map(|(file, contracts)| {
            let ast = source_files.get(&file).and_then(|f| f.ast.clone());
            let source = sources.get(Path::new(&file)).map(|s| s.content.clone());
            contracts.into_iter().map(move |(name, contract)| {
                compiled_contract(name, contract, &file, source.clone(), ast.clone(), compiler)
            })
        })
        .collect()
}

fn compiled_contract(
    contract_name: String,
    contract: Contract,
    file: &str,
    source: Option<String>,
    ast: Option<serde_json::Value>,
    compiler: &CompilerInfo,
) -> CompiledContract {
    let Contract { abi, metadata, userdoc, devdoc, evm } = contract;
    let evm = evm.unwrap_or_default();
    let (bytecode, source_map) =
        evm.bytecode.map(|b| (Some(b.object), b.source_map)).unwrap_or_default();
    let (deployed_bytecode, deployed_source_map, immutable_references) = evm
        .deployed_bytecode
        .map(|b| (Some(b.object), b.source_map, b.immutable_references))
        .unwrap_or_default();
    CompiledContract {
        contract_name,
        abi,
        metadata,
        bytecode,
        deployed_bytecode,
        immutable_references,
        source_map,
        deployed_source_map,
        source,
        source_path: Some(file.to_string()),
        ast,
        devdoc,
        userdoc,
        compiler: compiler.clone(),
    }
}

fn compile_output(output: Output) -> Result<Vec<u8>> {
    if output.status.success() {
        Ok(output.stdout)
    } else {
        Err(SolcError::compiler(String::from_utf8_lossy(&output.stderr).to_string()))
    }
}

fn version_from_output(output: Output) -> Result<Version> {
    if output.status.success() {
        let version = output
            .stdout
            .lines()
            .map_while(std::result::Result::ok)
            .filter(|l| !l.trim().is_empty())
            .last()
            .ok_or_else(|| SolcError::compiler("version not found in solc output"))?;
        // NOTE: semver doesn't like `+` in g++ in build metadata which is invalid semver
        Ok(Version::from_str(&version.trim_start_matches("Version: ").replace(".g++", ".gcc"))?)
    } else {
        Err(SolcError::compiler(String::from_utf8_lossy(&output.stderr).to_string()))
    }
}

impl AsRef<Path> for Solc {
    fn as_ref(&self) -> &Path {
        &self.solc
    }
}

impl<T: Into<PathBuf>> From<T> for Solc {
    fn from(solc: T) -> Self {
        Solc::new(solc.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::{Bytecode, Evm, SourceFile};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn source(version: &str) -> Source {
        Source { content: format!("pragma solidity {version};\n") }
    }

    /// A solc with a known version, so no process is spawned
    fn solc(version: &str) -> Solc {
        let solc = Solc::new("solc");
        solc.version.set(Version::from_str(version).unwrap()).unwrap();
        solc
    }

    #[test]
    fn can_parse_version_metadata() {
        let _version = Version::from_str("0.6.6+commit.6c089d02.Linux.gcc").unwrap();
    }

    #[test]
    fn test_version_req() {
        let versions = ["=0.1.2", "^0.5.6", ">=0.7.1", ">0.8.0"];
        let sources = versions.iter().map(|version| source(version));

        sources.zip(versions).for_each(|(source, version)| {
            let version_req = Solc::source_version_req(&source).unwrap().unwrap();
            assert_eq!(version_req, VersionReq::from_str(version).unwrap());
        });

        // Solidity defines version ranges with a space, whereas the semver package
        // requires them to be separated with a comma
        let version_range = ">=0.8.0 <0.9.0";
        let source = source(version_range);
        let version_req = Solc::source_version_req(&source).unwrap().unwrap();
        assert_eq!(version_req, VersionReq::from_str(">=0.8.0,<0.9.0").unwrap());

        assert!(Solc::source_version_req(&Source::new("contract A {}")).unwrap().is_none());
    }

    #[test]
    fn exact_pragma_without_operator() {
        let req = Solc::version_req("0.4.14").unwrap();
        assert!(req.matches(&Version::new(0, 4, 14)));
        assert!(!req.matches(&Version::new(0, 4, 15)));
    }

    #[test]
    fn wildcard_pragma_accepts_any_version() {
        for wildcard in ["x", "X", "*"] {
            let req = Solc::version_req(wildcard).unwrap();
            assert!(req.matches(&Version::new(0, 8, 17)), "{wildcard}");
            assert!(req.matches(&Version::new(0, 4, 11)), "{wildcard}");
        }

        let solc = solc("0.8.10");
        let imports = solc.parse_imports("pragma solidity x;\nimport \"./A.sol\";").unwrap();
        assert_eq!(imports, vec!["./A.sol".to_string()]);
    }

    #[test]
    fn parses_imports_of_compatible_sources() {
        let solc = solc("0.8.10+commit.fc410830.Linux.gcc");
        let imports = solc
            .parse_imports("pragma solidity ^0.8.0;\nimport \"./A.sol\";\nimport 'pkg/B.sol';")
            .unwrap();
        assert_eq!(imports, vec!["./A.sol".to_string(), "pkg/B.sol".to_string()]);
    }

    #[test]
    fn rejects_incompatible_pragma() {
        let solc = solc("0.5.16");
        let err = solc.parse_imports("pragma solidity ^0.8.0;\ncontract A {}").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains(VERSION_MISMATCH_MESSAGE), "{msg}");
        assert!(msg.contains("pragma solidity ^0.8.0;"), "{msg}");
    }

    #[test]
    fn flattens_solc_output() {
        let compiler = CompilerInfo { name: SOLC.to_string(), version: "0.8.10".to_string() };
        let contract = Contract {
            abi: Some(json!([])),
            evm: Some(Evm {
                bytecode: Some(Bytecode {
                    object: "6080".to_string(),
                    source_map: Some("1:2:0".to_string()),
                    immutable_references: None,
                }),
                deployed_bytecode: Some(Bytecode {
                    object: "6060".to_string(),
                    source_map: None,
                    immutable_references: Some(json!({})),
                }),
            }),
            ..Default::default()
        };
        let output = SolcOutput {
            errors: vec![],
            sources: BTreeMap::from([(
                "/p/A.sol".to_string(),
                SourceFile { id: 0, ast: Some(json!({ "nodeType": "SourceUnit" })) },
            )]),
            contracts: BTreeMap::from([(
                "/p/A.sol".to_string(),
                BTreeMap::from([("A".to_string(), contract)]),
            )]),
        };
        let sources = Sources::from([(PathBuf::from("/p/A.sol"), Source::new("contract A {}"))]);

        let contracts = flatten_output(output, &sources, &compiler);
        assert_eq!(contracts.len(), 1);
        let a = &contracts[0];
        assert_eq!(a.contract_name, "A");
        assert_eq!(a.bytecode.as_deref(), Some("6080"));
        assert_eq!(a.source_map.as_deref(), Some("1:2:0"));
        assert_eq!(a.deployed_bytecode.as_deref(), Some("6060"));
        assert_eq!(a.immutable_references, Some(json!({})));
        assert_eq!(a.source.as_deref(), Some("contract A {}"));
        assert_eq!(a.source_path.as_deref(), Some("/p/A.sol"));
        assert!(a.ast.is_some());
        assert_eq!(a.compiler, compiler);
    }
}
