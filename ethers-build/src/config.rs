use crate::{artifacts::Optimizer, error::Result, utils};
use std::{
    fmt,
    path::{Path, PathBuf},
};

/// Where to find all files or where to write them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectPathsConfig {
    /// Project root, the working directory
    pub root: PathBuf,
    /// Where to find sources
    pub contracts: PathBuf,
    /// The build directory
    pub build: PathBuf,
    /// Where to store contract artifacts
    pub contracts_build: PathBuf,
}

impl ProjectPathsConfig {
    pub fn builder() -> ProjectPathsConfigBuilder {
        ProjectPathsConfigBuilder::default()
    }

    /// Creates a new config with the default layout for the root:
    /// `contracts`, `build` and `build/contracts`
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        Self::builder().root(root).build()
    }

    /// Creates a new config with the current directory as root
    pub fn current() -> Result<Self> {
        let current_dir = std::env::current_dir()
            .map_err(|err| crate::error::SolcError::io(err, "."))?;
        Self::new(current_dir)
    }

    /// Returns the path relative to the root as `./path` for display purposes
    pub fn display(&self, path: &Path) -> String {
        utils::display_path(path, &self.root)
    }
}

impl fmt::Display for ProjectPathsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "root: {}", self.root.display())?;
        writeln!(f, "contracts: {}", self.contracts.display())?;
        writeln!(f, "build: {}", self.build.display())?;
        write!(f, "contracts build: {}", self.contracts_build.display())
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProjectPathsConfigBuilder {
    root: Option<PathBuf>,
    contracts: Option<PathBuf>,
    build: Option<PathBuf>,
    contracts_build: Option<PathBuf>,
}

impl ProjectPathsConfigBuilder {
    #[must_use]
    pub fn root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    #[must_use]
    pub fn contracts(mut self, contracts: impl Into<PathBuf>) -> Self {
        self.contracts = Some(contracts.into());
        self
    }

    #[must_use]
    pub fn build_dir(mut self, build: impl Into<PathBuf>) -> Self {
        self.build = Some(build.into());
        self
    }

    #[must_use]
    pub fn contracts_build(mut self, contracts_build: impl Into<PathBuf>) -> Self {
        self.contracts_build = Some(contracts_build.into());
        self
    }

    /// Canonicalizes the root, which must exist, and resolves all relative directories against it
    pub fn build(self) -> Result<ProjectPathsConfig> {
        let root = match self.root {
            Some(root) => root,
            None => std::env::current_dir()
                .map_err(|err| crate::error::SolcError::io(err, "."))?,
        };
        let root = utils::canonicalize(root)?;
        let join = |dir: PathBuf| if dir.is_absolute() { dir } else { root.join(dir) };

        let contracts = self.contracts.map(join).unwrap_or_else(|| root.join("contracts"));
        let build = self.build.map(join).unwrap_or_else(|| root.join("build"));
        let contracts_build =
            self.contracts_build.map(join).unwrap_or_else(|| build.join("contracts"));

        Ok(ProjectPathsConfig { root, contracts, build, contracts_build })
    }
}

/// How the compiler is invoked
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompilerSettings {
    pub optimizer: Optimizer,
    /// The target EVM version, the compiler's default if not set
    pub evm_version: Option<String>,
    /// Path to a local `solc` executable
    pub solc: Option<PathBuf>,
}

impl CompilerSettings {
    /// Enables the optimizer with the given number of runs
    #[must_use]
    pub fn optimize(mut self, runs: u32) -> Self {
        self.optimizer = Optimizer { enabled: true, runs };
        self
    }

    #[must_use]
    pub fn evm_version(mut self, evm_version: impl Into<String>) -> Self {
        self.evm_version = Some(evm_version.into());
        self
    }

    /// Uses the `solc` at the given path
    #[must_use]
    pub fn solc(mut self, solc: impl Into<PathBuf>) -> Self {
        self.solc = Some(solc.into());
        self
    }
}
