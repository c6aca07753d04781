//! Utilities for mocking project workspaces
use crate::{
    config::ProjectPathsConfigBuilder,
    error::{Result, SolcError},
    utils::{self, tempdir},
    Compiler, Project, ProjectBuilder, ProjectCompileOutput, ProjectPathsConfig,
};
use serde_json::Value;
use std::{
    fmt, fs,
    path::{Path, PathBuf},
};
use tempfile::TempDir;

pub mod mock;

/// A [`Project`] wrapper that lives in a new temporary directory
///
/// Once `TempProject` is dropped, the temp dir is automatically removed, see [`TempDir::drop()`]
pub struct TempProject {
    /// temporary workspace root
    _root: TempDir,
    /// actual project workspace with the `root` tempdir as its root
    inner: Project,
}

impl TempProject {
    /// Creates a new temp project with the default layout that uses the given compiler
    pub fn new(compiler: impl Compiler + 'static) -> Result<Self> {
        Self::with_builder(ProjectPathsConfig::builder(), Project::builder().compiler(compiler))
    }

    /// Creates a new temp project, the root of the `paths` is set to a new temp dir
    pub fn with_builder(paths: ProjectPathsConfigBuilder, project: ProjectBuilder) -> Result<Self> {
        Self::prefixed("temp-project", paths, project)
    }

    /// Creates a new temp project inside a tempdir with a prefixed directory
    pub fn prefixed(
        prefix: &str,
        paths: ProjectPathsConfigBuilder,
        project: ProjectBuilder,
    ) -> Result<Self> {
        let tmp_dir = tempdir(prefix)?;
        let paths = paths.root(tmp_dir.path()).build()?;
        utils::create_dir_all(&paths.contracts)?;
        let inner = project.paths(paths).build()?;
        Ok(Self { _root: tmp_dir, inner })
    }

    pub fn project(&self) -> &Project {
        &self.inner
    }

    pub fn project_mut(&mut self) -> &mut Project {
        &mut self.inner
    }

    /// The configured paths of the project
    pub fn paths(&self) -> &ProjectPathsConfig {
        &self.project().paths
    }

    /// The root path of the temporary workspace
    pub fn root(&self) -> &Path {
        self.project().paths.root.as_path()
    }

    /// Returns the path to the contracts build directory
    pub fn artifacts_path(&self) -> &PathBuf {
        &self.paths().contracts_build
    }

    /// Returns the path to the contracts directory
    pub fn sources_path(&self) -> &PathBuf {
        &self.paths().contracts
    }

    pub fn compile(&self) -> Result<ProjectCompileOutput> {
        self.project().compile()
    }

    pub fn compile_and_save(&self) -> Result<ProjectCompileOutput> {
        self.project().compile_and_save()
    }

    /// Adds a new source file inside the project's contracts dir
    pub fn add_source(&self, name: impl AsRef<str>, content: impl AsRef<str>) -> Result<PathBuf> {
        let name = contract_file_name(name);
        create_contract_file(self.sources_path().join(name), content)
    }

    /// Adds a basic source contract `contract <name> {}` as a new file
    pub fn add_basic_source(&self, name: impl AsRef<str>) -> Result<PathBuf> {
        let name = name.as_ref();
        self.add_source(name, format!("contract {name} {{}}"))
    }

    /// Adds a solidity file to the `node_modules` directory of the project, `package` is the path
    /// of the file inside `node_modules`, like `pkg/contracts/Token.sol`
    pub fn add_package_file(
        &self,
        package: impl AsRef<str>,
        content: impl AsRef<str>,
    ) -> Result<PathBuf> {
        create_contract_file(self.root().join("node_modules").join(package.as_ref()), content)
    }

    /// Reads the artifact of the contract
    pub fn artifact(&self, contract_name: &str) -> Result<Value> {
        utils::read_json_file(self.project().artifactor().artifact_path(contract_name))
    }

    /// Returns the names of all artifacts in the contracts build directory
    pub fn artifact_names(&self) -> Result<Vec<String>> {
        let dir = self.artifacts_path();
        let mut names = Vec::new();
        for entry in fs::read_dir(dir).map_err(|err| SolcError::io(err, dir))? {
            let path = entry.map_err(|err| SolcError::io(err, dir))?.path();
            if let Some(name) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}

impl fmt::Debug for TempProject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TempProject").field("paths", self.paths()).finish()
    }
}

fn create_contract_file(path: PathBuf, content: impl AsRef<str>) -> Result<PathBuf> {
    if let Some(parent) = path.parent() {
        utils::create_dir_all(parent)?;
    }
    fs::write(&path, content.as_ref()).map_err(|err| SolcError::io(err, &path))?;
    Ok(path)
}

fn contract_file_name(name: impl AsRef<str>) -> String {
    let name = name.as_ref().trim();
    if name.ends_with(".sol") {
        name.to_string()
    } else {
        format!("{name}.sol")
    }
}
