//! The import lookup strategies of the [`Resolver`](super::Resolver)

use super::{Resolution, ResolverSource};
use crate::{
    artifacts::Artifact,
    error::Result,
    schema,
    utils::{self, is_explicitly_relative, join_dependency, normalize_path},
};
use serde_json::Value;
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Resolves project files from the filesystem.
///
/// An import is looked up as given, relative paths are taken against the working directory, and
/// then relative to the directory of the importing file.
#[derive(Clone, Debug)]
pub struct FileSystem {
    working_directory: PathBuf,
}

impl FileSystem {
    pub fn new(working_directory: impl Into<PathBuf>) -> Self {
        Self { working_directory: working_directory.into() }
    }

    fn absolute(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            normalize_path(path)
        } else {
            normalize_path(self.working_directory.join(path))
        }
    }
}

impl ResolverSource for FileSystem {
    fn name(&self) -> &'static str {
        "fs"
    }

    fn resolve(
        &self,
        import_path: &Path,
        imported_from: Option<&Path>,
    ) -> Result<Option<Resolution>> {
        let mut candidates = vec![self.absolute(import_path)];
        if let Some(from) = imported_from {
            candidates.push(self.absolute(&join_dependency(from, import_path)));
        }
        Ok(candidates.into_iter().find_map(|candidate| {
            fs::read_to_string(&candidate).ok().map(|body| Resolution::new(body, candidate))
        }))
    }

    fn resolve_dependency_path(&self, from: &Path, dependency: &Path) -> PathBuf {
        self.absolute(&join_dependency(from, dependency))
    }
}

/// Resolves package files from `node_modules` directories.
///
/// `<dir>/node_modules/<import>` is tried for the working directory and then every ancestor up to
/// the filesystem root. The resolved file keeps its module path.
#[derive(Clone, Debug)]
pub struct LocalPackages {
    working_directory: PathBuf,
}

impl LocalPackages {
    pub fn new(working_directory: impl Into<PathBuf>) -> Self {
        Self { working_directory: working_directory.into() }
    }
}

impl ResolverSource for LocalPackages {
    fn name(&self) -> &'static str {
        "npm"
    }

    fn resolve(&self, import_path: &Path, _: Option<&Path>) -> Result<Option<Resolution>> {
        Ok(self.working_directory.ancestors().find_map(|dir| {
            let expected = dir.join("node_modules").join(import_path);
            fs::read_to_string(expected).ok().map(|body| Resolution::new(body, import_path))
        }))
    }

    fn resolve_dependency_path(&self, from: &Path, dependency: &Path) -> PathBuf {
        join_dependency(from, dependency)
    }
}

/// Resolves package files from globally installed packages.
///
/// A package is installed globally if `<root>/<package>` is a directory in one of the global
/// package roots, see [`GlobalPackages::default_roots`].
#[derive(Clone, Debug)]
pub struct GlobalPackages {
    roots: Vec<PathBuf>,
}

impl Default for GlobalPackages {
    fn default() -> Self {
        Self::new(Self::default_roots())
    }
}

impl GlobalPackages {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self { roots }
    }

    /// Returns the existing directories of the well known global package locations:
    ///
    /// - `$NPM_CONFIG_PREFIX/lib/node_modules`
    /// - `~/.npm-global/lib/node_modules`
    /// - `/usr/local/lib/node_modules` and `/usr/lib/node_modules` on unix
    /// - `%APPDATA%/npm/node_modules` on windows
    pub fn default_roots() -> Vec<PathBuf> {
        let mut roots = Vec::new();
        if let Some(prefix) = std::env::var_os("NPM_CONFIG_PREFIX") {
            roots.push(PathBuf::from(prefix).join("lib").join("node_modules"));
        }
        if let Some(home) = home::home_dir() {
            roots.push(home.join(".npm-global").join("lib").join("node_modules"));
        }
        if cfg!(windows) {
            if let Some(app_data) = std::env::var_os("APPDATA") {
                roots.push(PathBuf::from(app_data).join("npm").join("node_modules"));
            }
        } else {
            roots.push(PathBuf::from("/usr/local/lib/node_modules"));
            roots.push(PathBuf::from("/usr/lib/node_modules"));
        }
        roots.retain(|root| root.is_dir());
        roots
    }

    /// The global package roots that are searched
    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Returns the root the package of the import is installed in
    fn package_root(&self, import_path: &Path) -> Option<&Path> {
        if import_path.is_absolute() || is_explicitly_relative(import_path) {
            return None
        }
        let package = import_path.components().next()?;
        self.roots.iter().map(PathBuf::as_path).find(|root| root.join(package).is_dir())
    }

    /// Looks up the pre-built artifact of the imported contract in its globally installed
    /// package, `<root>/<package>/build/contracts/<ContractName>.json`
    pub fn require(&self, import_path: impl AsRef<Path>) -> Option<Artifact> {
        let import_path = import_path.as_ref();
        let root = self.package_root(import_path)?;
        let package = import_path.components().next()?;
        let contract_name = import_path.file_stem()?.to_str()?;
        let expected = root
            .join(package)
            .join("build")
            .join("contracts")
            .join(format!("{contract_name}.json"));
        let artifact: Value = utils::read_json_file(&expected).ok()?;
        Some(schema::normalize(&artifact))
    }
}

impl ResolverSource for GlobalPackages {
    fn name(&self) -> &'static str {
        "globalnpm"
    }

    fn resolve(&self, import_path: &Path, _: Option<&Path>) -> Result<Option<Resolution>> {
        Ok(self.package_root(import_path).and_then(|root| {
            fs::read_to_string(root.join(import_path))
                .ok()
                .map(|body| Resolution::new(body, import_path))
        }))
    }

    fn resolve_dependency_path(&self, from: &Path, dependency: &Path) -> PathBuf {
        join_dependency(from, dependency)
    }
}
