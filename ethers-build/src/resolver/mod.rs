//! Resolution of solidity imports across the project, local packages and global packages.
//!
//! An import can point to three different domains:
//!
//!   1. a file of the project itself, either as a path or relative to the importing file
//!   2. a file of a locally installed package, `node_modules/<package>/...` in the working
//!      directory or any of its ancestors
//!   3. a file of a globally installed package
//!
//! Each domain is handled by a [`ResolverSource`] strategy, the [`Resolver`] tries them in a
//! fixed order and the first strategy that yields a non-empty body wins.
//!
//! Files inside packages are identified by their module path, like
//! `@openzeppelin/contracts/token/ERC20/ERC20.sol`, and not by their location on disk, so that
//! explicitly relative imports of a package file (`./IERC20.sol`) are resolved against the package
//! again.

use crate::error::{Result, SolcError};
use std::{
    fmt,
    path::{Path, PathBuf},
};

pub mod sources;
pub use sources::{FileSystem, GlobalPackages, LocalPackages};

/// The result of a single strategy lookup
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Resolution {
    /// The content of the source file
    pub body: String,
    /// The identity of the resolved file: an absolute path for project files, the module path
    /// for package files
    pub file_path: PathBuf,
}

impl Resolution {
    pub fn new(body: impl Into<String>, file_path: impl Into<PathBuf>) -> Self {
        Self { body: body.into(), file_path: file_path.into() }
    }
}

/// A strategy that can look up the content of an import.
pub trait ResolverSource: fmt::Debug + Send + Sync {
    /// Name of the strategy, used for logging
    fn name(&self) -> &'static str;

    /// Looks up the import.
    ///
    /// Returns `Ok(None)` if this strategy doesn't know the import.
    fn resolve(&self, import_path: &Path, imported_from: Option<&Path>)
        -> Result<Option<Resolution>>;

    /// Converts an explicitly relative `dependency` of the file `from`, which was resolved by
    /// this strategy, into a path this strategy can resolve again.
    fn resolve_dependency_path(&self, from: &Path, dependency: &Path) -> PathBuf;
}

/// A resolved source file
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedSource {
    pub body: String,
    pub file_path: PathBuf,
    /// index of the strategy in the resolver chain that found the file
    pub origin: usize,
    /// the file that imported this file, if any
    pub parent: Option<PathBuf>,
}

/// Resolves imports by trying its strategies in order
#[derive(Debug)]
pub struct Resolver {
    sources: Vec<Box<dyn ResolverSource>>,
}

impl Resolver {
    /// Creates the default strategy chain for the working directory:
    /// [`FileSystem`], [`LocalPackages`], [`GlobalPackages`]
    pub fn new(working_directory: impl Into<PathBuf>) -> Self {
        Self::with_global_packages(working_directory, GlobalPackages::default())
    }

    /// Creates the default strategy chain, with the given global package roots
    pub fn with_global_packages(
        working_directory: impl Into<PathBuf>,
        global: GlobalPackages,
    ) -> Self {
        let working_directory = working_directory.into();
        Self::with_sources(vec![
            Box::new(FileSystem::new(working_directory.clone())),
            Box::new(LocalPackages::new(working_directory)),
            Box::new(global),
        ])
    }

    /// Creates a resolver that uses the given strategies in the given order
    pub fn with_sources(sources: Vec<Box<dyn ResolverSource>>) -> Self {
        Self { sources }
    }

    /// Returns the strategies of this resolver
    pub fn sources(&self) -> &[Box<dyn ResolverSource>] {
        &self.sources
    }

    /// Resolves the import, the first strategy that finds a non empty file wins
    pub fn resolve(
        &self,
        import_path: impl AsRef<Path>,
        imported_from: Option<&Path>,
    ) -> Result<ResolvedSource> {
        let import_path = import_path.as_ref();
        for (origin, source) in self.sources.iter().enumerate() {
            let Some(resolution) = source.resolve(import_path, imported_from)? else { continue };
            if resolution.body.is_empty() {
                continue
            }
            tracing::trace!(
                "resolved \"{}\" via {} as \"{}\"",
                import_path.display(),
                source.name(),
                resolution.file_path.display()
            );
            return Ok(ResolvedSource {
                body: resolution.body,
                file_path: resolution.file_path,
                origin,
                parent: imported_from.map(Path::to_path_buf),
            })
        }
        Err(SolcError::not_found(import_path, imported_from))
    }

    /// Converts the explicitly relative `dependency` of the resolved file into a resolvable path,
    /// using the strategy that resolved the file
    pub fn resolve_dependency_path(&self, resolved: &ResolvedSource, dependency: &Path) -> PathBuf {
        match self.sources.get(resolved.origin) {
            Some(source) => source.resolve_dependency_path(&resolved.file_path, dependency),
            None => crate::utils::join_dependency(&resolved.file_path, dependency),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::{tempdir, touch};
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    /// A strategy backed by a fixed set of files
    #[derive(Debug)]
    struct Fixed {
        name: &'static str,
        files: HashMap<PathBuf, String>,
    }

    impl Fixed {
        fn new(name: &'static str, files: &[(&str, &str)]) -> Self {
            Self {
                name,
                files: files.iter().map(|(p, b)| (PathBuf::from(p), b.to_string())).collect(),
            }
        }
    }

    impl ResolverSource for Fixed {
        fn name(&self) -> &'static str {
            self.name
        }

        fn resolve(&self, import_path: &Path, _: Option<&Path>) -> Result<Option<Resolution>> {
            Ok(self.files.get(import_path).map(|body| Resolution::new(body.clone(), import_path)))
        }

        fn resolve_dependency_path(&self, from: &Path, dependency: &Path) -> PathBuf {
            crate::utils::join_dependency(from, dependency)
        }
    }

    #[test]
    fn first_strategy_wins() {
        let resolver = Resolver::with_sources(vec![
            Box::new(Fixed::new("first", &[("a/A.sol", "first")])),
            Box::new(Fixed::new("second", &[("a/A.sol", "second"), ("b/B.sol", "b")])),
        ]);
        let resolved = resolver.resolve("a/A.sol", None).unwrap();
        assert_eq!(resolved.body, "first");
        assert_eq!(resolved.origin, 0);

        let resolved = resolver.resolve("b/B.sol", Some(Path::new("a/A.sol"))).unwrap();
        assert_eq!(resolved.body, "b");
        assert_eq!(resolved.origin, 1);
        assert_eq!(resolved.parent, Some(PathBuf::from("a/A.sol")));
    }

    #[test]
    fn skips_empty_bodies() {
        let resolver = Resolver::with_sources(vec![
            Box::new(Fixed::new("empty", &[("A.sol", "")])),
            Box::new(Fixed::new("full", &[("A.sol", "contract A {}")])),
        ]);
        assert_eq!(resolver.resolve("A.sol", None).unwrap().body, "contract A {}");
    }

    #[test]
    fn reports_unresolvable_imports() {
        let resolver = Resolver::with_sources(vec![Box::new(Fixed::new("none", &[]))]);
        let err = resolver.resolve("lib/Missing.sol", Some(Path::new("/p/A.sol"))).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Could not find lib/Missing.sol from any sources; imported from /p/A.sol"
        );
    }

    #[test]
    fn prefers_project_files_over_packages() {
        let tmp = tempdir("resolver").unwrap();
        let root = tmp.path();
        touch(root.join("pkg/Token.sol"), "project");
        touch(root.join("node_modules/pkg/Token.sol"), "package");
        touch(root.join("node_modules/pkg/Other.sol"), "other");

        let resolver = Resolver::new(root);
        let resolved = resolver.resolve("pkg/Token.sol", None).unwrap();
        assert_eq!(resolved.body, "project");
        assert_eq!(resolved.file_path, root.join("pkg/Token.sol"));

        let resolved = resolver.resolve("pkg/Other.sol", None).unwrap();
        assert_eq!(resolved.body, "other");
        assert_eq!(resolved.file_path, PathBuf::from("pkg/Other.sol"));
        assert_eq!(resolver.sources()[resolved.origin].name(), "npm");
        assert_eq!(
            resolver.resolve_dependency_path(&resolved, Path::new("./utils/Math.sol")),
            PathBuf::from("pkg/utils/Math.sol")
        );
    }

    #[test]
    fn falls_back_to_global_packages() {
        let tmp = tempdir("resolver").unwrap();
        let root = tmp.path().join("project");
        let global = tmp.path().join("global");
        touch(root.join("contracts/A.sol"), "contract A {}");
        touch(root.join("node_modules/local/Lib.sol"), "library Local {}");
        touch(global.join("local/Lib.sol"), "library Shadowed {}");
        touch(global.join("pkg/contracts/Token.sol"), "contract Token {}");

        let resolver = Resolver::with_global_packages(&root, GlobalPackages::new(vec![global]));
        let importer = root.join("contracts/A.sol");
        let from = Some(importer.as_path());

        let resolved = resolver.resolve("pkg/contracts/Token.sol", from).unwrap();
        assert_eq!(resolved.body, "contract Token {}");
        assert_eq!(resolved.file_path, PathBuf::from("pkg/contracts/Token.sol"));
        assert_eq!(resolver.sources()[resolved.origin].name(), "globalnpm");
        assert_eq!(
            resolver.resolve_dependency_path(&resolved, Path::new("../interfaces/IToken.sol")),
            PathBuf::from("pkg/interfaces/IToken.sol")
        );

        // local packages take precedence over global ones
        let resolved = resolver.resolve("local/Lib.sol", from).unwrap();
        assert_eq!(resolved.body, "library Local {}");
        assert_eq!(resolver.sources()[resolved.origin].name(), "npm");

        let err = resolver.resolve("missing/Lib.sol", from).unwrap_err();
        assert!(matches!(err, SolcError::ResolutionNotFound { .. }), "{err}");
    }
}
