//! Determines which sources need to be compiled.
//!
//! A source needs to be recompiled if it changed since its artifacts were written, or if it
//! imports, directly or transitively, a source that needs to be recompiled. The compiler still
//! needs every source that is reachable via imports to be able to compile the targets, so the
//! import closure of all known sources is resolved as well.
//!
//! ## Import closure
//!
//! The closure is resolved in waves: all pending imports of a wave are resolved and parsed in
//! parallel, then the newly discovered imports are collected into the next wave. A path is only
//! ever queued once, which guarantees termination for cyclic imports.

use crate::{
    artifacts::{Artifact, Source, Sources},
    compile::{Compiler, VERSION_MISMATCH_MESSAGE},
    config::ProjectPathsConfig,
    error::{Result, SolcError, VersionMismatch},
    resolver::{ResolvedSource, Resolver},
    schema,
    utils::{self, RE_SOL_PRAGMA},
};
use rayon::prelude::*;
use serde_json::Value;
use std::{
    collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque},
    fs, io,
    path::{Path, PathBuf},
};

/// The sources to pass to the compiler
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequiredSources {
    /// All resolved solidity sources, the compiler needs these to resolve the imports of the
    /// targets
    pub all_sources: Sources,
    /// The compilation targets
    pub required: Vec<PathBuf>,
}

impl RequiredSources {
    pub fn is_empty(&self) -> bool {
        self.all_sources.is_empty() && self.required.is_empty()
    }
}

/// A resolved source and its imports
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceNode {
    pub source: ResolvedSource,
    /// imports of the source, explicitly relative imports are already converted into resolvable
    /// paths
    pub imports: Vec<PathBuf>,
}

/// The result of the import closure
#[derive(Clone, Debug, Default)]
pub struct ResolvedSources {
    /// resolved file path -> node
    pub nodes: BTreeMap<PathBuf, SourceNode>,
    /// requested path -> resolved file path
    requested: HashMap<PathBuf, PathBuf>,
}

impl ResolvedSources {
    /// Returns the resolved file path of a requested path
    pub fn resolved_path<'a>(&'a self, path: &'a Path) -> &'a Path {
        self.requested.get(path).map(PathBuf::as_path).unwrap_or(path)
    }

    /// Returns the resolved file paths of the requested paths, deduplicated and sorted
    pub fn resolved_paths(&self, paths: &[PathBuf]) -> Vec<PathBuf> {
        paths
            .iter()
            .map(|path| self.resolved_path(path).to_path_buf())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Returns the node of a requested path
    pub fn get(&self, path: &Path) -> Option<&SourceNode> {
        self.nodes.get(self.resolved_path(path))
    }

    /// Whether `file` imports `target`
    fn imports(&self, file: &Path, target: &Path) -> bool {
        let Some(node) = self.get(file) else { return false };
        let target_resolved = self.resolved_path(target);
        node.imports
            .iter()
            .any(|import| import == target || self.resolved_path(import) == target_resolved)
    }

    /// All resolved solidity sources
    pub fn sources(&self) -> Sources {
        self.nodes
            .iter()
            .filter(|(path, _)| utils::is_solidity_file(path))
            .map(|(path, node)| (path.clone(), Source::new(node.source.body.clone())))
            .collect()
    }
}

/// Profiles the sources of a project
pub struct Profiler<'a> {
    paths: &'a ProjectPathsConfig,
    resolver: &'a Resolver,
    compiler: &'a dyn Compiler,
}

impl<'a> Profiler<'a> {
    pub fn new(
        paths: &'a ProjectPathsConfig,
        resolver: &'a Resolver,
        compiler: &'a dyn Compiler,
    ) -> Self {
        Self { paths, resolver, compiler }
    }

    /// Returns the stale sources of the project: the explicit `files` if any, otherwise all
    /// sources in the contracts directory.
    pub fn updated(&self, files: Option<&[PathBuf]>) -> Result<Vec<PathBuf>> {
        match files {
            Some(files) => self.stale_sources(files),
            None => self.stale_sources(&utils::source_files(&self.paths.contracts)?),
        }
    }

    /// Returns all sources that were modified after their artifacts were written, or that have
    /// no artifacts at all.
    ///
    /// For every source the earliest `updatedAt` of all artifacts that were produced from it is
    /// relevant.
    #[tracing::instrument(skip_all, name = "profiler::stale_sources")]
    pub fn stale_sources(&self, sources: &[PathBuf]) -> Result<Vec<PathBuf>> {
        let updated_at = self.minimum_updated_at_per_source()?;
        let mut stale = Vec::new();
        for source in sources {
            let file = self.source_file(source);
            let min_updated_at = updated_at
                .get(file.as_path())
                .or_else(|| updated_at.get(source.as_path()))
                .copied()
                .flatten();
            let is_stale = match min_updated_at {
                Some(updated_at) if file.is_file() => {
                    let modified = utils::last_modified(&file)?;
                    i64::try_from(modified.as_millis()).unwrap_or(i64::MAX) > updated_at
                }
                // no artifacts, none of them carries a usable timestamp, or a package path
                _ => true,
            };
            if is_stale {
                tracing::trace!("stale source \"{}\"", source.display());
                stale.push(source.clone());
            }
        }
        Ok(stale)
    }

    /// The file of a project source, relative paths are taken against the project root
    fn source_file(&self, source: &Path) -> PathBuf {
        if utils::is_explicitly_relative(source) {
            utils::normalize_path(self.paths.contracts.join(source))
        } else if source.is_absolute() {
            source.to_path_buf()
        } else {
            utils::normalize_path(self.paths.root.join(source))
        }
    }

    /// Reads all artifacts in the contracts build directory and returns the earliest `updatedAt`
    /// in epoch millis per `sourcePath`
    fn minimum_updated_at_per_source(&self) -> Result<HashMap<PathBuf, Option<i64>>> {
        let dir = &self.paths.contracts_build;
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(err) => return Err(SolcError::io(err, dir)),
        };

        let mut min_updated_at: HashMap<PathBuf, Option<i64>> = HashMap::new();
        for entry in entries {
            let path = entry.map_err(|err| SolcError::io(err, dir))?.path();
            if path.extension().map(|ext| ext != "json").unwrap_or(true) || !path.is_file() {
                continue
            }
            let artifact = read_artifact(&path)?;
            let Some(source_path) = artifact.source_path.as_deref() else { continue };
            let updated_at = artifact
                .updated_at
                .as_deref()
                .and_then(schema::parse_timestamp)
                .map(|ts| ts.timestamp_millis());

            let min = min_updated_at.entry(PathBuf::from(source_path)).or_insert(updated_at);
            *min = match (*min, updated_at) {
                (Some(current), Some(updated_at)) => Some(current.min(updated_at)),
                (current, updated_at) => current.or(updated_at),
            };
        }
        Ok(min_updated_at)
    }

    /// Returns the minimal set of compilation targets for the `explicit` paths, and all sources
    /// the compiler needs for them.
    ///
    /// The targets are the `explicit` paths and every known source that imports a target. If
    /// `explicit` contains every known source there's nothing to minimize and all resolved
    /// sources are targets.
    #[tracing::instrument(skip_all, name = "profiler::required_sources")]
    pub fn required_sources(
        &self,
        all_known: &[PathBuf],
        explicit: &[PathBuf],
    ) -> Result<RequiredSources> {
        if explicit.is_empty() {
            return Ok(RequiredSources::default())
        }

        let requested_updates = self.to_absolute_paths(explicit.iter());
        let requested = self.to_absolute_paths(all_known.iter().chain(explicit));
        let resolved = self.resolve_all_sources(requested.clone())?;
        let all_sources = resolved.sources();

        // targets must be keys of `all_sources`, so every path is identified by its resolved file
        let updates = resolved.resolved_paths(&requested_updates);
        let all_paths = resolved.resolved_paths(&requested);

        if updates == all_paths {
            tracing::debug!("all {} known sources are targets", all_paths.len());
            let required = all_sources.keys().cloned().collect();
            return Ok(RequiredSources { all_sources, required })
        }

        let mut required = updates.clone();
        let mut targets: HashSet<PathBuf> = updates.iter().cloned().collect();
        let mut queue: VecDeque<PathBuf> = updates.into_iter().collect();

        while let Some(update) = queue.pop_front() {
            for file in &all_paths {
                if targets.contains(file) {
                    continue
                }
                if resolved.imports(file, &update) {
                    tracing::trace!(
                        "\"{}\" imports target \"{}\"",
                        file.display(),
                        update.display()
                    );
                    targets.insert(file.clone());
                    required.push(file.clone());
                    queue.push_back(file.clone());
                }
            }
        }

        tracing::debug!("{} of {} known sources are targets", required.len(), all_paths.len());
        Ok(RequiredSources { all_sources, required })
    }

    /// Resolves the given paths and everything they import
    pub fn resolve_all_sources(&self, initial: Vec<PathBuf>) -> Result<ResolvedSources> {
        let mut resolved = ResolvedSources::default();
        let mut discovered: HashSet<PathBuf> = initial.iter().cloned().collect();
        let mut pending: Vec<(PathBuf, Option<PathBuf>)> =
            initial.into_iter().map(|path| (path, None)).collect();

        let mut wave = 0;
        while !pending.is_empty() {
            tracing::trace!("resolving {} sources in wave {}", pending.len(), wave);
            let results = pending
                .par_iter()
                .map(|(path, parent)| -> Result<(PathBuf, SourceNode)> {
                    let source = self.resolver.resolve(path, parent.as_deref())?;
                    let imports = self.imports(&source)?;
                    Ok((path.clone(), SourceNode { source, imports }))
                })
                .collect::<Result<Vec<_>>>()?;

            for (_, node) in &results {
                discovered.insert(node.source.file_path.clone());
            }

            pending = Vec::new();
            for (requested, node) in results {
                let file_path = node.source.file_path.clone();
                for import in &node.imports {
                    if discovered.insert(import.clone()) {
                        pending.push((import.clone(), Some(file_path.clone())));
                    }
                }
                resolved.requested.insert(requested, file_path.clone());
                resolved.nodes.insert(file_path, node);
            }
            wave += 1;
        }

        Ok(resolved)
    }

    /// Extracts the imports of a resolved solidity source
    fn imports(&self, source: &ResolvedSource) -> Result<Vec<PathBuf>> {
        if !utils::is_solidity_file(&source.file_path) {
            return Ok(Vec::new())
        }
        let imports = self
            .compiler
            .parse_imports(&source.body)
            .map_err(|err| self.parse_failure(&source.file_path, err))?;
        Ok(imports
            .into_iter()
            .map(|import| {
                if utils::is_explicitly_relative(&import) {
                    self.resolver.resolve_dependency_path(source, Path::new(&import))
                } else {
                    PathBuf::from(import)
                }
            })
            .collect())
    }

    fn parse_failure(&self, file: &Path, err: SolcError) -> SolcError {
        let message = match err {
            SolcError::Compiler(message) => message,
            err => err.to_string(),
        };
        let version_mismatch = if message.contains(VERSION_MISMATCH_MESSAGE) {
            RE_SOL_PRAGMA.find(&message).and_then(|pragma| {
                let configured = self.compiler.version().ok()?;
                Some(VersionMismatch {
                    configured: configured.to_string(),
                    required: pragma.as_str().to_string(),
                })
            })
        } else {
            None
        };
        SolcError::ParseFailure { file: file.to_path_buf(), message, version_mismatch }
    }

    /// Makes explicitly relative paths absolute against the contracts directory, deduplicates and
    /// sorts them. Module paths are kept as they are.
    pub(crate) fn to_absolute_paths<'p>(
        &self,
        paths: impl Iterator<Item = &'p PathBuf>,
    ) -> Vec<PathBuf> {
        paths
            .map(|path| {
                if utils::is_explicitly_relative(path) {
                    utils::normalize_path(self.paths.contracts.join(path))
                } else {
                    path.clone()
                }
            })
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

/// Reads an artifact file for profiling, unreadable files are corrupt
fn read_artifact(path: &Path) -> Result<Artifact> {
    let content = fs::read_to_string(path).map_err(|err| SolcError::corrupt(path, err))?;
    let artifact: Value =
        serde_json::from_str(&content).map_err(|err| SolcError::corrupt(path, err))?;
    Ok(schema::normalize(&artifact))
}
