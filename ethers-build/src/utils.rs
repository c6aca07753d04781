//! Utility functions

use crate::error::{Result, SolcError};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{de::DeserializeOwned, Serialize};
use std::{
    fs,
    path::{Component, Path, PathBuf},
    time::{Duration, UNIX_EPOCH},
};
use walkdir::WalkDir;

/// A regex that matches the import path and identifier of a solidity import
/// statement with the named groups "path", "id".
pub static RE_SOL_IMPORT: Lazy<Regex> = Lazy::new(|| {
    // Adapted from https://github.com/nomiclabs/hardhat/blob/cced766c65b25d3d0beb39ef847246ac9618bdd9/packages/hardhat-core/src/internal/solidity/parse.ts#L100
    Regex::new(r#"import\s+(?:(?:"(?P<path>[^;]*)"|'(?P<p1>[^;]*)')(?:;|\s+as\s+(?P<id>[^;]*);)|.+from\s+(?:"(?P<p2>.*)"|'(?P<p3>.*)');)"#).unwrap()
});

/// A regex that matches the version part of a solidity pragma
/// as follows: `pragma solidity ^0.5.2;` => `^0.5.2`
pub static RE_SOL_PRAGMA_VERSION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"pragma\s+solidity\s+(?P<version>.+?);").unwrap());

/// A regex that matches a complete `pragma solidity ...` statement without the trailing `;`
pub static RE_SOL_PRAGMA: Lazy<Regex> = Lazy::new(|| Regex::new(r"pragma solidity[^;]*").unwrap());

/// The file extension of solidity sources
pub const SOLIDITY_EXTENSION: &str = "sol";

/// Returns all path parts from any solidity import statement in a string,
/// `import "./contracts/Contract.sol";` -> `"./contracts/Contract.sol"`.
///
/// See also https://docs.soliditylang.org/en/v0.8.9/grammar.html
pub fn find_import_paths(contract: &str) -> Vec<&str> {
    RE_SOL_IMPORT
        .captures_iter(contract)
        .filter_map(|cap| {
            cap.name("path")
                .or_else(|| cap.name("p1"))
                .or_else(|| cap.name("p2"))
                .or_else(|| cap.name("p3"))
        })
        .map(|m| m.as_str())
        .collect()
}

/// Returns the solidity version pragma from the given input:
/// `pragma solidity ^0.5.2;` => `^0.5.2`
pub fn find_version_pragma(contract: &str) -> Option<&str> {
    RE_SOL_PRAGMA_VERSION.captures(contract)?.name("version").map(|m| m.as_str())
}

/// Returns a list of absolute paths to all the solidity files under the root, or the files
/// matching the glob pattern if `root` is a pattern, like `contracts/**/*.sol`.
///
/// NOTE: this does not resolve imports from other locations
///
/// # Example
///
/// ```no_run
/// use ethers_build::utils;
/// let sources = utils::source_files("./contracts").unwrap();
/// ```
pub fn source_files(root: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let root = root.as_ref();
    let pattern = root.to_string_lossy();
    if is_glob_pattern(&pattern) {
        let mut files = Vec::new();
        for entry in glob::glob(&pattern)? {
            let file = entry.map_err(|err| {
                let path = err.path().to_path_buf();
                SolcError::io(std::io::Error::from(err), path)
            })?;
            if file.is_file() {
                files.push(file);
            }
        }
        files.sort();
        return Ok(files)
    }

    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter(|e| is_solidity_file(e.path()))
        .map(|e| e.path().into())
        .collect();
    files.sort();
    Ok(files)
}

/// Returns true if the string contains any glob meta characters
pub fn is_glob_pattern(s: &str) -> bool {
    s.contains(['*', '?', '[', '{'])
}

/// Returns true if the path has the `.sol` extension
pub fn is_solidity_file(path: impl AsRef<Path>) -> bool {
    path.as_ref().extension().map(|ext| ext == SOLIDITY_EXTENSION).unwrap_or_default()
}

/// Returns true if the import starts with `./` or `../`
///
/// These imports are relative to the file that contains them, unlike plain module paths like
/// `@openzeppelin/contracts/token/ERC20/ERC20.sol` which are resolved against a package root.
pub fn is_explicitly_relative(import: impl AsRef<Path>) -> bool {
    let s = import.as_ref().to_string_lossy();
    s.starts_with("./") || s.starts_with("../") || s.starts_with(".\\") || s.starts_with("..\\")
}

/// Lexically normalizes the path: removes `.` segments and folds `..` into their parent.
///
/// Unlike [`std::fs::canonicalize`] this does not touch the filesystem, so it works for package
/// paths that don't exist relative to the current directory.
pub fn normalize_path(path: impl AsRef<Path>) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.as_ref().components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Joins `dependency` onto the directory of `from` and normalizes the result
pub fn join_dependency(from: impl AsRef<Path>, dependency: impl AsRef<Path>) -> PathBuf {
    let dir = from.as_ref().parent().unwrap_or_else(|| Path::new(""));
    normalize_path(dir.join(dependency))
}

/// Canonicalize the path, platform-agnostic
///
/// On windows this will ensure the path only consists of `/` separators
pub fn canonicalize(path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    dunce::canonicalize(path).map_err(|err| SolcError::io(err, path))
}

/// Returns the path relative to `root` prefixed with `./` for display purposes, paths outside of
/// `root` and module paths are returned as is
pub fn display_path(path: &Path, root: &Path) -> String {
    use path_slash::PathExt;
    if path.is_absolute() {
        if let Ok(rel) = path.strip_prefix(root) {
            return format!("./{}", rel.to_slash_lossy())
        }
    }
    path.to_slash_lossy().into_owned()
}

/// Returns the last modification time of the file
pub fn last_modified(file: impl AsRef<Path>) -> Result<Duration> {
    let file = file.as_ref();
    fs::metadata(file)
        .map_err(|err| SolcError::io(err, file))?
        .modified()
        .map_err(|err| SolcError::io(err, file))?
        .duration_since(UNIX_EPOCH)
        .map_err(|err| SolcError::msg(err.to_string()))
}

/// Reads the json file and deserialize it into the provided type
pub fn read_json_file<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|err| SolcError::io(err, path))?;
    serde_json::from_str(&contents).map_err(Into::into)
}

/// Writes the value as pretty json to the given path
pub fn write_json_file<T: Serialize>(value: &T, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let mut content = serde_json::to_vec_pretty(value)?;
    content.push(b'\n');
    fs::write(path, content).map_err(|err| SolcError::io(err, path))
}

/// Creates the directory and all missing parents
pub fn create_dir_all(path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    fs::create_dir_all(path).map_err(|err| SolcError::io(err, path))
}

/// Creates a new named tempdir
#[cfg(any(test, feature = "project-util"))]
pub(crate) fn tempdir(name: &str) -> std::result::Result<tempfile::TempDir, crate::SolcIoError> {
    tempfile::Builder::new()
        .prefix(name)
        .tempdir()
        .map_err(|err| crate::SolcIoError::new(err, name))
}

/// Creates the file and all its parent directories and writes the content
#[cfg(test)]
pub(crate) fn touch(path: impl AsRef<Path>, content: &str) {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}
