use std::{
    fmt, io,
    path::{Path, PathBuf},
};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SolcError>;

/// Various error types
#[derive(Debug, Error)]
pub enum SolcError {
    /// None of the configured resolver sources could find the import
    #[error("Could not find {} from any sources{}", .import.display(), imported_from_suffix(.imported_from.as_deref()))]
    ResolutionNotFound { import: PathBuf, imported_from: Option<PathBuf> },
    /// Extracting the imports of a source file failed
    #[error("Error parsing {}: {message}{}", .file.display(), version_mismatch_suffix(.version_mismatch.as_ref()))]
    ParseFailure { file: PathBuf, message: String, version_mismatch: Option<VersionMismatch> },
    /// Artifacts were requested to be written into a directory that does not exist
    #[error("Destination \"{}\" doesn't exist!", .0.display())]
    MissingDestination(PathBuf),
    /// An existing artifact file could not be read back
    #[error("Artifact file \"{}\" is corrupt and will not be overwritten: {reason}", .path.display())]
    CorruptArtifact { path: PathBuf, reason: String },
    /// The artifact lacks a contract name
    #[error("You must specify a contract name.")]
    InvalidArtifact,
    /// The compiler reported errors
    #[error("Compiler Error: {0}")]
    Compiler(String),
    #[error("Could not find compiler at \"{}\"", .0.display())]
    CompilerNotFound(PathBuf),
    #[error(transparent)]
    SemverError(#[from] semver::Error),
    /// Deserialization error
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
    /// Filesystem IO error
    #[error(transparent)]
    Io(#[from] SolcIoError),
    #[error(transparent)]
    PatternError(#[from] glob::PatternError),
    /// General purpose message
    #[error("{0}")]
    Message(String),
}

impl SolcError {
    pub(crate) fn io(err: io::Error, path: impl Into<PathBuf>) -> Self {
        SolcIoError::new(err, path).into()
    }
    pub(crate) fn compiler(msg: impl Into<String>) -> Self {
        SolcError::Compiler(msg.into())
    }
    pub(crate) fn msg(msg: impl Into<String>) -> Self {
        SolcError::Message(msg.into())
    }
    pub(crate) fn not_found(import: impl Into<PathBuf>, imported_from: Option<&Path>) -> Self {
        SolcError::ResolutionNotFound {
            import: import.into(),
            imported_from: imported_from.map(Path::to_path_buf),
        }
    }
    pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl fmt::Display) -> Self {
        SolcError::CorruptArtifact { path: path.into(), reason: reason.to_string() }
    }
}

/// The compiler version that is configured and the version pragma a source asked for instead
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionMismatch {
    /// version of the loaded compiler
    pub configured: String,
    /// the `pragma solidity ...` statement of the source
    pub required: String,
}

fn imported_from_suffix(imported_from: Option<&Path>) -> String {
    imported_from.map(|from| format!("; imported from {}", from.display())).unwrap_or_default()
}

fn version_mismatch_suffix(mismatch: Option<&VersionMismatch>) -> String {
    match mismatch {
        Some(VersionMismatch { configured, required }) => format!(
            "\n\nError: currently using solc {configured}, but one or more of your contracts specify \"{required}\".\nPlease update your compiler configuration or pragma statement(s)."
        ),
        None => String::new(),
    }
}

#[derive(Debug, Error)]
#[error("\"{}\": {io}", self.path.display())]
pub struct SolcIoError {
    io: io::Error,
    path: PathBuf,
}

impl SolcIoError {
    pub fn new(io: io::Error, path: impl Into<PathBuf>) -> Self {
        Self { io, path: path.into() }
    }

    /// The path at which the error occurred
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The underlying error kind
    pub fn kind(&self) -> io::ErrorKind {
        self.io.kind()
    }
}

impl From<SolcIoError> for io::Error {
    fn from(err: SolcIoError) -> Self {
        err.io
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_not_found_with_importer() {
        let err = SolcError::not_found("lib/Foo.sol", Some(Path::new("/project/Bar.sol")));
        assert_eq!(
            err.to_string(),
            "Could not find lib/Foo.sol from any sources; imported from /project/Bar.sol"
        );
        let err = SolcError::not_found("lib/Foo.sol", None);
        assert_eq!(err.to_string(), "Could not find lib/Foo.sol from any sources");
    }

    #[test]
    fn formats_version_mismatch() {
        let err = SolcError::ParseFailure {
            file: "/project/Foo.sol".into(),
            message: "requires different compiler version".to_string(),
            version_mismatch: Some(VersionMismatch {
                configured: "0.5.16".to_string(),
                required: "pragma solidity ^0.8.0".to_string(),
            }),
        };
        let msg = err.to_string();
        assert!(msg.starts_with("Error parsing /project/Foo.sol: requires different"));
        assert!(msg.contains("currently using solc 0.5.16"));
        assert!(msg.contains("\"pragma solidity ^0.8.0\""));
    }
}
