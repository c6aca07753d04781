use super::{Solc, SOLC};
use crate::error::{Result, SolcError};
use std::path::{Path, PathBuf};

/// Locates the `solc` executable to use.
///
/// The compiler is looked up as follows, with descending priority:
///   1. the configured local path, relative paths are taken against the working directory
///   2. `SOLC_PATH` environment variable
///   3. `solc` otherwise
#[derive(Clone, Debug, Default)]
pub struct CompilerSupplier {
    working_directory: PathBuf,
    local: Option<PathBuf>,
}

impl CompilerSupplier {
    pub fn new(working_directory: impl Into<PathBuf>) -> Self {
        Self { working_directory: working_directory.into(), local: None }
    }

    /// Uses the `solc` at the given path
    #[must_use]
    pub fn local(mut self, path: impl Into<PathBuf>) -> Self {
        self.local = Some(path.into());
        self
    }

    /// Sets the optional local `solc` path
    #[must_use]
    pub fn set_local(mut self, path: Option<PathBuf>) -> Self {
        self.local = path;
        self
    }

    /// Returns the `solc` to use, fails if a configured local path doesn't exist
    pub fn load(&self) -> Result<Solc> {
        if let Some(ref local) = self.local {
            let path = self.local_path(local);
            if !path.is_file() {
                return Err(SolcError::CompilerNotFound(path))
            }
            tracing::debug!("using local solc at \"{}\"", path.display());
            return Ok(Solc::new(path))
        }
        if let Ok(solc) = std::env::var("SOLC_PATH") {
            tracing::debug!("using solc from SOLC_PATH \"{}\"", solc);
            return Ok(Solc::new(solc))
        }
        Ok(Solc::new(SOLC))
    }

    fn local_path(&self, local: &Path) -> PathBuf {
        if local.is_absolute() {
            local.to_path_buf()
        } else {
            self.working_directory.join(local)
        }
    }
}
