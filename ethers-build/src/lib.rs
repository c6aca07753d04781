#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod artifacts;
pub use artifacts::{Artifact, CompiledContract, CompilerInfo, NetworkRecord, Source, Sources};

pub mod artifactor;
pub use artifactor::Artifactor;

mod compile;
pub use compile::{
    CompileOptions, Compiler, CompilerOutput, CompilerSupplier, Solc, SOLC,
    VERSION_MISMATCH_MESSAGE,
};

mod config;
pub use config::{CompilerSettings, ProjectPathsConfig, ProjectPathsConfigBuilder};

pub mod error;
pub use error::{Result, SolcError, SolcIoError, VersionMismatch};

pub mod profiler;
pub use profiler::{Profiler, RequiredSources};

mod project;
pub use project::{Project, ProjectBuilder, ProjectCompileOutput};

pub mod resolver;
pub use resolver::{ResolvedSource, Resolver, ResolverSource};

pub mod schema;
pub use schema::SCHEMA_VERSION;

pub mod utils;

/// Utilities for creating, mocking and testing of (temporary) projects
#[cfg(any(test, feature = "project-util"))]
#[cfg_attr(docsrs, doc(cfg(feature = "project-util")))]
pub mod project_util;
