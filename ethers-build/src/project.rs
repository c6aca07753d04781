use crate::{
    artifactor::{self, Artifactor},
    artifacts::{CompiledContract, CompilerInfo},
    compile::{CompileOptions, Compiler, CompilerSupplier},
    config::{CompilerSettings, ProjectPathsConfig},
    error::Result,
    profiler::{Profiler, RequiredSources},
    resolver::Resolver,
    utils,
};
use std::{collections::BTreeSet, fmt, path::PathBuf};

/// Handles contract compiling
pub struct Project {
    /// The layout of the project
    pub paths: ProjectPathsConfig,
    /// How the compiler is invoked
    pub settings: CompilerSettings,
    /// Files to compile in addition to the sources of the contracts directory
    pub files: Option<Vec<PathBuf>>,
    /// Whether to compile all sources instead of only the stale ones
    pub compile_all: bool,
    /// Suppresses progress output and compiler warnings
    pub quiet: bool,
    resolver: Resolver,
    compiler: Box<dyn Compiler>,
    artifactor: Artifactor,
}

impl Project {
    /// Configure the project
    ///
    /// # Example
    ///
    /// ```no_run
    /// use ethers_build::Project;
    /// let project = Project::builder().build().unwrap();
    /// ```
    pub fn builder() -> ProjectBuilder {
        ProjectBuilder::default()
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    pub fn compiler(&self) -> &dyn Compiler {
        self.compiler.as_ref()
    }

    pub fn artifactor(&self) -> &Artifactor {
        &self.artifactor
    }

    pub fn profiler(&self) -> Profiler<'_> {
        Profiler::new(&self.paths, &self.resolver, self.compiler.as_ref())
    }

    /// Returns all source files in the contracts directory
    pub fn sources(&self) -> Result<Vec<PathBuf>> {
        utils::source_files(&self.paths.contracts)
    }

    /// The explicit files with explicitly relative paths resolved against the contracts directory
    fn explicit_files(&self) -> Vec<PathBuf> {
        self.files
            .as_ref()
            .map(|files| self.profiler().to_absolute_paths(files.iter()))
            .unwrap_or_default()
    }

    /// Compiles all sources if `compile_all` is set, otherwise only the stale sources
    pub fn compile(&self) -> Result<ProjectCompileOutput> {
        if self.compile_all {
            self.compile_all()
        } else {
            self.compile_necessary()
        }
    }

    /// Compiles all sources of the contracts directory and the explicit files
    #[tracing::instrument(skip_all, name = "compile::all")]
    pub fn compile_all(&self) -> Result<ProjectCompileOutput> {
        let paths = self.sources()?.into_iter().chain(self.explicit_files()).collect();
        self.compile_with_dependencies(paths)
    }

    /// Compiles the stale sources, the explicit files and everything that imports them
    #[tracing::instrument(skip_all, name = "compile::necessary")]
    pub fn compile_necessary(&self) -> Result<ProjectCompileOutput> {
        let files = self.explicit_files();
        let updated =
            self.profiler().updated(self.files.as_ref().map(|_| files.as_slice()))?;
        let paths = updated.into_iter().chain(files).collect();
        self.compile_with_dependencies(paths)
    }

    /// Compiles the paths and every known source that depends on them
    pub fn compile_with_dependencies(
        &self,
        paths: BTreeSet<PathBuf>,
    ) -> Result<ProjectCompileOutput> {
        let paths: Vec<PathBuf> = paths.into_iter().collect();
        let RequiredSources { all_sources, required } =
            self.profiler().required_sources(&self.sources()?, &paths)?;

        if all_sources.is_empty() {
            return Ok(ProjectCompileOutput::default())
        }

        if !self.quiet {
            let mut display: Vec<_> = if required.is_empty() {
                all_sources.keys().map(|path| self.paths.display(path)).collect()
            } else {
                required.iter().map(|path| self.paths.display(path)).collect()
            };
            display.sort();
            for contract in display {
                tracing::info!("Compiling {}", contract);
            }
        }

        let options = CompileOptions {
            settings: self.settings.clone(),
            targets: required,
            quiet: self.quiet,
        };
        let output = self.compiler.compile(&all_sources, &options)?;
        Ok(ProjectCompileOutput {
            contracts: output.contracts,
            compiler_info: Some(output.compiler_info),
        })
    }

    /// Writes the artifacts of the contracts into the contracts build directory, which is created
    /// if missing
    pub fn save(&self, contracts: Vec<CompiledContract>) -> Result<()> {
        utils::create_dir_all(&self.paths.contracts_build)?;
        let artifacts = artifactor::by_contract_name(contracts);
        self.artifactor.save_all(&artifacts)
    }

    /// Compiles the project and writes all artifacts
    pub fn compile_and_save(&self) -> Result<ProjectCompileOutput> {
        let output = self.compile()?;
        if output.is_unchanged() {
            if !self.quiet {
                tracing::info!("Everything is up to date, there is nothing to compile.");
            }
            return Ok(output)
        }
        self.save(output.contracts.clone())?;
        if !self.quiet {
            tracing::info!("Artifacts written to {}", self.paths.contracts_build.display());
            if let Some(ref info) = output.compiler_info {
                tracing::info!("Compiled successfully using {}", info);
            }
        }
        Ok(output)
    }
}

impl fmt::Debug for Project {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Project")
            .field("paths", &self.paths)
            .field("settings", &self.settings)
            .field("files", &self.files)
            .field("compile_all", &self.compile_all)
            .field("quiet", &self.quiet)
            .field("resolver", &self.resolver)
            .field("artifactor", &self.artifactor)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
pub struct ProjectBuilder {
    /// The layout of the project
    paths: Option<ProjectPathsConfig>,
    settings: CompilerSettings,
    files: Option<Vec<PathBuf>>,
    compile_all: bool,
    quiet: bool,
    resolver: Option<Resolver>,
    compiler: Option<Box<dyn Compiler>>,
}

impl ProjectBuilder {
    #[must_use]
    pub fn paths(mut self, paths: ProjectPathsConfig) -> Self {
        self.paths = Some(paths);
        self
    }

    #[must_use]
    pub fn settings(mut self, settings: CompilerSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Adds a file to compile in addition to the sources of the contracts directory
    #[must_use]
    pub fn file(mut self, file: impl Into<PathBuf>) -> Self {
        self.files.get_or_insert_with(Vec::new).push(file.into());
        self
    }

    #[must_use]
    pub fn files<I, S>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<PathBuf>,
    {
        for file in files {
            self = self.file(file);
        }
        self
    }

    /// Compiles all sources, not only the stale ones
    #[must_use]
    pub fn all(self) -> Self {
        self.set_compile_all(true)
    }

    #[must_use]
    pub fn set_compile_all(mut self, compile_all: bool) -> Self {
        self.compile_all = compile_all;
        self
    }

    /// Suppresses progress output
    #[must_use]
    pub fn quiet(self) -> Self {
        self.set_quiet(true)
    }

    #[must_use]
    pub fn set_quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    /// Sets the resolver, the default resolves against the project root
    #[must_use]
    pub fn resolver(mut self, resolver: Resolver) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Sets the compiler, by default the [`CompilerSupplier`] locates `solc`
    #[must_use]
    pub fn compiler(mut self, compiler: impl Compiler + 'static) -> Self {
        self.compiler = Some(Box::new(compiler));
        self
    }

    pub fn build(self) -> Result<Project> {
        let Self { paths, settings, files, compile_all, quiet, resolver, compiler } = self;

        let paths = paths.map(Ok).unwrap_or_else(ProjectPathsConfig::current)?;
        let resolver = resolver.unwrap_or_else(|| Resolver::new(&paths.root));
        let compiler: Box<dyn Compiler> = match compiler {
            Some(compiler) => compiler,
            None => Box::new(
                CompilerSupplier::new(&paths.root).set_local(settings.solc.clone()).load()?,
            ),
        };
        let artifactor = Artifactor::new(&paths.contracts_build);

        Ok(Project { paths, settings, files, compile_all, quiet, resolver, compiler, artifactor })
    }
}

/// The contracts produced by a project compilation
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProjectCompileOutput {
    pub contracts: Vec<CompiledContract>,
    /// The compiler that was used, `None` if nothing was compiled
    pub compiler_info: Option<CompilerInfo>,
}

impl ProjectCompileOutput {
    /// Whether nothing was compiled
    pub fn is_unchanged(&self) -> bool {
        self.contracts.is_empty()
    }

    /// Finds the contract with the given name
    pub fn find(&self, contract_name: &str) -> Option<&CompiledContract> {
        self.contracts.iter().find(|contract| contract.contract_name == contract_name)
    }
}

impl fmt::Display for ProjectCompileOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.compiler_info {
            Some(ref info) if !self.is_unchanged() => {
                write!(f, "Compiled {} contracts using {}", self.contracts.len(), info)
            }
            _ => f.write_str("Nothing to compile"),
        }
    }
}
