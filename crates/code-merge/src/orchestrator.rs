use crate::config::MergeConfig;
use crate::error::{install_hint, MergeError, MergeWarning, Result};
use crate::fs::{FileSystem, LocalFileSystem};
use crate::identifiers::{DbProvider, IdentifierMap};
use crate::merge::FileMerge;
use crate::model::{ChangeSpecification, FileDescriptor, ScenarioFlags};
use crate::resources::{LayeredSpecs, SpecCache, SpecSource};
use crate::syntax::{CSharpSyntax, SourceTreeProvider};
use crate::types::{ensure_derives_from, SourceTypeResolver, TypeResolver};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Flag set when the request targets an EF-backed scenario
pub const EF_SCENARIO_FLAG: &str = "EfScenario";
/// Flag set for prerelease package installs
pub const PRERELEASE_FLAG: &str = "Prerelease";
/// Flag set when the project still configures services in `Startup.cs`
pub const STARTUP_HOSTING_FLAG: &str = "StartupHosting";

/// Facts gathered by a generator front end for one invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScaffoldRequest {
    pub project_dir: PathBuf,
    /// Scenario key (`identity`, `minimalApi`, `efController`, or an override name)
    pub scenario: String,
    pub context_class: Option<String>,
    pub user_class: Option<String>,
    pub model_class: Option<String>,
    pub provider: Option<DbProvider>,
    pub connection_key: Option<String>,
    pub prerelease: bool,
    pub ef_scenario: bool,
    /// Extra scenario flags matched by `options` gates
    pub flags: Vec<String>,
    /// Package ids the project references
    pub package_references: Vec<String>,
}

impl ScaffoldRequest {
    pub fn new(project_dir: impl Into<PathBuf>, scenario: impl Into<String>) -> Self {
        Self {
            project_dir: project_dir.into(),
            scenario: scenario.into(),
            ..Default::default()
        }
    }

    /// Reject missing or conflicting inputs
    pub fn validate(&self) -> Result<()> {
        if self.scenario.trim().is_empty() {
            return Err(MergeError::validation("scenario is required"));
        }
        if !self.project_dir.is_dir() {
            return Err(MergeError::validation(format!(
                "project directory {} does not exist",
                self.project_dir.display()
            )));
        }
        if self.provider.is_some() && self.context_class.is_none() {
            return Err(MergeError::validation(
                "a database provider was given without a context class",
            ));
        }
        if self.ef_scenario && self.context_class.is_none() {
            return Err(MergeError::validation("EF scenario requires a context class"));
        }
        if self.ef_scenario && self.provider.is_none() {
            return Err(MergeError::validation("EF scenario requires a database provider"));
        }
        Ok(())
    }

    fn identifiers(&self) -> IdentifierMap {
        let mut ids = IdentifierMap::new();
        if let Some(context) = &self.context_class {
            ids = ids.with_context_class(context.clone());
        }
        if let Some(user) = &self.user_class {
            ids = ids.with_user_class(user.clone());
        }
        if let Some(model) = &self.model_class {
            ids = ids.with_model_class(model.clone());
        }
        if let Some(provider) = self.provider {
            ids = ids.with_provider(provider);
        }
        if let Some(key) = &self.connection_key {
            ids = ids.with_connection_key(key.clone());
        }
        ids
    }
}

/// Per-file summary of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    pub path: PathBuf,
    pub changed: bool,
    pub applied: usize,
    pub skipped: usize,
    pub usings_added: usize,
}

/// Result of a successful run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeOutcome {
    pub files: Vec<MergeReport>,
    pub diagnostics: Vec<MergeWarning>,
}

impl MergeOutcome {
    /// Paths that were rewritten
    pub fn changed_files(&self) -> impl Iterator<Item = &Path> {
        self.files.iter().filter(|f| f.changed).map(|f| f.path.as_path())
    }

    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.files.iter().all(|f| !f.changed)
    }
}

/// Sequences validation, loading, merging and the single write phase
pub struct Orchestrator {
    config: MergeConfig,
    provider: Box<dyn SourceTreeProvider>,
    fs: Box<dyn FileSystem>,
    specs: SpecCache,
    resolver: Option<Box<dyn TypeResolver>>,
}

impl Orchestrator {
    /// Orchestrator with the tree-sitter provider, local disk and standard spec sources
    pub fn new(config: MergeConfig) -> Result<Self> {
        config.validate().map_err(MergeError::validation)?;
        let specs = SpecCache::new(LayeredSpecs::standard(config.spec_dir.clone()));
        Ok(Self {
            config,
            provider: Box::new(CSharpSyntax::new()),
            fs: Box::new(LocalFileSystem),
            specs,
            resolver: None,
        })
    }

    #[must_use]
    pub fn with_file_system(mut self, fs: impl FileSystem + 'static) -> Self {
        self.fs = Box::new(fs);
        self
    }

    #[must_use]
    pub fn with_provider(mut self, provider: impl SourceTreeProvider + 'static) -> Self {
        self.provider = Box::new(provider);
        self
    }

    #[must_use]
    pub fn with_spec_source(mut self, source: impl SpecSource + 'static) -> Self {
        self.specs = SpecCache::new(source);
        self
    }

    /// Use a fixed type model instead of scanning the project
    #[must_use]
    pub fn with_type_resolver(mut self, resolver: impl TypeResolver + 'static) -> Self {
        self.resolver = Some(Box::new(resolver));
        self
    }

    #[must_use]
    pub fn config(&self) -> &MergeConfig {
        &self.config
    }

    /// Run one generator invocation
    ///
    /// Every file is merged in memory before the first write; a failure
    /// before the write phase leaves the project untouched.
    pub fn run(&self, request: &ScaffoldRequest) -> Result<MergeOutcome> {
        request.validate()?;
        let spec = self.specs.get_or_load(&request.scenario)?;
        let flags = self.flags(request);
        let mut outcome = MergeOutcome::default();

        self.check_packages(&spec, request, &mut outcome.diagnostics)?;
        self.check_types(&spec, request)?;

        let ids = request.identifiers();
        let engine = FileMerge::new(self.provider.as_ref(), &self.config, &ids, &flags);
        let mut pending = Vec::new();

        for descriptor in &spec.files {
            let path = request.project_dir.join(&descriptor.file_name);
            if !self.fs.exists(&path) {
                if has_applicable_work(descriptor, &flags) {
                    log::warn!("{}: file not found", path.display());
                    outcome.diagnostics.push(MergeWarning::FileNotFound { path });
                } else {
                    log::debug!("{}: absent, nothing applies", path.display());
                }
                continue;
            }

            let source = self.fs.read_text(&path)?;
            let result = engine.run(&descriptor.file_name, &source, descriptor)?;
            log::debug!(
                "{}: {} applied, {} skipped",
                descriptor.file_name,
                result.applied,
                result.skipped
            );

            outcome.diagnostics.extend(result.diagnostics);
            outcome.files.push(MergeReport {
                path: path.clone(),
                changed: result.changed,
                applied: result.applied,
                skipped: result.skipped,
                usings_added: result.usings_added,
            });
            if result.changed {
                pending.push((path, result.text));
            }
        }

        for (path, text) in pending {
            self.fs.write_text(&path, &text)?;
            log::info!("updated {}", path.display());
        }

        Ok(outcome)
    }

    fn flags(&self, request: &ScaffoldRequest) -> ScenarioFlags {
        let mut flags = ScenarioFlags::new(request.flags.iter().cloned());
        if request.ef_scenario {
            flags.insert(EF_SCENARIO_FLAG);
        }
        if request.prerelease {
            flags.insert(PRERELEASE_FLAG);
        }
        if self.fs.exists(&request.project_dir.join("Startup.cs")) {
            flags.insert(STARTUP_HOSTING_FLAG);
        }
        flags
    }

    fn check_packages(
        &self,
        spec: &ChangeSpecification,
        request: &ScaffoldRequest,
        diagnostics: &mut Vec<MergeWarning>,
    ) -> Result<()> {
        let mut required: Vec<&str> = spec.required_packages().into_iter().collect();
        if let Some(provider) = request.provider.filter(|_| request.ef_scenario) {
            required.push(provider.package_id());
        }

        let referenced = |package: &str| {
            request
                .package_references
                .iter()
                .any(|r| r.eq_ignore_ascii_case(package))
        };

        for package in required.into_iter().filter(|p| !referenced(*p)) {
            if !self.config.ide_mode {
                return Err(MergeError::missing_dependency(package, request.prerelease));
            }
            let hint = install_hint(package, request.prerelease);
            log::warn!("missing package reference '{package}' (install with: {hint})");
            diagnostics.push(MergeWarning::MissingDependency {
                package: package.to_string(),
                hint,
            });
        }
        Ok(())
    }

    fn check_types(&self, spec: &ChangeSpecification, request: &ScaffoldRequest) -> Result<()> {
        let checks: Vec<(&str, &str)> = [
            (request.context_class.as_deref(), spec.context_base.as_deref()),
            (request.user_class.as_deref(), spec.user_base.as_deref()),
        ]
        .into_iter()
        .filter_map(|(name, base)| Some((name?, base?)))
        .collect();
        if checks.is_empty() {
            return Ok(());
        }

        let scanned;
        let resolver: &dyn TypeResolver = match &self.resolver {
            Some(resolver) => resolver.as_ref(),
            None => {
                scanned = SourceTypeResolver::from_project(&request.project_dir)?;
                &scanned
            }
        };

        for (name, base) in checks {
            ensure_derives_from(resolver, name, base)?;
        }
        Ok(())
    }
}

fn has_applicable_work(descriptor: &FileDescriptor, flags: &ScenarioFlags) -> bool {
    descriptor
        .methods
        .values()
        .flat_map(|m| &m.code_changes)
        .any(|c| c.applies_to(flags))
        || descriptor.usings.iter().any(|u| u.applies_to(flags))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Demo.csproj"), "<Project Sdk=\"Microsoft.NET.Sdk.Web\" />\n").unwrap();
        std::fs::write(
            dir.path().join("Program.cs"),
            "var builder = WebApplication.CreateBuilder(args);\nvar app = builder.Build();\napp.Run();\n",
        )
        .unwrap();
        dir
    }

    #[test]
    fn test_validation_conflicts() {
        let dir = project();
        let mut request = ScaffoldRequest::new(dir.path(), "minimalApi");
        request.provider = Some(DbProvider::Sqlite);
        assert!(matches!(request.validate(), Err(MergeError::Validation(_))));

        request.provider = None;
        request.ef_scenario = true;
        request.context_class = Some("BlogContext".to_string());
        assert!(matches!(request.validate(), Err(MergeError::Validation(_))));

        request.provider = Some(DbProvider::Sqlite);
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_provider_without_context_is_named_in_ef_scenarios() {
        let dir = project();
        let mut request = ScaffoldRequest::new(dir.path(), "minimalApi");
        request.provider = Some(DbProvider::Sqlite);
        request.ef_scenario = true;

        let err = request.validate().unwrap_err();
        assert!(err.to_string().contains("without a context class"), "{err}");
    }

    #[test]
    fn test_identity_context_passes_plain_context_base() {
        let dir = project();
        std::fs::write(
            dir.path().join("BlogContext.cs"),
            "public class BlogContext : IdentityDbContext<BlogUser> { }
public class BlogUser : IdentityUser { }
",
        )
        .unwrap();
        let mut request = ScaffoldRequest::new(dir.path(), "efController");
        request.context_class = Some("BlogContext".to_string());
        request.provider = Some(DbProvider::SqlServer);
        request.ef_scenario = true;
        request.package_references = vec!["Microsoft.EntityFrameworkCore.SqlServer".to_string()];

        let outcome = Orchestrator::new(MergeConfig::default()).unwrap().run(&request).unwrap();
        assert_eq!(outcome.changed_files().count(), 1);
    }

    #[test]
    fn test_missing_provider_package_is_fatal_outside_ide() {
        let dir = project();
        let mut request = ScaffoldRequest::new(dir.path(), "minimalApi");
        request.ef_scenario = true;
        request.context_class = Some("BlogContext".to_string());
        request.provider = Some(DbProvider::Sqlite);
        request.prerelease = true;

        let cli = Orchestrator::new(MergeConfig::for_cli()).unwrap();
        let err = cli.run(&request).unwrap_err();
        assert!(matches!(
            err,
            MergeError::MissingDependency { ref package, ref hint }
                if package == "Microsoft.EntityFrameworkCore.Sqlite" && hint.ends_with("--prerelease")
        ));
        let untouched = std::fs::read_to_string(dir.path().join("Program.cs")).unwrap();
        assert!(!untouched.contains("AddDbContext"));

        let ide = Orchestrator::new(MergeConfig::for_ide()).unwrap();
        let outcome = ide.run(&request).unwrap();
        assert!(outcome
            .diagnostics
            .iter()
            .any(|d| matches!(d, MergeWarning::MissingDependency { .. })));
        assert_eq!(outcome.changed_files().count(), 1);
    }

    #[test]
    fn test_incompatible_existing_context_fails_before_edits() {
        let dir = project();
        std::fs::write(dir.path().join("BlogContext.cs"), "public class BlogContext : DbContext { }\n").unwrap();
        let mut request = ScaffoldRequest::new(dir.path(), "identity");
        request.context_class = Some("BlogContext".to_string());
        request.package_references = vec![
            "Microsoft.AspNetCore.Identity.EntityFrameworkCore".to_string(),
            "Microsoft.AspNetCore.Identity.UI".to_string(),
        ];

        let err = Orchestrator::new(MergeConfig::default()).unwrap().run(&request).unwrap_err();
        assert!(matches!(err, MergeError::UnresolvableType { .. }));
    }

    #[test]
    fn test_startup_file_absent_is_silent_for_minimal_hosting() {
        let dir = project();
        let mut request = ScaffoldRequest::new(dir.path(), "efController");
        request.context_class = Some("BlogContext".to_string());

        let outcome = Orchestrator::new(MergeConfig::default()).unwrap().run(&request).unwrap();
        assert!(outcome.diagnostics.is_empty());
        assert_eq!(outcome.files.len(), 1);
        assert!(outcome.files[0].changed);
    }
}
