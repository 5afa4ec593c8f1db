//! Type descriptors and the ancestor-chain check for existing classes.

use crate::error::{MergeError, Result};
use crate::syntax::{CSharpSyntax, SourceTreeProvider};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use walkdir::WalkDir;

/// A class known to the project model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDescriptor {
    pub qualified_name: String,
    pub base_type: Option<String>,
}

impl TypeDescriptor {
    #[must_use]
    pub fn simple_name(&self) -> &str {
        self.qualified_name
            .rsplit('.')
            .next()
            .unwrap_or(&self.qualified_name)
    }
}

/// Semantic lookups the orchestrator needs from the project model
pub trait TypeResolver: Send + Sync {
    /// Find a type by simple or qualified name
    fn find_existing_type(&self, name: &str) -> Option<TypeDescriptor>;

    /// Base types from the direct base outward; stops at unknown types and cycles
    fn ancestor_chain(&self, ty: &TypeDescriptor) -> Vec<String> {
        let mut chain = Vec::new();
        let mut seen = HashSet::from([ty.qualified_name.clone()]);
        let mut next = ty.base_type.clone();

        while let Some(base) = next {
            chain.push(base.clone());
            next = self
                .find_existing_type(strip_generic_arity(&base))
                .filter(|d| seen.insert(d.qualified_name.clone()))
                .and_then(|d| d.base_type);
        }
        chain
    }
}

/// Drop generic arguments, arity suffixes and the `global::` alias
#[must_use]
pub fn strip_generic_arity(name: &str) -> &str {
    let name = name.trim();
    let name = name.strip_prefix("global::").unwrap_or(name);
    let cut = name.find(['<', '`']).unwrap_or(name.len());
    name[..cut].trim_end()
}

/// Compare a candidate with a required name; simple names match any namespace
#[must_use]
pub fn names_match(candidate: &str, required: &str) -> bool {
    let candidate = strip_generic_arity(candidate);
    let required = strip_generic_arity(required);
    if required.contains('.') {
        candidate == required || candidate.ends_with(&format!(".{required}"))
    } else {
        candidate.rsplit('.').next() == Some(required)
    }
}

/// True when the type or one of its ancestors is `required`
#[must_use]
pub fn any_ancestor(resolver: &dyn TypeResolver, ty: &TypeDescriptor, required: &str) -> bool {
    names_match(&ty.qualified_name, required)
        || resolver
            .ancestor_chain(ty)
            .iter()
            .any(|base| names_match(base, required))
}

/// Check an existing type against its required base
///
/// A type the project does not declare yet passes; it will be generated.
pub fn ensure_derives_from(resolver: &dyn TypeResolver, name: &str, required: &str) -> Result<()> {
    match resolver.find_existing_type(name) {
        Some(ty) if !any_ancestor(resolver, &ty, required) => {
            Err(MergeError::unresolvable_type(ty.qualified_name, required))
        }
        Some(ty) => {
            log::debug!("{} derives from {required}", ty.qualified_name);
            Ok(())
        }
        None => Ok(()),
    }
}

/// Framework bases a project type may derive from, with their own base
const FRAMEWORK_TYPES: &[(&str, Option<&str>)] = &[
    ("Microsoft.EntityFrameworkCore.DbContext", None),
    ("Microsoft.AspNetCore.Identity.EntityFrameworkCore.IdentityUserContext", Some("DbContext")),
    ("Microsoft.AspNetCore.Identity.EntityFrameworkCore.IdentityDbContext", Some("IdentityUserContext")),
    ("Microsoft.AspNetCore.ApiAuthorization.IdentityServer.ApiAuthorizationDbContext", Some("IdentityDbContext")),
    ("Microsoft.AspNetCore.Identity.IdentityUser", None),
    ("Microsoft.AspNetCore.Identity.IdentityRole", None),
];

/// Type model built from the project's own `*.cs` sources on top of the framework bases
#[derive(Debug, Clone)]
pub struct SourceTypeResolver {
    types: BTreeMap<String, TypeDescriptor>,
}

impl SourceTypeResolver {
    /// Scan a project directory; fails when it has no `*.csproj`
    pub fn from_project(root: &Path) -> Result<Self> {
        let has_project = std::fs::read_dir(root)
            .map_err(|e| MergeError::io(root, e))?
            .filter_map(std::result::Result::ok)
            .any(|e| e.path().extension().is_some_and(|ext| ext == "csproj"));
        if !has_project {
            return Err(MergeError::CompilationUnavailable(format!(
                "no .csproj file in {}",
                root.display()
            )));
        }

        let mut sources = Vec::new();
        let walker = WalkDir::new(root).into_iter().filter_entry(|e| {
            let name = e.file_name().to_string_lossy();
            !(e.file_type().is_dir() && matches!(name.as_ref(), "bin" | "obj" | ".git"))
        });
        for entry in walker {
            let entry = entry.map_err(|e| MergeError::CompilationUnavailable(e.to_string()))?;
            let path = entry.path();
            if entry.file_type().is_file() && path.extension().is_some_and(|ext| ext == "cs") {
                let text = std::fs::read_to_string(path).map_err(|e| MergeError::io(path, e))?;
                sources.push(text);
            }
        }

        log::debug!("type model from {} source files", sources.len());
        Self::from_sources(sources.iter().map(String::as_str))
    }

    /// Build from in-memory sources
    pub fn from_sources<'a>(sources: impl IntoIterator<Item = &'a str>) -> Result<Self> {
        let syntax = CSharpSyntax::new();
        let Self { mut types } = Self::default();
        for source in sources {
            let tree = syntax.parse(source)?;
            for (qualified_name, base_type) in syntax.type_declarations(&tree) {
                types.insert(
                    qualified_name.clone(),
                    TypeDescriptor {
                        qualified_name,
                        base_type,
                    },
                );
            }
        }
        Ok(Self { types })
    }
}

impl Default for SourceTypeResolver {
    /// Only the framework bases
    fn default() -> Self {
        let types = FRAMEWORK_TYPES
            .iter()
            .map(|&(qualified_name, base_type)| {
                let descriptor = TypeDescriptor {
                    qualified_name: qualified_name.to_string(),
                    base_type: base_type.map(str::to_string),
                };
                (descriptor.qualified_name.clone(), descriptor)
            })
            .collect();
        Self { types }
    }
}

impl TypeResolver for SourceTypeResolver {
    fn find_existing_type(&self, name: &str) -> Option<TypeDescriptor> {
        let wanted = strip_generic_arity(name);
        self.types.get(wanted).cloned().or_else(|| {
            self.types
                .values()
                .find(|d| names_match(&d.qualified_name, wanted))
                .cloned()
        })
    }
}
