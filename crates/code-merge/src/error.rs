use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for merge operations
pub type Result<T> = std::result::Result<T, MergeError>;

/// Errors that abort a merge run
///
/// Every variant is raised before the write phase except `Io` on write, so a
/// failed run never leaves a partially edited file behind.
#[derive(Error, Debug)]
pub enum MergeError {
    /// Missing or mutually exclusive request inputs
    #[error("Validation error: {0}")]
    Validation(String),

    /// A package the scenario needs is not referenced by the project
    #[error("Missing package reference '{package}' (install with: {hint})")]
    MissingDependency { package: String, hint: String },

    /// An existing type does not satisfy the required base-type contract
    #[error("Type '{type_name}' does not derive from required base '{required_base}'")]
    UnresolvableType {
        type_name: String,
        required_base: String,
    },

    /// The project model could not be built
    #[error("Project model unavailable: {0}")]
    CompilationUnavailable(String),

    /// Read or write failure
    #[error("IO error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Target source could not be parsed
    #[error("Parse error: {0}")]
    Parse(String),

    /// A rendered change block is not a sequence of statements
    #[error("Change block does not parse as statements: {0}")]
    InvalidBlock(String),

    /// An edit would leave the file syntactically invalid
    #[error("Edit rejected, result is not well-formed: {0}")]
    Malformed(String),

    /// Change specification is malformed or unknown
    #[error("Invalid change specification: {0}")]
    Spec(String),

    /// Tree-sitter error
    #[error("Tree-sitter error: {0}")]
    TreeSitter(String),
}

impl MergeError {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a missing-dependency error with an install hint
    pub fn missing_dependency(package: impl Into<String>, prerelease: bool) -> Self {
        let package = package.into();
        let hint = install_hint(&package, prerelease);
        Self::MissingDependency { package, hint }
    }

    /// Create an unresolvable-type error
    pub fn unresolvable_type(type_name: impl Into<String>, required_base: impl Into<String>) -> Self {
        Self::UnresolvableType {
            type_name: type_name.into(),
            required_base: required_base.into(),
        }
    }

    /// Create an IO error for path
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a parse error
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    /// Create a specification error
    pub fn spec(msg: impl Into<String>) -> Self {
        Self::Spec(msg.into())
    }

    /// Create a tree-sitter error
    pub fn tree_sitter(msg: impl Into<String>) -> Self {
        Self::TreeSitter(msg.into())
    }
}

pub(crate) fn install_hint(package: &str, prerelease: bool) -> String {
    if prerelease {
        format!("dotnet add package {package} --prerelease")
    } else {
        format!("dotnet add package {package}")
    }
}

/// Why an anchor could not be resolved to a single statement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    /// No statement matched the signature
    NotFound,
    /// More than one statement matched the signature
    Ambiguous(usize),
    /// The parent statement has no block to nest into
    NoBody,
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "no matching statement"),
            Self::Ambiguous(count) => write!(f, "{count} statements match"),
            Self::NoBody => write!(f, "parent statement has no block"),
        }
    }
}

/// Non-fatal findings surfaced alongside a successful run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MergeWarning {
    /// An anchor did not resolve; the change was appended at the end of its list
    AnchorFallback {
        file: String,
        method: String,
        anchor: String,
        reason: FallbackReason,
    },
    /// A method key names a method the file does not declare
    MethodNotFound { file: String, method: String },
    /// A file descriptor names a file the project does not contain
    FileNotFound { path: PathBuf },
    /// A required package is absent (IDE mode only)
    MissingDependency { package: String, hint: String },
}

impl fmt::Display for MergeWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AnchorFallback {
                file,
                method,
                anchor,
                reason,
            } => write!(
                f,
                "{file} [{method}]: anchor '{anchor}' unresolved ({reason}), appended at end"
            ),
            Self::MethodNotFound { file, method } => {
                write!(f, "{file}: method '{method}' not found, changes skipped")
            }
            Self::FileNotFound { path } => {
                write!(f, "{}: file not found, skipped", path.display())
            }
            Self::MissingDependency { package, hint } => {
                write!(f, "missing package reference '{package}' (install with: {hint})")
            }
        }
    }
}
