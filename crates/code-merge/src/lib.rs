//! # Scaffold Code Merge
//!
//! Declarative, idempotent merging of registrations into C# entry-point files.
//!
//! ## Philosophy
//!
//! The engine edits a file the developer already owns, so it:
//! - Only inserts, never regenerates or reorders existing code
//! - Recognizes its own earlier work and never inserts it twice
//! - Follows the file's naming, indentation and newline conventions
//! - Leaves every file untouched when any step of a run fails
//!
//! ## Architecture
//!
//! ```text
//! ScaffoldRequest
//!     │
//!     ├──> Validation, package and base-type checks
//!     │
//!     ├──> ChangeSpecification (embedded JSON or override directory)
//!     │
//!     ├──> Per file, per method key
//!     │    ├─> Entry point: top-level statements or a method body
//!     │    ├─> Host discovery (builder / app renamed?)
//!     │    ├─> Token substitution (context, user, provider, key)
//!     │    ├─> Idempotency filter
//!     │    ├─> Anchor resolution
//!     │    └─> Structural insert → new SourceTree snapshot
//!     │
//!     └──> Single write of every changed file
//! ```
//!
//! ## Example
//!
//! ```rust
//! use scaffold_code_merge::{
//!     CSharpSyntax, ChangeSpecification, FileMerge, IdentifierMap, MergeConfig, ScenarioFlags,
//! };
//!
//! let spec = ChangeSpecification::from_json(r#"{
//!     "files": [{
//!         "fileName": "Program.cs",
//!         "methods": { "Global": { "codeChanges": [
//!             { "block": "app.UseAuthentication();", "insertBefore": "app.UseAuthorization()" }
//!         ]}}
//!     }]
//! }"#).unwrap();
//!
//! let source = "var app = builder.Build();\napp.UseAuthorization();\napp.Run();\n";
//! let syntax = CSharpSyntax::new();
//! let config = MergeConfig::default();
//! let ids = IdentifierMap::new();
//! let flags = ScenarioFlags::default();
//!
//! let merge = FileMerge::new(&syntax, &config, &ids, &flags);
//! let first = merge.run("Program.cs", source, &spec.files[0]).unwrap();
//! assert!(first.text.contains("app.UseAuthentication();\napp.UseAuthorization();"));
//!
//! let second = merge.run("Program.cs", &first.text, &spec.files[0]).unwrap();
//! assert!(!second.changed);
//! ```

mod anchor;
mod applier;
mod config;
mod entry_point;
mod error;
mod fs;
mod idempotency;
mod identifiers;
mod merge;
mod model;
mod orchestrator;
mod resources;
mod signature;
mod syntax;
mod tokens;
mod types;

pub use anchor::{find_statement, Anchor, AnchorResolver, Edge, Lookup, Resolution};
pub use applier::ChangeApplier;
pub use config::MergeConfig;
pub use entry_point::{EntryPoint, GLOBAL_METHOD_KEY};
pub use error::{FallbackReason, MergeError, MergeWarning, Result};
pub use fs::{FileSystem, LocalFileSystem};
pub use idempotency::{parse_block, Decision, IdempotencyFilter};
pub use identifiers::{rename_hosts, DbProvider, HostAdapter, HostBinding, IdentifierMap};
pub use merge::{FileMerge, MergeResult};
pub use model::{
    ChangeSpecification, CodeChange, FileDescriptor, LeadingTrivia, MethodChanges, ScenarioFlags,
    UsingSpec,
};
pub use orchestrator::{
    MergeOutcome, MergeReport, Orchestrator, ScaffoldRequest, EF_SCENARIO_FLAG, PRERELEASE_FLAG,
    STARTUP_HOSTING_FLAG,
};
pub use resources::{DirectorySpecs, EmbeddedSpecs, LayeredSpecs, SpecCache, SpecSource, BUILTIN_SCENARIOS};
pub use signature::{tokenize, Signature, Token, TokenKind};
pub use syntax::{
    normalize_using, CSharpSyntax, ListScope, SourceTree, SourceTreeProvider, Statement, StatementList,
    UsingDirective,
};
pub use tokens::{TokenFamily, TokenSubstitution};
pub use types::{
    any_ancestor, ensure_derives_from, names_match, strip_generic_arity, SourceTypeResolver, TypeDescriptor,
    TypeResolver,
};
