//! Project-specific identifiers and host-variable discovery.

use crate::error::MergeError;
use crate::signature::{tokenize, Signature, Token, TokenKind};
use crate::syntax::StatementList;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Database provider chosen for the data context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DbProvider {
    SqlServer,
    Sqlite,
    Postgres,
}

impl DbProvider {
    /// Options-builder call that selects this provider
    #[must_use]
    pub const fn registration_method(self) -> &'static str {
        match self {
            Self::SqlServer => "UseSqlServer",
            Self::Sqlite => "UseSqlite",
            Self::Postgres => "UseNpgsql",
        }
    }

    /// NuGet package that provides the registration method
    #[must_use]
    pub const fn package_id(self) -> &'static str {
        match self {
            Self::SqlServer => "Microsoft.EntityFrameworkCore.SqlServer",
            Self::Sqlite => "Microsoft.EntityFrameworkCore.Sqlite",
            Self::Postgres => "Npgsql.EntityFrameworkCore.PostgreSQL",
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SqlServer => "sqlserver",
            Self::Sqlite => "sqlite",
            Self::Postgres => "postgres",
        }
    }
}

impl fmt::Display for DbProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DbProvider {
    type Err = MergeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sqlserver" | "sqlserver-efcore" | "mssql" => Ok(Self::SqlServer),
            "sqlite" | "sqlite-efcore" => Ok(Self::Sqlite),
            "postgres" | "postgresql" | "npgsql" | "npgsql-efcore" => Ok(Self::Postgres),
            other => Err(MergeError::validation(format!(
                "unknown database provider '{other}' (expected sqlserver, sqlite or postgres)"
            ))),
        }
    }
}

/// A well-known host object: the placeholder the specification uses and the
/// expression that constructs it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostBinding {
    pub placeholder: String,
    pub construction: String,
}

impl HostBinding {
    pub fn new(placeholder: impl Into<String>, construction: impl Into<String>) -> Self {
        Self {
            placeholder: placeholder.into(),
            construction: construction.into(),
        }
    }

    /// `builder` from `WebApplication.CreateBuilder`, `app` from `builder.Build()`
    #[must_use]
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::new("builder", "WebApplication.CreateBuilder"),
            Self::new("app", "builder.Build()"),
        ]
    }
}

/// Run-scoped identifiers substituted into change templates
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentifierMap {
    hosts: BTreeMap<String, String>,
    context_class: Option<String>,
    user_class: Option<String>,
    model_class: Option<String>,
    provider: Option<DbProvider>,
    connection_key: Option<String>,
}

impl IdentifierMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_context_class(mut self, name: impl Into<String>) -> Self {
        self.context_class = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_user_class(mut self, name: impl Into<String>) -> Self {
        self.user_class = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_model_class(mut self, name: impl Into<String>) -> Self {
        self.model_class = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_provider(mut self, provider: DbProvider) -> Self {
        self.provider = Some(provider);
        self
    }

    #[must_use]
    pub fn with_connection_key(mut self, key: impl Into<String>) -> Self {
        self.connection_key = Some(key.into());
        self
    }

    /// Map a placeholder to the project's identifier (identity mappings are dropped)
    #[must_use]
    pub fn with_host(mut self, placeholder: impl Into<String>, actual: impl Into<String>) -> Self {
        let placeholder = placeholder.into();
        let actual = actual.into();
        if placeholder != actual {
            self.hosts.insert(placeholder, actual);
        }
        self
    }

    #[must_use]
    pub fn hosts(&self) -> &BTreeMap<String, String> {
        &self.hosts
    }

    #[must_use]
    pub fn context_class(&self) -> Option<&str> {
        self.context_class.as_deref()
    }

    #[must_use]
    pub fn user_class(&self) -> Option<&str> {
        self.user_class.as_deref()
    }

    #[must_use]
    pub fn model_class(&self) -> Option<&str> {
        self.model_class.as_deref()
    }

    #[must_use]
    pub fn provider(&self) -> Option<DbProvider> {
        self.provider
    }

    /// Explicit key, else `<ContextClass>Connection`
    #[must_use]
    pub fn connection_key(&self) -> Option<String> {
        self.connection_key
            .clone()
            .or_else(|| self.context_class.as_ref().map(|c| format!("{c}Connection")))
    }
}

/// Discovers what the target file calls its host objects
#[derive(Debug, Clone)]
pub struct HostAdapter {
    bindings: Vec<HostBinding>,
}

impl Default for HostAdapter {
    fn default() -> Self {
        Self::new(HostBinding::defaults())
    }
}

impl HostAdapter {
    #[must_use]
    pub fn new(bindings: Vec<HostBinding>) -> Self {
        Self { bindings }
    }

    /// Extend `ids` with the host variables bound in `list`
    ///
    /// Bindings are processed in order; a renamed host is substituted into the
    /// construction pattern of later bindings (`builder.Build()` becomes
    /// `b.Build()` once `builder` is known to be `b`).
    #[must_use]
    pub fn discover(&self, list: &StatementList, mut ids: IdentifierMap) -> IdentifierMap {
        for binding in &self.bindings {
            let construction = rename_hosts(&binding.construction, ids.hosts());
            let pattern = Signature::of(&construction);
            let found = list
                .statements()
                .iter()
                .find_map(|s| bound_identifier(s.text(), &pattern));

            match found {
                Some(actual) => {
                    log::debug!("host '{}' bound as '{actual}'", binding.placeholder);
                    ids = ids.with_host(binding.placeholder.clone(), actual);
                }
                None => log::debug!(
                    "no construction of '{}' found, placeholder kept",
                    binding.placeholder
                ),
            }
        }
        ids
    }
}

/// Identifier assigned by a `x = <pattern>` statement, if the right side contains it
fn bound_identifier(statement: &str, pattern: &Signature) -> Option<String> {
    let tokens = tokenize(statement);
    let eq = tokens.iter().enumerate().position(|(i, t)| {
        t.text == "="
            && !matches!(tokens.get(i + 1).map(|n| n.text), Some("=" | ">"))
            && !matches!(
                i.checked_sub(1).map(|p| tokens[p].text),
                Some("=" | "!" | "<" | ">")
            )
    })?;
    let target = tokens[..eq].last()?;
    if target.kind != TokenKind::Identifier {
        return None;
    }

    let rhs = Signature::of(&statement[tokens[eq].span.end..]);
    rhs.contains(pattern).then(|| target.text.to_string())
}

/// Replace placeholder identifiers token-exactly
///
/// Member accesses (`x.builder`) and literals are left alone.
#[must_use]
pub fn rename_hosts(text: &str, hosts: &BTreeMap<String, String>) -> String {
    if hosts.is_empty() {
        return text.to_string();
    }

    let tokens = tokenize(text);
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for (i, token) in tokens.iter().enumerate() {
        if token.kind != TokenKind::Identifier || is_member_access(&tokens, i) {
            continue;
        }
        if let Some(actual) = hosts.get(token.text) {
            out.push_str(&text[last..token.span.start]);
            out.push_str(actual);
            last = token.span.end;
        }
    }
    out.push_str(&text[last..]);
    out
}

fn is_member_access(tokens: &[Token<'_>], index: usize) -> bool {
    index > 0 && tokens[index - 1].text == "."
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::{CSharpSyntax, SourceTreeProvider};

    fn discover(source: &str) -> IdentifierMap {
        let syntax = CSharpSyntax::new();
        let tree = syntax.parse(source).unwrap();
        HostAdapter::default().discover(&syntax.top_level_statements(&tree), IdentifierMap::new())
    }

    #[test]
    fn test_renamed_hosts_are_discovered() {
        let ids = discover("var b = WebApplication.CreateBuilder(args);\nvar webApp = b.Build();\nwebApp.Run();\n");
        assert_eq!(ids.hosts().get("builder").map(String::as_str), Some("b"));
        assert_eq!(ids.hosts().get("app").map(String::as_str), Some("webApp"));
    }

    #[test]
    fn test_conventional_names_produce_no_mapping() {
        let ids = discover("var builder = WebApplication.CreateBuilder(args);\nvar app = builder.Build();\n");
        assert!(ids.hosts().is_empty());
    }

    #[test]
    fn test_typed_declaration_and_bare_assignment() {
        let ids = discover("WebApplicationBuilder wab = WebApplication.CreateBuilder(args);\nWebApplication host;\nhost = wab.Build();\n");
        assert_eq!(ids.hosts().get("builder").map(String::as_str), Some("wab"));
        assert_eq!(ids.hosts().get("app").map(String::as_str), Some("host"));
    }

    #[test]
    fn test_rename_skips_member_access_and_strings() {
        let mut hosts = BTreeMap::new();
        hosts.insert("app".to_string(), "webApp".to_string());
        let renamed = rename_hosts(r#"app.MapGet("/app", () => cfg.app);"#, &hosts);
        assert_eq!(renamed, r#"webApp.MapGet("/app", () => cfg.app);"#);
    }

    #[test]
    fn test_connection_key_defaults_to_context_name() {
        let ids = IdentifierMap::new().with_context_class("BlogContext");
        assert_eq!(ids.connection_key().as_deref(), Some("BlogContextConnection"));
        let ids = ids.with_connection_key("Default");
        assert_eq!(ids.connection_key().as_deref(), Some("Default"));
    }

    #[test]
    fn test_provider_parsing() {
        assert_eq!("SQLite".parse::<DbProvider>().unwrap(), DbProvider::Sqlite);
        assert_eq!("npgsql".parse::<DbProvider>().unwrap().registration_method(), "UseNpgsql");
        assert!("oracle".parse::<DbProvider>().is_err());
    }
}
