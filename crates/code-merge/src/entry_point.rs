use crate::syntax::{SourceTree, SourceTreeProvider, StatementList};
use std::fmt;

/// Method key that addresses the top-level statements of a file
pub const GLOBAL_METHOD_KEY: &str = "Global";

/// Where a method key's changes go, decided once per run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryPoint {
    TopLevel,
    Method(String),
}

impl EntryPoint {
    /// Pick the strategy for `key` against the initial snapshot
    ///
    /// `None` when the file declares no such method. `Global` falls back to
    /// `Main` for files without top-level statements.
    #[must_use]
    pub fn select(provider: &dyn SourceTreeProvider, tree: &SourceTree, key: &str) -> Option<Self> {
        if key != GLOBAL_METHOD_KEY {
            return provider
                .find_method(tree, key)
                .map(|_| Self::Method(key.to_string()));
        }

        if provider.top_level_statements(tree).is_empty() && provider.find_method(tree, "Main").is_some() {
            log::debug!("no top-level statements, using Main");
            return Some(Self::Method("Main".to_string()));
        }
        Some(Self::TopLevel)
    }

    /// Re-locate the statement list in a (possibly newer) snapshot
    #[must_use]
    pub fn locate(&self, provider: &dyn SourceTreeProvider, tree: &SourceTree) -> Option<StatementList> {
        match self {
            Self::TopLevel => Some(provider.top_level_statements(tree)),
            Self::Method(name) => provider.find_method(tree, name),
        }
    }
}

impl fmt::Display for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TopLevel => f.write_str(GLOBAL_METHOD_KEY),
            Self::Method(name) => f.write_str(name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::CSharpSyntax;

    const STARTUP: &str = "public class Startup\n{\n    public void ConfigureServices(IServiceCollection services)\n    {\n        services.AddControllers();\n    }\n}\n";

    #[test]
    fn test_named_method_selection() {
        let syntax = CSharpSyntax::new();
        let tree = syntax.parse(STARTUP).unwrap();
        assert_eq!(
            EntryPoint::select(&syntax, &tree, "ConfigureServices"),
            Some(EntryPoint::Method("ConfigureServices".to_string()))
        );
        assert_eq!(EntryPoint::select(&syntax, &tree, "Configure"), None);
    }

    #[test]
    fn test_global_falls_back_to_main() {
        let syntax = CSharpSyntax::new();
        let tree = syntax
            .parse("class Program\n{\n    static void Main(string[] args)\n    {\n        var builder = WebApplication.CreateBuilder(args);\n    }\n}\n")
            .unwrap();
        let entry = EntryPoint::select(&syntax, &tree, GLOBAL_METHOD_KEY).unwrap();
        assert_eq!(entry, EntryPoint::Method("Main".to_string()));
        assert_eq!(entry.locate(&syntax, &tree).unwrap().len(), 1);
    }

    #[test]
    fn test_global_with_top_level_statements() {
        let syntax = CSharpSyntax::new();
        let tree = syntax.parse("var app = builder.Build();\napp.Run();\n").unwrap();
        let entry = EntryPoint::select(&syntax, &tree, GLOBAL_METHOD_KEY).unwrap();
        assert_eq!(entry, EntryPoint::TopLevel);
        assert_eq!(entry.to_string(), "Global");
    }
}
