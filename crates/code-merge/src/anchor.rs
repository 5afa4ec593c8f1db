use crate::error::FallbackReason;
use crate::signature::Signature;
use crate::syntax::StatementList;

/// Insertion point expression of a change
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Anchor {
    End,
    Before(Signature),
    After(Signature),
}

impl Anchor {
    /// Build from the two optional anchor strings of a change (after wins if both)
    #[must_use]
    pub fn from_parts(insert_after: Option<&str>, insert_before: Option<&str>) -> Self {
        match (insert_after, insert_before) {
            (Some(after), _) => Self::After(Signature::of(after)),
            (None, Some(before)) => Self::Before(Signature::of(before)),
            (None, None) => Self::End,
        }
    }
}

/// Which side of the resolved statement receives the text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    /// Before statement `position`
    Before,
    /// After statement `position - 1`
    After,
    /// Append to the list
    End,
}

/// Outcome of resolving an anchor against one statement list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Zero-based index the new statements take in the list
    pub position: usize,
    pub edge: Edge,
    /// The position is inside the body of the parent statement
    pub inside_parent: bool,
    /// Set when the anchor expression did not resolve and the change was redirected to the end
    pub fallback: Option<FallbackReason>,
}

/// Result of searching a list for one signature
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    Unique(usize),
    Missing,
    Ambiguous(usize),
}

/// Find the single statement whose tokens contain `signature`
#[must_use]
pub fn find_statement(list: &StatementList, signature: &Signature) -> Lookup {
    let mut matches = list
        .statements()
        .iter()
        .enumerate()
        .filter(|(_, s)| s.signature().contains(signature))
        .map(|(i, _)| i);

    match (matches.next(), matches.next()) {
        (None, _) => Lookup::Missing,
        (Some(index), None) => Lookup::Unique(index),
        (Some(_), Some(_)) => Lookup::Ambiguous(2 + matches.count()),
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AnchorResolver;

impl AnchorResolver {
    #[must_use]
    pub fn resolve(list: &StatementList, anchor: &Anchor) -> Resolution {
        let end = |fallback| Resolution {
            position: list.len(),
            edge: Edge::End,
            inside_parent: false,
            fallback,
        };

        let (signature, before) = match anchor {
            Anchor::End => return end(None),
            Anchor::Before(signature) => (signature, true),
            Anchor::After(signature) => (signature, false),
        };

        match find_statement(list, signature) {
            Lookup::Unique(index) if before => Resolution {
                position: index,
                edge: Edge::Before,
                inside_parent: false,
                fallback: None,
            },
            Lookup::Unique(index) => Resolution {
                position: index + 1,
                edge: Edge::After,
                inside_parent: false,
                fallback: None,
            },
            Lookup::Missing => end(Some(FallbackReason::NotFound)),
            Lookup::Ambiguous(count) => end(Some(FallbackReason::Ambiguous(count))),
        }
    }

    /// Resolve `anchor` inside the first block of the `parent` statement
    ///
    /// Returns the list the position refers to. An unresolved parent (or one
    /// without a block) falls back to the end of `list`.
    #[must_use]
    pub fn resolve_within(
        list: &StatementList,
        parent: Option<&Signature>,
        anchor: &Anchor,
    ) -> (StatementList, Resolution) {
        let Some(parent) = parent else {
            return (list.clone(), Self::resolve(list, anchor));
        };

        let reason = match find_statement(list, parent) {
            Lookup::Unique(index) => match list.statements()[index].body() {
                Some(body) => {
                    let resolution = Resolution {
                        inside_parent: true,
                        ..Self::resolve(body, anchor)
                    };
                    return (body.clone(), resolution);
                }
                None => FallbackReason::NoBody,
            },
            Lookup::Missing => FallbackReason::NotFound,
            Lookup::Ambiguous(count) => FallbackReason::Ambiguous(count),
        };

        let resolution = Resolution {
            position: list.len(),
            edge: Edge::End,
            inside_parent: false,
            fallback: Some(reason),
        };
        (list.clone(), resolution)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::{CSharpSyntax, SourceTreeProvider};

    fn list(source: &str) -> StatementList {
        let syntax = CSharpSyntax::new();
        let tree = syntax.parse(source).unwrap();
        syntax.top_level_statements(&tree)
    }

    const PROGRAM: &str = "var builder = WebApplication.CreateBuilder(args);\nvar app = builder.Build();\napp.UseAuthorization();\napp.Run();\n";

    #[test]
    fn test_before_and_after_positions() {
        let list = list(PROGRAM);

        let before = AnchorResolver::resolve(&list, &Anchor::from_parts(None, Some("app.UseAuthorization()")));
        assert_eq!((before.position, before.edge, before.fallback), (2, Edge::Before, None));

        let after = AnchorResolver::resolve(&list, &Anchor::from_parts(Some("builder.Build()"), None));
        assert_eq!((after.position, after.edge, after.fallback), (2, Edge::After, None));
    }

    #[test]
    fn test_missing_anchor_falls_back_to_end() {
        let list = list(PROGRAM);
        let resolution = AnchorResolver::resolve(&list, &Anchor::from_parts(None, Some("app.UseRouting()")));
        assert_eq!(resolution.position, 4);
        assert_eq!(resolution.edge, Edge::End);
        assert_eq!(resolution.fallback, Some(FallbackReason::NotFound));
    }

    #[test]
    fn test_ambiguous_anchor_is_unresolved() {
        let list = list("app.UseStaticFiles();\napp.UseStaticFiles();\napp.Run();\n");
        let signature = Signature::of("app.UseStaticFiles()");
        assert_eq!(find_statement(&list, &signature), Lookup::Ambiguous(2));

        let resolution = AnchorResolver::resolve(&list, &Anchor::After(signature));
        assert_eq!(resolution.fallback, Some(FallbackReason::Ambiguous(2)));
        assert_eq!(resolution.edge, Edge::End);
    }

    #[test]
    fn test_parent_body_becomes_scope() {
        let list = list("if (app.Environment.IsDevelopment())\n{\n    app.UseDeveloperExceptionPage();\n}\napp.Run();\n");
        let parent = Signature::of("app.Environment.IsDevelopment()");

        let (scope, resolution) = AnchorResolver::resolve_within(&list, Some(&parent), &Anchor::End);
        assert_eq!(scope.len(), 1);
        assert!(resolution.inside_parent);
        assert_eq!(resolution.position, 1);

        let missing = Signature::of("app.Environment.IsStaging()");
        let (scope, resolution) = AnchorResolver::resolve_within(&list, Some(&missing), &Anchor::End);
        assert_eq!(scope.len(), 2);
        assert!(!resolution.inside_parent);
        assert_eq!(resolution.fallback, Some(FallbackReason::NotFound));

        let flat = Signature::of("app.Run()");
        let (_, resolution) = AnchorResolver::resolve_within(&list, Some(&flat), &Anchor::End);
        assert_eq!(resolution.fallback, Some(FallbackReason::NoBody));
    }

    #[test]
    fn test_formatting_does_not_defeat_anchor() {
        let list = list("var app = builder\n    .Build( );\napp.Run();\n");
        let resolution = AnchorResolver::resolve(&list, &Anchor::from_parts(Some("builder.Build()"), None));
        assert_eq!(resolution.position, 1);
        assert!(resolution.fallback.is_none());
    }
}
