use crate::error::{MergeError, Result};
use crate::signature::Signature;
use std::fmt;
use std::ops::Range;
use std::sync::Arc;
use tree_sitter::{Node, Parser, Tree};

/// Immutable snapshot of a parsed C# file
///
/// Edits never touch a snapshot; every edit goes through a
/// [`SourceTreeProvider`] and yields a new one.
#[derive(Clone)]
pub struct SourceTree {
    text: Arc<str>,
    tree: Tree,
}

impl SourceTree {
    /// Full source text of this snapshot
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// True when the parser had to recover from syntax errors
    #[must_use]
    pub fn has_syntax_errors(&self) -> bool {
        self.tree.root_node().has_error()
    }

    /// Newline convention of the file (`\r\n` when the file uses it)
    #[must_use]
    pub fn newline(&self) -> &'static str {
        if self.text.contains("\r\n") {
            "\r\n"
        } else {
            "\n"
        }
    }

    fn root(&self) -> Node<'_> {
        self.tree.root_node()
    }

    fn slice(&self, node: Node<'_>) -> &str {
        &self.text[node.start_byte()..node.end_byte()]
    }
}

impl fmt::Debug for SourceTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceTree")
            .field("bytes", &self.text.len())
            .field("has_syntax_errors", &self.has_syntax_errors())
            .finish()
    }
}

/// Where a statement list lives in its file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListScope {
    /// Top-level statements of the compilation unit
    TopLevel,
    /// Body block of the named method
    Method(String),
    /// First block nested inside another statement
    Nested,
}

/// A single statement with its location and signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    range: Range<usize>,
    text: String,
    indent: String,
    signature: Signature,
    body: Option<StatementList>,
}

impl Statement {
    #[must_use]
    pub fn range(&self) -> Range<usize> {
        self.range.clone()
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Leading whitespace of the statement's line, empty when other code precedes it
    #[must_use]
    pub fn indent(&self) -> &str {
        &self.indent
    }

    #[must_use]
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Statements of the first block nested inside this statement
    #[must_use]
    pub fn body(&self) -> Option<&StatementList> {
        self.body.as_ref()
    }
}

/// Ordered statements of one scope plus the editable span that holds them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementList {
    scope: ListScope,
    span: Range<usize>,
    braced: bool,
    brace_indent: String,
    statements: Vec<Statement>,
}

impl StatementList {
    #[must_use]
    pub fn scope(&self) -> &ListScope {
        &self.scope
    }

    /// Byte span replaced by [`SourceTreeProvider::replace_statement_list`]
    #[must_use]
    pub fn span(&self) -> Range<usize> {
        self.span.clone()
    }

    /// True for lists enclosed in `{ }`
    #[must_use]
    pub fn is_braced(&self) -> bool {
        self.braced
    }

    /// Indentation of the line holding the opening brace
    #[must_use]
    pub fn brace_indent(&self) -> &str {
        &self.brace_indent
    }

    #[must_use]
    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.statements.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// Indentation used by the statements of this list
    #[must_use]
    pub fn indent(&self) -> String {
        if let Some(first) = self.statements.iter().find(|s| !s.indent.is_empty()) {
            return first.indent.clone();
        }
        if self.braced {
            format!("{}    ", self.brace_indent)
        } else {
            String::new()
        }
    }
}

/// A `using` directive of the compilation unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsingDirective {
    pub range: Range<usize>,
    /// Namespace (or `static X` / `A = B`) without `global`, `using` and `;`
    pub name: String,
}

/// Normalize a directive or a bare namespace to the form stored in [`UsingDirective::name`]
#[must_use]
pub fn normalize_using(text: &str) -> String {
    let mut rest = text.trim();
    rest = rest
        .strip_prefix("global")
        .filter(|r| r.starts_with(char::is_whitespace))
        .map_or(rest, str::trim_start);
    rest = rest.strip_prefix("using ").map_or(rest, str::trim_start);
    rest = rest.trim_end().trim_end_matches(';').trim_end();
    rest.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Structural access to a target file
pub trait SourceTreeProvider: Send + Sync {
    /// Parse source text into a snapshot
    fn parse(&self, text: &str) -> Result<SourceTree>;

    /// Source text of a snapshot
    fn serialize(&self, tree: &SourceTree) -> String {
        tree.text().to_string()
    }

    /// Body statements of the named method, if the file declares it
    fn find_method(&self, tree: &SourceTree, name: &str) -> Option<StatementList>;

    /// Top-level statements of the compilation unit
    fn top_level_statements(&self, tree: &SourceTree) -> StatementList;

    /// Replace the span of `old` with `content`, yielding a new snapshot
    fn replace_statement_list(
        &self,
        tree: &SourceTree,
        old: &StatementList,
        content: &str,
    ) -> Result<SourceTree>;

    /// `using` directives of the compilation unit, in file order
    fn using_directives(&self, tree: &SourceTree) -> Vec<UsingDirective>;

    /// Replace an arbitrary byte range, yielding a new snapshot
    fn splice(&self, tree: &SourceTree, range: Range<usize>, text: &str) -> Result<SourceTree>;
}

/// Tree-sitter backed provider for C# sources
#[derive(Debug, Clone, Copy, Default)]
pub struct CSharpSyntax;

impl CSharpSyntax {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn parser() -> Result<Parser> {
        let language: tree_sitter::Language = tree_sitter_c_sharp::LANGUAGE.into();
        let mut parser = Parser::new();
        parser
            .set_language(&language)
            .map_err(|e| MergeError::tree_sitter(format!("Failed to set language: {e}")))?;
        Ok(parser)
    }

    /// Class-like declarations of a snapshot: (qualified name, first base type)
    pub(crate) fn type_declarations(&self, tree: &SourceTree) -> Vec<(String, Option<String>)> {
        let root = tree.root();
        let file_namespace = named_children(root)
            .into_iter()
            .find(|n| n.kind() == "file_scoped_namespace_declaration")
            .and_then(|n| n.child_by_field_name("name"))
            .map(|n| tree.slice(n).to_string());

        let mut nodes = Vec::new();
        collect(root, &mut nodes, &|n| {
            matches!(n.kind(), "class_declaration" | "record_declaration")
        });

        nodes
            .into_iter()
            .filter_map(|node| {
                let name = tree.slice(node.child_by_field_name("name")?).to_string();
                let mut scopes = vec![name];
                let mut parent = node.parent();
                while let Some(p) = parent {
                    let is_scope = matches!(
                        p.kind(),
                        "class_declaration" | "record_declaration" | "namespace_declaration"
                    );
                    if is_scope {
                        if let Some(n) = p.child_by_field_name("name") {
                            scopes.push(tree.slice(n).to_string());
                        }
                    }
                    parent = p.parent();
                }
                if let Some(ns) = &file_namespace {
                    scopes.push(ns.clone());
                }
                scopes.reverse();

                let base = named_children(node)
                    .into_iter()
                    .find(|n| n.kind() == "base_list")
                    .and_then(|list| named_children(list).into_iter().next())
                    .map(|n| {
                        let text = tree.slice(n);
                        text.split('(').next().unwrap_or(text).trim().to_string()
                    });

                Some((scopes.join("."), base))
            })
            .collect()
    }

    fn block_list(tree: &SourceTree, block: Node<'_>, scope: ListScope) -> StatementList {
        let statements = named_children(block)
            .into_iter()
            .filter(|n| is_statement(*n))
            .map(|n| Self::statement(tree, n))
            .collect();

        let start = (block.start_byte() + 1).min(block.end_byte());
        let end = block.end_byte().saturating_sub(1).max(start);
        StatementList {
            scope,
            span: start..end,
            braced: true,
            brace_indent: line_indent(tree.text(), block.start_byte()),
            statements,
        }
    }

    fn statement(tree: &SourceTree, node: Node<'_>) -> Statement {
        let text = tree.slice(node).to_string();
        let body = first_block(node).map(|b| Self::block_list(tree, b, ListScope::Nested));
        Statement {
            range: node.start_byte()..node.end_byte(),
            signature: Signature::of(&text),
            indent: statement_indent(tree.text(), node.start_byte()),
            text,
            body,
        }
    }
}

impl SourceTreeProvider for CSharpSyntax {
    fn parse(&self, text: &str) -> Result<SourceTree> {
        let tree = Self::parser()?
            .parse(text, None)
            .ok_or_else(|| MergeError::parse("Failed to parse source code"))?;
        Ok(SourceTree {
            text: Arc::from(text),
            tree,
        })
    }

    fn find_method(&self, tree: &SourceTree, name: &str) -> Option<StatementList> {
        let mut methods = Vec::new();
        collect(tree.root(), &mut methods, &|n| {
            matches!(n.kind(), "method_declaration" | "local_function_statement")
        });

        methods.into_iter().find_map(|method| {
            let declared = method.child_by_field_name("name")?;
            if tree.slice(declared) != name {
                return None;
            }
            let body = method.child_by_field_name("body")?;
            (body.kind() == "block")
                .then(|| Self::block_list(tree, body, ListScope::Method(name.to_string())))
        })
    }

    fn top_level_statements(&self, tree: &SourceTree) -> StatementList {
        let statements: Vec<Statement> = named_children(tree.root())
            .into_iter()
            .filter(|n| n.kind() == "global_statement")
            .map(|n| Self::statement(tree, n))
            .collect();

        let text = tree.text();
        let start = statements
            .first()
            .map_or(text.len(), |s| line_start(text, s.range.start));
        StatementList {
            scope: ListScope::TopLevel,
            span: start..text.len(),
            braced: false,
            brace_indent: String::new(),
            statements,
        }
    }

    fn replace_statement_list(
        &self,
        tree: &SourceTree,
        old: &StatementList,
        content: &str,
    ) -> Result<SourceTree> {
        self.splice(tree, old.span(), content)
    }

    fn using_directives(&self, tree: &SourceTree) -> Vec<UsingDirective> {
        named_children(tree.root())
            .into_iter()
            .filter(|n| n.kind() == "using_directive")
            .map(|n| UsingDirective {
                range: n.start_byte()..n.end_byte(),
                name: normalize_using(tree.slice(n)),
            })
            .collect()
    }

    fn splice(&self, tree: &SourceTree, range: Range<usize>, text: &str) -> Result<SourceTree> {
        let source = tree.text();
        if range.start > range.end
            || range.end > source.len()
            || !source.is_char_boundary(range.start)
            || !source.is_char_boundary(range.end)
        {
            return Err(MergeError::parse(format!(
                "edit range {}..{} outside of {} byte source",
                range.start,
                range.end,
                source.len()
            )));
        }

        let mut edited = String::with_capacity(source.len() + text.len());
        edited.push_str(&source[..range.start]);
        edited.push_str(text);
        edited.push_str(&source[range.end..]);
        self.parse(&edited)
    }
}

fn named_children(node: Node<'_>) -> Vec<Node<'_>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor).collect()
}

fn collect<'t>(node: Node<'t>, out: &mut Vec<Node<'t>>, pred: &dyn Fn(Node<'t>) -> bool) {
    for child in named_children(node) {
        if pred(child) {
            out.push(child);
        }
        collect(child, out, pred);
    }
}

fn is_statement(node: Node<'_>) -> bool {
    let kind = node.kind();
    kind != "comment" && !kind.starts_with("preproc")
}

/// First `block` below a statement in pre-order (if/else bodies, lambda bodies)
fn first_block(node: Node<'_>) -> Option<Node<'_>> {
    for child in named_children(node) {
        if child.kind() == "block" {
            return Some(child);
        }
        if let Some(found) = first_block(child) {
            return Some(found);
        }
    }
    None
}

pub(crate) fn line_start(text: &str, at: usize) -> usize {
    text[..at].rfind('\n').map_or(0, |i| i + 1)
}

/// Byte offset of the end of the line containing `at`, before any `\r\n`
pub(crate) fn line_end(text: &str, at: usize) -> usize {
    let end = text[at..].find('\n').map_or(text.len(), |i| at + i);
    if end > at && text.as_bytes()[end - 1] == b'\r' {
        end - 1
    } else {
        end
    }
}

fn line_indent(text: &str, at: usize) -> String {
    let start = line_start(text, at);
    text[start..at]
        .chars()
        .take_while(|c| *c == ' ' || *c == '\t')
        .collect()
}

fn statement_indent(text: &str, at: usize) -> String {
    let start = line_start(text, at);
    let prefix = &text[start..at];
    if prefix.chars().all(|c| c == ' ' || c == '\t') {
        prefix.to_string()
    } else {
        String::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOP_LEVEL: &str = "using Microsoft.EntityFrameworkCore;\n\nvar builder = WebApplication.CreateBuilder(args);\n// services\nbuilder.Services.AddRazorPages();\nvar app = builder.Build();\napp.Run();\n";

    const CLASSIC: &str = r#"namespace Demo
{
    public class Program
    {
        public static void Main(string[] args)
        {
            var builder = WebApplication.CreateBuilder(args);
            if (args.Length > 0)
            {
                builder.Services.AddRazorPages();
            }
            builder.Build().Run();
        }
    }
}
"#;

    #[test]
    fn test_grammar_abi_is_supported_by_runtime() {
        let language: tree_sitter::Language = tree_sitter_c_sharp::LANGUAGE.into();
        let supported = tree_sitter::MIN_COMPATIBLE_LANGUAGE_VERSION..=tree_sitter::LANGUAGE_VERSION;
        assert!(supported.contains(&language.version()), "grammar ABI {}", language.version());
        assert!(CSharpSyntax::parser().is_ok());
    }

    #[test]
    fn test_top_level_statements_skip_comments_and_usings() {
        let syntax = CSharpSyntax::new();
        let tree = syntax.parse(TOP_LEVEL).unwrap();
        assert!(!tree.has_syntax_errors());

        let list = syntax.top_level_statements(&tree);
        assert_eq!(list.scope(), &ListScope::TopLevel);
        let texts: Vec<_> = list.statements().iter().map(Statement::text).collect();
        assert_eq!(
            texts,
            vec![
                "var builder = WebApplication.CreateBuilder(args);",
                "builder.Services.AddRazorPages();",
                "var app = builder.Build();",
                "app.Run();",
            ]
        );
        assert_eq!(list.span().end, TOP_LEVEL.len());
    }

    #[test]
    fn test_find_method_body() {
        let syntax = CSharpSyntax::new();
        let tree = syntax.parse(CLASSIC).unwrap();

        let list = syntax.find_method(&tree, "Main").expect("Main body");
        assert_eq!(list.scope(), &ListScope::Method("Main".to_string()));
        assert_eq!(list.len(), 3);
        assert_eq!(list.indent(), "            ");
        assert_eq!(list.brace_indent(), "        ");

        let nested = list.statements()[1].body().expect("if body");
        assert_eq!(nested.len(), 1);
        assert_eq!(nested.statements()[0].text(), "builder.Services.AddRazorPages();");

        assert!(syntax.find_method(&tree, "Configure").is_none());
    }

    #[test]
    fn test_using_directives_are_normalized() {
        let syntax = CSharpSyntax::new();
        let tree = syntax
            .parse("global using System.Text;\nusing static System.Math;\nusing Microsoft.EntityFrameworkCore;\n")
            .unwrap();
        let names: Vec<_> = syntax
            .using_directives(&tree)
            .into_iter()
            .map(|u| u.name)
            .collect();
        assert_eq!(
            names,
            vec!["System.Text", "static System.Math", "Microsoft.EntityFrameworkCore"]
        );
        assert_eq!(normalize_using("Microsoft.AspNetCore.Identity"), "Microsoft.AspNetCore.Identity");
    }

    #[test]
    fn test_splice_yields_new_snapshot() {
        let syntax = CSharpSyntax::new();
        let tree = syntax.parse("app.Run();\n").unwrap();
        let edited = syntax.splice(&tree, 0..0, "app.UseRouting();\n").unwrap();

        assert_eq!(tree.text(), "app.Run();\n");
        assert_eq!(edited.text(), "app.UseRouting();\napp.Run();\n");
        assert!(syntax.splice(&tree, 5..100, "").is_err());
    }

    #[test]
    fn test_type_declarations_carry_namespace_and_base() {
        let syntax = CSharpSyntax::new();
        let tree = syntax
            .parse("namespace Shop.Data;\n\npublic class ShopContext : IdentityDbContext<ShopUser>\n{\n}\n\npublic class ShopUser : IdentityUser { }\n")
            .unwrap();
        let types = syntax.type_declarations(&tree);
        assert!(types.contains(&(
            "Shop.Data.ShopContext".to_string(),
            Some("IdentityDbContext<ShopUser>".to_string())
        )));
        assert!(types.contains(&("Shop.Data.ShopUser".to_string(), Some("IdentityUser".to_string()))));
    }

    #[test]
    fn test_line_helpers() {
        let text = "a();\r\n  b();\r\n";
        assert_eq!(line_end(text, 0), 4);
        assert_eq!(line_start(text, 8), 6);
        assert_eq!(statement_indent(text, 8), "  ");
    }
}
