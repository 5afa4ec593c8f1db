use crate::anchor::{Edge, Resolution};
use crate::error::{MergeError, Result};
use crate::model::LeadingTrivia;
use crate::syntax::{line_end, line_start, normalize_using, SourceTree, SourceTreeProvider, StatementList};
use std::collections::BTreeSet;

/// Performs structural inserts and yields new snapshots
#[derive(Clone, Copy)]
pub struct ChangeApplier<'p> {
    provider: &'p dyn SourceTreeProvider,
}

impl<'p> ChangeApplier<'p> {
    #[must_use]
    pub fn new(provider: &'p dyn SourceTreeProvider) -> Self {
        Self { provider }
    }

    /// Insert `block` into `list` at the resolved position
    pub fn insert(
        &self,
        tree: &SourceTree,
        list: &StatementList,
        resolution: &Resolution,
        block: &str,
        trivia: &LeadingTrivia,
    ) -> Result<SourceTree> {
        let text = tree.text();
        let nl = tree.newline();
        let indent = trivia
            .spaces
            .map_or_else(|| list.indent(), |n| " ".repeat(n));
        let body = indent_block(block, &indent, nl);
        let lead = if trivia.newline { nl } else { "" };
        let span = list.span();

        let (offset, inserted, replace_span) = if list.is_empty() {
            let content = &text[span.clone()];
            if !list.is_braced() {
                let sep = if text.is_empty() || text.ends_with('\n') { "" } else { nl };
                (span.start, format!("{sep}{lead}{body}{nl}"), false)
            } else if content.trim().is_empty() {
                let close = format!("{nl}{}", list.brace_indent());
                (span.start, format!("{nl}{lead}{body}{close}"), true)
            } else {
                (span.start + content.trim_end().len(), format!("{nl}{lead}{body}"), false)
            }
        } else if resolution.edge == Edge::Before {
            let statement = &list.statements()[resolution.position.min(list.len() - 1)];
            let start = statement.range().start;
            let line = line_start(text, start);
            if text[line..start].trim().is_empty() {
                let blank_above = text[..line].ends_with("\n\n") || text[..line].ends_with("\n\r\n");
                let lead = if blank_above { "" } else { lead };
                (line, format!("{lead}{body}{nl}"), false)
            } else {
                (start, format!("{} ", body.trim_start()), false)
            }
        } else {
            let index = resolution.position.clamp(1, list.len()) - 1;
            let end = list.statements()[index].range().end;
            let eol = line_end(text, end);
            let rest = text[end..eol].trim_start();
            let at = if rest.is_empty() || rest.starts_with("//") { eol } else { end };
            (at, format!("{nl}{lead}{body}"), false)
        };

        let offset = offset.clamp(span.start, span.end);
        let content = if replace_span {
            inserted
        } else {
            format!("{}{inserted}{}", &text[span.start..offset], &text[offset..span.end])
        };

        let updated = self.provider.replace_statement_list(tree, list, &content)?;
        if !tree.has_syntax_errors() && updated.has_syntax_errors() {
            return Err(MergeError::Malformed(
                block.trim().lines().next().unwrap_or_default().to_string(),
            ));
        }
        Ok(updated)
    }

    /// Ensure every namespace in `namespaces` has a `using` directive
    ///
    /// Returns the new snapshot and the number of directives added.
    pub fn merge_usings(&self, tree: &SourceTree, namespaces: &[&str]) -> Result<(SourceTree, usize)> {
        let existing = self.provider.using_directives(tree);
        let mut present: BTreeSet<String> = existing.iter().map(|u| u.name.clone()).collect();

        let missing: Vec<String> = namespaces
            .iter()
            .map(|ns| normalize_using(ns))
            .filter(|ns| !ns.is_empty() && present.insert(ns.clone()))
            .collect();
        if missing.is_empty() {
            return Ok((tree.clone(), 0));
        }

        let nl = tree.newline();
        let lines = missing
            .iter()
            .map(|ns| format!("using {ns};"))
            .collect::<Vec<_>>()
            .join(nl);

        let updated = match existing.last() {
            Some(last) => {
                let at = line_end(tree.text(), last.range.end);
                self.provider.splice(tree, at..at, &format!("{nl}{lines}"))?
            }
            None => self.provider.splice(tree, 0..0, &format!("{lines}{nl}{nl}"))?,
        };
        Ok((updated, missing.len()))
    }
}

/// Re-indent a block: strip its common indentation, prefix every non-empty line
fn indent_block(block: &str, indent: &str, nl: &str) -> String {
    let lines: Vec<&str> = block
        .trim_matches(|c| c == '\n' || c == '\r')
        .lines()
        .map(|l| l.trim_end_matches('\r').trim_end())
        .collect();

    let common = lines
        .iter()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.len() - l.trim_start_matches([' ', '\t']).len())
        .min()
        .unwrap_or(0);

    lines
        .iter()
        .map(|l| {
            if l.trim().is_empty() {
                String::new()
            } else {
                format!("{indent}{}", &l[common..])
            }
        })
        .collect::<Vec<_>>()
        .join(nl)
}
