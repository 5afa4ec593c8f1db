use crate::error::{MergeError, Result};
use crate::signature::{tokenize, Signature};
use crate::syntax::{line_end, line_start, SourceTreeProvider, Statement, StatementList};

/// What to do with a rendered change
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// The effect is already present
    Skip,
    /// Insert this text (the whole block, or only its missing statements)
    Insert(String),
}

/// Parse a rendered block into its statements
///
/// Every significant token must belong to a statement; declarations,
/// directives and unparsable fragments are rejected.
pub fn parse_block(provider: &dyn SourceTreeProvider, block: &str) -> Result<StatementList> {
    let tree = provider.parse(block)?;
    if tree.has_syntax_errors() {
        return Err(MergeError::InvalidBlock(first_line(block)));
    }

    let list = provider.top_level_statements(&tree);
    let covered = |start: usize| {
        list.statements()
            .iter()
            .any(|s| s.range().contains(&start))
    };
    if list.is_empty() || !tokenize(block).iter().all(|t| covered(t.span.start)) {
        return Err(MergeError::InvalidBlock(first_line(block)));
    }
    Ok(list)
}

fn first_line(block: &str) -> String {
    block.trim().lines().next().unwrap_or_default().to_string()
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IdempotencyFilter;

impl IdempotencyFilter {
    /// Decide whether `block` (already rendered) still needs inserting into `scope`
    pub fn check(
        provider: &dyn SourceTreeProvider,
        scope: &StatementList,
        block: &str,
        check_block: Option<&str>,
    ) -> Result<Decision> {
        let statements = parse_block(provider, block)?;

        if let Some(check) = check_block {
            let needle = Signature::of(check);
            let present = scope.statements().iter().any(|s| s.signature().contains(&needle));
            return Ok(if present {
                Decision::Skip
            } else {
                Decision::Insert(block.trim_end().to_string())
            });
        }

        let present: Vec<bool> = statements
            .statements()
            .iter()
            .map(|candidate| contains_shape(scope, candidate.signature()))
            .collect();
        let found = present.iter().filter(|p| **p).count();

        if found == present.len() {
            return Ok(Decision::Skip);
        }
        if found == 0 {
            return Ok(Decision::Insert(block.trim_end().to_string()));
        }

        log::debug!("{found} of {} statements already present", present.len());
        Ok(Decision::Insert(missing_text(block, statements.statements(), &present)))
    }
}

/// Template text of the missing statements
///
/// Consecutive missing statements keep the comments and blank lines between
/// them; separate runs are joined by a newline.
fn missing_text(block: &str, statements: &[Statement], present: &[bool]) -> String {
    let mut runs = Vec::new();
    let mut index = 0;
    while index < statements.len() {
        if present[index] {
            index += 1;
            continue;
        }
        let first = index;
        while index < statements.len() && !present[index] {
            index += 1;
        }

        let start = statements[first].range().start;
        let after_previous = match first.checked_sub(1) {
            Some(previous) => line_end(block, statements[previous].range().end).min(start),
            None => 0,
        };
        let rest = &block[after_previous..];
        let content = after_previous + rest.len() - rest.trim_start().len();
        let from = line_start(block, content).max(after_previous);
        runs.push(&block[from..statements[index - 1].range().end]);
    }
    runs.join("\n")
}

/// True when some statement of the scope, at any nesting depth, has this shape
fn contains_shape(scope: &StatementList, signature: &Signature) -> bool {
    scope.statements().iter().any(|s| {
        s.signature().same_shape(signature) || s.body().is_some_and(|b| contains_shape(b, signature))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::CSharpSyntax;

    fn scope(source: &str) -> StatementList {
        let syntax = CSharpSyntax::new();
        syntax.top_level_statements(&syntax.parse(source).unwrap())
    }

    const PROGRAM: &str = r#"var builder = WebApplication.CreateBuilder(args);
builder.Services.AddRazorPages();   // pages
var app = builder.Build();
if (app.Environment.IsDevelopment())
{
    app.UseMigrationsEndPoint();
}
app.Run();
"#;

    #[test]
    fn test_present_statement_is_skipped_despite_formatting() {
        let decision = IdempotencyFilter::check(
            &CSharpSyntax::new(),
            &scope(PROGRAM),
            "builder.Services\n    .AddRazorPages( );",
            None,
        )
        .unwrap();
        assert_eq!(decision, Decision::Skip);
    }

    #[test]
    fn test_nested_statement_counts_as_present() {
        let decision = IdempotencyFilter::check(
            &CSharpSyntax::new(),
            &scope(PROGRAM),
            "app.UseMigrationsEndPoint();",
            None,
        )
        .unwrap();
        assert_eq!(decision, Decision::Skip);
    }

    #[test]
    fn test_only_missing_statements_are_inserted() {
        let decision = IdempotencyFilter::check(
            &CSharpSyntax::new(),
            &scope(PROGRAM),
            "builder.Services.AddRazorPages();\nbuilder.Services.AddControllers();",
            None,
        )
        .unwrap();
        assert_eq!(decision, Decision::Insert("builder.Services.AddControllers();".to_string()));
    }

    #[test]
    fn test_partial_insert_keeps_template_trivia() {
        let block = "builder.Services.AddRazorPages();   // pages\n\n// data\nbuilder.Services.AddDbContext<BlogContext>();\n\nbuilder.Services.AddControllers();\n";
        let decision = IdempotencyFilter::check(&CSharpSyntax::new(), &scope(PROGRAM), block, None).unwrap();
        assert_eq!(
            decision,
            Decision::Insert(
                "// data\nbuilder.Services.AddDbContext<BlogContext>();\n\nbuilder.Services.AddControllers();".to_string()
            )
        );
    }

    #[test]
    fn test_check_block_containment() {
        let syntax = CSharpSyntax::new();
        let skip = IdempotencyFilter::check(
            &syntax,
            &scope(PROGRAM),
            "builder.Services.AddRazorPages(o => o.Conventions.Clear());",
            Some("AddRazorPages"),
        )
        .unwrap();
        assert_eq!(skip, Decision::Skip);

        let insert = IdempotencyFilter::check(&syntax, &scope(PROGRAM), "app.MapRazorPages();\n", Some("MapRazorPages"))
            .unwrap();
        assert_eq!(insert, Decision::Insert("app.MapRazorPages();".to_string()));
    }

    #[test]
    fn test_non_statement_block_is_rejected() {
        let syntax = CSharpSyntax::new();
        let err = IdempotencyFilter::check(&syntax, &scope(PROGRAM), "public class Extra { }", None).unwrap_err();
        assert!(matches!(err, MergeError::InvalidBlock(_)));

        let err = parse_block(&syntax, "app.Use(;").unwrap_err();
        assert!(matches!(err, MergeError::InvalidBlock(_)));
    }
}
