use anyhow::Result;
use scaffold_code_merge::MergeOutcome;
use std::path::Path;

/// Print the outcome as one line per file, diagnostics after
pub fn print_summary(outcome: &MergeOutcome, project_dir: &Path) {
    for file in &outcome.files {
        let shown = file.path.strip_prefix(project_dir).unwrap_or(&file.path);
        let verb = if file.changed { "updated" } else { "unchanged" };
        println!(
            "{verb} {} ({} applied, {} skipped, {} usings added)",
            shown.display(),
            file.applied,
            file.skipped,
            file.usings_added
        );
    }
    for diagnostic in &outcome.diagnostics {
        println!("note: {diagnostic}");
    }
}

pub fn print_json(outcome: &MergeOutcome) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(outcome)?);
    Ok(())
}
