use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use scaffold_code_merge::MergeConfig;
use std::fs;
use std::path::Path;

/// Per-project configuration file read from the project root
pub const CONFIG_FILE_NAME: &str = "scaffold.toml";

static PACKAGE_REFERENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)<PackageReference\s+[^>]*\bInclude\s*=\s*"(?P<id>[^"]+)""#)
        .expect("PackageReference pattern must compile")
});

/// Package ids referenced by the `*.csproj` files at the project root
pub fn package_references(project_dir: &Path) -> Result<Vec<String>> {
    let entries = fs::read_dir(project_dir)
        .with_context(|| format!("Cannot read project directory {}", project_dir.display()))?;

    let mut packages = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.extension().is_some_and(|ext| ext == "csproj") {
            let text = fs::read_to_string(&path)
                .with_context(|| format!("Cannot read {}", path.display()))?;
            packages.extend(
                PACKAGE_REFERENCE
                    .captures_iter(&text)
                    .map(|caps| caps["id"].to_string()),
            );
        }
    }
    packages.sort();
    packages.dedup();
    log::debug!("{} package references", packages.len());
    Ok(packages)
}

/// `scaffold.toml` when present, defaults otherwise
pub fn load_config(project_dir: &Path) -> Result<MergeConfig> {
    let path = project_dir.join(CONFIG_FILE_NAME);
    if !path.is_file() {
        return Ok(MergeConfig::for_cli());
    }
    let text = fs::read_to_string(&path).with_context(|| format!("Cannot read {}", path.display()))?;
    let config: MergeConfig =
        toml::from_str(&text).with_context(|| format!("Invalid config {}", path.display()))?;
    log::debug!("config from {}", path.display());
    Ok(config)
}
