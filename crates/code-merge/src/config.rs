use crate::identifiers::HostBinding;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for a merge run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    /// Report missing package references instead of failing
    pub ide_mode: bool,

    /// Log anchor fallbacks at warn level
    pub strict_anchors: bool,

    /// Largest target file accepted, in bytes
    pub max_file_size: u64,

    /// Host objects to discover in the target file
    pub host_bindings: Vec<HostBinding>,

    /// Directory whose `<scenario>.json` / `<scenario>.toml` override embedded specs
    pub spec_dir: Option<PathBuf>,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            ide_mode: false,
            strict_anchors: false,
            max_file_size: 1024 * 1024,
            host_bindings: HostBinding::defaults(),
            spec_dir: None,
        }
    }
}

impl MergeConfig {
    /// Command-line runs: missing packages are fatal
    pub fn for_cli() -> Self {
        Self::default()
    }

    /// IDE runs: missing packages become diagnostics
    pub fn for_ide() -> Self {
        Self {
            ide_mode: true,
            ..Default::default()
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.max_file_size == 0 {
            return Err("max_file_size must be > 0".to_string());
        }

        for binding in &self.host_bindings {
            if binding.placeholder.trim().is_empty() || binding.construction.trim().is_empty() {
                return Err(format!(
                    "host binding '{}' needs both placeholder and construction",
                    binding.placeholder
                ));
            }
        }

        Ok(())
    }
}
