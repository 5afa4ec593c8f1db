//! Declarative change specifications.
//!
//! A specification is loaded once per scenario and never mutated; the merge
//! engine only reads it. Keys are accepted in camelCase and PascalCase.

use crate::error::{MergeError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Everything a scenario inserts, grouped by target file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChangeSpecification {
    #[serde(alias = "Files")]
    pub files: Vec<FileDescriptor>,

    /// Base type an existing context class must derive from
    #[serde(alias = "ContextBase", skip_serializing_if = "Option::is_none")]
    pub context_base: Option<String>,

    /// Base type an existing user class must derive from
    #[serde(alias = "UserBase", skip_serializing_if = "Option::is_none")]
    pub user_base: Option<String>,
}

impl ChangeSpecification {
    /// Parse a JSON specification
    pub fn from_json(text: &str) -> Result<Self> {
        let spec: Self = serde_json::from_str(text)
            .map_err(|e| MergeError::spec(format!("invalid JSON specification: {e}")))?;
        spec.validate()?;
        Ok(spec)
    }

    /// Parse a TOML specification
    pub fn from_toml(text: &str) -> Result<Self> {
        let spec: Self = toml::from_str(text)
            .map_err(|e| MergeError::spec(format!("invalid TOML specification: {e}")))?;
        spec.validate()?;
        Ok(spec)
    }

    /// Reject descriptors the engine cannot act on
    pub fn validate(&self) -> Result<()> {
        for file in &self.files {
            if file.file_name.trim().is_empty() {
                return Err(MergeError::spec("file descriptor without fileName"));
            }
            for (method, changes) in &file.methods {
                for (index, change) in changes.code_changes.iter().enumerate() {
                    if change.block.trim().is_empty() {
                        return Err(MergeError::spec(format!(
                            "{} [{method}] change #{index}: empty block",
                            file.file_name
                        )));
                    }
                    if change.insert_after.is_some() && change.insert_before.is_some() {
                        return Err(MergeError::spec(format!(
                            "{} [{method}] change #{index}: insertAfter and insertBefore are exclusive",
                            file.file_name
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Package ids required by any descriptor, deduplicated
    #[must_use]
    pub fn required_packages(&self) -> BTreeSet<&str> {
        self.files
            .iter()
            .flat_map(|f| f.required_packages.iter().map(String::as_str))
            .collect()
    }
}

/// Changes for one target file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FileDescriptor {
    #[serde(alias = "FileName")]
    pub file_name: String,

    #[serde(alias = "Usings")]
    pub usings: Vec<UsingSpec>,

    #[serde(alias = "RequiredPackages")]
    pub required_packages: Vec<String>,

    /// Method key (`"Global"` or a method name) to its ordered changes
    #[serde(alias = "Methods")]
    pub methods: BTreeMap<String, MethodChanges>,
}

/// A namespace to ensure present, optionally gated by scenario flags
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UsingSpec {
    Plain(String),
    Gated {
        #[serde(alias = "Name")]
        name: String,
        #[serde(default, alias = "Options")]
        options: Vec<String>,
    },
}

impl UsingSpec {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Plain(name) | Self::Gated { name, .. } => name,
        }
    }

    #[must_use]
    pub fn applies_to(&self, flags: &ScenarioFlags) -> bool {
        match self {
            Self::Plain(_) => true,
            Self::Gated { options, .. } => flags.admits(options),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MethodChanges {
    #[serde(alias = "CodeChanges")]
    pub code_changes: Vec<CodeChange>,
}

/// One declarative insertion
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CodeChange {
    /// Template source text, may contain token families
    #[serde(alias = "Block")]
    pub block: String,

    /// Statement whose first nested block receives the change
    #[serde(alias = "Parent", skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,

    #[serde(alias = "InsertAfter", skip_serializing_if = "Option::is_none")]
    pub insert_after: Option<String>,

    #[serde(alias = "InsertBefore", skip_serializing_if = "Option::is_none")]
    pub insert_before: Option<String>,

    /// Snippet whose presence means the change already happened
    #[serde(alias = "CheckBlock", skip_serializing_if = "Option::is_none")]
    pub check_block: Option<String>,

    #[serde(alias = "LeadingTrivia")]
    pub leading_trivia: LeadingTrivia,

    /// Feature-flag gate; `!flag` requires the flag to be absent
    #[serde(alias = "Options")]
    pub options: Vec<String>,
}

impl CodeChange {
    #[must_use]
    pub fn applies_to(&self, flags: &ScenarioFlags) -> bool {
        flags.admits(&self.options)
    }

    /// Human-readable anchor description for diagnostics
    #[must_use]
    pub fn anchor_label(&self) -> &str {
        self.insert_after
            .as_deref()
            .or(self.insert_before.as_deref())
            .unwrap_or("<end>")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LeadingTrivia {
    /// Indentation width; the neighbouring statements' indentation when absent
    #[serde(
        alias = "Spaces",
        alias = "numberOfSpaces",
        alias = "NumberOfSpaces",
        skip_serializing_if = "Option::is_none"
    )]
    pub spaces: Option<usize>,

    /// Emit a blank line before the block
    #[serde(alias = "Newline", alias = "NewLine")]
    pub newline: bool,
}

/// Feature flags active for one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScenarioFlags(BTreeSet<String>);

impl ScenarioFlags {
    pub fn new<I, S>(flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(flags.into_iter().map(Into::into).collect())
    }

    pub fn insert(&mut self, flag: impl Into<String>) {
        self.0.insert(flag.into());
    }

    #[must_use]
    pub fn contains(&self, flag: &str) -> bool {
        self.0.contains(flag)
    }

    /// True when every gate entry holds
    #[must_use]
    pub fn admits(&self, gate: &[String]) -> bool {
        gate.iter().all(|entry| match entry.strip_prefix('!') {
            Some(absent) => !self.contains(absent),
            None => self.contains(entry),
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}
