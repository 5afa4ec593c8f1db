//! Change-specification sources and the per-orchestrator scenario cache.

use crate::error::{MergeError, Result};
use crate::model::ChangeSpecification;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

const BUILTIN_IDENTITY: &str = include_str!("../resources/identity.json");
const BUILTIN_MINIMAL_API: &str = include_str!("../resources/minimal_api.json");
const BUILTIN_EF_CONTROLLER: &str = include_str!("../resources/ef_controller.json");

/// Scenario keys shipped with the engine
pub const BUILTIN_SCENARIOS: [&str; 3] = ["identity", "minimalApi", "efController"];

/// Something that can produce a specification for a scenario key
pub trait SpecSource: Send + Sync {
    /// `Ok(None)` when this source does not know the scenario
    fn load(&self, scenario: &str) -> Result<Option<ChangeSpecification>>;
}

/// Specifications compiled into the binary
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbeddedSpecs;

impl SpecSource for EmbeddedSpecs {
    fn load(&self, scenario: &str) -> Result<Option<ChangeSpecification>> {
        let raw = match scenario {
            "identity" => BUILTIN_IDENTITY,
            "minimalApi" => BUILTIN_MINIMAL_API,
            "efController" => BUILTIN_EF_CONTROLLER,
            _ => return Ok(None),
        };
        ChangeSpecification::from_json(raw).map(Some)
    }
}

/// `<dir>/<scenario>.json`, falling back to `<dir>/<scenario>.toml`
#[derive(Debug, Clone)]
pub struct DirectorySpecs {
    dir: PathBuf,
}

impl DirectorySpecs {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl SpecSource for DirectorySpecs {
    fn load(&self, scenario: &str) -> Result<Option<ChangeSpecification>> {
        let json = self.dir.join(format!("{scenario}.json"));
        if json.is_file() {
            let text = std::fs::read_to_string(&json).map_err(|e| MergeError::io(&json, e))?;
            log::debug!("specification '{scenario}' from {}", json.display());
            return ChangeSpecification::from_json(&text).map(Some);
        }

        let toml = self.dir.join(format!("{scenario}.toml"));
        if toml.is_file() {
            let text = std::fs::read_to_string(&toml).map_err(|e| MergeError::io(&toml, e))?;
            log::debug!("specification '{scenario}' from {}", toml.display());
            return ChangeSpecification::from_toml(&text).map(Some);
        }

        Ok(None)
    }
}

/// Ordered sources; the first that knows a scenario wins
#[derive(Default)]
pub struct LayeredSpecs {
    sources: Vec<Box<dyn SpecSource>>,
}

impl LayeredSpecs {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_source(mut self, source: impl SpecSource + 'static) -> Self {
        self.sources.push(Box::new(source));
        self
    }

    /// Optional override directory ahead of the embedded specs
    #[must_use]
    pub fn standard(spec_dir: Option<PathBuf>) -> Self {
        let layered = Self::new();
        let layered = match spec_dir {
            Some(dir) => layered.with_source(DirectorySpecs::new(dir)),
            None => layered,
        };
        layered.with_source(EmbeddedSpecs)
    }
}

impl SpecSource for LayeredSpecs {
    fn load(&self, scenario: &str) -> Result<Option<ChangeSpecification>> {
        for source in &self.sources {
            if let Some(spec) = source.load(scenario)? {
                return Ok(Some(spec));
            }
        }
        Ok(None)
    }
}

/// Memoizes loaded specifications by scenario key
pub struct SpecCache {
    source: Box<dyn SpecSource>,
    entries: Mutex<HashMap<String, Arc<ChangeSpecification>>>,
}

impl SpecCache {
    pub fn new(source: impl SpecSource + 'static) -> Self {
        Self {
            source: Box::new(source),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Cached specification, loading it on first use
    pub fn get_or_load(&self, scenario: &str) -> Result<Arc<ChangeSpecification>> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(spec) = entries.get(scenario) {
            return Ok(Arc::clone(spec));
        }

        let spec = self
            .source
            .load(scenario)?
            .map(Arc::new)
            .ok_or_else(|| MergeError::spec(format!("unknown scenario '{scenario}'")))?;
        entries.insert(scenario.to_string(), Arc::clone(&spec));
        Ok(spec)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_scenarios_parse() {
        for scenario in BUILTIN_SCENARIOS {
            let spec = EmbeddedSpecs.load(scenario).unwrap();
            assert!(spec.is_some_and(|s| !s.files.is_empty()), "{scenario}");
        }
        assert!(EmbeddedSpecs.load("blazor").unwrap().is_none());
    }

    #[test]
    fn test_directory_overrides_embedded() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("identity.toml"),
            "[[files]]\nfileName = \"Custom.cs\"\n",
        )
        .unwrap();

        let specs = LayeredSpecs::standard(Some(dir.path().to_path_buf()));
        let identity = specs.load("identity").unwrap().unwrap();
        assert_eq!(identity.files[0].file_name, "Custom.cs");

        let minimal = specs.load("minimalApi").unwrap().unwrap();
        assert_eq!(minimal.files[0].file_name, "Program.cs");
    }

    #[test]
    fn test_cache_shares_loaded_spec() {
        let cache = SpecCache::new(EmbeddedSpecs);
        assert!(cache.is_empty());
        let first = cache.get_or_load("identity").unwrap();
        let second = cache.get_or_load("identity").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);

        let err = cache.get_or_load("unknown").unwrap_err();
        assert!(matches!(err, MergeError::Spec(_)));
    }
}
