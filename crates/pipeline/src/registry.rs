//! Stage registry: an explicit name → factory table built at startup.
//!
//! Stages are named in configuration and on the command line as
//! `name` or `name:key=value,key=value`. Each registered factory turns the
//! parsed parameters into a boxed [`Transform`].

use std::collections::BTreeMap;
use std::sync::Arc;

use talewright_core::{StageBuildError, Transform};

use crate::transforms::{AccumulatorThresholds, Annotate, DecodeBytesToText, PrefixText, TextAccumulator};

/// Builds one transform from its parameters.
pub type StageFactory =
    Arc<dyn Fn(&StageParams) -> Result<Box<dyn Transform>, StageBuildError> + Send + Sync>;

/// Parameters parsed from a stage spec.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageParams {
    stage: String,
    values: BTreeMap<String, String>,
}

impl StageParams {
    pub fn new(stage: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            values: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn stage(&self) -> &str {
        &self.stage
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn require(&self, key: &str) -> Result<&str, StageBuildError> {
        self.get(key).ok_or_else(|| self.invalid(format!("missing parameter '{key}'")))
    }

    pub fn get_usize(&self, key: &str) -> Result<Option<usize>, StageBuildError> {
        self.parse(key)
    }

    pub fn get_f32(&self, key: &str) -> Result<Option<f32>, StageBuildError> {
        self.parse(key)
    }

    pub fn get_u32(&self, key: &str) -> Result<Option<u32>, StageBuildError> {
        self.parse(key)
    }

    fn parse<T: std::str::FromStr>(&self, key: &str) -> Result<Option<T>, StageBuildError> {
        self.get(key)
            .map(|raw| {
                raw.trim()
                    .parse::<T>()
                    .map_err(|_| self.invalid(format!("parameter '{key}' has invalid value '{raw}'")))
            })
            .transpose()
    }

    pub fn invalid(&self, reason: impl Into<String>) -> StageBuildError {
        StageBuildError::InvalidArgument {
            stage: self.stage.clone(),
            reason: reason.into(),
        }
    }
}

/// A parsed `name:key=value,...` spec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageSpec {
    pub name: String,
    pub params: StageParams,
}

impl StageSpec {
    pub fn parse(spec: &str) -> Result<Self, StageBuildError> {
        // Values keep their whitespace; only the name is trimmed.
        let (name, rest) = match spec.split_once(':') {
            Some((name, rest)) => (name.trim(), Some(rest)),
            None => (spec.trim(), None),
        };
        if name.is_empty() {
            return Err(StageBuildError::InvalidSpec(format!("'{spec}' has no stage name")));
        }

        let mut params = StageParams::new(name);
        for pair in rest.into_iter().flat_map(|r| r.split(',')).filter(|p| !p.trim().is_empty()) {
            let (key, value) = pair.split_once('=').ok_or_else(|| {
                StageBuildError::InvalidSpec(format!("'{pair}' in '{spec}' is not key=value"))
            })?;
            params = params.with(key.trim(), value);
        }

        Ok(Self {
            name: name.to_string(),
            params,
        })
    }
}

/// Name → factory table.
pub struct StageRegistry {
    factories: BTreeMap<String, StageFactory>,
}

impl StageRegistry {
    pub fn new() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// The registry with every built-in transform.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register("decode", |_| Ok(Box::new(DecodeBytesToText::new())));
        registry.register("accumulate", |params| {
            let thresholds = AccumulatorThresholds {
                max_utf8_bytes: params.get_usize("max_bytes")?,
                max_chars: params.get_usize("max_chars")?,
                max_chunks: params.get_usize("max_chunks")?,
            };
            Ok(Box::new(TextAccumulator::new(thresholds)?))
        });
        registry.register("prefix", |params| {
            Ok(Box::new(PrefixText::new(params.require("text")?)))
        });
        registry.register("annotate", |params| {
            Ok(Box::new(Annotate::new(
                params.require("key")?,
                params.get("value").unwrap_or_default(),
            )?))
        });
        registry
    }

    /// Register a factory. Replaces any existing factory with the same name.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&StageParams) -> Result<Box<dyn Transform>, StageBuildError> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// Build a transform from a spec string.
    pub fn build(&self, spec: &str) -> Result<Box<dyn Transform>, StageBuildError> {
        let spec = StageSpec::parse(spec)?;
        let factory = self
            .factories
            .get(&spec.name)
            .ok_or_else(|| StageBuildError::UnknownStage(spec.name.clone()))?;
        factory(&spec.params)
    }

    /// Build every spec in order, failing on the first bad one.
    pub fn build_all<S: AsRef<str>>(
        &self,
        specs: &[S],
    ) -> Result<Vec<Box<dyn Transform>>, StageBuildError> {
        specs.iter().map(|s| self.build(s.as_ref())).collect()
    }
}

impl Default for StageRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use talewright_core::ChunkType;

    use super::*;

    #[test]
    fn parses_name_only() {
        let spec = StageSpec::parse(" decode ").unwrap();
        assert_eq!(spec.name, "decode");
        assert_eq!(spec.params.get("anything"), None);
    }

    #[test]
    fn parses_params_keeping_value_text() {
        let spec = StageSpec::parse("prefix:text=Narrator: ").unwrap();
        assert_eq!(spec.name, "prefix");
        assert_eq!(spec.params.get("text"), Some("Narrator: "));

        let spec = StageSpec::parse("accumulate:max_chunks=3,max_chars=80").unwrap();
        assert_eq!(spec.params.get_usize("max_chunks").unwrap(), Some(3));
        assert_eq!(spec.params.get_usize("max_chars").unwrap(), Some(80));
    }

    #[test]
    fn rejects_malformed_specs() {
        assert!(matches!(StageSpec::parse(":x=1"), Err(StageBuildError::InvalidSpec(_))));
        assert!(matches!(
            StageSpec::parse("prefix:text"),
            Err(StageBuildError::InvalidSpec(_))
        ));
    }

    #[test]
    fn builtin_names_are_registered() {
        let registry = StageRegistry::builtin();
        assert_eq!(registry.names(), vec!["accumulate", "annotate", "decode", "prefix"]);
    }

    #[test]
    fn build_known_stage() {
        let registry = StageRegistry::builtin();
        let decode = registry.build("decode").unwrap();
        assert_eq!(decode.input_type(), ChunkType::BYTES);
        assert_eq!(decode.output_type(), ChunkType::TEXT);
    }

    #[test]
    fn unknown_stage_is_an_error() {
        let registry = StageRegistry::builtin();
        assert!(matches!(
            registry.build("teleport"),
            Err(StageBuildError::UnknownStage(name)) if name == "teleport"
        ));
    }

    #[test]
    fn factory_argument_errors_surface() {
        let registry = StageRegistry::builtin();
        assert!(matches!(
            registry.build("accumulate"),
            Err(StageBuildError::InvalidArgument { .. })
        ));
        assert!(matches!(
            registry.build("accumulate:max_chunks=many"),
            Err(StageBuildError::InvalidArgument { .. })
        ));
        assert!(matches!(
            registry.build("annotate:value=x"),
            Err(StageBuildError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn build_all_preserves_order() {
        let registry = StageRegistry::builtin();
        let stages = registry
            .build_all(&["decode", "accumulate:max_chunks=2", "prefix:text=> "])
            .unwrap();
        assert_eq!(stages.len(), 3);
        assert_eq!(stages[0].input_type(), ChunkType::BYTES);
        assert_eq!(stages[2].input_type(), ChunkType::TEXT);
    }
}
