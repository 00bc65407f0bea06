//! Loads a YAML show file into an [`InMemoryRegistry`].
//!
//! Durable persistence and incremental updates are an external CRUD
//! collaborator's job; this loader only needs to produce a valid registry
//! for local running and the `check` CLI subcommand.

use std::path::Path;

use serde::Deserialize;

use crate::entity::{Fixture, FixtureModel, Graph, Group, Input, InMemoryRegistry, Preset, RegistryData};
use crate::error::ConfigError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ShowConfig {
    #[serde(default)]
    pub fixture_models: Vec<FixtureModel>,
    #[serde(default)]
    pub fixtures: Vec<Fixture>,
    #[serde(default)]
    pub groups: Vec<Group>,
    #[serde(default)]
    pub inputs: Vec<Input>,
    #[serde(default)]
    pub presets: Vec<Preset>,
    #[serde(default)]
    pub graphs: Vec<Graph>,
}

impl ShowConfig {
    pub fn from_str(source: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(source)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_str(&source).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn into_registry(self) -> InMemoryRegistry {
        let mut data = RegistryData::default();
        for model in self.fixture_models {
            data.fixture_models.insert(model.id.clone(), model);
        }
        for fixture in self.fixtures {
            data.fixtures.insert(fixture.id.clone(), fixture);
        }
        for group in self.groups {
            data.groups.insert(group.id.clone(), group);
        }
        for input in self.inputs {
            data.inputs.insert(input.id.clone(), input);
        }
        for preset in self.presets {
            data.presets.insert(preset.id.clone(), preset);
        }
        for graph in self.graphs {
            data.graphs.insert(graph.id.clone(), graph);
        }
        InMemoryRegistry::new(data)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const SAMPLE: &str = r#"
fixtureModels:
  - id: par
    brand: Generic
    model: Par64
    channels: { dimmer: 1, red: 2, green: 3, blue: 4 }
fixtures:
  - id: f1
    name: Par 1
    modelId: par
    universe: 0
    startChannel: 1
groups:
  - id: g1
    name: Front Wash
    fixtureIds: [f1]
graphs: []
"#;

    #[test]
    fn test_parses_sample_show() {
        let config = ShowConfig::from_str(SAMPLE).expect("should parse");
        assert_eq!(config.fixtures.len(), 1);
        assert_eq!(config.groups.len(), 1);
        let registry = config.into_registry();
        assert!(registry.get_fixture("f1").is_some());
        assert!(registry.get_group("g1").is_some());
    }

    #[test]
    fn test_missing_show_file_is_io_error() {
        let err = ShowConfig::load("/nonexistent/show.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_unknown_top_level_key_is_rejected() {
        let err = ShowConfig::from_str("fixtures: []\nbogusKey: 1\n").unwrap_err();
        assert!(err.to_string().contains("bogusKey"));
    }

    #[test]
    fn test_load_reads_a_real_file_on_disk() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().expect("create temp file");
        file.write_all(SAMPLE.as_bytes()).expect("write sample show");

        let config = ShowConfig::load(file.path()).expect("should load from disk");
        assert_eq!(config.fixtures.len(), 1);
        assert_eq!(config.groups.len(), 1);
    }
}
