//! Entity types and the read-only registry interface the core consumes.
//!
//! Entities are owned by an external CRUD collaborator in a full
//! deployment; the core only ever reads them through [`EntityRegistry`].

use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt::{self, Display};
use std::sync::Arc;

use arc_swap::ArcSwap;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::value::AttributeBundle;

/// Declare a newtype string id with the `Borrow<str>`/`Display`/`Hash`
/// impls the registry's `HashMap` lookups need.
macro_rules! id_type {
    ($name:ident) => {
        #[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                Display::fmt(&self.0, f)
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(v: &str) -> Self {
                Self(v.to_string())
            }
        }

        impl From<String> for $name {
            fn from(v: String) -> Self {
                Self(v)
            }
        }
    };
}

id_type!(FixtureId);
id_type!(FixtureModelId);
id_type!(GroupId);
id_type!(InputId);
id_type!(PresetId);
id_type!(GraphId);
id_type!(NodeId);

/// A port id, scoped to the node type that declares it.
pub type PortId = String;

/// A patched fixture: an instance of a [`FixtureModel`] at a DMX address.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fixture {
    pub id: FixtureId,
    #[serde(default = "default_revision")]
    pub revision: u64,
    pub name: String,
    pub model_id: FixtureModelId,
    pub universe: u16,
    pub start_channel: u16,
}

/// The channel layout of a fixture type. Recognized channel names are a
/// closed set used by the Art-Net bridge to locate each attribute's offset.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixtureModel {
    pub id: FixtureModelId,
    pub brand: String,
    pub model: String,
    /// channel name -> 1-based offset within the fixture's DMX block.
    pub channels: HashMap<String, u16>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: GroupId,
    #[serde(default = "default_revision")]
    pub revision: u64,
    pub name: String,
    pub fixture_ids: Vec<FixtureId>,
}

impl Group {
    /// Deduplicated fixture ids, preserving first-seen order.
    pub fn deduplicated_fixture_ids(&self) -> Vec<FixtureId> {
        self.fixture_ids.iter().cloned().unique().collect()
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum InputType {
    Fader,
    Button,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Input {
    pub id: InputId,
    #[serde(default = "default_revision")]
    pub revision: u64,
    pub name: String,
    #[serde(rename = "type")]
    pub input_type: InputType,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum PresetType {
    Color,
    Position,
    Beam,
    Full,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preset {
    pub id: PresetId,
    #[serde(default = "default_revision")]
    pub revision: u64,
    pub name: String,
    #[serde(rename = "type")]
    pub preset_type: PresetType,
    #[serde(default)]
    pub attributes: AttributeBundle,
}

fn default_revision() -> u64 {
    1
}

/// A node instance within a [`Graph`]: an id, a catalog type name, and its
/// param bindings. Display-only layout (`position`) is not modeled here —
/// it is purely a client-side concern.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphNode {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub params: HashMap<String, ParamValue>,
}

/// A param value as read from a graph definition, before the compiler
/// checks it against the declared [`crate::graph::catalog::ParamType`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Number(f64),
    String(String),
    Bool(bool),
    StringList(Vec<String>),
}

/// One endpoint of an edge: a node id and a port id on that node.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    pub node_id: NodeId,
    pub port: PortId,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GraphEdge {
    pub id: String,
    pub from: Endpoint,
    pub to: Endpoint,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Graph {
    pub id: GraphId,
    #[serde(default = "default_revision")]
    pub revision: u64,
    pub name: String,
    pub nodes: Vec<GraphNode>,
    #[serde(default)]
    pub edges: Vec<GraphEdge>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// Pure read interface consumed by the core. Implementations must be safe
/// to call concurrently from the tick thread while external collaborators
/// mutate entities on their own threads (publish-new-version semantics).
pub trait EntityRegistry: Send + Sync {
    fn get_fixture(&self, id: &str) -> Option<Fixture>;
    fn get_fixture_model(&self, id: &str) -> Option<FixtureModel>;
    fn get_group(&self, id: &str) -> Option<Group>;
    fn get_preset(&self, id: &str) -> Option<Preset>;
    fn list_all_graphs(&self) -> Vec<Graph>;
}

/// Snapshot of all entities, swapped atomically on mutation.
#[derive(Default, Clone)]
pub struct RegistryData {
    pub fixtures: HashMap<FixtureId, Fixture>,
    pub fixture_models: HashMap<FixtureModelId, FixtureModel>,
    pub groups: HashMap<GroupId, Group>,
    pub inputs: HashMap<InputId, Input>,
    pub presets: HashMap<PresetId, Preset>,
    pub graphs: HashMap<GraphId, Graph>,
}

/// An in-memory registry backed by an [`ArcSwap`] snapshot. Readers never
/// block; a writer publishes an entirely new [`RegistryData`] to update it.
pub struct InMemoryRegistry {
    data: ArcSwap<RegistryData>,
}

impl InMemoryRegistry {
    pub fn new(data: RegistryData) -> Self {
        Self {
            data: ArcSwap::from_pointee(data),
        }
    }

    /// Replace the entire snapshot. A future CRUD layer would instead
    /// publish incremental copy-on-write updates under its own optimistic
    /// concurrency check; this is the coarse-grained equivalent.
    pub fn replace(&self, data: RegistryData) {
        self.data.store(Arc::new(data));
    }

    pub fn snapshot(&self) -> Arc<RegistryData> {
        self.data.load_full()
    }
}

impl EntityRegistry for InMemoryRegistry {
    fn get_fixture(&self, id: &str) -> Option<Fixture> {
        self.data.load().fixtures.get(id).cloned()
    }

    fn get_fixture_model(&self, id: &str) -> Option<FixtureModel> {
        self.data.load().fixture_models.get(id).cloned()
    }

    fn get_group(&self, id: &str) -> Option<Group> {
        self.data.load().groups.get(id).cloned()
    }

    fn get_preset(&self, id: &str) -> Option<Preset> {
        self.data.load().presets.get(id).cloned()
    }

    fn list_all_graphs(&self) -> Vec<Graph> {
        self.data.load().graphs.values().cloned().collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_group_dedup_preserves_order() {
        let g = Group {
            id: GroupId::from("g1"),
            revision: 1,
            name: "g".into(),
            fixture_ids: vec!["a".into(), "b".into(), "a".into(), "c".into()],
        };
        let ids: Vec<String> = g
            .deduplicated_fixture_ids()
            .into_iter()
            .map(|id| id.0)
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_registry_snapshot_isolation() {
        let registry = InMemoryRegistry::new(RegistryData::default());
        assert!(registry.get_fixture("missing").is_none());
        let mut data = RegistryData::default();
        data.fixtures.insert(
            FixtureId::from("f1"),
            Fixture {
                id: "f1".into(),
                revision: 1,
                name: "Par 1".into(),
                model_id: "par".into(),
                universe: 0,
                start_channel: 1,
            },
        );
        registry.replace(data);
        assert!(registry.get_fixture("f1").is_some());
    }
}
