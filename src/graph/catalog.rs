//! The static node-type catalog: the closed `NodeKind` sum type and its
//! per-variant `NodeDefinition` (inputs, outputs, params).

use std::collections::HashMap;
use std::sync::LazyLock;

use strum_macros::{Display, EnumString};

use crate::value::PortType;

/// The closed set of node types. Re-architected from the source's
/// string-keyed dispatch table into a compile-time-exhaustive enum, per the
/// dataflow engine's design notes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Display, EnumString)]
pub enum NodeKind {
    Time,
    Fader,
    Button,
    Scalar,
    Bool,
    ColorConstant,
    PositionConstant,
    SelectGroup,
    SelectFixture,
    PresetBundle,
    Add,
    Multiply,
    Clamp01,
    MapRange,
    MixColor,
    ScaleColor,
    ScalePosition,
    ScaleBundle,
    MergeBundle,
    ColorToBundle,
    SineLFO,
    TriangleLFO,
    SawLFO,
    Smooth,
    Chase,
    Flash,
    WriteAttributes,
}

impl NodeKind {
    pub fn all() -> &'static [NodeKind] {
        use NodeKind::*;
        &[
            Time,
            Fader,
            Button,
            Scalar,
            Bool,
            ColorConstant,
            PositionConstant,
            SelectGroup,
            SelectFixture,
            PresetBundle,
            Add,
            Multiply,
            Clamp01,
            MapRange,
            MixColor,
            ScaleColor,
            ScalePosition,
            ScaleBundle,
            MergeBundle,
            ColorToBundle,
            SineLFO,
            TriangleLFO,
            SawLFO,
            Smooth,
            Chase,
            Flash,
            WriteAttributes,
        ]
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ParamType {
    Number,
    String,
    Bool,
    StringList,
}

#[derive(Clone, Debug, Default)]
pub struct ParamDefinition {
    pub param_type: ParamType,
    /// Entity-reference params (`faderId`, `buttonId`, `groupId`,
    /// `fixtureId`, `presetId`) are always required when declared; all
    /// others are required only when they carry no default.
    pub always_required: bool,
    pub default: Option<crate::entity::ParamValue>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    /// A singular alternate key accepted in place of the primary name, for
    /// the `groupId`/`groupIds` and `fixtureId`/`fixtureIds` convention.
    pub alias: Option<&'static str>,
}

impl Default for ParamType {
    fn default() -> Self {
        ParamType::Number
    }
}

impl ParamDefinition {
    pub fn is_required(&self) -> bool {
        self.always_required || self.default.is_none()
    }
}

#[derive(Clone, Debug)]
pub struct PortDefinition {
    pub port_type: PortType,
    pub required: bool,
    pub min: Option<f64>,
    pub max: Option<f64>,
    /// The value an unconnected input falls back to. `None` for outputs
    /// and for required inputs, which the compiler guarantees are wired.
    pub default: Option<crate::value::Value>,
}

impl PortDefinition {
    fn new(port_type: PortType) -> Self {
        Self {
            port_type,
            required: false,
            min: None,
            max: None,
            default: None,
        }
    }

    fn required(mut self) -> Self {
        self.required = true;
        self
    }

    fn with_default(mut self, value: crate::value::Value) -> Self {
        self.default = Some(value);
        self
    }
}

#[derive(Clone, Debug, Default)]
pub struct NodeDefinition {
    pub label: &'static str,
    pub category: &'static str,
    pub inputs: HashMap<&'static str, PortDefinition>,
    pub outputs: HashMap<&'static str, PortDefinition>,
    pub params: HashMap<&'static str, ParamDefinition>,
}

fn number_param() -> ParamDefinition {
    ParamDefinition {
        param_type: ParamType::Number,
        ..Default::default()
    }
}

fn entity_ref_param() -> ParamDefinition {
    ParamDefinition {
        param_type: ParamType::String,
        always_required: true,
        ..Default::default()
    }
}

/// A required entity-reference param that accepts either a single id
/// string or a list of ids (`groupIds`/`fixtureIds` accept both forms).
fn entity_ref_list_param() -> ParamDefinition {
    ParamDefinition {
        param_type: ParamType::StringList,
        always_required: true,
        ..Default::default()
    }
}

fn inputs(ports: impl IntoIterator<Item = (&'static str, PortDefinition)>) -> HashMap<&'static str, PortDefinition> {
    ports.into_iter().collect()
}

fn outputs(ports: impl IntoIterator<Item = (&'static str, PortDefinition)>) -> HashMap<&'static str, PortDefinition> {
    ports.into_iter().collect()
}

fn params(defs: impl IntoIterator<Item = (&'static str, ParamDefinition)>) -> HashMap<&'static str, ParamDefinition> {
    defs.into_iter().collect()
}

fn define(kind: NodeKind) -> NodeDefinition {
    use NodeKind::*;
    match kind {
        Time => NodeDefinition {
            label: "Time",
            category: "source",
            outputs: outputs([("t", PortDefinition::new(PortType::Scalar))]),
            ..Default::default()
        },
        Fader => NodeDefinition {
            label: "Fader",
            category: "source",
            outputs: outputs([("value", PortDefinition::new(PortType::Scalar))]),
            params: params([("faderId", entity_ref_param())]),
            ..Default::default()
        },
        Button => NodeDefinition {
            label: "Button",
            category: "source",
            outputs: outputs([
                ("down", PortDefinition::new(PortType::Bool)),
                ("pressed", PortDefinition::new(PortType::Trigger)),
                ("released", PortDefinition::new(PortType::Trigger)),
            ]),
            params: params([("buttonId", entity_ref_param())]),
            ..Default::default()
        },
        Scalar => NodeDefinition {
            label: "Scalar",
            category: "constant",
            outputs: outputs([("value", PortDefinition::new(PortType::Scalar))]),
            params: params([(
                "value",
                ParamDefinition {
                    default: Some(crate::entity::ParamValue::Number(0.0)),
                    ..number_param()
                },
            )]),
            ..Default::default()
        },
        Bool => NodeDefinition {
            label: "Bool",
            category: "constant",
            outputs: outputs([("value", PortDefinition::new(PortType::Bool))]),
            params: params([(
                "value",
                ParamDefinition {
                    param_type: ParamType::Bool,
                    default: Some(crate::entity::ParamValue::Bool(false)),
                    ..Default::default()
                },
            )]),
            ..Default::default()
        },
        ColorConstant => NodeDefinition {
            label: "Color Constant",
            category: "constant",
            outputs: outputs([("color", PortDefinition::new(PortType::Color))]),
            params: params([
                ("r", unit_param()),
                ("g", unit_param()),
                ("b", unit_param()),
            ]),
            ..Default::default()
        },
        PositionConstant => NodeDefinition {
            label: "Position Constant",
            category: "constant",
            outputs: outputs([("position", PortDefinition::new(PortType::Position))]),
            params: params([("pan", bipolar_param()), ("tilt", bipolar_param())]),
            ..Default::default()
        },
        SelectGroup => NodeDefinition {
            label: "Select Group",
            category: "selection",
            outputs: outputs([("selection", PortDefinition::new(PortType::Selection))]),
            params: params([(
                "groupIds",
                ParamDefinition {
                    alias: Some("groupId"),
                    ..entity_ref_list_param()
                },
            )]),
            ..Default::default()
        },
        SelectFixture => NodeDefinition {
            label: "Select Fixture",
            category: "selection",
            outputs: outputs([("selection", PortDefinition::new(PortType::Selection))]),
            params: params([(
                "fixtureIds",
                ParamDefinition {
                    alias: Some("fixtureId"),
                    ..entity_ref_list_param()
                },
            )]),
            ..Default::default()
        },
        PresetBundle => NodeDefinition {
            label: "Preset Bundle",
            category: "selection",
            outputs: outputs([("bundle", PortDefinition::new(PortType::Bundle))]),
            params: params([("presetId", entity_ref_param())]),
            ..Default::default()
        },
        Add => NodeDefinition {
            label: "Add",
            category: "math",
            inputs: inputs([
                ("a", PortDefinition::new(PortType::Scalar).required()),
                ("b", PortDefinition::new(PortType::Scalar).required()),
            ]),
            outputs: outputs([("result", PortDefinition::new(PortType::Scalar))]),
            ..Default::default()
        },
        Multiply => NodeDefinition {
            label: "Multiply",
            category: "math",
            inputs: inputs([
                ("a", PortDefinition::new(PortType::Scalar).required()),
                ("b", PortDefinition::new(PortType::Scalar).required()),
            ]),
            outputs: outputs([("result", PortDefinition::new(PortType::Scalar))]),
            ..Default::default()
        },
        Clamp01 => NodeDefinition {
            label: "Clamp 0-1",
            category: "math",
            inputs: inputs([(
                "value",
                PortDefinition::new(PortType::Scalar).with_default(crate::value::Value::Scalar(0.0)),
            )]),
            outputs: outputs([("result", PortDefinition::new(PortType::Scalar))]),
            ..Default::default()
        },
        MapRange => NodeDefinition {
            label: "Map Range",
            category: "math",
            inputs: inputs([(
                "value",
                PortDefinition::new(PortType::Scalar).with_default(crate::value::Value::Scalar(0.0)),
            )]),
            outputs: outputs([("result", PortDefinition::new(PortType::Scalar))]),
            params: params([
                ("inMin", number_param()),
                ("inMax", number_param()),
                ("outMin", number_param()),
                ("outMax", number_param()),
            ]),
            ..Default::default()
        },
        MixColor => NodeDefinition {
            label: "Mix Color",
            category: "color",
            inputs: inputs([
                ("a", PortDefinition::new(PortType::Color).required()),
                ("b", PortDefinition::new(PortType::Color).required()),
                ("mix", PortDefinition::new(PortType::Scalar).required()),
            ]),
            outputs: outputs([("result", PortDefinition::new(PortType::Color))]),
            ..Default::default()
        },
        ScaleColor => NodeDefinition {
            label: "Scale Color",
            category: "color",
            inputs: inputs([
                ("color", PortDefinition::new(PortType::Color).required()),
                (
                    "scale",
                    PortDefinition::new(PortType::Scalar).with_default(crate::value::Value::Scalar(1.0)),
                ),
            ]),
            outputs: outputs([("result", PortDefinition::new(PortType::Color))]),
            ..Default::default()
        },
        ScalePosition => NodeDefinition {
            label: "Scale Position",
            category: "position",
            inputs: inputs([
                ("position", PortDefinition::new(PortType::Position).required()),
                (
                    "scale",
                    PortDefinition::new(PortType::Scalar).with_default(crate::value::Value::Scalar(1.0)),
                ),
            ]),
            outputs: outputs([("result", PortDefinition::new(PortType::Position))]),
            ..Default::default()
        },
        ScaleBundle => NodeDefinition {
            label: "Scale Bundle",
            category: "bundle",
            inputs: inputs([
                ("bundle", PortDefinition::new(PortType::Bundle).required()),
                (
                    "scale",
                    PortDefinition::new(PortType::Scalar).with_default(crate::value::Value::Scalar(1.0)),
                ),
            ]),
            outputs: outputs([("result", PortDefinition::new(PortType::Bundle))]),
            ..Default::default()
        },
        MergeBundle => NodeDefinition {
            label: "Merge Bundle",
            category: "bundle",
            inputs: inputs([
                (
                    "a",
                    PortDefinition::new(PortType::Bundle)
                        .with_default(crate::value::Value::Bundle(Default::default())),
                ),
                (
                    "b",
                    PortDefinition::new(PortType::Bundle)
                        .with_default(crate::value::Value::Bundle(Default::default())),
                ),
            ]),
            outputs: outputs([("result", PortDefinition::new(PortType::Bundle))]),
            ..Default::default()
        },
        ColorToBundle => NodeDefinition {
            label: "Color To Bundle",
            category: "bundle",
            inputs: inputs([(
                "color",
                PortDefinition::new(PortType::Color).with_default(crate::value::Value::Color(Default::default())),
            )]),
            outputs: outputs([("bundle", PortDefinition::new(PortType::Bundle))]),
            ..Default::default()
        },
        SineLFO | TriangleLFO | SawLFO => NodeDefinition {
            label: match kind {
                SineLFO => "Sine LFO",
                TriangleLFO => "Triangle LFO",
                _ => "Saw LFO",
            },
            category: "oscillator",
            inputs: inputs([(
                "speed",
                PortDefinition::new(PortType::Scalar).with_default(crate::value::Value::Scalar(1.0)),
            )]),
            outputs: outputs([("value", PortDefinition::new(PortType::Scalar))]),
            params: params([
                (
                    "frequency",
                    ParamDefinition {
                        default: Some(crate::entity::ParamValue::Number(1.0)),
                        ..number_param()
                    },
                ),
                (
                    "phase",
                    ParamDefinition {
                        default: Some(crate::entity::ParamValue::Number(0.0)),
                        ..number_param()
                    },
                ),
            ]),
        },
        Smooth => NodeDefinition {
            label: "Smooth",
            category: "filter",
            inputs: inputs([("value", PortDefinition::new(PortType::Scalar))]),
            outputs: outputs([("value", PortDefinition::new(PortType::Scalar))]),
            params: params([(
                "smoothing",
                ParamDefinition {
                    default: Some(crate::entity::ParamValue::Number(0.5)),
                    min: Some(0.0),
                    max: Some(1.0),
                    ..number_param()
                },
            )]),
        },
        Chase => NodeDefinition {
            label: "Chase",
            category: "effect",
            outputs: outputs([("value", PortDefinition::new(PortType::Scalar))]),
            params: params([
                (
                    "frequency",
                    ParamDefinition {
                        default: Some(crate::entity::ParamValue::Number(1.0)),
                        ..number_param()
                    },
                ),
                (
                    "width",
                    ParamDefinition {
                        default: Some(crate::entity::ParamValue::Number(0.5)),
                        min: Some(0.0),
                        max: Some(1.0),
                        ..number_param()
                    },
                ),
            ]),
        },
        Flash => NodeDefinition {
            label: "Flash",
            category: "effect",
            inputs: inputs([(
                "trigger",
                PortDefinition::new(PortType::Trigger).with_default(crate::value::Value::Trigger(false)),
            )]),
            outputs: outputs([("value", PortDefinition::new(PortType::Scalar))]),
            params: params([
                (
                    "attack",
                    ParamDefinition {
                        default: Some(crate::entity::ParamValue::Number(0.05)),
                        ..number_param()
                    },
                ),
                (
                    "decay",
                    ParamDefinition {
                        default: Some(crate::entity::ParamValue::Number(0.3)),
                        ..number_param()
                    },
                ),
            ]),
        },
        WriteAttributes => NodeDefinition {
            label: "Write Attributes",
            category: "sink",
            inputs: inputs([
                ("selection", PortDefinition::new(PortType::Selection).required()),
                ("bundle", PortDefinition::new(PortType::Bundle).required()),
            ]),
            params: params([(
                "priority",
                ParamDefinition {
                    default: Some(crate::entity::ParamValue::Number(0.0)),
                    ..number_param()
                },
            )]),
            ..Default::default()
        },
    }
}

fn unit_param() -> ParamDefinition {
    ParamDefinition {
        default: Some(crate::entity::ParamValue::Number(0.0)),
        min: Some(0.0),
        max: Some(1.0),
        ..number_param()
    }
}

fn bipolar_param() -> ParamDefinition {
    ParamDefinition {
        default: Some(crate::entity::ParamValue::Number(0.0)),
        min: Some(-1.0),
        max: Some(1.0),
        ..number_param()
    }
}

/// Static node-type catalog, built once on first access.
pub static CATALOG: LazyLock<HashMap<NodeKind, NodeDefinition>> = LazyLock::new(|| {
    NodeKind::all()
        .iter()
        .map(|&kind| (kind, define(kind)))
        .collect()
});

#[cfg(test)]
mod test {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_every_node_kind_has_a_definition() {
        for kind in NodeKind::all() {
            assert!(CATALOG.contains_key(kind), "missing definition for {kind}");
        }
    }

    #[test]
    fn test_node_kind_round_trips_through_string() {
        for kind in NodeKind::all() {
            let s = kind.to_string();
            let parsed = NodeKind::from_str(&s).unwrap();
            assert_eq!(*kind, parsed);
        }
    }

    #[test]
    fn test_required_inputs_match_spec() {
        let write = &CATALOG[&NodeKind::WriteAttributes];
        assert!(write.inputs["selection"].required);
        assert!(write.inputs["bundle"].required);

        let scale_color = &CATALOG[&NodeKind::ScaleColor];
        assert!(scale_color.inputs["color"].required);
        assert!(!scale_color.inputs["scale"].required);
    }
}
