//! Per-node-type evaluators and the typed per-node state they close over.
//!
//! Each evaluator is `(node, ctx) -> outputs`. `ctx` is the only way an
//! evaluator observes time, upstream values, input state, or the entity
//! registry; evaluators never reach past it.

use std::collections::HashMap;

use number::{BipolarFloat, UnipolarFloat};

use crate::entity::{EntityRegistry, Endpoint, NodeId, ParamValue, PortId};
use crate::graph::catalog::{CATALOG, NodeKind};
use crate::input::InputSnapshot;
use crate::value::{AttributeBundle, Color, PartialColor, Position, Selection, Value};

/// Per-node-kind mutable state, closed the same way [`NodeKind`] is.
#[derive(Clone, Debug)]
pub enum NodeState {
    Lfo { phase: f64 },
    Smooth { prev: Option<f64> },
    Chase { phase: f64 },
    Flash { env_phase: f64, active: bool },
}

impl NodeState {
    fn initial_for(kind: NodeKind, params: &HashMap<String, ParamValue>) -> Option<NodeState> {
        match kind {
            NodeKind::SineLFO | NodeKind::TriangleLFO | NodeKind::SawLFO => Some(NodeState::Lfo {
                phase: number_param(params, "phase", 0.0),
            }),
            NodeKind::Smooth => Some(NodeState::Smooth { prev: None }),
            NodeKind::Chase => Some(NodeState::Chase { phase: 0.0 }),
            NodeKind::Flash => Some(NodeState::Flash {
                env_phase: 0.0,
                active: false,
            }),
            _ => None,
        }
    }
}

/// Everything one tick's worth of node evaluation needs to read.
pub struct EvalContext<'a> {
    pub time: f64,
    pub delta_time: f64,
    pub input: &'a InputSnapshot,
    pub registry: &'a dyn EntityRegistry,
    /// `to` endpoint -> the single `from` endpoint driving it, from the compiler.
    pub drivers: &'a HashMap<Endpoint, Endpoint>,
    /// Outputs already produced this tick, in evaluation order so far.
    pub outputs: &'a HashMap<NodeId, HashMap<PortId, Value>>,
}

impl<'a> EvalContext<'a> {
    /// Resolves a node's input by following its single driving edge, if any.
    /// An unconnected input returns `None`; the evaluator falls back to the
    /// port's declared default.
    pub fn get_input(&self, node_id: &NodeId, port: &str) -> Option<Value> {
        let to = Endpoint {
            node_id: node_id.clone(),
            port: port.to_string(),
        };
        let from = self.drivers.get(&to)?;
        self.outputs.get(&from.node_id)?.get(from.port.as_str()).cloned()
    }
}

/// Reads an input, falling through the port's catalog default, to the value
/// a stateless evaluator should use when nothing upstream supplies one.
fn input_or_default(ctx: &EvalContext, kind: NodeKind, node_id: &NodeId, port: &str) -> Option<Value> {
    ctx.get_input(node_id, port)
        .or_else(|| CATALOG[&kind].inputs.get(port).and_then(|p| p.default.clone()))
}

fn number_param(params: &HashMap<String, ParamValue>, name: &str, default: f64) -> f64 {
    match params.get(name) {
        Some(ParamValue::Number(v)) => *v,
        _ => default,
    }
}

fn bool_param(params: &HashMap<String, ParamValue>, name: &str, default: bool) -> bool {
    match params.get(name) {
        Some(ParamValue::Bool(v)) => *v,
        _ => default,
    }
}

fn string_param(params: &HashMap<String, ParamValue>, name: &str) -> Option<String> {
    match params.get(name) {
        Some(ParamValue::String(s)) => Some(s.clone()),
        _ => None,
    }
}

/// Reads a param that may be given as a single string or a string list,
/// per the `groupIds`/`fixtureIds` "singular or plural" convention.
fn string_list_param(params: &HashMap<String, ParamValue>, name: &str) -> Vec<String> {
    match params.get(name) {
        Some(ParamValue::StringList(list)) => list.clone(),
        Some(ParamValue::String(s)) => vec![s.clone()],
        _ => Vec::new(),
    }
}

/// Like [`string_list_param`], but also accepts a singular alias key
/// (`groupId` for `groupIds`, `fixtureId` for `fixtureIds`) when the
/// plural key wasn't provided.
fn string_list_param_any(params: &HashMap<String, ParamValue>, name: &str, alias: &str) -> Vec<String> {
    let primary = string_list_param(params, name);
    if !primary.is_empty() {
        return primary;
    }
    string_list_param(params, alias)
}

/// Evaluates one node, returning its output port map. Used by the engine's
/// tick loop, which is responsible for catching panics/errors per §4.6 and
/// substituting an empty output map on failure.
pub fn evaluate(
    node_id: &NodeId,
    kind: NodeKind,
    params: &HashMap<String, ParamValue>,
    state: &mut Option<NodeState>,
    ctx: &EvalContext,
) -> HashMap<PortId, Value> {
    use NodeKind::*;

    let mut out = HashMap::new();
    match kind {
        Time => {
            out.insert("t".to_string(), Value::Scalar(ctx.time));
        }
        Fader => {
            let id = string_param(params, "faderId").unwrap_or_default();
            out.insert("value".to_string(), Value::Scalar(ctx.input.fader(&id).val()));
        }
        Button => {
            let id = string_param(params, "buttonId").unwrap_or_default();
            let b = ctx.input.button(&id);
            out.insert("down".to_string(), Value::Bool(b.held));
            out.insert("pressed".to_string(), Value::Trigger(b.pressed_this_frame));
            out.insert("released".to_string(), Value::Trigger(b.released_this_frame));
        }
        Scalar => {
            out.insert("value".to_string(), Value::Scalar(number_param(params, "value", 0.0)));
        }
        Bool => {
            out.insert("value".to_string(), Value::Bool(bool_param(params, "value", false)));
        }
        ColorConstant => {
            out.insert(
                "color".to_string(),
                Value::Color(Color::new(
                    number_param(params, "r", 0.0),
                    number_param(params, "g", 0.0),
                    number_param(params, "b", 0.0),
                )),
            );
        }
        PositionConstant => {
            out.insert(
                "position".to_string(),
                Value::Position(Position::new(
                    number_param(params, "pan", 0.0),
                    number_param(params, "tilt", 0.0),
                )),
            );
        }
        SelectGroup => {
            let mut selection: Selection = Selection::new();
            for id in string_list_param_any(params, "groupIds", "groupId") {
                if let Some(group) = ctx.registry.get_group(&id) {
                    selection.extend(group.deduplicated_fixture_ids());
                }
            }
            out.insert("selection".to_string(), Value::Selection(selection));
        }
        SelectFixture => {
            let selection: Selection = string_list_param_any(params, "fixtureIds", "fixtureId")
                .into_iter()
                .map(Into::into)
                .collect();
            out.insert("selection".to_string(), Value::Selection(selection));
        }
        PresetBundle => {
            let id = string_param(params, "presetId").unwrap_or_default();
            let bundle = ctx
                .registry
                .get_preset(&id)
                .map(|p| p.attributes)
                .unwrap_or_default();
            out.insert("bundle".to_string(), Value::Bundle(bundle));
        }
        Add => {
            let a = input_or_default(ctx, kind, node_id, "a").map(|v| v.as_scalar(0.0)).unwrap_or(0.0);
            let b = input_or_default(ctx, kind, node_id, "b").map(|v| v.as_scalar(0.0)).unwrap_or(0.0);
            out.insert("result".to_string(), Value::Scalar(a + b));
        }
        Multiply => {
            let a = input_or_default(ctx, kind, node_id, "a").map(|v| v.as_scalar(1.0)).unwrap_or(1.0);
            let b = input_or_default(ctx, kind, node_id, "b").map(|v| v.as_scalar(1.0)).unwrap_or(1.0);
            out.insert("result".to_string(), Value::Scalar(a * b));
        }
        Clamp01 => {
            let v = input_or_default(ctx, kind, node_id, "value").map(|v| v.as_scalar(0.0)).unwrap_or(0.0);
            out.insert("result".to_string(), Value::Scalar(v.clamp(0.0, 1.0)));
        }
        MapRange => {
            let v = input_or_default(ctx, kind, node_id, "value").map(|v| v.as_scalar(0.0)).unwrap_or(0.0);
            let in_min = number_param(params, "inMin", 0.0);
            let in_max = number_param(params, "inMax", 1.0);
            let out_min = number_param(params, "outMin", 0.0);
            let out_max = number_param(params, "outMax", 1.0);
            let result = if (in_max - in_min).abs() < f64::EPSILON {
                out_min
            } else {
                let t = (v - in_min) / (in_max - in_min);
                out_min + t * (out_max - out_min)
            };
            out.insert("result".to_string(), Value::Scalar(result));
        }
        MixColor => {
            let a = input_or_default(ctx, kind, node_id, "a").map(|v| v.as_color(Color::default())).unwrap_or_default();
            let b = input_or_default(ctx, kind, node_id, "b").map(|v| v.as_color(Color::default())).unwrap_or_default();
            let mix = input_or_default(ctx, kind, node_id, "mix")
                .map(|v| v.as_scalar(0.0))
                .unwrap_or(0.0)
                .clamp(0.0, 1.0);
            out.insert(
                "result".to_string(),
                Value::Color(Color::new(
                    lerp(a.r.val(), b.r.val(), mix),
                    lerp(a.g.val(), b.g.val(), mix),
                    lerp(a.b.val(), b.b.val(), mix),
                )),
            );
        }
        ScaleColor => {
            let c = input_or_default(ctx, kind, node_id, "color").map(|v| v.as_color(Color::default())).unwrap_or_default();
            let scale = input_or_default(ctx, kind, node_id, "scale").map(|v| v.as_scalar(1.0)).unwrap_or(1.0);
            out.insert(
                "result".to_string(),
                Value::Color(Color::new(c.r.val() * scale, c.g.val() * scale, c.b.val() * scale)),
            );
        }
        ScalePosition => {
            let p = input_or_default(ctx, kind, node_id, "position")
                .map(|v| v.as_position(Position::default()))
                .unwrap_or_default();
            let scale = input_or_default(ctx, kind, node_id, "scale").map(|v| v.as_scalar(1.0)).unwrap_or(1.0);
            out.insert(
                "result".to_string(),
                Value::Position(Position::new(p.pan.val() * scale, p.tilt.val() * scale)),
            );
        }
        ScaleBundle => {
            let b = input_or_default(ctx, kind, node_id, "bundle")
                .map(|v| v.as_bundle(AttributeBundle::default()))
                .unwrap_or_default();
            let scale = input_or_default(ctx, kind, node_id, "scale").map(|v| v.as_scalar(1.0)).unwrap_or(1.0);
            out.insert("result".to_string(), Value::Bundle(scale_bundle(b, scale)));
        }
        MergeBundle => {
            let a = input_or_default(ctx, kind, node_id, "a")
                .map(|v| v.as_bundle(AttributeBundle::default()))
                .unwrap_or_default();
            let b = input_or_default(ctx, kind, node_id, "b")
                .map(|v| v.as_bundle(AttributeBundle::default()))
                .unwrap_or_default();
            let mut merged = a;
            merged.overlay(&b);
            out.insert("result".to_string(), Value::Bundle(merged));
        }
        ColorToBundle => {
            let c = input_or_default(ctx, kind, node_id, "color").map(|v| v.as_color(Color::default())).unwrap_or_default();
            out.insert(
                "bundle".to_string(),
                Value::Bundle(AttributeBundle {
                    color: PartialColor::from(c),
                    ..Default::default()
                }),
            );
        }
        SineLFO | TriangleLFO | SawLFO => {
            let phase = match state {
                Some(NodeState::Lfo { phase }) => phase,
                _ => {
                    *state = NodeState::initial_for(kind, params);
                    match state {
                        Some(NodeState::Lfo { phase }) => phase,
                        _ => unreachable!(),
                    }
                }
            };
            let frequency = number_param(params, "frequency", 1.0);
            let speed = input_or_default(ctx, kind, node_id, "speed").map(|v| v.as_scalar(1.0)).unwrap_or(1.0);
            *phase += frequency * speed * ctx.delta_time;
            *phase %= 1000.0;
            let p = phase.rem_euclid(1.0);
            let value = match kind {
                SineLFO => (f64::sin(2.0 * std::f64::consts::PI * p) + 1.0) / 2.0,
                TriangleLFO => {
                    if p < 0.5 {
                        2.0 * p
                    } else {
                        2.0 * (1.0 - p)
                    }
                }
                _ => p,
            };
            out.insert("value".to_string(), Value::Scalar(value));
        }
        Smooth => {
            let v = input_or_default(ctx, kind, node_id, "value").map(|v| v.as_scalar(0.0)).unwrap_or(0.0);
            let smoothing = number_param(params, "smoothing", 0.5);
            let prev = match state {
                Some(NodeState::Smooth { prev }) => prev,
                _ => {
                    *state = Some(NodeState::Smooth { prev: None });
                    match state {
                        Some(NodeState::Smooth { prev }) => prev,
                        _ => unreachable!(),
                    }
                }
            };
            let next = match *prev {
                Some(p) => p + (1.0 - smoothing) * (v - p),
                None => v,
            };
            *prev = Some(next);
            out.insert("value".to_string(), Value::Scalar(next));
        }
        Chase => {
            let phase = match state {
                Some(NodeState::Chase { phase }) => phase,
                _ => {
                    *state = Some(NodeState::Chase { phase: 0.0 });
                    match state {
                        Some(NodeState::Chase { phase }) => phase,
                        _ => unreachable!(),
                    }
                }
            };
            let frequency = number_param(params, "frequency", 1.0);
            let width = number_param(params, "width", 0.5).clamp(0.0, 1.0);
            *phase += frequency * ctx.delta_time;
            *phase %= 1000.0;
            let p = phase.rem_euclid(1.0);
            let value = if p < width { 1.0 - (p / width.max(f64::EPSILON)) } else { 0.0 };
            out.insert("value".to_string(), Value::Scalar(value));
        }
        Flash => {
            let trigger = input_or_default(ctx, kind, node_id, "trigger").map(|v| v.as_bool(false)).unwrap_or(false);
            let attack = number_param(params, "attack", 0.05).max(f64::EPSILON);
            let decay = number_param(params, "decay", 0.3).max(f64::EPSILON);
            let (env_phase, active) = match state {
                Some(NodeState::Flash { env_phase, active }) => (env_phase, active),
                _ => {
                    *state = Some(NodeState::Flash {
                        env_phase: 0.0,
                        active: false,
                    });
                    match state {
                        Some(NodeState::Flash { env_phase, active }) => (env_phase, active),
                        _ => unreachable!(),
                    }
                }
            };
            if trigger && !*active {
                *env_phase = 0.0;
                *active = true;
            }
            let value = if *active {
                *env_phase += ctx.delta_time;
                if *env_phase < attack {
                    *env_phase / attack
                } else if *env_phase < attack + decay {
                    1.0 - (*env_phase - attack) / decay
                } else {
                    *active = false;
                    *env_phase = 0.0;
                    0.0
                }
            } else {
                0.0
            };
            out.insert("value".to_string(), Value::Scalar(value));
        }
        WriteAttributes => {
            // Sink: produces no output map entry. The engine harvests its
            // resolved inputs directly in a separate pass.
        }
    }
    out
}

fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

fn scale_bundle(b: AttributeBundle, scale: f64) -> AttributeBundle {
    AttributeBundle {
        intensity: b.intensity.map(|v| UnipolarFloat::new(v.val() * scale)),
        color: PartialColor {
            r: b.color.r.map(|v| UnipolarFloat::new(v.val() * scale)),
            g: b.color.g.map(|v| UnipolarFloat::new(v.val() * scale)),
            b: b.color.b.map(|v| UnipolarFloat::new(v.val() * scale)),
        },
        pan: b.pan.map(|v| BipolarFloat::new(v.val() * scale)),
        tilt: b.tilt.map(|v| BipolarFloat::new(v.val() * scale)),
        zoom: b.zoom.map(|v| UnipolarFloat::new(v.val() * scale)),
    }
}

/// Reads the `(selection, bundle, priority)` a `WriteAttributes` node
/// resolves this tick, for the engine's separate harvesting pass. Returns
/// `None` if the node has no selection connected or the selection is empty.
pub fn harvest_write(node_id: &NodeId, params: &HashMap<String, ParamValue>, ctx: &EvalContext) -> Option<(Selection, AttributeBundle, i64)> {
    let selection = ctx
        .get_input(node_id, "selection")
        .map(|v| v.as_selection(&Selection::new()))
        .unwrap_or_default();
    if selection.is_empty() {
        return None;
    }
    let bundle = ctx
        .get_input(node_id, "bundle")
        .map(|v| v.as_bundle(AttributeBundle::default()))
        .unwrap_or_default();
    let priority = number_param(params, "priority", 0.0) as i64;
    Some((selection, bundle, priority))
}

/// Ensures `state` is populated for node kinds that carry per-node state,
/// called once when a graph instance is first loaded.
pub fn init_state(kind: NodeKind, params: &HashMap<String, ParamValue>) -> Option<NodeState> {
    NodeState::initial_for(kind, params)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::entity::{InMemoryRegistry, RegistryData};

    /// Wires `wires` as the given node's inputs, each driven by a synthetic
    /// upstream node producing the given value, so an evaluator's required
    /// inputs can be satisfied without building a whole compiled graph.
    fn wire_inputs(node_id: &str, wires: &[(&str, Value)]) -> (HashMap<Endpoint, Endpoint>, HashMap<NodeId, HashMap<PortId, Value>>) {
        let mut drivers = HashMap::new();
        let mut outputs: HashMap<NodeId, HashMap<PortId, Value>> = HashMap::new();
        for (port, value) in wires {
            let src_id: NodeId = format!("src_{port}").into();
            drivers.insert(
                Endpoint {
                    node_id: node_id.into(),
                    port: port.to_string(),
                },
                Endpoint {
                    node_id: src_id.clone(),
                    port: "out".to_string(),
                },
            );
            outputs.entry(src_id).or_default().insert("out".to_string(), value.clone());
        }
        (drivers, outputs)
    }

    fn test_ctx<'a>(
        input: &'a InputSnapshot,
        registry: &'a InMemoryRegistry,
        drivers: &'a HashMap<Endpoint, Endpoint>,
        outputs: &'a HashMap<NodeId, HashMap<PortId, Value>>,
        delta_time: f64,
    ) -> EvalContext<'a> {
        EvalContext {
            time: 0.0,
            delta_time,
            input,
            registry,
            drivers,
            outputs,
        }
    }

    #[test]
    fn test_scale_color_by_one_is_identity() {
        let node_id: NodeId = "n".into();
        let color = Color::new(0.3, 0.6, 0.9);
        let (drivers, outputs) = wire_inputs("n", &[("color", Value::Color(color))]);
        let input = InputSnapshot::default();
        let registry = InMemoryRegistry::new(RegistryData::default());
        let ctx = test_ctx(&input, &registry, &drivers, &outputs, 1.0 / 60.0);

        let result = evaluate(&node_id, NodeKind::ScaleColor, &HashMap::new(), &mut None, &ctx);
        assert_eq!(result.get("result"), Some(&Value::Color(color)));
    }

    #[test]
    fn test_scale_bundle_by_one_is_identity() {
        let node_id: NodeId = "n".into();
        let bundle = AttributeBundle {
            intensity: Some(UnipolarFloat::new(0.4)),
            color: PartialColor::from(Color::new(0.1, 0.2, 0.3)),
            pan: Some(BipolarFloat::new(-0.5)),
            tilt: None,
            zoom: Some(UnipolarFloat::new(0.7)),
        };
        let (drivers, outputs) = wire_inputs("n", &[("bundle", Value::Bundle(bundle))]);
        let input = InputSnapshot::default();
        let registry = InMemoryRegistry::new(RegistryData::default());
        let ctx = test_ctx(&input, &registry, &drivers, &outputs, 1.0 / 60.0);

        let result = evaluate(&node_id, NodeKind::ScaleBundle, &HashMap::new(), &mut None, &ctx);
        assert_eq!(result.get("result"), Some(&Value::Bundle(bundle)));
    }

    #[test]
    fn test_mix_color_at_zero_and_one_returns_each_input() {
        let node_id: NodeId = "n".into();
        let a = Color::new(1.0, 0.0, 0.0);
        let b = Color::new(0.0, 1.0, 0.0);
        let input = InputSnapshot::default();
        let registry = InMemoryRegistry::new(RegistryData::default());

        let (drivers, outputs) = wire_inputs("n", &[("a", Value::Color(a)), ("b", Value::Color(b)), ("mix", Value::Scalar(0.0))]);
        let ctx = test_ctx(&input, &registry, &drivers, &outputs, 1.0 / 60.0);
        let result = evaluate(&node_id, NodeKind::MixColor, &HashMap::new(), &mut None, &ctx);
        assert_eq!(result.get("result"), Some(&Value::Color(a)));

        let (drivers, outputs) = wire_inputs("n", &[("a", Value::Color(a)), ("b", Value::Color(b)), ("mix", Value::Scalar(1.0))]);
        let ctx = test_ctx(&input, &registry, &drivers, &outputs, 1.0 / 60.0);
        let result = evaluate(&node_id, NodeKind::MixColor, &HashMap::new(), &mut None, &ctx);
        assert_eq!(result.get("result"), Some(&Value::Color(b)));
    }

    #[test]
    fn test_clamp01_is_idempotent() {
        let node_id: NodeId = "n".into();
        let input = InputSnapshot::default();
        let registry = InMemoryRegistry::new(RegistryData::default());

        let (drivers, outputs) = wire_inputs("n", &[("value", Value::Scalar(1.7))]);
        let ctx = test_ctx(&input, &registry, &drivers, &outputs, 1.0 / 60.0);
        let once = evaluate(&node_id, NodeKind::Clamp01, &HashMap::new(), &mut None, &ctx)["result"].as_scalar(0.0);

        let (drivers, outputs) = wire_inputs("n", &[("value", Value::Scalar(once))]);
        let ctx = test_ctx(&input, &registry, &drivers, &outputs, 1.0 / 60.0);
        let twice = evaluate(&node_id, NodeKind::Clamp01, &HashMap::new(), &mut None, &ctx)["result"].as_scalar(0.0);

        assert_eq!(once, twice);
    }

    #[test]
    fn test_map_range_identity_when_in_and_out_ranges_match() {
        let node_id: NodeId = "n".into();
        let (drivers, outputs) = wire_inputs("n", &[("value", Value::Scalar(0.42))]);
        let input = InputSnapshot::default();
        let registry = InMemoryRegistry::new(RegistryData::default());
        let ctx = test_ctx(&input, &registry, &drivers, &outputs, 1.0 / 60.0);
        let params: HashMap<String, ParamValue> = [
            ("inMin".to_string(), ParamValue::Number(-2.0)),
            ("inMax".to_string(), ParamValue::Number(5.0)),
            ("outMin".to_string(), ParamValue::Number(-2.0)),
            ("outMax".to_string(), ParamValue::Number(5.0)),
        ]
        .into_iter()
        .collect();

        let result = evaluate(&node_id, NodeKind::MapRange, &params, &mut None, &ctx)["result"].as_scalar(0.0);
        assert!((result - 0.42).abs() < 1e-9);
    }

    #[test]
    fn test_sine_lfo_advances_phase_each_tick() {
        let node_id: NodeId = "lfo".into();
        let params: HashMap<String, ParamValue> = [("frequency".to_string(), ParamValue::Number(1.0))].into_iter().collect();
        let input = InputSnapshot::default();
        let registry = InMemoryRegistry::new(RegistryData::default());
        let drivers = HashMap::new();
        let outputs = HashMap::new();
        let ctx = test_ctx(&input, &registry, &drivers, &outputs, 0.25);
        let mut state = init_state(NodeKind::SineLFO, &params);

        let v1 = evaluate(&node_id, NodeKind::SineLFO, &params, &mut state, &ctx)["value"].as_scalar(0.0);
        assert!((v1 - 1.0).abs() < 1e-9, "quarter cycle should peak at 1.0, got {v1}");

        let v2 = evaluate(&node_id, NodeKind::SineLFO, &params, &mut state, &ctx)["value"].as_scalar(0.0);
        assert!((v2 - 0.5).abs() < 1e-9, "half cycle should cross the midpoint, got {v2}");
    }

    #[test]
    fn test_smooth_converges_toward_target_without_jumping() {
        let node_id: NodeId = "sm".into();
        let params: HashMap<String, ParamValue> = [("smoothing".to_string(), ParamValue::Number(0.5))].into_iter().collect();
        let input = InputSnapshot::default();
        let registry = InMemoryRegistry::new(RegistryData::default());
        let mut state = init_state(NodeKind::Smooth, &params);

        let (drivers, outputs) = wire_inputs("sm", &[("value", Value::Scalar(1.0))]);
        let ctx = test_ctx(&input, &registry, &drivers, &outputs, 1.0 / 60.0);
        let first = evaluate(&node_id, NodeKind::Smooth, &params, &mut state, &ctx)["value"].as_scalar(0.0);
        assert_eq!(first, 1.0, "first tick has no prior state, passes target through");

        let (drivers, outputs) = wire_inputs("sm", &[("value", Value::Scalar(0.0))]);
        let ctx = test_ctx(&input, &registry, &drivers, &outputs, 1.0 / 60.0);
        let second = evaluate(&node_id, NodeKind::Smooth, &params, &mut state, &ctx)["value"].as_scalar(0.0);
        assert!((second - 0.5).abs() < 1e-9, "smoothing=0.5 should move halfway toward the new target, got {second}");
    }

    #[test]
    fn test_chase_triangular_pulse_wraps_at_frequency() {
        let node_id: NodeId = "ch".into();
        let params: HashMap<String, ParamValue> = [
            ("frequency".to_string(), ParamValue::Number(1.0)),
            ("width".to_string(), ParamValue::Number(0.5)),
        ]
        .into_iter()
        .collect();
        let input = InputSnapshot::default();
        let registry = InMemoryRegistry::new(RegistryData::default());
        let drivers = HashMap::new();
        let outputs = HashMap::new();
        let ctx = test_ctx(&input, &registry, &drivers, &outputs, 0.25);
        let mut state = init_state(NodeKind::Chase, &params);

        let first = evaluate(&node_id, NodeKind::Chase, &params, &mut state, &ctx)["value"].as_scalar(1.0);
        assert!((first - 0.5).abs() < 1e-9, "phase 0.25 of width 0.5 should be halfway down the ramp, got {first}");

        let second = evaluate(&node_id, NodeKind::Chase, &params, &mut state, &ctx)["value"].as_scalar(1.0);
        assert_eq!(second, 0.0, "phase 0.5 is past the pulse width, should be dark");
    }

    #[test]
    fn test_flash_rising_edge_then_attack_decay_then_clears() {
        let node_id: NodeId = "fl".into();
        let params: HashMap<String, ParamValue> = [
            ("attack".to_string(), ParamValue::Number(0.1)),
            ("decay".to_string(), ParamValue::Number(0.1)),
        ]
        .into_iter()
        .collect();
        let input = InputSnapshot::default();
        let registry = InMemoryRegistry::new(RegistryData::default());
        let mut state = init_state(NodeKind::Flash, &params);

        let (drivers, outputs) = wire_inputs("fl", &[("trigger", Value::Trigger(true))]);
        let ctx = test_ctx(&input, &registry, &drivers, &outputs, 0.05);
        let during_attack = evaluate(&node_id, NodeKind::Flash, &params, &mut state, &ctx)["value"].as_scalar(0.0);
        assert!((during_attack - 0.5).abs() < 1e-9, "halfway through attack should be half-bright, got {during_attack}");

        let (drivers, outputs) = wire_inputs("fl", &[("trigger", Value::Trigger(false))]);
        let ctx = test_ctx(&input, &registry, &drivers, &outputs, 0.1);
        let during_decay = evaluate(&node_id, NodeKind::Flash, &params, &mut state, &ctx)["value"].as_scalar(0.0);
        assert!((during_decay - 0.5).abs() < 1e-9, "halfway through decay should be half-bright, got {during_decay}");

        let cleared = evaluate(&node_id, NodeKind::Flash, &params, &mut state, &ctx)["value"].as_scalar(1.0);
        assert_eq!(cleared, 0.0, "envelope should clear once attack+decay has elapsed");
    }
}
