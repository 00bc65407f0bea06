//! The graph compiler: param/edge validation, cycle detection, topological
//! sort, and dependency extraction. Pure — no entity lookups.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::str::FromStr;

use crate::entity::{Endpoint, Graph, GraphEdge, GraphNode, GraphId, NodeId, ParamValue};
use crate::error::{CompileError, CompileErrorCode};
use crate::graph::catalog::{NodeKind, ParamType, CATALOG};

#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct Dependencies {
    pub fader_ids: BTreeSet<String>,
    pub button_ids: BTreeSet<String>,
    pub group_ids: BTreeSet<String>,
    pub fixture_ids: BTreeSet<String>,
    pub preset_ids: BTreeSet<String>,
}

#[derive(Clone, Debug, serde::Serialize)]
pub struct CompileResult {
    pub ok: bool,
    pub errors: Vec<CompileError>,
    pub dependencies: Dependencies,
}

/// A node as the runtime sees it: its kind and its resolved params.
#[derive(Clone, Debug)]
pub struct CompiledNode {
    pub id: NodeId,
    pub kind: NodeKind,
    pub params: HashMap<String, ParamValue>,
}

/// A graph that passed every compiler check, ready to be loaded by the
/// engine.
#[derive(Clone, Debug)]
pub struct CompiledGraph {
    pub graph_id: GraphId,
    pub evaluation_order: Vec<NodeId>,
    pub dependencies: Dependencies,
    pub nodes: HashMap<NodeId, CompiledNode>,
    /// `to` endpoint -> the single `from` endpoint driving it.
    pub drivers: HashMap<Endpoint, Endpoint>,
}

/// Runs the full check pipeline and returns every discoverable error.
pub fn compile(graph: &Graph) -> CompileResult {
    compile_internal(graph).0
}

/// Compiles a graph, returning a ready-to-run [`CompiledGraph`] or the
/// failing [`CompileResult`].
pub fn try_compile(graph: &Graph) -> Result<CompiledGraph, CompileResult> {
    let (result, evaluation_order, nodes, drivers) = compile_internal(graph);
    if !result.ok {
        return Err(result);
    }
    Ok(CompiledGraph {
        graph_id: graph.id.clone(),
        evaluation_order,
        dependencies: result.dependencies,
        nodes,
        drivers,
    })
}

type CompileInternalResult = (
    CompileResult,
    Vec<NodeId>,
    HashMap<NodeId, CompiledNode>,
    HashMap<Endpoint, Endpoint>,
);

fn compile_internal(graph: &Graph) -> CompileInternalResult {
    let mut errors = Vec::new();

    // 1. UNKNOWN_NODE_TYPE. Nodes with an unrecognised type are excluded
    // from every later check.
    let mut known: HashMap<&NodeId, (&GraphNode, NodeKind)> = HashMap::new();
    for node in &graph.nodes {
        match NodeKind::from_str(&node.node_type) {
            Ok(kind) => {
                known.insert(&node.id, (node, kind));
            }
            Err(_) => errors.push(CompileError::new(
                node.id.to_string(),
                CompileErrorCode::UnknownNodeType,
                format!("unknown node type '{}'", node.node_type),
            )),
        }
    }

    // 2. INVALID_PARAM: required params missing, wrong type, out of range.
    for (node, kind) in known.values() {
        let def = &CATALOG[kind];
        for (name, param_def) in &def.params {
            let provided = node
                .params
                .get(*name)
                .or_else(|| param_def.alias.and_then(|alias| node.params.get(alias)));
            match provided {
                None => {
                    if param_def.is_required() {
                        errors.push(CompileError::new(
                            node.id.to_string(),
                            CompileErrorCode::InvalidParam,
                            format!("missing required param '{name}'"),
                        ));
                    }
                }
                Some(value) => {
                    if !param_type_matches(param_def.param_type, value) {
                        errors.push(CompileError::new(
                            node.id.to_string(),
                            CompileErrorCode::InvalidParam,
                            format!("param '{name}' has the wrong type"),
                        ));
                    } else if let ParamValue::Number(v) = value {
                        if param_def.min.is_some_or(|m| *v < m) || param_def.max.is_some_or(|m| *v > m) {
                            errors.push(CompileError::new(
                                node.id.to_string(),
                                CompileErrorCode::InvalidParam,
                                format!("param '{name}' is out of range"),
                            ));
                        }
                    }
                }
            }
        }
    }

    // 3. INVALID_PARAM for edges with a nonexistent port on either end.
    let mut valid_edges: Vec<&GraphEdge> = Vec::new();
    for edge in &graph.edges {
        let from_ok = endpoint_is_output(&edge.from, &known);
        let to_ok = endpoint_is_input(&edge.to, &known);
        if !from_ok {
            errors.push(
                CompileError::new(
                    edge.from.node_id.to_string(),
                    CompileErrorCode::InvalidParam,
                    format!("edge '{}' references a nonexistent output port", edge.id),
                )
                .with_port(edge.from.port.clone()),
            );
        }
        if !to_ok {
            errors.push(
                CompileError::new(
                    edge.to.node_id.to_string(),
                    CompileErrorCode::InvalidParam,
                    format!("edge '{}' references a nonexistent input port", edge.id),
                )
                .with_port(edge.to.port.clone()),
            );
        }
        if from_ok && to_ok {
            valid_edges.push(edge);
        }
    }

    // 4. TYPE_MISMATCH.
    let mut type_checked_edges: Vec<&GraphEdge> = Vec::new();
    for edge in &valid_edges {
        let from_type = output_port_type(&edge.from, &known);
        let to_type = input_port_type(&edge.to, &known);
        match (from_type, to_type) {
            (Some(from_type), Some(to_type)) => {
                if from_type.compatible_with(to_type) {
                    type_checked_edges.push(edge);
                } else {
                    errors.push(
                        CompileError::new(
                            edge.to.node_id.to_string(),
                            CompileErrorCode::TypeMismatch,
                            format!("edge '{}' carries {from_type} into a {to_type} port", edge.id),
                        )
                        .with_port(edge.to.port.clone()),
                    );
                }
            }
            _ => {}
        }
    }

    // 5. Duplicate driver: two edges sharing the same `to`.
    let mut drivers: HashMap<&Endpoint, Vec<&GraphEdge>> = HashMap::new();
    for edge in &type_checked_edges {
        drivers.entry(&edge.to).or_default().push(edge);
    }
    let mut accepted_edges: Vec<&GraphEdge> = Vec::new();
    for (to, edges) in &drivers {
        if edges.len() > 1 {
            errors.push(
                CompileError::new(
                    to.node_id.to_string(),
                    CompileErrorCode::InvalidParam,
                    format!("input port '{}' has {} drivers", to.port, edges.len()),
                )
                .with_port(to.port.clone()),
            );
        } else {
            accepted_edges.push(edges[0]);
        }
    }
    let driven_inputs: HashSet<&Endpoint> = accepted_edges.iter().map(|e| &e.to).collect();

    // 6. MISSING_CONNECTION for required inputs with no incoming edge.
    for (node, kind) in known.values() {
        let def = &CATALOG[kind];
        for (port, port_def) in &def.inputs {
            if port_def.required {
                let endpoint = Endpoint {
                    node_id: node.id.clone(),
                    port: port.to_string(),
                };
                if !driven_inputs.contains(&endpoint) {
                    errors.push(
                        CompileError::new(
                            node.id.to_string(),
                            CompileErrorCode::MissingConnection,
                            format!("required input '{port}' is not connected"),
                        )
                        .with_port(port.to_string()),
                    );
                }
            }
        }
    }

    // Build the adjacency used by cycle detection and topological sort,
    // preserving node iteration order for tie-breaking.
    let order: Vec<&NodeId> = graph
        .nodes
        .iter()
        .filter(|n| known.contains_key(&n.id))
        .map(|n| &n.id)
        .collect();
    let index_of: HashMap<&NodeId, usize> = order.iter().enumerate().map(|(i, id)| (*id, i)).collect();
    let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); order.len()];
    for edge in &accepted_edges {
        if let (Some(&from_idx), Some(&to_idx)) = (index_of.get(&edge.from.node_id), index_of.get(&edge.to.node_id)) {
            adjacency[from_idx].push(to_idx);
        }
    }

    // 7. CYCLE_DETECTED via DFS tri-colour marking.
    let cycle = detect_cycle(&adjacency);
    if let Some(cycle_nodes) = &cycle {
        for &idx in cycle_nodes {
            errors.push(CompileError::new(
                order[idx].to_string(),
                CompileErrorCode::CycleDetected,
                "node participates in a cycle",
            ));
        }
    }

    let dependencies = extract_dependencies(&known);
    let nodes: HashMap<NodeId, CompiledNode> = known
        .values()
        .map(|(node, kind)| {
            (
                node.id.clone(),
                CompiledNode {
                    id: node.id.clone(),
                    kind: *kind,
                    params: node.params.clone(),
                },
            )
        })
        .collect();
    let drivers: HashMap<Endpoint, Endpoint> = accepted_edges
        .iter()
        .map(|e| (e.to.clone(), e.from.clone()))
        .collect();

    if !errors.is_empty() {
        return (
            CompileResult {
                ok: false,
                errors,
                dependencies,
            },
            Vec::new(),
            nodes,
            drivers,
        );
    }

    // 8. Topological sort via Kahn's algorithm.
    let evaluation_order = topological_sort(&order, &adjacency);

    (
        CompileResult {
            ok: true,
            errors: Vec::new(),
            dependencies,
        },
        evaluation_order,
        nodes,
        drivers,
    )
}

fn param_type_matches(expected: ParamType, value: &ParamValue) -> bool {
    matches!(
        (expected, value),
        (ParamType::Number, ParamValue::Number(_))
            | (ParamType::String, ParamValue::String(_))
            | (ParamType::Bool, ParamValue::Bool(_))
            | (ParamType::StringList, ParamValue::StringList(_))
            | (ParamType::StringList, ParamValue::String(_))
    )
}

fn endpoint_is_output(ep: &Endpoint, known: &HashMap<&NodeId, (&GraphNode, NodeKind)>) -> bool {
    output_port_type(ep, known).is_some()
}

fn endpoint_is_input(ep: &Endpoint, known: &HashMap<&NodeId, (&GraphNode, NodeKind)>) -> bool {
    input_port_type(ep, known).is_some()
}

fn output_port_type(ep: &Endpoint, known: &HashMap<&NodeId, (&GraphNode, NodeKind)>) -> Option<crate::value::PortType> {
    let (_, kind) = known.get(&ep.node_id)?;
    CATALOG[kind].outputs.get(ep.port.as_str()).map(|p| p.port_type)
}

fn input_port_type(ep: &Endpoint, known: &HashMap<&NodeId, (&GraphNode, NodeKind)>) -> Option<crate::value::PortType> {
    let (_, kind) = known.get(&ep.node_id)?;
    CATALOG[kind].inputs.get(ep.port.as_str()).map(|p| p.port_type)
}

/// DFS tri-colour cycle detection over an adjacency list of arena indices.
/// Returns the set of node indices participating in the first cycle found.
fn detect_cycle(adjacency: &[Vec<usize>]) -> Option<Vec<usize>> {
    #[derive(Clone, Copy, PartialEq)]
    enum Color {
        White,
        Gray,
        Black,
    }

    let n = adjacency.len();
    let mut color = vec![Color::White; n];
    let mut parent = vec![usize::MAX; n];

    for start in 0..n {
        if color[start] != Color::White {
            continue;
        }
        let mut stack = vec![(start, 0usize)];
        color[start] = Color::Gray;
        while let Some(&mut (node, ref mut next)) = stack.last_mut() {
            if *next < adjacency[node].len() {
                let child = adjacency[node][*next];
                *next += 1;
                match color[child] {
                    Color::White => {
                        color[child] = Color::Gray;
                        parent[child] = node;
                        stack.push((child, 0));
                    }
                    Color::Gray => {
                        // Back edge: reconstruct the cycle via the parent map.
                        let mut cycle = vec![child];
                        let mut cur = node;
                        while cur != child {
                            cycle.push(cur);
                            cur = parent[cur];
                        }
                        return Some(cycle);
                    }
                    Color::Black => {}
                }
            } else {
                color[node] = Color::Black;
                stack.pop();
            }
        }
    }
    None
}

/// Kahn's algorithm. Zero-in-degree nodes are discovered and emitted in the
/// order they appear in `order` (the source graph's node iteration order).
fn topological_sort(order: &[&NodeId], adjacency: &[Vec<usize>]) -> Vec<NodeId> {
    let n = order.len();
    let mut in_degree = vec![0usize; n];
    for edges in adjacency {
        for &to in edges {
            in_degree[to] += 1;
        }
    }
    let mut queue: VecDeque<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
    let mut result = Vec::with_capacity(n);
    while let Some(idx) = queue.pop_front() {
        result.push(order[idx].clone());
        for &to in &adjacency[idx] {
            in_degree[to] -= 1;
            if in_degree[to] == 0 {
                queue.push_back(to);
            }
        }
    }
    result
}

fn extract_dependencies(known: &HashMap<&NodeId, (&GraphNode, NodeKind)>) -> Dependencies {
    let mut deps = Dependencies::default();
    for (node, _) in known.values() {
        for (name, value) in &node.params {
            let strings: Vec<String> = match value {
                ParamValue::String(s) => vec![s.clone()],
                ParamValue::StringList(list) => list.clone(),
                _ => continue,
            };
            match name.as_str() {
                "faderId" => deps.fader_ids.extend(strings),
                "buttonId" => deps.button_ids.extend(strings),
                "groupId" | "groupIds" => deps.group_ids.extend(strings),
                "fixtureId" | "fixtureIds" => deps.fixture_ids.extend(strings),
                "presetId" => deps.preset_ids.extend(strings),
                _ => {}
            }
        }
    }
    deps
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::entity::GraphNode;

    fn node(id: &str, node_type: &str, params: Vec<(&str, ParamValue)>) -> GraphNode {
        GraphNode {
            id: id.into(),
            node_type: node_type.to_string(),
            params: params.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
        }
    }

    fn edge(id: &str, from_node: &str, from_port: &str, to_node: &str, to_port: &str) -> GraphEdge {
        GraphEdge {
            id: id.to_string(),
            from: Endpoint {
                node_id: from_node.into(),
                port: from_port.to_string(),
            },
            to: Endpoint {
                node_id: to_node.into(),
                port: to_port.to_string(),
            },
        }
    }

    fn graph(nodes: Vec<GraphNode>, edges: Vec<GraphEdge>) -> Graph {
        Graph {
            id: "g".into(),
            revision: 1,
            name: "g".into(),
            nodes,
            edges,
            enabled: true,
        }
    }

    #[test]
    fn test_empty_graph_compiles() {
        let result = compile(&graph(vec![], vec![]));
        assert!(result.ok);
        assert!(result.errors.is_empty());
    }

    #[test]
    fn test_unknown_node_type() {
        let result = compile(&graph(vec![node("a", "Bogus", vec![])], vec![]));
        assert!(!result.ok);
        assert_eq!(result.errors[0].code, CompileErrorCode::UnknownNodeType);
    }

    #[test]
    fn test_cycle_detected() {
        let g = graph(
            vec![node("a", "Add", vec![]), node("b", "Add", vec![])],
            vec![
                edge("e1", "a", "result", "b", "a"),
                edge("e2", "b", "result", "a", "a"),
            ],
        );
        let result = compile(&g);
        assert!(!result.ok);
        assert!(result.errors.iter().any(|e| e.code == CompileErrorCode::CycleDetected));
    }

    #[test]
    fn test_type_mismatch() {
        let g = graph(
            vec![node("time", "Time", vec![]), node("mix", "MixColor", vec![])],
            vec![edge("e1", "time", "t", "mix", "a")],
        );
        let result = compile(&g);
        assert!(!result.ok);
        assert!(result.errors.iter().any(|e| e.code == CompileErrorCode::TypeMismatch));
    }

    #[test]
    fn test_compile_soundness_topo_order() {
        let g = graph(
            vec![
                node("s1", "Scalar", vec![("value", ParamValue::Number(1.0))]),
                node("s2", "Scalar", vec![("value", ParamValue::Number(2.0))]),
                node("sum", "Add", vec![]),
            ],
            vec![
                edge("e1", "s1", "value", "sum", "a"),
                edge("e2", "s2", "value", "sum", "b"),
            ],
        );
        let compiled = try_compile(&g).expect("should compile");
        let pos = |id: &str| compiled.evaluation_order.iter().position(|n| n.0 == id).unwrap();
        assert!(pos("s1") < pos("sum"));
        assert!(pos("s2") < pos("sum"));
    }

    #[test]
    fn test_duplicate_driver() {
        let g = graph(
            vec![
                node("s1", "Scalar", vec![("value", ParamValue::Number(1.0))]),
                node("s2", "Scalar", vec![("value", ParamValue::Number(2.0))]),
                node("sum", "Add", vec![]),
            ],
            vec![
                edge("e1", "s1", "value", "sum", "a"),
                edge("e2", "s2", "value", "sum", "a"),
            ],
        );
        let result = compile(&g);
        assert!(!result.ok);
        assert!(result.errors.iter().any(|e| e.code == CompileErrorCode::InvalidParam));
    }

    #[test]
    fn test_select_group_accepts_singular_group_id_alias() {
        let g = graph(
            vec![node(
                "sel",
                "SelectGroup",
                vec![("groupId", ParamValue::String("frontwash".into()))],
            )],
            vec![],
        );
        let result = compile(&g);
        assert!(result.ok, "errors: {:?}", result.errors);
        assert!(result.dependencies.group_ids.contains("frontwash"));
    }

    #[test]
    fn test_dependency_extraction() {
        let g = graph(
            vec![node("f", "Fader", vec![("faderId", ParamValue::String("master".into()))])],
            vec![],
        );
        let result = compile(&g);
        assert!(result.ok);
        assert!(result.dependencies.fader_ids.contains("master"));
    }
}
