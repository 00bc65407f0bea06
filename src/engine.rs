//! The runtime engine: a `Stopped -> Running -> Stopped` state machine that
//! drives a fixed-rate tick loop on a dedicated thread, evaluating every
//! loaded graph instance, merging their writes, and fanning frames out.

use std::collections::{HashMap, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use log::error;

use crate::artnet::ArtNetBridge;
use crate::entity::{EntityRegistry, FixtureId, GraphId, NodeId, PortId};
use crate::error::EngineError;
use crate::graph::catalog::NodeKind;
use crate::graph::compiler::{try_compile, CompiledGraph};
use crate::graph::eval::{evaluate, harvest_write, init_state, EvalContext, NodeState};
use crate::input::{InputSnapshot, InputState};
use crate::value::{AttributeBundle, Selection, Value};

/// One `WriteAttributes` sink's resolved output for one tick.
#[derive(Clone, Debug)]
pub struct WriteRecord {
    pub node_id: NodeId,
    pub selection: Selection,
    pub bundle: AttributeBundle,
    pub priority: i64,
}

/// Lightweight status of one sink's last write, for the HTTP/WS status API.
/// The full bundle is not exposed here — `FrameOutput` carries the merged
/// per-fixture result, which is what clients actually render.
#[derive(Clone, Debug, serde::Serialize)]
pub struct WriteOutputInfo {
    pub node_id: NodeId,
    pub fixture_count: usize,
    pub priority: i64,
}

#[derive(Clone, Debug, Default)]
pub struct FrameOutput {
    pub frame_number: u64,
    pub monotonic_timestamp: Duration,
    pub fixtures: HashMap<FixtureId, AttributeBundle>,
}

#[derive(Clone, Debug, Default, serde::Serialize)]
pub struct EngineStats {
    pub running: bool,
    pub frame_number: u64,
    pub target_hz: f64,
    pub loaded_graphs: usize,
    pub enabled_graphs: usize,
}

struct GraphInstance {
    compiled: CompiledGraph,
    state: HashMap<NodeId, Option<NodeState>>,
    enabled: bool,
    last_writes: Vec<WriteRecord>,
    load_order: u64,
}

enum LoadOutcome {
    Loaded(GraphInstance),
    NotFound,
    CompileFailed,
}

fn load_graph_instance(id: &GraphId, registry: &dyn EntityRegistry, load_order: u64) -> LoadOutcome {
    let Some(graph) = registry.list_all_graphs().into_iter().find(|g| &g.id == id) else {
        return LoadOutcome::NotFound;
    };
    let Ok(compiled) = try_compile(&graph) else {
        return LoadOutcome::CompileFailed;
    };
    let state = compiled
        .nodes
        .iter()
        .map(|(id, node)| (id.clone(), init_state(node.kind, &node.params)))
        .collect();
    LoadOutcome::Loaded(GraphInstance {
        compiled,
        state,
        enabled: graph.enabled,
        last_writes: Vec::new(),
        load_order,
    })
}

/// Runs one instance's tick: evaluates every node in topological order,
/// catching evaluator panics per §4.6 failure semantics, and harvests
/// `WriteAttributes` sinks inline since their dependencies are guaranteed
/// already evaluated by that point in the order.
fn tick_instance(
    graph_id: &GraphId,
    instance: &mut GraphInstance,
    time: f64,
    delta_time: f64,
    input: &InputSnapshot,
    registry: &dyn EntityRegistry,
) -> Vec<WriteRecord> {
    let mut outputs: HashMap<NodeId, HashMap<PortId, Value>> =
        HashMap::with_capacity(instance.compiled.evaluation_order.len());
    let mut writes = Vec::new();

    for node_id in &instance.compiled.evaluation_order {
        let Some(node) = instance.compiled.nodes.get(node_id) else {
            continue;
        };
        let kind = node.kind;
        let ctx = EvalContext {
            time,
            delta_time,
            input,
            registry,
            drivers: &instance.compiled.drivers,
            outputs: &outputs,
        };
        let state_slot = instance
            .state
            .entry(node_id.clone())
            .or_insert_with(|| init_state(kind, &node.params));

        let out = match panic::catch_unwind(AssertUnwindSafe(|| evaluate(node_id, kind, &node.params, state_slot, &ctx))) {
            Ok(out) => out,
            Err(_) => {
                error!("node {node_id} ({kind}) in graph {graph_id} panicked during evaluation; outputs treated as empty");
                HashMap::new()
            }
        };

        if kind == NodeKind::WriteAttributes {
            if let Some((selection, bundle, priority)) = harvest_write(node_id, &node.params, &ctx) {
                writes.push(WriteRecord {
                    node_id: node_id.clone(),
                    selection,
                    bundle,
                    priority,
                });
            }
        }

        outputs.insert(node_id.clone(), out);
    }

    writes
}

/// A bounded, drop-oldest mailbox for one frame subscriber.
struct SubscriberSlot {
    buffer: Mutex<VecDeque<Arc<FrameOutput>>>,
    capacity: usize,
}

impl SubscriberSlot {
    fn push(&self, frame: Arc<FrameOutput>) {
        let mut buf = self.buffer.lock().unwrap();
        if buf.len() >= self.capacity {
            buf.pop_front();
        }
        buf.push_back(frame);
    }
}

type SubscriberList = Arc<Mutex<Vec<(u64, Arc<SubscriberSlot>)>>>;

/// A handle returned by [`Engine::subscribe`]. Dropping it unsubscribes.
pub struct FrameSubscription {
    id: u64,
    slot: Arc<SubscriberSlot>,
    subscribers: SubscriberList,
}

impl FrameSubscription {
    /// Drains every frame queued since the last call, oldest first. Never
    /// blocks — callers on the tick thread must not wait on this.
    pub fn drain(&self) -> Vec<Arc<FrameOutput>> {
        self.slot.buffer.lock().unwrap().drain(..).collect()
    }
}

impl Drop for FrameSubscription {
    fn drop(&mut self) {
        self.subscribers.lock().unwrap().retain(|(id, _)| *id != self.id);
    }
}

enum EngineCommand {
    LoadGraph(GraphId, Sender<Result<(), EngineError>>),
    UnloadGraph(GraphId, Sender<Result<(), EngineError>>),
    SetGraphEnabled(GraphId, bool, Sender<Result<(), EngineError>>),
    ReloadAllGraphs,
    UnloadAllGraphs,
    Stop,
}

#[derive(Default)]
struct Snapshot {
    running: bool,
    frame_number: u64,
    graph_enabled: HashMap<GraphId, bool>,
    write_outputs: HashMap<GraphId, Vec<WriteOutputInfo>>,
}

/// One explicit, owned `Engine` value; no process-wide singleton. Everything
/// the tick thread touches (registry, input state, Art-Net bridge) is
/// injected at construction.
pub struct Engine {
    commands: Mutex<Option<Sender<EngineCommand>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
    snapshot: Arc<ArcSwap<Snapshot>>,
    subscribers: SubscriberList,
    next_sub_id: AtomicU64,
    target_hz: f64,
    registry: Arc<dyn EntityRegistry>,
    input: Arc<InputState>,
    artnet: Option<Arc<ArtNetBridge>>,
}

impl Engine {
    pub fn new(
        registry: Arc<dyn EntityRegistry>,
        input: Arc<InputState>,
        artnet: Option<ArtNetBridge>,
        target_hz: f64,
    ) -> Self {
        Self {
            commands: Mutex::new(None),
            handle: Mutex::new(None),
            snapshot: Arc::new(ArcSwap::from_pointee(Snapshot::default())),
            subscribers: Arc::new(Mutex::new(Vec::new())),
            next_sub_id: AtomicU64::new(0),
            target_hz,
            registry,
            input,
            artnet: artnet.map(Arc::new),
        }
    }

    /// Transitions `Stopped -> Running`. A no-op if already running.
    pub fn start(&self) {
        let mut handle = self.handle.lock().unwrap();
        if handle.is_some() {
            return;
        }
        let (tx, rx) = mpsc::channel();
        *self.commands.lock().unwrap() = Some(tx);

        let registry = self.registry.clone();
        let input = self.input.clone();
        let artnet = self.artnet.clone();
        let snapshot = self.snapshot.clone();
        let subscribers = self.subscribers.clone();
        let target_hz = self.target_hz;

        *handle = Some(thread::spawn(move || {
            run_tick_loop(registry, input, artnet, target_hz, rx, snapshot, subscribers);
        }));
    }

    /// Transitions `Running -> Stopped`. Any in-flight tick completes
    /// before this returns.
    pub fn stop(&self) {
        if let Some(tx) = self.commands.lock().unwrap().take() {
            let _ = tx.send(EngineCommand::Stop);
        }
        if let Some(handle) = self.handle.lock().unwrap().take() {
            let _ = handle.join();
        }
    }

    fn send(&self, cmd: EngineCommand) {
        if let Some(tx) = self.commands.lock().unwrap().as_ref() {
            let _ = tx.send(cmd);
        }
    }

    /// Fetches, compiles, and loads a graph with empty per-node state.
    /// Fails with [`EngineError::GraphNotFound`] if no such graph is
    /// registered, or [`EngineError::CompileFailed`] if it doesn't compile.
    pub fn load_graph(&self, id: GraphId) -> Result<(), EngineError> {
        let (tx, rx) = mpsc::channel();
        let fallback = id.clone();
        self.send(EngineCommand::LoadGraph(id, tx));
        rx.recv().unwrap_or(Err(EngineError::GraphNotFound(fallback)))
    }

    /// Removes a loaded graph instance. Fails with
    /// [`EngineError::InstanceNotFound`] if it isn't currently loaded.
    pub fn unload_graph(&self, id: GraphId) -> Result<(), EngineError> {
        let (tx, rx) = mpsc::channel();
        let fallback = id.clone();
        self.send(EngineCommand::UnloadGraph(id, tx));
        rx.recv().unwrap_or(Err(EngineError::InstanceNotFound(fallback)))
    }

    /// Toggles a loaded instance's enabled flag without touching its
    /// per-node state. Fails with [`EngineError::InstanceNotFound`] if it
    /// isn't currently loaded.
    pub fn set_graph_enabled(&self, id: GraphId, enabled: bool) -> Result<(), EngineError> {
        let (tx, rx) = mpsc::channel();
        let fallback = id.clone();
        self.send(EngineCommand::SetGraphEnabled(id, enabled, tx));
        rx.recv().unwrap_or(Err(EngineError::InstanceNotFound(fallback)))
    }

    pub fn reload_all_graphs(&self) {
        self.send(EngineCommand::ReloadAllGraphs);
    }

    pub fn unload_all_graphs(&self) {
        self.send(EngineCommand::UnloadAllGraphs);
    }

    /// Registers a bounded, drop-oldest frame subscription.
    pub fn subscribe(&self, capacity: usize) -> FrameSubscription {
        let id = self.next_sub_id.fetch_add(1, Ordering::Relaxed);
        let slot = Arc::new(SubscriberSlot {
            buffer: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        });
        self.subscribers.lock().unwrap().push((id, slot.clone()));
        FrameSubscription {
            id,
            slot,
            subscribers: self.subscribers.clone(),
        }
    }

    pub fn get_stats(&self) -> EngineStats {
        let snap = self.snapshot.load();
        EngineStats {
            running: snap.running,
            frame_number: snap.frame_number,
            target_hz: self.target_hz,
            loaded_graphs: snap.graph_enabled.len(),
            enabled_graphs: snap.graph_enabled.values().filter(|&&e| e).count(),
        }
    }

    pub fn get_write_outputs(&self, id: &GraphId) -> Vec<WriteOutputInfo> {
        self.snapshot.load().write_outputs.get(id).cloned().unwrap_or_default()
    }
}

fn run_tick_loop(
    registry: Arc<dyn EntityRegistry>,
    input: Arc<InputState>,
    artnet: Option<Arc<ArtNetBridge>>,
    target_hz: f64,
    commands: Receiver<EngineCommand>,
    snapshot: Arc<ArcSwap<Snapshot>>,
    subscribers: SubscriberList,
) {
    let period = Duration::from_secs_f64(1.0 / target_hz);
    let start = Instant::now();
    let mut last_tick = start;
    let mut frame_number = 0u64;
    let mut next_load_order = 0u64;
    let mut instances: HashMap<GraphId, GraphInstance> = HashMap::new();

    loop {
        loop {
            match commands.try_recv() {
                Ok(EngineCommand::LoadGraph(id, resp)) => {
                    let result = match load_graph_instance(&id, registry.as_ref(), next_load_order) {
                        LoadOutcome::Loaded(instance) => {
                            instances.insert(id.clone(), instance);
                            next_load_order += 1;
                            Ok(())
                        }
                        LoadOutcome::NotFound => Err(EngineError::GraphNotFound(id.clone())),
                        LoadOutcome::CompileFailed => Err(EngineError::CompileFailed(id.clone())),
                    };
                    let _ = resp.send(result);
                }
                Ok(EngineCommand::UnloadGraph(id, resp)) => {
                    let result = if instances.remove(&id).is_some() {
                        Ok(())
                    } else {
                        Err(EngineError::InstanceNotFound(id.clone()))
                    };
                    let _ = resp.send(result);
                }
                Ok(EngineCommand::SetGraphEnabled(id, enabled, resp)) => {
                    let result = if let Some(instance) = instances.get_mut(&id) {
                        instance.enabled = enabled;
                        Ok(())
                    } else {
                        Err(EngineError::InstanceNotFound(id.clone()))
                    };
                    let _ = resp.send(result);
                }
                Ok(EngineCommand::ReloadAllGraphs) => {
                    let ids: Vec<GraphId> = instances.keys().cloned().collect();
                    for id in ids {
                        match load_graph_instance(&id, registry.as_ref(), next_load_order) {
                            LoadOutcome::Loaded(instance) => {
                                instances.insert(id, instance);
                                next_load_order += 1;
                            }
                            LoadOutcome::NotFound | LoadOutcome::CompileFailed => {
                                instances.remove(&id);
                            }
                        }
                    }
                }
                Ok(EngineCommand::UnloadAllGraphs) => instances.clear(),
                Ok(EngineCommand::Stop) | Err(mpsc::TryRecvError::Disconnected) => {
                    if let Some(bridge) = &artnet {
                        bridge.blackout();
                    }
                    snapshot.store(Arc::new(Snapshot {
                        running: false,
                        frame_number,
                        ..Default::default()
                    }));
                    return;
                }
                Err(mpsc::TryRecvError::Empty) => break,
            }
        }

        let tick_start = Instant::now();
        let delta_time = tick_start.duration_since(last_tick).as_secs_f64();
        let time = tick_start.duration_since(start).as_secs_f64();
        last_tick = tick_start;

        let input_snapshot = input.snapshot();
        let mut all_writes: Vec<(u64, WriteRecord)> = Vec::new();
        let mut write_outputs: HashMap<GraphId, Vec<WriteOutputInfo>> = HashMap::new();
        let mut graph_enabled: HashMap<GraphId, bool> = HashMap::new();

        for (graph_id, instance) in instances.iter_mut() {
            graph_enabled.insert(graph_id.clone(), instance.enabled);
            if !instance.enabled {
                continue;
            }
            let writes = tick_instance(graph_id, instance, time, delta_time, &input_snapshot, registry.as_ref());
            write_outputs.insert(
                graph_id.clone(),
                writes
                    .iter()
                    .map(|w| WriteOutputInfo {
                        node_id: w.node_id.clone(),
                        fixture_count: w.selection.len(),
                        priority: w.priority,
                    })
                    .collect(),
            );
            instance.last_writes = writes.clone();
            all_writes.extend(writes.into_iter().map(|w| (instance.load_order, w)));
        }

        all_writes.sort_by(|(order_a, a), (order_b, b)| {
            a.priority
                .cmp(&b.priority)
                .then(order_a.cmp(order_b))
                .then(a.node_id.0.cmp(&b.node_id.0))
        });

        let mut fixtures: HashMap<FixtureId, AttributeBundle> = HashMap::new();
        for (_, record) in &all_writes {
            for fixture_id in &record.selection {
                fixtures.entry(fixture_id.clone()).or_default().overlay(&record.bundle);
            }
        }

        if let Some(bridge) = &artnet {
            bridge.send_frame(&fixtures, registry.as_ref());
        }

        input.end_frame();

        let frame = Arc::new(FrameOutput {
            frame_number,
            monotonic_timestamp: tick_start.duration_since(start),
            fixtures,
        });
        frame_number += 1;

        for (_, slot) in subscribers.lock().unwrap().iter() {
            slot.push(frame.clone());
        }

        snapshot.store(Arc::new(Snapshot {
            running: true,
            frame_number,
            graph_enabled,
            write_outputs,
        }));

        let elapsed = tick_start.elapsed();
        if elapsed < period {
            thread::sleep(period - elapsed);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::entity::{Graph, GraphNode, InMemoryRegistry, ParamValue, RegistryData};

    fn scalar_graph(id: &str, value: f64) -> Graph {
        Graph {
            id: id.into(),
            revision: 1,
            name: id.to_string(),
            nodes: vec![GraphNode {
                id: "s".into(),
                node_type: "Scalar".to_string(),
                params: [("value".to_string(), ParamValue::Number(value))].into_iter().collect(),
            }],
            edges: vec![],
            enabled: true,
        }
    }

    #[test]
    fn test_engine_loads_and_runs_empty_graph() {
        let mut data = RegistryData::default();
        data.graphs.insert("g".into(), Graph {
            id: "g".into(),
            revision: 1,
            name: "g".into(),
            nodes: vec![],
            edges: vec![],
            enabled: true,
        });
        let registry: Arc<dyn EntityRegistry> = Arc::new(InMemoryRegistry::new(data));
        let engine = Engine::new(registry, Arc::new(InputState::new()), None, 60.0);
        engine.start();
        assert!(engine.load_graph("g".into()).is_ok());
        std::thread::sleep(Duration::from_millis(50));
        let outputs = engine.get_write_outputs(&"g".into());
        assert!(outputs.is_empty());
        engine.stop();
    }

    #[test]
    fn test_load_graph_rejects_unknown_id() {
        let registry: Arc<dyn EntityRegistry> = Arc::new(InMemoryRegistry::new(RegistryData::default()));
        let engine = Engine::new(registry, Arc::new(InputState::new()), None, 60.0);
        engine.start();
        assert!(matches!(
            engine.load_graph("missing".into()),
            Err(crate::error::EngineError::GraphNotFound(_))
        ));
        engine.stop();
    }

    #[test]
    fn test_scalar_graph_compiles_and_loads() {
        let mut data = RegistryData::default();
        let g = scalar_graph("g", 0.5);
        data.graphs.insert(g.id.clone(), g);
        let registry: Arc<dyn EntityRegistry> = Arc::new(InMemoryRegistry::new(data));
        let engine = Engine::new(registry, Arc::new(InputState::new()), None, 60.0);
        engine.start();
        assert!(engine.load_graph("g".into()).is_ok());
        engine.stop();
    }

    #[test]
    fn test_unload_graph_rejects_unloaded_id() {
        let registry: Arc<dyn EntityRegistry> = Arc::new(InMemoryRegistry::new(RegistryData::default()));
        let engine = Engine::new(registry, Arc::new(InputState::new()), None, 60.0);
        engine.start();
        assert!(matches!(
            engine.unload_graph("missing".into()),
            Err(crate::error::EngineError::InstanceNotFound(_))
        ));
        engine.stop();
    }

    #[test]
    fn test_set_graph_enabled_rejects_unloaded_id() {
        let registry: Arc<dyn EntityRegistry> = Arc::new(InMemoryRegistry::new(RegistryData::default()));
        let engine = Engine::new(registry, Arc::new(InputState::new()), None, 60.0);
        engine.start();
        assert!(matches!(
            engine.set_graph_enabled("missing".into(), true),
            Err(crate::error::EngineError::InstanceNotFound(_))
        ));
        engine.stop();
    }
}
