//! The dataflow graph subsystem: catalog, compiler, and evaluators.

pub mod catalog;
pub mod compiler;
pub mod eval;

pub use catalog::{NodeDefinition, NodeKind, ParamDefinition, ParamType, PortDefinition};
pub use compiler::{compile, try_compile, CompileResult, CompiledGraph, CompiledNode, Dependencies};
pub use eval::{evaluate, harvest_write, init_state, EvalContext, NodeState};
