//! A real-time lighting control dataflow engine: graph compiler, runtime
//! engine, and Art-Net bridge. CRUD, persistence, and wire framing for HTTP
//! and WebSocket control surfaces are external collaborators, reached only
//! through [`entity::EntityRegistry`], [`input::InputState`], and the
//! engine's frame-subscription API.

pub mod artnet;
pub mod config;
pub mod engine;
pub mod entity;
pub mod error;
pub mod graph;
pub mod input;
pub mod value;
