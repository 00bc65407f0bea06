//! Structured error types for the compiler, engine, and config loader.

use thiserror::Error;

use crate::entity::GraphId;

/// The closed set of compile error codes, per the wire contract.
#[derive(Clone, Copy, PartialEq, Eq, Debug, strum_macros::Display, serde::Serialize)]
pub enum CompileErrorCode {
    UnknownNodeType,
    InvalidParam,
    TypeMismatch,
    MissingConnection,
    CycleDetected,
}

/// A single compile diagnostic, scoped to a node and optionally a port.
#[derive(Clone, Debug, serde::Serialize)]
pub struct CompileError {
    pub node_id: String,
    pub port: Option<String>,
    pub message: String,
    pub code: CompileErrorCode,
}

impl CompileError {
    pub fn new(node_id: impl Into<String>, code: CompileErrorCode, message: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            port: None,
            message: message.into(),
            code,
        }
    }

    pub fn with_port(mut self, port: impl Into<String>) -> Self {
        self.port = Some(port.into());
        self
    }
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("graph {0} is not loaded")]
    GraphNotFound(GraphId),

    #[error("graph {0} failed to compile")]
    CompileFailed(GraphId),

    #[error("no running instance for graph {0}")]
    InstanceNotFound(GraphId),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read show file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse show file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}
