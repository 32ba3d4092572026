// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::errors::StreamError;
use thiserror::Error;

/// Structural problems found while building, fusing or materializing a graph.
///
/// These are raised before any stage runs, so nothing needs to be torn down
/// when one is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    /// The same port object sits at two different positions of a stage shape.
    #[error("port '{port}' was shared among multiple stages")]
    SharedPort { port: String },

    /// A connected port has no handler installed by its stage logic.
    #[error("no handler defined in stage '{stage}' for port '{port}'")]
    MissingHandler { stage: String, port: String },

    /// A stage logic declares a different number of ports than its shape.
    #[error("stage '{stage}' logic does not match its shape")]
    LogicShapeMismatch { stage: String },

    /// Building a stage logic failed.
    #[error("stage '{stage}' failed to create its logic: {cause}")]
    LogicCreation { stage: String, cause: StreamError },

    /// The parallel arrays of an assembly do not line up.
    #[error("malformed assembly: {detail}")]
    MalformedAssembly { detail: String },

    /// While fusing, a port had no pending copy mapping, or more than one where
    /// exactly one was required.
    #[error("unresolved port mapping for '{port}'")]
    UnresolvedPortMapping { port: String },

    /// An output was wired twice, or an internal output of an island was never consumed.
    #[error("output '{port}' is not consumed exactly once")]
    DanglingConnection { port: String },

    /// A materialized-value computation references a module that produced no value.
    #[error("no materialized value for module {module}")]
    MissingMaterializedValue { module: u64 },

    /// A materialized-value source refers to a computation its enclosing graph does not have.
    #[error("materialized-value source '{stage}' refers to a computation outside its graph")]
    DetachedMaterializedValueSource { stage: String },

    /// A builder was asked to connect a port it does not own.
    #[error("port '{port}' is not part of this graph")]
    UnknownPort { port: String },

    /// A builder was asked to connect a port twice.
    #[error("port '{port}' is already connected")]
    AlreadyConnected { port: String },
}

/// A failure raised while the interpreter was not running any stage.
///
/// Stage failures are contained by failing the stage; a failure raised by a
/// boundary handler has no stage to contain it and aborts the whole island.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InterpreterError {
    #[error("boundary handler failed on connection {connection}: {cause}")]
    BoundaryFailure {
        connection: usize,
        cause: StreamError,
    },
}

impl From<InterpreterError> for StreamError {
    fn from(err: InterpreterError) -> Self {
        match err {
            InterpreterError::BoundaryFailure { cause, .. } => cause,
        }
    }
}
