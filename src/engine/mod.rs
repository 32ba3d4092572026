// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod assembly;
pub mod boundary;
pub mod context;
pub mod event_queue;
pub mod fusing;
pub mod host;
pub mod interpreter;
pub mod logic;
pub mod materializer;
pub mod port_state;
pub mod publisher;
pub mod shell;
#[cfg(test)]
pub mod integration_tests;

pub use assembly::{Assembly, MaterializedAssembly, Owner};
pub use context::{AsyncCallback, StageContext};
pub use host::{GraphInterpreterHost, HostHandle, HostMessage, ShellRegistry};
pub use interpreter::{BoundaryHandler, GraphInterpreter, InterpreterSnapshot, NoBoundary};
pub use logic::StageLogic;
pub use materializer::{Materialized, Materializer};
pub use publisher::ExposedPublisher;
pub use shell::{GraphInterpreterShell, ShellId};
