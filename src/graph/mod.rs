// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Immutable description of a stream graph.
//!
//! A graph is a tree of [`Module`]s. Leaves wrap a single [`GraphStage`]
//! (`crate::traits::GraphStage`); composites group sub-modules together with
//! the wiring between their ports and a [`MatNode`] describing how the
//! materialized value of the whole is computed from its leaves. Fusing turns
//! such a tree into a flat list of islands, each carrying an `Assembly`.

mod attributes;
mod builder;
mod element;
mod mat;
mod module;
mod port;
mod shape;

pub use attributes::{Attribute, Attributes};
pub use builder::GraphBuilder;
pub use element::{downcast_element, Element};
pub use mat::{MatCombine, MatKind, MatNode, MatTransform, MatValue};
pub use module::{
    CompositeModule, CopiedModule, FusedModule, IslandModule, Module, ModuleId, StageModule,
    StructuralInfo,
};
pub use port::{InPort, Inlet, OutPort, Outlet, PortId};
pub use shape::Shape;
