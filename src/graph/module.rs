// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::engine::Assembly;
use crate::graph::{Attributes, Inlet, MatNode, Outlet, PortId, Shape};
use crate::traits::GraphStage;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_MODULE_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a module object; materialized-value trees refer to leaves by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ModuleId(u64);

impl ModuleId {
    pub fn next() -> Self {
        ModuleId(NEXT_MODULE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m{}", self.0)
    }
}

/// A single stage.
pub struct StageModule {
    id: ModuleId,
    stage: Arc<dyn GraphStage>,
    attributes: Attributes,
}

impl StageModule {
    pub fn new(stage: Arc<dyn GraphStage>) -> Self {
        let attributes = stage.initial_attributes();
        Self::with_attributes(stage, attributes)
    }

    pub fn with_attributes(stage: Arc<dyn GraphStage>, attributes: Attributes) -> Self {
        Self {
            id: ModuleId::next(),
            stage,
            attributes,
        }
    }

    pub fn id(&self) -> ModuleId {
        self.id
    }

    pub fn stage(&self) -> &Arc<dyn GraphStage> {
        &self.stage
    }

    pub fn shape(&self) -> &Shape {
        self.stage.shape()
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }
}

/// A group of sub-modules plus the wiring between their ports.
pub struct CompositeModule {
    id: ModuleId,
    sub_modules: Vec<Module>,
    shape: Shape,
    downstreams: Vec<(Outlet, Inlet)>,
    mat: MatNode,
    attributes: Attributes,
}

impl CompositeModule {
    pub fn new(
        sub_modules: Vec<Module>,
        shape: Shape,
        downstreams: Vec<(Outlet, Inlet)>,
        mat: MatNode,
        attributes: Attributes,
    ) -> Self {
        Self {
            id: ModuleId::next(),
            sub_modules,
            shape,
            downstreams,
            mat,
            attributes,
        }
    }

    pub fn downstreams(&self) -> &[(Outlet, Inlet)] {
        &self.downstreams
    }
}

/// Another module seen through a fresh set of ports.
pub struct CopiedModule {
    id: ModuleId,
    shape: Shape,
    attributes: Attributes,
    copy_of: Module,
}

impl CopiedModule {
    pub fn new(shape: Shape, attributes: Attributes, copy_of: Module) -> Self {
        Self {
            id: ModuleId::next(),
            shape,
            attributes,
            copy_of,
        }
    }

    pub fn id(&self) -> ModuleId {
        self.id
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn copy_of(&self) -> &Module {
        &self.copy_of
    }

    /// Same identity, ports and attributes over a different module.
    pub fn replacing(&self, copy_of: Module) -> Self {
        Self {
            id: self.id,
            shape: self.shape.clone(),
            attributes: self.attributes.clone(),
            copy_of,
        }
    }
}

/// A fused island: stages that run on one interpreter.
///
/// `leaves` are the copied stage modules in assembly stage order, and
/// `internal` is the wiring between them in terms of the leaves' ports. The
/// island's shape is made of the leaf ports that were left open.
pub struct IslandModule {
    id: ModuleId,
    assembly: Arc<Assembly>,
    shape: Shape,
    attributes: Attributes,
    leaves: Vec<Module>,
    internal: Vec<(Outlet, Inlet)>,
}

impl IslandModule {
    pub fn new(
        assembly: Arc<Assembly>,
        shape: Shape,
        attributes: Attributes,
        leaves: Vec<Module>,
        internal: Vec<(Outlet, Inlet)>,
    ) -> Self {
        Self {
            id: ModuleId::next(),
            assembly,
            shape,
            attributes,
            leaves,
            internal,
        }
    }

    pub fn id(&self) -> ModuleId {
        self.id
    }

    pub fn assembly(&self) -> &Arc<Assembly> {
        &self.assembly
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn leaves(&self) -> &[Module] {
        &self.leaves
    }

    pub fn internal(&self) -> &[(Outlet, Inlet)] {
        &self.internal
    }

    /// Same identity and wiring running a different assembly.
    pub fn with_assembly(&self, assembly: Arc<Assembly>) -> Self {
        Self {
            id: self.id,
            assembly,
            shape: self.shape.clone(),
            attributes: self.attributes.clone(),
            leaves: self.leaves.clone(),
            internal: self.internal.clone(),
        }
    }

    pub fn to_json(&self) -> Value {
        json!({
            "id": self.id.value(),
            "attributes": self.attributes,
            "inlets": self.shape.inlets().iter().map(ToString::to_string).collect::<Vec<_>>(),
            "outlets": self.shape.outlets().iter().map(ToString::to_string).collect::<Vec<_>>(),
            "assembly": self.assembly.to_json(),
        })
    }
}

/// Wiring and materialized-value computation of a fused graph.
#[derive(Clone)]
pub struct StructuralInfo {
    downstreams: BTreeMap<PortId, (Outlet, Inlet)>,
    upstreams: BTreeMap<PortId, Outlet>,
    mat: MatNode,
}

impl StructuralInfo {
    pub fn new(
        downstreams: BTreeMap<PortId, (Outlet, Inlet)>,
        upstreams: BTreeMap<PortId, Outlet>,
        mat: MatNode,
    ) -> Self {
        Self {
            downstreams,
            upstreams,
            mat,
        }
    }

    /// Every wire of the graph, keyed by the outlet id.
    pub fn downstreams(&self) -> &BTreeMap<PortId, (Outlet, Inlet)> {
        &self.downstreams
    }

    pub fn upstream_of(&self, inlet: &Inlet) -> Option<&Outlet> {
        self.upstreams.get(&inlet.id())
    }

    pub fn mat(&self) -> &MatNode {
        &self.mat
    }
}

/// The output of fusing: islands plus the structural info that joins them.
pub struct FusedModule {
    id: ModuleId,
    islands: Vec<Module>,
    shape: Shape,
    info: StructuralInfo,
    attributes: Attributes,
}

impl FusedModule {
    pub fn new(
        islands: Vec<Module>,
        shape: Shape,
        info: StructuralInfo,
        attributes: Attributes,
    ) -> Self {
        Self {
            id: ModuleId::next(),
            islands,
            shape,
            info,
            attributes,
        }
    }

    pub fn id(&self) -> ModuleId {
        self.id
    }

    pub fn islands(&self) -> &[Module] {
        &self.islands
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn info(&self) -> &StructuralInfo {
        &self.info
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    /// Wires whose two ends live in different islands.
    pub fn cross_island_wires(&self) -> Vec<(Outlet, Inlet)> {
        let internal: std::collections::HashSet<PortId> = self
            .islands
            .iter()
            .flat_map(|m| m.downstreams())
            .map(|(out, _)| out.id())
            .collect();
        self.info
            .downstreams
            .values()
            .filter(|(out, _)| !internal.contains(&out.id()))
            .cloned()
            .collect()
    }

    /// Islands, cross-island wires and the materialized-value tree as JSON.
    pub fn snapshot(&self) -> Value {
        let islands: Vec<Value> = self
            .islands
            .iter()
            .filter_map(|m| match m {
                Module::Island(island) => Some(island.to_json()),
                _ => None,
            })
            .collect();
        let wires: Vec<Value> = self
            .cross_island_wires()
            .iter()
            .map(|(out, inlet)| json!([out.to_string(), inlet.to_string()]))
            .collect();
        json!({
            "id": self.id.value(),
            "inlets": self.shape.inlets().iter().map(ToString::to_string).collect::<Vec<_>>(),
            "outlets": self.shape.outlets().iter().map(ToString::to_string).collect::<Vec<_>>(),
            "islands": islands,
            "wires": wires,
            "mat": self.info.mat.to_json(),
        })
    }
}

/// A node of the graph description tree.
#[derive(Clone)]
pub enum Module {
    Stage(Arc<StageModule>),
    Composite(Arc<CompositeModule>),
    Copied(Arc<CopiedModule>),
    Island(Arc<IslandModule>),
    Fused(Arc<FusedModule>),
}

impl Module {
    pub fn stage(stage: impl GraphStage + 'static) -> Module {
        Self::from_stage(Arc::new(stage))
    }

    pub fn from_stage(stage: Arc<dyn GraphStage>) -> Module {
        Module::Stage(Arc::new(StageModule::new(stage)))
    }

    pub fn id(&self) -> ModuleId {
        match self {
            Module::Stage(m) => m.id,
            Module::Composite(m) => m.id,
            Module::Copied(m) => m.id,
            Module::Island(m) => m.id,
            Module::Fused(m) => m.id,
        }
    }

    pub fn shape(&self) -> &Shape {
        match self {
            Module::Stage(m) => m.shape(),
            Module::Composite(m) => &m.shape,
            Module::Copied(m) => &m.shape,
            Module::Island(m) => &m.shape,
            Module::Fused(m) => &m.shape,
        }
    }

    pub fn attributes(&self) -> &Attributes {
        match self {
            Module::Stage(m) => &m.attributes,
            Module::Composite(m) => &m.attributes,
            Module::Copied(m) => &m.attributes,
            Module::Island(m) => &m.attributes,
            Module::Fused(m) => &m.attributes,
        }
    }

    pub fn sub_modules(&self) -> &[Module] {
        match self {
            Module::Composite(m) => &m.sub_modules,
            Module::Copied(m) => std::slice::from_ref(&m.copy_of),
            Module::Fused(m) => &m.islands,
            Module::Stage(_) | Module::Island(_) => &[],
        }
    }

    /// Wiring owned by this module itself, not by its sub-modules.
    pub fn downstreams(&self) -> Vec<(Outlet, Inlet)> {
        match self {
            Module::Composite(m) => m.downstreams.clone(),
            Module::Island(m) => m.internal.clone(),
            Module::Fused(m) => m.info.downstreams.values().cloned().collect(),
            Module::Stage(_) | Module::Copied(_) => Vec::new(),
        }
    }

    pub fn mat_computation(&self) -> MatNode {
        match self {
            Module::Stage(m) => MatNode::atomic(m.id),
            Module::Composite(m) => m.mat.clone(),
            Module::Copied(m) => MatNode::atomic(m.copy_of.id()),
            Module::Island(m) => MatNode::atomic(m.id),
            Module::Fused(m) => m.info.mat.clone(),
        }
    }

    pub fn is_atomic(&self) -> bool {
        matches!(self, Module::Stage(_) | Module::Island(_))
    }

    /// Follow copies down to the module that was copied.
    pub fn real_module(&self) -> &Module {
        match self {
            Module::Copied(m) => m.copy_of.real_module(),
            other => other,
        }
    }

    /// Attributes a stage actually runs with: the inherited ones overridden by its own.
    pub fn effective_attributes(&self) -> Attributes {
        match self {
            Module::Copied(m) => m
                .attributes
                .clone()
                .and(m.copy_of.effective_attributes()),
            other => other.attributes().clone(),
        }
    }

    /// The same module under a new identity carrying `attributes`.
    pub fn with_attributes(&self, attributes: Attributes) -> Module {
        match self {
            Module::Stage(m) => Module::Stage(Arc::new(StageModule::with_attributes(
                m.stage.clone(),
                attributes,
            ))),
            Module::Composite(m) => Module::Composite(Arc::new(CompositeModule::new(
                m.sub_modules.clone(),
                m.shape.clone(),
                m.downstreams.clone(),
                m.mat.clone(),
                attributes,
            ))),
            Module::Copied(m) => Module::Copied(Arc::new(CopiedModule::new(
                m.shape.clone(),
                attributes,
                m.copy_of.clone(),
            ))),
            Module::Island(m) => Module::Island(Arc::new(IslandModule::new(
                m.assembly.clone(),
                m.shape.clone(),
                attributes,
                m.leaves.clone(),
                m.internal.clone(),
            ))),
            Module::Fused(m) => Module::Fused(Arc::new(FusedModule::new(
                m.islands.clone(),
                m.shape.clone(),
                m.info.clone(),
                attributes,
            ))),
        }
    }

    pub fn add_attributes(&self, attributes: Attributes) -> Module {
        self.with_attributes(self.attributes().clone().and(attributes))
    }

    pub fn async_boundary(&self) -> Module {
        self.add_attributes(Attributes::async_boundary())
    }

    pub fn named(&self, name: impl Into<String>) -> Module {
        self.add_attributes(Attributes::named(name))
    }

    pub fn with_dispatcher(&self, dispatcher: impl Into<String>) -> Module {
        self.add_attributes(Attributes::dispatcher(dispatcher))
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Module::Stage(_) => "stage",
            Module::Composite(_) => "composite",
            Module::Copied(_) => "copied",
            Module::Island(_) => "island",
            Module::Fused(_) => "fused",
        }
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.kind_name(), self.id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::{IgnoreSink, Map};

    #[test]
    fn test_with_attributes_creates_new_identity() {
        let sink = Module::stage(IgnoreSink::new());
        let renamed = sink.named("drain");

        assert_ne!(sink.id(), renamed.id());
        assert_eq!(renamed.attributes().name(), Some("drain"));
        assert_eq!(sink.shape(), renamed.shape());
    }

    #[test]
    fn test_async_boundary_flag() {
        let flow = Module::stage(Map::new("double", |x: i64| x * 2));
        assert!(!flow.attributes().is_async());
        assert!(flow.async_boundary().attributes().is_async());
    }

    #[test]
    fn test_real_module_and_effective_attributes_through_copies() {
        let stage = Module::stage(IgnoreSink::new()).with_dispatcher("inner");
        let copy = Module::Copied(Arc::new(CopiedModule::new(
            stage.shape().deep_copy(),
            Attributes::dispatcher("outer"),
            stage.clone(),
        )));

        assert_eq!(copy.real_module().id(), stage.id());
        assert_eq!(copy.effective_attributes().dispatcher_name(), Some("inner"));
        assert!(matches!(copy.mat_computation().kind(), crate::graph::MatKind::Atomic(id) if *id == stage.id()));
    }
}
