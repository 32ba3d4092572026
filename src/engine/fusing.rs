// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Flattens a module tree into islands.
//!
//! The descent copies every stage it meets under fresh port identities and
//! sorts the copies into groups: a module carrying `AsyncBoundary` opens a
//! new group, everything below it joins that group unless it opens one of
//! its own. Wires are recorded in terms of the copies. Groups are then split
//! wherever members ask for different dispatchers, and each group becomes an
//! [`IslandModule`] whose assembly uses the canonical layout: exposed inputs,
//! internal connections, exposed outputs.
//!
//! While descending, every port of the original tree maps to a stack of copies.
//! A copy is pushed when a module is added or seen through a `CopiedModule`,
//! and popped exactly once when the port is wired or exposed. A port left with
//! nothing to pop, or with copies nobody consumed, is an unresolved mapping.

use crate::config::consts::DEFAULT_DISPATCHER;
use crate::engine::assembly::{Assembly, Owner};
use crate::errors::ConfigurationError;
use crate::graph::{
    Attributes, CopiedModule, FusedModule, Inlet, IslandModule, MatKind, MatNode, Module,
    ModuleId, Outlet, PortId, Shape, StageModule, StructuralInfo,
};
use crate::observability::messages::fusing::{GraphFused, GroupSplitByDispatcher};
use crate::observability::messages::StructuredLog;
use crate::traits::GraphStage;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

/// Fuse everything that is not separated by an async boundary, using the
/// default dispatcher for modules that name none.
pub fn aggressive(module: &Module) -> Result<Arc<FusedModule>, ConfigurationError> {
    aggressive_with_dispatcher(module, DEFAULT_DISPATCHER)
}

/// Fuse `module`. A module that is already fused is returned as it is.
pub fn aggressive_with_dispatcher(
    module: &Module,
    default_dispatcher: &str,
) -> Result<Arc<FusedModule>, ConfigurationError> {
    if let Module::Fused(fused) = module {
        return Ok(fused.clone());
    }

    let mut build = BuildStructuralInfo::default();
    build.mat_src.push(Vec::new());
    let top = build.new_group(false);
    let mat = build
        .descend(module, &Attributes::none(), top)?
        .into_iter()
        .next()
        .map(|(_, node)| node)
        .unwrap_or_else(MatNode::ignore);
    build.repoint_kept_islands()?;

    let inlets = module
        .shape()
        .inlets()
        .iter()
        .map(|inlet| build.pop_in(inlet))
        .collect::<Result<Vec<_>, _>>()?;
    let outlets = module
        .shape()
        .outlets()
        .iter()
        .map(|outlet| build.pop_out(outlet))
        .collect::<Result<Vec<_>, _>>()?;
    build.ensure_consumed()?;

    let BuildStructuralInfo {
        groups,
        downstreams,
        upstreams,
        ..
    } = build;
    let groups = break_up_groups_by_dispatcher(groups, default_dispatcher);

    let out_group: HashMap<PortId, usize> = groups
        .iter()
        .enumerate()
        .flat_map(|(index, group)| {
            group
                .members
                .iter()
                .flat_map(|m| m.shape().outlets().iter().map(Outlet::id))
                .map(move |id| (id, index))
        })
        .collect();

    let mut open_ups = upstreams.clone();
    let mut open_downs = downstreams.clone();
    let mut islands = Vec::new();
    for (index, group) in groups.iter().enumerate() {
        if !group.members.is_empty() {
            islands.push(fuse_group(index, group, &mut open_ups, &mut open_downs, &out_group)?);
        }
    }

    GraphFused {
        islands: islands.len(),
        stages: islands
            .iter()
            .map(|island| match island {
                Module::Island(island) => island.assembly().stage_count(),
                _ => 0,
            })
            .sum(),
        wires: open_downs.len(),
    }
    .log();

    Ok(Arc::new(FusedModule::new(
        islands,
        Shape::new(inlets, outlets),
        StructuralInfo::new(downstreams, upstreams, mat),
        module.attributes().clone(),
    )))
}

/// Modules that will share one interpreter.
pub struct Group {
    pub members: Vec<Module>,
    pub is_async: bool,
    pub dispatcher: Option<String>,
}

struct MatSource {
    copy: Module,
    group: usize,
}

type MatMapping = Vec<(ModuleId, MatNode)>;

#[derive(Default)]
struct BuildStructuralInfo {
    groups: Vec<Group>,
    new_ins: HashMap<PortId, Vec<Inlet>>,
    new_outs: HashMap<PortId, Vec<Outlet>>,
    downstreams: BTreeMap<PortId, (Outlet, Inlet)>,
    upstreams: BTreeMap<PortId, Outlet>,
    mat_src: Vec<Vec<MatSource>>,
    kept_islands: Vec<(usize, ModuleId)>,
    leaf_renames: HashMap<ModuleId, ModuleId>,
}

impl BuildStructuralInfo {
    fn new_group(&mut self, is_async: bool) -> usize {
        self.groups.push(Group {
            members: Vec::new(),
            is_async,
            dispatcher: None,
        });
        self.groups.len() - 1
    }

    fn descend(
        &mut self,
        m: &Module,
        inherited: &Attributes,
        open_group: usize,
    ) -> Result<MatMapping, ConfigurationError> {
        let is_async = m.attributes().is_async();
        let group = if is_async {
            self.new_group(true)
        } else {
            open_group
        };
        let attributes = inherited.clone().and(m.attributes().clone());

        match m {
            Module::Stage(stage) => {
                let copy = Module::Copied(Arc::new(CopiedModule::new(
                    m.shape().deep_copy(),
                    attributes,
                    m.clone(),
                )));
                if stage.stage().as_materialized_value_source().is_some() {
                    if let Some(context) = self.mat_src.last_mut() {
                        context.push(MatSource {
                            copy: copy.clone(),
                            group,
                        });
                    }
                }
                let node = self.add_module(copy, group, m.shape());
                Ok(vec![(m.id(), node)])
            }
            Module::Copied(copied) => {
                let mut inner = self.descend(copied.copy_of(), &attributes, group)?;
                self.rewire(copied.copy_of().shape(), copied.shape())?;
                let head = inner
                    .first()
                    .map(|(_, node)| node.clone())
                    .unwrap_or_else(MatNode::ignore);
                if let MatKind::Atomic(new_id) = head.kind() {
                    self.leaf_renames.insert(m.id(), *new_id);
                }
                inner.insert(0, (m.id(), head));
                Ok(inner)
            }
            Module::Island(island) if !is_async => {
                let mut result = vec![(m.id(), MatNode::ignore())];
                for leaf in island.leaves() {
                    result.extend(self.descend(leaf, &attributes, group)?);
                }
                for (out, inlet) in island.internal() {
                    self.wire(out, inlet)?;
                }
                Ok(result)
            }
            Module::Island(island) => self.keep_island(m, island, group),
            Module::Composite(_) | Module::Fused(_) => {
                self.mat_src.push(Vec::new());
                let mut sub_mat = HashMap::new();
                for sub in m.sub_modules() {
                    sub_mat.extend(self.descend(sub, &attributes, group)?);
                }

                let nested: HashSet<PortId> = m
                    .sub_modules()
                    .iter()
                    .flat_map(Module::downstreams)
                    .map(|(out, _)| out.id())
                    .collect();
                for (out, inlet) in m.downstreams() {
                    if !nested.contains(&out.id()) {
                        self.wire(&out, &inlet)?;
                    }
                }

                let mut mapping = HashMap::new();
                let computation = m.mat_computation();
                let new_mat = rewrite_mat(&sub_mat, &computation, &mut mapping)?;
                let sources = self.mat_src.pop().unwrap_or_default();
                for source in sources {
                    self.repoint(source, &sub_mat, &mapping)?;
                }
                Ok(vec![(m.id(), new_mat)])
            }
        }
    }

    /// An async island stays whole; only its ports and leaf identities are renewed.
    fn keep_island(
        &mut self,
        m: &Module,
        island: &IslandModule,
        group: usize,
    ) -> Result<MatMapping, ConfigurationError> {
        let mut ins: HashMap<PortId, Inlet> = HashMap::new();
        let mut outs: HashMap<PortId, Outlet> = HashMap::new();
        let mut leaves = Vec::with_capacity(island.leaves().len());
        let mut result = Vec::with_capacity(island.leaves().len() + 1);

        for leaf in island.leaves() {
            let Module::Copied(copied) = leaf else {
                return Err(ConfigurationError::MalformedAssembly {
                    detail: format!("island leaf {:?} is not a copied stage", leaf),
                });
            };
            let shape = copied.shape().deep_copy();
            for (old, new) in copied.shape().inlets().iter().zip(shape.inlets()) {
                ins.insert(old.id(), new.clone());
            }
            for (old, new) in copied.shape().outlets().iter().zip(shape.outlets()) {
                outs.insert(old.id(), new.clone());
            }
            let renewed = Module::Copied(Arc::new(CopiedModule::new(
                shape,
                copied.attributes().clone(),
                copied.copy_of().clone(),
            )));
            self.leaf_renames.insert(leaf.id(), renewed.id());
            result.push((leaf.id(), MatNode::atomic(renewed.id())));
            leaves.push(renewed);
        }

        let map_in = |inlet: &Inlet| {
            ins.get(&inlet.id()).cloned().ok_or_else(|| unresolved(inlet))
        };
        let map_out = |outlet: &Outlet| {
            outs.get(&outlet.id()).cloned().ok_or_else(|| unresolved(outlet))
        };
        let shape = Shape::new(
            island
                .shape()
                .inlets()
                .iter()
                .map(map_in)
                .collect::<Result<_, _>>()?,
            island
                .shape()
                .outlets()
                .iter()
                .map(map_out)
                .collect::<Result<_, _>>()?,
        );
        let internal = island
            .internal()
            .iter()
            .map(|(out, inlet)| Ok((map_out(out)?, map_in(inlet)?)))
            .collect::<Result<Vec<_>, ConfigurationError>>()?;

        let copy = Module::Island(Arc::new(IslandModule::new(
            island.assembly().clone(),
            shape,
            island.attributes().clone(),
            leaves,
            internal,
        )));
        self.kept_islands.push((group, copy.id()));
        let node = self.add_module(copy, group, island.shape());
        result.insert(0, (m.id(), node));
        Ok(result)
    }

    fn add_module(&mut self, copy: Module, group: usize, old_shape: &Shape) -> MatNode {
        for (orig, mapped) in old_shape.inlets().iter().zip(copy.shape().inlets()) {
            self.new_ins.entry(orig.id()).or_default().push(mapped.clone());
        }
        for (orig, mapped) in old_shape.outlets().iter().zip(copy.shape().outlets()) {
            self.new_outs.entry(orig.id()).or_default().push(mapped.clone());
        }
        let node = MatNode::atomic(copy.id());
        self.groups[group].members.push(copy);
        node
    }

    fn pop_in(&mut self, port: &Inlet) -> Result<Inlet, ConfigurationError> {
        self.new_ins
            .get_mut(&port.id())
            .and_then(|stack| stack.pop())
            .ok_or_else(|| unresolved(port))
    }

    fn pop_out(&mut self, port: &Outlet) -> Result<Outlet, ConfigurationError> {
        self.new_outs
            .get_mut(&port.id())
            .and_then(|stack| stack.pop())
            .ok_or_else(|| unresolved(port))
    }

    fn wire(&mut self, out: &Outlet, inlet: &Inlet) -> Result<(), ConfigurationError> {
        let out = self.pop_out(out)?;
        let inlet = self.pop_in(inlet)?;
        self.upstreams.insert(inlet.id(), out.clone());
        if self.downstreams.insert(out.id(), (out.clone(), inlet)).is_some() {
            return Err(ConfigurationError::DanglingConnection {
                port: out.to_string(),
            });
        }
        Ok(())
    }

    /// The copy's ports take over the mappings of the ports they were copied from.
    fn rewire(&mut self, old: &Shape, new: &Shape) -> Result<(), ConfigurationError> {
        for (orig, copy) in old.inlets().iter().zip(new.inlets()) {
            let mapped = self.pop_in(orig)?;
            self.new_ins.entry(copy.id()).or_default().push(mapped);
        }
        for (orig, copy) in old.outlets().iter().zip(new.outlets()) {
            let mapped = self.pop_out(orig)?;
            self.new_outs.entry(copy.id()).or_default().push(mapped);
        }
        Ok(())
    }

    fn ensure_consumed(&self) -> Result<(), ConfigurationError> {
        if let Some(inlet) = self.new_ins.values().flatten().next() {
            return Err(unresolved(inlet));
        }
        if let Some(outlet) = self.new_outs.values().flatten().next() {
            return Err(unresolved(outlet));
        }
        Ok(())
    }

    /// Point a materialized-value source at the rewritten node of the computation it emits.
    fn repoint(
        &mut self,
        source: MatSource,
        sub_mat: &HashMap<ModuleId, MatNode>,
        mapping: &HashMap<usize, MatNode>,
    ) -> Result<(), ConfigurationError> {
        let Module::Copied(copy) = &source.copy else {
            return Ok(());
        };
        let Module::Stage(stage_module) = copy.copy_of() else {
            return Ok(());
        };
        let Some(mat_source) = stage_module.stage().as_materialized_value_source() else {
            return Ok(());
        };

        let computation = mat_source.computation();
        let mapped = match computation.kind() {
            MatKind::Atomic(id) => sub_mat.get(id).cloned(),
            MatKind::Ignore => Some(computation.clone()),
            _ => mapping.get(&computation.identity()).cloned(),
        }
        .ok_or_else(|| ConfigurationError::DetachedMaterializedValueSource {
            stage: stage_module.stage().name().to_string(),
        })?;

        let stage: Arc<dyn GraphStage> = Arc::new(mat_source.with_computation(mapped));
        let real = Module::Stage(Arc::new(StageModule::with_attributes(
            stage,
            stage_module.attributes().clone(),
        )));
        let replacement = Module::Copied(Arc::new(copy.replacing(real)));
        let id = replacement.id();
        if let Some(slot) = self.groups[source.group]
            .members
            .iter_mut()
            .find(|member| member.id() == id)
        {
            *slot = replacement;
        }
        Ok(())
    }

    /// Sources inside kept islands still name the leaves of the tree they were fused from.
    fn repoint_kept_islands(&mut self) -> Result<(), ConfigurationError> {
        for (group, id) in std::mem::take(&mut self.kept_islands) {
            let renames = &self.leaf_renames;
            let Some(slot) = self.groups[group]
                .members
                .iter_mut()
                .find(|member| member.id() == id)
            else {
                continue;
            };
            let Module::Island(island) = slot else {
                continue;
            };
            let assembly = island.assembly();
            if !assembly
                .stages()
                .iter()
                .any(|stage| stage.as_materialized_value_source().is_some())
            {
                continue;
            }
            let stages = assembly
                .stages()
                .iter()
                .map(|stage| match stage.as_materialized_value_source() {
                    Some(source) => Arc::new(
                        source.with_computation(source.computation().substitute(renames)),
                    ) as Arc<dyn GraphStage>,
                    None => stage.clone(),
                })
                .collect();
            let rebuilt = island.with_assembly(Arc::new(assembly.with_stages(stages)?));
            *slot = Module::Island(Arc::new(rebuilt));
        }
        Ok(())
    }
}

fn unresolved(port: &impl ToString) -> ConfigurationError {
    ConfigurationError::UnresolvedPortMapping {
        port: port.to_string(),
    }
}

fn rewrite_mat(
    sub_mat: &HashMap<ModuleId, MatNode>,
    mat: &MatNode,
    mapping: &mut HashMap<usize, MatNode>,
) -> Result<MatNode, ConfigurationError> {
    let rewritten = match mat.kind() {
        MatKind::Ignore => return Ok(mat.clone()),
        MatKind::Atomic(id) => sub_mat
            .get(id)
            .cloned()
            .ok_or(ConfigurationError::MissingMaterializedValue { module: id.value() })?,
        MatKind::Combine {
            combine,
            left,
            right,
        } => MatNode::combine(
            *combine,
            rewrite_mat(sub_mat, left, mapping)?,
            rewrite_mat(sub_mat, right, mapping)?,
        ),
        MatKind::Transform { transform, dep } => {
            MatNode::transform(transform.clone(), rewrite_mat(sub_mat, dep, mapping)?)
        }
    };
    mapping.insert(mat.identity(), rewritten.clone());
    Ok(rewritten)
}

/// Split every group whose members disagree on their dispatcher.
///
/// Members keep their relative order; the sub-groups appear in order of the
/// first member asking for each dispatcher.
pub fn break_up_groups_by_dispatcher(groups: Vec<Group>, default_dispatcher: &str) -> Vec<Group> {
    let mut result = Vec::with_capacity(groups.len());
    for (index, group) in groups.into_iter().enumerate() {
        let mut split: Vec<(String, Vec<Module>)> = Vec::new();
        for member in group.members {
            let dispatcher = member
                .effective_attributes()
                .dispatcher_name()
                .unwrap_or(default_dispatcher)
                .to_string();
            match split.iter_mut().find(|(name, _)| *name == dispatcher) {
                Some((_, members)) => members.push(member),
                None => split.push((dispatcher, vec![member])),
            }
        }
        if split.len() > 1 {
            let names: Vec<String> = split.iter().map(|(name, _)| name.clone()).collect();
            GroupSplitByDispatcher {
                group: index,
                dispatchers: &names,
            }
            .log();
        }
        for (dispatcher, members) in split {
            result.push(Group {
                members,
                is_async: group.is_async,
                dispatcher: Some(dispatcher),
            });
        }
    }
    result
}

fn leaf_stage(member: &Module) -> Result<(&CopiedModule, &Arc<dyn GraphStage>), ConfigurationError> {
    if let Module::Copied(copy) = member {
        if let Module::Stage(stage) = copy.copy_of().real_module() {
            return Ok((copy, stage.stage()));
        }
    }
    Err(ConfigurationError::MalformedAssembly {
        detail: format!("{:?} cannot be part of an island", member),
    })
}

/// Turn one group into an island.
///
/// Wires whose two ends sit in this group become internal connections and
/// are removed from `upstreams`/`downstreams`; whatever is left there after
/// every group has been fused are the wires between islands.
pub fn fuse_group(
    index: usize,
    group: &Group,
    upstreams: &mut BTreeMap<PortId, Outlet>,
    downstreams: &mut BTreeMap<PortId, (Outlet, Inlet)>,
    out_group: &HashMap<PortId, usize>,
) -> Result<Module, ConfigurationError> {
    if let [island @ Module::Island(_)] = group.members.as_slice() {
        return Ok(island.clone());
    }

    let mut stages = Vec::with_capacity(group.members.len());
    let mut attributes = Vec::with_capacity(group.members.len());
    let mut leaves = Vec::with_capacity(group.members.len());

    let mut ins_exposed = Vec::new();
    let mut in_owners_exposed = Vec::new();
    let mut ins_internal = Vec::new();
    let mut in_owners_internal = Vec::new();
    let mut inlets = Vec::new();
    let mut internal = Vec::new();
    let mut out_conns: HashMap<PortId, usize> = HashMap::new();

    for (pos, member) in group.members.iter().enumerate() {
        let (copy, stage) = leaf_stage(member)?;
        stages.push(stage.clone());
        attributes.push(copy.attributes().clone());
        leaves.push(member.clone());

        for (inlet, orig) in copy.shape().inlets().iter().zip(stage.shape().inlets()) {
            match upstreams.get(&inlet.id()).cloned() {
                Some(out) if out_group.get(&out.id()) == Some(&index) => {
                    upstreams.remove(&inlet.id());
                    downstreams.remove(&out.id());
                    out_conns.insert(out.id(), ins_internal.len());
                    internal.push((out, inlet.clone()));
                    ins_internal.push(Some(orig.clone()));
                    in_owners_internal.push(Owner::Stage(pos));
                }
                _ => {
                    ins_exposed.push(Some(orig.clone()));
                    in_owners_exposed.push(Owner::Stage(pos));
                    inlets.push(inlet.clone());
                }
            }
        }
    }

    let mut outs_internal: Vec<Option<Outlet>> = vec![None; ins_internal.len()];
    let mut out_owners_internal = vec![Owner::Boundary; ins_internal.len()];
    let mut outs_exposed = Vec::new();
    let mut out_owners_exposed = Vec::new();
    let mut outlets = Vec::new();

    for (pos, member) in group.members.iter().enumerate() {
        let (copy, stage) = leaf_stage(member)?;
        for (outlet, orig) in copy.shape().outlets().iter().zip(stage.shape().outlets()) {
            match out_conns.remove(&outlet.id()) {
                Some(conn) => {
                    outs_internal[conn] = Some(orig.clone());
                    out_owners_internal[conn] = Owner::Stage(pos);
                }
                None => {
                    outs_exposed.push(Some(orig.clone()));
                    out_owners_exposed.push(Owner::Stage(pos));
                    outlets.push(outlet.clone());
                }
            }
        }
    }
    if let Some((out, _)) = internal.iter().find(|(out, _)| out_conns.contains_key(&out.id())) {
        return Err(ConfigurationError::DanglingConnection {
            port: out.to_string(),
        });
    }

    let exposed_in = ins_exposed.len();
    let exposed_out = outs_exposed.len();

    let mut ins = ins_exposed;
    ins.extend(ins_internal);
    ins.extend(std::iter::repeat_with(|| None).take(exposed_out));
    let mut in_owners = in_owners_exposed;
    in_owners.extend(in_owners_internal);
    in_owners.extend(std::iter::repeat(Owner::Boundary).take(exposed_out));

    let mut outs: Vec<Option<Outlet>> = vec![None; exposed_in];
    outs.extend(outs_internal);
    outs.extend(outs_exposed);
    let mut out_owners = vec![Owner::Boundary; exposed_in];
    out_owners.extend(out_owners_internal);
    out_owners.extend(out_owners_exposed);

    let assembly = Assembly::new(stages, attributes, ins, in_owners, outs, out_owners)?;

    let mut island_attributes = if group.is_async {
        Attributes::async_boundary()
    } else {
        Attributes::none()
    };
    if let Some(dispatcher) = &group.dispatcher {
        island_attributes = island_attributes.and(Attributes::dispatcher(dispatcher.clone()));
    }
    if let Some((initial, max)) = group
        .members
        .iter()
        .filter_map(|member| member.effective_attributes().input_buffer_bounds())
        .last()
    {
        island_attributes = island_attributes.and(Attributes::input_buffer(initial, max));
    }

    Ok(Module::Island(Arc::new(IslandModule::new(
        Arc::new(assembly),
        Shape::new(inlets, outlets),
        island_attributes,
        leaves,
        internal,
    ))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{CompositeModule, GraphBuilder, MatCombine};
    use crate::stages::{CollectSink, IgnoreSink, IterSource, Map};

    fn island(module: &Module) -> &IslandModule {
        match module {
            Module::Island(island) => island,
            other => panic!("expected an island, got {:?}", other),
        }
    }

    fn inc() -> Module {
        Module::stage(Map::new("inc", |x: i64| x + 1))
    }

    fn closed_chain(middle: &Module) -> Module {
        let mut b = GraphBuilder::new();
        let src = b.add(&Module::stage(IterSource::new(vec![1_i64, 2, 3])));
        let flow = b.add(middle);
        let sink = b.add_with(&Module::stage(CollectSink::<i64>::new()), MatCombine::KeepRight);
        b.chain(&[&src, &flow, &sink]).unwrap();
        b.build()
    }

    #[test]
    fn test_synchronous_chain_becomes_one_island() {
        let fused = aggressive(&closed_chain(&inc())).unwrap();

        assert_eq!(fused.islands().len(), 1);
        assert!(fused.shape().is_closed());
        assert!(fused.cross_island_wires().is_empty());

        let only = island(&fused.islands()[0]);
        let assembly = only.assembly();
        assert_eq!(assembly.stage_count(), 3);
        assert_eq!(assembly.connection_count(), 2);
        assert!(assembly.boundary_inputs().is_empty());
        assert!(assembly.boundary_outputs().is_empty());
        assert_eq!(only.internal().len(), 2);
        assert_eq!(fused.info().downstreams().len(), 2);
    }

    #[test]
    fn test_async_boundary_splits_islands() {
        let fused = aggressive(&closed_chain(&inc().async_boundary())).unwrap();

        assert_eq!(fused.islands().len(), 2);
        assert_eq!(fused.cross_island_wires().len(), 2);

        let outer = island(&fused.islands()[0]);
        let inner = island(&fused.islands()[1]);
        assert_eq!(outer.assembly().stage_count(), 2);
        assert_eq!(inner.assembly().stage_count(), 1);
        assert!(inner.attributes().is_async());
        assert_eq!(outer.assembly().boundary_inputs().len(), 1);
        assert_eq!(outer.assembly().boundary_outputs().len(), 1);
        assert_eq!(inner.shape().inlets().len(), 1);
        assert_eq!(inner.shape().outlets().len(), 1);
    }

    #[test]
    fn test_open_flow_uses_canonical_layout() {
        let mut b = GraphBuilder::new();
        let first = b.add(&inc());
        let second = b.add(&inc());
        b.chain(&[&first, &second]).unwrap();
        let fused = aggressive(&b.build()).unwrap();

        let only = island(&fused.islands()[0]);
        let assembly = only.assembly();
        assert_eq!(assembly.connection_count(), 3);
        assert_eq!(assembly.out_owners()[0], Owner::Boundary);
        assert_eq!(assembly.in_owners()[2], Owner::Boundary);
        assert_eq!(assembly.boundary_inputs(), vec![0]);
        assert_eq!(assembly.boundary_outputs(), vec![2]);
        assert_eq!(fused.shape().inlets(), only.shape().inlets());
        assert_eq!(fused.shape().outlets(), only.shape().outlets());
        assert!(assembly.materialize(only.attributes()).is_ok());
    }

    #[test]
    fn test_dispatchers_split_a_group() {
        let mut b = GraphBuilder::new();
        let src = b.add(&Module::stage(IterSource::new(vec![1_i64])).with_dispatcher("io"));
        let flow = b.add(&inc());
        let sink = b.add(&Module::stage(IgnoreSink::new()).with_dispatcher("io"));
        b.chain(&[&src, &flow, &sink]).unwrap();
        let fused = aggressive(&b.build()).unwrap();

        assert_eq!(fused.islands().len(), 2);
        let io = island(&fused.islands()[0]);
        let default = island(&fused.islands()[1]);
        assert_eq!(io.attributes().dispatcher_name(), Some("io"));
        assert_eq!(io.assembly().stage_count(), 2);
        assert_eq!(default.attributes().dispatcher_name(), Some(DEFAULT_DISPATCHER));
        assert_eq!(fused.cross_island_wires().len(), 2);
    }

    #[test]
    fn test_fusing_a_fused_module_is_identity() {
        let fused = aggressive(&closed_chain(&inc())).unwrap();
        let again = aggressive(&Module::Fused(fused.clone())).unwrap();
        assert!(Arc::ptr_eq(&fused, &again));
    }

    #[test]
    fn test_nested_fused_module_is_dissolved() {
        let mut b = GraphBuilder::new();
        let first = b.add(&inc());
        let second = b.add(&inc());
        b.chain(&[&first, &second]).unwrap();
        let flow = Module::Fused(aggressive(&b.build()).unwrap());

        let fused = aggressive(&closed_chain(&flow)).unwrap();
        assert_eq!(fused.islands().len(), 1);
        assert_eq!(island(&fused.islands()[0]).assembly().stage_count(), 4);
    }

    #[test]
    fn test_nested_async_island_is_kept_with_new_identity() {
        let mut b = GraphBuilder::new();
        let first = b.add(&inc());
        let second = b.add(&inc());
        b.chain(&[&first, &second]).unwrap();
        let flow = Module::Fused(aggressive(&b.build().async_boundary()).unwrap());
        let kept = flow.sub_modules()[0].clone();

        let fused = aggressive(&closed_chain(&flow)).unwrap();
        assert_eq!(fused.islands().len(), 2);
        let copied = fused
            .islands()
            .iter()
            .map(island)
            .find(|i| i.assembly().stage_count() == 2 && i.attributes().is_async())
            .unwrap();
        assert_ne!(copied.id(), kept.id());
        assert!(Arc::ptr_eq(copied.assembly(), island(&kept).assembly()));
        assert_ne!(copied.shape().inlets()[0].id(), kept.shape().inlets()[0].id());
    }

    #[test]
    fn test_materialized_value_source_is_repointed() {
        let mut b = GraphBuilder::new();
        let src = b.add(&Module::stage(IterSource::new(vec![1_i64])));
        let sink = b.add_with(&Module::stage(IgnoreSink::new()), MatCombine::KeepRight);
        b.chain(&[&src, &sink]).unwrap();
        let value_out = b.materialized_value();
        let drain = b.add(&Module::stage(IgnoreSink::new()));
        b.connect(&value_out, &drain.inlets()[0]).unwrap();

        let fused = aggressive(&b.build()).unwrap();
        let only = island(&fused.islands()[0]);
        let leaf_ids: HashSet<ModuleId> = only.leaves().iter().map(Module::id).collect();
        let source = only
            .assembly()
            .stages()
            .iter()
            .find_map(|stage| stage.as_materialized_value_source())
            .unwrap();

        match source.computation().kind() {
            MatKind::Combine { right, .. } => {
                assert!(matches!(right.kind(), MatKind::Atomic(id) if leaf_ids.contains(id)));
            }
            _ => panic!("expected the combined computation"),
        }
    }

    #[test]
    fn test_unexposed_open_port_is_unresolved() {
        let sink = Module::stage(IgnoreSink::new());
        let copy = Module::Copied(Arc::new(CopiedModule::new(
            sink.shape().deep_copy(),
            Attributes::none(),
            sink,
        )));
        let composite = Module::Composite(Arc::new(CompositeModule::new(
            vec![copy],
            Shape::closed(),
            vec![],
            MatNode::ignore(),
            Attributes::none(),
        )));

        let err = aggressive(&composite).err().unwrap();
        assert!(matches!(err, ConfigurationError::UnresolvedPortMapping { .. }));
    }
}
