// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Flat, connection-indexed description of one island.
//!
//! Connection `i` joins `outs[i]` (owned by `out_owners[i]`) to `ins[i]`
//! (owned by `in_owners[i]`). A missing port with a `Boundary` owner marks
//! a connection that leaves the island. Canonical layout puts boundary
//! inputs first, then internal connections, then boundary outputs.

use crate::engine::logic::UNBOUND;
use crate::engine::StageLogic;
use crate::errors::ConfigurationError;
use crate::graph::{Attributes, Inlet, MatValue, Outlet, PortId};
use crate::stages::MaterializedValueSource;
use crate::traits::{GraphStage, InHandler, OutHandler};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

/// Which side owns one end of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Owner {
    Stage(usize),
    Boundary,
}

impl Owner {
    pub fn stage(self) -> Option<usize> {
        match self {
            Owner::Stage(stage) => Some(stage),
            Owner::Boundary => None,
        }
    }
}

pub struct Assembly {
    stages: Vec<Arc<dyn GraphStage>>,
    attributes: Vec<Attributes>,
    ins: Vec<Option<Inlet>>,
    in_owners: Vec<Owner>,
    outs: Vec<Option<Outlet>>,
    out_owners: Vec<Owner>,
}

/// Everything produced by materializing an assembly once.
pub struct MaterializedAssembly {
    pub logics: Vec<StageLogic>,
    pub in_handlers: Vec<Option<Box<dyn InHandler>>>,
    pub out_handlers: Vec<Option<Box<dyn OutHandler>>>,
    /// Materialized value of each stage, in stage order.
    pub mat_values: Vec<MatValue>,
    /// Fresh copies of materialized-value sources, by stage index.
    pub mat_sources: Vec<(usize, Arc<MaterializedValueSource>)>,
}

impl Assembly {
    pub fn new(
        stages: Vec<Arc<dyn GraphStage>>,
        attributes: Vec<Attributes>,
        ins: Vec<Option<Inlet>>,
        in_owners: Vec<Owner>,
        outs: Vec<Option<Outlet>>,
        out_owners: Vec<Owner>,
    ) -> Result<Self, ConfigurationError> {
        let connections = ins.len();
        if stages.len() != attributes.len() {
            return Err(malformed(format!(
                "{} stages but {} attribute sets",
                stages.len(),
                attributes.len()
            )));
        }
        if in_owners.len() != connections
            || outs.len() != connections
            || out_owners.len() != connections
        {
            return Err(malformed(format!(
                "connection arrays differ in length: ins={}, in_owners={}, outs={}, out_owners={}",
                connections,
                in_owners.len(),
                outs.len(),
                out_owners.len()
            )));
        }
        for owner in in_owners.iter().chain(out_owners.iter()) {
            if let Owner::Stage(stage) = owner {
                if *stage >= stages.len() {
                    return Err(malformed(format!("owner {} is not a stage", stage)));
                }
            }
        }
        for conn in 0..connections {
            if ins[conn].is_some() != matches!(in_owners[conn], Owner::Stage(_))
                || outs[conn].is_some() != matches!(out_owners[conn], Owner::Stage(_))
            {
                return Err(malformed(format!(
                    "connection {} has a port without a stage owner",
                    conn
                )));
            }
        }
        Ok(Self {
            stages,
            attributes,
            ins,
            in_owners,
            outs,
            out_owners,
        })
    }

    /// A straight chain of stages with the open ends exposed to the boundary.
    ///
    /// Each stage's first outlet feeds the next stage's first inlet.
    pub fn linear(stages: Vec<Arc<dyn GraphStage>>) -> Result<Self, ConfigurationError> {
        let mut ins = Vec::new();
        let mut in_owners = Vec::new();
        let mut outs = Vec::new();
        let mut out_owners = Vec::new();

        if let Some(inlet) = stages.first().and_then(|s| s.shape().inlets().first()) {
            ins.push(Some(inlet.clone()));
            in_owners.push(Owner::Stage(0));
            outs.push(None);
            out_owners.push(Owner::Boundary);
        }
        for (pos, pair) in stages.windows(2).enumerate() {
            let outlet = pair[0].shape().outlets().first().cloned();
            let inlet = pair[1].shape().inlets().first().cloned();
            match (outlet, inlet) {
                (Some(outlet), Some(inlet)) => {
                    outs.push(Some(outlet));
                    out_owners.push(Owner::Stage(pos));
                    ins.push(Some(inlet));
                    in_owners.push(Owner::Stage(pos + 1));
                }
                _ => {
                    return Err(malformed(format!(
                        "stage {} cannot be chained to stage {}",
                        pos,
                        pos + 1
                    )))
                }
            }
        }
        if let Some(outlet) = stages.last().and_then(|s| s.shape().outlets().first()) {
            outs.push(Some(outlet.clone()));
            out_owners.push(Owner::Stage(stages.len() - 1));
            ins.push(None);
            in_owners.push(Owner::Boundary);
        }

        let attributes = stages.iter().map(|s| s.initial_attributes()).collect();
        Self::new(stages, attributes, ins, in_owners, outs, out_owners)
    }

    pub fn connection_count(&self) -> usize {
        self.ins.len()
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    pub fn stages(&self) -> &[Arc<dyn GraphStage>] {
        &self.stages
    }

    pub fn attributes(&self) -> &[Attributes] {
        &self.attributes
    }

    pub fn ins(&self) -> &[Option<Inlet>] {
        &self.ins
    }

    pub fn outs(&self) -> &[Option<Outlet>] {
        &self.outs
    }

    pub fn in_owners(&self) -> &[Owner] {
        &self.in_owners
    }

    pub fn out_owners(&self) -> &[Owner] {
        &self.out_owners
    }

    /// Connections fed from outside the island, in connection order.
    pub fn boundary_inputs(&self) -> Vec<usize> {
        (0..self.connection_count())
            .filter(|&c| self.out_owners[c] == Owner::Boundary && self.in_owners[c] != Owner::Boundary)
            .collect()
    }

    /// Connections that leave the island, in connection order.
    pub fn boundary_outputs(&self) -> Vec<usize> {
        (0..self.connection_count())
            .filter(|&c| self.in_owners[c] == Owner::Boundary && self.out_owners[c] != Owner::Boundary)
            .collect()
    }

    /// Same wiring with some stages swapped out.
    pub(crate) fn with_stages(&self, stages: Vec<Arc<dyn GraphStage>>) -> Result<Self, ConfigurationError> {
        Self::new(
            stages,
            self.attributes.clone(),
            self.ins.clone(),
            self.in_owners.clone(),
            self.outs.clone(),
            self.out_owners.clone(),
        )
    }

    /// Create a fresh logic for every stage and hand out the per-connection handlers.
    pub fn materialize(
        &self,
        inherited: &Attributes,
    ) -> Result<MaterializedAssembly, ConfigurationError> {
        let mut local_index: HashMap<PortId, usize> = HashMap::new();
        let mut logics = Vec::with_capacity(self.stages.len());
        let mut mat_values = Vec::with_capacity(self.stages.len());
        let mut mat_sources = Vec::new();

        for (pos, stage) in self.stages.iter().enumerate() {
            let shape = stage.shape();
            for (idx, inlet) in shape.inlets().iter().enumerate() {
                assign_local(&mut local_index, inlet.id(), idx, inlet.name())?;
            }
            for (idx, outlet) in shape.outlets().iter().enumerate() {
                assign_local(&mut local_index, outlet.id(), idx, outlet.name())?;
            }

            let attributes = inherited.clone().and(self.attributes[pos].clone());
            let created = match stage.as_materialized_value_source() {
                Some(source) => {
                    let fresh = Arc::new(source.copy_src());
                    mat_sources.push((pos, fresh.clone()));
                    fresh.create_logic(&attributes)
                }
                None => stage.create_logic(&attributes),
            };
            let (logic, mat) = created.map_err(|cause| ConfigurationError::LogicCreation {
                stage: stage.name().to_string(),
                cause,
            })?;
            if logic.in_count() != shape.inlets().len()
                || logic.out_count() != shape.outlets().len()
            {
                return Err(ConfigurationError::LogicShapeMismatch {
                    stage: stage.name().to_string(),
                });
            }
            logics.push(logic.named(attributes.name_or(stage.name()).to_string()));
            mat_values.push(mat);
        }

        let connections = self.connection_count();
        let mut in_handlers: Vec<Option<Box<dyn InHandler>>> = (0..connections).map(|_| None).collect();
        let mut out_handlers: Vec<Option<Box<dyn OutHandler>>> = (0..connections).map(|_| None).collect();

        for conn in 0..connections {
            if let (Some(inlet), Owner::Stage(owner)) = (&self.ins[conn], self.in_owners[conn]) {
                let local = local_index.get(&inlet.id()).copied().unwrap_or(UNBOUND);
                let logic = &mut logics[owner];
                let handler = logic.take_in_handler(local).ok_or_else(|| {
                    ConfigurationError::MissingHandler {
                        stage: self.stages[owner].name().to_string(),
                        port: inlet.to_string(),
                    }
                })?;
                logic.bind(local, conn);
                in_handlers[conn] = Some(handler);
            }
            if let (Some(outlet), Owner::Stage(owner)) = (&self.outs[conn], self.out_owners[conn]) {
                let local = local_index.get(&outlet.id()).copied().unwrap_or(UNBOUND);
                let logic = &mut logics[owner];
                let handler = logic.take_out_handler(local).ok_or_else(|| {
                    ConfigurationError::MissingHandler {
                        stage: self.stages[owner].name().to_string(),
                        port: outlet.to_string(),
                    }
                })?;
                let in_count = logic.in_count();
                logic.bind(in_count + local, conn);
                out_handlers[conn] = Some(handler);
            }
        }

        Ok(MaterializedAssembly {
            logics,
            in_handlers,
            out_handlers,
            mat_values,
            mat_sources,
        })
    }

    pub fn to_json(&self) -> Value {
        let stages: Vec<Value> = self
            .stages
            .iter()
            .zip(&self.attributes)
            .map(|(stage, attrs)| json!({ "name": stage.name(), "attributes": attrs }))
            .collect();
        let connections: Vec<Value> = (0..self.connection_count())
            .map(|c| {
                json!({
                    "out": self.outs[c].as_ref().map(ToString::to_string),
                    "out_owner": self.out_owners[c],
                    "in": self.ins[c].as_ref().map(ToString::to_string),
                    "in_owner": self.in_owners[c],
                })
            })
            .collect();
        json!({ "stages": stages, "connections": connections })
    }
}

fn malformed(detail: String) -> ConfigurationError {
    ConfigurationError::MalformedAssembly { detail }
}

/// A port must sit at one position only, though the same stage may appear twice.
fn assign_local(
    local_index: &mut HashMap<PortId, usize>,
    id: PortId,
    idx: usize,
    name: &str,
) -> Result<(), ConfigurationError> {
    match local_index.entry(id) {
        Entry::Occupied(existing) if *existing.get() != idx => Err(ConfigurationError::SharedPort {
            port: name.to_string(),
        }),
        Entry::Occupied(_) => Ok(()),
        Entry::Vacant(slot) => {
            slot.insert(idx);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::StageContext;
    use crate::graph::{OutPort, Shape};
    use crate::stages::{IgnoreSink, IterSource, Map};
    use crate::errors::StreamError;
    use crate::traits::{OutHandler, StageResult};

    #[test]
    fn test_linear_layout_exposes_open_ends() {
        let map: Arc<dyn GraphStage> = Arc::new(Map::new("inc", |x: i64| x + 1));
        let assembly = Assembly::linear(vec![map.clone(), map]).unwrap();

        assert_eq!(assembly.connection_count(), 3);
        assert_eq!(assembly.out_owners()[0], Owner::Boundary);
        assert_eq!(assembly.in_owners()[0], Owner::Stage(0));
        assert_eq!(assembly.out_owners()[1], Owner::Stage(0));
        assert_eq!(assembly.in_owners()[1], Owner::Stage(1));
        assert_eq!(assembly.in_owners()[2], Owner::Boundary);
        assert_eq!(assembly.boundary_inputs(), vec![0]);
        assert_eq!(assembly.boundary_outputs(), vec![2]);
    }

    #[test]
    fn test_closed_chain_has_no_boundary() {
        let assembly = Assembly::linear(vec![
            Arc::new(IterSource::new(vec![1_i64])),
            Arc::new(IgnoreSink::new()),
        ])
        .unwrap();
        assert_eq!(assembly.connection_count(), 1);
        assert!(assembly.boundary_inputs().is_empty());
        assert!(assembly.boundary_outputs().is_empty());
    }

    #[test]
    fn test_mismatched_arrays_are_rejected() {
        let err = Assembly::new(
            vec![],
            vec![],
            vec![None],
            vec![],
            vec![None],
            vec![Owner::Boundary],
        )
        .err()
        .unwrap();
        assert!(matches!(err, ConfigurationError::MalformedAssembly { .. }));
    }

    #[test]
    fn test_materialize_binds_every_connection() {
        let map: Arc<dyn GraphStage> = Arc::new(Map::new("inc", |x: i64| x + 1));
        let assembly = Assembly::linear(vec![map.clone(), map]).unwrap();
        let mat = assembly.materialize(&Attributes::none()).unwrap();

        assert_eq!(mat.logics.len(), 2);
        assert!(mat.in_handlers[0].is_some() && mat.in_handlers[1].is_some());
        assert!(mat.in_handlers[2].is_none());
        assert!(mat.out_handlers[0].is_none());
        assert_eq!(mat.logics[0].port_to_conn, vec![0, 1]);
        assert_eq!(mat.logics[1].port_to_conn, vec![1, 2]);
    }

    struct Twin {
        shape: Shape,
    }

    struct Quiet;

    impl OutHandler for Quiet {
        fn on_pull(&mut self, _ctx: &mut StageContext<'_>) -> StageResult {
            Ok(())
        }
    }

    impl GraphStage for Twin {
        fn name(&self) -> &str {
            "twin"
        }

        fn shape(&self) -> &Shape {
            &self.shape
        }

        fn create_logic(&self, _attributes: &Attributes) -> Result<(StageLogic, MatValue), StreamError> {
            Ok((
                StageLogic::new(&self.shape)
                    .with_out_handler(OutPort(0), Quiet)
                    .with_out_handler(OutPort(1), Quiet),
                MatValue::NotUsed,
            ))
        }
    }

    #[test]
    fn test_port_at_two_positions_is_shared_port_error() {
        let out = Outlet::new("dup");
        let twin: Arc<dyn GraphStage> = Arc::new(Twin {
            shape: Shape::new(vec![], vec![out.clone(), out.clone()]),
        });
        let assembly = Assembly::new(
            vec![twin],
            vec![Attributes::none()],
            vec![None, None],
            vec![Owner::Boundary, Owner::Boundary],
            vec![Some(out.clone()), Some(out)],
            vec![Owner::Stage(0), Owner::Stage(0)],
        )
        .unwrap();

        let err = assembly.materialize(&Attributes::none()).err().unwrap();
        assert!(matches!(err, ConfigurationError::SharedPort { .. }));
    }

    #[test]
    fn test_missing_handler_is_reported() {
        let sink = Arc::new(IgnoreSink::new());
        let silent: Arc<dyn GraphStage> = Arc::new(Twin {
            shape: Shape::sink(sink.shape().inlets()[0].clone()),
        });
        let assembly = Assembly::new(
            vec![silent],
            vec![Attributes::none()],
            vec![Some(sink.shape().inlets()[0].clone())],
            vec![Owner::Stage(0)],
            vec![None],
            vec![Owner::Boundary],
        )
        .unwrap();
        let err = assembly.materialize(&Attributes::none()).err().unwrap();
        assert!(matches!(err, ConfigurationError::MissingHandler { .. }));
    }
}
