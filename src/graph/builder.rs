// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::errors::ConfigurationError;
use crate::graph::{
    Attributes, CompositeModule, CopiedModule, Inlet, MatCombine, MatNode, Module, Outlet, Shape,
};
use crate::stages::MaterializedValueSource;
use std::sync::Arc;

/// Assembles modules into a composite.
///
/// Every added module is wrapped in a copy with fresh ports, so the same
/// blueprint can be added any number of times. Ports that are still open
/// when [`GraphBuilder::build`] is called make up the composite's shape, in
/// the order their modules were added.
pub struct GraphBuilder {
    modules: Vec<Module>,
    wiring: Vec<(Outlet, Inlet)>,
    mat: MatNode,
    attributes: Attributes,
    open_inlets: Vec<Inlet>,
    open_outlets: Vec<Outlet>,
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self {
            modules: Vec::new(),
            wiring: Vec::new(),
            mat: MatNode::ignore(),
            attributes: Attributes::none(),
            open_inlets: Vec::new(),
            open_outlets: Vec::new(),
        }
    }

    /// Add a module, keeping the builder's current materialized value.
    pub fn add(&mut self, module: &Module) -> Shape {
        self.add_with(module, MatCombine::KeepLeft)
    }

    /// Add a module and fold its materialized value into the builder's.
    pub fn add_with(&mut self, module: &Module, combine: MatCombine) -> Shape {
        let shape = module.shape().deep_copy();
        let copy = Module::Copied(Arc::new(CopiedModule::new(
            shape.clone(),
            Attributes::none(),
            module.clone(),
        )));
        self.mat = MatNode::combine(combine, self.mat.clone(), MatNode::atomic(copy.id()));
        self.open_inlets.extend(shape.inlets().iter().cloned());
        self.open_outlets.extend(shape.outlets().iter().cloned());
        self.modules.push(copy);
        shape
    }

    pub fn connect(
        &mut self,
        outlet: &Outlet,
        inlet: &Inlet,
    ) -> Result<&mut Self, ConfigurationError> {
        let out_pos = self.open_position_out(outlet)?;
        let in_pos = self.open_position_in(inlet)?;
        self.open_outlets.remove(out_pos);
        self.open_inlets.remove(in_pos);
        self.wiring.push((outlet.clone(), inlet.clone()));
        Ok(self)
    }

    /// Connect the first outlet of each shape to the first inlet of the next.
    pub fn chain(&mut self, shapes: &[&Shape]) -> Result<&mut Self, ConfigurationError> {
        for pair in shapes.windows(2) {
            let outlet = pair[0].outlets().first().ok_or_else(|| {
                ConfigurationError::UnknownPort {
                    port: "<no outlet>".to_string(),
                }
            })?;
            let inlet = pair[1].inlets().first().ok_or_else(|| {
                ConfigurationError::UnknownPort {
                    port: "<no inlet>".to_string(),
                }
            })?;
            self.connect(outlet, inlet)?;
        }
        Ok(self)
    }

    /// An outlet that emits the materialized value computed so far, then completes.
    pub fn materialized_value(&mut self) -> Outlet {
        let source = MaterializedValueSource::new(self.mat.clone());
        let shape = self.add(&Module::stage(source));
        shape.outlets()[0].clone()
    }

    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn build(self) -> Module {
        let shape = Shape::new(self.open_inlets, self.open_outlets);
        Module::Composite(Arc::new(CompositeModule::new(
            self.modules,
            shape,
            self.wiring,
            self.mat,
            self.attributes,
        )))
    }

    fn open_position_out(&self, outlet: &Outlet) -> Result<usize, ConfigurationError> {
        if let Some(pos) = self.open_outlets.iter().position(|o| o.id() == outlet.id()) {
            return Ok(pos);
        }
        if self.wiring.iter().any(|(o, _)| o.id() == outlet.id()) {
            Err(ConfigurationError::AlreadyConnected {
                port: outlet.to_string(),
            })
        } else {
            Err(ConfigurationError::UnknownPort {
                port: outlet.to_string(),
            })
        }
    }

    fn open_position_in(&self, inlet: &Inlet) -> Result<usize, ConfigurationError> {
        if let Some(pos) = self.open_inlets.iter().position(|i| i.id() == inlet.id()) {
            return Ok(pos);
        }
        if self.wiring.iter().any(|(_, i)| i.id() == inlet.id()) {
            Err(ConfigurationError::AlreadyConnected {
                port: inlet.to_string(),
            })
        } else {
            Err(ConfigurationError::UnknownPort {
                port: inlet.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::{IgnoreSink, IterSource, Map};

    #[test]
    fn test_open_ports_form_the_shape() {
        let mut b = GraphBuilder::new();
        let map = Module::stage(Map::new("inc", |x: i64| x + 1));
        let first = b.add(&map);
        let second = b.add(&map);
        b.chain(&[&first, &second]).unwrap();

        let composite = b.build();
        assert_eq!(composite.shape().inlets(), first.inlets());
        assert_eq!(composite.shape().outlets(), second.outlets());
        assert_eq!(composite.sub_modules().len(), 2);
        assert_eq!(composite.downstreams().len(), 1);
    }

    #[test]
    fn test_connect_twice_is_rejected() {
        let mut b = GraphBuilder::new();
        let src = b.add(&Module::stage(IterSource::new(vec![1_i64])));
        let sink = b.add(&Module::stage(IgnoreSink::new()));
        b.connect(&src.outlets()[0], &sink.inlets()[0]).unwrap();

        let err = b
            .connect(&src.outlets()[0], &sink.inlets()[0])
            .err()
            .unwrap();
        assert!(matches!(err, ConfigurationError::AlreadyConnected { .. }));
    }

    #[test]
    fn test_connect_foreign_port_is_rejected() {
        let mut b = GraphBuilder::new();
        let sink = b.add(&Module::stage(IgnoreSink::new()));
        let stranger = Outlet::new("stranger");

        let err = b.connect(&stranger, &sink.inlets()[0]).err().unwrap();
        assert!(matches!(err, ConfigurationError::UnknownPort { .. }));
    }

    #[test]
    fn test_closed_graph_has_closed_shape() {
        let mut b = GraphBuilder::new();
        let src = b.add(&Module::stage(IterSource::new(vec![1_i64])));
        let sink = b.add_with(&Module::stage(IgnoreSink::new()), MatCombine::KeepRight);
        b.chain(&[&src, &sink]).unwrap();
        assert!(b.build().shape().is_closed());
    }
}
