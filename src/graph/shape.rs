// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::graph::{InPort, Inlet, OutPort, Outlet};

/// Ordered inlets and outlets of a stage or module.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Shape {
    inlets: Vec<Inlet>,
    outlets: Vec<Outlet>,
}

impl Shape {
    pub fn new(inlets: Vec<Inlet>, outlets: Vec<Outlet>) -> Self {
        Self { inlets, outlets }
    }

    pub fn closed() -> Self {
        Self::default()
    }

    pub fn source(outlet: Outlet) -> Self {
        Self::new(Vec::new(), vec![outlet])
    }

    pub fn sink(inlet: Inlet) -> Self {
        Self::new(vec![inlet], Vec::new())
    }

    pub fn flow(inlet: Inlet, outlet: Outlet) -> Self {
        Self::new(vec![inlet], vec![outlet])
    }

    pub fn inlets(&self) -> &[Inlet] {
        &self.inlets
    }

    pub fn outlets(&self) -> &[Outlet] {
        &self.outlets
    }

    pub fn port_count(&self) -> usize {
        self.inlets.len() + self.outlets.len()
    }

    pub fn is_closed(&self) -> bool {
        self.inlets.is_empty() && self.outlets.is_empty()
    }

    pub fn inlet(&self, port: InPort) -> Option<&Inlet> {
        self.inlets.get(port.0)
    }

    pub fn outlet(&self, port: OutPort) -> Option<&Outlet> {
        self.outlets.get(port.0)
    }

    /// Same names and arity, fresh port identities.
    pub fn deep_copy(&self) -> Self {
        Self {
            inlets: self.inlets.iter().map(Inlet::carbon_copy).collect(),
            outlets: self.outlets.iter().map(Outlet::carbon_copy).collect(),
        }
    }

    /// True when both shapes have the same port names in the same order.
    pub fn has_same_layout(&self, other: &Shape) -> bool {
        self.inlets.len() == other.inlets.len()
            && self.outlets.len() == other.outlets.len()
            && self
                .inlets
                .iter()
                .zip(&other.inlets)
                .all(|(a, b)| a.name() == b.name())
            && self
                .outlets
                .iter()
                .zip(&other.outlets)
                .all(|(a, b)| a.name() == b.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deep_copy_preserves_layout_with_new_identities() {
        let shape = Shape::flow(Inlet::new("in"), Outlet::new("out"));
        let copy = shape.deep_copy();

        assert!(shape.has_same_layout(&copy));
        assert_ne!(shape, copy);
        assert_ne!(shape.inlets()[0].id(), copy.inlets()[0].id());
        assert_ne!(shape.outlets()[0].id(), copy.outlets()[0].id());
    }

    #[test]
    fn test_local_port_lookup() {
        let shape = Shape::flow(Inlet::new("in"), Outlet::new("out"));
        assert_eq!(shape.inlet(InPort(0)).map(Inlet::name), Some("in"));
        assert!(shape.inlet(InPort(1)).is_none());
        assert_eq!(shape.outlet(OutPort(0)).map(Outlet::name), Some("out"));
        assert_eq!(shape.port_count(), 2);
        assert!(Shape::closed().is_closed());
    }
}
