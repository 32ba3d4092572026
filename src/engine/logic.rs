// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::graph::{InPort, OutPort, Shape};
use crate::traits::{InHandler, OutHandler, StageHooks};
use std::any::Any;

pub(crate) const UNBOUND: usize = usize::MAX;

enum PortHandler {
    In(Box<dyn InHandler>),
    Out(Box<dyn OutHandler>),
}

/// The running state of one materialized stage.
///
/// Handlers are installed per port; their positions follow the stage shape
/// (inlets first, then outlets). Mutable state shared between handlers and
/// hooks lives in `state` and is reached through `StageContext::state_mut`.
pub struct StageLogic {
    name: String,
    in_count: usize,
    handlers: Vec<Option<PortHandler>>,
    pub(crate) port_to_conn: Vec<usize>,
    pub(crate) hooks: Option<Box<dyn StageHooks>>,
    pub(crate) state: Box<dyn Any + Send>,
}

impl StageLogic {
    pub fn new(shape: &Shape) -> Self {
        let ports = shape.port_count();
        Self {
            name: "stage".to_string(),
            in_count: shape.inlets().len(),
            handlers: (0..ports).map(|_| None).collect(),
            port_to_conn: vec![UNBOUND; ports],
            hooks: None,
            state: Box::new(()),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_state<S: Any + Send>(mut self, state: S) -> Self {
        self.state = Box::new(state);
        self
    }

    pub fn with_hooks(mut self, hooks: impl StageHooks + 'static) -> Self {
        self.hooks = Some(Box::new(hooks));
        self
    }

    pub fn with_in_handler(mut self, port: InPort, handler: impl InHandler + 'static) -> Self {
        self.set_in_handler(port, handler);
        self
    }

    pub fn with_out_handler(mut self, port: OutPort, handler: impl OutHandler + 'static) -> Self {
        self.set_out_handler(port, handler);
        self
    }

    /// Ports outside the shape are ignored; the stage then fails materialization
    /// for lack of a handler.
    pub fn set_in_handler(&mut self, port: InPort, handler: impl InHandler + 'static) {
        if port.0 < self.in_count {
            self.handlers[port.0] = Some(PortHandler::In(Box::new(handler)));
        }
    }

    pub fn set_out_handler(&mut self, port: OutPort, handler: impl OutHandler + 'static) {
        let slot = self.in_count + port.0;
        if slot < self.handlers.len() {
            self.handlers[slot] = Some(PortHandler::Out(Box::new(handler)));
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn in_count(&self) -> usize {
        self.in_count
    }

    pub fn out_count(&self) -> usize {
        self.handlers.len() - self.in_count
    }

    pub(crate) fn take_in_handler(&mut self, port: usize) -> Option<Box<dyn InHandler>> {
        match self.handlers.get_mut(port)?.take() {
            Some(PortHandler::In(handler)) => Some(handler),
            _ => None,
        }
    }

    pub(crate) fn take_out_handler(&mut self, port: usize) -> Option<Box<dyn OutHandler>> {
        match self.handlers.get_mut(self.in_count + port)?.take() {
            Some(PortHandler::Out(handler)) => Some(handler),
            _ => None,
        }
    }

    /// Record that local port slot `local` (inlets first) sits on `connection`.
    pub(crate) fn bind(&mut self, local: usize, connection: usize) {
        if let Some(slot) = self.port_to_conn.get_mut(local) {
            *slot = connection;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::StageContext;
    use crate::graph::{Inlet, Outlet};
    use crate::traits::StageResult;

    struct Noop;

    impl InHandler for Noop {
        fn on_push(&mut self, _ctx: &mut StageContext<'_>) -> StageResult {
            Ok(())
        }
    }

    impl OutHandler for Noop {
        fn on_pull(&mut self, _ctx: &mut StageContext<'_>) -> StageResult {
            Ok(())
        }
    }

    #[test]
    fn test_handlers_are_taken_once() {
        let shape = Shape::flow(Inlet::new("in"), Outlet::new("out"));
        let mut logic = StageLogic::new(&shape)
            .with_in_handler(InPort(0), Noop)
            .with_out_handler(OutPort(0), Noop);

        assert_eq!(logic.in_count(), 1);
        assert_eq!(logic.out_count(), 1);
        assert!(logic.take_in_handler(0).is_some());
        assert!(logic.take_in_handler(0).is_none());
        assert!(logic.take_out_handler(0).is_some());
        assert!(logic.take_out_handler(1).is_none());
    }

    #[test]
    fn test_out_of_range_handler_is_ignored() {
        let shape = Shape::sink(Inlet::new("in"));
        let mut logic = StageLogic::new(&shape).with_out_handler(OutPort(0), Noop);
        assert!(logic.take_in_handler(0).is_none());
    }
}
