// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::engine::interpreter::{InterpreterCore, Slot};
use crate::engine::port_state::*;
use crate::errors::StreamError;
use crate::graph::{downcast_element, Element, InPort, OutPort};
use crate::traits::StageResult;
use std::any::Any;
use std::sync::Arc;

pub(crate) type AsyncSink = Arc<dyn Fn(usize, Element) -> bool + Send + Sync>;

/// Posts events back into a running stage from outside the interpreter.
///
/// The event is delivered to the stage's `on_async_input` hook on the
/// interpreter's own thread, never re-entrantly.
#[derive(Clone)]
pub struct AsyncCallback {
    stage: usize,
    sink: AsyncSink,
}

impl AsyncCallback {
    /// Returns false when the host is gone and the event was dropped.
    pub fn invoke(&self, event: Element) -> bool {
        (self.sink)(self.stage, event)
    }

    pub fn invoke_value<T: Any + Send>(&self, value: T) -> bool {
        self.invoke(Box::new(value))
    }
}

pub(crate) enum PortMap<'a> {
    Stage(&'a [usize]),
    Boundary(usize),
}

impl PortMap<'_> {
    fn get(&self, slot: usize) -> Option<usize> {
        match self {
            PortMap::Stage(ports) => ports.get(slot).copied(),
            PortMap::Boundary(connection) => (slot == 0).then_some(*connection),
        }
    }

    fn len(&self) -> usize {
        match self {
            PortMap::Stage(ports) => ports.len(),
            PortMap::Boundary(_) => 1,
        }
    }
}

/// What a handler may do while it runs.
///
/// Ports are addressed by their position in the stage shape. All operations
/// are non-blocking; the effects are delivered by the interpreter's event
/// loop after the handler returns.
pub struct StageContext<'a> {
    core: &'a mut InterpreterCore,
    stage: Option<usize>,
    ports: PortMap<'a>,
    in_count: usize,
    state: Option<&'a mut (dyn Any + Send + 'static)>,
}

impl<'a> StageContext<'a> {
    pub(crate) fn new(
        core: &'a mut InterpreterCore,
        stage: Option<usize>,
        ports: PortMap<'a>,
        in_count: usize,
        state: Option<&'a mut (dyn Any + Send + 'static)>,
    ) -> Self {
        Self {
            core,
            stage,
            ports,
            in_count,
            state,
        }
    }

    /// Index of the running stage, or `None` for a boundary.
    pub fn stage_id(&self) -> Option<usize> {
        self.stage
    }

    fn conn_in(&self, port: InPort) -> Result<usize, StreamError> {
        if port.0 >= self.in_count {
            return Err(StreamError::UnknownPort { index: port.0 });
        }
        self.ports
            .get(port.0)
            .ok_or(StreamError::UnknownPort { index: port.0 })
    }

    fn conn_out(&self, port: OutPort) -> Result<usize, StreamError> {
        self.ports
            .get(self.in_count + port.0)
            .ok_or(StreamError::UnknownPort { index: port.0 })
    }

    fn state_of_in(&self, port: InPort) -> Option<u32> {
        self.conn_in(port).ok().map(|c| self.core.port_states[c])
    }

    fn state_of_out(&self, port: OutPort) -> Option<u32> {
        self.conn_out(port).ok().map(|c| self.core.port_states[c])
    }

    /// Emit an element. Requires outstanding demand; pushing after the
    /// downstream cancelled drops the element silently.
    pub fn push(&mut self, port: OutPort, element: Element) -> StageResult {
        let connection = self.conn_out(port)?;
        let state = self.core.port_states[connection];
        if state & (OUT_READY | OUT_CLOSED | IN_CLOSED) == OUT_READY {
            self.core.push(connection, element);
            Ok(())
        } else if state & (OUT_READY | OUT_CLOSED) != OUT_READY {
            Err(StreamError::PushWithoutDemand { connection })
        } else {
            self.core.port_states[connection] = state ^ PUSH_START_FLIP;
            Ok(())
        }
    }

    pub fn push_value<T: Any + Send>(&mut self, port: OutPort, value: T) -> StageResult {
        self.push(port, Box::new(value))
    }

    /// Request one element. Pulling a port whose upstream already completed is
    /// recorded but never delivered.
    pub fn pull(&mut self, port: InPort) -> StageResult {
        let connection = self.conn_in(port)?;
        let state = self.core.port_states[connection];
        if state & IN_CLOSED != 0 {
            return Err(StreamError::PullClosed { connection });
        }
        if state & (IN_READY | IN_CLOSED) == 0 {
            return Err(StreamError::PullTwice { connection });
        }
        self.core.pull(connection);
        Ok(())
    }

    /// Take the element that was pushed to `port`.
    ///
    /// After an upstream failure the element that was in flight at the time
    /// is still available here, once.
    pub fn grab(&mut self, port: InPort) -> Result<Element, StreamError> {
        let connection = self.conn_in(port)?;
        let state = self.core.port_states[connection];
        let slot = &mut self.core.slots[connection];
        if state & (IN_READY | IN_FAILED) == IN_READY {
            if let Slot::Element(element) = std::mem::replace(slot, Slot::Empty) {
                return Ok(element);
            }
        } else if state & (IN_READY | IN_FAILED) == IN_READY | IN_FAILED {
            if let Slot::Failed { previous, .. } = slot {
                if let Some(element) = previous.take() {
                    return Ok(element);
                }
            }
        }
        Err(StreamError::GrabEmpty { connection })
    }

    pub fn grab_value<T: Any>(&mut self, port: InPort) -> Result<T, StreamError> {
        downcast_element(self.grab(port)?)
    }

    /// Complete an output. A no-op once the output is closed.
    pub fn complete(&mut self, port: OutPort) {
        if let Ok(connection) = self.conn_out(port) {
            self.core.complete(connection);
        }
    }

    /// Fail an output. A no-op once the output is closed.
    pub fn fail(&mut self, port: OutPort, cause: StreamError) {
        if let Ok(connection) = self.conn_out(port) {
            self.core.fail(connection, cause);
        }
    }

    /// Cancel an input. A no-op once the input is closed.
    pub fn cancel(&mut self, port: InPort) {
        if let Ok(connection) = self.conn_in(port) {
            self.core.cancel(connection);
        }
    }

    /// Cancel every input and complete every output.
    pub fn complete_stage(&mut self) {
        for slot in 0..self.ports.len() {
            if let Some(connection) = self.ports.get(slot) {
                if slot < self.in_count {
                    self.core.cancel(connection);
                } else {
                    self.core.complete(connection);
                }
            }
        }
        self.set_keep_going(false);
    }

    /// Cancel every input and fail every output with `cause`.
    pub fn fail_stage(&mut self, cause: StreamError) {
        for slot in 0..self.ports.len() {
            if let Some(connection) = self.ports.get(slot) {
                if slot < self.in_count {
                    self.core.cancel(connection);
                } else {
                    self.core.fail(connection, cause.clone());
                }
            }
        }
        self.set_keep_going(false);
    }

    pub fn is_in_available(&self, port: InPort) -> bool {
        let Ok(connection) = self.conn_in(port) else {
            return false;
        };
        let state = self.core.port_states[connection];
        match &self.core.slots[connection] {
            Slot::Element(_) => state & (IN_READY | IN_FAILED) == IN_READY,
            Slot::Failed {
                previous: Some(_), ..
            } => state & (IN_READY | IN_FAILED) == IN_READY | IN_FAILED,
            _ => false,
        }
    }

    pub fn is_out_available(&self, port: OutPort) -> bool {
        self.state_of_out(port)
            .is_some_and(|s| s & (OUT_READY | OUT_CLOSED) == OUT_READY)
    }

    pub fn has_been_pulled(&self, port: InPort) -> bool {
        self.state_of_in(port)
            .is_some_and(|s| s & (IN_READY | IN_CLOSED) == 0)
    }

    pub fn is_in_closed(&self, port: InPort) -> bool {
        self.state_of_in(port).map_or(true, |s| s & IN_CLOSED != 0)
    }

    pub fn is_out_closed(&self, port: OutPort) -> bool {
        self.state_of_out(port).map_or(true, |s| s & OUT_CLOSED != 0)
    }

    /// Keep the stage running after all of its ports have closed.
    pub fn set_keep_going(&mut self, enabled: bool) {
        if let Some(stage) = self.stage {
            let counter = &mut self.core.shutdown_counters[stage];
            if enabled {
                *counter |= KEEP_GOING_FLAG;
            } else {
                *counter &= KEEP_GOING_MASK;
            }
        }
    }

    pub fn async_callback(&self) -> Result<AsyncCallback, StreamError> {
        match (self.stage, self.core.async_sink.as_ref()) {
            (Some(stage), Some(sink)) => Ok(AsyncCallback {
                stage,
                sink: sink.clone(),
            }),
            _ => Err(StreamError::NoAsyncHost),
        }
    }

    /// The stage-wide state installed with `StageLogic::with_state`.
    pub fn state_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.state.as_deref_mut()?.downcast_mut::<T>()
    }
}

#[cfg(test)]
mod tests {
    use crate::config::MaterializerSettings;
    use crate::engine::{Assembly, GraphInterpreter, NoBoundary};
    use crate::errors::StreamError;
    use crate::graph::{InPort, OutPort};
    use crate::stages::IgnoreSink;
    use std::sync::Arc;

    const IN: InPort = InPort(0);
    const OUT: OutPort = OutPort(0);

    #[test]
    fn test_port_queries_follow_the_handshake() {
        let assembly = Arc::new(Assembly::linear(vec![Arc::new(IgnoreSink::new())]).unwrap());
        let mut interpreter =
            GraphInterpreter::from_assembly("queries", assembly, &MaterializerSettings::default())
                .unwrap();
        interpreter.init();
        {
            let ctx = interpreter.downstream_boundary_context(0);
            assert!(ctx.has_been_pulled(IN));
            assert!(!ctx.is_in_available(IN));
            assert!(ctx.stage_id().is_none());
        }
        assert!(!interpreter.upstream_boundary_context(0).is_out_available(OUT));

        interpreter.execute(1, &mut NoBoundary).unwrap();
        {
            let mut ctx = interpreter.upstream_boundary_context(0);
            assert!(ctx.is_out_available(OUT));
            ctx.push_value(OUT, 5_u8).unwrap();
            assert!(!ctx.is_out_available(OUT));
            assert_eq!(
                ctx.push_value(OUT, 6_u8),
                Err(StreamError::PushWithoutDemand { connection: 0 })
            );
        }
        assert!(!interpreter.downstream_boundary_context(0).is_in_available(IN));

        interpreter.execute(1, &mut NoBoundary).unwrap();
        {
            let mut ctx = interpreter.upstream_boundary_context(0);
            ctx.complete(OUT);
            assert!(ctx.is_out_closed(OUT));
        }
        assert!(!interpreter.downstream_boundary_context(0).is_in_closed(IN));

        interpreter.execute(10, &mut NoBoundary).unwrap();
        assert!(interpreter.downstream_boundary_context(0).is_in_closed(IN));
        assert!(interpreter.is_completed());
    }
}
