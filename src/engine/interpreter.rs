// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Single-threaded event loop that runs one island.
//!
//! Every connection of the island has a state word (see
//! [`port_state`](crate::engine::port_state)) and an element slot. Stage
//! operations such as `push` and `pull` flip bits and enqueue the connection;
//! [`GraphInterpreter::execute`] later dequeues it, decodes the pending event
//! from the bits and calls the handler on the other side. A connection never
//! has more than one pending event.
//!
//! Failures thrown by a stage handler (errors or panics) fail that stage
//! only. A failure raised by a boundary handler has nobody to contain it and
//! is returned to the caller as an [`InterpreterError`].

use crate::config::MaterializerSettings;
use crate::engine::assembly::{Assembly, MaterializedAssembly, Owner};
use crate::engine::context::{AsyncSink, PortMap, StageContext};
use crate::engine::event_queue::EventQueue;
use crate::engine::port_state::*;
use crate::engine::StageLogic;
use crate::errors::{InterpreterError, StreamError};
use crate::graph::Element;
use crate::observability::messages::interpreter::{
    BoundaryHandlerFailed, PostStopPanicked, StageFailed, StageStopped,
};
use crate::observability::messages::StructuredLog;
use crate::traits::{InHandler, OutHandler, StageResult};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

pub(crate) enum Slot {
    Empty,
    Element(Element),
    Failed {
        cause: StreamError,
        previous: Option<Element>,
    },
}

/// Connection state shared by every handler invocation.
pub(crate) struct InterpreterCore {
    pub(crate) port_states: Vec<u32>,
    pub(crate) slots: Vec<Slot>,
    pub(crate) queue: EventQueue,
    pub(crate) shutdown_counters: Vec<u32>,
    pub(crate) async_sink: Option<AsyncSink>,
    in_owners: Vec<Owner>,
    out_owners: Vec<Owner>,
}

impl InterpreterCore {
    pub(crate) fn push(&mut self, connection: usize, element: Element) {
        let state = self.port_states[connection];
        self.port_states[connection] = state ^ PUSH_START_FLIP;
        if state & IN_CLOSED == 0 {
            self.slots[connection] = Slot::Element(element);
            self.queue.enqueue(connection);
        }
    }

    pub(crate) fn pull(&mut self, connection: usize) {
        let state = self.port_states[connection];
        self.port_states[connection] = state ^ PULL_START_FLIP;
        if state & OUT_CLOSED == 0 {
            self.queue.enqueue(connection);
        }
    }

    pub(crate) fn complete(&mut self, connection: usize) {
        let state = self.port_states[connection];
        self.port_states[connection] = state | OUT_CLOSED;
        if state & (IN_CLOSED | PUSHING | PULLING | OUT_CLOSED) == 0 {
            self.queue.enqueue(connection);
        }
        if state & OUT_CLOSED == 0 {
            self.complete_connection(self.out_owners[connection]);
        }
    }

    pub(crate) fn fail(&mut self, connection: usize, cause: StreamError) {
        let state = self.port_states[connection];
        self.port_states[connection] = state | OUT_CLOSED;
        if state & (IN_CLOSED | OUT_CLOSED) == 0 {
            self.port_states[connection] = state | OUT_CLOSED | IN_FAILED;
            let previous = match std::mem::replace(&mut self.slots[connection], Slot::Empty) {
                Slot::Element(element) => Some(element),
                _ => None,
            };
            self.slots[connection] = Slot::Failed { cause, previous };
            if state & (PULLING | PUSHING) == 0 {
                self.queue.enqueue(connection);
            }
        }
        if state & OUT_CLOSED == 0 {
            self.complete_connection(self.out_owners[connection]);
        }
    }

    pub(crate) fn cancel(&mut self, connection: usize) {
        let state = self.port_states[connection];
        self.port_states[connection] = state | IN_CLOSED;
        if state & OUT_CLOSED == 0 {
            self.slots[connection] = Slot::Empty;
            if state & (PULLING | PUSHING | IN_CLOSED) == 0 {
                self.queue.enqueue(connection);
            }
        }
        if state & IN_CLOSED == 0 {
            self.complete_connection(self.in_owners[connection]);
        }
    }

    fn complete_connection(&mut self, owner: Owner) {
        if let Owner::Stage(stage) = owner {
            let counter = &mut self.shutdown_counters[stage];
            if *counter & KEEP_GOING_MASK > 0 {
                *counter -= 1;
            }
        }
    }
}

enum InSlot {
    Vacant,
    Stage(Box<dyn InHandler>),
    Boundary(usize),
}

enum OutSlot {
    Vacant,
    Stage(Box<dyn OutHandler>),
    Boundary(usize),
}

enum InEvent {
    Push,
    Finish,
    Failure(StreamError),
}

enum OutEvent {
    Pull,
    DownstreamFinish,
}

/// Receives the events addressed to connections whose far end lies outside the island.
///
/// `index` is the boundary index given when the connection was attached.
pub trait BoundaryHandler {
    fn on_push(&mut self, index: usize, ctx: &mut StageContext<'_>) -> StageResult;
    fn on_upstream_finish(&mut self, index: usize, ctx: &mut StageContext<'_>) -> StageResult;
    fn on_upstream_failure(
        &mut self,
        index: usize,
        ctx: &mut StageContext<'_>,
        cause: StreamError,
    ) -> StageResult;
    fn on_pull(&mut self, index: usize, ctx: &mut StageContext<'_>) -> StageResult;
    fn on_downstream_finish(&mut self, index: usize, ctx: &mut StageContext<'_>) -> StageResult;
}

/// Boundary handler for islands with no attached boundaries.
pub struct NoBoundary;

impl BoundaryHandler for NoBoundary {
    fn on_push(&mut self, _index: usize, _ctx: &mut StageContext<'_>) -> StageResult {
        Ok(())
    }

    fn on_upstream_finish(&mut self, _index: usize, _ctx: &mut StageContext<'_>) -> StageResult {
        Ok(())
    }

    fn on_upstream_failure(
        &mut self,
        _index: usize,
        _ctx: &mut StageContext<'_>,
        _cause: StreamError,
    ) -> StageResult {
        Ok(())
    }

    fn on_pull(&mut self, _index: usize, _ctx: &mut StageContext<'_>) -> StageResult {
        Ok(())
    }

    fn on_downstream_finish(&mut self, _index: usize, _ctx: &mut StageContext<'_>) -> StageResult {
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectionSnapshot {
    pub index: usize,
    pub state: String,
    pub out_owner: Owner,
    pub in_owner: Owner,
}

#[derive(Debug, Clone, Serialize)]
pub struct StageSnapshot {
    pub index: usize,
    pub name: String,
    pub open_ports: u32,
    pub keep_going: bool,
    pub stopped: bool,
}

/// Point-in-time view of an interpreter, for diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct InterpreterSnapshot {
    pub name: String,
    pub running_stages: usize,
    pub queued: Vec<usize>,
    pub stages: Vec<StageSnapshot>,
    pub connections: Vec<ConnectionSnapshot>,
}

pub struct GraphInterpreter {
    name: String,
    assembly: Arc<Assembly>,
    logics: Vec<StageLogic>,
    in_handlers: Vec<InSlot>,
    out_handlers: Vec<OutSlot>,
    core: InterpreterCore,
    running_stages: usize,
    stopped: Vec<bool>,
    active_stage: Option<usize>,
}

impl GraphInterpreter {
    pub fn new(
        name: impl Into<String>,
        assembly: Arc<Assembly>,
        materialized: MaterializedAssembly,
        settings: &MaterializerSettings,
    ) -> Self {
        let connections = assembly.connection_count();
        let fuzz = settings.fuzzing_mode().then(|| {
            StdRng::seed_from_u64(settings.fuzzing_seed().unwrap_or_else(rand::random))
        });
        let MaterializedAssembly {
            logics,
            in_handlers,
            out_handlers,
            ..
        } = materialized;

        let shutdown_counters = logics
            .iter()
            .map(|l| (l.in_count() + l.out_count()) as u32)
            .collect();
        let core = InterpreterCore {
            port_states: vec![IN_READY; connections],
            slots: (0..connections).map(|_| Slot::Empty).collect(),
            queue: EventQueue::new(connections, fuzz),
            shutdown_counters,
            async_sink: None,
            in_owners: assembly.in_owners().to_vec(),
            out_owners: assembly.out_owners().to_vec(),
        };

        Self {
            name: name.into(),
            running_stages: logics.len(),
            stopped: vec![false; logics.len()],
            in_handlers: in_handlers
                .into_iter()
                .map(|h| h.map_or(InSlot::Vacant, InSlot::Stage))
                .collect(),
            out_handlers: out_handlers
                .into_iter()
                .map(|h| h.map_or(OutSlot::Vacant, OutSlot::Stage))
                .collect(),
            logics,
            assembly,
            core,
            active_stage: None,
        }
    }

    /// Materialize `assembly` and build an interpreter over it in one step.
    pub fn from_assembly(
        name: impl Into<String>,
        assembly: Arc<Assembly>,
        settings: &MaterializerSettings,
    ) -> Result<Self, crate::errors::ConfigurationError> {
        let materialized = assembly.materialize(&crate::graph::Attributes::none())?;
        Ok(Self::new(name, assembly, materialized, settings))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn assembly(&self) -> &Arc<Assembly> {
        &self.assembly
    }

    pub fn connection_count(&self) -> usize {
        self.core.port_states.len()
    }

    pub fn running_stages(&self) -> usize {
        self.running_stages
    }

    pub fn port_state(&self, connection: usize) -> u32 {
        self.core.port_states[connection]
    }

    pub fn queued_events(&self) -> usize {
        self.core.queue.len()
    }

    /// Events are pending.
    pub fn is_suspended(&self) -> bool {
        !self.core.queue.is_empty()
    }

    /// Every stage has stopped and nothing is pending.
    pub fn is_completed(&self) -> bool {
        self.running_stages == 0 && !self.is_suspended()
    }

    /// Route events of the out end of `connection` to a boundary.
    pub fn attach_upstream_boundary(&mut self, connection: usize, index: usize) {
        self.out_handlers[connection] = OutSlot::Boundary(index);
    }

    /// Route events of the in end of `connection` to a boundary.
    pub fn attach_downstream_boundary(&mut self, connection: usize, index: usize) {
        self.in_handlers[connection] = InSlot::Boundary(index);
    }

    /// Where `AsyncCallback`s of this island's stages post their events.
    pub fn set_async_sink(&mut self, sink: impl Fn(usize, Element) -> bool + Send + Sync + 'static) {
        self.core.async_sink = Some(Arc::new(sink));
    }

    /// Context for a boundary that feeds `connection` from outside.
    pub fn upstream_boundary_context(&mut self, connection: usize) -> StageContext<'_> {
        StageContext::new(&mut self.core, None, PortMap::Boundary(connection), 0, None)
    }

    /// Context for a boundary that drains `connection` to the outside.
    pub fn downstream_boundary_context(&mut self, connection: usize) -> StageContext<'_> {
        StageContext::new(&mut self.core, None, PortMap::Boundary(connection), 1, None)
    }

    /// Run `pre_start` of every stage. A failing stage is failed on its own.
    pub fn init(&mut self) {
        for stage in 0..self.logics.len() {
            self.active_stage = Some(stage);
            let result = {
                let logic = &mut self.logics[stage];
                let in_count = logic.in_count();
                match logic.hooks.as_mut() {
                    Some(hooks) => {
                        let mut ctx = StageContext::new(
                            &mut self.core,
                            Some(stage),
                            PortMap::Stage(&logic.port_to_conn),
                            in_count,
                            Some(&mut *logic.state),
                        );
                        guarded(|| hooks.pre_start(&mut ctx))
                    }
                    None => Ok(()),
                }
            };
            if let Err(cause) = result {
                self.report_stage_failure(stage, cause);
            }
            self.after_stage_has_run();
        }
    }

    /// Process up to `event_limit` events and return how many of the budget are left.
    pub fn execute(
        &mut self,
        event_limit: usize,
        boundary: &mut dyn BoundaryHandler,
    ) -> Result<usize, InterpreterError> {
        let mut remaining = event_limit;
        while remaining > 0 {
            let Some(connection) = self.core.queue.dequeue() else {
                break;
            };
            self.active_stage = None;
            if let Err(cause) = self.process_event(connection, boundary) {
                match self.active_stage {
                    Some(stage) => self.report_stage_failure(stage, cause),
                    None => {
                        BoundaryHandlerFailed {
                            interpreter: &self.name,
                            connection,
                            error: &cause,
                        }
                        .log();
                        return Err(InterpreterError::BoundaryFailure { connection, cause });
                    }
                }
            }
            self.after_stage_has_run();
            remaining -= 1;
        }
        Ok(remaining)
    }

    /// Deliver an event posted through an `AsyncCallback`.
    pub fn run_async_input(&mut self, stage: usize, event: Element) {
        if stage >= self.logics.len() || self.stopped[stage] {
            return;
        }
        self.active_stage = Some(stage);
        let result = {
            let logic = &mut self.logics[stage];
            let in_count = logic.in_count();
            match logic.hooks.as_mut() {
                Some(hooks) => {
                    let mut ctx = StageContext::new(
                        &mut self.core,
                        Some(stage),
                        PortMap::Stage(&logic.port_to_conn),
                        in_count,
                        Some(&mut *logic.state),
                    );
                    guarded(|| hooks.on_async_input(&mut ctx, event))
                }
                None => Ok(()),
            }
        };
        if let Err(cause) = result {
            self.report_stage_failure(stage, cause);
        }
        self.after_stage_has_run();
    }

    /// Run `post_stop` of every stage that has not stopped yet.
    pub fn finish(&mut self) {
        for stage in 0..self.logics.len() {
            if !self.stopped[stage] {
                self.finalize_stage(stage);
            }
        }
        self.running_stages = 0;
    }

    pub fn snapshot(&self) -> InterpreterSnapshot {
        InterpreterSnapshot {
            name: self.name.clone(),
            running_stages: self.running_stages,
            queued: self.core.queue.pending(),
            stages: self
                .logics
                .iter()
                .enumerate()
                .map(|(index, logic)| {
                    let counter = self.core.shutdown_counters[index];
                    StageSnapshot {
                        index,
                        name: logic.name().to_string(),
                        open_ports: counter & KEEP_GOING_MASK,
                        keep_going: counter & KEEP_GOING_FLAG != 0,
                        stopped: self.stopped[index],
                    }
                })
                .collect(),
            connections: (0..self.connection_count())
                .map(|index| ConnectionSnapshot {
                    index,
                    state: describe(self.core.port_states[index]),
                    out_owner: self.core.out_owners[index],
                    in_owner: self.core.in_owners[index],
                })
                .collect(),
        }
    }

    fn process_event(&mut self, connection: usize, boundary: &mut dyn BoundaryHandler) -> StageResult {
        let code = self.core.port_states[connection];
        if code & (PUSHING | IN_CLOSED | OUT_CLOSED) == PUSHING {
            self.process_element(connection, boundary)
        } else if code & (PULLING | OUT_CLOSED | IN_CLOSED) == PULLING {
            self.active_stage = self.core.out_owners[connection].stage();
            self.core.port_states[connection] ^= PULL_END_FLIP;
            self.dispatch_out(connection, OutEvent::Pull, boundary)
        } else if code & (OUT_CLOSED | IN_CLOSED) == IN_CLOSED {
            let owner = self.core.out_owners[connection];
            self.active_stage = owner.stage();
            self.core.port_states[connection] |= OUT_CLOSED;
            self.core.complete_connection(owner);
            self.dispatch_out(connection, OutEvent::DownstreamFinish, boundary)
        } else if code & (OUT_CLOSED | IN_CLOSED) == OUT_CLOSED {
            if code & PUSHING == 0 {
                let owner = self.core.in_owners[connection];
                self.active_stage = owner.stage();
                self.core.port_states[connection] |= IN_CLOSED;
                self.core.complete_connection(owner);
                if code & IN_FAILED == 0 {
                    self.dispatch_in(connection, InEvent::Finish, boundary)
                } else {
                    let cause = match &self.core.slots[connection] {
                        Slot::Failed { cause, .. } => cause.clone(),
                        _ => StreamError::failed("upstream failed"),
                    };
                    self.dispatch_in(connection, InEvent::Failure(cause), boundary)
                }
            } else {
                // The element goes first; the close is delivered on the next round.
                let result = self.process_element(connection, boundary);
                self.core.queue.enqueue(connection);
                result
            }
        } else {
            Ok(())
        }
    }

    fn process_element(&mut self, connection: usize, boundary: &mut dyn BoundaryHandler) -> StageResult {
        self.active_stage = self.core.in_owners[connection].stage();
        self.core.port_states[connection] ^= PUSH_END_FLIP;
        self.dispatch_in(connection, InEvent::Push, boundary)
    }

    fn dispatch_in(
        &mut self,
        connection: usize,
        event: InEvent,
        boundary: &mut dyn BoundaryHandler,
    ) -> StageResult {
        let Self {
            in_handlers,
            logics,
            core,
            ..
        } = self;
        match &mut in_handlers[connection] {
            InSlot::Stage(handler) => {
                let Some(stage) = core.in_owners[connection].stage() else {
                    return Ok(());
                };
                let logic = &mut logics[stage];
                let in_count = logic.in_count();
                let mut ctx = StageContext::new(
                    core,
                    Some(stage),
                    PortMap::Stage(&logic.port_to_conn),
                    in_count,
                    Some(&mut *logic.state),
                );
                guarded(|| match event {
                    InEvent::Push => handler.on_push(&mut ctx),
                    InEvent::Finish => handler.on_upstream_finish(&mut ctx),
                    InEvent::Failure(cause) => handler.on_upstream_failure(&mut ctx, cause),
                })
            }
            InSlot::Boundary(index) => {
                let index = *index;
                let mut ctx = StageContext::new(core, None, PortMap::Boundary(connection), 1, None);
                guarded(|| match event {
                    InEvent::Push => boundary.on_push(index, &mut ctx),
                    InEvent::Finish => boundary.on_upstream_finish(index, &mut ctx),
                    InEvent::Failure(cause) => boundary.on_upstream_failure(index, &mut ctx, cause),
                })
            }
            InSlot::Vacant => Ok(()),
        }
    }

    fn dispatch_out(
        &mut self,
        connection: usize,
        event: OutEvent,
        boundary: &mut dyn BoundaryHandler,
    ) -> StageResult {
        let Self {
            out_handlers,
            logics,
            core,
            ..
        } = self;
        match &mut out_handlers[connection] {
            OutSlot::Stage(handler) => {
                let Some(stage) = core.out_owners[connection].stage() else {
                    return Ok(());
                };
                let logic = &mut logics[stage];
                let in_count = logic.in_count();
                let mut ctx = StageContext::new(
                    core,
                    Some(stage),
                    PortMap::Stage(&logic.port_to_conn),
                    in_count,
                    Some(&mut *logic.state),
                );
                guarded(|| match event {
                    OutEvent::Pull => handler.on_pull(&mut ctx),
                    OutEvent::DownstreamFinish => handler.on_downstream_finish(&mut ctx),
                })
            }
            OutSlot::Boundary(index) => {
                let index = *index;
                let mut ctx = StageContext::new(core, None, PortMap::Boundary(connection), 0, None);
                guarded(|| match event {
                    OutEvent::Pull => boundary.on_pull(index, &mut ctx),
                    OutEvent::DownstreamFinish => boundary.on_downstream_finish(index, &mut ctx),
                })
            }
            OutSlot::Vacant => Ok(()),
        }
    }

    fn report_stage_failure(&mut self, stage: usize, cause: StreamError) {
        StageFailed {
            interpreter: &self.name,
            stage: self.logics[stage].name(),
            stage_id: stage,
            error: &cause,
        }
        .log();
        let logic = &mut self.logics[stage];
        let in_count = logic.in_count();
        let mut ctx = StageContext::new(
            &mut self.core,
            Some(stage),
            PortMap::Stage(&logic.port_to_conn),
            in_count,
            None,
        );
        ctx.fail_stage(cause);
    }

    fn after_stage_has_run(&mut self) {
        if let Some(stage) = self.active_stage.take() {
            if !self.stopped[stage] && self.core.shutdown_counters[stage] == 0 {
                self.running_stages = self.running_stages.saturating_sub(1);
                self.finalize_stage(stage);
            }
        }
    }

    fn finalize_stage(&mut self, stage: usize) {
        self.stopped[stage] = true;
        let logic = &mut self.logics[stage];
        if let Some(hooks) = logic.hooks.as_mut() {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| hooks.post_stop())) {
                PostStopPanicked {
                    interpreter: &self.name,
                    stage: logic.name(),
                    error: &StreamError::from_panic(payload),
                }
                .log();
            }
        }
        StageStopped {
            interpreter: &self.name,
            stage: logic.name(),
            stage_id: stage,
        }
        .log();
    }
}

fn guarded(f: impl FnOnce() -> StageResult) -> StageResult {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => Err(StreamError::from_panic(payload)),
    }
}
