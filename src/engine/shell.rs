// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! One running island together with its boundary adapters.
//!
//! A shell owns the interpreter of one island, one [`BatchingInputBoundary`]
//! per open inlet and one [`OutputBoundary`] per open outlet. It is driven
//! exclusively by [`HostMessage`]s: every message is dispatched to the
//! adapter it targets, then the interpreter runs one bounded batch.

use crate::config::MaterializerSettings;
use crate::engine::assembly::{Assembly, MaterializedAssembly};
use crate::engine::boundary::{BatchingInputBoundary, BoundarySubscriber, OutputBoundary};
use crate::engine::host::HostMessage;
use crate::engine::interpreter::{BoundaryHandler, GraphInterpreter};
use crate::engine::publisher::ExposedPublisher;
use crate::engine::StageContext;
use crate::errors::StreamError;
use crate::observability::messages::host::{AbortDrainFailed, ShellAborted};
use crate::observability::messages::StructuredLog;
use crate::traits::{StageResult, Subscriber};
use serde::Serialize;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::UnboundedSender;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ShellId(pub u64);

impl Display for ShellId {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "shell-{}", self.0)
    }
}

/// The adapters of one shell, addressed by boundary index.
struct Boundaries {
    inputs: Vec<BatchingInputBoundary>,
    outputs: Vec<OutputBoundary>,
}

impl Boundaries {
    fn input(&mut self, index: usize) -> Result<&mut BatchingInputBoundary, StreamError> {
        self.inputs
            .get_mut(index)
            .ok_or(StreamError::UnknownPort { index })
    }

    fn output(&mut self, index: usize) -> Result<&mut OutputBoundary, StreamError> {
        self.outputs
            .get_mut(index)
            .ok_or(StreamError::UnknownPort { index })
    }
}

impl BoundaryHandler for Boundaries {
    fn on_push(&mut self, index: usize, ctx: &mut StageContext<'_>) -> StageResult {
        self.output(index)?.on_push(ctx)
    }

    fn on_upstream_finish(&mut self, index: usize, _ctx: &mut StageContext<'_>) -> StageResult {
        self.output(index)?.complete();
        Ok(())
    }

    fn on_upstream_failure(
        &mut self,
        index: usize,
        _ctx: &mut StageContext<'_>,
        cause: StreamError,
    ) -> StageResult {
        self.output(index)?.fail(cause);
        Ok(())
    }

    fn on_pull(&mut self, index: usize, ctx: &mut StageContext<'_>) -> StageResult {
        self.input(index)?.on_pull(ctx)
    }

    fn on_downstream_finish(&mut self, index: usize, _ctx: &mut StageContext<'_>) -> StageResult {
        self.input(index)?.cancel();
        Ok(())
    }
}

pub struct GraphInterpreterShell {
    id: ShellId,
    interpreter: GraphInterpreter,
    boundaries: Boundaries,
    input_connections: Vec<usize>,
    output_connections: Vec<usize>,
    publishers: Vec<Arc<ExposedPublisher>>,
    host: UnboundedSender<HostMessage>,
    subscribes_pending: usize,
    publishers_pending: usize,
    shell_event_limit: usize,
    abort_limit: usize,
    subscription_timeout: Duration,
    deadline: Instant,
    initialized: bool,
    resume_scheduled: bool,
    waiting_for_shutdown: bool,
    terminated: bool,
}

impl GraphInterpreterShell {
    /// `buffer_size` sizes every input adapter of this island.
    pub fn new(
        id: ShellId,
        assembly: Arc<Assembly>,
        materialized: MaterializedAssembly,
        settings: &MaterializerSettings,
        buffer_size: usize,
        host: UnboundedSender<HostMessage>,
    ) -> Self {
        let input_connections = assembly.boundary_inputs();
        let output_connections = assembly.boundary_outputs();
        let ports = assembly.ins().len() + assembly.outs().len();
        let interpreter = GraphInterpreter::new(id.to_string(), assembly, materialized, settings);

        let boundaries = Boundaries {
            inputs: input_connections
                .iter()
                .map(|_| BatchingInputBoundary::new(buffer_size))
                .collect(),
            outputs: (0..output_connections.len())
                .map(|index| OutputBoundary::new(id, index, host.clone()))
                .collect(),
        };
        let publishers = (0..output_connections.len())
            .map(|index| Arc::new(ExposedPublisher::new(id, index, host.clone())))
            .collect();

        let shell_event_limit = settings.max_input_buffer_size().max(1) * ports.max(1);
        let subscription_timeout = settings.subscription_timeout();

        Self {
            id,
            interpreter,
            boundaries,
            subscribes_pending: input_connections.len(),
            publishers_pending: output_connections.len(),
            input_connections,
            output_connections,
            publishers,
            host,
            shell_event_limit,
            abort_limit: shell_event_limit * 2,
            subscription_timeout,
            deadline: Instant::now() + subscription_timeout,
            initialized: false,
            resume_scheduled: false,
            waiting_for_shutdown: false,
            terminated: false,
        }
    }

    pub fn id(&self) -> ShellId {
        self.id
    }

    pub fn interpreter(&self) -> &GraphInterpreter {
        &self.interpreter
    }

    pub fn input_count(&self) -> usize {
        self.input_connections.len()
    }

    pub fn output_count(&self) -> usize {
        self.output_connections.len()
    }

    /// Events one batch may process: the maximum input buffer size times
    /// the number of port ends on the island's connections, boundary ends
    /// included. An island without connections still gets one buffer's worth.
    pub fn event_limit(&self) -> usize {
        self.shell_event_limit
    }

    /// The subscriber an upstream publisher must be connected to for inlet `input`.
    pub fn subscriber(&self, input: usize) -> Arc<dyn Subscriber> {
        Arc::new(BoundarySubscriber::new(self.id, input, self.host.clone()))
    }

    /// The publisher serving outlet `output`.
    pub fn publisher(&self, output: usize) -> Option<Arc<ExposedPublisher>> {
        self.publishers.get(output).cloned()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    pub fn is_waiting_for_shutdown(&self) -> bool {
        self.waiting_for_shutdown
    }

    fn can_shut_down(&self) -> bool {
        self.subscribes_pending + self.publishers_pending == 0
    }

    /// Attach the adapters, start every stage and run the first batch.
    pub fn init(&mut self, event_limit: usize) -> usize {
        for (index, &connection) in self.input_connections.iter().enumerate() {
            self.interpreter.attach_upstream_boundary(connection, index);
        }
        for (index, &connection) in self.output_connections.iter().enumerate() {
            self.interpreter.attach_downstream_boundary(connection, index);
        }
        let (id, host) = (self.id, self.host.clone());
        self.interpreter.set_async_sink(move |stage, event| {
            host.send(HostMessage::AsyncInput {
                shell: id,
                stage,
                event,
            })
            .is_ok()
        });
        self.initialized = true;
        self.interpreter.init();
        self.run_batch(event_limit)
    }

    /// Handle one message and return the part of `event_limit` that was not used.
    ///
    /// An error means a boundary signal violated the protocol; the caller
    /// aborts the shell with it.
    pub fn receive(&mut self, message: HostMessage, event_limit: usize) -> Result<usize, StreamError> {
        if self.terminated {
            return Ok(event_limit);
        }
        if self.waiting_for_shutdown {
            return Ok(self.receive_while_shutting_down(message, event_limit));
        }

        match message {
            HostMessage::OnNext { input, element, .. } => {
                let connection = self.input_connection(input)?;
                let mut ctx = self.interpreter.upstream_boundary_context(connection);
                self.boundaries.input(input)?.on_next(&mut ctx, element)?;
            }
            HostMessage::OnError { input, cause, .. } => {
                let connection = self.input_connection(input)?;
                let mut ctx = self.interpreter.upstream_boundary_context(connection);
                self.boundaries.input(input)?.on_error(&mut ctx, cause);
            }
            HostMessage::OnComplete { input, .. } => {
                let connection = self.input_connection(input)?;
                let mut ctx = self.interpreter.upstream_boundary_context(connection);
                self.boundaries.input(input)?.on_complete(&mut ctx);
            }
            HostMessage::OnSubscribe {
                input,
                subscription,
                ..
            } => {
                self.subscribes_pending = self.subscribes_pending.saturating_sub(1);
                self.boundaries.input(input)?.on_subscribe(subscription);
            }
            HostMessage::RequestMore { output, demand, .. } => {
                let connection = self.output_connection(output)?;
                let mut ctx = self.interpreter.downstream_boundary_context(connection);
                self.boundaries.output(output)?.request_more(&mut ctx, demand)?;
            }
            HostMessage::Cancel { output, .. } => {
                let connection = self.output_connection(output)?;
                let mut ctx = self.interpreter.downstream_boundary_context(connection);
                self.boundaries.output(output)?.cancel(&mut ctx);
            }
            HostMessage::SubscribePending { output, .. } => {
                self.boundaries.output(output)?.subscribe_pending();
                return Ok(event_limit);
            }
            HostMessage::ExposedPublisher {
                output, publisher, ..
            } => {
                self.publishers_pending = self.publishers_pending.saturating_sub(1);
                self.boundaries.output(output)?.exposed_publisher(publisher);
                return Ok(event_limit);
            }
            HostMessage::AsyncInput { stage, event, .. } => {
                self.interpreter.run_async_input(stage, event);
                if event_limit == 1 && self.interpreter.is_suspended() {
                    self.send_resume();
                    return Ok(0);
                }
                return Ok(self.run_batch(event_limit.saturating_sub(1)));
            }
            HostMessage::Resume { .. } => {
                self.resume_scheduled = false;
            }
            HostMessage::Abort { cause, .. } => {
                self.try_abort(cause);
                return Ok(0);
            }
            // Handled by the host before any shell sees it.
            HostMessage::Register { .. } => return Ok(event_limit),
        }
        Ok(self.run_batch(event_limit))
    }

    fn receive_while_shutting_down(&mut self, message: HostMessage, event_limit: usize) -> usize {
        match message {
            HostMessage::OnSubscribe { subscription, .. } => {
                self.subscribes_pending = self.subscribes_pending.saturating_sub(1);
                subscription.cancel();
            }
            HostMessage::ExposedPublisher {
                output, publisher, ..
            } => {
                self.publishers_pending = self.publishers_pending.saturating_sub(1);
                if let Some(boundary) = self.boundaries.outputs.get_mut(output) {
                    boundary.exposed_publisher(publisher);
                }
            }
            HostMessage::Abort { cause, .. } => {
                self.try_abort(cause);
                return 0;
            }
            _ => return event_limit,
        }
        if self.can_shut_down() {
            self.terminated = true;
        }
        event_limit
    }

    fn input_connection(&self, input: usize) -> Result<usize, StreamError> {
        self.input_connections
            .get(input)
            .copied()
            .ok_or(StreamError::UnknownPort { index: input })
    }

    fn output_connection(&self, output: usize) -> Result<usize, StreamError> {
        self.output_connections
            .get(output)
            .copied()
            .ok_or(StreamError::UnknownPort { index: output })
    }

    fn send_resume(&mut self) {
        if !self.resume_scheduled {
            self.resume_scheduled = true;
            let _ = self.host.send(HostMessage::Resume { shell: self.id });
        }
    }

    fn run_batch(&mut self, event_limit: usize) -> usize {
        match self.interpreter.execute(event_limit, &mut self.boundaries) {
            Ok(remaining) => {
                if self.interpreter.is_completed() {
                    if self.can_shut_down() {
                        self.terminated = true;
                    } else {
                        self.waiting_for_shutdown = true;
                        self.deadline = Instant::now() + self.subscription_timeout;
                    }
                } else if self.interpreter.is_suspended() {
                    self.send_resume();
                }
                remaining
            }
            Err(err) => {
                self.try_abort(err.into());
                0
            }
        }
    }

    /// Fail every boundary with `cause` and stop all stages.
    pub fn try_abort(&mut self, cause: StreamError) {
        if self.terminated {
            return;
        }
        ShellAborted {
            shell: self.id.0,
            error: &cause,
        }
        .log();

        if self.initialized {
            for (index, input) in self.boundaries.inputs.iter_mut().enumerate() {
                let mut ctx = self
                    .interpreter
                    .upstream_boundary_context(self.input_connections[index]);
                input.on_internal_error(&mut ctx, cause.clone());
            }
            if let Err(error) = self.interpreter.execute(self.abort_limit, &mut self.boundaries) {
                AbortDrainFailed {
                    shell: self.id.0,
                    error: &error,
                }
                .log();
            }
        }
        self.interpreter.finish();

        for output in self.boundaries.outputs.iter_mut() {
            output.fail(cause.clone());
        }
        for input in self.boundaries.inputs.iter_mut() {
            input.cancel();
        }
        for publisher in &self.publishers {
            publisher.shutdown(Some(cause.clone()));
        }
        self.terminated = true;
    }

    /// A boundary is still unattached past the subscription deadline.
    pub fn subscription_timed_out(&self, now: Instant) -> bool {
        if self.terminated || now < self.deadline {
            return false;
        }
        self.subscribes_pending > 0
            || self.publishers_pending > 0
            || self.boundaries.outputs.iter().any(|o| !o.is_attached())
    }

    pub fn subscription_timeout(&self) -> Duration {
        self.subscription_timeout
    }
}
