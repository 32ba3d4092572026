// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! The runtime that owns and drives shells.
//!
//! All input for a shell, whether a boundary signal from another island, a
//! signal from an external publisher or subscriber, or an async callback of
//! one of its stages, arrives as a [`HostMessage`] on the host's single
//! channel. The host can be pumped synchronously ([`GraphInterpreterHost::pump`])
//! or spawned onto the tokio runtime ([`GraphInterpreterHost::spawn`]).
//!
//! New shells reach the host through [`ShellRegistry`]: directly while the
//! host is owned, or as a [`HostMessage::Register`] through the
//! [`HostHandle`] once it runs. Either way they queue up as new shells and
//! are initialized by their first message.

use crate::config::MaterializerSettings;
use crate::engine::publisher::ExposedPublisher;
use crate::engine::shell::{GraphInterpreterShell, ShellId};
use crate::errors::StreamError;
use crate::graph::Element;
use crate::observability::messages::host::{
    HostStarted, HostStopped, ShellRegistered, ShellTerminated, SubscriptionTimedOut,
};
use crate::observability::messages::StructuredLog;
use crate::traits::Subscription;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const MIN_TIMEOUT_TICK: Duration = Duration::from_millis(10);

/// Everything a shell can be told.
pub enum HostMessage {
    OnNext {
        shell: ShellId,
        input: usize,
        element: Element,
    },
    OnError {
        shell: ShellId,
        input: usize,
        cause: StreamError,
    },
    OnComplete {
        shell: ShellId,
        input: usize,
    },
    OnSubscribe {
        shell: ShellId,
        input: usize,
        subscription: Arc<dyn Subscription>,
    },
    RequestMore {
        shell: ShellId,
        output: usize,
        demand: i64,
    },
    Cancel {
        shell: ShellId,
        output: usize,
    },
    SubscribePending {
        shell: ShellId,
        output: usize,
    },
    ExposedPublisher {
        shell: ShellId,
        output: usize,
        publisher: Arc<ExposedPublisher>,
    },
    AsyncInput {
        shell: ShellId,
        stage: usize,
        event: Element,
    },
    Resume {
        shell: ShellId,
    },
    Abort {
        shell: ShellId,
        cause: StreamError,
    },
    /// A shell materialized after the host started running.
    Register {
        shell: Box<GraphInterpreterShell>,
    },
}

impl HostMessage {
    pub fn shell(&self) -> ShellId {
        match self {
            HostMessage::OnNext { shell, .. }
            | HostMessage::OnError { shell, .. }
            | HostMessage::OnComplete { shell, .. }
            | HostMessage::OnSubscribe { shell, .. }
            | HostMessage::RequestMore { shell, .. }
            | HostMessage::Cancel { shell, .. }
            | HostMessage::SubscribePending { shell, .. }
            | HostMessage::ExposedPublisher { shell, .. }
            | HostMessage::AsyncInput { shell, .. }
            | HostMessage::Resume { shell }
            | HostMessage::Abort { shell, .. } => *shell,
            HostMessage::Register { shell } => shell.id(),
        }
    }
}

/// Anything shells can be registered with.
pub trait ShellRegistry {
    fn settings(&self) -> &MaterializerSettings;

    /// The channel registered shells read from.
    fn sender(&self) -> UnboundedSender<HostMessage>;

    fn allocate_shell_id(&mut self) -> ShellId;

    fn register_shell(&mut self, shell: GraphInterpreterShell);
}

pub struct GraphInterpreterHost {
    name: String,
    settings: MaterializerSettings,
    tx: UnboundedSender<HostMessage>,
    rx: UnboundedReceiver<HostMessage>,
    active: BTreeMap<ShellId, GraphInterpreterShell>,
    new_shells: BTreeMap<ShellId, GraphInterpreterShell>,
    next_shell: Arc<AtomicU64>,
    stopped: bool,
}

impl ShellRegistry for GraphInterpreterHost {
    fn settings(&self) -> &MaterializerSettings {
        GraphInterpreterHost::settings(self)
    }

    fn sender(&self) -> UnboundedSender<HostMessage> {
        GraphInterpreterHost::sender(self)
    }

    fn allocate_shell_id(&mut self) -> ShellId {
        GraphInterpreterHost::allocate_shell_id(self)
    }

    fn register_shell(&mut self, shell: GraphInterpreterShell) {
        GraphInterpreterHost::register_shell(self, shell)
    }
}

impl GraphInterpreterHost {
    pub fn new(name: impl Into<String>, settings: MaterializerSettings) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            name: name.into(),
            settings,
            tx,
            rx,
            active: BTreeMap::new(),
            new_shells: BTreeMap::new(),
            next_shell: Arc::new(AtomicU64::new(1)),
            stopped: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn settings(&self) -> &MaterializerSettings {
        &self.settings
    }

    /// The channel every shell of this host reads from.
    pub fn sender(&self) -> UnboundedSender<HostMessage> {
        self.tx.clone()
    }

    pub fn allocate_shell_id(&mut self) -> ShellId {
        ShellId(self.next_shell.fetch_add(1, Ordering::Relaxed))
    }

    /// Take ownership of `shell`. It is initialized lazily by its first message.
    pub fn register_shell(&mut self, shell: GraphInterpreterShell) {
        let id = shell.id();
        ShellRegistered {
            host: &self.name,
            shell: id.0,
            connections: shell.interpreter().connection_count(),
        }
        .log();

        let _ = self.tx.send(HostMessage::Resume { shell: id });
        for output in 0..shell.output_count() {
            if let Some(publisher) = shell.publisher(output) {
                let _ = self.tx.send(HostMessage::ExposedPublisher {
                    shell: id,
                    output,
                    publisher,
                });
            }
        }
        if self.stopped {
            let mut shell = shell;
            shell.try_abort(StreamError::AbruptTermination);
            return;
        }
        self.new_shells.insert(id, shell);
    }

    pub fn shell(&self, id: ShellId) -> Option<&GraphInterpreterShell> {
        self.active.get(&id).or_else(|| self.new_shells.get(&id))
    }

    pub fn shell_count(&self) -> usize {
        self.active.len() + self.new_shells.len()
    }

    /// No shell is left to run.
    pub fn is_idle(&self) -> bool {
        self.active.is_empty() && self.new_shells.is_empty()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    fn try_init(&mut self, id: ShellId) -> bool {
        if self.active.contains_key(&id) {
            return true;
        }
        match self.new_shells.remove(&id) {
            Some(mut shell) => {
                let limit = shell.event_limit();
                shell.init(limit);
                self.active.insert(id, shell);
                true
            }
            None => false,
        }
    }

    /// Deliver one message to its shell.
    pub fn receive(&mut self, message: HostMessage) {
        let message = match message {
            HostMessage::Register { shell } => {
                self.register_shell(*shell);
                return;
            }
            other => other,
        };
        let id = message.shell();
        if !self.try_init(id) {
            discard(message);
            return;
        }
        if let Some(shell) = self.active.get_mut(&id) {
            let limit = shell.event_limit();
            if let Err(cause) = shell.receive(message, limit) {
                shell.try_abort(cause);
            }
        }
        self.remove_if_terminated(id);
    }

    fn remove_if_terminated(&mut self, id: ShellId) {
        let terminated = self
            .active
            .get(&id)
            .is_some_and(GraphInterpreterShell::is_terminated);
        if terminated {
            self.active.remove(&id);
            ShellTerminated {
                host: &self.name,
                shell: id.0,
            }
            .log();
        }
    }

    /// Process queued messages until the channel is empty; returns how many were handled.
    pub fn pump(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(message) = self.rx.try_recv() {
            self.receive(message);
            handled += 1;
        }
        handled
    }

    /// Abort every shell that still waits for a boundary at `now`.
    pub fn check_subscription_timeouts(&mut self, now: Instant) -> usize {
        let mut aborted = 0;
        for (id, shell) in &self.active {
            if shell.subscription_timed_out(now) {
                let timeout_ms = shell.subscription_timeout().as_millis() as u64;
                SubscriptionTimedOut {
                    host: &self.name,
                    shell: id.0,
                    timeout_ms,
                }
                .log();
                let _ = self.tx.send(HostMessage::Abort {
                    shell: *id,
                    cause: StreamError::SubscriptionTimeout { timeout_ms },
                });
                aborted += 1;
            }
        }
        aborted
    }

    /// Abort every remaining shell with `AbruptTermination`.
    pub fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        let mut aborted = 0;
        let shells = std::mem::take(&mut self.active)
            .into_values()
            .chain(std::mem::take(&mut self.new_shells).into_values());
        for mut shell in shells {
            if !shell.is_terminated() {
                shell.try_abort(StreamError::AbruptTermination);
                aborted += 1;
            }
        }
        while let Ok(message) = self.rx.try_recv() {
            discard(message);
        }
        HostStopped {
            host: &self.name,
            aborted,
        }
        .log();
    }

    fn timeout_tick(&self) -> Duration {
        (self.settings.subscription_timeout() / 4).max(MIN_TIMEOUT_TICK)
    }

    /// Run the host on the tokio runtime.
    ///
    /// The host keeps accepting shells through the returned handle, even
    /// while it has nothing to run. It stops once [`HostHandle::join`] has
    /// been called and every shell has terminated, or when the handle is
    /// cancelled.
    pub fn spawn(self) -> HostHandle {
        let token = CancellationToken::new();
        let drain = CancellationToken::new();
        let sender = self.sender();
        let settings = self.settings.clone();
        let next_shell = self.next_shell.clone();
        let join = tokio::spawn(self.run(token.clone(), drain.clone()));
        HostHandle {
            sender,
            settings,
            next_shell,
            token,
            drain,
            join,
        }
    }

    async fn run(mut self, token: CancellationToken, drain: CancellationToken) -> GraphInterpreterHost {
        HostStarted { host: &self.name }.log();
        let mut ticker = tokio::time::interval(self.timeout_tick());
        let batch = self.settings.sync_processing_limit().max(1);
        let mut draining = false;

        loop {
            if draining && self.is_idle() {
                break;
            }
            tokio::select! {
                _ = token.cancelled() => break,
                _ = drain.cancelled(), if !draining => draining = true,
                message = self.rx.recv() => {
                    let Some(message) = message else { break };
                    self.receive(message);
                    let mut handled = 1;
                    while handled < batch {
                        match self.rx.try_recv() {
                            Ok(message) => self.receive(message),
                            Err(_) => break,
                        }
                        handled += 1;
                    }
                    if handled == batch {
                        tokio::task::yield_now().await;
                    }
                }
                _ = ticker.tick() => {
                    self.check_subscription_timeouts(Instant::now());
                }
            }
        }
        self.stop();
        self
    }
}

/// Release whatever a message for an unknown shell holds on to.
fn discard(message: HostMessage) {
    match message {
        HostMessage::OnSubscribe { subscription, .. } => subscription.cancel(),
        HostMessage::Register { shell } => {
            let mut shell = *shell;
            shell.try_abort(StreamError::AbruptTermination);
        }
        HostMessage::ExposedPublisher { publisher, .. } => {
            publisher.shutdown(Some(StreamError::AbruptTermination))
        }
        _ => {}
    }
}

/// Control over a host running on the tokio runtime.
///
/// Graphs can still be materialized into the running host through the
/// handle's [`ShellRegistry`] implementation.
pub struct HostHandle {
    sender: UnboundedSender<HostMessage>,
    settings: MaterializerSettings,
    next_shell: Arc<AtomicU64>,
    token: CancellationToken,
    drain: CancellationToken,
    join: JoinHandle<GraphInterpreterHost>,
}

impl HostHandle {
    pub fn sender(&self) -> UnboundedSender<HostMessage> {
        self.sender.clone()
    }

    pub fn settings(&self) -> &MaterializerSettings {
        &self.settings
    }

    /// Stop the host; running shells are aborted.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Let the host finish its running shells, then wait for it and get it back.
    pub async fn join(self) -> Result<GraphInterpreterHost, tokio::task::JoinError> {
        self.drain.cancel();
        self.join.await
    }
}

impl ShellRegistry for HostHandle {
    fn settings(&self) -> &MaterializerSettings {
        &self.settings
    }

    fn sender(&self) -> UnboundedSender<HostMessage> {
        self.sender.clone()
    }

    fn allocate_shell_id(&mut self) -> ShellId {
        ShellId(self.next_shell.fetch_add(1, Ordering::Relaxed))
    }

    /// A host that is gone or going aborts the shell right away.
    fn register_shell(&mut self, shell: GraphInterpreterShell) {
        if self.token.is_cancelled() || self.join.is_finished() {
            let mut shell = shell;
            shell.try_abort(StreamError::AbruptTermination);
            return;
        }
        let message = HostMessage::Register {
            shell: Box::new(shell),
        };
        if let Err(unsent) = self.sender.send(message) {
            discard(unsent.0);
        }
    }
}
