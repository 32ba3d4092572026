// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Adapters between an island's open connections and the reactive-streams world.
//!
//! Both adapters are driven from two sides: by the interpreter through the
//! shell's `BoundaryHandler` (pull, push, completion), and by host messages
//! carrying signals of the external party (`OnNext`, `RequestMore`, ...).
//! External parties never touch an adapter directly; they only post messages.

use crate::engine::host::HostMessage;
use crate::engine::publisher::ExposedPublisher;
use crate::engine::shell::ShellId;
use crate::engine::StageContext;
use crate::errors::StreamError;
use crate::graph::{Element, InPort, OutPort};
use crate::traits::{StageResult, Subscriber, Subscription};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;

const OUT: OutPort = OutPort(0);
const IN: InPort = InPort(0);

/// A subscription that ignores every call.
pub(crate) struct CancelledSubscription;

impl Subscription for CancelledSubscription {
    fn request(&self, _n: i64) {}

    fn cancel(&self) {}
}

/// Demand and cancellation of an external subscriber, posted to the owning shell.
pub struct BoundarySubscription {
    shell: ShellId,
    output: usize,
    host: UnboundedSender<HostMessage>,
}

impl BoundarySubscription {
    pub(crate) fn new(shell: ShellId, output: usize, host: UnboundedSender<HostMessage>) -> Self {
        Self {
            shell,
            output,
            host,
        }
    }
}

impl Subscription for BoundarySubscription {
    fn request(&self, n: i64) {
        let _ = self.host.send(HostMessage::RequestMore {
            shell: self.shell,
            output: self.output,
            demand: n,
        });
    }

    fn cancel(&self) {
        let _ = self.host.send(HostMessage::Cancel {
            shell: self.shell,
            output: self.output,
        });
    }
}

/// Signals of an upstream publisher, posted to the owning shell.
pub struct BoundarySubscriber {
    shell: ShellId,
    input: usize,
    host: UnboundedSender<HostMessage>,
}

impl BoundarySubscriber {
    pub(crate) fn new(shell: ShellId, input: usize, host: UnboundedSender<HostMessage>) -> Self {
        Self { shell, input, host }
    }
}

impl Subscriber for BoundarySubscriber {
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        let message = HostMessage::OnSubscribe {
            shell: self.shell,
            input: self.input,
            subscription: subscription.clone(),
        };
        if self.host.send(message).is_err() {
            subscription.cancel();
        }
    }

    fn on_next(&self, element: Element) {
        let _ = self.host.send(HostMessage::OnNext {
            shell: self.shell,
            input: self.input,
            element,
        });
    }

    fn on_error(&self, cause: StreamError) {
        let _ = self.host.send(HostMessage::OnError {
            shell: self.shell,
            input: self.input,
            cause,
        });
    }

    fn on_complete(&self) {
        let _ = self.host.send(HostMessage::OnComplete {
            shell: self.shell,
            input: self.input,
        });
    }
}

/// Buffers elements of one upstream publisher for one island connection.
///
/// The full buffer is requested on subscribe; every time half of it has been
/// handed downstream another half is requested, so the publisher never has
/// more outstanding demand than there is room.
pub struct BatchingInputBoundary {
    buffer: Vec<Option<Element>>,
    mask: usize,
    elements: usize,
    cursor: usize,
    request_batch: usize,
    batch_remaining: usize,
    upstream: Option<Arc<dyn Subscription>>,
    upstream_completed: bool,
    downstream_canceled: bool,
}

impl BatchingInputBoundary {
    /// `size` is rounded up to a power of two.
    pub fn new(size: usize) -> Self {
        let size = size.max(1).next_power_of_two();
        let request_batch = (size / 2).max(1);
        Self {
            buffer: (0..size).map(|_| None).collect(),
            mask: size - 1,
            elements: 0,
            cursor: 0,
            request_batch,
            batch_remaining: request_batch,
            upstream: None,
            upstream_completed: false,
            downstream_canceled: false,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    pub fn buffered(&self) -> usize {
        self.elements
    }

    pub fn is_subscribed(&self) -> bool {
        self.upstream.is_some()
    }

    pub fn is_upstream_completed(&self) -> bool {
        self.upstream_completed
    }

    fn dequeue(&mut self) -> Option<Element> {
        let element = self.buffer[self.cursor].take();
        self.batch_remaining -= 1;
        if self.batch_remaining == 0 && !self.upstream_completed {
            if let Some(upstream) = &self.upstream {
                upstream.request(self.request_batch as i64);
            }
            self.batch_remaining = self.request_batch;
        }
        self.elements -= 1;
        self.cursor = (self.cursor + 1) & self.mask;
        element
    }

    fn push_next(&mut self, ctx: &mut StageContext<'_>) -> StageResult {
        match self.dequeue() {
            Some(element) => ctx.push(OUT, element),
            None => Ok(()),
        }
    }

    fn clear(&mut self) {
        self.buffer.iter_mut().for_each(|slot| *slot = None);
        self.elements = 0;
    }

    pub fn on_subscribe(&mut self, subscription: Arc<dyn Subscription>) {
        if self.upstream_completed {
            subscription.cancel();
        } else if self.downstream_canceled {
            self.upstream_completed = true;
            subscription.cancel();
        } else {
            subscription.request(self.buffer.len() as i64);
            self.upstream = Some(subscription);
        }
    }

    pub fn on_next(&mut self, ctx: &mut StageContext<'_>, element: Element) -> StageResult {
        if self.upstream_completed {
            return Ok(());
        }
        if self.elements == self.buffer.len() {
            return Err(StreamError::InputBufferOverrun);
        }
        let slot = (self.cursor + self.elements) & self.mask;
        self.buffer[slot] = Some(element);
        self.elements += 1;
        if ctx.is_out_available(OUT) {
            self.push_next(ctx)?;
        }
        Ok(())
    }

    pub fn on_error(&mut self, ctx: &mut StageContext<'_>, cause: StreamError) {
        if !self.upstream_completed || !self.downstream_canceled {
            self.upstream_completed = true;
            self.clear();
            ctx.fail(OUT, cause);
        }
    }

    pub fn on_complete(&mut self, ctx: &mut StageContext<'_>) {
        if !self.upstream_completed {
            self.upstream_completed = true;
            if self.elements == 0 {
                ctx.complete(OUT);
            }
        }
    }

    /// The shell is aborting: stop the publisher and fail the connection.
    pub fn on_internal_error(&mut self, ctx: &mut StageContext<'_>, cause: StreamError) {
        if !(self.upstream_completed || self.downstream_canceled) {
            if let Some(upstream) = &self.upstream {
                upstream.cancel();
            }
        }
        if !ctx.is_out_closed(OUT) {
            self.on_error(ctx, cause);
        }
    }

    pub fn cancel(&mut self) {
        self.downstream_canceled = true;
        if !self.upstream_completed {
            self.upstream_completed = true;
            if let Some(upstream) = &self.upstream {
                upstream.cancel();
            }
            self.clear();
        }
    }

    pub fn on_pull(&mut self, ctx: &mut StageContext<'_>) -> StageResult {
        if self.elements > 1 {
            self.push_next(ctx)
        } else if self.elements == 1 {
            self.push_next(ctx)?;
            if self.upstream_completed {
                ctx.complete(OUT);
            }
            Ok(())
        } else {
            if self.upstream_completed {
                ctx.complete(OUT);
            }
            Ok(())
        }
    }
}

/// Serves one island connection to a single external subscriber.
pub struct OutputBoundary {
    shell: ShellId,
    index: usize,
    host: UnboundedSender<HostMessage>,
    publisher: Option<Arc<ExposedPublisher>>,
    subscriber: Option<Arc<dyn Subscriber>>,
    demand: i64,
    downstream_completed: bool,
    upstream_completed: bool,
    upstream_failed: Option<StreamError>,
}

impl OutputBoundary {
    pub fn new(shell: ShellId, index: usize, host: UnboundedSender<HostMessage>) -> Self {
        Self {
            shell,
            index,
            host,
            publisher: None,
            subscriber: None,
            demand: 0,
            downstream_completed: false,
            upstream_completed: false,
            upstream_failed: None,
        }
    }

    pub fn demand(&self) -> i64 {
        self.demand
    }

    pub fn has_subscriber(&self) -> bool {
        self.subscriber.is_some()
    }

    /// A subscriber is attached, or the output has finished and needs none.
    pub fn is_attached(&self) -> bool {
        self.subscriber.is_some() || self.upstream_completed || self.downstream_completed
    }

    pub fn on_push(&mut self, ctx: &mut StageContext<'_>) -> StageResult {
        let element = ctx.grab(IN)?;
        self.demand -= 1;
        if let Some(subscriber) = &self.subscriber {
            subscriber.on_next(element);
        }
        if self.downstream_completed {
            ctx.cancel(IN);
        } else if self.demand > 0 {
            ctx.pull(IN)?;
        }
        Ok(())
    }

    pub fn complete(&mut self) {
        if !(self.upstream_completed || self.downstream_completed) {
            self.upstream_completed = true;
            if let Some(publisher) = &self.publisher {
                publisher.shutdown(None);
            }
            if let Some(subscriber) = &self.subscriber {
                subscriber.on_complete();
            }
        }
    }

    pub fn fail(&mut self, cause: StreamError) {
        if !(self.downstream_completed || self.upstream_completed) {
            self.upstream_completed = true;
            self.upstream_failed = Some(cause.clone());
            if let Some(publisher) = &self.publisher {
                publisher.shutdown(Some(cause.clone()));
            }
            if let Some(subscriber) = &self.subscriber {
                subscriber.on_error(cause);
            }
        }
    }

    /// Attach the first waiting subscriber; any further one is rejected.
    pub fn subscribe_pending(&mut self) {
        let Some(publisher) = self.publisher.clone() else {
            return;
        };
        for subscriber in publisher.take_pending() {
            if self.subscriber.is_none() {
                self.subscriber = Some(subscriber.clone());
                subscriber.on_subscribe(Arc::new(BoundarySubscription::new(
                    self.shell,
                    self.index,
                    self.host.clone(),
                )));
            } else {
                subscriber.on_subscribe(Arc::new(CancelledSubscription));
                subscriber.on_error(StreamError::AdditionalSubscriber);
            }
        }
    }

    pub fn exposed_publisher(&mut self, publisher: Arc<ExposedPublisher>) {
        if let Some(cause) = &self.upstream_failed {
            publisher.shutdown(Some(cause.clone()));
        } else if self.upstream_completed {
            publisher.shutdown(None);
        }
        self.publisher = Some(publisher);
        // Subscribers may have parked before the publisher reached this boundary.
        self.subscribe_pending();
    }

    /// Add demand; saturates at `i64::MAX`, which stands for unbounded.
    pub fn request_more(&mut self, ctx: &mut StageContext<'_>, elements: i64) -> StageResult {
        if elements < 1 {
            ctx.cancel(IN);
            self.fail(StreamError::InvalidDemand(elements));
            return Ok(());
        }
        self.demand = self.demand.saturating_add(elements);
        if !ctx.has_been_pulled(IN) && !ctx.is_in_closed(IN) {
            ctx.pull(IN)?;
        }
        Ok(())
    }

    pub fn cancel(&mut self, ctx: &mut StageContext<'_>) {
        self.downstream_completed = true;
        self.subscriber = None;
        if let Some(publisher) = &self.publisher {
            publisher.shutdown(Some(StreamError::NormalShutdown));
        }
        ctx.cancel(IN);
    }
}
