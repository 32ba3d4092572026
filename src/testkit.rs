// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Recording endpoints for driving boundaries in tests and demos.
//!
//! [`ProbeSubscriber`] attaches to any [`Publisher`] and records every
//! signal it receives; [`ProbePublisher`] feeds any [`Subscriber`] by hand
//! and records the demand and cancellation coming back.

use crate::errors::StreamError;
use crate::graph::{downcast_element, Element};
use crate::traits::{Publisher, Subscriber, Subscription};
use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

struct ProbeState<T> {
    subscription: Option<Arc<dyn Subscription>>,
    elements: Vec<T>,
    error: Option<StreamError>,
    completed: bool,
    terminal_signals: usize,
    rejected: usize,
}

pub struct ProbeSubscriber<T> {
    state: Mutex<ProbeState<T>>,
    request_on_subscribe: Option<i64>,
}

impl<T> ProbeSubscriber<T> {
    /// A probe that signals no demand until told to.
    pub fn new() -> Arc<Self> {
        Self::build(None)
    }

    /// A probe that requests `n` as soon as it is subscribed.
    pub fn requesting(n: i64) -> Arc<Self> {
        Self::build(Some(n))
    }

    /// A probe that accepts everything.
    pub fn unbounded() -> Arc<Self> {
        Self::build(Some(i64::MAX))
    }

    fn build(request_on_subscribe: Option<i64>) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(ProbeState {
                subscription: None,
                elements: Vec::new(),
                error: None,
                completed: false,
                terminal_signals: 0,
                rejected: 0,
            }),
            request_on_subscribe,
        })
    }

    fn lock(&self) -> MutexGuard<'_, ProbeState<T>> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn subscription(&self) -> Option<Arc<dyn Subscription>> {
        self.lock().subscription.clone()
    }

    pub fn is_subscribed(&self) -> bool {
        self.lock().subscription.is_some()
    }

    pub fn request(&self, n: i64) {
        if let Some(subscription) = self.subscription() {
            subscription.request(n);
        }
    }

    pub fn cancel(&self) {
        if let Some(subscription) = self.subscription() {
            subscription.cancel();
        }
    }

    pub fn error(&self) -> Option<StreamError> {
        self.lock().error.clone()
    }

    pub fn is_completed(&self) -> bool {
        self.lock().completed
    }

    /// `on_complete` and `on_error` calls seen so far.
    pub fn terminal_signals(&self) -> usize {
        self.lock().terminal_signals
    }

    /// Elements that were not of type `T`.
    pub fn rejected(&self) -> usize {
        self.lock().rejected
    }

    pub fn element_count(&self) -> usize {
        self.lock().elements.len()
    }

    pub fn elements(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.lock().elements.clone()
    }
}

impl<T: Any + Send> Subscriber for ProbeSubscriber<T> {
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        let accepted = {
            let mut state = self.lock();
            if state.subscription.is_none() {
                state.subscription = Some(subscription.clone());
                true
            } else {
                false
            }
        };
        match (accepted, self.request_on_subscribe) {
            (false, _) => subscription.cancel(),
            (true, Some(n)) => subscription.request(n),
            (true, None) => {}
        }
    }

    fn on_next(&self, element: Element) {
        let mut state = self.lock();
        match downcast_element::<T>(element) {
            Ok(value) => state.elements.push(value),
            Err(_) => state.rejected += 1,
        }
    }

    fn on_error(&self, cause: StreamError) {
        let mut state = self.lock();
        state.terminal_signals += 1;
        state.error.get_or_insert(cause);
    }

    fn on_complete(&self) {
        let mut state = self.lock();
        state.terminal_signals += 1;
        state.completed = true;
    }
}

#[derive(Default)]
struct ProbeDemand {
    requested: AtomicI64,
    cancellations: AtomicUsize,
    invalid: AtomicBool,
}

/// The subscription a [`ProbePublisher`] hands out.
pub struct ProbeSubscription {
    demand: Arc<ProbeDemand>,
}

impl Subscription for ProbeSubscription {
    fn request(&self, n: i64) {
        if n < 1 {
            self.demand.invalid.store(true, Ordering::SeqCst);
            return;
        }
        let _ = self
            .demand
            .requested
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |r| Some(r.saturating_add(n)));
    }

    fn cancel(&self) {
        self.demand.cancellations.fetch_add(1, Ordering::SeqCst);
    }
}

/// A hand-driven upstream. Sends whatever it is told, regardless of demand.
pub struct ProbePublisher {
    subscriber: Mutex<Option<Arc<dyn Subscriber>>>,
    demand: Arc<ProbeDemand>,
}

impl ProbePublisher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            subscriber: Mutex::new(None),
            demand: Arc::new(ProbeDemand::default()),
        })
    }

    fn subscriber(&self) -> Option<Arc<dyn Subscriber>> {
        self.subscriber
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Total demand signalled so far.
    pub fn requested(&self) -> i64 {
        self.demand.requested.load(Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellations() > 0
    }

    /// `cancel` calls seen so far.
    pub fn cancellations(&self) -> usize {
        self.demand.cancellations.load(Ordering::SeqCst)
    }

    /// A non-positive request was seen.
    pub fn saw_invalid_request(&self) -> bool {
        self.demand.invalid.load(Ordering::SeqCst)
    }

    pub fn send(&self, element: Element) {
        if let Some(subscriber) = self.subscriber() {
            subscriber.on_next(element);
        }
    }

    pub fn send_value<V: Any + Send>(&self, value: V) {
        self.send(Box::new(value));
    }

    pub fn complete(&self) {
        if let Some(subscriber) = self.subscriber() {
            subscriber.on_complete();
        }
    }

    pub fn fail(&self, cause: StreamError) {
        if let Some(subscriber) = self.subscriber() {
            subscriber.on_error(cause);
        }
    }
}

impl Publisher for ProbePublisher {
    fn subscribe(&self, subscriber: Arc<dyn Subscriber>) {
        *self
            .subscriber
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(subscriber.clone());
        subscriber.on_subscribe(Arc::new(ProbeSubscription {
            demand: self.demand.clone(),
        }));
    }
}
