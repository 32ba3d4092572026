// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! The publisher/subscriber contract used at island boundaries.
//!
//! Each island exposes its open inlets as [`Subscriber`]s and its open
//! outlets as [`Publisher`]s. Cross-island connections, as well as external
//! producers and consumers, talk to an island only through these traits.
//! Signals are delivered as messages to the island's host, so implementations
//! on the island side never block and never call back synchronously.

use crate::errors::StreamError;
use crate::graph::Element;
use std::sync::Arc;

pub trait Subscription: Send + Sync {
    /// Signal demand for `n` more elements; `n < 1` is a protocol violation.
    fn request(&self, n: i64);

    fn cancel(&self);
}

pub trait Subscriber: Send + Sync {
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>);

    fn on_next(&self, element: Element);

    fn on_error(&self, cause: StreamError);

    fn on_complete(&self);
}

pub trait Publisher: Send + Sync {
    fn subscribe(&self, subscriber: Arc<dyn Subscriber>);
}
