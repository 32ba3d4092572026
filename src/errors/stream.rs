// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use thiserror::Error;

/// Failures that travel through a running stream.
///
/// A `StreamError` is what a stage hands to `fail`/`fail_stage`, what a
/// downstream stage receives in `on_upstream_failure`, and what an external
/// subscriber finally sees in `on_error`. It is cloned freely because one
/// failure usually fans out to several ports.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    /// A stage reported a domain failure.
    #[error("{0}")]
    Failed(String),

    /// A stage callback panicked; the payload message is kept.
    #[error("stage panicked: {0}")]
    StagePanicked(String),

    /// The hosting runtime stopped while the stream was still running.
    #[error("stream was terminated abruptly because its host stopped")]
    AbruptTermination,

    /// A stage was stopped before it produced its materialized result.
    #[error("stage was terminated before it completed")]
    AbruptStageTermination,

    /// A boundary was not attached to its counterpart in time.
    #[error("boundary was not subscribed within {timeout_ms} ms")]
    SubscriptionTimeout { timeout_ms: u64 },

    /// An external subscriber requested a non-positive amount.
    #[error("number of elements in a request must be positive, got {0}")]
    InvalidDemand(i64),

    /// `push` was called on a port without outstanding demand.
    #[error("cannot push connection {connection} twice, or before it being pulled")]
    PushWithoutDemand { connection: usize },

    /// `pull` was called twice without an element in between.
    #[error("cannot pull connection {connection} twice")]
    PullTwice { connection: usize },

    /// `pull` was called on a port that is already closed.
    #[error("cannot pull closed connection {connection}")]
    PullClosed { connection: usize },

    /// `grab` was called on a port holding no element.
    #[error("cannot grab from empty connection {connection}")]
    GrabEmpty { connection: usize },

    /// A local port handle that the stage does not own.
    #[error("port {index} is not part of this stage")]
    UnknownPort { index: usize },

    /// An upstream publisher sent more elements than were requested.
    #[error("input buffer overrun")]
    InputBufferOverrun,

    /// An element did not have the type a stage expected.
    #[error("element is not of the expected type {expected}")]
    ElementType { expected: &'static str },

    /// A second subscriber tried to attach to a single-subscriber publisher.
    #[error("publisher supports only a single subscriber")]
    AdditionalSubscriber,

    /// The publisher shut down because its stream was cancelled.
    #[error("publisher was shut down after cancellation")]
    NormalShutdown,

    /// A materialized-value source was pulled before its value was known.
    #[error("materialized value is not available yet")]
    MaterializedValueUnavailable,

    /// An async callback fired but no host is attached to deliver it.
    #[error("stage has no host to deliver asynchronous input")]
    NoAsyncHost,
}

impl StreamError {
    /// Shorthand for a domain failure carrying a message.
    pub fn failed(message: impl Into<String>) -> Self {
        StreamError::Failed(message.into())
    }

    /// Turn a panic payload into a stream failure.
    pub fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };
        StreamError::StagePanicked(message)
    }
}
