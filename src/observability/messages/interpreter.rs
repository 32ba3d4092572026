// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for events inside one interpreter.

use crate::errors::StreamError;
use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use tracing::Span;

/// A stage handler or hook failed and the stage was failed in turn.
///
/// # Log Level
/// `warn!` - The failure is contained to the stage and propagated downstream
pub struct StageFailed<'a> {
    pub interpreter: &'a str,
    pub stage: &'a str,
    pub stage_id: usize,
    pub error: &'a StreamError,
}

impl Display for StageFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Stage '{}' ({}) in interpreter '{}' failed: {}",
            self.stage, self.stage_id, self.interpreter, self.error
        )
    }
}

impl StructuredLog for StageFailed<'_> {
    fn log(&self) {
        tracing::warn!(
            interpreter = self.interpreter,
            stage = self.stage,
            stage_id = self.stage_id,
            error = %self.error,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!(
            "stage_failure",
            span_name = name,
            interpreter = self.interpreter,
            stage = self.stage,
            stage_id = self.stage_id,
        )
    }
}

/// A boundary handler failed; the island cannot continue.
///
/// # Log Level
/// `error!` - The whole island is aborted
pub struct BoundaryHandlerFailed<'a> {
    pub interpreter: &'a str,
    pub connection: usize,
    pub error: &'a StreamError,
}

impl Display for BoundaryHandlerFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Boundary on connection {} of interpreter '{}' failed: {}",
            self.connection, self.interpreter, self.error
        )
    }
}

impl StructuredLog for BoundaryHandlerFailed<'_> {
    fn log(&self) {
        tracing::error!(
            interpreter = self.interpreter,
            connection = self.connection,
            error = %self.error,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::error_span!(
            "boundary_failure",
            span_name = name,
            interpreter = self.interpreter,
            connection = self.connection,
        )
    }
}

/// A stage closed its last port and was stopped.
///
/// # Log Level
/// `debug!` - Routine lifecycle event
pub struct StageStopped<'a> {
    pub interpreter: &'a str,
    pub stage: &'a str,
    pub stage_id: usize,
}

impl Display for StageStopped<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Stage '{}' ({}) in interpreter '{}' stopped",
            self.stage, self.stage_id, self.interpreter
        )
    }
}

impl StructuredLog for StageStopped<'_> {
    fn log(&self) {
        tracing::debug!(
            interpreter = self.interpreter,
            stage = self.stage,
            stage_id = self.stage_id,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "stage_stopped",
            span_name = name,
            interpreter = self.interpreter,
            stage = self.stage,
        )
    }
}

/// `post_stop` panicked. The stage is considered stopped anyway.
///
/// # Log Level
/// `warn!`
pub struct PostStopPanicked<'a> {
    pub interpreter: &'a str,
    pub stage: &'a str,
    pub error: &'a StreamError,
}

impl Display for PostStopPanicked<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "post_stop of stage '{}' in interpreter '{}' panicked: {}",
            self.stage, self.interpreter, self.error
        )
    }
}

impl StructuredLog for PostStopPanicked<'_> {
    fn log(&self) {
        tracing::warn!(
            interpreter = self.interpreter,
            stage = self.stage,
            error = %self.error,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!(
            "post_stop",
            span_name = name,
            interpreter = self.interpreter,
            stage = self.stage,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_failed_display() {
        let error = StreamError::failed("bad input");
        let msg = StageFailed {
            interpreter: "island-0",
            stage: "map",
            stage_id: 2,
            error: &error,
        };
        assert_eq!(
            msg.to_string(),
            "Stage 'map' (2) in interpreter 'island-0' failed: bad input"
        );
    }

    #[test]
    fn test_boundary_failure_display() {
        let error = StreamError::InputBufferOverrun;
        let msg = BoundaryHandlerFailed {
            interpreter: "island-1",
            connection: 0,
            error: &error,
        };
        assert!(msg.to_string().contains("connection 0"));
        assert!(msg.to_string().contains("overrun"));
    }
}
