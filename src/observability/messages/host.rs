// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for the interpreter host and its shells.

use crate::errors::{InterpreterError, StreamError};
use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use tracing::Span;

/// The host event loop started.
///
/// # Log Level
/// `info!`
pub struct HostStarted<'a> {
    pub host: &'a str,
}

impl Display for HostStarted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Interpreter host '{}' started", self.host)
    }
}

impl StructuredLog for HostStarted<'_> {
    fn log(&self) {
        tracing::info!(host = self.host, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!("host", span_name = name, host = self.host)
    }
}

/// The host stopped; `aborted` shells were still running.
///
/// # Log Level
/// `info!`
pub struct HostStopped<'a> {
    pub host: &'a str,
    pub aborted: usize,
}

impl Display for HostStopped<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Interpreter host '{}' stopped, {} shells aborted",
            self.host, self.aborted
        )
    }
}

impl StructuredLog for HostStopped<'_> {
    fn log(&self) {
        tracing::info!(host = self.host, aborted = self.aborted, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!("host_stop", span_name = name, host = self.host)
    }
}

/// A shell was handed to the host.
///
/// # Log Level
/// `debug!`
pub struct ShellRegistered<'a> {
    pub host: &'a str,
    pub shell: u64,
    pub connections: usize,
}

impl Display for ShellRegistered<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Shell {} with {} connections registered on host '{}'",
            self.shell, self.connections, self.host
        )
    }
}

impl StructuredLog for ShellRegistered<'_> {
    fn log(&self) {
        tracing::debug!(
            host = self.host,
            shell = self.shell,
            connections = self.connections,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!("shell", span_name = name, host = self.host, shell = self.shell)
    }
}

/// A shell finished and was removed from the host.
///
/// # Log Level
/// `debug!`
pub struct ShellTerminated<'a> {
    pub host: &'a str,
    pub shell: u64,
}

impl Display for ShellTerminated<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Shell {} on host '{}' terminated", self.shell, self.host)
    }
}

impl StructuredLog for ShellTerminated<'_> {
    fn log(&self) {
        tracing::debug!(host = self.host, shell = self.shell, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!("shell", span_name = name, host = self.host, shell = self.shell)
    }
}

/// A shell was aborted: its outputs were failed and its inputs cancelled.
///
/// # Log Level
/// `warn!`
pub struct ShellAborted<'a> {
    pub shell: u64,
    pub error: &'a StreamError,
}

impl Display for ShellAborted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Shell {} aborted: {}", self.shell, self.error)
    }
}

impl StructuredLog for ShellAborted<'_> {
    fn log(&self) {
        tracing::warn!(shell = self.shell, error = %self.error, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!("shell_abort", span_name = name, shell = self.shell)
    }
}

/// Draining an aborting shell hit a boundary failure; the abort goes on regardless.
///
/// # Log Level
/// `error!`
pub struct AbortDrainFailed<'a> {
    pub shell: u64,
    pub error: &'a InterpreterError,
}

impl Display for AbortDrainFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Shell {} failed while draining for abort: {}", self.shell, self.error)
    }
}

impl StructuredLog for AbortDrainFailed<'_> {
    fn log(&self) {
        tracing::error!(shell = self.shell, error = %self.error, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::error_span!("shell_abort", span_name = name, shell = self.shell)
    }
}

/// A shell did not get all of its boundaries attached in time.
///
/// # Log Level
/// `warn!`
pub struct SubscriptionTimedOut<'a> {
    pub host: &'a str,
    pub shell: u64,
    pub timeout_ms: u64,
}

impl Display for SubscriptionTimedOut<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Shell {} on host '{}' was not attached within {} ms",
            self.shell, self.host, self.timeout_ms
        )
    }
}

impl StructuredLog for SubscriptionTimedOut<'_> {
    fn log(&self) {
        tracing::warn!(
            host = self.host,
            shell = self.shell,
            timeout_ms = self.timeout_ms,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!("subscription_timeout", span_name = name, shell = self.shell)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_messages_display() {
        assert_eq!(
            HostStopped {
                host: "h",
                aborted: 2
            }
            .to_string(),
            "Interpreter host 'h' stopped, 2 shells aborted"
        );
        assert_eq!(
            ShellTerminated { host: "h", shell: 7 }.to_string(),
            "Shell 7 on host 'h' terminated"
        );
        let error = StreamError::AbruptTermination;
        assert!(ShellAborted {
            shell: 1,
            error: &error
        }
        .to_string()
        .starts_with("Shell 1 aborted"));
    }

    #[test]
    fn test_abort_drain_failure_display() {
        let error = InterpreterError::BoundaryFailure {
            connection: 3,
            cause: StreamError::InputBufferOverrun,
        };
        assert_eq!(
            AbortDrainFailed {
                shell: 4,
                error: &error
            }
            .to_string(),
            "Shell 4 failed while draining for abort: boundary handler failed on connection 3: input buffer overrun"
        );
    }
}
