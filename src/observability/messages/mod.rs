// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Centralized message types for structured logging.
//!
//! Every log line the crate emits is a small struct implementing `Display`
//! and [`StructuredLog`], so field names stay consistent across call sites.
//!
//! # Organization
//!
//! * `interpreter` - stage failures and stage lifecycle inside one island
//! * `fusing` - island layout decisions
//! * `host` - shell registration, termination and aborts
//! * `config` - settings loading and validation
//!
//! # Usage Pattern
//!
//! ```rust
//! use fusebox::observability::messages::host::ShellRegistered;
//! use fusebox::observability::messages::StructuredLog;
//!
//! let msg = ShellRegistered {
//!     host: "default",
//!     shell: 3,
//!     connections: 4,
//! };
//!
//! msg.log();
//! ```

use std::fmt::Display;
use tracing::Span;

pub mod config;
pub mod fusing;
pub mod host;
pub mod interpreter;

/// A message that knows its own level and structured fields.
pub trait StructuredLog: Display {
    /// Emit the message at its level with its fields attached.
    fn log(&self);

    /// A span carrying the same fields, for scoping related work.
    fn span(&self, name: &str) -> Span;
}
