// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Observability for the stream engine.
//!
//! This module holds the message types used for all diagnostic and
//! operational logging. Each message is a struct implementing `Display`
//! and `StructuredLog`, so a log line and its structured fields are defined
//! in one place instead of being scattered as format strings.
//!
//! # Architecture
//!
//! Messages are organized by subsystem:
//! * `messages::interpreter` - stage failures and stage lifecycle
//! * `messages::fusing` - island layout decisions
//! * `messages::host` - shell and host lifecycle
//! * `messages::config` - settings loading and validation
//!
//! Subscribers are installed by the binary with `tracing_subscriber`; the
//! library itself only emits events.

pub mod messages;
