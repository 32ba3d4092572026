// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for settings loading and validation.

use crate::errors::ValidationError;
use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use tracing::Span;

/// Settings were read from a file.
///
/// # Log Level
/// `info!`
pub struct SettingsLoaded<'a> {
    pub path: &'a str,
}

impl Display for SettingsLoaded<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Loaded materializer settings from '{}'", self.path)
    }
}

impl StructuredLog for SettingsLoaded<'_> {
    fn log(&self) {
        tracing::info!(path = self.path, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!("settings", span_name = name, path = self.path)
    }
}

/// A setting failed validation.
///
/// # Log Level
/// `error!`
pub struct SettingRejected<'a> {
    pub error: &'a ValidationError,
}

impl Display for SettingRejected<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Invalid materializer setting: {}", self.error)
    }
}

impl StructuredLog for SettingRejected<'_> {
    fn log(&self) {
        tracing::error!(error = %self.error, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::error_span!("settings_validation", span_name = name)
    }
}
