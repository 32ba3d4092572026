// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::config::consts::{
    DEFAULT_DISPATCHER, DEFAULT_INITIAL_INPUT_BUFFER_SIZE, DEFAULT_MAX_INPUT_BUFFER_SIZE,
    DEFAULT_SUBSCRIPTION_TIMEOUT_MS, DEFAULT_SYNC_PROCESSING_LIMIT,
};
use crate::observability::messages::config::SettingsLoaded;
use crate::observability::messages::StructuredLog;
use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Tuning knobs for materialization and the interpreter host.
///
/// Every field is optional; getters fall back to the built-in defaults in
/// [`consts`](crate::config::consts).
///
/// # Example
/// ```yaml
/// initial_input_buffer_size: 4
/// max_input_buffer_size: 16
/// sync_processing_limit: 1000
/// subscription_timeout_ms: 5000
/// fuzzing_mode: false
/// default_dispatcher: default-dispatcher
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MaterializerSettings {
    pub initial_input_buffer_size: Option<usize>,
    pub max_input_buffer_size: Option<usize>,
    pub sync_processing_limit: Option<usize>,
    pub subscription_timeout_ms: Option<u64>,
    pub fuzzing_mode: Option<bool>,
    pub fuzzing_seed: Option<u64>,
    pub default_dispatcher: Option<String>,
}

impl MaterializerSettings {
    pub fn initial_input_buffer_size(&self) -> usize {
        self.initial_input_buffer_size
            .unwrap_or(DEFAULT_INITIAL_INPUT_BUFFER_SIZE)
    }

    pub fn max_input_buffer_size(&self) -> usize {
        self.max_input_buffer_size
            .unwrap_or(DEFAULT_MAX_INPUT_BUFFER_SIZE)
    }

    pub fn sync_processing_limit(&self) -> usize {
        self.sync_processing_limit
            .unwrap_or(DEFAULT_SYNC_PROCESSING_LIMIT)
    }

    pub fn subscription_timeout(&self) -> Duration {
        Duration::from_millis(
            self.subscription_timeout_ms
                .unwrap_or(DEFAULT_SUBSCRIPTION_TIMEOUT_MS),
        )
    }

    pub fn fuzzing_mode(&self) -> bool {
        self.fuzzing_mode.unwrap_or(false)
    }

    pub fn fuzzing_seed(&self) -> Option<u64> {
        self.fuzzing_seed
    }

    pub fn default_dispatcher(&self) -> &str {
        self.default_dispatcher.as_deref().unwrap_or(DEFAULT_DISPATCHER)
    }

    /// Randomize event order inside islands, reproducibly when a seed is given.
    pub fn with_fuzzing(mut self, seed: Option<u64>) -> Self {
        self.fuzzing_mode = Some(true);
        self.fuzzing_seed = seed;
        self
    }

    pub fn with_input_buffer(mut self, initial: usize, max: usize) -> Self {
        self.initial_input_buffer_size = Some(initial);
        self.max_input_buffer_size = Some(max);
        self
    }

    pub fn with_sync_processing_limit(mut self, limit: usize) -> Self {
        self.sync_processing_limit = Some(limit);
        self
    }

    pub fn with_subscription_timeout(mut self, timeout: Duration) -> Self {
        self.subscription_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }
}

/// Load settings from a YAML file
pub fn load_settings<P: AsRef<Path>>(path: P) -> anyhow::Result<MaterializerSettings> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading settings file '{}'", path.display()))?;
    let settings: MaterializerSettings = serde_yaml::from_str(&content)
        .with_context(|| format!("parsing settings file '{}'", path.display()))?;
    SettingsLoaded {
        path: &path.display().to_string(),
    }
    .log();
    Ok(settings)
}

/// Load settings from a YAML file and reject values the engine cannot run with
pub fn load_and_validate_settings<P: AsRef<Path>>(
    path: P,
) -> anyhow::Result<MaterializerSettings> {
    let settings = load_settings(path)?;

    if let Err(errors) = crate::config::validate_settings(&settings) {
        let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        return Err(anyhow!(
            "Settings validation failed:\n{}",
            messages.join("\n")
        ));
    }

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_apply_to_missing_fields() {
        let settings: MaterializerSettings = serde_yaml::from_str("fuzzing_mode: true\n").unwrap();
        assert!(settings.fuzzing_mode());
        assert_eq!(settings.max_input_buffer_size(), DEFAULT_MAX_INPUT_BUFFER_SIZE);
        assert_eq!(settings.sync_processing_limit(), DEFAULT_SYNC_PROCESSING_LIMIT);
        assert_eq!(settings.default_dispatcher(), DEFAULT_DISPATCHER);
        assert_eq!(
            settings.subscription_timeout(),
            Duration::from_millis(DEFAULT_SUBSCRIPTION_TIMEOUT_MS)
        );
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        let parsed: Result<MaterializerSettings, _> = serde_yaml::from_str("buffer: 3\n");
        assert!(parsed.is_err());
    }

    #[test]
    fn test_load_and_validate_valid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "initial_input_buffer_size: 2\nmax_input_buffer_size: 8\nsync_processing_limit: 50\ndefault_dispatcher: io"
        )
        .unwrap();

        let settings = load_and_validate_settings(file.path()).unwrap();
        assert_eq!(settings.initial_input_buffer_size(), 2);
        assert_eq!(settings.max_input_buffer_size(), 8);
        assert_eq!(settings.sync_processing_limit(), 50);
        assert_eq!(settings.default_dispatcher(), "io");
    }

    #[test]
    fn test_load_and_validate_rejects_bad_values() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "initial_input_buffer_size: 32\nmax_input_buffer_size: 12").unwrap();

        let err = load_and_validate_settings(file.path()).unwrap_err();
        let text = err.to_string();
        assert!(text.contains("Settings validation failed"));
        assert!(text.contains("power of two"));
        assert!(text.contains("exceeds"));
    }

    #[test]
    fn test_missing_file_reports_path() {
        let err = load_settings("/definitely/not/here.yaml").unwrap_err();
        assert!(err.to_string().contains("/definitely/not/here.yaml"));
    }
}
