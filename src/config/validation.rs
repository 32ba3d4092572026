// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Validation of [`MaterializerSettings`].
//!
//! All checks run and every violation is reported, so a settings file can
//! be fixed in one pass.

use crate::config::MaterializerSettings;
use crate::errors::ValidationError;
use crate::observability::messages::config::SettingRejected;
use crate::observability::messages::StructuredLog;

/// Check that the settings describe a runnable engine.
///
/// Buffer sizes must be positive powers of two with the initial size not
/// above the maximum; the processing limit and subscription timeout must be
/// positive; the default dispatcher must have a name.
pub fn validate_settings(settings: &MaterializerSettings) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let initial = settings.initial_input_buffer_size();
    let max = settings.max_input_buffer_size();
    for (field, value) in [
        ("initial_input_buffer_size", initial),
        ("max_input_buffer_size", max),
    ] {
        if value == 0 {
            errors.push(ValidationError::NotPositive { field });
        } else if !value.is_power_of_two() {
            errors.push(ValidationError::NotPowerOfTwo { field, value });
        }
    }
    if initial > max {
        errors.push(ValidationError::BufferBoundsInverted { initial, max });
    }
    if settings.sync_processing_limit() == 0 {
        errors.push(ValidationError::NotPositive {
            field: "sync_processing_limit",
        });
    }
    if settings.subscription_timeout().is_zero() {
        errors.push(ValidationError::NotPositive {
            field: "subscription_timeout_ms",
        });
    }
    if settings.default_dispatcher().trim().is_empty() {
        errors.push(ValidationError::EmptyDispatcher);
    }

    for error in &errors {
        SettingRejected { error }.log();
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(validate_settings(&MaterializerSettings::default()).is_ok());
    }

    #[test]
    fn test_zero_limits_are_rejected() {
        let settings = MaterializerSettings {
            sync_processing_limit: Some(0),
            subscription_timeout_ms: Some(0),
            ..Default::default()
        };
        let errors = validate_settings(&settings).unwrap_err();
        assert!(errors.contains(&ValidationError::NotPositive {
            field: "sync_processing_limit"
        }));
        assert!(errors.contains(&ValidationError::NotPositive {
            field: "subscription_timeout_ms"
        }));
    }

    #[test]
    fn test_buffer_rules() {
        let settings = MaterializerSettings::default().with_input_buffer(16, 6);
        let errors = validate_settings(&settings).unwrap_err();
        assert_eq!(
            errors,
            vec![
                ValidationError::NotPowerOfTwo {
                    field: "max_input_buffer_size",
                    value: 6
                },
                ValidationError::BufferBoundsInverted { initial: 16, max: 6 },
            ]
        );
    }

    #[test]
    fn test_blank_dispatcher_is_rejected() {
        let settings = MaterializerSettings {
            default_dispatcher: Some("  ".to_string()),
            ..Default::default()
        };
        assert_eq!(
            validate_settings(&settings).unwrap_err(),
            vec![ValidationError::EmptyDispatcher]
        );
    }
}
