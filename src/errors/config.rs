// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::fmt;

/// Errors reported while validating materializer settings
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// A size or limit that must be strictly positive was zero
    NotPositive {
        /// The settings key that was rejected
        field: &'static str,
    },
    /// The initial input buffer is larger than the maximum input buffer
    BufferBoundsInverted {
        /// Configured initial size
        initial: usize,
        /// Configured maximum size
        max: usize,
    },
    /// A buffer size that must be a power of two was not
    NotPowerOfTwo {
        /// The settings key that was rejected
        field: &'static str,
        /// The offending value
        value: usize,
    },
    /// The default dispatcher name was blank
    EmptyDispatcher,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::NotPositive { field } => {
                write!(f, "Setting '{}' must be greater than zero", field)
            }
            ValidationError::BufferBoundsInverted { initial, max } => {
                write!(
                    f,
                    "Initial input buffer size {} exceeds maximum input buffer size {}",
                    initial, max
                )
            }
            ValidationError::NotPowerOfTwo { field, value } => {
                write!(f, "Setting '{}' must be a power of two, got {}", field, value)
            }
            ValidationError::EmptyDispatcher => {
                write!(f, "Setting 'default_dispatcher' must not be empty")
            }
        }
    }
}

impl std::error::Error for ValidationError {}
