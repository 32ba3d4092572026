// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

mod config;
mod materialization;
mod stream;

pub use config::ValidationError;
pub use materialization::{ConfigurationError, InterpreterError};
pub use stream::StreamError;
