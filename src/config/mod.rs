// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

mod loader;
mod validation;

pub mod consts;

pub use loader::{load_and_validate_settings, load_settings, MaterializerSettings};
pub use validation::validate_settings;
