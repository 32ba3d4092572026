// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

/// Initial size of an island's boundary input buffer
pub const DEFAULT_INITIAL_INPUT_BUFFER_SIZE: usize = 4;
/// Maximum size of an island's boundary input buffer
pub const DEFAULT_MAX_INPUT_BUFFER_SIZE: usize = 16;
/// Events one host processes per message before yielding
pub const DEFAULT_SYNC_PROCESSING_LIMIT: usize = 1000;
/// How long a boundary may stay unattached before its island is aborted
pub const DEFAULT_SUBSCRIPTION_TIMEOUT_MS: u64 = 5000;
/// Dispatcher used by stages that do not name one
pub const DEFAULT_DISPATCHER: &str = "default-dispatcher";
