// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod handler;
pub mod reactive;
pub mod stage;

pub use handler::{InHandler, OutHandler, StageHooks, StageResult};
pub use reactive::{Publisher, Subscriber, Subscription};
pub use stage::GraphStage;
