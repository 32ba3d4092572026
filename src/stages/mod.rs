// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Reference stages.
//!
//! Small, general-purpose stages used to build and exercise graphs: a
//! source over a vector, `map` and `filter` flows, collecting and ignoring
//! sinks, the materialized-value source fusing relies on, and a source that
//! emits through its own async callback.

mod async_source;
mod collect;
mod completion;
mod filter;
mod ignore;
mod iter_source;
mod map;
mod mat_source;

pub use async_source::AsyncCounterSource;
pub use collect::CollectSink;
pub use completion::Completion;
pub use filter::Filter;
pub use ignore::IgnoreSink;
pub use iter_source::IterSource;
pub use map::Map;
pub use mat_source::MaterializedValueSource;

use crate::engine::StageContext;
use crate::graph::{InPort, OutPort};
use crate::traits::{OutHandler, StageResult};

pub(crate) const IN: InPort = InPort(0);
pub(crate) const OUT: OutPort = OutPort(0);

/// Out handler of a one-in one-out flow: demand goes straight upstream.
pub(crate) struct PullUpstream;

impl OutHandler for PullUpstream {
    fn on_pull(&mut self, ctx: &mut StageContext<'_>) -> StageResult {
        ctx.pull(IN)
    }
}
