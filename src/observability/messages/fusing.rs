// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for the fusing pass.

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use tracing::Span;

/// A graph was fused into islands.
///
/// # Log Level
/// `info!` - Happens once per materialization
pub struct GraphFused {
    pub islands: usize,
    pub stages: usize,
    pub wires: usize,
}

impl Display for GraphFused {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Fused {} stages into {} islands joined by {} wires",
            self.stages, self.islands, self.wires
        )
    }
}

impl StructuredLog for GraphFused {
    fn log(&self) {
        tracing::info!(
            islands = self.islands,
            stages = self.stages,
            wires = self.wires,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "fusing",
            span_name = name,
            islands = self.islands,
            stages = self.stages,
        )
    }
}

/// A group was split because its members asked for different dispatchers.
///
/// # Log Level
/// `debug!`
pub struct GroupSplitByDispatcher<'a> {
    pub group: usize,
    pub dispatchers: &'a [String],
}

impl Display for GroupSplitByDispatcher<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Group {} split by dispatcher into [{}]",
            self.group,
            self.dispatchers.join(", ")
        )
    }
}

impl StructuredLog for GroupSplitByDispatcher<'_> {
    fn log(&self) {
        tracing::debug!(
            group = self.group,
            dispatchers = self.dispatchers.join(","),
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!("dispatcher_split", span_name = name, group = self.group)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_graph_fused_display() {
        let msg = GraphFused {
            islands: 2,
            stages: 5,
            wires: 1,
        };
        assert_eq!(
            msg.to_string(),
            "Fused 5 stages into 2 islands joined by 1 wires"
        );
    }

    #[test]
    fn test_group_split_display() {
        let names = vec!["a".to_string(), "b".to_string()];
        let msg = GroupSplitByDispatcher {
            group: 0,
            dispatchers: &names,
        };
        assert_eq!(msg.to_string(), "Group 0 split by dispatcher into [a, b]");
    }
}
