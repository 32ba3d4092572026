// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::engine::StageLogic;
use crate::errors::StreamError;
use crate::graph::{Attributes, MatValue, Shape};
use crate::stages::MaterializedValueSource;

/// A reusable blueprint for one processing step.
///
/// A stage is immutable and may be materialized any number of times; each
/// materialization gets a fresh [`StageLogic`] holding the mutable state.
pub trait GraphStage: Send + Sync {
    fn name(&self) -> &str;

    fn shape(&self) -> &Shape;

    fn initial_attributes(&self) -> Attributes {
        Attributes::none()
    }

    /// Build the per-materialization logic together with this stage's materialized value.
    fn create_logic(&self, attributes: &Attributes) -> Result<(StageLogic, MatValue), StreamError>;

    /// Stages that emit the graph's own materialized value identify themselves here.
    fn as_materialized_value_source(&self) -> Option<&MaterializedValueSource> {
        None
    }
}
