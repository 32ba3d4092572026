// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::engine::{StageContext, StageLogic};
use crate::errors::StreamError;
use crate::graph::{Attributes, MatNode, MatValue, Outlet, Shape};
use crate::stages::OUT;
use crate::traits::{GraphStage, OutHandler, StageResult};
use std::sync::{Arc, OnceLock};

/// Emits the materialized value described by `computation`, then completes.
///
/// The value is only known once the whole graph has materialized, so every
/// materialization works on a private copy (see [`copy_src`](Self::copy_src))
/// whose value cell is filled in by the materializer before the island runs.
pub struct MaterializedValueSource {
    computation: MatNode,
    shape: Shape,
    value: Arc<OnceLock<MatValue>>,
}

impl MaterializedValueSource {
    pub fn new(computation: MatNode) -> Self {
        Self::with_outlet(computation, Outlet::new("matValue"))
    }

    pub fn with_outlet(computation: MatNode, outlet: Outlet) -> Self {
        Self {
            computation,
            shape: Shape::source(outlet),
            value: Arc::new(OnceLock::new()),
        }
    }

    pub fn computation(&self) -> &MatNode {
        &self.computation
    }

    /// Same port and computation, empty value cell.
    pub fn copy_src(&self) -> Self {
        Self {
            computation: self.computation.clone(),
            shape: self.shape.clone(),
            value: Arc::new(OnceLock::new()),
        }
    }

    /// Same port, different computation.
    pub fn with_computation(&self, computation: MatNode) -> Self {
        Self {
            computation,
            shape: self.shape.clone(),
            value: Arc::new(OnceLock::new()),
        }
    }

    /// Returns false if the value was already set.
    pub fn set_value(&self, value: MatValue) -> bool {
        self.value.set(value).is_ok()
    }
}

struct EmitValue {
    value: Arc<OnceLock<MatValue>>,
}

impl OutHandler for EmitValue {
    fn on_pull(&mut self, ctx: &mut StageContext<'_>) -> StageResult {
        let value = self
            .value
            .get()
            .cloned()
            .ok_or(StreamError::MaterializedValueUnavailable)?;
        ctx.push_value(OUT, value)?;
        ctx.complete(OUT);
        Ok(())
    }
}

impl GraphStage for MaterializedValueSource {
    fn name(&self) -> &str {
        "matValueSource"
    }

    fn shape(&self) -> &Shape {
        &self.shape
    }

    fn create_logic(&self, _attributes: &Attributes) -> Result<(StageLogic, MatValue), StreamError> {
        let logic = StageLogic::new(&self.shape).with_out_handler(
            OUT,
            EmitValue {
                value: self.value.clone(),
            },
        );
        Ok((logic, MatValue::NotUsed))
    }

    fn as_materialized_value_source(&self) -> Option<&MaterializedValueSource> {
        Some(self)
    }
}
