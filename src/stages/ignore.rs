// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::engine::{StageContext, StageLogic};
use crate::errors::StreamError;
use crate::graph::{Attributes, Inlet, MatValue, Shape};
use crate::stages::collect::sink_lifecycle;
use crate::stages::{Completion, IN};
use crate::traits::{GraphStage, InHandler, StageResult};

/// Requests and discards everything; materializes a `Completion<()>`.
pub struct IgnoreSink {
    shape: Shape,
}

impl IgnoreSink {
    pub fn new() -> Self {
        Self {
            shape: Shape::sink(Inlet::new("IgnoreSink.in")),
        }
    }
}

impl Default for IgnoreSink {
    fn default() -> Self {
        Self::new()
    }
}

struct Discard {
    completion: Completion<()>,
}

impl InHandler for Discard {
    fn on_push(&mut self, ctx: &mut StageContext<'_>) -> StageResult {
        ctx.grab(IN)?;
        ctx.pull(IN)
    }

    fn on_upstream_finish(&mut self, ctx: &mut StageContext<'_>) -> StageResult {
        self.completion.complete(Ok(()));
        ctx.complete_stage();
        Ok(())
    }

    fn on_upstream_failure(&mut self, ctx: &mut StageContext<'_>, cause: StreamError) -> StageResult {
        self.completion.complete(Err(cause.clone()));
        ctx.fail_stage(cause);
        Ok(())
    }
}

impl GraphStage for IgnoreSink {
    fn name(&self) -> &str {
        "ignoreSink"
    }

    fn shape(&self) -> &Shape {
        &self.shape
    }

    fn create_logic(&self, _attributes: &Attributes) -> Result<(StageLogic, MatValue), StreamError> {
        let completion = Completion::<()>::new();
        let logic = StageLogic::new(&self.shape)
            .with_in_handler(
                IN,
                Discard {
                    completion: completion.clone(),
                },
            )
            .with_hooks(sink_lifecycle(completion.clone()));
        Ok((logic, MatValue::value(completion)))
    }
}
