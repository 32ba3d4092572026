// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::engine::{StageContext, StageLogic};
use crate::errors::StreamError;
use crate::graph::{Attributes, Inlet, MatValue, Shape};
use crate::stages::{Completion, IN};
use crate::traits::{GraphStage, InHandler, StageHooks, StageResult};
use std::marker::PhantomData;

/// Collects every element; materializes a [`Completion`] of the collected `Vec<T>`.
pub struct CollectSink<T> {
    shape: Shape,
    _element: PhantomData<fn() -> T>,
}

impl<T> CollectSink<T> {
    pub fn new() -> Self {
        Self {
            shape: Shape::sink(Inlet::new("CollectSink.in")),
            _element: PhantomData,
        }
    }
}

impl<T> Default for CollectSink<T> {
    fn default() -> Self {
        Self::new()
    }
}

struct Gather<T> {
    buffer: Vec<T>,
    completion: Completion<Vec<T>>,
}

impl<T: Send + 'static> InHandler for Gather<T> {
    fn on_push(&mut self, ctx: &mut StageContext<'_>) -> StageResult {
        let element = ctx.grab_value::<T>(IN)?;
        self.buffer.push(element);
        ctx.pull(IN)
    }

    fn on_upstream_finish(&mut self, ctx: &mut StageContext<'_>) -> StageResult {
        self.completion.complete(Ok(std::mem::take(&mut self.buffer)));
        ctx.complete_stage();
        Ok(())
    }

    fn on_upstream_failure(&mut self, ctx: &mut StageContext<'_>, cause: StreamError) -> StageResult {
        self.completion.complete(Err(cause.clone()));
        ctx.fail_stage(cause);
        Ok(())
    }
}

struct SinkLifecycle<T> {
    completion: Completion<T>,
}

impl<T: Send + 'static> StageHooks for SinkLifecycle<T> {
    fn pre_start(&mut self, ctx: &mut StageContext<'_>) -> StageResult {
        ctx.pull(IN)
    }

    fn post_stop(&mut self) {
        self.completion
            .complete(Err(StreamError::AbruptStageTermination));
    }
}

impl<T: Send + Sync + 'static> GraphStage for CollectSink<T> {
    fn name(&self) -> &str {
        "collectSink"
    }

    fn shape(&self) -> &Shape {
        &self.shape
    }

    fn create_logic(&self, _attributes: &Attributes) -> Result<(StageLogic, MatValue), StreamError> {
        let completion = Completion::<Vec<T>>::new();
        let logic = StageLogic::new(&self.shape)
            .with_in_handler(
                IN,
                Gather {
                    buffer: Vec::new(),
                    completion: completion.clone(),
                },
            )
            .with_hooks(SinkLifecycle {
                completion: completion.clone(),
            });
        Ok((logic, MatValue::value(completion)))
    }
}

pub(crate) fn sink_lifecycle<T: Send + 'static>(completion: Completion<T>) -> impl StageHooks {
    SinkLifecycle { completion }
}
