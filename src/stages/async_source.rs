// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::engine::{AsyncCallback, StageContext, StageLogic};
use crate::errors::StreamError;
use crate::graph::{downcast_element, Attributes, Element, MatValue, Outlet, Shape};
use crate::stages::OUT;
use crate::traits::{GraphStage, OutHandler, StageHooks, StageResult};

/// Emits `0..count`, routing every element through the stage's own async callback.
///
/// Each pull posts the next number to the callback; the number is pushed
/// when it comes back through `on_async_input`. This is the shape of any
/// source fed by an outside producer.
pub struct AsyncCounterSource {
    count: u64,
    shape: Shape,
}

impl AsyncCounterSource {
    pub fn new(count: u64) -> Self {
        Self {
            count,
            shape: Shape::source(Outlet::new("AsyncCounterSource.out")),
        }
    }
}

struct Counter {
    callback: Option<AsyncCallback>,
    next: u64,
    count: u64,
}

struct Lifecycle;

impl StageHooks for Lifecycle {
    fn pre_start(&mut self, ctx: &mut StageContext<'_>) -> StageResult {
        let callback = ctx.async_callback()?;
        let count = match ctx.state_mut::<Counter>() {
            Some(counter) => {
                counter.callback = Some(callback);
                counter.count
            }
            None => return Err(StreamError::failed("counter state missing")),
        };
        if count == 0 {
            ctx.complete(OUT);
        }
        Ok(())
    }

    fn on_async_input(&mut self, ctx: &mut StageContext<'_>, event: Element) -> StageResult {
        let value = downcast_element::<u64>(event)?;
        let last = ctx
            .state_mut::<Counter>()
            .map_or(true, |counter| value + 1 >= counter.count);
        ctx.push_value(OUT, value)?;
        if last {
            ctx.complete(OUT);
        }
        Ok(())
    }
}

struct Request;

impl OutHandler for Request {
    fn on_pull(&mut self, ctx: &mut StageContext<'_>) -> StageResult {
        let counter = ctx
            .state_mut::<Counter>()
            .ok_or_else(|| StreamError::failed("counter state missing"))?;
        let value = counter.next;
        counter.next += 1;
        match &counter.callback {
            Some(callback) if callback.invoke_value(value) => Ok(()),
            _ => Err(StreamError::NoAsyncHost),
        }
    }
}

impl GraphStage for AsyncCounterSource {
    fn name(&self) -> &str {
        "asyncCounterSource"
    }

    fn shape(&self) -> &Shape {
        &self.shape
    }

    fn create_logic(&self, _attributes: &Attributes) -> Result<(StageLogic, MatValue), StreamError> {
        let logic = StageLogic::new(&self.shape)
            .with_state(Counter {
                callback: None,
                next: 0,
                count: self.count,
            })
            .with_hooks(Lifecycle)
            .with_out_handler(OUT, Request);
        Ok((logic, MatValue::NotUsed))
    }
}
