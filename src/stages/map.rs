// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::engine::{StageContext, StageLogic};
use crate::errors::StreamError;
use crate::graph::{Attributes, Inlet, MatValue, Outlet, Shape};
use crate::stages::{PullUpstream, IN, OUT};
use crate::traits::{GraphStage, InHandler, StageResult};
use std::sync::Arc;

type MapFn<A, B> = Arc<dyn Fn(A) -> Result<B, StreamError> + Send + Sync>;

/// Applies a function to every element. An `Err` from the function fails the stage.
pub struct Map<A, B> {
    name: String,
    f: MapFn<A, B>,
    shape: Shape,
}

impl<A, B> Map<A, B> {
    pub fn new(name: impl Into<String>, f: impl Fn(A) -> B + Send + Sync + 'static) -> Self {
        Self::try_new(name, move |a| Ok(f(a)))
    }

    pub fn try_new(
        name: impl Into<String>,
        f: impl Fn(A) -> Result<B, StreamError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            f: Arc::new(f),
            shape: Shape::flow(Inlet::new("Map.in"), Outlet::new("Map.out")),
        }
    }
}

struct Apply<A, B> {
    f: MapFn<A, B>,
}

impl<A: Send + 'static, B: Send + 'static> InHandler for Apply<A, B> {
    fn on_push(&mut self, ctx: &mut StageContext<'_>) -> StageResult {
        let input = ctx.grab_value::<A>(IN)?;
        let output = (self.f)(input)?;
        ctx.push_value(OUT, output)
    }
}

impl<A: Send + 'static, B: Send + 'static> GraphStage for Map<A, B> {
    fn name(&self) -> &str {
        &self.name
    }

    fn shape(&self) -> &Shape {
        &self.shape
    }

    fn create_logic(&self, _attributes: &Attributes) -> Result<(StageLogic, MatValue), StreamError> {
        let logic = StageLogic::new(&self.shape)
            .with_in_handler(IN, Apply { f: self.f.clone() })
            .with_out_handler(OUT, PullUpstream);
        Ok((logic, MatValue::NotUsed))
    }
}
