// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::engine::{StageContext, StageLogic};
use crate::errors::StreamError;
use crate::graph::{Attributes, Inlet, MatValue, Outlet, Shape};
use crate::stages::{PullUpstream, IN, OUT};
use crate::traits::{GraphStage, InHandler, StageResult};
use std::sync::Arc;

type Predicate<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

/// Passes on the elements matching a predicate.
pub struct Filter<T> {
    name: String,
    predicate: Predicate<T>,
    shape: Shape,
}

impl<T> Filter<T> {
    pub fn new(name: impl Into<String>, predicate: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
        Self {
            name: name.into(),
            predicate: Arc::new(predicate),
            shape: Shape::flow(Inlet::new("Filter.in"), Outlet::new("Filter.out")),
        }
    }
}

struct Keep<T> {
    predicate: Predicate<T>,
}

impl<T: Send + 'static> InHandler for Keep<T> {
    fn on_push(&mut self, ctx: &mut StageContext<'_>) -> StageResult {
        let element = ctx.grab_value::<T>(IN)?;
        if (self.predicate)(&element) {
            ctx.push_value(OUT, element)
        } else {
            ctx.pull(IN)
        }
    }
}

impl<T: Send + 'static> GraphStage for Filter<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn shape(&self) -> &Shape {
        &self.shape
    }

    fn create_logic(&self, _attributes: &Attributes) -> Result<(StageLogic, MatValue), StreamError> {
        let logic = StageLogic::new(&self.shape)
            .with_in_handler(
                IN,
                Keep {
                    predicate: self.predicate.clone(),
                },
            )
            .with_out_handler(OUT, PullUpstream);
        Ok((logic, MatValue::NotUsed))
    }
}
