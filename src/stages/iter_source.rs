// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::engine::{StageContext, StageLogic};
use crate::errors::StreamError;
use crate::graph::{Attributes, MatValue, Outlet, Shape};
use crate::stages::OUT;
use crate::traits::{GraphStage, OutHandler, StageResult};

/// Emits the given items in order, then completes.
pub struct IterSource<T> {
    items: Vec<T>,
    shape: Shape,
}

impl<T> IterSource<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items,
            shape: Shape::source(Outlet::new("IterSource.out")),
        }
    }
}

struct Emit<T> {
    items: std::vec::IntoIter<T>,
}

impl<T: Send + 'static> OutHandler for Emit<T> {
    fn on_pull(&mut self, ctx: &mut StageContext<'_>) -> StageResult {
        match self.items.next() {
            Some(item) => {
                ctx.push_value(OUT, item)?;
                if self.items.len() == 0 {
                    ctx.complete(OUT);
                }
            }
            None => ctx.complete(OUT),
        }
        Ok(())
    }
}

impl<T: Clone + Send + Sync + 'static> GraphStage for IterSource<T> {
    fn name(&self) -> &str {
        "iterSource"
    }

    fn shape(&self) -> &Shape {
        &self.shape
    }

    fn create_logic(&self, _attributes: &Attributes) -> Result<(StageLogic, MatValue), StreamError> {
        let logic = StageLogic::new(&self.shape).with_out_handler(
            OUT,
            Emit {
                items: self.items.clone().into_iter(),
            },
        );
        Ok((logic, MatValue::NotUsed))
    }
}
