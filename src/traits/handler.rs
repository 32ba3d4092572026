// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::engine::StageContext;
use crate::errors::StreamError;
use crate::graph::Element;

pub type StageResult = Result<(), StreamError>;

/// Reacts to events arriving on one input port.
///
/// Returning an error fails the owning stage: all of its inputs are
/// cancelled and all of its outputs are failed with that error.
pub trait InHandler: Send {
    fn on_push(&mut self, ctx: &mut StageContext<'_>) -> StageResult;

    fn on_upstream_finish(&mut self, ctx: &mut StageContext<'_>) -> StageResult {
        ctx.complete_stage();
        Ok(())
    }

    fn on_upstream_failure(
        &mut self,
        ctx: &mut StageContext<'_>,
        cause: StreamError,
    ) -> StageResult {
        ctx.fail_stage(cause);
        Ok(())
    }
}

/// Reacts to events arriving on one output port.
pub trait OutHandler: Send {
    fn on_pull(&mut self, ctx: &mut StageContext<'_>) -> StageResult;

    fn on_downstream_finish(&mut self, ctx: &mut StageContext<'_>) -> StageResult {
        ctx.complete_stage();
        Ok(())
    }
}

/// Lifecycle callbacks of a stage that are not tied to a port.
pub trait StageHooks: Send {
    fn pre_start(&mut self, _ctx: &mut StageContext<'_>) -> StageResult {
        Ok(())
    }

    /// Called once when the stage has closed all of its ports, or when its island is torn down.
    fn post_stop(&mut self) {}

    /// Delivers an event posted through an `AsyncCallback` of this stage.
    fn on_async_input(&mut self, _ctx: &mut StageContext<'_>, _event: Element) -> StageResult {
        Ok(())
    }
}
