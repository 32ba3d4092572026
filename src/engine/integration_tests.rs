// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::sync::{Arc, Mutex};

use crate::config::MaterializerSettings;
use crate::engine::fusing;
use crate::engine::port_state::{IN_CLOSED, OUT_CLOSED, PULLING, PUSHING};
use crate::engine::{
    Assembly, GraphInterpreter, GraphInterpreterHost, Materialized, Materializer, NoBoundary,
    StageContext, StageLogic,
};
use crate::errors::StreamError;
use crate::graph::{
    Attributes, GraphBuilder, Inlet, MatCombine, MatValue, Module, Outlet, Shape,
};
use crate::stages::{CollectSink, Completion, Filter, IterSource, Map, PullUpstream, IN, OUT};
use crate::testkit::{ProbePublisher, ProbeSubscriber};
use crate::traits::{GraphStage, InHandler, Publisher, StageResult};

/// Integration tests running whole graphs through fusing, materialization and the host
#[cfg(test)]
mod tests {
    use super::*;

    fn host() -> GraphInterpreterHost {
        GraphInterpreterHost::new("integration", MaterializerSettings::default())
    }

    fn materialize(module: &Module, host: &mut GraphInterpreterHost) -> Materialized {
        Materializer::new(host.settings().clone())
            .materialize(module, host)
            .unwrap()
    }

    fn completion(materialized: &Materialized) -> Completion<Vec<i64>> {
        materialized
            .value()
            .downcast_ref::<Completion<Vec<i64>>>()
            .unwrap()
            .clone()
    }

    fn collected(materialized: &Materialized) -> Option<Result<Vec<i64>, StreamError>> {
        materialized
            .value()
            .downcast_ref::<Completion<Vec<i64>>>()?
            .poll()
    }

    /// `IterSource(items) -> middle -> CollectSink`, keeping the sink's value.
    fn pipeline(items: Vec<i64>, middle: &[Module]) -> Module {
        let mut b = GraphBuilder::new();
        let mut shapes = vec![b.add(&Module::stage(IterSource::new(items)))];
        for module in middle {
            shapes.push(b.add(module));
        }
        shapes.push(b.add_with(&Module::stage(CollectSink::<i64>::new()), MatCombine::KeepRight));
        let refs: Vec<&Shape> = shapes.iter().collect();
        b.chain(&refs).unwrap();
        b.build()
    }

    fn double() -> Module {
        Module::stage(Map::new("double", |x: i64| x * 2))
    }

    /// Pushes every element twice without waiting for demand in between.
    struct DoublePush {
        shape: Shape,
    }

    struct Twice;

    impl InHandler for Twice {
        fn on_push(&mut self, ctx: &mut StageContext<'_>) -> StageResult {
            let value = ctx.grab_value::<i64>(IN)?;
            ctx.push_value(OUT, value)?;
            ctx.push_value(OUT, value)
        }
    }

    impl GraphStage for DoublePush {
        fn name(&self) -> &str {
            "doublePush"
        }

        fn shape(&self) -> &Shape {
            &self.shape
        }

        fn create_logic(&self, _attributes: &Attributes) -> Result<(StageLogic, MatValue), StreamError> {
            let logic = StageLogic::new(&self.shape)
                .with_in_handler(IN, Twice)
                .with_out_handler(OUT, PullUpstream);
            Ok((logic, MatValue::NotUsed))
        }
    }

    #[test]
    fn test_single_island_doubles_and_completes() {
        let module = pipeline(vec![1, 2, 3], &[double()]);
        let fused = fusing::aggressive(&module).unwrap();
        assert_eq!(fused.islands().len(), 1);

        let Module::Island(island) = &fused.islands()[0] else {
            panic!("expected an island");
        };
        let mut interpreter = GraphInterpreter::from_assembly(
            "scenario-a",
            island.assembly().clone(),
            &MaterializerSettings::default(),
        )
        .unwrap();
        interpreter.init();
        interpreter.execute(100, &mut NoBoundary).unwrap();
        assert!(interpreter.is_completed());

        let mut host = host();
        let materialized = materialize(&module, &mut host);
        host.pump();
        assert_eq!(collected(&materialized), Some(Ok(vec![2, 4, 6])));
        assert!(host.is_idle());
    }

    #[test]
    fn test_push_without_demand_fails_only_the_offending_stage() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let record = seen.clone();
        let assembly = Assembly::linear(vec![
            Arc::new(IterSource::new(vec![1_i64, 2, 3])),
            Arc::new(DoublePush {
                shape: Shape::flow(Inlet::new("DoublePush.in"), Outlet::new("DoublePush.out")),
            }),
            Arc::new(Map::new("record", move |x: i64| {
                record.lock().unwrap().push(x);
                x
            })),
            Arc::new(CollectSink::<i64>::new()),
        ])
        .unwrap();
        let assembly = Arc::new(assembly);
        let mut materialized = assembly.materialize(&Attributes::none()).unwrap();
        let values = std::mem::take(&mut materialized.mat_values);
        let mut interpreter = GraphInterpreter::new(
            "scenario-b",
            assembly,
            materialized,
            &MaterializerSettings::default(),
        );
        interpreter.init();
        interpreter.execute(100, &mut NoBoundary).unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![1]);
        let result = values[3]
            .downcast_ref::<Completion<Vec<i64>>>()
            .unwrap()
            .poll();
        assert!(matches!(result, Some(Err(StreamError::PushWithoutDemand { .. }))));
        assert!(interpreter.is_completed());
        assert_eq!(interpreter.queued_events(), 0);
    }

    #[test]
    fn test_zero_demand_cancels_upstream_and_fails_downstream() {
        let module = Module::stage(Map::new("inc", |x: i64| x + 1));
        let mut host = host();
        let materialized = materialize(&module, &mut host);

        let upstream = ProbePublisher::new();
        let downstream = ProbeSubscriber::<i64>::new();
        upstream.subscribe(materialized.subscribers()[0].clone());
        materialized.publishers()[0].subscribe(downstream.clone());
        host.pump();
        assert!(downstream.is_subscribed());

        downstream.request(0);
        host.pump();
        assert_eq!(downstream.error(), Some(StreamError::InvalidDemand(0)));
        assert_eq!(upstream.cancellations(), 1);

        upstream.send_value(7_i64);
        upstream.complete();
        host.pump();
        assert_eq!(downstream.element_count(), 0);
        assert_eq!(downstream.terminal_signals(), 1);
        assert!(host.is_idle());
    }

    #[tokio::test]
    async fn test_abrupt_host_termination_signals_each_boundary_once() {
        let module = Module::stage(Map::new("inc", |x: i64| x + 1));
        let mut host = host();
        let materialized = materialize(&module, &mut host);

        let upstream = ProbePublisher::new();
        let downstream = ProbeSubscriber::<i64>::requesting(4);
        upstream.subscribe(materialized.subscribers()[0].clone());
        materialized.publishers()[0].subscribe(downstream.clone());
        host.pump();
        upstream.send_value(1_i64);
        host.pump();
        assert_eq!(downstream.elements(), vec![2]);

        let handle = host.spawn();
        handle.cancel();
        let host = handle.join().await.unwrap();

        assert!(host.is_stopped());
        assert_eq!(downstream.error(), Some(StreamError::AbruptTermination));
        assert_eq!(downstream.terminal_signals(), 1);
        assert_eq!(upstream.cancellations(), 1);
    }

    #[test]
    fn test_dispatchers_split_fusable_group_into_wired_islands() {
        let mut b = GraphBuilder::new();
        let src = b.add(&Module::stage(IterSource::new(vec![1_i64, 2])).with_dispatcher("io"));
        let sink = b.add_with(
            &Module::stage(CollectSink::<i64>::new()).with_dispatcher("compute"),
            MatCombine::KeepRight,
        );
        b.chain(&[&src, &sink]).unwrap();
        let module = b.build();

        let fused = fusing::aggressive(&module).unwrap();
        assert_eq!(fused.islands().len(), 2);
        assert_eq!(fused.cross_island_wires().len(), 1);
        for island in fused.islands() {
            let Module::Island(island) = island else {
                panic!("expected an island");
            };
            assert_eq!(island.assembly().stage_count(), 1);
        }

        let mut host = host();
        let materialized = materialize(&module, &mut host);
        assert_eq!(materialized.shells().len(), 2);
        host.pump();
        assert_eq!(collected(&materialized), Some(Ok(vec![1, 2])));
    }

    #[test]
    fn test_port_states_stay_consistent_step_by_step() {
        let module = pipeline(
            (0..8).collect(),
            &[
                double(),
                Module::stage(Filter::new("small", |x: &i64| *x < 10)),
            ],
        );
        let fused = fusing::aggressive(&module).unwrap();
        let Module::Island(island) = &fused.islands()[0] else {
            panic!("expected an island");
        };
        let mut interpreter = GraphInterpreter::from_assembly(
            "stepping",
            island.assembly().clone(),
            &MaterializerSettings::default(),
        )
        .unwrap();
        interpreter.init();

        let mut closed = vec![0_u32; interpreter.connection_count()];
        while interpreter.is_suspended() {
            interpreter.execute(1, &mut NoBoundary).unwrap();
            for (connection, seen) in closed.iter_mut().enumerate() {
                let state = interpreter.port_state(connection);
                assert_ne!(state & (PUSHING | PULLING), PUSHING | PULLING);
                let bits = state & (IN_CLOSED | OUT_CLOSED);
                assert_eq!(bits & *seen, *seen);
                *seen = bits;
            }
        }
        assert!(interpreter.is_completed());
        assert!(closed.iter().all(|bits| *bits == IN_CLOSED | OUT_CLOSED));
    }

    #[test]
    fn test_fusing_keeps_the_external_layout() {
        let mut b = GraphBuilder::new();
        let first = b.add(&double());
        let second = b.add(&Module::stage(Map::new("inc", |x: i64| x + 1)));
        b.chain(&[&first, &second]).unwrap();
        let open = b.build();

        let fused = fusing::aggressive(&open).unwrap();
        assert_eq!(fused.islands().len(), 1);
        assert!(fused.shape().has_same_layout(open.shape()));

        let bounded = open.async_boundary();
        let once = fusing::aggressive(&bounded).unwrap();
        let twice = fusing::aggressive(&Module::Fused(once.clone())).unwrap();
        assert!(once.shape().has_same_layout(bounded.shape()));
        assert_eq!(twice.shape().inlets(), once.shape().inlets());
        assert_eq!(twice.shape().outlets(), once.shape().outlets());
    }

    #[test]
    fn test_fuzzing_mode_preserves_element_order() {
        let module = pipeline(
            (0..50).collect(),
            &[double().async_boundary(), Module::stage(Map::new("inc", |x: i64| x + 1))],
        );
        let settings = MaterializerSettings::default().with_fuzzing(Some(42));
        let mut host = GraphInterpreterHost::new("fuzzing", settings);
        let materialized = materialize(&module, &mut host);
        host.pump();

        let expected: Vec<i64> = (0..50).map(|x| x * 2 + 1).collect();
        assert_eq!(collected(&materialized), Some(Ok(expected)));
    }

    #[tokio::test]
    async fn test_spawned_host_runs_multi_island_graph() {
        let module = pipeline(
            (1..=200).collect(),
            &[
                double().async_boundary(),
                Module::stage(Filter::new("even-tens", |x: &i64| x % 10 == 0)).async_boundary(),
            ],
        );
        let mut host = host();
        let materialized = materialize(&module, &mut host);
        assert_eq!(materialized.shells().len(), 3);
        let completion = materialized
            .value()
            .downcast_ref::<Completion<Vec<i64>>>()
            .unwrap()
            .clone();

        let handle = host.spawn();
        let result = completion.wait().await.unwrap();
        let host = handle.join().await.unwrap();

        assert_eq!(result, (1..=40).map(|x| x * 10).collect::<Vec<i64>>());
        assert!(host.is_idle());
    }

    #[tokio::test]
    async fn test_running_host_takes_new_graphs_through_its_handle() {
        let mut handle = host().spawn();
        let materializer = Materializer::new(handle.settings().clone());

        let first = materializer
            .materialize(&pipeline(vec![1, 2, 3], &[double()]), &mut handle)
            .unwrap();
        assert_eq!(completion(&first).wait().await.unwrap(), vec![2, 4, 6]);

        let second = materializer
            .materialize(
                &pipeline((1..=10).collect(), &[double().async_boundary()]),
                &mut handle,
            )
            .unwrap();
        assert_eq!(second.shells().len(), 2);
        assert_eq!(
            completion(&second).wait().await.unwrap(),
            (1..=10).map(|x| x * 2).collect::<Vec<i64>>()
        );
        assert!(first.shells().iter().all(|id| !second.shells().contains(id)));

        let host = handle.join().await.unwrap();
        assert!(host.is_idle());
        assert!(host.is_stopped());
    }

    #[tokio::test]
    async fn test_cancelled_handle_aborts_late_graphs() {
        let mut handle = host().spawn();
        handle.cancel();
        let materialized = Materializer::new(handle.settings().clone())
            .materialize(&pipeline(vec![1, 2, 3], &[double()]), &mut handle)
            .unwrap();

        assert_eq!(
            completion(&materialized).wait().await,
            Err(StreamError::AbruptStageTermination)
        );
        let host = handle.join().await.unwrap();
        assert!(host.is_stopped());
        assert!(host.is_idle());
    }
}
