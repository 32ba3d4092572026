// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Turns a graph description into running shells.
//!
//! Materialization happens in four steps:
//!
//! 1. Fuse the module (unless it is already fused) and materialize the
//!    assembly of every island, collecting the value of every leaf.
//! 2. Evaluate the graph's materialized-value tree and feed every
//!    materialized-value source the value of its own computation.
//! 3. Build one shell per island and register it with the host.
//! 4. Connect cross-island wires publisher to subscriber, and expose the
//!    graph's own open ports.
//!
//! Nothing runs until the host is pumped or spawned. A spawned host takes
//! further graphs through its [`HostHandle`](crate::engine::HostHandle).

use crate::config::MaterializerSettings;
use crate::engine::fusing;
use crate::engine::host::ShellRegistry;
use crate::engine::publisher::ExposedPublisher;
use crate::engine::shell::{GraphInterpreterShell, ShellId};
use crate::errors::ConfigurationError;
use crate::graph::{FusedModule, Inlet, MatValue, Module, ModuleId, Outlet, PortId};
use crate::traits::{Publisher, Subscriber};
use std::collections::HashMap;
use std::sync::Arc;

/// What a materialization hands back to the caller.
pub struct Materialized {
    value: MatValue,
    fused: Arc<FusedModule>,
    subscribers: Vec<(Inlet, Arc<dyn Subscriber>)>,
    publishers: Vec<(Outlet, Arc<ExposedPublisher>)>,
    shells: Vec<ShellId>,
}

impl Materialized {
    /// The graph's materialized value.
    pub fn value(&self) -> &MatValue {
        &self.value
    }

    pub fn fused(&self) -> &Arc<FusedModule> {
        &self.fused
    }

    /// The subscriber an external publisher feeds the open `inlet` through.
    pub fn subscriber(&self, inlet: &Inlet) -> Option<Arc<dyn Subscriber>> {
        self.subscribers
            .iter()
            .find(|(i, _)| i.id() == inlet.id())
            .map(|(_, s)| s.clone())
    }

    /// The publisher serving the open `outlet`.
    pub fn publisher(&self, outlet: &Outlet) -> Option<Arc<ExposedPublisher>> {
        self.publishers
            .iter()
            .find(|(o, _)| o.id() == outlet.id())
            .map(|(_, p)| p.clone())
    }

    /// Subscribers of the open inlets, in shape order.
    pub fn subscribers(&self) -> Vec<Arc<dyn Subscriber>> {
        self.subscribers.iter().map(|(_, s)| s.clone()).collect()
    }

    /// Publishers of the open outlets, in shape order.
    pub fn publishers(&self) -> Vec<Arc<ExposedPublisher>> {
        self.publishers.iter().map(|(_, p)| p.clone()).collect()
    }

    /// One shell per island, in island order.
    pub fn shells(&self) -> &[ShellId] {
        &self.shells
    }
}

pub struct Materializer {
    settings: MaterializerSettings,
}

impl Materializer {
    pub fn new(settings: MaterializerSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &MaterializerSettings {
        &self.settings
    }

    /// Fuse `module` and hand its islands to `host`.
    pub fn materialize<H: ShellRegistry>(
        &self,
        module: &Module,
        host: &mut H,
    ) -> Result<Materialized, ConfigurationError> {
        let fused = fusing::aggressive_with_dispatcher(module, self.settings.default_dispatcher())?;

        let mut leaf_values: HashMap<ModuleId, MatValue> = HashMap::new();
        let mut prepared = Vec::with_capacity(fused.islands().len());
        let mut sources = Vec::new();
        for module in fused.islands() {
            let Module::Island(island) = module else {
                return Err(ConfigurationError::MalformedAssembly {
                    detail: format!("fused graph holds {:?} where an island was expected", module),
                });
            };
            let mut materialized = island.assembly().materialize(island.attributes())?;
            let values = std::mem::take(&mut materialized.mat_values);
            for (leaf, value) in island.leaves().iter().zip(values) {
                leaf_values.insert(leaf.id(), value);
            }
            leaf_values.insert(island.id(), MatValue::NotUsed);
            sources.extend(materialized.mat_sources.iter().map(|(_, source)| source.clone()));
            prepared.push((island.clone(), materialized));
        }

        let value = fused.info().mat().evaluate(&leaf_values)?;
        for source in sources {
            source.set_value(source.computation().evaluate(&leaf_values)?);
        }

        let mut subscribers: HashMap<PortId, Arc<dyn Subscriber>> = HashMap::new();
        let mut publishers: HashMap<PortId, Arc<ExposedPublisher>> = HashMap::new();
        let mut shells = Vec::with_capacity(prepared.len());
        for (island, materialized) in prepared {
            let settings = self.island_settings(island.attributes().input_buffer_bounds());
            let id = host.allocate_shell_id();
            let shell = GraphInterpreterShell::new(
                id,
                island.assembly().clone(),
                materialized,
                &settings,
                settings.max_input_buffer_size(),
                host.sender(),
            );
            for (index, inlet) in island.shape().inlets().iter().enumerate() {
                subscribers.insert(inlet.id(), shell.subscriber(index));
            }
            for (index, outlet) in island.shape().outlets().iter().enumerate() {
                if let Some(publisher) = shell.publisher(index) {
                    publishers.insert(outlet.id(), publisher);
                }
            }
            host.register_shell(shell);
            shells.push(id);
        }

        for (outlet, inlet) in fused.cross_island_wires() {
            let publisher = publishers
                .get(&outlet.id())
                .ok_or_else(|| dangling(&outlet.to_string()))?;
            let subscriber = subscribers
                .get(&inlet.id())
                .ok_or_else(|| dangling(&inlet.to_string()))?;
            publisher.subscribe(subscriber.clone());
        }

        let exposed_inlets = fused
            .shape()
            .inlets()
            .iter()
            .map(|inlet| {
                subscribers
                    .get(&inlet.id())
                    .map(|s| (inlet.clone(), s.clone()))
                    .ok_or_else(|| dangling(&inlet.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let exposed_outlets = fused
            .shape()
            .outlets()
            .iter()
            .map(|outlet| {
                publishers
                    .get(&outlet.id())
                    .map(|p| (outlet.clone(), p.clone()))
                    .ok_or_else(|| dangling(&outlet.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Materialized {
            value,
            fused,
            subscribers: exposed_inlets,
            publishers: exposed_outlets,
            shells,
        })
    }

    /// An `InputBuffer` attribute on the island overrides the configured sizes.
    fn island_settings(&self, input_buffer: Option<(usize, usize)>) -> MaterializerSettings {
        match input_buffer {
            Some((initial, max)) => self.settings.clone().with_input_buffer(
                initial.max(1).next_power_of_two(),
                max.max(1).next_power_of_two(),
            ),
            None => self.settings.clone(),
        }
    }
}

fn dangling(port: &str) -> ConfigurationError {
    ConfigurationError::DanglingConnection {
        port: port.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::host::GraphInterpreterHost;
    use crate::graph::{Attributes, GraphBuilder, MatCombine};
    use crate::stages::{CollectSink, Completion, IgnoreSink, IterSource, Map};
    use crate::testkit::{ProbePublisher, ProbeSubscriber};

    fn host() -> GraphInterpreterHost {
        GraphInterpreterHost::new("materializer-test", MaterializerSettings::default())
    }

    #[test]
    fn test_two_islands_run_to_completion() {
        let mut b = GraphBuilder::new();
        let src = b.add(&Module::stage(IterSource::new(vec![1_i64, 2, 3])).async_boundary());
        let double = b.add(&Module::stage(Map::new("double", |x: i64| x * 2)));
        let sink = b.add_with(&Module::stage(CollectSink::<i64>::new()), MatCombine::KeepRight);
        b.chain(&[&src, &double, &sink]).unwrap();

        let mut host = host();
        let materialized = Materializer::new(MaterializerSettings::default())
            .materialize(&b.build(), &mut host)
            .unwrap();
        assert_eq!(materialized.shells().len(), 2);

        host.pump();
        let completion = materialized.value().downcast_ref::<Completion<Vec<i64>>>().unwrap();
        assert_eq!(completion.poll(), Some(Ok(vec![2, 4, 6])));
        assert!(host.is_idle());
    }

    #[test]
    fn test_open_ports_are_exposed() {
        let flow = Module::stage(Map::new("inc", |x: i64| x + 1));
        let inlet = flow.shape().inlets()[0].clone();
        let outlet = flow.shape().outlets()[0].clone();

        let mut host = host();
        let materialized = Materializer::new(MaterializerSettings::default())
            .materialize(&flow, &mut host)
            .unwrap();
        assert!(materialized.subscriber(&inlet).is_none());
        assert_eq!(materialized.subscribers().len(), 1);
        assert_eq!(materialized.publishers().len(), 1);
        let exposed_in = materialized.fused().shape().inlets()[0].clone();
        let exposed_out = materialized.fused().shape().outlets()[0].clone();
        assert!(materialized.publisher(&outlet).is_none());

        let upstream = ProbePublisher::new();
        let downstream = ProbeSubscriber::<i64>::unbounded();
        upstream.subscribe(materialized.subscriber(&exposed_in).unwrap());
        materialized
            .publisher(&exposed_out)
            .unwrap()
            .subscribe(downstream.clone());
        host.pump();

        upstream.send_value(41_i64);
        upstream.complete();
        host.pump();

        assert_eq!(downstream.elements(), vec![42]);
        assert!(downstream.is_completed());
        assert!(host.is_idle());
    }

    #[test]
    fn test_materialized_value_source_emits_graph_value() {
        let mut b = GraphBuilder::new();
        let src = b.add(&Module::stage(IterSource::new(vec![1_i64])));
        let sink = b.add_with(&Module::stage(IgnoreSink::new()), MatCombine::KeepRight);
        b.chain(&[&src, &sink]).unwrap();
        let value_out = b.materialized_value();
        let collect = b.add_with(
            &Module::stage(CollectSink::<MatValue>::new()),
            MatCombine::KeepBoth,
        );
        b.connect(&value_out, &collect.inlets()[0]).unwrap();

        let mut host = host();
        let materialized = Materializer::new(MaterializerSettings::default())
            .materialize(&b.build(), &mut host)
            .unwrap();
        host.pump();

        let ignore = materialized
            .value()
            .left()
            .and_then(|v| v.downcast_ref::<Completion<()>>())
            .unwrap();
        let collected = materialized
            .value()
            .right()
            .and_then(|v| v.downcast_ref::<Completion<Vec<MatValue>>>())
            .unwrap();
        assert_eq!(ignore.poll(), Some(Ok(())));
        let emitted = collected.poll().unwrap().unwrap();
        assert_eq!(emitted.len(), 1);
        assert!(emitted[0].downcast_ref::<Completion<()>>().is_some());
    }

    #[test]
    fn test_island_input_buffer_attribute_sizes_the_shell() {
        let mut b = GraphBuilder::new();
        let src = b.add(&Module::stage(IterSource::new(vec![1_i64])).async_boundary());
        let sink = b.add(
            &Module::stage(IgnoreSink::new())
                .add_attributes(Attributes::input_buffer(2, 3))
                .async_boundary(),
        );
        b.chain(&[&src, &sink]).unwrap();

        let mut host = host();
        let materialized = Materializer::new(MaterializerSettings::default())
            .materialize(&b.build(), &mut host)
            .unwrap();
        let sink_shell = host.shell(materialized.shells()[1]).unwrap();
        assert_eq!(sink_shell.event_limit(), 8);
        host.pump();
        assert!(host.is_idle());
    }
}
