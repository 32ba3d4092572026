// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use anyhow::{anyhow, Context};
use fusebox::config::{load_and_validate_settings, MaterializerSettings};
use fusebox::engine::{GraphInterpreterHost, Materializer};
use fusebox::graph::{GraphBuilder, MatCombine, Module};
use fusebox::stages::{CollectSink, Completion, Filter, IterSource, Map};
use std::env;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

const DEFAULT_ELEMENT_COUNT: i64 = 1_000;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// `source -> square | filter | collect`, with an async boundary before each flow stage.
fn demo_graph(count: i64) -> anyhow::Result<Module> {
    let mut b = GraphBuilder::new();
    let source = b.add(&Module::stage(IterSource::new((1..=count).collect())).named("numbers"));
    let square = b.add(
        &Module::stage(Map::new("square", |x: i64| x * x))
            .async_boundary(),
    );
    let odd = b.add(
        &Module::stage(Filter::new("odd", |x: &i64| x % 2 == 1))
            .async_boundary(),
    );
    let sink = b.add_with(&Module::stage(CollectSink::<i64>::new()), MatCombine::KeepRight);
    b.chain(&[&source, &square, &odd, &sink])?;
    Ok(b.build())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let args: Vec<String> = env::args().collect();
    let settings = match args.get(1) {
        Some(path) => load_and_validate_settings(path)?,
        None => MaterializerSettings::default(),
    };
    let count = match args.get(2) {
        Some(raw) => raw
            .parse::<i64>()
            .with_context(|| format!("element count '{}' is not a number", raw))?,
        None => DEFAULT_ELEMENT_COUNT,
    };

    println!("🚀 fusebox demo");
    println!("═══════════════════════════════════");
    println!("Elements: {}", count);
    println!("Input buffer: {}..{}", settings.initial_input_buffer_size(), settings.max_input_buffer_size());
    println!("Fuzzing: {}", settings.fuzzing_mode());
    println!();

    let module = demo_graph(count)?;
    let mut host = GraphInterpreterHost::new("demo", settings.clone());
    let materialized = Materializer::new(settings).materialize(&module, &mut host)?;
    println!("🧩 Islands: {}", materialized.fused().islands().len());
    println!("🔌 Cross-island wires: {}", materialized.fused().cross_island_wires().len());

    let completion = materialized
        .value()
        .downcast_ref::<Completion<Vec<i64>>>()
        .cloned()
        .ok_or_else(|| anyhow!("demo graph did not materialize a collecting sink"))?;

    let start = Instant::now();
    let handle = host.spawn();
    let squares = completion.wait().await?;
    let host = handle.join().await?;

    println!();
    println!("📊 Results");
    println!("⏱️  Elapsed: {:?}", start.elapsed());
    println!("🔢 Odd squares: {}", squares.len());
    println!("➕ Sum: {}", squares.iter().sum::<i64>());
    println!("🛑 Host stopped: {}", host.is_stopped());

    if let Ok(snapshot) = serde_json::to_string_pretty(&materialized.fused().snapshot()) {
        tracing::debug!(snapshot = %snapshot, "fused layout");
    }
    Ok(())
}
