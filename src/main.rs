use std::net::SocketAddr;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use log::{info, LevelFilter};
use simplelog::{Config as LogConfig, SimpleLogger};

use lumenflow::artnet::ArtNetBridge;
use lumenflow::config::ShowConfig;
use lumenflow::engine::Engine;
use lumenflow::entity::EntityRegistry;
use lumenflow::graph::compile;
use lumenflow::input::InputState;
use lumenflow::value::{AttributeBundle, Color, PartialColor};

#[derive(Parser)]
#[command(about)]
struct Cli {
    /// If true, provide verbose logging.
    #[arg(long)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load a show file, start the engine, and print running stats.
    Run(RunArgs),

    /// Compile every graph in a show file and report errors, without running.
    Check(CheckArgs),

    /// Send one test frame to a configured Art-Net broadcast address.
    ArtnetTest(ArtnetTestArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Path to a YAML show file.
    show_file: PathBuf,

    /// Tick rate in Hz.
    #[arg(long, default_value_t = 60.0)]
    tick_hz: f64,

    /// Broadcast address for the Art-Net bridge, e.g. 2.255.255.255:6454.
    #[arg(long)]
    artnet_broadcast: Option<SocketAddr>,

    /// How long to run before exiting, for smoke-testing. Runs forever if
    /// omitted.
    #[arg(long)]
    run_for_secs: Option<u64>,
}

#[derive(Args)]
struct CheckArgs {
    /// Path to a YAML show file.
    show_file: PathBuf,
}

#[derive(Args)]
struct ArtnetTestArgs {
    /// Broadcast address for the Art-Net bridge.
    #[arg(long, default_value = "2.255.255.255:6454")]
    broadcast: SocketAddr,

    /// Universe to address.
    #[arg(long, default_value_t = 0)]
    universe: u16,
}

fn main() -> Result<()> {
    let args = Cli::try_parse()?;

    let log_level = if args.debug { LevelFilter::Debug } else { LevelFilter::Warn };
    SimpleLogger::init(log_level, LogConfig::default())?;

    match args.command {
        Command::Run(args) => run(args),
        Command::Check(args) => check(args),
        Command::ArtnetTest(args) => artnet_test(args),
    }
}

fn run(args: RunArgs) -> Result<()> {
    let config = ShowConfig::load(&args.show_file).context("failed to load show file")?;
    let registry = config.into_registry();
    let graph_ids: Vec<_> = registry.list_all_graphs().into_iter().map(|g| g.id).collect();

    let artnet = match args.artnet_broadcast {
        Some(addr) => Some(ArtNetBridge::new(addr).context("failed to bind Art-Net socket")?),
        None => None,
    };

    let engine = Engine::new(
        std::sync::Arc::new(registry),
        std::sync::Arc::new(InputState::new()),
        artnet,
        args.tick_hz,
    );
    engine.start();

    let mut loaded = 0;
    for id in graph_ids {
        let id_str = id.to_string();
        match engine.load_graph(id) {
            Ok(()) => loaded += 1,
            Err(e) => log::warn!("graph {id_str} failed to load: {e}"),
        }
    }
    info!("loaded {loaded} graph(s); running at {} Hz", args.tick_hz);

    match args.run_for_secs {
        Some(secs) => thread::sleep(Duration::from_secs(secs)),
        None => loop {
            thread::sleep(Duration::from_secs(1));
            let stats = engine.get_stats();
            info!(
                "frame {} | {} loaded, {} enabled",
                stats.frame_number, stats.loaded_graphs, stats.enabled_graphs
            );
        },
    }

    engine.stop();
    Ok(())
}

fn check(args: CheckArgs) -> Result<()> {
    let config = ShowConfig::load(&args.show_file).context("failed to load show file")?;
    let mut all_ok = true;
    for graph in config.graphs {
        let result = compile(&graph);
        if result.ok {
            println!("{}: ok", graph.id);
        } else {
            all_ok = false;
            println!("{}: {} error(s)", graph.id, result.errors.len());
            for error in &result.errors {
                println!("  [{}] {}: {}", error.code, error.node_id, error.message);
            }
        }
    }
    if !all_ok {
        anyhow::bail!("one or more graphs failed to compile");
    }
    Ok(())
}

fn artnet_test(args: ArtnetTestArgs) -> Result<()> {
    let bridge = ArtNetBridge::new(args.broadcast).context("failed to bind Art-Net socket")?;
    let mut data = lumenflow::entity::RegistryData::default();
    let model = lumenflow::entity::FixtureModel {
        id: "test-par".into(),
        brand: "Test".into(),
        model: "Par".into(),
        channels: [
            ("dimmer".to_string(), 1u16),
            ("red".to_string(), 2),
            ("green".to_string(), 3),
            ("blue".to_string(), 4),
        ]
        .into_iter()
        .collect(),
    };
    let fixture = lumenflow::entity::Fixture {
        id: "test-fixture".into(),
        revision: 1,
        name: "Test Fixture".into(),
        model_id: model.id.clone(),
        universe: args.universe,
        start_channel: 1,
    };
    data.fixture_models.insert(model.id.clone(), model);
    data.fixtures.insert(fixture.id.clone(), fixture.clone());
    let registry = lumenflow::entity::InMemoryRegistry::new(data);

    let mut fixtures = std::collections::HashMap::new();
    fixtures.insert(
        fixture.id.clone(),
        AttributeBundle {
            intensity: Some(number::UnipolarFloat::new(1.0)),
            color: PartialColor::from(Color::new(1.0, 0.0, 0.0)),
            ..Default::default()
        },
    );
    bridge.send_frame(&fixtures, &registry);
    println!("sent one test frame to {} on universe {}", args.broadcast, args.universe);
    Ok(())
}
