//! Rambler demo
//!
//! Plays a small example composition through the dummy scheduler and logs
//! what sounds when:
//!
//! ```text
//! dymo1
//! ├── dymo2: dymo5, dymo6
//! ├── dymo3: dymo7, dymo8 (dymo11, dymo12), dymo9
//! └── dymo4: dymo10
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use rambler::{CombinatorKind, DummyScheduler, MemoryStore, MultiPlayer, NodeId, ParamKind, ParamValue};
use ramblerconf::RamblerConfig;
use tokio_stream::StreamExt;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rambler")]
#[command(about = "Play an example composition through the dummy scheduler")]
#[command(version)]
struct Cli {
    /// Config file to use instead of ./rambler.toml
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Combinator for the root node (e.g. Conjunction, Selection)
    #[arg(long)]
    combinator: Option<String>,

    /// Combinator parameter values, comma separated (e.g. 0,2)
    #[arg(long, value_delimiter = ',')]
    param: Vec<f64>,

    /// Loop the root node until interrupted
    #[arg(long = "loop")]
    looping: bool,

    /// Extra passes of the root node
    #[arg(long)]
    repeat: Option<u32>,

    /// Override scheduler.object_delay_ms
    #[arg(long)]
    delay_ms: Option<u64>,
}

fn example_tree() -> MemoryStore {
    let store = MemoryStore::new();
    store.add_node("dymo1", None);
    store.add_node("dymo2", Some("dymo1"));
    store.add_node("dymo3", Some("dymo1"));
    store.add_node("dymo4", Some("dymo1"));
    store.add_leaf("dymo5", Some("dymo2"), "5.m4a");
    store.add_leaf("dymo6", Some("dymo2"), "6.m4a");
    store.add_leaf("dymo7", Some("dymo3"), "7.m4a");
    store.add_node("dymo8", Some("dymo3"));
    store.add_leaf("dymo9", Some("dymo3"), "9.m4a");
    store.add_leaf("dymo10", Some("dymo4"), "10.m4a");
    store.add_leaf("dymo11", Some("dymo8"), "11.m4a");
    store.add_leaf("dymo12", Some("dymo8"), "12.m4a");
    store
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = RamblerConfig::load_from(cli.config.as_deref()).context("loading config")?;
    if let Some(delay_ms) = cli.delay_ms {
        config.scheduler.object_delay_ms = delay_ms;
    }

    let env_filter = EnvFilter::try_new(&config.telemetry.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    info!("rambler {} starting", env!("CARGO_PKG_VERSION"));

    let store = Arc::new(example_tree());
    if let Some(tag) = &cli.combinator {
        let kind: CombinatorKind = tag.parse()?;
        let param = match cli.param.as_slice() {
            [] => None,
            [single] => Some(ParamValue::Number(*single)),
            values => Some(ParamValue::List(values.to_vec())),
        };
        store.set_combinator("dymo1", kind, param);
    }
    if cli.looping {
        store.set_parameter(Some("dymo1"), ParamKind::Loop, true);
    }
    if let Some(repeat) = cli.repeat {
        store.set_parameter(Some("dymo1"), ParamKind::Repeat, f64::from(repeat));
    }

    let scheduler = Arc::new(DummyScheduler::from_settings(&config.scheduler));
    let player = MultiPlayer::new(store.clone(), scheduler.clone(), config.player.clone());

    let mut playing = player.playing_ids_stream();
    tokio::spawn(async move {
        while let Some(ids) = playing.next().await {
            let ids: Vec<&str> = ids.iter().map(NodeId::as_str).collect();
            info!(?ids, "playing");
        }
    });

    let root = NodeId::from("dymo1");
    tokio::select! {
        result = player.play(&root, None) => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted");
            player.stop(None).await;
        }
    }

    for (i, group) in scheduler.scheduled_groups().iter().enumerate() {
        let ids: Vec<&str> = group.iter().map(NodeId::as_str).collect();
        println!("{:>3}: {}", i, ids.join(", "));
    }

    info!("rambler done");
    Ok(())
}
