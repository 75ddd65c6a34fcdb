//! Live value monitor.
//!
//! Demonstrates:
//! - Building a client from a page origin and a configuration file
//! - Binding a subscriber to indexes on the default page
//! - Persisting local values to a file
//! - Writing a value through the command handle
//!
//! Usage:
//!   cargo run --example watch_values -- <origin> <hmi.json> [index...]
//!   cargo run --example watch_values -- http://plc.local:8009/ hmi.json 3 4 --debug

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use anyhow::{Context, bail};
use tracing::info;
use tracing_subscriber::EnvFilter;

use hmi_link::{
    BoundWidget, Client, ClientOptions, Effects, FileStore, HmiConfig, HmiValue, IndexBinding,
    RenderSurface, SubscriberId, Subscriber, Url, VariableIndex,
};
use hmi_link::session::{JumpHistory, VisibilityChange};

// ============================================================================
// Constants
// ============================================================================

const STORE_PATH: &str = "./hmi_store.json";

// ============================================================================
// Types
// ============================================================================

/// Command-line arguments.
#[derive(Debug, Clone)]
struct Args {
    origin: String,
    config: String,
    indexes: Vec<u32>,
    debug: bool,
}

impl Args {
    fn parse() -> anyhow::Result<Self> {
        let mut positional = Vec::new();
        let mut debug = false;
        for arg in std::env::args().skip(1) {
            if arg == "--debug" {
                debug = true;
            } else {
                positional.push(arg);
            }
        }

        let mut positional = positional.into_iter();
        let (Some(origin), Some(config)) = (positional.next(), positional.next()) else {
            bail!("usage: watch_values <origin> <hmi.json> [index...] [--debug]");
        };
        let indexes = positional
            .map(|text| text.parse::<u32>().with_context(|| format!("bad index {text:?}")))
            .collect::<anyhow::Result<_>>()?;

        Ok(Self {
            origin,
            config,
            indexes,
            debug,
        })
    }
}

/// Prints every update it receives.
struct Printer {
    id: SubscriberId,
}

impl Subscriber for Printer {
    fn id(&self) -> SubscriberId {
        self.id
    }

    fn frequency(&self) -> f64 {
        2.0
    }

    fn new_hmi_value(
        &self,
        index: VariableIndex,
        value: &HmiValue,
        old: Option<&HmiValue>,
        _effects: &mut Effects,
    ) {
        match old {
            Some(old) => println!("[{index}] {old} -> {value}"),
            None => println!("[{index}] {value}"),
        }
    }
}

/// Logs page-level changes.
struct LogSurface;

impl RenderSurface for LogSurface {
    fn apply_visibility(&mut self, change: &VisibilityChange) {
        info!(
            page = %change.page,
            attach = change.attach.len(),
            detach = change.detach.len(),
            "Page shown"
        );
    }

    fn set_fade_out(&mut self, faded: bool) {
        info!(faded, "Fade");
    }

    fn update_jumps(&mut self, history: &JumpHistory) {
        info!(?history, "Jump history changed");
    }

    fn notify(&mut self, message: &str) {
        println!("[NOTICE] {message}");
    }
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let args = match Args::parse() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(2);
        }
    };
    init_logging(args.debug);

    if let Err(e) = run(args).await {
        eprintln!("\n[ERROR] {e:#}");
        std::process::exit(1);
    }
}

fn init_logging(debug: bool) {
    let filter = if debug {
        "hmi_link=debug"
    } else {
        "hmi_link=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();
}

async fn run(args: Args) -> anyhow::Result<()> {
    println!("=== Watch Values ===\n");

    let origin = Url::parse(&args.origin).context("parsing origin")?;
    let config = HmiConfig::from_file(&args.config).context("loading configuration")?;
    let page = config.default_page.clone();

    let printer = Arc::new(Printer {
        id: SubscriberId::next(),
    });
    let bindings = args
        .indexes
        .iter()
        .map(|&raw| IndexBinding::absolute(VariableIndex::new(raw)))
        .collect();

    let mut client = Client::builder()
        .origin(origin)
        .config(config)
        .options(ClientOptions::new())
        .widget(&page, Arc::new(BoundWidget::new(printer, bindings)), false)
        .surface(LogSurface)
        .store(FileStore::new(STORE_PATH))
        .build()?;

    println!("[Setup] Connecting to {}", client.url());

    let handle = client.handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = handle.shutdown();
        }
    });

    let end = client.run().await?;
    println!("\n[Done] Session ended: {end:?}");

    Ok(())
}
