use std::sync::Arc;

use clap::{Parser, Subcommand};
use scan_api::{Rule, Source};
use scan_messages::{ScanSpec, ScanTag, Scanner};

#[derive(Parser)]
#[command(name = "scan-worker", about = "Content-exploration and rule-evaluation pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the full pipeline: bootstrap the engine and block until Ctrl+C,
    /// reloading worker counts from the config files on SIGHUP.
    Serve,

    /// Submit a single scan-spec against a source URL and print whatever
    /// the exporter writes for it, then shut the engine down. A demo
    /// walker, not a long-running deployment mode.
    Explore {
        /// e.g. `file:///var/data/report.pdf` or `smb://host/share/file.txt`.
        url: String,
        /// Matches everything when omitted (`AlwaysMatchesRule`).
        #[arg(long)]
        rule_json: Option<String>,
    },

    /// Print the status aggregator's current snapshot as JSON and exit.
    /// Only meaningful against a config pointing at the same queues a
    /// running `serve` is draining, so this is mostly useful in tests.
    Status,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    let config = match scan_engine::ScanConfig::load_layered() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "failed to load config");
            std::process::exit(1);
        }
    };

    match cli.command {
        Command::Serve => serve(config).await,
        Command::Explore { url, rule_json } => explore(config, &url, rule_json.as_deref()).await,
        Command::Status => {
            let engine = bootstrap_or_exit(config).await;
            print_status(&engine);
            engine.shutdown().await;
        }
    }
}

async fn serve(config: scan_engine::ScanConfig) {
    let mut engine = bootstrap_or_exit(config).await;
    tracing::info!("scan-worker started, press Ctrl+C to stop");

    let mut sighup = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup()) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "failed to register SIGHUP handler");
            std::process::exit(1);
        }
    };

    loop {
        tokio::select! {
            _ = sighup.recv() => {
                tracing::info!("SIGHUP received, reloading configuration");
                match scan_engine::ScanConfig::load_layered() {
                    Ok(new_config) => match engine.reload(new_config).await {
                        Ok(()) => tracing::info!("configuration reloaded successfully"),
                        Err(e) => tracing::error!(error = %e, "configuration reload failed (keeping old config)"),
                    },
                    Err(e) => tracing::error!(error = %e, "failed to reload config (keeping old config)"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutting down...");
                break;
            }
        }
    }

    engine.shutdown().await;
}

async fn explore(config: scan_engine::ScanConfig, url: &str, rule_json: Option<&str>) {
    let source = match Source::from_url(url) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, url, "unrecognised source URL");
            std::process::exit(1);
        }
    };

    let rule = match rule_json {
        Some(raw) => {
            let obj: serde_json::Value = match serde_json::from_str(raw) {
                Ok(v) => v,
                Err(e) => {
                    tracing::error!(error = %e, "malformed --rule-json");
                    std::process::exit(1);
                }
            };
            match scan_rules::rule_from_json(&obj) {
                Ok(r) => r,
                Err(e) => {
                    tracing::error!(error = %e, "malformed rule");
                    std::process::exit(1);
                }
            }
        }
        None => Rule::Leaf(Arc::new(scan_rules::AlwaysMatchesRule::default())),
    };

    let scan_tag = ScanTag {
        scanner: Scanner { pk: 0, name: "scan-worker-explore".into() },
        time: chrono::Utc::now(),
        user: None,
        organisation: None,
    };
    let spec = ScanSpec::new(scan_tag, source, &rule);

    let engine = bootstrap_or_exit(config).await;
    if engine.bus().scan_specs.publish(spec).await.is_err() {
        tracing::error!("engine's scan-spec queue is already closed");
        engine.shutdown().await;
        std::process::exit(1);
    }

    // Give the pipeline a moment to drain this one source before tearing
    // down; a real deployment never shuts down after a fixed delay like
    // this, but `explore` is a one-shot demo, not a server.
    tokio::time::sleep(std::time::Duration::from_secs(2)).await;
    print_status(&engine);
    engine.shutdown().await;
}

async fn bootstrap_or_exit(config: scan_engine::ScanConfig) -> scan_engine::Engine {
    match scan_engine::Engine::bootstrap(config).await {
        Ok(e) => e,
        Err(e) => {
            tracing::error!(error = %e, "failed to bootstrap engine");
            std::process::exit(1);
        }
    }
}

fn print_status(engine: &scan_engine::Engine) {
    for snapshot in engine.status().all() {
        match serde_json::to_string(&snapshot) {
            Ok(line) => println!("{line}"),
            Err(e) => tracing::error!(error = %e, "status snapshot does not serialise"),
        }
    }
}
