use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use proxydash::api::{ApiClient, ChannelStatus, Credentials, Health};
use proxydash::config::Config;
use proxydash::sync::{Category, SyncEngine, SyncEvent};
use proxydash::util::sanitize_label;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;

#[derive(Parser, Debug)]
#[command(
    name = "proxydash",
    about = "Inspect and manage the channels of a multi-channel API proxy"
)]
struct Args {
    /// Config file (default: ~/.config/proxydash/config.toml)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Channel category to operate on (messages, responses, gemini)
    #[arg(long, global = true)]
    category: Option<Category>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch the dashboard once and print the channel list
    Refresh,
    /// Keep refreshing on the configured interval
    Watch {
        /// Stop after this many refreshes
        #[arg(long)]
        ticks: Option<u64>,
    },
    /// Measure latency of one channel
    Ping { index: u32 },
    /// Measure latency of every channel
    PingAll,
    /// Change the load balancing strategy
    LoadBalance { strategy: String },
    /// Delete a channel
    Delete { index: u32 },
    /// Set a channel's status (active, suspended, disabled)
    Status { index: u32, status: ChannelStatus },
    /// Give a channel scheduling priority for a while
    Promote {
        index: u32,
        #[arg(long, default_value_t = 300)]
        seconds: u64,
    },
}

fn load_config(path: Option<PathBuf>) -> Result<Config> {
    let path = match path.or_else(Config::default_path) {
        Some(path) => path,
        None => {
            tracing::debug!("HOME not set, using default configuration");
            return Ok(Config::default());
        }
    };
    Config::load(&path).with_context(|| format!("Failed to load config from {}", path.display()))
}

fn health_label(health: Option<Health>) -> &'static str {
    match health {
        Some(Health::Healthy) => "healthy",
        Some(Health::Error) => "error",
        Some(Health::Unknown) => "unknown",
        None => "-",
    }
}

fn print_channels(engine: &SyncEngine<ApiClient>, category: Category) {
    let snapshot = engine.snapshot(category);
    let dashboard = engine.dashboard(category);

    println!(
        "[{}] strategy={} active={} failover={}",
        category,
        sanitize_label(&snapshot.load_balance),
        engine.active_channel_count(category),
        engine.failover_channel_count(category),
    );

    for channel in &snapshot.channels {
        let latency = channel
            .latency
            .map(|ms| format!("{ms}ms"))
            .unwrap_or_else(|| "-".to_string());
        let success = dashboard
            .metrics_for(channel.index)
            .filter(|m| m.request_count > 0)
            .map(|m| format!("{:.1}%", m.success_rate))
            .unwrap_or_else(|| "-".to_string());

        println!(
            "{:>4}  {:<28} {:<10} {:<8} {:>8} {:>7}",
            channel.index,
            sanitize_label(&channel.name),
            channel.status,
            health_label(channel.health),
            latency,
            success,
        );
    }
}

async fn watch(engine: &SyncEngine<ApiClient>, ticks: Option<u64>) -> Result<()> {
    let mut events = engine.subscribe();
    engine.start_auto_refresh();
    // Runs in the background; its outcome arrives as an event like every tick
    drop(engine.refresh());

    let mut seen = 0u64;
    loop {
        if ticks.is_some_and(|limit| seen >= limit) {
            break;
        }

        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(SyncEvent::RefreshStatus { success }) => {
                    seen += 1;
                    if success {
                        print_channels(engine, engine.active_category());
                    } else {
                        eprintln!("Refresh failed, retrying");
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "Event receiver lagged");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    engine.stop_auto_refresh();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = load_config(args.config)?;

    let credentials = Credentials::new(config.resolve_api_key());
    if !credentials.is_authenticated() {
        tracing::warn!("No access key configured; the proxy will likely answer 401");
    }

    let client = ApiClient::new(&config.base_url, credentials, config.request_timeout())
        .context("Invalid proxy base URL")?;

    let engine = SyncEngine::new(client, config.engine_settings());
    if let Some(category) = args.category {
        engine.set_active_category(category);
    }
    let category = engine.active_category();

    match args.command {
        Command::Refresh => {
            engine.refresh().await?;
            print_channels(&engine, category);
        }
        Command::Watch { ticks } => {
            watch(&engine, ticks).await?;
        }
        Command::Ping { index } => {
            engine.refresh().await?;
            let result = engine.ping_channel(category, index).await?;
            match result.error.as_deref() {
                Some(error) if !result.success => {
                    println!(
                        "channel {index}: {} ({})",
                        sanitize_label(&result.status),
                        sanitize_label(error)
                    );
                }
                _ => println!(
                    "channel {index}: {} {}ms",
                    sanitize_label(&result.status),
                    result.latency
                ),
            }
        }
        Command::PingAll => {
            engine.refresh().await?;
            let results = engine.ping_all(category).await?;
            println!("pinged {} channels", results.len());
            print_channels(&engine, category);
        }
        Command::LoadBalance { strategy } => {
            engine.update_load_balance(&strategy).await?;
            println!("[{category}] load balance set to {}", sanitize_label(&strategy));
        }
        Command::Delete { index } => {
            engine.delete_channel(index).await?;
            println!("[{category}] channel {index} deleted");
            print_channels(&engine, category);
        }
        Command::Status { index, status } => {
            engine.set_channel_status(index, status).await?;
            println!("[{category}] channel {index} is now {status}");
        }
        Command::Promote { index, seconds } => {
            engine
                .set_promotion(index, Duration::from_secs(seconds))
                .await?;
            println!("[{category}] channel {index} promoted for {seconds}s");
        }
    }

    engine.dispose();
    Ok(())
}
