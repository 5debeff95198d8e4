mod logging;
mod render;
mod watch;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use clawmon_core::{ClawmonConfig, Instance};
use clawmon_gateway::{
    cli_available, ssh_available, CommandRunner, InstanceCoordinator, LogFollower, MockGateway,
    Notification, RefreshScheduler, StatusAdapter,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Parser, Debug)]
#[command(name = "clawmon")]
#[command(about = "Monitor OpenClaw gateways, locally or over ssh", long_about = None)]
struct Cli {
    /// Config file (defaults to $CLAWMON_CONFIG or ~/.config/clawmon/config.yml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Serve simulated status, health and logs instead of running the gateway CLI
    #[arg(long, global = true)]
    mock: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List configured instances
    Instances,
    /// Fetch status once
    Status {
        #[arg(short, long)]
        instance: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Fetch health once
    Health {
        #[arg(short, long)]
        instance: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Follow the gateway log until interrupted
    Logs {
        #[arg(short, long)]
        instance: Option<String>,
    },
    /// Live view: periodic status, health and log stream, with line commands on stdin
    Watch {
        #[arg(short, long)]
        instance: Option<String>,
        #[arg(long)]
        refresh_ms: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let log_guard = logging::init_logging();
    if let Some(path) = log_guard.as_ref().and_then(|guard| guard.path.as_ref()) {
        debug!(event = "logging_ready", path = %path.display());
    }

    let (config, first_run) = load_config(cli.config.as_deref())?;
    if first_run {
        info!(event = "config_defaults", reason = "no config file");
    }
    let instances = config.resolve_instances();
    if cli.mock {
        info!(event = "mock_mode", instances = instances.len());
    }

    match cli.command {
        Commands::Instances => {
            list_instances(&instances);
            Ok(())
        }
        Commands::Status { instance, json } if cli.mock => {
            let start = select_instance(&instances, instance.as_deref())?;
            show_mock_snapshot(instances, start, Topic::Status, json).await
        }
        Commands::Health { instance, json } if cli.mock => {
            let start = select_instance(&instances, instance.as_deref())?;
            show_mock_snapshot(instances, start, Topic::Health, json).await
        }
        Commands::Status { instance, json } => {
            let adapter = adapter_for(&instances, instance.as_deref(), &config)?;
            show_status(&adapter, json).await
        }
        Commands::Health { instance, json } => {
            let adapter = adapter_for(&instances, instance.as_deref(), &config)?;
            show_health(&adapter, json).await
        }
        Commands::Logs { instance } if cli.mock => {
            let start = select_instance(&instances, instance.as_deref())?;
            follow_mock_logs(instances, start).await
        }
        Commands::Logs { instance } => {
            let selected = select_instance(&instances, instance.as_deref())?;
            follow_logs(&instances[selected], &config).await
        }
        Commands::Watch {
            instance,
            refresh_ms,
        } => {
            let start = select_instance(&instances, instance.as_deref())?;
            let mut ui = config.ui.clone();
            if let Some(refresh_ms) = refresh_ms.filter(|ms| *ms > 0) {
                ui.refresh_ms = refresh_ms;
            }
            let scheduler = RefreshScheduler::new(ui.refresh_interval());
            if cli.mock {
                return watch::run(MockGateway::new(instances), scheduler, start).await;
            }
            let coordinator = InstanceCoordinator::new(instances, &ui);
            watch::run(coordinator, scheduler, start).await
        }
    }
}

fn load_config(path: Option<&std::path::Path>) -> Result<(ClawmonConfig, bool)> {
    match path {
        Some(path) => {
            let (mut config, first_run) = ClawmonConfig::load_from(path)
                .with_context(|| format!("failed to load {}", path.display()))?;
            config.apply_env_overrides();
            Ok((config, first_run))
        }
        None => ClawmonConfig::load().context("failed to load config"),
    }
}

fn select_instance(instances: &[Instance], name: Option<&str>) -> Result<usize> {
    let Some(name) = name.map(str::trim).filter(|name| !name.is_empty()) else {
        return Ok(0);
    };
    instances
        .iter()
        .position(|instance| instance.name.eq_ignore_ascii_case(name))
        .ok_or_else(|| {
            let known: Vec<_> = instances.iter().map(|instance| instance.name.as_str()).collect();
            anyhow!("unknown instance {name} (configured: {})", known.join(", "))
        })
}

fn runner_for(instance: &Instance, config: &ClawmonConfig) -> Arc<CommandRunner> {
    Arc::new(CommandRunner::for_instance(instance).with_fetch_timeout(config.ui.fetch_timeout()))
}

fn adapter_for(
    instances: &[Instance],
    name: Option<&str>,
    config: &ClawmonConfig,
) -> Result<StatusAdapter> {
    let selected = select_instance(instances, name)?;
    Ok(StatusAdapter::new(runner_for(&instances[selected], config)))
}

fn list_instances(instances: &[Instance]) {
    let ssh_ok = ssh_available();
    for (index, instance) in instances.iter().enumerate() {
        let cli_ok = if instance.is_remote() {
            None
        } else {
            Some(cli_available(instance.binary()))
        };
        println!(
            "{}",
            render::instance_line(index, instance, index == 0, cli_ok)
        );
    }
    if instances.iter().any(Instance::is_remote) && !ssh_ok {
        println!("warning: ssh not found on PATH; remote instances will fail");
    }
}

async fn show_status(adapter: &StatusAdapter, json: bool) -> Result<()> {
    match adapter.fetch_status(&CancellationToken::new()).await {
        Ok(status) if json => {
            println!("{}", serde_json::to_string_pretty(status.as_ref())?);
            Ok(())
        }
        Ok(status) => {
            for line in render::status_summary(&status) {
                println!("{line}");
            }
            Ok(())
        }
        Err(err) => {
            if let Some(raw) = err.raw_output() {
                println!("{raw}");
            }
            Err(err).context(format!("status of {}", adapter.instance_name()))
        }
    }
}

async fn show_health(adapter: &StatusAdapter, json: bool) -> Result<()> {
    match adapter.fetch_health(&CancellationToken::new()).await {
        Ok(report) if json => {
            println!("{}", serde_json::to_string_pretty(report.as_ref())?);
            Ok(())
        }
        Ok(report) => {
            for line in render::health_summary(&report) {
                println!("{line}");
            }
            Ok(())
        }
        Err(err) => {
            if let Some(raw) = adapter.cached_health_raw() {
                println!("{raw}");
            }
            Err(err).context(format!("health of {}", adapter.instance_name()))
        }
    }
}

async fn follow_logs(instance: &Instance, config: &ClawmonConfig) -> Result<()> {
    let mut follower = LogFollower::new(runner_for(instance, config), config.ui.follow_buffer);
    follower.start().await;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = follower.next_event() => match event {
                Some(event) => println!("{}", render::log_line(&event)),
                None => {
                    warn!(event = "follow_closed", instance = %instance.name);
                    break;
                }
            }
        }
    }
    tokio::time::timeout(Duration::from_secs(5), follower.stop())
        .await
        .context("log follower did not stop")?;
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Topic {
    Status,
    Health,
}

async fn show_mock_snapshot(
    instances: Vec<Instance>,
    start: usize,
    topic: Topic,
    json: bool,
) -> Result<()> {
    let mut gateway = MockGateway::new(instances);
    gateway.switch_to(start)?;
    for line in mock_snapshot_lines(&mut gateway, topic, json).await? {
        println!("{line}");
    }
    gateway.shutdown();
    Ok(())
}

async fn mock_snapshot_lines(
    gateway: &mut MockGateway,
    topic: Topic,
    json: bool,
) -> Result<Vec<String>> {
    loop {
        let lines = match (topic, gateway.next().await) {
            (Topic::Status, Notification::StatusFetched { result, .. }) => {
                let status = result?;
                if json {
                    vec![serde_json::to_string_pretty(status.as_ref())?]
                } else {
                    render::status_summary(&status)
                }
            }
            (Topic::Health, Notification::HealthFetched { result, .. }) => {
                let report = result?;
                if json {
                    vec![serde_json::to_string_pretty(report.as_ref())?]
                } else {
                    render::health_summary(&report)
                }
            }
            _ => continue,
        };
        return Ok(lines);
    }
}

async fn follow_mock_logs(instances: Vec<Instance>, start: usize) -> Result<()> {
    let mut gateway = MockGateway::new(instances);
    gateway.switch_to(start)?;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            notification = gateway.next() => {
                if let Notification::LogArrived { event, .. } = notification {
                    println!("{}", render::log_line(&event));
                }
            }
        }
    }
    gateway.shutdown();
    Ok(())
}
