//! BUMP command line: run the monitoring engine or operate on monitors.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{debug, warn};

use bump_service::config::Config;
use bump_service::control::{MonitorControl, MonitorSnapshot};
use bump_service::lock::DataDirLock;
use bump_service::monitoring::MonitorConfig;
use bump_service::orchestrator::Orchestrator;

/// BUMP CLI.
#[derive(Parser)]
#[command(name = "bump")]
#[command(about = "Website availability monitor")]
#[command(version)]
struct Cli {
    /// Configuration file path (defaults to $XDG_CONFIG_HOME/bump/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the monitoring engine in the foreground (default)
    Run,

    /// List monitors and their status
    List {
        /// Output format (table, json)
        #[arg(long, default_value = "table")]
        format: String,
    },

    /// Show one monitor in detail
    Show {
        /// Monitor name
        name: String,
    },

    /// Show the most recent results of a monitor
    History {
        /// Monitor name
        name: String,

        /// Number of results
        #[arg(short = 'n', long, default_value_t = 20)]
        count: usize,
    },

    /// Run a monitor's check now
    Check {
        /// Monitor name
        name: String,
    },

    /// Create an unconfigured monitor
    Create,

    /// Delete a monitor and its history
    Delete {
        /// Monitor name
        name: String,
    },

    /// Pause a monitor
    Pause {
        /// Monitor name
        name: String,
    },

    /// Resume a paused monitor
    Resume {
        /// Monitor name
        name: String,
    },

    /// Replace a monitor's configuration with a JSON file
    Submit {
        /// Monitor name
        name: String,

        /// JSON file holding the new configuration
        #[arg(long)]
        file: PathBuf,
    },

    /// Print the effective configuration
    Config,
}

impl Commands {
    /// Whether the command writes to the data directory
    fn mutates(&self) -> bool {
        matches!(
            self,
            Commands::Check { .. }
                | Commands::Create
                | Commands::Delete { .. }
                | Commands::Pause { .. }
                | Commands::Resume { .. }
                | Commands::Submit { .. }
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = Config::from_config(cli.config.as_ref()).context("Failed to load configuration")?;
    let _log_guard = logger::init_with(config.log_level(), config.general.log_dir.as_deref());
    if Config::parse_log_level(&config.general.log_level).is_none() {
        warn!(level = %config.general.log_level, "Unknown log level, using INFO");
    }
    debug!(config = ?config, "Configuration loaded");

    let command = cli.command.unwrap_or(Commands::Run);
    if let Commands::Run = command {
        return Orchestrator::start(config).await;
    }
    if let Commands::Config = command {
        print!("{config}");
        return Ok(());
    }

    let _lock = if command.mutates() {
        let lock = DataDirLock::acquire(config.lock_path())
            .context("Monitors cannot be changed while another bump process uses them")?;
        Some(lock)
    } else {
        None
    };

    let control = Orchestrator::new(config)?.control();
    run_command(&control, command).await
}

async fn run_command(control: &MonitorControl, command: Commands) -> Result<()> {
    match command {
        Commands::List { format } => {
            let monitors = control.list_monitors().await;
            if format == "json" {
                print_json(&monitors)?;
            } else {
                print_table(&monitors);
            }
        }
        Commands::Show { name } => print_json(&control.get_monitor(&name).await?)?,
        Commands::History { name, count } => {
            for result in control.get_history(&name, count).await? {
                println!("{result}");
            }
        }
        Commands::Check { name } => println!("{}", control.force_execute(&name).await?),
        Commands::Create => {
            let created = control.create_monitor().await?;
            println!("Created '{}'", created.unique_name);
        }
        Commands::Delete { name } => {
            control.delete_monitor(&name).await?;
            println!("Deleted '{name}'");
        }
        Commands::Pause { name } => {
            control.set_paused(&name, true).await?;
            println!("Paused '{name}'");
        }
        Commands::Resume { name } => {
            control.set_paused(&name, false).await?;
            println!("Resumed '{name}'");
        }
        Commands::Submit { name, file } => {
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let config: MonitorConfig = serde_json::from_str(&raw)
                .with_context(|| format!("Invalid monitor configuration in {}", file.display()))?;
            let updated = control.submit_config(&name, config).await?;
            print_json(&updated)?;
        }
        Commands::Run | Commands::Config => {}
    }
    Ok(())
}

fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_table(monitors: &[MonitorSnapshot]) {
    println!("{:<8} {:<28} {:<15} {:>8} {:>10}  URL", "STATUS", "NAME", "CHECK", "UPTIME", "LATENCY");
    for monitor in monitors {
        let uptime = monitor
            .avg_uptime
            .map(|uptime| format!("{:.1}%", uptime * 100.0))
            .unwrap_or_else(|| "-".into());
        let latency = monitor
            .avg_latency_ms
            .map(|latency| format!("{latency:.0}ms"))
            .unwrap_or_else(|| "-".into());
        println!(
            "{:<8} {:<28} {:<15} {:>8} {:>10}  {}",
            monitor.status.to_string(),
            monitor.unique_name,
            monitor.config.check_type,
            uptime,
            latency,
            monitor.config.url
        );
    }
}
