use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use rgroup_core::{
    LayoutMode, ManagerConfig, MemoryFacility, ResourceGroupManager, CGROUP_NAME_ENV, VERSION,
};
use serde::Serialize;
use tracing::{debug, info, warn};

#[derive(Parser)]
#[command(name = "rgroup")]
#[command(author = "rgroup Team")]
#[command(version = VERSION)]
#[command(about = "Manage named cgroups under a configured root group", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "/etc/rgroup/config.toml")]
    config: PathBuf,

    /// Root group name (overrides config file and RGROUP_CGROUP_NAME)
    #[arg(long)]
    cgroup_name: Option<String>,

    /// Cgroup filesystem mount point
    #[arg(long)]
    mount_root: Option<PathBuf>,

    /// Hierarchy layout
    #[arg(long, value_enum)]
    layout: Option<LayoutArg>,

    /// Run against an in-memory facility; nothing on the host changes
    #[arg(long)]
    dry_run: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LayoutArg {
    Auto,
    Legacy,
    Unified,
}

impl From<LayoutArg> for LayoutMode {
    fn from(arg: LayoutArg) -> Self {
        match arg {
            LayoutArg::Auto => LayoutMode::Auto,
            LayoutArg::Legacy => LayoutMode::Legacy,
            LayoutArg::Unified => LayoutMode::Unified,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create a group with the given controller
    Create { group: String, controller: String },

    /// Delete a group
    Delete { group: String, controller: String },

    /// Set a controller parameter
    Set {
        group: String,
        controller: String,
        param: String,
        value: u64,
    },

    /// Attach a process to a group
    ///
    /// Without --pid this attaches the rgroup process itself, which exits
    /// right away; pass --pid to move a long-running process.
    Attach {
        group: String,
        controller: String,

        /// Process to attach
        #[arg(short, long)]
        pid: Option<i32>,
    },

    /// Show a group's tasks and parameter values
    Show {
        group: String,
        controller: String,

        /// Parameters to read
        #[arg(short, long = "param")]
        params: Vec<String>,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Generate default configuration file
    GenerateConfig {
        /// Output path for config file
        #[arg(short, long, default_value = "config.toml")]
        output: PathBuf,
    },
}

#[derive(Serialize)]
struct GroupReport {
    group: String,
    controller: String,
    tasks: Vec<i32>,
    values: Vec<(String, String)>,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("{}", format!("❌ {:#}", e).red());
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    if let Commands::GenerateConfig { output } = &cli.command {
        return generate_config(output);
    }

    let config = load_config(&cli)?;
    let manager = if cli.dry_run {
        warn!("dry run: using in-memory facility");
        ResourceGroupManager::new(&config, Arc::new(MemoryFacility::new()))
    } else {
        ResourceGroupManager::from_config(&config)
    };

    match cli.command {
        Commands::Create { group, controller } => {
            report(manager.create_resource_group(&group, &controller)?)
        }
        Commands::Delete { group, controller } => {
            report(manager.delete_resource_group(&group, &controller)?)
        }
        Commands::Set {
            group,
            controller,
            param,
            value,
        } => report(manager.set_resource_value(&group, &controller, &param, value)?),
        Commands::Attach {
            group,
            controller,
            pid: Some(pid),
        } => report(manager.attach_resource_group_pid(&group, &controller, pid)?),
        Commands::Attach {
            group,
            controller,
            pid: None,
        } => report(manager.attach_resource_group(&group, &controller)?),
        Commands::Show {
            group,
            controller,
            params,
            json,
        } => show(&manager, group, controller, &params, json)?,
        Commands::GenerateConfig { .. } => unreachable!("handled before loading config"),
    }

    Ok(())
}

fn report(success: bool) {
    println!("{}", success);
}

fn show(
    manager: &ResourceGroupManager,
    group: String,
    controller: String,
    params: &[String],
    json: bool,
) -> Result<()> {
    let tasks = manager.resource_tasks(&group, &controller)?;
    let values = params
        .iter()
        .map(|param| -> Result<(String, String)> {
            let value = manager.resource_value(&group, &controller, param)?;
            Ok((param.clone(), value))
        })
        .collect::<Result<Vec<_>>>()?;

    let report = GroupReport {
        group: manager.qualified_name(&group)?,
        controller,
        tasks,
        values,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{}", format!("=== {} ({}) ===", report.group, report.controller).green().bold());
    println!("  Tasks:   {}", report.tasks.len());
    for pid in &report.tasks {
        println!("    {}", pid);
    }
    for (param, value) in &report.values {
        println!("  {}: {}", param.cyan(), value);
    }
    Ok(())
}

/// Load configuration from file or use defaults, then apply overrides
fn load_config(cli: &Cli) -> Result<ManagerConfig> {
    let config = if cli.config.exists() {
        debug!("Loading configuration from: {:?}", cli.config);
        ManagerConfig::load_from_file(&cli.config)
            .with_context(|| format!("Failed to load configuration file {:?}", cli.config))?
    } else {
        debug!("Configuration file not found: {:?}, using defaults", cli.config);
        ManagerConfig::default()
    };

    let mut config = config.with_env_overrides();
    if let Some(name) = &cli.cgroup_name {
        config.cgroup.cgroup_name = Some(name.clone());
    }
    if let Some(mount_root) = &cli.mount_root {
        config.cgroup.mount_root = mount_root.clone();
    }
    if let Some(layout) = cli.layout {
        config.cgroup.layout = layout.into();
    }

    config
        .validate()
        .context("Configuration validation failed")?;

    if config.root_name().is_none() {
        debug!(
            "cgroup_name is unset (set it in {:?}, {} or --cgroup-name)",
            cli.config, CGROUP_NAME_ENV
        );
    }

    Ok(config)
}

/// Generate default configuration file
fn generate_config(output: &Path) -> Result<()> {
    let config = ManagerConfig::default();
    config
        .save_to_file(output)
        .with_context(|| format!("Failed to save configuration file {:?}", output))?;

    info!("Configuration file generated: {:?}", output);
    println!("{}", format!("✅ Wrote {}", output.display()).green());
    Ok(())
}

/// Initialize logging to stderr
fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_level.into()),
        )
        .init();
}
