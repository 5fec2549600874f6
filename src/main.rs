//! hwinspect - inspect host hardware from the command line
//!
//! Prints processor topology, caches, BIOS and network interfaces, either as a
//! human-readable report or as JSON for scripts.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use hwinspect::config::{Config, OutputFormat};
use hwinspect::{Inspector, PartialData};

/// hwinspect - read-only hardware inspection
#[derive(Parser)]
#[command(name = "hwinspect")]
#[command(version)]
#[command(about = "Inspect processor topology, caches, BIOS and network interfaces")]
struct Cli {
    /// Read pseudo-files below this directory instead of `/`
    #[arg(long, global = true, value_name = "DIR")]
    root: Option<PathBuf>,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Nodes, cores and caches
    Topology,

    /// Firmware vendor, version and date
    Bios,

    /// Network interfaces
    Net,

    /// Everything above (default)
    All,

    /// Show configuration info
    Config,
}

fn main() -> ExitCode {
    init_logging();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {:#}", "Error:".bright_red().bold(), err);
            ExitCode::FAILURE
        }
    }
}

/// Logs go to stderr so JSON on stdout stays parseable.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let mut cfg = Config::load()?;
    if cli.json {
        cfg.output.format = OutputFormat::Json;
    }
    if cli.no_color || !cfg.output.color {
        colored::control::set_override(false);
    }

    // --root wins over HWINSPECT_CHROOT and the config file
    let inspector = match cli.root {
        Some(root) => Inspector::with_root(root),
        None => Inspector::from_config(&cfg),
    };
    debug!("inspecting below {}", inspector.source().root().display());

    match cli.command.unwrap_or(Commands::All) {
        Commands::Topology => {
            let topology = inspector
                .topology()
                .context("Could not discover processor topology")?;
            emit(&cfg, &topology, || topology.display())?;
            print_annotations(&cfg, topology.annotations());
        }
        Commands::Bios => {
            let bios = inspector
                .bios()
                .context("Could not read BIOS information")?;
            emit(&cfg, &bios, || bios.display())?;
        }
        Commands::Net => {
            let network = inspector
                .network()
                .context("Could not read network interfaces")?;
            emit(&cfg, &network, || network.display())?;
        }
        Commands::All => {
            let host = inspector
                .host()
                .context("Could not discover processor topology")?;
            emit(&cfg, &host, || host.display())?;
            print_annotations(&cfg, host.topology.annotations());
        }
        Commands::Config => show_config_info(&cfg, &inspector)?,
    }

    Ok(())
}

fn emit<T: Serialize>(cfg: &Config, value: &T, text: impl FnOnce() -> String) -> Result<()> {
    match cfg.output.format {
        OutputFormat::Json => {
            let json =
                serde_json::to_string_pretty(value).context("Failed to serialize report")?;
            println!("{json}");
        }
        OutputFormat::Text => println!("{}", text()),
    }
    Ok(())
}

fn print_annotations(cfg: &Config, annotations: &[PartialData]) {
    if !cfg.warnings.enabled || annotations.is_empty() {
        return;
    }

    eprintln!(
        "\n{}",
        format!("{} record(s) were incomplete:", annotations.len()).bright_yellow()
    );
    for annotation in annotations {
        eprintln!("  {} {}", "•".bright_yellow(), annotation);
    }
}

fn show_config_info(cfg: &Config, inspector: &Inspector) -> Result<()> {
    println!("{}", "hwinspect Configuration\n".bright_cyan().bold());

    match Config::config_path() {
        Ok(path) => {
            println!(
                "{} {}",
                "Config file:".bright_yellow(),
                path.display().to_string().bright_white()
            );
            if path.exists() {
                println!("  {} {}", "Status:".bright_cyan(), "Exists".bright_green());
            } else {
                println!(
                    "  {} {}",
                    "Status:".bright_cyan(),
                    "Not created yet (will use defaults)".bright_yellow()
                );
            }
        }
        Err(e) => {
            println!(
                "{} Could not determine config path: {}",
                "Error:".bright_red(),
                e
            );
        }
    }

    if let Err(err) = Config::init() {
        println!(
            "  {} {}",
            "Note:".bright_yellow(),
            format!("Could not create config file yet: {err}").bright_black()
        );
    }

    println!("\n{}", "Source:".bright_white().bold());
    println!(
        "  {} {}",
        "Root:".bright_cyan(),
        inspector.source().root().display().to_string().bright_white()
    );

    println!("\n{}", "Output:".bright_white().bold());
    println!(
        "  {} {}",
        "Format:".bright_cyan(),
        match cfg.output.format {
            OutputFormat::Text => "text",
            OutputFormat::Json => "json",
        }
        .bright_white()
    );
    println!(
        "  {} {}",
        "Color:".bright_cyan(),
        if cfg.output.color {
            "true".bright_green()
        } else {
            "false".bright_yellow()
        }
    );
    println!(
        "  {} {}",
        "Warnings:".bright_cyan(),
        if cfg.warnings.enabled {
            "true".bright_green()
        } else {
            "false".bright_yellow()
        }
    );

    Ok(())
}
