// Licensed under the Apache-2.0 license

mod settings;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use clock_tree::{ClockDescriptor, ClockManager, FieldEdit, FirmwareEmitter};
use log::{info, LevelFilter};
use settings::Settings;
use simple_logger::SimpleLogger;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(
    name = "clocktool",
    author,
    version,
    about = "Inspect clock trees and generate clock register firmware"
)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct Common {
    /// Clock descriptor table (JSON list)
    #[arg(long, value_name = "FILE")]
    clocks: PathBuf,

    /// TOML file overriding the built-in configuration
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate the routine that prints the hardware clock registers as a dump
    GenDumper {
        #[command(flatten)]
        common: Common,
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
    /// Generate the routine that programs the clock state from a dump
    GenLoader {
        #[command(flatten)]
        common: Common,
        #[arg(long, value_name = "FILE")]
        dump: PathBuf,
        /// Register the loader must not write (repeatable)
        #[arg(long = "exclude", value_name = "REGISTER")]
        exclude: Vec<String>,
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
    /// Print clock rates
    Rate {
        #[command(flatten)]
        common: Common,
        #[arg(long, value_name = "FILE")]
        dump: PathBuf,
        /// Field override applied after the dump (repeatable)
        #[arg(long = "set", value_name = "CLOCK[.CHILD].FIELD=VALUE")]
        set: Vec<FieldEdit>,
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Print clock summaries as JSON
    Show {
        #[command(flatten)]
        common: Common,
        #[arg(long, value_name = "FILE")]
        dump: Option<PathBuf>,
        /// Clocks to show; all when omitted
        names: Vec<String>,
    },
    /// Restore a dump and save it again
    Normalize {
        #[command(flatten)]
        common: Common,
        #[arg(long, value_name = "FILE")]
        dump: PathBuf,
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    SimpleLogger::new()
        .with_level(log_level(cli.verbose))
        .init()?;
    let text = run(&cli.command)?;
    print!("{text}");
    Ok(())
}

fn log_level(verbose: u8) -> LevelFilter {
    match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

/// Runs a subcommand and returns what should go to stdout.
fn run(command: &Command) -> Result<String> {
    match command {
        Command::GenDumper { common, output } => {
            let (manager, settings) = load(common, None)?;
            let source =
                FirmwareEmitter::new(&manager, settings.emit_config(&[])).generate_dumper();
            emit(output.as_deref(), source)
        }
        Command::GenLoader {
            common,
            dump,
            exclude,
            output,
        } => {
            let (manager, settings) = load(common, Some(dump.as_path()))?;
            let source = FirmwareEmitter::new(&manager, settings.emit_config(exclude))
                .generate_loader()
                .context("failed to generate loader")?;
            emit(output.as_deref(), source)
        }
        Command::Rate {
            common,
            dump,
            set,
            names,
        } => {
            let (mut manager, _) = load(common, Some(dump.as_path()))?;
            manager
                .apply_edits(set)
                .context("failed to apply field overrides")?;
            let mut out = String::new();
            for name in names {
                let line = match manager.frequency_by_name(name) {
                    Ok(Some(hz)) => format!("{name}: {hz} Hz"),
                    Ok(None) => format!("{name}: off"),
                    Err(err) if err.is_recoverable() => format!("{name}: unknown ({err})"),
                    Err(err) => return Err(err).context(format!("failed to evaluate {name}")),
                };
                out.push_str(&line);
                out.push('\n');
            }
            Ok(out)
        }
        Command::Show {
            common,
            dump,
            names,
        } => {
            let (manager, _) = load(common, dump.as_deref())?;
            let summaries = if names.is_empty() {
                manager.summaries()
            } else {
                let mut summaries = Vec::new();
                for name in names {
                    let Some(clock) = manager.clock_by_name(name) else {
                        bail!("unknown clock {name}");
                    };
                    summaries.extend(manager.summary(clock.id));
                }
                summaries
            };
            Ok(serde_json::to_string_pretty(&summaries)? + "\n")
        }
        Command::Normalize {
            common,
            dump,
            output,
        } => {
            let (manager, _) = load(common, Some(dump.as_path()))?;
            emit(output.as_deref(), manager.save_dump())
        }
    }
}

/// Builds the graph from the descriptor table and restores `dump` into it.
fn load(common: &Common, dump: Option<&Path>) -> Result<(ClockManager, Settings)> {
    let settings = Settings::load(common.config.as_deref())?;

    let text = fs::read_to_string(&common.clocks)
        .with_context(|| format!("failed to read clock table {}", common.clocks.display()))?;
    let descriptors: Vec<ClockDescriptor> = serde_json::from_str(&text)
        .with_context(|| format!("invalid clock table {}", common.clocks.display()))?;
    info!("loaded {} clock descriptors", descriptors.len());

    let mut manager = ClockManager::build(&descriptors, settings.manager_config())
        .context("failed to build clock graph")?;
    for id in manager.unknown_rate_anchors() {
        info!("anchor clock {id} has no known rate");
    }

    if let Some(dump) = dump {
        let text = fs::read_to_string(dump)
            .with_context(|| format!("failed to read dump {}", dump.display()))?;
        manager
            .load_dump(&text)
            .with_context(|| format!("failed to restore dump {}", dump.display()))?;
        info!("restored dump {}", dump.display());
    }
    Ok((manager, settings))
}

/// Writes `text` to `output`, or hands it back for stdout.
fn emit(output: Option<&Path>, text: String) -> Result<String> {
    match output {
        Some(path) => {
            fs::write(path, &text)
                .with_context(|| format!("failed to write {}", path.display()))?;
            info!("output written to {}", path.display());
            Ok(String::new())
        }
        None => Ok(text),
    }
}
