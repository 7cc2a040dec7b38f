// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Kerf Contributors.

//! Kerf CLI

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use kerf::collision::CollisionConfig;
use kerf::{
    parse, Dialect, MachineConfig, Severity, SimReport, Simulator, StockConfig, ToolTable,
    WcsTable,
};
use std::path::Path;

#[derive(Parser)]
#[command(name = "kerf")]
#[command(about = "CNC digital-twin simulator - parse, resolve and verify NC programs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Input NC program
    #[arg(value_name = "FILE")]
    input: Option<String>,

    /// Dialect: fanuc, siemens, heidenhain (default: by file extension, else fanuc)
    #[arg(short, long)]
    dialect: Option<String>,

    /// Machine configuration JSON
    #[arg(short, long, value_name = "FILE")]
    machine: Option<String>,

    /// Tool table JSON
    #[arg(short, long, value_name = "FILE")]
    tools: Option<String>,

    /// Honor block-skip (/) lines
    #[arg(long)]
    block_skip: bool,

    /// Emit the full report as JSON instead of a summary
    #[arg(long)]
    json: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Simulate an NC program and report removal, timing and collisions
    Simulate {
        /// Input NC program
        input: String,

        /// Dialect name
        #[arg(short, long)]
        dialect: Option<String>,

        /// Machine configuration JSON
        #[arg(short, long)]
        machine: Option<String>,

        /// Tool table JSON
        #[arg(short, long)]
        tools: Option<String>,

        /// Honor block-skip (/) lines
        #[arg(long)]
        block_skip: bool,

        /// Emit the full report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Parse and resolve only, printing the motion program as JSON
    Parse {
        /// Input NC program
        input: String,

        /// Dialect name
        #[arg(short, long)]
        dialect: Option<String>,

        /// Output JSON file (stdout when omitted)
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Show version information
    Version,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Some(Commands::Simulate {
            input,
            dialect,
            machine,
            tools,
            block_skip,
            json,
        }) => simulate_command(
            input,
            dialect.as_deref(),
            machine.as_deref(),
            tools.as_deref(),
            *block_skip,
            *json,
            cli.verbose,
        ),
        Some(Commands::Parse {
            input,
            dialect,
            output,
        }) => parse_command(input, dialect.as_deref(), output.as_deref()),
        Some(Commands::Version) => {
            println!("kerf v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        None => {
            if let Some(input) = &cli.input {
                simulate_command(
                    input,
                    cli.dialect.as_deref(),
                    cli.machine.as_deref(),
                    cli.tools.as_deref(),
                    cli.block_skip,
                    cli.json,
                    cli.verbose,
                )
            } else {
                eprintln!("Error: input program required");
                eprintln!("Usage: kerf <FILE> [--dialect fanuc]");
                std::process::exit(1);
            }
        }
    }
}

fn pick_dialect(name: Option<&str>, input: &Path) -> Result<Dialect> {
    match name {
        Some("fanuc") => Ok(Dialect::fanuc()),
        Some("siemens") => Ok(Dialect::siemens()),
        Some("heidenhain") => Ok(Dialect::heidenhain()),
        Some(other) => anyhow::bail!(
            "unknown dialect '{other}' (expected fanuc, siemens or heidenhain)"
        ),
        None => Ok(Dialect::suggest_from_extension(input).unwrap_or_else(Dialect::fanuc)),
    }
}

fn simulate_command(
    input: &str,
    dialect: Option<&str>,
    machine: Option<&str>,
    tools: Option<&str>,
    block_skip: bool,
    json: bool,
    verbose: bool,
) -> Result<()> {
    let path = Path::new(input);
    if !path.exists() {
        eprintln!("Error: input file not found: {input}");
        std::process::exit(1);
    }

    let dialect = pick_dialect(dialect, path)?;
    let machine = match machine {
        Some(p) => MachineConfig::from_json_file(Path::new(p))?,
        None => MachineConfig::default_3axis(),
    };
    let tools = match tools {
        Some(p) => ToolTable::from_json_file(Path::new(p))?,
        None => ToolTable::default(),
    };

    let source = std::fs::read_to_string(path)?;
    let start = std::time::Instant::now();
    let (motion, diags) = parse::load(&source, &dialect, &WcsTable::default(), block_skip);
    if verbose {
        println!("Resolved {} moves in {:.2?}", motion.len(), start.elapsed());
    }

    let mut simulator = Simulator::new(
        machine,
        tools,
        StockConfig::default(),
        CollisionConfig::default(),
    );
    let sim_start = std::time::Instant::now();
    let report = simulator.run(&motion, diags);
    if verbose {
        println!("Simulated in {:.2?}", sim_start.elapsed());
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(input, &report);
    }

    let critical = report.metrics.critical_events;
    if critical > 0 {
        std::process::exit(2);
    }
    Ok(())
}

fn print_summary(input: &str, report: &SimReport) {
    println!("{}", "═".repeat(72).bright_black());
    println!("{} {}", "Simulation Summary".bold(), input.cyan());
    println!("{}", "═".repeat(72).bright_black());
    let m = &report.metrics;
    println!("  {} {}", "Moves:".bright_black(), m.moves.to_string().cyan());
    println!(
        "  {} {:.1} mm³ of {:.1} mm³ ({:.1}%)",
        "Removed:".bright_black(),
        m.removed_volume,
        m.total_volume,
        m.removal_percent
    );
    println!(
        "  {} {} cutting, {} rapid",
        "Time:".bright_black(),
        format!("{:.1}s", m.cut_time_s).cyan(),
        format!("{:.1}s", m.rapid_time_s).cyan()
    );
    println!(
        "  {} {}",
        "Air moves:".bright_black(),
        m.air_moves.to_string().yellow()
    );

    let critical: Vec<_> = report
        .events
        .iter()
        .filter(|e| e.severity == Severity::Critical)
        .collect();
    if critical.is_empty() {
        println!("  {} {}", "Collisions:".bright_black(), "none critical".green());
    } else {
        println!(
            "  {} {}",
            "Collisions:".bright_black(),
            format!("{} critical", critical.len()).red().bold()
        );
        for event in critical {
            println!(
                "    {} block {}: {:?} {} <-> {} (depth {:.2} mm)",
                "✗".red(),
                event.block,
                event.kind,
                event.pair.0,
                event.pair.1,
                event.depth
            );
        }
    }

    if !report.diagnostics.is_empty() {
        println!(
            "  {} {}",
            "Diagnostics:".bright_black(),
            report.diagnostics.len().to_string().yellow()
        );
        for diag in report.diagnostics.entries() {
            println!("    {} {}", "!".yellow(), diag);
        }
    }
    println!("{}", "═".repeat(72).bright_black());
}

fn parse_command(input: &str, dialect: Option<&str>, output: Option<&str>) -> Result<()> {
    let path = Path::new(input);
    if !path.exists() {
        eprintln!("Error: input file not found: {input}");
        std::process::exit(1);
    }
    let dialect = pick_dialect(dialect, path)?;
    let source = std::fs::read_to_string(path)?;
    let (motion, diags) = parse::load(&source, &dialect, &WcsTable::default(), false);

    for diag in diags.entries() {
        eprintln!("{} {}", "!".yellow(), diag);
    }

    let json = serde_json::to_string_pretty(&motion)?;
    if let Some(out) = output {
        std::fs::write(out, json)?;
    } else {
        println!("{json}");
    }
    Ok(())
}
