// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! InfluxDB Relay CLI
//!
//! Reads JSON-lines events, turns them into points and writes the resulting
//! flush groups as Line Protocol.
//!
//! # Usage
//!
//! ```bash
//! # Dry run: events from stdin, Line Protocol to stdout
//! influx-relay run --config relay.toml < events.jsonl
//!
//! # Events from a file, output to a file, 500 events per batch
//! influx-relay run -c relay.toml -i events.jsonl -o points.lp --batch-size 500
//!
//! # Generate an example configuration
//! influx-relay gen-config --output relay.toml
//!
//! # Check a configuration file
//! influx-relay validate --config relay.toml
//! ```

use clap::{Parser, Subcommand};
use influx_relay::{Engine, Event, FlushReport, LineProtocolFactory, RelayConfig};
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Record-to-InfluxDB relay
#[derive(Parser, Debug)]
#[command(name = "influx-relay")]
#[command(about = "InfluxDB relay - record to point transformation and routing")]
#[command(version)]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Transform events and write Line Protocol
    Run {
        /// Configuration file path (defaults apply when omitted)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Input file of JSON lines (stdin when omitted)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Events per batch
        #[arg(long, default_value = "1000")]
        batch_size: usize,
    },

    /// Generate example configuration file
    GenConfig {
        /// Output file path
        #[arg(short, long, default_value = "relay.toml")]
        output: PathBuf,
    },

    /// Validate a configuration file
    Validate {
        /// Configuration file path
        #[arg(short, long)]
        config: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Logs go to stderr so they never mix with Line Protocol on stdout
    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    match args.command {
        Commands::Run {
            config,
            input,
            output,
            batch_size,
        } => cmd_run(config, input, output, batch_size),
        Commands::GenConfig { output } => cmd_gen_config(output),
        Commands::Validate { config } => cmd_validate(config),
    }
}

fn cmd_run(
    config_path: Option<PathBuf>,
    input: Option<PathBuf>,
    output: Option<PathBuf>,
    batch_size: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = match config_path {
        Some(path) => RelayConfig::from_file(path)?,
        None => {
            let config = RelayConfig::default();
            config.validate()?;
            config
        }
    };

    let reader: Box<dyn BufRead> = match input {
        Some(path) => Box::new(BufReader::new(File::open(path)?)),
        None => Box::new(BufReader::new(io::stdin())),
    };
    let writer: Box<dyn Write + Send> = match output {
        Some(path) => Box::new(File::create(path)?),
        None => Box::new(io::stdout()),
    };

    let mut engine = Engine::new(config, Box::new(LineProtocolFactory::new(writer)))?;
    let batch_size = batch_size.max(1);
    let mut batch = Vec::with_capacity(batch_size);
    let mut total = FlushReport::default();
    let mut malformed = 0usize;

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match Event::from_json_line(&line) {
            Ok(event) => batch.push(event),
            Err(e) => {
                tracing::warn!(line = line_no + 1, error = %e, "skipping malformed event");
                malformed += 1;
                continue;
            }
        }
        if batch.len() >= batch_size {
            accumulate(&mut total, engine.process(&batch)?);
            batch.clear();
        }
    }
    if !batch.is_empty() {
        accumulate(&mut total, engine.process(&batch)?);
    }

    tracing::info!(
        records = total.records,
        dropped = total.dropped,
        malformed,
        groups = total.groups,
        points = total.points_written,
        connections = engine.connections(),
        "relay finished"
    );
    Ok(())
}

fn accumulate(total: &mut FlushReport, report: FlushReport) {
    total.records += report.records;
    total.dropped += report.dropped;
    total.groups += report.groups;
    total.points_written += report.points_written;
}

fn cmd_gen_config(output: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let toml_str = toml::to_string_pretty(&RelayConfig::example())?;

    // Add comments
    let content = format!(
        r#"# InfluxDB Relay Configuration
# Generated by influx-relay gen-config
#
# host, port, dbname, user, password and measurement accept placeholders:
#   ${{tag}} ${{tag_parts[0]}} ${{tag_prefix[1]}} ${{tag_suffix[-1]}}
#   ${{hostname}} ${{time}} ${{<record field>}} __HOSTNAME__ __TAG_PARTS[0]__
# time_zone: IANA zone for record times without an offset, e.g. "Asia/Tokyo"
# on_write_error: "abort" (stop at the first failed group) or "continue"

{}
"#,
        toml_str
    );

    std::fs::write(&output, content)?;
    println!("Generated configuration file: {}", output.display());
    Ok(())
}

fn cmd_validate(config_path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    match RelayConfig::from_file(&config_path) {
        Ok(config) => {
            println!("Configuration valid!");
            println!();
            println!("Target:    {}:{} db={}", config.host, config.port, config.dbname);
            println!("Precision: {}", config.time_precision);
            if let Some(zone) = &config.time_zone {
                println!("Time zone: {}", zone);
            }
            if !config.tag_keys.is_empty() {
                println!("Tag keys:  {}", config.tag_keys.join(", "));
            } else if config.auto_tags {
                println!("Tag keys:  (string fields)");
            }
            if let Some(tag) = &config.sequence_tag {
                println!("Sequence:  {}", tag);
            }
            if let Some(key) = &config.retention_policy_key {
                println!(
                    "Retention: from '{}' (default {})",
                    key,
                    config.default_retention_policy.as_deref().unwrap_or("none")
                );
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("Configuration invalid: {}", e);
            std::process::exit(1);
        }
    }
}
