//! binform - Decode binary records from files
//!
//! This tool reads a binary file, lays a record described by `--field`
//! arguments over it and prints the decoded values.

mod chain;

use anyhow::{bail, Context, Result};
use binform_core::{display_record, ParseOptions, Record, Struct, TraceEvent};
use chain::FieldDef;
use clap::{Parser, ValueEnum};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, trace, Level};
use tracing_subscriber::EnvFilter;

/// Decode binary records from files using declarative field chains
#[derive(Parser, Debug)]
#[command(name = "binform")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Binary file to decode
    #[arg(short, long)]
    file: PathBuf,

    /// Field in layout order, as NAME=CHAIN (e.g. `count=u8`, `names=[count]:ptr:str`)
    #[arg(short = 'F', long = "field", value_name = "NAME=CHAIN", required = true)]
    fields: Vec<String>,

    /// Byte offset of the first record (decimal or 0x-prefixed hex)
    #[arg(short, long, default_value = "0", value_parser = parse_offset, env = "BINFORM_OFFSET")]
    offset: usize,

    /// Number of back-to-back records to decode
    #[arg(short = 'n', long, default_value = "1")]
    count: usize,

    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    format: OutputFormat,

    /// Print every decode step to stderr
    #[arg(long)]
    trace: bool,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Output format for decoded records
#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// One `{name: value, ...}` line per record
    Text,
    /// Pretty-printed JSON
    Json,
}

fn parse_offset(s: &str) -> std::result::Result<usize, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => usize::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid offset '{}': {}", s, e))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let output = run(&cli)?;
    println!("{}", output);
    Ok(())
}

/// Decode the requested records and render them
fn run(cli: &Cli) -> Result<String> {
    let layout = build_layout(&cli.fields, cli.trace)?;
    let data = read_input(&cli.file)?;

    let records = decode_records(&layout, &data, cli.offset, cli.count, cli.trace)?;
    info!("Decoded {} record(s) from {}", records.len(), cli.file.display());

    render(&records, cli.format)
}

/// Build a layout from `NAME=CHAIN` definitions
fn build_layout(fields: &[String], debug: bool) -> Result<Struct> {
    let mut layout = Struct::new();

    for field in fields {
        let def = FieldDef::parse(field).with_context(|| format!("Invalid field: {}", field))?;
        trace!("Adding field {}", def.name);
        def.apply(layout.add_member(def.name.as_str()), debug);
    }

    layout.validate().context("Invalid layout")?;
    Ok(layout)
}

fn read_input(file: &Path) -> Result<Vec<u8>> {
    if !file.is_file() {
        bail!("Input path is not a file: {}", file.display());
    }

    let data = fs::read(file)
        .with_context(|| format!("Failed to read input file: {}", file.display()))?;
    trace!("Read {} bytes from {}", data.len(), file.display());
    Ok(data)
}

/// Parse `count` records laid out back to back from `offset`
fn decode_records(
    layout: &Struct,
    data: &[u8],
    offset: usize,
    count: usize,
    trace_steps: bool,
) -> Result<Vec<Record>> {
    let print_step = |event: &TraceEvent<'_>| {
        eprintln!(
            "{:#06x} {:<12} {:<8} {}",
            event.offset, event.field, event.step, event.value
        );
    };

    let mut records = Vec::with_capacity(count.min(data.len().max(1)));
    let mut options = ParseOptions::new().start(offset).keep_cursor();
    if trace_steps {
        options = options.tracer(&print_step);
    }

    for i in 0..count {
        let start = layout.current_offset().max(offset);
        let record = layout
            .parse_with(data, options)
            .with_context(|| format!("Failed to decode record {} at offset {:#x}", i, start))?;
        debug!("Record {} ends at {:#x}", i, layout.current_offset());
        records.push(record);

        // later records continue from the cursor
        options.start = None;
    }

    layout.set_current_offset(0);
    Ok(records)
}

fn render(records: &[Record], format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Text => Ok(records
            .iter()
            .map(display_record)
            .collect::<Vec<_>>()
            .join("\n")),
        OutputFormat::Json => {
            let json = match records {
                [single] => serde_json::to_string_pretty(single),
                _ => serde_json::to_string_pretty(records),
            };
            json.context("Failed to serialize records")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn input(bytes: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(bytes).unwrap();
        file
    }

    fn cli(file: &Path, fields: &[&str]) -> Cli {
        Cli {
            file: file.to_path_buf(),
            fields: fields.iter().map(|f| f.to_string()).collect(),
            offset: 0,
            count: 1,
            format: OutputFormat::Text,
            trace: false,
            verbose: 0,
        }
    }

    #[test]
    fn test_run_dynamic_array() {
        let file = input(&[4, 40, 41, 42, 43]);
        let cli = cli(file.path(), &["count=u8", "values=[count]:u8"]);
        assert_eq!(run(&cli).unwrap(), "{count: 4, values: [40, 41, 42, 43]}");
    }

    #[test]
    fn test_run_json() {
        let file = input(&[8, 0, 0, 0, 0, 0, 0, 0, b'h', b'i', 0, 0]);
        let mut cli = cli(file.path(), &["name=ptr:str", "next=ptr"]);
        cli.format = OutputFormat::Json;

        let output = run(&cli).unwrap();
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value, serde_json::json!({ "name": "hi", "next": null }));
    }

    #[test]
    fn test_run_multiple_records() {
        let file = input(&[0xFF, 1, 0, 2, 0, 3, 0]);
        let mut cli = cli(file.path(), &["id=u16"]);
        cli.offset = 1;
        cli.count = 3;

        assert_eq!(run(&cli).unwrap(), "{id: 1}\n{id: 2}\n{id: 3}");
    }

    #[test]
    fn test_run_reports_truncated_input() {
        let file = input(&[1, 2]);
        let cli = cli(file.path(), &["value=u32"]);

        let err = run(&cli).unwrap_err();
        assert!(format!("{:#}", err).contains("record 0"));
    }

    #[test]
    fn test_run_huge_count_stops_at_end_of_input() {
        let file = input(&[1, 2]);
        let mut cli = cli(file.path(), &["a=u8"]);
        cli.count = usize::MAX;

        let err = run(&cli).unwrap_err();
        assert!(format!("{:#}", err).contains("record 2"));
    }

    #[test]
    fn test_build_layout_rejects_length_after_array() {
        let fields = vec!["values=[count]:u8".to_string(), "count=u8".to_string()];
        assert!(build_layout(&fields, false).is_err());
    }

    #[test]
    fn test_parse_offset() {
        assert_eq!(parse_offset("16"), Ok(16));
        assert_eq!(parse_offset("0x10"), Ok(16));
        assert!(parse_offset("zz").is_err());
    }

    #[test]
    fn test_missing_file() {
        let cli = cli(Path::new("/nonexistent/binform/input.bin"), &["a=u8"]);
        assert!(run(&cli).is_err());
    }

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
