use anyhow::{Context, Result};
use clap::Parser;
use pcr_flatten::batch::{self, BatchReport};
use pcr_flatten::cli::{Cli, Command, CompareArgs, DetectionArgs, OutputFormat, RunArgs};
use pcr_flatten::comparison::ParameterComparator;
use pcr_flatten::csv_output::{CsvComparisonOutput, CsvOutput, CsvSeriesWriter};
use pcr_flatten::json_output::{JsonComparisonOutput, JsonOutput};
use pcr_flatten::records::RecordSet;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber for debug output
fn init_tracing(debug: bool) {
    if debug {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive(tracing::Level::DEBUG.into()),
            )
            .with_writer(std::io::stderr)
            .init();
    }
}

/// Report destination: `--output` file or stdout
fn open_output(run: &RunArgs) -> Result<Box<dyn Write>> {
    match &run.output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create output file {}", path.display()))?;
            Ok(Box::new(BufWriter::new(file)))
        }
        None => Ok(Box::new(BufWriter::new(io::stdout()))),
    }
}

fn load_records(run: &RunArgs) -> Result<RecordSet> {
    let records = RecordSet::from_path(&run.input)?;
    tracing::info!(records = records.len(), input = %run.input.display(), "record set loaded");
    Ok(records)
}

fn write_report(report: &BatchReport, run: &RunArgs, apply: bool) -> Result<()> {
    let mut out = open_output(run)?;

    match run.format {
        OutputFormat::Text => out.write_all(report.to_report_string().as_bytes())?,
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&JsonOutput::from_report(report))?;
            writeln!(out, "{}", json)?;
        }
        OutputFormat::Csv if apply => {
            let mut sink = CsvSeriesWriter::new(out);
            let written = batch::write_flattened(report, &mut sink, run.sink_batch_size)?;
            tracing::info!(records = written, "flattened series written");
            sink.finish()?;
            return Ok(());
        }
        OutputFormat::Csv => out.write_all(CsvOutput::from_report(report).to_csv().as_bytes())?,
    }

    out.flush()?;
    Ok(())
}

fn run_batch(detection: &DetectionArgs, run: &RunArgs, apply: bool) -> Result<()> {
    let config = detection.to_config()?;
    let records = load_records(run)?;
    let selection = run.selection();
    let batch_config = run.batch_config();

    let report = if apply {
        batch::run_flatten(&records, &selection, &config, &batch_config)?
    } else {
        batch::run_decisions(&records, &selection, &config, &batch_config)?
    };

    write_report(&report, run, apply)
}

fn run_compare(args: &CompareArgs) -> Result<()> {
    let (default, test) = args.configs()?;
    let comparator = ParameterComparator::new(default, test)?;
    let records = load_records(&args.run)?;

    let report = batch::run_compare(
        &records,
        &args.run.selection(),
        &comparator,
        args.only_failed.into(),
        &args.run.batch_config(),
    )?;

    let mut out = open_output(&args.run)?;
    match args.run.format {
        OutputFormat::Text => out.write_all(report.to_report_string().as_bytes())?,
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&JsonComparisonOutput::from_report(&report))?;
            writeln!(out, "{}", json)?;
        }
        OutputFormat::Csv => out.write_all(CsvComparisonOutput::new(&report).to_csv().as_bytes())?,
    }
    out.flush()?;

    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    match &cli.command {
        Command::Decide(args) => run_batch(&args.detection, &args.run, false),
        Command::Flatten(args) => run_batch(&args.detection, &args.run, true),
        Command::Compare(args) => run_compare(args),
    }
}
