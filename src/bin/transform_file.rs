use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use clap::Parser;
use csvrefresh::process::{
    timestamp::{Clock, FixedClock, SystemClock, TIMESTAMP_FORMAT},
    transform_csv,
};
use std::{
    fs::File,
    io::{self, BufWriter, Write},
    path::PathBuf,
};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

/// Run the CSV normalization on a local file.
#[derive(Parser, Debug)]
struct Args {
    /// CSV file to transform
    input: PathBuf,

    /// Where to write the result (stdout when omitted)
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Pin `processed_timestamp` to this value, e.g. "2025-06-14 12:00:00"
    #[arg(long)]
    at: Option<String>,
}

fn main() -> Result<()> {
    fmt::Subscriber::builder()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    let clock: Box<dyn Clock> = match &args.at {
        Some(at) => Box::new(FixedClock(
            NaiveDateTime::parse_from_str(at, TIMESTAMP_FORMAT)
                .with_context(|| format!("--at must look like YYYY-MM-DD HH:MM:SS, got {:?}", at))?,
        )),
        None => Box::new(SystemClock),
    };

    let input = std::fs::read(&args.input)
        .with_context(|| format!("reading {}", args.input.display()))?;

    let sink: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("creating {}", path.display()))?,
        )),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };

    let stats = transform_csv(&input, sink, clock.as_ref())
        .with_context(|| format!("transforming {}", args.input.display()))?;

    info!(
        rows = stats.rows,
        bytes_in = stats.bytes_in,
        bytes_out = stats.bytes_out,
        "done"
    );
    Ok(())
}
