//! Geosense command-line binary.
//!
//! Stores sensor readings and answers bounded queries against the configured
//! measurement store.
//!
//! # Configuration
//!
//! Configuration can be provided through multiple sources, in order of precedence:
//!
//! 1. Command-line arguments (highest precedence)
//! 2. Environment variables (prefixed with `GEOSENSE_`, e.g. `GEOSENSE_ENGINE__CONNECTION`)
//! 3. User-specified configuration file (via `--config`)
//! 4. System-wide configuration (`/etc/geosense/config.toml`)
//! 5. Default configuration (embedded in binary)
//!
//! A `.env` file in the working directory is loaded first.
//!
//! ## Configuration File Format (TOML)
//!
//! ```toml
//! [engine]
//! engine = "duckdb"
//! connection = "data/measurements.db"   # or ":memory:"
//! options = { threads = "4" }
//!
//! [log]
//! filter = "info"                       # RUST_LOG takes precedence
//! ```
//!
//! # Examples
//!
//! ```bash
//! # Store one reading, a series or an item batch
//! echo '{"key":"Demo Buoy Station","measurement_name":"Temperature","unit":"C","value":21}' \
//!   | geosense ingest
//!
//! # Store every payload of a JSON array file
//! geosense ingest readings.json
//!
//! # Readings inside a box, as GeoJSON
//! geosense query --min-lat 30 --max-lat 35 --min-lon -100 --max-lon -90 --format geojson
//!
//! # Latest position of every station
//! geosense stations
//! ```

use clap::{Parser, Subcommand, ValueEnum};
use dotenv::dotenv;
use futures::{Stream, StreamExt, TryStreamExt};
use geosense::{BoundedQueryParams, ConfigArgs, FeatureCollection, SensorHub, Settings};
use serde::Serialize;
use serde_json::Value;
use std::error::Error;
use std::fs;
use std::io::{self, BufWriter, Read, Write};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "geosense", version, about = "Geolocated sensor measurement store")]
struct Cli {
    #[command(flatten)]
    config: ConfigArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Store one JSON payload, or a JSON array of payloads as one batch
    Ingest {
        /// Input file, "-" for stdin
        #[arg(default_value = "-")]
        input: String,
    },
    /// Print the readings matching the given bounds
    Query {
        #[command(flatten)]
        params: BoundedQueryParams,

        #[arg(long, value_enum, default_value_t = Format::Json)]
        format: Format,
    },
    /// Print the latest known position of every station
    Stations {
        #[arg(long, value_enum, default_value_t = Format::Json)]
        format: Format,
    },
    /// Delete every stored reading
    Reset,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Format {
    Json,
    Geojson,
}

fn read_input(input: &str) -> io::Result<Vec<u8>> {
    if input == "-" {
        let mut body = Vec::new();
        io::stdin().read_to_end(&mut body)?;
        Ok(body)
    } else {
        fs::read(input)
    }
}

/// Writes a JSON array element by element as the stream yields.
async fn write_json_array<S, T, E>(mut items: S, out: &mut impl Write) -> Result<(), Box<dyn Error>>
where
    S: Stream<Item = Result<T, E>> + Unpin,
    T: Serialize,
    E: Error + 'static,
{
    out.write_all(b"[")?;
    let mut first = true;
    while let Some(item) = items.next().await {
        if !first {
            out.write_all(b",")?;
        }
        first = false;
        serde_json::to_writer(&mut *out, &item?)?;
    }
    out.write_all(b"]\n")?;
    Ok(())
}

async fn ingest(hub: &SensorHub, input: &str) -> Result<usize, Box<dyn Error>> {
    let body = read_input(input)?;
    let stored = match serde_json::from_slice::<Value>(&body) {
        Ok(Value::Array(payloads)) => hub.ingest_many(payloads).await?,
        _ => hub.ingest_json(&body).await?,
    };
    Ok(stored)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv().ok();
    let cli = Cli::parse();

    // Load settings from config files, environment and CLI args
    let settings = Settings::new(&cli.config)?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.log.filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let hub = SensorHub::from_settings(&settings).await?;
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());

    match cli.command {
        Command::Ingest { input } => {
            let stored = ingest(&hub, &input).await?;
            info!(stored, "ingestion complete");
            serde_json::to_writer(&mut out, &serde_json::json!({ "stored": stored }))?;
            writeln!(out)?;
        }
        Command::Query { params, format } => {
            let readings = hub.query(params).await?;
            match format {
                Format::Json => write_json_array(readings, &mut out).await?,
                Format::Geojson => {
                    let readings: Vec<_> = readings.try_collect().await?;
                    serde_json::to_writer(&mut out, &FeatureCollection::from_measurements(&readings))?;
                    writeln!(out)?;
                }
            }
        }
        Command::Stations { format } => {
            let stations = hub.stations().await?;
            match format {
                Format::Json => write_json_array(stations, &mut out).await?,
                Format::Geojson => {
                    let stations: Vec<_> = stations.try_collect().await?;
                    serde_json::to_writer(&mut out, &FeatureCollection::from_stations(&stations))?;
                    writeln!(out)?;
                }
            }
        }
        Command::Reset => {
            hub.reset().await?;
        }
    }

    out.flush()?;
    Ok(())
}
