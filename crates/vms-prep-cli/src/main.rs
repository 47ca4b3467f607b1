// SPDX-License-Identifier: MIT
// Copyright (c) 2026 StarTuz

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Args, Parser, Subcommand};
use log::{info, LevelFilter};
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use vms_prep_core::config::{
    default_data_dir, Settings, AIRPORTDB_URL, COMMUNITY_AIRPORT_URL,
};
use vms_prep_core::coords::sources::BULK_DATABASE_URL;
use vms_prep_core::distance::AIRPORT_GAP_DISTANCE_URL;
use vms_prep_core::schedule::{
    parse_pair_file, read_records, write_records, RunLayout, ScheduleGenerator, DEFAULT_AIRLINE,
    START_FLIGHT_NUMBER,
};
use vms_prep_core::subfleet::{assign_subfleets, FleetTable};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase log output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Directory holding the distance cache, missing-airport log, override
    /// table and bulk airport snapshot
    #[arg(long, env = "VMS_PREP_DATA_DIR", global = true)]
    data_dir: Option<PathBuf>,

    #[command(flatten)]
    services: Services,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Services {
    #[arg(long, env = "AIRPORT_GAP_TOKEN", hide_env_values = true, global = true)]
    airport_gap_token: Option<String>,

    #[arg(
        long,
        env = "AIRPORT_GAP_DISTANCE_URL",
        default_value = AIRPORT_GAP_DISTANCE_URL,
        global = true
    )]
    distance_url: String,

    /// Airport lookup URL; `{code}` is replaced by the ICAO code
    #[arg(
        long,
        env = "COMMUNITY_AIRPORT_API_URL",
        default_value = COMMUNITY_AIRPORT_URL,
        global = true
    )]
    community_url: String,

    /// Base URL of the phpVMS installation
    #[arg(long, env = "PHPVMS_API_URL", global = true)]
    phpvms_url: Option<String>,

    #[arg(long, env = "PHPVMS_API_KEY", hide_env_values = true, global = true)]
    phpvms_api_key: Option<String>,

    #[arg(long, env = "AIRPORTDB_API_URL", default_value = AIRPORTDB_URL, global = true)]
    airportdb_url: String,

    #[arg(long, env = "AIRPORTDB_API_TOKEN", hide_env_values = true, global = true)]
    airportdb_token: Option<String>,

    #[arg(long, env = "BULK_AIRPORTS_URL", default_value = BULK_DATABASE_URL, global = true)]
    bulk_url: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a phpVMS flights CSV from <BASE>_<ROUTE>/airports.txt
    Generate {
        base: String,
        route: String,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
        #[arg(long, default_value_t = START_FLIGHT_NUMBER)]
        start: u32,
        #[arg(long, default_value = DEFAULT_AIRLINE)]
        airline: String,
        /// Directory containing the <BASE>_<ROUTE> folders
        #[arg(long, default_value = ".")]
        workdir: PathBuf,
    },
    /// Fill the subfleets column of an existing flights CSV
    Subfleets {
        csv: PathBuf,
        #[arg(long)]
        base: String,
        #[arg(long)]
        route: String,
        #[arg(long, default_value = ".")]
        workdir: PathBuf,
    },
    /// Print the distance between two airports in nautical miles
    Distance {
        from: String,
        to: String,
        #[arg(long)]
        from_short: Option<String>,
        #[arg(long)]
        to_short: Option<String>,
    },
    /// Resolve an airport's coordinates through the source chain
    Resolve { code: String },
}

impl Cli {
    fn settings(&self) -> Settings {
        let s = &self.services;
        Settings {
            data_dir: self.data_dir.clone().unwrap_or_else(default_data_dir),
            distance_url: s.distance_url.clone(),
            airport_gap_token: s.airport_gap_token.clone(),
            community_url: s.community_url.clone(),
            phpvms_url: s.phpvms_url.clone(),
            phpvms_api_key: s.phpvms_api_key.clone(),
            airportdb_url: s.airportdb_url.clone(),
            airportdb_token: s.airportdb_token.clone(),
            bulk_database_url: s.bulk_url.clone(),
            ..Settings::default()
        }
    }
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{} [y/N] ", prompt);
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

fn export_subfleets(input: &Path, output: &Path) -> Result<()> {
    let mut records = read_records(input)
        .with_context(|| format!("Failed to read flights from {}", input.display()))?;
    let report = assign_subfleets(&mut records, &FleetTable::crn());
    write_records(output, &records)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    if !report.removed.is_empty() {
        println!(
            "Removed {} flights with fewer than three digits in the flight number",
            report.removed.len()
        );
    }
    println!("Updated CSV saved as {}", output.display());
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    TermLogger::init(level, Config::default(), TerminalMode::Mixed, ColorChoice::Auto)?;

    let settings = cli.settings();
    info!("Data directory: {}", settings.data_dir().display());

    match &cli.command {
        Commands::Generate {
            base,
            route,
            yes,
            start,
            airline,
            workdir,
        } => {
            let layout = RunLayout::new(workdir, base, route, Local::now());
            let pair_file = layout.pair_file();
            let pairs = parse_pair_file(&pair_file)
                .with_context(|| format!("Failed to read pairs from {}", pair_file.display()))?;

            println!(
                "{} airport pairs in {} -> {} schedule rows starting at {}{}",
                pairs.len(),
                pair_file.display(),
                pairs.len() * 4,
                airline,
                start
            );
            if !yes && !confirm("Generate schedules?")? {
                println!("Aborted.");
                return Ok(());
            }

            let mut provider = settings.build_provider()?;
            let mut generator =
                ScheduleGenerator::new(airline, route, *start, rand::thread_rng());
            let records = generator.generate(&pairs, |pair| {
                provider.distance(
                    &pair.origin.icao,
                    &pair.destination.icao,
                    pair.origin.iata.as_deref(),
                    pair.destination.iata.as_deref(),
                )
            })?;

            let generated = layout.generated_csv();
            write_records(&generated, &records)
                .with_context(|| format!("Failed to write {}", generated.display()))?;
            println!("Wrote {} flights to {}", records.len(), generated.display());

            export_subfleets(&generated, &layout.exported_csv())?;
        }
        Commands::Subfleets {
            csv,
            base,
            route,
            workdir,
        } => {
            let file_name = csv
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| anyhow::anyhow!("Not a CSV file path: {}", csv.display()))?;
            let layout = RunLayout::new(workdir, base, route, Local::now());
            export_subfleets(csv, &layout.exported_path(file_name))?;
        }
        Commands::Distance {
            from,
            to,
            from_short,
            to_short,
        } => {
            let mut provider = settings.build_provider()?;
            let nm = provider.distance(from, to, from_short.as_deref(), to_short.as_deref())?;
            println!("{} - {}: {} nm", from.to_uppercase(), to.to_uppercase(), nm);
        }
        Commands::Resolve { code } => {
            let mut resolver = settings.build_resolver()?;
            let coord = resolver.resolve(code)?;
            println!("{} {:.6} {:.6}", coord.code, coord.latitude, coord.longitude);
        }
    }

    Ok(())
}
