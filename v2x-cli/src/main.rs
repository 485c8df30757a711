//! v2x: classify V2X datagrams and track vehicles from decoded documents.

use std::io::{self, BufRead};
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use comfy_table::{Cell, Table};
use log::LevelFilter;

use v2x_core::classify::{classify, locate_frame};
use v2x_core::config::{self, Config};
use v2x_core::tracker::{TrackEvent, Tracker};
use v2x_core::types::*;

mod reference;

use reference::ReferencePoints;

#[derive(Parser)]
#[command(name = "v2x", version, about = "V2X MAP/SPaT/BSM classifier and vehicle tracker")]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify hex datagrams (one per line) by message type
    Classify {
        /// Path to file containing datagrams, or - for stdin
        file: PathBuf,

        /// Print the type of every datagram, not just totals
        #[arg(short, long)]
        raw: bool,
    },

    /// Track vehicles from decoded JSON documents (one per line)
    Track {
        /// Path to file containing documents, or - for stdin
        file: PathBuf,

        /// Intersection reference point as ID:LAT:LON (repeatable)
        #[arg(long = "map-ref", env = "V2X_MAP_REFS", value_delimiter = ',')]
        map_refs: Vec<String>,

        /// Override the vehicle timeout in seconds
        #[arg(long, value_parser = positive_seconds)]
        vehicle_timeout: Option<f64>,

        /// Don't print enriched BSMs, only the final table
        #[arg(short, long)]
        summary: bool,
    },

    /// Show the effective configuration
    Config {
        /// Write the default configuration to ~/.v2x-tracker/config.yaml
        #[arg(long)]
        init: bool,
    },
}

/// Parse a duration in seconds that must be greater than zero.
fn positive_seconds(s: &str) -> std::result::Result<f64, String> {
    let secs: f64 = s.parse().map_err(|_| format!("{s:?} is not a number"))?;
    if secs.is_finite() && secs > 0.0 {
        Ok(secs)
    } else {
        Err(format!("{s} must be a positive number of seconds"))
    }
}

fn main() {
    let cli = Cli::parse();
    let config = config::load_config();
    init_logging(cli.verbose, cli.quiet, &config.logging.level);

    match cli.command {
        Commands::Classify { file, raw } => cmd_classify(file, raw),
        Commands::Track {
            file,
            map_refs,
            vehicle_timeout,
            summary,
        } => cmd_track(file, &map_refs, vehicle_timeout, summary, &config),
        Commands::Config { init } => cmd_config(init, &config),
    }
}

/// Log level from flags, falling back to the configured level.
fn init_logging(verbose: u8, quiet: bool, configured: &str) {
    use std::io::Write;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => configured.parse().unwrap_or(LevelFilter::Info),
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}

fn open_input(file: &Path) -> Box<dyn BufRead> {
    if file.to_str() == Some("-") {
        Box::new(io::stdin().lock())
    } else {
        let f = std::fs::File::open(file).unwrap_or_else(|e| {
            log::error!("cannot open {}: {e}", file.display());
            std::process::exit(1);
        });
        Box::new(io::BufReader::new(f))
    }
}

fn cmd_classify(file: PathBuf, raw: bool) {
    let reader = open_input(&file);
    let mut counts = [0u64; 4];

    for line in reader.lines() {
        let line = match line {
            Ok(l) => l,
            Err(_) => continue,
        };
        if line.trim().is_empty() || line.starts_with('#') {
            continue;
        }

        let kind = locate_frame(&line).map_or(MsgKind::Unknown, classify);
        let slot = match kind {
            MsgKind::Map => 0,
            MsgKind::Spat => 1,
            MsgKind::Bsm => 2,
            MsgKind::Unknown => 3,
        };
        counts[slot] += 1;

        if raw {
            println!("{:<8} {}", kind.to_string(), line.trim());
        }
    }

    let total: u64 = counts.iter().sum();
    println!();
    println!("Datagrams: {total}");
    println!();

    let mut table = Table::new();
    table.set_header(vec!["Type", "Tag", "Count"]);
    for (kind, count) in [MsgKind::Map, MsgKind::Spat, MsgKind::Bsm, MsgKind::Unknown]
        .iter()
        .zip(counts)
    {
        table.add_row(vec![
            Cell::new(kind),
            Cell::new(kind.tag().unwrap_or("-")),
            Cell::new(count),
        ]);
    }
    println!("{table}");
}

fn cmd_track(
    file: PathBuf,
    map_refs: &[String],
    vehicle_timeout: Option<f64>,
    summary: bool,
    config: &Config,
) {
    let geometry = ReferencePoints::parse(map_refs).unwrap_or_else(|e| {
        log::error!("{e}");
        std::process::exit(2);
    });
    log::debug!("{} intersection reference points", geometry.len());

    let mut tracker_config = config.tracker.clone();
    if let Some(t) = vehicle_timeout {
        tracker_config.vehicle_timeout = t;
    }
    let mut tracker = Tracker::new(&tracker_config);

    let reader = open_input(&file);
    let mut timestamp = 0.0f64;
    let mut rejected = 0u64;
    let mut evicted = 0u64;

    for line in reader.lines() {
        let line = match line {
            Ok(l) => l,
            Err(_) => continue,
        };
        let json = line.trim();
        if json.is_empty() || json.starts_with('#') {
            continue;
        }

        let msg = match Message::from_json(json) {
            Ok(m) => m,
            Err(e) => {
                log::warn!("skipping line: {e}");
                rejected += 1;
                continue;
            }
        };

        // MAP documents carry no timestamp; advance from the last one seen
        timestamp = msg.timestamp_posix().unwrap_or(timestamp + 0.1);

        match tracker.update(&msg, &geometry, timestamp) {
            Ok((enriched, events)) => {
                evicted += events
                    .iter()
                    .filter(|e| matches!(e, TrackEvent::VehicleEvicted { .. }))
                    .count() as u64;
                if let (Some(doc), false) = (enriched, summary) {
                    println!("{doc}");
                }
            }
            Err(e) => {
                log::warn!("tracking failed: {e}");
                rejected += 1;
            }
        }
    }

    eprintln!();
    eprintln!("Track complete: {}", file.display());
    eprintln!(
        "  Messages: {} total ({} MAP, {} SPaT, {} BSM), {} rejected",
        tracker.total_messages,
        tracker.map_messages,
        tracker.spat_messages,
        tracker.bsm_messages,
        rejected
    );
    eprintln!(
        "  Vehicles: {} tracked, {} evicted, {} maps cached",
        tracker.registry.len(),
        evicted,
        tracker.maps.known_maps()
    );

    let active = tracker.get_active();
    if active.is_empty() {
        return;
    }

    let mut table = Table::new();
    table.set_header(vec![
        "ID", "Type", "Lat", "Lon", "Elev (m)", "Age (s)", "Maps", "Intersection", "Lane",
        "Approach", "Group", "Signal",
    ]);

    for v in &active {
        table.add_row(vec![
            Cell::new(v.id),
            Cell::new(&v.vehicle_type),
            Cell::new(format!("{:.7}", v.lat)),
            Cell::new(format!("{:.7}", v.lon)),
            Cell::new(format!("{:.1}", v.elevation)),
            Cell::new(format!("{:.1}", v.age(timestamp))),
            Cell::new(v.maps.len()),
            Cell::new(
                v.intersection_id
                    .map(|id| id.to_string())
                    .unwrap_or("-".into()),
            ),
            Cell::new(v.lane_id),
            Cell::new(v.approach_id),
            Cell::new(v.signal_group),
            Cell::new(
                v.signal_status
                    .map(|s| s.movement_state())
                    .unwrap_or("-"),
            ),
        ]);
    }

    eprintln!();
    eprintln!("{table}");
}

fn cmd_config(init: bool, config: &Config) {
    if init {
        match config::save_config(&Config::default()) {
            Ok(path) => println!("Wrote {}", path.display()),
            Err(e) => {
                log::error!("{e}");
                std::process::exit(1);
            }
        }
        return;
    }

    println!("# {}", config::config_file().display());
    print!("{}", config::serialize_config(config));
}
