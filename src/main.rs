// src/main.rs
//! Proximity Alarm - wakes you up when you get close to your destination

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use proximity_alarm::{
    alarm::{AlarmSink, LogAlarm, TerminalAlarm},
    config::AppConfig,
    destination::{DestinationResolver, Lookup},
    display::TerminalDisplay,
    geo::{compass_point, distance, initial_bearing, GeoPoint},
    geocode::NominatimGeocoder,
    gps,
    logging,
    monitor::within_threshold,
    session::{Command, Session},
};
use std::path::{Path, PathBuf};
use tokio::io::BufReader;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SourceKind {
    /// gpsd daemon over TCP
    Gpsd,
    /// NMEA receiver on a serial port
    Serial,
    /// Recorded journey file
    Replay,
}

impl SourceKind {
    fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Gpsd => "gpsd",
            SourceKind::Serial => "serial",
            SourceKind::Replay => "replay",
        }
    }
}

#[derive(Parser)]
#[command(name = "proximity-alarm", version)]
#[command(about = "Wakes you up when you get within 1 km of your destination", long_about = None)]
struct Cli {
    /// Log debug detail to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (default: ~/.config/proximity-alarm/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Track your position and ring near the destination
    Watch(WatchArgs),

    /// Look up a place and list the matches
    Search {
        #[arg(required = true)]
        query: Vec<String>,

        /// Rank matches by distance from this point
        #[arg(long, allow_hyphen_values = true)]
        near: Option<GeoPoint>,

        /// Print matches as JSON
        #[arg(long)]
        json: bool,
    },

    /// Great-circle distance between two LAT,LON points
    Distance {
        #[arg(allow_hyphen_values = true)]
        from: GeoPoint,
        #[arg(allow_hyphen_values = true)]
        to: GeoPoint,
    },

    /// List serial ports a receiver could be on
    Ports,
}

#[derive(Args, Debug, Default)]
struct WatchArgs {
    /// Destination as LAT,LON; monitoring starts right away
    #[arg(long, allow_hyphen_values = true, conflicts_with = "search")]
    to: Option<GeoPoint>,

    /// Destination by place name; the best match is used and monitoring starts
    #[arg(long)]
    search: Option<String>,

    #[arg(long, value_enum)]
    source: Option<SourceKind>,

    /// Serial port of the receiver
    #[arg(long)]
    port: Option<String>,

    #[arg(long)]
    baud: Option<u32>,

    /// gpsd host
    #[arg(long)]
    host: Option<String>,

    #[arg(long)]
    gpsd_port: Option<u16>,

    /// Replay a recorded journey instead of live positions
    #[arg(long)]
    replay: Option<PathBuf>,

    /// Pause between replayed fixes, in milliseconds
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Bias searches towards this point until the first fix
    #[arg(long, allow_hyphen_values = true)]
    near: Option<GeoPoint>,

    /// Log the alarm instead of ringing
    #[arg(long)]
    silent: bool,

    /// Store the source settings in the config file
    #[arg(long)]
    save: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose).context("Failed to initialize logging")?;

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Watch(args) => {
            watch(config, args, cli.config.as_deref()).await?;
            // The stdin reader thread cannot be cancelled; exit instead of
            // waiting for it at runtime shutdown
            std::process::exit(0);
        }
        Commands::Search { query, near, json } => search(&config, &query.join(" "), near, json).await,
        Commands::Distance { from, to } => {
            print_distance(from, to);
            Ok(())
        }
        Commands::Ports => list_ports(),
    }
}

fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load(),
    };
    config.context("Failed to load configuration")
}

fn apply_overrides(config: &mut AppConfig, args: &WatchArgs) {
    if let Some(port) = &args.port {
        let baud = args.baud.or(config.serial_baudrate).unwrap_or(9600);
        config.update_serial(port.clone(), baud);
    } else if let Some(baud) = args.baud {
        config.serial_baudrate = Some(baud);
    }

    if args.host.is_some() || args.gpsd_port.is_some() {
        let host = args
            .host
            .clone()
            .or_else(|| config.gpsd_host.clone())
            .unwrap_or_else(|| "localhost".to_string());
        let port = args.gpsd_port.or(config.gpsd_port).unwrap_or(2947);
        config.update_gpsd(host, port);
    }

    if let Some(path) = &args.replay {
        let interval = args.interval_ms.unwrap_or(config.replay_interval_ms);
        config.update_replay(path.clone(), interval);
    } else if let Some(interval) = args.interval_ms {
        config.replay_interval_ms = interval;
    }

    if let Some(kind) = args.source {
        config.source_type = kind.as_str().to_string();
    }
}

async fn watch(mut config: AppConfig, args: WatchArgs, config_path: Option<&Path>) -> Result<()> {
    apply_overrides(&mut config, &args);
    config.validate()?;

    if args.save {
        match config_path {
            Some(path) => config.save_to(path)?,
            None => config.save()?,
        }
        tracing::info!("Configuration saved");
    }

    let source = gps::source_from_config(&config)?;
    let alarm: Box<dyn AlarmSink + Send> = if args.silent {
        Box::new(LogAlarm::new())
    } else {
        Box::new(TerminalAlarm::new(config.alarm_bell, config.alarm_command.clone()))
    };
    let geocoder = NominatimGeocoder::new(
        &config.geocoder_url,
        &config.geocoder_user_agent,
        config.search_limit,
    )?;

    println!("Using {} source", source.describe());
    let mut session = Session::new(source, alarm, geocoder).with_near(args.near);

    if let Some(point) = args.to {
        session.apply(Command::To(point))?;
        session.apply(Command::Start)?;
    } else if let Some(query) = &args.search {
        session
            .search_now(query)
            .await
            .with_context(|| format!("Could not find \"{}\"", query))?;
        session.apply(Command::Start)?;
    } else {
        println!("Set a destination with `to LAT,LON` or `search PLACE`, then `start`. `help` lists commands.");
    }

    session.run(BufReader::new(tokio::io::stdin())).await?;
    Ok(())
}

async fn search(config: &AppConfig, query: &str, near: Option<GeoPoint>, json: bool) -> Result<()> {
    let geocoder = NominatimGeocoder::new(
        &config.geocoder_url,
        &config.geocoder_user_agent,
        config.search_limit,
    )?;
    let resolver = DestinationResolver::new(geocoder);

    let outcome = match resolver.submit(query, near).await? {
        Lookup::Found(outcome) => outcome,
        Lookup::Skipped | Lookup::Stale => return Ok(()),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(outcome.candidates())?);
        return Ok(());
    }

    for (i, place) in outcome.candidates().iter().enumerate() {
        match near {
            Some(origin) => println!(
                "{:>2}. {} ({}, {} away)",
                i + 1,
                place.display_name,
                place.point,
                TerminalDisplay::format_distance(distance(origin, place.point))
            ),
            None => println!("{:>2}. {} ({})", i + 1, place.display_name, place.point),
        }
    }
    Ok(())
}

fn print_distance(from: GeoPoint, to: GeoPoint) {
    let meters = distance(from, to);
    let bearing = initial_bearing(from, to);

    println!(
        "{:.1} m ({}), bearing {:.0}° {}",
        meters,
        TerminalDisplay::format_distance(meters),
        bearing,
        compass_point(bearing)
    );
    if within_threshold(meters) {
        println!("Within alarm range");
    }
}

fn list_ports() -> Result<()> {
    let ports = gps::serial::available_ports().context("Failed to list serial ports")?;
    if ports.is_empty() {
        println!("No serial ports found");
    }
    for port in ports {
        println!("{}", port);
    }
    Ok(())
}
