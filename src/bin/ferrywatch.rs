//! ferrywatch command line monitor
//!
//! Lists departures for a date and direction, watches the selected ones and
//! rings the terminal bell while any of them has space.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Local, NaiveDate};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use ferrywatch::transport::http::UPSTREAM_BASE_URL;
use ferrywatch::transport::{HttpAlertSink, HttpTripSource, NullSink, QueuedAlertSink, UpstreamTripSource};
use ferrywatch::trip::parse_time_of_day;
use ferrywatch::{
    describe_spots, AlertChannelConfig, AlertSink, Direction, JsonFileStore, MessageChannel, MonitorResult,
    MonitorRuntime, MonitorSession, SessionSnapshot, SignalSink, TripQuery, TripSource, VehicleTypeFilter,
};

/// CLI configuration
struct Config {
    date: NaiveDate,
    direction: Direction,
    /// Set when any of date, direction or window was given
    query_explicit: bool,
    vehicle: Option<VehicleTypeFilter>,
    from: Option<String>,
    to: Option<String>,
    /// Departure times (`HH:MM`) to watch
    watch: Vec<String>,
    watch_all: bool,
    email: Option<String>,
    telegram: Option<String>,
    /// Backend base URL; without it trips come straight from the operator
    api: Option<String>,
    upstream: String,
    preferences: Option<PathBuf>,
    no_signal: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            date: Local::now().date_naive(),
            direction: Direction::HeltermaaRohukula,
            query_explicit: false,
            vehicle: None,
            from: None,
            to: None,
            watch: Vec::new(),
            watch_all: false,
            email: env_value("FERRYWATCH_EMAIL"),
            telegram: env_value("FERRYWATCH_TELEGRAM_CHAT_ID"),
            api: env_value("FERRYWATCH_API_URL"),
            upstream: UPSTREAM_BASE_URL.to_string(),
            preferences: None,
            no_signal: false,
        }
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn fail(message: impl std::fmt::Display) -> ! {
    eprintln!("error: {message}");
    std::process::exit(1);
}

fn print_help() {
    println!("ferrywatch - ferry spot monitor");
    println!();
    println!("USAGE:");
    println!("    ferrywatch [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    --date <YYYY-MM-DD>        Travel date [default: today]");
    println!("    --direction <CODE>         HR, RH, VK or KV [default: HR]");
    println!("    --vehicle <TYPE>           sv, pcs, bv or any [default: any]");
    println!("    --from <HH:MM>             Earliest departure");
    println!("    --to <HH:MM>               Latest departure");
    println!("    --watch <HH:MM>            Watch the departure at this time (repeatable)");
    println!("    --watch-all                Watch every listed departure");
    println!("    --email <ADDRESS>          Email alerts [env: FERRYWATCH_EMAIL]");
    println!("    --telegram <CHAT_ID>       Telegram alerts [env: FERRYWATCH_TELEGRAM_CHAT_ID]");
    println!("    --api <URL>                Backend for scans and alerts [env: FERRYWATCH_API_URL]");
    println!("    --upstream <URL>           Operator site when no backend is set [default: {UPSTREAM_BASE_URL}]");
    println!("    --preferences <FILE>       Load and save settings in this JSON file");
    println!("    --no-signal                Do not ring the terminal bell");
    println!("    -h, --help                 Print help information");
    println!();
    println!("COMMANDS (stdin):");
    println!("    list | watch <HH:MM> | start | stop | status | quit");
}

fn parse_args() -> Config {
    let args: Vec<String> = std::env::args().collect();
    let mut config = Config::default();

    let value = |i: usize| -> String {
        args.get(i + 1)
            .cloned()
            .unwrap_or_else(|| fail(format!("{} requires a value", args[i])))
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--date" => {
                let raw = value(i);
                config.date = NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
                    .unwrap_or_else(|_| fail(format!("invalid date: {raw}")));
                config.query_explicit = true;
                i += 2;
            }
            "--direction" => {
                config.direction = value(i).parse().unwrap_or_else(|e| fail(e));
                config.query_explicit = true;
                i += 2;
            }
            "--vehicle" => {
                config.vehicle = Some(value(i).parse().unwrap_or_else(|e| fail(e)));
                i += 2;
            }
            "--from" => {
                config.from = Some(value(i));
                config.query_explicit = true;
                i += 2;
            }
            "--to" => {
                config.to = Some(value(i));
                config.query_explicit = true;
                i += 2;
            }
            "--watch" => {
                config.watch.push(value(i));
                i += 2;
            }
            "--watch-all" => {
                config.watch_all = true;
                i += 1;
            }
            "--email" => {
                config.email = Some(value(i));
                i += 2;
            }
            "--telegram" => {
                config.telegram = Some(value(i));
                i += 2;
            }
            "--api" => {
                config.api = Some(value(i));
                i += 2;
            }
            "--upstream" => {
                config.upstream = value(i);
                i += 2;
            }
            "--preferences" => {
                config.preferences = Some(PathBuf::from(value(i)));
                i += 2;
            }
            "--no-signal" => {
                config.no_signal = true;
                i += 1;
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            arg => fail(format!("unknown argument: {arg}")),
        }
    }

    config
}

/// Alerts waiting for the backend; further ones are dropped.
const ALERT_QUEUE_CAPACITY: usize = 8;

/// Rings the terminal bell and prints the signal text.
struct TerminalBell;

impl SignalSink for TerminalBell {
    fn emit(&self, message: &str) {
        let mut err = io::stderr().lock();
        let _ = writeln!(err, "\x07{message}");
    }
}

fn query_from(config: &Config) -> MonitorResult<TripQuery> {
    let from = config.from.as_deref().map(|raw| parse_time_of_day("from", raw)).transpose()?;
    let to = config.to.as_deref().map(|raw| parse_time_of_day("to", raw)).transpose()?;
    Ok(TripQuery::new(config.date, config.direction).with_window(from, to)?)
}

/// Email and Telegram only go out through a backend; without `--api` they
/// stay off.
fn channels_from(config: &Config) -> AlertChannelConfig {
    let channel = |dest: &Option<String>| match dest {
        Some(d) => MessageChannel::enabled(d.clone()),
        None => MessageChannel::default(),
    };
    let channels = AlertChannelConfig {
        local_signal: !config.no_signal,
        email: channel(&config.email),
        telegram: channel(&config.telegram),
    };
    if config.api.is_some() {
        channels
    } else {
        channels.local_only()
    }
}

fn build_runtime(config: &Config) -> MonitorResult<MonitorRuntime> {
    let (source, alerts): (Arc<dyn TripSource>, Arc<dyn AlertSink>) = match &config.api {
        Some(api) => {
            let http: Arc<dyn AlertSink> = Arc::new(HttpAlertSink::new(api)?);
            (
                Arc::new(HttpTripSource::new(api)?),
                Arc::new(QueuedAlertSink::spawn(http, ALERT_QUEUE_CAPACITY)?),
            )
        }
        None => {
            if config.email.is_some() || config.telegram.is_some() {
                warn!("email and Telegram alerts need --api; only the terminal bell will fire");
            }
            (Arc::new(UpstreamTripSource::new(&config.upstream)?), Arc::new(NullSink))
        }
    };
    let signal: Arc<dyn SignalSink> = if config.no_signal {
        Arc::new(NullSink)
    } else {
        Arc::new(TerminalBell)
    };

    let query = query_from(config)?;
    let mut builder = MonitorSession::builder(source, query.clone())
        .alerts(alerts)
        .signal(signal)
        .filter(config.vehicle.unwrap_or_default())
        .channels(channels_from(config))
        .message_alerts(config.api.is_some());
    let Some(path) = &config.preferences else {
        return MonitorRuntime::spawn(builder.build());
    };

    builder = builder.preferences(Box::new(JsonFileStore::new(path)));
    let runtime = MonitorRuntime::spawn(builder.build())?;

    // Flags given on the command line win over saved preferences.
    if config.query_explicit {
        runtime.set_query(query)?;
    }
    if let Some(filter) = config.vehicle {
        runtime.set_vehicle_type_filter(filter)?;
    }
    if config.email.is_some() || config.telegram.is_some() || config.no_signal {
        runtime.set_channels(channels_from(config))?;
    }
    Ok(runtime)
}

fn print_listing(runtime: &MonitorRuntime) -> MonitorResult<()> {
    let filter = runtime.snapshot()?.filter;
    let listing = runtime.result_set()?;
    if listing.is_empty() {
        println!("No departures found.");
    }
    for trip in &listing.trips {
        println!("  {}  {}", trip.departure_label(), describe_spots(trip, filter));
    }
    Ok(())
}

fn watch_time(runtime: &MonitorRuntime, hhmm: &str) -> MonitorResult<SessionSnapshot> {
    let listing = runtime.result_set()?;
    let trip = listing
        .trips
        .iter()
        .find(|t| t.departure_label() == hhmm.trim())
        .ok_or_else(|| ferrywatch::ConfigError::invalid("watch", format!("no departure at {hhmm}")))?;
    runtime.toggle_watch(trip.id.clone())
}

fn print_snapshot(snapshot: &SessionSnapshot) {
    println!("[{:?}] watching {} | {}", snapshot.state, snapshot.watch_count, snapshot.status);
}

fn run(config: &Config) -> MonitorResult<()> {
    let runtime = build_runtime(config)?;

    let snapshot = runtime.refresh()?;
    println!("Departures ({}): {}", snapshot.filter, snapshot.status);
    print_listing(&runtime)?;

    if config.watch_all {
        for trip in runtime.result_set()?.trips {
            runtime.toggle_watch(trip.id)?;
        }
    }
    for hhmm in &config.watch {
        if let Err(e) = watch_time(&runtime, hhmm) {
            eprintln!("error: {e}");
        }
    }

    if runtime.snapshot()?.watch_count > 0 {
        print_snapshot(&runtime.start()?.snapshot);
    } else {
        println!("Nothing watched yet. Use `watch <HH:MM>` then `start`.");
    }

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        let mut words = line.split_whitespace();
        let result = match (words.next(), words.next()) {
            (None, _) => continue,
            (Some("quit" | "exit"), _) => break,
            (Some("list"), _) => print_listing(&runtime),
            (Some("watch"), Some(hhmm)) => watch_time(&runtime, hhmm).map(|s| print_snapshot(&s)),
            (Some("start"), _) => runtime.start().map(|o| print_snapshot(&o.snapshot)),
            (Some("stop"), _) => runtime.stop().map(|o| print_snapshot(&o.snapshot)),
            (Some("status"), _) => runtime.snapshot().map(|s| print_snapshot(&s)),
            (Some(other), _) => {
                eprintln!("unknown command: {other}");
                Ok(())
            }
        };
        if let Err(e) = result {
            eprintln!("error: {e}");
        }
    }

    runtime.shutdown();
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let config = parse_args();
    if let Err(e) = run(&config) {
        fail(e);
    }
}
