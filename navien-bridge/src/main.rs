//! Navien RS-485 bridge
//!
//! Host-side companion for the navien-rs link engine. Opens the heater's
//! RS-485 line through a USB adapter or UART, runs the engine's poll loop,
//! and exposes it to an operator.
//!
//! ## Features
//! - TOML configuration file with command-line overrides
//! - Operator console on stdin (`help` lists the commands)
//! - Packet tracing filtered by category
//! - JSON broadcast of water and gas state over UDP
//! - Offline simulation when no serial port is configured

use std::cell::Cell;
use std::io::{self, BufRead};
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use clap::Parser;
use enumset::EnumSet;
use log::{debug, error, info, warn};
use navien_rs::{Event, EventKind, MemoryTransport, NavienLink, Transport};

mod broadcast;
mod config;
mod console;
mod serial;

use broadcast::StateBroadcaster;
use config::BridgeConfig;
use console::TraceKind;
use serial::SerialTransport;

/// Poll loop period
const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Consecutive transport failures before giving up
const MAX_IO_ERRORS: u32 = 50;

/// Delay after a transport failure
const IO_RETRY_DELAY: Duration = Duration::from_millis(100);

/// How often link counters are logged at debug level
const STATS_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Parser)]
#[command(name = "navien-bridge", version, about = "Bridge for the Navien tankless heater RS-485 bus")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serial port, empty for no bus
    #[arg(short, long)]
    port: Option<String>,

    #[arg(short, long)]
    baud: Option<u32>,

    /// Bus silence required before transmitting, in ms
    #[arg(long)]
    idle_gap_ms: Option<u64>,

    /// Also transmit right after a received frame completes
    #[arg(long)]
    flush_after_frame: bool,

    /// Start in simulation mode
    #[arg(long, conflicts_with = "no_simulation")]
    simulation: bool,

    /// Transmit for real from the start
    #[arg(long)]
    no_simulation: bool,

    /// UDP broadcast port, 0 disables
    #[arg(long)]
    udp_port: Option<u16>,

    /// Initial trace filter: gas, water, command, announce or all
    #[arg(long)]
    trace: Option<String>,

    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    /// Override `config` with the flags that were given.
    fn apply(&self, config: &mut BridgeConfig) {
        if let Some(port) = &self.port {
            config.port = port.clone();
        }
        if let Some(baud) = self.baud {
            config.baud_rate = baud;
        }
        if let Some(gap) = self.idle_gap_ms {
            config.idle_gap_ms = gap;
        }
        if self.flush_after_frame {
            config.flush_after_frame = true;
        }
        if self.simulation {
            config.simulation = true;
        }
        if self.no_simulation {
            config.simulation = false;
        }
        if let Some(port) = self.udp_port {
            config.udp_port = port;
        }
        if let Some(trace) = &self.trace {
            config.trace = trace.clone();
        }
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = BridgeConfig::load(cli.config.as_deref())?;
    cli.apply(&mut config);

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.log_level))
        .init();

    info!("╔══════════════════════════════════════════════════════════════╗");
    info!("║              Navien RS-485 Bridge                            ║");
    info!("╚══════════════════════════════════════════════════════════════╝");

    if let Some(path) = &cli.config {
        info!("Configuration loaded from {}", path.display());
    }
    info!("Configuration:");
    info!("  Serial port: {}", if config.port.is_empty() { "(none)" } else { config.port.as_str() });
    info!("  Baud rate: {}", config.baud_rate);
    info!("  Idle gap: {} ms", config.idle_gap_ms);
    info!("  Flush after frame: {}", config.flush_after_frame);
    info!("  Simulation: {}", config.simulation);
    info!("  UDP broadcast port: {}", config.udp_port);

    let transport: Box<dyn Transport> = if config.port.is_empty() {
        warn!("No serial port configured, running without a bus");
        Box::new(MemoryTransport::new())
    } else {
        info!("Initializing RS-485 serial port...");
        Box::new(
            SerialTransport::open(&config.port, config.baud_rate)
                .with_context(|| format!("opening serial port {}", config.port))?,
        )
    };

    let mut link = NavienLink::with_config(transport, config.engine_config());

    let trace = Rc::new(Cell::new(console::parse_trace(&config.trace)));
    {
        let trace = Rc::clone(&trace);
        link.add_listener(move |event: &Event<'_>| {
            if let Some(line) = trace_line(event, trace.get()) {
                println!("{}", line);
            }
        });
    }

    if config.udp_port != 0 {
        let broadcaster = Rc::new(
            StateBroadcaster::bind(config.udp_port).context("creating UDP broadcast socket")?,
        );
        for kind in [EventKind::Water, EventKind::Gas] {
            let broadcaster = Rc::clone(&broadcaster);
            link.subscribe(kind, move |event: &Event<'_>| {
                if let Err(e) = broadcaster.publish(event) {
                    warn!("UDP broadcast failed: {}", e);
                }
            });
        }
    }

    let lines = spawn_console().context("starting console thread")?;

    info!("╔══════════════════════════════════════════════════════════════╗");
    info!("║                    Bridge Running!                           ║");
    info!("╚══════════════════════════════════════════════════════════════╝");
    info!("Type 'help' for console commands");

    run(&mut link, &lines, &trace)
}

/// Poll the engine and serve console commands until `quit`.
fn run<T: Transport>(
    link: &mut NavienLink<T>,
    lines: &Receiver<String>,
    trace: &Cell<EnumSet<TraceKind>>,
) -> anyhow::Result<()> {
    let mut io_errors: u32 = 0;
    let mut console_open = true;
    let mut last_stats = Instant::now();

    loop {
        match link.poll() {
            Ok(_) => io_errors = 0,
            Err(e) => {
                io_errors += 1;
                error!("Bus read failed ({}/{}): {}", io_errors, MAX_IO_ERRORS, e);
                if io_errors >= MAX_IO_ERRORS {
                    bail!("giving up after {} consecutive bus errors: {}", io_errors, e);
                }
                thread::sleep(IO_RETRY_DELAY);
                continue;
            }
        }

        while console_open {
            match lines.try_recv() {
                Ok(line) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    let (output, quit) = match console::parse(&line) {
                        Ok(command) => console::execute(command, link, trace),
                        Err(message) => (message, false),
                    };
                    println!("{}", output);
                    if quit {
                        info!("Shutting down");
                        return Ok(());
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    info!("Console closed, continuing without it");
                    console_open = false;
                }
            }
        }

        if last_stats.elapsed() >= STATS_INTERVAL {
            debug!("Link stats: {:?}", link.stats());
            last_stats = Instant::now();
        }

        thread::sleep(POLL_INTERVAL);
    }
}

/// Read stdin lines on their own thread so the poll loop never blocks.
fn spawn_console() -> io::Result<Receiver<String>> {
    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name("console".into())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        })?;
    Ok(rx)
}

/// Console line for `event` when its category is being traced.
fn trace_line(event: &Event<'_>, filter: EnumSet<TraceKind>) -> Option<String> {
    let kind = TraceKind::of(event.kind())?;
    if !filter.contains(kind) {
        return None;
    }
    let frame = event.frame()?;
    let decoded = match event {
        Event::Water { .. } => event.water().map(|w| serde_json::to_string(w)),
        Event::Gas { .. } => event.gas().map(|g| serde_json::to_string(g)),
        Event::Command { .. } => event.command().map(|c| serde_json::to_string(c)),
        Event::Announce { state, .. } => Some(serde_json::to_string(&state.announce)),
        Event::Error(_) => None,
    }
    .and_then(|json| json.ok())
    .unwrap_or_default();

    Some(format!("[{}] {} {}", kind.name(), frame.to_hex(), decoded))
}
