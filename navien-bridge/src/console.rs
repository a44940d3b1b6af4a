//! Line-oriented operator console
//!
//! Lines arrive from stdin on a reader thread; the poll loop parses and
//! executes them between polls so the engine keeps a single owner.

use std::cell::Cell;
use std::fmt::Write as _;
use std::time::Instant;

use enumset::{EnumSet, EnumSetType};
use navien_rs::{ControlError, EventKind, NavienLink, Transport};

/// Packet categories that can be traced to the console
#[derive(Debug, EnumSetType)]
pub enum TraceKind {
    Gas,
    Water,
    Command,
    Announce,
}

impl TraceKind {
    pub fn name(self) -> &'static str {
        match self {
            TraceKind::Gas => "gas",
            TraceKind::Water => "water",
            TraceKind::Command => "command",
            TraceKind::Announce => "announce",
        }
    }

    /// Trace category of an engine event; errors are always logged instead.
    pub fn of(kind: EventKind) -> Option<Self> {
        match kind {
            EventKind::Gas => Some(TraceKind::Gas),
            EventKind::Water => Some(TraceKind::Water),
            EventKind::Command => Some(TraceKind::Command),
            EventKind::Announce => Some(TraceKind::Announce),
            EventKind::Error => None,
        }
    }
}

/// Parse a trace filter. A single category traces only that category;
/// anything else non-empty traces everything.
pub fn parse_trace(arg: &str) -> EnumSet<TraceKind> {
    match arg.trim().to_ascii_lowercase().as_str() {
        "" => EnumSet::empty(),
        "gas" => TraceKind::Gas.into(),
        "water" => TraceKind::Water.into(),
        "command" => TraceKind::Command.into(),
        "announce" => TraceKind::Announce.into(),
        _ => EnumSet::all(),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    Help,
    Ping,
    Trace(EnumSet<TraceKind>),
    Stop,
    Gas,
    Water,
    Control,
    /// `None` reports the current set point
    SetTemp(Option<f32>),
    Power(Option<bool>),
    Recirc(Option<bool>),
    HotButton,
    Stats,
    Quit,
}

/// Console commands and their help text
pub const COMMANDS: &[(&str, &str)] = &[
    ("help", "List available commands"),
    ("ping", "Test if console commands are working"),
    ("trace", "Dump interactions (options: gas/water/command/announce)"),
    ("stop", "Stop tracing"),
    ("gas", "Print current gas state as JSON"),
    ("water", "Print current water state as JSON"),
    ("control", "Check if control commands are available"),
    ("setTemp", "Set or get set point temperature (37-60 C)"),
    ("power", "Set or get power state (on/off)"),
    ("recirc", "Set or get recirculation state (on/off)"),
    ("hotButton", "Send hot button command"),
    ("stats", "Print link counters"),
    ("quit", "Exit the bridge"),
];

/// Lowest and highest set point the console will send, °C
const SET_TEMP_RANGE: std::ops::RangeInclusive<f32> = 37.0..=60.0;

fn parse_on_off(command: &str, arg: &str) -> Result<Option<bool>, String> {
    match arg.to_ascii_lowercase().as_str() {
        "" => Ok(None),
        "on" => Ok(Some(true)),
        "off" => Ok(Some(false)),
        _ => Err(format!("Unknown {} parameter: {}", command, arg)),
    }
}

/// Parse one console line. Command names are case sensitive.
pub fn parse(line: &str) -> Result<ConsoleCommand, String> {
    let line = line.trim();
    let (name, arg) = match line.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (line, ""),
    };

    let command = match name {
        "help" => ConsoleCommand::Help,
        "ping" => ConsoleCommand::Ping,
        "trace" => ConsoleCommand::Trace(parse_trace(if arg.is_empty() { "all" } else { arg })),
        "stop" => ConsoleCommand::Stop,
        "gas" => ConsoleCommand::Gas,
        "water" => ConsoleCommand::Water,
        "control" => ConsoleCommand::Control,
        "setTemp" if arg.is_empty() => ConsoleCommand::SetTemp(None),
        "setTemp" => {
            let celsius: f32 = arg
                .parse()
                .map_err(|_| format!("Not a temperature: {}", arg))?;
            ConsoleCommand::SetTemp(Some(celsius))
        }
        "power" => ConsoleCommand::Power(parse_on_off("power", arg)?),
        "recirc" => ConsoleCommand::Recirc(parse_on_off("recirculation", arg)?),
        "hotButton" => ConsoleCommand::HotButton,
        "stats" => ConsoleCommand::Stats,
        "quit" | "exit" | "bye" => ConsoleCommand::Quit,
        _ => return Err("Unknown command. Type 'help' to see available commands.".to_string()),
    };
    Ok(command)
}

fn on_off(value: bool) -> &'static str {
    if value {
        "ON"
    } else {
        "OFF"
    }
}

fn to_json<S: serde::Serialize>(value: &S) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|e| format!("JSON error: {}", e))
}

fn failure(action: &str, err: ControlError) -> String {
    format!("Failed to {}: {} ({})", action, err, err.code())
}

/// Run `command` against the engine. Returns the text to print and whether
/// the bridge should exit.
pub fn execute<T: Transport>(
    command: ConsoleCommand,
    link: &mut NavienLink<T>,
    trace: &Cell<EnumSet<TraceKind>>,
) -> (String, bool) {
    let output = match command {
        ConsoleCommand::Help => {
            let mut out = String::from("Available commands:");
            for (name, description) in COMMANDS {
                let _ = write!(out, "\n  {} - {}", name, description);
            }
            out
        }
        ConsoleCommand::Ping => "Pong! Console is working.".to_string(),
        ConsoleCommand::Trace(kinds) => {
            trace.set(kinds);
            if kinds == EnumSet::all() {
                "Tracing all interactions.".to_string()
            } else {
                let names: Vec<_> = kinds.iter().map(TraceKind::name).collect();
                format!("Tracing only {} interactions.", names.join(", "))
            }
        }
        ConsoleCommand::Stop => {
            trace.set(EnumSet::empty());
            "Tracing stopped.".to_string()
        }
        ConsoleCommand::Gas => to_json(&link.state().gas),
        ConsoleCommand::Water => {
            let state = link.state();
            match state.water_devices() {
                [] => to_json(&[state.water[0]]),
                devices => to_json(&devices),
            }
        }
        ConsoleCommand::Control => {
            if link.is_control_available() {
                "Commands can be sent.".to_string()
            } else {
                "Commands cannot be sent, a NaviLink gateway is present.".to_string()
            }
        }
        ConsoleCommand::SetTemp(None) => {
            format!("Current set temperature: {:.1} C", link.state().gas.set_temp)
        }
        ConsoleCommand::SetTemp(Some(celsius)) if !SET_TEMP_RANGE.contains(&celsius) => {
            format!(
                "Set temperature {:.1} C out of range {:.0}-{:.0} C",
                celsius,
                SET_TEMP_RANGE.start(),
                SET_TEMP_RANGE.end()
            )
        }
        ConsoleCommand::SetTemp(Some(celsius)) => match link.set_temperature(celsius) {
            Ok(n) => format!("{} Set temperature to: {:.1} C", n, celsius),
            Err(e) => failure("set temperature", e),
        },
        ConsoleCommand::Power(None) => {
            format!("Current Power is: {}", on_off(link.state().water[0].system_power))
        }
        ConsoleCommand::Power(Some(on)) => match link.power(on) {
            Ok(_) => format!("Powering {}.", if on { "on" } else { "off" }),
            Err(e) => failure(if on { "power on" } else { "power off" }, e),
        },
        ConsoleCommand::Recirc(None) => {
            format!(
                "Recirculation is: {}",
                on_off(link.state().water[0].recirculation_running)
            )
        }
        ConsoleCommand::Recirc(Some(on)) => match link.set_recirculation(on) {
            Ok(_) => format!("Turning recirculation {}.", if on { "on" } else { "off" }),
            Err(e) => failure("switch recirculation", e),
        },
        ConsoleCommand::HotButton => match link.press_hot_button() {
            Ok(_) => "Hot button command sent.".to_string(),
            Err(e) => failure("press hot button", e),
        },
        ConsoleCommand::Stats => {
            let silence = match link.silence(Instant::now()) {
                Some(quiet) => format!("{} ms", quiet.as_millis()),
                None => "no traffic yet".to_string(),
            };
            format!(
                "Link state: {}, bus quiet: {}, idle gap: {} ms, simulation: {}\n{}",
                link.link_state().name(),
                silence,
                link.config().idle_gap.as_millis(),
                link.is_simulation(),
                to_json(&link.stats())
            )
        }
        ConsoleCommand::Quit => return ("Goodbye".to_string(), true),
    };
    (output, false)
}
