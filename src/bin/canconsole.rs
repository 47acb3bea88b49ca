// canconsole/src/bin/canconsole.rs
//
// The terminal front end for the console.
//
// This file is part of the Rust 'canconsole' application.
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.

//! Terminal operator console for a CAN field device.
//!
//! Each line typed on stdin is sent to the device as one frame. Bus
//! traffic is printed to stdout. Type 'quit', close stdin, or hit Ctrl-C
//! to leave.
//!
//! Logging goes to stderr and is controlled with RUST_LOG, like:
//!
//! ```text
//! $ RUST_LOG=canconsole=debug canconsole -i vcan0
//! ```

use anyhow::{anyhow, Context, Result};
use canconsole::{
    heartbeat::{HEARTBEAT_DATA, HEARTBEAT_ID},
    Charset, Config, DisplaySink, Exit, HeartbeatSpec, Input, MonitorState, OverflowPolicy,
    PayloadView, Session, StandardId,
};
use clap::{arg, value_parser, ArgMatches, Command};
use crossbeam::channel::{self, Sender};
use log::{info, warn};
use std::{
    io::{self, BufRead, Write},
    process,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};
use tracing_subscriber::EnvFilter;

// Make the app version the same as the package.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The operator command that ends the session.
const QUIT_CMD: &str = "quit";

// --------------------------------------------------------------------------

/// Prints the display log to the terminal.
#[derive(Default)]
struct Terminal {
    state: Option<MonitorState>,
}

impl DisplaySink for Terminal {
    fn line(&mut self, line: &str) {
        let mut out = io::stdout().lock();
        if writeln!(out, "{}", line).and_then(|_| out.flush()).is_err() {
            warn!("Unable to write to stdout");
        }
    }

    fn status(&mut self, state: MonitorState) {
        if self.state != Some(state) {
            eprintln!("[Heartbeat: {}]", state);
            self.state = Some(state);
        }
    }

    fn notice(&mut self, text: &str) {
        eprintln!("{}", text);
    }
}

// --------------------------------------------------------------------------

/// Parses an integer in decimal, or in hex with a "0x" prefix.
fn parse_int(s: &str) -> Result<u32> {
    let res = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    };
    res.with_context(|| format!("Invalid number '{}'", s))
}

/// Gets a string option that has a default value.
fn opt_str<'a>(opts: &'a ArgMatches, name: &str) -> Result<&'a str> {
    opts.get_one::<String>(name)
        .map(String::as_str)
        .ok_or_else(|| anyhow!("Missing option '{}'", name))
}

/// Gets a numeric option that has a default value.
fn opt_num<T>(opts: &ArgMatches, name: &str) -> Result<T>
where
    T: Copy + Send + Sync + 'static,
{
    opts.get_one::<T>(name)
        .copied()
        .ok_or_else(|| anyhow!("Missing option '{}'", name))
}

/// Gets a period in milliseconds.
fn opt_ms(opts: &ArgMatches, name: &str) -> Result<Duration> {
    opt_num::<u64>(opts, name).map(Duration::from_millis)
}

/// Builds the console configuration from the command line.
fn config_from(opts: &ArgMatches) -> Result<Config> {
    let tx_id = parse_int(opt_str(opts, "tx-id")?)?;
    let tx_id = u16::try_from(tx_id)
        .ok()
        .and_then(StandardId::new)
        .ok_or_else(|| anyhow!("TX ID {:#X} is not a standard ID", tx_id))?;

    let heartbeat = HeartbeatSpec::from_hex(
        parse_int(opt_str(opts, "heartbeat-id")?)?,
        opt_str(opts, "heartbeat-data")?,
    )?;

    let config = Config {
        iface: opt_str(opts, "iface")?.to_string(),
        bitrate: opt_num(opts, "bitrate")?,
        tx_id,
        heartbeat,
        receive_timeout: opt_ms(opts, "receive-timeout")?,
        dispatch_period: opt_ms(opts, "dispatch-period")?,
        heartbeat_period: opt_ms(opts, "heartbeat-period")?,
        shutdown_grace: opt_ms(opts, "shutdown-grace")?,
        queue_capacity: opt_num(opts, "queue")?,
        overflow: opt_str(opts, "overflow")?
            .parse::<OverflowPolicy>()
            .map_err(|e| anyhow!(e))?,
        display_ceiling: opt_num(opts, "lines")?,
        charset: opt_str(opts, "charset")?
            .parse::<Charset>()
            .map_err(|e| anyhow!(e))?,
        payload_view: opt_str(opts, "view")?
            .parse::<PayloadView>()
            .map_err(|e| anyhow!(e))?,
        diag_log: opt_str(opts, "diag-log")?.into(),
    };

    config.validate()?;
    Ok(config)
}

/// Reads operator commands from stdin until it closes.
fn spawn_input(tx: Sender<Input>) -> io::Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name("operator-input".into())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let input = match line {
                    Ok(line) if line.trim() == QUIT_CMD => Input::Quit,
                    Ok(line) => Input::Command(line),
                    Err(err) => {
                        warn!("Error reading stdin: {}", err);
                        break;
                    }
                };
                if tx.send(input).is_err() {
                    break;
                }
            }
        })
}

/// Runs the console until the operator leaves or a fault ends it.
fn run(opts: &ArgMatches) -> Result<Exit> {
    let config = config_from(opts)?;
    let iface = config.iface.clone();

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        ctrlc::set_handler(move || stop.store(true, Ordering::Release))
            .context("Error setting Ctrl-C handler")?;
    }

    let mut session = Session::open(config, Terminal::default())
        .with_context(|| format!("Unable to start the console on '{}'", iface))?;

    let (tx, rx) = channel::unbounded();
    spawn_input(tx).context("Unable to read operator input")?;

    info!("Console running on '{}'", iface);
    let exit = session.run(&rx, &stop)?;

    if !session.shutdown()? {
        warn!("Ingress thread left running at exit");
    }
    Ok(exit)
}

// --------------------------------------------------------------------------

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let hb_id = format!("{:#X}", HEARTBEAT_ID);
    let hb_data = canconsole::codec::hex(&HEARTBEAT_DATA);

    let opts = Command::new("canconsole")
        .version(VERSION)
        .about("Operator console for a CAN field device on Linux")
        .arg(
            arg!(-i --iface <IFACE> "The CAN interface to use, like 'can0', 'vcan0', etc")
                .required(false)
                .default_value("can0"),
        )
        .arg(
            arg!(-b --bitrate <BITRATE> "The bit rate the interface runs at")
                .required(false)
                .default_value("500000")
                .value_parser(value_parser!(u32)),
        )
        .arg(
            arg!(-t --"tx-id" <ID> "The standard ID of the command frames")
                .required(false)
                .default_value("0x07B"),
        )
        .arg(
            arg!(--"heartbeat-id" <ID> "The ID of the device heartbeat")
                .required(false)
                .default_value(&hb_id),
        )
        .arg(
            arg!(--"heartbeat-data" <HEX> "The 8-byte payload of the device heartbeat")
                .required(false)
                .default_value(&hb_data),
        )
        .arg(
            arg!(--"receive-timeout" <MS> "The receive timeout, in ms")
                .required(false)
                .default_value("100")
                .value_parser(value_parser!(u64)),
        )
        .arg(
            arg!(--"dispatch-period" <MS> "The display update period, in ms")
                .required(false)
                .default_value("100")
                .value_parser(value_parser!(u64)),
        )
        .arg(
            arg!(--"heartbeat-period" <MS> "The heartbeat check period, in ms")
                .required(false)
                .default_value("600")
                .value_parser(value_parser!(u64)),
        )
        .arg(
            arg!(--"shutdown-grace" <MS> "How long shutdown waits for the reader, in ms")
                .required(false)
                .default_value("500")
                .value_parser(value_parser!(u64)),
        )
        .arg(
            arg!(-q --queue <FRAMES> "The capacity of the receive queue")
                .required(false)
                .default_value("256")
                .value_parser(value_parser!(usize)),
        )
        .arg(
            arg!(--overflow <POLICY> "What a full receive queue drops")
                .required(false)
                .default_value("drop-oldest")
                .value_parser(["drop-oldest", "drop-newest"]),
        )
        .arg(
            arg!(-n --lines <LINES> "The number of display lines kept")
                .required(false)
                .default_value("200")
                .value_parser(value_parser!(usize)),
        )
        .arg(
            arg!(-c --charset <CHARSET> "The character set of command text")
                .required(false)
                .default_value("utf-8")
                .value_parser(["utf-8", "latin-1"]),
        )
        .arg(
            arg!(--view <VIEW> "How received payloads are shown")
                .required(false)
                .default_value("hex")
                .value_parser(["hex", "text"]),
        )
        .arg(
            arg!(-d --"diag-log" <FILE> "The file that errors are appended to")
                .required(false)
                .default_value("diagnostics.log"),
        )
        .get_matches();

    match run(&opts) {
        Ok(Exit::Requested) => (),
        Ok(Exit::Fault) => process::exit(1),
        Err(err) => {
            eprintln!("{:#}", err);
            process::exit(1);
        }
    }
}
