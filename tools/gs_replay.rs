// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Replay a captured module receive stream through the protocol engine.
//!
//! Feeds the bytes of a capture file to the engine as if they came from the
//! module, then prints every lifecycle event and how much bulk payload each
//! connection received. UART captures are logical bytes; SPI captures are
//! raw MISO bytes and go through the SPI framer.

use std::cell::Cell;
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::rc::Rc;

use anyhow::{Context, Result};
use gainspan::config::{find_config_file, load_config, GainspanConfig, TransportKind};
use gainspan::engine::framer::SPI_IDLE;
use gainspan::engine::frame::CID_COUNT;
use gainspan::observability::{debug_flags_help, init_logging, parse_debug_flags};
use gainspan::prelude::*;

fn usage_and_exit() -> ! {
    eprintln!(
        "Usage: gs_replay <capture> [--config <path>] [--transport uart|spi] [--debug-<crate>]\n\n\
         Defaults:\n\
         - config: gainspan.toml found by the usual search, else built-in defaults\n\
         - transport: taken from the config file\n\n{}",
        debug_flags_help()
    );
    process::exit(2);
}

struct Args {
    capture: PathBuf,
    config: Option<PathBuf>,
    overrides: HashMap<String, String>,
}

fn parse_args() -> Args {
    let mut capture = None;
    let mut config = None;
    let mut overrides = HashMap::new();

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let v = args.next().unwrap_or_else(|| usage_and_exit());
                config = Some(PathBuf::from(v));
            }
            "--transport" => {
                let v = args.next().unwrap_or_else(|| usage_and_exit());
                overrides.insert("transport".to_string(), v);
            }
            "-h" | "--help" => usage_and_exit(),
            other if other.starts_with("--debug-") => {}
            other if other.starts_with('-') => {
                eprintln!("Unknown argument: {other}");
                usage_and_exit();
            }
            other => {
                if capture.replace(PathBuf::from(other)).is_some() {
                    eprintln!("Only one capture file can be replayed");
                    usage_and_exit();
                }
            }
        }
    }

    Args {
        capture: capture.unwrap_or_else(|| usage_and_exit()),
        config,
        overrides,
    }
}

fn resolve_config(args: &Args) -> Result<GainspanConfig> {
    let path = match &args.config {
        Some(path) => Some(path.clone()),
        None => find_config_file().ok(),
    };
    match path {
        Some(path) => load_config(Some(&path), Some(&args.overrides))
            .with_context(|| format!("Failed to load {}", path.display())),
        None => {
            let mut config = GainspanConfig::default();
            gainspan::config::apply_environment_overrides(&mut config)?;
            gainspan::config::apply_cli_overrides(&mut config, &args.overrides)?;
            gainspan::config::validate_config(&config)?;
            Ok(config)
        }
    }
}

// ============================================================================
// Replay sources
// ============================================================================

/// Capture bytes handed out one at a time; flags when they run out
struct Capture {
    data: Vec<u8>,
    pos: usize,
    exhausted: Rc<Cell<bool>>,
}

impl Capture {
    fn open(path: &Path, exhausted: Rc<Cell<bool>>) -> Result<Self> {
        let data =
            fs::read(path).with_context(|| format!("Failed to read capture {}", path.display()))?;
        Ok(Self {
            data,
            pos: 0,
            exhausted,
        })
    }

    fn next(&mut self) -> Option<u8> {
        let byte = self.data.get(self.pos).copied();
        match byte {
            Some(_) => self.pos += 1,
            None => self.exhausted.set(true),
        }
        byte
    }
}

/// UART replay: the capture is the logical byte stream, writes go nowhere
impl SerialPort for Capture {
    type Error = std::convert::Infallible;

    fn read_byte(&mut self) -> Result<Option<u8>, Self::Error> {
        Ok(self.next())
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, Self::Error> {
        Ok(data.len())
    }
}

/// SPI replay: the capture is what the module clocked out
struct SpiCapture(Capture);

impl SpiExchange for SpiCapture {
    type Error = std::convert::Infallible;

    fn exchange(&mut self, _out: u8) -> Result<u8, Self::Error> {
        Ok(self.0.next().unwrap_or(SPI_IDLE))
    }
}

// ============================================================================
// Replay
// ============================================================================

/// Prints lifecycle events as they are delivered
#[derive(Default)]
struct EventPrinter {
    events: usize,
}

impl EventPrinter {
    fn print(&mut self, what: &str) {
        self.events += 1;
        println!("event: {what}");
    }
}

impl EventHandler for EventPrinter {
    fn on_ncm_disconnect(&mut self) {
        self.print("NCM disconnected");
    }

    fn on_disassociate(&mut self) {
        self.print("disassociated");
    }

    fn on_associate(&mut self) {
        self.print("associated");
    }

    fn on_ncm_connect(&mut self, cid: Cid) {
        self.print(&format!("NCM connected on cid {cid}"));
    }

    fn on_unexpected_reset(&mut self) {
        self.print("unexpected module reset");
    }
}

struct Summary {
    totals: [u64; CID_COUNT],
    events: usize,
    dropped: u32,
    associated: bool,
    fault: Option<EngineError>,
}

fn replay<L: Link>(link: L, config: EngineConfig, exhausted: &Cell<bool>) -> Result<Summary> {
    let mut engine = Engine::with_config(link, HostClock::new(), config);
    engine.attach()?;

    let mut printer = EventPrinter::default();
    let mut totals = [0u64; CID_COUNT];
    let mut fault = None;

    loop {
        if let Err(e) = engine.poll(&mut printer) {
            fault = Some(e);
            break;
        }

        let mut progressed = false;
        while let Some((cid, _)) = engine.read_any() {
            totals[cid.index()] += 1;
            progressed = true;
        }

        if engine.has_fault() {
            fault = Some(EngineError::Fault);
            break;
        }
        if exhausted.get() && !progressed {
            break;
        }
    }

    Ok(Summary {
        totals,
        events: printer.events,
        dropped: engine.dropped_bytes(),
        associated: engine.is_associated(),
        fault,
    })
}

fn print_summary(summary: &Summary) {
    println!();
    println!("lifecycle events: {}", summary.events);
    println!(
        "associated at end: {}",
        if summary.associated { "yes" } else { "no" }
    );
    for cid in Cid::all() {
        let total = summary.totals[cid.index()];
        if total > 0 {
            println!("cid {cid}: {total} bytes");
        }
    }
    if summary.dropped > 0 {
        println!("dropped: {} bytes", summary.dropped);
    }
    if let Some(e) = &summary.fault {
        println!("stopped by fault: {e}");
    }
}

fn main() -> Result<()> {
    let args = parse_args();
    let config = resolve_config(&args)?;

    let flags = parse_debug_flags();
    init_logging(&flags, &config.logging.level)?;

    let engine_config = config.engine.engine_config();
    let exhausted = Rc::new(Cell::new(false));
    let capture = Capture::open(&args.capture, exhausted.clone())?;
    log::info!(
        "Replaying {} bytes from {} over {}",
        capture.data.len(),
        args.capture.display(),
        config.transport.kind
    );

    let summary = match config.transport.kind {
        TransportKind::Uart => replay(UartLink::new(capture), engine_config, &exhausted)?,
        TransportKind::Spi => {
            let link = SpiLink::new(SpiCapture(capture), HostClock::new());
            replay(link, engine_config, &exhausted)?
        }
    };

    print_summary(&summary);
    if summary.fault.is_some() {
        process::exit(1);
    }
    Ok(())
}
