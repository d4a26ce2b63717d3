// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Cross-crate tests through the facade: configuration feeding the engine,
//! and the engine running over both link types

use std::cell::Cell;
use std::collections::VecDeque;
use std::fs;

use gainspan::config::{load_config, TransportKind};
use gainspan::prelude::*;
use tempfile::tempdir;

/// Clock that advances 1 ms per read
struct TickingClock(Cell<u64>);

impl TickingClock {
    fn new() -> Self {
        Self(Cell::new(0))
    }
}

impl TimeProvider for TickingClock {
    fn get_time_us(&self) -> u64 {
        let now = self.0.get();
        self.0.set(now + 1000);
        now
    }
}

/// Serial port that never answers
#[derive(Default)]
struct SilentPort {
    reads: usize,
    written: Vec<u8>,
}

impl SerialPort for SilentPort {
    type Error = ();

    fn read_byte(&mut self) -> Result<Option<u8>, ()> {
        self.reads += 1;
        Ok(None)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, ()> {
        self.written.extend_from_slice(data);
        Ok(data.len())
    }
}

/// SPI module replaying queued wire bytes, idle afterwards
#[derive(Default)]
struct ScriptedSpi {
    miso: VecDeque<u8>,
    mosi: Vec<u8>,
}

impl ScriptedSpi {
    fn with(miso: &[u8]) -> Self {
        Self {
            miso: miso.iter().copied().collect(),
            mosi: Vec::new(),
        }
    }
}

impl SpiExchange for ScriptedSpi {
    type Error = ();

    fn exchange(&mut self, out: u8) -> Result<u8, ()> {
        self.mosi.push(out);
        Ok(self.miso.pop_front().unwrap_or(0xF5))
    }
}

fn cid(n: u8) -> Cid {
    Cid::new(n).unwrap()
}

#[test]
fn test_config_file_drives_engine() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("gainspan.toml");
    fs::write(
        &path,
        "[engine]\nresponse_timeout_ms = 20\n\n[transport]\nkind = \"uart\"\n",
    )
    .unwrap();

    let config = load_config(Some(&path), None).unwrap();
    assert_eq!(config.transport.kind, TransportKind::Uart);

    let mut port = SilentPort::default();
    let mut engine = Engine::with_config(
        UartLink::new(&mut port),
        TickingClock::new(),
        config.engine.engine_config(),
    );
    engine.attach().unwrap();
    engine.write_command(Command::Raw("AT+NSTAT=?")).unwrap();
    assert_eq!(engine.read_response(), Err(EngineError::Timeout));
    assert!(engine.has_fault());
    drop(engine);

    assert_eq!(port.written, b"AT+NSTAT=?\r\n".to_vec());
    assert!(port.reads < 40);
}

#[test]
fn test_spi_receive_unstuffs_payload() {
    // Payload F5 41 FF FB, every reserved byte escaped on the wire
    let mut miso = b"\x1bZ10004".to_vec();
    miso.extend_from_slice(&[0xFB, 0xD5, 0x41, 0xFB, 0xDF, 0xFB, 0xDB]);

    let link = SpiLink::new(ScriptedSpi::with(&miso), TickingClock::new());
    let mut engine = Engine::new(link, TickingClock::new());
    engine.attach().unwrap();

    let mut buf = [0u8; 8];
    assert_eq!(engine.read_into(cid(1), &mut buf), 4);
    assert_eq!(&buf[..4], &[0xF5, 0x41, 0xFF, 0xFB]);
}

#[test]
fn test_spi_write_waits_for_go_ahead() {
    // The go-ahead arrives while the header prefix is being clocked out
    let link = SpiLink::new(ScriptedSpi::with(b"\x1bO"), TickingClock::new());
    let mut engine = Engine::new(link, TickingClock::new());
    engine.attach().unwrap();

    engine.write_data(cid(1), &[0xFD, b'a']).unwrap();

    let (link, _) = engine.release();
    let (spi, _, _) = link.into_parts();
    let mut expected = b"\x1bZ10002".to_vec();
    expected.extend_from_slice(&[0xFB, 0xDD, b'a']);
    assert_eq!(spi.mosi, expected);
}

#[test]
fn test_spi_xoff_stall_fails_only_that_write() {
    // XOFF arrives with the first byte, then idles outlast the retry budget
    let mut miso = vec![0xFA];
    miso.extend_from_slice(&[0xF5; 8]);
    miso.push(0xFD);

    let config = EngineConfig::new().with_write_retry_budget(8);
    let link = SpiLink::new(ScriptedSpi::with(&miso), TickingClock::new());
    let mut engine = Engine::with_config(link, TickingClock::new(), config);
    engine.attach().unwrap();

    assert_eq!(
        engine.write_command(Command::Raw("AT")),
        Err(EngineError::Link(LinkError::Stalled))
    );
    assert!(!engine.has_fault());

    // XON shows up on the first idle exchange of the next write
    engine.write_command(Command::Raw("AT")).unwrap();
    assert!(!engine.has_fault());

    let (link, _) = engine.release();
    let (spi, _, _) = link.into_parts();
    assert!(spi.mosi.ends_with(b"AT\r\n"));
    assert_eq!(spi.mosi.len(), 1 + 8 + 1 + 4);
}
