// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Protocol engine
//!
//! [`Engine`] owns the link and all protocol state. It is driven by the
//! caller: [`Engine::poll`] processes whatever bytes are ready and reports
//! lifecycle edges, the read functions drain bulk payload, and the command
//! functions run one synchronous command/reply exchange under the response
//! timeout.
//!
//! A reply timeout or link failure latches a fault. From then on every
//! operation fails without touching the link until [`Engine::end`] or a new
//! [`Engine::begin`].

use core::net::Ipv4Addr;

use gainspan_hal::TimeProvider;

use crate::async_event::{self, Dispatch};
use crate::command::{self, Command, HEADER_PREFIX_LEN};
use crate::config::EngineConfig;
use crate::connection::{Connection, ConnectionTable, Events};
use crate::error::{EngineError, LinkError, Result};
use crate::frame::{Cid, RxFrame, MAX_BULK_CHUNK};
use crate::link::Link;
use crate::response::{
    parse_line, LineBuffer, ResponseCode, MAX_DATA_LINE_SIZE, MAX_RESPONSE_SIZE,
};
use crate::ring::{FrameQueue, DEFAULT_RX_BUFFER};
use crate::rx::{RxEvent, RxMachine};

/// Byte the module emits right after reset, before its banner
const POST_RESET_BYTE: u8 = 0x80;

/// Lifecycle callbacks, invoked from [`Engine::poll`]
///
/// Within one poll the order is fixed: NCM disconnect, disassociate,
/// associate, NCM connect, then unexpected reset.
pub trait EventHandler {
    /// The connection manager's connection closed
    fn on_ncm_disconnect(&mut self) {}
    /// Association lost
    fn on_disassociate(&mut self) {}
    /// Associated with an access point
    fn on_associate(&mut self) {}
    /// The connection manager opened `cid`
    fn on_ncm_connect(&mut self, _cid: Cid) {}
    /// The module rebooted by itself; it needs to be set up again
    fn on_unexpected_reset(&mut self) {}
}

impl EventHandler for () {}

/// Outcome of [`Engine::read_response_into`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseData {
    /// Final reply code
    pub code: ResponseCode,
    /// Bytes of data lines left in the buffer, each ending in `\r\n`
    pub len: usize,
    /// Some data did not fit in the buffer
    pub truncated: bool,
    /// Connection id from a `CONNECT <cid>` line
    pub connect_cid: Option<Cid>,
}

/// What to do with reply lines that are not a reply code
enum LineSink<'f> {
    Discard,
    Keep,
    Callback(&'f mut dyn FnMut(&[u8])),
}

/// Everything except the link and clock, so link callbacks can borrow it
#[derive(Debug)]
struct EngineState<const RX: usize> {
    rx: RxMachine,
    frames: FrameQueue<RX>,
    table: ConnectionTable,
    initializing: bool,
    reset_detected: bool,
    awaiting_data_reply: bool,
    data_reply: Option<bool>,
}

impl<const RX: usize> EngineState<RX> {
    fn new() -> Self {
        Self {
            rx: RxMachine::new(),
            frames: FrameQueue::new(),
            table: ConnectionTable::new(),
            initializing: false,
            reset_detected: false,
            awaiting_data_reply: false,
            data_reply: None,
        }
    }

    fn reset(&mut self) {
        self.rx.reset();
        self.frames.clear();
        self.table.reset();
        self.initializing = false;
        self.reset_detected = false;
        self.awaiting_data_reply = false;
        self.data_reply = None;
    }

    /// Flag every connection that lost buffered payload
    fn mark_damaged(&mut self) {
        for cid in self.frames.take_damaged() {
            self.table.mark_error(cid);
        }
    }

    /// Feed one logical byte; reply text is handed back
    fn process(&mut self, byte: u8) -> Option<u8> {
        let event = self.rx.step(byte);
        self.handle(event)
    }

    fn handle(&mut self, event: RxEvent) -> Option<u8> {
        match event {
            RxEvent::None => None,
            RxEvent::Text(byte) => Some(byte),
            RxEvent::Frame(frame) => {
                if self.frames.push_frame(frame) > 0 {
                    self.mark_damaged();
                }
                None
            }
            RxEvent::Payload(byte) => {
                if self.frames.push_byte(byte) > 0 {
                    self.mark_damaged();
                }
                None
            }
            RxEvent::Async(msg) => {
                if let Some(event) = async_event::parse_async(&msg) {
                    let outcome = async_event::dispatch(event, &mut self.table, self.initializing);
                    if outcome == Dispatch::UnexpectedReset {
                        self.reset_detected = true;
                    }
                }
                None
            }
            RxEvent::DataReply(ok) => {
                if self.awaiting_data_reply {
                    log::debug!("Read data {} response", if ok { "OK" } else { "FAIL" });
                    self.data_reply = Some(ok);
                } else {
                    log::warn!("Unexpected bulk data reply ({})", if ok { "O" } else { "F" });
                }
                None
            }
        }
    }

    /// Process a byte outside of a command exchange
    fn process_unsolicited(&mut self, byte: u8) {
        if let Some(text) = self.process(byte) {
            // Stray line ends are left over from reply parsing
            if text != b'\r' && text != b'\n' {
                log::trace!("Discarding non-escaped byte 0x{:02x}", text);
            }
        }
    }
}

/// Gainspan protocol engine
///
/// `RX` is the size of the bulk receive buffer and must be a power of two.
#[derive(Debug)]
pub struct Engine<L, T, const RX: usize = DEFAULT_RX_BUFFER> {
    link: L,
    clock: T,
    config: EngineConfig,
    started: bool,
    fault: bool,
    state: EngineState<RX>,
}

impl<L: Link, T: TimeProvider> Engine<L, T> {
    /// Create a stopped engine with default tuning
    pub fn new(link: L, clock: T) -> Self {
        Self::with_config(link, clock, EngineConfig::default())
    }

    /// Create a stopped engine
    pub fn with_config(link: L, clock: T, config: EngineConfig) -> Self {
        Self::with_rx_buffer(link, clock, config)
    }
}

impl<L: Link, T: TimeProvider, const RX: usize> Engine<L, T, RX> {
    /// Create a stopped engine with an `RX`-byte receive buffer
    pub fn with_rx_buffer(mut link: L, clock: T, config: EngineConfig) -> Self {
        link.configure(&config);
        Self {
            link,
            clock,
            config,
            started: false,
            fault: false,
            state: EngineState::new(),
        }
    }

    /// Tuning parameters in use
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Stop the engine and give back the link and clock
    pub fn release(self) -> (L, T) {
        (self.link, self.clock)
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Start up a freshly reset module
    ///
    /// Waits for the start-up banner, discards it, then switches the module
    /// to numeric replies without echo, bulk data mode and escaped async
    /// notifications. Boot notifications are expected during this window.
    pub fn begin(&mut self) -> Result<()> {
        self.start()?;
        self.state.initializing = true;
        let result = self.handshake();
        self.state.initializing = false;

        match result {
            Ok(()) => {
                self.state.table.reset_connections();
                log::info!("Module initialized");
                Ok(())
            }
            Err(e) => {
                log::error!("Module initialization failed: {}", e);
                self.started = false;
                Err(e)
            }
        }
    }

    /// Start against a module that is already in numeric, bulk and escaped
    /// async mode, without any handshake
    pub fn attach(&mut self) -> Result<()> {
        self.start()
    }

    /// Stop the engine and reset all state, including the fault latch
    pub fn end(&mut self) {
        self.started = false;
        self.fault = false;
        self.state.reset();
        self.link.reset();
    }

    fn start(&mut self) -> Result<()> {
        if self.started {
            return Err(EngineError::AlreadyStarted);
        }
        self.state.reset();
        self.link.reset();
        self.fault = false;
        self.started = true;
        Ok(())
    }

    fn handshake(&mut self) -> Result<()> {
        let start = self.clock.get_time_ms();
        loop {
            match self.read_link()? {
                Some(byte) if byte != POST_RESET_BYTE => break,
                _ => {}
            }
            if self.elapsed_ms(start) > self.config.response_timeout_ms as u64 {
                return Err(EngineError::BannerTimeout);
            }
        }

        // The banner varies between firmware builds, so just drop it
        for _ in 0..self.config.poll_budget {
            if self.read_link()?.is_none() {
                break;
            }
        }

        self.write_command_check_ok(Command::Verbose(false))?;
        self.write_command_check_ok(Command::Echo(false))?;
        self.write_command_check_ok(Command::BulkData(true))?;
        self.write_command_check_ok(Command::AsyncMessageFormat(true))?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Status
    // ------------------------------------------------------------------

    /// Engine started and not faulted
    pub fn is_started(&self) -> bool {
        self.started
    }

    /// The fault latch is set
    pub fn has_fault(&self) -> bool {
        self.fault
    }

    /// State of one connection
    pub fn connection(&self, cid: Cid) -> &Connection {
        self.state.table.get(cid)
    }

    /// Associated with an access point
    pub fn is_associated(&self) -> bool {
        self.state.table.is_associated()
    }

    /// Connection opened by the module's network connection manager
    pub fn ncm_auto_cid(&self) -> Option<Cid> {
        self.state.table.ncm_auto_cid()
    }

    /// Bulk payload bytes lost to buffer pressure since creation
    pub fn dropped_bytes(&self) -> u32 {
        self.state.frames.dropped()
    }

    /// Lifecycle events not yet delivered by [`poll`](Self::poll)
    pub fn pending_events(&self) -> Events {
        self.state.table.events()
    }

    /// Record a connection opened by a command (e.g. a TCP connect)
    pub fn register_connection(
        &mut self,
        cid: Cid,
        remote_ip: Ipv4Addr,
        remote_port: u16,
        local_port: u16,
    ) {
        self.state
            .table
            .connect(cid, remote_ip, remote_port, local_port, false);
    }

    /// Record that `cid` was closed by a command
    pub fn register_disconnect(&mut self, cid: Cid) {
        self.state.table.disconnect(cid);
    }

    /// Flag `cid` as an SSL connection
    pub fn set_ssl(&mut self, cid: Cid, ssl: bool) {
        self.state.table.set_ssl(cid, ssl);
    }

    // ------------------------------------------------------------------
    // Polling
    // ------------------------------------------------------------------

    /// Process ready bytes and deliver lifecycle events
    ///
    /// Stops early once a bulk frame starts arriving, so payload stays with
    /// the module until the application reads it, but always advances by at
    /// least one byte.
    pub fn poll<H: EventHandler + ?Sized>(&mut self, handler: &mut H) -> Result<()> {
        self.ensure_ready()?;

        for _ in 0..self.config.poll_budget {
            let Some(byte) = self.read_link()? else {
                break;
            };
            self.state.process_unsolicited(byte);
            if self.state.rx.in_bulk() {
                break;
            }
        }

        self.dispatch_events(handler);
        Ok(())
    }

    fn dispatch_events<H: EventHandler + ?Sized>(&mut self, handler: &mut H) {
        let table = &mut self.state.table;
        if table.take_event(Events::NCM_DISCONNECTED) {
            handler.on_ncm_disconnect();
        }
        if table.take_event(Events::DISASSOCIATED) {
            handler.on_disassociate();
        }
        if table.take_event(Events::ASSOCIATED) {
            handler.on_associate();
        }
        if table.take_event(Events::NCM_CONNECTED) {
            if let Some(cid) = table.ncm_auto_cid() {
                handler.on_ncm_connect(cid);
            }
        }
        if core::mem::take(&mut self.state.reset_detected) {
            handler.on_unexpected_reset();
        }
    }

    // ------------------------------------------------------------------
    // Reading bulk data
    // ------------------------------------------------------------------

    /// Bytes of `cid` that can be read right now without blocking
    ///
    /// With nothing buffered, one non-blocking read is done first so newly
    /// arrived data is not reported as absent.
    pub fn available(&mut self, cid: Cid) -> usize {
        if self.current_frame(Some(cid)).is_none() {
            return 0;
        }
        if self.state.frames.is_empty() {
            if let Ok(Some(byte)) = self.read_link() {
                self.state.process_unsolicited(byte);
            }
        }
        match self.state.frames.current() {
            Some(frame) if frame.cid == cid => self.state.frames.buffered(),
            _ => 0,
        }
    }

    /// Next byte of `cid` without consuming it
    pub fn peek(&mut self, cid: Cid) -> Option<u8> {
        if self.available(cid) > 0 {
            self.state.frames.peek()
        } else {
            None
        }
    }

    /// Read one byte of `cid`
    pub fn read(&mut self, cid: Cid) -> Option<u8> {
        self.current_frame(Some(cid))?;
        self.next_byte()
    }

    /// Read one byte of whichever connection has the oldest data
    pub fn read_any(&mut self) -> Option<(Cid, u8)> {
        let frame = self.current_frame(None)?;
        self.next_byte().map(|byte| (frame.cid, byte))
    }

    /// Connection with the oldest unread data
    pub fn first_cid_with_data(&mut self) -> Option<Cid> {
        self.current_frame(None).map(|frame| frame.cid)
    }

    /// Header of the oldest unread frame, if it belongs to `cid`
    ///
    /// For UDP server frames this carries the sender's address.
    pub fn frame(&mut self, cid: Cid) -> Option<RxFrame> {
        self.current_frame(Some(cid))
    }

    /// Read up to `buf.len()` bytes of `cid`
    ///
    /// Drains buffered payload across arena wraps and consecutive frames of
    /// the same connection, then reads straight from the link while the
    /// frame on the wire is the one being read.
    pub fn read_into(&mut self, cid: Cid, buf: &mut [u8]) -> usize {
        let mut read = 0;
        while read < buf.len() {
            if self.current_frame(Some(cid)).is_none() {
                break;
            }
            let n = self.state.frames.read_contiguous(&mut buf[read..]);
            if n > 0 {
                read += n;
                continue;
            }

            while read < buf.len() {
                match self.read_direct() {
                    Some(byte) => {
                        buf[read] = byte;
                        read += 1;
                    }
                    None => break,
                }
            }
            break;
        }
        read
    }

    /// Make sure a frame with unread data is current, reading from the link
    /// if necessary, and return it when it belongs to `cid` (any if `None`)
    fn current_frame(&mut self, cid: Option<Cid>) -> Option<RxFrame> {
        if !self.is_usable() {
            return None;
        }
        let mut budget = self.config.poll_budget;
        let frame = loop {
            if let Some(frame) = self.state.frames.current() {
                break frame;
            }
            if budget == 0 {
                return None;
            }
            budget -= 1;
            let byte = self.read_link().ok()??;
            self.state.process_unsolicited(byte);
        };

        match cid {
            Some(cid) if frame.cid != cid => None,
            _ => Some(frame),
        }
    }

    /// Next byte of the current frame, from the buffer or straight off the link
    fn next_byte(&mut self) -> Option<u8> {
        match self.state.frames.pop() {
            Some((_, byte)) => Some(byte),
            None => self.read_direct(),
        }
    }

    /// Read a payload byte of the current frame directly from the link
    ///
    /// Only possible while nothing is buffered and the frame arriving on the
    /// wire is the current one.
    fn read_direct(&mut self) -> Option<u8> {
        if !(self.state.frames.tail_is_receiving() && self.state.rx.in_payload()) {
            return None;
        }
        let byte = self.read_link().ok()??;
        match self.state.rx.step(byte) {
            RxEvent::Payload(byte) => {
                self.state.frames.consume_direct(1);
                Some(byte)
            }
            other => {
                self.state.handle(other);
                None
            }
        }
    }

    // ------------------------------------------------------------------
    // Writing bulk data
    // ------------------------------------------------------------------

    /// Send payload on a TCP or UDP client connection
    ///
    /// Split into frames of at most 1400 bytes; each frame waits for the
    /// module's go-ahead before its payload is sent. An empty payload sends
    /// nothing.
    pub fn write_data(&mut self, cid: Cid, data: &[u8]) -> Result<()> {
        self.ensure_ready()?;
        for chunk in data.chunks(MAX_BULK_CHUNK) {
            log::debug!(
                "Writing bulk data frame for cid {} containing {} bytes",
                cid,
                chunk.len()
            );
            let header = command::bulk_header(cid, chunk.len() as u16);
            self.write_frame(&header, chunk)?;
        }
        Ok(())
    }

    /// Send one datagram from a UDP server connection to `ip:port`
    pub fn write_udp_server(
        &mut self,
        cid: Cid,
        ip: Ipv4Addr,
        port: u16,
        data: &[u8],
    ) -> Result<()> {
        self.ensure_ready()?;
        if data.len() > MAX_BULK_CHUNK {
            return Err(EngineError::PayloadTooLarge {
                len: data.len(),
                max: MAX_BULK_CHUNK,
            });
        }
        log::debug!(
            "Writing UDP server frame for cid {} to {}:{} containing {} bytes",
            cid,
            ip,
            port,
            data.len()
        );
        let header = command::udp_server_header(cid, ip, port, data.len() as u16);
        self.write_frame(&header, data)
    }

    fn write_frame(&mut self, header: &[u8], payload: &[u8]) -> Result<()> {
        let (prefix, rest) = header.split_at(HEADER_PREFIX_LEN.min(header.len()));

        self.state.awaiting_data_reply = true;
        self.state.data_reply = None;
        let go_ahead = self
            .write_raw(prefix)
            .and_then(|()| self.await_data_reply());
        self.state.awaiting_data_reply = false;

        if let Err(e) = go_ahead {
            log::error!("Sending bulk data frame failed: {}", e);
            return Err(e);
        }
        self.write_raw(rest)?;
        self.write_raw(payload)
    }

    fn await_data_reply(&mut self) -> Result<()> {
        let start = self.clock.get_time_ms();
        loop {
            if let Some(ok) = self.state.data_reply.take() {
                return if ok {
                    Ok(())
                } else {
                    Err(EngineError::WriteRejected)
                };
            }
            match self.read_link()? {
                Some(byte) => self.state.process_unsolicited(byte),
                None => self.check_timeout(start, "Data response timeout")?,
            }
        }
    }

    // ------------------------------------------------------------------
    // Commands and replies
    // ------------------------------------------------------------------

    /// Send one command line
    pub fn write_command(&mut self, command: Command<'_>) -> Result<()> {
        self.ensure_ready()?;
        let line = command.encode();
        self.write_raw(&line)
    }

    /// Send a command and require a SUCCESS reply
    pub fn write_command_check_ok(&mut self, command: Command<'_>) -> Result<()> {
        self.write_command(command)?;
        match self.read_response()? {
            ResponseCode::Success => Ok(()),
            code => Err(EngineError::CommandFailed(code)),
        }
    }

    /// Wait for the reply code, discarding data lines
    pub fn read_response(&mut self) -> Result<ResponseCode> {
        let mut buf = [0u8; MAX_RESPONSE_SIZE];
        let data = self.read_response_internal(&mut buf, false, LineSink::Discard)?;
        Ok(data.code)
    }

    /// Wait for the reply to a command that may answer `CONNECT <cid>`
    pub fn read_response_connect(&mut self) -> Result<(ResponseCode, Option<Cid>)> {
        let mut buf = [0u8; MAX_RESPONSE_SIZE];
        let data = self.read_response_internal(&mut buf, true, LineSink::Discard)?;
        Ok((data.code, data.connect_cid))
    }

    /// Wait for the reply code, keeping data lines in `buf`
    ///
    /// Each kept line ends in `\r\n`. If `buf` fills up, the reply code still
    /// wins over data and the result is marked truncated. `buf` must hold at
    /// least [`MAX_RESPONSE_SIZE`] bytes.
    pub fn read_response_into(&mut self, buf: &mut [u8]) -> Result<ResponseData> {
        if buf.len() < MAX_RESPONSE_SIZE {
            return Err(EngineError::BufferTooSmall {
                len: buf.len(),
                min: MAX_RESPONSE_SIZE,
            });
        }
        self.read_response_internal(buf, false, LineSink::Keep)
    }

    /// Wait for the reply code, handing each data line to `on_line`
    pub fn read_response_lines(&mut self, mut on_line: impl FnMut(&[u8])) -> Result<ResponseCode> {
        let mut buf = [0u8; MAX_DATA_LINE_SIZE];
        let data =
            self.read_response_internal(&mut buf, false, LineSink::Callback(&mut on_line))?;
        Ok(data.code)
    }

    fn read_response_internal(
        &mut self,
        buf: &mut [u8],
        expect_connect: bool,
        mut sink: LineSink<'_>,
    ) -> Result<ResponseData> {
        self.ensure_ready()?;
        let mut lines = LineBuffer::new(buf);
        let mut connect_cid = None;
        let start = self.clock.get_time_ms();

        loop {
            let Some(byte) = self.read_link()? else {
                self.check_timeout(start, "Response timeout")?;
                continue;
            };

            let Some(text) = self.state.process(byte) else {
                continue;
            };

            if text != b'\r' && text != b'\n' {
                lines.push(text);
                continue;
            }

            // Collapses runs of line ends and drops empty lines
            if lines.line().is_empty() {
                continue;
            }
            if lines.take_skipped() {
                log::debug!("<<| Skipped uninteresting long line");
                continue;
            }

            let parsed = parse_line(lines.line(), expect_connect);
            log::debug!(
                "<<= {:?} ({:?})",
                core::str::from_utf8(lines.line()).unwrap_or("<binary>"),
                parsed.code
            );

            if parsed.code == ResponseCode::LinkLost {
                self.state.table.disassociate();
            }
            if parsed.connect_cid.is_some() {
                connect_cid = parsed.connect_cid;
            }

            let unknown = parsed.code == ResponseCode::Unknown;
            match &mut sink {
                LineSink::Keep => lines.finish_line(unknown),
                LineSink::Callback(on_line) => {
                    if unknown {
                        (**on_line)(lines.line());
                    }
                    lines.finish_line(false);
                }
                LineSink::Discard => lines.finish_line(false),
            }

            if parsed.code.is_final() {
                return Ok(ResponseData {
                    code: parsed.code,
                    len: lines.len(),
                    truncated: lines.truncated(),
                    connect_cid,
                });
            }
        }
    }

    // ------------------------------------------------------------------
    // Link access and fault latch
    // ------------------------------------------------------------------

    fn is_usable(&self) -> bool {
        self.started && !self.fault
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.fault {
            Err(EngineError::Fault)
        } else if !self.started {
            Err(EngineError::NotStarted)
        } else {
            Ok(())
        }
    }

    fn latch(&mut self, reason: &str) {
        log::error!("{}: entering unrecoverable fault state", reason);
        self.fault = true;
    }

    fn elapsed_ms(&self, start: u64) -> u64 {
        self.clock.get_time_ms().saturating_sub(start)
    }

    fn check_timeout(&mut self, start: u64, what: &str) -> Result<()> {
        if self.elapsed_ms(start) > self.config.response_timeout_ms as u64 {
            // Framing state cannot be trusted after a missed reply
            self.latch(what);
            return Err(EngineError::Timeout);
        }
        Ok(())
    }

    fn read_link(&mut self) -> Result<Option<u8>> {
        self.ensure_ready()?;
        match self.link.read_byte() {
            Ok(byte) => Ok(byte),
            Err(e) => Err(self.link_failed(e)),
        }
    }

    fn write_raw(&mut self, data: &[u8]) -> Result<()> {
        self.ensure_ready()?;
        let state = &mut self.state;
        let result = self.link.write_bytes(data, &mut |byte| {
            state.process_unsolicited(byte);
        });
        result.map_err(|e| self.link_failed(e))
    }

    fn link_failed(&mut self, e: LinkError) -> EngineError {
        match e {
            LinkError::DeadLink => self.latch("SPI link dead"),
            LinkError::Transport => self.latch("Transport error"),
            // The write is abandoned; the module may accept the next one
            LinkError::Stalled => log::warn!("Write stalled, data not sent"),
        }
        EngineError::Link(e)
    }
}
