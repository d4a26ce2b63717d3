// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Bulk payload ring buffer and frame queue
//!
//! Payload bytes of every connection share one fixed byte arena. The oldest
//! unconsumed frame is kept as `tail_frame`. A frame that arrives while older
//! payload is still buffered is stored as a small header record in the arena
//! itself, right before its payload, so headers and payload compete for the
//! same space and data is only lost when the arena really is full.
//!
//! ```text
//!   arena:   [ tail frame bytes | rec | frame bytes | rec | frame bytes ]
//!              ^ tail                                            head ^
//! ```
//!
//! A record never straddles the end of the arena. When fewer than
//! [`FRAME_RECORD_MAX`] bytes are left before the end, the writer restarts
//! at index 0 and the reader skips the same gap.

use crate::frame::{Cid, RxFrame};

/// Default arena size
pub const DEFAULT_RX_BUFFER: usize = 512;

/// Record size of a TCP or UDP client frame header
pub const FRAME_RECORD_CLIENT: usize = 3;

/// Record size of a UDP server frame header (adds sender address)
pub const FRAME_RECORD_MAX: usize = 9;

const RECORD_UDP_FLAG: u8 = 0x80;

/// Fixed-capacity frame queue over a power-of-two byte arena
#[derive(Debug)]
pub struct FrameQueue<const N: usize = DEFAULT_RX_BUFFER> {
    data: [u8; N],
    head: usize,
    tail: usize,
    tail_frame: Option<RxFrame>,
    records: usize,
    dropped: u32,
    damaged: u16,
}

impl<const N: usize> Default for FrameQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> FrameQueue<N> {
    const VALID_SIZE: () = assert!(
        N.is_power_of_two() && N >= 2,
        "ring buffer size must be a power of two"
    );

    /// Create an empty queue
    pub const fn new() -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::VALID_SIZE;
        Self {
            data: [0; N],
            head: 0,
            tail: 0,
            tail_frame: None,
            records: 0,
            dropped: 0,
            damaged: 0,
        }
    }

    #[inline]
    const fn next(index: usize) -> usize {
        (index + 1) & (N - 1)
    }

    /// Usable capacity in bytes (one slot stays free to tell full from empty)
    pub const fn capacity(&self) -> usize {
        N - 1
    }

    /// Occupied arena bytes, header records included
    pub fn len(&self) -> usize {
        self.head.wrapping_sub(self.tail) & (N - 1)
    }

    /// Free arena bytes
    pub fn free(&self) -> usize {
        self.capacity() - self.len()
    }

    /// Nothing buffered
    pub fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    /// Arena full (next write would overwrite the oldest byte)
    pub fn is_full(&self) -> bool {
        Self::next(self.head) == self.tail
    }

    /// Frames waiting behind the tail frame
    pub fn pending_frames(&self) -> usize {
        self.records
    }

    /// Payload bytes dropped because the arena overflowed
    pub fn dropped(&self) -> u32 {
        self.dropped
    }

    /// Connections that lost payload since the last call
    pub fn take_damaged(&mut self) -> impl Iterator<Item = Cid> {
        let mask = core::mem::take(&mut self.damaged);
        Cid::all().filter(move |cid| mask & (1 << cid.get()) != 0)
    }

    /// Forget all frames and payload (drop counter is kept)
    pub fn clear(&mut self) {
        self.head = 0;
        self.tail = 0;
        self.tail_frame = None;
        self.records = 0;
        self.damaged = 0;
    }

    /// Register the header of a frame that is about to be received
    ///
    /// With nothing buffered the frame becomes the tail frame directly.
    /// Otherwise its header is stored in the arena, dropping the oldest
    /// payload first if there is no room. Returns the number of payload
    /// bytes dropped.
    pub fn push_frame(&mut self, frame: RxFrame) -> usize {
        if frame.is_done() {
            return 0;
        }

        let before = self.dropped;
        if !self.is_empty() {
            let need = self.record_cost(Self::record_len(&frame));
            self.make_room(need);
        }

        if self.is_empty() {
            if let Some(stale) = self.tail_frame.filter(|f| !f.is_done()) {
                log::warn!(
                    "Frame for cid {} replaced with {} bytes never received",
                    stale.cid,
                    stale.length
                );
            }
            self.head = 0;
            self.tail = 0;
            self.records = 0;
            self.tail_frame = Some(frame);
        } else {
            self.write_record(&frame);
        }
        self.dropped.wrapping_sub(before) as usize
    }

    /// Append one payload byte for the frame being received
    ///
    /// When the arena is full the oldest buffered byte is dropped first.
    /// Returns the number of payload bytes dropped.
    pub fn push_byte(&mut self, byte: u8) -> usize {
        let before = self.dropped;
        self.make_room(1);

        self.data[self.head] = byte;
        self.head = Self::next(self.head);
        self.dropped.wrapping_sub(before) as usize
    }

    /// The oldest frame that still has unconsumed payload
    pub fn current(&mut self) -> Option<RxFrame> {
        if self.tail_done() {
            self.advance();
        }
        self.tail_frame.filter(|f| !f.is_done())
    }

    /// Buffered bytes of the current frame, readable without touching the link
    pub fn buffered(&mut self) -> usize {
        match self.current() {
            // Every queued header follows the complete payload of the tail frame
            Some(frame) if self.records > 0 => frame.length as usize,
            Some(frame) => self.len().min(frame.length as usize),
            None => 0,
        }
    }

    /// Next buffered byte of the current frame, without consuming it
    pub fn peek(&mut self) -> Option<u8> {
        if self.buffered() == 0 {
            return None;
        }
        Some(self.data[self.tail])
    }

    /// Consume one buffered byte of the current frame
    pub fn pop(&mut self) -> Option<(Cid, u8)> {
        if self.buffered() == 0 {
            return None;
        }
        let frame = self.tail_frame?;
        let byte = self.data[self.tail];
        self.tail = Self::next(self.tail);
        self.consume(1);
        Some((frame.cid, byte))
    }

    /// Copy buffered bytes of the current frame into `out`
    ///
    /// Reads one contiguous run, bounded by the physical end of the arena,
    /// the end of the frame and `out.len()`. Callers loop to continue past
    /// a wrap or into the next frame.
    pub fn read_contiguous(&mut self, out: &mut [u8]) -> usize {
        let buffered = self.buffered();
        if buffered == 0 || out.is_empty() {
            return 0;
        }

        let run = if self.head > self.tail {
            self.head - self.tail
        } else {
            N - self.tail
        };
        let len = run.min(buffered).min(out.len());

        out[..len].copy_from_slice(&self.data[self.tail..self.tail + len]);
        self.tail = (self.tail + len) & (N - 1);
        self.consume(len as u16);
        len
    }

    /// Account for `count` bytes of the current frame that were delivered
    /// straight from the link, bypassing the arena
    pub fn consume_direct(&mut self, count: u16) {
        self.consume(count);
    }

    /// Whether the current frame is the one still arriving on the wire
    ///
    /// True when nothing is buffered and no other frame is queued, so the
    /// next payload byte from the link belongs to the tail frame.
    pub fn tail_is_receiving(&self) -> bool {
        self.is_empty() && self.records == 0 && self.tail_frame.is_some_and(|f| !f.is_done())
    }

    fn tail_done(&self) -> bool {
        self.tail_frame.map_or(true, |f| f.is_done())
    }

    fn consume(&mut self, count: u16) {
        if let Some(frame) = self.tail_frame.as_mut() {
            frame.length = frame.length.saturating_sub(count);
        }
    }

    /// Move on to the next queued frame once the tail frame is used up
    fn advance(&mut self) {
        if self.records > 0 {
            self.tail_frame = Some(self.read_record());
        } else if !self.is_empty() {
            log::error!("{} buffered bytes without a frame, discarding", self.len());
            self.dropped = self.dropped.saturating_add(self.len() as u32);
            self.tail = self.head;
        }
    }

    /// Free at least `need` bytes, oldest data first, or empty the arena
    fn make_room(&mut self, need: usize) {
        while self.free() < need && !self.is_empty() {
            if self.tail_done() && self.records > 0 {
                self.advance();
                continue;
            }
            match self.pop() {
                Some((cid, _)) => {
                    self.dropped = self.dropped.saturating_add(1);
                    self.damaged |= 1 << cid.get();
                    log::warn!("RX buffer full, dropped byte for cid {}", cid);
                }
                None => {
                    log::error!("RX buffer holds no readable frame, discarding");
                    self.dropped = self.dropped.saturating_add(self.len() as u32);
                    self.clear();
                }
            }
        }
    }

    const fn record_len(frame: &RxFrame) -> usize {
        if frame.udp_server {
            FRAME_RECORD_MAX
        } else {
            FRAME_RECORD_CLIENT
        }
    }

    /// Records restart at index 0 when a full-size record would not fit
    /// before the end of the arena
    const fn record_start(index: usize) -> usize {
        if index + FRAME_RECORD_MAX > N {
            0
        } else {
            index
        }
    }

    /// Arena bytes a record written at `head` takes, skipped gap included
    fn record_cost(&self, len: usize) -> usize {
        if Self::record_start(self.head) == self.head {
            len
        } else {
            N - self.head + len
        }
    }

    fn write_record(&mut self, frame: &RxFrame) {
        let len = Self::record_len(frame);
        let at = Self::record_start(self.head);
        let record = &mut self.data[at..at + len];

        record[0] = frame.cid.get() | if frame.udp_server { RECORD_UDP_FLAG } else { 0 };
        record[1..3].copy_from_slice(&frame.length.to_le_bytes());
        if let Some((ip, port)) = frame.remote {
            record[3..7].copy_from_slice(&ip.octets());
            record[7..9].copy_from_slice(&port.to_le_bytes());
        }

        self.head = (at + len) & (N - 1);
        self.records += 1;
    }

    fn read_record(&mut self) -> RxFrame {
        let at = Self::record_start(self.tail);
        let tag = self.data[at];
        let length = u16::from_le_bytes([self.data[at + 1], self.data[at + 2]]);
        let cid = Cid::from_low_bits(tag);

        let (frame, len) = if tag & RECORD_UDP_FLAG != 0 {
            let ip = [
                self.data[at + 3],
                self.data[at + 4],
                self.data[at + 5],
                self.data[at + 6],
            ];
            let port = u16::from_le_bytes([self.data[at + 7], self.data[at + 8]]);
            (
                RxFrame::udp_server(cid, length, ip.into(), port),
                FRAME_RECORD_MAX,
            )
        } else {
            (RxFrame::client(cid, length), FRAME_RECORD_CLIENT)
        };

        self.tail = (at + len) & (N - 1);
        self.records -= 1;
        frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::net::Ipv4Addr;

    fn cid(n: u8) -> Cid {
        Cid::new(n).unwrap()
    }

    fn drain<const N: usize>(q: &mut FrameQueue<N>) -> Vec<(Cid, u8)> {
        let mut out = Vec::new();
        while let Some(b) = q.pop() {
            out.push(b);
        }
        out
    }

    #[test]
    fn test_first_frame_becomes_tail_directly() {
        let mut q: FrameQueue<16> = FrameQueue::new();
        assert_eq!(q.push_frame(RxFrame::client(cid(1), 3)), 0);
        assert_eq!(q.pending_frames(), 0);
        assert!(q.tail_is_receiving());

        q.push_byte(b'a');
        assert!(!q.tail_is_receiving());
        assert_eq!(q.buffered(), 1);
        assert_eq!(q.peek(), Some(b'a'));
        assert_eq!(q.pop(), Some((cid(1), b'a')));
        assert_eq!(q.current().map(|f| f.length), Some(2));
    }

    #[test]
    fn test_frames_drain_in_fifo_order() {
        let mut q: FrameQueue<32> = FrameQueue::new();
        q.push_frame(RxFrame::client(cid(1), 2));
        q.push_byte(b'a');
        q.push_byte(b'b');
        q.push_frame(RxFrame::client(cid(2), 1));
        q.push_byte(b'c');
        q.push_frame(RxFrame::client(cid(3), 2));
        q.push_byte(b'd');
        q.push_byte(b'e');
        assert_eq!(q.pending_frames(), 2);
        assert_eq!(q.len(), 5 + 2 * FRAME_RECORD_CLIENT);

        let got = drain(&mut q);
        assert_eq!(
            got,
            vec![
                (cid(1), b'a'),
                (cid(1), b'b'),
                (cid(2), b'c'),
                (cid(3), b'd'),
                (cid(3), b'e'),
            ]
        );
        assert!(q.current().is_none());
        assert!(q.is_empty());
    }

    #[test]
    fn test_many_small_frames_fit_without_loss() {
        let mut q: FrameQueue = FrameQueue::new();
        let mut dropped = 0;
        for i in 0..100u8 {
            dropped += q.push_frame(RxFrame::client(cid(i % 16), 1));
            dropped += q.push_byte(i);
        }
        assert_eq!(dropped, 0);
        assert_eq!(q.dropped(), 0);
        assert_eq!(q.take_damaged().count(), 0);

        let got = drain(&mut q);
        assert_eq!(got.len(), 100);
        for (i, (c, byte)) in got.into_iter().enumerate() {
            assert_eq!(c, cid(i as u8 % 16));
            assert_eq!(byte, i as u8);
        }
    }

    #[test]
    fn test_record_skips_gap_at_arena_end() {
        let mut q: FrameQueue<32> = FrameQueue::new();
        q.push_frame(RxFrame::client(cid(1), 26));
        for b in 0..26 {
            q.push_byte(b);
        }
        let mut out = [0u8; 32];
        assert_eq!(q.read_contiguous(&mut out[..22]), 22);

        // head is 26: a record there could straddle the end, so it goes to 0
        let ip = Ipv4Addr::new(192, 168, 1, 9);
        assert_eq!(q.push_frame(RxFrame::udp_server(cid(7), 2, ip, 4000)), 0);
        q.push_byte(b'x');
        q.push_byte(b'y');
        assert_eq!(q.len(), 4 + (32 - 26) + FRAME_RECORD_MAX + 2);

        let n = q.read_contiguous(&mut out);
        assert_eq!(&out[..n], &[22, 23, 24, 25]);
        let frame = q.current().unwrap();
        assert_eq!(frame.cid, cid(7));
        assert_eq!(frame.remote, Some((ip, 4000)));
        let n = q.read_contiguous(&mut out);
        assert_eq!(&out[..n], b"xy");
        assert!(q.is_empty());
        assert_eq!(q.dropped(), 0);
    }

    #[test]
    fn test_buffered_is_bounded_by_frame() {
        let mut q: FrameQueue<32> = FrameQueue::new();
        q.push_frame(RxFrame::client(cid(1), 1));
        q.push_byte(b'x');
        q.push_frame(RxFrame::client(cid(2), 3));
        q.push_byte(b'y');
        assert_eq!(q.buffered(), 1);
        assert_eq!(q.pop(), Some((cid(1), b'x')));
        assert_eq!(q.buffered(), 1);
    }

    #[test]
    fn test_full_arena_drops_oldest_and_reports_cid() {
        let mut q: FrameQueue<4> = FrameQueue::new();
        q.push_frame(RxFrame::client(cid(5), 10));
        for b in 0..3 {
            assert_eq!(q.push_byte(b), 0);
        }
        assert!(q.is_full());
        assert_eq!(q.push_byte(3), 1);
        assert_eq!(q.dropped(), 1);
        assert_eq!(q.take_damaged().collect::<Vec<_>>(), vec![cid(5)]);
        assert_eq!(q.take_damaged().count(), 0);
        // Frame shrank by the dropped byte
        assert_eq!(q.current().map(|f| f.length), Some(9));
        assert_eq!(drain(&mut q).len(), 3);
    }

    #[test]
    fn test_header_without_room_evicts_oldest_payload() {
        let mut q: FrameQueue<16> = FrameQueue::new();
        q.push_frame(RxFrame::client(cid(1), 6));
        for b in 0..6 {
            q.push_byte(b);
        }
        q.push_frame(RxFrame::client(cid(2), 4));
        for b in 10..14 {
            q.push_byte(b);
        }
        assert_eq!(q.free(), 2);

        // head is 13: the record restarts at 0, so the 3-byte gap and the
        // 3-byte record need 6 bytes, taken from the front of cid 1
        assert_eq!(q.push_frame(RxFrame::client(cid(3), 1)), 4);
        assert_eq!(q.push_byte(20), 1);
        assert_eq!(q.dropped(), 5);
        assert_eq!(q.take_damaged().collect::<Vec<_>>(), vec![cid(1)]);

        let got: Vec<(Cid, u8)> = drain(&mut q);
        assert_eq!(
            got,
            vec![
                (cid(1), 5),
                (cid(2), 10),
                (cid(2), 11),
                (cid(2), 12),
                (cid(2), 13),
                (cid(3), 20),
            ]
        );
        assert!(q.is_empty());
    }

    #[test]
    fn test_read_contiguous_stops_at_wrap() {
        let mut q: FrameQueue<8> = FrameQueue::new();
        q.push_frame(RxFrame::client(cid(0), 12));
        for b in 0..6 {
            q.push_byte(b);
        }
        let mut out = [0u8; 8];
        assert_eq!(q.read_contiguous(&mut out[..5]), 5);
        for b in 6..10 {
            q.push_byte(b);
        }
        // tail at 5, head wrapped to 2: first run reaches the arena end
        let n = q.read_contiguous(&mut out);
        assert_eq!(n, 3);
        assert_eq!(&out[..3], &[5, 6, 7]);
        let n = q.read_contiguous(&mut out);
        assert_eq!(&out[..n], &[8, 9]);
    }

    #[test]
    fn test_direct_consumption_tracks_tail() {
        let mut q: FrameQueue<8> = FrameQueue::new();
        q.push_frame(RxFrame::client(cid(4), 2));
        assert!(q.tail_is_receiving());
        q.consume_direct(2);
        assert!(q.current().is_none());
    }

    #[test]
    fn test_zero_length_frame_is_ignored() {
        let mut q: FrameQueue<8> = FrameQueue::new();
        assert_eq!(q.push_frame(RxFrame::client(cid(4), 0)), 0);
        assert!(q.current().is_none());
        assert_eq!(q.pending_frames(), 0);
    }
}
