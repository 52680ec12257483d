//! Frame reassembly from a chunked byte stream
//!
//! TCP delivers bytes in whatever chunks the network produced, so frame
//! boundaries rarely line up with reads. The reassembler accumulates bytes,
//! resynchronizes on a start marker and cuts out exactly one length-delimited
//! span at a time. A span is only cut when it ends in the end marker;
//! checksums and structure are left to the validator.
//!
//! A start marker can be a false one: a stray `0x78` ahead of a real frame, or
//! a real marker whose length byte was corrupted. Such a marker is given up as
//! soon as its span completes without an end marker, or as soon as a later
//! marker in the buffer describes a complete, terminated span.

use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;
use tracing::trace;

use super::envelope::FrameFormat;
use crate::error::{GatewayError, Result};
use crate::types::protocol_codes::marker;
use crate::types::{Envelope, RawFrame};

/// Running totals kept by a reassembler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReassemblerStats {
    /// Candidates emitted.
    pub frames: u64,
    /// Bytes dropped while searching for a start marker.
    pub discarded_bytes: u64,
    /// Rejected candidates handed back for rescanning.
    pub resyncs: u64,
}

/// Per-connection accumulation buffer.
///
/// Owned by exactly one connection task; never shared.
#[derive(Debug)]
pub struct FrameReassembler {
    format: FrameFormat,
    buffer: BytesMut,
    stats: ReassemblerStats,
}

impl FrameReassembler {
    pub fn new(format: FrameFormat) -> Self {
        Self::with_capacity(format, 0)
    }

    pub fn with_capacity(format: FrameFormat, capacity: usize) -> Self {
        Self { format, buffer: BytesMut::with_capacity(capacity), stats: ReassemblerStats::default() }
    }

    /// Append a chunk and return every candidate it completes, in stream order.
    ///
    /// Candidates that later fail validation are not rescanned; use
    /// [`extend`](Self::extend) with [`next_candidate`](Self::next_candidate)
    /// and [`resync`](Self::resync) for that.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<RawFrame> {
        self.extend(chunk);
        std::iter::from_fn(|| self.next_candidate()).collect()
    }

    /// Append a chunk without cutting anything.
    pub fn extend(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Cut the next complete candidate, if the buffer holds one.
    pub fn next_candidate(&mut self) -> Option<RawFrame> {
        cut_frame(&self.format, &mut self.buffer, &mut self.stats)
    }

    /// Hand back a candidate the validator refused.
    ///
    /// Everything after its first byte goes back in front of the buffer, so a
    /// valid frame swallowed by a corrupt length field is found again. Must be
    /// called before the next [`next_candidate`](Self::next_candidate).
    pub fn resync(&mut self, rejected: &RawFrame) {
        if rejected.bytes.is_empty() {
            return;
        }
        let tail = &rejected.bytes[1..];
        let mut buffer = BytesMut::with_capacity(tail.len() + self.buffer.len());
        buffer.extend_from_slice(tail);
        buffer.extend_from_slice(&self.buffer);
        self.buffer = buffer;
        self.stats.discarded_bytes += 1;
        self.stats.resyncs += 1;
        trace!("Rescanning {} bytes of a rejected frame", tail.len());
    }

    /// Bytes held back waiting for the rest of a frame.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn stats(&self) -> ReassemblerStats {
        self.stats
    }

    pub fn format(&self) -> FrameFormat {
        self.format
    }

    /// Drop any partial frame.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Decoder for FrameReassembler {
    type Item = RawFrame;
    type Error = GatewayError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<RawFrame>> {
        Ok(cut_frame(&self.format, src, &mut self.stats))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<RawFrame>> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None => {
                // A partial frame at EOF is just lost, not a stream error
                if !src.is_empty() {
                    trace!("Dropping {} unframed bytes at end of stream", src.len());
                    src.clear();
                }
                Ok(None)
            }
        }
    }
}

/// How much of the span starting at `buf[0]` has arrived.
enum Span {
    /// Length field or body still missing.
    Pending,
    /// All `total` bytes are buffered and the last two are the end marker.
    Terminated(usize),
    /// All bytes are buffered but the end marker is not where the length says.
    Unterminated,
}

fn measure(format: &FrameFormat, envelope: Envelope, buf: &[u8]) -> Span {
    let Some(declared) = envelope.read_length(buf) else {
        return Span::Pending;
    };
    let total = format.frame_len(envelope, declared);
    match buf.get(..total) {
        None => Span::Pending,
        Some(span) if span.ends_with(&marker::END) => Span::Terminated(total),
        Some(_) => Span::Unterminated,
    }
}

/// Offset of the first start marker in `buf` at or after `from`.
fn find_marker(buf: &[u8], from: usize) -> Option<(usize, Envelope)> {
    buf.get(from..)?
        .windows(marker::LEN)
        .enumerate()
        .find_map(|(offset, pair)| {
            Envelope::from_marker(pair[0], pair[1]).map(|env| (from + offset, env))
        })
}

/// Offset of the first marker after the front one whose span is already complete.
fn terminated_after_front(format: &FrameFormat, buf: &[u8]) -> Option<usize> {
    let mut from = 1;
    while let Some((offset, envelope)) = find_marker(buf, from) {
        if let Span::Terminated(_) = measure(format, envelope, &buf[offset..]) {
            return Some(offset);
        }
        from = offset + 1;
    }
    None
}

fn discard(buf: &mut BytesMut, count: usize, stats: &mut ReassemblerStats) {
    if count == 0 {
        return;
    }
    buf.advance(count);
    stats.discarded_bytes += count as u64;
    trace!("Discarded {} bytes of noise", count);
}

/// Cut the next complete candidate off the front of `buf`.
fn cut_frame(
    format: &FrameFormat,
    buf: &mut BytesMut,
    stats: &mut ReassemblerStats,
) -> Option<RawFrame> {
    loop {
        let Some((offset, envelope)) = find_marker(buf, 0) else {
            // Keep a possible split marker prefix, nothing more
            let keep = buf.len().min(marker::LEN - 1);
            let noise = buf.len() - keep;
            discard(buf, noise, stats);
            return None;
        };
        discard(buf, offset, stats);

        match measure(format, envelope, buf) {
            Span::Terminated(total) => {
                let bytes = buf.split_to(total).freeze();
                stats.frames += 1;
                return Some(RawFrame::new(envelope, bytes));
            }
            Span::Unterminated => discard(buf, 1, stats),
            Span::Pending => {
                let later = terminated_after_front(format, buf)?;
                discard(buf, later, stats);
            }
        }
    }
}
