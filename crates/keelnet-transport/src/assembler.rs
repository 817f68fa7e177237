//! De-framing: recovering frame boundaries from a TCP byte stream.
//!
//! TCP delivers a stream, not messages. One `read` may return half a
//! header, three frames and a bit, or anything in between. The
//! [`FrameAssembler`] accumulates bytes and cuts whole frames out using the
//! `total_size` field of the cleartext header.
//!
//! ```text
//!            ┌─────────── consumed ──────────┐┌── unconsumed ──┐
//! buf:  [ frame A ][ frame B ][ frame C (partial) ...            ]
//!                             ^ pos                              ^ len
//! ```
//!
//! Extraction only advances `pos`. [`compact`](FrameAssembler::compact)
//! shifts the unconsumed tail to the front once per read, so a burst of
//! small frames costs one copy instead of one per frame.

use keelnet_protocol::{Frame, FrameCodec, FrameError, HEADER_SIZE, peek_total_size};

use crate::TransportError;

/// Where the assembler is in the current frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Fewer than 16 bytes are buffered.
    AwaitingHeader,
    /// The header is in; waiting until `total_size` bytes are buffered.
    AwaitingBody { total_size: usize },
}

/// Outcome of cutting one frame out of the buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assembled {
    /// The frame decoded and passed its integrity check.
    Frame(Frame),
    /// The frame's bytes were consumed but it failed to decode. The stream
    /// is still in sync.
    Dropped(FrameError),
}

/// Accumulation buffer plus the framing rules around it.
#[derive(Debug)]
pub struct FrameAssembler {
    buf: Vec<u8>,
    pos: usize,
    max_frame_size: usize,
}

impl FrameAssembler {
    pub fn new(max_frame_size: usize) -> Self {
        Self {
            buf: Vec::with_capacity(max_frame_size),
            pos: 0,
            max_frame_size,
        }
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Bytes received but not yet consumed by a frame.
    pub fn buffered(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn phase(&self) -> Phase {
        match peek_total_size(&self.buf[self.pos..]) {
            Some(total) => Phase::AwaitingBody {
                total_size: total as usize,
            },
            None => Phase::AwaitingHeader,
        }
    }

    /// Appends freshly read bytes. Partial data is never discarded.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Cuts the next complete frame out of the buffer and decodes it.
    ///
    /// Returns `Ok(None)` when more bytes are needed.
    ///
    /// # Errors
    /// [`TransportError::FrameTooLarge`] or [`TransportError::FrameTooSmall`]
    /// when the header's `total_size` is out of bounds. Both are fatal: the
    /// next frame boundary is unknown, so the caller must disconnect.
    pub fn next_frame(&mut self, codec: &FrameCodec) -> Result<Option<Assembled>, TransportError> {
        let pending = &self.buf[self.pos..];
        let Some(total) = peek_total_size(pending) else {
            return Ok(None);
        };
        let total = total as usize;

        if total < HEADER_SIZE {
            return Err(TransportError::FrameTooSmall { size: total });
        }
        if total > self.max_frame_size {
            return Err(TransportError::FrameTooLarge {
                size: total,
                max: self.max_frame_size,
            });
        }
        if pending.len() < total {
            return Ok(None);
        }

        let result = codec.decode(&pending[..total]);
        self.pos += total;

        Ok(Some(match result {
            Ok(frame) => Assembled::Frame(frame),
            Err(e) => Assembled::Dropped(e),
        }))
    }

    /// Moves the unconsumed tail to the front of the buffer.
    pub fn compact(&mut self) {
        if self.pos == 0 {
            return;
        }
        let len = self.buf.len();
        self.buf.copy_within(self.pos..len, 0);
        self.buf.truncate(len - self.pos);
        self.pos = 0;
    }

    /// Forgets all buffered bytes but keeps the allocation, so a pooled
    /// assembler can serve the next connection without reallocating.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.pos = 0;
    }

    /// Allocated buffer capacity. Exposed for pool diagnostics.
    pub fn capacity(&self) -> usize {
        self.buf.capacity()
    }
}
