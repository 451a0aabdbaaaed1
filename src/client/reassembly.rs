// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use bytes::Bytes;
use serde_json::error::Category;
use tracing::warn;

use crate::models::envelope::Envelope;

/// Upper bound on retained partial data. The gateway splits large replies
/// across transport frames; without a cap a single injected bad frame would
/// grow the buffer forever.
pub const MAX_BUFFERED_BYTES: usize = 1024 * 1024;

/// Reassembles fragmented JSON envelopes.
///
/// Frames that parse on their own pass straight through and leave any
/// retained data untouched. Truncated frames accumulate until the combined
/// buffer parses, subject to [`MAX_BUFFERED_BYTES`]; hitting the cap drops
/// the buffered data with a warning.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    buf: Vec<u8>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Feeds one inbound frame. Returns the parsed envelope header together
    /// with the raw document it was parsed from (the frame itself, or the
    /// assembled buffer) so stage handlers can re-parse the body.
    pub fn push(&mut self, frame: &[u8]) -> Option<(Envelope, Bytes)> {
        match serde_json::from_slice::<Envelope>(frame) {
            Ok(envelope) => return Some((envelope, Bytes::copy_from_slice(frame))),
            Err(e) if is_truncation(&e) => {},
            Err(e) => {
                warn!(error = %e, frame_len = frame.len(), "dropping frame that does not match the envelope schema");
                return None;
            },
        }

        if !self.buf.is_empty() && self.buf.len() + frame.len() > MAX_BUFFERED_BYTES {
            warn!(
                buffered = self.buf.len(),
                incoming = frame.len(),
                max = MAX_BUFFERED_BYTES,
                "partial-frame buffer would exceed its cap; discarding buffered data"
            );
            self.buf.clear();
        }
        self.buf.extend_from_slice(frame);

        match serde_json::from_slice::<Envelope>(&self.buf) {
            Ok(envelope) => {
                let raw = Bytes::from(std::mem::take(&mut self.buf));
                Some((envelope, raw))
            },
            Err(e) if is_truncation(&e) => {
                if self.buf.len() > MAX_BUFFERED_BYTES {
                    warn!(
                        buffered = self.buf.len(),
                        max = MAX_BUFFERED_BYTES,
                        "partial-frame buffer exceeds its cap; discarding buffered data"
                    );
                    self.buf.clear();
                }
                None
            },
            Err(e) => {
                warn!(error = %e, "dropping assembled document that does not match the envelope schema");
                self.buf.clear();
                None
            },
        }
    }
}

/// Whether a parse failure means "feed me more bytes" rather than "this
/// document is wrong". Mid-document cuts surface as `Eof`, cuts that land
/// at a token boundary of a later fragment surface as `Syntax`.
fn is_truncation(e: &serde_json::Error) -> bool {
    matches!(e.classify(), Category::Eof | Category::Syntax)
}
