// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! QR payload decoding and canonicalization.

use crate::canon::canon_id;
use crate::frame::Frame;

const MIN_LUMINANCE: f32 = 10.0;

/// Decode source, reported alongside the raw payload for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeSource {
    Primary,
    Secondary,
}

/// A QR decoding backend. The primary decoder is tried first; the secondary
/// is a fallback for frames the primary can't read. Both are external —
/// this crate only owns the luminance gate and canonicalization around them.
pub trait QrDecoder: Send + Sync {
    fn decode_primary(&self, frame: &Frame) -> Option<String>;
    fn decode_secondary(&self, frame: &Frame) -> Option<String>;
}

/// Result of scanning one frame for a QR payload.
pub struct QrScan {
    pub raw: String,
    pub canonical: String,
    pub source: DecodeSource,
}

/// Scan a frame for a QR payload, rejecting frames that are too dark to
/// plausibly contain a readable code.
pub fn scan_qr_from_frame(frame: &Frame, decoder: &dyn QrDecoder) -> Option<QrScan> {
    if frame.mean_luminance < MIN_LUMINANCE {
        return None;
    }

    if let Some(raw) = decoder.decode_primary(frame) {
        return Some(QrScan { canonical: canon_id(&raw), raw, source: DecodeSource::Primary });
    }
    if let Some(raw) = decoder.decode_secondary(frame) {
        return Some(QrScan { canonical: canon_id(&raw), raw, source: DecodeSource::Secondary });
    }
    None
}

#[cfg(test)]
#[path = "qr_tests.rs"]
mod tests;
