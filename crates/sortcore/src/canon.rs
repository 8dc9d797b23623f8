// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Canonicalization of QR payloads and lane identifiers.

use unicode_normalization::UnicodeNormalization;

/// Canonicalize a raw string into the form used as a lane lookup key:
/// NFKD-decompose, drop combining marks, uppercase, strip everything that
/// isn't `[A-Z0-9]`, then strip any leading run of repeated `LOAI`/`LO`
/// tokens left over from printed-label prefixes.
pub fn canon_id(raw: &str) -> String {
    if raw.is_empty() {
        return String::new();
    }

    let upper = raw.trim().to_uppercase();
    let decomposed: String = upper.nfkd().filter(|c| !is_combining_mark(*c)).collect();
    let alnum: String = decomposed.chars().filter(|c| c.is_ascii_alphanumeric()).collect();

    strip_leading_prefix_tokens(&alnum)
}

fn is_combining_mark(c: char) -> bool {
    matches!(c as u32,
        0x0300..=0x036F | 0x1AB0..=0x1AFF | 0x1DC0..=0x1DFF | 0x20D0..=0x20FF | 0xFE20..=0xFE2F)
}

fn strip_leading_prefix_tokens(s: &str) -> String {
    let mut rest = s;
    loop {
        if let Some(stripped) = rest.strip_prefix("LOAI") {
            rest = stripped;
        } else if let Some(stripped) = rest.strip_prefix("LO") {
            rest = stripped;
        } else {
            break;
        }
    }
    rest.to_owned()
}

#[cfg(test)]
#[path = "canon_tests.rs"]
mod tests;
