//! Incremental yEnc body encoder
//!
//! Line-wrapped, escape-aware encoding driven by the static lookup tables:
//! mid-line bytes branch on a single [`ESCAPE_LUT`] load, line edges use
//! [`ESCAPED_LUT`] which additionally covers `'\t'`, `' '` and `'.'` (the
//! dot-stuffing and trailing-whitespace hazards). The column counter
//! persists across calls so arbitrary write chunking produces the same wire
//! bytes as a single pass.

use crate::lut::{ESCAPE_LUT, ESCAPED_LUT};
use crate::simd::{self, EncodeFn};

/// Maximum possible length of yEnc encoded output for `len` input bytes at
/// the given line length, including the over-write headroom the SIMD fast
/// paths need for full-lane stores.
pub fn max_encoded_length(len: usize, line_length: usize) -> usize {
    let ret = len * 2 // all characters escaped
        + 2 // offset slack; a line break may occur early
        + 64; // SIMD lane over-write headroom

    // Line breaks, assuming every character escaped
    if line_length == 128 {
        ret + 2 * (len >> 6)
    } else {
        ret + 2 * ((len * 2) / line_length)
    }
}

/// Encode `src` into `dst` with line wrapping every `line_size` columns.
///
/// `col` is the column of the next byte on the current line and persists
/// across calls; pass 0 at the start of a stream. `dst` must hold at least
/// [`max_encoded_length`]`(src.len(), line_size)` bytes. Returns the number
/// of bytes written.
///
/// Lines are separated by CRLF; no trailing CRLF is emitted, so a final line
/// break (or the `=yend` trailer) is the caller's job.
pub fn encode_incremental(dst: &mut [u8], src: &[u8], line_size: usize, col: &mut usize) -> usize {
    encode_scalar(dst, src, line_size, col, simd::encode_kernel_fn())
}

pub(crate) fn encode_scalar(
    dst: &mut [u8],
    src: &[u8],
    line_size: usize,
    col: &mut usize,
    fast: Option<EncodeFn>,
) -> usize {
    if src.is_empty() {
        return 0;
    }

    let mut p = 0; // dst write offset
    let mut i = 0; // src read offset

    if *col == 0 {
        // First column of the first line: '.', TAB and SPACE escape here
        let c = src[i];
        i += 1;
        let e = ESCAPED_LUT[c as usize];
        if e != 0 {
            dst[p] = e as u8;
            dst[p + 1] = (e >> 8) as u8;
            p += 2;
            *col = 2;
        } else {
            dst[p] = c.wrapping_add(42);
            p += 1;
            *col = 1;
        }
    }

    while i < src.len() {
        // Line body
        while *col < line_size - 1 && i < src.len() {
            if let Some(fast) = fast {
                // Bound the bulk run to the line remainder so wrapping is
                // identical to the byte-at-a-time path
                let budget = (line_size - 1 - *col).min(src.len() - i);
                if budget >= 16 {
                    let n = fast(&mut dst[p..], &src[i..i + budget]);
                    if n > 0 {
                        p += n;
                        i += n;
                        *col += n;
                        continue;
                    }
                }
            }
            let c = src[i];
            i += 1;
            let encoded = ESCAPE_LUT[c as usize];
            if encoded != 0 {
                dst[p] = encoded;
                p += 1;
                *col += 1;
            } else {
                let e = ESCAPED_LUT[c as usize];
                dst[p] = e as u8;
                dst[p + 1] = (e >> 8) as u8;
                p += 2;
                *col += 2;
            }
        }

        if i >= src.len() {
            break;
        }

        // Last column of the line: whitespace still escapes, but '.' is safe
        // here (it cannot alias with dot-stuffing mid-line)
        if *col < line_size {
            let c = src[i];
            i += 1;
            let e = ESCAPED_LUT[c as usize];
            if e != 0 && c != b'.' - 42 {
                dst[p] = e as u8;
                dst[p + 1] = (e >> 8) as u8;
                p += 2;
            } else {
                dst[p] = c.wrapping_add(42);
                p += 1;
            }
            *col = line_size;
        }

        if i >= src.len() {
            break;
        }

        // CRLF, then the first column of the next line
        let c = src[i];
        i += 1;
        let e = ESCAPED_LUT[c as usize];
        dst[p] = b'\r';
        dst[p + 1] = b'\n';
        if e != 0 {
            dst[p + 2] = e as u8;
            dst[p + 3] = (e >> 8) as u8;
            p += 4;
            *col = 2;
        } else {
            dst[p + 2] = c.wrapping_add(42);
            p += 3;
            *col = 1;
        }
    }

    p
}
