//! Incremental yEnc body decoder
//!
//! The scalar core is a lookbehind state machine over the encoded stream: it
//! strips CRLF, decodes `=X` escapes, removes the stuffed dot at column 0 of
//! each line, and stops on the two terminators (`\r\n=y` control lines and
//! the `\r\n.\r\n` article end). Any control sequence that straddles the end
//! of the buffer is parked in [`State`] and resumed on the next call, so the
//! caller may split the stream at arbitrary byte boundaries.

use crate::simd::{self, DecodeFn};
use crate::types::{End, State};
use crate::{Error, Result};

/// Decode yEnc body bytes from `src` into `dst`, stopping at a terminator.
///
/// Returns `(n_dst, n_src, end)`: `n_dst` decoded bytes were written and
/// `n_src` source bytes consumed. When `end` is [`End::Control`] or
/// [`End::Article`], `n_src` points past the terminator bytes and the caller
/// backs up 2 or 3 bytes to re-present the terminator line to its header
/// parser.
///
/// # Errors
/// [`Error::DestinationTooSmall`] when `dst.len() < src.len()`; the decoder
/// may speculatively store a full SIMD lane, so the destination must cover
/// the whole source.
pub fn decode_incremental(
    dst: &mut [u8],
    src: &[u8],
    state: &mut State,
) -> Result<(usize, usize, End)> {
    if src.is_empty() {
        return Ok((0, 0, End::None));
    }
    if dst.len() < src.len() {
        return Err(Error::DestinationTooSmall);
    }

    Ok(decode_scalar(dst, src, state, simd::decode_kernel_fn()))
}

/// Resume dispatch target, one label per partially-seen control sequence.
#[derive(PartialEq)]
enum Phase {
    CrLfEq,
    Eq,
    Cr,
    CrLf,
    CrLfDt,
    CrLfDtCr,
    Main,
}

/// Scalar decoder core. `fast` is the optional SIMD kernel used to bulk
/// process runs free of CR/LF; passing `None` forces pure scalar decoding.
pub(crate) fn decode_scalar(
    dst: &mut [u8],
    src: &[u8],
    state: &mut State,
    fast: Option<DecodeFn>,
) -> (usize, usize, End) {
    let len = src.len();
    if len == 0 {
        return (0, 0, End::None);
    }

    let mut p = 0; // dst write offset
    let mut i = 0; // src read offset

    let mut phase = match *state {
        State::None => Phase::Main,
        State::CrLfEq => Phase::CrLfEq,
        State::Eq => Phase::Eq,
        State::Cr => Phase::Cr,
        State::CrLf => Phase::CrLf,
        State::CrLfDt => Phase::CrLfDt,
        State::CrLfDtCr => Phase::CrLfDtCr,
    };

    // Resume a control sequence that straddled the previous buffer.
    while phase != Phase::Main {
        match phase {
            Phase::CrLfEq => {
                if src[i] == b'y' {
                    *state = State::None;
                    return (p, i + 1, End::Control);
                }
                // Not a control line after all: plain escape introducer
                phase = Phase::Eq;
            }
            Phase::Eq => {
                let c = src[i];
                dst[p] = c.wrapping_sub(106);
                p += 1;
                i += 1;
                if c != b'\r' {
                    if i >= len {
                        *state = State::None;
                        return (p, i, End::None);
                    }
                    phase = Phase::Main;
                } else if i >= len {
                    // An escaped CR may still start a line ending
                    *state = State::Cr;
                    return (p, i, End::None);
                } else {
                    phase = Phase::Cr;
                }
            }
            Phase::Cr => {
                if src[i] != b'\n' {
                    // Stray CR is dropped
                    phase = Phase::Main;
                } else {
                    i += 1;
                    if i >= len {
                        *state = State::CrLf;
                        return (p, i, End::None);
                    }
                    phase = Phase::CrLf;
                }
            }
            Phase::CrLf => {
                if src[i] == b'.' {
                    i += 1;
                    if i >= len {
                        *state = State::CrLfDt;
                        return (p, i, End::None);
                    }
                    phase = Phase::CrLfDt;
                } else if src[i] == b'=' {
                    i += 1;
                    if i >= len {
                        *state = State::CrLfEq;
                        return (p, i, End::None);
                    }
                    if src[i] == b'y' {
                        *state = State::None;
                        return (p, i + 1, End::Control);
                    }
                    let c = src[i];
                    dst[p] = c.wrapping_sub(106);
                    p += 1;
                    if c == b'\r' {
                        // Reprocess the CR for line-ending detection
                        phase = Phase::Main;
                    } else {
                        i += 1;
                        if i >= len {
                            *state = State::None;
                            return (p, i, End::None);
                        }
                        phase = Phase::Main;
                    }
                } else {
                    phase = Phase::Main;
                }
            }
            Phase::CrLfDt => {
                if src[i] == b'\r' {
                    i += 1;
                    if i >= len {
                        *state = State::CrLfDtCr;
                        return (p, i, End::None);
                    }
                    phase = Phase::CrLfDtCr;
                } else if src[i] == b'=' {
                    // Dot-stuffed control candidate: \r\n.=y
                    i += 1;
                    if i >= len {
                        *state = State::CrLfEq;
                        return (p, i, End::None);
                    }
                    if src[i] == b'y' {
                        *state = State::None;
                        return (p, i + 1, End::Control);
                    }
                    let c = src[i];
                    dst[p] = c.wrapping_sub(106);
                    p += 1;
                    if c == b'\r' {
                        phase = Phase::Main;
                    } else {
                        i += 1;
                        if i >= len {
                            *state = State::None;
                            return (p, i, End::None);
                        }
                        phase = Phase::Main;
                    }
                } else {
                    // The stuffed dot was consumed and dropped; fresh data follows
                    phase = Phase::Main;
                }
            }
            Phase::CrLfDtCr => {
                if src[i] == b'\n' {
                    *state = State::CrLf;
                    return (p, i + 1, End::Article);
                }
                // The parked CR was a stray; drop it and continue
                phase = Phase::Main;
            }
            Phase::Main => unreachable!(),
        }
    }

    *state = State::None;

    // Main loop, reserving two bytes of lookahead so src[i+1] and src[i+2]
    // are always in bounds.
    let guard = len.saturating_sub(2);
    while i < guard {
        match src[i] {
            b'\r' => {
                if src[i + 1] != b'\n' {
                    i += 1;
                    continue;
                }
                match src[i + 2] {
                    b'.' => {
                        // Dot-unstuffing: skip \r\n. and inspect what follows
                        i += 3;
                        if i >= len {
                            *state = State::CrLfDt;
                            return (p, i, End::None);
                        }
                        if src[i] == b'\r' {
                            i += 1;
                            if i >= len {
                                *state = State::CrLfDtCr;
                                return (p, i, End::None);
                            }
                            if src[i] == b'\n' {
                                *state = State::CrLf;
                                return (p, i + 1, End::Article);
                            }
                            // Stray CR after the dot is dropped
                        } else if src[i] == b'=' {
                            i += 1;
                            if i >= len {
                                *state = State::CrLfEq;
                                return (p, i, End::None);
                            }
                            if src[i] == b'y' {
                                *state = State::None;
                                return (p, i + 1, End::Control);
                            }
                            let c = src[i];
                            dst[p] = c.wrapping_sub(106);
                            p += 1;
                            if c == b'\r' {
                                continue;
                            }
                            i += 1;
                        }
                        continue;
                    }
                    b'=' => {
                        // \r\n= is a control-line candidate
                        i += 3;
                        if i >= len {
                            *state = State::CrLfEq;
                            return (p, i, End::None);
                        }
                        if src[i] == b'y' {
                            *state = State::None;
                            return (p, i + 1, End::Control);
                        }
                        let c = src[i];
                        dst[p] = c.wrapping_sub(106);
                        p += 1;
                        if c == b'\r' {
                            continue;
                        }
                        i += 1;
                        continue;
                    }
                    _ => {
                        // Bare line ending
                        i += 2;
                        continue;
                    }
                }
            }
            b'\n' => {
                i += 1;
                continue;
            }
            b'=' => {
                let c = src[i + 1];
                dst[p] = c.wrapping_sub(106);
                p += 1;
                if c != b'\r' {
                    i += 2;
                } else {
                    // Advance past '=' only; the CR may start a line ending
                    i += 1;
                }
                continue;
            }
            _ => {
                if let Some(fast) = fast {
                    let (nd, ns) = fast(&mut dst[p..], &src[i..guard]);
                    if ns > 0 {
                        p += nd;
                        i += ns;
                        continue;
                    }
                }
                dst[p] = src[i].wrapping_sub(42);
                p += 1;
                i += 1;
            }
        }
    }

    // Handle the last two bytes with explicit bounds.
    if len >= 2 && i == len - 2 {
        match src[i] {
            b'\r' => {
                if src[i + 1] == b'\n' {
                    *state = State::CrLf;
                    return (p, i + 2, End::None);
                }
                // Stray CR
                i += 1;
            }
            b'\n' => {
                i += 1;
            }
            b'=' => {
                let c = src[i + 1];
                dst[p] = c.wrapping_sub(106);
                p += 1;
                if c != b'\r' {
                    i += 2;
                } else {
                    i += 1;
                }
            }
            c => {
                dst[p] = c.wrapping_sub(42);
                p += 1;
                i += 1;
            }
        }
    }

    // Final byte
    if i == len - 1 {
        match src[i] {
            b'=' => *state = State::Eq,
            b'\r' => *state = State::Cr,
            b'\n' => {}
            c => {
                dst[p] = c.wrapping_sub(42);
                p += 1;
            }
        }
        i += 1;
    }

    (p, i, End::None)
}
