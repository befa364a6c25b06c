//! SIMD fast paths for the yEnc codec
//!
//! The decoder kernel bulk-subtracts the 42 bias from 16- or 32-byte lanes
//! containing no CR/LF, resolving `=X` escapes in-lane where the instruction
//! set allows, and hands control back to the scalar state machine at line
//! structure. The encoder kernel bulk-adds the bias and bails before any
//! byte whose encoded form would need escaping.
//!
//! CPU features are detected once and the chosen kernels cached in function
//! pointers; every kernel is byte-for-byte equivalent to the scalar core.

use std::sync::OnceLock;

use tracing::debug;

/// Bulk body decode: returns `(n_dst, n_src)` with `n_src >= n_dst`.
///
/// Stops before any CR or LF and never consumes a trailing unmatched `'='`.
/// Requires `dst.len() >= src.len()` because full lanes are stored
/// speculatively.
pub(crate) type DecodeFn = fn(&mut [u8], &[u8]) -> (usize, usize);

/// Bulk body encode: adds the bias to a prefix of `src` whose encoded form
/// needs no escaping and returns the number of bytes processed.
pub(crate) type EncodeFn = fn(&mut [u8], &[u8]) -> usize;

struct Kernel {
    decode: Option<DecodeFn>,
    encode: Option<EncodeFn>,
    name: &'static str,
}

fn kernel() -> &'static Kernel {
    static KERNEL: OnceLock<Kernel> = OnceLock::new();
    KERNEL.get_or_init(|| {
        let kernel = detect();
        debug!(kernel = kernel.name, "selected codec kernel");
        kernel
    })
}

/// Name of the implementation used for decode operations.
pub fn decode_kernel() -> &'static str {
    let k = kernel();
    if k.decode.is_some() { k.name } else { "generic" }
}

/// Name of the implementation used for encode operations.
pub fn encode_kernel() -> &'static str {
    let k = kernel();
    if k.encode.is_some() { k.name } else { "generic" }
}

pub(crate) fn decode_kernel_fn() -> Option<DecodeFn> {
    kernel().decode
}

pub(crate) fn encode_kernel_fn() -> Option<EncodeFn> {
    kernel().encode
}

#[cfg(target_arch = "x86_64")]
fn detect() -> Kernel {
    if is_x86_feature_detected!("avx2") {
        return Kernel {
            decode: Some(decode_avx2_entry),
            encode: Some(encode_sse2_entry),
            name: "AVX2",
        };
    }
    if is_x86_feature_detected!("ssse3") {
        return Kernel {
            decode: Some(decode_ssse3_entry),
            encode: Some(encode_sse2_entry),
            name: "SSSE3",
        };
    }
    // SSE2 is baseline on x86_64
    Kernel {
        decode: Some(decode_sse2_entry),
        encode: Some(encode_sse2_entry),
        name: "SSE2",
    }
}

#[cfg(target_arch = "aarch64")]
fn detect() -> Kernel {
    Kernel {
        decode: Some(arm::decode_neon),
        encode: Some(arm::encode_neon),
        name: "NEON",
    }
}

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
fn detect() -> Kernel {
    Kernel {
        decode: None,
        encode: None,
        name: "generic",
    }
}

/// Scalar continuation shared by every decode kernel: finishes the run up to
/// the next CR/LF, decoding `=X` escapes inline.
#[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
fn decode_tail(dst: &mut [u8], src: &[u8], mut nd: usize, mut ns: usize) -> (usize, usize) {
    while ns < src.len() {
        let c = src[ns];
        if c == b'\r' || c == b'\n' {
            break;
        }
        if c == b'=' {
            if ns + 1 >= src.len() {
                break;
            }
            let next = src[ns + 1];
            if next == b'\r' || next == b'\n' {
                // The state machine owns escaped line endings
                break;
            }
            dst[nd] = next.wrapping_sub(106);
            nd += 1;
            ns += 2;
            continue;
        }
        dst[nd] = c.wrapping_sub(42);
        nd += 1;
        ns += 1;
    }
    (nd, ns)
}

#[cfg(target_arch = "x86_64")]
fn decode_sse2_entry(dst: &mut [u8], src: &[u8]) -> (usize, usize) {
    // Safety: SSE2 is part of the x86_64 baseline
    unsafe { x86::decode_sse2(dst, src) }
}

#[cfg(target_arch = "x86_64")]
fn decode_ssse3_entry(dst: &mut [u8], src: &[u8]) -> (usize, usize) {
    // Safety: entry is selected only after runtime SSSE3 detection
    unsafe { x86::decode_ssse3(dst, src) }
}

#[cfg(target_arch = "x86_64")]
fn decode_avx2_entry(dst: &mut [u8], src: &[u8]) -> (usize, usize) {
    // Safety: entry is selected only after runtime AVX2 detection
    unsafe { x86::decode_avx2(dst, src) }
}

#[cfg(target_arch = "x86_64")]
fn encode_sse2_entry(dst: &mut [u8], src: &[u8]) -> usize {
    // Safety: SSE2 is part of the x86_64 baseline
    unsafe { x86::encode_sse2(dst, src) }
}

#[cfg(target_arch = "x86_64")]
mod x86 {
    use super::decode_tail;
    use crate::lut::{COMPACT_LUT, fix_eq_mask};
    use std::arch::x86_64::*;

    #[target_feature(enable = "sse2")]
    pub(super) unsafe fn decode_sse2(dst: &mut [u8], src: &[u8]) -> (usize, usize) {
        debug_assert!(dst.len() >= src.len());
        let mut nd = 0;
        let mut ns = 0;

        unsafe {
            let v_cr = _mm_set1_epi8(b'\r' as i8);
            let v_lf = _mm_set1_epi8(b'\n' as i8);
            let v_eq = _mm_set1_epi8(b'=' as i8);
            let bias = _mm_set1_epi8(42);

            while ns + 16 <= src.len() {
                let v = _mm_loadu_si128(src.as_ptr().add(ns) as *const __m128i);
                let special = _mm_or_si128(
                    _mm_or_si128(_mm_cmpeq_epi8(v, v_cr), _mm_cmpeq_epi8(v, v_lf)),
                    _mm_cmpeq_epi8(v, v_eq),
                );
                if _mm_movemask_epi8(special) != 0 {
                    break;
                }
                _mm_storeu_si128(
                    dst.as_mut_ptr().add(nd) as *mut __m128i,
                    _mm_sub_epi8(v, bias),
                );
                nd += 16;
                ns += 16;
            }
        }

        decode_tail(dst, src, nd, ns)
    }

    #[target_feature(enable = "ssse3")]
    pub(super) unsafe fn decode_ssse3(dst: &mut [u8], src: &[u8]) -> (usize, usize) {
        debug_assert!(dst.len() >= src.len());
        let mut nd = 0;
        let mut ns = 0;
        // Set when the last consumed byte was an escape introducer whose
        // data byte is still ahead.
        let mut carry = false;

        unsafe {
            let v_cr = _mm_set1_epi8(b'\r' as i8);
            let v_lf = _mm_set1_epi8(b'\n' as i8);
            let v_eq = _mm_set1_epi8(b'=' as i8);
            let bias = _mm_set1_epi8(42);
            let shift = _mm_set1_epi8(64);
            let lut = &*COMPACT_LUT;

            while ns + 16 <= src.len() {
                let v = _mm_loadu_si128(src.as_ptr().add(ns) as *const __m128i);
                let crlf = _mm_or_si128(_mm_cmpeq_epi8(v, v_cr), _mm_cmpeq_epi8(v, v_lf));
                if _mm_movemask_epi8(crlf) != 0 {
                    // Line structure needs the state machine
                    break;
                }

                let eq_mask = _mm_movemask_epi8(_mm_cmpeq_epi8(v, v_eq)) as u16;
                if eq_mask == 0 && !carry {
                    _mm_storeu_si128(
                        dst.as_mut_ptr().add(nd) as *mut __m128i,
                        _mm_sub_epi8(v, bias),
                    );
                    nd += 16;
                    ns += 16;
                    continue;
                }

                // Resolve which '=' bytes start escapes (handles '=' runs),
                // then which bytes carry the +64 shift.
                let introducers = fix_eq_mask(eq_mask, carry);
                let escaped = introducers << 1 | carry as u16;
                carry = introducers & 0x8000 != 0;

                let shifted = expand_mask(escaped);
                let out = _mm_sub_epi8(_mm_sub_epi8(v, bias), _mm_and_si128(shifted, shift));

                // Compact the introducer bytes away. Bit 15 of the control
                // index is implicitly clear: a dropped final byte is simply
                // not counted, so the next store overwrites it.
                let ctrl = _mm_loadu_si128(
                    lut[(introducers & 0x7fff) as usize].as_ptr() as *const __m128i
                );
                _mm_storeu_si128(
                    dst.as_mut_ptr().add(nd) as *mut __m128i,
                    _mm_shuffle_epi8(out, ctrl),
                );
                nd += 16 - introducers.count_ones() as usize;
                ns += 16;
            }
        }

        if carry {
            if ns < src.len() && src[ns] != b'\r' && src[ns] != b'\n' {
                dst[nd] = src[ns].wrapping_sub(106);
                nd += 1;
                ns += 1;
            } else {
                // Hand the unmatched '=' back to the caller unconsumed
                return (nd, ns - 1);
            }
        }

        decode_tail(dst, src, nd, ns)
    }

    /// Expand a 16-bit mask to a vector with 0xFF in each selected byte.
    #[target_feature(enable = "ssse3")]
    unsafe fn expand_mask(mask: u16) -> __m128i {
        unsafe {
            let m = _mm_set1_epi16(mask as i16);
            let select = _mm_setr_epi8(0, 0, 0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 1, 1, 1, 1);
            let bytes = _mm_shuffle_epi8(m, select);
            let bits = _mm_setr_epi8(1, 2, 4, 8, 16, 32, 64, -128, 1, 2, 4, 8, 16, 32, 64, -128);
            _mm_cmpeq_epi8(_mm_and_si128(bytes, bits), bits)
        }
    }

    #[target_feature(enable = "avx2")]
    pub(super) unsafe fn decode_avx2(dst: &mut [u8], src: &[u8]) -> (usize, usize) {
        debug_assert!(dst.len() >= src.len());
        let mut nd = 0;
        let mut ns = 0;

        unsafe {
            let v_cr = _mm256_set1_epi8(b'\r' as i8);
            let v_lf = _mm256_set1_epi8(b'\n' as i8);
            let v_eq = _mm256_set1_epi8(b'=' as i8);
            let bias = _mm256_set1_epi8(42);

            while ns + 32 <= src.len() {
                let v = _mm256_loadu_si256(src.as_ptr().add(ns) as *const __m256i);
                let special = _mm256_or_si256(
                    _mm256_or_si256(_mm256_cmpeq_epi8(v, v_cr), _mm256_cmpeq_epi8(v, v_lf)),
                    _mm256_cmpeq_epi8(v, v_eq),
                );
                if _mm256_movemask_epi8(special) != 0 {
                    break;
                }
                _mm256_storeu_si256(
                    dst.as_mut_ptr().add(nd) as *mut __m256i,
                    _mm256_sub_epi8(v, bias),
                );
                nd += 32;
                ns += 32;
            }

            // Escapes or line endings ahead: continue on the 16-byte path
            let (d, s) = decode_ssse3(&mut dst[nd..], &src[ns..]);
            (nd + d, ns + s)
        }
    }

    #[target_feature(enable = "sse2")]
    pub(super) unsafe fn encode_sse2(dst: &mut [u8], src: &[u8]) -> usize {
        let mut n = 0;

        unsafe {
            let v_cr = _mm_set1_epi8(b'\r' as i8);
            let v_lf = _mm_set1_epi8(b'\n' as i8);
            let v_eq = _mm_set1_epi8(b'=' as i8);
            let v_nul = _mm_setzero_si128();
            let bias = _mm_set1_epi8(42);

            while n + 16 <= src.len() && n + 16 <= dst.len() {
                let encoded = _mm_add_epi8(
                    _mm_loadu_si128(src.as_ptr().add(n) as *const __m128i),
                    bias,
                );
                let special = _mm_or_si128(
                    _mm_or_si128(
                        _mm_cmpeq_epi8(encoded, v_nul),
                        _mm_cmpeq_epi8(encoded, v_cr),
                    ),
                    _mm_or_si128(
                        _mm_cmpeq_epi8(encoded, v_lf),
                        _mm_cmpeq_epi8(encoded, v_eq),
                    ),
                );
                if _mm_movemask_epi8(special) != 0 {
                    break;
                }
                _mm_storeu_si128(dst.as_mut_ptr().add(n) as *mut __m128i, encoded);
                n += 16;
            }
        }

        // Scalar tail up to the first byte needing an escape
        while n < src.len() && n < dst.len() {
            let encoded = src[n].wrapping_add(42);
            if matches!(encoded, 0 | b'\r' | b'\n' | b'=') {
                break;
            }
            dst[n] = encoded;
            n += 1;
        }
        n
    }
}

#[cfg(target_arch = "aarch64")]
mod arm {
    use super::decode_tail;
    use std::arch::aarch64::*;

    pub(super) fn decode_neon(dst: &mut [u8], src: &[u8]) -> (usize, usize) {
        debug_assert!(dst.len() >= src.len());
        let mut nd = 0;
        let mut ns = 0;

        // Safety: NEON is mandatory on aarch64
        unsafe {
            let v_cr = vdupq_n_u8(b'\r');
            let v_lf = vdupq_n_u8(b'\n');
            let v_eq = vdupq_n_u8(b'=');
            let bias = vdupq_n_u8(42);

            while ns + 16 <= src.len() {
                let v = vld1q_u8(src.as_ptr().add(ns));
                let special = vorrq_u8(
                    vorrq_u8(vceqq_u8(v, v_cr), vceqq_u8(v, v_lf)),
                    vceqq_u8(v, v_eq),
                );
                if vmaxvq_u8(special) != 0 {
                    break;
                }
                vst1q_u8(dst.as_mut_ptr().add(nd), vsubq_u8(v, bias));
                nd += 16;
                ns += 16;
            }
        }

        decode_tail(dst, src, nd, ns)
    }

    pub(super) fn encode_neon(dst: &mut [u8], src: &[u8]) -> usize {
        let mut n = 0;

        // Safety: NEON is mandatory on aarch64
        unsafe {
            let v_cr = vdupq_n_u8(b'\r');
            let v_lf = vdupq_n_u8(b'\n');
            let v_eq = vdupq_n_u8(b'=');
            let v_nul = vdupq_n_u8(0);
            let bias = vdupq_n_u8(42);

            while n + 16 <= src.len() && n + 16 <= dst.len() {
                let encoded = vaddq_u8(vld1q_u8(src.as_ptr().add(n)), bias);
                let special = vorrq_u8(
                    vorrq_u8(vceqq_u8(encoded, v_nul), vceqq_u8(encoded, v_cr)),
                    vorrq_u8(vceqq_u8(encoded, v_lf), vceqq_u8(encoded, v_eq)),
                );
                if vmaxvq_u8(special) != 0 {
                    break;
                }
                vst1q_u8(dst.as_mut_ptr().add(n), encoded);
                n += 16;
            }
        }

        while n < src.len() && n < dst.len() {
            let encoded = src[n].wrapping_add(42);
            if matches!(encoded, 0 | b'\r' | b'\n' | b'=') {
                break;
            }
            dst[n] = encoded;
            n += 1;
        }
        n
    }
}
