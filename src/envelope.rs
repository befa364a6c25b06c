//! Shared article envelope state machine
//!
//! Header-line recognition, metadata accumulation and close-time validation
//! common to the pull [`Decoder`](crate::Decoder), the one-shot
//! [`decode_all`](crate::decode_all) and the feed-style
//! [`ArticleDecoder`](crate::ArticleDecoder).

use crc32fast::Hasher;
use tracing::trace;

use crate::decode::decode_incremental;
use crate::fields::{extract_crc, extract_int, extract_string};
use crate::format::Format;
use crate::types::{DecodedMeta, End, State};
use crate::{Error, Result};

/// Outcome of one body-decode step, after terminator backup was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BodyStatus {
    /// All presented input was consumed; feed more when available
    NeedMoreData,
    /// A control line or a possible one (`\r\n=` at end of input) was
    /// reached; the unconsumed tail starts with a line for the header parser
    Resync,
    /// The article terminator `\r\n.\r\n` was fully consumed. No backup is
    /// possible here: the terminator may have straddled the previous buffer,
    /// so it is reported instead of re-presented.
    ArticleEnd,
}

pub(crate) struct Envelope {
    pub(crate) meta: DecodedMeta,
    pub(crate) format: Format,
    pub(crate) state: State,
    pub(crate) body: bool,
    begun: bool,
    part: bool,
    ended: bool,
    has_crc: bool,
    expected_crc: u32,
    actual_size: i64,
    hasher: Hasher,
}

impl Envelope {
    pub(crate) fn new() -> Self {
        Self {
            meta: DecodedMeta::default(),
            format: Format::Unknown,
            state: State::CrLf,
            body: false,
            begun: false,
            part: false,
            ended: false,
            has_crc: false,
            expected_crc: 0,
            actual_size: 0,
            hasher: Hasher::new(),
        }
    }

    /// Process one CRLF-stripped header-region line.
    pub(crate) fn process_line(&mut self, line: &[u8]) {
        if line.starts_with(b"=ybegin ") {
            self.begun = true;
            self.meta.file_size = extract_int(line, b" size=").unwrap_or(0);
            self.meta.file_name = extract_string(line, b" name=").unwrap_or_default();
            match extract_int(line, b" part=") {
                Some(part) => self.meta.part_number = part,
                None => {
                    // Single-part article: the body starts right after =ybegin
                    self.body = true;
                    self.meta.part_size = self.meta.file_size;
                }
            }
            self.meta.total_parts = extract_int(line, b" total=").unwrap_or(0);
            trace!(
                name = %self.meta.file_name,
                size = self.meta.file_size,
                part = self.meta.part_number,
                "parsed =ybegin header"
            );
        } else if line.starts_with(b"=ypart ") {
            self.part = true;
            self.body = true;
            let begin = extract_int(line, b" begin=");
            if let Some(begin) = begin {
                self.meta.offset = begin - 1;
            }
            if let Some(end) = extract_int(line, b" end=")
                && begin.is_some_and(|b| b > 0)
            {
                self.meta.part_size = end - self.meta.offset;
            }
            trace!(
                begin = self.meta.begin(),
                end = self.meta.end(),
                "parsed =ypart header"
            );
        } else if line.starts_with(b"=yend ") {
            self.ended = true;
            let key: &[u8] = if self.part { b" pcrc32=" } else { b" crc32=" };
            if let Some(crc) = extract_crc(line, key) {
                self.expected_crc = crc;
                self.has_crc = true;
            }
            if let Some(size) = extract_int(line, b" size=") {
                self.meta.part_size = size;
            }
            self.meta.hash = self.hasher.clone().finalize();
            trace!(
                size = self.meta.part_size,
                crc = self.meta.hash,
                "parsed =yend trailer"
            );
        }
    }

    /// Decode body bytes from `src` into `dst`, folding them into the CRC.
    ///
    /// The returned consumed count already excludes the bytes that must be
    /// re-presented to the header parser: 2 for a control line, 1 for a
    /// `\r\n=` parked at the end of the input.
    pub(crate) fn decode_body(
        &mut self,
        dst: &mut [u8],
        src: &[u8],
    ) -> Result<(usize, usize, BodyStatus)> {
        let (nd, ns, end) = decode_incremental(dst, src, &mut self.state)?;

        self.hasher.update(&dst[..nd]);
        self.actual_size += nd as i64;

        match end {
            End::Control => {
                // The control introducer is always fully inside this call:
                // a straddled "\r\n=" is parked as CrLfEq and resolved below
                debug_assert!(ns >= 2);
                self.body = false;
                Ok((nd, ns - 2, BodyStatus::Resync))
            }
            End::Article => {
                self.body = false;
                Ok((nd, ns, BodyStatus::ArticleEnd))
            }
            End::None => {
                if self.state == State::CrLfEq {
                    // "\r\n=" with no more data: may be the start of =yend
                    self.state = State::CrLf;
                    Ok((nd, ns - 1, BodyStatus::Resync))
                } else {
                    Ok((nd, ns, BodyStatus::NeedMoreData))
                }
            }
        }
    }

    /// Validate the article at end-of-stream.
    pub(crate) fn close_error(&self) -> Result<()> {
        if self.format == Format::Uu {
            return Err(Error::Uu);
        }
        if !self.begun {
            return Err(Error::DataMissing);
        }
        if !self.ended {
            return Err(Error::DataCorruption(
                "end of article without finding \"=yend\" trailer".to_string(),
            ));
        }
        if self.state == State::Eq {
            return Err(Error::DataCorruption(
                "escape sequence truncated at end of article".to_string(),
            ));
        }
        let expected = if self.part {
            self.meta.part_size
        } else {
            self.meta.file_size
        };
        if expected != self.actual_size {
            return Err(Error::DataCorruption(format!(
                "expected size {} but got {}",
                expected, self.actual_size
            )));
        }
        if self.has_crc && self.expected_crc != self.meta.hash {
            return Err(Error::CrcMismatch {
                expected: self.expected_crc,
                actual: self.meta.hash,
            });
        }
        Ok(())
    }
}

/// Position of the first CRLF in `buf`.
pub(crate) fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|window| window == b"\r\n")
}
