//! Feed-style article decoder (push interface)

use std::io::Write;

use crate::envelope::{BodyStatus, Envelope, find_crlf};
use crate::format::{Format, detect_format};
use crate::types::DecodedMeta;
use crate::{Error, Result};

/// Push-style yEnc article decoder.
///
/// The caller owns the buffering: each [`feed`](ArticleDecoder::feed) call
/// consumes as many raw NNTP bytes as possible from the front of `buf` and
/// writes the decoded payload to `out`. Bytes not consumed (a partial line
/// or a straddled control sequence) must be re-presented, with more data
/// appended, on the next call.
///
/// Once `feed` reports the article done, [`finish`](ArticleDecoder::finish)
/// validates size and CRC-32 against the trailer.
pub struct ArticleDecoder {
    envelope: Envelope,
    /// Decode scratch, separate from the caller's sink so SIMD partial
    /// stores stay in-bounds
    scratch: Vec<u8>,
    done: bool,
}

impl ArticleDecoder {
    /// Create a decoder for one article.
    pub fn new() -> Self {
        Self {
            envelope: Envelope::new(),
            scratch: Vec::new(),
            done: false,
        }
    }

    /// Metadata extracted from the article headers so far.
    pub fn meta(&self) -> &DecodedMeta {
        &self.envelope.meta
    }

    /// Body format classified so far.
    pub fn format(&self) -> Format {
        self.envelope.format
    }

    /// Consume raw article bytes from `buf`, writing decoded payload to
    /// `out`. Returns `(consumed, done)`; `done` is sticky once the article
    /// terminator has been seen.
    pub fn feed<W: Write>(&mut self, buf: &[u8], out: &mut W) -> Result<(usize, bool)> {
        if self.done {
            return Ok((0, true));
        }

        if self.scratch.len() < buf.len() {
            self.scratch.resize(buf.len(), 0);
        }

        let mut consumed = 0;

        if self.envelope.body && self.envelope.format == Format::Yenc {
            consumed += self.feed_body(buf, out)?;
        }

        while !self.envelope.body && !self.done {
            let Some(pos) = find_crlf(&buf[consumed..]) else {
                break;
            };
            let line = &buf[consumed..consumed + pos];

            if line == b"." {
                consumed += pos + 2;
                self.done = true;
                break;
            }

            if self.envelope.format == Format::Unknown {
                self.envelope.format = detect_format(line);
            }

            match self.envelope.format {
                Format::Yenc => {
                    self.envelope.process_line(line);
                    consumed += pos + 2;
                    if self.envelope.body {
                        let n = self.feed_body(&buf[consumed..], out)?;
                        consumed += n;
                        if self.envelope.body {
                            // All input consumed mid-body; need more data
                            break;
                        }
                    }
                }
                Format::Uu => return Err(Error::Uu),
                Format::Unknown => {
                    consumed += pos + 2;
                }
            }
        }

        Ok((consumed, self.done))
    }

    /// Decode body bytes through the scratch buffer into `out`. Returns the
    /// number of source bytes consumed.
    fn feed_body<W: Write>(&mut self, buf: &[u8], out: &mut W) -> Result<usize> {
        let mut consumed = 0;
        while self.envelope.body && consumed < buf.len() {
            let (nd, ns, status) = self
                .envelope
                .decode_body(&mut self.scratch[..], &buf[consumed..])?;
            out.write_all(&self.scratch[..nd])?;
            consumed += ns;
            match status {
                BodyStatus::NeedMoreData => {}
                BodyStatus::Resync => break,
                BodyStatus::ArticleEnd => self.done = true,
            }
        }
        Ok(consumed)
    }

    /// Validate the completed article.
    pub fn finish(&self) -> Result<()> {
        self.envelope.close_error()
    }
}

impl Default for ArticleDecoder {
    fn default() -> Self {
        Self::new()
    }
}
