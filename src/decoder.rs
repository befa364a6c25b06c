//! Streaming article decoder (pull interface) and one-shot decoding

use std::io;

use crate::envelope::{BodyStatus, Envelope, find_crlf};
use crate::format::{Format, detect_format};
use crate::types::DecodedMeta;
use crate::{Error, Result};

const DEFAULT_READ_BUF: usize = 128 * 1024;

/// Streaming yEnc article decoder over any [`io::Read`] source.
///
/// Feeds raw NNTP body bytes (dot-stuffed, CRLF lines) through the envelope
/// parser and yields the decoded binary payload. Article validation (size and
/// CRC-32 against the `=yend` trailer) happens once the article terminator or
/// the end of the source is reached; the validation error is returned only
/// after all decodable bytes have been read, so partial output remains
/// available for diagnostics.
///
/// # Example
/// ```ignore
/// let mut decoder = Decoder::new(File::open("article.yenc")?);
/// let mut payload = Vec::new();
/// std::io::copy(&mut decoder, &mut payload)?;
/// println!("{} => {} bytes", decoder.meta().file_name, payload.len());
/// ```
pub struct Decoder<R> {
    reader: R,
    envelope: Envelope,
    /// Bytes read from the source but not yet consumed (partial line or
    /// payload that did not fit the caller's buffer)
    remainder: Vec<u8>,
    /// Scratch buffer the source is read into, kept separate from the
    /// caller's destination so SIMD partial stores never clobber unread
    /// source bytes
    read_buf: Vec<u8>,
    done: bool,
}

impl<R: io::Read> Decoder<R> {
    /// Create a decoder reading raw article bytes from `reader`.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            envelope: Envelope::new(),
            remainder: Vec::new(),
            read_buf: Vec::new(),
            done: false,
        }
    }

    /// Metadata extracted from the article headers so far.
    ///
    /// Fully populated once the `=yend` trailer has been parsed; still
    /// queryable after a decode error.
    pub fn meta(&self) -> &DecodedMeta {
        &self.envelope.meta
    }

    /// Body format classified so far ([`Format::Unknown`] until the first
    /// recognizable line was seen).
    pub fn format(&self) -> Format {
        self.envelope.format
    }

    /// Pull decoded payload bytes into `dst`.
    ///
    /// Returns `Ok(0)` at end of article once the stream validated cleanly.
    /// After a data error the decoder is poisoned: every subsequent call
    /// reports the same error.
    pub fn read(&mut self, dst: &mut [u8]) -> Result<usize> {
        if dst.is_empty() {
            return Ok(0);
        }

        loop {
            if self.done {
                return self.finish();
            }
            let produced = self.read_step(dst)?;
            if produced > 0 {
                return Ok(produced);
            }
        }
    }

    /// One fill-and-process cycle: top up the scratch buffer from the source
    /// and run the envelope over it.
    fn read_step(&mut self, dst: &mut [u8]) -> Result<usize> {
        // The scratch buffer holds at least a full header line regardless of
        // how small the caller's buffer is; body decoding below is windowed
        // to dst so the decode contract dst.len() >= src.len() holds.
        let want = dst.len().max(DEFAULT_READ_BUF);
        if self.read_buf.len() < want {
            self.read_buf.resize(want, 0);
        }

        let nrem = self.remainder.len();
        self.read_buf[..nrem].copy_from_slice(&self.remainder);
        self.remainder.clear();

        let mut total = nrem;
        let mut fresh = 0;
        if nrem < self.read_buf.len() {
            fresh = self.reader.read(&mut self.read_buf[nrem..])?;
            if fresh == 0 {
                // Source exhausted; flush whatever is buffered, then validate
                self.done = true;
            }
            total += fresh;
        }

        let src: &[u8] = &self.read_buf[..total];
        let mut consumed = 0;
        let mut produced = 0;

        if self.envelope.body && self.envelope.format == Format::Yenc {
            let window = (dst.len() - produced).min(total - consumed);
            let (nd, ns, status) = self
                .envelope
                .decode_body(&mut dst[produced..], &src[consumed..consumed + window])?;
            produced += nd;
            consumed += ns;
            if status == BodyStatus::ArticleEnd {
                self.done = true;
            }
        }

        while !self.envelope.body && !self.done {
            let Some(pos) = find_crlf(&src[consumed..]) else {
                break;
            };
            let line = &src[consumed..consumed + pos];

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
                        let window = (dst.len() - produced).min(total - consumed);
                        if window == 0 {
                            // No destination space left for payload
                            break;
                        }
                        let (nd, ns, status) = self.envelope.decode_body(
                            &mut dst[produced..],
                            &src[consumed..consumed + window],
                        )?;
                        produced += nd;
                        consumed += ns;
                        match status {
                            BodyStatus::NeedMoreData => break,
                            BodyStatus::Resync => {}
                            BodyStatus::ArticleEnd => self.done = true,
                        }
                    }
                }
                Format::Uu => {
                    // TODO: uudecode; for now the raw lines are passed
                    // through and Error::Uu is reported at end of article
                    let needed = pos + 2;
                    if dst.len() - produced < needed {
                        break;
                    }
                    dst[produced..produced + pos].copy_from_slice(line);
                    dst[produced + pos..produced + needed].copy_from_slice(b"\r\n");
                    produced += needed;
                    consumed += needed;
                }
                Format::Unknown => {
                    // Preamble or status line, not part of the payload
                    consumed += pos + 2;
                }
            }
        }

        self.remainder.extend_from_slice(&src[consumed..]);

        if !self.done && produced == 0 && consumed == 0 && fresh == 0 {
            // The scratch buffer is full yet holds nothing processable
            return Err(Error::DataCorruption(
                "article line exceeds the read buffer".to_string(),
            ));
        }

        Ok(produced)
    }

    /// End-of-article bookkeeping, re-derived on every call so the decoder
    /// stays poisoned with the same error.
    fn finish(&mut self) -> Result<usize> {
        if !self.remainder.is_empty() {
            return Err(Error::DataCorruption(format!(
                "{} unprocessed bytes at end of article",
                self.remainder.len()
            )));
        }
        self.envelope.close_error()?;
        Ok(0)
    }
}

impl<R: io::Read> io::Read for Decoder<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match Decoder::read(self, buf) {
            Ok(n) => Ok(n),
            Err(Error::Io(e)) => Err(e),
            Err(e) => Err(io::Error::new(io::ErrorKind::InvalidData, e)),
        }
    }
}

/// Decode an entire in-memory article in one pass.
///
/// Faster than [`Decoder`] when the whole article is already in memory: no
/// reader indirection and no intermediate buffering. `dst` must be at least
/// `src.len()` bytes. Returns the decoded length and the parsed metadata.
pub fn decode_all(dst: &mut [u8], src: &[u8]) -> Result<(usize, DecodedMeta)> {
    if src.is_empty() {
        return Err(Error::DataMissing);
    }
    if dst.len() < src.len() {
        return Err(Error::DestinationTooSmall);
    }

    let mut env = Envelope::new();
    let mut produced = 0;
    let mut consumed = 0;

    'lines: loop {
        let Some(pos) = find_crlf(&src[consumed..]) else {
            break;
        };
        let line = &src[consumed..consumed + pos];
        consumed += pos + 2;

        if line == b"." {
            break;
        }

        if env.format == Format::Unknown {
            env.format = detect_format(line);
        }

        match env.format {
            Format::Yenc => {
                env.process_line(line);
                while env.body {
                    if consumed >= src.len() {
                        break 'lines;
                    }
                    let (nd, ns, status) =
                        env.decode_body(&mut dst[produced..], &src[consumed..])?;
                    produced += nd;
                    consumed += ns;
                    match status {
                        BodyStatus::NeedMoreData => {}
                        BodyStatus::Resync => break,
                        BodyStatus::ArticleEnd => break 'lines,
                    }
                }
            }
            Format::Uu => return Err(Error::Uu),
            Format::Unknown => {}
        }
    }

    env.close_error()?;
    Ok((produced, env.meta))
}
