//! Streaming yEnc article encoder (push interface)

use std::io::{self, Write};

use crc32fast::Hasher;

use crate::encode::{encode_incremental, max_encoded_length};
use crate::types::Meta;
use crate::{Error, Result};

const LINE_LENGTH: usize = 128;

/// Streaming yEnc encoder over any [`io::Write`] sink.
///
/// Emits the `=ybegin`/`=ypart` headers before the first payload byte,
/// streams the line-wrapped encoded body, and on [`close`](Encoder::close)
/// emits the `=yend` trailer carrying the part size and `pcrc32`. With
/// [`Meta::raw`] set, only the encoded body is emitted.
///
/// It is the caller's responsibility to call `close` when done; dropping an
/// unclosed encoder loses the trailer.
pub struct Encoder<W> {
    writer: Option<W>,
    meta: Meta,
    header_written: bool,

    hasher: Hasher,
    column: usize,
    processed: i64,

    buf: Vec<u8>,
    /// Trailing `'\t'` or `' '` held back from the previous write; emitted
    /// unescaped by the next write, or escaped by close
    pending: Option<u8>,
    /// Recorded sink failure; replayed on every later call
    poison: Option<(io::ErrorKind, String)>,
}

impl<W: Write> Encoder<W> {
    /// Create an encoder writing the yEnc form of its input to `writer`.
    pub fn new(writer: W, meta: Meta) -> Result<Self> {
        meta.validate()?;
        Ok(Self {
            writer: Some(writer),
            meta,
            header_written: false,
            hasher: Hasher::new(),
            column: 0,
            processed: 0,
            buf: Vec::new(),
            pending: None,
            poison: None,
        })
    }

    /// Discard all state and start a new part written to `writer`,
    /// permitting reuse of the allocated encode buffer.
    pub fn reset(&mut self, writer: W, meta: Meta) -> Result<()> {
        meta.validate()?;
        self.writer = Some(writer);
        self.meta = meta;
        self.header_written = false;
        self.hasher = Hasher::new();
        self.column = 0;
        self.processed = 0;
        self.pending = None;
        self.poison = None;
        Ok(())
    }

    /// Encode `p` and write it to the underlying sink. The encoded bytes are
    /// not necessarily flushed until the encoder is closed.
    pub fn write(&mut self, p: &[u8]) -> Result<usize> {
        self.check_poison()?;
        match self.write_inner(p) {
            Ok(n) => Ok(n),
            Err(e) => {
                self.record_poison(&e);
                Err(e)
            }
        }
    }

    fn write_inner(&mut self, p: &[u8]) -> Result<usize> {
        let writer = self.writer.as_mut().ok_or_else(closed)?;

        self.hasher.update(p);

        if !self.meta.raw && !self.header_written {
            self.header_written = true;
            write_header(writer, &self.meta)?;
        }

        // The previous write ended with whitespace that turned out not to be
        // final: emit it unescaped now
        if let Some(b) = self.pending.take() {
            writer.write_all(&[b])?;
        }

        if p.is_empty() {
            return Ok(0);
        }
        self.processed += p.len() as i64;

        let need = max_encoded_length(p.len(), LINE_LENGTH);
        if self.buf.len() < need {
            self.buf.resize(need, 0);
        }
        let n = encode_incremental(&mut self.buf, p, LINE_LENGTH, &mut self.column);

        let mut out = &self.buf[..n];
        if let Some(&last) = out.last()
            && (last == b'\t' || last == b' ')
        {
            // Hold the byte back: if the stream ends here it needs escaping
            self.pending = Some(last);
            out = &out[..n - 1];
        }
        if !out.is_empty() {
            writer.write_all(out)?;
        }

        Ok(p.len())
    }

    /// Flush any held-back whitespace and emit the `=yend` trailer.
    ///
    /// # Errors
    /// [`Error::DataCorruption`] when the number of bytes written differs
    /// from the part size announced in the headers.
    pub fn close(&mut self) -> Result<()> {
        self.check_poison()?;
        match self.close_inner() {
            Ok(()) => Ok(()),
            Err(e) => {
                self.record_poison(&e);
                Err(e)
            }
        }
    }

    fn close_inner(&mut self) -> Result<()> {
        let mut writer = self.writer.take().ok_or_else(closed)?;

        // An empty part still gets its headers
        if !self.meta.raw && !self.header_written {
            self.header_written = true;
            write_header(&mut writer, &self.meta)?;
        }

        if let Some(b) = self.pending.take() {
            // Trailing whitespace must survive transport: escaped form
            writer.write_all(&[b'=', b.wrapping_add(64)])?;
        }

        if !self.meta.raw {
            write!(
                writer,
                "\r\n=yend size={} part={} pcrc32={:08x}\r\n",
                self.meta.part_size,
                self.meta.part_number,
                self.hasher.clone().finalize()
            )?;

            if self.processed != self.meta.part_size {
                return Err(Error::DataCorruption(format!(
                    "header has part size {} but {} bytes were encoded",
                    self.meta.part_size, self.processed
                )));
            }
        }

        writer.flush()?;
        Ok(())
    }

    fn check_poison(&self) -> Result<()> {
        match &self.poison {
            Some((kind, message)) => Err(Error::Io(io::Error::new(*kind, message.clone()))),
            None => Ok(()),
        }
    }

    fn record_poison(&mut self, err: &Error) {
        if let Error::Io(e) = err {
            self.poison = Some((e.kind(), e.to_string()));
        }
    }
}

fn write_header<W: Write>(writer: &mut W, meta: &Meta) -> io::Result<()> {
    write!(
        writer,
        "=ybegin part={} total={} line={} size={} name={}\r\n=ypart begin={} end={}\r\n",
        meta.part_number,
        meta.total_parts,
        LINE_LENGTH,
        meta.file_size,
        meta.file_name,
        meta.begin(),
        meta.end(),
    )
}

fn closed() -> Error {
    Error::Io(io::Error::new(
        io::ErrorKind::NotConnected,
        "encoder is closed",
    ))
}

impl<W: Write> Write for Encoder<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match Encoder::write(self, buf) {
            Ok(n) => Ok(n),
            Err(Error::Io(e)) => Err(e),
            Err(e) => Err(io::Error::new(io::ErrorKind::InvalidData, e)),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.writer.as_mut() {
            Some(w) => w.flush(),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_encode(input: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        let mut encoder = Encoder::new(&mut out, Meta {
            raw: true,
            ..Default::default()
        })
        .unwrap();
        encoder.write(input).unwrap();
        encoder.close().unwrap();
        out
    }

    #[test]
    fn test_encoder_raw_vectors() {
        let cases: Vec<(&str, &[u8], &[u8])> = vec![
            ("NUL", b"\x00", b"\x2a"),
            ("SPACE", b"\x20", b"\x4a"),
            // Encodes to ' ' at end of stream, so it must leave escaped
            ("ESCAPE", b"\xF6", b"\x3D\x60"),
            ("ESCAPE_NOT_FIRST", b"H\xF6", b"\x72\x3D\x60"),
            (
                "Hello World",
                b"Hello World",
                b"\x72\x8F\x96\x96\x99\x4A\x81\x99\x9C\x96\x8E",
            ),
            ("3DD4", b"\x3D\xD4", b"\x67\xFE"),
        ];

        for (name, input, expected) in cases {
            assert_eq!(raw_encode(input), expected, "{}", name);
        }
    }

    #[test]
    fn test_encoder_holds_back_whitespace_between_writes() {
        let mut out = Vec::new();
        let mut encoder = Encoder::new(&mut out, Meta {
            raw: true,
            ..Default::default()
        })
        .unwrap();

        // First write ends in an encoded space; it must not be written yet
        encoder.write(b"H\xF6").unwrap();
        assert_eq!(encoder.pending, Some(b' '));

        // The stream continues, so the space goes out unescaped
        encoder.write(b"H").unwrap();
        encoder.close().unwrap();
        assert_eq!(out, b"\x72\x20\x72");
    }

    #[test]
    fn test_encoder_headers_and_trailer() {
        let raw = b"foobar";
        let mut out = Vec::new();
        let mut encoder = Encoder::new(&mut out, Meta {
            file_name: "test.bin".to_string(),
            file_size: 6,
            part_size: 6,
            part_number: 1,
            total_parts: 1,
            offset: 0,
            raw: false,
        })
        .unwrap();
        encoder.write(raw).unwrap();
        encoder.close().unwrap();

        let text = String::from_utf8_lossy(&out);
        assert!(text.starts_with(
            "=ybegin part=1 total=1 line=128 size=6 name=test.bin\r\n=ypart begin=1 end=6\r\n"
        ));
        assert!(text.ends_with("\r\n=yend size=6 part=1 pcrc32=9ef61f95\r\n"));
    }

    #[test]
    fn test_encoder_empty_part_still_writes_envelope() {
        let mut out = Vec::new();
        let mut encoder = Encoder::new(&mut out, Meta {
            file_name: "empty.bin".to_string(),
            file_size: 0,
            part_size: 0,
            part_number: 1,
            total_parts: 1,
            offset: 0,
            raw: false,
        })
        .unwrap();
        encoder.close().unwrap();

        let text = String::from_utf8_lossy(&out);
        assert!(text.contains("=ybegin part=1"));
        assert!(text.contains("=yend size=0 part=1 pcrc32=00000000"));
    }

    #[test]
    fn test_encoder_size_mismatch_on_close() {
        let mut out = Vec::new();
        let mut encoder = Encoder::new(&mut out, Meta {
            file_name: "short.bin".to_string(),
            file_size: 10,
            part_size: 10,
            part_number: 1,
            total_parts: 1,
            offset: 0,
            raw: false,
        })
        .unwrap();
        encoder.write(b"abc").unwrap();
        assert!(matches!(encoder.close(), Err(Error::DataCorruption(_))));
    }

    #[test]
    fn test_encoder_rejects_invalid_meta() {
        let meta = Meta {
            file_name: String::new(),
            part_number: 1,
            total_parts: 1,
            ..Default::default()
        };
        assert!(matches!(
            Encoder::new(Vec::new(), meta),
            Err(Error::InvalidMeta(_))
        ));
    }

    #[test]
    fn test_encoder_write_after_close() {
        let mut encoder = Encoder::new(Vec::new(), Meta {
            raw: true,
            ..Default::default()
        })
        .unwrap();
        encoder.close().unwrap();
        assert!(matches!(encoder.write(b"late"), Err(Error::Io(_))));
    }

    /// Sink failing after a fixed number of bytes, for poisoning tests.
    struct FailingWriter {
        budget: usize,
    }

    impl Write for FailingWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if buf.len() > self.budget {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "sink full"));
            }
            self.budget -= buf.len();
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_encoder_poisoned_after_sink_error() {
        let mut encoder = Encoder::new(FailingWriter { budget: 4 }, Meta {
            raw: true,
            ..Default::default()
        })
        .unwrap();

        assert!(matches!(encoder.write(b"Hello World"), Err(Error::Io(_))));
        // Poisoned: the error replays without touching the sink again
        assert!(matches!(encoder.write(b"more"), Err(Error::Io(_))));
        assert!(matches!(encoder.close(), Err(Error::Io(_))));
    }

    #[test]
    fn test_encoder_reset_reuses_buffers() {
        let mut first = Vec::new();
        let mut encoder = Encoder::new(&mut first, Meta {
            raw: true,
            ..Default::default()
        })
        .unwrap();
        encoder.write(b"Hello").unwrap();
        encoder.close().unwrap();

        let mut second = Vec::new();
        encoder
            .reset(&mut second, Meta {
                raw: true,
                ..Default::default()
            })
            .unwrap();
        encoder.write(b"Hello").unwrap();
        encoder.close().unwrap();

        assert_eq!(first, second);
    }
}
