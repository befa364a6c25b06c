use crate::{Error, Result};

/// Decoder lookbehind state for incremental decoding.
///
/// The variants name the suffix of the stream already consumed that could
/// still participate in a multi-byte control sequence: CR (`\r`), LF (`\n`),
/// EQ (`=`), DT (`.`). A fresh decoder starts in [`State::CrLf`] because the
/// first body byte sits at column 0 of a new line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum State {
    /// Last two bytes were `\r\n`; the next byte is column 0 of a new line
    #[default]
    CrLf,
    /// Last byte was `=` mid-line; the next byte is escaped data
    Eq,
    /// Last byte was `\r`
    Cr,
    /// Mid-line data, no pending lookbehind
    None,
    /// Last three bytes were `\r\n.`
    CrLfDt,
    /// Last four bytes were `\r\n.\r`
    CrLfDtCr,
    /// Last three bytes were `\r\n=` (or `\r\n.=` once the dot was unstuffed)
    CrLfEq,
}

/// Terminator reported by an incremental decode step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum End {
    /// No terminator reached; all unambiguous input was consumed
    #[default]
    None,
    /// `\r\n=y` consumed; `n_src` points past the `y`, back up 2 bytes to
    /// re-present the `=y...` line to the header parser
    Control,
    /// `\r\n.\r\n` consumed; `n_src` points past the final `\n`, back up 3
    /// bytes to re-present the `.` terminator line
    Article,
}

/// Metadata accumulated while decoding an article.
///
/// Populated from the `=ybegin`/`=ypart`/`=yend` header lines and from the
/// running CRC-32 of the decoded payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedMeta {
    /// Original filename from `=ybegin name=`
    pub file_name: String,
    /// Total file size from `=ybegin size=`
    pub file_size: i64,
    /// Part number from `=ybegin part=` (0 for single-part articles)
    pub part_number: i64,
    /// Total parts from `=ybegin total=` (0 when absent)
    pub total_parts: i64,
    /// Zero-based offset of this part within the file (`begin - 1`)
    pub offset: i64,
    /// Size of the unencoded data (from `=ypart`, or the file size for
    /// single-part articles; overwritten by `=yend size=` when present)
    pub part_size: i64,
    /// CRC-32/IEEE computed over the decoded bytes
    pub hash: u32,
}

impl DecodedMeta {
    /// The `=ypart begin` value (1-based) derived from the offset
    pub fn begin(&self) -> i64 {
        self.offset + 1
    }

    /// The `=ypart end` value derived from the offset and part size
    pub fn end(&self) -> i64 {
        self.offset + self.part_size
    }
}

/// Metadata describing the part an [`Encoder`](crate::Encoder) emits.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Meta {
    /// Filename for the `=ybegin name=` field
    pub file_name: String,
    /// Total size of the file this part belongs to
    pub file_size: i64,
    /// Size of the unencoded data of this part
    pub part_size: i64,
    /// 1-based part number
    pub part_number: i64,
    /// Total number of parts
    pub total_parts: i64,
    /// Zero-based offset of this part within the file
    pub offset: i64,
    /// Raw mode: emit only the encoded body, no headers or trailer
    pub raw: bool,
}

impl Meta {
    /// The `=ypart begin` value (1-based) derived from the offset
    pub fn begin(&self) -> i64 {
        self.offset + 1
    }

    /// The `=ypart end` value derived from the offset and part size
    pub fn end(&self) -> i64 {
        self.offset + self.part_size
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.part_size < 0 || self.file_size < 0 || self.offset < 0 {
            return Err(Error::InvalidMeta(
                "sizes and offset must not be negative".to_string(),
            ));
        }
        if self.raw {
            return Ok(());
        }
        if self.file_name.is_empty() {
            return Err(Error::InvalidMeta("file name must not be empty".to_string()));
        }
        if self.part_number < 1 || self.total_parts < self.part_number {
            return Err(Error::InvalidMeta(format!(
                "part {}/{} is not a valid part range",
                self.part_number, self.total_parts
            )));
        }
        if self.end() > self.file_size {
            return Err(Error::InvalidMeta(format!(
                "part end {} exceeds file size {}",
                self.end(),
                self.file_size
            )));
        }
        Ok(())
    }
}
