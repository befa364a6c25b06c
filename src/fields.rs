//! `key=value` field extraction from yEnc header lines

/// Find `key` in `line` and return the bytes following it up to the first
/// terminator in `stop`.
fn extract_raw<'a>(line: &'a [u8], key: &[u8], stop: &[u8]) -> Option<&'a [u8]> {
    let start = line
        .windows(key.len())
        .position(|window| window == key)?;
    let value = &line[start + key.len()..];
    match value.iter().position(|b| stop.contains(b)) {
        Some(end) => Some(&value[..end]),
        None => Some(value),
    }
}

/// Extract a signed 64-bit integer field, e.g. `extract_int(line, b" size=")`.
///
/// The value runs until the next NUL, space, CR or LF.
pub(crate) fn extract_int(line: &[u8], key: &[u8]) -> Option<i64> {
    let raw = extract_raw(line, key, b"\x00\x20\r\n")?;
    std::str::from_utf8(raw).ok()?.parse().ok()
}

/// Extract a string field, e.g. `extract_string(line, b" name=")`.
///
/// The value runs until the next NUL, CR or LF; spaces are permitted so
/// filenames with spaces survive. Invalid UTF-8 is replaced lossily.
pub(crate) fn extract_string(line: &[u8], key: &[u8]) -> Option<String> {
    let raw = extract_raw(line, key, b"\x00\r\n")?;
    Some(String::from_utf8_lossy(raw).into_owned())
}

/// Extract a CRC-32 field from its hexadecimal representation.
///
/// Broken posters emit anywhere from 1 to 16 hex digits; the last 8 are
/// taken and short values are left-padded with zeroes before decoding as a
/// big-endian `u32`.
pub(crate) fn extract_crc(line: &[u8], key: &[u8]) -> Option<u32> {
    let raw = extract_raw(line, key, b"\x00\x20\r\n")?;
    let tail = &raw[raw.len() - raw.len().min(8)..];

    let mut crc = 0u32;
    for &b in tail {
        let digit = (b as char).to_digit(16)?;
        crc = crc << 4 | digit;
    }
    Some(crc)
}
