//! End-to-end round-trip tests through the public API

use std::io::{Cursor, Read};

use crc32fast::Hasher;
use rand::{Rng, SeedableRng};

use yenc_rs::{
    ArticleDecoder, Decoder, Encoder, Error, Meta, State, decode_all, decode_incremental,
    encode_incremental, max_encoded_length,
};

fn crc32(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Encode `raw` as a complete single-part article.
fn encode_article(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut encoder = Encoder::new(&mut out, Meta {
        file_name: "filename".to_string(),
        file_size: raw.len() as i64,
        part_size: raw.len() as i64,
        part_number: 1,
        total_parts: 1,
        offset: 0,
        raw: false,
    })
    .unwrap();
    encoder.write(raw).unwrap();
    encoder.close().unwrap();
    out
}

fn decode_article(encoded: &[u8]) -> (Vec<u8>, u32) {
    let mut decoder = Decoder::new(Cursor::new(encoded.to_vec()));
    let mut out = Vec::new();
    decoder.read_to_end(&mut out).unwrap();
    (out, decoder.meta().hash)
}

#[test]
fn test_round_trip_1mib_random() {
    let mut rng = rand::rngs::StdRng::seed_from_u64(1);
    let raw: Vec<u8> = (0..1024 * 1024).map(|_| rng.r#gen()).collect();

    let encoded = encode_article(&raw);
    let (decoded, hash) = decode_article(&encoded);

    assert_eq!(decoded, raw);
    assert_eq!(hash, crc32(&raw));
}

#[test]
fn test_round_trip_known_checksums() {
    let cases: Vec<(&str, Vec<u8>, u32)> = vec![
        ("foobar", b"foobar".to_vec(), 0x9EF61F95),
        ("quad-eot", b"\x04\x04\x04\x04".to_vec(), 0xCA2EE18A),
        ("spaces", vec![0x20; 800000], 0x31F365E7),
    ];

    for (name, raw, expected_crc) in cases {
        assert_eq!(crc32(&raw), expected_crc, "{}: crc32 of raw input", name);

        let encoded = encode_article(&raw);
        let (decoded, hash) = decode_article(&encoded);
        assert_eq!(decoded, raw, "{}", name);
        assert_eq!(hash, expected_crc, "{}", name);
    }
}

#[test]
fn test_round_trip_chunked_writes() {
    let mut rng = rand::rngs::StdRng::seed_from_u64(2);
    let raw: Vec<u8> = (0..100_000).map(|_| rng.r#gen()).collect();

    let one_shot = encode_article(&raw);

    for chunk in [1usize, 7, 128, 4096] {
        let mut out = Vec::new();
        let mut encoder = Encoder::new(&mut out, Meta {
            file_name: "filename".to_string(),
            file_size: raw.len() as i64,
            part_size: raw.len() as i64,
            part_number: 1,
            total_parts: 1,
            offset: 0,
            raw: false,
        })
        .unwrap();
        for piece in raw.chunks(chunk) {
            encoder.write(piece).unwrap();
        }
        encoder.close().unwrap();
        assert_eq!(out, one_shot, "chunk {}", chunk);
    }
}

#[test]
fn test_round_trip_trailing_whitespace() {
    // Raw bytes whose encoded forms are TAB and SPACE; a trailing one must
    // leave the encoder in escaped form
    for last in [223u8, 246u8] {
        let mut raw = b"data".to_vec();
        raw.push(last);

        let encoded = encode_article(&raw);
        let trailer = encoded
            .windows(7)
            .position(|w| w == b"\r\n=yend")
            .expect("trailer present");
        assert_eq!(encoded[trailer - 1], last.wrapping_add(42).wrapping_add(64));
        assert_eq!(encoded[trailer - 2], b'=');

        let (decoded, _) = decode_article(&encoded);
        assert_eq!(decoded, raw, "last byte {:#04x}", last);
    }
}

#[test]
fn test_round_trip_dot_stuffing_hazard() {
    // Raw byte 4 encodes to '.'; pack a full article with it so it lands on
    // every column including 0
    let raw = vec![4u8; 1000];
    let encoded = encode_article(&raw);

    // No encoded line may begin with an unescaped dot
    for line in encoded.split(|&b| b == b'\n') {
        assert_ne!(line.first(), Some(&b'.'), "line begins with a bare dot");
    }

    let (decoded, hash) = decode_article(&encoded);
    assert_eq!(decoded, raw);
    assert_eq!(hash, crc32(&raw));
}

#[test]
fn test_decoder_handles_stuffed_dots_from_the_wire() {
    // Hand-build an article whose body contains dot-stuffed lines, the way
    // an NNTP server transmits a line that starts with '.'
    let raw: &[u8] = &[4, 65, 66]; // encodes to ".kl"
    let body: Vec<u8> = b"..\x6b\x6c".to_vec(); // on the wire the leading dot is doubled
    let mut article = format!("=ybegin line=128 size={} name=dots\r\n", raw.len()).into_bytes();
    article.extend_from_slice(&body);
    article.extend_from_slice(format!("\r\n=yend size={} crc32={:08x}\r\n", raw.len(), crc32(raw)).as_bytes());

    let mut decoder = Decoder::new(Cursor::new(article));
    let mut out = Vec::new();
    decoder.read_to_end(&mut out).unwrap();
    assert_eq!(out, raw);
}

#[test]
fn test_incremental_split_mid_control_sequence() {
    // The stream pauses right after "\r\n="; the decoder must not emit a
    // spurious byte and must report the control line when 'y' arrives
    let mut dst = [0u8; 64];
    let mut state = State::default();

    let (nd, ns, end) = decode_incremental(&mut dst, b"\x90\x91\r\n=", &mut state).unwrap();
    assert_eq!(nd, 2);
    assert_eq!(ns, 5);
    assert_eq!(end, yenc_rs::End::None);

    let (nd, ns, end) = decode_incremental(&mut dst, b"yend size=2\r\n", &mut state).unwrap();
    assert_eq!(nd, 0);
    assert_eq!(ns, 1);
    assert_eq!(end, yenc_rs::End::Control);
}

#[test]
fn test_incremental_round_trip_all_chunkings() {
    let raw: Vec<u8> = (0..=255u8).collect();
    let mut encoded = vec![0u8; max_encoded_length(raw.len(), 128)];
    let mut col = 0;
    let n = encode_incremental(&mut encoded, &raw, 128, &mut col);
    encoded.truncate(n);
    encoded.extend_from_slice(b"\r\n=yend size=256\r\n");

    for split in 0..=encoded.len() {
        let mut state = State::default();
        let mut dst = vec![0u8; encoded.len()];
        let mut out = Vec::new();

        let (nd, ns, end) = decode_incremental(&mut dst, &encoded[..split], &mut state).unwrap();
        out.extend_from_slice(&dst[..nd]);
        if end == yenc_rs::End::Control {
            // The split landed past the terminator already
            assert_eq!(out, raw, "split {}", split);
            continue;
        }
        // Without a terminator in sight, everything is consumed; straddled
        // sequences are parked in the state
        assert_eq!(ns, split, "split {}", split);

        let (nd, _, end) = decode_incremental(&mut dst, &encoded[split..], &mut state).unwrap();
        out.extend_from_slice(&dst[..nd]);

        assert_eq!(end, yenc_rs::End::Control, "split {}", split);
        assert_eq!(out, raw, "split {}", split);
    }
}

#[test]
fn test_feed_and_pull_agree() {
    let mut rng = rand::rngs::StdRng::seed_from_u64(5);
    let raw: Vec<u8> = (0..200_000).map(|_| rng.r#gen()).collect();
    let mut encoded = encode_article(&raw);
    encoded.extend_from_slice(b".\r\n");

    // Pull
    let mut decoder = Decoder::new(Cursor::new(encoded.clone()));
    let mut pulled = Vec::new();
    decoder.read_to_end(&mut pulled).unwrap();

    // Feed
    let mut feeder = ArticleDecoder::new();
    let mut fed = Vec::new();
    let (consumed, done) = feeder.feed(&encoded, &mut fed).unwrap();
    assert!(done);
    assert_eq!(consumed, encoded.len());
    feeder.finish().unwrap();

    // One-shot
    let mut dst = vec![0u8; encoded.len()];
    let (n, meta) = decode_all(&mut dst, &encoded).unwrap();

    assert_eq!(pulled, raw);
    assert_eq!(fed, raw);
    assert_eq!(&dst[..n], &raw[..]);
    assert_eq!(meta.hash, decoder.meta().hash);
    assert_eq!(feeder.meta().hash, meta.hash);
}

#[test]
fn test_multipart_offsets() {
    let file: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
    let (first, second) = file.split_at(600);

    let mut parts = Vec::new();
    for (i, (chunk, offset)) in [(first, 0i64), (second, 600i64)].iter().enumerate() {
        let mut out = Vec::new();
        let mut encoder = Encoder::new(&mut out, Meta {
            file_name: "multi.bin".to_string(),
            file_size: file.len() as i64,
            part_size: chunk.len() as i64,
            part_number: i as i64 + 1,
            total_parts: 2,
            offset: *offset,
            raw: false,
        })
        .unwrap();
        encoder.write(chunk).unwrap();
        encoder.close().unwrap();
        parts.push(out);
    }

    let mut assembled = vec![0u8; file.len()];
    for part in &parts {
        let mut decoder = Decoder::new(Cursor::new(part.clone()));
        let mut payload = Vec::new();
        decoder.read_to_end(&mut payload).unwrap();

        let meta = decoder.meta();
        assert_eq!(meta.file_size, file.len() as i64);
        assert_eq!(meta.part_size, payload.len() as i64);
        let start = meta.offset as usize;
        assembled[start..start + payload.len()].copy_from_slice(&payload);
    }

    assert_eq!(assembled, file);
}

#[test]
fn test_corrupted_article_reports_after_payload() {
    let raw = b"payload bytes";
    let mut tampered = encode_article(raw);
    let crc_at = tampered
        .windows(7)
        .position(|w| w == b"pcrc32=")
        .expect("trailer crc present")
        + 7;
    tampered[crc_at..crc_at + 8].copy_from_slice(b"00000001");

    let mut decoder = Decoder::new(Cursor::new(tampered));
    let mut out = Vec::new();
    let err = decoder.read_to_end(&mut out).unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    assert_eq!(out, raw, "payload delivered before the error");
}

#[test]
fn test_trailing_escape_is_corruption() {
    // '=' as the very last byte of the stream: the escape never completes
    let mut article = b"=ybegin line=128 size=2 name=x\r\n\x6b\x6b".to_vec();
    article.extend_from_slice(b"\r\n=yend size=2\r\n");
    // valid so far; now a stream that ends inside an escape
    let truncated = b"=ybegin line=128 size=2 name=x\r\n\x6b=".to_vec();

    let mut dst = vec![0u8; article.len()];
    assert!(decode_all(&mut dst, &article).is_ok());

    let mut dst = vec![0u8; truncated.len()];
    assert!(matches!(
        decode_all(&mut dst, &truncated),
        Err(Error::DataCorruption(_))
    ));
}
