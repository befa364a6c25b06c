#![doc = include_str!("../README.md")]

mod decode;
mod decoder;
mod encode;
mod encoder;
mod envelope;
mod error;
mod feed;
mod fields;
mod format;
mod lut;
mod simd;
mod types;

pub use decode::decode_incremental;
pub use decoder::{Decoder, decode_all};
pub use encode::{encode_incremental, max_encoded_length};
pub use encoder::Encoder;
pub use error::{Error, Result};
pub use feed::ArticleDecoder;
pub use format::Format;
pub use simd::{decode_kernel, encode_kernel};
pub use types::{DecodedMeta, End, Meta, State};
