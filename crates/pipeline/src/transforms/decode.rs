//! Bytes → text using the encoding each chunk declares.

use async_stream::try_stream;
use futures::{Stream, StreamExt};
use talewright_core::{CancellationToken, Chunk, ChunkStream, ChunkType, StageError, Transform};

/// Encodings the decoder understands. Lookup is case-insensitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    Utf8,
    Ascii,
    Latin1,
    Utf16Le,
    Utf16Be,
}

impl TextEncoding {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "utf-8" | "utf8" => Some(Self::Utf8),
            "us-ascii" | "ascii" => Some(Self::Ascii),
            "iso-8859-1" | "latin1" | "latin-1" => Some(Self::Latin1),
            "utf-16" | "utf-16le" => Some(Self::Utf16Le),
            "utf-16be" => Some(Self::Utf16Be),
            _ => None,
        }
    }

    /// Strict decode; `None` on any invalid sequence.
    pub fn decode(self, bytes: &[u8]) -> Option<String> {
        match self {
            Self::Utf8 => std::str::from_utf8(bytes).ok().map(str::to_owned),
            Self::Ascii => bytes
                .is_ascii()
                .then(|| bytes.iter().map(|&b| b as char).collect()),
            Self::Latin1 => Some(bytes.iter().map(|&b| b as char).collect()),
            Self::Utf16Le => decode_utf16(bytes, u16::from_le_bytes),
            Self::Utf16Be => decode_utf16(bytes, u16::from_be_bytes),
        }
    }
}

fn decode_utf16(bytes: &[u8], unit: fn([u8; 2]) -> u16) -> Option<String> {
    if bytes.len() % 2 != 0 {
        return None;
    }
    let units = bytes.chunks_exact(2).map(|pair| unit([pair[0], pair[1]]));
    char::decode_utf16(units).collect::<Result<String, _>>().ok()
}

/// Turns every bytes chunk into a text chunk with the same metadata.
#[derive(Debug, Default, Clone, Copy)]
pub struct DecodeBytesToText;

impl DecodeBytesToText {
    pub fn new() -> Self {
        Self
    }
}

impl Transform for DecodeBytesToText {
    fn input_type(&self) -> ChunkType {
        ChunkType::BYTES
    }

    fn output_type(&self) -> ChunkType {
        ChunkType::TEXT
    }

    fn transform(&self, input: ChunkStream, _cancel: CancellationToken) -> ChunkStream {
        decode_stream(input).boxed()
    }
}

fn decode_stream(input: ChunkStream) -> impl Stream<Item = Result<Chunk, StageError>> + Send + 'static {
    try_stream! {
        for await chunk in input {
            let chunk = chunk?.into_bytes()?;

            let name = match chunk.metadata().text_encoding() {
                Some(name) if !name.trim().is_empty() => name.to_string(),
                _ => Err(StageError::Decode("Bytes chunk missing declared text encoding".into()))?,
            };
            let encoding = TextEncoding::from_name(&name)
                .ok_or_else(|| StageError::Decode(format!("Unsupported encoding '{name}'")))?;
            let text = encoding
                .decode(chunk.bytes())
                .ok_or_else(|| StageError::Decode("Failed to decode bytes".into()))?;

            yield Chunk::text(text, chunk.metadata().clone());
        }
    }
}
