//! Chunks: the unit of data flowing through a pipeline.
//!
//! A chunk is either raw bytes or text, plus metadata. Payloads are
//! immutable once built; metadata is copy-on-write and can only be replaced
//! wholesale via [`Chunk::with_metadata`].

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{MetadataError, StageError};

/// Named chunk type used to validate a pipeline chain end to end.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChunkType(Cow<'static, str>);

impl ChunkType {
    pub const BYTES: ChunkType = ChunkType(Cow::Borrowed("bytes"));
    pub const TEXT: ChunkType = ChunkType(Cow::Borrowed("text"));

    /// Declare a custom chunk type.
    pub fn new(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChunkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Metadata carried alongside every chunk.
///
/// Cloning is cheap: annotations sit behind an `Arc` and every mutation
/// derives a new map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkMetadata {
    text_encoding: Option<String>,
    annotations: Arc<BTreeMap<String, String>>,
}

impl ChunkMetadata {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Metadata declaring the text encoding of a bytes payload.
    pub fn with_text_encoding(mut self, name: impl Into<String>) -> Self {
        self.text_encoding = Some(name.into());
        self
    }

    pub fn text_encoding(&self) -> Option<&str> {
        self.text_encoding.as_deref()
    }

    pub fn annotations(&self) -> &BTreeMap<String, String> {
        &self.annotations
    }

    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations.get(key).map(String::as_str)
    }

    /// Return new metadata with `key` set to `value`.
    pub fn with_annotation(
        &self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<Self, MetadataError> {
        let key = key.into();
        if key.trim().is_empty() {
            return Err(MetadataError::EmptyKey);
        }

        let mut annotations = (*self.annotations).clone();
        annotations.insert(key, value.into());

        Ok(Self {
            text_encoding: self.text_encoding.clone(),
            annotations: Arc::new(annotations),
        })
    }

    /// Merge metadata in order.
    ///
    /// The right-most non-blank encoding wins; annotations are merged key by
    /// key with the last writer winning.
    pub fn merge<'a>(items: impl IntoIterator<Item = &'a ChunkMetadata>) -> Self {
        let mut text_encoding = None;
        let mut annotations = BTreeMap::new();

        for metadata in items {
            if let Some(encoding) = metadata.text_encoding.as_deref()
                && !encoding.trim().is_empty()
            {
                text_encoding = Some(encoding.to_string());
            }
            for (key, value) in metadata.annotations.iter() {
                annotations.insert(key.clone(), value.clone());
            }
        }

        Self {
            text_encoding,
            annotations: Arc::new(annotations),
        }
    }
}

/// A bytes payload with metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BytesChunk {
    bytes: Arc<[u8]>,
    metadata: ChunkMetadata,
}

impl BytesChunk {
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn metadata(&self) -> &ChunkMetadata {
        &self.metadata
    }
}

/// A text payload with metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    text: Arc<str>,
    metadata: ChunkMetadata,
}

impl TextChunk {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn metadata(&self) -> &ChunkMetadata {
        &self.metadata
    }
}

/// The smallest unit of pipeline data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Chunk {
    Bytes(BytesChunk),
    Text(TextChunk),
}

impl Chunk {
    pub fn bytes(bytes: impl Into<Vec<u8>>, metadata: ChunkMetadata) -> Self {
        Self::Bytes(BytesChunk {
            bytes: Arc::from(bytes.into()),
            metadata,
        })
    }

    pub fn text(text: impl Into<String>, metadata: ChunkMetadata) -> Self {
        Self::Text(TextChunk {
            text: Arc::from(text.into()),
            metadata,
        })
    }

    pub fn chunk_type(&self) -> ChunkType {
        match self {
            Self::Bytes(_) => ChunkType::BYTES,
            Self::Text(_) => ChunkType::TEXT,
        }
    }

    pub fn metadata(&self) -> &ChunkMetadata {
        match self {
            Self::Bytes(c) => &c.metadata,
            Self::Text(c) => &c.metadata,
        }
    }

    /// Same payload and tag, new metadata.
    pub fn with_metadata(self, metadata: ChunkMetadata) -> Self {
        match self {
            Self::Bytes(c) => Self::Bytes(BytesChunk {
                bytes: c.bytes,
                metadata,
            }),
            Self::Text(c) => Self::Text(TextChunk {
                text: c.text,
                metadata,
            }),
        }
    }

    /// Unwrap a text chunk or fail as a transform.
    pub fn into_text(self) -> Result<TextChunk, StageError> {
        match self {
            Self::Text(c) => Ok(c),
            other => Err(StageError::transform_failed(format!(
                "Expected text chunk, got '{}'",
                other.chunk_type()
            ))),
        }
    }

    /// Unwrap a bytes chunk or fail as a transform.
    pub fn into_bytes(self) -> Result<BytesChunk, StageError> {
        match self {
            Self::Bytes(c) => Ok(c),
            other => Err(StageError::transform_failed(format!(
                "Expected bytes chunk, got '{}'",
                other.chunk_type()
            ))),
        }
    }
}

impl From<TextChunk> for Chunk {
    fn from(chunk: TextChunk) -> Self {
        Self::Text(chunk)
    }
}

impl From<BytesChunk> for Chunk {
    fn from(chunk: BytesChunk) -> Self {
        Self::Bytes(chunk)
    }
}
