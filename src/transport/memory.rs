use std::io::{Cursor, Read};
use std::sync::Arc;

use crate::errors::DatasetError;
use crate::transport::{ByteReader, ByteSource, ContentEncoding};

/// Shared byte buffer readable through `Cursor`.
#[derive(Clone)]
struct SharedBytes(Arc<[u8]>);

impl AsRef<[u8]> for SharedBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Repeatable in-memory source.
#[derive(Clone)]
pub struct BytesSource {
    name: String,
    content_type: String,
    bytes: SharedBytes,
    encoding: ContentEncoding,
}

impl BytesSource {
    /// Wrap `bytes`; `source_gzipped` says whether they are compressed.
    pub fn new(
        name: impl Into<String>,
        content_type: impl Into<String>,
        bytes: Vec<u8>,
        source_gzipped: bool,
    ) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            bytes: SharedBytes(Arc::from(bytes)),
            encoding: ContentEncoding::for_source(Some(source_gzipped)),
        }
    }

    /// Build a source holding a UTF-8 string.
    pub fn from_text(name: impl Into<String>, content_type: impl Into<String>, text: &str) -> Self {
        Self::new(name, content_type, text.as_bytes().to_vec(), false)
    }

    /// Stored bytes, as held (possibly compressed).
    pub fn bytes(&self) -> &[u8] {
        self.bytes.as_ref()
    }
}

impl ByteSource for BytesSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    fn content_type(&self) -> &str {
        &self.content_type
    }

    fn encoding(&self) -> ContentEncoding {
        self.encoding
    }

    fn encoding_mut(&mut self) -> &mut ContentEncoding {
        &mut self.encoding
    }

    fn materialize(&mut self) -> Result<(), DatasetError> {
        Ok(())
    }

    fn can_read_multiple_times(&self) -> bool {
        true
    }

    fn try_clone(&self) -> Option<Box<dyn ByteSource>> {
        Some(Box::new(self.clone()))
    }

    fn open_raw(&mut self) -> Result<ByteReader, DatasetError> {
        Ok(Box::new(Cursor::new(self.bytes.clone())))
    }
}

/// Source over a one-shot reader (a pipe, a response body, ...).
///
/// Readable once unless [`ByteSource::materialize`] buffers it into memory first.
pub struct ReaderSource {
    name: String,
    content_type: String,
    reader: Option<ByteReader>,
    buffered: Option<SharedBytes>,
    encoding: ContentEncoding,
}

impl ReaderSource {
    /// Wrap `reader`; `source_gzipped` is `None` when the storage encoding is unknown.
    pub fn new(
        name: impl Into<String>,
        content_type: impl Into<String>,
        reader: impl Read + Send + 'static,
        source_gzipped: Option<bool>,
    ) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            reader: Some(Box::new(reader)),
            buffered: None,
            encoding: ContentEncoding::for_source(source_gzipped),
        }
    }
}

impl ByteSource for ReaderSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    fn content_type(&self) -> &str {
        &self.content_type
    }

    fn encoding(&self) -> ContentEncoding {
        self.encoding
    }

    fn encoding_mut(&mut self) -> &mut ContentEncoding {
        &mut self.encoding
    }

    fn materialize(&mut self) -> Result<(), DatasetError> {
        if self.buffered.is_some() {
            return Ok(());
        }
        let mut reader = self.reader.take().ok_or(DatasetError::AlreadyConsumed)?;
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        self.buffered = Some(SharedBytes(Arc::from(bytes)));
        Ok(())
    }

    fn can_read_multiple_times(&self) -> bool {
        self.buffered.is_some()
    }

    fn try_clone(&self) -> Option<Box<dyn ByteSource>> {
        let buffered = self.buffered.clone()?;
        Some(Box::new(ReaderSource {
            name: self.name.clone(),
            content_type: self.content_type.clone(),
            reader: None,
            buffered: Some(buffered),
            encoding: self.encoding,
        }))
    }

    fn open_raw(&mut self) -> Result<ByteReader, DatasetError> {
        if let Some(bytes) = &self.buffered {
            return Ok(Box::new(Cursor::new(bytes.clone())));
        }
        self.reader.take().ok_or(DatasetError::AlreadyConsumed)
    }
}
