//! Byte-oriented sources that back serialized record sets.
//!
//! Ownership model:
//! - A `ByteSource` is owned by the `RecordSet` it backs until it is read.
//! - Readers returned by `open` are owned by the caller (usually a record stream)
//!   and release the underlying file or buffer when dropped.
//! - Content encoding is an explicit flag (`gzip_content`), independent of
//!   whether the stored bytes are compressed (`source_gzipped`).

use flate2::Compression;
use flate2::read::{GzEncoder, MultiGzDecoder};
use std::io::{BufRead, BufReader, Read};

use crate::constants::artifacts::GZIP_MAGIC;
use crate::errors::DatasetError;

/// Filesystem sources.
pub mod fs;
/// In-memory and one-shot reader sources.
pub mod memory;

pub use fs::{FileSource, write_to_dir};
pub use memory::{BytesSource, ReaderSource};

/// Reader handed out by byte sources.
pub type ByteReader = Box<dyn Read + Send>;

/// Stored and requested content encoding of a byte source.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ContentEncoding {
    /// Whether the stored bytes are gzip-compressed; `None` when unknown.
    pub source_gzipped: Option<bool>,
    /// Whether `open` should yield gzip-compressed bytes.
    pub gzip_content: bool,
}

impl ContentEncoding {
    /// Encoding that serves bytes as stored when the storage encoding is known,
    /// and gzip otherwise.
    pub fn for_source(source_gzipped: Option<bool>) -> Self {
        Self {
            source_gzipped,
            gzip_content: source_gzipped.unwrap_or(true),
        }
    }

    /// Wrap a raw reader so it yields bytes in the requested encoding.
    pub fn apply(&self, raw: ByteReader) -> Result<ByteReader, DatasetError> {
        if self.source_gzipped == Some(self.gzip_content) {
            return Ok(raw);
        }
        if self.gzip_content {
            gzipped(raw)
        } else {
            gunzipped(raw)
        }
    }
}

/// Sniff the gzip magic bytes without consuming them.
fn peek_gzip(reader: &mut BufReader<ByteReader>) -> Result<bool, DatasetError> {
    let head = reader.fill_buf()?;
    Ok(head.len() >= GZIP_MAGIC.len() && head[..GZIP_MAGIC.len()] == GZIP_MAGIC)
}

/// Compress `raw` unless it already is gzip.
pub fn gzipped(raw: ByteReader) -> Result<ByteReader, DatasetError> {
    let mut buffered = BufReader::new(raw);
    if peek_gzip(&mut buffered)? {
        return Ok(Box::new(buffered));
    }
    Ok(Box::new(GzEncoder::new(buffered, Compression::default())))
}

/// Decompress `raw` if it is gzip, otherwise pass it through.
pub fn gunzipped(raw: ByteReader) -> Result<ByteReader, DatasetError> {
    let mut buffered = BufReader::new(raw);
    if peek_gzip(&mut buffered)? {
        return Ok(Box::new(MultiGzDecoder::new(buffered)));
    }
    Ok(Box::new(buffered))
}

/// Source/sink boundary for serialized record data.
pub trait ByteSource: Send {
    /// Artifact name (for files, the file name).
    fn name(&self) -> &str;
    /// Rename the artifact.
    fn set_name(&mut self, name: &str);
    /// Media type of the decoded content.
    fn content_type(&self) -> &str;
    /// Stored and requested encoding.
    fn encoding(&self) -> ContentEncoding;
    /// Mutable access to the encoding flags.
    fn encoding_mut(&mut self) -> &mut ContentEncoding;

    /// Make the source re-readable, buffering it if needed. Idempotent.
    fn materialize(&mut self) -> Result<(), DatasetError>;
    /// Whether every `open` yields a fresh pass over the same bytes.
    fn can_read_multiple_times(&self) -> bool;

    /// Independent handle over the same bytes, for repeatable sources only.
    fn try_clone(&self) -> Option<Box<dyn ByteSource>> {
        None
    }

    /// Open the stored bytes without any encoding change.
    ///
    /// One-shot sources fail with `AlreadyConsumed` on the second call.
    fn open_raw(&mut self) -> Result<ByteReader, DatasetError>;

    /// Open the bytes in the requested content encoding.
    fn open(&mut self) -> Result<ByteReader, DatasetError> {
        let encoding = self.encoding();
        encoding.apply(self.open_raw()?)
    }

    /// Open the bytes decompressed, regardless of the requested encoding.
    fn open_decoded(&mut self) -> Result<ByteReader, DatasetError> {
        let raw = self.open_raw()?;
        match self.encoding().source_gzipped {
            Some(false) => Ok(raw),
            _ => gunzipped(raw),
        }
    }

    /// Whether `open` yields gzip-compressed bytes.
    fn gzip_content(&self) -> bool {
        self.encoding().gzip_content
    }

    /// Request gzip-compressed (or plain) bytes from `open`.
    fn set_gzip_content(&mut self, gzip: bool) {
        self.encoding_mut().gzip_content = gzip;
    }
}

impl<S: ByteSource + ?Sized> ByteSource for Box<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn set_name(&mut self, name: &str) {
        (**self).set_name(name)
    }

    fn content_type(&self) -> &str {
        (**self).content_type()
    }

    fn encoding(&self) -> ContentEncoding {
        (**self).encoding()
    }

    fn encoding_mut(&mut self) -> &mut ContentEncoding {
        (**self).encoding_mut()
    }

    fn materialize(&mut self) -> Result<(), DatasetError> {
        (**self).materialize()
    }

    fn can_read_multiple_times(&self) -> bool {
        (**self).can_read_multiple_times()
    }

    fn try_clone(&self) -> Option<Box<dyn ByteSource>> {
        (**self).try_clone()
    }

    fn open_raw(&mut self) -> Result<ByteReader, DatasetError> {
        (**self).open_raw()
    }

    fn open(&mut self) -> Result<ByteReader, DatasetError> {
        (**self).open()
    }

    fn open_decoded(&mut self) -> Result<ByteReader, DatasetError> {
        (**self).open_decoded()
    }
}
