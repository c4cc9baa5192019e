//! Typed record collections with a single active representation.
//!
//! A [`RecordSet`] holds its records in exactly one of four forms: a
//! materialized list, a single-pass stream, a single-pass iterator, or a byte
//! source holding JSON Lines. Switching forms takes `&mut self`; the set is
//! owned by one context at a time and does no locking of its own.
//!
//! Single-pass forms are handed over to the caller on read. Reading them again
//! fails with [`DatasetError::AlreadyConsumed`]. The list and repeatable byte
//! sources produce a fresh pass on every read.

use std::fmt;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::sync::{Arc, RwLock};

use flate2::Compression;
use flate2::write::GzEncoder;
use tracing::debug;

use crate::config::DatasetConfig;
use crate::data::Record;
use crate::errors::DatasetError;
use crate::metadata::{SetMetadata, SetSize};
use crate::registry::HandlerRegistry;
use crate::tap::{MetadataHandle, MetadataTap, SharedMetadata};
use crate::transport::{ByteSource, BytesSource};
use crate::types::RecordType;

/// Boxed single-pass record stream.
pub type RecordStream<T> = Box<dyn Iterator<Item = Result<T, DatasetError>> + Send>;

/// Which representation a set currently holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RepresentationKind {
    /// Materialized, repeatable list.
    List,
    /// Single-pass fallible stream.
    Stream,
    /// Single-pass iterator.
    Iterator,
    /// Byte source holding JSON Lines.
    Source,
}

enum Representation<T> {
    List(Arc<Vec<T>>),
    Stream(RecordStream<T>),
    Iter(Box<dyn Iterator<Item = T> + Send>),
    Source(Box<dyn ByteSource>),
}

impl<T> Representation<T> {
    fn kind(&self) -> RepresentationKind {
        match self {
            Representation::List(_) => RepresentationKind::List,
            Representation::Stream(_) => RepresentationKind::Stream,
            Representation::Iter(_) => RepresentationKind::Iterator,
            Representation::Source(_) => RepresentationKind::Source,
        }
    }
}

/// Pass over a materialized list, cloning records as they are pulled.
pub struct ListIter<T> {
    items: Arc<Vec<T>>,
    pos: usize,
}

impl<T: Clone> Iterator for ListIter<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        let item = self.items.get(self.pos)?.clone();
        self.pos += 1;
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.items.len().saturating_sub(self.pos);
        (remaining, Some(remaining))
    }
}

/// One pass over a record set, as returned by [`RecordSet::as_iter`].
pub enum RecordIter<T> {
    /// Fresh pass over the materialized list.
    List(ListIter<T>),
    /// The set's single-pass stream, handed over.
    Stream(RecordStream<T>),
}

impl<T: Clone> Iterator for RecordIter<T> {
    type Item = Result<T, DatasetError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            RecordIter::List(items) => items.next().map(Ok),
            RecordIter::Stream(stream) => stream.next(),
        }
    }
}

/// Ordered collection of records of one kind plus its descriptive metadata.
pub struct RecordSet<T: Record> {
    record_type: RecordType,
    repr: Option<Representation<T>>,
    metadata: SharedMetadata,
}

impl<T: Record> RecordSet<T> {
    fn build(repr: Representation<T>, metadata: SetMetadata) -> Self {
        Self {
            record_type: metadata.record_type(),
            repr: Some(repr),
            metadata: Arc::new(RwLock::new(metadata)),
        }
    }

    /// Materialized set. Size is known; the type comes from the first record.
    pub fn from_list(items: Vec<T>) -> Self {
        let record_type = items
            .first()
            .map(Record::record_type)
            .unwrap_or(T::DEFAULT_TYPE);
        let metadata =
            SetMetadata::new(record_type).with_size(SetSize::Known(items.len() as u64));
        Self::build(Representation::List(Arc::new(items)), metadata)
    }

    /// Single-pass set over a fallible stream. Size is unknown.
    pub fn from_stream<I>(stream: I) -> Self
    where
        I: Iterator<Item = Result<T, DatasetError>> + Send + 'static,
    {
        Self::build(
            Representation::Stream(Box::new(stream)),
            SetMetadata::new(T::DEFAULT_TYPE),
        )
    }

    /// Single-pass set over an infallible iterator. Size is unknown.
    pub fn from_iterator<I>(iter: I) -> Self
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: Send + 'static,
    {
        Self::build(
            Representation::Iter(Box::new(iter.into_iter())),
            SetMetadata::new(T::DEFAULT_TYPE),
        )
    }

    /// Set backed by JSON Lines in `source`. Nothing is read until requested.
    pub fn from_source(source: impl ByteSource + 'static, metadata: SetMetadata) -> Self {
        Self::build(Representation::Source(Box::new(source)), metadata)
    }

    /// Reunite a data artifact with its separately stored metadata document.
    pub fn from_data_sources(
        data: impl ByteSource + 'static,
        metadata: &mut dyn ByteSource,
    ) -> Result<Self, DatasetError> {
        let metadata = SetMetadata::from_reader(metadata.open_decoded()?)?;
        Ok(Self::from_source(data, metadata))
    }

    /// Replace the metadata (and with it the record type).
    pub fn with_metadata(mut self, metadata: SetMetadata) -> Self {
        self.record_type = metadata.record_type();
        self.metadata = Arc::new(RwLock::new(metadata));
        self
    }

    /// Record type tag of this set.
    pub fn record_type(&self) -> RecordType {
        self.record_type
    }

    /// Snapshot of the current metadata. Not final while a tap is still open.
    pub fn metadata(&self) -> SetMetadata {
        self.metadata.read().expect("metadata poisoned").clone()
    }

    /// Apply an explicit change to the owned metadata.
    pub fn update_metadata<R>(&mut self, update: impl FnOnce(&mut SetMetadata) -> R) -> R {
        let mut metadata = self.metadata.write().expect("metadata poisoned");
        update(&mut *metadata)
    }

    /// Current metadata size.
    pub fn size(&self) -> SetSize {
        self.metadata.read().expect("metadata poisoned").size()
    }

    /// Active representation, or `None` once a single-pass form was handed out.
    pub fn representation(&self) -> Option<RepresentationKind> {
        self.repr.as_ref().map(Representation::kind)
    }

    /// Drain the active representation into a list and keep the list.
    pub fn as_list(&mut self) -> Result<&[T], DatasetError> {
        if !matches!(self.repr, Some(Representation::List(_))) {
            let items = self.take_pass()?.collect::<Result<Vec<_>, _>>()?;
            self.repr = Some(Representation::List(Arc::new(items)));
        }
        match &self.repr {
            Some(Representation::List(items)) => Ok(items.as_slice()),
            _ => Err(DatasetError::AlreadyConsumed),
        }
    }

    /// Consume the set and return its records.
    pub fn into_list(mut self) -> Result<Vec<T>, DatasetError> {
        self.as_list()?;
        match self.repr.take() {
            Some(Representation::List(items)) => Ok(Arc::unwrap_or_clone(items)),
            _ => Err(DatasetError::AlreadyConsumed),
        }
    }

    /// One pass over the records as a boxed stream.
    pub fn as_stream(&mut self) -> Result<RecordStream<T>, DatasetError> {
        Ok(match self.take_pass()? {
            RecordIter::Stream(stream) => stream,
            list => Box::new(list),
        })
    }

    /// One pass over the records.
    pub fn as_iter(&mut self) -> Result<RecordIter<T>, DatasetError> {
        self.take_pass()
    }

    /// Discard the active representation and install `stream` in its place.
    pub fn replace_stream<I>(&mut self, stream: I)
    where
        I: Iterator<Item = Result<T, DatasetError>> + Send + 'static,
    {
        self.repr = Some(Representation::Stream(Box::new(stream)));
    }

    /// Collect `stream` and make it the materialized contents of this set.
    pub fn convert_to_list<I>(&mut self, stream: I) -> Result<&[T], DatasetError>
    where
        I: IntoIterator<Item = Result<T, DatasetError>>,
    {
        let items = stream.into_iter().collect::<Result<Vec<_>, _>>()?;
        self.repr = Some(Representation::List(Arc::new(items)));
        self.as_list()
    }

    /// Tap `stream`; closing the tap updates this set's metadata in place.
    pub fn create_metadata_tap<I>(&self, stream: I) -> (MetadataTap<I>, MetadataHandle) {
        MetadataTap::with_owner(stream, Arc::clone(&self.metadata))
    }

    /// Drain the records through a tap and return the final metadata.
    ///
    /// Single-pass forms are materialized as a side effect so the records stay
    /// available. A failing pass leaves the metadata as it was.
    pub fn generate_metadata(&mut self) -> Result<SetMetadata, DatasetError> {
        let was_list = matches!(self.repr, Some(Representation::List(_)));
        let pass = self.take_pass()?;
        let (mut tap, handle) = self.create_metadata_tap(pass);
        let drained = if was_list {
            tap.by_ref().try_for_each(|record| record.map(drop))
        } else {
            tap.by_ref()
                .collect::<Result<Vec<_>, _>>()
                .map(|items| self.repr = Some(Representation::List(Arc::new(items))))
        };
        if let Err(err) = drained {
            tap.abort(&err);
            return Err(err);
        }
        tap.close();
        handle.wait()
    }

    /// Serialize one pass as JSON Lines, optionally gzip-compressed.
    pub fn write_json<W: Write>(&mut self, writer: W, gzip: bool) -> Result<u64, DatasetError> {
        let stream = self.as_stream()?;
        encode_json_lines(stream, writer, gzip)
    }

    /// Produce the data and metadata artifacts of this set.
    ///
    /// A byte-source backed set hands out its source as the data artifact: a
    /// repeatable source is duplicated and stays with the set, a one-shot source
    /// is given up. Other forms are serialized through a metadata tap, so the metadata
    /// artifact always carries the final size and field types.
    pub fn to_data_sources(
        &mut self,
        registry: &HandlerRegistry,
        config: &DatasetConfig,
    ) -> Result<(Box<dyn ByteSource>, BytesSource), DatasetError> {
        let handler = registry.resolve(self.record_type)?;
        let data: Box<dyn ByteSource> = match self.repr.take() {
            Some(Representation::Source(source)) => {
                let mut data = match source.try_clone() {
                    Some(copy) => {
                        self.repr = Some(Representation::Source(source));
                        copy
                    }
                    None => source,
                };
                data.set_name(&config.data_name);
                data.set_gzip_content(config.gzip_data);
                data
            }
            other => {
                self.repr = other;
                let stream = self.as_stream()?;
                let (mut tap, handle) = self.create_metadata_tap(stream);
                let mut bytes = Vec::new();
                let count = match encode_json_lines(tap.by_ref(), &mut bytes, config.gzip_data) {
                    Ok(count) => count,
                    Err(err) => {
                        tap.abort(&err);
                        return Err(err);
                    }
                };
                tap.close();
                handle.wait()?;
                debug!(
                    records = count,
                    bytes = bytes.len(),
                    gzip = config.gzip_data,
                    "serialized record set"
                );
                Box::new(BytesSource::new(
                    config.data_name.as_ref(),
                    handler.item_media_type.as_str(),
                    bytes,
                    config.gzip_data,
                ))
            }
        };
        let metadata = BytesSource::from_text(
            config.metadata_name.as_ref(),
            registry.metadata_media_type(),
            &self.metadata().to_json()?,
        );
        Ok((data, metadata))
    }

    fn take_pass(&mut self) -> Result<RecordIter<T>, DatasetError> {
        match self.repr.take().ok_or(DatasetError::AlreadyConsumed)? {
            Representation::List(items) => {
                self.repr = Some(Representation::List(Arc::clone(&items)));
                Ok(RecordIter::List(ListIter { items, pos: 0 }))
            }
            Representation::Stream(stream) => Ok(RecordIter::Stream(stream)),
            Representation::Iter(iter) => Ok(RecordIter::Stream(Box::new(iter.map(Ok)))),
            Representation::Source(mut source) => {
                let opened = decode_json_lines(source.as_mut());
                if source.can_read_multiple_times() {
                    self.repr = Some(Representation::Source(source));
                }
                opened.map(RecordIter::Stream)
            }
        }
    }
}

impl<T: Record> FromIterator<T> for RecordSet<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::from_list(iter.into_iter().collect())
    }
}

impl<T: Record> fmt::Debug for RecordSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordSet")
            .field("record_type", &self.record_type)
            .field("representation", &self.representation())
            .field("size", &self.size())
            .finish()
    }
}

fn decode_json_lines<T: Record>(
    source: &mut dyn ByteSource,
) -> Result<RecordStream<T>, DatasetError> {
    let reader = BufReader::new(source.open_decoded()?);
    let records = reader.lines().filter_map(|line| match line {
        Ok(line) if line.trim().is_empty() => None,
        Ok(line) => Some(serde_json::from_str::<T>(&line).map_err(DatasetError::from)),
        Err(err) => Some(Err(DatasetError::from(err))),
    });
    Ok(Box::new(records))
}

fn encode_json_lines<T, I, W>(records: I, writer: W, gzip: bool) -> Result<u64, DatasetError>
where
    T: Record,
    I: Iterator<Item = Result<T, DatasetError>>,
    W: Write,
{
    if gzip {
        let mut encoder = GzEncoder::new(writer, Compression::default());
        let count = write_records(records, &mut encoder)?;
        encoder.finish()?;
        Ok(count)
    } else {
        let mut out = BufWriter::new(writer);
        let count = write_records(records, &mut out)?;
        out.flush()?;
        Ok(count)
    }
}

fn write_records<T, I, W>(records: I, out: &mut W) -> Result<u64, DatasetError>
where
    T: Record,
    I: Iterator<Item = Result<T, DatasetError>>,
    W: Write,
{
    let mut count = 0;
    for record in records {
        serde_json::to_writer(&mut *out, &record?)?;
        out.write_all(b"\n")?;
        count += 1;
    }
    Ok(count)
}
