//! Metadata derivation over single-pass record streams.
//!
//! A [`MetadataTap`] wraps a stream, observes each record as the consumer pulls
//! it, and publishes the finished [`SetMetadata`] into a [`MetadataHandle`] when
//! the tap is closed (explicitly via [`MetadataTap::close`] or by dropping it).
//!
//! Liveness: [`MetadataHandle::wait`] only returns after the tap is closed. A
//! consumer that keeps the tap alive without closing it blocks every waiter.

use std::sync::{Arc, Condvar, Mutex, RwLock};
use std::time::Duration;
use tracing::warn;

use crate::data::Record;
use crate::errors::DatasetError;
use crate::metadata::{FieldTypeMap, SetMetadata, SetSize};
use crate::types::{RecordType, ValueType};

/// Metadata shared between a record set and the taps attached to its streams.
pub type SharedMetadata = Arc<RwLock<SetMetadata>>;

/// One-shot, publish-once/read-many completion signal.
pub struct Completion<T> {
    inner: Arc<(Mutex<Option<T>>, Condvar)>,
}

impl<T> Clone for Completion<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone> Default for Completion<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> Completion<T> {
    /// Unpublished completion.
    pub fn new() -> Self {
        Self {
            inner: Arc::new((Mutex::new(None), Condvar::new())),
        }
    }

    /// Publish `value`. Returns `false` (and drops `value`) if already published.
    pub fn publish(&self, value: T) -> bool {
        let (lock, cvar) = &*self.inner;
        let mut slot = lock.lock().expect("completion poisoned");
        if slot.is_some() {
            return false;
        }
        *slot = Some(value);
        cvar.notify_all();
        true
    }

    /// Block until a value is published.
    pub fn wait(&self) -> T {
        let (lock, cvar) = &*self.inner;
        let mut slot = lock.lock().expect("completion poisoned");
        loop {
            if let Some(value) = slot.as_ref() {
                return value.clone();
            }
            slot = cvar.wait(slot).expect("completion poisoned");
        }
    }

    /// Block until a value is published or `timeout` elapses.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<T> {
        let (lock, cvar) = &*self.inner;
        let slot = lock.lock().expect("completion poisoned");
        let (slot, _) = cvar
            .wait_timeout_while(slot, timeout, |slot| slot.is_none())
            .expect("completion poisoned");
        slot.clone()
    }

    /// Published value, without blocking.
    pub fn try_get(&self) -> Option<T> {
        let (lock, _) = &*self.inner;
        lock.lock().expect("completion poisoned").clone()
    }

    /// Whether a value was published.
    pub fn is_complete(&self) -> bool {
        let (lock, _) = &*self.inner;
        lock.lock().expect("completion poisoned").is_some()
    }
}

/// Why a tap stopped before its stream was exhausted.
#[derive(Clone, Debug)]
enum TapFailure {
    Inconsistent {
        expected: RecordType,
        found: RecordType,
    },
    Upstream(String),
}

/// Value published by a tap when it closes.
#[derive(Clone, Debug)]
enum TapOutcome {
    Complete(SetMetadata),
    Aborted(TapFailure),
}

impl TapOutcome {
    fn into_result(self) -> Result<SetMetadata, DatasetError> {
        match self {
            TapOutcome::Complete(metadata) => Ok(metadata),
            TapOutcome::Aborted(TapFailure::Inconsistent { expected, found }) => {
                Err(DatasetError::InconsistentType { expected, found })
            }
            TapOutcome::Aborted(TapFailure::Upstream(message)) => {
                Err(DatasetError::StreamFailed(message))
            }
        }
    }
}

/// Consumer side of a tap: yields the final metadata once the tap closes.
#[derive(Clone)]
pub struct MetadataHandle {
    completion: Completion<TapOutcome>,
}

impl MetadataHandle {
    /// Block until the tap closes.
    ///
    /// Fails with `InconsistentType` when the tapped stream was aborted because
    /// it was not homogeneous, and with `StreamFailed` when the stream itself
    /// yielded an error. In both cases the owner's metadata is left untouched.
    pub fn wait(&self) -> Result<SetMetadata, DatasetError> {
        self.completion.wait().into_result()
    }

    /// Like [`MetadataHandle::wait`], giving up after `timeout`.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Result<SetMetadata, DatasetError>> {
        self.completion
            .wait_timeout(timeout)
            .map(TapOutcome::into_result)
    }

    /// Outcome if the tap has closed, without blocking.
    pub fn try_get(&self) -> Option<Result<SetMetadata, DatasetError>> {
        self.completion.try_get().map(TapOutcome::into_result)
    }

    /// Whether the tap has closed.
    pub fn is_complete(&self) -> bool {
        self.completion.is_complete()
    }
}

/// Pass-through stream that derives metadata from the records it yields.
///
/// Per record: the count is incremented, the record type is compared against the
/// first record's type (a difference aborts the stream with `InconsistentType`),
/// and the first-seen value type of each field is recorded. Later differing
/// field types are only logged.
///
/// An error from the underlying stream is passed on once and ends the tap; no
/// metadata is published for a partial pass.
pub struct MetadataTap<I> {
    inner: I,
    count: u64,
    record_type: Option<RecordType>,
    field_types: FieldTypeMap,
    failure: Option<TapFailure>,
    owner: Option<SharedMetadata>,
    fallback_type: RecordType,
    completion: Completion<TapOutcome>,
    closed: bool,
}

impl<I> MetadataTap<I> {
    /// Tap `stream`, building fresh metadata on close.
    pub fn new(stream: I, fallback_type: RecordType) -> (Self, MetadataHandle) {
        Self::build(stream, None, fallback_type)
    }

    /// Tap `stream`, updating `owner` in place on close.
    pub fn with_owner(stream: I, owner: SharedMetadata) -> (Self, MetadataHandle) {
        let fallback_type = owner.read().expect("metadata poisoned").record_type();
        Self::build(stream, Some(owner), fallback_type)
    }

    fn build(
        stream: I,
        owner: Option<SharedMetadata>,
        fallback_type: RecordType,
    ) -> (Self, MetadataHandle) {
        let completion = Completion::new();
        let handle = MetadataHandle {
            completion: completion.clone(),
        };
        let tap = Self {
            inner: stream,
            count: 0,
            record_type: None,
            field_types: FieldTypeMap::new(),
            failure: None,
            owner,
            fallback_type,
            completion,
            closed: false,
        };
        (tap, handle)
    }

    /// Number of records observed so far.
    pub fn observed(&self) -> u64 {
        self.count
    }

    /// Close the tap and publish its metadata.
    pub fn close(mut self) {
        self.finish();
    }

    /// Close the tap after its consumer failed, publishing `reason` instead of
    /// metadata. An earlier stream failure takes precedence.
    pub fn abort(mut self, reason: &DatasetError) {
        if self.failure.is_none() {
            self.failure = Some(TapFailure::Upstream(reason.to_string()));
        }
        self.finish();
    }

    fn finish(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let outcome = match self.failure.take() {
            Some(failure) => TapOutcome::Aborted(failure),
            None => TapOutcome::Complete(self.finalize()),
        };
        self.completion.publish(outcome);
    }

    fn finalize(&mut self) -> SetMetadata {
        let size = SetSize::Known(self.count);
        let field_types = std::mem::take(&mut self.field_types);
        match &self.owner {
            Some(owner) => {
                let mut metadata = owner.write().expect("metadata poisoned");
                metadata.set_size(size);
                metadata.replace_field_types(field_types);
                metadata.clone()
            }
            None => SetMetadata::new(self.record_type.unwrap_or(self.fallback_type))
                .with_size(size)
                .with_field_types(field_types),
        }
    }

    fn observe<T: Record>(&mut self, record: &T) -> Result<(), DatasetError> {
        let found = record.record_type();
        match self.record_type {
            None => self.record_type = Some(found),
            Some(expected) if expected != found => {
                self.failure = Some(TapFailure::Inconsistent { expected, found });
                return Err(DatasetError::InconsistentType { expected, found });
            }
            Some(_) => {}
        }
        self.count += 1;
        for (field, value) in record.values() {
            let Some(value_type) = ValueType::of(value) else {
                continue;
            };
            match self.field_types.get(field) {
                None => {
                    self.field_types.insert(field.clone(), value_type);
                }
                Some(existing) if *existing != value_type => {
                    warn!(
                        field = %field,
                        kept = %existing,
                        found = %value_type,
                        "field type inconsistent; keeping first type"
                    );
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}

impl<T, I> Iterator for MetadataTap<I>
where
    T: Record,
    I: Iterator<Item = Result<T, DatasetError>>,
{
    type Item = Result<T, DatasetError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failure.is_some() || self.closed {
            return None;
        }
        match self.inner.next()? {
            Ok(record) => match self.observe(&record) {
                Ok(()) => Some(Ok(record)),
                Err(err) => Some(Err(err)),
            },
            Err(err) => {
                self.failure = Some(TapFailure::Upstream(err.to_string()));
                Some(Err(err))
            }
        }
    }
}

impl<I> Drop for MetadataTap<I> {
    fn drop(&mut self) {
        self.finish();
    }
}
