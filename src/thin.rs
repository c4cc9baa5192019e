//! Thin execution.
//!
//! [`ThinProjector::prepare_input`] strips each record down to its identity,
//! core payload and the fields named by the descriptor's rules, caching the
//! original. The thin records go to an external stage.
//! [`ThinProjector::generate_output`] then matches the stage's results to the
//! cached originals by identity and merges them back together.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::cache::{CacheStrategy, RecombinationCache};
use crate::config::ExecutionOptions;
use crate::constants::thin::{
    CACHE_MISS_MSG, DEFAULT_FILTERING, DEFAULT_INPUT, DEFAULT_OUTPUT, DEFAULT_PRESERVE,
};
use crate::data::Record;
use crate::errors::DatasetError;
use crate::metadata::SetMetadata;
use crate::metrics::{RoundTripCounters, RoundTripStats};
use crate::record_set::RecordSet;
use crate::types::{FieldName, OptionName, RecordType};

/// Names one field to forward to the external stage.
///
/// The source field is either `field_name` itself, or, when `option_name` is
/// set, the field named by that execution option's value. The forwarded name
/// is `rename` if given, else `field_name`, else the source field.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThinFieldRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    /// Source field, or the forwarded name for option-driven rules.
    pub field_name: Option<FieldName>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    /// Execution option naming the source field.
    pub option_name: Option<OptionName>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    /// Forwarded name override.
    pub rename: Option<FieldName>,
}

impl ThinFieldRule {
    /// Forward `field` under its own name.
    pub fn field(field: impl Into<FieldName>) -> Self {
        Self {
            field_name: Some(field.into()),
            ..Self::default()
        }
    }

    /// Forward the field named by execution option `option`.
    pub fn option(option: impl Into<OptionName>) -> Self {
        Self {
            option_name: Some(option.into()),
            ..Self::default()
        }
    }

    /// Forward the field named by execution option `option` as `field`.
    pub fn option_as(option: impl Into<OptionName>, field: impl Into<FieldName>) -> Self {
        Self {
            field_name: Some(field.into()),
            option_name: Some(option.into()),
            rename: None,
        }
    }

    /// Forward under a different name.
    pub fn renamed(mut self, forwarded: impl Into<FieldName>) -> Self {
        self.rename = Some(forwarded.into());
        self
    }

    /// Resolve to `(source, forwarded)` field names.
    ///
    /// `Ok(None)` when the rule reads its source from an option that is not
    /// set; such rules forward nothing.
    pub fn resolve(
        &self,
        options: &ExecutionOptions,
    ) -> Result<Option<(FieldName, FieldName)>, DatasetError> {
        let source = match (&self.field_name, &self.option_name) {
            (None, None) => {
                return Err(DatasetError::Configuration(
                    "thin field rule needs a field name or an option name".into(),
                ));
            }
            (Some(field), None) => field.clone(),
            (_, Some(option)) => match options.get(option) {
                None | Some(Value::Null) => return Ok(None),
                Some(Value::String(field)) => field.clone(),
                Some(other) => other.to_string(),
            },
        };
        let forwarded = self
            .rename
            .clone()
            .or_else(|| self.field_name.clone())
            .unwrap_or_else(|| source.clone());
        Ok(Some((source, forwarded)))
    }
}

/// How a record set is made thin for an external stage and recombined after.
///
/// Serialized as JSON; unset flags fall back to `filtering = false` and
/// `preserve = true`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThinDescriptor {
    input: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    filtering: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    preserve: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    field_descriptors: Vec<ThinFieldRule>,
}

impl ThinDescriptor {
    /// Descriptor with default flags and no forwarded fields.
    ///
    /// With `output = None` the stage's results are passed through verbatim.
    pub fn new(input: impl Into<String>, output: Option<&str>) -> Self {
        Self {
            input: input.into(),
            output: output.map(str::to_string),
            filtering: None,
            preserve: None,
            field_descriptors: Vec::new(),
        }
    }

    /// `input` to `output`, for a stage that filters.
    pub fn filtering_default() -> Self {
        Self::new(DEFAULT_INPUT, Some(DEFAULT_OUTPUT)).with_filtering(true)
    }

    /// Set whether the stage may drop records.
    pub fn with_filtering(mut self, filtering: bool) -> Self {
        self.filtering = Some(filtering);
        self
    }

    /// Set whether the stage leaves core payloads untouched.
    pub fn with_preserve(mut self, preserve: bool) -> Self {
        self.preserve = Some(preserve);
        self
    }

    /// Append a forwarding rule.
    pub fn with_rule(mut self, rule: ThinFieldRule) -> Self {
        self.field_descriptors.push(rule);
        self
    }

    /// Name of the thin input.
    pub fn input(&self) -> &str {
        &self.input
    }

    /// Name of the recombined output, if results are recombined at all.
    pub fn output(&self) -> Option<&str> {
        self.output.as_deref()
    }

    /// Whether the stage may drop records (keeping order).
    pub fn filtering(&self) -> bool {
        self.filtering.unwrap_or(DEFAULT_FILTERING)
    }

    /// Whether the stage leaves each record's core payload untouched.
    pub fn preserve(&self) -> bool {
        self.preserve.unwrap_or(DEFAULT_PRESERVE)
    }

    /// Forwarding rules, in order.
    pub fn rules(&self) -> &[ThinFieldRule] {
        &self.field_descriptors
    }
}

type SharedCache<T> = Arc<Mutex<RecombinationCache<T>>>;

/// Drives one thin round trip at a time for records of type `T`.
pub struct ThinProjector<T: Record> {
    descriptor: ThinDescriptor,
    record_type: RecordType,
    options: ExecutionOptions,
    cache: Option<SharedCache<T>>,
    request_metadata: Option<SetMetadata>,
    counters: RoundTripCounters,
    strict: bool,
}

impl<T: Record> ThinProjector<T> {
    /// Projector expecting sets of `T`'s default record type.
    pub fn new(descriptor: ThinDescriptor) -> Self {
        Self::for_type(descriptor, T::DEFAULT_TYPE)
    }

    /// Projector expecting sets tagged with `record_type`.
    pub fn for_type(descriptor: ThinDescriptor, record_type: RecordType) -> Self {
        Self {
            descriptor,
            record_type,
            options: ExecutionOptions::new(),
            cache: None,
            request_metadata: None,
            counters: RoundTripCounters::default(),
            strict: false,
        }
    }

    /// Execution options consulted by option-driven rules.
    pub fn with_options(mut self, options: ExecutionOptions) -> Self {
        self.options = options;
        self
    }

    /// Fail the output stream with `CacheMiss` instead of dropping unmatched results.
    pub fn with_strict_recombination(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Descriptor driving this projector.
    pub fn descriptor(&self) -> &ThinDescriptor {
        &self.descriptor
    }

    /// Counters accumulated over every round trip of this projector.
    pub fn stats(&self) -> RoundTripStats {
        self.counters.snapshot()
    }

    /// Build the thin set to send to the stage.
    ///
    /// Takes one pass over `input`. The returned set is lazy: every original is
    /// cached as its thin projection is pulled, never ahead of it.
    pub fn prepare_input(
        &mut self,
        input: &mut RecordSet<T>,
    ) -> Result<RecordSet<T>, DatasetError> {
        if input.record_type() != self.record_type {
            return Err(DatasetError::TypeMismatch {
                expected: self.record_type,
                found: input.record_type(),
            });
        }
        let mut forwarded = Vec::new();
        for rule in self.descriptor.rules() {
            match rule.resolve(&self.options)? {
                Some(names) => forwarded.push(names),
                None => debug!(rule = ?rule, "thin field option not set; nothing forwarded"),
            }
        }

        let request_metadata = input.metadata();
        let strategy = CacheStrategy::for_filtering(self.descriptor.filtering());
        let cache: SharedCache<T> = Arc::new(Mutex::new(RecombinationCache::new(strategy)));
        let stream = input.as_stream()?;

        let projection_cache = Arc::clone(&cache);
        let counters = self.counters.clone();
        let thin = stream.map(move |record| -> Result<T, DatasetError> {
            let fat = record?;
            let mut thin = fat.bare();
            for (source, target) in &forwarded {
                if let Some(value) = fat.value(source)
                    && !value.is_null()
                {
                    thin.put_value(target.clone(), value.clone());
                }
            }
            projection_cache
                .lock()
                .expect("recombination cache poisoned")
                .put(fat);
            counters.record_submitted();
            Ok(thin)
        });

        debug!(
            input = self.descriptor.input(),
            strategy = ?strategy,
            size = %request_metadata.size(),
            "prepared thin input"
        );
        let metadata = SetMetadata::new(self.record_type).with_size(request_metadata.size());
        self.cache = Some(cache);
        self.request_metadata = Some(request_metadata);
        Ok(RecordSet::from_stream(thin).with_metadata(metadata))
    }

    /// Recombine the stage's results with the cached originals.
    ///
    /// Results without a cached original are logged, counted and dropped (or
    /// surfaced as `CacheMiss` in strict mode). The
    /// round trip's cache moves into the returned set and is released with it.
    pub fn generate_output<R: Record>(
        &mut self,
        results: &mut RecordSet<R>,
    ) -> Result<RecordSet<T>, DatasetError> {
        let Some(output) = self.descriptor.output().map(str::to_string) else {
            return self.pass_through(results);
        };
        let (Some(cache), Some(request_metadata)) =
            (self.cache.take(), self.request_metadata.take())
        else {
            return Err(DatasetError::Configuration(
                "generate_output called before prepare_input".into(),
            ));
        };

        let expected = self.record_type;
        let preserve =
            self.descriptor.preserve() || !expected.is_assignable_from(results.record_type());
        let result_metadata = results.metadata();
        let merged = SetMetadata::merge([&request_metadata, &result_metadata]);
        let metadata = merged.unwrap_or(request_metadata);
        let stream = results.as_stream()?;

        let counters = self.counters.clone();
        let strict = self.strict;
        let recombined = stream.filter_map(move |result| {
            let result = match result {
                Ok(result) => result,
                Err(err) => return Some(Err(err)),
            };
            let id = result.id();
            let taken = cache.lock().expect("recombination cache poisoned").take(&id);
            let Some(original) = taken else {
                warn!(record_id = %id, "{CACHE_MISS_MSG}");
                counters.record_cache_miss();
                return strict.then_some(Err(DatasetError::CacheMiss(id)));
            };
            counters.record_recombined();
            let preserve = preserve || !expected.is_assignable_from(result.record_type());
            Some(Ok(recombine(original, result, preserve)))
        });

        debug!(output = %output, preserve, "recombining thin results");
        Ok(RecordSet::from_stream(recombined).with_metadata(metadata))
    }

    fn pass_through<R: Record>(
        &self,
        results: &mut RecordSet<R>,
    ) -> Result<RecordSet<T>, DatasetError> {
        let expected = self.record_type;
        let metadata = results.metadata();
        let stream = results.as_stream()?.map(move |result| -> Result<T, DatasetError> {
            let result = result?;
            let found = result.record_type();
            T::from_any(result.into_any())
                .ok_or(DatasetError::TypeMismatch { expected, found })
        });
        debug!(
            input = self.descriptor.input(),
            "thin output not defined; passing results through"
        );
        Ok(RecordSet::from_stream(stream).with_metadata(metadata))
    }
}

/// Merge one stage result into its original.
///
/// Preserve: the original is kept and result values override its values.
/// Otherwise the result is kept, with original values filling the fields the
/// result lacks.
fn recombine<T: Record, R: Record>(mut original: T, mut result: R, preserve: bool) -> T {
    let result_values = std::mem::take(result.values_mut());
    if preserve {
        original.values_mut().extend(result_values);
        return original;
    }
    match T::from_any(result.into_any()) {
        Some(mut merged) => {
            let mut values = std::mem::take(original.values_mut());
            values.extend(result_values);
            *merged.values_mut() = values;
            merged
        }
        None => {
            warn!(record_id = %original.id(), "result not convertible; keeping original");
            original.values_mut().extend(result_values);
            original
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{BasicRecord, FieldMap, MoleculeRecord};
    use crate::metadata::SetSize;
    use serde_json::json;

    fn options(pairs: &[(&str, Value)]) -> ExecutionOptions {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.clone()))
            .collect()
    }

    fn molecule(source: &str, values: &[(&str, Value)]) -> MoleculeRecord {
        values
            .iter()
            .fold(MoleculeRecord::new(source, Some("smiles")), |record, (key, value)| {
                record.with_value(*key, value.clone())
            })
    }

    #[test]
    fn rule_resolution_covers_each_form() {
        let opts = options(&[("query.field", json!("mass")), ("unset", Value::Null)]);

        assert_eq!(
            ThinFieldRule::field("logp").resolve(&opts).unwrap(),
            Some(("logp".into(), "logp".into()))
        );
        assert_eq!(
            ThinFieldRule::field("logp").renamed("x").resolve(&opts).unwrap(),
            Some(("logp".into(), "x".into()))
        );
        assert_eq!(
            ThinFieldRule::option("query.field").resolve(&opts).unwrap(),
            Some(("mass".into(), "mass".into()))
        );
        assert_eq!(
            ThinFieldRule::option_as("query.field", "weight")
                .resolve(&opts)
                .unwrap(),
            Some(("mass".into(), "weight".into()))
        );
        assert_eq!(ThinFieldRule::option("unset").resolve(&opts).unwrap(), None);
        assert_eq!(ThinFieldRule::option("missing").resolve(&opts).unwrap(), None);
        assert!(matches!(
            ThinFieldRule::default().resolve(&opts),
            Err(DatasetError::Configuration(_))
        ));
    }

    #[test]
    fn descriptor_json_defaults() {
        let descriptor: ThinDescriptor = serde_json::from_str(r#"{"input":"input"}"#).unwrap();
        assert_eq!(descriptor.input(), "input");
        assert_eq!(descriptor.output(), None);
        assert!(!descriptor.filtering());
        assert!(descriptor.preserve());
        assert!(descriptor.rules().is_empty());

        let full = ThinDescriptor::filtering_default()
            .with_preserve(false)
            .with_rule(ThinFieldRule::option_as("opt", "f"));
        let encoded = serde_json::to_value(&full).unwrap();
        assert_eq!(
            encoded,
            json!({
                "input": "input",
                "output": "output",
                "filtering": true,
                "preserve": false,
                "fieldDescriptors": [{"fieldName": "f", "optionName": "opt"}]
            })
        );
        let decoded: ThinDescriptor = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded, full);
    }

    #[test]
    fn projection_forwards_only_named_fields_and_caches_first() {
        let originals = vec![
            molecule(
                "CCO",
                &[("mass", json!(46)), ("logp", json!(-0.3)), ("name", json!("ethanol"))],
            ),
            molecule("C", &[("mass", json!(16)), ("logp", Value::Null)]),
        ];
        let mut input = RecordSet::from_list(originals.clone());
        let descriptor = ThinDescriptor::new("input", Some("output"))
            .with_rule(ThinFieldRule::field("mass"))
            .with_rule(ThinFieldRule::option("extra"));
        let mut projector = ThinProjector::new(descriptor)
            .with_options(options(&[("extra", json!("logp"))]));

        let mut thin = projector.prepare_input(&mut input).unwrap();
        assert_eq!(thin.size(), SetSize::Known(2));
        assert!(thin.metadata().field_types().is_empty());
        assert_eq!(projector.stats().submitted, 0);

        let mut stream = thin.as_stream().unwrap();
        let first = stream.next().unwrap().unwrap();
        assert_eq!(projector.stats().submitted, 1);
        assert_eq!(first.id, originals[0].id);
        assert_eq!(first.source, "CCO");
        assert_eq!(first.values.len(), 2);
        assert_eq!(first.value("mass"), Some(&json!(46)));
        assert_eq!(first.value("logp"), Some(&json!(-0.3)));

        let second = stream.next().unwrap().unwrap();
        assert_eq!(second.value("mass"), Some(&json!(16)));
        assert_eq!(second.value("logp"), None);
        assert!(stream.next().is_none());
    }

    #[test]
    fn prepare_rejects_other_record_types() {
        let mut input = RecordSet::from_list(vec![BasicRecord::new(FieldMap::new())]);
        let mut projector: ThinProjector<BasicRecord> =
            ThinProjector::for_type(ThinDescriptor::filtering_default(), RecordType::Molecule);
        let err = projector.prepare_input(&mut input).err().unwrap();
        assert!(matches!(
            err,
            DatasetError::TypeMismatch {
                expected: RecordType::Molecule,
                found: RecordType::Basic
            }
        ));
        assert_eq!(input.as_list().unwrap().len(), 1);
    }

    #[test]
    fn generate_before_prepare_is_a_configuration_error() {
        let mut projector: ThinProjector<MoleculeRecord> =
            ThinProjector::new(ThinDescriptor::filtering_default());
        let mut results = RecordSet::from_list(vec![molecule("C", &[])]);
        let err = projector.generate_output(&mut results).err().unwrap();
        assert!(matches!(err, DatasetError::Configuration(_)));
    }

    #[test]
    fn non_preserve_takes_result_payload_and_backfills_values() {
        let original = molecule("c1ccccc1", &[("a", json!(1)), ("b", json!(2))]);
        let mut result = MoleculeRecord::with_id(original.id, "C1=CC=CC=C1", Some("kekule"));
        result.put_value("b", json!(20));
        result.put_value("c", json!(30));

        let merged = recombine(original.clone(), result, false);
        assert_eq!(merged.source, "C1=CC=CC=C1");
        assert_eq!(merged.format.as_deref(), Some("kekule"));
        let keys: Vec<_> = merged.values.keys().cloned().collect();
        assert_eq!(keys, ["a", "b", "c"]);
        assert_eq!(merged.value("b"), Some(&json!(20)));

        let echo = BasicRecord::with_id(original.id, FieldMap::new());
        let kept = recombine(original.clone(), echo, true);
        assert_eq!(kept, original);
    }
}
