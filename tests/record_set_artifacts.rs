use std::fs;
use std::thread;
use std::time::Duration;

use recordflow::constants::media::MOLECULE_RECORD_JSON;
use recordflow::constants::metadata::{PROP_DESCRIPTION, PROP_HISTORY, PROP_SOURCE};
use recordflow::transport::write_to_dir;
use recordflow::{
    AnyRecord, BasicRecord, ByteSource, DatasetConfig, DatasetError, FieldMap, FileSource,
    HandlerRegistry, MoleculeRecord, RecordSet, RecordType, RepresentationKind, SetMetadata,
    SetSize, ValueType,
};
use serde_json::json;
use tempfile::tempdir;

fn molecules(count: usize) -> Vec<MoleculeRecord> {
    (0..count)
        .map(|i| {
            MoleculeRecord::new(format!("C{i}"), Some("smiles"))
                .with_value("mass", json!(12 * (i + 1)))
                .with_value("label", json!(format!("m{i}")))
        })
        .collect()
}

#[test]
fn artifacts_round_trip_through_a_directory() {
    let temp = tempdir().unwrap();
    let records = molecules(4);
    let mut set = RecordSet::from_stream(records.clone().into_iter().map(Ok));
    set.update_metadata(|metadata| {
        metadata.create_field("mass", Some("calculator"), Some("Molecular mass"), None);
    });

    let registry = HandlerRegistry::with_defaults();
    let (mut data, mut metadata) = set
        .to_data_sources(&registry, &DatasetConfig::default())
        .unwrap();
    assert_eq!(data.content_type(), MOLECULE_RECORD_JSON);

    let data_file = write_to_dir(data.as_mut(), temp.path(), Some("job")).unwrap();
    let metadata_file = write_to_dir(&mut metadata, temp.path(), Some("job")).unwrap();
    assert!(temp.path().join("job.data.gz").exists());
    assert!(temp.path().join("job.metadata").exists());

    let reopened = FileSource::new(data_file.path(), MOLECULE_RECORD_JSON);
    let mut metadata_source = FileSource::new(metadata_file.path(), registry.metadata_media_type());
    let mut restored: RecordSet<MoleculeRecord> =
        RecordSet::from_data_sources(reopened, &mut metadata_source).unwrap();

    let meta = restored.metadata();
    assert_eq!(meta.record_type(), RecordType::Molecule);
    assert_eq!(meta.size(), SetSize::Known(4));
    assert_eq!(meta.field_type("mass"), Some(ValueType::Integer));
    assert_eq!(meta.field_type("label"), Some(ValueType::Text));
    assert_eq!(meta.field_property("mass", PROP_SOURCE), Some(&json!("calculator")));
    assert_eq!(
        meta.field_property("mass", PROP_DESCRIPTION),
        Some(&json!("Molecular mass"))
    );
    assert!(
        meta.property(PROP_HISTORY)
            .and_then(|h| h.as_str())
            .unwrap()
            .contains("Added field mass")
    );

    // File sources are repeatable.
    assert_eq!(restored.as_stream().unwrap().count(), 4);
    assert_eq!(restored.representation(), Some(RepresentationKind::Source));
    assert_eq!(restored.as_list().unwrap(), records.as_slice());
}

#[test]
fn plain_artifacts_are_uncompressed_on_disk() {
    let temp = tempdir().unwrap();
    let records = molecules(2);
    let mut set = RecordSet::from_list(records.clone());
    let config = DatasetConfig {
        gzip_data: false,
        ..DatasetConfig::default()
    };
    let (mut data, _metadata) = set
        .to_data_sources(&HandlerRegistry::default(), &config)
        .unwrap();
    let file = write_to_dir(data.as_mut(), temp.path(), None).unwrap();
    assert_eq!(file.path().file_name().unwrap(), "data");

    let text = fs::read_to_string(file.path()).unwrap();
    assert_eq!(text.lines().count(), 2);
    let first: MoleculeRecord = serde_json::from_str(text.lines().next().unwrap()).unwrap();
    assert_eq!(first, records[0]);
}

#[test]
fn tap_consumer_on_another_thread_finalizes_owner_metadata() {
    let records: Vec<BasicRecord> = (0..500)
        .map(|i| {
            let mut values = FieldMap::new();
            values.insert("i".into(), json!(i));
            values.insert("ratio".into(), json!(i as f64 / 3.0));
            BasicRecord::new(values)
        })
        .collect();
    let mut set = RecordSet::from_stream(records.into_iter().map(Ok));
    assert_eq!(set.size(), SetSize::Unknown);

    let stream = set.as_stream().unwrap();
    let (tap, handle) = set.create_metadata_tap(stream);
    assert!(handle.wait_timeout(Duration::from_millis(5)).is_none());

    let consumer = thread::spawn(move || {
        let mut tap = tap;
        let drained = tap.by_ref().filter(Result::is_ok).count();
        tap.close();
        drained
    });
    let metadata = handle.wait().unwrap();
    assert_eq!(consumer.join().unwrap(), 500);

    assert_eq!(metadata.size(), SetSize::Known(500));
    assert_eq!(metadata.field_type("i"), Some(ValueType::Integer));
    assert_eq!(metadata.field_type("ratio"), Some(ValueType::Float));
    assert_eq!(set.metadata(), metadata);
    assert!(matches!(set.as_stream(), Err(DatasetError::AlreadyConsumed)));
}

#[test]
fn mixed_record_types_abort_generate_metadata() {
    let records = vec![
        AnyRecord::from(MoleculeRecord::new("C", None)),
        AnyRecord::from(BasicRecord::new(FieldMap::new())),
    ];
    let mut set = RecordSet::from_stream(records.into_iter().map(Ok))
        .with_metadata(SetMetadata::new(RecordType::Molecule));
    let err = set.generate_metadata().unwrap_err();
    assert!(matches!(
        err,
        DatasetError::InconsistentType {
            expected: RecordType::Molecule,
            found: RecordType::Basic
        }
    ));
    assert_eq!(set.size(), SetSize::Unknown);
}

#[test]
fn merged_metadata_keeps_first_type_and_flags_size_disagreement() {
    let mut first = SetMetadata::new(RecordType::Molecule).with_size(SetSize::Known(3));
    first.set_field_type("mass", ValueType::Integer);
    let mut second = SetMetadata::new(RecordType::Basic).with_size(SetSize::Known(3));
    second.set_field_type("mass", ValueType::Float);
    second.put_property("description", json!("scored"));

    let same = SetMetadata::merge([&first, &second]).unwrap();
    assert_eq!(same.size(), SetSize::Known(3));
    assert_eq!(same.record_type(), RecordType::Molecule);
    assert_eq!(same.field_type("mass"), Some(ValueType::Float));
    assert_eq!(same.property("description"), Some(&json!("scored")));

    let third = SetMetadata::new(RecordType::Molecule).with_size(SetSize::Known(2));
    let differing = SetMetadata::merge([&first, &second, &third]).unwrap();
    assert_eq!(differing.size(), SetSize::Known(0));
    assert!(SetMetadata::merge(std::iter::empty::<&SetMetadata>()).is_none());
}

#[test]
fn file_backed_set_stays_readable_after_export() {
    let temp = tempdir().unwrap();
    let records = molecules(3);
    let path = temp.path().join("input.data");
    let mut lines = String::new();
    for record in &records {
        lines.push_str(&serde_json::to_string(record).unwrap());
        lines.push('\n');
    }
    fs::write(&path, lines).unwrap();

    let mut set: RecordSet<MoleculeRecord> = RecordSet::from_source(
        FileSource::new(&path, MOLECULE_RECORD_JSON),
        SetMetadata::new(RecordType::Molecule).with_size(SetSize::Known(3)),
    );
    assert_eq!(set.as_stream().unwrap().count(), 3);

    let registry = HandlerRegistry::default();
    let (mut data, _metadata) = set
        .to_data_sources(&registry, &DatasetConfig::default())
        .unwrap();
    let exported = write_to_dir(data.as_mut(), temp.path(), Some("out")).unwrap();
    assert_eq!(exported.path().file_name().unwrap(), "out.data.gz");

    assert_eq!(set.representation(), Some(RepresentationKind::Source));
    assert_eq!(set.as_list().unwrap(), records.as_slice());
    assert_eq!(set.size(), SetSize::Known(3));
}
