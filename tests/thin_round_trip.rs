use std::sync::mpsc;
use std::thread;

use recordflow::{
    BasicRecord, DatasetError, FieldMap, MoleculeRecord, Record, RecordId, RecordSet, SetSize,
    ThinDescriptor, ThinFieldRule, ThinProjector,
};
use serde_json::json;

fn originals() -> Vec<MoleculeRecord> {
    ["CCO", "CCN", "CCC"]
        .into_iter()
        .map(|smiles| {
            MoleculeRecord::new(smiles, Some("smiles"))
                .with_value("mass", json!(120))
                .with_value("name", json!(format!("mol-{smiles}")))
        })
        .collect()
}

fn ids<T: Record>(records: &[T]) -> Vec<RecordId> {
    records.iter().map(Record::id).collect()
}

fn mass_descriptor(filtering: bool) -> ThinDescriptor {
    ThinDescriptor::new("input", Some("output"))
        .with_filtering(filtering)
        .with_rule(ThinFieldRule::field("mass"))
}

#[test]
fn filtering_stage_drops_records_and_keeps_order() {
    let originals = originals();
    let mut input = RecordSet::from_list(originals.clone());
    let mut projector = ThinProjector::new(mass_descriptor(true));

    let sent = projector.prepare_input(&mut input).unwrap().into_list().unwrap();
    assert_eq!(ids(&sent), ids(&originals));
    for thin in &sent {
        assert_eq!(thin.values.len(), 1);
        assert_eq!(thin.value("mass"), Some(&json!(120)));
    }

    // Stage filters out B and updates the mass of A and C.
    let returned = vec![
        sent[0].clone().with_value("mass", json!(130)),
        sent[2].clone().with_value("mass", json!(150)),
    ];
    let mut results = RecordSet::from_list(returned);
    let mut output = projector.generate_output(&mut results).unwrap();
    // Input and result sizes disagree.
    assert_eq!(output.size(), SetSize::Known(0));

    let recombined = output.as_list().unwrap();
    assert_eq!(ids(recombined), vec![originals[0].id, originals[2].id]);
    assert_eq!(recombined[0].value("mass"), Some(&json!(130)));
    assert_eq!(recombined[1].value("mass"), Some(&json!(150)));
    assert_eq!(recombined[0].value("name"), Some(&json!("mol-CCO")));
    assert_eq!(recombined[1].value("name"), Some(&json!("mol-CCC")));

    let stats = projector.stats();
    assert_eq!(stats.submitted, 3);
    assert_eq!(stats.recombined, 2);
    assert_eq!(stats.cache_misses, 0);
    assert_eq!(stats.unmatched(), 1);
}

#[test]
fn keyed_cache_matches_reordered_results() {
    let originals = originals();
    let mut input = RecordSet::from_list(originals.clone());
    let mut projector = ThinProjector::new(mass_descriptor(false));

    let sent = projector.prepare_input(&mut input).unwrap().into_list().unwrap();
    let returned: Vec<MoleculeRecord> = [2, 0, 1]
        .into_iter()
        .map(|idx| sent[idx].clone().with_value("score", json!(idx)))
        .collect();
    let mut results = RecordSet::from_list(returned);
    let recombined = projector
        .generate_output(&mut results)
        .unwrap()
        .into_list()
        .unwrap();

    assert_eq!(
        ids(&recombined),
        vec![originals[2].id, originals[0].id, originals[1].id]
    );
    for record in &recombined {
        let original = originals.iter().find(|o| o.id == record.id).unwrap();
        let idx = originals.iter().position(|o| o.id == record.id).unwrap();
        assert_eq!(record.source, original.source);
        assert_eq!(record.value("name"), original.value("name"));
        assert_eq!(record.value("score"), Some(&json!(idx)));
    }
    assert_eq!(projector.stats().recombined, 3);
}

#[test]
fn unknown_result_is_dropped_and_counted_once() {
    let originals = originals();
    let mut input = RecordSet::from_list(originals.clone());
    let mut projector = ThinProjector::new(mass_descriptor(false));

    let mut sent = projector.prepare_input(&mut input).unwrap().into_list().unwrap();
    let stranger = MoleculeRecord::new("O", None).with_value("mass", json!(18));
    sent.insert(1, stranger);
    let mut results = RecordSet::from_list(sent);

    let before = projector.stats().cache_misses;
    let recombined = projector
        .generate_output(&mut results)
        .unwrap()
        .into_list()
        .unwrap();
    assert_eq!(projector.stats().cache_misses, before + 1);
    assert_eq!(ids(&recombined), ids(&originals));
}

#[test]
fn strict_recombination_surfaces_cache_miss() {
    let mut input = RecordSet::from_list(originals());
    let mut projector =
        ThinProjector::new(mass_descriptor(true)).with_strict_recombination(true);
    let _sent = projector.prepare_input(&mut input).unwrap().into_list().unwrap();

    let stranger = MoleculeRecord::new("O", None);
    let stranger_id = stranger.id;
    let mut results = RecordSet::from_list(vec![stranger]);
    let err = projector
        .generate_output(&mut results)
        .unwrap()
        .into_list()
        .unwrap_err();
    assert!(matches!(err, DatasetError::CacheMiss(id) if id == stranger_id));
    assert_eq!(projector.stats().cache_misses, 1);
}

#[test]
fn echo_stage_reproduces_originals_when_preserving() {
    let originals = originals();
    let mut input = RecordSet::from_list(originals.clone());
    let mut projector = ThinProjector::new(ThinDescriptor::new("input", Some("output")));
    assert!(projector.descriptor().preserve());

    let mut thin = projector.prepare_input(&mut input).unwrap();
    let echoed = thin.as_stream().unwrap();
    let mut results = RecordSet::from_stream(echoed);
    let recombined = projector
        .generate_output(&mut results)
        .unwrap()
        .into_list()
        .unwrap();
    assert_eq!(recombined, originals);
}

#[test]
fn non_preserving_stage_replaces_core_payload() {
    let originals = originals();
    let mut input = RecordSet::from_list(originals.clone());
    let descriptor = mass_descriptor(false).with_preserve(false);
    let mut projector = ThinProjector::new(descriptor);

    let sent = projector.prepare_input(&mut input).unwrap().into_list().unwrap();
    let returned: Vec<MoleculeRecord> = sent
        .into_iter()
        .map(|thin| {
            let mut standardized =
                MoleculeRecord::with_id(thin.id, thin.source.to_lowercase(), Some("smiles"));
            standardized.put_value("mass", json!(121));
            standardized
        })
        .collect();
    let mut results = RecordSet::from_list(returned);
    let recombined = projector
        .generate_output(&mut results)
        .unwrap()
        .into_list()
        .unwrap();

    for (record, original) in recombined.iter().zip(&originals) {
        assert_eq!(record.id, original.id);
        assert_eq!(record.source, original.source.to_lowercase());
        assert_eq!(record.value("mass"), Some(&json!(121)));
        assert_eq!(record.value("name"), original.value("name"));
    }
}

#[test]
fn basic_results_force_preserve_mode() {
    let originals = originals();
    let mut input = RecordSet::from_list(originals.clone());
    let descriptor = mass_descriptor(false).with_preserve(false);
    let mut projector = ThinProjector::new(descriptor);

    let sent = projector.prepare_input(&mut input).unwrap().into_list().unwrap();
    let returned: Vec<BasicRecord> = sent
        .iter()
        .map(|thin| {
            let mut values = FieldMap::new();
            values.insert("logp".into(), json!(0.5));
            BasicRecord::with_id(thin.id, values)
        })
        .collect();
    let mut results = RecordSet::from_list(returned);
    let recombined = projector
        .generate_output(&mut results)
        .unwrap()
        .into_list()
        .unwrap();

    for (record, original) in recombined.iter().zip(&originals) {
        assert_eq!(record.source, original.source);
        assert_eq!(record.value("mass"), Some(&json!(120)));
        assert_eq!(record.value("logp"), Some(&json!(0.5)));
    }
}

#[test]
fn undefined_output_passes_results_through() {
    let mut input = RecordSet::from_list(originals());
    let mut projector = ThinProjector::new(ThinDescriptor::new("input", None));
    let _thin = projector.prepare_input(&mut input).unwrap();

    let unrelated = vec![MoleculeRecord::new("N", None).with_value("k", json!(1))];
    let mut results = RecordSet::from_list(unrelated.clone());
    let output = projector
        .generate_output(&mut results)
        .unwrap()
        .into_list()
        .unwrap();
    assert_eq!(output, unrelated);
    assert_eq!(projector.stats().recombined, 0);
}

#[test]
fn stage_on_another_thread_streams_results_back() {
    let originals: Vec<MoleculeRecord> = (0..200)
        .map(|i| MoleculeRecord::new(format!("C{i}"), None).with_value("i", json!(i)))
        .collect();
    let mut input = RecordSet::from_stream(originals.clone().into_iter().map(Ok));
    let mut projector = ThinProjector::new(
        ThinDescriptor::new("input", Some("output")).with_rule(ThinFieldRule::field("i")),
    );
    let mut thin = projector.prepare_input(&mut input).unwrap();
    assert_eq!(thin.size(), SetSize::Unknown);

    let (tx, rx) = mpsc::channel();
    let stage = {
        let stream = thin.as_stream().unwrap();
        thread::spawn(move || {
            for record in stream {
                let record = record.unwrap();
                let doubled = record.value("i").and_then(|v| v.as_i64()).unwrap() * 2;
                if tx.send(record.with_value("double", json!(doubled))).is_err() {
                    break;
                }
            }
        })
    };

    let mut results = RecordSet::from_stream(rx.into_iter().map(Ok));
    let recombined = projector
        .generate_output(&mut results)
        .unwrap()
        .into_list()
        .unwrap();
    stage.join().unwrap();

    assert_eq!(recombined.len(), 200);
    for (record, original) in recombined.iter().zip(&originals) {
        assert_eq!(record.id, original.id);
        let i = original.value("i").and_then(|v| v.as_i64()).unwrap();
        assert_eq!(record.value("double"), Some(&json!(i * 2)));
    }
    assert_eq!(projector.stats().submitted, 200);
}
