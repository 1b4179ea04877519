use std::fs;
use std::path::Path;

use rensa_core::math::SparseVector;
use rensa_core::rnn::persist::suffixed;
use rensa_core::rnn::{IoDims, ModelHeader, Network, SequenceProcessor, SimpleRnn};
use rensa_core::types::{ModelDirection, RunningMode, Sequence, State};
use rensa_core::{BiRnn, RensaError, RnnConfig};

fn sequence() -> Sequence {
    let tokens: [(&[(usize, f32)], usize); 5] = [
        (&[(0, 1.0), (7, 1.0)], 0),
        (&[(1, 1.0)], 1),
        (&[(2, 1.0), (5, 0.5)], 2),
        (&[(3, 1.0)], 1),
        (&[(4, 1.0), (6, 1.0)], 0),
    ];
    Sequence::new(
        tokens
            .iter()
            .map(|(pairs, label)| {
                State::new(SparseVector::from_pairs(8, pairs.iter().copied()), vec![0.5, -0.25], *label)
            })
            .collect(),
    )
}

fn io() -> IoDims {
    IoDims::new(8, 2, 3)
}

fn config(crf: bool) -> RnnConfig {
    RnnConfig::new().with_hidden_size(6).with_crf(crf).with_seed(42)
}

fn trained_simple(crf: bool) -> SimpleRnn {
    let mut rnn = SimpleRnn::new(&config(crf), io()).unwrap();
    let mut seq = sequence();
    for _ in 0..3 {
        rnn.tag(&mut seq, RunningMode::Train).unwrap();
    }
    rnn
}

fn set_header_field(path: &Path, field: usize, value: i32) {
    let mut bytes = fs::read(path).unwrap();
    bytes[field * 4..field * 4 + 4].copy_from_slice(&value.to_le_bytes());
    fs::write(path, bytes).unwrap();
}

fn assert_same_simple(a: &SimpleRnn, b: &SimpleRnn) {
    assert_eq!(a.sizes(), b.sizes());
    assert_eq!(a.input_to_hidden(), b.input_to_hidden());
    assert_eq!(a.hidden_to_hidden(), b.hidden_to_hidden());
    assert_eq!(a.feature_to_hidden(), b.feature_to_hidden());
    assert_eq!(a.hidden_to_output(), b.hidden_to_output());
}

#[test]
fn simple_roundtrip_without_crf() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.bin");

    let mut original = trained_simple(false);
    original.save(&path).unwrap();
    let mut loaded = SimpleRnn::load(&path, &RnnConfig::new()).unwrap();

    assert_same_simple(&original, &loaded);
    assert!(!loaded.is_crf());
    assert!(loaded.crf_layer().transitions().is_zero());

    let mut seq = sequence();
    let a = original.predict_sentence(&mut seq, RunningMode::Test).unwrap();
    let b = loaded.predict_sentence(&mut seq, RunningMode::Test).unwrap();
    assert_eq!(a, b);
}

#[test]
fn simple_roundtrip_with_crf() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.bin");

    let mut original = trained_simple(true);
    assert!(!original.crf_layer().transitions().is_zero());
    original.save(&path).unwrap();
    let mut loaded = SimpleRnn::load(&path, &RnnConfig::new()).unwrap();

    assert_same_simple(&original, &loaded);
    assert!(loaded.is_crf());
    assert_eq!(original.crf_layer().transitions(), loaded.crf_layer().transitions());

    let mut seq = sequence();
    let a = original.predict_sentence_crf(&mut seq, RunningMode::Test).unwrap();
    let b = loaded.predict_sentence_crf(&mut seq, RunningMode::Test).unwrap();
    assert_eq!(a, b);
}

#[test]
fn cleared_crf_flag_skips_transitions() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.bin");
    trained_simple(true).save(&path).unwrap();

    let with_crf = SimpleRnn::load(&path, &RnnConfig::new()).unwrap();
    assert!(!with_crf.crf_layer().transitions().is_zero());

    set_header_field(&path, 2, 0);
    let without = SimpleRnn::load(&path, &RnnConfig::new()).unwrap();
    assert!(!without.is_crf());
    assert!(without.crf_layer().transitions().is_zero());
    assert_eq!(without.hidden_to_output(), with_crf.hidden_to_output());
}

#[test]
fn foreign_model_type_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.bin");
    trained_simple(false).save(&path).unwrap();
    set_header_field(&path, 0, 1);

    assert!(matches!(
        SimpleRnn::load(&path, &RnnConfig::new()),
        Err(RensaError::ModelTypeMismatch { .. })
    ));
    assert!(matches!(
        Network::load(&path, &RnnConfig::new()),
        Err(RensaError::ModelTypeMismatch { .. })
    ));

    set_header_field(&path, 0, 7);
    assert!(matches!(
        SimpleRnn::load(&path, &RnnConfig::new()),
        Err(RensaError::UnknownTag { value: 7, .. })
    ));
}

#[test]
fn truncated_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.bin");
    trained_simple(false).save(&path).unwrap();
    let bytes = fs::read(&path).unwrap();
    fs::write(&path, &bytes[..bytes.len() / 2]).unwrap();

    assert!(matches!(SimpleRnn::load(&path, &RnnConfig::new()), Err(RensaError::Io(_))));
}

#[test]
fn corrupted_matrix_shape_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.bin");
    trained_simple(false).save(&path).unwrap();
    // first field after the seven-int header is the input2hidden row count
    set_header_field(&path, 7, i32::MAX);
    set_header_field(&path, 8, i32::MAX);

    let result = std::panic::catch_unwind(|| SimpleRnn::load(&path, &RnnConfig::new()));
    assert!(matches!(result, Ok(Err(RensaError::DimensionMismatch(_)))));
}

#[test]
fn bidirectional_roundtrip() {
    for crf in [false, true] {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bi.bin");

        let mut original = BiRnn::new(&config(crf).with_bidirectional(true), io()).unwrap();
        let mut seq = sequence();
        original.tag(&mut seq, RunningMode::Train).unwrap();
        original.save(&path).unwrap();

        assert!(suffixed(&path, ".forward").exists());
        assert!(suffixed(&path, ".backward").exists());
        let meta = ModelHeader::peek(&path).unwrap();
        assert_eq!(meta.direction, ModelDirection::Bidirectional);
        assert_eq!(meta.crf, crf);
        // the meta file carries no weights
        assert_eq!(fs::metadata(&path).unwrap().len(), 7 * 4);

        let mut loaded = Network::load(&path, &RnnConfig::new()).unwrap();
        assert_eq!(loaded.direction(), ModelDirection::Bidirectional);
        assert_eq!(loaded.is_crf(), crf);
        assert_eq!(loaded.sizes(), original.sizes());

        let Network::Bidirectional(inner) = &loaded else {
            panic!("expected a bidirectional network");
        };
        assert_eq!(inner.hidden_to_output(), original.hidden_to_output());
        assert_eq!(inner.crf_layer().transitions(), original.crf_layer().transitions());
        assert_eq!(
            inner.forward_engine().input_to_hidden(),
            original.forward_engine().input_to_hidden()
        );
        assert_eq!(
            inner.backward_engine().hidden_to_hidden(),
            original.backward_engine().hidden_to_hidden()
        );

        let a = original.predict_sentence(&mut seq, RunningMode::Test).unwrap();
        let b = loaded.predict_sentence(&mut seq, RunningMode::Test).unwrap();
        assert_eq!(a, b);
    }
}

#[test]
fn network_load_dispatches_on_direction() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("single.bin");
    trained_simple(false).save(&path).unwrap();

    let net = Network::load(&path, &RnnConfig::new()).unwrap();
    assert_eq!(net.direction(), ModelDirection::Forward);
    assert!(net.hidden_layer().is_ok());

    // a meta file cannot be loaded as a single engine
    let bi_path = dir.path().join("bi.bin");
    BiRnn::new(&config(false), io()).unwrap().save(&bi_path).unwrap();
    assert!(matches!(
        SimpleRnn::load(&bi_path, &RnnConfig::new()),
        Err(RensaError::UnsupportedOperation(_))
    ));
}
