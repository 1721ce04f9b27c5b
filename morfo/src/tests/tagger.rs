use std::io::sink;

use crate::config::{Filtering, TaggerConfig};
use crate::tagger::Tagger;

const TRAIN_TSV: &str = "\
The\tWORD=The\tthe\tDT\t_
dog\tWORD=dog SUF=og\tdog\tNN\t_
.\tWORD=.\t.\t.\t_

The\tWORD=The\tthe\tDT\t_
dog\tWORD=dog SUF=og\tdog\tNN\t_
.\tWORD=.\t.\t.\t_
";

const TEST_TSV: &str = "\
The\tWORD=The\tthe\tNN DT\t_
hog\tWORD=hog SUF=og\thog\tNN DT\t_
.\tWORD=.\t.\t.\t_

The\tWORD=The\tthe\tNN DT\t_
hog\tWORD=hog SUF=og\thog\tNN DT\t_
.\tWORD=.\t.\t.\t_
";

fn tiny_config() -> TaggerConfig {
    TaggerConfig::from_reader(
        "\
estimator = AVG_PERC
max_train_passes = 20
max_lemmatizer_passes = 20
max_useless_passes = 3
"
        .as_bytes(),
    )
    .unwrap()
}

fn trained_tagger(config: TaggerConfig) -> Tagger {
    let mut tagger = Tagger::with_message_output(config, Box::new(sink()));
    tagger
        .train(TRAIN_TSV.as_bytes(), TRAIN_TSV.as_bytes())
        .unwrap();
    tagger
}

#[test]
fn test_tiny_corpus_trains_to_full_accuracy() {
    let mut tagger = trained_tagger(tiny_config());
    let acc = tagger.label_accuracy(TRAIN_TSV.as_bytes()).unwrap();
    assert!((acc - 1.0).abs() < 1e-6, "label accuracy {acc} < 1.0");
}

#[test]
fn test_label_output_format() {
    let mut tagger = trained_tagger(tiny_config());

    let input = "\
The\tWORD=The\t_\t_\t_
dog\tWORD=dog SUF=og\t_\t_\t_
.\tWORD=.\t_\t_\t_
";
    let mut out = vec![];
    tagger.label(input.as_bytes(), &mut out).unwrap();
    let text = String::from_utf8(out).unwrap();

    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0], "The\t_\tthe\tDT\t_");
    assert_eq!(lines[1], "dog\t_\tdog\tNN\t_");
    assert_eq!(lines[2], ".\t_\t.\t.\t_");
}

#[test]
fn test_unseen_word_takes_suffix_guess() {
    let mut tagger = trained_tagger(tiny_config());

    let mut out = vec![];
    tagger.label(TEST_TSV.as_bytes(), &mut out).unwrap();
    let text = String::from_utf8(out).unwrap();

    // "hog" is out of vocabulary; the guesser and the trained weights
    // must still settle on the noun reading and the identity lemma.
    let hog = text.lines().find(|l| l.starts_with("hog")).unwrap();
    assert_eq!(hog, "hog\t_\thog\tNN\t_");
}

#[test]
fn test_label_stream_matches_batch_labeling() {
    let mut tagger = trained_tagger(tiny_config());

    let mut batch = vec![];
    tagger.label(TEST_TSV.as_bytes(), &mut batch).unwrap();

    let mut streamed = vec![];
    tagger
        .label_stream(TEST_TSV.as_bytes(), &mut streamed)
        .unwrap();

    assert_eq!(batch, streamed);
}

#[test]
fn test_model_roundtrip_is_byte_identical() {
    let tagger = trained_tagger(tiny_config());

    let mut first = vec![];
    tagger.store(&mut first).unwrap();

    let loaded = Tagger::read(first.as_slice()).unwrap();
    assert!(tagger.same_model(&loaded));

    let mut second = vec![];
    loaded.store(&mut second).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_loaded_model_still_labels() {
    let mut tagger = trained_tagger(tiny_config());

    let mut model = vec![];
    tagger.store(&mut model).unwrap();
    let mut loaded = Tagger::read(model.as_slice()).unwrap();

    let mut expected = vec![];
    tagger.label(TEST_TSV.as_bytes(), &mut expected).unwrap();
    let mut actual = vec![];
    loaded.label(TEST_TSV.as_bytes(), &mut actual).unwrap();
    assert_eq!(expected, actual);
}

#[test]
fn test_model_roundtrip_under_filters() {
    // UPDATE_COUNT needs the counts recorded during training; AVG_VALUE
    // and NO_FILTER are applied after the fact.
    let mut update_count_config = tiny_config();
    update_count_config.filter_type = Filtering::UpdateCount;
    update_count_config.param_threshold = 2.0;

    for (train_config, filter, threshold) in [
        (tiny_config(), Filtering::NoFilter, -1.0),
        (update_count_config, Filtering::UpdateCount, 2.0),
        (tiny_config(), Filtering::AvgValue, 0.001),
    ] {
        let mut tagger = trained_tagger(train_config);

        let mut filter_config = tiny_config();
        filter_config.filter_type = filter;
        filter_config.param_threshold = threshold;
        tagger.set_param_filter(&filter_config);

        let mut first = vec![];
        tagger.store(&mut first).unwrap();
        let loaded = Tagger::read(first.as_slice()).unwrap();
        let mut second = vec![];
        loaded.store(&mut second).unwrap();
        assert_eq!(first, second, "round trip differs under {filter:?}");
    }
}

#[test]
fn test_beamed_decoding_matches_exact() {
    let mut exact = trained_tagger(tiny_config());
    let mut model = vec![];
    exact.store(&mut model).unwrap();

    let mut beamed = Tagger::read(model.as_slice()).unwrap();
    beamed.config.beam = 16;

    let mut expected = vec![];
    exact.label(TEST_TSV.as_bytes(), &mut expected).unwrap();
    let mut actual = vec![];
    beamed.label(TEST_TSV.as_bytes(), &mut actual).unwrap();
    assert_eq!(expected, actual);
}

#[test]
fn test_marginal_inference_on_tiny_corpus() {
    let mut config = tiny_config();
    config.inference = crate::config::Inference::Marginal;
    let mut tagger = trained_tagger(config);
    let acc = tagger.label_accuracy(TRAIN_TSV.as_bytes()).unwrap();
    assert!((acc - 1.0).abs() < 1e-6, "label accuracy {acc} < 1.0");
}

#[test]
fn test_bad_magic_is_rejected() {
    let tagger = trained_tagger(tiny_config());
    let mut model = vec![];
    tagger.store(&mut model).unwrap();

    model[0] = b'X';
    assert!(matches!(
        Tagger::read(model.as_slice()),
        Err(crate::errors::MorfoError::BadBinary(_))
    ));
}

#[test]
fn test_byte_swapped_marker_is_rejected() {
    let tagger = trained_tagger(tiny_config());
    let mut model = vec![];
    tagger.store(&mut model).unwrap();

    // The marker follows the NUL-terminated magic string.
    let offset = "FinnPosModel".len() + 1;
    model[offset..offset + 4].reverse();
    match Tagger::read(model.as_slice()) {
        Err(crate::errors::MorfoError::BadBinary(msg)) => {
            assert!(msg.contains("byte-swapped"), "unexpected message: {msg}");
        }
        r => panic!("expected BadBinary, got {:?}", r.is_ok()),
    }
}

#[test]
fn test_sgd_estimator_on_tiny_corpus() {
    let config = TaggerConfig::from_reader(
        "\
estimator = ML
max_train_passes = 20
max_lemmatizer_passes = 20
max_useless_passes = 3
delta = 0.1
regularization = L2
sigma = 0.001
"
        .as_bytes(),
    )
    .unwrap();

    let mut tagger = trained_tagger(config);
    let acc = tagger.label_accuracy(TRAIN_TSV.as_bytes()).unwrap();
    assert!((acc - 1.0).abs() < 1e-6, "label accuracy {acc} < 1.0");
}

#[test]
fn test_compound_labels_train_and_roundtrip() {
    let corpus = "\
koira\tWORD=koira\tkoira\tNOUN|SG|NOM\t_
juoksee\tWORD=juoksee\tjuosta\tVERB|SG|PRS\t_
.\tWORD=.\t.\tPUNCT\t_

koira\tWORD=koira\tkoira\tNOUN|SG|NOM\t_
juoksee\tWORD=juoksee\tjuosta\tVERB|SG|PRS\t_
.\tWORD=.\t.\tPUNCT\t_
";
    let mut tagger = Tagger::with_message_output(tiny_config(), Box::new(sink()));
    tagger.train(corpus.as_bytes(), corpus.as_bytes()).unwrap();

    let acc = tagger.label_accuracy(corpus.as_bytes()).unwrap();
    assert!((acc - 1.0).abs() < 1e-6);

    let mut first = vec![];
    tagger.store(&mut first).unwrap();
    let loaded = Tagger::read(first.as_slice()).unwrap();
    let mut second = vec![];
    loaded.store(&mut second).unwrap();
    assert_eq!(first, second);
}
