use std::io::sink;

use crate::corpus::Corpus;
use crate::labels::LabelRegistry;
use crate::lemmas::LemmaGuesser;
use crate::params::ParamStore;
use crate::trainer::PerceptronTrainer;

const KOIRA_TSV: &str = "\
koira\tWORD=koira\tkoira\t[UPOS=NOUN][NUM=SG][CASE=NOM]\t_
koiran\tWORD=koiran\tkoira\t[UPOS=NOUN][NUM=SG][CASE=GEN]\t_
koirat\tWORD=koirat\tkoira\t[UPOS=NOUN][NUM=PL][CASE=NOM]\t_
koirien\tWORD=koirien\tkoira\t[UPOS=NOUN][NUM=PL][CASE=GEN]\t_
";

#[test]
fn test_learned_edit_class_generalizes() {
    let mut registry = LabelRegistry::new(10);
    let mut params = ParamStore::new();
    let corpus =
        Corpus::from_reader(KOIRA_TSV.as_bytes(), true, &mut registry, &mut params).unwrap();

    let mut lemmas = LemmaGuesser::new();
    lemmas.set_max_passes(20);
    lemmas
        .train(&corpus, &corpus, &registry, &mut sink())
        .unwrap();

    // The genitive -n suffix class transfers to an unseen word form.
    assert_eq!(
        lemmas
            .lemma_candidate("kissan", "[UPOS=NOUN][NUM=SG][CASE=GEN]")
            .unwrap(),
        "kissa"
    );

    // Seen (word form, label) pairs come straight from the lexicon.
    assert_eq!(
        lemmas
            .lemma_candidate("koirien", "[UPOS=NOUN][NUM=PL][CASE=GEN]")
            .unwrap(),
        "koira"
    );

    assert!(lemmas.is_known_word_form("koiran"));
    assert!(!lemmas.is_known_word_form("kissan"));
}

#[test]
fn test_analyzer_lemmas_become_training_instances() {
    let contents = "\
kun\tWORD=kun\tkun\tKON\t[('ADV', 'kunta')]
";
    let mut registry = LabelRegistry::new(10);
    let mut params = ParamStore::new();
    let corpus =
        Corpus::from_reader(contents.as_bytes(), true, &mut registry, &mut params).unwrap();

    let mut lemmas = LemmaGuesser::new();
    lemmas.set_max_passes(2);
    lemmas
        .train(&corpus, &corpus, &registry, &mut sink())
        .unwrap();

    // The alternative (label, lemma) pair interned its own edit class:
    // kun -> kunta appends "ta".
    assert!(lemmas.class_number("kun", "kunta").is_ok());
}

#[test]
fn test_lemmatizer_roundtrip() {
    let mut registry = LabelRegistry::new(10);
    let mut params = ParamStore::new();
    let corpus =
        Corpus::from_reader(KOIRA_TSV.as_bytes(), true, &mut registry, &mut params).unwrap();

    let mut lemmas = LemmaGuesser::new();
    lemmas.set_max_passes(5);
    lemmas
        .train(&corpus, &corpus, &registry, &mut sink())
        .unwrap();

    let bc = crate::common::bincode_config();
    let bytes = bincode::encode_to_vec(&lemmas, bc).unwrap();
    let (decoded, _): (LemmaGuesser, usize) = bincode::decode_from_slice(&bytes, bc).unwrap();
    assert!(lemmas.same_model(&decoded));

    let bytes2 = bincode::encode_to_vec(&decoded, bc).unwrap();
    assert_eq!(bytes, bytes2);

    // The loaded model predicts like the original.
    assert_eq!(
        decoded
            .lemma_candidate("kissan", "[UPOS=NOUN][NUM=SG][CASE=GEN]")
            .unwrap(),
        "kissa"
    );
}

/// The averaged view `(t + 1) · pos + neg` must equal the sum of the
/// `pos` snapshots taken after each update (and hence be proportional to
/// their mean), verified against a slow reference implementation.
#[test]
fn test_averaging_matches_snapshot_sum() {
    let mut lemmas = LemmaGuesser::new();
    let identity = lemmas.class_number_interned("koira", "koira");
    let strip_n = lemmas.class_number_interned("koiran", "koira");

    let mut instances = vec![];
    for (word, label, class) in [
        ("koira", "NOM", identity),
        ("koiran", "GEN", strip_n),
        ("kissa", "NOM", identity),
        ("kissan", "GEN", strip_n),
    ] {
        let mut instance = lemmas.extract_features_interned(word, label);
        instance.set_label(class);
        instances.push(instance);
    }

    // One epoch through the real trainer.
    let mut params = ParamStore::new();
    let mut trainer = PerceptronTrainer::lemmatizer(1, 3);
    trainer
        .train_lemmatizer(&instances, &instances, &lemmas, &mut params, &mut sink())
        .unwrap();

    // Slow reference: replay the epoch, accumulating a snapshot of the
    // running weights after every update.
    let mut pos = ParamStore::new();
    let classes: Vec<u32> = (0..lemmas.class_count()).collect();
    let templates: Vec<u32> = (0..lemmas.feature_count()).collect();
    let mut snapshot_sum =
        vec![vec![0.0f32; classes.len()]; templates.len()];

    for instance in &instances {
        let gold = instance.label();
        let sys = lemmas.best_class(instance, &pos).unwrap_or(0);

        pos.update_emission_all(instance, gold, 1.0, crate::config::Degree::Nodeg);
        pos.update_emission_all(instance, sys, -1.0, crate::config::Degree::Nodeg);

        for &template in &templates {
            for &class in &classes {
                snapshot_sum[template as usize][class as usize] +=
                    pos.get_emission(template, class);
            }
        }
    }

    for &template in &templates {
        for &class in &classes {
            let expected = snapshot_sum[template as usize][class as usize];
            let actual = params.get_emission(template, class);
            assert!(
                (expected - actual).abs() < 1e-4,
                "template {template}, class {class}: {expected} != {actual}"
            );
        }
    }
}
