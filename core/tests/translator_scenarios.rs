// core/tests/translator_scenarios.rs
//
// End-to-end candidate scenarios through the public translator surface:
// - single syllable, trunk-level and tail-extension phrases lead as expected
// - stepwise typing yields the same leading candidates as fresh queries
// - sentence fallback when no phrase covers the interpreted input
// - completion suggests entries for a partial trailing syllable

use std::sync::Arc;

use libjyutping_core::{
    Code, Config, DictEntry, Dictionary, Segment, Table, Translation, Translator, Vocabulary,
};

fn entry(text: &str, weight: f64, code: &[u32]) -> Arc<DictEntry> {
    Arc::new(DictEntry {
        text: text.to_string(),
        weight,
        code: Code::from_ids(code.iter().copied()),
        ..Default::default()
    })
}

// diu=0 nei=1 lou=2 mou=3 hai=4
fn translator() -> Translator {
    let syllabary: Vec<String> = ["diu", "nei", "lou", "mou", "hai"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let mut vocab = Vocabulary::new();
    vocab.insert(entry("屌", -1.0, &[0]));
    vocab.insert(entry("你", -1.1, &[1]));
    vocab.insert(entry("佬", -1.5, &[2]));
    vocab.insert(entry("毛", -1.6, &[3]));
    vocab.insert(entry("係", -1.2, &[4]));
    vocab.insert(entry("屌你", -2.0, &[0, 1]));
    vocab.insert(entry("屌你佬", -3.0, &[0, 1, 2]));
    vocab.insert(entry("屌你老母", -4.0, &[0, 1, 2, 3]));
    let mut dict = Dictionary::new();
    dict.load(Table::build(syllabary, &vocab, 9)).unwrap();
    let mut config = Config::default();
    config.enable_completion = false;
    Translator::new(dict, config)
}

fn leading(translation: &mut Translation) -> Option<String> {
    translation.peek().map(|c| c.text)
}

fn segment(len: usize) -> Segment {
    Segment::new(0, len)
}

#[test]
fn single_syllable_lookup() {
    let mut t = translator();
    let mut translation = t.query("diu", &segment(3));
    assert_eq!(leading(&mut translation).as_deref(), Some("屌"));
}

#[test]
fn two_syllable_phrase_from_the_trunk() {
    let mut t = translator();
    let mut translation = t.query("diunei", &segment(6));
    assert_eq!(leading(&mut translation).as_deref(), Some("屌你"));
}

#[test]
fn three_syllable_phrase_from_the_trunk() {
    let mut t = translator();
    let mut translation = t.query("diuneilou", &segment(9));
    assert_eq!(leading(&mut translation).as_deref(), Some("屌你佬"));
}

#[test]
fn four_syllable_phrase_from_the_tail() {
    let mut t = translator();
    let mut translation = t.query("diuneiloumou", &segment(12));
    let first = translation.peek().unwrap();
    assert_eq!(first.text, "屌你老母");
    assert_eq!(first.end, 12);
}

#[test]
fn stepwise_typing_matches_fresh_queries() {
    let mut stepwise = translator();
    let inputs = ["diu", "diunei", "diuneilou", "diuneiloumou"];
    let expected = ["屌", "屌你", "屌你佬", "屌你老母"];
    for (input, want) in inputs.iter().zip(expected) {
        let mut translation = stepwise.query(input, &segment(input.len()));
        assert_eq!(leading(&mut translation).as_deref(), Some(want), "{input}");

        let mut fresh = translator();
        let mut translation = fresh.query(input, &segment(input.len()));
        assert_eq!(leading(&mut translation).as_deref(), Some(want), "{input}");
    }
}

#[test]
fn sentence_covers_what_phrases_cannot() {
    let mut t = translator();
    // no diu-nei-hai phrase exists; the scorer pieces one together
    let mut translation = t.query("diuneihai", &segment(9));
    let first = translation.peek().unwrap();
    assert_eq!(first.text, "屌你係");
    assert_eq!(first.end, 9);
    // the plain phrase follows the sentence
    assert!(translation.next());
    let second = translation.peek().unwrap();
    assert_eq!(second.text, "屌你");
}

#[test]
fn candidates_iterate_longest_span_first() {
    let mut t = translator();
    let mut translation = t.query("diunei", &segment(6));
    let candidates = translation.take(8);
    let texts: Vec<&str> = candidates.iter().map(|c| c.text.as_str()).collect();
    assert_eq!(texts, ["屌你", "屌"]);
    let ends: Vec<usize> = candidates.iter().map(|c| c.end).collect();
    assert_eq!(ends, [6, 3]);
}

#[test]
fn completion_suggests_from_a_partial_syllable() {
    let mut t = translator();
    t.config_mut().enable_completion = true;
    let mut translation = t.query("diune", &segment(5));
    let first = translation.peek().unwrap();
    // the trailing "ne" completes to nei, so the phrase covers all five bytes
    assert_eq!(first.text, "屌你");
    assert_eq!(first.end, 5);
}

#[test]
fn trailing_junk_still_serves_the_parsed_prefix() {
    let mut t = translator();
    let mut translation = t.query("diux", &segment(4));
    let first = translation.peek().unwrap();
    assert_eq!(first.text, "屌");
    assert_eq!(first.end, 3);
}

#[test]
fn delimited_input_skips_the_delimiter() {
    let mut t = translator();
    let mut translation = t.query(" diunei", &segment(7));
    let first = translation.peek().unwrap();
    assert_eq!(first.text, "屌你");
    assert_eq!(first.end, 7);
}
