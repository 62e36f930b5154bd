use engine::tokenizer::{stemming_pipeline, Tokenizer};

fn tokenize(text: &str) -> Vec<String> {
    stemming_pipeline().tokenize(text).unwrap()
}

#[test]
fn it_normalizes_and_stems() {
    let words = tokenize("Running Runners RUN!");
    assert!(words.contains(&"run".to_string()));
    assert!(!words.contains(&"running".to_string()));
}

#[test]
fn it_filters_stopwords() {
    let words = tokenize("The quick brown fox and the lazy dog");
    assert!(!words.contains(&"the".to_string()));
    assert!(!words.contains(&"and".to_string()));
    assert!(words.contains(&"fox".to_string()));
}

#[test]
fn it_splits_compound_tokens() {
    let words = tokenize("docs/guide snake_case");
    assert!(words.contains(&"doc".to_string()));
    assert!(words.contains(&"guid".to_string()));
    assert!(words.contains(&"snake".to_string()));
    assert!(words.contains(&"case".to_string()));
}

#[test]
fn it_drops_junk_fragments() {
    let words = tokenize("page content id=42 more");
    assert!(!words.iter().any(|w| w.contains('=')));
    assert!(words.contains(&"page".to_string()));
}
