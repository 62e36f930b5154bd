use crate::tokenizer::{StructuralText, Tokenizer};
use crate::{round3, Serial, Weight};
use std::collections::BTreeMap;

/// How two weights for the same (term, serial) are resolved when a partial
/// index is merged into the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictPolicy {
    /// The incoming contributor wins. This is the bulk-build behavior, where
    /// each serial is claimed by exactly one worker so no real conflict can
    /// occur within a build.
    #[default]
    Replace,
    /// Sum both contributions. Only meaningful against raw frequencies;
    /// summing already-scored weights is undefined.
    Accumulate,
}

/// Per-field multipliers applied when a document's token streams are added
/// to a partial index.
#[derive(Debug, Clone, Copy)]
pub struct FieldWeights {
    pub body: Weight,
    pub heading: Weight,
    pub bold: Weight,
    pub title: Weight,
}

impl Default for FieldWeights {
    fn default() -> Self {
        Self { body: 1.0, heading: 0.5, bold: 0.5, title: 2.0 }
    }
}

/// A worker-local term -> serial -> raw weight map, key-sorted so the store
/// can merge-join it against its own sorted term table.
#[derive(Debug, Default)]
pub struct PartialIndex {
    terms: BTreeMap<String, BTreeMap<Serial, Weight>>,
}

impl PartialIndex {
    pub fn new() -> Self { Self::default() }

    /// Add every occurrence in `tokens` for `serial`, each contributing the
    /// rounded field multiplier to the term's running frequency.
    pub fn add_tokens(&mut self, serial: Serial, tokens: &[String], multiplier: Weight) {
        for token in tokens {
            let entry = self
                .terms
                .entry(token.clone())
                .or_default()
                .entry(serial)
                .or_insert(0.0);
            *entry += round3(multiplier);
        }
    }

    /// Directly set one (term, serial) weight.
    pub fn insert(&mut self, term: &str, serial: Serial, weight: Weight) {
        self.terms.entry(term.to_string()).or_default().insert(serial, weight);
    }

    /// Union another partial index into this one. Overlapping serials take
    /// the other side's weight; callers must ensure each serial is
    /// contributed by a single source.
    pub fn absorb(&mut self, other: PartialIndex) {
        for (term, entries) in other.terms {
            self.terms.entry(term).or_default().extend(entries);
        }
    }

    pub fn terms(&self) -> &BTreeMap<String, BTreeMap<Serial, Weight>> { &self.terms }
    pub fn len(&self) -> usize { self.terms.len() }
    pub fn is_empty(&self) -> bool { self.terms.is_empty() }
}

/// Add one document's four token streams to a partial index with their field
/// multipliers. A tokenizer fault costs that field its contribution, never
/// the worker or the batch.
pub fn index_document(
    index: &mut PartialIndex,
    serial: Serial,
    doc: &StructuralText,
    tokenizer: &dyn Tokenizer,
    weights: &FieldWeights,
) {
    let fields: [(&str, &str, Weight); 4] = [
        ("body", doc.body.as_str(), weights.body),
        ("heading", doc.headings.as_str(), weights.heading),
        ("bold", doc.bold.as_str(), weights.bold),
        ("title", doc.title.as_deref().unwrap_or(""), weights.title),
    ];
    for (field, text, multiplier) in fields {
        let tokens = match tokenizer.tokenize(text) {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(serial, field, error = %e, "tokenization failed, dropping field");
                Vec::new()
            }
        };
        index.add_tokens(serial, &tokens, multiplier);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_tokens_accumulate_weight() {
        let mut idx = PartialIndex::new();
        let tokens: Vec<String> = vec!["cat".into(), "cat".into(), "dog".into()];
        idx.add_tokens(3, &tokens, 0.5);
        assert_eq!(idx.terms()["cat"][&3], 1.0);
        assert_eq!(idx.terms()["dog"][&3], 0.5);
    }

    #[test]
    fn absorb_takes_other_side_on_overlap() {
        let mut a = PartialIndex::new();
        a.insert("cat", 0, 1.0);
        a.insert("cat", 1, 2.0);
        let mut b = PartialIndex::new();
        b.insert("cat", 1, 9.0);
        b.insert("dog", 2, 1.0);
        a.absorb(b);
        assert_eq!(a.terms()["cat"][&0], 1.0);
        assert_eq!(a.terms()["cat"][&1], 9.0);
        assert_eq!(a.terms()["dog"][&2], 1.0);
    }
}
