use crate::store::PostingStore;
use crate::tokenizer::Tokenizer;
use crate::{Posting, Serial};
use anyhow::Result;

/// Turns gathered postings into ranked serials. The ranking algorithm is
/// opaque to the store, which supplies postings and never computes
/// relevance.
pub trait Scorer {
    fn rank(&self, postings: &[Posting]) -> Vec<Serial>;
}

/// Collect postings for the query terms. `None` covers both a degenerate
/// query (nothing tokenizable) and every term absent from the index; both
/// are the same terminal "no results" state, not errors.
pub fn gather_postings(store: &PostingStore, terms: &[String]) -> Option<Vec<Posting>> {
    let postings: Vec<Posting> = terms
        .iter()
        .filter_map(|t| store.lookup_posting(t))
        .collect();
    if postings.is_empty() || postings.iter().all(|p| p.is_empty()) {
        None
    } else {
        Some(postings)
    }
}

/// Tokenize the input, gather its postings, and hand them to the scorer.
pub fn search(
    store: &PostingStore,
    scorer: &dyn Scorer,
    tokenizer: &dyn Tokenizer,
    input: &str,
) -> Result<Option<Vec<Serial>>> {
    let terms = tokenizer.tokenize(input)?;
    Ok(gather_postings(store, &terms).map(|postings| scorer.rank(&postings)))
}
