use engine::builder::{ConflictPolicy, PartialIndex};
use engine::store::PostingStore;
use engine::{round4, PostingEntry};
use std::fs;
use tempfile::tempdir;

fn partial(entries: &[(&str, u32, f64)]) -> PartialIndex {
    let mut p = PartialIndex::new();
    for &(term, serial, weight) in entries {
        p.insert(term, serial, weight);
    }
    p
}

#[test]
fn sequential_merges_union_serials_with_last_writer_weights() {
    let dir = tempdir().unwrap();
    let mut store = PostingStore::create(dir.path()).unwrap();
    store
        .merge(partial(&[("cat", 0, 1.0), ("dog", 0, 2.0)]), ConflictPolicy::Replace)
        .unwrap();
    store
        .merge(
            partial(&[("bird", 2, 1.0), ("cat", 0, 5.0), ("cat", 1, 3.0)]),
            ConflictPolicy::Replace,
        )
        .unwrap();

    assert_eq!(
        store.lookup_posting("cat").unwrap(),
        vec![PostingEntry(0, 5.0), PostingEntry(1, 3.0)]
    );
    assert_eq!(store.lookup_posting("dog").unwrap(), vec![PostingEntry(0, 2.0)]);
    assert_eq!(store.lookup_posting("bird").unwrap(), vec![PostingEntry(2, 1.0)]);
    assert_eq!(store.term_count(), 3);
}

#[test]
fn accumulate_policy_sums_overlapping_weights() {
    let dir = tempdir().unwrap();
    let mut store = PostingStore::create(dir.path()).unwrap();
    store.merge(partial(&[("cat", 0, 1.5)]), ConflictPolicy::Accumulate).unwrap();
    store.merge(partial(&[("cat", 0, 2.0)]), ConflictPolicy::Accumulate).unwrap();
    assert_eq!(store.lookup_posting("cat").unwrap(), vec![PostingEntry(0, 3.5)]);
}

#[test]
fn partitionings_converge_to_the_same_store() {
    let a = &[("ant", 0, 1.0), ("bee", 0, 2.0), ("cow", 1, 1.0)];
    let b = &[("bee", 2, 1.5), ("cow", 3, 0.5)];
    let c = &[("ant", 4, 2.0), ("dog", 5, 1.0)];

    let dir1 = tempdir().unwrap();
    let mut split = PostingStore::create(dir1.path()).unwrap();
    for batch in [a.as_slice(), b.as_slice(), c.as_slice()] {
        split.merge(partial(batch), ConflictPolicy::Replace).unwrap();
    }

    let dir2 = tempdir().unwrap();
    let mut whole = PostingStore::create(dir2.path()).unwrap();
    let mut union = partial(a);
    union.absorb(partial(b));
    union.absorb(partial(c));
    whole.merge(union, ConflictPolicy::Replace).unwrap();

    let split_terms: Vec<_> = split.terms().map(str::to_string).collect();
    let whole_terms: Vec<_> = whole.terms().map(str::to_string).collect();
    assert_eq!(split_terms, whole_terms);
    for term in &split_terms {
        assert_eq!(split.lookup_posting(term), whole.lookup_posting(term), "term {term}");
    }
}

#[test]
fn every_offset_decodes_after_each_rewrite() {
    let dir = tempdir().unwrap();
    let mut store = PostingStore::create(dir.path()).unwrap();
    store.assign_serial("http://a.test/0".into(), Some("A".into()));
    store.assign_serial("http://a.test/1".into(), None);

    store
        .merge(partial(&[("cat", 0, 4.0), ("cat", 1, 2.0), ("dog", 0, 1.0)]), ConflictPolicy::Replace)
        .unwrap();
    let gen_after_merge = store.generation();
    let terms: Vec<String> = store.terms().map(str::to_string).collect();
    for term in &terms {
        assert!(store.lookup_posting(term).is_some(), "stale offset for {term}");
    }

    store.construct_tfidf(100).unwrap();
    assert!(store.generation() > gen_after_merge);
    for term in &terms {
        assert!(store.lookup_posting(term).is_some(), "stale offset for {term}");
    }
}

#[test]
fn tfidf_formula_and_title_penalty() {
    let dir = tempdir().unwrap();
    let mut store = PostingStore::create(dir.path()).unwrap();
    // Serial 0 has a title, serial 1 does not.
    store.assign_serial("http://a.test/0".into(), Some("Titled".into()));
    store.assign_serial("http://a.test/1".into(), None);

    store
        .merge(partial(&[("cat", 0, 4.0), ("cat", 1, 2.0)]), ConflictPolicy::Replace)
        .unwrap();
    store.construct_tfidf(100).unwrap();

    // Posting length 2, N = 100.
    let idf = (100.0f64 / 2.0).log10();
    let expect0 = round4((1.0 + 4.0f64.log10()) * idf);
    let expect1 = round4((1.0 + 2.0f64.log10()) * idf) * 0.5;
    assert_eq!(
        store.lookup_posting("cat").unwrap(),
        vec![PostingEntry(0, expect0), PostingEntry(1, expect1)]
    );
}

#[test]
fn standalone_projection_drops_weights() {
    let dir = tempdir().unwrap();
    let mut store = PostingStore::create(dir.path()).unwrap();
    store
        .merge(partial(&[("cat", 0, 1.0), ("cat", 3, 2.0), ("dog", 1, 1.0)]), ConflictPolicy::Replace)
        .unwrap();
    store.build_standalone_projection().unwrap();

    assert_eq!(store.lookup_standalone("cat").unwrap(), vec![0, 3]);
    assert_eq!(store.lookup_standalone("dog").unwrap(), vec![1]);
    assert!(store.lookup_standalone("bird").is_none());
}

#[test]
fn cache_holds_largest_postings_with_key_order_ties() {
    let dir = tempdir().unwrap();
    let mut store = PostingStore::create(dir.path()).unwrap();
    store
        .merge(
            partial(&[
                ("alpha", 0, 1.0),
                ("alpha", 1, 1.0),
                ("beta", 0, 1.0),
                ("beta", 1, 1.0),
                ("gamma", 0, 1.0),
                ("gamma", 1, 1.0),
                ("gamma", 2, 1.0),
            ]),
            ConflictPolicy::Replace,
        )
        .unwrap();
    store.refresh_cache(2).unwrap();

    // gamma is largest; alpha wins the 2-2 tie with beta on key order.
    assert_eq!(store.cached_terms(), vec!["alpha", "gamma"]);

    // Cached postings are fully materialized: they survive losing the file.
    fs::remove_file(dir.path().join("postings.txt")).unwrap();
    assert!(store.lookup_posting("gamma").is_some());
    assert!(store.lookup_posting("beta").is_none());
}

#[test]
fn any_merge_invalidates_the_cache() {
    let dir = tempdir().unwrap();
    let mut store = PostingStore::create(dir.path()).unwrap();
    store.merge(partial(&[("cat", 0, 1.0)]), ConflictPolicy::Replace).unwrap();
    store.refresh_cache(1).unwrap();
    assert_eq!(store.cached_terms(), vec!["cat"]);

    store.merge(partial(&[("dog", 1, 1.0)]), ConflictPolicy::Replace).unwrap();
    assert!(store.cached_terms().is_empty());
}

#[test]
fn unknown_term_and_corrupt_record_both_read_as_not_found() {
    let dir = tempdir().unwrap();
    let mut store = PostingStore::create(dir.path()).unwrap();
    store.merge(partial(&[("cat", 0, 1.0)]), ConflictPolicy::Replace).unwrap();

    assert!(store.lookup_posting("missing").is_none());

    fs::write(dir.path().join("postings.txt"), "not a posting record\n").unwrap();
    assert!(store.lookup_posting("cat").is_none());
}

#[test]
fn store_reopens_from_sidecar() {
    let dir = tempdir().unwrap();
    let generation;
    {
        let mut store = PostingStore::create(dir.path()).unwrap();
        store.assign_serial("http://a.test/".into(), Some("A".into()));
        store.merge(partial(&[("cat", 0, 2.0)]), ConflictPolicy::Replace).unwrap();
        generation = store.generation();
    }
    let store = PostingStore::open(dir.path()).unwrap();
    assert_eq!(store.generation(), generation);
    assert_eq!(store.lookup_posting("cat").unwrap(), vec![PostingEntry(0, 2.0)]);
    assert_eq!(store.url_for(0), Some("http://a.test/"));
    assert_eq!(store.title_for(0), Some("A"));
    assert_eq!(store.document_count(), 1);
}

#[test]
fn batch_url_lookup_keeps_request_order() {
    let dir = tempdir().unwrap();
    let mut store = PostingStore::create(dir.path()).unwrap();
    let a = store.assign_serial("http://h.test/a".into(), None);
    let b = store.assign_serial("http://h.test/b".into(), Some("B".into()));

    assert_eq!(
        store.urls_for(&[b, 99, a]),
        vec![Some("http://h.test/b"), None, Some("http://h.test/a")]
    );
}

#[test]
fn open_without_sidecar_fails() {
    let dir = tempdir().unwrap();
    assert!(PostingStore::open(dir.path().join("nothing-here")).is_err());
}
