use crate::builder::{ConflictPolicy, PartialIndex};
use crate::{round4, Posting, PostingEntry, Serial, Weight};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// File layout inside an index directory.
pub struct StorePaths {
    pub root: PathBuf,
}

impl StorePaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    fn postings(&self) -> PathBuf { self.root.join("postings.txt") }
    fn standalone(&self) -> PathBuf { self.root.join("standalone.txt") }
    fn sidecar(&self) -> PathBuf { self.root.join("store.cfg") }
    fn postings_temp(&self) -> PathBuf { self.root.join("postings.txt.tmp") }
    fn standalone_temp(&self) -> PathBuf { self.root.join("standalone.txt.tmp") }
    fn sidecar_temp(&self) -> PathBuf { self.root.join("store.cfg.tmp") }
}

/// Everything the store persists outside the postings files themselves.
/// Rewritten wholesale after every mutating operation.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreState {
    full_offsets: BTreeMap<String, u64>,
    standalone_offsets: BTreeMap<String, u64>,
    cache: HashMap<String, Posting>,
    standalone_cache: HashMap<String, Vec<Serial>>,
    serial_urls: BTreeMap<Serial, String>,
    serial_titles: BTreeMap<Serial, String>,
    generation: u64,
    next_serial: Serial,
}

/// Disk-backed posting store: seek-addressed newline-delimited records, an
/// in-memory term -> byte-offset table per file, a hot cache of the largest
/// postings, and append-only serial lookup tables.
///
/// Single writer: `merge`, `construct_tfidf`, `refresh_cache` and
/// `build_standalone_projection` must not run concurrently with each other
/// or with readers; exclusive-writer discipline is enforced by the caller.
pub struct PostingStore {
    paths: StorePaths,
    state: StoreState,
}

impl PostingStore {
    /// Initialize an empty store, wiping any previous state in `root`.
    pub fn create<P: AsRef<Path>>(root: P) -> Result<Self> {
        let paths = StorePaths::new(root);
        fs::create_dir_all(&paths.root)?;
        File::create(paths.postings())?;
        File::create(paths.standalone())?;
        let store = Self { paths, state: StoreState::default() };
        store.persist()?;
        Ok(store)
    }

    /// Resume from the sidecar written by the last completed mutation.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let paths = StorePaths::new(root);
        let bytes = fs::read(paths.sidecar())
            .with_context(|| format!("no store sidecar at {}", paths.sidecar().display()))?;
        let state = bincode::deserialize(&bytes).context("corrupt store sidecar")?;
        Ok(Self { paths, state })
    }

    /// Write the sidecar record via its own temp-and-rename. A crash between
    /// a postings rename and this write leaves a stale offset table behind;
    /// that divergence is a documented recovery gap, not a safe resume point.
    pub fn persist(&self) -> Result<()> {
        let bytes = bincode::serialize(&self.state)?;
        let tmp = self.paths.sidecar_temp();
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, self.paths.sidecar())?;
        Ok(())
    }

    /// Register one accepted document, in ingestion order. Registrations
    /// become durable at the next sidecar flush.
    pub fn assign_serial(&mut self, url: String, title: Option<String>) -> Serial {
        let serial = self.state.next_serial;
        self.state.next_serial += 1;
        self.state.serial_urls.insert(serial, url);
        if let Some(t) = title {
            self.state.serial_titles.insert(serial, t);
        }
        serial
    }

    /// Full posting for `term`. Cache hit returns the in-memory copy;
    /// otherwise one seek and one record decode. Unknown terms, I/O faults,
    /// and corrupt records all read as "not found".
    pub fn lookup_posting(&self, term: &str) -> Option<Posting> {
        if let Some(p) = self.state.cache.get(term) {
            return Some(p.clone());
        }
        let offset = *self.state.full_offsets.get(term)?;
        match self.decode_posting_at(offset) {
            Ok(p) => Some(p),
            Err(e) => {
                tracing::warn!(term, error = %e, "unreadable posting record");
                None
            }
        }
    }

    /// Serial-only posting for `term`; same contract as `lookup_posting`.
    pub fn lookup_standalone(&self, term: &str) -> Option<Vec<Serial>> {
        if let Some(s) = self.state.standalone_cache.get(term) {
            return Some(s.clone());
        }
        let offset = *self.state.standalone_offsets.get(term)?;
        let decoded = read_record(&self.paths.standalone(), offset)
            .and_then(|line| Ok(serde_json::from_str(&line)?));
        match decoded {
            Ok(s) => Some(s),
            Err(e) => {
                tracing::warn!(term, error = %e, "unreadable standalone record");
                None
            }
        }
    }

    /// Linear merge-join of the store's sorted term keys against a partial
    /// index. One-sided keys copy through byte-for-byte; both-sided keys are
    /// decoded, overlaid per `policy`, and re-encoded serial-ascending. The
    /// new file replaces the old via one atomic rename, so a failure before
    /// that point leaves the store in its last-known-good state.
    pub fn merge(&mut self, partial: PartialIndex, policy: ConflictPolicy) -> Result<()> {
        if partial.is_empty() {
            return Ok(());
        }
        let tmp = self.paths.postings_temp();
        let mut new_offsets: BTreeMap<String, u64> = BTreeMap::new();
        {
            let mut out = BufWriter::new(File::create(&tmp)?);
            let mut reader = BufReader::new(File::open(self.paths.postings())?);
            let mut write_pos: u64 = 0;
            let mut existing = self.state.full_offsets.iter().peekable();
            let mut incoming = partial.terms().iter().peekable();
            enum Step {
                CopyExisting,
                WriteIncoming,
                Overlay,
            }
            loop {
                let step = match (existing.peek(), incoming.peek()) {
                    (None, None) => break,
                    (Some(_), None) => Step::CopyExisting,
                    (None, Some(_)) => Step::WriteIncoming,
                    (Some((ek, _)), Some((ik, _))) => match ek.as_str().cmp(ik.as_str()) {
                        Ordering::Less => Step::CopyExisting,
                        Ordering::Greater => Step::WriteIncoming,
                        Ordering::Equal => Step::Overlay,
                    },
                };
                let (term, line) = match step {
                    Step::CopyExisting => {
                        let (term, &offset) = existing.next().expect("peeked");
                        (term.clone(), read_line_at(&mut reader, offset)?)
                    }
                    Step::WriteIncoming => {
                        let (term, entries) = incoming.next().expect("peeked");
                        (term.clone(), encode_posting(entries)?)
                    }
                    Step::Overlay => {
                        let (term, &offset) = existing.next().expect("peeked");
                        let (_, entries) = incoming.next().expect("peeked");
                        let stored: Posting =
                            serde_json::from_str(&read_line_at(&mut reader, offset)?)?;
                        let mut merged: BTreeMap<Serial, Weight> =
                            stored.into_iter().map(|e| (e.serial(), e.weight())).collect();
                        for (&serial, &weight) in entries.iter() {
                            match policy {
                                ConflictPolicy::Replace => {
                                    merged.insert(serial, weight);
                                }
                                ConflictPolicy::Accumulate => {
                                    *merged.entry(serial).or_insert(0.0) += weight;
                                }
                            }
                        }
                        (term.clone(), encode_posting(&merged)?)
                    }
                };
                new_offsets.insert(term, write_pos);
                write_pos += write_line(&mut out, &line)?;
            }
            out.flush()?;
        }
        fs::rename(&tmp, self.paths.postings())?;
        self.state.full_offsets = new_offsets;
        self.rewrite_epilogue()
    }

    /// Rewrite every stored weight as `round4((1 + log10(f)) * log10(N / L))`
    /// for posting length L and raw frequency f, halved when the serial has
    /// no recorded title. The log transform is not idempotent; run this once
    /// per build, after the final merge.
    pub fn construct_tfidf(&mut self, total_docs: u32) -> Result<()> {
        let tmp = self.paths.postings_temp();
        let mut new_offsets: BTreeMap<String, u64> = BTreeMap::new();
        {
            let mut out = BufWriter::new(File::create(&tmp)?);
            let mut reader = BufReader::new(File::open(self.paths.postings())?);
            let mut write_pos: u64 = 0;
            for (term, &offset) in &self.state.full_offsets {
                let posting: Posting = serde_json::from_str(&read_line_at(&mut reader, offset)?)?;
                let idf = (total_docs as f64 / posting.len() as f64).log10();
                let scored: Posting = posting
                    .into_iter()
                    .map(|entry| {
                        let mut weight = round4((1.0 + entry.weight().log10()) * idf);
                        if !self.state.serial_titles.contains_key(&entry.serial()) {
                            weight *= 0.5;
                        }
                        PostingEntry(entry.serial(), weight)
                    })
                    .collect();
                let line = serde_json::to_string(&scored)?;
                new_offsets.insert(term.clone(), write_pos);
                write_pos += write_line(&mut out, &line)?;
            }
            out.flush()?;
        }
        fs::rename(&tmp, self.paths.postings())?;
        self.state.full_offsets = new_offsets;
        self.rewrite_epilogue()
    }

    /// Derive the serial-only standalone file from the current full index.
    pub fn build_standalone_projection(&mut self) -> Result<()> {
        let tmp = self.paths.standalone_temp();
        let mut new_offsets: BTreeMap<String, u64> = BTreeMap::new();
        {
            let mut out = BufWriter::new(File::create(&tmp)?);
            let mut reader = BufReader::new(File::open(self.paths.postings())?);
            let mut write_pos: u64 = 0;
            for (term, &offset) in &self.state.full_offsets {
                let posting: Posting = serde_json::from_str(&read_line_at(&mut reader, offset)?)?;
                let serials: Vec<Serial> = posting.iter().map(|e| e.serial()).collect();
                let line = serde_json::to_string(&serials)?;
                new_offsets.insert(term.clone(), write_pos);
                write_pos += write_line(&mut out, &line)?;
            }
            out.flush()?;
        }
        fs::rename(&tmp, self.paths.standalone())?;
        self.state.standalone_offsets = new_offsets;
        self.persist()
    }

    /// Replace the hot cache wholesale with the `n` terms of largest posting
    /// cardinality, ties broken by key order, plus their serial projections.
    pub fn refresh_cache(&mut self, n: usize) -> Result<()> {
        let mut sizes: Vec<(usize, String)> = Vec::with_capacity(self.state.full_offsets.len());
        for (term, &offset) in &self.state.full_offsets {
            let posting = self.decode_posting_at(offset)?;
            sizes.push((posting.len(), term.clone()));
        }
        sizes.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));

        let mut cache: HashMap<String, Posting> = HashMap::with_capacity(n);
        let mut standalone_cache: HashMap<String, Vec<Serial>> = HashMap::with_capacity(n);
        for (_, term) in sizes.into_iter().take(n) {
            let offset = self.state.full_offsets[&term];
            let posting = self.decode_posting_at(offset)?;
            standalone_cache.insert(term.clone(), posting.iter().map(|e| e.serial()).collect());
            cache.insert(term, posting);
        }
        self.state.cache = cache;
        self.state.standalone_cache = standalone_cache;
        self.persist()
    }

    pub fn url_for(&self, serial: Serial) -> Option<&str> {
        self.state.serial_urls.get(&serial).map(String::as_str)
    }

    pub fn title_for(&self, serial: Serial) -> Option<&str> {
        self.state.serial_titles.get(&serial).map(String::as_str)
    }

    /// Batch URL lookup; one slot per requested serial, in request order.
    pub fn urls_for(&self, serials: &[Serial]) -> Vec<Option<&str>> {
        serials.iter().map(|&s| self.url_for(s)).collect()
    }

    /// All indexed terms, in key order.
    pub fn terms(&self) -> impl Iterator<Item = &str> {
        self.state.full_offsets.keys().map(String::as_str)
    }

    pub fn term_count(&self) -> usize { self.state.full_offsets.len() }

    pub fn document_count(&self) -> u32 { self.state.next_serial }

    /// Bumped on every postings-file rewrite; offsets observed under an
    /// older generation must not be trusted afterwards.
    pub fn generation(&self) -> u64 { self.state.generation }

    /// Terms currently materialized in the hot cache, in key order.
    pub fn cached_terms(&self) -> Vec<&str> {
        let mut terms: Vec<&str> = self.state.cache.keys().map(String::as_str).collect();
        terms.sort_unstable();
        terms
    }

    fn decode_posting_at(&self, offset: u64) -> Result<Posting> {
        let line = read_record(&self.paths.postings(), offset)?;
        Ok(serde_json::from_str(&line)?)
    }

    /// A full-postings rewrite invalidates every offset and cached copy.
    fn rewrite_epilogue(&mut self) -> Result<()> {
        self.state.generation += 1;
        self.state.cache.clear();
        self.state.standalone_cache.clear();
        self.persist()
    }
}

fn encode_posting(entries: &BTreeMap<Serial, Weight>) -> Result<String> {
    let posting: Posting = entries.iter().map(|(&s, &w)| PostingEntry(s, w)).collect();
    Ok(serde_json::to_string(&posting)?)
}

fn write_line(out: &mut BufWriter<File>, line: &str) -> Result<u64> {
    out.write_all(line.as_bytes())?;
    out.write_all(b"\n")?;
    Ok(line.len() as u64 + 1)
}

fn read_line_at(reader: &mut BufReader<File>, offset: u64) -> Result<String> {
    reader.seek(SeekFrom::Start(offset))?;
    let mut line = String::new();
    reader.read_line(&mut line)?;
    while line.ends_with('\n') || line.ends_with('\r') {
        line.pop();
    }
    Ok(line)
}

fn read_record(path: &Path, offset: u64) -> Result<String> {
    let mut reader = BufReader::new(File::open(path)?);
    read_line_at(&mut reader, offset)
}
