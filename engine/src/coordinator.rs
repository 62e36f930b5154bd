use crate::builder::{index_document, ConflictPolicy, FieldWeights, PartialIndex};
use crate::store::PostingStore;
use crate::tokenizer::{Extractor, Tokenizer};
use crate::Serial;
use anyhow::Result;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

/// Fetches a document's raw markup by path. The indexer reads corpus files;
/// tests substitute in-memory sources.
pub trait DocumentSource: Send + Sync {
    fn read(&self, path: &Path) -> Result<String>;
}

/// One accepted document: its assigned serial and where to find it.
#[derive(Debug, Clone)]
pub struct DocEntry {
    pub serial: Serial,
    pub path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Builder workers per batch.
    pub workers: usize,
    /// Documents per batch; one batch is in flight at a time, so this bounds
    /// peak partial-index memory.
    pub batch_size: usize,
    pub weights: FieldWeights,
    pub conflict: ConflictPolicy,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            batch_size: 10_000,
            weights: FieldWeights::default(),
            conflict: ConflictPolicy::Replace,
        }
    }
}

/// Bulk-build the store from accepted documents: fixed-size batches, a
/// pull-based work queue per batch, isolated worker-local partial indices,
/// one union and one store merge per batch. Batches run to completion; there
/// are no timeouts, and a stalled worker stalls its batch.
pub fn build(
    store: &mut PostingStore,
    docs: Vec<DocEntry>,
    source: &dyn DocumentSource,
    extractor: &dyn Extractor,
    tokenizer: &dyn Tokenizer,
    config: &CoordinatorConfig,
) -> Result<()> {
    let total = docs.len();
    tracing::info!(
        total,
        workers = config.workers,
        batch_size = config.batch_size,
        "starting bulk build"
    );
    for (batch_no, batch) in docs.chunks(config.batch_size.max(1)).enumerate() {
        let union = run_batch(batch, source, extractor, tokenizer, config);
        tracing::info!(batch_no, docs = batch.len(), terms = union.len(), "merging batch");
        store.merge(union, config.conflict)?;
    }
    Ok(())
}

/// Run one batch's worker pool and union the resulting partial indices.
/// Workers share nothing but the claim queue and the progress counter; the
/// overlay in `absorb` is safe because each serial is claimed exactly once.
fn run_batch(
    batch: &[DocEntry],
    source: &dyn DocumentSource,
    extractor: &dyn Extractor,
    tokenizer: &dyn Tokenizer,
    config: &CoordinatorConfig,
) -> PartialIndex {
    let total = batch.len();
    let queue: Mutex<Vec<DocEntry>> = Mutex::new(batch.to_vec());
    let done = AtomicUsize::new(0);

    let partials = thread::scope(|scope| {
        let mut handles = Vec::with_capacity(config.workers);
        for worker in 0..config.workers.max(1) {
            let queue = &queue;
            let done = &done;
            let weights = &config.weights;
            handles.push(scope.spawn(move || {
                tracing::debug!(worker, "builder worker started");
                let mut local = PartialIndex::new();
                loop {
                    let entry = match queue.lock().pop() {
                        Some(e) => e,
                        None => break,
                    };
                    match source.read(&entry.path) {
                        Ok(raw) => {
                            let text = extractor.extract(&raw);
                            index_document(&mut local, entry.serial, &text, tokenizer, weights);
                        }
                        Err(e) => {
                            tracing::warn!(
                                serial = entry.serial,
                                path = %entry.path.display(),
                                error = %e,
                                "unreadable document, skipping"
                            );
                        }
                    }
                    done.fetch_add(1, Ordering::Relaxed);
                }
                tracing::debug!(worker, terms = local.len(), "builder worker finished");
                local
            }));
        }
        report_progress(total, &done, &handles);
        handles
            .into_iter()
            .map(|h| h.join().expect("builder worker panicked"))
            .collect::<Vec<_>>()
    });

    let mut union = PartialIndex::new();
    for partial in partials {
        union.absorb(partial);
    }
    union
}

/// Observes queue depletion for progress. Reads the shared counter only and
/// never blocks workers. A panicked worker stops advancing the counter, so
/// the loop also watches the handles; once every worker is finished the
/// panic is reported through `join`.
fn report_progress<T>(
    total: usize,
    done: &AtomicUsize,
    workers: &[thread::ScopedJoinHandle<'_, T>],
) {
    if total == 0 {
        return;
    }
    let mut last = None;
    loop {
        let completed = done.load(Ordering::Relaxed);
        let pct = completed * 100 / total;
        if last != Some(pct) {
            tracing::info!(completed, total, pct, "batch progress");
            last = Some(pct);
        }
        if completed >= total || workers.iter().all(|h| h.is_finished()) {
            break;
        }
        thread::sleep(Duration::from_millis(50));
    }
}
