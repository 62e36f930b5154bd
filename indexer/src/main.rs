mod extract;

use anyhow::Result;
use clap::{Parser, Subcommand};
use engine::builder::ConflictPolicy;
use engine::coordinator::{self, CoordinatorConfig, DocEntry, DocumentSource};
use engine::dedup::{DedupConfig, NearDuplicateFilter, Verdict};
use engine::store::PostingStore;
use engine::tokenizer::{stemming_pipeline, Extractor};
use extract::HtmlExtractor;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, EnvFilter};
use walkdir::WalkDir;

/// One corpus page on disk: the page's URL and its raw markup.
#[derive(Debug, Deserialize)]
struct CorpusPage {
    url: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct MetaFile {
    num_docs: u32,
    num_rejected: u64,
    created_at: String,
    version: u32,
}

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Build and query a tf-idf inverted index over an offline web corpus", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the index from a directory of {url, content} JSON pages
    Build {
        /// Corpus directory
        #[arg(long)]
        input: String,
        /// Output index directory
        #[arg(long)]
        output: String,
        /// Builder workers per batch
        #[arg(long, default_value_t = 4)]
        workers: usize,
        /// Documents per batch (bounds peak memory)
        #[arg(long, default_value_t = 10_000)]
        batch_size: usize,
        /// Hot-cache size in terms
        #[arg(long, default_value_t = 100)]
        cache_size: usize,
        /// Jaccard similarity strictly above this marks a near duplicate
        #[arg(long, default_value_t = 0.9)]
        similarity_cutoff: f64,
        /// Recent same-host fingerprints compared per document
        #[arg(long, default_value_t = 50)]
        window: usize,
        /// Keep stopwords in near-duplicate fingerprints
        #[arg(long, default_value_t = false)]
        keep_stopwords: bool,
        /// Sum overlapping weights on merge instead of replacing
        #[arg(long, default_value_t = false)]
        accumulate: bool,
        /// Total document count for idf; defaults to the accepted count
        #[arg(long)]
        total_docs: Option<u32>,
    },
    /// Look up one term's posting in an existing index
    Lookup {
        #[arg(long)]
        index: String,
        #[arg(long)]
        term: String,
        /// Print the serial-only standalone posting instead
        #[arg(long, default_value_t = false)]
        standalone: bool,
    },
}

struct FileSource;

impl DocumentSource for FileSource {
    fn read(&self, path: &Path) -> Result<String> {
        let page: CorpusPage = serde_json::from_reader(File::open(path)?)?;
        Ok(page.content)
    }
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build {
            input,
            output,
            workers,
            batch_size,
            cache_size,
            similarity_cutoff,
            window,
            keep_stopwords,
            accumulate,
            total_docs,
        } => {
            let dedup = DedupConfig {
                similarity_cutoff,
                window,
                strip_stopwords: !keep_stopwords,
            };
            let config = CoordinatorConfig {
                workers,
                batch_size,
                conflict: if accumulate { ConflictPolicy::Accumulate } else { ConflictPolicy::Replace },
                ..Default::default()
            };
            build(&input, &output, dedup, config, cache_size, total_docs)
        }
        Commands::Lookup { index, term, standalone } => lookup(&index, &term, standalone),
    }
}

fn build(
    input: &str,
    output: &str,
    dedup: DedupConfig,
    config: CoordinatorConfig,
    cache_size: usize,
    total_docs: Option<u32>,
) -> Result<()> {
    let mut files: Vec<PathBuf> = WalkDir::new(input)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.path().is_file()
                && e.path().extension().and_then(|s| s.to_str()) == Some("json")
        })
        .map(|e| e.into_path())
        .collect();
    // Serials follow ingestion order; sort so repeated builds agree.
    files.sort();
    tracing::info!(corpus_files = files.len(), "scanned corpus");

    let mut store = PostingStore::create(output)?;
    let extractor = HtmlExtractor::new();
    let mut filter = NearDuplicateFilter::new(dedup);
    let mut docs: Vec<DocEntry> = Vec::new();
    for path in files {
        let page: CorpusPage = match File::open(&path)
            .map_err(anyhow::Error::from)
            .and_then(|f| Ok(serde_json::from_reader(f)?))
        {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "unreadable corpus file, skipping");
                continue;
            }
        };
        match filter.check(&page.url, &page.content) {
            Verdict::Accept => {
                let title = extractor.extract_title(&page.content);
                let serial = store.assign_serial(page.url, title);
                docs.push(DocEntry { serial, path });
            }
            Verdict::Duplicate { of } => {
                tracing::debug!(url = %page.url, of = ?of, "near duplicate rejected");
            }
        }
    }
    let num_rejected: u64 = filter.rejected().values().map(|&c| c as u64).sum();
    let accepted = docs.len() as u32;
    tracing::info!(accepted, rejected = num_rejected, "corpus gated");
    store.persist()?;

    let tokenizer = stemming_pipeline();
    coordinator::build(&mut store, docs, &FileSource, &extractor, &tokenizer, &config)?;

    store.construct_tfidf(total_docs.unwrap_or(accepted).max(1))?;
    store.build_standalone_projection()?;
    store.refresh_cache(cache_size)?;

    let meta = MetaFile {
        num_docs: accepted,
        num_rejected,
        created_at: time::OffsetDateTime::now_utc()
            .format(&time::format_description::well_known::Rfc3339)
            .unwrap_or_default(),
        version: 1,
    };
    fs::write(Path::new(output).join("meta.json"), serde_json::to_string_pretty(&meta)?)?;
    tracing::info!(output, terms = store.term_count(), "index build complete");
    Ok(())
}

fn lookup(index: &str, term: &str, standalone: bool) -> Result<()> {
    let store = PostingStore::open(index)?;
    if standalone {
        match store.lookup_standalone(term) {
            Some(serials) => println!("{}", serde_json::to_string(&serials)?),
            None => println!("term not found"),
        }
    } else {
        match store.lookup_posting(term) {
            Some(posting) => println!("{}", serde_json::to_string(&posting)?),
            None => println!("term not found"),
        }
    }
    Ok(())
}
