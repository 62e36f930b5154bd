use crate::tokenizer::STOPWORDS;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::{HashMap, HashSet, VecDeque};
use url::Url;

lazy_static! {
    static ref WORD_RE: Regex = Regex::new(r"[a-z0-9]+").expect("valid regex");
}

/// Outcome of gating one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    /// `of` names the earlier same-host page that matched; `None` means the
    /// document had no token signal at all.
    Duplicate { of: Option<String> },
}

#[derive(Debug, Clone)]
pub struct DedupConfig {
    /// Similarity strictly above this is a duplicate; exactly at it is not.
    pub similarity_cutoff: f64,
    /// How many recent same-host fingerprints to retain and compare against.
    pub window: usize,
    pub strip_stopwords: bool,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self { similarity_cutoff: 0.9, window: 50, strip_stopwords: true }
    }
}

struct Fingerprint {
    url: String,
    tokens: HashSet<String>,
}

/// Gates documents on textual similarity to recent pages from the same host.
/// Only the host scopes comparison; scheme and path are ignored. Each check
/// costs O(window), independent of corpus size.
pub struct NearDuplicateFilter {
    config: DedupConfig,
    hosts: HashMap<String, VecDeque<Fingerprint>>,
    rejected: HashMap<String, u32>,
}

impl NearDuplicateFilter {
    pub fn new(config: DedupConfig) -> Self {
        Self { config, hosts: HashMap::new(), rejected: HashMap::new() }
    }

    /// Accept a document into the corpus or flag it as a near duplicate of a
    /// recent same-host page. Accepted documents have their fingerprint
    /// recorded, evicting the oldest entry beyond the window.
    pub fn check(&mut self, url: &str, content: &str) -> Verdict {
        let tokens = self.token_set(content);
        if tokens.is_empty() {
            self.record_rejection(url);
            return Verdict::Duplicate { of: None };
        }

        let host = host_key(url);
        if let Some(window) = self.hosts.get(&host) {
            let matched = window
                .iter()
                .find(|fp| jaccard(&fp.tokens, &tokens) > self.config.similarity_cutoff)
                .map(|fp| fp.url.clone());
            if let Some(of) = matched {
                self.record_rejection(url);
                return Verdict::Duplicate { of: Some(of) };
            }
        }

        let window = self.hosts.entry(host).or_default();
        window.push_back(Fingerprint { url: url.to_string(), tokens });
        if window.len() > self.config.window {
            window.pop_front();
        }
        Verdict::Accept
    }

    /// Rejection counts keyed by scheme://host/path, for operator reporting.
    pub fn rejected(&self) -> &HashMap<String, u32> {
        &self.rejected
    }

    fn token_set(&self, content: &str) -> HashSet<String> {
        let folded = content.to_lowercase();
        WORD_RE
            .find_iter(&folded)
            .map(|m| m.as_str().to_string())
            .filter(|t| !self.config.strip_stopwords || !STOPWORDS.contains(t.as_str()))
            .collect()
    }

    fn record_rejection(&mut self, url: &str) {
        let key = match Url::parse(url) {
            Ok(u) => format!("{}://{}{}", u.scheme(), u.host_str().unwrap_or(""), u.path()),
            Err(_) => url.to_string(),
        };
        *self.rejected.entry(key).or_insert(0) += 1;
    }
}

/// Host portion of a URL; unparseable URLs share one fallback bucket.
fn host_key(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_default()
}

/// Intersection over union of two token sets.
fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let (small, large) = if a.len() < b.len() { (a, b) } else { (b, a) };
    let intersection = small.iter().filter(|t| large.contains(*t)).count();
    let union = a.len() + b.len() - intersection;
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}
