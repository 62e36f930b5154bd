use anyhow::{bail, Result};
use lazy_static::lazy_static;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use std::collections::HashSet;
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    static ref TOKEN_RE: Regex = Regex::new(r"[a-z0-9][a-z0-9_/'=]*").expect("valid regex");
    static ref STEMMER: Stemmer = Stemmer::create(Algorithm::English);
    pub(crate) static ref STOPWORDS: HashSet<&'static str> = {
        let words: &[&str] = &[
            "a","about","above","after","again","against","all","am","an","and","any","are","aren't","as","at",
            "be","because","been","before","being","below","between","both","but","by",
            "can","can't","cannot","could","couldn't",
            "did","didn't","do","does","doesn't","doing","don't","down","during",
            "each","few","for","from","further",
            "had","hadn't","has","hasn't","have","haven't","having","he","he'd","he'll","he's","her","here","here's","hers","herself","him","himself","his","how","how's",
            "i","i'd","i'll","i'm","i've","if","in","into","is","isn't","it","it's","its","itself",
            "let's","me","more","most","mustn't","my","myself",
            "no","nor","not","of","off","on","once","only","or","other","ought","our","ours","ourselves","out","over","own",
            "same","she","she'd","she'll","she's","should","shouldn't","so","some","such",
            "than","that","that's","the","their","theirs","them","themselves","then","there","there's","these","they","they'd","they'll","they're","they've","this","those","through","to","too",
            "under","until","up","very",
            "was","wasn't","we","we'd","we'll","we're","we've","were","weren't","what","what's","when","when's","where","where's","which","while","who","who's","whom","why","why's","with","won't","would","wouldn't",
            "you","you'd","you'll","you're","you've","your","yours","yourself","yourselves"
        ];
        words.iter().copied().collect()
    };
}

/// Turns one text stream into normalized index terms. Implementations must
/// never leak raw parse failures into the indexing path; an `Err` here is
/// degraded to an empty contribution at the per-field boundary.
pub trait Tokenizer: Send + Sync {
    fn tokenize(&self, text: &str) -> Result<Vec<String>>;
}

/// The four text streams structural extraction exposes from parsed markup.
/// Each is tokenized and weighted independently; `title` is absent when the
/// page carries no title element.
#[derive(Debug, Clone, Default)]
pub struct StructuralText {
    pub body: String,
    pub headings: String,
    pub bold: String,
    pub title: Option<String>,
}

/// Splits parsed markup into the weighted text streams of [`StructuralText`].
pub trait Extractor: Send + Sync {
    fn extract(&self, raw: &str) -> StructuralText;

    /// Title only, for callers that gate documents before indexing them.
    /// Implementations that can skip the other streams should override this.
    fn extract_title(&self, raw: &str) -> Option<String> {
        self.extract(raw).title
    }
}

/// What a failing stage does: yield an empty token list for the whole
/// pipeline run, or re-raise to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    SubstituteEmpty,
    Propagate,
}

type StageFn = Box<dyn Fn(Vec<String>) -> Result<Vec<String>> + Send + Sync>;

struct Stage {
    name: &'static str,
    policy: FailurePolicy,
    run: StageFn,
}

/// A named sequence of token transforms with a per-stage failure policy.
/// Raw text is scanned into candidate tokens first, then each stage runs in
/// order over the full token list.
pub struct TokenPipeline {
    name: &'static str,
    stages: Vec<Stage>,
}

impl TokenPipeline {
    pub fn new(name: &'static str) -> Self {
        Self { name, stages: Vec::new() }
    }

    pub fn stage<F>(mut self, name: &'static str, policy: FailurePolicy, run: F) -> Self
    where
        F: Fn(Vec<String>) -> Result<Vec<String>> + Send + Sync + 'static,
    {
        self.stages.push(Stage { name, policy, run: Box::new(run) });
        self
    }
}

impl Tokenizer for TokenPipeline {
    fn tokenize(&self, text: &str) -> Result<Vec<String>> {
        let mut tokens = scan(text);
        for stage in &self.stages {
            tokens = match (stage.run)(tokens) {
                Ok(t) => t,
                Err(e) => match stage.policy {
                    FailurePolicy::SubstituteEmpty => {
                        tracing::warn!(
                            pipeline = self.name,
                            stage = stage.name,
                            error = %e,
                            "stage failed, substituting empty token list"
                        );
                        return Ok(Vec::new());
                    }
                    FailurePolicy::Propagate => {
                        bail!("pipeline {} failed at stage {}: {e}", self.name, stage.name)
                    }
                },
            };
        }
        Ok(tokens)
    }
}

/// NFKC-normalize, lowercase, and scan out candidate tokens.
fn scan(text: &str) -> Vec<String> {
    let normalized = text.nfkc().collect::<String>().to_lowercase();
    TOKEN_RE.find_iter(&normalized).map(|m| m.as_str().to_string()).collect()
}

/// Break compound tokens on `/` and `_`.
fn split_compounds(tokens: Vec<String>) -> Result<Vec<String>> {
    let mut out = Vec::with_capacity(tokens.len());
    for token in tokens {
        if token.contains('/') || token.contains('_') {
            out.extend(token.split(['/', '_']).filter(|p| !p.is_empty()).map(str::to_string));
        } else {
            out.push(token);
        }
    }
    Ok(out)
}

/// Drop tokens with no index signal: key=value fragments and anything
/// without an alphanumeric character.
fn strip_junk(tokens: Vec<String>) -> Result<Vec<String>> {
    Ok(tokens
        .into_iter()
        .filter(|t| !t.contains('=') && t.chars().any(|c| c.is_ascii_alphanumeric()))
        .collect())
}

fn strip_stopwords(tokens: Vec<String>) -> Result<Vec<String>> {
    Ok(tokens.into_iter().filter(|t| !STOPWORDS.contains(t.as_str())).collect())
}

fn stem_all(tokens: Vec<String>) -> Result<Vec<String>> {
    Ok(tokens.into_iter().map(|t| STEMMER.stem(&t).to_string()).collect())
}

/// The default indexing pipeline: compound split, junk and stopword removal,
/// Snowball stemming. Every stage substitutes empty on failure so a bad
/// document costs its own field and nothing more.
pub fn stemming_pipeline() -> TokenPipeline {
    TokenPipeline::new("tokenize")
        .stage("split_compounds", FailurePolicy::SubstituteEmpty, split_compounds)
        .stage("strip_junk", FailurePolicy::SubstituteEmpty, strip_junk)
        .stage("strip_stopwords", FailurePolicy::SubstituteEmpty, strip_stopwords)
        .stage("stem_all", FailurePolicy::SubstituteEmpty, stem_all)
}
