use serde::{Deserialize, Serialize};

pub mod builder;
pub mod coordinator;
pub mod dedup;
pub mod query;
pub mod store;
pub mod tokenizer;

/// Dense document identifier, assigned in ingestion order and never reused.
pub type Serial = u32;
pub type Weight = f64;

/// One (serial, weight) pair inside a posting record. Serializes as a
/// two-element array, so a full posting line reads `[[0,1.5],[7,2.0]]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PostingEntry(pub Serial, pub Weight);

impl PostingEntry {
    pub fn serial(&self) -> Serial { self.0 }
    pub fn weight(&self) -> Weight { self.1 }
}

/// A full posting: entries sorted ascending by serial.
pub type Posting = Vec<PostingEntry>;

/// Round to 3 decimal places (field-weighted frequency contributions).
pub fn round3(x: Weight) -> Weight { (x * 1_000.0).round() / 1_000.0 }

/// Round to 4 decimal places (tf-idf scores).
pub fn round4(x: Weight) -> Weight { (x * 10_000.0).round() / 10_000.0 }
