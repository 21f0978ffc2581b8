use serde::{Serialize, Deserialize};
use std::collections::BTreeMap;
use std::fmt;

/// Integer value being ranked
pub type Score = i64;

/// 1-based position among tracked scores, best = 1
pub type Rank = u64;

/// Addresses one collection inside one database
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Namespace {
    pub db: String,
    pub collection: String,
}

impl Namespace {
    pub fn new(db: impl Into<String>, collection: impl Into<String>) -> Self {
        Namespace {
            db: db.into(),
            collection: collection.into(),
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{}", self.db, self.collection)
    }
}

/// Key of a single document across the whole store
pub type DocKey = (Namespace, String);

/// Plain counter record: buckets and the meta-record share this shape.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub values: BTreeMap<String, i64>,
}

impl Document {
    pub fn new(id: impl Into<String>) -> Self {
        Document {
            id: id.into(),
            values: BTreeMap::new(),
        }
    }

    /// Absent fields count as zero
    pub fn get(&self, field: &str) -> i64 {
        self.values.get(field).copied().unwrap_or(0)
    }

    pub fn get_field(&self, field: &str) -> Option<i64> {
        self.values.get(field).copied()
    }

    pub fn apply(&mut self, deltas: &BTreeMap<String, i64>) {
        for (field, delta) in deltas {
            *self.values.entry(field.clone()).or_insert(0) += delta;
        }
    }

    pub fn total(&self) -> i64 {
        self.values.values().sum()
    }
}
