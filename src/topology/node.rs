use serde::{Serialize, Deserialize};
use crate::core::types::Score;

/// One child chunk of a node; persisted as one counter inside the node's bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub start: Score,
    pub end: Score,
    /// Chunk spans more than one score
    pub has_child: bool,
}

impl Field {
    pub fn new(start: Score, end: Score) -> Self {
        Field {
            name: field_name(start, end),
            start,
            end,
            has_child: start != end,
        }
    }

    pub fn contains(&self, score: Score) -> bool {
        score >= self.start && score <= self.end
    }
}

/// Computed descriptor of one bucket; never stored as an object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyNode {
    pub layer: u32,
    pub start: Score,
    pub end: Score,
    pub fields: Vec<Field>,
}

impl TopologyNode {
    pub fn document_id(&self) -> String {
        bucket_id(self.layer, self.start, self.end)
    }

    pub fn field_for(&self, score: Score) -> Option<&Field> {
        self.fields.iter().find(|f| f.contains(score))
    }

    pub fn is_leaf(&self) -> bool {
        self.start == self.end
    }
}

pub fn bucket_id(layer: u32, start: Score, end: Score) -> String {
    format!("rank_{}_{}_{}", layer, start, end)
}

pub fn field_name(start: Score, end: Score) -> String {
    format!("range_{}_{}", start, end)
}

/// Split `[start, end]` into `ceil(len / branch_factor)`-sized chunks.
///
/// The last chunk absorbs the remainder and may be shorter. Callers
/// guarantee `start <= end`, `branch_factor >= 2` and that `end - start + 1`
/// fits in an `i64`.
pub fn derive_node(start: Score, end: Score, layer: u32, branch_factor: u32) -> TopologyNode {
    let len = end - start + 1;
    let bf = i64::from(branch_factor);
    let chunk = len / bf + i64::from(len % bf != 0);

    let mut fields = Vec::with_capacity(bf.min(len) as usize);
    let mut chunk_start = start;
    loop {
        let chunk_end = chunk_start
            .checked_add(chunk - 1)
            .map_or(end, |e| e.min(end));
        fields.push(Field::new(chunk_start, chunk_end));

        if chunk_end == end {
            break;
        }
        chunk_start = chunk_end + 1;
    }

    TopologyNode { layer, start, end, fields }
}
