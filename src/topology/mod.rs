pub mod node;

use crate::core::config::RankConfig;
use crate::core::error::Result;
use crate::core::types::Score;
pub use node::{bucket_id, derive_node, field_name, Field, TopologyNode};

/// The counters of one bucket an operation needs to touch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainEntry {
    pub document_id: String,
    pub fields: Vec<Field>,
}

/// Range-partitioning tree over `[min_score, max_score]`.
///
/// Pure and cheap to copy; every read and write path derives its nodes from
/// here so both agree on bucket ids and field names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Topology {
    pub min_score: Score,
    pub max_score: Score,
    pub branch_factor: u32,
}

impl Topology {
    pub fn new(config: &RankConfig) -> Result<Self> {
        config.validate()?;
        Ok(Topology {
            min_score: config.min_score,
            max_score: config.max_score,
            branch_factor: config.branch_factor,
        })
    }

    pub fn root(&self) -> TopologyNode {
        derive_node(self.min_score, self.max_score, 0, self.branch_factor)
    }

    pub fn contains(&self, score: Score) -> bool {
        score >= self.min_score && score <= self.max_score
    }

    /// Root-to-leaf entries holding the one field that contains `score`.
    pub fn chain(&self, score: Score) -> Vec<ChainEntry> {
        let mut chain = Vec::new();
        let mut node = self.root();

        loop {
            let Some(field) = node.field_for(score).cloned() else {
                break;
            };
            chain.push(ChainEntry {
                document_id: node.document_id(),
                fields: vec![field.clone()],
            });

            if !field.has_child {
                break;
            }
            node = derive_node(field.start, field.end, node.layer + 1, self.branch_factor);
        }

        chain
    }

    /// Root-to-leaf entries holding every field ranked strictly better than
    /// `score`. Entries with no such field are skipped.
    pub fn rank_chain(&self, score: Score) -> Vec<ChainEntry> {
        let mut chain = Vec::new();
        let mut node = self.root();

        loop {
            let better: Vec<Field> = node.fields.iter().filter(|f| f.start > score).cloned().collect();
            if !better.is_empty() {
                chain.push(ChainEntry {
                    document_id: node.document_id(),
                    fields: better,
                });
            }

            match node.field_for(score) {
                Some(field) if field.has_child => {
                    node = derive_node(field.start, field.end, node.layer + 1, self.branch_factor);
                }
                _ => break,
            }
        }

        chain
    }

    /// Bucket id and single-score field holding the count of `score`.
    pub fn leaf(&self, score: Score) -> Option<ChainEntry> {
        self.chain(score).pop()
    }

    /// Number of layers, root included. The first field of a node is always
    /// its widest, so following it reaches the deepest leaf.
    pub fn depth(&self) -> u32 {
        let mut depth = 1;
        let mut node = self.root();
        while let Some(field) = node.fields.first().filter(|f| f.has_child) {
            node = derive_node(field.start, field.end, node.layer + 1, self.branch_factor);
            depth += 1;
        }
        depth
    }

    /// Every node of the tree, depth-first pre-order with fields ascending.
    pub fn list_all_nodes(&self) -> Vec<TopologyNode> {
        let mut nodes = Vec::new();
        let mut stack = vec![self.root()];

        while let Some(node) = stack.pop() {
            for field in node.fields.iter().rev().filter(|f| f.has_child) {
                stack.push(derive_node(field.start, field.end, node.layer + 1, self.branch_factor));
            }
            nodes.push(node);
        }

        nodes
    }
}
