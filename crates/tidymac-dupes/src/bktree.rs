//! A BK-tree over Hamming distance, for sublinear near-neighbor queries on
//! 64-bit perceptual hashes.

use crate::phash::hamming_distance;

#[derive(Debug)]
struct Node {
    hash: u64,
    /// Payload index into the caller's hash list.
    index: usize,
    /// Children keyed by their distance to this node.
    children: Vec<(u32, Node)>,
}

/// BK-tree of (hash, index) pairs.
#[derive(Debug, Default)]
pub struct BkTree {
    root: Option<Node>,
    len: usize,
}

impl BkTree {
    /// Create an empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of inserted hashes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the tree is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Insert a hash with its payload index.
    pub fn insert(&mut self, hash: u64, index: usize) {
        self.len += 1;
        match self.root.as_mut() {
            Some(root) => insert_at(root, hash, index),
            None => {
                self.root = Some(Node {
                    hash,
                    index,
                    children: Vec::new(),
                });
            }
        }
    }

    /// All (index, distance) pairs within `radius` of `hash`.
    pub fn query(&self, hash: u64, radius: u32) -> Vec<(usize, u32)> {
        let mut results = Vec::new();
        let Some(root) = &self.root else {
            return results;
        };

        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            let distance = hamming_distance(node.hash, hash);
            if distance <= radius {
                results.push((node.index, distance));
            }
            // Triangle inequality: only children whose edge distance lies in
            // [d - r, d + r] can contain matches.
            let low = distance.saturating_sub(radius);
            let high = distance + radius;
            for (edge, child) in &node.children {
                if (low..=high).contains(edge) {
                    stack.push(child);
                }
            }
        }

        results
    }
}

/// Descend to the child slot matching the edge distance, creating a leaf
/// when the slot is free. Identical hashes chain through distance-zero
/// edges, so exact duplicates coexist in the tree.
fn insert_at(node: &mut Node, hash: u64, index: usize) {
    let distance = hamming_distance(node.hash, hash);
    match node.children.iter_mut().find(|(d, _)| *d == distance) {
        Some((_, child)) => insert_at(child, hash, index),
        None => node.children.push((
            distance,
            Node {
                hash,
                index,
                children: Vec::new(),
            },
        )),
    }
}
