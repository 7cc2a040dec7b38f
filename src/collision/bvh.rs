// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Kerf Contributors.

//! Bounding volume hierarchy over rigid components
//!
//! Flat-array tree with parent links: leaves map one-to-one to registered
//! items, and moving items are refit bottom-up along the parent chain
//! instead of rebuilding, which is what keeps per-step broad phase cheap.

use crate::collision::bbox::Aabb;

#[derive(Debug, Clone)]
struct Node {
    bbox: Aabb,
    parent: Option<usize>,
    /// Children for internal nodes.
    left: Option<usize>,
    right: Option<usize>,
    /// Item id for leaves.
    item: Option<usize>,
}

/// BVH keyed by caller-assigned item ids.
#[derive(Debug, Clone, Default)]
pub struct Bvh {
    nodes: Vec<Node>,
    root: Option<usize>,
    /// Leaf node index per item id.
    leaf_of: Vec<Option<usize>>,
}

impl Bvh {
    /// Build by recursive median split on the longest axis.
    pub fn build(items: &[(usize, Aabb)]) -> Self {
        let mut bvh = Bvh::default();
        if items.is_empty() {
            return bvh;
        }
        let max_id = items.iter().map(|(id, _)| *id).max().unwrap_or(0);
        bvh.leaf_of = vec![None; max_id + 1];
        let mut working: Vec<(usize, Aabb)> = items.to_vec();
        let root = bvh.build_recursive(&mut working, None);
        bvh.root = Some(root);
        bvh
    }

    fn build_recursive(&mut self, items: &mut [(usize, Aabb)], parent: Option<usize>) -> usize {
        if items.len() == 1 {
            let (id, bbox) = items[0];
            let index = self.nodes.len();
            self.nodes.push(Node {
                bbox,
                parent,
                left: None,
                right: None,
                item: Some(id),
            });
            self.leaf_of[id] = Some(index);
            return index;
        }

        let bbox = items
            .iter()
            .fold(Aabb::empty(), |acc, (_, b)| acc.union(b));
        let size = bbox.size();
        let axis = if size.x >= size.y && size.x >= size.z {
            0
        } else if size.y >= size.z {
            1
        } else {
            2
        };
        items.sort_by(|(_, a), (_, b)| {
            a.center()[axis]
                .partial_cmp(&b.center()[axis])
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let index = self.nodes.len();
        self.nodes.push(Node {
            bbox,
            parent,
            left: None,
            right: None,
            item: None,
        });

        let mid = items.len() / 2;
        let (left_items, right_items) = items.split_at_mut(mid);
        let left = self.build_recursive(left_items, Some(index));
        let right = self.build_recursive(right_items, Some(index));
        self.nodes[index].left = Some(left);
        self.nodes[index].right = Some(right);
        index
    }

    pub fn len(&self) -> usize {
        self.leaf_of.iter().filter(|l| l.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    pub fn item_bbox(&self, item: usize) -> Option<Aabb> {
        let leaf = (*self.leaf_of.get(item)?)?;
        Some(self.nodes[leaf].bbox)
    }

    /// Move one item's box and refit ancestors bottom-up. Touches only the
    /// leaf's root path, so concurrent queries on disjoint subtrees stay
    /// valid between refits.
    pub fn refit(&mut self, item: usize, bbox: Aabb) {
        let Some(Some(leaf)) = self.leaf_of.get(item).copied() else {
            return;
        };
        self.nodes[leaf].bbox = bbox;
        let mut current = self.nodes[leaf].parent;
        while let Some(index) = current {
            let left = self.nodes[index].left.map(|i| self.nodes[i].bbox);
            let right = self.nodes[index].right.map(|i| self.nodes[i].bbox);
            let merged = match (left, right) {
                (Some(a), Some(b)) => a.union(&b),
                (Some(a), None) | (None, Some(a)) => a,
                (None, None) => break,
            };
            self.nodes[index].bbox = merged;
            current = self.nodes[index].parent;
        }
    }

    /// Item ids whose boxes overlap the query box.
    pub fn query(&self, bbox: &Aabb) -> Vec<usize> {
        let mut result = Vec::new();
        if let Some(root) = self.root {
            self.query_recursive(root, bbox, &mut result);
        }
        result
    }

    fn query_recursive(&self, index: usize, bbox: &Aabb, result: &mut Vec<usize>) {
        let node = &self.nodes[index];
        if !node.bbox.intersects(bbox) {
            return;
        }
        if let Some(item) = node.item {
            result.push(item);
            return;
        }
        if let Some(left) = node.left {
            self.query_recursive(left, bbox, result);
        }
        if let Some(right) = node.right {
            self.query_recursive(right, bbox, result);
        }
    }

    /// All overlapping leaf pairs `(a, b)` with `a < b`, in deterministic
    /// ascending order.
    pub fn overlapping_pairs(&self) -> Vec<(usize, usize)> {
        let mut pairs = Vec::new();
        for (item, leaf) in self.leaf_of.iter().enumerate() {
            let Some(leaf) = leaf else { continue };
            let bbox = self.nodes[*leaf].bbox;
            for other in self.query(&bbox) {
                if other > item {
                    pairs.push((item, other));
                }
            }
        }
        pairs.sort_unstable();
        pairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;

    fn unit_box_at(x: f64) -> Aabb {
        Aabb::new(
            Vector3::new(x, 0.0, 0.0),
            Vector3::new(x + 1.0, 1.0, 1.0),
        )
    }

    #[test]
    fn test_build_and_query() {
        let items: Vec<(usize, Aabb)> =
            (0..8).map(|i| (i, unit_box_at(i as f64 * 2.0))).collect();
        let bvh = Bvh::build(&items);
        assert_eq!(bvh.len(), 8);

        let query = Aabb::new(Vector3::new(3.5, 0.0, 0.0), Vector3::new(6.5, 1.0, 1.0));
        let mut hits = bvh.query(&query);
        hits.sort_unstable();
        assert_eq!(hits, vec![2, 3]);
    }

    #[test]
    fn test_refit_moves_item() {
        let items: Vec<(usize, Aabb)> =
            (0..4).map(|i| (i, unit_box_at(i as f64 * 10.0))).collect();
        let mut bvh = Bvh::build(&items);

        let probe = Aabb::new(
            Vector3::new(100.0, 0.0, 0.0),
            Vector3::new(101.0, 1.0, 1.0),
        );
        assert!(bvh.query(&probe).is_empty());

        bvh.refit(2, probe);
        assert_eq!(bvh.query(&probe), vec![2]);
        // The old location no longer reports item 2.
        assert!(!bvh.query(&unit_box_at(20.0)).contains(&2));
    }

    #[test]
    fn test_overlapping_pairs_deterministic() {
        let items = vec![
            (0, unit_box_at(0.0)),
            (1, unit_box_at(0.5)),
            (2, unit_box_at(10.0)),
            (3, unit_box_at(10.5)),
        ];
        let bvh = Bvh::build(&items);
        assert_eq!(bvh.overlapping_pairs(), vec![(0, 1), (2, 3)]);
        // Replay yields the identical sequence.
        assert_eq!(Bvh::build(&items).overlapping_pairs(), vec![(0, 1), (2, 3)]);
    }

    #[test]
    fn test_no_pruning_false_negatives() {
        // Every brute-force overlapping pair is found through the tree.
        let items: Vec<(usize, Aabb)> = (0..16)
            .map(|i| (i, unit_box_at((i as f64 * 0.7) % 5.0)))
            .collect();
        let bvh = Bvh::build(&items);
        let tree_pairs = bvh.overlapping_pairs();
        for i in 0..items.len() {
            for j in (i + 1)..items.len() {
                if items[i].1.intersects(&items[j].1) {
                    assert!(
                        tree_pairs.contains(&(i, j)),
                        "missing pair ({i}, {j})"
                    );
                }
            }
        }
    }
}
