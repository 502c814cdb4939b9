use crate::error::TreeError;
use crate::shape::Vertices;

use ndarray::Array2;

/// Single node of a [Tree]
///
/// `vertices` and `vectors` start empty and are bound by the
/// reconstruction pipeline: observed data at the tips, reconstructed data
/// at the internal nodes.
#[derive(Clone, Debug)]
pub struct Node {
    pub name: String,
    pub parent: Option<usize>,
    /// Branch length to the parent, meaningless for the root
    pub dist: f64,
    pub vertices: Option<Vertices<f64>>,
    pub vectors: Option<Array2<f64>>,
}

impl Node {
    #[inline]
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

/// Index-addressed phylogenetic tree
///
/// Nodes are addressed by a stable integer index: `[0, ntips)` are tips,
/// `[ntips, nnodes)` are internal nodes and the root is the last index.
/// The tree owns no file-format knowledge, it is constructed from an
/// explicit parent table.
#[derive(Clone, Debug)]
pub struct Tree {
    nodes: Vec<Node>,
    ntips: usize,
    traversal: Vec<usize>,
}

impl Tree {
    /// Build a tree from per-node names, parent indices and branch lengths
    ///
    /// Exactly one node must have no parent (the root), the root must be
    /// the last index, childless nodes must occupy the leading index block
    /// and every non-root branch length must be finite and non-negative.
    pub fn from_parents(
        names: Vec<String>,
        parents: Vec<Option<usize>>,
        dists: Vec<f64>,
    ) -> Result<Self, TreeError> {
        let nnodes = names.len();
        if parents.len() != nnodes || dists.len() != nnodes {
            return Err(TreeError::InputLengthMismatch);
        }
        if nnodes < 3 {
            return Err(TreeError::TooFewNodes { nnodes });
        }

        let roots: Vec<_> = (0..nnodes).filter(|&id| parents[id].is_none()).collect();
        let root = match roots[..] {
            [root] => root,
            _ => return Err(TreeError::RootCount { found: roots.len() }),
        };
        if root != nnodes - 1 {
            return Err(TreeError::RootNotLast { index: root });
        }

        let mut children = vec![Vec::new(); nnodes];
        for (index, &parent) in parents.iter().enumerate() {
            let Some(parent) = parent else { continue };
            if parent >= nnodes {
                return Err(TreeError::ParentOutOfRange {
                    index,
                    parent,
                    nnodes,
                });
            }
            children[parent].push(index);
            if !dists[index].is_finite() || dists[index] < 0.0 {
                return Err(TreeError::InvalidBranchLength { index });
            }
        }

        let ntips = children.iter().filter(|c| c.is_empty()).count();
        for (index, c) in children.iter().enumerate().skip(ntips) {
            if c.is_empty() {
                return Err(TreeError::LeafIndexOrder { index });
            }
        }

        // Preorder, children visited in ascending index order.
        let mut traversal = Vec::with_capacity(nnodes);
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            traversal.push(id);
            stack.extend(children[id].iter().rev());
        }
        if traversal.len() != nnodes {
            let seen: Vec<bool> = {
                let mut seen = vec![false; nnodes];
                traversal.iter().for_each(|&id| seen[id] = true);
                seen
            };
            // At least one node is missing here
            let index = seen.iter().position(|&s| !s).unwrap_or(0);
            return Err(TreeError::Unreachable { index });
        }

        let nodes = names
            .into_iter()
            .zip(parents)
            .zip(dists)
            .map(|((name, parent), dist)| Node {
                name,
                parent,
                dist,
                vertices: None,
                vectors: None,
            })
            .collect();

        Ok(Self {
            nodes,
            ntips,
            traversal,
        })
    }

    #[inline]
    pub fn nnodes(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn ntips(&self) -> usize {
        self.ntips
    }

    /// Number of internal (ancestral) nodes, the root included
    #[inline]
    pub fn nancestral(&self) -> usize {
        self.nnodes() - self.ntips
    }

    #[inline]
    pub fn root(&self) -> usize {
        self.nnodes() - 1
    }

    /// Deterministic root-to-tips node order
    pub fn traverse(&self) -> impl Iterator<Item = usize> + '_ {
        self.traversal.iter().copied()
    }
}

impl std::ops::Index<usize> for Tree {
    type Output = Node;

    fn index(&self, id: usize) -> &Self::Output {
        &self.nodes[id]
    }
}

impl std::ops::IndexMut<usize> for Tree {
    fn index_mut(&mut self, id: usize) -> &mut Self::Output {
        &mut self.nodes[id]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::quartet_tree;

    #[test]
    fn traversal_covers_all_nodes_root_first() {
        let tree = quartet_tree();
        let order: Vec<_> = tree.traverse().collect();
        assert_eq!(order.len(), tree.nnodes());
        assert_eq!(order[0], tree.root());
        let mut sorted = order.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..tree.nnodes()).collect::<Vec<_>>());
    }

    #[test]
    fn parents_precede_children_in_traversal() {
        let tree = quartet_tree();
        let order: Vec<_> = tree.traverse().collect();
        for (rank, &id) in order.iter().enumerate() {
            if let Some(parent) = tree[id].parent {
                let parent_rank = order.iter().position(|&x| x == parent).unwrap();
                assert!(parent_rank < rank, "parent {parent} after child {id}");
            }
        }
    }

    #[test]
    fn rejects_double_root() {
        let err = Tree::from_parents(
            vec!["a".into(), "b".into(), "r".into()],
            vec![Some(2), None, None],
            vec![1.0, 1.0, 0.0],
        )
        .unwrap_err();
        assert_eq!(err, TreeError::RootCount { found: 2 });
    }

    #[test]
    fn rejects_leaf_after_internal_node() {
        // Node 2 is internal (parent of 0) but 3 is a childless non-tip slot.
        let err = Tree::from_parents(
            vec!["a".into(), "b".into(), "c".into(), "x".into(), "r".into()],
            vec![Some(2), Some(4), Some(4), Some(4), None],
            vec![1.0, 1.0, 1.0, 1.0, 0.0],
        )
        .unwrap_err();
        assert!(matches!(err, TreeError::LeafIndexOrder { .. }));
    }

    #[test]
    fn rejects_negative_branch_length() {
        let err = Tree::from_parents(
            vec!["a".into(), "b".into(), "r".into()],
            vec![Some(2), Some(2), None],
            vec![1.0, -0.5, 0.0],
        )
        .unwrap_err();
        assert_eq!(err, TreeError::InvalidBranchLength { index: 1 });
    }
}
