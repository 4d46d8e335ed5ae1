//! Parent and ordered-children index over a [`SyntaxTree`]

use crate::syntax::{NodeId, SyntaxTree};

/// Parent/children relationships of one script, built once and never mutated.
///
/// Every node reachable from the root has exactly one parent (the root has
/// none). Children are listed in source order, each exactly once, even when the
/// tree repeats a child edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentIndex {
    root: NodeId,
    parents: Vec<Option<NodeId>>,
    children: Vec<Vec<NodeId>>,
    /// Preorder position, used as the node's position in script order
    positions: Vec<Option<usize>>,
}

impl ParentIndex {
    /// Build the index with an explicit stack, so deeply nested expressions
    /// cannot exhaust the call stack.
    pub fn build(tree: &SyntaxTree) -> Self {
        let len = tree.len();
        let mut parents = vec![None; len];
        let mut children: Vec<Vec<NodeId>> = vec![Vec::new(); len];
        let mut positions = vec![None; len];
        let mut visited = vec![false; len];
        let mut next_position = 0;

        let mut stack: Vec<(NodeId, Option<NodeId>)> = vec![(tree.root(), None)];
        while let Some((node, parent)) = stack.pop() {
            let Some(seen) = visited.get_mut(node.index()) else {
                continue;
            };
            if *seen {
                continue;
            }
            *seen = true;

            positions[node.index()] = Some(next_position);
            next_position += 1;
            if let Some(parent) = parent {
                parents[node.index()] = Some(parent);
                children[parent.index()].push(node);
            }

            // reversed so the first child is popped (and appended) first
            for &child in tree.node(node).children().iter().rev() {
                if !visited.get(child.index()).copied().unwrap_or(true) {
                    stack.push((child, Some(node)));
                }
            }
        }

        tracing::trace!(nodes = next_position, "built parent index");

        Self {
            root: tree.root(),
            parents,
            children,
            positions,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn parent_of(&self, node: NodeId) -> Option<NodeId> {
        self.parents.get(node.index()).copied().flatten()
    }

    pub fn children_of(&self, node: NodeId) -> &[NodeId] {
        self.children
            .get(node.index())
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Position of the node in script (preorder) order; `None` if unreachable from the root
    pub fn position(&self, node: NodeId) -> Option<usize> {
        self.positions.get(node.index()).copied().flatten()
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.position(node).is_some()
    }

    /// Ancestors from the parent up to the root
    pub fn ancestors(&self, node: NodeId) -> Ancestors<'_> {
        Ancestors {
            index: self,
            next: self.parent_of(node),
        }
    }
}

pub struct Ancestors<'a> {
    index: &'a ParentIndex,
    next: Option<NodeId>,
}

impl Iterator for Ancestors<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let current = self.next?;
        self.next = self.index.parent_of(current);
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::{parse_script, NodeKind, TreeBuilder};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parent_and_children_in_source_order() {
        let mut b = TreeBuilder::new();
        let first = b.column("a");
        let second = b.column("b");
        let third = b.column("c");
        let root = b.push(NodeKind::Expression, vec![first, second, third]);
        let tree = b.finish(root);

        let index = ParentIndex::build(&tree);
        assert_eq!(index.parent_of(root), None);
        assert_eq!(index.parent_of(second), Some(root));
        assert_eq!(index.children_of(root), &[first, second, third]);
        assert!(index.position(first) < index.position(third));
    }

    #[test]
    fn test_repeated_child_edges_are_visited_once() {
        let mut b = TreeBuilder::new();
        let shared = b.column("a");
        let other = b.column("b");
        let inner = b.push(NodeKind::Parenthesis, vec![shared]);
        let root = b.push(NodeKind::Expression, vec![shared, other, shared, inner]);
        let tree = b.finish(root);

        let index = ParentIndex::build(&tree);
        assert_eq!(index.children_of(root), &[shared, other, inner]);
        assert_eq!(index.parent_of(shared), Some(root));
        assert!(index.children_of(inner).is_empty());
    }

    #[test]
    fn test_build_is_idempotent() {
        let tree = parse_script(
            "SELECT o.id FROM orders o JOIN users u ON o.user_id = u.id WHERE u.active = 1",
        )
        .expect("valid sql");

        let first = ParentIndex::build(&tree);
        let second = ParentIndex::build(&tree);
        assert_eq!(first, second);

        for node in tree.ids().filter(|&id| first.contains(id)) {
            if let Some(parent) = first.parent_of(node) {
                let occurrences = first
                    .children_of(parent)
                    .iter()
                    .filter(|&&c| c == node)
                    .count();
                assert_eq!(occurrences, 1);
            }
        }
    }

    #[test]
    fn test_deep_nesting_does_not_overflow() {
        let mut b = TreeBuilder::new();
        let mut current = b.int(1);
        for _ in 0..200_000 {
            current = b.push(NodeKind::Parenthesis, vec![current]);
        }
        let tree = b.finish(current);

        let index = ParentIndex::build(&tree);
        let leaf = tree
            .ids()
            .find(|&id| matches!(tree.kind(id), NodeKind::Literal(_)))
            .expect("leaf");
        assert_eq!(index.ancestors(leaf).count(), 200_000);
        assert_eq!(index.ancestors(leaf).last(), Some(index.root()));
    }
}
