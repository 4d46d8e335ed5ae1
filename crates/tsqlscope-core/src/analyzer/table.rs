//! Table reference resolution

use crate::scope::{Bindings, SourceKind, TableBinding};
use crate::syntax::{NodeId, NodeKind, SyntaxTree};

/// Answers "which table does this table reference name?" from the bindings
/// recorded by the shared population pass. Resolution never walks the tree.
#[derive(Debug, Clone, Copy)]
pub struct TableResolver<'m> {
    tree: &'m SyntaxTree,
    bindings: &'m Bindings,
}

impl<'m> TableResolver<'m> {
    pub fn new(tree: &'m SyntaxTree, bindings: &'m Bindings) -> Self {
        Self { tree, bindings }
    }

    /// Binding of a table source; `None` when the node was never registered,
    /// which callers treat as an unresolved reference
    pub fn resolve(&self, node: NodeId) -> Option<&'m TableBinding> {
        let binding = self.bindings.get(node);
        if binding.is_none() && self.tree.kind(node).is_table_source() {
            tracing::trace!(node = node.index(), "table source without binding");
        }
        binding
    }

    /// Named table references bound to catalog objects, in traversal order
    pub fn catalog_references(&self) -> impl Iterator<Item = (NodeId, &'m TableBinding)> + 'm {
        let tree = self.tree;
        self.bindings.iter().filter(move |(node, binding)| {
            binding.kind == SourceKind::TableOrView
                && matches!(tree.kind(*node), NodeKind::NamedTableReference { .. })
        })
    }

    pub fn duplicates(&self) -> &'m [NodeId] {
        self.bindings.duplicates()
    }
}
