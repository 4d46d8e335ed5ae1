//! Current database at a position in a script

use crate::syntax::{NodeId, NodeKind, SyntaxTree};
use crate::tree::ParentIndex;

/// `USE` statements of one script, in script order.
///
/// A `USE` applies from its position to the end of the script regardless of
/// nesting, so the database of any node is the nearest preceding marker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatabaseMarkers {
    /// (script position, database name), ascending by position
    markers: Vec<(usize, String)>,
}

impl DatabaseMarkers {
    /// Forward scan over the top-level statements
    pub fn collect(tree: &SyntaxTree, parents: &ParentIndex) -> Self {
        let markers = tree
            .top_level_statements()
            .into_iter()
            .filter_map(|stmt| match tree.kind(stmt) {
                NodeKind::Use { database } => parents
                    .position(stmt)
                    .map(|position| (position, database.value.clone())),
                _ => None,
            })
            .collect();
        Self::from_markers(markers)
    }

    pub fn from_markers(mut markers: Vec<(usize, String)>) -> Self {
        markers.sort_by_key(|(position, _)| *position);
        Self { markers }
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    /// Database set by the nearest `USE` before `position`
    pub fn database_at(&self, position: usize) -> Option<&str> {
        let idx = self.markers.partition_point(|(marker, _)| *marker < position);
        idx.checked_sub(1)
            .and_then(|i| self.markers.get(i))
            .map(|(_, database)| database.as_str())
    }

    pub fn database_of(&self, parents: &ParentIndex, node: NodeId) -> Option<&str> {
        parents
            .position(node)
            .and_then(|position| self.database_at(position))
    }
}
