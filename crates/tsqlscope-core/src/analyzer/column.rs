//! Column reference resolution
//!
//! A column reference is resolved by walking up from it to the nearest node
//! that brings tables into scope: a join, a FROM clause, a query
//! specification or a DML specification. Statements are boundaries; nothing
//! above the enclosing statement is considered.

use std::collections::HashSet;

use thiserror::Error;

use super::ScriptModel;
use crate::error::{Issue, IssueKind, IssueSink};
use crate::scope::SourceKind;
use crate::syntax::{Identifier, NodeId, NodeKind};

/// Where a column reference's value comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnResolution {
    pub database: String,
    pub schema: String,
    pub table: String,
    pub column: String,
    pub kind: SourceKind,
    /// Table source the column was matched to
    pub source: NodeId,
}

/// Why a column reference could not be resolved
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Unresolved {
    #[error("column '{0}' needs a table alias: more than one table is in scope")]
    AliasRequired(String),
    #[error("no table or alias named '{0}' is in scope")]
    AliasNotFound(String),
    #[error("no table is in scope")]
    NoTableInScope,
    #[error("node is not a column reference")]
    NotAColumn,
}

/// Outcome of matching against one scope-bearing node
enum Step {
    Found(ColumnResolution),
    /// Stop walking: the reference cannot be resolved
    Fail(Unresolved),
    /// The qualifier is unknown here; an enclosing query may still define it
    NotHere,
}

pub struct ColumnResolver<'m, 's> {
    model: &'m ScriptModel<'m>,
    sink: &'s mut dyn IssueSink,
    /// Ambiguous references already reported
    reported: HashSet<NodeId>,
}

impl<'m, 's> ColumnResolver<'m, 's> {
    pub fn new(model: &'m ScriptModel<'m>, sink: &'s mut dyn IssueSink) -> Self {
        Self {
            model,
            sink,
            reported: HashSet::new(),
        }
    }

    /// Resolve a column reference. An ambiguous reference is reported to the
    /// sink, at most once per node; every other failure is silent.
    pub fn resolve(&mut self, node: NodeId) -> Option<ColumnResolution> {
        match self.try_resolve(node) {
            Ok(resolution) => Some(resolution),
            Err(Unresolved::AliasRequired(column)) => {
                if self.reported.insert(node) {
                    self.report_ambiguous(node, &column);
                }
                None
            }
            Err(reason) => {
                tracing::trace!(node = node.index(), %reason, "column unresolved");
                None
            }
        }
    }

    /// Resolve without reporting
    pub fn try_resolve(&self, node: NodeId) -> Result<ColumnResolution, Unresolved> {
        let NodeKind::ColumnReference { parts } = self.model.tree().kind(node) else {
            return Err(Unresolved::NotAColumn);
        };
        let Some((column, rest)) = parts.split_last() else {
            return Err(Unresolved::NotAColumn);
        };
        // `db.schema.table.column`: the part before the column names the table
        let reference = Reference {
            node,
            qualifier: rest.last(),
            column: &column.value,
        };
        let tree = self.model.tree();
        let parents = self.model.parents();

        let mut child = node;
        let mut not_found = false;
        for ancestor in parents.ancestors(node) {
            let step = match tree.kind(ancestor) {
                NodeKind::QualifiedJoin { .. } | NodeKind::UnqualifiedJoin { .. } => {
                    self.match_sources(&[ancestor], &reference)
                }
                NodeKind::FromClause => self.match_sources(parents.children_of(ancestor), &reference),
                NodeKind::QuerySpecification => self.query_specification(ancestor, &reference),
                NodeKind::UpdateSpecification | NodeKind::DeleteSpecification => {
                    self.dml_specification(ancestor, &reference)
                }
                NodeKind::InsertSpecification => self.insert_specification(ancestor, &reference),
                NodeKind::MergeSpecification { alias } => {
                    self.merge_specification(ancestor, alias.as_ref(), &reference)
                }
                NodeKind::SelectStatement { .. }
                    if matches!(tree.kind(child), NodeKind::OrderByClause) =>
                {
                    match query_specification_of(self.model, ancestor) {
                        Some(spec) if reference.qualifier.is_some() => {
                            self.query_specification(spec, &reference)
                        }
                        // unqualified ORDER BY names may be select-list aliases
                        _ => Step::Fail(Unresolved::NoTableInScope),
                    }
                }
                kind if kind.is_statement_boundary() => break,
                _ => Step::NotHere,
            };

            match step {
                Step::Found(resolution) => return Ok(resolution),
                Step::Fail(reason) => return Err(reason),
                Step::NotHere => {
                    not_found |= self.brings_scope(ancestor);
                }
            }
            child = ancestor;
        }

        match (not_found, reference.qualifier) {
            (true, Some(qualifier)) => Err(Unresolved::AliasNotFound(qualifier.value.clone())),
            _ => Err(Unresolved::NoTableInScope),
        }
    }

    fn brings_scope(&self, node: NodeId) -> bool {
        let kind = self.model.tree().kind(node);
        kind.is_join()
            || matches!(
                kind,
                NodeKind::FromClause
                    | NodeKind::QuerySpecification
                    | NodeKind::UpdateSpecification
                    | NodeKind::DeleteSpecification
                    | NodeKind::MergeSpecification { .. }
            )
    }

    fn query_specification(&self, spec: NodeId, reference: &Reference<'_>) -> Step {
        let parents = self.model.parents();
        let from = parents
            .children_of(spec)
            .iter()
            .copied()
            .find(|&child| matches!(self.model.tree().kind(child), NodeKind::FromClause));
        match from {
            Some(from) => self.match_sources(parents.children_of(from), reference),
            // SELECT without FROM: an enclosing query may still supply a correlated table
            None if reference.qualifier.is_some() => Step::NotHere,
            None => Step::Fail(Unresolved::NoTableInScope),
        }
    }

    /// FROM first, then the target; SET targets belong to the target
    fn dml_specification(&self, spec: NodeId, reference: &Reference<'_>) -> Step {
        let parents = self.model.parents();
        let Some((&target, rest)) = parents.children_of(spec).split_first() else {
            return Step::Fail(Unresolved::NoTableInScope);
        };
        if self.is_target_column(reference.node) {
            return self.found(target, reference);
        }

        let from = rest
            .iter()
            .copied()
            .find(|&child| matches!(self.model.tree().kind(child), NodeKind::FromClause));
        if let Some(from) = from {
            match self.match_sources(parents.children_of(from), reference) {
                Step::NotHere => {}
                step => return step,
            }
        }

        match reference.qualifier {
            None => self.found(target, reference),
            Some(qualifier) if self.matches(target, qualifier) => {
                self.found(target, reference)
            }
            Some(_) => Step::NotHere,
        }
    }

    /// Only the column list of an INSERT resolves here; the source query has its own scope
    fn insert_specification(&self, spec: NodeId, reference: &Reference<'_>) -> Step {
        let target = self.model.parents().children_of(spec).first().copied();
        match target {
            Some(target) if self.is_target_column(reference.node) => self.found(target, reference),
            _ => Step::Fail(Unresolved::NoTableInScope),
        }
    }

    /// The statement-level alias names the target; the tree itself is left untouched
    fn merge_specification(
        &self,
        spec: NodeId,
        alias: Option<&Identifier>,
        reference: &Reference<'_>,
    ) -> Step {
        let children = self.model.parents().children_of(spec);
        let (Some(&target), Some(&source)) = (children.first(), children.get(1)) else {
            return Step::Fail(Unresolved::NoTableInScope);
        };
        if self.is_target_column(reference.node) {
            return self.found(target, reference);
        }

        let Some(qualifier) = reference.qualifier else {
            return Step::Fail(Unresolved::AliasRequired(reference.column.to_string()));
        };
        if alias.is_some_and(|alias| alias.matches(&qualifier.value)) {
            self.found(target, reference)
        } else if self.matches(source, qualifier) {
            self.found(source, reference)
        } else {
            // the source may be a join
            self.match_sources(&[source], reference)
        }
    }

    /// Match against table sources in order, descending into joins
    fn match_sources(&self, sources: &[NodeId], reference: &Reference<'_>) -> Step {
        let mut candidates = Vec::new();
        for &source in sources {
            self.collect_candidates(source, &mut candidates);
        }
        if candidates.is_empty() {
            return Step::Fail(Unresolved::NoTableInScope);
        }

        match reference.qualifier {
            None if candidates.len() == 1 => self.found(candidates[0], reference),
            None => Step::Fail(Unresolved::AliasRequired(reference.column.to_string())),
            Some(qualifier) => candidates
                .iter()
                .copied()
                .find(|&candidate| self.matches(candidate, qualifier))
                .map_or(Step::NotHere, |candidate| self.found(candidate, reference)),
        }
    }

    fn collect_candidates(&self, source: NodeId, out: &mut Vec<NodeId>) {
        let kind = self.model.tree().kind(source);
        if kind.is_join() {
            // first and second side; a third child is the ON condition
            for &side in self.model.parents().children_of(source).iter().take(2) {
                self.collect_candidates(side, out);
            }
        } else if kind.is_table_source() {
            out.push(source);
        }
    }

    /// Whether `qualifier` names `source`. Only an alias can be named; a
    /// source without one never matches and the next candidate is tried.
    fn matches(&self, source: NodeId, qualifier: &Identifier) -> bool {
        let alias = match self.model.tree().kind(source) {
            NodeKind::NamedTableReference { alias, .. }
            | NodeKind::TableFunction { alias, .. }
            | NodeKind::DerivedTable { alias }
            | NodeKind::VariableTableReference { alias, .. } => alias.as_ref(),
            _ => None,
        };
        alias.is_some_and(|alias| alias.matches(&qualifier.value))
    }

    fn found(&self, source: NodeId, reference: &Reference<'_>) -> Step {
        match self.model.table_resolver().resolve(source) {
            Some(binding) => Step::Found(ColumnResolution {
                database: binding.database.clone(),
                schema: binding.schema.clone(),
                table: binding.object.clone(),
                column: reference.column.to_string(),
                kind: binding.kind,
                source,
            }),
            None => Step::Fail(Unresolved::NoTableInScope),
        }
    }

    /// SET targets and INSERT/MERGE column lists name columns of the DML target
    fn is_target_column(&self, node: NodeId) -> bool {
        let parents = self.model.parents();
        let Some(parent) = parents.parent_of(node) else {
            return false;
        };
        match self.model.tree().kind(parent) {
            NodeKind::ColumnList => true,
            NodeKind::SetClause => parents.children_of(parent).first() == Some(&node),
            _ => false,
        }
    }

    fn report_ambiguous(&mut self, node: NodeId, column: &str) {
        let model = self.model;
        let issue = Issue::error(
            IssueKind::AmbiguousColumn,
            format!("Column '{}' is ambiguous: more than one table is in scope", column),
        )
        .with_span(model.tree().node(node).span)
        .with_database(model.database_at(node))
        .with_file(model.script_path())
        .with_object(model.enclosing_object(node))
        .with_argument(column)
        .with_help("Qualify the column with a table alias");
        tracing::debug!(column, "ambiguous column reference");
        self.sink.report(issue);
    }
}

struct Reference<'a> {
    node: NodeId,
    qualifier: Option<&'a Identifier>,
    column: &'a str,
}

/// Leftmost query specification of a SELECT statement
fn query_specification_of(model: &ScriptModel<'_>, statement: NodeId) -> Option<NodeId> {
    let tree = model.tree();
    let parents = model.parents();
    let mut current = parents
        .children_of(statement)
        .iter()
        .copied()
        .find(|&child| {
            matches!(
                tree.kind(child),
                NodeKind::QuerySpecification | NodeKind::BinaryQueryExpression
            )
        })?;
    while matches!(tree.kind(current), NodeKind::BinaryQueryExpression) {
        current = parents.children_of(current).first().copied()?;
    }
    matches!(tree.kind(current), NodeKind::QuerySpecification).then_some(current)
}
