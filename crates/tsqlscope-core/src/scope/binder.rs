//! Walks a script once, populating a [`ScopeStack`] and recording the binding
//! of every table source it meets

use indexmap::IndexMap;

use super::{Registration, ScopeGuard, ScopeStack, SourceKind, TableBinding};
use crate::analyzer::database::DatabaseMarkers;
use crate::settings::AnalysisSettings;
use crate::syntax::{Identifier, MultiPartName, NodeId, NodeKind, SyntaxTree};
use crate::tree::ParentIndex;

/// Result of binding one script
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    /// Table source node -> binding, in traversal order
    by_node: IndexMap<NodeId, TableBinding>,
    /// Table sources whose key was already taken in their scope
    duplicates: Vec<NodeId>,
    /// Bindings left in the session scope at the end of the script
    session: Vec<TableBinding>,
}

impl Bindings {
    pub fn get(&self, node: NodeId) -> Option<&TableBinding> {
        self.by_node.get(&node)
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &TableBinding)> {
        self.by_node.iter().map(|(&node, binding)| (node, binding))
    }

    pub fn duplicates(&self) -> &[NodeId] {
        &self.duplicates
    }

    pub fn session(&self) -> &[TableBinding] {
        &self.session
    }

    pub fn len(&self) -> usize {
        self.by_node.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_node.is_empty()
    }
}

/// Bind every table source of `tree`.
///
/// Each statement and each query specification gets its own scope; the FROM
/// clause of a query specification is bound before its select list and
/// predicates, so CTE classification sees the scopes that enclose the query.
pub fn bind(
    tree: &SyntaxTree,
    parents: &ParentIndex,
    markers: &DatabaseMarkers,
    settings: &AnalysisSettings,
) -> Bindings {
    let mut binder = Binder {
        tree,
        parents,
        markers,
        settings,
        stack: ScopeStack::new(settings.duplicate_alias),
        bindings: Bindings::default(),
    };
    binder.visit(parents.root());

    let session = binder.stack.session_bindings().into_iter().cloned().collect();
    let mut bindings = binder.bindings;
    bindings.session = session;
    tracing::debug!(
        bindings = bindings.len(),
        duplicates = bindings.duplicates.len(),
        "bound table sources"
    );
    bindings
}

struct Binder<'a> {
    tree: &'a SyntaxTree,
    parents: &'a ParentIndex,
    markers: &'a DatabaseMarkers,
    settings: &'a AnalysisSettings,
    stack: ScopeStack,
    bindings: Bindings,
}

impl AsMut<ScopeStack> for Binder<'_> {
    fn as_mut(&mut self) -> &mut ScopeStack {
        &mut self.stack
    }
}

impl<'a> Binder<'a> {
    fn in_scope(&mut self, f: impl FnOnce(&mut Self)) {
        let mut scope = ScopeGuard::enter(self);
        f(&mut *scope);
    }

    fn children(&self, node: NodeId) -> &'a [NodeId] {
        self.parents.children_of(node)
    }

    fn kind(&self, node: NodeId) -> &'a NodeKind {
        self.tree.kind(node)
    }

    fn visit_children(&mut self, node: NodeId) {
        for &child in self.children(node) {
            self.visit(child);
        }
    }

    fn visit(&mut self, node: NodeId) {
        match self.kind(node) {
            NodeKind::SelectStatement { into } => self.in_scope(|b| {
                b.visit_children(node);
                if let Some(into) = into {
                    b.bind_select_into(node, into);
                }
            }),
            NodeKind::InsertStatement
            | NodeKind::UpdateStatement
            | NodeKind::DeleteStatement
            | NodeKind::MergeStatement => self.in_scope(|b| b.visit_children(node)),
            NodeKind::CommonTableExpression { name, .. } => {
                // registered before the body so recursive references classify as CTE
                self.stack.register_cte(&name.value);
                self.in_scope(|b| b.visit_children(node));
            }
            NodeKind::QuerySpecification => self.in_scope(|b| b.query_specification(node)),
            NodeKind::InsertSpecification => self.insert_specification(node),
            NodeKind::UpdateSpecification | NodeKind::DeleteSpecification => {
                self.update_or_delete_specification(node)
            }
            NodeKind::MergeSpecification { alias } => self.merge_specification(node, alias.as_ref()),
            NodeKind::FromClause => self.from_clause(node),
            kind if kind.is_table_source() => self.bind_source(node),
            _ => self.visit_children(node),
        }
    }

    fn query_specification(&mut self, node: NodeId) {
        let children = self.children(node);
        for &child in children {
            if matches!(self.kind(child), NodeKind::FromClause) {
                self.from_clause(child);
            }
        }
        for &child in children {
            if !matches!(self.kind(child), NodeKind::FromClause) {
                self.visit(child);
            }
        }
    }

    fn from_clause(&mut self, node: NodeId) {
        for &source in self.children(node) {
            self.bind_source(source);
        }
    }

    fn insert_specification(&mut self, node: NodeId) {
        let Some((&target, rest)) = self.children(node).split_first() else {
            return;
        };
        self.bind_source(target);
        for &child in rest {
            self.visit(child);
        }
    }

    /// FROM first, then the target; a bare target naming a FROM source reuses its binding
    fn update_or_delete_specification(&mut self, node: NodeId) {
        let Some((&target, rest)) = self.children(node).split_first() else {
            return;
        };
        for &child in rest {
            if matches!(self.kind(child), NodeKind::FromClause) {
                self.from_clause(child);
            }
        }

        let existing = match self.kind(target) {
            NodeKind::NamedTableReference { name, alias: None } if name.is_single() => self
                .stack
                .find_in_current(name.object_name())
                .cloned(),
            _ => None,
        };
        match existing {
            Some(binding) => {
                self.bindings.by_node.insert(target, binding);
            }
            None => self.bind_source(target),
        }

        for &child in rest {
            if !matches!(self.kind(child), NodeKind::FromClause) {
                self.visit(child);
            }
        }
    }

    fn merge_specification(&mut self, node: NodeId, alias: Option<&Identifier>) {
        let children = self.children(node);
        let Some((&target, rest)) = children.split_first() else {
            return;
        };

        match self.kind(target) {
            NodeKind::NamedTableReference { name, .. } => {
                let binding = self.named_binding(target, name, alias);
                let key = alias.map_or_else(|| name.to_string(), |a| a.value.clone());
                self.record(target, &key, binding);
            }
            _ => self.bind_source(target),
        }

        if let Some((&source, rest)) = rest.split_first() {
            self.bind_source(source);
            for &child in rest {
                self.visit(child);
            }
        }
    }

    fn bind_source(&mut self, node: NodeId) {
        match self.kind(node) {
            NodeKind::NamedTableReference { name, alias } => {
                let binding = self.named_binding(node, name, alias.as_ref());
                self.record(node, &key_for(name, alias.as_ref()), binding);
            }
            NodeKind::DerivedTable { alias } => {
                let object = alias.as_ref().map(|a| a.value.clone()).unwrap_or_default();
                let binding = self
                    .binding(node, None, object.clone(), SourceKind::DerivedTable)
                    .with_alias(alias.as_ref().map(|a| a.value.clone()));
                self.record(node, &object, binding);
                self.visit_children(node);
            }
            NodeKind::TableFunction { name, alias } => {
                let binding = self
                    .binding(node, Some(name), name.object_name().to_string(), SourceKind::Other)
                    .with_alias(alias.as_ref().map(|a| a.value.clone()));
                self.record(node, &key_for(name, alias.as_ref()), binding);
                self.visit_children(node);
            }
            NodeKind::VariableTableReference { variable, alias } => {
                let binding = self
                    .binding(node, None, variable.clone(), SourceKind::Other)
                    .with_alias(alias.as_ref().map(|a| a.value.clone()));
                let key = alias.as_ref().map_or(variable.as_str(), |a| a.value.as_str());
                self.record(node, key, binding);
            }
            NodeKind::QualifiedJoin { .. } | NodeKind::UnqualifiedJoin { .. } => {
                let children = self.children(node);
                for (idx, &child) in children.iter().enumerate() {
                    if idx < 2 {
                        self.bind_source(child);
                    } else {
                        self.visit(child);
                    }
                }
            }
            _ => self.visit(node),
        }
    }

    fn named_binding(
        &self,
        node: NodeId,
        name: &MultiPartName,
        alias: Option<&Identifier>,
    ) -> TableBinding {
        let object = name.object_name();
        let alias = alias.map(|a| a.value.clone());
        let temp = name.is_single() && self.settings.is_temp_table(object);
        if let Some(created) = self.stack.find_in_session(object).filter(|_| temp) {
            tracing::trace!(table = %object, "temp table created earlier in the script");
            return created.clone().with_alias(alias);
        }

        let kind = if temp {
            SourceKind::TempTable
        } else if name.is_single() && self.stack.is_cte(object) {
            SourceKind::CommonTableExpression
        } else {
            SourceKind::TableOrView
        };
        self.binding(node, Some(name), object.to_string(), kind)
            .with_alias(alias)
    }

    /// Database and schema come from the name when written, else from context
    fn binding(
        &self,
        node: NodeId,
        name: Option<&MultiPartName>,
        object: String,
        kind: SourceKind,
    ) -> TableBinding {
        let database = name
            .and_then(MultiPartName::database)
            .map(|d| d.value.clone())
            .or_else(|| {
                self.markers
                    .database_of(self.parents, node)
                    .map(str::to_string)
            })
            .unwrap_or_else(|| self.settings.default_database.clone());
        let schema = name
            .and_then(MultiPartName::schema)
            .map(|s| s.value.clone())
            .unwrap_or_else(|| self.settings.default_schema.clone());
        TableBinding::new(database, schema, object, kind)
    }

    fn record(&mut self, node: NodeId, key: &str, binding: TableBinding) {
        if self.stack.register(key, binding.clone()) == Registration::Duplicate {
            self.bindings.duplicates.push(node);
        }
        self.bindings.by_node.insert(node, binding);
    }

    /// `SELECT ... INTO #t` makes `#t` visible to the rest of the script
    fn bind_select_into(&mut self, statement: NodeId, into: &MultiPartName) {
        let object = into.object_name();
        if into.is_single() && self.settings.is_temp_table(object) {
            let binding = self.binding(statement, Some(into), object.to_string(), SourceKind::TempTable);
            tracing::trace!(table = %object, "temp table created by SELECT INTO");
            self.stack.register_session(&into.to_string(), binding);
        }
    }
}

fn key_for(name: &MultiPartName, alias: Option<&Identifier>) -> String {
    alias.map_or_else(|| name.to_string(), |a| a.value.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::parse_script;
    use pretty_assertions::assert_eq;

    fn bind_sql(sql: &str) -> (SyntaxTree, Bindings) {
        let tree = parse_script(sql).expect("valid sql");
        let parents = ParentIndex::build(&tree);
        let markers = DatabaseMarkers::collect(&tree, &parents);
        let bindings = bind(&tree, &parents, &markers, &AnalysisSettings::default());
        (tree, bindings)
    }

    fn kinds_of(tree: &SyntaxTree, bindings: &Bindings, object: &str) -> Vec<SourceKind> {
        bindings
            .iter()
            .filter(|(node, _)| {
                matches!(tree.kind(*node), NodeKind::NamedTableReference { name, .. } if name.object_name() == object)
            })
            .map(|(_, binding)| binding.kind)
            .collect()
    }

    #[test]
    fn test_classifies_sources() {
        let (tree, bindings) = bind_sql(
            "SELECT * FROM dbo.Orders o \
             JOIN #staging s ON s.id = o.id \
             JOIN (SELECT id FROM Customers) c ON c.id = o.customer_id \
             CROSS APPLY dbo.Lines(o.id) l",
        );

        assert_eq!(kinds_of(&tree, &bindings, "Orders"), vec![SourceKind::TableOrView]);
        assert_eq!(kinds_of(&tree, &bindings, "#staging"), vec![SourceKind::TempTable]);
        assert_eq!(kinds_of(&tree, &bindings, "Customers"), vec![SourceKind::TableOrView]);

        let kinds: Vec<SourceKind> = bindings.iter().map(|(_, b)| b.kind).collect();
        assert!(kinds.contains(&SourceKind::DerivedTable));
        assert!(kinds.contains(&SourceKind::Other));
    }

    #[test]
    fn test_cte_classified_in_nested_from() {
        let (tree, bindings) = bind_sql(
            "WITH recent AS (SELECT id FROM Orders) \
             SELECT * FROM Customers c WHERE c.id IN (SELECT r.id FROM recent r)",
        );
        assert_eq!(
            kinds_of(&tree, &bindings, "recent"),
            vec![SourceKind::CommonTableExpression]
        );
        assert_eq!(kinds_of(&tree, &bindings, "Orders"), vec![SourceKind::TableOrView]);
    }

    #[test]
    fn test_cte_not_visible_to_next_statement() {
        let (tree, bindings) = bind_sql(
            "WITH recent AS (SELECT id FROM Orders) SELECT * FROM recent;\nSELECT * FROM recent",
        );
        assert_eq!(
            kinds_of(&tree, &bindings, "recent"),
            vec![SourceKind::CommonTableExpression, SourceKind::TableOrView]
        );
    }

    #[test]
    fn test_select_into_temp_table_reaches_session() {
        let (tree, bindings) =
            bind_sql("SELECT id INTO #recent FROM Orders\nSELECT * FROM #recent");
        assert_eq!(kinds_of(&tree, &bindings, "#recent"), vec![SourceKind::TempTable]);
        assert_eq!(bindings.session().len(), 1);
        assert_eq!(bindings.session()[0].object, "#recent");
    }

    #[test]
    fn test_temp_table_reference_reuses_session_binding() {
        let (tree, bindings) = bind_sql(
            "SELECT id INTO #recent FROM Orders\nGO\nUSE Sales\nGO\nSELECT r.id FROM #recent r",
        );
        let reference = tree
            .ids()
            .find(|&id| {
                matches!(tree.kind(id), NodeKind::NamedTableReference { name, .. } if name.object_name() == "#recent")
            })
            .expect("temp table reference");
        let binding = bindings.get(reference).expect("bound reference");
        assert_eq!(binding.kind, SourceKind::TempTable);
        assert_eq!(binding.database, "master");
        assert_eq!(binding.alias.as_deref(), Some("r"));
    }

    #[test]
    fn test_duplicate_alias_recorded() {
        let (tree, bindings) =
            bind_sql("SELECT * FROM Orders o JOIN Customers o ON o.id = o.id");
        assert_eq!(bindings.duplicates().len(), 1);
        let duplicate = bindings.duplicates()[0];
        assert!(matches!(
            tree.kind(duplicate),
            NodeKind::NamedTableReference { name, .. } if name.object_name() == "Customers"
        ));
    }

    #[test]
    fn test_same_alias_in_sibling_subqueries_is_not_duplicate() {
        let (_, bindings) = bind_sql(
            "SELECT * FROM (SELECT id FROM Orders x) a JOIN (SELECT id FROM Customers x) b ON a.id = b.id",
        );
        assert!(bindings.duplicates().is_empty());
    }

    #[test]
    fn test_update_alias_target_reuses_from_binding() {
        let (tree, bindings) =
            bind_sql("UPDATE o SET o.total = 0 FROM dbo.Orders o WHERE o.id = 1");
        let target = tree
            .ids()
            .find(|&id| {
                matches!(tree.kind(id), NodeKind::NamedTableReference { name, alias: None } if name.object_name() == "o")
            })
            .expect("update target");
        let binding = bindings.get(target).expect("bound target");
        assert_eq!(binding.object, "Orders");
        assert_eq!(binding.alias.as_deref(), Some("o"));
        assert!(bindings.duplicates().is_empty());
    }

    #[test]
    fn test_database_from_use_and_name() {
        let (tree, bindings) =
            bind_sql("USE Sales\nGO\nSELECT * FROM Orders JOIN Archive.dbo.Orders2 ON 1 = 1");
        let databases: Vec<(String, String)> = bindings
            .iter()
            .filter(|(node, _)| matches!(tree.kind(*node), NodeKind::NamedTableReference { .. }))
            .map(|(_, b)| (b.object.clone(), b.database.clone()))
            .collect();
        assert_eq!(
            databases,
            vec![
                ("Orders".to_string(), "Sales".to_string()),
                ("Orders2".to_string(), "Archive".to_string()),
            ]
        );
    }
}
