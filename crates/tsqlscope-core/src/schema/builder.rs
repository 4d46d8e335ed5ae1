//! Catalog builder - collects object definitions from parsed scripts

use crate::schema::{Catalog, Column, QualifiedName, Routine, Synonym, Table, View};
use crate::script::Script;
use crate::settings::AnalysisSettings;
use crate::syntax::{MultiPartName, NodeId, NodeKind, SyntaxTree};

/// Builder for the run-wide [`Catalog`].
///
/// Only top-level definition statements are collected. The database of an
/// object without a three-part name is the one set by the nearest preceding
/// `USE` in the same script.
pub struct CatalogBuilder<'a> {
    settings: &'a AnalysisSettings,
    catalog: Catalog,
    scripts: usize,
    skipped: usize,
}

impl<'a> CatalogBuilder<'a> {
    pub fn new(settings: &'a AnalysisSettings) -> Self {
        Self {
            settings,
            catalog: Catalog::new(),
            scripts: 0,
            skipped: 0,
        }
    }

    /// Add the definitions of one script; scripts that failed to parse are skipped
    pub fn add_script(&mut self, script: &Script) {
        match script.tree() {
            Some(tree) => self.add_tree(tree),
            None => {
                self.skipped += 1;
                tracing::debug!(path = %script.path().display(), "skipping unparsed script");
            }
        }
    }

    pub fn add_tree(&mut self, tree: &SyntaxTree) {
        self.scripts += 1;
        // forward scan: a USE applies to every later statement of the script
        let mut database = self.settings.default_database.clone();

        for statement in tree.top_level_statements() {
            match tree.kind(statement) {
                NodeKind::Use { database: db } => database = db.value.clone(),
                NodeKind::CreateTable { name } => {
                    let mut table = Table::new(self.qualify(name, &database));
                    for &child in tree.node(statement).children() {
                        if let NodeKind::ColumnDefinition { name, data_type } = tree.kind(child) {
                            table.columns.push(Column::new(&name.value, data_type.clone()));
                        }
                    }
                    self.catalog.add_table(table);
                }
                NodeKind::CreateView { name, columns } => {
                    let columns = if columns.is_empty() {
                        view_columns(tree, statement)
                    } else {
                        columns.iter().map(|c| c.value.clone()).collect()
                    };
                    self.catalog.add_view(View {
                        name: self.qualify(name, &database),
                        columns,
                    });
                }
                NodeKind::CreateProcedure { name, parameters } => {
                    self.catalog.add_procedure(Routine {
                        name: self.qualify(name, &database),
                        parameters: parameters.clone(),
                    });
                }
                NodeKind::CreateFunction { name, parameters } => {
                    self.catalog.add_function(Routine {
                        name: self.qualify(name, &database),
                        parameters: parameters.clone(),
                    });
                }
                NodeKind::CreateSynonym { name, target } => {
                    self.catalog.add_synonym(Synonym {
                        name: self.qualify(name, &database),
                        target: self.qualify(target, &database),
                    });
                }
                _ => {}
            }
        }
    }

    fn qualify(&self, name: &MultiPartName, database: &str) -> QualifiedName {
        QualifiedName::new(
            name.database().map_or(database, |d| d.value.as_str()),
            name.schema()
                .map_or(self.settings.default_schema.as_str(), |s| s.value.as_str()),
            name.object_name(),
        )
    }

    /// Consume the builder and return the catalog
    pub fn build(self) -> Catalog {
        tracing::debug!(
            scripts = self.scripts,
            skipped = self.skipped,
            objects = self.catalog.object_count(),
            "built catalog"
        );
        self.catalog
    }
}

impl Catalog {
    /// Build the catalog of a whole run in one pass over its scripts
    pub fn build(scripts: &[Script], settings: &AnalysisSettings) -> Catalog {
        let mut builder = CatalogBuilder::new(settings);
        for script in scripts {
            builder.add_script(script);
        }
        builder.build()
    }
}

/// Output column names of a view without an explicit column list: aliases,
/// else the referenced column's name. Unnamed expressions and `*` are skipped.
fn view_columns(tree: &SyntaxTree, view: NodeId) -> Vec<String> {
    let Some(spec) = first_query_specification(tree, view) else {
        return Vec::new();
    };

    tree.node(spec)
        .children()
        .iter()
        .filter_map(|&element| match tree.kind(element) {
            NodeKind::SelectScalarExpression { alias: Some(alias) } => Some(alias.value.clone()),
            NodeKind::SelectScalarExpression { alias: None } => {
                let value = tree.node(element).children().first()?;
                match tree.kind(*value) {
                    NodeKind::ColumnReference { parts } => parts.last().map(|p| p.value.clone()),
                    _ => None,
                }
            }
            _ => None,
        })
        .collect()
}

/// Leftmost query specification under a view: the first operand of a set operation names the columns
fn first_query_specification(tree: &SyntaxTree, node: NodeId) -> Option<NodeId> {
    let mut current = node;
    loop {
        let next = tree.node(current).children().iter().copied().find(|&child| {
            matches!(
                tree.kind(child),
                NodeKind::SelectStatement { .. }
                    | NodeKind::QuerySpecification
                    | NodeKind::BinaryQueryExpression
            )
        })?;
        if matches!(tree.kind(next), NodeKind::QuerySpecification) {
            return Some(next);
        }
        current = next;
    }
}
