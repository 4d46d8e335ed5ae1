//! Per-script analysis on top of the shared catalog

mod column;
pub mod database;
mod table;

use crate::error::{Issue, IssueKind, IssueSink, Span};
use crate::flow::is_assigned_on_all_paths;
use crate::schema::Catalog;
use crate::scope::{bind, Bindings};
use crate::script::Script;
use crate::settings::AnalysisSettings;
use crate::syntax::{NodeId, NodeKind, SyntaxTree};
use crate::tree::ParentIndex;

pub use column::{ColumnResolution, ColumnResolver, Unresolved};
pub use database::DatabaseMarkers;
pub use table::TableResolver;

/// Schemas whose objects never appear in a script-built catalog
const SYSTEM_SCHEMAS: &[&str] = &["sys", "information_schema"];

/// Analyzer - resolves scripts against a catalog built beforehand.
///
/// The catalog is read-only, so one analyzer can be shared by threads that
/// analyze different scripts.
#[derive(Debug, Clone, Copy)]
pub struct Analyzer<'a> {
    catalog: &'a Catalog,
    settings: &'a AnalysisSettings,
}

impl<'a> Analyzer<'a> {
    pub fn new(catalog: &'a Catalog, settings: &'a AnalysisSettings) -> Self {
        Self { catalog, settings }
    }

    /// Build the per-script structures; `None` for a script that failed to parse
    pub fn model<'s>(&self, script: &'s Script) -> Option<ScriptModel<'s>>
    where
        'a: 's,
    {
        let tree = script.tree()?;
        let parents = ParentIndex::build(tree);
        let markers = DatabaseMarkers::collect(tree, &parents);
        let bindings = bind(tree, &parents, &markers, self.settings);
        Some(ScriptModel {
            script,
            tree,
            settings: self.settings,
            parents,
            markers,
            bindings,
        })
    }

    /// Run the built-in checks over one script
    pub fn check(&self, script: &Script, sink: &mut dyn IssueSink) {
        let Some(model) = self.model(script) else {
            if let Some(failure) = script.failure() {
                sink.report(
                    Issue::error(IssueKind::ParseError, format!("Parse error: {}", failure))
                        .with_file(script.display_path())
                        .with_span(Span::with_location(failure.line, 1, 1)),
                );
            }
            return;
        };

        let mut resolver = model.column_resolver(sink);
        for column in model.column_references() {
            resolver.resolve(column);
        }
        drop(resolver);

        self.check_objects(&model, sink);
        self.check_duplicate_aliases(&model, sink);
        self.check_output_parameters(&model, sink);
    }

    fn check_objects(&self, model: &ScriptModel<'_>, sink: &mut dyn IssueSink) {
        for (node, binding) in model.table_resolver().catalog_references() {
            if SYSTEM_SCHEMAS
                .iter()
                .any(|s| s.eq_ignore_ascii_case(&binding.schema))
            {
                continue;
            }
            // objects of databases the run knows nothing about cannot be checked
            if self.catalog.get_database(&binding.database).is_none() {
                continue;
            }
            if self
                .catalog
                .relation_exists(&binding.database, &binding.schema, &binding.object)
            {
                continue;
            }

            let qualified = binding.qualified_name();
            let mut issue = Issue::error(
                IssueKind::ObjectNotFound,
                format!("Table or view '{}' not found", qualified),
            )
            .with_span(model.tree().node(node).span)
            .with_database(&binding.database)
            .with_file(model.script_path())
            .with_object(model.enclosing_object(node))
            .with_argument(qualified);
            let candidates = self.catalog.relation_names(&binding.database, &binding.schema);
            if let Some(suggestion) = find_similar(&binding.object, &candidates) {
                issue = issue.with_help(format!("Did you mean '{}'?", suggestion));
            }
            sink.report(issue);
        }
    }

    fn check_duplicate_aliases(&self, model: &ScriptModel<'_>, sink: &mut dyn IssueSink) {
        let resolver = model.table_resolver();
        for &node in resolver.duplicates() {
            let Some(binding) = resolver.resolve(node) else {
                continue;
            };
            let alias = binding.alias.clone().unwrap_or_else(|| binding.object.clone());
            sink.report(
                Issue::warning(
                    IssueKind::DuplicateAlias,
                    format!("Alias '{}' is already used in this scope", alias),
                )
                .with_span(model.tree().node(node).span)
                .with_database(model.database_at(node))
                .with_file(model.script_path())
                .with_object(model.enclosing_object(node))
                .with_argument(alias)
                .with_help(format!(
                    "Give each table source its own alias (duplicate policy: {})",
                    self.settings.duplicate_alias
                )),
            );
        }
    }

    fn check_output_parameters(&self, model: &ScriptModel<'_>, sink: &mut dyn IssueSink) {
        let tree = model.tree();
        let procedures = tree.ids().filter(|&id| model.parents().contains(id));
        for procedure in procedures {
            let NodeKind::CreateProcedure { name, parameters } = tree.kind(procedure) else {
                continue;
            };
            let Some(&body) = model.parents().children_of(procedure).first() else {
                continue;
            };
            for parameter in parameters.iter().filter(|p| p.output) {
                if is_assigned_on_all_paths(tree, body, &parameter.name) {
                    continue;
                }
                sink.report(
                    Issue::warning(
                        IssueKind::OutputParameterNotAssigned,
                        format!(
                            "Output parameter '{}' of '{}' is not assigned on every execution path",
                            parameter.name, name
                        ),
                    )
                    .with_span(tree.node(procedure).span)
                    .with_database(model.database_at(procedure))
                    .with_file(model.script_path())
                    .with_object(Some(name.to_string()))
                    .with_argument(&parameter.name),
                );
            }
        }
    }
}

/// Structures built for one parsed script and discarded after it is analyzed
pub struct ScriptModel<'a> {
    script: &'a Script,
    tree: &'a SyntaxTree,
    settings: &'a AnalysisSettings,
    parents: ParentIndex,
    markers: DatabaseMarkers,
    bindings: Bindings,
}

impl<'a> ScriptModel<'a> {
    pub fn tree(&self) -> &'a SyntaxTree {
        self.tree
    }

    pub fn parents(&self) -> &ParentIndex {
        &self.parents
    }

    pub fn bindings(&self) -> &Bindings {
        &self.bindings
    }

    pub fn script_path(&self) -> String {
        self.script.display_path()
    }

    pub fn table_resolver(&self) -> TableResolver<'_> {
        TableResolver::new(self.tree, &self.bindings)
    }

    pub fn column_resolver<'m, 's>(&'m self, sink: &'s mut dyn IssueSink) -> ColumnResolver<'m, 's> {
        ColumnResolver::new(self, sink)
    }

    /// Database in effect at `node`: the nearest preceding `USE`, else the run default
    pub fn database_at(&self, node: NodeId) -> String {
        self.markers
            .database_of(&self.parents, node)
            .unwrap_or(&self.settings.default_database)
            .to_string()
    }

    /// Name of the routine, view or table definition containing `node`
    pub fn enclosing_object(&self, node: NodeId) -> Option<String> {
        self.parents
            .ancestors(node)
            .find_map(|ancestor| self.tree.kind(ancestor).defined_object())
            .map(|name| name.to_string())
    }

    /// Column references reachable from the root, in node order
    pub fn column_references(&self) -> Vec<NodeId> {
        self.tree
            .ids()
            .filter(|&id| {
                matches!(self.tree.kind(id), NodeKind::ColumnReference { .. })
                    && self.parents.contains(id)
            })
            .collect()
    }
}

/// Closest candidate within edit distance 3, for "did you mean" hints
fn find_similar<'c>(name: &str, candidates: &[&'c str]) -> Option<&'c str> {
    let name = name.to_lowercase();
    candidates
        .iter()
        .map(|&candidate| (levenshtein_distance(&name, &candidate.to_lowercase()), candidate))
        .filter(|&(distance, _)| distance <= 3)
        .min_by_key(|&(distance, _)| distance)
        .map(|(_, candidate)| candidate)
}

fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            current[j + 1] = (previous[j + 1] + 1)
                .min(current[j] + 1)
                .min(previous[j] + cost);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b.len()]
}
