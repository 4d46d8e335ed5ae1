//! Run-wide catalog of database objects, grouped by database and schema

use std::fmt;

use indexmap::IndexMap;
use serde::Serialize;

use crate::syntax::Parameter;

/// Synonym chains longer than this are treated as unresolvable
const MAX_SYNONYM_DEPTH: usize = 16;

/// Every object defined by the parsed scripts of one run.
///
/// Keys are lowercased, so all lookups are case-insensitive. The catalog is
/// only mutated by [`super::CatalogBuilder`] and is read-only afterwards.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Catalog {
    databases: IndexMap<String, Database>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn databases(&self) -> impl Iterator<Item = &Database> {
        self.databases.values()
    }

    pub fn get_database(&self, name: &str) -> Option<&Database> {
        self.databases.get(&key(name))
    }

    pub fn get_schema(&self, database: &str, schema: &str) -> Option<&Schema> {
        self.get_database(database)
            .and_then(|db| db.schemas.get(&key(schema)))
    }

    pub fn get_table(&self, database: &str, schema: &str, name: &str) -> Option<&Table> {
        self.get_schema(database, schema)
            .and_then(|s| s.tables.get(&key(name)))
    }

    pub fn get_view(&self, database: &str, schema: &str, name: &str) -> Option<&View> {
        self.get_schema(database, schema)
            .and_then(|s| s.views.get(&key(name)))
    }

    pub fn get_procedure(&self, database: &str, schema: &str, name: &str) -> Option<&Routine> {
        self.get_schema(database, schema)
            .and_then(|s| s.procedures.get(&key(name)))
    }

    pub fn get_function(&self, database: &str, schema: &str, name: &str) -> Option<&Routine> {
        self.get_schema(database, schema)
            .and_then(|s| s.functions.get(&key(name)))
    }

    pub fn get_synonym(&self, database: &str, schema: &str, name: &str) -> Option<&Synonym> {
        self.get_schema(database, schema)
            .and_then(|s| s.synonyms.get(&key(name)))
    }

    /// Any object of any kind with this name
    pub fn get_object(&self, database: &str, schema: &str, name: &str) -> Option<CatalogObject<'_>> {
        let schema = self.get_schema(database, schema)?;
        let name = key(name);
        schema
            .tables
            .get(&name)
            .map(CatalogObject::Table)
            .or_else(|| schema.views.get(&name).map(CatalogObject::View))
            .or_else(|| schema.synonyms.get(&name).map(CatalogObject::Synonym))
            .or_else(|| schema.procedures.get(&name).map(CatalogObject::Procedure))
            .or_else(|| schema.functions.get(&name).map(CatalogObject::Function))
    }

    /// Whether a table, view or synonym of this name exists
    pub fn relation_exists(&self, database: &str, schema: &str, name: &str) -> bool {
        matches!(
            self.get_object(database, schema, name),
            Some(CatalogObject::Table(_) | CatalogObject::View(_) | CatalogObject::Synonym(_))
        )
    }

    /// Follow a synonym chain to the object it finally names.
    ///
    /// Returns `None` for names that are not synonyms and for cyclic chains.
    pub fn resolve_synonym(&self, database: &str, schema: &str, name: &str) -> Option<&QualifiedName> {
        let mut target = &self.get_synonym(database, schema, name)?.target;
        for _ in 0..MAX_SYNONYM_DEPTH {
            match self.get_synonym(&target.database, &target.schema, &target.name) {
                Some(next) => target = &next.target,
                None => return Some(target),
            }
        }
        tracing::debug!(synonym = %name, "synonym chain does not terminate");
        None
    }

    /// Table, view and synonym names in one schema, for "did you mean" hints
    pub fn relation_names(&self, database: &str, schema: &str) -> Vec<&str> {
        self.get_schema(database, schema)
            .map(|s| {
                s.tables
                    .values()
                    .map(|t| t.name.name.as_str())
                    .chain(s.views.values().map(|v| v.name.name.as_str()))
                    .chain(s.synonyms.values().map(|v| v.name.name.as_str()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of objects of every kind
    pub fn object_count(&self) -> usize {
        self.databases
            .values()
            .flat_map(|db| db.schemas.values())
            .map(Schema::object_count)
            .sum()
    }

    fn schema_mut(&mut self, database: &str, schema: &str) -> &mut Schema {
        let db = self
            .databases
            .entry(key(database))
            .or_insert_with(|| Database {
                name: database.to_string(),
                schemas: IndexMap::new(),
            });
        db.schemas
            .entry(key(schema))
            .or_insert_with(|| Schema::new(schema))
    }

    pub(crate) fn add_table(&mut self, table: Table) {
        let name = table.name.clone();
        let schema = self.schema_mut(&name.database, &name.schema);
        log_replaced("table", &name, schema.tables.insert(key(&name.name), table).is_some());
    }

    pub(crate) fn add_view(&mut self, view: View) {
        let name = view.name.clone();
        let schema = self.schema_mut(&name.database, &name.schema);
        log_replaced("view", &name, schema.views.insert(key(&name.name), view).is_some());
    }

    pub(crate) fn add_procedure(&mut self, procedure: Routine) {
        let name = procedure.name.clone();
        let schema = self.schema_mut(&name.database, &name.schema);
        let replaced = schema.procedures.insert(key(&name.name), procedure).is_some();
        log_replaced("procedure", &name, replaced);
    }

    pub(crate) fn add_function(&mut self, function: Routine) {
        let name = function.name.clone();
        let schema = self.schema_mut(&name.database, &name.schema);
        let replaced = schema.functions.insert(key(&name.name), function).is_some();
        log_replaced("function", &name, replaced);
    }

    pub(crate) fn add_synonym(&mut self, synonym: Synonym) {
        let name = synonym.name.clone();
        let schema = self.schema_mut(&name.database, &name.schema);
        let replaced = schema.synonyms.insert(key(&name.name), synonym).is_some();
        log_replaced("synonym", &name, replaced);
    }
}

fn key(name: &str) -> String {
    name.to_lowercase()
}

fn log_replaced(kind: &str, name: &QualifiedName, replaced: bool) {
    if replaced {
        tracing::debug!(kind, object = %name, "later definition replaces earlier one");
    } else {
        tracing::trace!(kind, object = %name, "registered catalog object");
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Database {
    pub name: String,
    pub schemas: IndexMap<String, Schema>,
}

/// A schema (namespace) inside one database
#[derive(Debug, Clone, Default, Serialize)]
pub struct Schema {
    pub name: String,
    pub tables: IndexMap<String, Table>,
    pub views: IndexMap<String, View>,
    pub procedures: IndexMap<String, Routine>,
    pub functions: IndexMap<String, Routine>,
    pub synonyms: IndexMap<String, Synonym>,
}

impl Schema {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn object_count(&self) -> usize {
        self.tables.len()
            + self.views.len()
            + self.procedures.len()
            + self.functions.len()
            + self.synonyms.len()
    }
}

/// Fully qualified object name: `database.schema.name`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct QualifiedName {
    pub database: String,
    pub schema: String,
    pub name: String,
}

impl QualifiedName {
    pub fn new(
        database: impl Into<String>,
        schema: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            database: database.into(),
            schema: schema.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.database, self.schema, self.name)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Table {
    pub name: QualifiedName,
    pub columns: Vec<Column>,
}

impl Table {
    pub fn new(name: QualifiedName) -> Self {
        Self {
            name,
            columns: Vec::new(),
        }
    }

    pub fn with_column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    /// Case-insensitive column lookup
    pub fn get_column(&self, name: &str) -> Option<&Column> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Column {
    pub name: String,
    /// Type as written, e.g. `DECIMAL(10,2)`; absent for computed columns
    pub data_type: Option<String>,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: Option<String>) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct View {
    pub name: QualifiedName,
    pub columns: Vec<String>,
}

/// Stored procedure or user-defined function
#[derive(Debug, Clone, Serialize)]
pub struct Routine {
    pub name: QualifiedName,
    pub parameters: Vec<Parameter>,
}

impl Routine {
    pub fn output_parameters(&self) -> impl Iterator<Item = &Parameter> {
        self.parameters.iter().filter(|p| p.output)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Synonym {
    pub name: QualifiedName,
    pub target: QualifiedName,
}

/// Borrowed view of any catalog object
#[derive(Debug, Clone, Copy)]
pub enum CatalogObject<'a> {
    Table(&'a Table),
    View(&'a View),
    Procedure(&'a Routine),
    Function(&'a Routine),
    Synonym(&'a Synonym),
}

impl CatalogObject<'_> {
    pub fn name(&self) -> &QualifiedName {
        match self {
            CatalogObject::Table(t) => &t.name,
            CatalogObject::View(v) => &v.name,
            CatalogObject::Procedure(r) | CatalogObject::Function(r) => &r.name,
            CatalogObject::Synonym(s) => &s.name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn name(schema: &str, object: &str) -> QualifiedName {
        QualifiedName::new("Sales", schema, object)
    }

    #[test]
    fn test_lookups_are_case_insensitive() {
        let mut catalog = Catalog::new();
        catalog.add_table(
            Table::new(name("dbo", "Orders")).with_column(Column::new("OrderId", Some("INT".into()))),
        );

        let table = catalog.get_table("SALES", "DBO", "orders").expect("table");
        assert_eq!(table.name.to_string(), "Sales.dbo.Orders");
        assert!(table.get_column("orderid").is_some());
        assert!(catalog.get_table("Sales", "audit", "Orders").is_none());
        assert!(catalog.get_view("Sales", "dbo", "Orders").is_none());
    }

    #[test]
    fn test_later_definition_wins() {
        let mut catalog = Catalog::new();
        catalog.add_table(Table::new(name("dbo", "t")).with_column(Column::new("a", None)));
        catalog.add_table(Table::new(name("dbo", "T")).with_column(Column::new("b", None)));

        let table = catalog.get_table("sales", "dbo", "t").expect("table");
        assert_eq!(table.column_names(), vec!["b"]);
        assert_eq!(catalog.object_count(), 1);
    }

    #[test]
    fn test_synonym_resolution() {
        let mut catalog = Catalog::new();
        catalog.add_table(Table::new(name("dbo", "Orders")).with_column(Column::new("Id", None)));
        catalog.add_synonym(Synonym {
            name: name("dbo", "Ord"),
            target: name("dbo", "Orders"),
        });
        catalog.add_synonym(Synonym {
            name: name("dbo", "O"),
            target: name("dbo", "Ord"),
        });

        assert_eq!(catalog.resolve_synonym("sales", "dbo", "o"), Some(&name("dbo", "Orders")));
        assert!(catalog.relation_exists("sales", "dbo", "ord"));
        assert_eq!(catalog.resolve_synonym("sales", "dbo", "Orders"), None);
    }

    #[test]
    fn test_cyclic_synonyms_do_not_resolve() {
        let mut catalog = Catalog::new();
        catalog.add_synonym(Synonym {
            name: name("dbo", "a"),
            target: name("dbo", "b"),
        });
        catalog.add_synonym(Synonym {
            name: name("dbo", "b"),
            target: name("dbo", "a"),
        });

        assert_eq!(catalog.resolve_synonym("sales", "dbo", "a"), None);
    }

    #[test]
    fn test_routines_are_not_relations() {
        let mut catalog = Catalog::new();
        catalog.add_procedure(Routine {
            name: name("dbo", "GetOrders"),
            parameters: vec![Parameter::new("@count", Some("INT".into()), true)],
        });

        assert!(!catalog.relation_exists("sales", "dbo", "GetOrders"));
        assert!(matches!(
            catalog.get_object("sales", "dbo", "getorders"),
            Some(CatalogObject::Procedure(_))
        ));
        let procedure = catalog.get_procedure("sales", "dbo", "getorders").expect("procedure");
        assert_eq!(procedure.output_parameters().count(), 1);
    }
}
