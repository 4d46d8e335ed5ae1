// Integration tests for the resolution layer
use tsqlscope_core::schema::CatalogObject;
use tsqlscope_core::{
    is_assigned_on_all_paths, parse_script, AnalysisSettings, Analyzer, Catalog, Issue,
    IssueKind, NodeKind, ParentIndex, Script, SourceKind, SyntaxTree,
};

use pretty_assertions::assert_eq;

const SCHEMA: &str = r#"
CREATE TABLE dbo.Customers (
    CustomerId INT NOT NULL,
    Name NVARCHAR(100)
)
GO
CREATE TABLE dbo.Orders (
    OrderId INT NOT NULL,
    CustomerId INT NOT NULL,
    Total MONEY
)
GO
CREATE TABLE dbo.OrderLines (
    OrderId INT NOT NULL,
    Quantity INT
)
"#;

fn scripts(queries: &[(&str, &str)]) -> Vec<Script> {
    std::iter::once(Script::parse("schema.sql", SCHEMA))
        .chain(queries.iter().map(|(path, sql)| Script::parse(*path, sql)))
        .collect()
}

fn check_all(scripts: &[Script]) -> Vec<Issue> {
    let settings = AnalysisSettings::default();
    let catalog = Catalog::build(scripts, &settings);
    let analyzer = Analyzer::new(&catalog, &settings);
    let mut issues = Vec::new();
    for script in scripts {
        analyzer.check(script, &mut issues);
    }
    issues
}

/// `table.column` for each column reference of the only query script, keyed by its text
fn resolve_columns(sql: &str) -> Vec<(String, Option<String>)> {
    let scripts = scripts(&[("query.sql", sql)]);
    let settings = AnalysisSettings::default();
    let catalog = Catalog::build(&scripts, &settings);
    let analyzer = Analyzer::new(&catalog, &settings);
    let model = analyzer.model(&scripts[1]).expect("valid sql");
    let mut issues = Vec::new();
    let mut resolver = model.column_resolver(&mut issues);

    let mut resolved = Vec::new();
    for node in model.column_references() {
        let NodeKind::ColumnReference { parts } = model.tree().kind(node) else {
            continue;
        };
        let text = parts
            .iter()
            .map(|p| p.value.as_str())
            .collect::<Vec<_>>()
            .join(".");
        let resolution = resolver
            .resolve(node)
            .map(|r| format!("{}.{}", r.table, r.column));
        resolved.push((text, resolution));
    }
    resolved.sort();
    resolved
}

fn first_procedure_body(tree: &SyntaxTree) -> tsqlscope_core::NodeId {
    let procedure = tree
        .ids()
        .find(|&id| matches!(tree.kind(id), NodeKind::CreateProcedure { .. }))
        .expect("procedure");
    tree.node(procedure).children()[0]
}

fn assigned(body_sql: &str) -> bool {
    let sql = format!("CREATE PROCEDURE dbo.P @x INT OUTPUT AS\nBEGIN\n{}\nEND", body_sql);
    let tree = parse_script(&sql).expect("valid sql");
    is_assigned_on_all_paths(&tree, first_procedure_body(&tree), "@x")
}

#[test]
fn test_single_unaliased_table() {
    assert_eq!(
        resolve_columns("SELECT Total FROM dbo.Orders"),
        vec![("Total".to_string(), Some("Orders.Total".to_string()))]
    );
}

#[test]
fn test_left_nested_joins() {
    let resolved = resolve_columns(
        "SELECT c.Name, l.Quantity FROM Customers c \
         JOIN Orders o ON o.CustomerId = c.CustomerId \
         JOIN OrderLines l ON l.OrderId = o.OrderId",
    );
    assert!(resolved.iter().all(|(_, r)| r.is_some()), "{:?}", resolved);
    assert!(resolved.contains(&("l.Quantity".to_string(), Some("OrderLines.Quantity".to_string()))));
    assert!(resolved.contains(&("c.Name".to_string(), Some("Customers.Name".to_string()))));
}

#[test]
fn test_right_nested_joins() {
    let resolved = resolve_columns(
        "SELECT c.Name, l.Quantity FROM Customers c \
         JOIN (Orders o JOIN OrderLines l ON l.OrderId = o.OrderId) \
         ON o.CustomerId = c.CustomerId",
    );
    assert!(resolved.iter().all(|(_, r)| r.is_some()), "{:?}", resolved);
    assert!(resolved.contains(&("o.CustomerId".to_string(), Some("Orders.CustomerId".to_string()))));
}

#[test]
fn test_ambiguous_column_yields_one_issue() {
    let scripts = scripts(&[(
        "query.sql",
        "SELECT CustomerId FROM Orders o JOIN Customers c ON c.CustomerId = o.CustomerId",
    )]);
    let issues = check_all(&scripts);
    assert_eq!(issues.len(), 1, "{:?}", issues);
    assert_eq!(issues[0].kind, IssueKind::AmbiguousColumn);
    assert_eq!(issues[0].arguments, vec!["CustomerId".to_string()]);
}

#[test]
fn test_parent_index_is_idempotent() {
    let tree = parse_script(
        "SELECT o.OrderId FROM Orders o WHERE EXISTS (SELECT 1 FROM OrderLines l WHERE l.OrderId = o.OrderId)",
    )
    .expect("valid sql");
    let first = ParentIndex::build(&tree);
    let second = ParentIndex::build(&tree);
    for id in tree.ids() {
        assert_eq!(first.parent_of(id), second.parent_of(id));
        assert_eq!(first.children_of(id), second.children_of(id));
    }
}

#[test]
fn test_catalog_collects_tables_across_scripts() {
    let scripts = vec![
        Script::parse("create.sql", "CREATE TABLE dbo.T1 (Id INT)"),
        Script::parse("query.sql", "SELECT * FROM T1"),
    ];
    let settings = AnalysisSettings::default();
    let catalog = Catalog::build(&scripts, &settings);

    let table = catalog.get_table("master", "dbo", "T1").expect("table");
    assert_eq!(table.column_names(), vec!["Id"]);
    assert!(matches!(
        catalog.get_object("master", "dbo", "t1"),
        Some(CatalogObject::Table(_))
    ));

    let analyzer = Analyzer::new(&catalog, &settings);
    let model = analyzer.model(&scripts[1]).expect("valid sql");
    let references: Vec<_> = model.table_resolver().catalog_references().collect();
    assert_eq!(references.len(), 1);
    assert_eq!(references[0].1.kind, SourceKind::TableOrView);
    assert_eq!(references[0].1.qualified_name(), "master.dbo.T1");

    let mut issues = Vec::new();
    analyzer.check(&scripts[1], &mut issues);
    assert!(issues.is_empty(), "{:?}", issues);
}

#[test]
fn test_cte_referenced_from_nested_from() {
    let sql = "WITH big AS (SELECT OrderId FROM Orders WHERE Total > 100)\n\
               SELECT c.Name FROM Customers c\n\
               WHERE c.CustomerId IN (SELECT o.CustomerId FROM Orders o JOIN big b ON b.OrderId = o.OrderId)";
    let scripts = scripts(&[("query.sql", sql)]);
    let settings = AnalysisSettings::default();
    let catalog = Catalog::build(&scripts, &settings);
    let analyzer = Analyzer::new(&catalog, &settings);
    let model = analyzer.model(&scripts[1]).expect("valid sql");

    let cte_kinds: Vec<SourceKind> = model
        .bindings()
        .iter()
        .filter(|(_, b)| b.object.eq_ignore_ascii_case("big"))
        .map(|(_, b)| b.kind)
        .collect();
    assert_eq!(cte_kinds, vec![SourceKind::CommonTableExpression]);
    assert!(check_all(&scripts).is_empty());
}

#[test]
fn test_temp_table_outlives_statement_but_cte_does_not() {
    let sql = "WITH recent AS (SELECT OrderId FROM Orders)\n\
               SELECT OrderId INTO #recent FROM recent;\n\
               SELECT * FROM #recent;\n\
               SELECT * FROM recent;";
    let scripts = scripts(&[("query.sql", sql)]);
    let settings = AnalysisSettings::default();
    let catalog = Catalog::build(&scripts, &settings);
    let analyzer = Analyzer::new(&catalog, &settings);
    let model = analyzer.model(&scripts[1]).expect("valid sql");

    let kinds: Vec<(String, SourceKind)> = model
        .bindings()
        .iter()
        .map(|(_, b)| (b.object.clone(), b.kind))
        .collect();
    assert!(kinds.contains(&("#recent".to_string(), SourceKind::TempTable)));
    // the second reference to `recent` is outside the CTE's statement
    assert_eq!(
        kinds
            .iter()
            .filter(|(name, _)| name == "recent")
            .map(|(_, kind)| *kind)
            .collect::<Vec<_>>(),
        vec![SourceKind::CommonTableExpression, SourceKind::TableOrView]
    );
    assert_eq!(model.bindings().session().len(), 1);

    let issues = check_all(&scripts);
    assert_eq!(issues.len(), 1, "{:?}", issues);
    assert_eq!(issues[0].kind, IssueKind::ObjectNotFound);
    assert_eq!(issues[0].arguments, vec!["master.dbo.recent".to_string()]);
}

#[test]
fn test_missing_object_in_procedure_names_the_procedure() {
    let scripts = scripts(&[(
        "proc.sql",
        "USE master\nGO\nCREATE PROCEDURE dbo.Report AS\nBEGIN\n  SELECT * FROM dbo.Invoices\nEND",
    )]);
    let issues = check_all(&scripts);
    assert_eq!(issues.len(), 1, "{:?}", issues);
    let issue = &issues[0];
    assert_eq!(issue.kind, IssueKind::ObjectNotFound);
    assert_eq!(issue.object_name.as_deref(), Some("dbo.Report"));
    assert_eq!(issue.file_path.as_deref(), Some("proc.sql"));
    assert_eq!(issue.database.as_deref(), Some("master"));
    assert_eq!(issue.span.map(|s| s.line), Some(5));
}

#[test]
fn test_flow_if_else_both_assign() {
    assert!(assigned("IF @a = 1 SET @x = 1 ELSE SET @x = 2"));
}

#[test]
fn test_flow_if_without_else() {
    assert!(!assigned("IF @a = 1 SET @x = 1"));
}

#[test]
fn test_flow_constant_true_loop_with_break() {
    assert!(assigned("WHILE 1 = 1 BEGIN SET @x = 1 BREAK END"));
}

#[test]
fn test_flow_loop_on_variable_predicate() {
    assert!(!assigned("WHILE @a < 10 BEGIN SET @x = 1 SET @a = @a + 1 END"));
}

#[test]
fn test_flow_throw_branch() {
    assert!(assigned(
        "IF @a = 1 BEGIN THROW 50000, 'bad', 1 END ELSE BEGIN SET @x = 1 END"
    ));
}

#[test]
fn test_parallel_analysis_shares_catalog() {
    let queries: Vec<(String, String)> = (0..8)
        .map(|i| {
            let sql = if i % 2 == 0 {
                "SELECT o.Total FROM Orders o".to_string()
            } else {
                "SELECT * FROM dbo.Missing".to_string()
            };
            (format!("query{}.sql", i), sql)
        })
        .collect();
    let borrowed: Vec<(&str, &str)> = queries
        .iter()
        .map(|(path, sql)| (path.as_str(), sql.as_str()))
        .collect();
    let scripts = scripts(&borrowed);
    let settings = AnalysisSettings::default();
    let catalog = Catalog::build(&scripts, &settings);
    let analyzer = Analyzer::new(&catalog, &settings);

    let mut issues: Vec<Issue> = std::thread::scope(|s| {
        let handles: Vec<_> = scripts
            .chunks(3)
            .map(|chunk| {
                s.spawn(move || {
                    let mut issues = Vec::new();
                    for script in chunk {
                        analyzer.check(script, &mut issues);
                    }
                    issues
                })
            })
            .collect();
        handles
            .into_iter()
            .flat_map(|h| h.join().expect("worker panicked"))
            .collect()
    });
    issues.sort_by(|a, b| a.file_path.cmp(&b.file_path));

    let files: Vec<_> = issues.iter().filter_map(|i| i.file_path.as_deref()).collect();
    assert_eq!(
        files,
        vec!["query1.sql", "query3.sql", "query5.sql", "query7.sql"]
    );
}
