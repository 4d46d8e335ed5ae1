//! tsqlscope-core: semantic resolution layer for T-SQL static analysis
//!
//! This library answers the questions rule code asks about a parsed script
//! without a database connection: which node is whose parent, which table an
//! alias names, which table a column comes from, which objects the whole set
//! of scripts defines, and whether a variable is assigned on every path
//! through a routine.

pub mod analyzer;
pub mod error;
pub mod flow;
pub mod schema;
pub mod scope;
pub mod script;
pub mod settings;
pub mod syntax;
pub mod tree;

pub use analyzer::{
    Analyzer, ColumnResolution, ColumnResolver, ScriptModel, TableResolver, Unresolved,
};
pub use error::{Issue, IssueKind, IssueSink, Severity, Span};
pub use flow::{is_assigned_on_all_paths, AssignmentFlowAnalyzer};
pub use schema::{Catalog, CatalogBuilder, QualifiedName};
pub use scope::{ScopeStack, SourceKind, TableBinding};
pub use script::Script;
pub use settings::{AnalysisSettings, DuplicateAliasPolicy};
pub use syntax::{parse_script, NodeId, NodeKind, SyntaxTree};
pub use tree::ParentIndex;
