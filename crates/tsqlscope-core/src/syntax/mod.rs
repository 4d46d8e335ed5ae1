//! Syntax tree consumed by the resolution layer
//!
//! The tree is an arena of nodes addressed by [`NodeId`]. Two nodes with the
//! same shape at different places in a script are different nodes; identity is
//! the id, never the value. Nodes only know their children, in source order;
//! parent links are reconstructed by [`crate::tree::ParentIndex`].

mod batch;
pub mod lower;

use std::fmt;

use crate::error::Span;

pub use lower::{parse_script, split_batches, ParseFailure};

/// Dense index of a node inside its [`SyntaxTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Identifier as written in the script, without brackets or quotes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identifier {
    pub value: String,
    pub span: Span,
}

impl Identifier {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            span: Span::default(),
        }
    }

    pub fn with_span(value: impl Into<String>, span: Span) -> Self {
        Self {
            value: value.into(),
            span,
        }
    }

    pub fn matches(&self, other: &str) -> bool {
        self.value.eq_ignore_ascii_case(other)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

/// Dotted object name: `object`, `schema.object` or `database.schema.object`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiPartName {
    pub parts: Vec<Identifier>,
}

impl MultiPartName {
    pub fn new(parts: Vec<Identifier>) -> Self {
        Self { parts }
    }

    /// Parse a dotted name like `db.dbo.Orders` or `[dbo].[Orders]`
    pub fn parse(s: &str) -> Self {
        let parts = s
            .split('.')
            .map(|part| part.trim().trim_start_matches('[').trim_end_matches(']'))
            .map(Identifier::new)
            .collect();
        Self { parts }
    }

    pub fn object(&self) -> Option<&Identifier> {
        self.parts.last()
    }

    pub fn object_name(&self) -> &str {
        self.object().map(|id| id.value.as_str()).unwrap_or_default()
    }

    pub fn schema(&self) -> Option<&Identifier> {
        self.part_from_end(2)
    }

    pub fn database(&self) -> Option<&Identifier> {
        self.part_from_end(3)
    }

    fn part_from_end(&self, n: usize) -> Option<&Identifier> {
        self.parts
            .len()
            .checked_sub(n)
            .and_then(|idx| self.parts.get(idx))
    }

    pub fn is_single(&self) -> bool {
        self.parts.len() == 1
    }

    pub fn span(&self) -> Span {
        self.object().map(|id| id.span).unwrap_or_default()
    }
}

impl fmt::Display for MultiPartName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, part) in self.parts.iter().enumerate() {
            if idx > 0 {
                write!(f, ".")?;
            }
            write!(f, "{}", part.value)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Literal {
    Integer(i64),
    Number(String),
    String(String),
    Boolean(bool),
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BooleanOp {
    And,
    Or,
}

/// Joins carrying an ON condition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    LeftOuter,
    RightOuter,
    FullOuter,
}

/// Joins without an ON condition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnqualifiedJoinKind {
    Cross,
    CrossApply,
    OuterApply,
}

/// Routine parameter
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Parameter {
    pub name: String,
    pub data_type: Option<String>,
    pub output: bool,
}

impl Parameter {
    pub fn new(name: impl Into<String>, data_type: Option<String>, output: bool) -> Self {
        Self {
            name: name.into(),
            data_type,
            output,
        }
    }
}

/// Node kinds. The comment on each variant lists its children in order;
/// `?` marks an optional child and `*` a repeated one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// Batch* or statements
    Script,
    /// statements of one `GO` batch
    Batch,
    /// statements; BEGIN...END blocks and routine bodies
    StatementList,

    /// WithClause?, query expression, OrderByClause?
    SelectStatement { into: Option<MultiPartName> },
    /// WithClause?, InsertSpecification
    InsertStatement,
    /// target, ColumnList?, source (query expression or values)
    InsertSpecification,
    /// WithClause?, UpdateSpecification
    UpdateStatement,
    /// target, SetClause*, FromClause?, WhereClause?
    UpdateSpecification,
    /// WithClause?, DeleteSpecification
    DeleteStatement,
    /// target, FromClause?, WhereClause?
    DeleteSpecification,
    /// WithClause?, MergeSpecification
    MergeStatement,
    /// target, source, search condition, MergeAction*.
    /// The target alias lives here rather than on the target reference.
    MergeSpecification { alias: Option<Identifier> },
    /// SetClause* | ColumnList, expressions
    MergeAction,
    /// CommonTableExpression*
    WithClause,
    /// query expression
    CommonTableExpression {
        name: Identifier,
        columns: Vec<Identifier>,
    },

    /// select elements*, FromClause?, WhereClause?, GroupByClause?, HavingClause?
    QuerySpecification,
    /// left, right (UNION / EXCEPT / INTERSECT)
    BinaryQueryExpression,
    /// expression
    SelectScalarExpression { alias: Option<Identifier> },
    SelectStarExpression { qualifier: Option<MultiPartName> },
    /// expression
    SelectSetVariable { variable: String },
    /// table sources*
    FromClause,
    /// condition
    WhereClause,
    /// expressions*
    GroupByClause,
    /// condition
    HavingClause,
    /// expressions*
    OrderByClause,
    /// first, second, condition?
    QualifiedJoin { join: JoinKind },
    /// first, second
    UnqualifiedJoin { join: UnqualifiedJoinKind },
    NamedTableReference {
        name: MultiPartName,
        alias: Option<Identifier>,
    },
    /// query expression
    DerivedTable { alias: Option<Identifier> },
    /// arguments*
    TableFunction {
        name: MultiPartName,
        alias: Option<Identifier>,
    },
    VariableTableReference {
        variable: String,
        alias: Option<Identifier>,
    },
    /// ColumnReference*
    ColumnList,
    /// target (ColumnReference or VariableReference), value
    SetClause,

    ColumnReference { parts: Vec<Identifier> },
    VariableReference { name: String },
    Literal(Literal),
    /// left, right
    Comparison { op: ComparisonOp },
    /// left, right
    BooleanBinary { op: BooleanOp },
    /// operand
    BooleanNot,
    /// inner
    Parenthesis,
    /// query expression
    Subquery,
    /// arguments*
    FunctionCall { name: MultiPartName },
    /// sub-expressions*; any expression the analysis does not look into
    Expression,

    /// predicate, then, else?
    If,
    /// predicate, body
    While,
    /// try body, catch body
    TryCatch,
    /// value
    SetVariable { variable: String },
    /// initial values*
    Declare { variables: Vec<String> },
    /// ExecuteArgument*
    Execute {
        procedure: MultiPartName,
        return_variable: Option<String>,
    },
    /// value?
    ExecuteArgument {
        variable: Option<String>,
        output: bool,
    },
    Break,
    Continue,
    /// value?
    Return,
    /// arguments*
    Throw,
    Goto { label: String },
    Label { name: String },

    Use { database: Identifier },
    /// ColumnDefinition*
    CreateTable { name: MultiPartName },
    ColumnDefinition {
        name: Identifier,
        data_type: Option<String>,
    },
    /// SelectStatement
    CreateView {
        name: MultiPartName,
        columns: Vec<Identifier>,
    },
    /// body
    CreateProcedure {
        name: MultiPartName,
        parameters: Vec<Parameter>,
    },
    /// body
    CreateFunction {
        name: MultiPartName,
        parameters: Vec<Parameter>,
    },
    CreateSynonym {
        name: MultiPartName,
        target: MultiPartName,
    },

    /// statement the analysis does not interpret; StatementList? for trigger bodies
    Other,
}

impl NodeKind {
    /// Statement kinds column resolution never looks beyond
    pub fn is_statement_boundary(&self) -> bool {
        matches!(
            self,
            NodeKind::SelectStatement { .. }
                | NodeKind::InsertStatement
                | NodeKind::UpdateStatement
                | NodeKind::DeleteStatement
                | NodeKind::MergeStatement
        )
    }

    pub fn is_table_source(&self) -> bool {
        matches!(
            self,
            NodeKind::NamedTableReference { .. }
                | NodeKind::DerivedTable { .. }
                | NodeKind::TableFunction { .. }
                | NodeKind::VariableTableReference { .. }
                | NodeKind::QualifiedJoin { .. }
                | NodeKind::UnqualifiedJoin { .. }
        )
    }

    pub fn is_join(&self) -> bool {
        matches!(
            self,
            NodeKind::QualifiedJoin { .. } | NodeKind::UnqualifiedJoin { .. }
        )
    }

    /// Name of the object a definition statement creates
    pub fn defined_object(&self) -> Option<&MultiPartName> {
        match self {
            NodeKind::CreateTable { name }
            | NodeKind::CreateView { name, .. }
            | NodeKind::CreateProcedure { name, .. }
            | NodeKind::CreateFunction { name, .. }
            | NodeKind::CreateSynonym { name, .. } => Some(name),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyntaxNode {
    pub kind: NodeKind,
    pub span: Span,
    children: Vec<NodeId>,
}

impl SyntaxNode {
    /// Raw child edges as supplied by the producer; may repeat a child
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }
}

/// Immutable syntax tree of one script
#[derive(Debug, Clone)]
pub struct SyntaxTree {
    nodes: Vec<SyntaxNode>,
    root: NodeId,
}

impl SyntaxTree {
    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &SyntaxNode {
        &self.nodes[id.index()]
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.node(id).kind
    }

    pub fn ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len() as u32).map(NodeId)
    }

    /// Statements directly under the script, with `GO` batches flattened, in source order
    pub fn top_level_statements(&self) -> Vec<NodeId> {
        let mut statements = Vec::new();
        for &child in self.node(self.root).children() {
            if matches!(self.kind(child), NodeKind::Batch) {
                statements.extend_from_slice(self.node(child).children());
            } else {
                statements.push(child);
            }
        }
        statements
    }

    /// Indented one-node-per-line rendering, for debugging
    pub fn dump(&self) -> String {
        let mut out = String::new();
        let mut stack = vec![(self.root, 0usize)];
        while let Some((id, depth)) = stack.pop() {
            let node = self.node(id);
            out.push_str(&"  ".repeat(depth));
            out.push_str(&format!("{:?}", node.kind));
            if node.span.is_known() {
                out.push_str(&format!(" @{}:{}", node.span.line, node.span.column));
            }
            out.push('\n');
            for &child in node.children().iter().rev() {
                stack.push((child, depth + 1));
            }
        }
        out
    }
}

/// Bottom-up tree construction: children are pushed before their parent
#[derive(Debug, Default)]
pub struct TreeBuilder {
    nodes: Vec<SyntaxNode>,
}

impl TreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, kind: NodeKind, children: Vec<NodeId>) -> NodeId {
        self.push_spanned(kind, Span::default(), children)
    }

    pub fn push_spanned(&mut self, kind: NodeKind, span: Span, children: Vec<NodeId>) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(SyntaxNode {
            kind,
            span,
            children,
        });
        id
    }

    pub fn leaf(&mut self, kind: NodeKind) -> NodeId {
        self.push(kind, Vec::new())
    }

    /// `name` may be dotted: `dbo.Orders`
    pub fn table(&mut self, name: &str, alias: Option<&str>) -> NodeId {
        let name = MultiPartName::parse(name);
        let span = name.span();
        self.push_spanned(
            NodeKind::NamedTableReference {
                name,
                alias: alias.map(Identifier::new),
            },
            span,
            Vec::new(),
        )
    }

    /// `reference` may be dotted: `o.OrderId`
    pub fn column(&mut self, reference: &str) -> NodeId {
        let parts = MultiPartName::parse(reference).parts;
        self.leaf(NodeKind::ColumnReference { parts })
    }

    pub fn int(&mut self, value: i64) -> NodeId {
        self.leaf(NodeKind::Literal(Literal::Integer(value)))
    }

    pub fn variable(&mut self, name: &str) -> NodeId {
        self.leaf(NodeKind::VariableReference {
            name: name.to_string(),
        })
    }

    pub fn compare(&mut self, op: ComparisonOp, left: NodeId, right: NodeId) -> NodeId {
        self.push(NodeKind::Comparison { op }, vec![left, right])
    }

    /// `SET @variable = <value>`
    pub fn set_variable(&mut self, variable: &str, value: i64) -> NodeId {
        let value = self.int(value);
        self.push(
            NodeKind::SetVariable {
                variable: variable.to_string(),
            },
            vec![value],
        )
    }

    pub fn block(&mut self, statements: Vec<NodeId>) -> NodeId {
        self.push(NodeKind::StatementList, statements)
    }

    pub fn finish(self, root: NodeId) -> SyntaxTree {
        SyntaxTree {
            nodes: self.nodes,
            root,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multi_part_name_parse() {
        let name = MultiPartName::parse("Sales.dbo.[Orders]");
        assert_eq!(name.object_name(), "Orders");
        assert_eq!(name.schema().map(|s| s.value.as_str()), Some("dbo"));
        assert_eq!(name.database().map(|s| s.value.as_str()), Some("Sales"));
        assert_eq!(name.to_string(), "Sales.dbo.Orders");

        let name = MultiPartName::parse("Orders");
        assert!(name.is_single());
        assert!(name.schema().is_none());
        assert!(name.database().is_none());
    }

    #[test]
    fn test_top_level_statements_flatten_batches() {
        let mut b = TreeBuilder::new();
        let first = b.leaf(NodeKind::Other);
        let batch_one = b.push(NodeKind::Batch, vec![first]);
        let second = b.leaf(NodeKind::Break);
        let third = b.leaf(NodeKind::Other);
        let batch_two = b.push(NodeKind::Batch, vec![second, third]);
        let root = b.push(NodeKind::Script, vec![batch_one, batch_two]);
        let tree = b.finish(root);

        assert_eq!(tree.top_level_statements(), vec![first, second, third]);
    }

    #[test]
    fn test_identical_nodes_are_distinct() {
        let mut b = TreeBuilder::new();
        let left = b.column("a");
        let right = b.column("a");
        let root = b.push(NodeKind::Expression, vec![left, right]);
        let tree = b.finish(root);

        assert_ne!(left, right);
        assert_eq!(tree.kind(left), tree.kind(right));
    }
}
