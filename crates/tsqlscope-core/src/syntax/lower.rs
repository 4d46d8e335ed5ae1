//! Front end: splits T-SQL scripts into batches and lowers sqlparser's AST into a [`SyntaxTree`]

use sqlparser::ast::{
    self, Assignment, AssignmentTarget, BinaryOperator, Delete, Expr, FromTable, FunctionArg,
    FunctionArgExpr, FunctionArguments, GroupByExpr, Insert, JoinConstraint, JoinOperator,
    MergeAction, MergeClause, MergeInsertKind, ObjectName, Query, Select, SelectItem, SetExpr,
    Statement, TableFactor, TableWithJoins, UnaryOperator, Value,
};
use sqlparser::parser::ParserError;
use thiserror::Error;

use super::batch::parse_batch;
use super::{
    BooleanOp, ComparisonOp, Identifier, JoinKind, Literal, MultiPartName, NodeId, NodeKind,
    SyntaxTree, TreeBuilder, UnqualifiedJoinKind,
};
use crate::error::Span;

/// A batch failed to parse; the whole script is treated as unparsed
#[derive(Debug, Error)]
#[error("batch {batch} starting at line {line}: {source}")]
pub struct ParseFailure {
    /// 1-indexed batch number
    pub batch: usize,
    /// 1-indexed line the batch starts on
    pub line: usize,
    #[source]
    pub source: ParserError,
}

/// One `GO`-separated batch of a script
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Batch<'a> {
    pub text: &'a str,
    /// Number of script lines before the batch starts
    pub line_offset: usize,
}

/// Split a script into batches on lines that hold only `GO` (optionally `GO <count>`)
pub fn split_batches(source: &str) -> Vec<Batch<'_>> {
    let mut batches = Vec::new();
    let mut start = 0;
    let mut start_line = 0;
    let mut offset = 0;

    for (line_no, line) in source.split_inclusive('\n').enumerate() {
        if is_batch_separator(line) {
            let text = &source[start..offset];
            if !text.trim().is_empty() {
                batches.push(Batch {
                    text,
                    line_offset: start_line,
                });
            }
            start = offset + line.len();
            start_line = line_no + 1;
        }
        offset += line.len();
    }

    let last = &source[start..];
    if !last.trim().is_empty() {
        batches.push(Batch {
            text: last,
            line_offset: start_line,
        });
    }

    batches
}

fn is_batch_separator(line: &str) -> bool {
    let mut words = line.split_whitespace();
    match words.next() {
        Some(word) if word.eq_ignore_ascii_case("go") => {
            let count_ok = words
                .next()
                .map_or(true, |count| count.chars().all(|c| c.is_ascii_digit()));
            count_ok && words.next().is_none()
        }
        _ => false,
    }
}

/// Parse a whole script into a syntax tree
pub fn parse_script(source: &str) -> Result<SyntaxTree, ParseFailure> {
    let mut lowerer = Lowerer::default();
    let mut batch_nodes = Vec::new();

    for (idx, batch) in split_batches(source).into_iter().enumerate() {
        lowerer.line_offset = batch.line_offset;
        let ids = parse_batch(batch.text, &mut lowerer).map_err(|source| ParseFailure {
            batch: idx + 1,
            line: batch.line_offset + 1,
            source,
        })?;
        batch_nodes.push(lowerer.b.push(NodeKind::Batch, ids));
    }

    let root = lowerer.b.push(NodeKind::Script, batch_nodes);
    Ok(lowerer.b.finish(root))
}

/// Turns sqlparser AST fragments into tree nodes
#[derive(Default)]
pub(super) struct Lowerer {
    pub(super) b: TreeBuilder,
    pub(super) line_offset: usize,
}

impl Lowerer {
    pub(super) fn ident(&self, ident: &ast::Ident) -> Identifier {
        Identifier::with_span(
            ident.value.clone(),
            Span::from_sqlparser(&ident.span, self.line_offset),
        )
    }

    fn name(&self, name: &ObjectName) -> MultiPartName {
        MultiPartName::new(name.0.iter().map(|id| self.ident(id)).collect())
    }

    /// Lower a DML statement sqlparser produced; anything else becomes `Other`
    pub(super) fn statement(&mut self, stmt: &Statement) -> NodeId {
        match stmt {
            Statement::Query(query) => self.query_statement(query),
            Statement::Insert(insert) => self.insert(None, insert),
            Statement::Update {
                table,
                assignments,
                from,
                selection,
                ..
            } => self.update(None, table, assignments, from.as_ref(), selection.as_ref()),
            Statement::Delete(delete) => self.delete(delete),
            Statement::Merge {
                table,
                source,
                on,
                clauses,
                ..
            } => self.merge(table, source, on, clauses),
            _ => self.b.leaf(NodeKind::Other),
        }
    }

    fn with_clause(&mut self, query: &Query) -> Option<NodeId> {
        let with = query.with.as_ref()?;
        let ctes = with
            .cte_tables
            .iter()
            .map(|cte| {
                let name = self.ident(&cte.alias.name);
                let columns = cte
                    .alias
                    .columns
                    .iter()
                    .map(|c| self.ident(&c.name))
                    .collect();
                let body = self.set_expr(&cte.query.body);
                let span = name.span;
                self.b.push_spanned(
                    NodeKind::CommonTableExpression { name, columns },
                    span,
                    vec![body],
                )
            })
            .collect();
        Some(self.b.push(NodeKind::WithClause, ctes))
    }

    pub(super) fn query_statement(&mut self, query: &Query) -> NodeId {
        // WITH ... INSERT / WITH ... UPDATE arrive as a query wrapping the DML statement
        match query.body.as_ref() {
            SetExpr::Insert(Statement::Insert(insert)) => {
                let with = self.with_clause(query);
                return self.insert(with, insert);
            }
            SetExpr::Update(Statement::Update {
                table,
                assignments,
                from,
                selection,
                ..
            }) => {
                let with = self.with_clause(query);
                return self.update(with, table, assignments, from.as_ref(), selection.as_ref());
            }
            _ => {}
        }

        let into = match query.body.as_ref() {
            SetExpr::Select(select) => select.into.as_ref().map(|into| self.name(&into.name)),
            _ => None,
        };

        let mut children = Vec::new();
        children.extend(self.with_clause(query));
        children.push(self.set_expr(&query.body));
        if let Some(order_by) = &query.order_by {
            let exprs = order_by.exprs.iter().map(|ob| self.expr(&ob.expr)).collect();
            children.push(self.b.push(NodeKind::OrderByClause, exprs));
        }
        self.b.push(NodeKind::SelectStatement { into }, children)
    }

    fn set_expr(&mut self, set_expr: &SetExpr) -> NodeId {
        match set_expr {
            SetExpr::Select(select) => self.query_specification(select),
            SetExpr::Query(query) => self.set_expr(&query.body),
            SetExpr::SetOperation { left, right, .. } => {
                let left = self.set_expr(left);
                let right = self.set_expr(right);
                self.b.push(NodeKind::BinaryQueryExpression, vec![left, right])
            }
            SetExpr::Values(values) => {
                let exprs = values
                    .rows
                    .iter()
                    .flatten()
                    .map(|e| self.expr(e))
                    .collect();
                self.b.push(NodeKind::Expression, exprs)
            }
            _ => self.b.leaf(NodeKind::Expression),
        }
    }

    fn query_specification(&mut self, select: &Select) -> NodeId {
        let mut children: Vec<NodeId> = select
            .projection
            .iter()
            .map(|item| self.select_item(item))
            .collect();

        if !select.from.is_empty() {
            let sources = select
                .from
                .iter()
                .map(|t| self.table_with_joins(t))
                .collect();
            children.push(self.b.push(NodeKind::FromClause, sources));
        }

        if let Some(selection) = &select.selection {
            let condition = self.expr(selection);
            children.push(self.b.push(NodeKind::WhereClause, vec![condition]));
        }

        if let GroupByExpr::Expressions(exprs, _) = &select.group_by {
            if !exprs.is_empty() {
                let exprs = exprs.iter().map(|e| self.expr(e)).collect();
                children.push(self.b.push(NodeKind::GroupByClause, exprs));
            }
        }

        if let Some(having) = &select.having {
            let condition = self.expr(having);
            children.push(self.b.push(NodeKind::HavingClause, vec![condition]));
        }

        self.b.push(NodeKind::QuerySpecification, children)
    }

    fn select_item(&mut self, item: &SelectItem) -> NodeId {
        match item {
            // SELECT @v = expr
            SelectItem::UnnamedExpr(Expr::BinaryOp {
                left,
                op: BinaryOperator::Eq,
                right,
            }) if variable_name(left).is_some() => {
                let variable = variable_name(left).unwrap_or_default();
                let value = self.expr(right);
                self.b
                    .push(NodeKind::SelectSetVariable { variable }, vec![value])
            }
            SelectItem::UnnamedExpr(expr) => {
                let value = self.expr(expr);
                self.b
                    .push(NodeKind::SelectScalarExpression { alias: None }, vec![value])
            }
            // MsSqlDialect reads `SELECT @v = expr` as `expr AS @v`
            SelectItem::ExprWithAlias { expr, alias } if alias.value.starts_with('@') => {
                let variable = alias.value.clone();
                let value = self.expr(expr);
                self.b
                    .push(NodeKind::SelectSetVariable { variable }, vec![value])
            }
            SelectItem::ExprWithAlias { expr, alias } => {
                let alias = Some(self.ident(alias));
                let value = self.expr(expr);
                self.b
                    .push(NodeKind::SelectScalarExpression { alias }, vec![value])
            }
            SelectItem::QualifiedWildcard(name, _) => {
                let qualifier = Some(self.name(name));
                self.b.leaf(NodeKind::SelectStarExpression { qualifier })
            }
            SelectItem::Wildcard(_) => self
                .b
                .leaf(NodeKind::SelectStarExpression { qualifier: None }),
        }
    }

    /// Lower `a JOIN b ON .. JOIN c ON ..` into a left-deep join tree
    fn table_with_joins(&mut self, table: &TableWithJoins) -> NodeId {
        let mut current = self.table_factor(&table.relation);

        for join in &table.joins {
            let second = self.table_factor(&join.relation);
            let unqualified = match &join.join_operator {
                JoinOperator::CrossJoin => Some(UnqualifiedJoinKind::Cross),
                JoinOperator::CrossApply => Some(UnqualifiedJoinKind::CrossApply),
                JoinOperator::OuterApply => Some(UnqualifiedJoinKind::OuterApply),
                _ => None,
            };

            current = if let Some(join) = unqualified {
                self.b
                    .push(NodeKind::UnqualifiedJoin { join }, vec![current, second])
            } else {
                let (join, constraint) = qualified_join(&join.join_operator);
                let mut children = vec![current, second];
                if let Some(JoinConstraint::On(condition)) = constraint {
                    children.push(self.expr(condition));
                }
                self.b.push(NodeKind::QualifiedJoin { join }, children)
            };
        }

        current
    }

    fn table_factor(&mut self, factor: &TableFactor) -> NodeId {
        match factor {
            TableFactor::Table {
                name, alias, args, ..
            } => {
                let alias = alias.as_ref().map(|a| self.ident(&a.name));
                let name = self.name(name);
                let span = name.span();
                let kind = if args.is_some() {
                    NodeKind::TableFunction { name, alias }
                } else if name.is_single() && name.object_name().starts_with('@') {
                    NodeKind::VariableTableReference {
                        variable: name.object_name().to_string(),
                        alias,
                    }
                } else {
                    NodeKind::NamedTableReference { name, alias }
                };
                self.b.push_spanned(kind, span, Vec::new())
            }
            TableFactor::Derived {
                subquery, alias, ..
            } => {
                let alias = alias.as_ref().map(|a| self.ident(&a.name));
                let body = self.set_expr(&subquery.body);
                self.b.push(NodeKind::DerivedTable { alias }, vec![body])
            }
            TableFactor::NestedJoin {
                table_with_joins, ..
            } => self.table_with_joins(table_with_joins),
            TableFactor::Function { name, alias, .. } => {
                let alias = alias.as_ref().map(|a| self.ident(&a.name));
                let name = self.name(name);
                self.b.leaf(NodeKind::TableFunction { name, alias })
            }
            TableFactor::TableFunction { alias, .. } => {
                let alias = alias.as_ref().map(|a| self.ident(&a.name));
                self.b.leaf(NodeKind::TableFunction {
                    name: MultiPartName::new(Vec::new()),
                    alias,
                })
            }
            _ => self.b.leaf(NodeKind::Other),
        }
    }

    fn dml_statement(&mut self, kind: NodeKind, with: Option<NodeId>, spec: NodeId) -> NodeId {
        let mut children = Vec::new();
        children.extend(with);
        children.push(spec);
        self.b.push(kind, children)
    }

    fn insert(&mut self, with: Option<NodeId>, insert: &Insert) -> NodeId {
        let name = self.name(&insert.table_name);
        let alias = insert.table_alias.as_ref().map(|a| self.ident(a));
        let span = name.span();
        let target =
            self.b
                .push_spanned(NodeKind::NamedTableReference { name, alias }, span, Vec::new());

        let mut children = vec![target];
        if !insert.columns.is_empty() {
            let columns = insert
                .columns
                .iter()
                .map(|c| self.column_reference(std::slice::from_ref(c)))
                .collect();
            children.push(self.b.push(NodeKind::ColumnList, columns));
        }
        if let Some(source) = &insert.source {
            children.push(self.set_expr(&source.body));
        }

        let spec = self.b.push(NodeKind::InsertSpecification, children);
        self.dml_statement(NodeKind::InsertStatement, with, spec)
    }

    fn update(
        &mut self,
        with: Option<NodeId>,
        table: &TableWithJoins,
        assignments: &[Assignment],
        from: Option<&TableWithJoins>,
        selection: Option<&Expr>,
    ) -> NodeId {
        let mut children = vec![self.table_factor(&table.relation)];
        for assignment in assignments {
            children.push(self.set_clause(assignment));
        }
        if let Some(from) = from {
            let source = self.table_with_joins(from);
            children.push(self.b.push(NodeKind::FromClause, vec![source]));
        }
        if let Some(selection) = selection {
            let condition = self.expr(selection);
            children.push(self.b.push(NodeKind::WhereClause, vec![condition]));
        }

        let spec = self.b.push(NodeKind::UpdateSpecification, children);
        self.dml_statement(NodeKind::UpdateStatement, with, spec)
    }

    fn set_clause(&mut self, assignment: &Assignment) -> NodeId {
        let target = match &assignment.target {
            AssignmentTarget::ColumnName(name) => match name.0.as_slice() {
                [single] if single.value.starts_with('@') => {
                    self.b.leaf(NodeKind::VariableReference {
                        name: single.value.clone(),
                    })
                }
                parts => self.column_reference(parts),
            },
            AssignmentTarget::Tuple(_) => self.b.leaf(NodeKind::Expression),
        };
        let value = self.expr(&assignment.value);
        self.b.push(NodeKind::SetClause, vec![target, value])
    }

    fn delete(&mut self, delete: &Delete) -> NodeId {
        let tables = match &delete.from {
            FromTable::WithFromKeyword(tables) => tables.as_slice(),
            FromTable::WithoutKeyword(tables) => tables.as_slice(),
        };

        // DELETE alias FROM Orders alias JOIN ... names its target separately;
        // DELETE FROM Orders targets the first FROM table.
        let mut children = Vec::new();
        let from_sources: &[TableWithJoins] = match (delete.tables.first(), tables.split_first()) {
            (Some(target), _) => {
                let name = self.name(target);
                let span = name.span();
                children.push(self.b.push_spanned(
                    NodeKind::NamedTableReference { name, alias: None },
                    span,
                    Vec::new(),
                ));
                tables
            }
            (None, Some((first, rest))) => {
                children.push(self.table_factor(&first.relation));
                if first.joins.is_empty() && rest.is_empty() {
                    &[]
                } else {
                    tables
                }
            }
            (None, None) => &[],
        };

        let mut sources: Vec<NodeId> = from_sources
            .iter()
            .map(|t| self.table_with_joins(t))
            .collect();
        if let Some(using) = &delete.using {
            sources.extend(using.iter().map(|t| self.table_with_joins(t)));
        }
        if !sources.is_empty() {
            children.push(self.b.push(NodeKind::FromClause, sources));
        }

        if let Some(selection) = &delete.selection {
            let condition = self.expr(selection);
            children.push(self.b.push(NodeKind::WhereClause, vec![condition]));
        }

        let spec = self.b.push(NodeKind::DeleteSpecification, children);
        self.dml_statement(NodeKind::DeleteStatement, None, spec)
    }

    fn merge(
        &mut self,
        table: &TableFactor,
        source: &TableFactor,
        on: &Expr,
        clauses: &[MergeClause],
    ) -> NodeId {
        // The target alias is carried by the MERGE specification, not the target reference
        let (target, alias) = match table {
            TableFactor::Table { name, alias, .. } => {
                let alias = alias.as_ref().map(|a| self.ident(&a.name));
                let name = self.name(name);
                let span = name.span();
                let target = self.b.push_spanned(
                    NodeKind::NamedTableReference { name, alias: None },
                    span,
                    Vec::new(),
                );
                (target, alias)
            }
            other => (self.table_factor(other), None),
        };

        let source = self.table_factor(source);
        let condition = self.expr(on);
        let mut children = vec![target, source, condition];

        for clause in clauses {
            let mut action = Vec::new();
            if let Some(predicate) = &clause.predicate {
                action.push(self.expr(predicate));
            }
            match &clause.action {
                MergeAction::Update { assignments } => {
                    for assignment in assignments {
                        action.push(self.set_clause(assignment));
                    }
                }
                MergeAction::Insert(insert) => {
                    if !insert.columns.is_empty() {
                        let columns = insert
                            .columns
                            .iter()
                            .map(|c| self.column_reference(std::slice::from_ref(c)))
                            .collect();
                        action.push(self.b.push(NodeKind::ColumnList, columns));
                    }
                    if let MergeInsertKind::Values(values) = &insert.kind {
                        for value in values.rows.iter().flatten() {
                            action.push(self.expr(value));
                        }
                    }
                }
                _ => {}
            }
            children.push(self.b.push(NodeKind::MergeAction, action));
        }

        let spec = self
            .b
            .push(NodeKind::MergeSpecification { alias }, children);
        self.dml_statement(NodeKind::MergeStatement, None, spec)
    }

    fn column_reference(&mut self, parts: &[ast::Ident]) -> NodeId {
        let parts: Vec<Identifier> = parts.iter().map(|p| self.ident(p)).collect();
        let span = parts.last().map(|p| p.span).unwrap_or_default();
        self.b
            .push_spanned(NodeKind::ColumnReference { parts }, span, Vec::new())
    }

    pub(super) fn expr(&mut self, expr: &Expr) -> NodeId {
        match expr {
            Expr::Identifier(ident) if ident.value.starts_with('@') => {
                let span = Span::from_sqlparser(&ident.span, self.line_offset);
                self.b.push_spanned(
                    NodeKind::VariableReference {
                        name: ident.value.clone(),
                    },
                    span,
                    Vec::new(),
                )
            }
            Expr::Identifier(ident) => self.column_reference(std::slice::from_ref(ident)),
            Expr::CompoundIdentifier(idents) => self.column_reference(idents),
            Expr::Value(value) => self.b.leaf(NodeKind::Literal(lower_value(value))),
            Expr::BinaryOp { left, op, right } => {
                let kind = match op {
                    BinaryOperator::Eq => NodeKind::Comparison { op: ComparisonOp::Eq },
                    BinaryOperator::NotEq => NodeKind::Comparison {
                        op: ComparisonOp::NotEq,
                    },
                    BinaryOperator::Lt => NodeKind::Comparison { op: ComparisonOp::Lt },
                    BinaryOperator::LtEq => NodeKind::Comparison {
                        op: ComparisonOp::LtEq,
                    },
                    BinaryOperator::Gt => NodeKind::Comparison { op: ComparisonOp::Gt },
                    BinaryOperator::GtEq => NodeKind::Comparison {
                        op: ComparisonOp::GtEq,
                    },
                    BinaryOperator::And => NodeKind::BooleanBinary { op: BooleanOp::And },
                    BinaryOperator::Or => NodeKind::BooleanBinary { op: BooleanOp::Or },
                    _ => NodeKind::Expression,
                };
                let left = self.expr(left);
                let right = self.expr(right);
                self.b.push(kind, vec![left, right])
            }
            Expr::UnaryOp { op, expr } => {
                let kind = match op {
                    UnaryOperator::Not => NodeKind::BooleanNot,
                    _ => NodeKind::Expression,
                };
                let operand = self.expr(expr);
                self.b.push(kind, vec![operand])
            }
            Expr::Nested(inner) => {
                let inner = self.expr(inner);
                self.b.push(NodeKind::Parenthesis, vec![inner])
            }
            Expr::Function(func) => {
                let name = self.name(&func.name);
                let args = self.function_args(&func.args);
                self.b.push(NodeKind::FunctionCall { name }, args)
            }
            Expr::InList { expr, list, .. } => {
                let mut children = vec![self.expr(expr)];
                children.extend(list.iter().map(|e| self.expr(e)));
                self.b.push(NodeKind::Expression, children)
            }
            Expr::InSubquery { expr, subquery, .. } => {
                let operand = self.expr(expr);
                let body = self.set_expr(&subquery.body);
                let subquery = self.b.push(NodeKind::Subquery, vec![body]);
                self.b.push(NodeKind::Expression, vec![operand, subquery])
            }
            Expr::Subquery(query) | Expr::Exists { subquery: query, .. } => {
                let body = self.set_expr(&query.body);
                self.b.push(NodeKind::Subquery, vec![body])
            }
            Expr::Between {
                expr, low, high, ..
            } => {
                let children = vec![self.expr(expr), self.expr(low), self.expr(high)];
                self.b.push(NodeKind::Expression, children)
            }
            Expr::Case {
                operand,
                conditions,
                results,
                else_result,
            } => {
                let mut children = Vec::new();
                if let Some(op) = operand {
                    children.push(self.expr(op));
                }
                for (condition, result) in conditions.iter().zip(results) {
                    children.push(self.expr(condition));
                    children.push(self.expr(result));
                }
                if let Some(else_result) = else_result {
                    children.push(self.expr(else_result));
                }
                self.b.push(NodeKind::Expression, children)
            }
            Expr::IsNull(e) | Expr::IsNotNull(e) => {
                let operand = self.expr(e);
                self.b.push(NodeKind::Expression, vec![operand])
            }
            Expr::Cast { expr, .. } => {
                let operand = self.expr(expr);
                self.b.push(NodeKind::Expression, vec![operand])
            }
            Expr::Like { expr, pattern, .. } => {
                let children = vec![self.expr(expr), self.expr(pattern)];
                self.b.push(NodeKind::Expression, children)
            }
            _ => self.b.leaf(NodeKind::Expression),
        }
    }

    fn function_args(&mut self, args: &FunctionArguments) -> Vec<NodeId> {
        let mut lowered = Vec::new();
        if let FunctionArguments::List(arg_list) = args {
            for arg in &arg_list.args {
                match arg {
                    FunctionArg::Unnamed(FunctionArgExpr::Expr(e)) => lowered.push(self.expr(e)),
                    FunctionArg::Named { arg, .. } | FunctionArg::ExprNamed { arg, .. } => {
                        if let FunctionArgExpr::Expr(e) = arg {
                            lowered.push(self.expr(e));
                        }
                    }
                    _ => {}
                }
            }
        }
        lowered
    }
}

fn qualified_join(op: &JoinOperator) -> (JoinKind, Option<&JoinConstraint>) {
    match op {
        JoinOperator::Inner(c) => (JoinKind::Inner, Some(c)),
        JoinOperator::LeftOuter(c) => (JoinKind::LeftOuter, Some(c)),
        JoinOperator::RightOuter(c) => (JoinKind::RightOuter, Some(c)),
        JoinOperator::FullOuter(c) => (JoinKind::FullOuter, Some(c)),
        _ => (JoinKind::Inner, None),
    }
}

fn variable_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Identifier(ident) if ident.value.starts_with('@') => Some(ident.value.clone()),
        _ => None,
    }
}

fn lower_value(value: &Value) -> Literal {
    match value {
        Value::Number(n, _) => n
            .parse::<i64>()
            .map(Literal::Integer)
            .unwrap_or_else(|_| Literal::Number(n.clone())),
        Value::SingleQuotedString(s) | Value::NationalStringLiteral(s) => Literal::String(s.clone()),
        Value::Boolean(b) => Literal::Boolean(*b),
        Value::Null => Literal::Null,
        other => Literal::String(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(tree: &SyntaxTree) -> Vec<&NodeKind> {
        tree.ids().map(|id| tree.kind(id)).collect()
    }

    #[test]
    fn test_split_batches_on_go() {
        let sql = "CREATE TABLE a (id INT)\nGO\nSELECT 1\ngo 2\n\nSELECT 2";
        let batches = split_batches(sql);
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].line_offset, 0);
        assert_eq!(batches[1].text.trim(), "SELECT 1");
        assert_eq!(batches[1].line_offset, 2);
        assert_eq!(batches[2].line_offset, 4);
    }

    #[test]
    fn test_go_inside_identifier_is_not_a_separator() {
        assert!(!is_batch_separator("GOTO done"));
        assert!(!is_batch_separator("SELECT go FROM t"));
        assert!(is_batch_separator("  Go  \n"));
    }

    #[test]
    fn test_parse_select_with_join() {
        let tree = parse_script("SELECT o.id FROM orders o JOIN users u ON o.user_id = u.id")
            .expect("valid sql");
        let joins = kinds(&tree)
            .into_iter()
            .filter(|k| matches!(k, NodeKind::QualifiedJoin { .. }))
            .count();
        assert_eq!(joins, 1);
        assert_eq!(tree.top_level_statements().len(), 1);
    }

    #[test]
    fn test_parse_select_into_temp_table() {
        let tree = parse_script("SELECT id INTO #recent FROM orders").expect("valid sql");
        let stmt = tree.top_level_statements()[0];
        match tree.kind(stmt) {
            NodeKind::SelectStatement { into: Some(name) } => {
                assert_eq!(name.object_name(), "#recent")
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_failure_reports_batch() {
        let err = parse_script("SELECT 1\nGO\nSELECT * FROM t WHERE (").unwrap_err();
        assert_eq!(err.batch, 2);
        assert_eq!(err.line, 3);
    }

    #[test]
    fn test_identifier_spans_shift_with_batches() {
        let tree = parse_script("SELECT 1\nGO\nSELECT id FROM orders").expect("valid sql");
        let table = tree
            .ids()
            .find(|&id| matches!(tree.kind(id), NodeKind::NamedTableReference { .. }))
            .expect("table reference");
        assert_eq!(tree.node(table).span.line, 3);
    }
}
