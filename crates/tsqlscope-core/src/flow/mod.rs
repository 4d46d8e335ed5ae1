//! Reaching-assignment analysis for routine bodies
//!
//! Answers whether a variable (typically an OUTPUT parameter) is assigned on
//! every path through a routine body. Each statement yields a
//! [`BranchOutcome`], and compound statements compose the outcomes of their
//! parts: sequences in order, IF/ELSE and TRY/CATCH as two alternative arms,
//! WHILE depending on whether its predicate is constantly true.

use crate::syntax::{BooleanOp, ComparisonOp, Literal, NodeId, NodeKind, SyntaxTree};

/// State of the variable on paths that leave a statement through one kind of jump
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Exit {
    /// No path leaves this way
    #[default]
    None,
    /// Every path leaving this way has assigned the variable
    Assigned,
    /// Some path leaving this way has not
    Unassigned,
}

impl Exit {
    fn merge(self, other: Exit) -> Exit {
        match (self, other) {
            (Exit::Unassigned, _) | (_, Exit::Unassigned) => Exit::Unassigned,
            (Exit::Assigned, _) | (_, Exit::Assigned) => Exit::Assigned,
            _ => Exit::None,
        }
    }

    /// Exits of a statement that runs after the variable was assigned
    fn after_assignment(self) -> Exit {
        match self {
            Exit::None => Exit::None,
            _ => Exit::Assigned,
        }
    }
}

/// What one statement does to the variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BranchOutcome {
    /// Every path falling through the statement has assigned the variable
    pub assigned: bool,
    /// No path falls through: control leaves by BREAK, CONTINUE, THROW, GOTO or RETURN
    pub skipped: bool,
    /// Paths leaving the enclosing loop with BREAK
    pub breaks: Exit,
    /// Paths leaving the routine with RETURN
    pub returns: Exit,
}

impl BranchOutcome {
    const ASSIGNED: BranchOutcome = BranchOutcome {
        assigned: true,
        skipped: false,
        breaks: Exit::None,
        returns: Exit::None,
    };

    const JUMP: BranchOutcome = BranchOutcome {
        assigned: false,
        skipped: true,
        breaks: Exit::None,
        returns: Exit::None,
    };

    /// Two alternative arms, exactly one of which runs. When both arms jump,
    /// `assigned` records whether both assigned before jumping.
    fn either(first: BranchOutcome, second: BranchOutcome) -> BranchOutcome {
        let skipped = first.skipped && second.skipped;
        let assigned = if skipped {
            first.assigned && second.assigned
        } else {
            (first.assigned || first.skipped) && (second.assigned || second.skipped)
        };
        BranchOutcome {
            assigned,
            skipped,
            breaks: first.breaks.merge(second.breaks),
            returns: first.returns.merge(second.returns),
        }
    }
}

/// Whether `variable` is assigned on every path through `body`
pub fn is_assigned_on_all_paths(tree: &SyntaxTree, body: NodeId, variable: &str) -> bool {
    AssignmentFlowAnalyzer::new(tree, variable).is_assigned_on_all_paths(body)
}

/// Analysis of one variable in one routine body; holds no state between calls
#[derive(Debug, Clone, Copy)]
pub struct AssignmentFlowAnalyzer<'t> {
    tree: &'t SyntaxTree,
    variable: &'t str,
}

impl<'t> AssignmentFlowAnalyzer<'t> {
    pub fn new(tree: &'t SyntaxTree, variable: &'t str) -> Self {
        Self { tree, variable }
    }

    /// A RETURN reached before the assignment makes the answer false. A body
    /// with no fall-through path is assigned when every RETURN has assigned.
    pub fn is_assigned_on_all_paths(&self, body: NodeId) -> bool {
        let outcome = self.analyze(body);
        tracing::trace!(variable = self.variable, ?outcome, "assignment flow");
        let falls_through_assigned =
            outcome.assigned || (outcome.skipped && outcome.returns == Exit::Assigned);
        falls_through_assigned && outcome.returns != Exit::Unassigned
    }

    pub fn analyze(&self, statement: NodeId) -> BranchOutcome {
        let node = self.tree.node(statement);
        let children = node.children();
        match &node.kind {
            NodeKind::StatementList | NodeKind::Batch | NodeKind::Script => {
                self.sequence(children)
            }
            NodeKind::If => {
                let then = children.get(1).map(|&s| self.analyze(s)).unwrap_or_default();
                let otherwise = children.get(2).map(|&s| self.analyze(s)).unwrap_or_default();
                BranchOutcome::either(then, otherwise)
            }
            NodeKind::TryCatch => {
                let body = children.first().map(|&s| self.analyze(s)).unwrap_or_default();
                let handler = children.get(1).map(|&s| self.analyze(s)).unwrap_or_default();
                BranchOutcome::either(body, handler)
            }
            NodeKind::While => self.while_loop(children),
            NodeKind::SetVariable { variable } if self.is_target(variable) => {
                BranchOutcome::ASSIGNED
            }
            NodeKind::Execute {
                return_variable, ..
            } => {
                let captured = return_variable.as_deref().is_some_and(|v| self.is_target(v));
                let output = children.iter().any(|&arg| {
                    matches!(
                        self.tree.kind(arg),
                        NodeKind::ExecuteArgument { variable: Some(v), output: true } if self.is_target(v)
                    )
                });
                if captured || output {
                    BranchOutcome::ASSIGNED
                } else {
                    BranchOutcome::default()
                }
            }
            NodeKind::SelectStatement { .. }
            | NodeKind::UpdateStatement
            | NodeKind::MergeStatement
                if self.assigns_in_query(statement) =>
            {
                BranchOutcome::ASSIGNED
            }
            NodeKind::Break => BranchOutcome {
                breaks: Exit::Unassigned,
                ..BranchOutcome::JUMP
            },
            NodeKind::Return => BranchOutcome {
                returns: Exit::Unassigned,
                ..BranchOutcome::JUMP
            },
            NodeKind::Continue | NodeKind::Throw | NodeKind::Goto { .. } => BranchOutcome::JUMP,
            _ => BranchOutcome::default(),
        }
    }

    fn sequence(&self, statements: &[NodeId]) -> BranchOutcome {
        let mut frame = BranchOutcome::default();
        for &statement in statements {
            // anything after a jump in the same frame is unreachable through it
            if frame.skipped {
                break;
            }
            let mut outcome = self.analyze(statement);
            if frame.assigned {
                outcome.assigned = true;
                outcome.breaks = outcome.breaks.after_assignment();
                outcome.returns = outcome.returns.after_assignment();
            }
            frame = BranchOutcome {
                assigned: outcome.assigned,
                skipped: outcome.skipped,
                breaks: frame.breaks.merge(outcome.breaks),
                returns: frame.returns.merge(outcome.returns),
            };
        }
        frame
    }

    /// Only a constantly true loop is known to run its body; a BREAK is then
    /// the only way out, so the loop assigns iff every BREAK path has.
    fn while_loop(&self, children: &[NodeId]) -> BranchOutcome {
        let (Some(&predicate), Some(&body)) = (children.first(), children.get(1)) else {
            return BranchOutcome::default();
        };
        let outcome = self.analyze(body);

        if self.constant_truth(predicate) == Some(true) {
            BranchOutcome {
                assigned: outcome.breaks == Exit::Assigned,
                skipped: outcome.breaks == Exit::None,
                breaks: Exit::None,
                returns: outcome.returns,
            }
        } else {
            // may run zero times
            BranchOutcome {
                returns: outcome.returns,
                ..BranchOutcome::default()
            }
        }
    }

    /// `SELECT @v = ...`, `UPDATE ... SET @v = ...`
    fn assigns_in_query(&self, statement: NodeId) -> bool {
        let mut stack = vec![statement];
        while let Some(node) = stack.pop() {
            let syntax = self.tree.node(node);
            match &syntax.kind {
                NodeKind::SelectSetVariable { variable } if self.is_target(variable) => {
                    return true
                }
                NodeKind::SetClause => {
                    let target = syntax.children().first().map(|&t| self.tree.kind(t));
                    if matches!(target, Some(NodeKind::VariableReference { name }) if self.is_target(name)) {
                        return true;
                    }
                }
                // nested query expressions may produce no rows
                NodeKind::Subquery => continue,
                _ => {}
            }
            stack.extend_from_slice(syntax.children());
        }
        false
    }

    fn is_target(&self, variable: &str) -> bool {
        variable.eq_ignore_ascii_case(self.variable)
    }

    /// Value of a predicate made only of constants
    fn constant_truth(&self, predicate: NodeId) -> Option<bool> {
        let node = self.tree.node(predicate);
        let children = node.children();
        match &node.kind {
            NodeKind::Literal(Literal::Boolean(value)) => Some(*value),
            NodeKind::Parenthesis => self.constant_truth(*children.first()?),
            NodeKind::BooleanNot => self.constant_truth(*children.first()?).map(|v| !v),
            NodeKind::BooleanBinary { op } => {
                let left = self.constant_truth(*children.first()?);
                let right = self.constant_truth(*children.get(1)?);
                match (op, left, right) {
                    (BooleanOp::And, Some(false), _) | (BooleanOp::And, _, Some(false)) => {
                        Some(false)
                    }
                    (BooleanOp::Or, Some(true), _) | (BooleanOp::Or, _, Some(true)) => Some(true),
                    (BooleanOp::And, Some(true), Some(true)) => Some(true),
                    (BooleanOp::Or, Some(false), Some(false)) => Some(false),
                    _ => None,
                }
            }
            NodeKind::Comparison { op } => {
                let left = self.constant(*children.first()?)?;
                let right = self.constant(*children.get(1)?)?;
                compare(*op, &left, &right)
            }
            _ => None,
        }
    }

    fn constant(&self, node: NodeId) -> Option<Literal> {
        match self.tree.kind(node) {
            NodeKind::Literal(literal) => Some(literal.clone()),
            NodeKind::Parenthesis => self.constant(*self.tree.node(node).children().first()?),
            _ => None,
        }
    }
}

fn compare(op: ComparisonOp, left: &Literal, right: &Literal) -> Option<bool> {
    let ordering = match (left, right) {
        (Literal::Integer(l), Literal::Integer(r)) => l.cmp(r),
        (Literal::String(l), Literal::String(r)) => l.cmp(r),
        _ => return None,
    };
    Some(match op {
        ComparisonOp::Eq => ordering.is_eq(),
        ComparisonOp::NotEq => ordering.is_ne(),
        ComparisonOp::Lt => ordering.is_lt(),
        ComparisonOp::LtEq => ordering.is_le(),
        ComparisonOp::Gt => ordering.is_gt(),
        ComparisonOp::GtEq => ordering.is_ge(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::{parse_script, TreeBuilder};
    use pretty_assertions::assert_eq;

    /// Body of the first procedure in `sql`
    fn assigned(sql: &str) -> bool {
        let tree = parse_script(sql).expect("valid sql");
        let body = tree
            .ids()
            .find(|&id| matches!(tree.kind(id), NodeKind::CreateProcedure { .. }))
            .and_then(|proc| tree.node(proc).children().first().copied())
            .expect("procedure body");
        is_assigned_on_all_paths(&tree, body, "@p")
    }

    fn proc(body: &str) -> String {
        format!("CREATE PROCEDURE dbo.P @x INT, @p INT OUTPUT AS\nBEGIN\n{}\nEND", body)
    }

    #[test]
    fn test_if_else_both_assign() {
        assert!(assigned(&proc("IF @x > 0 SET @p = 1 ELSE SET @p = 2")));
    }

    #[test]
    fn test_if_without_else() {
        assert!(!assigned(&proc("IF @x > 0 SET @p = 1")));
    }

    #[test]
    fn test_constant_true_loop_with_break() {
        assert!(assigned(&proc("WHILE 1 = 1 BEGIN SET @p = 1 BREAK END")));
    }

    #[test]
    fn test_loop_with_variable_predicate() {
        assert!(!assigned(&proc("WHILE @x > 0 SET @p = 1")));
    }

    #[test]
    fn test_throw_branch_does_not_block_other_branch() {
        assert!(assigned(&proc(
            "IF @x IS NULL\n  THROW 50000, 'missing', 1;\nELSE\n  SET @p = @x"
        )));
    }

    #[test]
    fn test_break_before_assignment_in_loop() {
        assert!(!assigned(&proc(
            "WHILE 1 = 1 BEGIN IF @x > 0 BREAK; SET @p = 1; BREAK END"
        )));
    }

    #[test]
    fn test_return_before_assignment() {
        assert!(!assigned(&proc("IF @x > 0 RETURN; SET @p = 1")));
        assert!(assigned(&proc("SET @p = 1; IF @x > 0 RETURN; SET @x = 2")));
    }

    #[test]
    fn test_every_arm_assigns_then_returns() {
        assert!(assigned(&proc(
            "IF @x > 0 BEGIN SET @p = 1 RETURN END ELSE BEGIN SET @p = 2 RETURN END"
        )));
        assert!(assigned(&proc(
            "BEGIN TRY SET @p = 1 RETURN END TRY BEGIN CATCH SET @p = 0 RETURN END CATCH"
        )));
        assert!(!assigned(&proc(
            "IF @x > 0 BEGIN SET @p = 1 RETURN END ELSE RETURN"
        )));
    }

    #[test]
    fn test_constant_true_loop_left_by_return() {
        assert!(assigned(&proc("WHILE 1 = 1 BEGIN SET @p = 1 IF @x > 0 RETURN END")));
        assert!(!assigned(&proc("WHILE 1 = 1 BEGIN IF @x > 0 RETURN SET @p = 1 END")));
        assert!(assigned(&proc("SET @p = 1 RETURN")));
    }

    #[test]
    fn test_body_that_only_throws() {
        assert!(!assigned(&proc("THROW 50000, 'unsupported', 1")));
    }

    #[test]
    fn test_both_arms_jump_after_assigning() {
        let mut b = TreeBuilder::new();
        let predicate = b.leaf(NodeKind::Literal(Literal::Boolean(true)));
        let set_then = b.set_variable("@p", 1);
        let ret_then = b.leaf(NodeKind::Return);
        let then = b.block(vec![set_then, ret_then]);
        let set_else = b.set_variable("@p", 2);
        let throw = b.leaf(NodeKind::Throw);
        let otherwise = b.block(vec![set_else, throw]);
        let branch = b.push(NodeKind::If, vec![predicate, then, otherwise]);
        let tree = b.finish(branch);

        let outcome = AssignmentFlowAnalyzer::new(&tree, "@p").analyze(branch);
        assert_eq!(
            outcome,
            BranchOutcome {
                assigned: true,
                skipped: true,
                breaks: Exit::None,
                returns: Exit::Assigned,
            }
        );
    }

    #[test]
    fn test_try_catch_mirrors_if_else() {
        assert!(assigned(&proc(
            "BEGIN TRY SET @p = 1 END TRY BEGIN CATCH SET @p = 0 END CATCH"
        )));
        assert!(!assigned(&proc(
            "BEGIN TRY SET @p = 1 END TRY BEGIN CATCH PRINT 'failed' END CATCH"
        )));
    }

    #[test]
    fn test_exec_return_value_and_output_argument() {
        assert!(assigned(&proc("EXEC @p = dbo.Other @x")));
        assert!(assigned(&proc("EXEC dbo.Other @x, @p OUTPUT")));
        assert!(!assigned(&proc("EXEC dbo.Other @x, @p")));
    }

    #[test]
    fn test_select_assignment() {
        assert!(assigned(&proc("SELECT @p = COUNT(*) FROM dbo.Orders")));
        assert!(!assigned(&proc(
            "IF EXISTS (SELECT @p = 1 FROM dbo.Orders) SET @x = 1"
        )));
    }

    #[test]
    fn test_variable_names_are_case_insensitive() {
        assert!(assigned(&proc("SET @P = 1")));
    }

    #[test]
    fn test_assignment_after_skip_is_unreachable() {
        let mut b = TreeBuilder::new();
        let jump = b.leaf(NodeKind::Goto {
            label: "done".into(),
        });
        let set = b.set_variable("@p", 1);
        let body = b.block(vec![jump, set]);
        let tree = b.finish(body);

        let outcome = AssignmentFlowAnalyzer::new(&tree, "@p").analyze(body);
        assert_eq!(
            outcome,
            BranchOutcome {
                assigned: false,
                skipped: true,
                breaks: Exit::None,
                returns: Exit::None,
            }
        );
    }

    #[test]
    fn test_constant_predicates() {
        let mut b = TreeBuilder::new();
        let one = b.int(1);
        let two = b.int(2);
        let lt = b.compare(ComparisonOp::Lt, one, two);
        let not = b.push(NodeKind::BooleanNot, vec![lt]);
        let var = b.variable("@x");
        let zero = b.int(0);
        let gt = b.compare(ComparisonOp::Gt, var, zero);
        let or = b.push(NodeKind::BooleanBinary { op: BooleanOp::Or }, vec![lt, gt]);
        let root = b.push(NodeKind::Expression, vec![not, or]);
        let tree = b.finish(root);

        let analyzer = AssignmentFlowAnalyzer::new(&tree, "@p");
        assert_eq!(analyzer.constant_truth(lt), Some(true));
        assert_eq!(analyzer.constant_truth(not), Some(false));
        assert_eq!(analyzer.constant_truth(gt), None);
        assert_eq!(analyzer.constant_truth(or), Some(true));
    }
}
