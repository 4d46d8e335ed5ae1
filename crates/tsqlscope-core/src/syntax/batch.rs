//! Statement-level parsing of one batch
//!
//! sqlparser parses the queries and DML. T-SQL control flow (IF, WHILE,
//! BEGIN...END, TRY...CATCH), variable statements, EXEC with OUTPUT arguments
//! and routine/table/view headers are parsed here, on the same token stream.

use sqlparser::dialect::MsSqlDialect;
use sqlparser::parser::{Parser, ParserError};
use sqlparser::tokenizer::{Token, TokenWithSpan, Tokenizer};

use super::lower::Lowerer;
use super::{Identifier, MultiPartName, NodeId, NodeKind, Parameter};
use crate::error::Span;

/// Parse one `GO`-free batch into top-level statement nodes
pub(super) fn parse_batch(text: &str, lowerer: &mut Lowerer) -> Result<Vec<NodeId>, ParserError> {
    let dialect = MsSqlDialect {};
    let tokens = Tokenizer::new(&dialect, text).tokenize_with_location()?;
    let parser = Parser::new(&dialect).with_tokens_with_locations(break_statements(tokens));
    let mut batch = BatchParser { parser, lowerer };
    batch.statements_until(|_| false)
}

/// Session options that follow `SET` as a statement rather than an UPDATE's SET clause
const SESSION_OPTIONS: &[&str] = &[
    "NOCOUNT",
    "XACT_ABORT",
    "ANSI_NULLS",
    "ANSI_PADDING",
    "ANSI_WARNINGS",
    "ANSI_NULL_DFLT_ON",
    "ARITHABORT",
    "CONCAT_NULL_YIELDS_NULL",
    "NUMERIC_ROUNDABORT",
    "QUOTED_IDENTIFIER",
    "TRANSACTION",
    "IDENTITY_INSERT",
    "DATEFIRST",
    "DATEFORMAT",
    "LANGUAGE",
    "LOCK_TIMEOUT",
    "DEADLOCK_PRIORITY",
    "ROWCOUNT",
    "STATISTICS",
    "IMPLICIT_TRANSACTIONS",
    "CONTEXT_INFO",
    "FMTONLY",
    "NOEXEC",
    "TEXTSIZE",
];

/// Words after `WITH` that make it an option list, not a CTE
const WITH_OPTIONS: &[&str] = &[
    "RECOMPILE",
    "ENCRYPTION",
    "SCHEMABINDING",
    "EXECUTE",
    "EXEC",
    "NATIVE_COMPILATION",
    "CHECK",
    "NOWAIT",
    "LOG",
    "SETERROR",
    "TIES",
    "ROLLUP",
    "CUBE",
    "RESULT",
];

/// Object kinds that may precede `IF EXISTS` inside a DROP statement
const DROP_TARGETS: &[&str] = &[
    "TABLE",
    "VIEW",
    "PROCEDURE",
    "PROC",
    "FUNCTION",
    "INDEX",
    "SCHEMA",
    "TRIGGER",
    "SYNONYM",
    "DATABASE",
    "TYPE",
    "SEQUENCE",
    "COLUMN",
    "CONSTRAINT",
    "USER",
    "ROLE",
];

fn keyword(token: &Token) -> Option<String> {
    match token {
        Token::Word(w) if w.quote_style.is_none() => Some(w.value.to_ascii_uppercase()),
        _ => None,
    }
}

fn is_variable(token: &Token) -> bool {
    matches!(token, Token::Word(w) if w.value.starts_with('@'))
}

/// Insert `;` in front of every keyword that starts a new statement.
///
/// T-SQL does not require statement terminators, and without them sqlparser
/// reads a following `IF`, `UPDATE`, ... as a table alias.
fn break_statements(tokens: Vec<TokenWithSpan>) -> Vec<TokenWithSpan> {
    let significant: Vec<usize> = tokens
        .iter()
        .enumerate()
        .filter(|(_, t)| !matches!(t.token, Token::Whitespace(_)))
        .map(|(idx, _)| idx)
        .collect();

    let mut breaks = vec![false; tokens.len()];
    let mut depth = 0usize;
    let mut case_depth = 0usize;
    let mut insert_pending = false;
    let mut cte_pending = false;
    let mut alter_pending = false;

    for (pos, &idx) in significant.iter().enumerate() {
        let token = &tokens[idx].token;
        let prev = pos
            .checked_sub(1)
            .map(|p| &tokens[significant[p]].token);
        let next = significant.get(pos + 1).map(|&i| &tokens[i].token);
        let next2 = significant.get(pos + 2).map(|&i| &tokens[i].token);

        match token {
            Token::LParen => depth += 1,
            Token::RParen => depth = depth.saturating_sub(1),
            Token::Word(_) => {
                let Some(kw) = keyword(token) else { continue };
                if kw == "CASE" {
                    case_depth += 1;
                    continue;
                }
                if kw == "END" && case_depth > 0 {
                    case_depth -= 1;
                    continue;
                }
                if depth > 0 || case_depth > 0 {
                    continue;
                }

                let ends_insert_target =
                    matches!(kw.as_str(), "SELECT" | "VALUES" | "EXEC" | "EXECUTE" | "DEFAULT");
                if insert_pending && ends_insert_target {
                    insert_pending = false;
                    continue;
                }
                let ends_cte = matches!(kw.as_str(), "SELECT" | "INSERT" | "UPDATE" | "DELETE" | "MERGE");
                if cte_pending && ends_cte {
                    cte_pending = false;
                    insert_pending = kw == "INSERT";
                    continue;
                }

                let prev_kw = prev.and_then(keyword);
                if starts_statement(&kw, prev, prev_kw.as_deref(), next, next2, alter_pending) {
                    if prev.is_some_and(|p| *p != Token::SemiColon) {
                        breaks[idx] = true;
                    }
                    insert_pending = kw == "INSERT";
                    cte_pending = kw == "WITH";
                    alter_pending = kw == "ALTER";
                } else if kw == "INSERT" {
                    insert_pending = true;
                }
            }
            _ => {}
        }
    }

    let mut out = Vec::with_capacity(tokens.len() + significant.len() / 8);
    for (idx, token) in tokens.into_iter().enumerate() {
        if breaks[idx] {
            out.push(TokenWithSpan {
                token: Token::SemiColon,
                span: token.span,
            });
        }
        out.push(token);
    }
    out
}

fn starts_statement(
    kw: &str,
    prev: Option<&Token>,
    prev_kw: Option<&str>,
    next: Option<&Token>,
    next2: Option<&Token>,
    alter_pending: bool,
) -> bool {
    let after_comma = prev == Some(&Token::Comma);

    match kw {
        "IF" => !follows(prev_kw, DROP_TARGETS),
        "WHILE" | "BEGIN" | "END" | "ELSE" | "BREAK" | "CONTINUE" | "RETURN" | "THROW"
        | "GOTO" | "DECLARE" | "PRINT" | "RAISERROR" | "USE" | "CREATE" | "TRUNCATE"
        | "COMMIT" | "ROLLBACK" | "OPEN" | "CLOSE" | "DEALLOCATE" | "GRANT" | "DENY"
        | "REVOKE" => true,
        "FETCH" => !follows(prev_kw, &["ROW", "ROWS"]),
        "ALTER" => !follows(prev_kw, &["OR"]),
        "DROP" => !alter_pending,
        "SET" => match next {
            Some(t) if is_variable(t) => true,
            Some(t) => keyword(t).is_some_and(|w| SESSION_OPTIONS.contains(&w.as_str())),
            None => false,
        },
        "INSERT" | "UPDATE" | "DELETE" | "MERGE" => {
            !after_comma && !follows(prev_kw, &["THEN", "ON", "AFTER", "FOR", "OF", "GRANT", "DENY", "REVOKE"])
        }
        "SELECT" => !follows(prev_kw, &["UNION", "ALL", "EXCEPT", "INTERSECT", "AS", "FOR", "DISTINCT"]),
        "EXEC" | "EXECUTE" => !after_comma && !follows(prev_kw, &["WITH", "GRANT", "DENY", "REVOKE"]),
        "WITH" => {
            let named = matches!(next, Some(Token::Word(w))
                if !WITH_OPTIONS.contains(&w.value.to_ascii_uppercase().as_str()));
            let body = matches!(next2, Some(Token::LParen))
                || next2.and_then(keyword).as_deref() == Some("AS");
            named && body
        }
        _ => false,
    }
}

fn follows(prev_kw: Option<&str>, words: &[&str]) -> bool {
    prev_kw.is_some_and(|p| words.contains(&p))
}

struct BatchParser<'a, 'l> {
    parser: Parser<'a>,
    lowerer: &'l mut Lowerer,
}

impl BatchParser<'_, '_> {
    fn peek(&self) -> Token {
        self.parser.peek_token().token
    }

    fn keyword_at(&self, n: usize) -> Option<String> {
        keyword(&self.parser.peek_nth_token(n).token)
    }

    fn at_keyword(&self, kw: &str) -> bool {
        self.keyword_at(0).as_deref() == Some(kw)
    }

    fn eat_keyword(&mut self, kw: &str) -> bool {
        if self.at_keyword(kw) {
            self.parser.next_token();
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, kw: &str) -> Result<(), ParserError> {
        if self.eat_keyword(kw) {
            Ok(())
        } else {
            self.error(&format!("Expected {}", kw))
        }
    }

    fn is_variable_at(&self, n: usize) -> bool {
        is_variable(&self.parser.peek_nth_token(n).token)
    }

    fn span_at_next(&self) -> Span {
        Span::from_sqlparser(&self.parser.peek_token().span, self.lowerer.line_offset)
    }

    fn error<T>(&self, message: &str) -> Result<T, ParserError> {
        let next = self.parser.peek_token();
        Err(ParserError::ParserError(format!(
            "{}, found: {} at Line: {}, Column: {}",
            message, next.token, next.span.start.line, next.span.start.column
        )))
    }

    fn skip_semicolons(&mut self) {
        while self.peek() == Token::SemiColon {
            self.parser.next_token();
        }
    }

    /// Consume everything up to the next statement break
    fn skip_to_end(&mut self) {
        while !matches!(self.peek(), Token::SemiColon | Token::EOF) {
            self.parser.next_token();
        }
    }

    /// Consume a parenthesized group, returning its text
    fn balanced(&mut self) -> String {
        let mut text = String::new();
        let mut depth = 0usize;
        loop {
            let token = self.parser.next_token().token;
            match token {
                Token::LParen => depth += 1,
                Token::RParen => depth = depth.saturating_sub(1),
                Token::EOF => break,
                _ => {}
            }
            text.push_str(&token.to_string());
            if depth == 0 {
                break;
            }
        }
        text
    }

    fn statements_until(&mut self, end: fn(&Self) -> bool) -> Result<Vec<NodeId>, ParserError> {
        let mut statements = Vec::new();
        loop {
            self.skip_semicolons();
            if self.peek() == Token::EOF || end(self) {
                break;
            }
            statements.push(self.statement()?);
        }
        Ok(statements)
    }

    fn required_statement(&mut self) -> Result<NodeId, ParserError> {
        self.skip_semicolons();
        if self.peek() == Token::EOF {
            return self.error("Expected a statement");
        }
        self.statement()
    }

    fn statement(&mut self) -> Result<NodeId, ParserError> {
        let kw = self.keyword_at(0);
        match kw.as_deref() {
            Some("IF") => self.if_statement(),
            Some("WHILE") => self.while_statement(),
            Some("BEGIN") => match self.keyword_at(1).as_deref() {
                Some("TRY") => self.try_catch(),
                Some("TRAN") | Some("TRANSACTION") | Some("DISTRIBUTED") => {
                    Ok(self.skipped(NodeKind::Other))
                }
                _ => self.block(),
            },
            Some("BREAK") => Ok(self.skipped(NodeKind::Break)),
            Some("CONTINUE") => Ok(self.skipped(NodeKind::Continue)),
            Some("RETURN") => Ok(self.skipped(NodeKind::Return)),
            Some("THROW") => Ok(self.skipped(NodeKind::Throw)),
            Some("GOTO") => self.goto(),
            Some("DECLARE") => self.declare(),
            Some("SET") if self.is_variable_at(1) => self.set_variable(),
            Some("EXEC") | Some("EXECUTE") if self.keyword_at(1).as_deref() != Some("AS") => {
                self.execute()
            }
            Some("USE") => self.use_database(),
            Some("CREATE") | Some("ALTER") => self.create(),
            Some("SET") | Some("EXEC") | Some("EXECUTE") | Some("PRINT") | Some("RAISERROR")
            | Some("COMMIT") | Some("ROLLBACK") | Some("SAVE") | Some("OPEN") | Some("CLOSE")
            | Some("DEALLOCATE") | Some("FETCH") | Some("GRANT") | Some("DENY")
            | Some("REVOKE") | Some("DROP") | Some("TRUNCATE") => Ok(self.skipped(NodeKind::Other)),
            Some(_) if self.parser.peek_nth_token(1).token == Token::Colon => self.label(),
            _ => {
                let stmt = self.parser.parse_statement()?;
                Ok(self.lowerer.statement(&stmt))
            }
        }
    }

    /// A statement whose operands the analysis does not need
    fn skipped(&mut self, kind: NodeKind) -> NodeId {
        let span = self.span_at_next();
        self.skip_to_end();
        self.lowerer.b.push_spanned(kind, span, Vec::new())
    }

    fn predicate(&mut self) -> Result<NodeId, ParserError> {
        let expr = self.parser.parse_expr()?;
        Ok(self.lowerer.expr(&expr))
    }

    fn if_statement(&mut self) -> Result<NodeId, ParserError> {
        let span = self.span_at_next();
        self.parser.next_token();
        let predicate = self.predicate()?;
        let then = self.required_statement()?;
        let mut children = vec![predicate, then];

        self.skip_semicolons();
        if self.eat_keyword("ELSE") {
            children.push(self.required_statement()?);
        }
        Ok(self.lowerer.b.push_spanned(NodeKind::If, span, children))
    }

    fn while_statement(&mut self) -> Result<NodeId, ParserError> {
        let span = self.span_at_next();
        self.parser.next_token();
        let predicate = self.predicate()?;
        let body = self.required_statement()?;
        Ok(self
            .lowerer
            .b
            .push_spanned(NodeKind::While, span, vec![predicate, body]))
    }

    fn block(&mut self) -> Result<NodeId, ParserError> {
        self.expect_keyword("BEGIN")?;
        let statements = self.statements_until(|p| p.at_keyword("END"))?;
        self.expect_keyword("END")?;
        Ok(self.lowerer.b.block(statements))
    }

    fn try_catch(&mut self) -> Result<NodeId, ParserError> {
        let span = self.span_at_next();
        self.expect_keyword("BEGIN")?;
        self.expect_keyword("TRY")?;
        let body = self.statements_until(|p| p.at_keyword("END"))?;
        self.expect_keyword("END")?;
        self.expect_keyword("TRY")?;

        self.skip_semicolons();
        self.expect_keyword("BEGIN")?;
        self.expect_keyword("CATCH")?;
        let handler = self.statements_until(|p| p.at_keyword("END"))?;
        self.expect_keyword("END")?;
        self.expect_keyword("CATCH")?;

        let body = self.lowerer.b.block(body);
        let handler = self.lowerer.b.block(handler);
        Ok(self
            .lowerer
            .b
            .push_spanned(NodeKind::TryCatch, span, vec![body, handler]))
    }

    fn goto(&mut self) -> Result<NodeId, ParserError> {
        let span = self.span_at_next();
        self.parser.next_token();
        let label = match self.parser.next_token().token {
            Token::Word(w) => w.value,
            _ => return self.error("Expected a label after GOTO"),
        };
        Ok(self
            .lowerer
            .b
            .push_spanned(NodeKind::Goto { label }, span, Vec::new()))
    }

    fn label(&mut self) -> Result<NodeId, ParserError> {
        let span = self.span_at_next();
        let name = match self.parser.next_token().token {
            Token::Word(w) => w.value,
            _ => return self.error("Expected a label"),
        };
        self.parser.next_token();
        Ok(self
            .lowerer
            .b
            .push_spanned(NodeKind::Label { name }, span, Vec::new()))
    }

    fn variable(&mut self) -> Result<String, ParserError> {
        match self.parser.next_token().token {
            Token::Word(w) if w.value.starts_with('@') => Ok(w.value),
            _ => self.error("Expected a variable"),
        }
    }

    fn declare(&mut self) -> Result<NodeId, ParserError> {
        let span = self.span_at_next();
        self.parser.next_token();
        let mut variables = Vec::new();
        let mut values = Vec::new();

        // cursor declarations (`DECLARE c CURSOR FOR ...`) carry no variables
        while self.is_variable_at(0) {
            variables.push(self.variable()?);
            self.eat_keyword("AS");
            if self.eat_keyword("TABLE") {
                if self.peek() == Token::LParen {
                    self.balanced();
                }
            } else if self.at_keyword("CURSOR") {
                break;
            } else {
                self.data_type()?;
            }

            if self.peek() == Token::Eq {
                self.parser.next_token();
                values.push(self.predicate()?);
            }
            if self.peek() != Token::Comma {
                break;
            }
            self.parser.next_token();
        }

        self.skip_to_end();
        Ok(self
            .lowerer
            .b
            .push_spanned(NodeKind::Declare { variables }, span, values))
    }

    fn set_variable(&mut self) -> Result<NodeId, ParserError> {
        let span = self.span_at_next();
        self.parser.next_token();
        let variable = self.variable()?;

        // `=` or a compound assignment such as `+=`
        if self.peek() != Token::Eq {
            self.parser.next_token();
        }
        if self.peek() != Token::Eq {
            return self.error("Expected = after variable");
        }
        self.parser.next_token();

        let value = self.predicate()?;
        Ok(self
            .lowerer
            .b
            .push_spanned(NodeKind::SetVariable { variable }, span, vec![value]))
    }

    fn at_statement_end(&self) -> bool {
        matches!(self.peek(), Token::SemiColon | Token::EOF)
            || self.at_keyword("END")
            || self.at_keyword("ELSE")
    }

    fn execute(&mut self) -> Result<NodeId, ParserError> {
        let span = self.span_at_next();
        self.parser.next_token();

        // EXEC ('dynamic sql')
        if self.peek() == Token::LParen {
            self.skip_to_end();
            return Ok(self.lowerer.b.push_spanned(NodeKind::Other, span, Vec::new()));
        }

        let mut return_variable = None;
        if self.is_variable_at(0) && self.parser.peek_nth_token(1).token == Token::Eq {
            return_variable = Some(self.variable()?);
            self.parser.next_token();
        }
        let procedure = self.object_name()?;

        let mut arguments = Vec::new();
        while !self.at_statement_end() && !self.at_keyword("WITH") {
            // @parameter = value
            if self.is_variable_at(0) && self.parser.peek_nth_token(1).token == Token::Eq {
                self.parser.next_token();
                self.parser.next_token();
            }

            let (variable, value) = if self.eat_keyword("DEFAULT") {
                (None, self.lowerer.b.leaf(NodeKind::Expression))
            } else {
                let expr = self.parser.parse_expr()?;
                let variable = match &expr {
                    sqlparser::ast::Expr::Identifier(ident) if ident.value.starts_with('@') => {
                        Some(ident.value.clone())
                    }
                    _ => None,
                };
                (variable, self.lowerer.expr(&expr))
            };
            let output = self.eat_keyword("OUTPUT") || self.eat_keyword("OUT");
            arguments.push(
                self.lowerer
                    .b
                    .push(NodeKind::ExecuteArgument { variable, output }, vec![value]),
            );

            if self.peek() != Token::Comma {
                break;
            }
            self.parser.next_token();
        }

        self.skip_to_end();
        Ok(self.lowerer.b.push_spanned(
            NodeKind::Execute {
                procedure,
                return_variable,
            },
            span,
            arguments,
        ))
    }

    fn use_database(&mut self) -> Result<NodeId, ParserError> {
        self.parser.next_token();
        let name = self.object_name()?;
        self.skip_to_end();
        match name.parts.into_iter().last() {
            Some(database) => {
                let span = database.span;
                Ok(self
                    .lowerer
                    .b
                    .push_spanned(NodeKind::Use { database }, span, Vec::new()))
            }
            None => self.error("Expected a database name"),
        }
    }

    /// `name`, `schema.name`, `db.schema.name` or `db..name`
    fn object_name(&mut self) -> Result<MultiPartName, ParserError> {
        let mut parts = Vec::new();
        loop {
            match self.peek() {
                Token::Word(_) => {
                    let token = self.parser.next_token();
                    if let Token::Word(w) = token.token {
                        let span = Span::from_sqlparser(&token.span, self.lowerer.line_offset);
                        parts.push(Identifier::with_span(w.value, span));
                    }
                }
                _ if parts.is_empty() => return self.error("Expected an object name"),
                _ => break,
            }
            if self.peek() != Token::Period {
                break;
            }
            while self.peek() == Token::Period {
                self.parser.next_token();
            }
        }
        Ok(MultiPartName::new(parts))
    }

    /// Type name with an optional parenthesized length: `NVARCHAR(50)`, `dbo.IdList`
    fn data_type(&mut self) -> Result<String, ParserError> {
        let mut text = self.object_name()?.to_string();
        if self.peek() == Token::LParen {
            text.push_str(&self.balanced());
        }
        Ok(text)
    }

    fn create(&mut self) -> Result<NodeId, ParserError> {
        let mut kind_at = 1;
        if self.keyword_at(1).as_deref() == Some("OR") && self.keyword_at(2).as_deref() == Some("ALTER") {
            kind_at = 3;
        }

        // indexes, types, logins, ALTER TABLE ...: nothing the catalog records
        let kind = self.keyword_at(kind_at);
        let defines = match kind.as_deref() {
            Some("PROCEDURE") | Some("PROC") | Some("FUNCTION") | Some("SYNONYM")
            | Some("TRIGGER") | Some("VIEW") => true,
            Some("TABLE") => self.at_keyword("CREATE"),
            _ => false,
        };
        if !defines {
            return Ok(self.skipped(NodeKind::Other));
        }

        for _ in 0..=kind_at {
            self.parser.next_token();
        }
        match kind.as_deref() {
            Some("PROCEDURE") | Some("PROC") => self.routine(true),
            Some("FUNCTION") => self.routine(false),
            Some("SYNONYM") => self.synonym(),
            Some("TRIGGER") => self.trigger(),
            Some("VIEW") => self.view(),
            _ => self.table(),
        }
    }

    fn routine(&mut self, procedure: bool) -> Result<NodeId, ParserError> {
        let name = self.object_name()?;
        let parenthesized = self.peek() == Token::LParen;
        if parenthesized {
            self.parser.next_token();
        }

        let mut parameters = Vec::new();
        while self.is_variable_at(0) {
            parameters.push(self.parameter()?);
            if self.peek() != Token::Comma {
                break;
            }
            self.parser.next_token();
        }
        if parenthesized {
            if self.peek() != Token::RParen {
                return self.error("Expected ) after parameters");
            }
            self.parser.next_token();
        }

        self.skip_past_as()?;
        let statements = self.statements_until(|_| false)?;
        let body = self.lowerer.b.block(statements);
        let span = name.span();
        let kind = if procedure {
            NodeKind::CreateProcedure { name, parameters }
        } else {
            NodeKind::CreateFunction { name, parameters }
        };
        Ok(self.lowerer.b.push_spanned(kind, span, vec![body]))
    }

    fn parameter(&mut self) -> Result<Parameter, ParserError> {
        let name = self.variable()?;
        self.eat_keyword("AS");
        let data_type = self.data_type()?;
        let mut output = false;
        loop {
            if self.peek() == Token::Eq {
                self.parser.next_token();
                self.parser.parse_expr()?;
            } else if self.eat_keyword("OUTPUT") || self.eat_keyword("OUT") {
                output = true;
            } else if !(self.eat_keyword("VARYING") || self.eat_keyword("READONLY") || self.eat_keyword("NULL")) {
                break;
            }
        }
        Ok(Parameter::new(name, Some(data_type), output))
    }

    /// Skip routine options (`RETURNS ...`, `WITH EXECUTE AS OWNER`) up to the body's `AS`
    fn skip_past_as(&mut self) -> Result<(), ParserError> {
        let mut depth = 0usize;
        let mut previous: Option<String> = None;
        loop {
            let token = self.peek();
            match &token {
                Token::EOF => return self.error("Expected AS"),
                Token::LParen => depth += 1,
                Token::RParen => depth = depth.saturating_sub(1),
                _ => {}
            }
            let kw = keyword(&token);
            let execute_as = matches!(previous.as_deref(), Some("EXECUTE") | Some("EXEC"));
            self.parser.next_token();
            if depth == 0 && kw.as_deref() == Some("AS") && !execute_as {
                return Ok(());
            }
            previous = kw;
        }
    }

    fn synonym(&mut self) -> Result<NodeId, ParserError> {
        let name = self.object_name()?;
        self.expect_keyword("FOR")?;
        let target = self.object_name()?;
        self.skip_to_end();
        let span = name.span();
        Ok(self
            .lowerer
            .b
            .push_spanned(NodeKind::CreateSynonym { name, target }, span, Vec::new()))
    }

    /// Triggers are not catalog objects, but their bodies are still analyzed
    fn trigger(&mut self) -> Result<NodeId, ParserError> {
        let span = self.span_at_next();
        self.object_name()?;
        self.skip_past_as()?;
        let statements = self.statements_until(|_| false)?;
        let body = self.lowerer.b.block(statements);
        Ok(self.lowerer.b.push_spanned(NodeKind::Other, span, vec![body]))
    }

    fn view(&mut self) -> Result<NodeId, ParserError> {
        let name = self.object_name()?;
        let mut columns = Vec::new();
        if self.peek() == Token::LParen {
            self.parser.next_token();
            while let Token::Word(_) = self.peek() {
                let token = self.parser.next_token();
                if let Token::Word(w) = token.token {
                    let span = Span::from_sqlparser(&token.span, self.lowerer.line_offset);
                    columns.push(Identifier::with_span(w.value, span));
                }
                if self.peek() != Token::Comma {
                    break;
                }
                self.parser.next_token();
            }
            if self.peek() != Token::RParen {
                return self.error("Expected ) after view columns");
            }
            self.parser.next_token();
        }

        self.skip_past_as()?;
        self.skip_semicolons();
        let query = self.parser.parse_query()?;
        let body = self.lowerer.query_statement(&query);
        self.skip_to_end();

        let span = name.span();
        Ok(self
            .lowerer
            .b
            .push_spanned(NodeKind::CreateView { name, columns }, span, vec![body]))
    }

    fn table(&mut self) -> Result<NodeId, ParserError> {
        let name = self.object_name()?;
        if self.peek() != Token::LParen {
            return self.error("Expected ( after table name");
        }
        self.parser.next_token();

        let mut columns = Vec::new();
        loop {
            let is_constraint = matches!(
                self.keyword_at(0).as_deref(),
                Some("CONSTRAINT") | Some("PRIMARY") | Some("UNIQUE") | Some("FOREIGN")
                    | Some("CHECK") | Some("INDEX") | Some("PERIOD")
            );
            if !is_constraint {
                if let Token::Word(_) = self.peek() {
                    let token = self.parser.next_token();
                    if let Token::Word(w) = token.token {
                        let span = Span::from_sqlparser(&token.span, self.lowerer.line_offset);
                        // computed columns (`Total AS Qty * Price`) have no declared type
                        let data_type = if self.at_keyword("AS") {
                            None
                        } else {
                            Some(self.data_type()?)
                        };
                        columns.push(self.lowerer.b.push_spanned(
                            NodeKind::ColumnDefinition {
                                name: Identifier::with_span(w.value, span),
                                data_type,
                            },
                            span,
                            Vec::new(),
                        ));
                    }
                }
            }

            // rest of the element: constraints, defaults, collation
            loop {
                match self.peek() {
                    Token::Comma | Token::RParen | Token::EOF => break,
                    Token::LParen => {
                        self.balanced();
                    }
                    _ => {
                        self.parser.next_token();
                    }
                }
            }
            match self.parser.next_token().token {
                Token::Comma => continue,
                Token::RParen => break,
                _ => return self.error("Expected ) after table columns"),
            }
        }

        self.skip_to_end();
        let span = name.span();
        Ok(self
            .lowerer
            .b
            .push_spanned(NodeKind::CreateTable { name }, span, columns))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::{parse_script, SyntaxTree};

    fn parse(sql: &str) -> SyntaxTree {
        parse_script(sql).expect("valid sql")
    }

    fn count(tree: &SyntaxTree, pred: impl Fn(&NodeKind) -> bool) -> usize {
        tree.ids().filter(|&id| pred(tree.kind(id))).count()
    }

    #[test]
    fn test_statements_without_semicolons() {
        let tree = parse("SELECT a FROM t\nUPDATE t SET a = 1\nSELECT b FROM u");
        assert_eq!(tree.top_level_statements().len(), 3);
        let aliases = count(&tree, |k| {
            matches!(k, NodeKind::NamedTableReference { alias: Some(_), .. })
        });
        assert_eq!(aliases, 0);
    }

    #[test]
    fn test_if_else_blocks() {
        let tree = parse(
            "IF @x = 1\nBEGIN\n  SET @p = 1\nEND\nELSE\n  SET @p = 2",
        );
        let stmt = tree.top_level_statements()[0];
        assert!(matches!(tree.kind(stmt), NodeKind::If));
        assert_eq!(tree.node(stmt).children().len(), 3);
        assert_eq!(count(&tree, |k| matches!(k, NodeKind::SetVariable { .. })), 2);
    }

    #[test]
    fn test_procedure_with_output_parameter() {
        let tree = parse(
            "CREATE PROCEDURE dbo.GetTotal @id INT, @total DECIMAL(10, 2) OUTPUT\nAS\nBEGIN\n  SET NOCOUNT ON\n  SELECT @total = SUM(amount) FROM orders WHERE id = @id\nEND",
        );
        let stmt = tree.top_level_statements()[0];
        match tree.kind(stmt) {
            NodeKind::CreateProcedure { name, parameters } => {
                assert_eq!(name.to_string(), "dbo.GetTotal");
                assert_eq!(parameters.len(), 2);
                assert!(!parameters[0].output);
                assert!(parameters[1].output);
                assert_eq!(parameters[1].data_type.as_deref(), Some("DECIMAL(10,2)"));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(count(&tree, |k| matches!(k, NodeKind::SelectSetVariable { .. })), 1);
    }

    #[test]
    fn test_execute_with_output_argument() {
        let tree = parse("EXEC @rc = dbo.Compute @input = 5, @result = @value OUTPUT");
        let stmt = tree.top_level_statements()[0];
        match tree.kind(stmt) {
            NodeKind::Execute {
                procedure,
                return_variable,
            } => {
                assert_eq!(procedure.to_string(), "dbo.Compute");
                assert_eq!(return_variable.as_deref(), Some("@rc"));
            }
            other => panic!("unexpected {:?}", other),
        }
        let outputs: Vec<_> = tree
            .ids()
            .filter_map(|id| match tree.kind(id) {
                NodeKind::ExecuteArgument {
                    variable,
                    output: true,
                } => variable.clone(),
                _ => None,
            })
            .collect();
        assert_eq!(outputs, vec!["@value".to_string()]);
    }

    #[test]
    fn test_while_try_catch_and_throw() {
        let tree = parse(
            "WHILE 1 = 1\nBEGIN\n  BEGIN TRY\n    SET @p = 1\n    BREAK\n  END TRY\n  BEGIN CATCH\n    THROW\n  END CATCH\nEND",
        );
        assert_eq!(count(&tree, |k| matches!(k, NodeKind::While)), 1);
        assert_eq!(count(&tree, |k| matches!(k, NodeKind::TryCatch)), 1);
        assert_eq!(count(&tree, |k| matches!(k, NodeKind::Break)), 1);
        assert_eq!(count(&tree, |k| matches!(k, NodeKind::Throw)), 1);
    }

    #[test]
    fn test_create_table_columns() {
        let tree = parse(
            "CREATE TABLE dbo.Orders (\n  Id INT NOT NULL IDENTITY(1, 1),\n  Amount DECIMAL(10, 2),\n  Total AS Amount * 2,\n  CONSTRAINT PK_Orders PRIMARY KEY CLUSTERED (Id)\n)",
        );
        let stmt = tree.top_level_statements()[0];
        assert!(matches!(tree.kind(stmt), NodeKind::CreateTable { .. }));
        let columns: Vec<_> = tree
            .node(stmt)
            .children()
            .iter()
            .filter_map(|&id| match tree.kind(id) {
                NodeKind::ColumnDefinition { name, data_type } => {
                    Some((name.value.clone(), data_type.clone()))
                }
                _ => None,
            })
            .collect();
        assert_eq!(
            columns,
            vec![
                ("Id".to_string(), Some("INT".to_string())),
                ("Amount".to_string(), Some("DECIMAL(10,2)".to_string())),
                ("Total".to_string(), None),
            ]
        );
    }

    #[test]
    fn test_case_end_does_not_break_statement() {
        let tree = parse("SELECT CASE WHEN a = 1 THEN 'x' ELSE 'y' END AS c FROM t");
        assert_eq!(tree.top_level_statements().len(), 1);
    }

    #[test]
    fn test_drop_if_exists_stays_one_statement() {
        let breaks = break_statements(
            Tokenizer::new(&MsSqlDialect {}, "DROP TABLE IF EXISTS #t")
                .tokenize_with_location()
                .expect("tokens"),
        );
        assert!(!breaks.iter().any(|t| t.token == Token::SemiColon));
    }

    #[test]
    fn test_cte_followed_by_select_is_one_statement() {
        let tree = parse("WITH recent AS (SELECT id FROM orders) SELECT id FROM recent");
        assert_eq!(tree.top_level_statements().len(), 1);
        assert_eq!(count(&tree, |k| matches!(k, NodeKind::WithClause)), 1);
    }
}
