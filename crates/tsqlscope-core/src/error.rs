//! Issue and diagnostic types

use miette::SourceSpan;
use serde::{Deserialize, Serialize};

/// Source location span
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    /// Byte offset from start of source (optional, for miette compatibility)
    pub offset: usize,
    /// Length in bytes
    pub length: usize,
    /// Line number (1-indexed, 0 when unknown)
    pub line: usize,
    /// Column number (1-indexed, 0 when unknown)
    pub column: usize,
}

impl Span {
    /// Create a span with byte offset
    pub fn new(offset: usize, length: usize) -> Self {
        Self {
            offset,
            length,
            line: 0,
            column: 0,
        }
    }

    /// Create a span with line and column information
    pub fn with_location(line: usize, column: usize, length: usize) -> Self {
        Self {
            offset: 0,
            length,
            line,
            column,
        }
    }

    /// Create a span from sqlparser's Span, shifted down by `line_offset` lines
    pub fn from_sqlparser(span: &sqlparser::tokenizer::Span, line_offset: usize) -> Self {
        let start = span.start;
        let end = span.end;
        let length = if end.line == start.line && end.column > start.column {
            end.column as usize - start.column as usize
        } else {
            1
        };
        if start.line == 0 {
            return Self::default();
        }
        Self {
            offset: 0,
            length,
            line: start.line as usize + line_offset,
            column: start.column as usize,
        }
    }

    /// Whether the span carries a usable location
    pub fn is_known(&self) -> bool {
        self.line > 0
    }
}

impl From<Span> for SourceSpan {
    fn from(span: Span) -> Self {
        SourceSpan::new(span.offset.into(), span.length)
    }
}

/// Issue severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

/// An issue found while analyzing a script.
///
/// The fields follow the shape rule code hands to the reporting sink:
/// rule, database, file, enclosing object, region and message arguments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub kind: IssueKind,
    pub severity: Severity,
    pub database: Option<String>,
    pub file_path: Option<String>,
    /// Name of the enclosing routine/view/table definition, if any
    pub object_name: Option<String>,
    pub span: Option<Span>,
    pub message: String,
    pub arguments: Vec<String>,
    pub help: Option<String>,
}

impl Issue {
    pub fn error(kind: IssueKind, message: impl Into<String>) -> Self {
        Self::with_severity(kind, Severity::Error, message)
    }

    pub fn warning(kind: IssueKind, message: impl Into<String>) -> Self {
        Self::with_severity(kind, Severity::Warning, message)
    }

    fn with_severity(kind: IssueKind, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity,
            database: None,
            file_path: None,
            object_name: None,
            span: None,
            message: message.into(),
            arguments: Vec::new(),
            help: None,
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        if span.is_known() {
            self.span = Some(span);
        }
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn with_file(mut self, file_path: impl Into<String>) -> Self {
        self.file_path = Some(file_path.into());
        self
    }

    pub fn with_object(mut self, object_name: Option<String>) -> Self {
        self.object_name = object_name;
        self
    }

    pub fn with_argument(mut self, argument: impl Into<String>) -> Self {
        self.arguments.push(argument.into());
        self
    }

    /// Get the rule code string (e.g., "E0002")
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }
}

/// Types of issues the core and its built-in checks produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IssueKind {
    /// E0001: Referenced table, view or synonym not found in the catalog
    ObjectNotFound,
    /// E0002: Unqualified column reference with more than one candidate table
    AmbiguousColumn,
    /// W0001: Output parameter not assigned on every execution path
    OutputParameterNotAssigned,
    /// W0002: Same alias registered twice in one scope
    DuplicateAlias,
    /// Parse error
    ParseError,
}

impl IssueKind {
    pub fn code(&self) -> &'static str {
        match self {
            IssueKind::ObjectNotFound => "E0001",
            IssueKind::AmbiguousColumn => "E0002",
            IssueKind::OutputParameterNotAssigned => "W0001",
            IssueKind::DuplicateAlias => "W0002",
            IssueKind::ParseError => "E1000",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            IssueKind::ObjectNotFound => "object-not-found",
            IssueKind::AmbiguousColumn => "ambiguous-column",
            IssueKind::OutputParameterNotAssigned => "output-parameter-not-assigned",
            IssueKind::DuplicateAlias => "duplicate-alias",
            IssueKind::ParseError => "parse-error",
        }
    }
}

/// Destination for issues raised during analysis
pub trait IssueSink {
    fn report(&mut self, issue: Issue);
}

impl IssueSink for Vec<Issue> {
    fn report(&mut self, issue: Issue) {
        self.push(issue);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_span_is_dropped() {
        let issue = Issue::error(IssueKind::AmbiguousColumn, "x").with_span(Span::default());
        assert!(issue.span.is_none());

        let issue =
            Issue::error(IssueKind::AmbiguousColumn, "x").with_span(Span::with_location(3, 7, 2));
        assert_eq!(issue.span.map(|s| s.line), Some(3));
    }

    #[test]
    fn test_span_into_source_span() {
        let source: SourceSpan = Span::new(10, 4).into();
        assert_eq!(source.offset(), 10);
        assert_eq!(source.len(), 4);
    }

    #[test]
    fn test_sink_collects_issues() {
        let mut sink: Vec<Issue> = Vec::new();
        sink.report(Issue::warning(IssueKind::DuplicateAlias, "dup").with_argument("a"));
        assert_eq!(sink.len(), 1);
        assert_eq!(sink[0].code(), "W0002");
        assert_eq!(sink[0].arguments, vec!["a".to_string()]);
    }
}
