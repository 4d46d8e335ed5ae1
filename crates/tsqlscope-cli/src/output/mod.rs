//! Output formatting

use std::collections::BTreeMap;

use miette::{IntoDiagnostic, Result};
use serde::Serialize;
use tsqlscope_core::{Issue, Severity};

use crate::args::OutputFormat;

/// Issues of one script, with its source for snippets
#[derive(Debug, Serialize)]
pub struct FileReport<'a> {
    pub file: String,
    #[serde(skip)]
    pub source: &'a str,
    pub issues: Vec<Issue>,
}

/// Output formatter for issues
pub struct OutputFormatter {
    format: OutputFormat,
}

impl OutputFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Print issues in the configured format
    pub fn print_reports(&self, reports: &[FileReport<'_>]) -> Result<()> {
        match self.format {
            OutputFormat::Human => {
                for report in reports {
                    self.print_human(report);
                }
                Ok(())
            }
            OutputFormat::Json => self.print_json(reports),
            OutputFormat::Sarif => self.print_sarif(reports),
        }
    }

    fn print_human(&self, report: &FileReport<'_>) {
        for issue in &report.issues {
            let severity_str = match issue.severity {
                Severity::Error => "\x1b[31merror\x1b[0m",
                Severity::Warning => "\x1b[33mwarning\x1b[0m",
                Severity::Info => "\x1b[34minfo\x1b[0m",
            };

            eprintln!("{}[{}]: {}", severity_str, issue.code(), issue.message);

            match &issue.span {
                Some(span) => {
                    eprintln!("  --> {}:{}:{}", report.file, span.line, span.column);

                    if let Some(source_line) = get_source_line(report.source, span.line) {
                        eprintln!("   |");
                        eprintln!("{:>3} | {}", span.line, source_line);

                        let col = span.column.max(1);
                        let padding = " ".repeat(col - 1);
                        let room = source_line.chars().count().saturating_sub(col - 1);
                        let underline = "^".repeat(span.length.min(room).max(1));
                        eprintln!("   | {}{}", padding, underline);
                    }
                }
                None => eprintln!("  --> {}", report.file),
            }

            if let Some(object) = &issue.object_name {
                eprintln!("   = in: {}", object);
            }

            if let Some(help) = &issue.help {
                eprintln!("   = help: {}", help);
            }

            eprintln!();
        }
    }

    fn print_json(&self, reports: &[FileReport<'_>]) -> Result<()> {
        let files: Vec<&FileReport<'_>> = reports.iter().filter(|r| !r.issues.is_empty()).collect();
        let output = serde_json::json!({ "files": files });
        println!("{}", serde_json::to_string_pretty(&output).into_diagnostic()?);
        Ok(())
    }

    fn print_sarif(&self, reports: &[FileReport<'_>]) -> Result<()> {
        let mut rules = BTreeMap::new();
        let mut results = Vec::new();

        for report in reports {
            for issue in &report.issues {
                rules.entry(issue.code()).or_insert_with(|| {
                    serde_json::json!({
                        "id": issue.code(),
                        "name": issue.kind.name(),
                    })
                });

                let mut physical = serde_json::json!({
                    "artifactLocation": {
                        "uri": report.file
                    }
                });
                if let Some(span) = &issue.span {
                    physical["region"] = serde_json::json!({
                        "startLine": span.line,
                        "startColumn": span.column.max(1),
                    });
                }

                let mut location = serde_json::json!({ "physicalLocation": physical });
                if let Some(object) = &issue.object_name {
                    location["logicalLocations"] = serde_json::json!([{ "fullyQualifiedName": object }]);
                }

                results.push(serde_json::json!({
                    "ruleId": issue.code(),
                    "level": match issue.severity {
                        Severity::Error => "error",
                        Severity::Warning => "warning",
                        Severity::Info => "note",
                    },
                    "message": {
                        "text": issue.message
                    },
                    "locations": [location]
                }));
            }
        }

        let sarif = serde_json::json!({
            "$schema": "https://raw.githubusercontent.com/oasis-tcs/sarif-spec/master/Schemata/sarif-schema-2.1.0.json",
            "version": "2.1.0",
            "runs": [{
                "tool": {
                    "driver": {
                        "name": "tsqlscope",
                        "version": env!("CARGO_PKG_VERSION"),
                        "rules": rules.into_values().collect::<Vec<_>>()
                    }
                },
                "results": results
            }]
        });

        println!("{}", serde_json::to_string_pretty(&sarif).into_diagnostic()?);
        Ok(())
    }
}

/// Get a specific line from source (1-indexed)
fn get_source_line(source: &str, line: usize) -> Option<&str> {
    source.lines().nth(line.checked_sub(1)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_source_line() {
        let source = "SELECT 1\nGO\nSELECT 2";
        assert_eq!(get_source_line(source, 3), Some("SELECT 2"));
        assert_eq!(get_source_line(source, 0), None);
        assert_eq!(get_source_line(source, 4), None);
    }
}
