use crate::lexer::token::Span;
use ariadne::{Color, Label, Report, ReportKind, Source};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticSeverity {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    severity: DiagnosticSeverity,
    source_id: String,
    span: Span,
    message: String,
}

impl Diagnostic {
    pub fn new<S: Into<String>>(
        severity: DiagnosticSeverity,
        source_id: S,
        span: Span,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            source_id: source_id.into(),
            span,
            message: message.into(),
        }
    }

    pub fn severity(&self) -> DiagnosticSeverity {
        self.severity
    }

    pub fn span(&self) -> Span {
        self.span
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn report_kind(&self) -> ReportKind<'_> {
        match self.severity {
            DiagnosticSeverity::Error => ReportKind::Error,
            DiagnosticSeverity::Warning => ReportKind::Warning,
        }
    }

    fn report(&self) -> Report<'_, (String, std::ops::Range<usize>)> {
        let color = match self.severity {
            DiagnosticSeverity::Error => Color::Red,
            DiagnosticSeverity::Warning => Color::Yellow,
        };

        let span: std::ops::Range<usize> = self.span().into();
        Report::build(self.report_kind(), self.source_id().to_string(), span.start)
            .with_message(self.message())
            .with_label(
                Label::new((self.source_id().to_string(), span))
                    .with_message(self.message())
                    .with_color(color),
            )
            .with_note("Cached text can be cleared with `conjure forget <file> <function>`.")
            .finish()
    }
}

pub fn emit_diagnostics(diagnostics: &[Diagnostic], source: &str) {
    for diagnostic in diagnostics {
        let _ = diagnostic
            .report()
            .eprint((diagnostic.source_id().to_string(), Source::from(source)));
    }
}

/// Renders diagnostics without colour so they can be embedded in log lines.
pub fn render_diagnostics(diagnostics: &[Diagnostic]) -> String {
    diagnostics
        .iter()
        .map(|diagnostic| {
            let span = diagnostic.span();
            format!(
                "{}:{}..{}: {}",
                diagnostic.source_id(),
                span.start(),
                span.end(),
                diagnostic.message()
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
