use crate::span::Span;

/// The typed error kinds the compile-time stages can report (spec §4.6/§7).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    UnknownToken,
    UnterminatedComment,
    Syntax,
    UnassignableExpression,
    UndeclaredIdentifier,
    OutOfLoopStatement,
}

impl ErrorKind {
    pub fn label(self) -> &'static str {
        match self {
            ErrorKind::UnknownToken => "UnknownToken",
            ErrorKind::UnterminatedComment => "UnterminatedComment",
            ErrorKind::Syntax => "Syntax",
            ErrorKind::UnassignableExpression => "UnassignableExpression",
            ErrorKind::UndeclaredIdentifier => "UndeclaredIdentifier",
            ErrorKind::OutOfLoopStatement => "OutOfLoopStatement",
        }
    }
}

/// A single compile-time diagnostic, carrying its location and an optional
/// quoted detail (e.g. the offending identifier or token text).
#[derive(Clone, Debug)]
pub struct Diagnostic {
    pub kind: ErrorKind,
    pub span: Span,
    pub detail: String,
    pub notes: Vec<String>,
}

impl Diagnostic {
    pub fn new(kind: ErrorKind, span: Span, detail: impl Into<String>) -> Self {
        Self {
            kind,
            span,
            detail: detail.into(),
            notes: Vec::new(),
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    /// Render as `<file>:<line>:<col>-<line>:<col>: error: <kind> '<detail>'`
    /// per spec §6.
    pub fn to_message(&self, filename: &str) -> String {
        format!(
            "{}:{}:{}-{}:{}: error: {} '{}'",
            filename,
            self.span.begin.line,
            self.span.begin.col,
            self.span.end_pos.line,
            self.span.end_pos.col,
            self.kind.label(),
            self.detail
        )
    }

    /// Render a rich, colored snippet report to stderr using `ariadne`.
    pub fn render(&self, filename: &str, source: &str) {
        use ariadne::{Color, Label, Report, ReportKind, Source};

        let start = self.span.start as usize;
        let end = (self.span.end as usize).max(start + 1).min(source.len().max(1));
        let mut report = Report::build(ReportKind::Error, filename, start)
            .with_message(format!("{} '{}'", self.kind.label(), self.detail))
            .with_label(
                Label::new((filename, start..end))
                    .with_message(self.kind.label())
                    .with_color(Color::Red),
            );
        for note in &self.notes {
            report = report.with_note(note);
        }
        let _ = report.finish().eprint((filename, Source::from(source)));
    }
}

/// Accumulates diagnostics in insertion order; the Driver consults
/// [`Reporter::has_errors`] between pipeline stages (spec §4.6/§7).
#[derive(Clone, Debug, Default)]
pub struct Reporter {
    diagnostics: Vec<Diagnostic>,
}

impl Reporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn extend(&mut self, diagnostics: impl IntoIterator<Item = Diagnostic>) {
        self.diagnostics.extend(diagnostics);
    }

    pub fn has_errors(&self) -> bool {
        !self.diagnostics.is_empty()
    }

    pub fn errors(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn into_errors(self) -> Vec<Diagnostic> {
        self.diagnostics
    }

    /// Render every accumulated diagnostic to stderr.
    pub fn render_all(&self, filename: &str, source: &str) {
        for diagnostic in &self.diagnostics {
            diagnostic.render(filename, source);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::Pos;

    fn span() -> Span {
        Span::new(0, 3, 12, Pos::new(1, 4), Pos::new(1, 13))
    }

    #[test]
    fn message_matches_spec_format() {
        let d = Diagnostic::new(ErrorKind::UndeclaredIdentifier, span(), "foo");
        assert_eq!(
            d.to_message("prog.cl"),
            "prog.cl:1:4-1:13: error: UndeclaredIdentifier 'foo'"
        );
    }

    #[test]
    fn reporter_tracks_insertion_order() {
        let mut r = Reporter::new();
        r.push(Diagnostic::new(ErrorKind::Syntax, span(), "a"));
        r.push(Diagnostic::new(ErrorKind::OutOfLoopStatement, span(), "b"));
        assert!(r.has_errors());
        assert_eq!(r.errors()[0].detail, "a");
        assert_eq!(r.errors()[1].detail, "b");
    }

    #[test]
    fn render_does_not_panic() {
        let source = "a = 5 = x;\n";
        let d = Diagnostic::new(ErrorKind::UnassignableExpression, span(), "5")
            .with_note("literals cannot appear on the left of '='".to_string());
        d.render("t.cl", source);
    }
}
