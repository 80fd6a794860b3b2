//! Diagnostics collected while loading a dump file.

/// A load-time diagnostic (error or warning) at a dump file line.
#[derive(Clone, Debug)]
pub struct Diagnostic {
    pub severity: Severity,
    pub line: u64,
    pub message: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

impl Diagnostic {
    pub fn error(line: u64, message: String) -> Self {
        Self {
            severity: Severity::Error,
            line,
            message,
        }
    }

    pub fn warning(line: u64, message: String) -> Self {
        Self {
            severity: Severity::Warning,
            line,
            message,
        }
    }

    /// Render the diagnostic to stderr using ariadne, pointing at the
    /// offending line of the dump file.
    pub fn render(&self, filename: &str, source: &str) {
        use ariadne::{Color, Label, Report, ReportKind, Source};

        let kind = match self.severity {
            Severity::Error => ReportKind::Error,
            Severity::Warning => ReportKind::Warning,
        };

        let color = match self.severity {
            Severity::Error => Color::Red,
            Severity::Warning => Color::Yellow,
        };

        let range = line_range(source, self.line);
        Report::build(kind, filename, range.start)
            .with_message(&self.message)
            .with_label(
                Label::new((filename, range))
                    .with_message(&self.message)
                    .with_color(color),
            )
            .finish()
            .eprint((filename, Source::from(source)))
            .ok();
    }
}

/// Byte range of a 1-based line number; empty range at the end when the
/// line is out of bounds (a diagnostic about the file as a whole).
fn line_range(source: &str, line: u64) -> std::ops::Range<usize> {
    if line == 0 {
        return 0..0;
    }
    let mut start = 0usize;
    let mut current = 1u64;
    for (i, c) in source.char_indices() {
        if current == line {
            if c == '\n' {
                return start..i;
            }
            continue;
        }
        if c == '\n' {
            current += 1;
            start = i + 1;
        }
    }
    if current == line {
        start..source.len()
    } else {
        source.len()..source.len()
    }
}

/// Render a list of diagnostics.
pub fn render_diagnostics(diagnostics: &[Diagnostic], filename: &str, source: &str) {
    for diag in diagnostics {
        diag.render(filename, source);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_range() {
        let src = "aa\nbbbb\ncc";
        assert_eq!(line_range(src, 1), 0..2);
        assert_eq!(line_range(src, 2), 3..7);
        assert_eq!(line_range(src, 3), 8..10);
        assert_eq!(line_range(src, 9), 10..10);
    }

    #[test]
    fn test_construction() {
        let d = Diagnostic::error(12, "bad position".into());
        assert_eq!(d.severity, Severity::Error);
        assert_eq!(d.line, 12);
    }
}
