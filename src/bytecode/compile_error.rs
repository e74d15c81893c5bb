use crate::frontend::token::Pos;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

/// A position-tagged message produced during analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub pos: Pos,
    pub message: String,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.severity {
            Severity::Error => write!(f, "{}: {}", self.pos, self.message),
            Severity::Warning => write!(f, "警告 {}: {}", self.pos, self.message),
        }
    }
}

/// Everything the analyzer had to say about one compilation unit, in the
/// order it was recorded. Errors are critical: the first one recorded also
/// ends the analysis.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Diagnostics::default()
    }

    pub fn error(&mut self, pos: Pos, message: impl Into<String>) {
        self.entries.push(Diagnostic {
            severity: Severity::Error,
            pos,
            message: message.into(),
        });
    }

    pub fn warning(&mut self, pos: Pos, message: impl Into<String>) {
        self.entries.push(Diagnostic {
            severity: Severity::Warning,
            pos,
            message: message.into(),
        });
    }

    pub fn has_errors(&self) -> bool {
        self.entries
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries
            .iter()
            .filter(|d| d.severity == Severity::Error)
    }

    /// Split off the warnings, consuming the collection. Used on successful
    /// analysis, where only warnings can remain.
    pub fn into_warnings(self) -> Vec<Diagnostic> {
        self.entries
            .into_iter()
            .filter(|d| d.severity == Severity::Warning)
            .collect()
    }
}

impl std::fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for entry in &self.entries {
            writeln!(f, "{}", entry)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_rendering() {
        let mut diags = Diagnostics::new();
        diags.error(Pos::new(3, 7), "name 'a' is used before assignment");

        let rendered = diags.to_string();
        assert_eq!(rendered, "行 3 列 7: name 'a' is used before assignment\n");
    }

    #[test]
    fn test_warning_rendering_has_severity_prefix() {
        let mut diags = Diagnostics::new();
        diags.warning(Pos::new(2, 1), "'x' shadows an outer declaration");

        assert_eq!(
            diags.to_string(),
            "警告 行 2 列 1: 'x' shadows an outer declaration\n"
        );
    }

    #[test]
    fn test_has_errors() {
        let mut diags = Diagnostics::new();
        assert!(!diags.has_errors());
        diags.warning(Pos::new(1, 1), "w");
        assert!(!diags.has_errors());
        diags.error(Pos::new(1, 1), "e");
        assert!(diags.has_errors());
    }

    #[test]
    fn test_into_warnings_drops_errors() {
        let mut diags = Diagnostics::new();
        diags.warning(Pos::new(1, 1), "first");
        diags.error(Pos::new(1, 2), "boom");
        diags.warning(Pos::new(1, 3), "second");

        let warnings = diags.into_warnings();
        assert_eq!(warnings.len(), 2);
        assert_eq!(warnings[0].message, "first");
        assert_eq!(warnings[1].message, "second");
    }
}
