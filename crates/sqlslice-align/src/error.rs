//! Render failures surfaced to the caller

use sqlslice_core::{Diagnostic, DiagnosticCode, Location, Severity};

/// A failure of the render step.
///
/// Alignment itself never fails; the only terminal error for a file is the
/// templating engine refusing to parse or execute it.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("Template syntax error: {message}")]
    Syntax {
        message: String,
        line: Option<usize>,
    },

    #[error("Template render error: {message}")]
    Render {
        message: String,
        line: Option<usize>,
    },

    /// The template could not be read
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RenderError {
    /// Line of the failure, if the engine reported one
    pub fn line(&self) -> Option<usize> {
        match self {
            Self::Syntax { line, .. } | Self::Render { line, .. } => *line,
            Self::Io(_) => None,
        }
    }

    /// Line of the failure, or line 1 when it is unknown
    pub fn line_or_sentinel(&self) -> usize {
        self.line().unwrap_or(1)
    }

    pub fn code(&self) -> DiagnosticCode {
        match self {
            Self::Syntax { .. } => DiagnosticCode::TemplateSyntaxError,
            Self::Render { .. } => DiagnosticCode::TemplateRenderError,
            Self::Io(_) => DiagnosticCode::FileReadError,
        }
    }

    /// Convert to a diagnostic located in `file`
    pub fn to_diagnostic(&self, file: &str) -> Diagnostic {
        let location = match self {
            Self::Io(_) => Location::new(file),
            _ => Location::with_line(file, self.line_or_sentinel()),
        };

        Diagnostic::new(self.code(), Severity::Error, self.to_string()).with_location(location)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_line_falls_back_to_first_line() {
        let err = RenderError::Syntax {
            message: "unexpected end of input".to_string(),
            line: None,
        };
        assert_eq!(err.line(), None);
        assert_eq!(err.line_or_sentinel(), 1);
    }

    #[test]
    fn diagnostic_carries_line() {
        let err = RenderError::Render {
            message: "division by zero".to_string(),
            line: Some(7),
        };
        let diag = err.to_diagnostic("models/orders.sql");

        assert_eq!(diag.code, DiagnosticCode::TemplateRenderError);
        assert_eq!(diag.severity, Severity::Error);
        assert_eq!(diag.location, Some(Location::with_line("models/orders.sql", 7)));
        assert!(diag.message.contains("division by zero"));
    }

    #[test]
    fn read_failures_have_no_line() {
        let err = RenderError::from(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        let diag = err.to_diagnostic("models/gone.sql");

        assert_eq!(diag.code, DiagnosticCode::FileReadError);
        assert_eq!(diag.location, Some(Location::new("models/gone.sql")));
        assert!(diag.message.contains("gone"));
    }
}
