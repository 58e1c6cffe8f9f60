use std::fmt;
use std::io;

use thiserror::Error;

/// The closed set of ways preprocessing can fail.
///
/// Each variant carries just the detail specific to that failure; the
/// shared file/line/column/source-line context lives on [`PreprocessError`].
#[derive(Debug, Error)]
pub enum PreprocessErrorKind {
    /// The underlying file I/O collaborator failed.
    #[error("I/O error: {0}")]
    Io(#[source] io::Error),
    /// `#include` named a file the resolver could not locate, or a cycle.
    #[error("include not found: {0}")]
    IncludeNotFound(String),
    /// A directive (most often `#define`) was not well-formed.
    #[error("malformed directive: {0}")]
    BadMacroSyntax(String),
    /// A function-like macro was invoked with the wrong number of arguments.
    #[error("argument count mismatch: {0}")]
    BadArgCount(String),
    /// Macro expansion exceeded the configured restart/recursion bound.
    #[error("expansion limit exceeded: {0}")]
    BufferOverflow(String),
    /// `#elif`/`#else`/`#endif` imbalance, or an unterminated `#if`.
    #[error("{0}")]
    BadCondNesting(String),
    /// A `#if`/`#elif` constant expression could not be parsed.
    #[error("expression error: {0}")]
    ExprSyntax(String),
    /// A `#if`/`#elif` constant expression divided or took the modulus by zero.
    #[error("division by zero in constant expression")]
    ExprDivZero,
}

/// An error produced while preprocessing, located at a specific file and
/// line, optionally pinpointed to a column with the offending source text.
#[derive(Debug)]
pub struct PreprocessError {
    kind: PreprocessErrorKind,
    file: String,
    line: usize,
    column: Option<usize>,
    source_line: Option<String>,
}

impl PreprocessError {
    fn new(kind: PreprocessErrorKind, file: String, line: usize) -> Self {
        Self {
            kind,
            file,
            line,
            column: None,
            source_line: None,
        }
    }

    /// The classification of this error.
    #[must_use]
    pub const fn kind(&self) -> &PreprocessErrorKind {
        &self.kind
    }

    /// Attach a 1-based column for the caret in `Display` output.
    #[must_use]
    pub fn with_column(mut self, column: usize) -> Self {
        self.column = Some(column);
        self
    }

    /// Attach the raw source line this error occurred on.
    #[must_use]
    pub fn with_source_line(mut self, line: String) -> Self {
        self.source_line = Some(line);
        self
    }

    /// Wrap an I/O failure from a file read/open/include-resolution collaborator.
    #[must_use]
    pub fn io_error(file: String, line: usize, err: io::Error) -> Self {
        Self::new(PreprocessErrorKind::Io(err), file, line)
    }

    /// An `#include` target could not be resolved, or formed a cycle.
    #[must_use]
    pub fn include_not_found(file: String, line: usize, detail: String) -> Self {
        Self::new(PreprocessErrorKind::IncludeNotFound(detail), file, line)
    }

    /// A directive was malformed (missing name, unterminated parameter list, etc.).
    #[must_use]
    pub fn malformed_directive(file: String, line: usize, detail: String) -> Self {
        Self::new(PreprocessErrorKind::BadMacroSyntax(detail), file, line)
    }

    /// `#error` was reached while active, carrying the author's message.
    #[must_use]
    pub fn user_error(file: String, line: usize, detail: String) -> Self {
        Self::new(PreprocessErrorKind::BadMacroSyntax(detail), file, line)
    }

    /// A function-like macro invocation had too few/too many arguments, or
    /// its argument list was never closed.
    #[must_use]
    pub fn macro_arg_mismatch(file: String, line: usize, detail: String) -> Self {
        Self::new(PreprocessErrorKind::BadArgCount(detail), file, line)
    }

    /// The expansion restart/recursion bound was exceeded.
    #[must_use]
    pub fn recursion_limit_exceeded(file: String, line: usize, detail: String) -> Self {
        Self::new(PreprocessErrorKind::BufferOverflow(detail), file, line)
    }

    /// A conditional-stack error: unbalanced `#elif`/`#else`/`#endif`, or an
    /// unterminated `#if` block at end of input.
    #[must_use]
    pub fn conditional_error(file: String, line: usize, detail: String) -> Self {
        Self::new(PreprocessErrorKind::BadCondNesting(detail), file, line)
    }

    /// A `#if`/`#elif` constant expression failed to parse.
    #[must_use]
    pub fn expr_syntax(file: String, line: usize, detail: String) -> Self {
        Self::new(PreprocessErrorKind::ExprSyntax(detail), file, line)
    }

    /// A `#if`/`#elif` constant expression divided or took the modulus by zero.
    #[must_use]
    pub fn expr_div_zero(file: String, line: usize) -> Self {
        Self::new(PreprocessErrorKind::ExprDivZero, file, line)
    }
}

impl fmt::Display for PreprocessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.column {
            Some(col) => write!(f, "{}:{}:{}: {}", self.file, self.line, col, self.kind)?,
            None => write!(f, "{}:{}: {}", self.file, self.line, self.kind)?,
        }

        if let Some(src) = &self.source_line {
            write!(f, "\n{src}")?;
            if let Some(col) = self.column {
                let padding = " ".repeat(col.saturating_sub(1));
                write!(f, "\n{padding}^")?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for PreprocessError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}

impl From<io::Error> for PreprocessError {
    fn from(err: io::Error) -> Self {
        Self::io_error("<unknown>".to_string(), 0, err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_only_display() {
        let err =
            PreprocessError::malformed_directive("test.c".to_string(), 42, "define".to_string());
        let display = format!("{err}");
        assert!(display.contains("test.c:42"));
        assert!(display.contains("malformed directive: define"));
    }

    #[test]
    fn io_error_chains_source() {
        use std::error::Error;
        let io_error = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let wrapped = PreprocessError::io_error("test.c".to_string(), 10, io_error);
        assert!(wrapped.source().is_some());
    }

    #[test]
    fn caret_points_at_column() {
        let err =
            PreprocessError::malformed_directive("test.c".to_string(), 10, "define".to_string())
                .with_column(5)
                .with_source_line("#define".to_string());
        let display = format!("{err}");
        assert!(display.contains("test.c:10:5"));
        assert!(display.contains("#define"));
        assert!(display.contains("    ^"));
    }

    #[test]
    fn div_zero_has_no_detail_string() {
        let err = PreprocessError::expr_div_zero("test.c".to_string(), 3);
        assert!(matches!(err.kind(), PreprocessErrorKind::ExprDivZero));
    }
}
