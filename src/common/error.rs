use std::fmt;

use colored::Colorize;

use crate::common::span::Span;

/// The broad category an error belongs to.
/// `Parse` errors abort the input; `Translate` errors are
/// recoverable at the module boundary; `Internal` carries
/// diagnostics returned by the IR layer; `Bug` marks
/// assertions that should never fire on well-formed input
/// and asks the user to file a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Parse,
    Translate,
    Internal,
    Bug,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Parse => "Parse Error",
            ErrorKind::Translate => "Translate Error",
            ErrorKind::Internal => "Internal Error",
            ErrorKind::Bug => "Bug",
        };
        write!(f, "{}", name)
    }
}

/// A compile-time error: a message, a category, and the
/// source region it points at. The span may be empty for
/// driver errors unrelated to user input.
#[derive(Debug, Clone, PartialEq)]
pub struct Error {
    pub kind: ErrorKind,
    pub message: String,
    pub span: Span,
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn new(kind: ErrorKind, message: &str, span: &Span) -> Error {
        Error {
            kind,
            message: message.to_string(),
            span: span.clone(),
        }
    }

    pub fn parse(message: &str, span: &Span) -> Error {
        Error::new(ErrorKind::Parse, message, span)
    }

    pub fn translate(message: &str, span: &Span) -> Error {
        Error::new(ErrorKind::Translate, message, span)
    }

    pub fn internal(message: &str) -> Error {
        Error::new(ErrorKind::Internal, message, &Span::empty())
    }

    pub fn bug(message: &str, span: &Span) -> Error {
        Error::new(ErrorKind::Bug, message, span)
    }
}

impl fmt::Display for Error {
    /// Renders the error the way the driver prints it:
    /// a banner, the location, the message, and the
    /// offending line with a caret under the column.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.kind == ErrorKind::Bug {
            writeln!(
                f,
                "{} Please submit a bug report with the messages shown below.",
                "[BUG]".on_red().white(),
            )?;
        } else {
            write!(f, "{} {}: ", "[ERROR]".on_red().white(), self.kind)?;
        }

        if !self.span.is_empty() {
            write!(
                f,
                "{}: ",
                format!("{}@{}", self.span.path(), self.span.line()).magenta()
            )?;
        }

        writeln!(f, "{}", self.message)?;

        if !self.span.is_empty() {
            writeln!(f, "{}", self.span.line_contents())?;
            write!(f, "{}{}", " ".repeat(self.span.column()), "^".green())?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::common::source::Source;

    #[test]
    fn caret_points_at_column() {
        colored::control::set_override(false);

        let source = Source::source("x = oops + 1");
        let error = Error::translate(
            "\"oops\" has not declared in this scope",
            &Span::new(&source, 4, 4),
        );

        let rendered = format!("{}", error);
        assert!(rendered.contains("\"oops\" has not declared in this scope"));
        assert!(rendered.contains("x = oops + 1"));
        assert!(rendered.ends_with("    ^"));
    }

    #[test]
    fn driver_errors_may_have_no_location() {
        colored::control::set_override(false);

        let error = Error::internal("ir verifier rejected the module");
        let rendered = format!("{}", error);
        assert!(rendered.contains("Internal Error"));
        assert!(!rendered.contains('^'));
    }
}
