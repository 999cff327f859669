use std::{fmt, io};

use annotate_snippets::{Level, Renderer, Snippet};
use smol_str::SmolStr;

use crate::{syntax::Rule, Span};

#[derive(Debug)]
#[allow(clippy::large_enum_variant)]
pub enum Error {
    SyntaxError(pest::error::Error<Rule>),
    NumberOutOfBounds(Span),
    InvalidEscape(Span),
    Undefined(UndefinedKind, Span),
    DuplicateValueName(SmolStr, Span),
    DuplicateBlockName(SmolStr, Span),

    ArityMismatch {
        prototype: String,
        expected: usize,
        actual: usize,
        span: Span,
    },
}

#[derive(Debug)]
pub enum UndefinedKind {
    Block(SmolStr),
    Value(SmolStr),
}

impl Error {
    pub fn span(&self) -> Span {
        match self {
            Error::NumberOutOfBounds(span)
            | Error::InvalidEscape(span)
            | Error::Undefined(_, span)
            | Error::DuplicateValueName(_, span)
            | Error::DuplicateBlockName(_, span)
            | Error::ArityMismatch { span, .. } => *span,

            Error::SyntaxError(err) => match err.location {
                pest::error::InputLocation::Pos(p) => Span(p as u32, p as u32),
                pest::error::InputLocation::Span((s, e)) => Span(s as u32, e as u32),
            },
        }
    }

    /// Renders the error as an annotated excerpt of `content`.
    pub fn print(
        &self,
        mut w: impl io::Write,
        path: &str,
        content: &str,
        colors: bool,
    ) -> io::Result<()> {
        let label = self.to_string();
        let message = Level::Error.title("parse error").snippet(
            Snippet::source(content)
                .line_start(1)
                .origin(path)
                .fold(true)
                .annotation(Level::Error.span(self.span().as_range()).label(&label)),
        );
        let renderer = if colors {
            Renderer::styled()
        } else {
            Renderer::plain()
        };
        let res = writeln!(w, "{}", renderer.render(message));
        res
    }

    pub fn print_to_string(&self, path: &str, content: &str, colors: bool) -> String {
        let mut v = vec![];
        // Writing into a `Vec` cannot fail.
        let _ = self.print(&mut v, path, content, colors);
        String::from_utf8_lossy(&v).into_owned()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::SyntaxError(err) => write!(f, "{}", err.variant.message()),
            Error::NumberOutOfBounds(_) => f.write_str("number out of bounds"),
            Error::InvalidEscape(_) => f.write_str("invalid escape sequence"),
            Error::Undefined(UndefinedKind::Block(name), _) => {
                write!(f, "undefined block: `{name}`")
            }
            Error::Undefined(UndefinedKind::Value(name), _) => {
                write!(f, "undefined value: `{name}`")
            }
            Error::DuplicateValueName(name, _) => {
                write!(f, "value name `{name}` is already defined")
            }
            Error::DuplicateBlockName(name, _) => {
                write!(f, "block name `{name}` is already defined")
            }
            Error::ArityMismatch {
                prototype,
                expected,
                actual,
                ..
            } => write!(
                f,
                "`{prototype}` takes {expected} argument(s), but {actual} were given"
            ),
        }
    }
}
