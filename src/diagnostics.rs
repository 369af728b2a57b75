//! Source locations and accumulated compiler diagnostics.

use std::fmt;

/// A location in a source file: byte offset, byte length, and the
/// 1-based line/column of the first byte. Attached to every token, AST
/// node and IR value for error reporting.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct Span {
    pub offset: u32,
    pub length: u32,
    pub line: u32,
    pub col: u32,
}

impl Span {
    pub const UNKNOWN: Span = Span {
        offset: 0,
        length: 0,
        line: 0,
        col: 0,
    };

    pub fn merge(self, other: Span) -> Span {
        if self == Span::UNKNOWN {
            return other;
        }
        if other == Span::UNKNOWN {
            return self;
        }
        let start = self.offset.min(other.offset);
        let end = (self.offset + self.length).max(other.offset + other.length);
        Span {
            offset: start,
            length: end - start,
            line: self.line,
            col: self.col,
        }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

/// A single reported problem: where, and what.
#[derive(Clone, Debug)]
pub struct Diagnostic {
    pub path: String,
    pub span: Span,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: {}", self.path, self.span, self.message)
    }
}

impl Diagnostic {
    pub fn new(path: impl Into<String>, span: Span, message: impl Into<String>) -> Self {
        Diagnostic {
            path: path.into(),
            span,
            message: message.into(),
        }
    }
}
