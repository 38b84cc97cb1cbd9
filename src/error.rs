//! Source positions and the errors reported to the host

use std::error::Error;
use std::fmt;

use crate::helpers::ImmutableString;

/// A position within a script: the full expression text, the name of its source
/// and the character offsets needed to point at the offending spot.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct Position {
    expr: Option<ImmutableString>,
    source: Option<ImmutableString>,
    index: usize,
    line: usize,
    line_start: usize,
}

impl Position {
    pub fn new(
        expr: ImmutableString,
        source: Option<ImmutableString>,
        index: usize,
        line: usize,
        line_start: usize,
    ) -> Position {
        Position {
            expr: Some(expr),
            source,
            index,
            line,
            line_start,
        }
    }

    /// Zero-based line number
    pub fn line(&self) -> usize {
        self.line
    }

    /// Zero-based column within the line
    pub fn column(&self) -> usize {
        self.index - self.line_start
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_ref().map(|s| &s[..])
    }

    fn is_multiline(&self) -> bool {
        self.expr
            .as_ref()
            .map(|expr| expr.contains('\n'))
            .unwrap_or(false)
    }

    /// Renders the position either as `source:line:column` or as the offending
    /// line followed by a caret.
    pub fn to_string(&self, compact: bool) -> String {
        let mut string = String::new();
        let multiline = self.is_multiline();

        if compact {
            if let Some(ref source) = self.source {
                string += source;
                string += ":";
            }
            if multiline {
                string += &format!("{}:", self.line + 1);
            }
            string += &format!("{}", self.column() + 1);
            return string;
        }

        if self.source.is_some() || multiline {
            if let Some(ref source) = self.source {
                string += source;
                string += ", ";
            }
            if multiline {
                string += &format!("line {}, ", self.line + 1);
            }
            string += &format!("column {}:\n", self.column() + 1);
        }

        let expr = self.expr.as_ref().map(|e| &e[..]).unwrap_or("");
        let line: String = expr
            .chars()
            .skip(self.line_start)
            .take_while(|&c| c != '\n')
            .collect();
        string += &line;
        string.push('\n');
        string.extend(std::iter::repeat(' ').take(self.column()));
        string += "^\n";
        string
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.to_string(true))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// The text could not be read into data
    Syntax,
    /// A datum could not be compiled; nothing from that datum was executed
    Compile,
    /// A procedure failed while running
    Runtime,
    /// A native procedure deferred its result during a synchronous evaluation
    Suspended,
}

/// An error raised while reading, compiling or running a script
#[derive(Clone, Debug, PartialEq)]
pub struct ScriptError {
    kind: ErrorKind,
    message: String,
    position: Position,
    backtrace: Vec<Position>,
}

impl ScriptError {
    pub fn new<S: Into<String>>(kind: ErrorKind, message: S, position: Position) -> ScriptError {
        ScriptError {
            kind,
            message: message.into(),
            position,
            backtrace: vec![],
        }
    }

    pub fn compile<S: Into<String>>(message: S, position: &Position) -> ScriptError {
        ScriptError::new(ErrorKind::Compile, message, position.clone())
    }

    /// A runtime error positioned at the innermost frame; the remaining frames,
    /// innermost first, form the backtrace.
    pub fn runtime<S: Into<String>>(message: S, mut frames: Vec<Position>) -> ScriptError {
        let position = if frames.is_empty() {
            Position::default()
        } else {
            frames.remove(0)
        };
        ScriptError {
            kind: ErrorKind::Runtime,
            message: message.into(),
            position,
            backtrace: frames,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn position(&self) -> &Position {
        &self.position
    }

    pub fn backtrace(&self) -> &[Position] {
        &self.backtrace
    }

    pub fn to_string(&self, compact: bool) -> String {
        let mut string = if compact {
            format!("{}: {}", self.position.to_string(true), self.message)
        } else {
            format!("{}{}", self.position.to_string(false), self.message)
        };
        for position in &self.backtrace {
            string += "\n  at ";
            string += &position.to_string(true);
        }
        string
    }
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.to_string(true))
    }
}

impl Error for ScriptError {}

#[cfg(test)]
mod test {
    use super::*;

    fn position(expr: &str, index: usize, line: usize, line_start: usize) -> Position {
        Position::new(expr.into(), Some("test.scm".into()), index, line, line_start)
    }

    #[test]
    fn compact_single_line() {
        let pos = position("(foo bar)", 5, 0, 0);
        assert_eq!(pos.to_string(true), "test.scm:6");
    }

    #[test]
    fn compact_multiline() {
        let pos = position("(a\n (b c))", 4, 1, 3);
        assert_eq!(pos.to_string(true), "test.scm:2:2");
    }

    #[test]
    fn expanded_with_caret() {
        let pos = position("(a\n (b c))", 4, 1, 3);
        assert_eq!(pos.to_string(false), "test.scm, line 2, column 2:\n (b c))\n ^\n");
    }

    #[test]
    fn runtime_error_with_backtrace() {
        let frames = vec![position("(f)", 1, 0, 0), position("(g (f))", 0, 0, 0)];
        let error = ScriptError::runtime("Boom.", frames);
        assert_eq!(error.kind(), ErrorKind::Runtime);
        assert_eq!(error.to_string(true), "test.scm:2: Boom.\n  at test.scm:1");
    }
}
